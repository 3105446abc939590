//! 素性重みの数値表現
//!
//! コンパイル済みの重みは既定で符号付き16ビットの固定小数点値として保持され、
//! 32ビット整数で累積されます。`float-weights` フィーチャーを有効にすると
//! どちらも `f64` になり、量子化誤差のない計算になります。

/// コンパイル済みの素性値
#[cfg(not(feature = "float-weights"))]
pub type FeatureValue = i16;

/// スコアの累積値
#[cfg(not(feature = "float-weights"))]
pub type FeatureSum = i32;

/// コンパイル済みの素性値
#[cfg(feature = "float-weights")]
pub type FeatureValue = f64;

/// スコアの累積値
#[cfg(feature = "float-weights")]
pub type FeatureSum = f64;

/// 素性値が表現できる絶対値の最大値
#[cfg(not(feature = "float-weights"))]
const VALUE_MAX: f64 = i16::MAX as f64;

/// 重みの絶対値の最大値から倍率を求めます。
///
/// 量子化された値に倍率を掛けると元の重みに戻ります。
pub fn multiplier_for(abs_max: f64) -> f64 {
    #[cfg(not(feature = "float-weights"))]
    {
        if abs_max > 0.0 { abs_max / VALUE_MAX } else { 1.0 }
    }
    #[cfg(feature = "float-weights")]
    {
        let _ = abs_max;
        1.0
    }
}

/// 重みを倍率で量子化します。
#[inline(always)]
pub fn quantize(weight: f64, multiplier: f64) -> FeatureValue {
    #[cfg(not(feature = "float-weights"))]
    {
        (weight / multiplier).round().clamp(-VALUE_MAX, VALUE_MAX) as FeatureValue
    }
    #[cfg(feature = "float-weights")]
    {
        weight / multiplier
    }
}

/// 素性値を累積値の型に変換します。
#[inline(always)]
pub fn widen(value: FeatureValue) -> FeatureSum {
    FeatureSum::from(value)
}

/// 累積値に倍率を掛けて実数のスコアに戻します。
#[inline(always)]
pub fn dequantize(sum: FeatureSum, multiplier: f64) -> f64 {
    f64::from(sum) * multiplier
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_round_trip() {
        let m = multiplier_for(2.0);
        for w in [2.0, -2.0, 0.5, -0.25, 0.0] {
            let q = quantize(w, m);
            assert!((dequantize(widen(q), m) - w).abs() < 1e-3);
        }
    }

    #[test]
    fn test_zero_max_weight() {
        assert_eq!(1.0, multiplier_for(0.0));
    }
}
