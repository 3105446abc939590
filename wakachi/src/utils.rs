//! ユーティリティ関数と型変換トレイトを提供するモジュール
//!
//! - `FromU32`: u32からの型変換トレイト
//! - 対数スコアの正規化とロジスティック関数

/// u32から他の型への変換を提供するトレイト
pub trait FromU32 {
    /// u32値から実装型を生成する
    fn from_u32(src: u32) -> Self;
}

#[cfg(any(target_pointer_width = "32", target_pointer_width = "64"))]
impl FromU32 for usize {
    #[inline(always)]
    fn from_u32(src: u32) -> Self {
        // Since the pointer width is guaranteed to be 32 or 64,
        // the following process always succeeds.
        unsafe { Self::try_from(src).unwrap_unchecked() }
    }
}

/// 対数スコアを確率分布に正規化します。
///
/// 最大値を引いてから指数をとり、総和で割ります。空のスライスは何もしません。
pub fn normalize_log_scores(scores: &mut [f64]) {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return;
    }
    let mut total = 0.0;
    for s in scores.iter_mut() {
        *s = (*s - max).exp();
        total += *s;
    }
    for s in scores.iter_mut() {
        *s /= total;
    }
}

/// ロジスティック関数
#[inline(always)]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
