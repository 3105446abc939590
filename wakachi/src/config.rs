//! 解析器の実行時設定
//!
//! 素性の窓幅や次数といったモデルの形は [`ModelParams`](crate::model::ModelParams)
//! が保持します。ここでは同じモデルに対して解析ごとに変えられる値だけを扱います。

use crate::string::TokenString;

/// 未知語推定のビーム幅の既定値
pub const DEFAULT_UNK_BEAM: usize = 50;

/// 出力するタグ候補数の既定値
pub const DEFAULT_MAX_TAGS: usize = 3;

/// 解析器の設定
///
/// # 例
///
/// ```
/// use wakachi::AnalyzerConfig;
///
/// let config = AnalyzerConfig::default()
///     .confidence(0.5)
///     .max_tags(1)
///     .probabilistic(true);
/// assert_eq!(1, config.get_max_tags());
/// ```
#[derive(Clone, Debug)]
pub struct AnalyzerConfig {
    confidence: f64,
    unk_beam: usize,
    max_tags: usize,
    probabilistic: bool,
    constraint: TokenString,
    default_tag: Option<TokenString>,
    global_tagging: Vec<bool>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            confidence: 0.0,
            unk_beam: DEFAULT_UNK_BEAM,
            max_tags: DEFAULT_MAX_TAGS,
            probabilistic: false,
            constraint: TokenString::default(),
            default_tag: None,
            global_tagging: vec![],
        }
    }
}

impl AnalyzerConfig {
    /// 確定済みとみなす信頼度の閾値を設定します。
    ///
    /// 絶対値がこの値を超える境界信頼度と、スコアがこの値を超える最良タグは
    /// 再計算されません。
    pub const fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// 未知語推定のビーム幅を設定します。0 は 1 として扱います。
    pub const fn unk_beam(mut self, unk_beam: usize) -> Self {
        self.unk_beam = if unk_beam == 0 { 1 } else { unk_beam };
        self
    }

    /// 出力するタグ候補の最大数を設定します。0 は 1 として扱います。
    pub const fn max_tags(mut self, max_tags: usize) -> Self {
        self.max_tags = if max_tags == 0 { 1 } else { max_tags };
        self
    }

    /// 確率を出力するかどうかを設定します。
    ///
    /// 有効にすると境界信頼度はロジスティック関数で `[-1, 1]` に写され、
    /// タグのスコアは総和が1の確率になります。無効のときタグのスコアは次点とのマージンです。
    pub const fn probabilistic(mut self, yes: bool) -> Self {
        self.probabilistic = yes;
        self
    }

    /// 分割を禁止する文字種の集合を設定します。
    ///
    /// 同じ文字種が連続し、その文字種コードが `types` に含まれる位置では分割しません。
    /// 例えば `"D"` は数字列を分割しません。
    pub fn constraint(mut self, types: TokenString) -> Self {
        self.constraint = types;
        self
    }

    /// 候補が得られなかった単語に付与するタグを設定します。
    pub fn default_tag(mut self, tag: Option<TokenString>) -> Self {
        self.default_tag = tag;
        self
    }

    /// タグレベル `level` で大域分類器を使うかどうかを設定します。
    ///
    /// 未設定のレベルでは、モデルが大域分類器を持っていれば使います。
    pub fn global_tagging(mut self, level: usize, yes: bool) -> Self {
        if self.global_tagging.len() <= level {
            self.global_tagging.resize(level + 1, true);
        }
        self.global_tagging[level] = yes;
        self
    }

    /// 信頼度の閾値を返します。
    #[inline(always)]
    pub const fn get_confidence(&self) -> f64 {
        self.confidence
    }

    /// 未知語推定のビーム幅を返します。
    #[inline(always)]
    pub const fn get_unk_beam(&self) -> usize {
        self.unk_beam
    }

    /// タグ候補の最大数を返します。
    #[inline(always)]
    pub const fn get_max_tags(&self) -> usize {
        self.max_tags
    }

    /// 確率を出力するかどうかを返します。
    #[inline(always)]
    pub const fn is_probabilistic(&self) -> bool {
        self.probabilistic
    }

    /// 分割を禁止する文字種の集合を返します。
    #[inline(always)]
    pub fn get_constraint(&self) -> &TokenString {
        &self.constraint
    }

    /// 既定のタグを返します。
    #[inline(always)]
    pub fn get_default_tag(&self) -> Option<&TokenString> {
        self.default_tag.as_ref()
    }

    /// タグレベル `level` で大域分類器を使うかどうかを返します。
    pub fn use_global_tagging(&self, level: usize) -> bool {
        self.global_tagging.get(level).copied().unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalyzerConfig::default();
        assert_eq!(0.0, config.get_confidence());
        assert_eq!(DEFAULT_UNK_BEAM, config.get_unk_beam());
        assert_eq!(DEFAULT_MAX_TAGS, config.get_max_tags());
        assert!(config.use_global_tagging(3));
        assert!(config.get_default_tag().is_none());
    }

    #[test]
    fn test_global_tagging_per_level() {
        let config = AnalyzerConfig::default().global_tagging(1, false);
        assert!(config.use_global_tagging(0));
        assert!(!config.use_global_tagging(1));
        assert!(config.use_global_tagging(2));
    }

    #[test]
    fn test_zero_clamps() {
        let config = AnalyzerConfig::default().max_tags(0).unk_beam(0);
        assert_eq!(1, config.get_max_tags());
        assert_eq!(1, config.get_unk_beam());
    }
}
