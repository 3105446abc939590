//! パターン辞書に格納されるエントリ
//!
//! - [`WordEntry`]: 単語とタグ候補、所属辞書、局所分類器
//! - [`ProbTagEntry`]: 部分語の表記と読み候補の確率
//! - [`FeatureVector`]: 窓内の位置ごとの素性値

use rkyv::{Archive, Deserialize, Serialize};

use crate::dictionary::MAX_DICTIONARIES;
use crate::errors::{Result, WakachiError};
use crate::model::linear::LinearModel;
use crate::num::FeatureValue;
use crate::string::TokenString;

/// 単語辞書のエントリ
#[derive(Clone, Debug, Default, Archive, Serialize, Deserialize)]
pub struct WordEntry {
    word: TokenString,

    /// タグレベルごとのタグ候補
    tags: Vec<Vec<TokenString>>,

    /// タグレベルごと、タグ候補ごとの所属辞書のビットマスク
    tag_in_dicts: Vec<Vec<u8>>,

    /// 単語そのものの所属辞書のビットマスク
    in_dict: u8,

    /// タグレベルごとの局所分類器
    tag_models: Vec<Option<LinearModel>>,
}

impl WordEntry {
    /// 新しいエントリを作成します。
    pub fn new(word: TokenString) -> Self {
        Self {
            word,
            ..Default::default()
        }
    }

    /// 単語を返します。
    #[inline(always)]
    pub fn word(&self) -> &TokenString {
        &self.word
    }

    /// 所属辞書のビットマスクを返します。
    #[inline(always)]
    pub const fn in_dict(&self) -> u8 {
        self.in_dict
    }

    /// 辞書 `dict` に所属するかどうかを返します。
    #[inline(always)]
    pub const fn is_in_dict(&self, dict: usize) -> bool {
        dict < MAX_DICTIONARIES && (self.in_dict >> dict) & 1 == 1
    }

    /// 辞書 `dict` に所属させます。
    ///
    /// # エラー
    ///
    /// `dict` が [`MAX_DICTIONARIES`] 以上の場合は [`WakachiError`] を返します。
    pub fn set_in_dict(&mut self, dict: usize) -> Result<()> {
        check_dict_id(dict)?;
        self.in_dict |= 1 << dict;
        Ok(())
    }

    /// タグレベル `level` のタグ候補を返します。
    pub fn tags(&self, level: usize) -> &[TokenString] {
        self.tags.get(level).map_or(&[], Vec::as_slice)
    }

    /// タグ候補 `tag` が辞書 `dict` に所属するかどうかを返します。
    pub fn tag_in_dict(&self, level: usize, tag: usize, dict: usize) -> bool {
        self.tag_in_dicts
            .get(level)
            .and_then(|v| v.get(tag))
            .is_some_and(|&m| dict < MAX_DICTIONARIES && (m >> dict) & 1 == 1)
    }

    /// タグ候補の所属辞書ビットマスクを返します。
    pub fn tag_dict_mask(&self, level: usize, tag: usize) -> u8 {
        self.tag_in_dicts
            .get(level)
            .and_then(|v| v.get(tag))
            .copied()
            .unwrap_or(0)
    }

    /// タグ候補を追加します。
    ///
    /// 既に同じタグがある場合は所属辞書のみを追加します。
    ///
    /// # 戻り値
    ///
    /// タグ候補の添字
    ///
    /// # エラー
    ///
    /// `dict` が [`MAX_DICTIONARIES`] 以上の場合は [`WakachiError`] を返します。
    pub fn add_tag(&mut self, level: usize, tag: TokenString, dict: usize) -> Result<usize> {
        check_dict_id(dict)?;
        self.ensure_level(level);
        let tags = &mut self.tags[level];
        let idx = match tags.iter().position(|t| *t == tag) {
            Some(idx) => idx,
            None => {
                tags.push(tag);
                self.tag_in_dicts[level].push(0);
                tags.len() - 1
            }
        };
        self.tag_in_dicts[level][idx] |= 1 << dict;
        Ok(idx)
    }

    /// タグレベル `level` の局所分類器を返します。
    pub fn tag_model(&self, level: usize) -> Option<&LinearModel> {
        self.tag_models.get(level).and_then(Option::as_ref)
    }

    /// タグレベル `level` の局所分類器を設定します。
    ///
    /// 分類器のラベルはタグ候補の添字です。
    pub fn set_tag_model(&mut self, level: usize, model: LinearModel) {
        self.ensure_level(level);
        self.tag_models[level] = Some(model);
    }

    /// 所属辞書のビットマスクを付けてタグ候補を追加します。
    pub(crate) fn push_tag_with_mask(&mut self, level: usize, tag: TokenString, mask: u8) {
        self.ensure_level(level);
        self.tags[level].push(tag);
        self.tag_in_dicts[level].push(mask);
    }

    /// 所属辞書のビットマスクを設定します。
    pub(crate) fn set_in_dict_mask(&mut self, mask: u8) {
        self.in_dict = mask;
    }

    /// 保持しているタグレベル数を返します。
    pub fn num_levels(&self) -> usize {
        self.tags.len()
    }

    /// 別のエントリの内容を取り込みます。
    ///
    /// 同じ単語が複数の辞書に現れた場合に使います。
    pub fn merge(&mut self, other: Self) {
        self.in_dict |= other.in_dict;
        for (level, (tags, masks)) in other.tags.into_iter().zip(other.tag_in_dicts).enumerate() {
            self.ensure_level(level);
            for (tag, mask) in tags.into_iter().zip(masks) {
                match self.tags[level].iter().position(|t| *t == tag) {
                    Some(idx) => self.tag_in_dicts[level][idx] |= mask,
                    None => {
                        self.tags[level].push(tag);
                        self.tag_in_dicts[level].push(mask);
                    }
                }
            }
        }
        for (level, model) in other.tag_models.into_iter().enumerate() {
            if let Some(model) = model {
                self.set_tag_model(level, model);
            }
        }
    }

    fn ensure_level(&mut self, level: usize) {
        if self.tags.len() <= level {
            self.tags.resize_with(level + 1, Vec::new);
            self.tag_in_dicts.resize_with(level + 1, Vec::new);
        }
        if self.tag_models.len() <= level {
            self.tag_models.resize_with(level + 1, || None);
        }
    }
}

fn check_dict_id(dict: usize) -> Result<()> {
    if dict >= MAX_DICTIONARIES {
        return Err(WakachiError::invalid_argument(
            "dict",
            format!(
                "dictionary id {} exceeds the limit of {} dictionaries",
                dict, MAX_DICTIONARIES
            ),
        ));
    }
    Ok(())
}

/// 部分語の読み候補と対数確率
#[derive(Clone, Debug, Default, PartialEq, Archive, Serialize, Deserialize)]
pub struct ProbTagEntry {
    word: TokenString,
    tags: Vec<TokenString>,
    probs: Vec<f64>,
}

impl ProbTagEntry {
    /// 新しいエントリを作成します。
    pub fn new(word: TokenString) -> Self {
        Self {
            word,
            tags: vec![],
            probs: vec![],
        }
    }

    /// 表記を返します。
    pub fn word(&self) -> &TokenString {
        &self.word
    }

    /// 読み候補を追加します。既にある候補は確率を上書きします。
    pub fn add_tag(&mut self, tag: TokenString, log_prob: f64) {
        match self.tags.iter().position(|t| *t == tag) {
            Some(i) => self.probs[i] = log_prob,
            None => {
                self.tags.push(tag);
                self.probs.push(log_prob);
            }
        }
    }

    /// 読み候補の対数確率を返します。
    pub fn tag_prob(&self, tag: &TokenString) -> Option<f64> {
        self.tags
            .iter()
            .position(|t| t == tag)
            .map(|i| self.probs[i])
    }

    /// 読み候補と対数確率の組を返すイテレータです。
    pub fn iter(&self) -> impl Iterator<Item = (&TokenString, f64)> {
        self.tags.iter().zip(self.probs.iter().copied())
    }

    /// 読み候補の数を返します。
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// 読み候補がないかどうかを返します。
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// 素性値のベクトル
#[derive(Clone, Debug, Default, PartialEq, Archive, Serialize, Deserialize)]
pub struct FeatureVector(pub Vec<FeatureValue>);

impl FeatureVector {
    /// 長さ `len` のゼロベクトルを作成します。
    pub fn zeros(len: usize) -> Self {
        Self(vec![FeatureValue::default(); len])
    }

    /// 値のスライスを返します。
    #[inline(always)]
    pub fn values(&self) -> &[FeatureValue] {
        &self.0
    }
}
