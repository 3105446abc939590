//! 素性値の参照表
//!
//! 学習済みの [`LinearModel`] の重みを、解析時に素性名を作らずに加算できる形へ
//! 変換したものです。n-gram 素性は n-gram をキーとするパターン辞書にまとめられ、
//! 1回の照合で窓内のすべての位置への寄与が得られます。
//!
//! 重みは [`num`](crate::num) の固定小数点値に量子化され、
//! 表ごとに1つの倍率で実数に戻されます。

use std::collections::BTreeMap;

use rkyv::{Archive, Deserialize, Serialize};

use crate::dictionary::{FeatureVector, PatternDictionary, WordEntry};
use crate::errors::{Result, WakachiError};
use crate::model::ModelParams;
use crate::model::feature_name::{self, DictRole, FeatureName};
use crate::model::linear::LinearModel;
use crate::num::{self, FeatureSum, FeatureValue};
use crate::string::TokenString;

/// 参照表の構築中に、配置できた素性の数を数えます。
///
/// すべての素性が配置されなければ、モデルと素性名の形式が食い違っています。
#[derive(Debug, Default)]
pub struct CompileContext {
    consumed: usize,
}

impl CompileContext {
    /// 新しいコンテキストを作成します。
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    fn consume(&mut self) {
        self.consumed += 1;
    }

    /// 配置できた素性の数を返します。
    pub const fn consumed(&self) -> usize {
        self.consumed
    }

    /// すべての素性が配置されたことを確認します。
    ///
    /// # エラー
    ///
    /// 配置できた素性の数がモデルの素性数と異なる場合は [`WakachiError`] を返します。
    pub fn finish(self, model: &LinearModel) -> Result<()> {
        if self.consumed != model.num_features() {
            return Err(WakachiError::invalid_state(
                "failed to place every feature into the lookup table",
                format!(
                    "{} of {} features were consumed",
                    self.consumed,
                    model.num_features()
                ),
            ));
        }
        Ok(())
    }
}

/// 量子化済みの素性値の参照表
#[derive(Clone, Debug, Default, Archive, Serialize, Deserialize)]
pub struct FeatureLookup {
    char_dict: Option<PatternDictionary<FeatureVector>>,
    type_dict: Option<PatternDictionary<FeatureVector>>,
    self_dict: Option<PatternDictionary<FeatureVector>>,
    dict_vector: Vec<FeatureValue>,
    biases: Vec<FeatureValue>,
    tag_dict_vector: Vec<FeatureValue>,
    tag_unk_vector: Vec<FeatureValue>,
    num_dicts: usize,
    dict_max_len: usize,
    num_tags: usize,
    multiplier: f64,
}

fn build_vectors(
    map: BTreeMap<TokenString, Vec<f64>>,
    multiplier: f64,
) -> Result<Option<PatternDictionary<FeatureVector>>> {
    if map.is_empty() {
        return Ok(None);
    }
    let map = map
        .into_iter()
        .map(|(k, v)| {
            let values = v.into_iter().map(|w| num::quantize(w, multiplier)).collect();
            (k, FeatureVector(values))
        })
        .collect();
    PatternDictionary::from_map(map).map(Some)
}

fn quantize_all(weights: &[f64], multiplier: f64) -> Vec<FeatureValue> {
    weights.iter().map(|&w| num::quantize(w, multiplier)).collect()
}

#[inline(always)]
fn add_vector(dst: &mut [FeatureSum], src: &[FeatureValue]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d += num::widen(s);
    }
}

impl FeatureLookup {
    /// 境界推定用の分類器から参照表を構築します。
    ///
    /// 文字・文字種 n-gram 素性と辞書素性を配置します。
    /// 正のスコアが境界を表すように符号を揃えます。
    ///
    /// # 引数
    ///
    /// * `model` - 2クラスの線形分類器
    /// * `params` - 素性の窓幅と次数
    /// * `num_dicts` - 辞書の数
    ///
    /// # エラー
    ///
    /// 分類器が2クラスでない場合、または配置できない素性がある場合は
    /// [`WakachiError`] を返します。
    pub fn for_boundaries(
        model: &LinearModel,
        params: &ModelParams,
        num_dicts: usize,
    ) -> Result<Self> {
        if model.num_columns() != 1 {
            return Err(WakachiError::invalid_state(
                "cannot compile the boundary model",
                "the boundary model must have exactly two labels",
            ));
        }
        let sign = model.positive_sign();
        let multiplier = num::multiplier_for(model.abs_max());
        let char_len = 2 * params.char_window;
        let type_len = 2 * params.type_window;
        let max_len = params.dict_max_len;

        let mut ctx = CompileContext::new();
        let mut chars = BTreeMap::new();
        let mut types = BTreeMap::new();
        let mut dict_vector = vec![0.0; num_dicts * DictRole::COUNT * max_len];
        for (name, w) in model.features() {
            let w = sign * w[0];
            match feature_name::parse(name) {
                Some(FeatureName::CharNgram { offset, gram })
                    if gram.len() <= params.char_n && offset + gram.len() <= char_len =>
                {
                    let slot = char_len - gram.len() - offset;
                    chars.entry(gram).or_insert_with(|| vec![0.0; char_len])[slot] = w;
                    ctx.consume();
                }
                Some(FeatureName::TypeNgram { offset, gram })
                    if gram.len() <= params.type_n && offset + gram.len() <= type_len =>
                {
                    let slot = type_len - gram.len() - offset;
                    types.entry(gram).or_insert_with(|| vec![0.0; type_len])[slot] = w;
                    ctx.consume();
                }
                Some(FeatureName::Dict { dict, role, len }) if dict < num_dicts && len <= max_len => {
                    dict_vector[(dict * DictRole::COUNT + role.index()) * max_len + len - 1] = w;
                    ctx.consume();
                }
                _ => log::warn!("unplaceable boundary feature: {}", name),
            }
        }
        ctx.finish(model)?;

        let lookup = Self {
            char_dict: build_vectors(chars, multiplier)?,
            type_dict: build_vectors(types, multiplier)?,
            self_dict: None,
            dict_vector: quantize_all(&dict_vector, multiplier),
            biases: vec![num::quantize(sign * model.biases()[0], multiplier)],
            tag_dict_vector: vec![],
            tag_unk_vector: vec![],
            num_dicts,
            dict_max_len: max_len,
            num_tags: 0,
            multiplier,
        };
        log::debug!(
            "compiled {} boundary features with multiplier {}",
            model.num_features(),
            multiplier
        );
        Ok(lookup)
    }

    /// タグ付け用の大域分類器から参照表を構築します。
    ///
    /// 単語の左右の文脈の n-gram 素性、単語素性、タグ辞書素性、未知語素性を配置します。
    ///
    /// # 引数
    ///
    /// * `model` - 線形分類器。ラベルはタグ番号です。
    /// * `params` - 素性の窓幅と次数
    /// * `num_dicts` - 辞書の数
    /// * `num_tags` - タグの数
    ///
    /// # エラー
    ///
    /// 配置できない素性がある場合は [`WakachiError`] を返します。
    pub fn for_tags(
        model: &LinearModel,
        params: &ModelParams,
        num_dicts: usize,
        num_tags: usize,
    ) -> Result<Self> {
        let k = model.num_columns();
        let multiplier = num::multiplier_for(model.abs_max());
        let char_len = 2 * params.char_window;
        let type_len = 2 * params.type_window;

        let mut ctx = CompileContext::new();
        let mut chars = BTreeMap::new();
        let mut types = BTreeMap::new();
        let mut selves = BTreeMap::new();
        let mut tag_dict_vector = vec![0.0; num_dicts * num_tags * k];
        let mut tag_unk_vector = vec![0.0; k];
        for (name, w) in model.features() {
            match feature_name::parse(name) {
                Some(FeatureName::CharNgram { offset, gram })
                    if gram.len() <= params.char_n && offset + gram.len() <= char_len =>
                {
                    let v = chars.entry(gram).or_insert_with(|| vec![0.0; char_len * k]);
                    v[offset * k..(offset + 1) * k].copy_from_slice(w);
                    ctx.consume();
                }
                Some(FeatureName::TypeNgram { offset, gram })
                    if gram.len() <= params.type_n && offset + gram.len() <= type_len =>
                {
                    let v = types.entry(gram).or_insert_with(|| vec![0.0; type_len * k]);
                    v[offset * k..(offset + 1) * k].copy_from_slice(w);
                    ctx.consume();
                }
                Some(FeatureName::SelfWord(word)) => {
                    selves.insert(word, w.to_vec());
                    ctx.consume();
                }
                Some(FeatureName::TagDict { dict, tag }) if dict < num_dicts && tag < num_tags => {
                    let base = (dict * num_tags + tag) * k;
                    tag_dict_vector[base..base + k].copy_from_slice(w);
                    ctx.consume();
                }
                Some(FeatureName::Unknown) => {
                    tag_unk_vector.copy_from_slice(w);
                    ctx.consume();
                }
                _ => log::warn!("unplaceable tag feature: {}", name),
            }
        }
        ctx.finish(model)?;

        Ok(Self {
            char_dict: build_vectors(chars, multiplier)?,
            type_dict: build_vectors(types, multiplier)?,
            self_dict: build_vectors(selves, multiplier)?,
            dict_vector: vec![],
            biases: quantize_all(model.biases(), multiplier),
            tag_dict_vector: quantize_all(&tag_dict_vector, multiplier),
            tag_unk_vector: quantize_all(&tag_unk_vector, multiplier),
            num_dicts,
            dict_max_len: 0,
            num_tags,
            multiplier,
        })
    }

    /// n-gram の照合結果を、窓内のすべての境界に加算します。
    ///
    /// 長さ `g` の n-gram が位置 `e` で終わるとき、ベクトルの `d` 番目の値は
    /// 境界 `e - window + d` に加算されます。範囲外の境界は無視されます。
    ///
    /// # 引数
    ///
    /// * `dict` - n-gram をキーとする辞書
    /// * `text` - 照合する文字列
    /// * `window` - 窓幅
    /// * `scores` - 境界ごとのスコア。長さは `text.len() - 1` です。
    pub fn add_ngram_scores(
        dict: &PatternDictionary<FeatureVector>,
        text: &TokenString,
        window: usize,
        scores: &mut [FeatureSum],
    ) {
        for m in dict.matches(text) {
            let values = dict.entry(m.entry).values();
            for (d, &v) in values.iter().enumerate() {
                let Some(b) = (m.end + d).checked_sub(window) else {
                    continue;
                };
                if b >= scores.len() {
                    break;
                }
                scores[b] += num::widen(v);
            }
        }
    }

    /// 単語の左右の文脈に現れる n-gram の寄与をクラスごとに加算します。
    ///
    /// 左の文脈は `[start - window, start)`、右の文脈は `[end, end + window)` で、
    /// 文の範囲で切り詰められます。n-gram は文脈の内側に完全に収まるものだけが数えられます。
    ///
    /// # 引数
    ///
    /// * `dict` - n-gram をキーとする辞書
    /// * `text` - 文全体の文字列
    /// * `start` - 単語の開始位置
    /// * `end` - 単語の終了位置（この位置を含まない）
    /// * `window` - 窓幅
    /// * `scores` - クラスごとのスコア
    pub fn add_tag_ngrams(
        dict: &PatternDictionary<FeatureVector>,
        text: &TokenString,
        start: usize,
        end: usize,
        window: usize,
        scores: &mut [FeatureSum],
    ) {
        let k = scores.len();
        let lo = start.saturating_sub(window);
        if lo < start {
            let context = text.substring(lo, start - lo);
            for m in dict.matches(&context) {
                let g = dict.key(m.entry).len();
                let offset = lo + m.end + 1 - g + window - start;
                add_vector(scores, &dict.entry(m.entry).values()[offset * k..(offset + 1) * k]);
            }
        }
        let hi = (end + window).min(text.len());
        if end < hi {
            let context = text.substring(end, hi - end);
            for m in dict.matches(&context) {
                let g = dict.key(m.entry).len();
                let offset = window + m.end + 1 - g;
                add_vector(scores, &dict.entry(m.entry).values()[offset * k..(offset + 1) * k]);
            }
        }
    }

    /// 文字 n-gram の寄与を境界ごとに加算します。
    pub fn add_char_scores(&self, text: &TokenString, window: usize, scores: &mut [FeatureSum]) {
        if let Some(dict) = &self.char_dict {
            Self::add_ngram_scores(dict, text, window, scores);
        }
    }

    /// 文字種 n-gram の寄与を境界ごとに加算します。
    pub fn add_type_scores(&self, types: &TokenString, window: usize, scores: &mut [FeatureSum]) {
        if let Some(dict) = &self.type_dict {
            Self::add_ngram_scores(dict, types, window, scores);
        }
    }

    /// 単語の文脈の文字 n-gram の寄与をクラスごとに加算します。
    pub fn add_tag_char_scores(
        &self,
        text: &TokenString,
        start: usize,
        end: usize,
        window: usize,
        scores: &mut [FeatureSum],
    ) {
        if let Some(dict) = &self.char_dict {
            Self::add_tag_ngrams(dict, text, start, end, window, scores);
        }
    }

    /// 単語の文脈の文字種 n-gram の寄与をクラスごとに加算します。
    pub fn add_tag_type_scores(
        &self,
        types: &TokenString,
        start: usize,
        end: usize,
        window: usize,
        scores: &mut [FeatureSum],
    ) {
        if let Some(dict) = &self.type_dict {
            Self::add_tag_ngrams(dict, types, start, end, window, scores);
        }
    }

    /// 辞書素性の寄与を境界ごとに加算します。
    ///
    /// 境界・辞書・役割・長さの組ごとに発火の有無を記録してから重みを加算するため、
    /// 同じ組が複数の単語から発火しても一度しか数えられません。
    ///
    /// # 引数
    ///
    /// * `words` - 単語辞書
    /// * `text` - 照合する文字列
    /// * `scores` - 境界ごとのスコア
    pub fn add_dictionary_scores(
        &self,
        words: &PatternDictionary<WordEntry>,
        text: &TokenString,
        scores: &mut [FeatureSum],
    ) {
        let width = self.dict_vector.len();
        if width == 0 || scores.is_empty() {
            return;
        }
        let max_len = self.dict_max_len;
        let slot = |dict: usize, role: DictRole, bucket: usize| {
            (dict * DictRole::COUNT + role.index()) * max_len + bucket - 1
        };
        let mut on = vec![false; scores.len() * width];
        for m in words.matches(text) {
            let entry = words.entry(m.entry);
            let len = entry.word().len();
            let bucket = len.min(max_len);
            let (start, end) = (m.end + 1 - len, m.end);
            for dict in (0..self.num_dicts).filter(|&d| entry.is_in_dict(d)) {
                if start > 0 {
                    on[(start - 1) * width + slot(dict, DictRole::Left, bucket)] = true;
                }
                if end < scores.len() {
                    on[end * width + slot(dict, DictRole::Right, bucket)] = true;
                }
                for i in start..end {
                    on[i * width + slot(dict, DictRole::Inside, bucket)] = true;
                }
            }
        }
        for (score, row) in scores.iter_mut().zip(on.chunks_exact(width)) {
            for (&fired, &v) in row.iter().zip(&self.dict_vector) {
                if fired {
                    *score += num::widen(v);
                }
            }
        }
    }

    /// バイアスを加算します。
    ///
    /// 境界推定では各境界に、タグ付けでは各クラスにそのクラスのバイアスを加算します。
    pub fn add_biases(&self, scores: &mut [FeatureSum]) {
        if self.biases.is_empty() {
            return;
        }
        for (i, s) in scores.iter_mut().enumerate() {
            *s += num::widen(self.biases[i % self.biases.len()]);
        }
    }

    /// 単語素性の寄与をクラスごとに加算します。
    pub fn add_self_weights(&self, word: &TokenString, scores: &mut [FeatureSum]) {
        if let Some(v) = self.self_dict.as_ref().and_then(|d| d.find_entry(word)) {
            add_vector(scores, v.values());
        }
    }

    /// タグ辞書素性の寄与をクラスごとに加算します。
    ///
    /// # 引数
    ///
    /// * `pairs` - 単語のタグ候補が所属する辞書番号とタグ番号の組
    /// * `scores` - クラスごとのスコア
    pub fn add_tag_dict_weights(&self, pairs: &[(usize, usize)], scores: &mut [FeatureSum]) {
        let k = scores.len();
        for &(dict, tag) in pairs {
            if dict < self.num_dicts && tag < self.num_tags {
                let base = (dict * self.num_tags + tag) * k;
                add_vector(scores, &self.tag_dict_vector[base..base + k]);
            }
        }
    }

    /// 未知語素性の寄与をクラスごとに加算します。
    pub fn add_tag_unk_weights(&self, scores: &mut [FeatureSum]) {
        add_vector(scores, &self.tag_unk_vector);
    }

    /// 累積値を実数のスコアに戻します。
    #[inline(always)]
    pub fn score(&self, sum: FeatureSum) -> f64 {
        num::dequantize(sum, self.multiplier)
    }

    /// 倍率を返します。
    pub const fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// 文字 n-gram の辞書を返します。
    pub fn char_dict(&self) -> Option<&PatternDictionary<FeatureVector>> {
        self.char_dict.as_ref()
    }

    /// 文字種 n-gram の辞書を返します。
    pub fn type_dict(&self) -> Option<&PatternDictionary<FeatureVector>> {
        self.type_dict.as_ref()
    }
}
