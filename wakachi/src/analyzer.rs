//! 単語分割とタグ付けを行う解析器
//!
//! 文字間ごとに線形分類器で境界の有無を判定し、得られた単語ごとに
//! タグレベルの順でタグを推定します。
//!
//! # 例
//!
//! ```
//! use wakachi::{Analyzer, ModelBuilder};
//! use wakachi::model::ModelParams;
//! use wakachi::model::feature_name;
//! use wakachi::model::linear::{LinearModel, SolverKind};
//! use wakachi::TokenString;
//!
//! // Splits after every "b".
//! let params = ModelParams { char_window: 1, char_n: 1, type_window: 1, type_n: 1, ..ModelParams::default() };
//! let model = LinearModel::new(
//!     SolverKind::Logistic,
//!     vec![1, -1],
//!     vec![(feature_name::char_ngram(0, TokenString::from("b").as_slice()), vec![2.0])],
//!     vec![-1.0],
//! )?;
//! let mut builder = ModelBuilder::new(params);
//! builder.boundary_model(model);
//! let analyzer = Analyzer::new(builder.build()?);
//!
//! let mut worker = analyzer.new_worker();
//! worker.reset_sentence("abab");
//! worker.analyze()?;
//! assert_eq!(2, worker.num_words());
//! assert_eq!("ab", worker.word(0).surface().to_string());
//! # Ok::<(), wakachi::errors::WakachiError>(())
//! ```
pub mod features;
pub mod worker;

use std::sync::Arc;

use crate::config::AnalyzerConfig;
use crate::dictionary::WordEntry;
use crate::encoding::{CharEncoder, Utf16Encoder};
use crate::errors::{Result, WakachiError};
use crate::model::lookup::FeatureLookup;
use crate::model::{Model, TagModel};
use crate::num::FeatureSum;
use crate::sentence::{CERTAIN_CONF, Sentence, Tag, Word};
use crate::string::TokenString;
use crate::utils;

pub use crate::analyzer::features::FeatureExtractor;
pub use crate::analyzer::worker::Worker;

/// 単語分割とタグ付けを行う解析器
///
/// モデルは [`Arc`] で共有されるため、複製は安価です。
#[derive(Clone)]
pub struct Analyzer {
    model: Arc<Model>,
    config: AnalyzerConfig,
    encoder: Arc<dyn CharEncoder>,
}

impl Analyzer {
    /// 新しい解析器を作成します。モデルの所有権は解析器に移動します。
    pub fn new(model: Model) -> Self {
        Self::from_shared_model(Arc::new(model))
    }

    /// 共有されたモデルから新しい解析器を作成します。
    ///
    /// # 例
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use wakachi::{Analyzer, Model};
    ///
    /// let model = Arc::new(Model::from_path("path/to/model")?);
    /// let analyzer1 = Analyzer::from_shared_model(model.clone());
    /// let analyzer2 = Analyzer::from_shared_model(model);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_shared_model(model: Arc<Model>) -> Self {
        Self {
            model,
            config: AnalyzerConfig::default(),
            encoder: Arc::new(Utf16Encoder::new()),
        }
    }

    /// 設定を変更します。
    ///
    /// 確率モードが指定されたのにモデルがロジスティック回帰で学習されていない場合は、
    /// 警告を出力したうえでそのまま使います。
    pub fn config(mut self, config: AnalyzerConfig) -> Self {
        if config.is_probabilistic() {
            let svm = self
                .model
                .boundary_model()
                .into_iter()
                .chain((0..self.model.num_levels()).filter_map(|l| {
                    self.model.global_model(l).map(TagModel::model)
                }))
                .any(|m| !m.solver().is_probabilistic());
            if svm {
                log::warn!(
                    "probabilistic output was requested, but the model was not trained with \
                     logistic regression; the scores are not calibrated probabilities"
                );
            }
        }
        self.config = config;
        self
    }

    /// 文字エンコーダを変更します。
    pub fn encoder(mut self, encoder: Arc<dyn CharEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// 設定を返します。
    pub fn get_config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// 文字エンコーダを返します。
    pub fn get_encoder(&self) -> &dyn CharEncoder {
        self.encoder.as_ref()
    }

    /// モデルを返します。
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// 新しいワーカーを作成します。
    pub fn new_worker(&self) -> Worker {
        Worker::new(self.clone())
    }

    /// テキストから未解析の文を作成します。
    pub fn sentence(&self, text: &str) -> Sentence {
        Sentence::new(self.encoder.encode(text), self.encoder.as_ref())
    }

    /// すべての境界の生のスコアを計算します。正のスコアが境界を表します。
    ///
    /// # エラー
    ///
    /// モデルが境界推定の分類器を持たない場合は [`WakachiError`] を返します。
    pub fn boundary_scores(&self, sent: &Sentence) -> Result<Vec<f64>> {
        let lookup = self.model.boundary_lookup().ok_or_else(|| {
            WakachiError::invalid_state(
                "cannot segment the sentence",
                "the model has no boundary classifier",
            )
        })?;
        let params = self.model.params();
        let mut sums: Vec<FeatureSum> = vec![FeatureSum::default(); sent.len().saturating_sub(1)];
        if sums.is_empty() {
            return Ok(vec![]);
        }
        lookup.add_char_scores(sent.norm(), params.char_window, &mut sums);
        lookup.add_type_scores(sent.types(), params.type_window, &mut sums);
        if let Some(words) = self.model.words() {
            lookup.add_dictionary_scores(words, sent.surface(), &mut sums);
        }
        lookup.add_biases(&mut sums);
        Ok(sums.into_iter().map(|s| lookup.score(s)).collect())
    }

    /// 文の境界信頼度を計算し、単語列を組み立て直します。
    ///
    /// 絶対値が閾値を超える信頼度を持つ境界は注釈として扱い、変更しません。
    /// 制約の文字種に含まれる同じ文字種の文字の間は分割しません。
    ///
    /// # エラー
    ///
    /// 空でない文に対して、モデルが境界推定の分類器を持たない場合は
    /// [`WakachiError`] を返します。
    pub fn calculate_boundaries(&self, sent: &mut Sentence) -> Result<()> {
        if sent.is_empty() {
            return Ok(());
        }
        let scores = self.boundary_scores(sent)?;
        let threshold = self.config.get_confidence();
        let constraint = self.config.get_constraint();
        let probabilistic = self.config.is_probabilistic();
        let types = sent.types().clone();
        for (i, (conf, score)) in sent.boundaries_mut().iter_mut().zip(scores).enumerate() {
            if conf.abs() > threshold {
                continue;
            }
            let t = types.get(i);
            *conf = if t == types.get(i + 1) && constraint.iter().any(|c| c == t) {
                -CERTAIN_CONF
            } else if probabilistic {
                2.0 * utils::sigmoid(score) - 1.0
            } else {
                score
            };
        }
        sent.rebuild_words();
        Ok(())
    }

    /// タグレベル `level` のタグを推定します。
    ///
    /// 最良のタグのスコアが閾値を超える単語は注釈として扱い、変更しません。
    ///
    /// # エラー
    ///
    /// `level` がモデルのタグレベル数以上の場合、または大域分類器の参照表が
    /// 構築されていない場合は [`WakachiError`] を返します。
    pub fn calculate_tags(&self, sent: &mut Sentence, level: usize) -> Result<()> {
        if level >= self.model.num_levels() {
            return Err(WakachiError::invalid_argument(
                "level",
                format!(
                    "tag level {} is out of range; the model has {} levels",
                    level,
                    self.model.num_levels()
                ),
            ));
        }
        let global = match self.model.global_model(level) {
            Some(global) if self.config.use_global_tagging(level) => {
                let lookup = self.model.global_lookup(level).ok_or_else(|| {
                    WakachiError::invalid_state(
                        "cannot tag the sentence",
                        format!("the global classifier on level {} is not compiled", level),
                    )
                })?;
                Some((global, lookup))
            }
            _ => None,
        };
        let threshold = self.config.get_confidence();
        for i in 0..sent.words().len() {
            let word = &sent.words()[i];
            if word.top_tag(level).is_some_and(|t| t.score > threshold) {
                continue;
            }
            let tags = self.word_tags(sent, word, level, global);
            sent.words_mut()[i].set_tags(level, tags);
        }
        Ok(())
    }

    /// 境界を推定してから、すべてのタグレベルのタグを推定します。
    ///
    /// # エラー
    ///
    /// 境界推定またはタグ推定に失敗した場合は [`WakachiError`] を返します。
    pub fn analyze(&self, sent: &mut Sentence) -> Result<()> {
        self.calculate_boundaries(sent)?;
        for level in 0..self.model.num_levels() {
            self.calculate_tags(sent, level)?;
        }
        Ok(())
    }

    fn word_tags(
        &self,
        sent: &Sentence,
        word: &Word,
        level: usize,
        global: Option<(&TagModel, &FeatureLookup)>,
    ) -> Vec<Tag> {
        let entry = self.model.words().and_then(|d| d.find_entry(word.surface()));

        if let Some((global, lookup)) = global {
            let scores = self.global_scores(sent, word, entry, level, global, lookup);
            let candidates = scores
                .into_iter()
                .enumerate()
                .filter_map(|(i, s)| global.tag_of_label(i).map(|t| (t.clone(), s)))
                .collect();
            return self.normalize(candidates);
        }

        if let Some(entry) = entry.filter(|e| !e.tags(level).is_empty()) {
            let tags = entry.tags(level);
            let candidates = match entry.tag_model(level) {
                Some(model) if tags.len() > 1 => {
                    let extractor = FeatureExtractor::new(
                        self.model.params(),
                        self.model.dict_names().len(),
                    );
                    let features = extractor.tag_context_features(sent, word.start(), word.end());
                    model
                        .label_scores(&features)
                        .into_iter()
                        .zip(model.labels())
                        .filter_map(|(s, &l)| {
                            let tag = usize::try_from(l).ok().and_then(|l| tags.get(l))?;
                            Some((tag.clone(), s))
                        })
                        .collect()
                }
                _ => tags.iter().map(|t| (t.clone(), 0.0)).collect(),
            };
            return self.normalize(candidates);
        }

        if let Some(estimator) = self.model.unknown(level) {
            let generated = estimator.generate(
                word.surface(),
                self.config.get_max_tags(),
                self.config.get_unk_beam(),
            );
            if !generated.is_empty() {
                return self.normalize(
                    generated
                        .into_iter()
                        .map(|t| (t.surface, t.score.ln()))
                        .collect(),
                );
            }
        }

        match self.config.get_default_tag() {
            Some(tag) => self.normalize(vec![(tag.clone(), 0.0)]),
            None => vec![],
        }
    }

    fn global_scores(
        &self,
        sent: &Sentence,
        word: &Word,
        entry: Option<&WordEntry>,
        level: usize,
        global: &TagModel,
        lookup: &FeatureLookup,
    ) -> Vec<f64> {
        let params = self.model.params();
        let (start, end) = (word.start(), word.end());
        let mut sums = vec![FeatureSum::default(); global.model().num_columns()];
        lookup.add_tag_char_scores(sent.norm(), start, end, params.char_window, &mut sums);
        lookup.add_tag_type_scores(sent.types(), start, end, params.type_window, &mut sums);
        lookup.add_self_weights(word.surface(), &mut sums);
        match entry.filter(|e| e.in_dict() != 0) {
            Some(entry) => {
                let pairs = features::tag_dict_pairs(
                    entry,
                    level,
                    global.tags(),
                    self.model.dict_names().len(),
                );
                lookup.add_tag_dict_weights(&pairs, &mut sums);
            }
            None => lookup.add_tag_unk_weights(&mut sums),
        }
        lookup.add_biases(&mut sums);
        let columns: Vec<f64> = sums.into_iter().map(|s| lookup.score(s)).collect();
        global.model().label_scores_from_columns(&columns)
    }

    /// タグ候補を降順に並べ、スコアを正規化して上位を返します。
    ///
    /// 確率モードではソフトマックスで確率にします。それ以外では次点とのマージンにし、
    /// 候補が1つだけなら [`CERTAIN_CONF`] を与えます。
    fn normalize(&self, mut candidates: Vec<(TokenString, f64)>) -> Vec<Tag> {
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        let mut scores: Vec<f64> = candidates.iter().map(|c| c.1).collect();
        if self.config.is_probabilistic() {
            utils::normalize_log_scores(&mut scores);
        } else if scores.len() == 1 {
            scores[0] = CERTAIN_CONF;
        } else if scores.len() > 1 {
            let second = scores[1];
            for s in &mut scores {
                *s -= second;
            }
        }
        candidates
            .into_iter()
            .zip(scores)
            .take(self.config.get_max_tags())
            .map(|((tag, _), s)| Tag::new(tag, s))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::dictionary::{DictionaryBuilder, ProbTagEntry};
    use crate::lm::LanguageModel;
    use crate::model::feature_name;
    use crate::model::linear::{LinearModel, SolverKind};
    use crate::model::{ModelBuilder, ModelParams};
    use crate::unknown::UnknownEstimator;

    fn ts(s: &str) -> TokenString {
        TokenString::from(s)
    }

    fn params() -> ModelParams {
        ModelParams {
            char_window: 1,
            char_n: 1,
            type_window: 1,
            type_n: 1,
            dict_max_len: 2,
            num_levels: 0,
        }
    }

    /// Splits after every `a`.
    fn split_after_a() -> LinearModel {
        LinearModel::new(
            SolverKind::Logistic,
            vec![1, -1],
            vec![(feature_name::char_ngram(0, ts("a").as_slice()), vec![2.0])],
            vec![-1.0],
        )
        .unwrap()
    }

    #[test]
    fn test_missing_boundary_model() {
        let analyzer = Analyzer::new(ModelBuilder::new(params()).build().unwrap());
        let mut sent = analyzer.sentence("ab");
        assert!(matches!(
            analyzer.calculate_boundaries(&mut sent),
            Err(WakachiError::InvalidState(_))
        ));
        let mut empty = analyzer.sentence("");
        analyzer.calculate_boundaries(&mut empty).unwrap();
    }

    #[test]
    fn test_boundaries_and_annotations() {
        let mut builder = ModelBuilder::new(params());
        builder.boundary_model(split_after_a());
        let analyzer = Analyzer::new(builder.build().unwrap());

        let mut sent = analyzer.sentence("abab");
        analyzer.calculate_boundaries(&mut sent).unwrap();
        let b = sent.boundaries().to_vec();
        assert!(b[0] > 0.0 && b[1] < 0.0 && b[2] > 0.0);
        assert!((b[0] - 1.0).abs() < 1e-3);

        // An annotated boundary survives re-analysis.
        let mut sent = analyzer.sentence("abab");
        sent.boundaries_mut()[1] = CERTAIN_CONF;
        analyzer.calculate_boundaries(&mut sent).unwrap();
        assert_eq!(4, sent.words().len());
    }

    #[test]
    fn test_probabilistic_boundaries() {
        let mut builder = ModelBuilder::new(params());
        builder.boundary_model(split_after_a());
        let analyzer = Analyzer::new(builder.build().unwrap())
            .config(AnalyzerConfig::default().probabilistic(true));
        let mut sent = analyzer.sentence("ab");
        analyzer.calculate_boundaries(&mut sent).unwrap();
        let expected = 2.0 * utils::sigmoid(1.0) - 1.0;
        assert!((sent.boundaries()[0] - expected).abs() < 1e-3);
    }

    #[test]
    fn test_constraint() {
        let mut builder = ModelBuilder::new(params());
        builder.boundary_model(split_after_a());
        let roman = TokenString::from_char(crate::encoding::CharType::Roman.code());
        let analyzer = Analyzer::new(builder.build().unwrap())
            .config(AnalyzerConfig::default().constraint(roman));
        let mut sent = analyzer.sentence("abab");
        analyzer.calculate_boundaries(&mut sent).unwrap();
        assert_eq!(1, sent.words().len());
        assert!(sent.boundaries().iter().all(|&b| b == -CERTAIN_CONF));
    }

    fn tagging_model() -> Model {
        let mut builder = ModelBuilder::new(params());
        builder.boundary_model(split_after_a());
        let d = builder.add_dictionary("main").unwrap();
        builder
            .add_word(d, ts("ab"), vec![vec![ts("名詞")]])
            .unwrap();
        builder
            .add_word(d, ts("ba"), vec![vec![ts("動詞"), ts("名詞"), ts("助詞")]])
            .unwrap();
        let mut map = std::collections::BTreeMap::new();
        let mut c = ProbTagEntry::new(ts("c"));
        c.add_tag(ts("し"), 0.0);
        map.insert(ts("c"), c);
        let lm = LanguageModel::train(1, &[ts("し")]).unwrap();
        let subwords: DictionaryBuilder<ProbTagEntry> = map.into_iter().collect();
        builder.unknown_estimator(0, UnknownEstimator::new(subwords.build().unwrap(), lm));
        builder.build().unwrap()
    }

    #[test]
    fn test_dictionary_tags() {
        let analyzer = Analyzer::new(tagging_model());
        let mut sent = Sentence::from_words(
            vec![(ts("ab"), vec![]), (ts("ba"), vec![]), (ts("c"), vec![]), (ts("d"), vec![])],
            &Utf16Encoder,
        );
        analyzer.calculate_tags(&mut sent, 0).unwrap();
        let words = sent.words();
        assert_eq!(vec![Tag::new(ts("名詞"), CERTAIN_CONF)], words[0].tags(0));
        // Candidates without a classifier tie.
        assert_eq!(3, words[1].tags(0).len());
        assert!(words[1].tags(0).iter().all(|t| t.score == 0.0));
        // Unknown words go through the estimator.
        assert_eq!(vec![Tag::new(ts("し"), CERTAIN_CONF)], words[2].tags(0));
        // No sub-word covers `d` and there is no default tag.
        assert!(words[3].tags(0).is_empty());
    }

    #[test]
    fn test_default_tag_and_max_tags() {
        let analyzer = Analyzer::new(tagging_model()).config(
            AnalyzerConfig::default()
                .max_tags(2)
                .probabilistic(true)
                .default_tag(Some(ts("未知語"))),
        );
        let mut sent = Sentence::from_words(
            vec![(ts("ba"), vec![]), (ts("d"), vec![])],
            &Utf16Encoder,
        );
        analyzer.calculate_tags(&mut sent, 0).unwrap();
        let words = sent.words();
        assert_eq!(2, words[0].tags(0).len());
        assert!((words[0].tags(0)[0].score - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(vec![Tag::new(ts("未知語"), 1.0)], words[1].tags(0));
    }

    #[test]
    fn test_level_out_of_range() {
        let analyzer = Analyzer::new(tagging_model());
        let mut sent = analyzer.sentence("ab");
        assert!(analyzer.calculate_tags(&mut sent, 1).is_err());
    }

    #[test]
    fn test_uncompiled_global_classifier() {
        let global = LinearModel::new(
            SolverKind::Logistic,
            vec![1, 0],
            vec![(feature_name::self_word(&ts("ab")), vec![1.0])],
            vec![0.0],
        )
        .unwrap();
        let params = ModelParams {
            num_levels: 1,
            ..params()
        };
        let model = Model::from_text_parts(
            params,
            vec![],
            None,
            None,
            vec![Some(TagModel::new(vec![ts("名詞"), ts("動詞")], global).unwrap())],
            vec![None],
        );
        let mut sent = Sentence::from_words(vec![(ts("ab"), vec![])], &Utf16Encoder);

        let analyzer = Analyzer::new(model.clone());
        assert!(matches!(
            analyzer.calculate_tags(&mut sent, 0),
            Err(WakachiError::InvalidState(_))
        ));

        // Without the global classifier the lookup is not needed.
        let analyzer = Analyzer::new(model).config(
            AnalyzerConfig::default()
                .global_tagging(0, false)
                .default_tag(Some(ts("未知語"))),
        );
        analyzer.calculate_tags(&mut sent, 0).unwrap();
        assert_eq!("未知語", sent.words()[0].tags(0)[0].surface.to_string());
    }

    #[test]
    fn test_annotated_tags_are_kept() {
        let analyzer = Analyzer::new(tagging_model());
        let mut sent = Sentence::from_words(
            vec![(ts("ab"), vec![vec![ts("固有名詞")]])],
            &Utf16Encoder,
        );
        analyzer.calculate_tags(&mut sent, 0).unwrap();
        assert_eq!("固有名詞", sent.words()[0].tags(0)[0].surface.to_string());
    }
}
