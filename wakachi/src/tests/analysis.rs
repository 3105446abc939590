use std::collections::BTreeSet;
use std::sync::Arc;

use super::*;

use crate::analyzer::FeatureExtractor;
use crate::config::AnalyzerConfig;
use crate::encoding::Utf16Encoder;
use crate::errors::WakachiError;
use crate::model::feature_name::DictRole;
use crate::sentence::{CERTAIN_CONF, Sentence};
use crate::Analyzer;

fn surfaces(sent: &Sentence) -> Vec<String> {
    sent.words().iter().map(|w| w.surface().to_string()).collect()
}

/// 分割とタグ付けの一連の処理のテスト
#[test]
fn test_scenario() {
    let analyzer = Analyzer::new(scenario_model());
    let mut worker = analyzer.new_worker();
    worker.reset_sentence(SCENARIO);
    worker.analyze().unwrap();

    assert_eq!(SCENARIO_WORDS.len(), worker.num_words());
    assert_eq!(SCENARIO_WORDS, surfaces(worker.sentence()).as_slice());
    assert_eq!("代名詞", worker.word(0).tags(0)[0].surface.to_string());
    for word in &worker.words()[1..] {
        assert_eq!("名詞", word.top_tag(0).unwrap().surface.to_string());
    }
    assert_eq!(
        "これ/代名詞 は/名詞 学習/名詞 データ/名詞 で/名詞 す/名詞 。/名詞",
        worker.to_annotated()
    );
}

/// 解析済みの文を再び解析しても結果が変わらないことのテスト
#[test]
fn test_reanalysis_is_idempotent() {
    let analyzer = Analyzer::new(scenario_model());
    let mut sent = analyzer.sentence(SCENARIO);
    analyzer.analyze(&mut sent).unwrap();
    let boundaries = sent.boundaries().to_vec();
    let annotated = sent.to_annotated(1, &Utf16Encoder);

    analyzer.analyze(&mut sent).unwrap();
    assert_eq!(boundaries, sent.boundaries());
    assert_eq!(annotated, sent.to_annotated(1, &Utf16Encoder));
}

/// 注釈付きの入力では、注釈された境界とタグが保たれることのテスト
#[test]
fn test_annotated_input() {
    let analyzer = Analyzer::new(scenario_model());
    let mut worker = analyzer.new_worker();
    worker.reset_annotated("これは/感動詞 学習データです。").unwrap();
    worker.tag(0).unwrap();
    assert_eq!(2, worker.num_words());
    assert_eq!("感動詞", worker.word(0).top_tag(0).unwrap().surface.to_string());
    assert_eq!("名詞", worker.word(1).top_tag(0).unwrap().surface.to_string());

    // Fully annotated boundaries are never recomputed.
    worker.segment().unwrap();
    assert_eq!(2, worker.num_words());
}

/// マージンでは次点のタグのスコアが0になることのテスト
#[test]
fn test_margin_runner_up_is_zero() {
    let analyzer = Analyzer::new(scenario_model())
        .config(AnalyzerConfig::default().max_tags(2));
    let mut sent = analyzer.sentence(SCENARIO);
    analyzer.analyze(&mut sent).unwrap();
    for word in sent.words() {
        let tags = word.tags(0);
        assert_eq!(2, tags.len());
        assert!(tags[0].score > 0.0);
        assert_eq!(0.0, tags[1].score);
        assert!((tags[0].score - 1.0).abs() < 1e-3);
    }
}

/// 確率モードではタグのスコアの総和が1になることのテスト
#[test]
fn test_probabilities_sum_to_one() {
    let analyzer = Analyzer::new(scenario_model())
        .config(AnalyzerConfig::default().probabilistic(true).max_tags(5));
    let mut sent = analyzer.sentence(SCENARIO);
    analyzer.analyze(&mut sent).unwrap();
    assert_eq!(SCENARIO_WORDS, surfaces(&sent).as_slice());
    for &b in sent.boundaries() {
        assert!(b > -1.0 && b < 1.0);
    }
    for word in sent.words() {
        let total: f64 = word.tags(0).iter().map(|t| t.score).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}

/// 大域分類器を使わない設定のテスト
#[test]
fn test_without_global_tagging() {
    let analyzer = Analyzer::new(scenario_model())
        .config(AnalyzerConfig::default().global_tagging(0, false));
    let mut sent = analyzer.sentence(SCENARIO);
    analyzer.analyze(&mut sent).unwrap();
    let words = sent.words();
    assert_eq!(vec![crate::sentence::Tag::new(ts("名詞"), CERTAIN_CONF)], words[2].tags(0));
    // Neither the dictionary nor an estimator knows the other words.
    assert!(words[0].tags(0).is_empty());
}

fn weighted(features: BTreeSet<TokenString>, columns: usize) -> Vec<(TokenString, Vec<f64>)> {
    features
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let w = (0..columns)
                .map(|c| ((i * 37 + c * 11) % 17) as f64 / 4.0 - 2.0)
                .collect();
            (name, w)
        })
        .collect()
}

fn linearity_params() -> ModelParams {
    ModelParams {
        char_window: 2,
        char_n: 2,
        type_window: 2,
        type_n: 2,
        dict_max_len: 2,
        num_levels: 0,
    }
}

/// 参照表による境界スコアが、名前付き素性の重みの和と一致することのテスト
#[test]
fn test_boundary_scores_are_linear() {
    let params = linearity_params();
    let mut builder = ModelBuilder::new(params.clone());
    let d0 = builder.add_dictionary("system").unwrap();
    let d1 = builder.add_dictionary("user").unwrap();
    builder.add_word(d0, ts("学習"), vec![]).unwrap();
    builder.add_word(d0, ts("データ"), vec![]).unwrap();
    builder.add_word(d1, ts("データ"), vec![]).unwrap();
    builder.add_word(d1, ts("は"), vec![]).unwrap();
    let words_only = builder.build().unwrap();

    let sent = Sentence::new(ts(SCENARIO), &Utf16Encoder);
    let extractor = FeatureExtractor::new(&params, 2);
    let features = extractor.all_boundary_features(&sent, words_only.words());
    let mut names: BTreeSet<TokenString> = features.iter().flatten().cloned().collect();
    // A feature that never fires in this sentence.
    names.insert(feature_name::dict(1, DictRole::Inside, 1));

    let model = LinearModel::new(
        SolverKind::Svm,
        vec![-1, 1],
        weighted(names, 1),
        vec![0.25],
    )
    .unwrap();

    let mut builder = ModelBuilder::new(params);
    let d0 = builder.add_dictionary("system").unwrap();
    let d1 = builder.add_dictionary("user").unwrap();
    builder.add_word(d0, ts("学習"), vec![]).unwrap();
    builder.add_word(d0, ts("データ"), vec![]).unwrap();
    builder.add_word(d1, ts("データ"), vec![]).unwrap();
    builder.add_word(d1, ts("は"), vec![]).unwrap();
    builder.boundary_model(model.clone());
    let analyzer = Analyzer::new(builder.build().unwrap());

    let scores = analyzer.boundary_scores(&sent).unwrap();
    assert_eq!(features.len(), scores.len());
    for (f, s) in features.iter().zip(scores) {
        let expected = model.positive_sign() * model.column_scores(f)[0];
        assert!((expected - s).abs() < 1e-2, "{} != {}", expected, s);
    }
}

/// 参照表による大域分類器のスコアが、名前付き素性の重みの和と一致することのテスト
#[test]
fn test_tag_scores_are_linear() {
    let params = ModelParams {
        num_levels: 1,
        ..linearity_params()
    };
    let tags = vec![ts("名詞"), ts("助詞"), ts("助動詞")];

    let mut builder = ModelBuilder::new(params.clone());
    let d0 = builder.add_dictionary("system").unwrap();
    builder
        .add_word(d0, ts("学習"), vec![vec![ts("名詞"), ts("助動詞")]])
        .unwrap();
    builder.add_word(d0, ts("は"), vec![vec![ts("助詞")]]).unwrap();
    let words_only = builder.build().unwrap();

    let sent = Sentence::from_words(
        SCENARIO_WORDS.iter().map(|w| (ts(w), vec![])),
        &Utf16Encoder,
    );
    let extractor = FeatureExtractor::new(&params, 1);
    let features: Vec<Vec<TokenString>> = sent
        .words()
        .iter()
        .map(|w| {
            let entry = words_only.words().and_then(|d| d.find_entry(w.surface()));
            extractor.tag_features(&sent, w.start(), w.end(), entry, 0, &tags)
        })
        .collect();
    let names: BTreeSet<TokenString> = features.iter().flatten().cloned().collect();
    let model = LinearModel::new(
        SolverKind::Logistic,
        vec![0, 1, 2],
        weighted(names, 3),
        vec![0.5, -0.5, 0.0],
    )
    .unwrap();

    let mut builder = ModelBuilder::new(params);
    let d0 = builder.add_dictionary("system").unwrap();
    builder
        .add_word(d0, ts("学習"), vec![vec![ts("名詞"), ts("助動詞")]])
        .unwrap();
    builder.add_word(d0, ts("は"), vec![vec![ts("助詞")]]).unwrap();
    builder.global_model(0, TagModel::new(tags.clone(), model.clone()).unwrap());
    let analyzer = Analyzer::new(builder.build().unwrap())
        .config(AnalyzerConfig::default().probabilistic(true).max_tags(3));

    let mut tagged = sent.clone();
    analyzer.calculate_tags(&mut tagged, 0).unwrap();
    for (word, f) in tagged.words().iter().zip(&features) {
        let mut expected = model.label_scores(f);
        crate::utils::normalize_log_scores(&mut expected);
        for tag in word.tags(0) {
            let label = tags.iter().position(|t| *t == tag.surface).unwrap();
            assert!((expected[label] - tag.score).abs() < 1e-3);
        }
    }
}

/// 単語ごとの局所分類器のテスト
#[test]
fn test_local_tag_model() {
    let params = ModelParams {
        char_window: 1,
        char_n: 1,
        type_window: 1,
        type_n: 1,
        dict_max_len: 2,
        num_levels: 0,
    };
    let mut builder = ModelBuilder::new(params);
    let d = builder.add_dictionary("system").unwrap();
    builder
        .add_word(d, ts("で"), vec![vec![ts("助詞"), ts("助動詞")]])
        .unwrap();
    // Label 1 (助動詞) wins when `す` follows.
    let local = LinearModel::new(
        SolverKind::Logistic,
        vec![1, 0],
        vec![(feature_name::char_ngram(1, ts("す").as_slice()), vec![2.0])],
        vec![-1.0],
    )
    .unwrap();
    builder.tag_model(&ts("で"), 0, local).unwrap();
    let analyzer = Analyzer::new(builder.build().unwrap());

    let mut sent = Sentence::from_words(
        [("で", vec![]), ("す", vec![]), ("で", vec![]), ("ね", vec![])]
            .into_iter()
            .map(|(w, t)| (ts(w), t)),
        &Utf16Encoder,
    );
    analyzer.calculate_tags(&mut sent, 0).unwrap();
    assert_eq!("助動詞", sent.words()[0].tags(0)[0].surface.to_string());
    assert_eq!("助詞", sent.words()[2].tags(0)[0].surface.to_string());
}

/// モデルを複数のスレッドで共有できることのテスト
#[test]
fn test_shared_model_across_threads() {
    let model = Arc::new(scenario_model());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let analyzer = Analyzer::from_shared_model(model.clone());
            std::thread::spawn(move || {
                let mut worker = analyzer.new_worker();
                worker.reset_sentence(SCENARIO);
                worker.analyze().unwrap();
                worker.to_annotated()
            })
        })
        .collect();
    let results: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(results.windows(2).all(|w| w[0] == w[1]));
}

/// 分割モデルがない場合のエラーのテスト
#[test]
fn test_missing_model_is_an_invalid_state() {
    let analyzer = Analyzer::new(
        ModelBuilder::new(ModelParams::default()).build().unwrap(),
    );
    let mut worker = analyzer.new_worker();
    worker.reset_sentence(SCENARIO);
    assert!(matches!(worker.segment(), Err(WakachiError::InvalidState(_))));
}
