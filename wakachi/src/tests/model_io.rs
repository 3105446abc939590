use std::fs::File;
use std::io::{BufReader, BufWriter};

use tempfile::tempdir;

use super::*;

use crate::errors::WakachiError;
use crate::unknown::UnknownTrainer;
use crate::Analyzer;

fn analyze(model: Model) -> String {
    let analyzer = Analyzer::new(model);
    let mut worker = analyzer.new_worker();
    worker.reset_sentence(SCENARIO);
    worker.analyze().unwrap();
    worker.to_annotated()
}

fn model_with_estimator() -> Model {
    let mut model = scenario_model();
    let mut trainer = UnknownTrainer::new(2);
    trainer.add_reading(ts("学"), ts("がく"));
    trainer.add_reading(ts("習"), ts("しゅう"));
    trainer.add_pair(ts("学習"), ts("がくしゅう"));
    trainer.add_pair(ts("学"), ts("がく"));
    model.set_unknown(1, Some(trainer.train().unwrap()));
    model
}

/// テキスト形式の書き出しと読み込みのテスト
#[test]
fn test_text_round_trip() {
    let model = model_with_estimator();
    let mut text = vec![];
    model.write_text(&mut text).unwrap();

    let read = Model::read_text(text.as_slice()).unwrap();
    assert_eq!(2, read.num_levels());
    assert_eq!(model.dict_names(), read.dict_names());
    assert_eq!(model.boundary_model(), read.boundary_model());

    let mut again = vec![];
    read.write_text(&mut again).unwrap();
    assert_eq!(String::from_utf8(text).unwrap(), String::from_utf8(again).unwrap());

    assert_eq!(analyze(model), analyze(read));
}

/// バイナリ形式の書き出しと読み込みのテスト
#[test]
fn test_binary_round_trip() {
    let model = model_with_estimator();
    let expected = analyze(model.clone());

    let dir = tempdir().unwrap();
    let path = dir.path().join("model.bin");
    model.write(BufWriter::new(File::create(&path).unwrap())).unwrap();

    let mapped = Model::from_path(&path).unwrap();
    assert!(mapped.boundary_lookup().is_some());
    assert!(mapped.unknown(1).is_some());
    assert_eq!(expected, analyze(mapped));

    let read = Model::read(BufReader::new(File::open(&path).unwrap())).unwrap();
    assert_eq!(expected, analyze(read));

    let zstd_path = dir.path().join("model.bin.zst");
    let mut encoder = zstd::Encoder::new(File::create(&zstd_path).unwrap(), 3).unwrap();
    model.write(&mut encoder).unwrap();
    encoder.finish().unwrap();
    assert_eq!(expected, analyze(Model::from_zstd(&zstd_path).unwrap()));
}

/// 形式を判別する読み込みのテスト
#[test]
fn test_open_detects_format() {
    let model = model_with_estimator();
    let expected = analyze(model.clone());
    let dir = tempdir().unwrap();

    let bin = dir.path().join("model.bin");
    model.write(File::create(&bin).unwrap()).unwrap();
    let text = dir.path().join("model.txt");
    model.write_text(File::create(&text).unwrap()).unwrap();
    let zst = dir.path().join("model.zst");
    let mut encoder = zstd::Encoder::new(File::create(&zst).unwrap(), 3).unwrap();
    model.write(&mut encoder).unwrap();
    encoder.finish().unwrap();

    for path in [bin, text, zst] {
        assert_eq!(expected, analyze(Model::open(&path).unwrap()));
    }
}

/// 壊れたモデルの読み込みのテスト
#[test]
fn test_broken_models() {
    assert!(matches!(
        Model::read(&[b'x'; 64][..]),
        Err(WakachiError::InvalidArgument(_))
    ));
    assert!(Model::read(&b"WakachiModel"[..]).is_err());

    let mut text = vec![];
    scenario_model().write_text(&mut text).unwrap();
    let text = String::from_utf8(text).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    let truncated = lines[..lines.len() / 2].join("\n");
    assert!(matches!(
        Model::read_text(truncated.as_bytes()),
        Err(WakachiError::InvalidFormat(_))
    ));
    assert!(Model::read_text("WakachiModel text 9.9\n".as_bytes()).is_err());

    // More dictionaries than the masks can hold.
    let names: String = (0..9).map(|i| format!("dict{}\n", i)).collect();
    let too_many = text.replacen("dicts 1\nsystem\n", &format!("dicts 9\n{}", names), 1);
    assert_ne!(text, too_many);
    assert!(matches!(
        Model::read_text(too_many.as_bytes()),
        Err(WakachiError::InvalidFormat(_))
    ));

    // The model flag of a tag list is either 0 or 1.
    let bad_flag = text.replacen("\ntags 1 0\n", "\ntags 1 x\n", 1);
    assert_ne!(text, bad_flag);
    assert!(matches!(
        Model::read_text(bad_flag.as_bytes()),
        Err(WakachiError::InvalidFormat(_))
    ));
    let bad_flag = text.replacen("\ntags 1 0\n", "\ntags 1 2\n", 1);
    assert!(matches!(
        Model::read_text(bad_flag.as_bytes()),
        Err(WakachiError::InvalidFormat(_))
    ));
}

/// 配置できない素性を含むモデルのテスト
#[test]
fn test_unplaceable_feature_is_an_error() {
    let mut text = vec![];
    scenario_model().write_text(&mut text).unwrap();
    let text = String::from_utf8(text).unwrap();
    // A window offset beyond the boundary window.
    let broken = text.replacen("X0これ", "X9これ", 1);
    assert_ne!(text, broken);
    assert!(matches!(
        Model::read_text(broken.as_bytes()),
        Err(WakachiError::InvalidState(_))
    ));
}
