//! 未知語推定器の学習モジュール
//!
//! 部分語の読みの候補と単語の読みの組から、部分語の翻訳表と
//! 読みの n-gram 言語モデルを学習し、既存のモデルのタグレベルに組み込みます。
//! 単語の読みは、タブ区切りのファイルか完全注釈コーパスのタグから取得します。

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use wakachi::corpus::Corpus;
use wakachi::encoding::Utf16Encoder;
use wakachi::errors::WakachiError;
use wakachi::unknown::UnknownTrainer;
use wakachi::{Model, TokenString};

use clap::Parser;
use thiserror::Error;

use crate::build::{write_model, OutputFormat};

/// 学習コマンドの引数
#[derive(Parser, Debug)]
#[clap(name = "train-unk", about = "Unknown word estimator trainer")]
pub struct Args {
    /// Model into which the estimator is put.
    #[clap(short = 'i', long)]
    model_in: PathBuf,

    /// File to which the model is output.
    #[clap(short = 'o', long)]
    model_out: PathBuf,

    /// Candidate readings of sub-words. Each line is `subword<TAB>reading`.
    #[clap(short = 's', long)]
    subword_readings: PathBuf,

    /// Words and their readings. Each line is `word<TAB>reading`.
    #[clap(short = 'd', long)]
    word_readings: Option<PathBuf>,

    /// Fully annotated corpus whose tags on `--level` are readings.
    #[clap(short = 't', long)]
    corpus: Option<PathBuf>,

    /// Tag level on which the estimator is used.
    #[clap(short = 'l', long, default_value = "1")]
    level: usize,

    /// Order of the reading language model.
    #[clap(short = 'n', long, default_value = "3")]
    order: usize,

    /// Writes the model in the text format.
    #[clap(long)]
    text: bool,

    /// Compresses the output with zstd at the given level.
    #[clap(long, conflicts_with = "text")]
    zstd: Option<i32>,
}

/// 学習処理中に発生する可能性のあるエラー
#[derive(Debug, Error)]
pub enum TrainUnkError {
    /// 単語の読みの入力がない
    #[error("Either --word-readings or --corpus must be specified.")]
    NoTrainingData,

    /// タブ区切りの行の書式が不正
    #[error("{path}:{line}: expected two tab-separated fields")]
    InvalidLine {
        /// ファイルのパス
        path: String,
        /// 行番号
        line: usize,
    },

    /// 入出力エラー
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// 学習処理エラー
    #[error("Training process failed: {0}")]
    Wakachi(#[from] WakachiError),
}

/// タブ区切りの2列のファイルを読み込む
///
/// 空行は読み飛ばします。
///
/// # エラー
///
/// 2列でない行がある場合、`TrainUnkError::InvalidLine`を返します。
fn read_tsv_pairs(path: &Path) -> Result<Vec<(TokenString, TokenString)>, TrainUnkError> {
    let rdr = BufReader::new(File::open(path)?);
    let mut pairs = vec![];
    for (i, line) in rdr.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        match (fields.next(), fields.next(), fields.next()) {
            (Some(a), Some(b), None) if !a.is_empty() && !b.is_empty() => {
                pairs.push((TokenString::from(a), TokenString::from(b)));
            }
            _ => {
                return Err(TrainUnkError::InvalidLine {
                    path: path.display().to_string(),
                    line: i + 1,
                });
            }
        }
    }
    Ok(pairs)
}

/// 学習コマンドを実行する
///
/// # エラー
///
/// 入力の読み込み、学習、モデルの書き出しに失敗した場合、`TrainUnkError`を返します。
pub fn run(args: Args) -> Result<(), TrainUnkError> {
    if args.word_readings.is_none() && args.corpus.is_none() {
        return Err(TrainUnkError::NoTrainingData);
    }

    println!("Loading the model...");
    let mut model = Model::open(&args.model_in)?;

    let mut trainer = UnknownTrainer::new(args.order);
    for (subword, reading) in read_tsv_pairs(&args.subword_readings)? {
        trainer.add_reading(subword, reading);
    }

    let mut pairs = BTreeSet::new();
    if let Some(path) = &args.word_readings {
        pairs.extend(read_tsv_pairs(path)?);
    }
    if let Some(path) = &args.corpus {
        let corpus = Corpus::from_reader(File::open(path)?, &Utf16Encoder::new())?;
        pairs.extend(
            corpus
                .tagged_words(args.level)
                .map(|(word, reading)| (word.clone(), reading.clone())),
        );
    }
    log::info!("{} distinct pairs of words and readings", pairs.len());
    for (word, reading) in pairs {
        trainer.add_pair(word, reading);
    }

    println!("Training the unknown word estimator...");
    let estimator = trainer.train()?;
    model.set_unknown(args.level, Some(estimator));

    println!("Writing the model...");
    let format = if args.text {
        OutputFormat::Text
    } else {
        args.zstd.map_or(OutputFormat::Binary, OutputFormat::Zstd)
    };
    write_model(&model, &args.model_out, format)?;

    println!("Successfully trained the estimator into {}", args.model_out.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn test_read_tsv_pairs() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "学\tがく\n\n習\tしゅう").unwrap();
        let pairs = read_tsv_pairs(file.path()).unwrap();
        assert_eq!(
            vec![
                (TokenString::from("学"), TokenString::from("がく")),
                (TokenString::from("習"), TokenString::from("しゅう")),
            ],
            pairs
        );
    }

    #[test]
    fn test_read_tsv_pairs_invalid_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "学\tがく\n習").unwrap();
        assert!(matches!(
            read_tsv_pairs(file.path()),
            Err(TrainUnkError::InvalidLine { line: 2, .. })
        ));
    }
}
