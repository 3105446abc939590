//! バイナリモデルのビルドモジュール
//!
//! テキスト形式のモデルを読み込んで素性の参照表を構築し、
//! バイナリ形式（必要に応じて zstd 圧縮）で出力します。

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use wakachi::errors::WakachiError;
use wakachi::Model;

use clap::Parser;

/// ビルドコマンドの引数
#[derive(Parser, Debug)]
#[clap(name = "build", about = "A program to build a binary model.")]
pub struct Args {
    /// Model in the text format.
    #[clap(short = 'i', long)]
    model_in: PathBuf,

    /// File to which the binary model is output.
    #[clap(short = 'o', long)]
    model_out: PathBuf,

    /// Compresses the output with zstd at the given level.
    #[clap(long)]
    zstd: Option<i32>,
}

/// ビルド処理中に発生する可能性のあるエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// 入出力エラー
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// モデル構築エラー
    #[error("Model building failed: {0}")]
    Wakachi(#[from] WakachiError),
}

/// モデルの出力形式
#[derive(Clone, Copy, Debug)]
pub enum OutputFormat {
    /// バイナリ形式
    Binary,
    /// zstd で圧縮したバイナリ形式
    Zstd(i32),
    /// テキスト形式
    Text,
}

/// モデルを指定された形式でファイルに書き出す
///
/// # 引数
///
/// * `model` - 書き出すモデル
/// * `path` - 出力先
/// * `format` - 出力形式
///
/// # エラー
///
/// ファイルの作成や書き込みに失敗した場合、`WakachiError`を返します。
pub fn write_model(model: &Model, path: &Path, format: OutputFormat) -> Result<(), WakachiError> {
    let file = File::create(path)?;
    match format {
        OutputFormat::Binary => {
            let mut wtr = BufWriter::new(file);
            model.write(&mut wtr)?;
            wtr.flush()?;
        }
        OutputFormat::Zstd(level) => {
            let mut encoder = zstd::Encoder::new(file, level)?;
            model.write(&mut encoder)?;
            encoder.finish()?;
        }
        OutputFormat::Text => {
            let mut wtr = BufWriter::new(file);
            model.write_text(&mut wtr)?;
            wtr.flush()?;
        }
    }
    Ok(())
}

/// ビルドコマンドを実行する
///
/// # 引数
///
/// * `args` - ビルドコマンドの引数
///
/// # エラー
///
/// ファイルの読み書きやモデルの構築に失敗した場合、`BuildError`を返します。
pub fn run(args: Args) -> Result<(), BuildError> {
    println!("Compiling the model...");
    let model = Model::read_text(BufReader::new(File::open(&args.model_in)?))?;
    log::info!(
        "{} tag levels, {} dictionaries",
        model.num_levels(),
        model.dict_names().len()
    );

    println!("Writing the model...");
    let format = args.zstd.map_or(OutputFormat::Binary, OutputFormat::Zstd);
    write_model(&model, &args.model_out, format)?;

    println!("Successfully built the model to {}", args.model_out.display());
    Ok(())
}
