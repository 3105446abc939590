//! モデルをテキスト形式で書き出すモジュール

use std::path::PathBuf;

use wakachi::errors::WakachiError;
use wakachi::Model;

use clap::Parser;

use crate::build::{write_model, OutputFormat};

/// ダンプコマンドの引数
#[derive(Parser, Debug)]
#[clap(name = "dump", about = "A program to write a model in the text format.")]
pub struct Args {
    /// Model file (binary, text, or binary in zstd with the .zst extension).
    #[clap(short = 'i', long)]
    model_in: PathBuf,

    /// File to which the text model is output.
    #[clap(short = 'o', long)]
    text_out: PathBuf,
}

/// ダンプ処理中に発生する可能性のあるエラー
#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    /// モデルの読み書きのエラー
    #[error("Dumping the model failed: {0}")]
    Wakachi(#[from] WakachiError),
}

/// ダンプコマンドを実行する
///
/// # エラー
///
/// モデルの読み込みや書き出しに失敗した場合、`DumpError`を返します。
pub fn run(args: Args) -> Result<(), DumpError> {
    println!("Loading the model...");
    let model = Model::open(&args.model_in)?;

    println!("Writing the text model...");
    write_model(&model, &args.text_out, OutputFormat::Text)?;

    println!("Successfully dumped the model to {}", args.text_out.display());
    Ok(())
}
