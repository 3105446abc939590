//! wakachi モデルコンパイラのメインエントリーポイント
//!
//! テキスト形式のモデルからバイナリ形式のモデルを構築する、バイナリ形式のモデルを
//! テキスト形式に書き戻す、未知語推定器を学習してモデルに組み込む、といった
//! モデル構築に関する操作を統合したCLIツールです。

mod build;
mod dump;
mod train_unk;

use clap::Parser;
use thiserror::Error;

use crate::{build::BuildError, dump::DumpError, train_unk::TrainUnkError};

/// コマンドライン引数の構造体
#[derive(Parser, Debug)]
#[clap(name = "compile", version)]
struct Cli {
    /// 実行するサブコマンド
    #[clap(subcommand)]
    command: Command,
}

/// 利用可能なサブコマンド
#[derive(Parser, Debug)]
enum Command {
    /// テキスト形式のモデルからバイナリ形式のモデルを構築します
    ///
    /// 分類器の重みから素性の参照表を構築し、rkyv 形式で出力します。
    Build(build::Args),

    /// モデルをテキスト形式で書き出します
    Dump(dump::Args),

    /// 未知語推定器を学習してモデルに組み込みます
    ///
    /// 部分語の読みの候補と単語の読みから翻訳表と読みの言語モデルを学習します。
    TrainUnk(train_unk::Args),
}

/// コンパイラの実行中に発生する可能性のあるエラー
///
/// 各サブコマンドで発生したエラーをラップします。
#[derive(Debug, Error)]
pub enum CompileError {
    /// モデル構築中のエラー
    #[error(transparent)]
    BuildError(#[from] BuildError),
    /// テキスト出力中のエラー
    #[error(transparent)]
    DumpError(#[from] DumpError),
    /// 未知語推定器の学習中のエラー
    #[error(transparent)]
    TrainUnkError(#[from] TrainUnkError),
}

/// メイン関数
///
/// コマンドライン引数をパースし、指定されたサブコマンドを実行します。
///
/// # エラー
///
/// 各サブコマンドの実行中にエラーが発生した場合、そのエラーが返されます。
fn main() -> Result<(), CompileError> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Build(args) => Ok(build::run(args)?),
        Command::Dump(args) => Ok(dump::run(args)?),
        Command::TrainUnk(args) => Ok(train_unk::run(args)?),
    }
}
