//! # wakachi
//!
//! wakachi は、点予測による日本語の単語分割とタグ付けの実装です。
//!
//! ## 概要
//!
//! 文字間ごとに、周辺の文字 n-gram・文字種 n-gram・辞書の照合結果を素性とする
//! 線形分類器で単語境界の有無を判定します。得られた単語には、タグレベルごとに
//! 大域分類器、単語ごとの局所分類器、辞書のタグ候補、未知語の読み推定のいずれかで
//! タグを付与します。分類器の重みは外部の学習器で学習されたものを読み込みます。
//!
//! ## 主な機能
//!
//! - **高速な素性計算**: 学習済みの重みを n-gram をキーとするパターン辞書と
//!   固定小数点のベクトルに変換し、1回の照合で窓内のすべての位置のスコアを得ます
//! - **部分的な注釈の尊重**: 信頼度の高い境界とタグは変更せず、残りだけを推定します
//! - **未知語の読み推定**: 部分語の翻訳表と読みの n-gram 言語モデルによる雑音のある通信路モデル
//! - **2つのモデル形式**: rkyv によるバイナリ形式と、行単位のテキスト形式
//!
//! ## 使用例
//!
//! ```
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use wakachi::model::feature_name;
//! use wakachi::model::linear::{LinearModel, SolverKind};
//! use wakachi::model::ModelParams;
//! use wakachi::{Analyzer, ModelBuilder, TokenString};
//!
//! let params = ModelParams {
//!     char_window: 1,
//!     char_n: 1,
//!     type_window: 1,
//!     type_n: 1,
//!     ..ModelParams::default()
//! };
//! let mut builder = ModelBuilder::new(params);
//!
//! // A boundary precedes every hiragana.
//! let hiragana = TokenString::from_char(wakachi::encoding::CharType::Hiragana.code());
//! builder.boundary_model(LinearModel::new(
//!     SolverKind::Logistic,
//!     vec![1, -1],
//!     vec![(feature_name::type_ngram(1, hiragana.as_slice()), vec![1.0])],
//!     vec![-0.5],
//! )?);
//!
//! let dict = builder.add_dictionary("system")?;
//! builder.add_word(dict, TokenString::from("猫"), vec![vec![TokenString::from("名詞")]])?;
//! builder.add_word(dict, TokenString::from("が"), vec![vec![TokenString::from("助詞")]])?;
//!
//! let analyzer = Analyzer::new(builder.build()?);
//! let mut worker = analyzer.new_worker();
//! worker.reset_sentence("猫が");
//! worker.analyze()?;
//!
//! assert_eq!(2, worker.num_words());
//! assert_eq!("猫/名詞 が/助詞", worker.to_annotated());
//! # Ok(())
//! # }
//! ```
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(not(any(target_pointer_width = "32", target_pointer_width = "64")))]
compile_error!("`target_pointer_width` must be 32 or 64");

/// 単語分割とタグ付けを行う解析器
pub mod analyzer;

/// 解析器の実行時設定
pub mod config;

/// 完全注釈コーパスの読み書き
pub mod corpus;

/// パターン辞書とそのエントリ
pub mod dictionary;

/// 文字コードの対応付けと文字種の判定
pub mod encoding;

/// エラー型の定義
pub mod errors;

/// 部分語の読みの言語モデル
pub mod lm;

/// 解析モデルと素性の参照表
pub mod model;

/// 素性値の数値表現
pub mod num;

/// 解析対象の文
pub mod sentence;

/// 解析器内部の文字列表現
pub mod string;

/// 未知語の読みの推定
pub mod unknown;

/// 内部ユーティリティ関数
pub mod utils;


// Re-exports
pub use analyzer::{Analyzer, Worker};
pub use config::AnalyzerConfig;
pub use model::{Model, ModelBuilder};
pub use sentence::Sentence;
pub use string::TokenString;

/// このライブラリのバージョン番号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
