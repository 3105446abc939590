//! 単語分割とタグ付けを実行するユーティリティ
//!
//! このバイナリは、標準入力から読み込んだテキストを解析し、
//! 指定された出力形式（full、wakati、detail）で結果を出力します。
//! `--annotated` を指定すると入力を部分的な注釈付きの文として扱い、
//! 注釈された境界とタグを保ったまま残りを推定します。

use std::error::Error;
use std::io::{BufRead, BufWriter, IsTerminal, Write};
use std::path::PathBuf;
use std::str::FromStr;

use wakachi::{Analyzer, AnalyzerConfig, Model, TokenString};

use clap::Parser;

/// 出力モード
#[derive(Clone, Debug)]
enum OutputMode {
    Full,
    Wakati,
    Detail,
}

impl FromStr for OutputMode {
    type Err = &'static str;

    /// 文字列から出力モードをパースする
    ///
    /// # 引数
    ///
    /// * `mode` - パース対象の文字列（"full"、"wakati"、"detail"のいずれか）
    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        match mode {
            "full" => Ok(Self::Full),
            "wakati" => Ok(Self::Wakati),
            "detail" => Ok(Self::Detail),
            _ => Err("Could not parse a mode"),
        }
    }
}

/// コマンドライン引数
#[derive(Parser, Debug)]
#[clap(name = "analyze", about = "Segments words and estimates their tags")]
struct Args {
    /// Model file (binary, text, or binary in zstd with the .zst extension).
    #[clap(short = 'i', long)]
    model: PathBuf,

    /// Output mode. Choices are full, wakati, and detail.
    #[clap(short = 'O', long, default_value = "full")]
    output_mode: OutputMode,

    /// Treats each input line as a partially annotated sentence.
    #[clap(short = 'a', long)]
    annotated: bool,

    /// Boundaries and tags whose confidence exceeds this value are kept as they are.
    #[clap(short = 'c', long, default_value = "0")]
    confidence: f64,

    /// Maximum number of tag candidates per word.
    #[clap(short = 'n', long, default_value = "3")]
    max_tags: usize,

    /// Beam width of the unknown word estimation.
    #[clap(long, default_value = "50")]
    unk_beam: usize,

    /// Outputs probabilities instead of margins.
    #[clap(short = 'p', long)]
    probabilistic: bool,

    /// Character types that are never split inside a run (e.g., "D" for digits).
    #[clap(long)]
    constraint: Option<String>,

    /// Tag given to words that have no candidates.
    #[clap(long)]
    default_tag: Option<String>,

    /// Tag levels on which the global classifier is not used.
    #[clap(long, value_delimiter(','))]
    no_global_tagging: Vec<usize>,

    /// Only segments words without estimating tags.
    #[clap(short = 'S', long)]
    segment_only: bool,
}

/// 引数から解析器の設定を作る
///
/// # 引数
///
/// * `args` - コマンドライン引数
fn config_from_args(args: &Args) -> AnalyzerConfig {
    let mut config = AnalyzerConfig::default()
        .confidence(args.confidence)
        .max_tags(args.max_tags)
        .unk_beam(args.unk_beam)
        .probabilistic(args.probabilistic)
        .default_tag(args.default_tag.as_deref().map(TokenString::from));
    if let Some(constraint) = &args.constraint {
        config = config.constraint(TokenString::from(constraint.as_str()));
    }
    for &level in &args.no_global_tagging {
        config = config.global_tagging(level, false);
    }
    config
}

/// メイン関数
///
/// モデルをロードし、標準入力から読み込んだテキストを解析して、
/// 指定された形式で結果を標準出力に出力します。
///
/// # 戻り値
///
/// 実行が成功した場合は `Ok(())`、エラーが発生した場合はエラー情報
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    eprintln!("Loading the model...");
    let model = Model::open(&args.model)?;
    let num_levels = model.num_levels();

    let analyzer = Analyzer::new(model).config(config_from_args(&args));
    let mut worker = analyzer.new_worker();

    eprintln!("Ready to analyze");

    let is_tty = std::io::stdout().is_terminal();

    let out = std::io::stdout();
    let mut out = BufWriter::new(out.lock());
    let lines = std::io::stdin().lock().lines();
    for (i, line) in lines.enumerate() {
        let line = line?;
        if args.annotated {
            worker
                .reset_annotated(&line)
                .map_err(|e| format!("line {}: {}", i + 1, e))?;
        } else {
            worker.reset_sentence(&line);
        }
        if args.segment_only {
            worker.segment()?;
        } else {
            worker.analyze()?;
        }
        match args.output_mode {
            OutputMode::Full => {
                out.write_all(worker.to_annotated().as_bytes())?;
                out.write_all(b"\n")?;
            }
            OutputMode::Wakati => {
                let segmented = worker.sentence().to_segmented(analyzer.get_encoder());
                out.write_all(segmented.as_bytes())?;
                out.write_all(b"\n")?;
            }
            OutputMode::Detail => {
                for word in worker.words() {
                    write!(&mut out, "{}", word.surface())?;
                    for level in 0..num_levels {
                        out.write_all(b"\t")?;
                        for (j, tag) in word.tags(level).iter().enumerate() {
                            if j != 0 {
                                out.write_all(b" ")?;
                            }
                            write!(&mut out, "{}:{:.4}", tag.surface, tag.score)?;
                        }
                    }
                    out.write_all(b"\n")?;
                }
                out.write_all(b"EOS\n")?;
            }
        }
        if is_tty {
            out.flush()?;
        }
    }

    Ok(())
}
