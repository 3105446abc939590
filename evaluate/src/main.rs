//! モデルの精度を評価するユーティリティ
//!
//! このバイナリは、完全注釈のテストコーパスから注釈を取り除いた文を解析し、
//! 正解と比較して単語単位の適合率（Precision）、再現率（Recall）、F1スコア、
//! 文字境界の正解率、タグレベルごとのタグの正解率を計算します。

use std::error::Error;
use std::fs::File;
use std::ops::Range;
use std::path::PathBuf;

use hashbrown::{HashMap, HashSet};
use wakachi::corpus::Corpus;
use wakachi::sentence::Sentence;
use wakachi::{Analyzer, AnalyzerConfig, Model};

use clap::Parser;

/// コマンドライン引数
#[derive(Parser, Debug)]
#[clap(name = "evaluate", about = "Evaluate the model accuracy")]
struct Args {
    /// Test corpus in the full annotation format.
    #[clap(short = 't', long)]
    test_in: PathBuf,

    /// Model file (binary, text, or binary in zstd with the .zst extension).
    #[clap(short = 'i', long)]
    model_in: PathBuf,

    /// Tag levels to be evaluated. If empty, all levels of the model are used.
    #[clap(long, value_delimiter(','))]
    levels: Vec<usize>,
}

/// 単語の範囲の集合を返す
///
/// # 引数
///
/// * `sent` - 単語に分割された文
fn word_ranges(sent: &Sentence) -> HashSet<Range<usize>> {
    sent.words().iter().map(|w| w.start()..w.end()).collect()
}

/// 比率を計算する。分母が0の場合は0を返す
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// メイン関数
///
/// テストコーパスに対して解析器を実行し、正解データと比較して
/// 各評価値を計算します。
///
/// # 戻り値
///
/// 実行が成功した場合は `Ok(())`、エラーが発生した場合はエラー情報
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    eprintln!("Loading the model...");
    let model = Model::open(&args.model_in)?;
    let levels = if args.levels.is_empty() {
        (0..model.num_levels()).collect()
    } else {
        args.levels
    };

    let analyzer = Analyzer::new(model).config(AnalyzerConfig::default().max_tags(1));
    let mut worker = analyzer.new_worker();

    eprintln!("Analyzing...");

    let corpus = Corpus::from_reader(File::open(args.test_in)?, analyzer.get_encoder())?;

    let mut num_ref = 0;
    let mut num_sys = 0;
    let mut num_cor = 0;
    let mut num_boundaries = 0;
    let mut num_boundaries_cor = 0;
    let mut tag_totals: HashMap<usize, (usize, usize)> = HashMap::new();
    for reference in corpus.iter() {
        worker.reset_sentence(reference.text());
        worker.analyze()?;
        let system = worker.sentence();

        let refs = word_ranges(reference);
        let syss = word_ranges(system);
        num_ref += refs.len();
        num_sys += syss.len();
        num_cor += refs.intersection(&syss).count();

        for (r, s) in reference.boundaries().iter().zip(system.boundaries()) {
            num_boundaries += 1;
            if (*r > 0.0) == (*s > 0.0) {
                num_boundaries_cor += 1;
            }
        }

        let system_words: HashMap<Range<usize>, _> = system
            .words()
            .iter()
            .map(|w| (w.start()..w.end(), w))
            .collect();
        for word in reference.words() {
            let Some(sys_word) = system_words.get(&(word.start()..word.end())) else {
                continue;
            };
            for &level in &levels {
                let Some(expected) = word.top_tag(level) else {
                    continue;
                };
                let total = tag_totals.entry(level).or_default();
                total.0 += 1;
                if sys_word
                    .top_tag(level)
                    .is_some_and(|t| t.surface == expected.surface)
                {
                    total.1 += 1;
                }
            }
        }
    }

    let precision = ratio(num_cor, num_sys);
    let recall = ratio(num_cor, num_ref);
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };
    println!("Precision = {precision}");
    println!("Recall = {recall}");
    println!("F1 = {f1}");
    println!(
        "Boundary accuracy = {}",
        ratio(num_boundaries_cor, num_boundaries)
    );
    for level in levels {
        let (total, correct) = tag_totals.get(&level).copied().unwrap_or_default();
        println!("Tag accuracy (level {level}) = {}", ratio(correct, total));
    }

    Ok(())
}
