//! 辞書にない単語の読みの推定
//!
//! 単語を部分語に分け、部分語ごとの読みの翻訳確率と読みの言語モデルを組み合わせた
//! 雑音のある通信路モデルで読みの候補を生成します。候補の探索はビーム探索です。
pub mod trainer;

use hashbrown::HashMap;
use rkyv::{Archive, Deserialize, Serialize};

use crate::dictionary::{PatternDictionary, ProbTagEntry};
use crate::lm::LanguageModel;
use crate::sentence::Tag;
use crate::string::TokenString;
use crate::utils;

pub use crate::unknown::trainer::UnknownTrainer;

/// 読みを推定する単語の最大文字数
pub const MAX_UNKNOWN_LEN: usize = 256;

/// 推定を行わなかった単語に付与するタグ
pub const NULL_TAG: &str = "<NULL>";

#[derive(Clone, Debug)]
struct Hypothesis {
    pron: TokenString,
    score: f64,
}

/// ビームの幅に刈り込みます。同じ読みの仮説は最良のものだけを残します。
fn prune(hyps: &mut Vec<Hypothesis>, beam: usize) {
    if hyps.len() > 1 {
        let mut best: HashMap<TokenString, f64> = HashMap::with_capacity(hyps.len());
        for h in hyps.drain(..) {
            best.entry(h.pron)
                .and_modify(|s| *s = s.max(h.score))
                .or_insert(h.score);
        }
        hyps.extend(best.into_iter().map(|(pron, score)| Hypothesis { pron, score }));
    }
    hyps.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.pron.cmp(&b.pron)));
    hyps.truncate(beam);
}

/// 未知語の読みの推定器
#[derive(Clone, Debug, Archive, Serialize, Deserialize)]
pub struct UnknownEstimator {
    subwords: PatternDictionary<ProbTagEntry>,
    lm: LanguageModel,
}

impl UnknownEstimator {
    /// 部分語の翻訳表と言語モデルから推定器を作成します。
    pub fn new(subwords: PatternDictionary<ProbTagEntry>, lm: LanguageModel) -> Self {
        Self { subwords, lm }
    }

    /// 部分語の翻訳表を返します。
    pub fn subwords(&self) -> &PatternDictionary<ProbTagEntry> {
        &self.subwords
    }

    /// 言語モデルを返します。
    pub fn lm(&self) -> &LanguageModel {
        &self.lm
    }

    /// 単語の読みの候補を生成します。
    ///
    /// 候補のスコアは候補全体で総和が1になる確率で、降順に並びます。
    /// 単語が [`MAX_UNKNOWN_LEN`] より長い場合は [`NULL_TAG`] だけを返し、
    /// 部分語で単語全体を覆えない場合は空を返します。
    ///
    /// # 引数
    ///
    /// * `word` - 単語
    /// * `max_tags` - 返す候補の最大数
    /// * `beam` - ビーム幅
    pub fn generate(&self, word: &TokenString, max_tags: usize, beam: usize) -> Vec<Tag> {
        if word.len() > MAX_UNKNOWN_LEN {
            return vec![Tag::new(TokenString::from(NULL_TAG), 1.0)];
        }
        if word.is_empty() {
            return vec![];
        }
        let beam = beam.max(1);

        // (end, entry) of the sub-words starting at each position
        let mut starting_at: Vec<Vec<(usize, usize)>> = vec![vec![]; word.len()];
        for m in self.subwords.matches(word) {
            let len = self.subwords.key(m.entry).len();
            starting_at[m.end + 1 - len].push((m.end + 1, m.entry));
        }

        let mut lattice: Vec<Vec<Hypothesis>> = vec![vec![]; word.len() + 1];
        lattice[0].push(Hypothesis {
            pron: TokenString::default(),
            score: 0.0,
        });
        for pos in 0..word.len() {
            let mut hyps = std::mem::take(&mut lattice[pos]);
            prune(&mut hyps, beam);
            for &(end, entry) in &starting_at[pos] {
                for (pron, trans) in self.subwords.entry(entry).iter() {
                    for hyp in &hyps {
                        let lm = self.lm.score_extension(hyp.pron.as_slice(), pron.as_slice());
                        lattice[end].push(Hypothesis {
                            pron: hyp.pron.concat(pron),
                            score: hyp.score + trans + lm,
                        });
                    }
                }
            }
        }

        let mut last = std::mem::take(&mut lattice[word.len()]);
        for hyp in &mut last {
            hyp.score += self.lm.score_end(hyp.pron.as_slice());
        }
        prune(&mut last, usize::MAX);
        let mut scores: Vec<f64> = last.iter().map(|h| h.score).collect();
        utils::normalize_log_scores(&mut scores);
        last.into_iter()
            .zip(scores)
            .take(max_tags)
            .map(|(h, p)| Tag::new(h.pron, p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn ts(s: &str) -> TokenString {
        TokenString::from(s)
    }

    fn estimator() -> UnknownEstimator {
        let mut map = BTreeMap::new();
        let mut gaku = ProbTagEntry::new(ts("学"));
        gaku.add_tag(ts("がく"), (0.8f64).ln());
        gaku.add_tag(ts("まな"), (0.2f64).ln());
        map.insert(ts("学"), gaku);
        let mut shu = ProbTagEntry::new(ts("習"));
        shu.add_tag(ts("しゅう"), 0.0);
        map.insert(ts("習"), shu);
        let mut gakushu = ProbTagEntry::new(ts("学習"));
        gakushu.add_tag(ts("がくしゅう"), (0.5f64).ln());
        map.insert(ts("学習"), gakushu);
        let lm = LanguageModel::train(2, &[ts("がくしゅう"), ts("がく"), ts("しゅう")]).unwrap();
        UnknownEstimator::new(PatternDictionary::from_map(map).unwrap(), lm)
    }

    #[test]
    fn test_generate_normalized() {
        let est = estimator();
        let tags = est.generate(&ts("学習"), 10, 50);
        assert_eq!(2, tags.len());
        assert_eq!(ts("がくしゅう"), tags[0].surface);
        let total: f64 = tags.iter().map(|t| t.score).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(tags[0].score >= tags[1].score);
    }

    #[test]
    fn test_generate_truncates() {
        let tags = estimator().generate(&ts("学習"), 1, 50);
        assert_eq!(1, tags.len());
    }

    #[test]
    fn test_uncovered_word() {
        assert!(estimator().generate(&ts("学校"), 3, 50).is_empty());
    }

    #[test]
    fn test_too_long_word() {
        let long = TokenString::new(vec![TokenString::from("学").get(0); MAX_UNKNOWN_LEN + 1]);
        let tags = estimator().generate(&long, 3, 50);
        assert_eq!(vec![Tag::new(ts(NULL_TAG), 1.0)], tags);
    }
}
