//! 未知語推定器の学習
//!
//! 辞書の単語と読みの組を部分語の読みの列に対応付け、その出現回数から
//! 部分語の翻訳表を作ります。翻訳表は読みの言語モデルを事前分布とする
//! ディリクレ平滑化で滑らかにし、その集中度はニュートン法で推定します。

use std::collections::BTreeMap;

use hashbrown::HashMap;

use crate::dictionary::{DictionaryBuilder, PatternDictionary, ProbTagEntry};
use crate::errors::{Result, WakachiError};
use crate::lm::LanguageModel;
use crate::string::TokenString;
use crate::unknown::UnknownEstimator;

/// 1組あたりに数える対応付けの最大数
pub const MAX_ALIGNMENTS: usize = 64;

/// ニュートン法の反復回数の上限
pub const MAX_NEWTON_ITERATIONS: usize = 100;

/// 集中度の下限
pub const MIN_ALPHA: f64 = 1e-3;

/// 集中度の上限
pub const MAX_ALPHA: f64 = 1e4;

/// 集中度の推定に失敗したときの値
pub const FALLBACK_ALPHA: f64 = 1.0;

/// 未知語推定器の学習器
///
/// # 例
///
/// ```
/// use wakachi::unknown::UnknownTrainer;
/// use wakachi::TokenString;
///
/// let mut trainer = UnknownTrainer::new(2);
/// trainer.add_reading(TokenString::from("学"), TokenString::from("がく"));
/// trainer.add_reading(TokenString::from("習"), TokenString::from("しゅう"));
/// trainer.add_pair(TokenString::from("学習"), TokenString::from("がくしゅう"));
/// let estimator = trainer.train()?;
///
/// let tags = estimator.generate(&TokenString::from("学習"), 1, 10);
/// assert_eq!("がくしゅう", tags[0].surface.to_string());
/// # Ok::<(), wakachi::errors::WakachiError>(())
/// ```
pub struct UnknownTrainer {
    n: usize,
    readings: BTreeMap<TokenString, Vec<TokenString>>,
    pairs: Vec<(TokenString, TokenString)>,
}

type Piece = (TokenString, TokenString);

impl UnknownTrainer {
    /// 言語モデルの次数を指定して学習器を作成します。
    pub fn new(n: usize) -> Self {
        Self {
            n,
            readings: BTreeMap::new(),
            pairs: vec![],
        }
    }

    /// 部分語の読みの候補を追加します。
    pub fn add_reading(&mut self, subword: TokenString, pron: TokenString) {
        let prons = self.readings.entry(subword).or_default();
        if !prons.contains(&pron) {
            prons.push(pron);
        }
    }

    /// 単語と読みの組を追加します。
    pub fn add_pair(&mut self, word: TokenString, pron: TokenString) {
        self.pairs.push((word, pron));
    }

    /// 単語と読みの組を部分語の対応付けに分解します。
    ///
    /// 部分語は読みの候補を持つ部分文字列か、読みと同じ1文字です。
    /// 先に終端へ到達できる `(単語位置, 読み位置)` を動的計画法で求め、
    /// 到達できる状態だけをたどって最大 [`MAX_ALIGNMENTS`] 通りまで列挙します。
    fn align(
        readings: Option<&PatternDictionary<Vec<TokenString>>>,
        word: &TokenString,
        pron: &TokenString,
    ) -> Vec<Vec<Piece>> {
        let (wl, pl) = (word.len(), pron.len());

        // edges[i]: (subword length, candidate readings) starting at word position i
        let mut edges: Vec<Vec<(usize, &[TokenString])>> = vec![vec![]; wl];
        if let Some(readings) = readings {
            for m in readings.matches(word) {
                let len = readings.key(m.entry).len();
                edges[m.end + 1 - len].push((len, readings.entry(m.entry).as_slice()));
            }
        }

        // Successor states of (i, j) with the piece consumed on the way.
        let successors = |i: usize, j: usize| {
            let mut next: Vec<(usize, usize, Piece)> = vec![];
            if j < pl && word.get(i) == pron.get(j) {
                next.push((i + 1, j + 1, (word.substring(i, 1), pron.substring(j, 1))));
            }
            for &(len, prons) in &edges[i] {
                for p in prons {
                    if pron.as_slice()[j..].starts_with(p.as_slice()) {
                        next.push((i + len, j + p.len(), (word.substring(i, len), p.clone())));
                    }
                }
            }
            next
        };

        // reach[i][j]: (i, j) can be completed to (wl, pl)
        let mut reach = vec![vec![false; pl + 1]; wl + 1];
        reach[wl][pl] = true;
        for i in (0..wl).rev() {
            for j in (0..=pl).rev() {
                let ok = (j < pl && word.get(i) == pron.get(j) && reach[i + 1][j + 1])
                    || edges[i].iter().any(|&(len, prons)| {
                        prons.iter().any(|p| {
                            pron.as_slice()[j..].starts_with(p.as_slice())
                                && reach[i + len][j + p.len()]
                        })
                    });
                reach[i][j] = ok;
            }
        }
        if !reach[0][0] {
            return vec![];
        }

        let mut paths = vec![];
        let mut stack: Vec<(usize, usize, Vec<Piece>)> = vec![(0, 0, vec![])];
        while let Some((i, j, pieces)) = stack.pop() {
            if paths.len() >= MAX_ALIGNMENTS {
                break;
            }
            if i == wl {
                paths.push(pieces);
                continue;
            }
            for (ni, nj, piece) in successors(i, j) {
                if reach[ni][nj] {
                    let mut next = pieces.clone();
                    next.push(piece);
                    stack.push((ni, nj, next));
                }
            }
        }
        paths
    }

    /// 推定器を学習します。
    ///
    /// # エラー
    ///
    /// 単語と読みの組が1つもない場合、または1つも対応付けられなかった場合は
    /// [`WakachiError`] を返します。
    pub fn train(self) -> Result<UnknownEstimator> {
        if self.pairs.is_empty() {
            return Err(WakachiError::invalid_argument(
                "pairs",
                "at least one pair of a word and its pronunciation is required",
            ));
        }
        let lm = LanguageModel::train(self.n, self.pairs.iter().map(|(_, p)| p))?;

        let readings = if self.readings.is_empty() {
            None
        } else {
            Some(PatternDictionary::from_map(self.readings.clone())?)
        };

        let mut counts: HashMap<Piece, f64> = HashMap::new();
        let mut aligned = 0;
        for (word, pron) in &self.pairs {
            let paths = Self::align(readings.as_ref(), word, pron);
            if paths.is_empty() {
                log::debug!("no alignment for {}/{}", word, pron);
                continue;
            }
            aligned += 1;
            let w = 1.0 / paths.len() as f64;
            for piece in paths.into_iter().flatten() {
                *counts.entry(piece).or_insert(0.0) += w;
            }
        }
        if aligned == 0 {
            return Err(WakachiError::invalid_argument(
                "pairs",
                "none of the pairs could be aligned to sub-words",
            ));
        }
        log::info!("aligned {} of {} pairs", aligned, self.pairs.len());

        // Every candidate reading takes part in the table, observed or not.
        for (subword, prons) in &self.readings {
            for p in prons {
                counts.entry((subword.clone(), p.clone())).or_insert(0.0);
            }
        }

        let mut totals: HashMap<&TokenString, f64> = HashMap::new();
        for ((s, _), &c) in &counts {
            *totals.entry(s).or_insert(0.0) += c;
        }
        let mut priors: HashMap<&TokenString, f64> = HashMap::new();
        for (_, p) in counts.keys() {
            priors.entry(p).or_insert_with(|| lm.score(p).exp());
        }

        let alpha = fit_alpha(
            counts.iter().map(|((s, p), &c)| (c, totals[s], priors[p])),
        );
        log::info!("fitted the concentration parameter: {}", alpha);

        let mut builder = DictionaryBuilder::new();
        for ((s, p), &c) in &counts {
            let prob = (c + alpha * priors[p]) / (totals[s] + alpha);
            builder
                .entry_or_insert_with(s.clone(), || ProbTagEntry::new(s.clone()))
                .add_tag(p.clone(), prob.ln());
        }
        Ok(UnknownEstimator::new(builder.build()?, lm))
    }
}

/// 1つ抜き交差検証の対数尤度を最大にする集中度をニュートン法で求めます。
///
/// 各項は `(c(s,p), c(s), P_lm(p))` です。反復が発散した場合や凹でない場合は
/// [`FALLBACK_ALPHA`] を返します。
pub fn fit_alpha<I>(terms: I) -> f64
where
    I: Iterator<Item = (f64, f64, f64)>,
{
    let terms: Vec<_> = terms
        .filter(|&(c, _, q)| c > 0.0 && q > 0.0)
        .map(|(c, total, q)| (c, (c - 1.0).max(0.0), (total - 1.0).max(0.0), q))
        .collect();
    if terms.is_empty() {
        return FALLBACK_ALPHA;
    }
    let mut alpha = FALLBACK_ALPHA;
    for _ in 0..MAX_NEWTON_ITERATIONS {
        let (mut d1, mut d2) = (0.0, 0.0);
        for &(c, c_rest, total_rest, q) in &terms {
            let num = c_rest + alpha * q;
            let den = total_rest + alpha;
            d1 += c * (q / num - 1.0 / den);
            d2 += c * (1.0 / (den * den) - (q * q) / (num * num));
        }
        if !d1.is_finite() || !d2.is_finite() || d2 >= 0.0 {
            log::warn!("Newton's method diverged; using alpha = {}", FALLBACK_ALPHA);
            return FALLBACK_ALPHA;
        }
        let next = (alpha - d1 / d2).clamp(MIN_ALPHA, MAX_ALPHA);
        if (next - alpha).abs() <= 1e-9 * alpha {
            return next;
        }
        alpha = next;
    }
    alpha
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> TokenString {
        TokenString::from(s)
    }

    #[test]
    fn test_align_with_readings_and_identity() {
        let mut map = BTreeMap::new();
        map.insert(ts("学"), vec![ts("がく"), ts("まな")]);
        map.insert(ts("学習"), vec![ts("がくしゅう")]);
        map.insert(ts("習"), vec![ts("しゅう")]);
        let readings = PatternDictionary::from_map(map).unwrap();

        let paths = UnknownTrainer::align(Some(&readings), &ts("学習"), &ts("がくしゅう"));
        assert_eq!(2, paths.len());

        let paths = UnknownTrainer::align(Some(&readings), &ts("学ぶ"), &ts("まなぶ"));
        assert_eq!(
            vec![vec![(ts("学"), ts("まな")), (ts("ぶ"), ts("ぶ"))]],
            paths
        );

        assert!(UnknownTrainer::align(Some(&readings), &ts("学校"), &ts("がっこう")).is_empty());
    }

    #[test]
    fn test_alignment_cap() {
        // Every split of a run of identical characters aligns.
        let word = TokenString::new(vec![u16::from(b'a'); 30]);
        let mut map = BTreeMap::new();
        map.insert(ts("aa"), vec![ts("aa")]);
        let readings = PatternDictionary::from_map(map).unwrap();
        let paths = UnknownTrainer::align(Some(&readings), &word, &word);
        assert_eq!(MAX_ALIGNMENTS, paths.len());
    }

    #[test]
    fn test_unalignable_pair_finishes() {
        // Many partial splits, none of which reaches the end of the reading.
        let word = TokenString::new(vec![u16::from(b'a'); 40]);
        let mut pron = vec![u16::from(b'a'); 39];
        pron.push(u16::from(b'b'));
        let mut map = BTreeMap::new();
        map.insert(ts("aa"), vec![ts("aa")]);
        let readings = PatternDictionary::from_map(map).unwrap();
        let paths = UnknownTrainer::align(Some(&readings), &word, &TokenString::new(pron));
        assert!(paths.is_empty());
    }

    #[test]
    fn test_fit_alpha_is_clamped() {
        let alpha = fit_alpha([(3.0, 4.0, 0.5), (1.0, 4.0, 0.1), (2.0, 2.0, 0.9)].into_iter());
        assert!((MIN_ALPHA..=MAX_ALPHA).contains(&alpha));
        assert_eq!(FALLBACK_ALPHA, fit_alpha(std::iter::empty()));
    }

    #[test]
    fn test_train() {
        let mut trainer = UnknownTrainer::new(2);
        trainer.add_reading(ts("学"), ts("がく"));
        trainer.add_reading(ts("学"), ts("まな"));
        trainer.add_reading(ts("習"), ts("しゅう"));
        trainer.add_reading(ts("生"), ts("せい"));
        trainer.add_pair(ts("学習"), ts("がくしゅう"));
        trainer.add_pair(ts("学生"), ts("がくせい"));
        trainer.add_pair(ts("学ぶ"), ts("まなぶ"));
        let est = trainer.train().unwrap();

        let gaku = est.subwords().find_entry(&ts("学")).unwrap();
        let p_gaku = gaku.tag_prob(&ts("がく")).unwrap();
        let p_mana = gaku.tag_prob(&ts("まな")).unwrap();
        assert!(p_gaku > p_mana);

        let tags = est.generate(&ts("生学"), 3, 10);
        assert_eq!(ts("せいがく"), tags[0].surface);
    }

    #[test]
    fn test_train_without_pairs() {
        assert!(UnknownTrainer::new(2).train().is_err());
    }
}
