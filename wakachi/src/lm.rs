//! 部分語の読みに対する n-gram 言語モデル
//!
//! 読みの文字列を文字コードの列とみなし、Kneser-Ney 風の絶対値割引で平滑化した
//! バックオフ n-gram モデルを学習します。確率はすべて自然対数で保持します。
//!
//! 系列の左端には [`BOUNDARY`] が `n - 1` 個補われ、右端に1個の [`BOUNDARY`] が続きます。

use hashbrown::HashMap;
use rkyv::{Archive, Deserialize, Serialize};

use crate::errors::{Result, WakachiError};
use crate::string::{TokenChar, TokenString};

/// 系列の端を表す予約済みの文字コード
pub const BOUNDARY: TokenChar = 0;

/// 割引係数を推定できないときに使う値
pub const FALLBACK_DISCOUNT: f64 = 0.5;

/// キーで整列した対数確率の表
#[derive(Clone, Debug, Default, PartialEq, Archive, Serialize, Deserialize)]
pub struct NgramTable {
    keys: Vec<TokenString>,
    values: Vec<f64>,
}

impl NgramTable {
    /// キーと値の組から表を作ります。
    pub fn from_pairs(mut pairs: Vec<(TokenString, f64)>) -> Self {
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs.dedup_by(|a, b| a.0 == b.0);
        let (keys, values) = pairs.into_iter().unzip();
        Self { keys, values }
    }

    /// キーに対応する値を返します。
    pub fn get(&self, key: &[TokenChar]) -> Option<f64> {
        self.keys
            .binary_search_by(|k| k.as_slice().cmp(key))
            .ok()
            .map(|i| self.values[i])
    }

    /// エントリ数を返します。
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// 空かどうかを返します。
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// キーと値の組を返すイテレータです。
    pub fn iter(&self) -> impl Iterator<Item = (&TokenString, f64)> {
        self.keys.iter().zip(self.values.iter().copied())
    }
}

/// n-gram 言語モデル
#[derive(Clone, Debug, PartialEq, Archive, Serialize, Deserialize)]
pub struct LanguageModel {
    n: usize,
    vocab_size: usize,
    probs: NgramTable,
    fallbacks: NgramTable,
}

#[derive(Default)]
struct ContextStats {
    total: f64,
    types: f64,
}

/// 出現回数の分布から割引係数 `n1 / (n1 + 2 n2)` を求めます。
fn discount<'a, I>(counts: I) -> f64
where
    I: Iterator<Item = &'a f64>,
{
    let (mut n1, mut n2) = (0usize, 0usize);
    for &c in counts {
        if c == 1.0 {
            n1 += 1;
        } else if c == 2.0 {
            n2 += 1;
        }
    }
    if n1 == 0 || n2 == 0 {
        FALLBACK_DISCOUNT
    } else {
        n1 as f64 / (n1 as f64 + 2.0 * n2 as f64)
    }
}

impl LanguageModel {
    /// 各部分からモデルを組み立てます。
    ///
    /// # エラー
    ///
    /// `n` または `vocab_size` が0の場合は [`WakachiError`] を返します。
    pub fn from_parts(
        n: usize,
        vocab_size: usize,
        probs: NgramTable,
        fallbacks: NgramTable,
    ) -> Result<Self> {
        if n == 0 || vocab_size == 0 {
            return Err(WakachiError::invalid_argument(
                "n",
                "the order and the vocabulary size of a language model must be positive",
            ));
        }
        Ok(Self {
            n,
            vocab_size,
            probs,
            fallbacks,
        })
    }

    /// 読みのコーパスからモデルを学習します。
    ///
    /// 長さ1から `n` までのすべての n-gram を数え、次数ごとに割引係数を推定します。
    ///
    /// # 引数
    ///
    /// * `n` - 次数
    /// * `corpus` - 読みの列
    ///
    /// # エラー
    ///
    /// `n` が0の場合は [`WakachiError`] を返します。
    pub fn train<'a, I>(n: usize, corpus: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a TokenString>,
    {
        if n == 0 {
            return Err(WakachiError::invalid_argument(
                "n",
                "the order of a language model must be positive",
            ));
        }
        let mut counts: Vec<HashMap<Vec<TokenChar>, f64>> = vec![HashMap::new(); n];
        let mut vocab: hashbrown::HashSet<TokenChar> = hashbrown::HashSet::new();
        vocab.insert(BOUNDARY);
        for seq in corpus {
            let padded = Self::pad(seq.as_slice(), n);
            vocab.extend(seq.iter());
            for j in n - 1..padded.len() {
                for k in 1..=n {
                    *counts[k - 1]
                        .entry(padded[j + 1 - k..=j].to_vec())
                        .or_insert(0.0) += 1.0;
                }
            }
        }

        let mut probs = vec![];
        let mut fallbacks = vec![];
        for (order, table) in counts.iter().enumerate() {
            let d = discount(table.values());
            let mut contexts: HashMap<&[TokenChar], ContextStats> = HashMap::new();
            for (gram, &c) in table {
                let stats = contexts.entry(&gram[..order]).or_default();
                stats.total += c;
                stats.types += 1.0;
            }
            for (gram, &c) in table {
                let stats = &contexts[&gram[..order]];
                probs.push((
                    TokenString::from_slice(gram),
                    ((c - d).max(f64::MIN_POSITIVE) / stats.total).ln(),
                ));
            }
            for (context, stats) in &contexts {
                fallbacks.push((
                    TokenString::from_slice(context),
                    (d * stats.types / stats.total).ln(),
                ));
            }
            log::debug!(
                "language model order {}: {} n-grams, discount {}",
                order + 1,
                table.len(),
                d
            );
        }
        Self::from_parts(
            n,
            vocab.len(),
            NgramTable::from_pairs(probs),
            NgramTable::from_pairs(fallbacks),
        )
    }

    fn pad(seq: &[TokenChar], n: usize) -> Vec<TokenChar> {
        let mut padded = Vec::with_capacity(seq.len() + n);
        padded.resize(n - 1, BOUNDARY);
        padded.extend_from_slice(seq);
        padded.push(BOUNDARY);
        padded
    }

    /// 次数を返します。
    pub const fn n(&self) -> usize {
        self.n
    }

    /// 語彙数を返します。
    pub const fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// n-gram の対数確率の表を返します。
    pub fn probs(&self) -> &NgramTable {
        &self.probs
    }

    /// 文脈ごとのバックオフ重みの表を返します。
    pub fn fallbacks(&self) -> &NgramTable {
        &self.fallbacks
    }

    /// 文脈 `context` に続いて `c` が現れる対数確率を返します。
    ///
    /// 最も長い文脈の n-gram から順に探し、見つからなければバックオフ重みを足して
    /// 短い文脈に移ります。どの次数にもなければ語彙全体の一様分布で下限を与えます。
    /// `context` の末尾 `n - 1` 文字だけが使われます。
    pub fn score_single(&self, context: &[TokenChar], c: TokenChar) -> f64 {
        let mut penalty = 0.0;
        let mut gram = Vec::with_capacity(self.n);
        for k in (1..=self.n).rev() {
            let h = &context[context.len().saturating_sub(k - 1)..];
            if h.len() + 1 < k {
                continue;
            }
            gram.clear();
            gram.extend_from_slice(h);
            gram.push(c);
            if let Some(p) = self.probs.get(&gram) {
                return penalty + p;
            }
            if let Some(f) = self.fallbacks.get(h) {
                penalty += f;
            }
        }
        penalty - (self.vocab_size as f64).ln()
    }

    /// 系列全体の対数確率を返します。終端記号の確率も含みます。
    pub fn score(&self, seq: &TokenString) -> f64 {
        let padded = Self::pad(seq.as_slice(), self.n);
        (self.n - 1..padded.len())
            .map(|j| self.score_single(&padded[j + 1 - self.n..j], padded[j]))
            .sum()
    }

    /// 履歴 `history` に `ext` を続けたときの対数確率の増分を返します。
    pub fn score_extension(&self, history: &[TokenChar], ext: &[TokenChar]) -> f64 {
        let mut buf = Self::pad(history, self.n);
        buf.pop();
        let mut total = 0.0;
        for &c in ext {
            total += self.score_single(&buf, c);
            buf.push(c);
        }
        total
    }

    /// 履歴 `history` の後に系列が終わる対数確率を返します。
    pub fn score_end(&self, history: &[TokenChar]) -> f64 {
        let mut buf = Self::pad(history, self.n);
        buf.pop();
        self.score_single(&buf, BOUNDARY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<TokenString> {
        ["がく", "がくしゅう", "しゅう", "がっこう", "こう", "こう"]
            .iter()
            .map(|s| TokenString::from(*s))
            .collect()
    }

    #[test]
    fn test_seen_beats_unseen() {
        let lm = LanguageModel::train(2, &corpus()).unwrap();
        let seen = lm.score(&TokenString::from("がく"));
        let unseen = lm.score(&TokenString::from("ぬぬ"));
        assert!(seen > unseen);
        assert!(seen < 0.0);
    }

    #[test]
    fn test_score_is_sum_of_extensions() {
        let lm = LanguageModel::train(3, &corpus()).unwrap();
        let s = TokenString::from("がくしゅう");
        let whole = lm.score(&s);
        let prefix = &s.as_slice()[..2];
        let rest = &s.as_slice()[2..];
        let parts = lm.score_extension(&[], prefix)
            + lm.score_extension(prefix, rest)
            + lm.score_end(s.as_slice());
        assert!((whole - parts).abs() < 1e-9);
    }

    #[test]
    fn test_unigram_floor() {
        let lm = LanguageModel::train(1, &corpus()).unwrap();
        let unseen = lm.score_single(&[], TokenString::from("ぬ").get(0));
        let fallback = lm.fallbacks().get(&[]).unwrap();
        let floor = -(lm.vocab_size() as f64).ln();
        assert!((unseen - (fallback + floor)).abs() < 1e-12);
    }

    #[test]
    fn test_discount_fallback() {
        assert_eq!(FALLBACK_DISCOUNT, discount([1.0, 1.0, 3.0].iter()));
        assert!((discount([1.0, 1.0, 2.0].iter()) - 0.5).abs() < 1e-12);
        assert!((discount([1.0, 1.0, 1.0, 2.0].iter()) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_zero_order_is_an_error() {
        assert!(LanguageModel::train(0, &corpus()).is_err());
    }
}
