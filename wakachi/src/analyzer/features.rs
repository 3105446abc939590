//! 名前付き素性の抽出
//!
//! 参照表を使った計算と同じ素性を名前として列挙します。
//! 単語ごとの局所分類器のスコア計算に使われます。

use hashbrown::HashSet;

use crate::dictionary::{PatternDictionary, WordEntry};
use crate::model::ModelParams;
use crate::model::feature_name::{self, DictRole};
use crate::sentence::Sentence;
use crate::string::{TokenChar, TokenString};

/// 文から素性名を抽出します。
pub struct FeatureExtractor<'a> {
    params: &'a ModelParams,
    num_dicts: usize,
}

/// 境界 `b` の窓に収まる n-gram の素性名を追加します。
fn push_window_ngrams(
    text: &TokenString,
    b: usize,
    window: usize,
    n: usize,
    make: fn(usize, &[TokenChar]) -> TokenString,
    out: &mut Vec<TokenString>,
) {
    let chars = text.as_slice();
    let width = 2 * window;
    for offset in 0..width {
        let Some(start) = (b + 1 + offset).checked_sub(window) else {
            continue;
        };
        for g in 1..=n.min(width - offset) {
            if start + g > chars.len() {
                break;
            }
            out.push(make(offset, &chars[start..start + g]));
        }
    }
}

/// 範囲 `[lo, hi)` に完全に収まる n-gram の素性名を追加します。窓内の位置は `offset_of` で求めます。
fn push_context_ngrams(
    text: &TokenString,
    lo: usize,
    hi: usize,
    n: usize,
    offset_of: impl Fn(usize) -> usize,
    make: fn(usize, &[TokenChar]) -> TokenString,
    out: &mut Vec<TokenString>,
) {
    let chars = text.as_slice();
    for s in lo..hi {
        for g in 1..=n.min(hi - s) {
            out.push(make(offset_of(s), &chars[s..s + g]));
        }
    }
}

impl<'a> FeatureExtractor<'a> {
    /// 新しい抽出器を作成します。
    pub fn new(params: &'a ModelParams, num_dicts: usize) -> Self {
        Self { params, num_dicts }
    }

    /// 境界 `b` の文字・文字種 n-gram の素性名を返します。
    pub fn boundary_features(&self, sent: &Sentence, b: usize) -> Vec<TokenString> {
        let p = self.params;
        let mut out = vec![];
        push_window_ngrams(sent.norm(), b, p.char_window, p.char_n, feature_name::char_ngram, &mut out);
        push_window_ngrams(sent.types(), b, p.type_window, p.type_n, feature_name::type_ngram, &mut out);
        out
    }

    /// すべての境界の素性名を返します。
    ///
    /// 単語辞書が与えられた場合は辞書素性も加えます。同じ辞書素性は境界ごとに一度だけ現れます。
    pub fn all_boundary_features(
        &self,
        sent: &Sentence,
        words: Option<&PatternDictionary<WordEntry>>,
    ) -> Vec<Vec<TokenString>> {
        let nb = sent.len().saturating_sub(1);
        let mut feats: Vec<Vec<TokenString>> =
            (0..nb).map(|b| self.boundary_features(sent, b)).collect();
        let Some(words) = words else {
            return feats;
        };
        let max_len = self.params.dict_max_len;
        if max_len == 0 {
            return feats;
        }
        let mut fired: Vec<HashSet<(usize, DictRole, usize)>> = vec![HashSet::new(); nb];
        for m in words.matches(sent.surface()) {
            let entry = words.entry(m.entry);
            let len = entry.word().len();
            let bucket = len.min(max_len);
            let (start, end) = (m.end + 1 - len, m.end);
            for dict in (0..self.num_dicts).filter(|&d| entry.is_in_dict(d)) {
                if start > 0 {
                    fired[start - 1].insert((dict, DictRole::Left, bucket));
                }
                if end < nb {
                    fired[end].insert((dict, DictRole::Right, bucket));
                }
                for set in &mut fired[start..end] {
                    set.insert((dict, DictRole::Inside, bucket));
                }
            }
        }
        for (f, set) in feats.iter_mut().zip(fired) {
            f.extend(set.into_iter().map(|(d, r, l)| feature_name::dict(d, r, l)));
        }
        feats
    }

    /// 範囲 `[start, end)` の単語の左右の文脈の n-gram の素性名を返します。
    pub fn tag_context_features(&self, sent: &Sentence, start: usize, end: usize) -> Vec<TokenString> {
        let p = self.params;
        let mut out = vec![];
        for (text, window, n, make) in [
            (sent.norm(), p.char_window, p.char_n, feature_name::char_ngram as fn(usize, &[TokenChar]) -> TokenString),
            (sent.types(), p.type_window, p.type_n, feature_name::type_ngram),
        ] {
            let lo = start.saturating_sub(window);
            push_context_ngrams(text, lo, start, n, |s| s + window - start, make, &mut out);
            let hi = (end + window).min(text.len());
            push_context_ngrams(text, end, hi, n, |s| window + s - end, make, &mut out);
        }
        out
    }

    /// 大域分類器に与える単語の素性名を返します。
    ///
    /// # 引数
    ///
    /// * `sent` - 文
    /// * `start` - 単語の開始位置
    /// * `end` - 単語の終了位置
    /// * `entry` - 単語辞書のエントリ
    /// * `level` - タグレベル
    /// * `tags` - 大域分類器のタグ集合
    pub fn tag_features(
        &self,
        sent: &Sentence,
        start: usize,
        end: usize,
        entry: Option<&WordEntry>,
        level: usize,
        tags: &[TokenString],
    ) -> Vec<TokenString> {
        let mut out = self.tag_context_features(sent, start, end);
        out.push(feature_name::self_word(&sent.surface().substring(start, end - start)));
        match entry.filter(|e| e.in_dict() != 0) {
            Some(entry) => out.extend(
                tag_dict_pairs(entry, level, tags, self.num_dicts)
                    .into_iter()
                    .map(|(d, t)| feature_name::tag_dict(d, t)),
            ),
            None => out.push(feature_name::unknown()),
        }
        out
    }
}

/// 単語のタグ候補が所属する辞書とタグ集合中の番号の組を返します。
///
/// タグ集合にない候補は無視されます。
pub fn tag_dict_pairs(
    entry: &WordEntry,
    level: usize,
    tags: &[TokenString],
    num_dicts: usize,
) -> Vec<(usize, usize)> {
    let mut pairs = vec![];
    for (i, tag) in entry.tags(level).iter().enumerate() {
        let Some(t) = tags.iter().position(|x| x == tag) else {
            continue;
        };
        for dict in 0..num_dicts {
            if entry.tag_in_dict(level, i, dict) {
                pairs.push((dict, t));
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::encoding::Utf16Encoder;

    fn ts(s: &str) -> TokenString {
        TokenString::from(s)
    }

    fn params() -> ModelParams {
        ModelParams {
            char_window: 1,
            char_n: 2,
            type_window: 1,
            type_n: 1,
            dict_max_len: 2,
            num_levels: 1,
        }
    }

    #[test]
    fn test_boundary_features() {
        let p = params();
        let ex = FeatureExtractor::new(&p, 0);
        let sent = Sentence::new(ts("abc"), &Utf16Encoder);
        let mut f = ex.boundary_features(&sent, 0);
        f.sort();
        let mut expected = vec![
            feature_name::char_ngram(0, ts("a").as_slice()),
            feature_name::char_ngram(0, ts("ab").as_slice()),
            feature_name::char_ngram(1, ts("b").as_slice()),
            feature_name::type_ngram(0, &sent.types().as_slice()[0..1]),
            feature_name::type_ngram(1, &sent.types().as_slice()[1..2]),
        ];
        expected.sort();
        assert_eq!(expected, f);
    }

    #[test]
    fn test_dict_features_are_deduplicated() {
        let p = params();
        let ex = FeatureExtractor::new(&p, 1);
        let mut entry = WordEntry::new(ts("bc"));
        entry.set_in_dict(0).unwrap();
        let mut map = std::collections::BTreeMap::new();
        map.insert(ts("bc"), entry);
        let words = PatternDictionary::from_map(map).unwrap();
        let sent = Sentence::new(ts("abcbc"), &Utf16Encoder);
        let feats = ex.all_boundary_features(&sent, Some(&words));
        let left = feature_name::dict(0, DictRole::Left, 2);
        let inside = feature_name::dict(0, DictRole::Inside, 2);
        let right = feature_name::dict(0, DictRole::Right, 2);
        assert!(feats[0].contains(&left));
        assert!(feats[1].contains(&inside));
        // "bc" ends at 2 and the next "bc" starts at 3.
        assert_eq!(1, feats[2].iter().filter(|f| **f == right).count());
        assert!(feats[2].contains(&left));
        assert!(feats[3].contains(&inside));
    }

    #[test]
    fn test_tag_context_features() {
        let p = params();
        let ex = FeatureExtractor::new(&p, 0);
        let sent = Sentence::new(ts("abcd"), &Utf16Encoder);
        let f = ex.tag_context_features(&sent, 1, 3);
        assert!(f.contains(&feature_name::char_ngram(0, ts("a").as_slice())));
        assert!(f.contains(&feature_name::char_ngram(1, ts("d").as_slice())));
        assert_eq!(4, f.len());
    }

    #[test]
    fn test_tag_dict_pairs() {
        let mut entry = WordEntry::new(ts("これ"));
        entry.set_in_dict(1).unwrap();
        entry.add_tag(0, ts("代名詞"), 1).unwrap();
        entry.add_tag(0, ts("名詞"), 0).unwrap();
        entry.add_tag(0, ts("未知"), 0).unwrap();
        let tags = [ts("名詞"), ts("代名詞")];
        assert_eq!(vec![(1, 1), (0, 0)], tag_dict_pairs(&entry, 0, &tags, 2));
    }
}
