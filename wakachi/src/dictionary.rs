//! Aho-Corasick 法によるパターン辞書
//!
//! キー（[`TokenString`]）から任意のエントリへの写像を保持し、
//! テキスト中に現れるすべてのキーを一度の走査で列挙します。
//! 単語辞書、部分語の読み辞書、コンパイル済み素性表のいずれもこの辞書を使います。
//!
//! # 例
//!
//! ```
//! use std::collections::BTreeMap;
//! use wakachi::dictionary::PatternDictionary;
//! use wakachi::TokenString;
//!
//! let mut map = BTreeMap::new();
//! map.insert(TokenString::from("学習"), 1);
//! map.insert(TokenString::from("習"), 2);
//! let dict = PatternDictionary::from_map(map)?;
//!
//! let found: Vec<_> = dict
//!     .matches(&TokenString::from("学習する"))
//!     .into_iter()
//!     .map(|m| (m.end, *dict.entry(m.entry)))
//!     .collect();
//! assert_eq!(vec![(1, 1), (1, 2)], found);
//! # Ok::<(), wakachi::errors::WakachiError>(())
//! ```
pub mod builder;
pub mod entry;
pub mod state;

use std::collections::{BTreeMap, VecDeque};

use rkyv::{Archive, Deserialize, Serialize};

use crate::dictionary::state::{DictionaryState, ROOT};
use crate::errors::{Result, WakachiError};
use crate::string::{TokenChar, TokenString};
use crate::utils::FromU32;

pub use crate::dictionary::builder::DictionaryBuilder;
pub use crate::dictionary::entry::{FeatureVector, ProbTagEntry, WordEntry};

/// 1つのエントリが所属できる辞書の最大数
///
/// 所属は8ビットのビットマスクで表されます。
pub const MAX_DICTIONARIES: usize = 8;

/// 照合結果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DictMatch {
    /// キーの末尾の文字位置（この位置を含む）
    pub end: usize,

    /// エントリの添字
    pub entry: usize,
}

/// キーからエントリへの写像を持つ Aho-Corasick オートマトン
///
/// エントリは辞書が所有し、照合結果は添字で参照されます。
#[derive(Clone, Debug, Archive, Serialize, Deserialize)]
pub struct PatternDictionary<E> {
    states: Vec<DictionaryState>,
    keys: Vec<TokenString>,
    entries: Vec<E>,
}

impl<E> PatternDictionary<E> {
    /// 整列済みのキーとエントリの対応から辞書を構築します。
    ///
    /// # エラー
    ///
    /// キーが1つもない場合、または空のキーを含む場合は [`WakachiError`] を返します。
    pub fn from_map(map: BTreeMap<TokenString, E>) -> Result<Self> {
        if map.is_empty() {
            return Err(WakachiError::invalid_argument(
                "map",
                "a pattern dictionary must contain at least one key",
            ));
        }
        let mut keys = Vec::with_capacity(map.len());
        let mut entries = Vec::with_capacity(map.len());
        for (key, entry) in map {
            if key.is_empty() {
                return Err(WakachiError::invalid_argument(
                    "map",
                    "a pattern dictionary cannot contain an empty key",
                ));
            }
            keys.push(key);
            entries.push(entry);
        }
        u32::try_from(keys.len())?;

        let mut dict = Self {
            states: vec![DictionaryState::default()],
            keys,
            entries,
        };
        dict.build_goto(0, dict.keys.len(), 0, ROOT);
        dict.build_failure();
        log::debug!(
            "built a pattern dictionary with {} keys and {} states",
            dict.keys.len(),
            dict.states.len()
        );
        Ok(dict)
    }

    /// 共通接頭辞ごとにキーを分割してトライを作ります。
    ///
    /// `keys[lo..hi]` は長さ `depth` の共通接頭辞を持ち、状態 `state` に対応します。
    fn build_goto(&mut self, lo: usize, hi: usize, depth: usize, state: u32) {
        let mut i = lo;
        // Sorted order puts the key equal to the prefix itself first.
        while i < hi && self.keys[i].len() == depth {
            let s = &mut self.states[usize::from_u32(state)];
            s.output.push(i as u32);
            s.is_branch = true;
            i += 1;
        }
        while i < hi {
            let c = self.keys[i].get(depth);
            let mut j = i + 1;
            while j < hi && self.keys[j].get(depth) == c {
                j += 1;
            }
            let child = self.states.len() as u32;
            self.states.push(DictionaryState::default());
            self.states[usize::from_u32(state)].gotos.push((c, child));
            self.build_goto(i, j, depth + 1, child);
            i = j;
        }
    }

    /// 幅優先で失敗リンクを計算し、失敗先の出力を取り込みます。
    fn build_failure(&mut self) {
        let mut queue = VecDeque::new();
        for &(_, s) in &self.states[usize::from_u32(ROOT)].gotos {
            queue.push_back(s);
        }
        while let Some(r) = queue.pop_front() {
            let gotos = self.states[usize::from_u32(r)].gotos.clone();
            for (a, s) in gotos {
                queue.push_back(s);
                let mut st = self.states[usize::from_u32(r)].failure;
                let dest = loop {
                    if let Some(t) = self.states[usize::from_u32(st)].goto(a) {
                        break t;
                    }
                    if st == ROOT {
                        break ROOT;
                    }
                    st = self.states[usize::from_u32(st)].failure;
                };
                let inherited = self.states[usize::from_u32(dest)].output.clone();
                let child = &mut self.states[usize::from_u32(s)];
                child.failure = dest;
                child.output.extend(inherited);
            }
        }
    }

    /// 状態 `state` から文字 `c` で遷移した先を返します。
    ///
    /// 遷移がない場合は根（0）を返すため、「遷移なし」と「根への遷移」は区別されません。
    #[inline(always)]
    pub fn step(&self, state: u32, c: TokenChar) -> u32 {
        self.states[usize::from_u32(state)].goto(c).unwrap_or(ROOT)
    }

    /// テキスト中に現れるすべてのキーを列挙します。
    ///
    /// 各キーの出現は、その末尾の位置とともに一度ずつ報告されます。
    pub fn matches(&self, text: &TokenString) -> Vec<DictMatch> {
        let mut results = vec![];
        let mut state = ROOT;
        for (i, c) in text.iter().enumerate() {
            state = loop {
                let s = &self.states[usize::from_u32(state)];
                if let Some(t) = s.goto(c) {
                    break t;
                }
                if state == ROOT {
                    break ROOT;
                }
                state = s.failure;
            };
            for &e in self.states[usize::from_u32(state)].output() {
                results.push(DictMatch {
                    end: i,
                    entry: usize::from_u32(e),
                });
            }
        }
        results
    }

    /// キーに完全一致するエントリの添字を返します。
    ///
    /// 経路上の状態を通過するだけではなく、最終状態がキーの終端である必要があります。
    pub fn find_index(&self, key: &TokenString) -> Option<usize> {
        let mut state = ROOT;
        for c in key.iter() {
            state = self.states[usize::from_u32(state)].goto(c)?;
        }
        let s = &self.states[usize::from_u32(state)];
        if s.is_branch() {
            s.output().first().map(|&e| usize::from_u32(e))
        } else {
            None
        }
    }

    /// キーに完全一致するエントリを返します。
    pub fn find_entry(&self, key: &TokenString) -> Option<&E> {
        self.find_index(key).map(|i| &self.entries[i])
    }

    /// エントリ数を返します。
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// エントリがないかどうかを返します。構築済みの辞書では常に偽です。
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 状態数を返します。
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// 状態を返します。
    pub fn state(&self, i: u32) -> &DictionaryState {
        &self.states[usize::from_u32(i)]
    }

    /// `i` 番目のエントリを返します。
    #[inline(always)]
    pub fn entry(&self, i: usize) -> &E {
        &self.entries[i]
    }

    /// `i` 番目のエントリのキーを返します。
    #[inline(always)]
    pub fn key(&self, i: usize) -> &TokenString {
        &self.keys[i]
    }

    /// すべてのエントリを返します。
    pub fn entries(&self) -> &[E] {
        &self.entries
    }

    /// キーとエントリの組を返すイテレータです。
    pub fn iter(&self) -> impl Iterator<Item = (&TokenString, &E)> {
        self.keys.iter().zip(self.entries.iter())
    }

    /// キーとエントリの組に分解します。
    pub fn into_parts(self) -> (Vec<TokenString>, Vec<E>) {
        (self.keys, self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(keys: &[&str]) -> PatternDictionary<usize> {
        let map: BTreeMap<_, _> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| (TokenString::from(*k), i))
            .collect();
        PatternDictionary::from_map(map).unwrap()
    }

    fn brute_force(keys: &[&str], text: &str) -> Vec<(usize, String)> {
        let chars: Vec<char> = text.chars().collect();
        let mut found = vec![];
        for end in 0..chars.len() {
            for k in keys {
                let kc: Vec<char> = k.chars().collect();
                if kc.len() <= end + 1 && chars[end + 1 - kc.len()..=end] == kc[..] {
                    found.push((end, k.to_string()));
                }
            }
        }
        found.sort();
        found
    }

    fn reported(dict: &PatternDictionary<usize>, text: &str) -> Vec<(usize, String)> {
        let mut found: Vec<_> = dict
            .matches(&TokenString::from(text))
            .into_iter()
            .map(|m| (m.end, dict.key(m.entry).to_string()))
            .collect();
        found.sort();
        found
    }

    #[test]
    fn test_matches_all_occurrences() {
        let keys = ["he", "she", "his", "hers", "h"];
        let dict = build(&keys);
        for text in ["ushers", "hishers", "shehe", "", "xyz", "hhh"] {
            assert_eq!(brute_force(&keys, text), reported(&dict, text), "{}", text);
        }
    }

    #[test]
    fn test_matches_japanese() {
        let keys = ["これ", "は", "学習", "学", "データ", "です", "す", "習デ"];
        let dict = build(&keys);
        let text = "これは学習データです。";
        assert_eq!(brute_force(&keys, text), reported(&dict, text));
    }

    #[test]
    fn test_find_entry_requires_exact_key() {
        let dict = build(&["abc", "bc"]);
        assert_eq!(Some(&0), dict.find_entry(&TokenString::from("abc")));
        assert_eq!(Some(&1), dict.find_entry(&TokenString::from("bc")));
        // "ab" is a passthrough state whose output is empty.
        assert_eq!(None, dict.find_entry(&TokenString::from("ab")));
        assert_eq!(None, dict.find_entry(&TokenString::from("abcd")));
        assert_eq!(None, dict.find_entry(&TokenString::from("c")));
    }

    #[test]
    fn test_find_entry_ignores_inherited_output() {
        // State "ab" inherits the output of "b" through its failure link.
        let dict = build(&["abc", "b"]);
        let ab = dict.step(dict.step(0, u16::from(b'a')), u16::from(b'b'));
        assert!(!dict.state(ab).output().is_empty());
        assert_eq!(None, dict.find_entry(&TokenString::from("ab")));
    }

    #[test]
    fn test_step_returns_root_on_missing_edge() {
        let dict = build(&["ab"]);
        assert_eq!(0, dict.step(0, u16::from(b'z')));
        assert_ne!(0, dict.step(0, u16::from(b'a')));
    }

    #[test]
    fn test_failure_links_are_acyclic() {
        let dict = build(&["aaa", "aa", "a", "ba", "aab"]);
        for i in 0..dict.num_states() as u32 {
            let mut s = i;
            let mut hops = 0;
            while s != 0 {
                s = dict.state(s).failure();
                hops += 1;
                assert!(hops <= dict.num_states());
            }
        }
    }

    #[test]
    fn test_empty_dictionary_is_an_error() {
        let map: BTreeMap<TokenString, usize> = BTreeMap::new();
        assert!(PatternDictionary::from_map(map).is_err());
    }

    #[test]
    fn test_empty_key_is_an_error() {
        let mut map = BTreeMap::new();
        map.insert(TokenString::from(""), 0);
        assert!(PatternDictionary::from_map(map).is_err());
    }
}
