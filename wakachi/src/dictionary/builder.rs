//! パターン辞書を構築するためのビルダー
//!
//! 同じキーが複数回追加された場合は、呼び出し側が与える関数でエントリを統合します。
//! 構築前であればエントリを書き換えることもできます。

use std::collections::BTreeMap;

use crate::dictionary::PatternDictionary;
use crate::errors::Result;
use crate::string::TokenString;

/// [`PatternDictionary`] を構築するビルダー
#[derive(Clone, Debug)]
pub struct DictionaryBuilder<E> {
    map: BTreeMap<TokenString, E>,
}

impl<E> Default for DictionaryBuilder<E> {
    fn default() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }
}

impl<E> DictionaryBuilder<E> {
    /// 空のビルダーを作成します。
    pub fn new() -> Self {
        Self::default()
    }

    /// エントリを追加します。
    ///
    /// キーが既にある場合は `merge(既存, 新規)` で統合します。
    ///
    /// # 引数
    ///
    /// * `key` - キー
    /// * `entry` - エントリ
    /// * `merge` - 統合関数
    pub fn insert_with<F>(&mut self, key: TokenString, entry: E, merge: F)
    where
        F: FnOnce(&mut E, E),
    {
        match self.map.get_mut(&key) {
            Some(existing) => merge(existing, entry),
            None => {
                self.map.insert(key, entry);
            }
        }
    }

    /// キーに対応するエントリを返します。なければ `default` で作成します。
    pub fn entry_or_insert_with<F>(&mut self, key: TokenString, default: F) -> &mut E
    where
        F: FnOnce() -> E,
    {
        self.map.entry(key).or_insert_with(default)
    }

    /// 構築前のエントリを書き換えるための参照を返します。
    pub fn get_mut(&mut self, key: &TokenString) -> Option<&mut E> {
        self.map.get_mut(key)
    }

    /// エントリ数を返します。
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// エントリがないかどうかを返します。
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// 辞書を構築します。
    ///
    /// # エラー
    ///
    /// エントリが1つもない場合は [`WakachiError`](crate::errors::WakachiError) を返します。
    pub fn build(self) -> Result<PatternDictionary<E>> {
        PatternDictionary::from_map(self.map)
    }
}

impl<E> FromIterator<(TokenString, E)> for DictionaryBuilder<E> {
    fn from_iter<I: IntoIterator<Item = (TokenString, E)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}
