//! パターン辞書のオートマトン状態
//!
//! 状態はすべて辞書が持つ配列に格納され、遷移先・失敗リンク・出力は
//! いずれも配列の添字で表されます。

use rkyv::{Archive, Deserialize, Serialize};

use crate::string::TokenChar;

/// 根状態の添字
pub const ROOT: u32 = 0;

/// オートマトンの1状態
#[derive(Clone, Debug, Default, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct DictionaryState {
    /// 文字コードで整列した遷移
    pub(crate) gotos: Vec<(TokenChar, u32)>,

    /// 失敗リンク
    pub(crate) failure: u32,

    /// この状態で終わるエントリの添字
    ///
    /// 失敗リンク先の出力も構築時に追加されるため、接尾辞として含まれる
    /// より短いキーもここに現れます。自身のキーがある場合は先頭に置かれます。
    pub(crate) output: Vec<u32>,

    /// キーの終端そのものである状態か
    pub(crate) is_branch: bool,
}

impl DictionaryState {
    /// `c` による遷移先を返します。
    #[inline(always)]
    pub fn goto(&self, c: TokenChar) -> Option<u32> {
        self.gotos
            .binary_search_by_key(&c, |&(k, _)| k)
            .ok()
            .map(|i| self.gotos[i].1)
    }

    /// 失敗リンクを返します。
    #[inline(always)]
    pub const fn failure(&self) -> u32 {
        self.failure
    }

    /// 出力エントリの添字を返します。
    #[inline(always)]
    pub fn output(&self) -> &[u32] {
        &self.output
    }

    /// キーの終端かどうかを返します。
    #[inline(always)]
    pub const fn is_branch(&self) -> bool {
        self.is_branch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goto_binary_search() {
        let state = DictionaryState {
            gotos: vec![(1, 3), (5, 4), (9, 7)],
            ..Default::default()
        };
        assert_eq!(Some(4), state.goto(5));
        assert_eq!(Some(7), state.goto(9));
        assert_eq!(None, state.goto(2));
    }
}
