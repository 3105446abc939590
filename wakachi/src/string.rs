//! 解析器内部の文字列表現
//!
//! 入力テキストは 16 ビットの文字コード列 [`TokenString`] に変換されてから
//! 辞書照合や素性抽出に渡されます。バッファは参照カウントで共有され、
//! 書き込み時にのみ複製されます。

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Index;
use std::sync::Arc;

use rkyv::{Archive, Deserialize, Serialize};

/// 1文字を表すコード
pub type TokenChar = u16;

/// 不変で共有可能な文字コード列
///
/// 複製は参照カウントの増加のみで行われます。[`set`](Self::set) などの書き込みは、
/// バッファが他のハンドルからも参照されている場合に限り先に複製を作ります。
/// 等価性・順序・ハッシュは内容のみで決まり、バッファの同一性には依存しません。
#[derive(Clone, Default, Archive, Serialize, Deserialize)]
pub struct TokenString {
    buf: Arc<Vec<TokenChar>>,
}

impl TokenString {
    /// 文字コード列から新しい文字列を作成します。
    pub fn new(chars: Vec<TokenChar>) -> Self {
        Self {
            buf: Arc::new(chars),
        }
    }

    /// スライスをコピーして新しい文字列を作成します。
    pub fn from_slice(chars: &[TokenChar]) -> Self {
        Self::new(chars.to_vec())
    }

    /// 1文字からなる文字列を作成します。
    pub fn from_char(c: TokenChar) -> Self {
        Self::new(vec![c])
    }

    /// 文字数を返します。
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// 空文字列かどうかを返します。
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// `i` 番目の文字コードを返します。
    ///
    /// 範囲外の添字はプログラムの誤りです。通常はメッセージ付きでパニックしますが、
    /// `unchecked` フィーチャーを有効にしたデバッグアサーションなしのビルドでは
    /// 検査を行いません。
    #[inline(always)]
    pub fn get(&self, i: usize) -> TokenChar {
        #[cfg(all(feature = "unchecked", not(debug_assertions)))]
        {
            // SAFETY: the caller guarantees `i < self.len()` in unchecked builds.
            unsafe { *self.buf.get_unchecked(i) }
        }
        #[cfg(not(all(feature = "unchecked", not(debug_assertions))))]
        {
            match self.buf.get(i) {
                Some(&c) => c,
                None => panic!(
                    "token string index out of bounds: the len is {} but the index is {}",
                    self.len(),
                    i
                ),
            }
        }
    }

    /// 文字コード列への参照を返します。
    #[inline(always)]
    pub fn as_slice(&self) -> &[TokenChar] {
        &self.buf
    }

    /// 文字コードのイテレータを返します。
    #[inline(always)]
    pub fn iter(&self) -> impl Iterator<Item = TokenChar> + '_ {
        self.buf.iter().copied()
    }

    /// `start` から `len` 文字の部分文字列を返します。
    pub fn substring(&self, start: usize, len: usize) -> Self {
        Self::check_range(self.len(), start, len);
        Self::from_slice(&self.buf[start..start + len])
    }

    /// `start` から末尾までの部分文字列を返します。
    pub fn substring_from(&self, start: usize) -> Self {
        Self::check_range(self.len(), start, 0);
        Self::from_slice(&self.buf[start..])
    }

    #[inline(always)]
    fn check_range(total: usize, start: usize, len: usize) {
        #[cfg(not(all(feature = "unchecked", not(debug_assertions))))]
        if start + len > total {
            panic!(
                "token string range out of bounds: {}..{} for length {}",
                start,
                start + len,
                total
            );
        }
        #[cfg(all(feature = "unchecked", not(debug_assertions)))]
        let _ = (total, start, len);
    }

    /// 2つの文字列を連結した新しい文字列を返します。
    ///
    /// 結果の長さちょうどのバッファが新たに確保されます。
    pub fn concat(&self, other: &Self) -> Self {
        let mut chars = Vec::with_capacity(self.len() + other.len());
        chars.extend_from_slice(&self.buf);
        chars.extend_from_slice(&other.buf);
        Self::new(chars)
    }

    /// 末尾に1文字を追加します。
    ///
    /// 他のハンドルと共有していても影響しないよう、常に新しいバッファを確保します。
    pub fn push(&mut self, c: TokenChar) {
        let mut chars = Vec::with_capacity(self.len() + 1);
        chars.extend_from_slice(&self.buf);
        chars.push(c);
        self.buf = Arc::new(chars);
    }

    /// 末尾に文字列を追加します。
    pub fn append(&mut self, other: &Self) {
        *self = self.concat(other);
    }

    /// `i` 番目の文字を書き換えます。
    ///
    /// バッファが共有されている場合は先に複製されるため、
    /// 他のハンドルから見える内容は変わりません。
    pub fn set(&mut self, i: usize, c: TokenChar) {
        Self::check_range(self.len(), i, 1);
        Arc::make_mut(&mut self.buf)[i] = c;
    }

    /// 共有されているハンドルの数を返します。
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.buf)
    }

    /// `prefix` で始まるかどうかを返します。
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.buf.starts_with(&prefix.buf)
    }

    /// 内容のみから決まる乗算型ローリングハッシュを返します。
    ///
    /// ハッシュマップのキーとしてのみ使用され、衝突は許容されます。
    pub fn stable_hash(&self) -> u64 {
        self.buf.iter().fold(0u64, |h, &c| {
            h.wrapping_mul(37).wrapping_add(u64::from(c))
        })
    }

    /// 区切り文字集合で分割するイテレータを返します。
    ///
    /// 空の区間は返しません。`include_delims` が真の場合、
    /// 区切り文字自身も1文字の文字列として返します。
    pub fn tokenize<'a>(&'a self, delims: &'a [TokenChar], include_delims: bool) -> Tokens<'a> {
        Tokens {
            src: self,
            delims,
            include_delims,
            pos: 0,
        }
    }
}

impl PartialEq for TokenString {
    fn eq(&self, other: &Self) -> bool {
        self.buf.as_slice() == other.buf.as_slice()
    }
}

impl Eq for TokenString {}

impl PartialOrd for TokenString {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TokenString {
    fn cmp(&self, other: &Self) -> Ordering {
        self.buf.as_slice().cmp(other.buf.as_slice())
    }
}

impl Hash for TokenString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.stable_hash());
    }
}

impl Index<usize> for TokenString {
    type Output = TokenChar;

    #[inline(always)]
    fn index(&self, i: usize) -> &TokenChar {
        Self::check_range(self.len(), i, 1);
        #[cfg(all(feature = "unchecked", not(debug_assertions)))]
        {
            // SAFETY: the caller guarantees `i < self.len()` in unchecked builds.
            unsafe { self.buf.get_unchecked(i) }
        }
        #[cfg(not(all(feature = "unchecked", not(debug_assertions))))]
        {
            &self.buf[i]
        }
    }
}

impl From<Vec<TokenChar>> for TokenString {
    fn from(chars: Vec<TokenChar>) -> Self {
        Self::new(chars)
    }
}

impl fmt::Debug for TokenString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenString({:?})", self.to_string())
    }
}

impl fmt::Display for TokenString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in char::decode_utf16(self.buf.iter().copied()) {
            write!(f, "{}", c.unwrap_or(char::REPLACEMENT_CHARACTER))?;
        }
        Ok(())
    }
}

/// [`TokenString::tokenize`] が返す遅延イテレータ
///
/// 一度走査し終えると再開できません。
pub struct Tokens<'a> {
    src: &'a TokenString,
    delims: &'a [TokenChar],
    include_delims: bool,
    pos: usize,
}

impl Iterator for Tokens<'_> {
    type Item = TokenString;

    fn next(&mut self) -> Option<TokenString> {
        let chars = self.src.as_slice();
        while self.pos < chars.len() {
            let start = self.pos;
            if self.delims.contains(&chars[start]) {
                self.pos += 1;
                if self.include_delims {
                    return Some(TokenString::from_char(chars[start]));
                }
                continue;
            }
            let end = chars[start..]
                .iter()
                .position(|c| self.delims.contains(c))
                .map_or(chars.len(), |p| start + p);
            self.pos = end;
            return Some(TokenString::from_slice(&chars[start..end]));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;

    use super::*;

    fn ts(s: &str) -> TokenString {
        TokenString::new(s.encode_utf16().collect())
    }

    fn hash_of(s: &TokenString) -> u64 {
        let mut h = DefaultHasher::new();
        s.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_equal_contents_compare_and_hash_equal() {
        let a = ts("学習データ");
        let b = ts("学習").concat(&ts("データ"));
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(a.stable_hash(), b.stable_hash());
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        assert!(ts("ab") < ts("abc"));
        assert!(ts("abc") < ts("abd"));
        assert!(ts("") < ts("a"));
    }

    #[test]
    fn test_substring() {
        let s = ts("これは学習");
        assert_eq!(ts("は学"), s.substring(2, 2));
        assert_eq!(ts("学習"), s.substring_from(3));
        assert_eq!(ts(""), s.substring_from(5));
        assert!(s.starts_with(&ts("これ")));
        assert!(!s.starts_with(&ts("それ")));
    }

    #[test]
    fn test_copy_on_write() {
        let a = ts("abc");
        let mut b = a.clone();
        assert_eq!(2, a.ref_count());
        b.set(0, u16::from(b'x'));
        assert_eq!(ts("abc"), a);
        assert_eq!(ts("xbc"), b);
        assert_eq!(1, a.ref_count());

        let mut c = a.clone();
        c.push(u16::from(b'd'));
        assert_eq!(ts("abc"), a);
        assert_eq!(ts("abcd"), c);
    }

    #[test]
    fn test_tokenize() {
        let s = ts("a b  c");
        let delims = [u16::from(b' ')];
        let words: Vec<_> = s.tokenize(&delims, false).collect();
        assert_eq!(vec![ts("a"), ts("b"), ts("c")], words);

        let with_delims: Vec<_> = s.tokenize(&delims, true).collect();
        assert_eq!(6, with_delims.len());
        assert_eq!(ts(" "), with_delims[1]);

        let mut it = s.tokenize(&delims, false);
        assert_eq!(3, it.by_ref().count());
        assert!(it.next().is_none());
    }

    #[test]
    #[cfg(not(all(feature = "unchecked", not(debug_assertions))))]
    #[should_panic(expected = "out of bounds")]
    fn test_out_of_bounds_panics() {
        let s = ts("ab");
        s.get(2);
    }
}
