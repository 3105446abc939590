//! 文字コードの対応付けと文字種の判定
//!
//! 生のテキストと [`TokenString`] の相互変換、文字種の分類、正規化を担います。
//! 解析器は [`CharEncoder`] トレイトを通してのみこれらを利用します。

use crate::string::{TokenChar, TokenString};

/// 文字種
///
/// 文字種 n-gram 素性では各文字種が1文字のコードとして扱われます。
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
#[repr(u8)]
pub enum CharType {
    /// 漢字
    Kanji = b'K',
    /// カタカナ
    Katakana = b'T',
    /// ひらがな
    Hiragana = b'H',
    /// ローマ字
    Roman = b'R',
    /// 数字
    Digit = b'D',
    /// その他
    Other = b'O',
}

impl CharType {
    /// 文字種を表すコードを返します。
    #[inline(always)]
    pub const fn code(self) -> TokenChar {
        self as u8 as TokenChar
    }

    /// コードから文字種を復元します。
    pub const fn from_code(code: TokenChar) -> Option<Self> {
        match code {
            0x4B => Some(Self::Kanji),
            0x54 => Some(Self::Katakana),
            0x48 => Some(Self::Hiragana),
            0x52 => Some(Self::Roman),
            0x44 => Some(Self::Digit),
            0x4F => Some(Self::Other),
            _ => None,
        }
    }
}

/// テキストと文字コード列の変換を担うトレイト
pub trait CharEncoder: Send + Sync {
    /// テキストを文字コード列に変換します。
    fn encode(&self, text: &str) -> TokenString;

    /// 文字コード列をテキストに戻します。
    fn decode(&self, chars: &TokenString) -> String;

    /// 1文字の文字種を返します。
    fn char_type(&self, c: TokenChar) -> CharType;

    /// 素性抽出用に正規化した文字コード列を返します。
    fn normalize(&self, chars: &TokenString) -> TokenString;

    /// 文字コード列の文字種列を返します。
    fn char_types(&self, chars: &TokenString) -> TokenString {
        TokenString::new(chars.iter().map(|c| self.char_type(c).code()).collect())
    }
}

/// UTF-16 のコード単位をそのまま文字コードとするエンコーダ
///
/// 基本多言語面の文字はコード単位と一対一に対応します。
/// それ以外の文字は U+FFFD に置き換えられます。
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf16Encoder;

impl Utf16Encoder {
    /// 新しいエンコーダを作成します。
    pub const fn new() -> Self {
        Self
    }

    /// 1文字を文字コードに変換します。
    #[inline(always)]
    pub fn encode_char(c: char) -> TokenChar {
        u16::try_from(u32::from(c)).unwrap_or(0xFFFD)
    }
}

impl CharEncoder for Utf16Encoder {
    fn encode(&self, text: &str) -> TokenString {
        TokenString::new(text.chars().map(Self::encode_char).collect())
    }

    fn decode(&self, chars: &TokenString) -> String {
        chars.to_string()
    }

    fn char_type(&self, c: TokenChar) -> CharType {
        match c {
            0x30..=0x39 | 0xFF10..=0xFF19 => CharType::Digit,
            0x41..=0x5A | 0x61..=0x7A | 0xFF21..=0xFF3A | 0xFF41..=0xFF5A => CharType::Roman,
            0x3040..=0x3096 | 0x309D..=0x309F => CharType::Hiragana,
            0x30A0..=0x30FA | 0x30FC..=0x30FF | 0x31F0..=0x31FF | 0xFF66..=0xFF9F => {
                CharType::Katakana
            }
            0x3005 | 0x3007 | 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF => {
                CharType::Kanji
            }
            _ => CharType::Other,
        }
    }

    fn normalize(&self, chars: &TokenString) -> TokenString {
        TokenString::new(
            chars
                .iter()
                .map(|c| match c {
                    // full-width ASCII
                    0xFF01..=0xFF5E => c - 0xFEE0,
                    0x3000 => 0x20,
                    _ => c,
                })
                .collect(),
        )
    }
}

impl From<&str> for TokenString {
    fn from(text: &str) -> Self {
        Utf16Encoder.encode(text)
    }
}

impl From<&String> for TokenString {
    fn from(text: &String) -> Self {
        Utf16Encoder.encode(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_types() {
        let enc = Utf16Encoder::new();
        let types = enc.char_types(&TokenString::from("漢カなA1。ー々"));
        assert_eq!(TokenString::from("KTHRDOTK"), types);
    }

    #[test]
    fn test_round_trip() {
        let enc = Utf16Encoder::new();
        let s = enc.encode("これは学習データです。");
        assert_eq!(11, s.len());
        assert_eq!("これは学習データです。", enc.decode(&s));
    }

    #[test]
    fn test_normalize_full_width() {
        let enc = Utf16Encoder::new();
        let s = enc.normalize(&TokenString::from("ＡＢ１２　あ"));
        assert_eq!(TokenString::from("AB12 あ"), s);
    }

    #[test]
    fn test_type_code_round_trip() {
        for t in [
            CharType::Kanji,
            CharType::Katakana,
            CharType::Hiragana,
            CharType::Roman,
            CharType::Digit,
            CharType::Other,
        ] {
            assert_eq!(Some(t), CharType::from_code(t.code()));
        }
    }
}
