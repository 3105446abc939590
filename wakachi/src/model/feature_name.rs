//! 素性名の組み立てと解析
//!
//! 素性名は先頭の1文字で種類を表す文字コード列です。
//!
//! | 先頭 | 意味 | 続く内容 |
//! |---|---|---|
//! | `X` | 文字 n-gram | 窓内の位置、n-gram |
//! | `T` | 文字種 n-gram | 窓内の位置、文字種列 |
//! | `D` | 辞書への所属 | 辞書番号、位置の役割 `L`/`I`/`R`、長さ |
//! | `S` | 単語そのもの | 単語 |
//! | `Q` | タグの辞書への所属 | 辞書番号、タグ番号 |
//! | `U` | どの辞書にもない単語 | なし |
//!
//! 位置・辞書番号・長さ・タグ番号は `'0'` に値を足した1文字で表します。

use crate::string::{TokenChar, TokenString};

const CHAR_NGRAM: TokenChar = b'X' as TokenChar;
const TYPE_NGRAM: TokenChar = b'T' as TokenChar;
const DICT: TokenChar = b'D' as TokenChar;
const SELF_WORD: TokenChar = b'S' as TokenChar;
const TAG_DICT: TokenChar = b'Q' as TokenChar;
const UNKNOWN: TokenChar = b'U' as TokenChar;
const ZERO: TokenChar = b'0' as TokenChar;

/// 辞書単語に対する境界の位置の役割
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DictRole {
    /// 単語の直前の境界
    Left,
    /// 単語の内部の境界
    Inside,
    /// 単語の直後の境界
    Right,
}

impl DictRole {
    /// 役割の数
    pub const COUNT: usize = 3;

    /// 添字を返します。
    #[inline(always)]
    pub const fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Inside => 1,
            Self::Right => 2,
        }
    }

    const fn code(self) -> TokenChar {
        match self {
            Self::Left => b'L' as TokenChar,
            Self::Inside => b'I' as TokenChar,
            Self::Right => b'R' as TokenChar,
        }
    }

    fn from_code(c: TokenChar) -> Option<Self> {
        match u8::try_from(c).ok()? {
            b'L' => Some(Self::Left),
            b'I' => Some(Self::Inside),
            b'R' => Some(Self::Right),
            _ => None,
        }
    }
}

/// 解析された素性名
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeatureName {
    /// 文字 n-gram
    CharNgram {
        /// 窓内の開始位置
        offset: usize,
        /// n-gram
        gram: TokenString,
    },
    /// 文字種 n-gram
    TypeNgram {
        /// 窓内の開始位置
        offset: usize,
        /// 文字種列
        gram: TokenString,
    },
    /// 辞書への所属
    Dict {
        /// 辞書番号
        dict: usize,
        /// 位置の役割
        role: DictRole,
        /// 長さ（1以上）
        len: usize,
    },
    /// 単語そのもの
    SelfWord(TokenString),
    /// タグの辞書への所属
    TagDict {
        /// 辞書番号
        dict: usize,
        /// タグ番号
        tag: usize,
    },
    /// どの辞書にもない単語
    Unknown,
}

#[inline(always)]
fn code(value: usize) -> TokenChar {
    ZERO.saturating_add(TokenChar::try_from(value).unwrap_or(TokenChar::MAX))
}

#[inline(always)]
fn value(c: TokenChar) -> Option<usize> {
    c.checked_sub(ZERO).map(usize::from)
}

fn with_head(head: &[TokenChar], body: &[TokenChar]) -> TokenString {
    let mut buf = Vec::with_capacity(head.len() + body.len());
    buf.extend_from_slice(head);
    buf.extend_from_slice(body);
    TokenString::new(buf)
}

/// 文字 n-gram 素性の名前を作ります。
pub fn char_ngram(offset: usize, gram: &[TokenChar]) -> TokenString {
    with_head(&[CHAR_NGRAM, code(offset)], gram)
}

/// 文字種 n-gram 素性の名前を作ります。
pub fn type_ngram(offset: usize, gram: &[TokenChar]) -> TokenString {
    with_head(&[TYPE_NGRAM, code(offset)], gram)
}

/// 辞書素性の名前を作ります。
pub fn dict(dict: usize, role: DictRole, len: usize) -> TokenString {
    TokenString::new(vec![DICT, code(dict), role.code(), code(len)])
}

/// 単語素性の名前を作ります。
pub fn self_word(word: &TokenString) -> TokenString {
    with_head(&[SELF_WORD], word.as_slice())
}

/// タグ辞書素性の名前を作ります。
pub fn tag_dict(dict: usize, tag: usize) -> TokenString {
    TokenString::new(vec![TAG_DICT, code(dict), code(tag)])
}

/// 未知語素性の名前を作ります。
pub fn unknown() -> TokenString {
    TokenString::from_char(UNKNOWN)
}

/// 素性名を解析します。
///
/// 既知の形式でない場合は `None` を返します。
pub fn parse(name: &TokenString) -> Option<FeatureName> {
    let s = name.as_slice();
    match *s.first()? {
        CHAR_NGRAM if s.len() >= 3 => Some(FeatureName::CharNgram {
            offset: value(s[1])?,
            gram: TokenString::from_slice(&s[2..]),
        }),
        TYPE_NGRAM if s.len() >= 3 => Some(FeatureName::TypeNgram {
            offset: value(s[1])?,
            gram: TokenString::from_slice(&s[2..]),
        }),
        DICT if s.len() == 4 => {
            let len = value(s[3])?;
            (len > 0).then_some(())?;
            Some(FeatureName::Dict {
                dict: value(s[1])?,
                role: DictRole::from_code(s[2])?,
                len,
            })
        }
        SELF_WORD if s.len() >= 2 => Some(FeatureName::SelfWord(TokenString::from_slice(&s[1..]))),
        TAG_DICT if s.len() == 3 => Some(FeatureName::TagDict {
            dict: value(s[1])?,
            tag: value(s[2])?,
        }),
        UNKNOWN if s.len() == 1 => Some(FeatureName::Unknown),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_ngram() {
        let name = char_ngram(3, TokenString::from("学習").as_slice());
        assert_eq!(TokenString::from("X3学習"), name);
        assert_eq!(
            Some(FeatureName::CharNgram {
                offset: 3,
                gram: TokenString::from("学習")
            }),
            parse(&name)
        );
    }

    #[test]
    fn test_dict() {
        let name = dict(1, DictRole::Inside, 4);
        assert_eq!(TokenString::from("D1I4"), name);
        assert_eq!(
            Some(FeatureName::Dict {
                dict: 1,
                role: DictRole::Inside,
                len: 4
            }),
            parse(&name)
        );
    }

    #[test]
    fn test_others() {
        assert_eq!(
            Some(FeatureName::SelfWord(TokenString::from("これ"))),
            parse(&self_word(&TokenString::from("これ")))
        );
        assert_eq!(
            Some(FeatureName::TagDict { dict: 0, tag: 12 }),
            parse(&tag_dict(0, 12))
        );
        assert_eq!(Some(FeatureName::Unknown), parse(&unknown()));
    }

    #[test]
    fn test_malformed() {
        for name in ["", "X3", "D1Z4", "D1L0", "Q0", "U1", "Z0a", "S"] {
            assert_eq!(None, parse(&TokenString::from(name)), "{}", name);
        }
    }
}
