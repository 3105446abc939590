//! 完全注釈コーパスの読み書き
//!
//! 1行が1文で、単語は空白で区切られます。各単語は `表層形/タグ1/タグ2...` の形で、
//! `/` の後にはタグレベルの順にタグが続きます。表層形とタグの中の空白・`/`・`\` は
//! `\` でエスケープします。

use std::io::{BufRead, BufReader, Read};
use std::ops::{Deref, DerefMut};

use crate::encoding::CharEncoder;
use crate::errors::{Result, WakachiError};
use crate::sentence::Sentence;
use crate::string::TokenString;

const WORD_DELIM: char = ' ';
const TAG_DELIM: char = '/';
const ESCAPE: char = '\\';

/// 1行の注釈を単語ごとのフィールドに分けます。
///
/// # 戻り値
///
/// 単語ごとの `[表層形, タグ1, タグ2, ...]`
fn split_annotated(line: &str) -> std::result::Result<Vec<Vec<String>>, &'static str> {
    let mut words = vec![];
    let mut fields: Vec<String> = vec![];
    let mut field = String::new();
    let mut chars = line.chars();
    let mut in_word = false;
    while let Some(c) = chars.next() {
        match c {
            ESCAPE => match chars.next() {
                Some(e @ (WORD_DELIM | TAG_DELIM | ESCAPE)) => {
                    field.push(e);
                    in_word = true;
                }
                Some(_) => return Err("unknown escape sequence"),
                None => return Err("dangling escape at the end of the line"),
            },
            WORD_DELIM => {
                if in_word {
                    fields.push(std::mem::take(&mut field));
                    words.push(std::mem::take(&mut fields));
                    in_word = false;
                }
            }
            TAG_DELIM => {
                fields.push(std::mem::take(&mut field));
                in_word = true;
            }
            _ => {
                field.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        fields.push(field);
        words.push(fields);
    }
    Ok(words)
}

fn escape_field(field: &str, out: &mut String) {
    for c in field.chars() {
        if matches!(c, WORD_DELIM | TAG_DELIM | ESCAPE) {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}

impl Sentence {
    /// 完全注釈の1行から文を作成します。
    ///
    /// 単語境界とタグはすべて確定した注釈として扱われます。
    ///
    /// # 引数
    ///
    /// * `line` - `表層形/タグ...` を空白で区切った行
    /// * `encoder` - 文字コードへの変換に使うエンコーダ
    ///
    /// # エラー
    ///
    /// 表層形が空の単語がある場合、不正なエスケープを含む場合は [`WakachiError`] を返します。
    ///
    /// # 例
    ///
    /// ```
    /// use wakachi::Sentence;
    /// use wakachi::encoding::Utf16Encoder;
    ///
    /// let sent = Sentence::from_annotated("これ/代名詞 は/助詞", &Utf16Encoder)?;
    /// assert_eq!(2, sent.words().len());
    /// assert_eq!("代名詞", sent.words()[0].tags(0)[0].surface.to_string());
    /// # Ok::<(), wakachi::errors::WakachiError>(())
    /// ```
    pub fn from_annotated(line: &str, encoder: &dyn CharEncoder) -> Result<Self> {
        let words = split_annotated(line).map_err(|e| WakachiError::invalid_format("line", e))?;
        let mut parsed = Vec::with_capacity(words.len());
        for fields in words {
            let mut fields = fields.into_iter();
            let surface = fields.next().unwrap_or_default();
            if surface.is_empty() {
                return Err(WakachiError::invalid_format(
                    "line",
                    "a word has an empty surface",
                ));
            }
            let tags = fields
                .map(|t| {
                    if t.is_empty() {
                        vec![]
                    } else {
                        vec![encoder.encode(&t)]
                    }
                })
                .collect();
            parsed.push((encoder.encode(&surface), tags));
        }
        Ok(Self::from_words(parsed, encoder))
    }

    /// 文を完全注釈の1行に書き出します。
    ///
    /// 各単語について、`num_levels` 個のタグレベルそれぞれの最良のタグを出力します。
    /// タグのないレベルは空のフィールドになります。
    pub fn to_annotated(&self, num_levels: usize, encoder: &dyn CharEncoder) -> String {
        let mut out = String::new();
        for (i, word) in self.words().iter().enumerate() {
            if i != 0 {
                out.push(WORD_DELIM);
            }
            escape_field(&encoder.decode(word.surface()), &mut out);
            for level in 0..num_levels {
                out.push(TAG_DELIM);
                if let Some(tag) = word.top_tag(level) {
                    escape_field(&encoder.decode(&tag.surface), &mut out);
                }
            }
        }
        out
    }

    /// 単語の表層形を空白で区切った分かち書きを返します。
    pub fn to_segmented(&self, encoder: &dyn CharEncoder) -> String {
        let mut out = String::new();
        for (i, word) in self.words().iter().enumerate() {
            if i != 0 {
                out.push(WORD_DELIM);
            }
            escape_field(&encoder.decode(word.surface()), &mut out);
        }
        out
    }
}

/// 完全注釈コーパス
pub struct Corpus {
    sentences: Vec<Sentence>,
}

impl Corpus {
    /// 完全注釈コーパスを読み込みます。空行は読み飛ばします。
    ///
    /// # 引数
    ///
    /// * `rdr` - コーパスのリーダー
    /// * `encoder` - 文字コードへの変換に使うエンコーダ
    ///
    /// # エラー
    ///
    /// 書式が不正な行がある場合は、行番号を含む [`WakachiError`] を返します。
    pub fn from_reader<R>(rdr: R, encoder: &dyn CharEncoder) -> Result<Self>
    where
        R: Read,
    {
        let buf = BufReader::new(rdr);

        let mut sentences = vec![];
        for (i, line) in buf.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let sent = Sentence::from_annotated(&line, encoder).map_err(|e| {
                WakachiError::invalid_format("rdr", format!("line {}: {}", i + 1, e))
            })?;
            sentences.push(sent);
        }
        log::debug!("read {} annotated sentences", sentences.len());
        Ok(Self { sentences })
    }

    /// 文の列を取り出します。
    pub fn into_sentences(self) -> Vec<Sentence> {
        self.sentences
    }

    /// すべての単語の表層形とタグレベル `level` の最良のタグの組を返します。
    pub fn tagged_words(&self, level: usize) -> impl Iterator<Item = (&TokenString, &TokenString)> {
        self.sentences
            .iter()
            .flat_map(|s| s.words())
            .filter_map(move |w| w.top_tag(level).map(|t| (w.surface(), &t.surface)))
    }
}

impl Deref for Corpus {
    type Target = [Sentence];

    fn deref(&self) -> &Self::Target {
        &self.sentences
    }
}

impl DerefMut for Corpus {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.sentences
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::encoding::Utf16Encoder;
    use crate::sentence::CERTAIN_CONF;

    #[test]
    fn test_from_annotated() {
        let sent = Sentence::from_annotated("これ/代名詞/これ は/助詞/わ 。", &Utf16Encoder).unwrap();
        assert_eq!(3, sent.words().len());
        assert_eq!("これは。", sent.text());
        assert_eq!(&[-CERTAIN_CONF, CERTAIN_CONF, CERTAIN_CONF], sent.boundaries());

        let w0 = &sent.words()[0];
        assert_eq!("代名詞", w0.tags(0)[0].surface.to_string());
        assert_eq!("これ", w0.tags(1)[0].surface.to_string());
        assert_eq!(CERTAIN_CONF, w0.tags(0)[0].score);
        assert!(sent.words()[2].tags(0).is_empty());
    }

    #[test]
    fn test_escapes() {
        let sent = Sentence::from_annotated("a\\ b/x\\/y c\\\\", &Utf16Encoder).unwrap();
        assert_eq!(2, sent.words().len());
        assert_eq!("a b", sent.words()[0].surface().to_string());
        assert_eq!("x/y", sent.words()[0].tags(0)[0].surface.to_string());
        assert_eq!("c\\", sent.words()[1].surface().to_string());
        assert_eq!(
            "a\\ b/x\\/y c\\\\/",
            sent.to_annotated(1, &Utf16Encoder)
        );
    }

    #[test]
    fn test_extra_spaces() {
        let sent = Sentence::from_annotated("  a  b ", &Utf16Encoder).unwrap();
        assert_eq!("a b", sent.to_segmented(&Utf16Encoder));
    }

    #[test]
    fn test_malformed() {
        assert!(Sentence::from_annotated("/tag", &Utf16Encoder).is_err());
        assert!(Sentence::from_annotated("abc\\", &Utf16Encoder).is_err());
        assert!(Sentence::from_annotated("a\\b", &Utf16Encoder).is_err());
    }

    #[test]
    fn test_corpus_reports_line() {
        let data = "a/x b/y\n\nc/z\n/bad\n";
        let err = Corpus::from_reader(data.as_bytes(), &Utf16Encoder)
            .err()
            .unwrap();
        assert!(err.to_string().contains("line 4"), "{}", err);

        let corpus = Corpus::from_reader("a/x b/y\n\nc/z\n".as_bytes(), &Utf16Encoder).unwrap();
        assert_eq!(2, corpus.len());
        let tagged: Vec<_> = corpus
            .tagged_words(0)
            .map(|(w, t)| (w.to_string(), t.to_string()))
            .collect();
        assert_eq!(
            vec![
                ("a".to_string(), "x".to_string()),
                ("b".to_string(), "y".to_string()),
                ("c".to_string(), "z".to_string()),
            ],
            tagged
        );
    }
}
