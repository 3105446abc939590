//! 解析対象の文の内部表現
//!
//! 文は文字コード列と、その正規化形・文字種列、文字間ごとの境界信頼度、
//! 境界から組み立てた単語列を保持します。境界信頼度の符号が分割の有無を、
//! 絶対値が確からしさを表します。

use crate::encoding::CharEncoder;
use crate::string::TokenString;

/// 人手で与えられた注釈に付与される信頼度
pub const CERTAIN_CONF: f64 = 100.0;

/// タグとそのスコア
#[derive(Clone, Debug, PartialEq)]
pub struct Tag {
    /// タグの文字列
    pub surface: TokenString,

    /// スコア（確率、または次点とのマージン）
    pub score: f64,
}

impl Tag {
    /// 新しいタグを作成します。
    pub fn new(surface: TokenString, score: f64) -> Self {
        Self { surface, score }
    }
}

/// 単語
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Word {
    surface: TokenString,
    start: usize,
    tags: Vec<Vec<Tag>>,
}

impl Word {
    /// 文中の文字位置 `start` から始まる単語を作成します。
    pub fn new(surface: TokenString, start: usize) -> Self {
        Self {
            surface,
            start,
            tags: vec![],
        }
    }

    /// 表層形を返します。
    #[inline(always)]
    pub fn surface(&self) -> &TokenString {
        &self.surface
    }

    /// 開始位置（文字単位）を返します。
    #[inline(always)]
    pub const fn start(&self) -> usize {
        self.start
    }

    /// 終了位置（文字単位、この位置を含まない）を返します。
    #[inline(always)]
    pub fn end(&self) -> usize {
        self.start + self.surface.len()
    }

    /// 文字数を返します。
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.surface.len()
    }

    /// 空の単語かどうかを返します。
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.surface.is_empty()
    }

    /// タグレベル `level` のタグ候補をスコアの降順で返します。
    pub fn tags(&self, level: usize) -> &[Tag] {
        self.tags.get(level).map_or(&[], Vec::as_slice)
    }

    /// タグレベル `level` の最良のタグを返します。
    pub fn top_tag(&self, level: usize) -> Option<&Tag> {
        self.tags(level).first()
    }

    /// タグレベル `level` のタグ候補を設定します。
    pub fn set_tags(&mut self, level: usize, tags: Vec<Tag>) {
        if self.tags.len() <= level {
            self.tags.resize_with(level + 1, Vec::new);
        }
        self.tags[level] = tags;
    }

    /// タグ候補を保持しているレベル数を返します。
    pub fn num_levels(&self) -> usize {
        self.tags.len()
    }
}

/// 解析対象の文
#[derive(Clone, Debug, Default)]
pub struct Sentence {
    surface: TokenString,
    norm: TokenString,
    types: TokenString,
    boundaries: Vec<f64>,
    words: Vec<Word>,
}

impl Sentence {
    /// 生の文字コード列から文を作成します。
    ///
    /// すべての文字間の信頼度は0（未決定）で、単語は文全体からなる1語になります。
    pub fn new(surface: TokenString, encoder: &dyn CharEncoder) -> Self {
        let boundaries = vec![0.0; surface.len().saturating_sub(1)];
        let mut sent = Self {
            norm: encoder.normalize(&surface),
            types: encoder.char_types(&surface),
            surface,
            boundaries,
            words: vec![],
        };
        sent.rebuild_words();
        sent
    }

    /// 単語列から文を作成します。
    ///
    /// 単語境界とタグはすべて [`CERTAIN_CONF`] の信頼度を持つ注釈として扱われます。
    ///
    /// # 引数
    ///
    /// * `words` - 単語の表層形とタグレベルごとのタグ
    /// * `encoder` - 文字種の判定と正規化に使うエンコーダ
    pub fn from_words<I>(words: I, encoder: &dyn CharEncoder) -> Self
    where
        I: IntoIterator<Item = (TokenString, Vec<Vec<TokenString>>)>,
    {
        let mut surface = TokenString::default();
        let mut built = vec![];
        let mut boundaries = vec![];
        for (word, levels) in words {
            if word.is_empty() {
                continue;
            }
            if !surface.is_empty() {
                boundaries.push(CERTAIN_CONF);
            }
            boundaries.extend(std::iter::repeat_n(-CERTAIN_CONF, word.len() - 1));
            let mut w = Word::new(word.clone(), surface.len());
            for (level, tags) in levels.into_iter().enumerate() {
                let tags = tags
                    .into_iter()
                    .map(|t| Tag::new(t, CERTAIN_CONF))
                    .collect();
                w.set_tags(level, tags);
            }
            surface.append(&word);
            built.push(w);
        }
        Self {
            norm: encoder.normalize(&surface),
            types: encoder.char_types(&surface),
            surface,
            boundaries,
            words: built,
        }
    }

    /// 文字コード列を返します。
    #[inline(always)]
    pub fn surface(&self) -> &TokenString {
        &self.surface
    }

    /// 正規化された文字コード列を返します。
    #[inline(always)]
    pub fn norm(&self) -> &TokenString {
        &self.norm
    }

    /// 文字種列を返します。
    #[inline(always)]
    pub fn types(&self) -> &TokenString {
        &self.types
    }

    /// 文字数を返します。
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.surface.len()
    }

    /// 空の文かどうかを返します。
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.surface.is_empty()
    }

    /// 文字間の境界信頼度を返します。`i` 番目の値は `i` 文字目と `i+1` 文字目の間です。
    #[inline(always)]
    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    /// 境界信頼度を書き換えるための参照を返します。
    ///
    /// 書き換えた後は [`rebuild_words`](Self::rebuild_words) で単語列を作り直してください。
    #[inline(always)]
    pub fn boundaries_mut(&mut self) -> &mut [f64] {
        &mut self.boundaries
    }

    /// 単語列を返します。
    #[inline(always)]
    pub fn words(&self) -> &[Word] {
        &self.words
    }

    /// 単語列を書き換えるための参照を返します。
    #[inline(always)]
    pub fn words_mut(&mut self) -> &mut [Word] {
        &mut self.words
    }

    /// 境界信頼度から単語列を組み立て直します。
    ///
    /// 正の信頼度を持つ位置で分割します。範囲が変わらなかった単語はタグを引き継ぎます。
    pub fn rebuild_words(&mut self) {
        if self.surface.is_empty() {
            self.words.clear();
            return;
        }
        let old = std::mem::take(&mut self.words);
        let mut old_iter = old.into_iter().peekable();
        let mut start = 0;
        for end in 1..=self.surface.len() {
            if end < self.surface.len() && self.boundaries[end - 1] <= 0.0 {
                continue;
            }
            while old_iter.next_if(|w| w.start() < start).is_some() {}
            let word = match old_iter.next_if(|w| w.start() == start && w.end() == end) {
                Some(w) => w,
                None => Word::new(self.surface.substring(start, end - start), start),
            };
            self.words.push(word);
            start = end;
        }
    }

    /// 文字コード列を文字列に戻します。
    pub fn text(&self) -> String {
        self.surface.to_string()
    }
}
