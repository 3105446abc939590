//! 解析処理のためのルーチンを提供するモジュール。
//!
//! ワーカーは解析中の文を保持し、1つのスレッドで文を次々に解析するために使います。
use crate::analyzer::Analyzer;
use crate::errors::Result;
use crate::sentence::{Sentence, Word};

/// 解析処理のためのルーチンを提供する構造体。
///
/// # 例
///
/// ```ignore
/// let mut worker = analyzer.new_worker();
/// worker.reset_sentence("これは学習データです。");
/// worker.analyze()?;
/// for word in worker.words() {
///     println!("{}", word.surface());
/// }
/// ```
pub struct Worker {
    analyzer: Analyzer,
    sent: Sentence,
}

impl Worker {
    /// 新しいインスタンスを作成します。
    pub(crate) fn new(analyzer: Analyzer) -> Self {
        Self {
            analyzer,
            sent: Sentence::default(),
        }
    }

    /// 解析する入力文をリセットします。
    ///
    /// # 引数
    ///
    /// * `input` - 解析する入力文字列
    pub fn reset_sentence<S>(&mut self, input: S)
    where
        S: AsRef<str>,
    {
        self.sent = self.analyzer.sentence(input.as_ref());
    }

    /// 完全注釈の1行を入力文として設定します。
    ///
    /// 注釈された境界とタグは解析で変更されません。タグのないレベルだけが推定されます。
    ///
    /// # エラー
    ///
    /// 注釈の書式が不正な場合は [`WakachiError`](crate::errors::WakachiError) を返します。
    pub fn reset_annotated(&mut self, line: &str) -> Result<()> {
        self.sent = Sentence::from_annotated(line, self.analyzer.get_encoder())?;
        Ok(())
    }

    /// 解析済みの文を入力文として設定します。
    pub fn reset_with(&mut self, sent: Sentence) {
        self.sent = sent;
    }

    /// 単語境界を推定します。
    pub fn segment(&mut self) -> Result<()> {
        self.analyzer.calculate_boundaries(&mut self.sent)
    }

    /// タグレベル `level` のタグを推定します。
    pub fn tag(&mut self, level: usize) -> Result<()> {
        self.analyzer.calculate_tags(&mut self.sent, level)
    }

    /// 単語境界とすべてのタグレベルのタグを推定します。
    pub fn analyze(&mut self) -> Result<()> {
        self.analyzer.analyze(&mut self.sent)
    }

    /// 単語数を返します。
    #[inline(always)]
    pub fn num_words(&self) -> usize {
        self.sent.words().len()
    }

    /// `i` 番目の単語を返します。
    ///
    /// # パニック
    ///
    /// `i` が単語数以上の場合はパニックします。
    #[inline(always)]
    pub fn word(&self, i: usize) -> &Word {
        &self.sent.words()[i]
    }

    /// 単語列を返します。
    pub fn words(&self) -> &[Word] {
        self.sent.words()
    }

    /// 解析中の文を返します。
    pub fn sentence(&self) -> &Sentence {
        &self.sent
    }

    /// 解析中の文を取り出し、空の文に置き換えます。
    pub fn take_sentence(&mut self) -> Sentence {
        std::mem::take(&mut self.sent)
    }

    /// 文を完全注釈の形式で返します。
    pub fn to_annotated(&self) -> String {
        self.sent.to_annotated(
            self.analyzer.model().num_levels(),
            self.analyzer.get_encoder(),
        )
    }
}
