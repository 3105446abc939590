//! wakachiのエラー型

use std::error::Error;
use std::fmt;

/// エラー型を[`WakachiError`]に固定したResult型
pub type Result<T, E = WakachiError> = std::result::Result<T, E>;

/// wakachiのエラー型
///
/// 呼び出し側の誤り（範囲外のタグレベル、辞書数の上限超過など）は
/// [`InvalidArgument`](Self::InvalidArgument)、モデルと呼び出しの不整合は
/// [`InvalidState`](Self::InvalidState)、テキスト形式のモデルや注釈コーパスの
/// 書き誤りは行番号付きの [`InvalidFormat`](Self::InvalidFormat) になります。
#[derive(Debug, thiserror::Error)]
pub enum WakachiError {
    /// 引数の誤り
    #[error(transparent)]
    InvalidArgument(InvalidArgumentError),

    /// 入力の書式の誤り
    #[error(transparent)]
    InvalidFormat(InvalidFormatError),

    /// モデルと処理の不整合
    #[error(transparent)]
    InvalidState(InvalidStateError),

    /// 辞書の大きさが32ビットに収まらない
    #[error(transparent)]
    TryFromInt(#[from] std::num::TryFromIntError),

    /// 入出力エラー
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// バイナリモデルのアーカイブの検証または復元の失敗
    #[error(transparent)]
    RkyvError(#[from] rkyv::rancor::Error),
}

impl WakachiError {
    /// `arg` に対する [`InvalidArgument`](Self::InvalidArgument) を作ります。
    pub(crate) fn invalid_argument<S>(arg: &'static str, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidArgument(InvalidArgumentError {
            arg,
            msg: msg.into(),
        })
    }

    /// 入力 `arg` の書式の誤りを作ります。
    ///
    /// テキスト形式のモデルでは `msg` の先頭に行番号が入ります。
    pub(crate) fn invalid_format<S>(arg: &'static str, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidFormat(InvalidFormatError {
            arg,
            msg: msg.into(),
        })
    }

    /// 処理 `msg` が原因 `cause` のために行えないことを表します。
    pub(crate) fn invalid_state<S, M>(msg: S, cause: M) -> Self
    where
        S: Into<String>,
        M: Into<String>,
    {
        Self::InvalidState(InvalidStateError {
            msg: msg.into(),
            cause: cause.into(),
        })
    }
}

/// 引数の誤り
#[derive(Debug)]
pub struct InvalidArgumentError {
    pub(crate) arg: &'static str,
    pub(crate) msg: String,
}

impl fmt::Display for InvalidArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvalidArgumentError: {}: {}", self.arg, self.msg)
    }
}

impl Error for InvalidArgumentError {}

/// モデルやコーパスの書式の誤り
#[derive(Debug)]
pub struct InvalidFormatError {
    /// 読んでいた入力の種類
    pub(crate) arg: &'static str,
    pub(crate) msg: String,
}

impl fmt::Display for InvalidFormatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvalidFormatError: {}: {}", self.arg, self.msg)
    }
}

impl Error for InvalidFormatError {}

/// モデルの中身と要求された処理が食い違う場合のエラー
///
/// 境界推定の分類器を持たないモデルでの分割、参照表のない大域分類器での
/// タグ推定、配置できない素性を含むモデルの構築で発生します。
#[derive(Debug)]
pub struct InvalidStateError {
    pub(crate) msg: String,
    pub(crate) cause: String,
}

impl fmt::Display for InvalidStateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvalidStateError: {}: {}", self.msg, self.cause)
    }
}

impl Error for InvalidStateError {}
