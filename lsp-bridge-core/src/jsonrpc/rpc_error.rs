use super::ResponseError;
use thiserror::Error;

/// `request` の呼び出し元に返されるエラー
#[derive(Debug, Error)]
pub enum RpcError {
    /// 応答が来る前に入力ストリームが閉じた。
    #[error("JSON-RPC stream closed")]
    ConnectionClosed,

    /// 相手がエラーレスポンスを返した。
    #[error("remote error: {0}")]
    Remote(ResponseError),

    #[error("failed to serialize params: {0}")]
    InvalidParams(#[source] serde_json::Error),

    #[error("unexpected result: {0}")]
    InvalidResult(#[source] serde_json::Error),

    #[error("failed to write request: {0}")]
    Io(String),

    #[error("timed out waiting for response")]
    Timeout,

    /// 応答を受け取る手段がなくなった。(すでに応答を受け取った後など)
    #[error("response channel dropped")]
    Dropped,
}

impl RpcError {
    /// 相手から返されたエラーコード
    pub fn code(&self) -> Option<i64> {
        match self {
            RpcError::Remote(error) => Some(error.code),
            _ => None,
        }
    }
}
