//! JSON-RPC 2.0 over `Content-Length` framing.
//!
//! データの流れ:
//! バイト列 → `StreamDecoder` → JSON 値 → `RpcMessage` → `RpcConnection` のディスパッチ

pub mod framing;
mod pending_calls;
mod rpc_connection;
mod rpc_error;
mod rpc_message;
mod stream_decoder;

pub use self::{
    pending_calls::PendingResponse,
    rpc_connection::{HandlerError, RpcConnection, READ_CHUNK_SIZE},
    rpc_error::RpcError,
    rpc_message::{
        RequestId, ResponseError, RpcFailure, RpcMessage, RpcNotification, RpcRequest, RpcSuccess,
    },
    stream_decoder::StreamDecoder,
};

/// すべてのメッセージに付く `jsonrpc` フィールドの値
pub const JSONRPC_VERSION: &str = "2.0";
