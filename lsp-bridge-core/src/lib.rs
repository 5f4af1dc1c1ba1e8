//! 2つのリクエスト/レスポンス型プロトコルをバイトストリーム上で中継するためのコア。
//!
//! - `jsonrpc`: Content-Length ヘッダーで区切られた JSON-RPC メッセージの送受信
//! - `docs`: 言語サーバーに開いているドキュメントの状態を同期する
//! - `workspace_edit`: WorkspaceEdit をファイルシステムに適用する
//! - `lsp_client`: 言語サーバーを起動して上記をまとめて使う

#[macro_use]
extern crate log;

pub mod docs;
pub mod jsonrpc;
pub mod logger;
pub mod lsp_client;
pub mod utils;
pub mod workspace_edit;

#[cfg(test)]
mod test_utils;


pub use crate::{
    docs::{DocError, DocumentSync, OpenDocument},
    jsonrpc::{
        PendingResponse, RequestId, ResponseError, RpcConnection, RpcError, RpcMessage,
        StreamDecoder,
    },
    logger::{init_log, LogConfig},
    lsp_client::{ClientConfig, ClientError, LanguageClient},
    utils::line_ending::LineEnding,
    workspace_edit::{
        apply_text_edits, apply_workspace_edit_to_disk, ApplyResult, EditError, WorkspaceEdit,
    },
};
