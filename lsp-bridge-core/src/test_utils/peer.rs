//! `RpcConnection` の相手役

use super::pipe::{pipe, PipeReader, PipeWriter};
use crate::jsonrpc::{framing::encode_value, RpcConnection, StreamDecoder};
use serde_json::Value;
use std::{collections::VecDeque, io::Write, time::Duration};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// テストコードから直接フレームを読み書きする側
pub(crate) struct Peer {
    writer: Option<PipeWriter>,
    reader: PipeReader,
    decoder: StreamDecoder,
    received: VecDeque<Value>,
}

/// 接続と、その相手を作る。接続はまだ開始しない。
pub(crate) fn connect_to_peer() -> (RpcConnection, Peer) {
    let (peer_writer, connection_reader) = pipe();
    let (connection_writer, peer_reader) = pipe();

    let connection = RpcConnection::new(connection_reader, connection_writer);
    let peer = Peer {
        writer: Some(peer_writer),
        reader: peer_reader,
        decoder: StreamDecoder::new(),
        received: VecDeque::new(),
    };
    (connection, peer)
}

impl Peer {
    pub(crate) fn send(&mut self, message: Value) {
        self.send_bytes(&encode_value(&message));
    }

    pub(crate) fn send_bytes(&mut self, bytes: &[u8]) {
        let writer = self.writer.as_mut().expect("peer already closed");
        writer.write_all(bytes).unwrap();
    }

    /// 接続の入力ストリームを閉じる。
    pub(crate) fn close(&mut self) {
        self.writer = None;
    }

    /// 接続が送ってきたメッセージを1つ受け取る。
    pub(crate) fn recv(&mut self) -> Value {
        self.try_recv().expect("connection closed its output")
    }

    /// 接続の出力が閉じていたら `None`。
    pub(crate) fn try_recv(&mut self) -> Option<Value> {
        let mut chunk = [0; 1024];
        loop {
            if let Some(message) = self.received.pop_front() {
                return Some(message);
            }

            let n = self.reader.read_timeout(&mut chunk, RECV_TIMEOUT).unwrap();
            if n == 0 {
                return None;
            }
            self.received.extend(self.decoder.push(&chunk[..n]));
        }
    }
}
