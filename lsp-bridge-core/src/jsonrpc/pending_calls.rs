use super::{RequestId, RpcError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{
    collections::HashMap,
    marker::PhantomData,
    sync::mpsc::{self, RecvTimeoutError},
    time::Duration,
};

pub(crate) type Reply = Result<Value, RpcError>;

/// 応答を待っているリクエストの表
///
/// リクエストごとに1つのチャネルを持つ。応答が来るか接続が閉じたら取り除く。
#[derive(Default)]
pub(crate) struct PendingCalls {
    senders: HashMap<RequestId, mpsc::Sender<Reply>>,
    closed: bool,
}

impl PendingCalls {
    /// 応答を待つチャネルを登録する。接続がすでに閉じていたら直ちに失敗させる。
    pub(crate) fn insert(&mut self, id: RequestId) -> mpsc::Receiver<Reply> {
        let (tx, rx) = mpsc::channel();

        if self.closed {
            tx.send(Err(RpcError::ConnectionClosed)).ok();
            return rx;
        }

        let old = self.senders.insert(id.clone(), tx);
        debug_assert!(old.is_none(), "duplicated request id {}", id);
        rx
    }

    /// 応答を対応するリクエストに渡す。対応するものがなければ false。
    pub(crate) fn resolve(&mut self, id: &RequestId, reply: Reply) -> bool {
        match self.senders.remove(id) {
            Some(tx) => {
                // 受け取り側がすでに破棄されていても問題ない。
                tx.send(reply).ok();
                true
            }
            None => false,
        }
    }

    /// 待っているすべてのリクエストを失敗させる。以降の `insert` も直ちに失敗する。
    pub(crate) fn close_all(&mut self) -> usize {
        self.closed = true;

        let count = self.senders.len();
        for (_, tx) in self.senders.drain() {
            tx.send(Err(RpcError::ConnectionClosed)).ok();
        }
        count
    }

    #[allow(unused)]
    pub(crate) fn len(&self) -> usize {
        self.senders.len()
    }
}

/// 送信したリクエストに対する応答を待つためのもの
///
/// 応答は高々1回しか受け取れない。
pub struct PendingResponse<T> {
    id: RequestId,
    rx: mpsc::Receiver<Reply>,
    _result: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> PendingResponse<T> {
    pub(crate) fn new(id: RequestId, rx: mpsc::Receiver<Reply>) -> Self {
        PendingResponse {
            id,
            rx,
            _result: PhantomData,
        }
    }

    /// 送信する前に失敗したリクエストのためのもの
    pub(crate) fn rejected(id: RequestId, error: RpcError) -> Self {
        let (tx, rx) = mpsc::channel();
        tx.send(Err(error)).ok();
        PendingResponse::new(id, rx)
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// 応答が来るまでブロックする。
    pub fn wait(self) -> Result<T, RpcError> {
        let reply = self.rx.recv().map_err(|_| RpcError::Dropped)?;
        decode_reply(reply)
    }

    /// 指定した時間だけ応答を待つ。
    ///
    /// タイムアウトしてもリクエストは取り消されないので、あとで再び待てる。
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T, RpcError> {
        match self.rx.recv_timeout(timeout) {
            Ok(reply) => decode_reply(reply),
            Err(RecvTimeoutError::Timeout) => Err(RpcError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(RpcError::Dropped),
        }
    }
}

fn decode_reply<T: DeserializeOwned>(reply: Reply) -> Result<T, RpcError> {
    serde_json::from_value(reply?).map_err(RpcError::InvalidResult)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_once() {
        let mut calls = PendingCalls::default();
        let pending = PendingResponse::<i64>::new(RequestId::Number(1), calls.insert(RequestId::Number(1)));

        assert!(calls.resolve(&RequestId::Number(1), Ok(json!(42))));
        assert!(!calls.resolve(&RequestId::Number(1), Ok(json!(43))));
        assert_eq!(pending.wait_timeout(Duration::from_secs(1)).unwrap(), 42);
        assert!(matches!(
            pending.wait_timeout(Duration::from_millis(10)),
            Err(RpcError::Dropped)
        ));
    }

    #[test]
    fn test_close_all_rejects_each_once() {
        let mut calls = PendingCalls::default();
        let pendings = (1..=3i64)
            .map(|id| PendingResponse::<Value>::new(RequestId::Number(id), calls.insert(RequestId::Number(id))))
            .collect::<Vec<_>>();

        assert_eq!(calls.close_all(), 3);
        assert_eq!(calls.len(), 0);
        assert!(!calls.resolve(&RequestId::Number(2), Ok(Value::Null)));

        for pending in pendings {
            assert!(matches!(pending.wait(), Err(RpcError::ConnectionClosed)));
        }

        // 閉じた後のリクエストは直ちに失敗する。
        let late = PendingResponse::<Value>::new(RequestId::Number(9), calls.insert(RequestId::Number(9)));
        assert!(matches!(late.wait(), Err(RpcError::ConnectionClosed)));
    }

    #[test]
    fn test_invalid_result() {
        let mut calls = PendingCalls::default();
        let pending = PendingResponse::<Vec<String>>::new(RequestId::Number(1), calls.insert(RequestId::Number(1)));
        calls.resolve(&RequestId::Number(1), Ok(json!({ "not": "a list" })));
        assert!(matches!(pending.wait(), Err(RpcError::InvalidResult(_))));
    }
}
