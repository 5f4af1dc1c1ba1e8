use super::{
    framing::encode_message,
    pending_calls::{PendingCalls, Reply},
    PendingResponse, RequestId, ResponseError, RpcError, RpcFailure, RpcMessage, RpcNotification,
    RpcRequest, RpcSuccess, StreamDecoder,
};
use crate::utils::lock;
use lsp_types::{notification::Notification, request::Request};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::{
    any::Any,
    collections::HashMap,
    io::{self, ErrorKind, Read, Write},
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

/// 入力ストリームから一度に読むバイト数
pub const READ_CHUNK_SIZE: usize = 8192;

/// ハンドラーが返すエラー
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type NotificationHandler = Arc<dyn Fn(Value) -> Result<(), HandlerError> + Send + Sync>;
type RequestHandler = Arc<dyn Fn(Value) -> Result<Value, HandlerError> + Send + Sync>;

/// 読み込み側と書き込み側のバイトストリームの上で JSON-RPC をやりとりするもの
///
/// 受信したメッセージのデコードとディスパッチは、すべて `jsonrpc-reader` スレッドの上で
/// 受信した順に行う。ハンドラーもこのスレッドで呼ばれる。
///
/// 複製したものは同じ接続を指す。
#[derive(Clone)]
pub struct RpcConnection {
    inner: Arc<Inner>,
}

struct Inner {
    writer: Mutex<Box<dyn Write + Send>>,
    reader: Mutex<Option<Box<dyn Read + Send>>>,
    reader_thread: Mutex<Option<JoinHandle<()>>>,
    pending: Mutex<PendingCalls>,
    notification_handlers: Mutex<HashMap<String, NotificationHandler>>,
    request_handlers: Mutex<HashMap<String, RequestHandler>>,
    last_id: AtomicI64,
}

impl RpcConnection {
    pub fn new(reader: impl Read + Send + 'static, writer: impl Write + Send + 'static) -> Self {
        RpcConnection {
            inner: Arc::new(Inner {
                writer: Mutex::new(Box::new(writer)),
                reader: Mutex::new(Some(Box::new(reader))),
                reader_thread: Mutex::new(None),
                pending: Mutex::new(PendingCalls::default()),
                notification_handlers: Mutex::new(HashMap::new()),
                request_handlers: Mutex::new(HashMap::new()),
                last_id: AtomicI64::new(0),
            }),
        }
    }

    /// このプロセスの標準入出力を使う接続を作る。
    pub fn stdio() -> Self {
        RpcConnection::new(io::stdin(), io::stdout())
    }

    /// 受信を始める。すでに始めているなら何もせず false を返す。
    pub fn start(&self) -> bool {
        let reader = match lock(&self.inner.reader).take() {
            Some(it) => it,
            None => return false,
        };

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("jsonrpc-reader".to_string())
            .spawn(move || inner.read_loop(reader));

        match spawned {
            Ok(handle) => {
                *lock(&self.inner.reader_thread) = Some(handle);
                true
            }
            Err(err) => {
                error!("Failed to spawn reader thread: {}", err);
                lock(&self.inner.pending).close_all();
                false
            }
        }
    }

    /// 入力ストリームが閉じて受信スレッドが終わるまで待つ。
    pub fn join(&self) {
        let handle = lock(&self.inner.reader_thread).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("jsonrpc-reader thread panicked");
            }
        }
    }

    /// 通知を送る。失敗してもログに書くだけ。
    pub fn notify_raw(&self, method: &str, params: Value) {
        let message = RpcMessage::notification(method, Some(params));
        if let Err(err) = self.inner.write_message(&message) {
            warn!("Failed to send notification {}: {}", method, err);
        }
    }

    pub fn notify<N: Notification>(&self, params: N::Params) {
        match serde_json::to_value(params) {
            Ok(params) => self.notify_raw(N::METHOD, params),
            Err(err) => warn!("Failed to serialize params of {}: {}", N::METHOD, err),
        }
    }

    /// リクエストを送る。応答は返り値を通じて待つ。
    pub fn request_raw(&self, method: &str, params: Value) -> PendingResponse<Value> {
        self.send_request(method, params)
    }

    pub fn request<R: Request>(&self, params: R::Params) -> PendingResponse<R::Result> {
        match serde_json::to_value(params) {
            Ok(params) => self.send_request(R::METHOD, params),
            Err(err) => PendingResponse::rejected(self.next_id(), RpcError::InvalidParams(err)),
        }
    }

    fn send_request<T: DeserializeOwned>(&self, method: &str, params: Value) -> PendingResponse<T> {
        let id = self.next_id();

        // 応答が書き込みより先に届いても取りこぼさないように、先に登録する。
        let rx = lock(&self.inner.pending).insert(id.clone());

        let message = RpcMessage::request(id.clone(), method, Some(params));
        if let Err(err) = self.inner.write_message(&message) {
            warn!("Failed to send request {} ({}): {}", method, id, err);
            lock(&self.inner.pending).resolve(&id, Err(RpcError::Io(err.to_string())));
        }

        PendingResponse::new(id, rx)
    }

    fn next_id(&self) -> RequestId {
        RequestId::Number(self.inner.last_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// 通知のハンドラーを登録する。同じメソッドに登録済みのものは置き換わる。
    ///
    /// ハンドラーは受信スレッドで呼ばれるので、同じ接続へのリクエストの応答を待ってはいけない。
    /// (その応答を読むスレッドがブロックされてしまう。)
    pub fn on_notification_raw(
        &self,
        method: &str,
        handler: impl Fn(Value) -> Result<(), HandlerError> + Send + Sync + 'static,
    ) {
        let old = lock(&self.inner.notification_handlers)
            .insert(method.to_string(), Arc::new(handler));
        if old.is_some() {
            debug!("Notification handler replaced: {}", method);
        }
    }

    /// リクエストのハンドラーを登録する。同じメソッドに登録済みのものは置き換わる。
    ///
    /// `on_notification_raw` と同様に、ハンドラーの中で応答を待ってはいけない。
    pub fn on_request_raw(
        &self,
        method: &str,
        handler: impl Fn(Value) -> Result<Value, HandlerError> + Send + Sync + 'static,
    ) {
        let old =
            lock(&self.inner.request_handlers).insert(method.to_string(), Arc::new(handler));
        if old.is_some() {
            debug!("Request handler replaced: {}", method);
        }
    }

    pub fn on_notification<N: Notification + 'static>(
        &self,
        handler: impl Fn(N::Params) -> Result<(), HandlerError> + Send + Sync + 'static,
    ) {
        self.on_notification_raw(N::METHOD, move |params| {
            let params = serde_json::from_value::<N::Params>(params)?;
            handler(params)
        });
    }

    pub fn on_request<R: Request + 'static>(
        &self,
        handler: impl Fn(R::Params) -> Result<R::Result, HandlerError> + Send + Sync + 'static,
    ) {
        self.on_request_raw(R::METHOD, move |params| {
            let params = serde_json::from_value::<R::Params>(params)?;
            let result = handler(params)?;
            Ok(serde_json::to_value(result)?)
        });
    }

    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        lock(&self.inner.pending).len()
    }
}

impl Inner {
    fn write_message(&self, message: &RpcMessage) -> io::Result<()> {
        let frame = encode_message(message);

        // フレームが混ざらないように、ロックを取ったまま最後まで書く。
        let mut writer = lock(&self.writer);
        writer.write_all(&frame)?;
        writer.flush()
    }

    fn read_loop(&self, mut reader: Box<dyn Read + Send>) {
        // スレッドが巻き戻しで終わっても、待っているリクエストを失敗させる。
        let _closer = PendingCloser(self);

        let mut decoder = StreamDecoder::new();
        let mut chunk = vec![0; READ_CHUNK_SIZE];

        loop {
            let n = match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!("Failed to read: {}", err);
                    break;
                }
            };

            for value in decoder.push(&chunk[..n]) {
                self.dispatch(value);
            }
        }
    }

    fn dispatch(&self, value: Value) {
        if let Some(response) = RpcMessage::reject_invalid_id(&value) {
            warn!("Rejected a request with an invalid id: {}", value);
            if let Err(err) = self.write_message(&response) {
                warn!("Failed to send response: {}", err);
            }
            return;
        }

        let message = match RpcMessage::from_value(value) {
            Some(it) => it,
            None => {
                debug!("Ignored a message that is not JSON-RPC 2.0");
                return;
            }
        };

        match message {
            RpcMessage::Notification(notification) => self.handle_notification(notification),
            RpcMessage::Request(request) => self.handle_request(request),
            RpcMessage::Success(RpcSuccess { id, result }) => self.resolve(id, Ok(result)),
            RpcMessage::Failure(RpcFailure { id, error }) => {
                self.resolve(id, Err(RpcError::Remote(error)))
            }
        }
    }

    fn resolve(&self, id: Option<RequestId>, reply: Reply) {
        let resolved = match &id {
            Some(id) => lock(&self.pending).resolve(id, reply),
            None => false,
        };
        if !resolved {
            debug!("Dropped a response for unknown id {:?}", id);
        }
    }

    fn handle_notification(&self, notification: RpcNotification) {
        let RpcNotification { method, params } = notification;

        // ハンドラーの中から登録できるように、呼ぶ前にロックを外す。
        let handler = lock(&self.notification_handlers).get(&method).cloned();
        let handler = match handler {
            Some(it) => it,
            None => {
                trace!("No handler for notification {}", method);
                return;
            }
        };

        let params = params.unwrap_or(Value::Null);
        match panic::catch_unwind(AssertUnwindSafe(|| handler(params))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("Notification handler {} failed: {}", method, err),
            Err(payload) => warn!(
                "Notification handler {} panicked: {}",
                method,
                panic_message(&*payload)
            ),
        }
    }

    fn handle_request(&self, request: RpcRequest) {
        let RpcRequest { id, method, params } = request;

        let handler = lock(&self.request_handlers).get(&method).cloned();
        let response = match handler {
            None => RpcMessage::failure(id, ResponseError::method_not_found(&method)),
            Some(handler) => {
                let params = params.unwrap_or(Value::Null);
                match panic::catch_unwind(AssertUnwindSafe(|| handler(params))) {
                    Ok(Ok(result)) => RpcMessage::success(id, result),
                    Ok(Err(err)) => {
                        warn!("Request handler {} failed: {}", method, err);
                        let error = internal_error(err.to_string(), format!("{:?}", err));
                        RpcMessage::failure(id, error)
                    }
                    Err(payload) => {
                        let message = panic_message(&*payload);
                        warn!("Request handler {} panicked: {}", method, message);
                        let error = internal_error(message.clone(), message);
                        RpcMessage::failure(id, error)
                    }
                }
            }
        };

        if let Err(err) = self.write_message(&response) {
            warn!("Failed to send response for {}: {}", method, err);
        }
    }
}

struct PendingCloser<'a>(&'a Inner);

impl Drop for PendingCloser<'_> {
    fn drop(&mut self) {
        let count = lock(&self.0.pending).close_all();
        debug!("Input closed. {} pending calls rejected", count);
    }
}

fn internal_error(message: String, debug: String) -> ResponseError {
    ResponseError {
        code: ResponseError::INTERNAL_ERROR,
        data: Some(json!({ "message": message, "debug": debug })),
        message,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
