use super::JSONRPC_VERSION;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// リクエストID。数値か文字列。
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id)
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        RequestId::String(id)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(id) => write!(f, "{}", id),
            RequestId::String(id) => write!(f, "{:?}", id),
        }
    }
}

fn id_to_value(id: &Option<RequestId>) -> Value {
    match id {
        Some(RequestId::Number(id)) => Value::from(*id),
        Some(RequestId::String(id)) => Value::from(id.as_str()),
        None => Value::Null,
    }
}

/// エラーレスポンスの `error` フィールド
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseError {
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INTERNAL_ERROR: i64 = -32603;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        ResponseError {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        ResponseError::new(
            ResponseError::METHOD_NOT_FOUND,
            format!("Method not found: {}", method),
        )
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        ResponseError::new(ResponseError::INVALID_REQUEST, message)
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("code".to_string(), Value::from(self.code));
        map.insert("message".to_string(), Value::from(self.message.as_str()));
        if let Some(data) = &self.data {
            map.insert("data".to_string(), data.clone());
        }
        Value::Object(map)
    }
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code={})", self.message, self.code)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RpcRequest {
    /// `null` の ID を持つリクエストも受け付ける。その場合は `null` の ID で応答する。
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RpcNotification {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RpcSuccess {
    pub id: Option<RequestId>,
    #[serde(default)]
    pub result: Value,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RpcFailure {
    pub id: Option<RequestId>,
    pub error: ResponseError,
}

/// JSON-RPC のメッセージ
#[derive(Clone, Debug, PartialEq)]
pub enum RpcMessage {
    Request(RpcRequest),
    Notification(RpcNotification),
    Success(RpcSuccess),
    Failure(RpcFailure),
}

impl RpcMessage {
    pub fn request(id: RequestId, method: &str, params: Option<Value>) -> Self {
        RpcMessage::Request(RpcRequest {
            id: Some(id),
            method: method.to_string(),
            params,
        })
    }

    pub fn notification(method: &str, params: Option<Value>) -> Self {
        RpcMessage::Notification(RpcNotification {
            method: method.to_string(),
            params,
        })
    }

    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        RpcMessage::Success(RpcSuccess { id, result })
    }

    pub fn failure(id: Option<RequestId>, error: ResponseError) -> Self {
        RpcMessage::Failure(RpcFailure { id, error })
    }

    /// デコードされた JSON オブジェクトを分類する。
    ///
    /// - `method` があって `id` がない: 通知
    /// - `id` と `result` か `error` がある: レスポンス
    /// - `id` と `method` がある: リクエスト
    ///
    /// `jsonrpc` が `"2.0"` でないものや、どれにも当てはまらないものは `None`。
    pub fn from_value(value: Value) -> Option<RpcMessage> {
        let map = match value {
            Value::Object(map) => map,
            _ => return None,
        };

        if map.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return None;
        }

        let has_id = map.contains_key("id");
        let has_method = map.get("method").map_or(false, Value::is_string);
        let has_result = map.contains_key("result");
        let has_error = map.contains_key("error");
        let value = Value::Object(map);

        let message = if has_method && !has_id {
            RpcMessage::Notification(serde_json::from_value(value).ok()?)
        } else if has_id && has_error {
            RpcMessage::Failure(serde_json::from_value(value).ok()?)
        } else if has_id && has_result {
            RpcMessage::Success(serde_json::from_value(value).ok()?)
        } else if has_id && has_method {
            RpcMessage::Request(serde_json::from_value(value).ok()?)
        } else {
            return None;
        };
        Some(message)
    }

    /// `id` が数値でも文字列でも `null` でもないリクエストに対する応答を作る。
    ///
    /// このようなリクエストは `from_value` で分類できないが、`id` を `null` にして
    /// Invalid Request を返す。リクエストの形をしていなければ `None`。
    pub fn reject_invalid_id(value: &Value) -> Option<RpcMessage> {
        let map = value.as_object()?;
        if map.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return None;
        }

        let method = map.get("method").and_then(Value::as_str)?;
        let id = map.get("id")?;
        if id.is_null() || serde_json::from_value::<RequestId>(id.clone()).is_ok() {
            return None;
        }

        let error = ResponseError::invalid_request(format!("Invalid id {} for {}", id, method));
        Some(RpcMessage::failure(None, error))
    }

    /// 送信する形の JSON に変換する。
    ///
    /// `params` がない (または `null`) なら `params` キー自体を出力しない。
    /// 通知には `id` キーを含めない。
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("jsonrpc".to_string(), Value::from(JSONRPC_VERSION));

        match self {
            RpcMessage::Request(RpcRequest { id, method, params }) => {
                map.insert("id".to_string(), id_to_value(id));
                map.insert("method".to_string(), Value::from(method.as_str()));
                insert_params(&mut map, params);
            }
            RpcMessage::Notification(RpcNotification { method, params }) => {
                map.insert("method".to_string(), Value::from(method.as_str()));
                insert_params(&mut map, params);
            }
            RpcMessage::Success(RpcSuccess { id, result }) => {
                map.insert("id".to_string(), id_to_value(id));
                map.insert("result".to_string(), result.clone());
            }
            RpcMessage::Failure(RpcFailure { id, error }) => {
                map.insert("id".to_string(), id_to_value(id));
                map.insert("error".to_string(), error.to_value());
            }
        }

        Value::Object(map)
    }
}

fn insert_params(map: &mut Map<String, Value>, params: &Option<Value>) {
    match params {
        None | Some(Value::Null) => {}
        Some(params) => {
            map.insert("params".to_string(), params.clone());
        }
    }
}
