//! フレームの符号化とヘッダーの解析

use super::RpcMessage;
use serde_json::Value;

/// ヘッダーの終わりを表すバイト列
pub const HEADER_DELIMITER: &[u8] = b"\r\n\r\n";

const CONTENT_LENGTH: &str = "content-length";

/// メッセージを `Content-Length: N\r\n\r\n` + 本体 の形式に符号化する。
pub fn encode_message(message: &RpcMessage) -> Vec<u8> {
    encode_value(&message.to_value())
}

/// JSON 値をフレームに符号化する。
///
/// N は本体を UTF-8 で符号化したときのバイト数。(文字数ではない。)
pub fn encode_value(value: &Value) -> Vec<u8> {
    let content = value.to_string();
    let header = format!("Content-Length: {}\r\n\r\n", content.len());

    let mut frame = Vec::with_capacity(header.len() + content.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(content.as_bytes());
    frame
}

/// ヘッダー部分のテキストから本体の長さを読み取る。
///
/// キーは大文字小文字を区別しない。他のヘッダーは無視する。
/// `Content-Length` がないか、値が整数として読めなければ `None`。
pub fn parse_content_length(header_text: &str) -> Option<usize> {
    for line in header_text.split("\r\n") {
        let (key, value) = match line.split_once(':') {
            Some(it) => it,
            None => continue,
        };

        if !key.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
            continue;
        }

        return value.trim().parse::<usize>().ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_counts_bytes_not_chars() {
        let frame = encode_value(&json!({ "text": "あ" }));
        let text = String::from_utf8(frame).unwrap();

        // `{"text":"あ"}` は 12 文字だが 14 バイト
        assert_eq!(text, "Content-Length: 14\r\n\r\n{\"text\":\"あ\"}");
    }

    #[test]
    fn test_parse_content_length() {
        assert_eq!(parse_content_length("Content-Length: 42"), Some(42));
        assert_eq!(parse_content_length("content-length:7"), Some(7));
        assert_eq!(
            parse_content_length(
                "Content-Type: application/vscode-jsonrpc; charset=utf-8\r\nCONTENT-LENGTH: 3"
            ),
            Some(3)
        );
    }

    #[test]
    fn test_parse_content_length_missing_or_broken() {
        assert_eq!(parse_content_length(""), None);
        assert_eq!(parse_content_length("X-Foo: 1"), None);
        assert_eq!(parse_content_length("Content-Length: many"), None);
        assert_eq!(parse_content_length("Content-Length: -1"), None);
        assert_eq!(parse_content_length("Content-Length 12"), None);
    }
}
