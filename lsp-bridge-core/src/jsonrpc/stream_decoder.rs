use super::framing::{parse_content_length, HEADER_DELIMITER};
use serde_json::Value;

const INITIAL_CAPACITY: usize = 8192;

/// 先頭の消費済み領域がこれ以上になったら詰める。
const COMPACT_THRESHOLD: usize = 4096;

/// 任意の境界で区切られたバイト列を受け取って、JSON メッセージを取り出すもの。
///
/// バッファの `start..end` が未消費のデータ。
/// `push` の呼び出しをまたいで状態を保持するので、ヘッダーの区切りや本体の途中で
/// チャンクが分かれていても問題ない。
pub struct StreamDecoder {
    buf: Vec<u8>,
    start: usize,
    end: usize,
    error_count: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        StreamDecoder {
            buf: vec![0; INITIAL_CAPACITY],
            start: 0,
            end: 0,
            error_count: 0,
        }
    }

    /// チャンクを追加して、完全に受信できたメッセージをすべて返す。
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.append(chunk);

        let mut messages = vec![];
        loop {
            let header_end = match self.find_header_end() {
                Some(it) => it,
                None => break,
            };
            let content_start = header_end + HEADER_DELIMITER.len();

            let header_text =
                String::from_utf8_lossy(&self.buf[self.start..header_end]).into_owned();
            // 長さが得られないか、大きすぎて終了位置を表せないヘッダーは
            // ブロックごと読み飛ばして、次のヘッダーを探す。
            let content_end = match parse_content_length(&header_text) {
                Some(content_length) => match content_start.checked_add(content_length) {
                    Some(it) => it,
                    None => {
                        self.report_error(format_args!("Content-Length too large {:?}", header_text));
                        self.skip_to(content_start);
                        continue;
                    }
                },
                None => {
                    self.report_error(format_args!("Missing Content-Length {:?}", header_text));
                    self.skip_to(content_start);
                    continue;
                }
            };

            if self.end < content_end {
                // 本体がまだ届いていない。
                break;
            }

            let parsed = serde_json::from_slice::<Value>(&self.buf[content_start..content_end]);
            self.skip_to(content_end);

            match parsed {
                Ok(message) => messages.push(message),
                Err(err) => self.report_error(format_args!("Invalid JSON body: {}", err)),
            }
        }

        messages
    }

    /// まだメッセージとして取り出されていないバイト数
    pub fn buffered_len(&self) -> usize {
        self.end - self.start
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    fn append(&mut self, chunk: &[u8]) {
        self.ensure_capacity(chunk.len());
        self.buf[self.end..self.end + chunk.len()].copy_from_slice(chunk);
        self.end += chunk.len();
    }

    fn ensure_capacity(&mut self, need: usize) {
        if self.buf.len() - self.end >= need {
            return;
        }

        self.compact_if_needed();
        if self.buf.len() - self.end >= need {
            return;
        }

        self.shift_to_front();

        let mut new_size = self.buf.len().max(1);
        while new_size - self.end < need {
            new_size *= 2;
        }
        self.buf.resize(new_size, 0);
    }

    fn skip_to(&mut self, start: usize) {
        self.start = start;
        self.compact_if_needed();
    }

    fn compact_if_needed(&mut self) {
        if self.start == 0 {
            return;
        }

        if self.start == self.end {
            self.start = 0;
            self.end = 0;
            return;
        }

        if self.start < COMPACT_THRESHOLD {
            return;
        }

        self.shift_to_front();
    }

    fn shift_to_front(&mut self) {
        self.buf.copy_within(self.start..self.end, 0);
        self.end -= self.start;
        self.start = 0;
    }

    fn find_header_end(&self) -> Option<usize> {
        self.buf[self.start..self.end]
            .windows(HEADER_DELIMITER.len())
            .position(|window| window == HEADER_DELIMITER)
            .map(|i| self.start + i)
    }

    fn report_error(&mut self, args: std::fmt::Arguments) {
        // 壊れた入力が続いたときにログが溢れないようにする。
        if self.error_count < 10 {
            self.error_count += 1;
            warn!("{}", args);
        }
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        StreamDecoder::new()
    }
}
