/// ファイルの改行コード
///
/// メモリ上のテキストは常に LF に揃えておき、ファイルに書き戻すときに元に戻す。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    /// CRLF が1つでも含まれていたら CRLF とみなす。
    pub fn detect(text: &str) -> LineEnding {
        if text.contains("\r\n") {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        }
    }

    /// CRLF を LF に置き換える。
    pub fn normalize(text: &str) -> String {
        text.replace("\r\n", "\n")
    }

    /// LF に揃えたテキストを、この改行コードに戻す。
    pub fn restore(self, text: &str) -> String {
        match self {
            LineEnding::Lf => text.to_string(),
            LineEnding::CrLf => text.replace('\n', "\r\n"),
        }
    }
}

impl Default for LineEnding {
    fn default() -> Self {
        LineEnding::Lf
    }
}
