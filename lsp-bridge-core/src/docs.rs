//! 相手 (言語サーバー) に見せているドキュメントの状態を、ディスク上のファイルと同期させる。

use crate::{
    jsonrpc::RpcConnection,
    utils::{
        canonical_uri::CanonicalUri,
        file_uri::resolve_in,
        line_ending::LineEnding,
        read_file::read_file,
    },
};
use lsp_types::{
    notification::{DidChangeTextDocument, DidOpenTextDocument},
    DidChangeTextDocumentParams, DidOpenTextDocumentParams, TextDocumentContentChangeEvent,
    TextDocumentItem, Url, VersionedTextDocumentIdentifier,
};
use std::{
    collections::{hash_map::Entry, HashMap},
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// テキストドキュメントのバージョン番号
///
/// 開いたときが 1 で、変更を通知するたびに 1 ずつ増える。
pub type TextDocumentVersion = i32;

pub const INITIAL_VERSION: TextDocumentVersion = 1;

#[derive(Debug, Error)]
pub enum DocError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot convert to file URI: {0}")]
    InvalidUri(String),
}

/// 相手に開いていると通知したドキュメント
#[derive(Clone, Debug)]
pub struct OpenDocument {
    pub uri: Url,
    pub language_id: String,
    pub version: TextDocumentVersion,

    /// 改行を LF に揃えたテキスト
    pub text: String,

    /// ファイル上の改行コード。書き戻すときに使う。
    pub line_ending: LineEnding,

    pub file_path: PathBuf,
}

/// 開いているドキュメントを管理するもの
///
/// ドキュメントは正規化した URI で識別する。同じファイルを指す異なるパスで開いても、
/// 記録は1つにしかならない。
/// 一度開いたドキュメントは閉じない。
///
/// 変更するメソッドは `&mut self` を取るので、同じドキュメントを同時に二重に開くことはない。
pub struct DocumentSync {
    root_dir: PathBuf,
    connection: RpcConnection,
    docs: HashMap<CanonicalUri, OpenDocument>,
}

impl DocumentSync {
    pub fn new(connection: RpcConnection, root_dir: PathBuf) -> Self {
        DocumentSync {
            root_dir,
            connection,
            docs: HashMap::new(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// ファイルを開いていなければ、読み込んで相手に `didOpen` を通知する。
    ///
    /// すでに開いているなら、ファイルを読み直さずにそのまま返す。
    pub fn open_if_needed(
        &mut self,
        path: &Path,
        language_id: &str,
    ) -> Result<&OpenDocument, DocError> {
        let file_path = resolve_in(&self.root_dir, path);
        let key = canonical_uri(&file_path)?;

        let DocumentSync {
            connection, docs, ..
        } = self;

        match docs.entry(key) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let raw = read_file(&file_path).map_err(|source| DocError::Io {
                    path: file_path.clone(),
                    source,
                })?;

                let doc = OpenDocument {
                    uri: entry.key().as_url().clone(),
                    language_id: language_id.to_string(),
                    version: INITIAL_VERSION,
                    text: LineEnding::normalize(&raw),
                    line_ending: LineEnding::detect(&raw),
                    file_path,
                };
                debug!("didOpen {} v{}", doc.uri, doc.version);

                connection.notify::<DidOpenTextDocument>(DidOpenTextDocumentParams {
                    text_document: TextDocumentItem {
                        uri: doc.uri.clone(),
                        language_id: doc.language_id.clone(),
                        version: doc.version,
                        text: doc.text.clone(),
                    },
                });

                Ok(entry.insert(doc))
            }
        }
    }

    /// 開いているドキュメントの内容をファイルから読み直して、相手に変更を通知する。
    ///
    /// 開いていなければ何もしない。
    pub fn update_from_disk(&mut self, path: &Path) -> Result<(), DocError> {
        let file_path = resolve_in(&self.root_dir, path);
        let key = canonical_uri(&file_path)?;

        let doc = match self.docs.get_mut(&key) {
            Some(it) => it,
            None => return Ok(()),
        };

        let raw = read_file(&doc.file_path).map_err(|source| DocError::Io {
            path: doc.file_path.clone(),
            source,
        })?;
        doc.line_ending = LineEnding::detect(&raw);
        doc.text = LineEnding::normalize(&raw);
        doc.version += 1;

        notify_change(&self.connection, doc);
        Ok(())
    }

    /// メモリ上のテキストを置き換えて、相手に変更を通知する。
    ///
    /// ファイルには書き込まない。開いていなければ何もせず false を返す。
    pub fn set_open_text(&mut self, uri: &Url, text: String) -> bool {
        let doc = match self.docs.get_mut(&CanonicalUri::from_url(uri)) {
            Some(it) => it,
            None => return false,
        };

        doc.text = if text.contains('\r') {
            LineEnding::normalize(&text)
        } else {
            text
        };
        doc.version += 1;

        notify_change(&self.connection, doc);
        true
    }

    /// メモリ上のテキストを、元の改行コードに戻してファイルに書き込む。
    ///
    /// 開いていなければ何もしない。
    pub fn flush_to_disk(&self, uri: &Url) -> Result<(), DocError> {
        let doc = match self.get(uri) {
            Some(it) => it,
            None => return Ok(()),
        };

        let contents = doc.line_ending.restore(&doc.text);
        fs::write(&doc.file_path, contents).map_err(|source| DocError::Io {
            path: doc.file_path.clone(),
            source,
        })
    }

    pub fn get(&self, uri: &Url) -> Option<&OpenDocument> {
        self.docs.get(&CanonicalUri::from_url(uri))
    }

    pub fn get_open_text(&self, uri: &Url) -> Option<&str> {
        self.get(uri).map(|doc| doc.text.as_str())
    }

    pub fn is_open(&self, path: &Path) -> bool {
        let file_path = resolve_in(&self.root_dir, path);
        CanonicalUri::from_file_path(&file_path).map_or(false, |key| self.docs.contains_key(&key))
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

fn canonical_uri(file_path: &Path) -> Result<CanonicalUri, DocError> {
    CanonicalUri::from_file_path(file_path)
        .ok_or_else(|| DocError::InvalidUri(file_path.display().to_string()))
}

fn notify_change(connection: &RpcConnection, doc: &OpenDocument) {
    debug!("didChange {} v{}", doc.uri, doc.version);

    connection.notify::<DidChangeTextDocument>(DidChangeTextDocumentParams {
        text_document: VersionedTextDocumentIdentifier {
            uri: doc.uri.clone(),
            version: doc.version,
        },
        content_changes: vec![TextDocumentContentChangeEvent {
            range: None,
            range_length: None,
            text: doc.text.clone(),
        }],
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{connect_to_peer, Peer};
    use expect_test::expect;
    use serde_json::Value;

    fn setup() -> (tempfile::TempDir, DocumentSync, Peer) {
        let dir = tempfile::tempdir().unwrap();
        let (connection, peer) = connect_to_peer();
        let docs = DocumentSync::new(connection, dir.path().to_path_buf());
        (dir, docs, peer)
    }

    fn summarize(message: &Value) -> String {
        let params = &message["params"];
        let text = params["textDocument"]["text"]
            .as_str()
            .or_else(|| params["contentChanges"][0]["text"].as_str())
            .unwrap_or_default();
        format!(
            "{} v{} {:?}\n",
            message["method"].as_str().unwrap(),
            params["textDocument"]["version"],
            text
        )
    }

    #[test]
    fn test_versions_increase() {
        let (dir, mut docs, mut peer) = setup();
        fs::write(dir.path().join("lib.rs"), "fn a() {}\r\n").unwrap();

        let uri = docs
            .open_if_needed(Path::new("lib.rs"), "rust")
            .unwrap()
            .uri
            .clone();
        // 2回目は読み直さない。
        fs::write(dir.path().join("lib.rs"), "fn b() {}\n").unwrap();
        let doc = docs.open_if_needed(Path::new("./lib.rs"), "rust").unwrap();
        assert_eq!(doc.version, 1);
        assert_eq!(doc.text, "fn a() {}\n");
        assert_eq!(doc.line_ending, LineEnding::CrLf);

        docs.update_from_disk(Path::new("lib.rs")).unwrap();
        assert!(docs.set_open_text(&uri, "fn c() {}\n".to_string()));
        assert_eq!(docs.get(&uri).unwrap().version, 3);
        assert_eq!(docs.get(&uri).unwrap().line_ending, LineEnding::Lf);

        let mut out = String::new();
        for _ in 0..3 {
            out += &summarize(&peer.recv());
        }
        expect![[r#"
            textDocument/didOpen v1 "fn a() {}\n"
            textDocument/didChange v2 "fn b() {}\n"
            textDocument/didChange v3 "fn c() {}\n"
        "#]]
        .assert_eq(&out);
    }

    #[test]
    fn test_flush_restores_crlf() {
        let (dir, mut docs, _peer) = setup();
        let path = dir.path().join("main.rs");
        fs::write(&path, "fn main() {\r\n}\r\n").unwrap();

        let uri = docs.open_if_needed(&path, "rust").unwrap().uri.clone();
        docs.set_open_text(&uri, "fn main() {\n    run();\n}\n".to_string());
        docs.flush_to_disk(&uri).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "fn main() {\r\n    run();\r\n}\r\n"
        );
    }

    #[test]
    fn test_unopened_documents_are_ignored() {
        let (dir, mut docs, _peer) = setup();
        let path = dir.path().join("other.rs");
        fs::write(&path, "").unwrap();
        let uri = Url::from_file_path(&path).unwrap();

        docs.update_from_disk(&path).unwrap();
        assert!(!docs.set_open_text(&uri, "x".to_string()));
        docs.flush_to_disk(&uri).unwrap();

        assert!(docs.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_missing_file() {
        let (_dir, mut docs, _peer) = setup();
        let err = docs
            .open_if_needed(Path::new("missing.rs"), "rust")
            .unwrap_err();
        assert!(matches!(err, DocError::Io { ref source, .. } if source.kind() == io::ErrorKind::NotFound));
        assert!(!docs.is_open(Path::new("missing.rs")));
    }
}
