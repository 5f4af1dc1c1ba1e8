//! ファイルパスと `file://` URI の相互変換

use lsp_types::Url;
use std::path::{Component, Path, PathBuf};

/// 相対パスを `base_dir` を基準に解決する。絶対パスはそのまま返す。
///
/// `.` と `..` は字句的に取り除く。(ファイルシステムには触れない。)
pub fn resolve_in(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }

    let mut resolved = PathBuf::new();
    for component in base_dir.join(path).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // ルートより上には行かない。
                resolved.pop();
            }
            _ => resolved.push(component),
        }
    }
    resolved
}

/// ファイルパスを `file://` URI に変換する。
pub fn to_file_uri(path: &Path, base_dir: &Path) -> Option<Url> {
    Url::from_file_path(resolve_in(base_dir, path)).ok()
}

/// `file://` URI をファイルパスに変換する。ファイルを指していなければ `None`。
pub fn from_file_uri(uri: &Url) -> Option<PathBuf> {
    if uri.scheme() != "file" {
        return None;
    }
    uri.to_file_path().ok()
}
