use super::file_uri::{from_file_uri, resolve_in};
use lsp_types::Url;
use std::{
    env::current_dir,
    ffi::OsString,
    path::{Path, PathBuf},
};

// ドキュメントや診断情報を引くためのキーとして使う URI
//
// `a/../b` と `b` やシンボリックリンク越しのパスなど、同じファイルを指す表現を1つに揃える。
// 揃えずにマップのキーに使うと、1つのファイルに複数のドキュメントが登録されてしまう。
//
// まだ存在しないファイルや、移動・削除されたファイルも、存在する一番近い祖先ディレクトリを
// 正規化して残りの名前を繋げる。作成や削除の前後でキーが変わらない。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct CanonicalUri {
    uri: Url,
}

impl CanonicalUri {
    /// 相対パスはカレントディレクトリを基準にする。
    pub(crate) fn from_file_path(path: &Path) -> Option<Self> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            resolve_in(&current_dir().ok()?, path)
        };

        let uri = Url::from_file_path(canonicalize_existing_prefix(&path)).ok()?;
        Some(CanonicalUri { uri })
    }

    /// ファイルを指していない URI はそのまま使う。
    pub(crate) fn from_url(uri: &Url) -> Self {
        from_file_uri(uri)
            .and_then(|path| CanonicalUri::from_file_path(&path))
            .unwrap_or_else(|| CanonicalUri {
                uri: uri.to_owned(),
            })
    }

    pub(crate) fn as_url(&self) -> &Url {
        &self.uri
    }
}

/// 存在する最長の祖先を canonicalize して、残りの名前を後ろに繋げる。
///
/// 祖先が1つも canonicalize できなければ、与えられたパスをそのまま返す。
fn canonicalize_existing_prefix(path: &Path) -> PathBuf {
    let mut rest: Vec<OsString> = vec![];
    let mut current = path;

    loop {
        if let Ok(canonical) = current.canonicalize() {
            return rest.iter().rev().fold(canonical, |acc, name| acc.join(name));
        }

        match (current.parent(), current.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_owned());
                current = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_equivalent_paths_are_equal() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("main.rs"), "").unwrap();

        let direct = CanonicalUri::from_file_path(&dir.path().join("main.rs")).unwrap();
        let detour = CanonicalUri::from_file_path(&dir.path().join("src/../main.rs")).unwrap();
        assert_eq!(direct, detour);

        let from_url = CanonicalUri::from_url(&Url::from_file_path(dir.path().join("main.rs")).unwrap());
        assert_eq!(direct, from_url);
    }

    #[test]
    fn test_missing_file_keeps_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_yet.rs");

        let uri = CanonicalUri::from_file_path(&path).unwrap();
        assert!(uri.as_url().as_str().ends_with("/not_yet.rs"));
    }

    #[test]
    fn test_key_survives_create_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gen/out.rs");

        let before = CanonicalUri::from_file_path(&path).unwrap();

        fs::create_dir(dir.path().join("gen")).unwrap();
        fs::write(&path, "").unwrap();
        let created = CanonicalUri::from_file_path(&path).unwrap();

        fs::remove_file(&path).unwrap();
        let deleted = CanonicalUri::from_url(created.as_url());

        assert_eq!(before, created);
        assert_eq!(created, deleted);
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_file_under_symlink() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();

        let via_link = CanonicalUri::from_file_path(&dir.path().join("link/new.rs")).unwrap();
        let via_real = CanonicalUri::from_file_path(&dir.path().join("real/new.rs")).unwrap();
        assert_eq!(via_link, via_real);
    }

    #[test]
    fn test_non_file_url_is_kept() {
        let url = Url::parse("untitled:Untitled-1").unwrap();
        assert_eq!(CanonicalUri::from_url(&url).as_url(), &url);
    }
}
