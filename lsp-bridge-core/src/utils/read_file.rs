use std::{
    fs,
    io::{self, ErrorKind},
    path::Path,
};

/// ファイルを UTF-8 のテキストとして読む。
///
/// UTF-8 として不正なファイルは `InvalidData` のエラーになる。
pub(crate) fn read_file(file_path: &Path) -> io::Result<String> {
    let contents = fs::read(file_path)?;
    String::from_utf8(contents).map_err(|err| io::Error::new(ErrorKind::InvalidData, err))
}
