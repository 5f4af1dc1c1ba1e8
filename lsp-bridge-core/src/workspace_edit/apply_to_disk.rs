use super::{
    apply_text_edits, ApplyResult, CreateFile, DeleteFile, DocumentChange, EditError, RenameFile,
    RenamedFile, ResourceOp, WorkspaceEdit,
};
use crate::utils::{file_uri::from_file_uri, line_ending::LineEnding, read_file::read_file};
use lsp_types::{TextEdit, Url};
use std::{
    fs::{self, OpenOptions},
    io::ErrorKind,
    path::{Path, PathBuf},
};

/// WorkspaceEdit をディスク上のファイルに適用する。
///
/// 後の操作が前の操作の結果に依存することがあるので (編集してから名前を変えるなど)、
/// 操作は与えられた順に1つずつ行う。
/// 途中で失敗したら、それまでに行った変更はそのままにしてエラーを返す。
pub fn apply_workspace_edit_to_disk(edit: &WorkspaceEdit) -> Result<ApplyResult, EditError> {
    let mut result = ApplyResult::default();

    if let Some(changes) = &edit.changes {
        for (uri, edits) in changes {
            edit_file(uri, edits, &mut result)?;
        }
    }

    if let Some(document_changes) = &edit.document_changes {
        for change in document_changes {
            match change {
                DocumentChange::Edit(edit) => {
                    edit_file(&edit.text_document.uri, &edit.edits, &mut result)?
                }
                DocumentChange::Operation(ResourceOp::Create(op)) => create_file(op, &mut result)?,
                DocumentChange::Operation(ResourceOp::Rename(op)) => rename_file(op, &mut result)?,
                DocumentChange::Operation(ResourceOp::Delete(op)) => delete_file(op, &mut result)?,
            }
        }
    }

    Ok(result)
}

fn to_path(uri: &Url) -> Result<PathBuf, EditError> {
    from_file_uri(uri).ok_or_else(|| EditError::InvalidUri(uri.clone()))
}

fn create_parent_dir(path: &Path) -> Result<(), EditError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).map_err(|source| EditError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

/// ファイルの改行コードを保ったまま、テキストの編集を適用する。
fn edit_file(uri: &Url, edits: &[TextEdit], result: &mut ApplyResult) -> Result<(), EditError> {
    let path = to_path(uri)?;

    let raw = read_file(&path).map_err(|source| EditError::Io {
        path: path.clone(),
        source,
    })?;
    let line_ending = LineEnding::detect(&raw);
    let text = apply_text_edits(&LineEnding::normalize(&raw), edits);

    fs::write(&path, line_ending.restore(&text)).map_err(|source| EditError::Io {
        path: path.clone(),
        source,
    })?;

    debug!("Edited {} ({} edits)", path.display(), edits.len());
    result.changed_files.push(path);
    Ok(())
}

fn create_file(op: &CreateFile, result: &mut ApplyResult) -> Result<(), EditError> {
    let path = to_path(&op.uri)?;
    let options = op.options.clone().unwrap_or_default();

    create_parent_dir(&path)?;

    let created = if options.overwrite {
        fs::File::create(&path)
    } else {
        OpenOptions::new().write(true).create_new(true).open(&path)
    };

    match created {
        Ok(_) => {
            debug!("Created {}", path.display());
            result.created_files.push(path);
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            if options.ignore_if_exists {
                debug!("Skipped creating {} (exists)", path.display());
                Ok(())
            } else {
                Err(EditError::FileExists(path))
            }
        }
        Err(source) => Err(EditError::Io { path, source }),
    }
}

fn rename_file(op: &RenameFile, result: &mut ApplyResult) -> Result<(), EditError> {
    let from = to_path(&op.old_uri)?;
    let to = to_path(&op.new_uri)?;
    let options = op.options.clone().unwrap_or_default();

    create_parent_dir(&to)?;

    if !options.overwrite && fs::symlink_metadata(&to).is_ok() {
        if options.ignore_if_exists {
            debug!("Skipped renaming to {} (exists)", to.display());
            return Ok(());
        }
        return Err(EditError::TargetExists(to));
    }

    fs::rename(&from, &to).map_err(|source| EditError::Io {
        path: from.clone(),
        source,
    })?;

    debug!("Renamed {} -> {}", from.display(), to.display());
    result.renamed_files.push(RenamedFile { from, to });
    Ok(())
}

fn delete_file(op: &DeleteFile, result: &mut ApplyResult) -> Result<(), EditError> {
    let path = to_path(&op.uri)?;
    let options = op.options.clone().unwrap_or_default();

    let removed = match fs::symlink_metadata(&path) {
        Ok(metadata) if metadata.is_dir() => {
            if options.recursive {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_dir(&path)
            }
        }
        Ok(_) => fs::remove_file(&path),
        Err(err) => Err(err),
    };

    match removed {
        Ok(()) => {
            debug!("Deleted {}", path.display());
            result.deleted_files.push(path);
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound && options.ignore_if_not_exists => {
            debug!("Skipped deleting {} (not found)", path.display());
            Ok(())
        }
        Err(source) => Err(EditError::DeleteFailed { path, source }),
    }
}
