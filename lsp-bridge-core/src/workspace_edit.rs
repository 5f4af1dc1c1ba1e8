//! WorkspaceEdit をファイルシステムに適用する。

mod apply_to_disk;
mod text_edits;

pub use self::{apply_to_disk::apply_workspace_edit_to_disk, text_edits::apply_text_edits};

use lsp_types::{TextEdit, Url};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, io, path::PathBuf};
use thiserror::Error;

/// 言語サーバーから返される編集の集まり
///
/// `changes` を先に、`document_changes` を後に、それぞれ並び順に適用する。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceEdit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<BTreeMap<Url, Vec<TextEdit>>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_changes: Option<Vec<DocumentChange>>,
}

impl WorkspaceEdit {
    /// `lsp-types` の WorkspaceEdit から変換する。
    pub fn from_lsp(edit: lsp_types::WorkspaceEdit) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::to_value(edit)?)
    }
}

/// `documentChanges` の要素
///
/// `kind` フィールドがあればファイル操作、なければドキュメントの編集。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentChange {
    Operation(ResourceOp),
    Edit(TextDocumentEdit),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentEdit {
    pub text_document: EditTarget,

    /// `annotationId` 付きの編集も受け付ける。注釈は無視する。
    pub edits: Vec<TextEdit>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EditTarget {
    pub uri: Url,
    #[serde(default)]
    pub version: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResourceOp {
    Create(CreateFile),
    Rename(RenameFile),
    Delete(DeleteFile),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateFile {
    pub uri: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<CreateFileOptions>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateFileOptions {
    /// 既存のファイルを空にする。`ignore_if_exists` より優先する。
    pub overwrite: bool,
    pub ignore_if_exists: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameFile {
    pub old_uri: Url,
    pub new_uri: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<RenameFileOptions>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenameFileOptions {
    pub overwrite: bool,
    pub ignore_if_exists: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeleteFile {
    pub uri: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<DeleteFileOptions>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeleteFileOptions {
    pub recursive: bool,
    pub ignore_if_not_exists: bool,
}

/// 適用した結果。スキップした操作は含まれない。
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResult {
    pub changed_files: Vec<PathBuf>,
    pub created_files: Vec<PathBuf>,
    pub renamed_files: Vec<RenamedFile>,
    pub deleted_files: Vec<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RenamedFile {
    pub from: PathBuf,
    pub to: PathBuf,
}

#[derive(Debug, Error)]
pub enum EditError {
    #[error("file exists: {}", .0.display())]
    FileExists(PathBuf),

    #[error("rename target exists: {}", .0.display())]
    TargetExists(PathBuf),

    #[error("failed to delete {}: {source}", .path.display())]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("not a file URI: {0}")]
    InvalidUri(Url),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_document_changes() {
        let edit: WorkspaceEdit = serde_json::from_value(json!({
            "documentChanges": [
                {
                    "textDocument": { "uri": "file:///w/a.rs", "version": 3 },
                    "edits": [
                        {
                            "range": { "start": { "line": 0, "character": 0 }, "end": { "line": 0, "character": 1 } },
                            "newText": "b",
                            "annotationId": "rename"
                        }
                    ]
                },
                { "kind": "create", "uri": "file:///w/new.rs", "options": { "ignoreIfExists": true } },
                { "kind": "rename", "oldUri": "file:///w/a.rs", "newUri": "file:///w/b.rs" },
                { "kind": "delete", "uri": "file:///w/old", "options": { "recursive": true } }
            ]
        }))
        .unwrap();

        let changes = edit.document_changes.unwrap();
        assert_eq!(changes.len(), 4);
        assert!(matches!(
            &changes[0],
            DocumentChange::Edit(TextDocumentEdit { text_document: EditTarget { version: Some(3), .. }, edits }) if edits[0].new_text == "b"
        ));
        assert!(matches!(
            &changes[1],
            DocumentChange::Operation(ResourceOp::Create(CreateFile {
                options: Some(CreateFileOptions { overwrite: false, ignore_if_exists: true }),
                ..
            }))
        ));
        assert!(matches!(
            &changes[2],
            DocumentChange::Operation(ResourceOp::Rename(RenameFile { options: None, .. }))
        ));
        assert!(matches!(
            &changes[3],
            DocumentChange::Operation(ResourceOp::Delete(DeleteFile {
                options: Some(DeleteFileOptions { recursive: true, ignore_if_not_exists: false }),
                ..
            }))
        ));
    }

    #[test]
    fn test_from_lsp() {
        let uri = Url::parse("file:///w/a.rs").unwrap();
        let mut changes = std::collections::HashMap::new();
        changes.insert(
            uri.clone(),
            vec![TextEdit {
                range: lsp_types::Range::default(),
                new_text: "x".to_string(),
            }],
        );
        let lsp_edit = lsp_types::WorkspaceEdit {
            changes: Some(changes),
            ..lsp_types::WorkspaceEdit::default()
        };

        let edit = WorkspaceEdit::from_lsp(lsp_edit).unwrap();
        assert_eq!(edit.changes.unwrap()[&uri][0].new_text, "x");
        assert_eq!(edit.document_changes, None);
    }
}
