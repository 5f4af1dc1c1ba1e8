//! 言語サーバーを子プロセスとして起動して、接続・ドキュメント同期・編集の適用をまとめて扱う。

mod client_config;

pub use self::client_config::{ClientConfig, DEFAULT_LANGUAGE_ID, DEFAULT_SERVER_PATH};

use crate::{
    docs::{DocError, DocumentSync, OpenDocument},
    jsonrpc::{RpcConnection, RpcError},
    utils::{canonical_uri::CanonicalUri, file_uri::resolve_in, lock},
    workspace_edit::{apply_workspace_edit_to_disk, ApplyResult, EditError, WorkspaceEdit},
};
use lsp_types::{
    notification::{Exit, Initialized, PublishDiagnostics},
    request::Shutdown,
    Diagnostic, InitializedParams,
};
use serde_json::{json, Value};
use std::{
    collections::{HashMap, HashSet},
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
    process::{self, Child, Command, Stdio},
    sync::{Arc, Mutex},
    thread,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to spawn {}: {source}", .command.display())]
    Spawn {
        command: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("server process has no {0} pipe")]
    MissingPipe(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error(transparent)]
    Doc(#[from] DocError),
}

type DiagnosticsMap = HashMap<CanonicalUri, Vec<Diagnostic>>;

pub struct LanguageClient {
    connection: RpcConnection,
    documents: DocumentSync,
    diagnostics: Arc<Mutex<DiagnosticsMap>>,
    language_id: String,
    initialize_result: Value,
    child: Option<Child>,
}

impl LanguageClient {
    /// 言語サーバーを起動して初期化する。
    pub fn spawn(config: &ClientConfig) -> Result<Self, ClientError> {
        info!(
            "Spawning {} {:?} in {}",
            config.server_path.display(),
            config.server_args,
            config.root_dir.display()
        );

        let mut child = Command::new(&config.server_path)
            .args(&config.server_args)
            .current_dir(&config.root_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ClientError::Spawn {
                command: config.server_path.clone(),
                source,
            })?;

        let pipes = (child.stdin.take(), child.stdout.take());
        let (stdin, stdout) = match pipes {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            (None, _) => return Err(kill_on_error(child, ClientError::MissingPipe("stdin"))),
            (_, None) => return Err(kill_on_error(child, ClientError::MissingPipe("stdout"))),
        };

        if let Some(stderr) = child.stderr.take() {
            let spawned = thread::Builder::new()
                .name("lsp-server-stderr".to_string())
                .spawn(move || {
                    // サーバーのログは多いので trace に流す。
                    for line in BufReader::new(stderr).lines() {
                        match line {
                            Ok(line) => trace!("[server] {}", line),
                            Err(_) => break,
                        }
                    }
                });
            if let Err(err) = spawned {
                warn!("Failed to spawn stderr reader: {}", err);
            }
        }

        let connection = RpcConnection::new(stdout, stdin);
        let mut client = match LanguageClient::initialize(
            connection,
            config.root_dir.clone(),
            config.language_id.clone(),
        ) {
            Ok(it) => it,
            Err(err) => return Err(kill_on_error(child, err)),
        };
        client.child = Some(child);
        Ok(client)
    }

    /// 既存の接続の上で初期化する。言語IDは `rust` になる。
    pub fn connect(connection: RpcConnection, root_dir: PathBuf) -> Result<Self, ClientError> {
        LanguageClient::initialize(connection, root_dir, DEFAULT_LANGUAGE_ID.to_string())
    }

    fn initialize(
        connection: RpcConnection,
        root_dir: PathBuf,
        language_id: String,
    ) -> Result<Self, ClientError> {
        let root_uri = CanonicalUri::from_file_path(&root_dir)
            .ok_or_else(|| DocError::InvalidUri(root_dir.display().to_string()))?;

        let diagnostics = Arc::new(Mutex::new(DiagnosticsMap::new()));
        {
            let diagnostics = Arc::clone(&diagnostics);
            connection.on_notification::<PublishDiagnostics>(move |params| {
                trace!(
                    "publishDiagnostics {} ({} items)",
                    params.uri,
                    params.diagnostics.len()
                );
                lock(&diagnostics).insert(CanonicalUri::from_url(&params.uri), params.diagnostics);
                Ok(())
            });
        }

        connection.start();

        let initialize_result = connection
            .request_raw("initialize", initialize_params(root_uri.as_url().as_str()))
            .wait()?;
        debug!("Initialized: {}", initialize_result["serverInfo"]);

        connection.notify::<Initialized>(InitializedParams {});

        let documents = DocumentSync::new(connection.clone(), root_dir);
        Ok(LanguageClient {
            connection,
            documents,
            diagnostics,
            language_id,
            initialize_result,
            child: None,
        })
    }

    pub fn connection(&self) -> &RpcConnection {
        &self.connection
    }

    pub fn documents(&self) -> &DocumentSync {
        &self.documents
    }

    pub fn documents_mut(&mut self) -> &mut DocumentSync {
        &mut self.documents
    }

    /// `initialize` に対する応答
    pub fn initialize_result(&self) -> &Value {
        &self.initialize_result
    }

    pub fn open_document(&mut self, path: &Path) -> Result<&OpenDocument, ClientError> {
        Ok(self.documents.open_if_needed(path, &self.language_id)?)
    }

    /// ファイルについて最後に通知された診断情報。通知がなければ空。
    pub fn diagnostics_for_file(&self, path: &Path) -> Vec<Diagnostic> {
        let file_path = resolve_in(self.documents.root_dir(), path);
        let uri = match CanonicalUri::from_file_path(&file_path) {
            Some(it) => it,
            None => return vec![],
        };

        lock(&self.diagnostics)
            .get(&uri)
            .cloned()
            .unwrap_or_default()
    }

    /// 編集をディスクに適用して、開いているドキュメントに変更を通知する。
    pub fn apply_workspace_edit(&mut self, edit: &WorkspaceEdit) -> Result<ApplyResult, ClientError> {
        let result = apply_workspace_edit_to_disk(edit)?;

        // 編集した後で移動・削除されたファイルはもう読めないので飛ばす。
        let moved_away = |path: &Path| {
            let moved = result.renamed_files.iter().any(|renamed| renamed.from == path)
                || result.deleted_files.iter().any(|deleted| deleted == path);
            moved && !path.exists()
        };

        let mut done = HashSet::new();
        for path in result.changed_files.iter().chain(&result.created_files) {
            if !done.insert(path) || !self.documents.is_open(path) {
                continue;
            }
            if moved_away(path.as_path()) {
                debug!("Skipped refreshing {}: no longer on disk", path.display());
                continue;
            }
            self.documents.update_from_disk(path)?;
        }

        for renamed in &result.renamed_files {
            if self.documents.is_open(&renamed.from) {
                debug!(
                    "Open document was renamed: {} -> {}",
                    renamed.from.display(),
                    renamed.to.display()
                );
            }
        }

        Ok(result)
    }

    /// `shutdown` と `exit` を送って、サーバーの終了を待つ。
    pub fn shutdown(mut self) -> Result<(), ClientError> {
        self.connection.request::<Shutdown>(()).wait()?;
        self.connection.notify::<Exit>(());

        if let Some(mut child) = self.child.take() {
            let status = child.wait()?;
            debug!("Server exited: {}", status);
            self.connection.join();
        }
        Ok(())
    }
}

impl Drop for LanguageClient {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            child.kill().ok();
            child.wait().ok();
        }
    }
}

fn kill_on_error(mut child: Child, err: ClientError) -> ClientError {
    child.kill().ok();
    child.wait().ok();
    err
}

fn initialize_params(root_uri: &str) -> Value {
    json!({
        "processId": process::id(),
        "rootUri": root_uri,
        "capabilities": {
            "workspace": {
                "workspaceEdit": {
                    "documentChanges": true,
                    "resourceOperations": ["create", "rename", "delete"],
                },
                "executeCommand": {},
            },
            "textDocument": {
                "synchronization": { "didSave": false },
                "publishDiagnostics": {},
                "definition": { "linkSupport": true },
                "references": {},
                "rename": { "prepareSupport": false },
                "codeAction": {
                    "codeActionLiteralSupport": { "codeActionKind": { "valueSet": ["*"] } },
                },
                "formatting": {},
            },
        },
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}
