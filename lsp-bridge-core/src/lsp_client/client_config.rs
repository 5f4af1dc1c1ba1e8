use std::{env, path::PathBuf};

pub const DEFAULT_SERVER_PATH: &str = "rust-analyzer";
pub const DEFAULT_LANGUAGE_ID: &str = "rust";

/// 言語サーバーを起動するための設定
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    /// ワークスペースのルート。サーバーはこのディレクトリで起動する。
    pub root_dir: PathBuf,

    pub server_path: PathBuf,
    pub server_args: Vec<String>,

    /// `didOpen` で送る言語ID
    pub language_id: String,
}

impl ClientConfig {
    pub fn new(root_dir: PathBuf) -> Self {
        ClientConfig {
            root_dir,
            server_path: PathBuf::from(DEFAULT_SERVER_PATH),
            server_args: vec![],
            language_id: DEFAULT_LANGUAGE_ID.to_string(),
        }
    }

    /// 環境変数から設定を読む。
    ///
    /// - `LSP_BRIDGE_SERVER_PATH` (なければ `RUST_ANALYZER_PATH`): サーバーの実行ファイル
    /// - `LSP_BRIDGE_SERVER_ARGS`: 空白区切りの引数
    /// - `LSP_BRIDGE_LANGUAGE_ID`
    pub fn from_env(root_dir: PathBuf) -> Self {
        ClientConfig::from_vars(root_dir, |name| env::var(name).ok())
    }

    fn from_vars(root_dir: PathBuf, var: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| var(name).filter(|s| !s.trim().is_empty());

        let mut config = ClientConfig::new(root_dir);

        if let Some(path) = var("LSP_BRIDGE_SERVER_PATH").or_else(|| var("RUST_ANALYZER_PATH")) {
            config.server_path = PathBuf::from(path);
        }

        if let Some(args) = var("LSP_BRIDGE_SERVER_ARGS") {
            config.server_args = args.split_whitespace().map(|s| s.to_string()).collect();
        }

        if let Some(language_id) = var("LSP_BRIDGE_LANGUAGE_ID") {
            config.language_id = language_id.trim().to_string();
        }

        config
    }
}
