//! ログの出力先の設定
//!
//! 標準出力はメッセージの送受信に使うことがあるので、ログはファイルに書く。

use log::{LevelFilter, SetLoggerError};
use simplelog::{Config, WriteLogger};
use std::{env, fs::OpenOptions, io, path::PathBuf};
use thiserror::Error;

const LOG_FILE_NAME: &str = "lsp-bridge.log";

#[derive(Clone, Debug, PartialEq)]
pub struct LogConfig {
    pub file_path: PathBuf,
    pub level: LevelFilter,
}

impl Default for LogConfig {
    fn default() -> Self {
        let level = if cfg!(debug_assertions) {
            LevelFilter::Trace
        } else {
            LevelFilter::Info
        };

        let file_path = if cfg!(debug_assertions) {
            PathBuf::from(LOG_FILE_NAME)
        } else {
            env::temp_dir().join(LOG_FILE_NAME)
        };

        LogConfig { file_path, level }
    }
}

impl LogConfig {
    /// 環境変数 `LSP_BRIDGE_LOG_FILE`, `LSP_BRIDGE_LOG_LEVEL` で既定値を上書きする。
    pub fn from_env() -> Self {
        let mut config = LogConfig::default();

        if let Some(file_path) = env::var_os("LSP_BRIDGE_LOG_FILE").filter(|s| !s.is_empty()) {
            config.file_path = PathBuf::from(file_path);
        }

        if let Ok(level) = env::var("LSP_BRIDGE_LOG_LEVEL") {
            match level.trim().parse::<LevelFilter>() {
                Ok(level) => config.level = level,
                Err(_) => eprintln!("WARN: unknown log level {:?}", level),
            }
        }

        config
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to open log file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    SetLogger(#[from] SetLoggerError),
}

/// ログファイルを作り直して、ロガーを設定する。
pub fn init_log(config: &LogConfig) -> Result<(), LogError> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&config.file_path)
        .map_err(|source| LogError::Io {
            path: config.file_path.clone(),
            source,
        })?;

    WriteLogger::init(config.level, Config::default(), file)?;
    Ok(())
}
