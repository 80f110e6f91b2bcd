use std::path::PathBuf;

use thiserror::Error;
use tower_lsp::jsonrpc;

#[derive(Debug, Error)]
pub enum ClientError {
    /// No earthlyls binary is shipped for this OS/arch pair. Fatal: activation
    /// aborts before any client is created.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("language client is already started")]
    AlreadyStarted,

    #[error("failed to launch language server {}: {source}", .command.display())]
    Spawn {
        command: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The transport went away before a response to `{0}` arrived.
    #[error("transport closed while waiting on {0:?}")]
    TransportClosed(String),

    #[error("server rejected {method:?}: {error}")]
    Server {
        method: String,
        error: jsonrpc::Error,
    },

    #[error("failed to watch workspace: {0}")]
    Watch(#[from] notify::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
