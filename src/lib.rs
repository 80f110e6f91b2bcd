//! Editor-side shim for earthlyls, the Earthly language server.
//!
//! The crate mirrors the activation contract of editor extension hosts:
//! [`activate`] resolves the platform-specific server binary, spawns it and
//! issues the start request without waiting for the handshake; [`deactivate`]
//! stops the client and resolves once the server is gone. The client applies
//! to `earthfile` documents and keeps the server informed about every
//! `Earthfile` in the workspace.

pub mod client;
pub mod config;
pub mod error;
pub mod log;
pub mod platform;
pub mod watcher;

use std::path::PathBuf;

use tracing::info;

use crate::client::options::ClientOptions;
use crate::client::session::Session;
use crate::error::ClientError;
use crate::platform::Platform;

/// Everything the host supplies to an activation: where the server binaries
/// live and which workspace is open.
#[derive(Debug, Clone)]
pub struct HostContext {
    pub install_dir: PathBuf,
    pub workspace_root: PathBuf,
}

/// Activate the client for a workspace.
///
/// Resolves the platform (an unsupported one aborts before any process is
/// created), spawns the server and issues the start request. Returns as soon
/// as the request is issued; the handshake completes in the background. The
/// returned [`Session`] is owned by the caller and must be handed back to
/// [`deactivate`].
pub fn activate(ctx: &HostContext) -> Result<Session, ClientError> {
    let platform = Platform::detect()?;
    let command = config::server_command_path(&ctx.install_dir, platform);
    let options = ClientOptions::default();
    info!(id = %options.id, %platform, "activating {}", options.name);

    let mut session = Session::launch(&command, options, &ctx.workspace_root)?;
    session.start()?;
    session.watch()?;
    Ok(session)
}

/// Deactivate the client.
///
/// `None` means activation never completed; that is a benign no-op resolving
/// immediately. Otherwise the session's stop completion is returned to the
/// caller.
pub async fn deactivate(session: Option<&mut Session>) -> Result<(), ClientError> {
    match session {
        Some(session) => session.stop().await,
        None => Ok(()),
    }
}
