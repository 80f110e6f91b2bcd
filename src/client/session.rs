//! The client lifecycle: Inactive → Starting → Running → Stopped.
//!
//! Start is asynchronous by contract: `Session::start` issues the
//! `initialize`/`initialized` handshake on a background task and returns
//! immediately. `Session::stop` performs the `shutdown`/`exit` sequence and
//! resolves once the server process is reaped. There is no restart, no
//! supervision and no health checking: if the server dies, the session is
//! simply over.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tower_lsp::jsonrpc;
use tower_lsp::lsp_types::{DidChangeWatchedFilesParams, FileEvent, Url};
use tracing::{debug, info, warn};

use crate::client::options::ClientOptions;
use crate::client::transport::{Incoming, Reader, Writer};
use crate::error::ClientError;
use crate::watcher::WorkspaceWatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Inactive,
    Starting,
    Running,
    Stopped,
}

/// Messages queued for the outbound pump. `Flushed` is a sync point: its ack
/// fires once every earlier frame is on the wire.
enum Outgoing {
    Request(jsonrpc::Request),
    Response(jsonrpc::Response),
    Flushed(oneshot::Sender<()>),
}

type Pending = Arc<Mutex<HashMap<i64, oneshot::Sender<jsonrpc::Result<Value>>>>>;

/// Shared wire handle: cheap to clone into the background tasks that need to
/// talk to the server (handshake, watcher, inbound pump).
#[derive(Clone)]
pub struct ClientHandle {
    outbound: mpsc::UnboundedSender<Outgoing>,
    pending: Pending,
    next_id: Arc<AtomicI64>,
    state: Arc<watch::Sender<SessionState>>,
    /// Set by the inbound pump when the transport goes away, so requests
    /// issued afterwards fail instead of waiting on a response forever.
    closed: Arc<AtomicBool>,
}

impl ClientHandle {
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    /// Move `from` → `to`; false when some other transition won the race.
    fn try_transition(&self, from: SessionState, to: SessionState) -> bool {
        let mut moved = false;
        self.state.send_modify(|state| {
            if *state == from {
                *state = to;
                moved = true;
            }
        });
        moved
    }

    /// Send a request and await the matching response.
    pub async fn request(
        &self,
        method: &'static str,
        params: Option<Value>,
    ) -> Result<Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut request = jsonrpc::Request::build(method).id(id);
        if let Some(params) = params {
            request = request.params(params);
        }
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);
        if self.outbound.send(Outgoing::Request(request.finish())).is_err() {
            self.pending.lock().unwrap().remove(&id);
            return Err(ClientError::TransportClosed(method.to_string()));
        }
        // The inbound pump only resolves entries it saw before closing; an
        // entry registered after that point has to fail here.
        if self.closed.load(Ordering::SeqCst) && self.pending.lock().unwrap().remove(&id).is_some()
        {
            return Err(ClientError::TransportClosed(method.to_string()));
        }
        let result = rx.await.map_err(|_| ClientError::TransportClosed(method.to_string()))?;
        result.map_err(|error| ClientError::Server { method: method.to_string(), error })
    }

    /// Send a notification; nothing comes back.
    pub fn notify(&self, method: &'static str, params: Option<Value>) -> Result<(), ClientError> {
        let mut request = jsonrpc::Request::build(method);
        if let Some(params) = params {
            request = request.params(params);
        }
        self.outbound
            .send(Outgoing::Request(request.finish()))
            .map_err(|_| ClientError::TransportClosed(method.to_string()))
    }

    /// Forward file-system events as `workspace/didChangeWatchedFiles`.
    pub fn did_change_watched_files(&self, changes: Vec<FileEvent>) -> Result<(), ClientError> {
        if changes.is_empty() {
            return Ok(());
        }
        let params = DidChangeWatchedFilesParams { changes };
        self.notify("workspace/didChangeWatchedFiles", Some(serde_json::to_value(params)?))
    }
}

/// A language client bound to one server process.
///
/// Owned by whoever drove the activation; there is no process-wide client
/// reference. Dropping the session kills the server (the child is spawned
/// with kill-on-drop); prefer `stop` for a clean shutdown.
pub struct Session {
    handle: ClientHandle,
    options: ClientOptions,
    workspace_root: PathBuf,
    child: Option<Child>,
    watcher: Option<WorkspaceWatcher>,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    /// Spawn the server executable and wire a session over its stdio.
    pub fn launch(
        command: &Path,
        options: ClientOptions,
        workspace_root: &Path,
    ) -> Result<Self, ClientError> {
        info!(command = %command.display(), "launching earthlyls");
        let spawn_err = |source| ClientError::Spawn { command: command.to_path_buf(), source };
        let mut child = Command::new(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_err(std::io::Error::other("child stdin not captured")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_err(std::io::Error::other("child stdout not captured")))?;

        let mut session = Self::connect(stdout, stdin, options, workspace_root);
        session.child = Some(child);
        Ok(session)
    }

    /// Wire a session over an arbitrary transport.
    ///
    /// `launch` is the production path; tests drive this over in-memory pipes
    /// instead of a child process.
    pub fn connect<R, W>(reader: R, writer: W, options: ClientOptions, workspace_root: &Path) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Outgoing>();
        let (state, _) = watch::channel(SessionState::Inactive);
        let handle = ClientHandle {
            outbound,
            pending: Arc::default(),
            next_id: Arc::new(AtomicI64::new(1)),
            state: Arc::new(state),
            closed: Arc::default(),
        };

        // Outbound pump. Routing everything through one queue keeps the
        // handshake and shutdown messages in issue order on the wire.
        let mut writer = Writer::new(writer);
        let write_task = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let written = match message {
                    Outgoing::Request(request) => writer.write_message(&request).await,
                    Outgoing::Response(response) => writer.write_message(&response).await,
                    Outgoing::Flushed(ack) => {
                        let _ = ack.send(());
                        continue;
                    }
                };
                if let Err(e) = written {
                    warn!("failed to write to the language server: {e}");
                    break;
                }
            }
        });

        // Inbound pump: responses are routed back to their requester by id.
        let inbound = handle.clone();
        let mut reader = Reader::new(reader);
        let read_task = tokio::spawn(async move {
            loop {
                match reader.read_message().await {
                    Ok(Some(Incoming::Response(response))) => {
                        let (id, result) = response.into_parts();
                        let id = match id {
                            jsonrpc::Id::Number(n) => n,
                            other => {
                                debug!(id = ?other, "response with a non-numeric id");
                                continue;
                            }
                        };
                        match inbound.pending.lock().unwrap().remove(&id) {
                            Some(tx) => {
                                let _ = tx.send(result);
                            }
                            None => debug!(id, "response with no pending request"),
                        }
                    }
                    Ok(Some(Incoming::Request(request))) => {
                        // The shim registers no dynamic capabilities and
                        // applies no edits, so server requests are
                        // acknowledged with a null result and notifications
                        // are only logged.
                        match request.id().cloned() {
                            Some(id) => {
                                debug!(method = request.method(), "acknowledging server request");
                                let response = jsonrpc::Response::from_ok(id, Value::Null);
                                let _ = inbound.outbound.send(Outgoing::Response(response));
                            }
                            None => debug!(method = request.method(), "server notification"),
                        }
                    }
                    Ok(None) => {
                        debug!("language server closed the transport");
                        break;
                    }
                    Err(e) => {
                        warn!("failed to read from the language server: {e}");
                        break;
                    }
                }
            }
            // Unblock anything still waiting on a response, and fail requests
            // issued from now on.
            inbound.closed.store(true, Ordering::SeqCst);
            inbound.pending.lock().unwrap().clear();
        });

        Self {
            handle,
            options,
            workspace_root: workspace_root.to_path_buf(),
            child: None,
            watcher: None,
            tasks: vec![write_task, read_task],
        }
    }

    pub fn state(&self) -> SessionState {
        self.handle.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.handle.subscribe()
    }

    pub fn handle(&self) -> ClientHandle {
        self.handle.clone()
    }

    /// Issue the start request and return immediately.
    ///
    /// The `initialize`/`initialized` handshake runs on a background task;
    /// observe progress through `subscribe`. A session that has already been
    /// started is left untouched and the call fails.
    pub fn start(&mut self) -> Result<(), ClientError> {
        if self.handle.state() != SessionState::Inactive {
            return Err(ClientError::AlreadyStarted);
        }
        self.handle.set_state(SessionState::Starting);

        let handle = self.handle.clone();
        let params = initialize_params(&self.options, &self.workspace_root);
        let handshake = tokio::spawn(async move {
            match handle.request("initialize", Some(params)).await {
                Ok(_capabilities) => {
                    let initialized = handle.notify("initialized", Some(serde_json::json!({})));
                    if let Err(e) = initialized {
                        warn!("failed to send initialized: {e}");
                        return;
                    }
                    if handle.try_transition(SessionState::Starting, SessionState::Running) {
                        info!("earthlyls is running");
                    } else {
                        debug!("session was stopped during the handshake");
                    }
                }
                // Handshake failures are the server's to explain; the session
                // stays in Starting and can still be stopped.
                Err(e) => warn!("initialize failed: {e}"),
            }
        });
        self.tasks.push(handshake);
        Ok(())
    }

    /// Watch the workspace for Earthfile changes and forward them to the
    /// server once the session is running.
    pub fn watch(&mut self) -> Result<(), ClientError> {
        let watcher = WorkspaceWatcher::spawn(
            self.workspace_root.clone(),
            self.options.clone(),
            self.handle.clone(),
        )?;
        self.watcher = Some(watcher);
        Ok(())
    }

    /// Stop the client: `shutdown` request, `exit` notification, reap the
    /// child. Resolves immediately as a no-op when nothing was ever started,
    /// and the second call after a stop is a no-op too.
    pub async fn stop(&mut self) -> Result<(), ClientError> {
        match self.handle.state() {
            SessionState::Inactive | SessionState::Stopped => return Ok(()),
            SessionState::Starting | SessionState::Running => {}
        }

        // Tear the watcher down first so no file event races the shutdown.
        self.watcher = None;

        let result = self.handle.request("shutdown", None).await;
        if let Err(e) = &result {
            warn!("shutdown request failed: {e}");
        }
        let _ = self.handle.notify("exit", None);

        // Wait for the exit notification to reach the wire before reaping.
        let (tx, rx) = oneshot::channel();
        let _ = self.handle.outbound.send(Outgoing::Flushed(tx));
        let _ = rx.await;

        self.handle.set_state(SessionState::Stopped);

        if let Some(mut child) = self.child.take() {
            match child.wait().await {
                Ok(status) => info!(%status, "earthlyls stopped"),
                Err(e) => warn!("failed to reap earthlyls: {e}"),
            }
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }

        result.map(|_| ())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

fn initialize_params(options: &ClientOptions, workspace_root: &Path) -> Value {
    // A workspace under "My Project" must reach the server as
    // .../My%20Project, so the URI goes through the url crate instead of
    // string formatting. from_file_path rejects relative paths; those
    // degrade to a null rootUri, which LSP permits.
    let workspace_uri = Url::from_file_path(workspace_root).ok();
    let workspace_folders = match &workspace_uri {
        Some(uri) => serde_json::json!([{
            "uri": uri,
            "name": workspace_root.file_name().unwrap_or_default().to_string_lossy()
        }]),
        None => serde_json::json!([]),
    };
    serde_json::json!({
        "processId": std::process::id(),
        "clientInfo": { "name": options.id, "version": env!("CARGO_PKG_VERSION") },
        "rootUri": workspace_uri,
        "capabilities": {
            "textDocument": {
                "synchronization": { "dynamicRegistration": false },
                "publishDiagnostics": { "relatedInformation": false }
            },
            "workspace": {
                "applyEdit": false,
                "didChangeWatchedFiles": { "dynamicRegistration": false }
            }
        },
        "workspaceFolders": workspace_folders
    })
}
