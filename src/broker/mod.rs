//! Broker daemon: owns host X11 connections on behalf of desktop clients.
//!
//! Listens on a Unix domain socket. Clients attach to the host
//! connection for a display, register windows for input and receive
//! hardware input, language changes and lock-key state as pushes.
//!
//! Architecture: channel-based actor. A single broker loop owns all
//! mutable state ([`state::BrokerState`]), including every host
//! connection. Per-connection tasks forward requests via mpsc channels;
//! host event pumps deliver server events on a notice channel, and their
//! output is routed back to client connections through per-connection
//! push channels.

mod connection;
mod handler;
pub mod state;

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

use connection::{BrokerCommand, DisconnectNotice};
use state::{BrokerConfig, BrokerState, ConnectionId, Outbound};

use crate::host::backend::{HostNotice, NoticeKind};
use crate::host::registry::Connector;
use crate::host::x11::XcbConnector;
use crate::ipc::protocol::Message;

/// Broker startup/runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("$XDG_RUNTIME_DIR is not set")]
    NoRuntimeDir,
    #[error("broker already running at {0}")]
    AlreadyRunning(PathBuf),
    #[error("socket path {0} has no parent directory")]
    BadSocketPath(PathBuf),
    #[error("failed to create directory {path}: {source}")]
    MkdirFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to bind socket {path}: {source}")]
    BindFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the broker daemon until SIGTERM or SIGINT.
///
/// The socket lives at `socket` or `$XDG_RUNTIME_DIR/x11hostd/broker.sock`
/// and is removed on shutdown.
pub async fn run(config: BrokerConfig, socket: Option<PathBuf>) -> Result<(), BrokerError> {
    let socket_path = match socket {
        Some(path) => path,
        None => resolve_socket_path()?,
    };
    let listener = bind_socket(&socket_path).await?;

    tracing::info!(
        path = %socket_path.display(),
        x11 = config.x11_enabled,
        virtual_screen = ?config.virtual_screen,
        "broker listening"
    );

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;
    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
        }
    };

    serve(listener, config, Box::new(XcbConnector), shutdown).await;

    if let Err(e) = std::fs::remove_file(&socket_path) {
        tracing::warn!(error = %e, path = %socket_path.display(), "failed to remove socket");
    }

    tracing::info!("broker stopped");
    Ok(())
}

/// The broker loop. Returns when `shutdown` completes.
///
/// Dropping the state on return closes every host connection.
async fn serve(
    listener: UnixListener,
    config: BrokerConfig,
    connector: Box<dyn Connector>,
    shutdown: impl Future<Output = ()>,
) {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<BrokerCommand>();
    let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel::<DisconnectNotice>();
    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel::<HostNotice>();

    let mut push_senders: HashMap<ConnectionId, mpsc::UnboundedSender<Message>> = HashMap::new();
    let mut state = BrokerState::new(config, connector, notice_tx);

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        accept_connection(stream, &cmd_tx, &disconnect_tx, &mut push_senders);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }

            Some(cmd) = cmd_rx.recv() => {
                let (response, pushes) =
                    handler::handle_message(&mut state, cmd.request, cmd.connection_id);
                let _ = cmd.response_tx.send(response);
                deliver(&push_senders, pushes);
            }

            Some(notice) = notice_rx.recv() => {
                match notice.kind {
                    NoticeKind::Event(event) => {
                        let pushes = state.dispatch(notice.host, event);
                        deliver(&push_senders, pushes);
                    }
                    NoticeKind::Failed(reason) => state.mark_failed(notice.host, &reason),
                }
            }

            Some(notice) = disconnect_rx.recv() => {
                let conn_id = notice.connection_id;
                push_senders.remove(&conn_id);
                state.remove_connection(conn_id);
                tracing::debug!(?conn_id, "connection cleaned up");
            }

            _ = &mut shutdown => break,
        }
    }
}

/// Accept a new connection: create its push channel and spawn its task.
fn accept_connection(
    stream: UnixStream,
    cmd_tx: &mpsc::UnboundedSender<BrokerCommand>,
    disconnect_tx: &mpsc::UnboundedSender<DisconnectNotice>,
    push_senders: &mut HashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
) {
    let conn_id = ConnectionId::new();
    let (push_tx, push_rx) = mpsc::unbounded_channel();
    push_senders.insert(conn_id, push_tx);

    connection::spawn_connection(stream, conn_id, cmd_tx.clone(), push_rx, disconnect_tx.clone());

    tracing::debug!(?conn_id, "accepted connection");
}

/// Hand pushes to their connection tasks.
fn deliver(
    push_senders: &HashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
    pushes: Vec<Outbound>,
) {
    for push in pushes {
        match push_senders.get(&push.target) {
            Some(tx) => {
                if tx.send(push.message).is_err() {
                    tracing::debug!(conn_id = ?push.target, "push dropped, client gone");
                }
            }
            None => tracing::debug!(conn_id = ?push.target, "push target not found"),
        }
    }
}

// -- Socket setup --

/// Resolve the default socket path from `$XDG_RUNTIME_DIR`.
fn resolve_socket_path() -> Result<PathBuf, BrokerError> {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR").map_err(|_| BrokerError::NoRuntimeDir)?;
    Ok(PathBuf::from(runtime_dir)
        .join("x11hostd")
        .join("broker.sock"))
}

/// Default socket path, shared with the client.
pub fn default_socket_path() -> Option<PathBuf> {
    resolve_socket_path().ok()
}

/// Bind the broker socket inside an owner-only directory.
///
/// A leftover socket file is replaced unless a broker still answers on it.
async fn bind_socket(path: &Path) -> Result<UnixListener, BrokerError> {
    private_dir(path)?;

    let bind_failed = |source: std::io::Error| BrokerError::BindFailed {
        path: path.to_path_buf(),
        source,
    };
    let in_use = match UnixListener::bind(path) {
        Ok(listener) => return Ok(listener),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => e,
        Err(e) => return Err(bind_failed(e)),
    };
    if UnixStream::connect(path).await.is_ok() {
        return Err(BrokerError::AlreadyRunning(path.to_path_buf()));
    }
    tracing::info!(path = %path.display(), error = %in_use, "replacing stale broker socket");
    std::fs::remove_file(path).map_err(bind_failed)?;
    UnixListener::bind(path).map_err(bind_failed)
}

/// Create the socket's directory when missing and restrict it to mode 0700.
fn private_dir(path: &Path) -> Result<(), BrokerError> {
    use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| BrokerError::BadSocketPath(path.to_path_buf()))?;
    let mkdir_failed = |source: std::io::Error| BrokerError::MkdirFailed {
        path: dir.to_path_buf(),
        source,
    };
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .map_err(mkdir_failed)?;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)).map_err(mkdir_failed)
}
