//! CLI client for broker operations.
//!
//! Each action connects to the broker, attaches to a display, performs
//! one request, prints the result, and exits. `listen` stays attached
//! and prints pushes until the broker hangs up or Ctrl-C.

mod broker_client;
mod format;

use std::path::PathBuf;

use crate::cli::ClientAction;
use crate::ipc::protocol::{Role, Status};
use broker_client::BrokerClient;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("broker: {0}")]
    Broker(String),
    #[error("{what} failed: {status:?}{}", detail(.error))]
    Request {
        what: &'static str,
        status: Status,
        error: Option<String>,
    },
    #[error("no socket path: pass --socket or set XDG_RUNTIME_DIR")]
    NoSocket,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn detail(error: &Option<String>) -> String {
    error.as_deref().map(|e| format!(" ({e})")).unwrap_or_default()
}

/// Run the client command against the broker at `socket`.
pub async fn run(
    socket: Option<PathBuf>,
    display: String,
    action: ClientAction,
) -> Result<(), ClientError> {
    let socket = socket
        .or_else(crate::broker::default_socket_path)
        .ok_or(ClientError::NoSocket)?;
    let role = match action {
        ClientAction::Listen { .. } => Role::Desktop,
        _ => Role::Client,
    };

    let mut broker = BrokerClient::connect(&socket, role).await?;
    let info = broker.connect_display(&display).await?;

    match action {
        ClientAction::Info => format::print_info(&display, &info),
        ClientAction::Layouts => {
            let layouts = broker.list_layouts().await?;
            format::print_layouts(&layouts);
        }
        ClientAction::Tables { layout } => {
            let response = broker.keyboard_tables(layout).await?;
            format::print_tables(layout, &response)?;
        }
        ClientAction::Clip { rect } => {
            broker.clip_cursor(rect).await?;
            format::print_clip(rect);
        }
        ClientAction::Warp { x, y } => {
            broker.set_cursor_pos(x, y).await?;
            println!("Cursor moved to {x},{y}");
        }
        ClientAction::Listen { windows } => {
            for (index, window) in windows.iter().enumerate() {
                broker.start_input(*window, index as u64 + 1).await?;
                tracing::info!(window = format_args!("{window:#x}"), "listening");
            }
            listen(&mut broker).await?;
            for window in &windows {
                if let Err(e) = broker.stop_input(*window).await {
                    tracing::debug!(error = %e, "stop_input after listen");
                }
            }
        }
    }

    Ok(())
}

async fn listen(broker: &mut BrokerClient) -> Result<(), ClientError> {
    loop {
        tokio::select! {
            push = broker.next_push() => match push? {
                Some(msg) => format::print_push(&msg),
                None => {
                    eprintln!("broker closed connection");
                    return Ok(());
                }
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}
