//! Broker client for the CLI client.
//!
//! Connects to the broker daemon, performs the handshake, and provides
//! one method per request. Pushes that arrive while waiting for a
//! response are queued for [`BrokerClient::next_push`].

use std::collections::VecDeque;
use std::path::Path;

use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio_util::codec::Framed;

use crate::host::input::Rect;
use crate::ipc::codec::LengthPrefixedCodec;
use crate::ipc::protocol::{LayoutDescriptor, Message, PROTOCOL_VERSION, Response, Role, Status};

use super::ClientError;

/// Geometry reported by `connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostInfo {
    pub root: u32,
    pub width: u16,
    pub height: u16,
}

pub struct BrokerClient {
    framed: Framed<UnixStream, LengthPrefixedCodec>,
    next_id: u32,
    pushes: VecDeque<Message>,
}

impl BrokerClient {
    /// Connect to the broker at `socket_path` and perform the handshake.
    pub async fn connect(socket_path: &Path, role: Role) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(|e| ClientError::Broker(format!("connect {}: {e}", socket_path.display())))?;
        let mut framed = Framed::new(stream, LengthPrefixedCodec::new());

        framed
            .send(Message::Hello {
                id: 0,
                version: PROTOCOL_VERSION,
                role,
            })
            .await
            .map_err(|e| ClientError::Broker(format!("send hello: {e}")))?;

        match framed.next().await {
            Some(Ok(Message::HelloAck {
                status: Status::Ok, ..
            })) => {}
            Some(Ok(Message::HelloAck { error, .. })) => {
                return Err(ClientError::Broker(format!(
                    "handshake rejected: {}",
                    error.unwrap_or_default()
                )));
            }
            other => {
                return Err(ClientError::Broker(format!(
                    "unexpected handshake response: {other:?}"
                )));
            }
        }

        Ok(Self {
            framed,
            next_id: 1, // 0 = Hello
            pushes: VecDeque::new(),
        })
    }

    /// Send a request built from a fresh id and wait for its response.
    ///
    /// A non-`ok` status becomes [`ClientError::Request`].
    async fn request(
        &mut self,
        what: &'static str,
        build: impl FnOnce(u32) -> Message,
    ) -> Result<Response, ClientError> {
        let id = self.next_id;
        self.next_id += 1;

        self.framed
            .send(build(id))
            .await
            .map_err(|e| ClientError::Broker(format!("send {what}: {e}")))?;

        loop {
            match self.framed.next().await {
                Some(Ok(Message::Response(response))) if response.id == id => {
                    if response.status != Status::Ok {
                        return Err(ClientError::Request {
                            what,
                            status: response.status,
                            error: response.error,
                        });
                    }
                    return Ok(response);
                }
                Some(Ok(Message::Response(response))) => {
                    tracing::debug!(id = response.id, "ignoring stale response");
                }
                Some(Ok(push)) => self.pushes.push_back(push),
                Some(Err(e)) => return Err(ClientError::Broker(format!("{what}: {e}"))),
                None => return Err(ClientError::Broker(format!("{what}: broker closed connection"))),
            }
        }
    }

    pub async fn connect_display(&mut self, display: &str) -> Result<HostInfo, ClientError> {
        let response = self
            .request("connect", |id| Message::Connect {
                id,
                display: display.to_owned(),
            })
            .await?;
        match (response.root, response.screen_width, response.screen_height) {
            (Some(root), Some(width), Some(height)) => Ok(HostInfo {
                root,
                width,
                height,
            }),
            _ => Err(ClientError::Broker("connect response missing geometry".into())),
        }
    }

    pub async fn start_input(&mut self, x11_window: u32, handle: u64) -> Result<(), ClientError> {
        self.request("start_input", |id| Message::StartInput {
            id,
            x11_window,
            handle,
        })
        .await
        .map(drop)
    }

    pub async fn stop_input(&mut self, x11_window: u32) -> Result<(), ClientError> {
        self.request("stop_input", |id| Message::StopInput { id, x11_window })
            .await
            .map(drop)
    }

    pub async fn list_layouts(&mut self) -> Result<Vec<LayoutDescriptor>, ClientError> {
        let response = self
            .request("list_layouts", |id| Message::ListLayouts { id })
            .await?;
        Ok(response.layouts.unwrap_or_default())
    }

    pub async fn keyboard_tables(&mut self, layout: u32) -> Result<Response, ClientError> {
        self.request("get_keyboard_tables", |id| Message::GetKeyboardTables { id, layout })
            .await
    }

    pub async fn clip_cursor(&mut self, rect: Option<Rect>) -> Result<(), ClientError> {
        self.request("clip_cursor", |id| Message::ClipCursor { id, rect })
            .await
            .map(drop)
    }

    pub async fn set_cursor_pos(&mut self, x: i32, y: i32) -> Result<(), ClientError> {
        self.request("set_cursor_pos", |id| Message::SetCursorPos { id, x, y })
            .await
            .map(drop)
    }

    /// Next unsolicited message, or `None` once the broker hangs up.
    pub async fn next_push(&mut self) -> Result<Option<Message>, ClientError> {
        if let Some(push) = self.pushes.pop_front() {
            return Ok(Some(push));
        }
        match self.framed.next().await {
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(e)) => Err(ClientError::Broker(format!("receive: {e}"))),
            None => Ok(None),
        }
    }
}
