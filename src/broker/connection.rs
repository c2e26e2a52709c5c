//! Per-client task.
//!
//! A client speaks `Hello` first. Once accepted, its requests go to the
//! broker loop one at a time, and host pushes queued for it by the loop
//! (window input, language changes, lock state) are written between
//! responses.

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;

use crate::ipc::codec::{CodecError, DecodeResult, FrameCodec, decode_frame};
use crate::ipc::protocol::{Message, Response, Status};

use super::state::ConnectionId;

/// A request handed to the broker loop, with the slot for its answer.
#[derive(Debug)]
pub struct BrokerCommand {
    pub request: Message,
    pub response_tx: oneshot::Sender<Message>,
    pub connection_id: ConnectionId,
}

/// Sent once when a client task ends, whatever the reason.
#[derive(Debug)]
pub struct DisconnectNotice {
    pub connection_id: ConnectionId,
}

/// Pushes the broker loop routed to this client.
type PushRx = mpsc::UnboundedReceiver<Message>;

#[derive(Debug, thiserror::Error)]
enum SessionError {
    #[error("client left before hello")]
    NoHello,
    #[error("first message was not hello")]
    NotHello,
    #[error("undecodable frame: {0}")]
    Malformed(#[from] rmp_serde::decode::Error),
    #[error("transport: {0}")]
    Codec(#[from] CodecError),
    #[error("broker loop stopped")]
    BrokerGone,
}

/// Whichever side of the session woke first.
enum Wake {
    Frame(Option<Result<BytesMut, CodecError>>),
    Push(Option<Message>),
}

struct Session {
    framed: Framed<UnixStream, FrameCodec>,
    id: ConnectionId,
    broker: mpsc::UnboundedSender<BrokerCommand>,
}

/// Run one client on its own task until it hangs up or breaks protocol.
pub fn spawn_connection(
    stream: UnixStream,
    conn_id: ConnectionId,
    cmd_tx: mpsc::UnboundedSender<BrokerCommand>,
    push_rx: PushRx,
    disconnect_tx: mpsc::UnboundedSender<DisconnectNotice>,
) {
    let session = Session {
        framed: Framed::new(stream, FrameCodec::new()),
        id: conn_id,
        broker: cmd_tx,
    };
    tokio::spawn(async move {
        if let Err(e) = session.run(push_rx).await {
            tracing::debug!(?conn_id, error = %e, "client session ended");
        }
        let _ = disconnect_tx.send(DisconnectNotice {
            connection_id: conn_id,
        });
    });
}

impl Session {
    async fn run(mut self, mut pushes: PushRx) -> Result<(), SessionError> {
        if !self.handshake().await? {
            return Ok(());
        }

        loop {
            let wake = tokio::select! {
                frame = self.framed.next() => Wake::Frame(frame),
                push = pushes.recv() => Wake::Push(push),
            };
            match wake {
                Wake::Frame(Some(frame)) => self.answer(&frame?).await?,
                Wake::Push(Some(push)) => self.framed.send(push).await?,
                // Client hung up, or the loop dropped this client.
                Wake::Frame(None) | Wake::Push(None) => return Ok(()),
            }
        }
    }

    /// Forward the client's hello and relay the ack. `false` means the
    /// broker refused it and the session is over.
    async fn handshake(&mut self) -> Result<bool, SessionError> {
        let frame = self.framed.next().await.ok_or(SessionError::NoHello)??;
        let hello = match decode_frame(&frame) {
            DecodeResult::Ok(msg @ Message::Hello { .. }) => msg,
            DecodeResult::Ok(_) | DecodeResult::UnknownType(_) => return Err(SessionError::NotHello),
            DecodeResult::Malformed(e) => return Err(e.into()),
        };

        let ack = self.ask(hello).await?;
        let accepted = !matches!(
            ack,
            Message::HelloAck {
                status: Status::Error,
                ..
            }
        );
        self.framed.send(ack).await?;
        Ok(accepted)
    }

    /// Reply to one request frame. Unknown message types get an
    /// `unknown_type` error and the session carries on.
    async fn answer(&mut self, frame: &[u8]) -> Result<(), SessionError> {
        let reply = match decode_frame(frame) {
            DecodeResult::Ok(request) => self.ask(request).await?,
            DecodeResult::UnknownType(envelope) => Response::error(envelope.id, "unknown_type").into(),
            DecodeResult::Malformed(e) => return Err(e.into()),
        };
        self.framed.send(reply).await?;
        Ok(())
    }

    async fn ask(&self, request: Message) -> Result<Message, SessionError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.broker
            .send(BrokerCommand {
                request,
                response_tx,
                connection_id: self.id,
            })
            .map_err(|_| SessionError::BrokerGone)?;
        response_rx.await.map_err(|_| SessionError::BrokerGone)
    }
}
