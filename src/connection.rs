//! The connection state machine: owns the stream, drives reads, dispatches
//! decoded frames as [`Event`]s, and manages keepalive PINGs.
//!
//! Runs as a single `tokio::task` per connection — "single-threaded
//! cooperative" per `spec.md` §5 — communicating with the [`Connection`]
//! handle over two unbounded `mpsc` channels.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use crate::close::CloseCode;
use crate::codec::{FrameCodec, Outgoing, WireFrame};
use crate::error::WsError;
use crate::frame::{DecodedFrame, OpCode};

/// Role-specific wiring: which side must mask inbound frames, which side
/// masks outbound frames, and the keepalive policy.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    pub(crate) remote_must_mask: bool,
    pub(crate) local_should_mask: bool,
    pub(crate) keepalive: bool,
    pub(crate) keepalive_interval: Duration,
}

impl ConnectionConfig {
    /// Server role: peer (client) frames must be masked, our frames must not be.
    pub fn server() -> Self {
        Self {
            remote_must_mask: true,
            local_should_mask: false,
            keepalive: false,
            keepalive_interval: Duration::from_millis(5000),
        }
    }

    /// Client role: our frames must be masked, peer (server) frames must not be.
    /// Keepalive PINGs are on by default, every 5 seconds.
    pub fn client() -> Self {
        Self {
            remote_must_mask: false,
            local_should_mask: true,
            keepalive: true,
            keepalive_interval: Duration::from_millis(5000),
        }
    }
}

/// Everything an application can observe about a connection.
///
/// Exactly the set in `spec.md` §6: at most one [`Event::ConnectionReset`],
/// zero or more `Text`/`Binary`/`Ping`/`Pong`/`Error`, and exactly one
/// terminal [`Event::End`].
#[derive(Debug)]
pub enum Event {
    /// A TEXT frame, already UTF-8 decoded.
    Text(String),
    /// A BINARY frame.
    Binary(Bytes),
    /// A PING frame; a PONG carrying the same payload has already been
    /// queued for send by the time this is observed.
    Ping(Bytes),
    /// A PONG frame.
    Pong(Bytes),
    /// The peer vanished without sending a CLOSE frame. Always precedes `End`.
    ConnectionReset,
    /// A non-EOF fault. Always precedes `End`.
    Error(WsError),
    /// Terminal event; fires exactly once and is always the last event.
    End {
        code: Option<CloseCode>,
        reason: Option<String>,
    },
}

enum Command {
    Send(Outgoing),
    End(Option<String>),
    Destroy,
}

/// A live WebSocket connection.
///
/// Construction (`ServerBuilder::accept` / `ClientBuilder::connect`) spawns
/// a task owning the stream; this handle only holds the two channels that
/// talk to it, plus the immutable negotiated subprotocol.
pub struct Connection {
    protocol: Option<String>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    event_rx: mpsc::UnboundedReceiver<Event>,
}

impl Connection {
    pub(crate) fn spawn<S>(
        stream: S,
        config: ConnectionConfig,
        protocol: Option<String>,
        residual: BytesMut,
    ) -> Connection
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let codec = FrameCodec::new(config.remote_must_mask, config.local_should_mask);
        let mut framed = Framed::new(stream, codec);
        // Residual bytes the caller's HTTP parser already read past the
        // handshake are the first bytes of frame traffic.
        framed.read_buffer_mut().extend_from_slice(&residual);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        // Spawning here (rather than before the handle is fully built) is
        // this crate's answer to the deferred-read-pump concern in
        // `spec.md` §9: the task cannot observe anything until the caller
        // already holds a `Connection` with its event channel in hand.
        tokio::spawn(run(framed, config, cmd_rx, event_tx));

        Connection {
            protocol,
            cmd_tx,
            event_rx,
        }
    }

    /// The negotiated subprotocol, if any.
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    /// Queue a TEXT or BINARY message for send.
    pub fn send(&self, msg: impl Into<Outgoing>) -> Result<(), WsError> {
        self.cmd_tx
            .send(Command::Send(msg.into()))
            .map_err(|_| WsError::ApplicationError("connection already terminated".into()))
    }

    /// Begin a graceful close: send a CLOSE frame with code NORMAL and an
    /// optional reason. At-most-once; later calls are no-ops once the first
    /// has been accepted.
    pub fn end(&self, reason: Option<String>) -> Result<(), WsError> {
        if let Some(r) = &reason {
            if r.len() > 123 {
                return Err(WsError::ApplicationError(
                    "close reason does not fit in a control frame".into(),
                ));
            }
        }
        // The task treats repeat `Command::End`s as no-ops (close_written
        // latch), so an Err here only ever means the task is already gone.
        self.cmd_tx
            .send(Command::End(reason))
            .map_err(|_| WsError::ApplicationError("connection already terminated".into()))
    }

    /// Unclean teardown: detach from the stream and force it closed without
    /// sending a CLOSE frame. Idempotent.
    pub fn destroy(&self) {
        let _ = self.cmd_tx.send(Command::Destroy);
    }

    /// Await the next event. Returns `None` once the task has fully shut
    /// down and there is nothing left to observe.
    pub async fn recv(&mut self) -> Option<Event> {
        self.event_rx.recv().await
    }
}

impl From<String> for Outgoing {
    fn from(s: String) -> Self {
        Outgoing::Text(s)
    }
}

impl From<&str> for Outgoing {
    fn from(s: &str) -> Self {
        Outgoing::Text(s.to_string())
    }
}

impl From<Bytes> for Outgoing {
    fn from(b: Bytes) -> Self {
        Outgoing::Binary(b)
    }
}

impl From<Vec<u8>> for Outgoing {
    fn from(b: Vec<u8>) -> Self {
        Outgoing::Binary(Bytes::from(b))
    }
}

#[derive(Default)]
struct State {
    close_written: bool,
    close_received: bool,
    end_emitted: bool,
    frames_received: u64,
    frames_sent: u64,
}

async fn tick_keepalive(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(iv) => {
            iv.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn recv_cmd(
    rx: &mut mpsc::UnboundedReceiver<Command>,
    closed: &mut bool,
) -> Option<Command> {
    if *closed {
        return std::future::pending().await;
    }
    let cmd = rx.recv().await;
    if cmd.is_none() {
        *closed = true;
    }
    cmd
}

async fn run<S>(
    mut framed: Framed<S, FrameCodec>,
    config: ConnectionConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<Event>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut state = State::default();
    let mut keepalive = config.keepalive.then(|| {
        let mut iv = tokio::time::interval(config.keepalive_interval);
        iv.reset(); // skip the immediate first tick
        iv
    });
    let mut cmd_closed = false;

    while !state.end_emitted {
        tokio::select! {
            frame = framed.next() => {
                match frame {
                    Some(Ok(decoded)) => {
                        state.frames_received += 1;
                        handle_frame(&mut framed, &mut state, &events, decoded).await;
                    }
                    Some(Err(err)) => {
                        handle_fault(&mut framed, &mut state, &events, err).await;
                    }
                    None => {
                        handle_eof(&mut state, &events).await;
                    }
                }
            }
            cmd = recv_cmd(&mut cmd_rx, &mut cmd_closed) => {
                match cmd {
                    Some(Command::Send(msg)) => {
                        if framed.send(WireFrame::from(msg)).await.is_ok() {
                            state.frames_sent += 1;
                        }
                    }
                    Some(Command::End(reason)) => {
                        send_close(&mut framed, &mut state, reason).await;
                    }
                    Some(Command::Destroy) => {
                        tracing::debug!("connection destroyed without a CLOSE frame");
                        emit_end(&mut state, &events, None, None);
                    }
                    None => {}
                }
            }
            _ = tick_keepalive(&mut keepalive) => {
                tracing::trace!("sending keepalive PING");
                if framed.send(WireFrame::Ping(Bytes::new())).await.is_ok() {
                    state.frames_sent += 1;
                }
            }
        }
    }

    tracing::debug!(
        sent = state.frames_sent,
        received = state.frames_received,
        "connection task exiting"
    );
}

async fn handle_frame<S>(
    framed: &mut Framed<S, FrameCodec>,
    state: &mut State,
    events: &mpsc::UnboundedSender<Event>,
    frame: DecodedFrame,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if !frame.fin {
        // Continuation reassembly is out of scope; treat as unsupported and
        // close gracefully rather than reassembling.
        tracing::debug!("FIN=false frame received, initiating graceful close");
        send_close(framed, state, None).await;
        return;
    }

    match frame.opcode {
        OpCode::Continuation => {
            send_close(framed, state, None).await;
        }
        OpCode::Text => match String::from_utf8(frame.payload.to_vec()) {
            Ok(text) => {
                let _ = events.send(Event::Text(text));
            }
            Err(_) => {
                let _ = events.send(Event::Error(WsError::ProtocolViolation(
                    "invalid UTF-8 in text frame".into(),
                )));
                send_close(framed, state, None).await;
            }
        },
        OpCode::Binary => {
            let _ = events.send(Event::Binary(frame.payload));
        }
        OpCode::Ping => {
            let _ = events.send(Event::Ping(frame.payload.clone()));
            if framed.send(WireFrame::Pong(frame.payload)).await.is_ok() {
                state.frames_sent += 1;
            }
        }
        OpCode::Pong => {
            let _ = events.send(Event::Pong(frame.payload));
        }
        OpCode::Close => {
            state.close_received = true;
            let (code, reason) = parse_close_payload(&frame.payload);
            send_close(framed, state, reason.clone()).await;
            let _ = framed.close().await;
            emit_end(state, events, code, reason);
        }
    }
}

fn parse_close_payload(payload: &Bytes) -> (Option<CloseCode>, Option<String>) {
    if payload.len() < 2 {
        return (None, None);
    }
    let code = CloseCode::from(u16::from_be_bytes([payload[0], payload[1]]));
    let reason = String::from_utf8(payload[2..].to_vec()).ok();
    (Some(code), reason)
}

async fn send_close<S>(framed: &mut Framed<S, FrameCodec>, state: &mut State, reason: Option<String>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if state.close_written {
        return;
    }
    state.close_written = true;
    let frame = WireFrame::Close {
        code: CloseCode::Normal.as_u16(),
        reason: reason.unwrap_or_default(),
    };
    if framed.send(frame).await.is_ok() {
        state.frames_sent += 1;
    }
}

async fn handle_eof(state: &mut State, events: &mpsc::UnboundedSender<Event>) {
    if !state.close_received {
        let _ = events.send(Event::ConnectionReset);
    }
    emit_end(state, events, None, None);
}

async fn handle_fault<S>(
    framed: &mut Framed<S, FrameCodec>,
    state: &mut State,
    events: &mpsc::UnboundedSender<Event>,
    err: WsError,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if is_peer_vanished(&err) {
        if !state.close_received {
            let _ = events.send(Event::ConnectionReset);
        }
        emit_end(state, events, None, None);
        return;
    }
    let _ = events.send(Event::Error(err));
    send_close(framed, state, None).await;
    emit_end(state, events, None, None);
}

fn is_peer_vanished(err: &WsError) -> bool {
    match err {
        WsError::Transport(io_err) => matches!(
            io_err.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::WriteZero
                | std::io::ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}

fn emit_end(
    state: &mut State,
    events: &mpsc::UnboundedSender<Event>,
    code: Option<CloseCode>,
    reason: Option<String>,
) {
    if state.end_emitted {
        return;
    }
    state.end_emitted = true;
    let _ = events.send(Event::End { code, reason });
}
