use thiserror::Error;

/// Top level error surfaced to callers of this crate.
///
/// Handshake rejections and `send`/`end` argument errors are returned
/// synchronously; everything else drives a connection into its terminal
/// state and is reported through [`crate::Event::Error`].
#[derive(Debug, Error)]
pub enum WsError {
    /// The handshake was rejected for one of the reasons in [`HandshakeRejected`].
    #[error("handshake rejected: {0}")]
    HandshakeRejected(#[from] HandshakeRejected),

    /// A frame violated the wire protocol (bad mask policy, impossible
    /// length encoding, oversized payload).
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The first two bytes of the stream spelled `HT`, suggesting an
    /// upstream HTTP parser leaked residual header bytes into the frame
    /// stream instead of the handshake.
    #[error("stream misdirection: residual bytes look like an HTTP request")]
    StreamMisdirection,

    /// Any other transport-level fault (not classified as a peer-vanished
    /// reset).
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// An argument passed to a public method was invalid, e.g. a close
    /// reason that does not fit in a control frame.
    #[error("invalid argument: {0}")]
    ApplicationError(String),
}

/// Sub-kinds of handshake rejection, one per validation rule in the
/// handshake module.
#[derive(Debug, Error)]
pub enum HandshakeRejected {
    /// `Upgrade` header missing or not equal to `websocket`.
    #[error("missing or invalid Upgrade header")]
    MissingUpgrade,

    /// `Sec-WebSocket-Key` header absent from the request.
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,

    /// `Sec-WebSocket-Version` present but not `13`.
    #[error("unsupported Sec-WebSocket-Version: {0}")]
    BadVersion(String),

    /// Client offered subprotocols but none of them are supported.
    #[error("no matching subprotocol among client offers")]
    NoMatchingSubprotocol,

    /// Client requested subprotocol negotiation but the server has no
    /// supported list configured.
    #[error("client requested a subprotocol but server supports none")]
    UnexpectedSubprotocolRequest,

    /// Response status was not 101.
    #[error("expected HTTP 101, got {0}")]
    BadStatus(u16),

    /// `Connection` header missing or not equal to `upgrade`.
    #[error("missing or invalid Connection header")]
    MissingConnection,

    /// `Sec-WebSocket-Accept` missing or does not match the expected value.
    #[error("missing or mismatched Sec-WebSocket-Accept header")]
    BadAccept,
}
