//! HTTP/1.1 Upgrade handshake: nonce generation, server-side accept,
//! client-side connect, and subprotocol negotiation.
//!
//! This module never parses raw HTTP bytes itself — it takes an
//! already-parsed [`http::Request`]/[`http::Response`], exactly as an
//! upstream HTTP/1.1 parser (out of scope for this crate) would hand it
//! over, along with whatever bytes that parser read past the header block.

use std::time::Duration;

use base64::Engine;
use bytes::BytesMut;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::connection::{Connection, ConnectionConfig};
use crate::error::{HandshakeRejected, WsError};

const MAGIC_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Generate a fresh `Sec-WebSocket-Key` nonce: 16 cryptographically random
/// bytes, base64-encoded.
pub fn generate_key() -> String {
    let nonce: [u8; 16] = rand::random();
    base64::engine::general_purpose::STANDARD.encode(nonce)
}

fn accept_key_for(nonce: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce.as_bytes());
    hasher.update(MAGIC_GUID);
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

fn header_eq_ignore_case(value: Option<&http::HeaderValue>, expected: &str) -> bool {
    value
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().eq_ignore_ascii_case(expected))
        .unwrap_or(false)
}

fn parse_offered_subprotocols(value: &http::HeaderValue) -> Vec<String> {
    value
        .to_str()
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Outcome of [`ServerBuilder::accept`] / [`ClientBuilder::connect`]: either
/// a fully constructed, running [`Connection`], or — in detached mode — the
/// bare stream plus any bytes already buffered past the handshake, handed
/// back untouched for proxy pass-through.
pub enum Accepted<S> {
    /// A running connection, event loop already spawned.
    Connection(Connection),
    /// Detached mode: no connection was built, no listeners attached.
    Detached(S, BytesMut),
}

/// Configuration and entry point for the server side of the handshake.
#[derive(Debug, Clone, Default)]
pub struct ServerBuilder {
    supported_subprotocols: Vec<String>,
    detached: bool,
}

impl ServerBuilder {
    /// New server builder with no supported subprotocols.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one subprotocol to the supported set, in priority order.
    pub fn subprotocol(mut self, name: impl Into<String>) -> Self {
        self.supported_subprotocols.push(name.into());
        self
    }

    /// Replace the whole supported-subprotocol set.
    pub fn subprotocols(mut self, names: Vec<String>) -> Self {
        self.supported_subprotocols = names;
        self
    }

    /// Return the raw stream instead of building a [`Connection`] — for
    /// proxy pass-through.
    pub fn detached(mut self, detached: bool) -> Self {
        self.detached = detached;
        self
    }

    fn negotiate(&self, request: &http::Request<()>) -> Result<Option<String>, WsError> {
        match request.headers().get("sec-websocket-protocol") {
            None => Ok(None),
            Some(value) if self.supported_subprotocols.is_empty() => {
                let _ = value;
                Err(HandshakeRejected::UnexpectedSubprotocolRequest.into())
            }
            Some(value) => {
                let offered = parse_offered_subprotocols(value);
                offered
                    .into_iter()
                    .find(|p| self.supported_subprotocols.contains(p))
                    .map(Some)
                    .ok_or_else(|| HandshakeRejected::NoMatchingSubprotocol.into())
            }
        }
    }

    /// Validate the Upgrade request, write the HTTP 101 response onto
    /// `stream`, and either hand back a running [`Connection`] or, in
    /// detached mode, the raw stream.
    ///
    /// `residual` is any bytes the caller's HTTP parser already read past
    /// the end of the request headers; they are treated as the first bytes
    /// of frame traffic.
    pub async fn accept<S>(
        &self,
        request: &http::Request<()>,
        mut stream: S,
        residual: BytesMut,
    ) -> Result<Accepted<S>, WsError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        if !header_eq_ignore_case(request.headers().get("upgrade"), "websocket") {
            return Err(HandshakeRejected::MissingUpgrade.into());
        }
        let key = request
            .headers()
            .get("sec-websocket-key")
            .and_then(|v| v.to_str().ok())
            .ok_or(HandshakeRejected::MissingKey)?
            .to_string();
        if let Some(version) = request.headers().get("sec-websocket-version") {
            let version = version.to_str().unwrap_or_default();
            if version != "13" {
                return Err(HandshakeRejected::BadVersion(version.to_string()).into());
            }
        }
        let chosen = self.negotiate(request)?;

        let accept_key = accept_key_for(&key);
        let mut response = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {accept_key}\r\n"
        );
        if let Some(protocol) = &chosen {
            response.push_str(&format!("Sec-WebSocket-Protocol: {protocol}\r\n"));
        }
        response.push_str("\r\n");
        stream.write_all(response.as_bytes()).await?;

        if self.detached {
            return Ok(Accepted::Detached(stream, residual));
        }

        let conn = Connection::spawn(stream, ConnectionConfig::server(), chosen, residual);
        Ok(Accepted::Connection(conn))
    }
}

/// Configuration and entry point for the client side of the handshake.
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    protocols: Vec<String>,
    keepalive: bool,
    keepalive_interval: Duration,
    detached: bool,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            protocols: Vec::new(),
            keepalive: true,
            keepalive_interval: Duration::from_millis(5000),
            detached: false,
        }
    }
}

impl ClientBuilder {
    /// New client builder with the default keepalive policy (enabled, 5s).
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer one more subprotocol, in priority order.
    pub fn protocol(mut self, name: impl Into<String>) -> Self {
        self.protocols.push(name.into());
        self
    }

    /// Enable or disable outbound keepalive PINGs.
    pub fn keepalive(mut self, enabled: bool) -> Self {
        self.keepalive = enabled;
        self
    }

    /// Interval between outbound keepalive PINGs.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Return the raw stream instead of building a [`Connection`].
    pub fn detached(mut self, detached: bool) -> Self {
        self.detached = detached;
        self
    }

    /// Validate the server's Upgrade response against `original_key` (the
    /// nonce sent with the request) and either hand back a running
    /// [`Connection`] or, in detached mode, the raw stream.
    pub async fn connect<S>(
        &self,
        response: &http::Response<()>,
        stream: S,
        residual: BytesMut,
        original_key: &str,
    ) -> Result<Accepted<S>, WsError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        if response.status().as_u16() != 101 {
            return Err(HandshakeRejected::BadStatus(response.status().as_u16()).into());
        }
        if !header_eq_ignore_case(response.headers().get("connection"), "upgrade") {
            return Err(HandshakeRejected::MissingConnection.into());
        }
        if !header_eq_ignore_case(response.headers().get("upgrade"), "websocket") {
            return Err(HandshakeRejected::MissingUpgrade.into());
        }
        if let Some(version) = response.headers().get("sec-websocket-version") {
            let version = version.to_str().unwrap_or_default();
            if version != "13" {
                return Err(HandshakeRejected::BadVersion(version.to_string()).into());
            }
        }
        let expected = accept_key_for(original_key);
        let accepted = response
            .headers()
            .get("sec-websocket-accept")
            .and_then(|v| v.to_str().ok());
        if accepted != Some(expected.as_str()) {
            return Err(HandshakeRejected::BadAccept.into());
        }

        let negotiated = response
            .headers()
            .get("sec-websocket-protocol")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        if self.detached {
            return Ok(Accepted::Detached(stream, residual));
        }

        let mut config = ConnectionConfig::client();
        config.keepalive = self.keepalive;
        config.keepalive_interval = self.keepalive_interval;
        let conn = Connection::spawn(stream, config, negotiated, residual);
        Ok(Accepted::Connection(conn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_matches_rfc_test_vector() {
        assert_eq!(
            accept_key_for("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn generated_key_is_16_bytes_base64() {
        let key = generate_key();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&key)
            .expect("valid base64");
        assert_eq!(decoded.len(), 16);
    }

    fn req_with(headers: &[(&str, &str)]) -> http::Request<()> {
        let mut builder = http::Request::builder().method("GET").uri("/");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(()).unwrap()
    }

    #[tokio::test]
    async fn subprotocol_negotiation_picks_first_supported_offer() {
        let server = ServerBuilder::new().subprotocols(vec!["test1".into(), "test2".into()]);
        let req = req_with(&[
            ("upgrade", "websocket"),
            ("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ=="),
            ("sec-websocket-protocol", "foobar, test1, test2"),
        ]);
        let chosen = server.negotiate(&req).unwrap();
        assert_eq!(chosen, Some("test1".to_string()));
    }

    #[tokio::test]
    async fn subprotocol_negotiation_fails_with_no_match() {
        let server = ServerBuilder::new().subprotocols(vec!["test1".into(), "test2".into()]);
        let req = req_with(&[
            ("upgrade", "websocket"),
            ("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ=="),
            ("sec-websocket-protocol", "foobar, aaaa"),
        ]);
        let err = server.negotiate(&req).unwrap_err();
        assert!(matches!(
            err,
            WsError::HandshakeRejected(HandshakeRejected::NoMatchingSubprotocol)
        ));
    }

    #[tokio::test]
    async fn accept_rejects_request_missing_upgrade_header() {
        let server = ServerBuilder::new();
        let req = req_with(&[("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")]);
        let (client, _server_side) = tokio::io::duplex(4096);
        let err = server.accept(&req, client, BytesMut::new()).await.unwrap_err();
        assert!(matches!(
            err,
            WsError::HandshakeRejected(HandshakeRejected::MissingUpgrade)
        ));
    }

    #[tokio::test]
    async fn accept_rejects_unsupported_version() {
        let server = ServerBuilder::new();
        let req = req_with(&[
            ("upgrade", "websocket"),
            ("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ=="),
            ("sec-websocket-version", "8"),
        ]);
        let (client, _server_side) = tokio::io::duplex(4096);
        let err = server.accept(&req, client, BytesMut::new()).await.unwrap_err();
        assert!(matches!(
            err,
            WsError::HandshakeRejected(HandshakeRejected::BadVersion(_))
        ));
    }
}
