//! Minimal echo server: accepts one connection on a raw TCP socket, performs
//! the handshake against a hand-rolled Upgrade request line, then echoes
//! every TEXT/BINARY message back until the peer closes.
//!
//! This demo owns its own tiny HTTP/1.1 request-line reader since parsing
//! Upgrade requests is out of scope for `ws-core` itself.

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use ws_core::{Accepted, Event, ServerBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let listener = TcpListener::bind("127.0.0.1:9001").await?;
    tracing::info!(addr = %listener.local_addr()?, "echo server listening");

    let (socket, peer) = listener.accept().await?;
    tracing::info!(%peer, "accepted connection");

    let (socket, request, residual) = read_request(socket).await?;

    let server = ServerBuilder::new();
    let mut conn = match server.accept(&request, socket, residual).await? {
        Accepted::Connection(conn) => conn,
        Accepted::Detached(..) => unreachable!("this demo never requests detached mode"),
    };

    loop {
        match conn.recv().await {
            Some(Event::Text(text)) => {
                tracing::info!(%text, "echoing text");
                conn.send(text)?;
            }
            Some(Event::Binary(bytes)) => {
                tracing::info!(len = bytes.len(), "echoing binary");
                conn.send(bytes)?;
            }
            Some(Event::Ping(_) | Event::Pong(_)) => {}
            Some(Event::ConnectionReset) => tracing::warn!("peer vanished without a close"),
            Some(Event::Error(err)) => tracing::error!(%err, "connection error"),
            Some(Event::End { code, reason }) => {
                tracing::info!(?code, ?reason, "connection ended");
                break;
            }
            None => break,
        }
    }
    Ok(())
}

/// Reads one HTTP/1.1 request line + headers off `socket`, splitting the
/// header block from anything already buffered past it. Good enough for a
/// demo; a real server would reuse its existing HTTP stack.
async fn read_request(
    mut socket: tokio::net::TcpStream,
) -> anyhow::Result<(tokio::net::TcpStream, http::Request<()>, BytesMut)> {
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        let mut chunk = [0u8; 512];
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            anyhow::bail!("peer closed before sending a full request");
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = find_header_end(&buf) {
            let header_bytes = buf.split_to(end);
            let request = parse_request(&header_bytes)?;
            return Ok((socket, request, buf));
        }
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

fn parse_request(bytes: &[u8]) -> anyhow::Result<http::Request<()>> {
    let text = std::str::from_utf8(bytes)?;
    let mut lines = text.split("\r\n");
    lines.next(); // request line, unused by this demo
    let mut builder = http::Request::builder().method("GET").uri("/");
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            builder = builder.header(name.trim(), value.trim());
        }
    }
    Ok(builder.body(())?)
}
