//! Minimal echo client: connects to `echo_server`, sends a few TEXT/BINARY
//! messages, prints what comes back, then closes gracefully.
//!
//! Like `echo_server`, this demo hand-rolls the tiny bit of HTTP/1.1 needed
//! to read the Upgrade response line, since HTTP parsing itself is out of
//! scope for `ws-core`.

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use ws_core::{generate_key, Accepted, ClientBuilder, Event};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut socket = TcpStream::connect("127.0.0.1:9001").await?;
    let key = generate_key();
    let request = format!(
        "GET / HTTP/1.1\r\n\
         Host: 127.0.0.1:9001\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    );
    socket.write_all(request.as_bytes()).await?;

    let (socket, response, residual) = read_response(socket).await?;

    let client = ClientBuilder::new();
    let mut conn = match client.connect(&response, socket, residual, &key).await? {
        Accepted::Connection(conn) => conn,
        Accepted::Detached(..) => unreachable!("this demo never requests detached mode"),
    };

    conn.send("hello")?;
    conn.send(vec![0x01u8, 0x02, 0x03])?;
    conn.end(Some("done".to_string()))?;

    loop {
        match conn.recv().await {
            Some(Event::Text(text)) => tracing::info!(%text, "received text"),
            Some(Event::Binary(bytes)) => tracing::info!(len = bytes.len(), "received binary"),
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

async fn read_response(
    mut socket: TcpStream,
) -> anyhow::Result<(TcpStream, http::Response<()>, BytesMut)> {
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        let mut chunk = [0u8; 512];
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            anyhow::bail!("peer closed before sending a full response");
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4) {
            let header_bytes = buf.split_to(end);
            let response = parse_response(&header_bytes)?;
            return Ok((socket, response, buf));
        }
    }
}

fn parse_response(bytes: &[u8]) -> anyhow::Result<http::Response<()>> {
    let text = std::str::from_utf8(bytes)?;
    let mut lines = text.split("\r\n");
    let status_line = lines.next().unwrap_or_default();
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("0")
        .parse()?;
    let mut builder = http::Response::builder().status(status);
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
