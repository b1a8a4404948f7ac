//! Per-connection actor.
//!
//! Each accepted socket gets one of these: a reader loop that turns lines
//! into handler events, a writer task draining the bounded outbound queue,
//! and a liveness ticker that asks the handler to ping the client. All
//! three stop when the reader exits, after which exactly one Close event is
//! pushed for this connection.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

use crate::atoms::Atoms;
use crate::handler::Event;
use crate::message::Message;
use crate::state::ClientId;

/// Capacity of the per-connection outbound queue. A stalled client can
/// buffer at most this many messages before fan-out to it suspends.
pub const OUTBOUND_QUEUE_LEN: usize = 400;

/// How often the ticker asks the handler to ping this client.
pub const HEALTHCHECK_INTERVAL: Duration = Duration::from_secs(30);

fn next_id() -> ClientId {
    static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    ClientId(COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
}

/// Handle a plain TCP connection until it closes.
pub async fn handle(stream: TcpStream, mailbox: mpsc::UnboundedSender<Event>) -> Result<()> {
    let host = stream
        .peer_addr()
        .map(|a| a.ip().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let (reader, writer) = tokio::io::split(stream);
    handle_io(BufReader::new(reader), writer, host, mailbox).await
}

async fn handle_io<R, W>(
    mut reader: BufReader<R>,
    mut writer: W,
    host: String,
    mailbox: mpsc::UnboundedSender<Event>,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let id = next_id();
    tracing::info!(client = %id, %host, "new connection");

    let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE_LEN);
    // If the handler is already gone the server is shutting down.
    if mailbox.send(Event::Attach { id, host, outbound: tx }).is_err() {
        return Ok(());
    }

    let write_handle = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let line = message.encode();
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                tracing::warn!(client = %id, "write error: {e}");
                break;
            }
            if writer.flush().await.is_err() {
                break;
            }
        }
    });

    let tick_mailbox = mailbox.clone();
    let tick_handle = tokio::spawn(async move {
        let mut ticker = interval(HEALTHCHECK_INTERVAL);
        // The immediate first tick would ping clients mid-handshake.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if tick_mailbox.send(Event::Healthcheck { id }).is_err() {
                break;
            }
        }
    });

    let mut line_buf = String::new();
    loop {
        line_buf.clear();
        // The read blocks as long as the client stays quiet; liveness is the
        // ticker's job, and a slow line must keep its partial bytes.
        match reader.read_line(&mut line_buf).await {
            Err(_) | Ok(0) => break,
            Ok(_) => {}
        }
        tracing::debug!(client = %id, "<- {}", line_buf.trim_end());

        let atoms = match Atoms::decode(&line_buf) {
            Ok(atoms) => atoms,
            Err(e) => {
                // Policy: a malformed line is dropped, the connection lives.
                tracing::warn!(client = %id, "dropping malformed line: {e}");
                continue;
            }
        };
        let message = Message::from_atoms(atoms);
        let quitting = matches!(message, Message::Quit { .. });
        if mailbox.send(Event::Message { id, message }).is_err() {
            break;
        }
        if quitting {
            break;
        }
    }

    write_handle.abort();
    tick_handle.abort();
    // Exactly one Close per connection lifetime; the handler treats a
    // close for an unknown id as a no-op anyway.
    let _ = mailbox.send(Event::Close { id });
    tracing::debug!(client = %id, "connection actor finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Wires `handle_io` to an in-memory duplex and returns the client end
    /// plus the event stream a handler would see.
    fn spawn_actor() -> (tokio::io::DuplexStream, mpsc::UnboundedReceiver<Event>) {
        let (client_side, server_side) = tokio::io::duplex(1024);
        let (mailbox, events) = mpsc::unbounded_channel();
        let (reader, writer) = tokio::io::split(server_side);
        tokio::spawn(handle_io(BufReader::new(reader), writer, "testhost".to_string(), mailbox));
        (client_side, events)
    }

    /// Skip ticker noise and yield the next message event.
    async fn next_message(events: &mut mpsc::UnboundedReceiver<Event>) -> Message {
        loop {
            match events.recv().await.expect("actor hung up") {
                Event::Message { message, .. } => return message,
                Event::Healthcheck { .. } | Event::Attach { .. } => continue,
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_line_survives_a_long_pause_mid_write() {
        let (mut client, mut events) = spawn_actor();

        client.write_all(b"NICK ki").await.unwrap();
        // A client may take arbitrarily long to finish a line; the bytes
        // already received must not be thrown away while it dawdles.
        tokio::time::sleep(Duration::from_secs(120)).await;
        client.write_all(b"rk\r\nUSER user host server :realname\r\n").await.unwrap();

        assert_eq!(
            next_message(&mut events).await,
            Message::Nick { prefix: String::new(), nick: "kirk".into() }
        );
        assert!(matches!(next_message(&mut events).await, Message::User { .. }));
    }

    #[tokio::test]
    async fn eof_sends_exactly_one_close() {
        let (client, mut events) = spawn_actor();
        drop(client);

        let mut closes = 0;
        while let Some(event) = events.recv().await {
            if matches!(event, Event::Close { .. }) {
                closes += 1;
            }
        }
        assert_eq!(closes, 1);
    }
}
