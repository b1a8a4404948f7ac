//! TCP listener and task wiring.
//!
//! The server owns the boundary between accepted sockets and the core:
//! it spawns the single handler task, then hands every accepted stream to
//! a connection actor along with a clone of the handler's mailbox.

use std::net::SocketAddr;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::connection;
use crate::handler::{Event, Handler};
use crate::state::State;

pub struct Server {
    config: ServerConfig,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Run the server, blocking forever.
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        tracing::info!("listening on {}", self.config.listen_addr);
        Self::accept_loop(listener, self.config.server_name).await
    }

    /// Bind and return the local address plus the serving task (for tests).
    pub async fn start(self) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        let addr = listener.local_addr()?;
        tracing::info!("listening on {addr}");
        let handle = tokio::spawn(Self::accept_loop(listener, self.config.server_name));
        Ok((addr, handle))
    }

    async fn accept_loop(listener: TcpListener, server_name: String) -> Result<()> {
        let (mailbox, events) = mpsc::unbounded_channel::<Event>();
        let handler = Handler::new(server_name, State::new());
        tokio::spawn(handler.run(events));

        loop {
            let (stream, addr) = listener.accept().await?;
            tracing::debug!(%addr, "accepted connection");
            let mailbox = mailbox.clone();
            tokio::spawn(async move {
                if let Err(e) = connection::handle(stream, mailbox).await {
                    tracing::error!("connection error: {e}");
                }
            });
        }
    }
}
