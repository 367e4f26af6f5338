//! Application orchestration.
//!
//! Two modes share one config:
//! - `connect`: run a connection manager, log inbound frames, forward input
//!   lines as text frames
//! - `serve`: run the hub, turn input lines into personal or broadcast pushes

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use tradeagent_hub::{serve, ConnectionRegistry, HubError, HubState};
use tradeagent_ws::{ConnectionManager, ConnectionStatus, Handlers, TungsteniteConnector};

use crate::config::AppConfig;
use crate::error::AppResult;

/// How long to wait for the close handshake when leaving.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// A line typed into the hub console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubCommand<'a> {
    /// `@user message`
    Personal { user_id: &'a str, message: &'a str },
    /// Anything else.
    Broadcast(&'a str),
}

impl<'a> HubCommand<'a> {
    /// Parse a console line. Blank lines yield `None`.
    pub fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if let Some(rest) = line.strip_prefix('@') {
            if let Some((user_id, message)) = rest.split_once(char::is_whitespace) {
                let message = message.trim_start();
                if !user_id.is_empty() && !message.is_empty() {
                    return Some(Self::Personal { user_id, message });
                }
            }
        }
        Some(Self::Broadcast(line))
    }

    /// Deliver to `registry`. Returns sockets reached.
    pub fn dispatch(&self, registry: &ConnectionRegistry) -> usize {
        match self {
            Self::Personal { user_id, message } => registry.send_personal(user_id, message),
            Self::Broadcast(message) => registry.broadcast(message),
        }
    }
}

/// Main application.
pub struct Application {
    config: AppConfig,
}

impl Application {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run the client on stdin until Ctrl-C or EOF.
    pub async fn run_client(&self) -> AppResult<()> {
        let input = BufReader::new(tokio::io::stdin());
        self.client_loop(input, shutdown_signal()).await
    }

    /// Run the client, forwarding `input` lines until EOF or `shutdown`.
    pub async fn client_loop<R, F>(&self, input: R, shutdown: F) -> AppResult<()>
    where
        R: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        let (exhausted_tx, mut exhausted_rx) = mpsc::unbounded_channel();
        let handlers = Handlers::new()
            .on_open(|event| info!(endpoint = %event.endpoint, "Connected"))
            .on_message(|event| match event.payload.as_text() {
                Some(text) => info!(message = %text, "Received"),
                None => info!(bytes = event.payload.len(), "Received binary frame"),
            })
            .on_error(|event| warn!(error = %event.message, "Connection error"))
            .on_close(|event| {
                info!(
                    code = event.code,
                    reason = %event.reason,
                    clean = event.was_clean,
                    "Connection closed"
                )
            })
            .on_reconnect_exhausted(move |attempts| {
                let _ = exhausted_tx.send(*attempts);
            });

        let manager = ConnectionManager::new(
            self.config.client.to_connection_config(),
            TungsteniteConnector::new(),
            handlers,
        );
        manager.connect();

        let mut lines = input.lines();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }

                Some(attempts) = exhausted_rx.recv() => {
                    error!(attempts, "Reconnect limit reached, exiting");
                    break;
                }

                line = lines.next_line() => match line? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => {
                        if let Err(e) = manager.send_text(line) {
                            debug!(error = %e, "Input line not sent");
                        }
                    }
                    None => {
                        info!("Input closed");
                        break;
                    }
                },
            }
        }

        manager.disconnect();
        let mut status_rx = manager.status_receiver();
        let closed = tokio::time::timeout(
            CLOSE_GRACE,
            status_rx.wait_for(|s| *s == ConnectionStatus::Closed),
        )
        .await;
        if closed.is_err() {
            warn!("Timed out waiting for connection to close");
        }
        manager.shutdown();
        Ok(())
    }

    /// Run the hub on `config.hub.bind_addr` with stdin as console.
    pub async fn run_hub(&self) -> AppResult<()> {
        let addr = self.config.hub.bind_addr.as_str();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| HubError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let input = BufReader::new(tokio::io::stdin());
        self.hub_loop(listener, input, shutdown_signal()).await
    }

    /// Serve the hub on `listener`, dispatching console lines from `input`
    /// until `shutdown` resolves. EOF on `input` keeps the hub running.
    pub async fn hub_loop<R, F>(&self, listener: TcpListener, input: R, shutdown: F) -> AppResult<()>
    where
        R: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        let state = HubState::new(self.config.hub.clone());
        let registry = state.registry().clone();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        info!(addr = ?listener.local_addr().ok(), auth = self.config.hub.auth_enabled(), "Hub listening");
        let mut server = tokio::spawn(serve(listener, state, async move {
            let _ = stop_rx.await;
        }));

        let mut lines = input.lines();
        let mut input_open = true;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }

                result = &mut server => {
                    return match result {
                        Ok(result) => result.map_err(Into::into),
                        Err(e) => {
                            error!(error = %e, "Hub server task failed");
                            Ok(())
                        }
                    };
                }

                line = lines.next_line(), if input_open => match line? {
                    Some(line) => {
                        if let Some(command) = HubCommand::parse(&line) {
                            let reached = command.dispatch(&registry);
                            info!(?command, reached, "Pushed message");
                        }
                    }
                    None => {
                        debug!("Console input closed");
                        input_open = false;
                    }
                },
            }
        }

        let _ = stop_tx.send(());
        match server.await {
            Ok(result) => result?,
            Err(e) => error!(error = %e, "Hub server task failed"),
        }
        info!("Hub stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
