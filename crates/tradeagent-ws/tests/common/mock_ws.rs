//! Mock WebSocket server for integration tests.
//!
//! Provides a simple WebSocket server that can:
//! - Record request paths (including the token query)
//! - Echo text frames back as `echo:<text>`
//! - Close with code 4000 on `close`, or drop the socket on `drop`

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};

/// A mock WebSocket server for testing.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    paths: Arc<Mutex<Vec<String>>>,
    messages: Arc<Mutex<Vec<String>>>,
    client_closes: Arc<Mutex<u32>>,
}

impl MockWsServer {
    /// Start a new mock WebSocket server on an available port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let paths: Arc<Mutex<Vec<String>>> = Arc::default();
        let messages: Arc<Mutex<Vec<String>>> = Arc::default();
        let client_closes: Arc<Mutex<u32>> = Arc::default();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let (paths_clone, messages_clone, closes_clone) =
            (paths.clone(), messages.clone(), client_closes.clone());

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(
                            stream,
                            paths_clone.clone(),
                            messages_clone.clone(),
                            closes_clone.clone(),
                        ));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            paths,
            messages,
            client_closes,
        }
    }

    /// Get the server's WebSocket base URL.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Request paths of all accepted connections.
    pub async fn paths(&self) -> Vec<String> {
        self.paths.lock().await.clone()
    }

    /// Number of accepted connections.
    pub async fn connection_count(&self) -> usize {
        self.paths.lock().await.len()
    }

    /// Get all received text messages.
    pub async fn received_messages(&self) -> Vec<String> {
        self.messages.lock().await.clone()
    }

    /// Number of close frames received from clients.
    pub async fn client_closes(&self) -> u32 {
        *self.client_closes.lock().await
    }

    /// Shutdown the server.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    paths: Arc<Mutex<Vec<String>>>,
    messages: Arc<Mutex<Vec<String>>>,
    client_closes: Arc<Mutex<u32>>,
) {
    let (path_tx, path_rx) = std::sync::mpsc::channel();
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let _ = path_tx.send(req.uri().to_string());
        Ok(resp)
    };

    let ws_stream = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    if let Ok(path) = path_rx.try_recv() {
        paths.lock().await.push(path);
    }

    let (mut write, mut read) = ws_stream.split();

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                messages.lock().await.push(text.clone());
                match text.as_str() {
                    "close" => {
                        let frame = CloseFrame {
                            code: CloseCode::from(4000),
                            reason: "bye".into(),
                        };
                        let _ = write.send(Message::Close(Some(frame))).await;
                        // drain until the client acknowledges
                        while let Some(Ok(_)) = read.next().await {}
                        return;
                    }
                    "drop" => return,
                    _ => {
                        let _ = write.send(Message::Text(format!("echo:{text}"))).await;
                    }
                }
            }
            Ok(Message::Ping(data)) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => {
                *client_closes.lock().await += 1;
                break;
            }
            Err(_) => break,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockWsServer::start().await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        server.shutdown().await;
    }
}
