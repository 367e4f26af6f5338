//! Hub integration tests.
//!
//! Drives the hub with the tradeagent-ws client over real sockets:
//! - Echo replies
//! - Token and per-user limit rejections
//! - Personal and broadcast pushes

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_test::assert_ok;
use tradeagent_hub::{serve, ConnectionRegistry, HubConfig, HubState};
use tradeagent_ws::{
    CloseEvent, ConnectionConfig, ConnectionManager, ConnectionStatus, Handlers, Payload,
    TungsteniteConnector,
};

const WAIT: Duration = Duration::from_secs(5);

struct TestHub {
    url: String,
    registry: Arc<ConnectionRegistry>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestHub {
    async fn start(config: HubConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = HubState::new(config);
        let registry = state.registry().clone();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(serve(listener, state, async move {
            let _ = shutdown_rx.await;
        }));

        Self {
            url: format!("ws://{addr}"),
            registry,
            shutdown: Some(shutdown_tx),
        }
    }

    fn client(&self, user: &str, token: Option<&str>) -> ConnectionConfig {
        let user = user.to_string();
        let token = token.map(str::to_string);
        ConnectionConfig::new(format!("{}/ws/{{subject_id}}", self.url))
            .with_reconnect_limit(0)
            .with_subject_provider(move || Some(user.clone()))
            .with_token_provider(move || token.clone())
    }

    async fn wait_registered(&self, user: &str, count: usize) {
        let reached = timeout(WAIT, async {
            while self.registry.connection_count(user) != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(reached.is_ok(), "user {user} never reached {count} sockets");
    }
}

impl Drop for TestHub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

struct Client {
    manager: ConnectionManager,
    messages: mpsc::UnboundedReceiver<Payload>,
    closes: mpsc::UnboundedReceiver<CloseEvent>,
}

impl Client {
    fn connect(config: ConnectionConfig) -> Self {
        let (msg_tx, messages) = mpsc::unbounded_channel();
        let (close_tx, closes) = mpsc::unbounded_channel();
        let handlers = Handlers::new()
            .on_message(move |m| {
                let _ = msg_tx.send(m.payload.clone());
            })
            .on_close(move |c| {
                let _ = close_tx.send(c.clone());
            });
        let manager = ConnectionManager::new(config, TungsteniteConnector::new(), handlers);
        manager.connect();
        Self {
            manager,
            messages,
            closes,
        }
    }

    async fn wait_open(&self) {
        timeout(
            WAIT,
            self.manager
                .status_receiver()
                .wait_for(|s| *s == ConnectionStatus::Open),
        )
        .await
        .expect("timed out waiting for open")
        .expect("driver alive");
    }

    async fn next_text(&mut self) -> String {
        let payload = timeout(WAIT, self.messages.recv())
            .await
            .expect("timed out waiting for message")
            .expect("handler dropped");
        payload.as_text().expect("text frame").to_string()
    }

    async fn next_close(&mut self) -> CloseEvent {
        timeout(WAIT, self.closes.recv())
            .await
            .expect("timed out waiting for close")
            .expect("handler dropped")
    }
}

#[tokio::test]
async fn test_echo_reply() {
    let hub = TestHub::start(HubConfig::default()).await;
    let mut client = Client::connect(hub.client("7", None));
    client.wait_open().await;

    assert_ok!(client.manager.send_text("ping"));
    assert_eq!(client.next_text().await, "Message text was: ping, from user 7");

    client.manager.shutdown();
}

#[tokio::test]
async fn test_invalid_token_closes_with_policy_violation() {
    let hub = TestHub::start(HubConfig {
        access_token: "s3cret".to_string(),
        ..Default::default()
    })
    .await;

    let mut client = Client::connect(hub.client("7", Some("wrong")));
    let close = client.next_close().await;
    assert_eq!(close.code, 1008);
    assert_eq!(hub.registry.connection_count("7"), 0);
}

#[tokio::test]
async fn test_valid_token_is_accepted() {
    let hub = TestHub::start(HubConfig {
        access_token: "s3cret".to_string(),
        ..Default::default()
    })
    .await;

    let client = Client::connect(hub.client("7", Some("s3cret")));
    client.wait_open().await;
    hub.wait_registered("7", 1).await;

    client.manager.shutdown();
}

#[tokio::test]
async fn test_per_user_limit_closes_with_try_again() {
    let hub = TestHub::start(HubConfig {
        max_connections_per_user: 1,
        ..Default::default()
    })
    .await;

    let first = Client::connect(hub.client("7", None));
    first.wait_open().await;
    hub.wait_registered("7", 1).await;

    let mut second = Client::connect(hub.client("7", None));
    let close = second.next_close().await;
    assert_eq!(close.code, 1013);
    assert_eq!(hub.registry.connection_count("7"), 1);

    first.manager.shutdown();
}

#[tokio::test]
async fn test_personal_and_broadcast_delivery() {
    let hub = TestHub::start(HubConfig::default()).await;
    let mut alice = Client::connect(hub.client("alice", None));
    let mut bob = Client::connect(hub.client("bob", None));
    alice.wait_open().await;
    bob.wait_open().await;
    hub.wait_registered("alice", 1).await;
    hub.wait_registered("bob", 1).await;

    assert_eq!(hub.registry.send_personal("alice", "just you"), 1);
    assert_eq!(alice.next_text().await, "just you");

    assert_eq!(hub.registry.broadcast("everyone"), 2);
    assert_eq!(alice.next_text().await, "everyone");
    assert_eq!(bob.next_text().await, "everyone");
    assert!(bob.messages.try_recv().is_err());

    alice.manager.shutdown();
    bob.manager.shutdown();
}

#[tokio::test]
async fn test_disconnect_unregisters_socket() {
    let hub = TestHub::start(HubConfig::default()).await;
    let client = Client::connect(hub.client("7", None));
    client.wait_open().await;
    hub.wait_registered("7", 1).await;

    client.manager.disconnect();
    hub.wait_registered("7", 0).await;
    assert_eq!(hub.registry.user_count(), 0);
}
