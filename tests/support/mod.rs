// Shared bootstrap and websocket helpers for the integration tests.
//
// The server starts once per test binary on a dedicated OS thread so it
// outlives the per-test Tokio runtimes; tests isolate themselves through
// unique room and player ids rather than separate server instances.

use futures_util::{SinkExt, StreamExt};
use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

static SERVER_URL: OnceLock<String> = OnceLock::new();
static SERVER_READY: OnceLock<()> = OnceLock::new();

/// Starts the server once for this test binary and returns its base URL.
pub fn ensure_server() -> &'static str {
    SERVER_READY.get_or_init(|| {
        let published_url = Arc::new(OnceLock::<String>::new());
        let published_url_thread = Arc::clone(&published_url);
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("test runtime");
            runtime.block_on(async move {
                // An ephemeral port avoids collisions with local services.
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind ephemeral test port");
                let addr = listener.local_addr().expect("get local addr");
                let _ = published_url_thread.set(format!("http://{addr}"));
                zone_server::run(listener).await.expect("server failed");
            });
        });
        wait_until_accepting(published_url);
    });

    SERVER_URL
        .get()
        .expect("server url should be initialized")
        .as_str()
}

fn wait_until_accepting(published_url: Arc<OnceLock<String>>) {
    let base_url = loop {
        if let Some(url) = published_url.get() {
            break url.clone();
        }
        std::thread::sleep(Duration::from_millis(10));
    };

    let _ = SERVER_URL.set(base_url.clone());

    let addr = base_url
        .strip_prefix("http://")
        .expect("base url should use http://");

    // The bind is published before accept starts; probe until it answers.
    for _ in 0..100 {
        if std::net::TcpStream::connect(addr).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    panic!("server did not become ready in time");
}

fn ws_url() -> String {
    let base = ensure_server();
    format!("{}/ws", base.replacen("http://", "ws://", 1))
}

pub async fn connect_client() -> WsClient {
    let (socket, _response) = connect_async(ws_url().as_str())
        .await
        .expect("websocket connect");
    socket
}

pub async fn send_json(client: &mut WsClient, payload: serde_json::Value) {
    client
        .send(Message::Text(payload.to_string()))
        .await
        .expect("send message");
}

pub async fn recv_json(client: &mut WsClient) -> serde_json::Value {
    let frame = timeout(RECV_TIMEOUT, client.next())
        .await
        .expect("timed out waiting for a server message")
        .expect("connection closed unexpectedly")
        .expect("websocket error");
    match frame {
        Message::Text(text) => serde_json::from_str(&text).expect("server sent invalid json"),
        other => panic!("unexpected non-text frame: {other:?}"),
    }
}

/// Reads until a message with the wanted `type` arrives, skipping the
/// periodic broadcasts interleaved with it.
pub async fn next_of_type(client: &mut WsClient, wanted: &str) -> serde_json::Value {
    for _ in 0..200 {
        let value = recv_json(client).await;
        if value["type"] == wanted {
            return value;
        }
    }
    panic!("no {wanted} message within 200 frames");
}

/// Unique id that stays inside the server's id length cap.
pub fn unique(prefix: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &suffix[..12])
}

/// Joins (creating on first use) a room and returns the roster reply.
pub async fn join_room(
    client: &mut WsClient,
    room_id: &str,
    player_id: &str,
    username: &str,
) -> serde_json::Value {
    send_json(
        client,
        serde_json::json!({
            "type": "join_room",
            "roomId": room_id,
            "playerId": player_id,
            "username": username,
            "character": "knight",
        }),
    )
    .await;
    next_of_type(client, "room_update").await
}
