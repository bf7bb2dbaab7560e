//! WebSocket 传输层：每个连接一个写任务，入站消息按到达顺序逐条处理。

use axum::Extension;
use axum::extract::ConnectInfo;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::response::{Envelope, STATUS_UNAUTHORIZED};

/// 每个连接出站队列的容量。
const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// 已打开连接的出站队列。
#[derive(Default)]
pub struct Connections {
    peers: Mutex<HashMap<SocketAddr, mpsc::Sender<String>>>,
}

impl Connections {
    pub async fn register(&self, addr: SocketAddr, sender: mpsc::Sender<String>) {
        self.peers.lock().await.insert(addr, sender);
    }

    pub async fn unregister(&self, addr: SocketAddr) {
        self.peers.lock().await.remove(&addr);
    }

    async fn sender(&self, addr: SocketAddr) -> Option<mpsc::Sender<String>> {
        self.peers.lock().await.get(&addr).cloned()
    }

    /// 命令响应：队列满时等待写任务腾出空间，连接已关闭时丢弃。
    pub async fn send_to(&self, addr: SocketAddr, text: String) {
        if let Some(sender) = self.sender(addr).await
            && sender.send(text).await.is_err()
        {
            debug!(%addr, "drop message for closed connection");
        }
    }

    /// 推送消息：队列满或连接已关闭时直接丢弃，不阻塞调用方。
    pub async fn try_send_to(&self, addr: SocketAddr, text: String) {
        let Some(sender) = self.sender(addr).await else {
            return;
        };
        match sender.try_send(text) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(%addr, "outbound queue full, drop console line");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(%addr, "drop message for closed connection");
            }
        }
    }
}

/// 控制台服务实例：分派器加连接表。
pub struct ConsoleState {
    dispatcher: Dispatcher,
    connections: Connections,
}

impl ConsoleState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            connections: Connections::default(),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// 登记连接并提示客户端登录。
    pub async fn on_open(&self, addr: SocketAddr, sender: mpsc::Sender<String>) {
        self.connections.register(addr, sender).await;
        let greeting = Envelope::message(
            STATUS_UNAUTHORIZED,
            self.dispatcher.context().phrases.phrase("login-required"),
        );
        self.connections.send_to(addr, greeting.to_json()).await;
        info!(%addr, "console connection opened");
    }

    pub async fn on_message(&self, addr: SocketAddr, raw: &str) {
        if let Some(envelope) = self.dispatcher.dispatch(addr, raw).await {
            self.connections.send_to(addr, envelope.to_json()).await;
        }
    }

    /// 连接关闭即注销会话。
    pub async fn on_close(&self, addr: SocketAddr) {
        self.connections.unregister(addr).await;
        if let Some(user) = self.dispatcher.context().sessions.remove(addr).await {
            info!(%addr, username = %user.username, "session closed");
        }
        info!(%addr, "console connection closed");
    }

    pub async fn send_to_sessions(&self, envelope: &Envelope) {
        let text = envelope.to_json();
        for addr in self.dispatcher.context().sessions.logged_in().await {
            self.connections.try_send_to(addr, text.clone()).await;
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(state): Extension<Arc<ConsoleState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, addr, state))
}

async fn handle_socket(socket: WebSocket, addr: SocketAddr, state: Arc<ConsoleState>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_CAPACITY);

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if let Err(err) = sink.send(Message::Text(text.into())).await {
                debug!(%addr, error = %err, "websocket send failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    state.on_open(addr, tx).await;

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => state.on_message(addr, text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => {
                debug!(%addr, "ignore binary frame");
            }
            Ok(_) => {}
            Err(err) => {
                warn!(%addr, error = %err, "websocket receive failed");
                break;
            }
        }
    }

    state.on_close(addr).await;
    writer.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::*;
    use axum::Router;
    use axum::routing::get;
    use serde_json::Value;
    use std::time::Duration;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as ClientMessage;

    async fn next_json<S>(stream: &mut S) -> Value
    where
        S: StreamExt<Item = Result<ClientMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(5), stream.next())
                .await
                .expect("message in time")
                .expect("stream open")
                .expect("valid frame");
            if let ClientMessage::Text(text) = message {
                return serde_json::from_str(text.as_str()).expect("valid json");
            }
        }
    }

    #[tokio::test]
    async fn console_lines_are_dropped_for_a_full_queue() {
        let fixture = fixture();
        let state = ConsoleState::new(fixture.dispatcher);
        let (tx, mut rx) = mpsc::channel(2);
        state.on_open(addr(1), tx).await;
        state.on_message(addr(1), ADMIN_LOGIN).await;

        tokio::time::timeout(Duration::from_secs(5), async {
            for n in 0..10 {
                let line = Envelope::console_output(format!("line {n}"));
                state.send_to_sessions(&line).await;
            }
        })
        .await
        .expect("broadcast never waits on a stalled client");

        let mut queued = Vec::new();
        while let Ok(text) = rx.try_recv() {
            queued.push(serde_json::from_str::<Value>(&text).unwrap()["status"].clone());
        }
        assert_eq!(queued, vec![Value::from(401), Value::from(200)]);
    }

    #[tokio::test]
    async fn websocket_session_lifecycle() {
        let fixture = fixture();
        let state = Arc::new(ConsoleState::new(fixture.dispatcher));
        let app = Router::new()
            .route("/ws", get(ws_handler))
            .layer(Extension(state.clone()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server_addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        let (mut socket, _) = connect_async(format!("ws://{server_addr}/ws")).await.unwrap();
        let greeting = next_json(&mut socket).await;
        assert_eq!(greeting["status"], 401);
        assert_eq!(greeting["message"], "Login required");

        socket.send(ClientMessage::text(ADMIN_LOGIN)).await.unwrap();
        socket.send(ClientMessage::text("FILE_LIST")).await.unwrap();
        socket.send(ClientMessage::text("BOGUS")).await.unwrap();
        assert_eq!(next_json(&mut socket).await["status"], 200);
        assert_eq!(next_json(&mut socket).await["status"], 2000);
        assert_eq!(next_json(&mut socket).await["status"], 400);
        assert_eq!(state.dispatcher().context().sessions.logged_in().await.len(), 1);

        socket.close(None).await.unwrap();
        let sessions = state.dispatcher().context().sessions.clone();
        tokio::time::timeout(Duration::from_secs(5), async move {
            while !sessions.logged_in().await.is_empty() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("session removed after close");
    }
}
