//! 集成测试支撑：内存基础设施上的完整服务端，绑定到临时端口。
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use application::services::{
    MessageService, MessageServiceDependencies, RoomService, RoomServiceDependencies,
};
use application::{Clock, PresenceRegistry, RoomSequencer, SystemClock};
use domain::{Principal, PrincipalId, PrincipalKind};
use infrastructure::{
    ConnectionHub, MemoryMessageRepository, MemoryRoomRepository, MemoryUserDirectory,
};
use web_api::{router, AppState, ConnectionAuthenticator, JwtService};

pub type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct TestApp {
    pub addr: SocketAddr,
    pub jwt: JwtService,
    pub directory: Arc<MemoryUserDirectory>,
    pub http: reqwest::Client,
}

impl TestApp {
    pub fn token_for(&self, principal: &Principal) -> String {
        self.jwt.generate_token(Uuid::from(principal.id)).unwrap()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn seed(&self, principal: &Principal) {
        self.directory.upsert(principal.clone()).await;
    }

    pub async fn connect_ws(&self, principal: &Principal) -> WsClient {
        let token = self.token_for(principal);
        let url = format!("ws://{}/api/v1/ws?token={}", self.addr, token);
        let (ws, _) = connect_async(url).await.expect("websocket handshake failed");
        ws
    }
}

pub async fn spawn_app() -> TestApp {
    let rooms = Arc::new(MemoryRoomRepository::new());
    let messages = Arc::new(MemoryMessageRepository::new());
    let directory = Arc::new(MemoryUserDirectory::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let hub = Arc::new(ConnectionHub::new());
    let presence = Arc::new(PresenceRegistry::new());

    let room_service = RoomService::new(RoomServiceDependencies {
        room_repository: rooms.clone(),
        message_repository: messages.clone(),
        directory: directory.clone(),
        presence: presence.clone(),
        clock: clock.clone(),
    });

    let message_service = MessageService::new(MessageServiceDependencies {
        room_repository: rooms,
        message_repository: messages,
        directory: directory.clone(),
        broadcaster: hub.clone(),
        sequencer: Arc::new(RoomSequencer::new()),
        clock,
    });

    let jwt = JwtService::new(config::JwtConfig {
        secret: "integration-test-secret".to_string(),
        expiration_hours: 1,
    });
    let authenticator = Arc::new(ConnectionAuthenticator::new(jwt.clone(), directory.clone()));

    let state = AppState::new(
        Arc::new(room_service),
        Arc::new(message_service),
        hub,
        presence,
        directory.clone(),
        authenticator,
        Duration::from_secs(30),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    TestApp {
        addr,
        jwt,
        directory,
        http: reqwest::Client::new(),
    }
}

pub fn traveler(name: &str) -> Principal {
    Principal {
        id: PrincipalId::new(Uuid::new_v4()),
        kind: PrincipalKind::Traveler,
        display_name: name.to_string(),
        avatar_ref: None,
        last_seen_at: None,
    }
}

pub fn host(name: &str) -> Principal {
    Principal {
        id: PrincipalId::new(Uuid::new_v4()),
        kind: PrincipalKind::Host,
        display_name: name.to_string(),
        avatar_ref: None,
        last_seen_at: None,
    }
}

pub async fn send_event(ws: &mut WsClient, event: serde_json::Value) {
    ws.send(WsMessage::Text(event.to_string().into()))
        .await
        .expect("failed to send client event");
}

/// 等待下一条指定类型的事件，其他类型的事件跳过（最多等 2 秒）
pub async fn wait_for_event(ws: &mut WsClient, event_type: &str) -> serde_json::Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let frame = tokio::time::timeout(remaining, ws.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {event_type}"))
            .unwrap_or_else(|| panic!("connection closed while waiting for {event_type}"))
            .expect("websocket read failed");
        if let WsMessage::Text(text) = frame {
            let value: serde_json::Value =
                serde_json::from_str(text.as_str()).expect("event is not valid json");
            if value["type"] == event_type {
                return value;
            }
        }
    }
}

/// 断言给定窗口内不会出现某类事件
pub async fn assert_no_event(ws: &mut WsClient, event_type: &str, window: Duration) {
    let deadline = tokio::time::Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return;
        }
        match tokio::time::timeout(remaining, ws.next()).await {
            Err(_) => return,
            Ok(None) => return,
            Ok(Some(frame)) => {
                if let Ok(WsMessage::Text(text)) = frame {
                    let value: serde_json::Value =
                        serde_json::from_str(text.as_str()).expect("event is not valid json");
                    assert_ne!(
                        value["type"], event_type,
                        "unexpected {event_type} event: {value}"
                    );
                }
            }
        }
    }
}
