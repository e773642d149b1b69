//! WebSocket 处理器
//!
//! 实现长连接升级、连接级认证、事件路由与连接生命周期。
//! 生命周期驱动在线状态机：握手成功注册连接并进入私有频道，
//! 连接数 0→1 广播上线；断开或心跳超时走同一条清理路径，
//! 1→0 广播离线并回写最后在线时间。

use std::time::{Duration, Instant};

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use application::services::SendMessageRequest;
use application::{EventBroadcaster, PresenceTransition, ServerEvent};
use domain::{ConnectionId, ContentType, Principal, RoomId};

use crate::state::AppState;

/// WebSocket连接查询参数
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT access token（也接受 Authorization 头）
    pub token: Option<String>,
}

/// 客户端上行事件
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// 加入房间频道
    JoinRoom { room_id: String },
    /// 离开房间频道
    LeaveRoom { room_id: String },
    /// 发送消息
    SendMessage {
        room_id: String,
        content: String,
        content_type: Option<ContentType>,
        media_ref: Option<String>,
    },
    /// 输入中提示
    Typing { room_id: String, is_typing: bool },
    /// 整房标记已读
    MarkRead { room_id: String },
    /// 心跳
    Ping,
}

/// 处理WebSocket连接升级。
/// 认证在升级之前完成：凭证缺失/非法/过期或主体不存在都直接
/// 拒绝握手，不会产生任何连接状态。
pub async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, StatusCode> {
    let token = query
        .token
        .or_else(|| crate::auth::bearer_from_headers(&headers));
    let Some(token) = token else {
        warn!("websocket upgrade rejected: no token provided");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let principal = match state.authenticator.authenticate_token(&token).await {
        Ok(principal) => principal,
        Err(_) => {
            warn!("websocket upgrade rejected: invalid token");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    info!(principal_id = %principal.id, "websocket upgrade authenticated");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, principal)))
}

/// 单个连接的生命周期
async fn handle_socket(socket: WebSocket, state: AppState, principal: Principal) {
    let connection_id = ConnectionId::generate();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    // 注册连接：进入登记表并自动加入私有频道
    state.hub.register(connection_id, principal.id, tx);

    // 只有 0→1 边沿通告上线（第二台设备上线不重复广播）。
    // 登记与通告在迁移锁内完成，同一用户的上线/离线事件保持有序。
    {
        let _guard = state.presence.transition_lock(principal.id).await;
        if state.presence.connect(principal.id, connection_id) == PresenceTransition::CameOnline {
            let _ = state
                .hub
                .broadcast_all(
                    Some(connection_id),
                    ServerEvent::UserOnline {
                        user_id: principal.id,
                    },
                )
                .await;
        }
    }

    info!(
        connection_id = %connection_id,
        principal_id = %principal.id,
        "websocket connection established"
    );

    // 出站：把事件序列化后写给对端
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(payload) => {
                    if sink.send(WsMessage::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "failed to serialize outbound event");
                }
            }
        }
    });

    // 入站：事件处理 + 心跳看护。超时与客户端主动断开走同一条路
    let recv_state = state.clone();
    let recv_principal = principal.clone();
    let heartbeat_timeout = state.heartbeat_timeout;
    let mut recv_task = tokio::spawn(async move {
        let check_period = Duration::from_secs((heartbeat_timeout.as_secs() / 2).max(1));
        let mut heartbeat = tokio::time::interval(check_period);
        let mut last_seen = Instant::now();

        loop {
            tokio::select! {
                inbound = stream.next() => {
                    match inbound {
                        Some(Ok(WsMessage::Text(text))) => {
                            last_seen = Instant::now();
                            handle_client_event(
                                &recv_state,
                                connection_id,
                                &recv_principal,
                                text.as_str(),
                            )
                            .await;
                        }
                        Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => {
                            // 协议层的 ping/pong 同样算作心跳
                            last_seen = Instant::now();
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            debug!(connection_id = %connection_id, "websocket closed by client");
                            break;
                        }
                        Some(Ok(WsMessage::Binary(_))) => {
                            debug!("received binary frame (not supported)");
                        }
                        Some(Err(err)) => {
                            debug!(connection_id = %connection_id, error = %err, "websocket read error");
                            break;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if last_seen.elapsed() >= heartbeat_timeout {
                        info!(connection_id = %connection_id, "heartbeat timeout, closing connection");
                        break;
                    }
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {}
        _ = &mut recv_task => {}
    }
    send_task.abort();
    recv_task.abort();

    // 清理连接；生命周期错误不上报给用户，只驱动状态机
    state.hub.unregister(connection_id);
    {
        let _guard = state.presence.transition_lock(principal.id).await;
        if state.presence.disconnect(principal.id, connection_id)
            == PresenceTransition::WentOffline
        {
            let now = chrono::Utc::now();
            // 唯一一次对用户目录的回写
            if let Err(err) = state.directory.record_last_seen(principal.id, now).await {
                warn!(principal_id = %principal.id, error = %err, "failed to record last seen");
            }
            let _ = state
                .hub
                .broadcast_all(
                    None,
                    ServerEvent::UserOffline {
                        user_id: principal.id,
                    },
                )
                .await;
        }
    }

    info!(connection_id = %connection_id, "websocket connection cleaned up");
}

/// 单条上行事件的路由。业务失败只回给发起连接，从不广播。
async fn handle_client_event(
    state: &AppState,
    connection_id: ConnectionId,
    principal: &Principal,
    text: &str,
) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(err) => {
            send_error(state, connection_id, format!("unrecognized event: {err}")).await;
            return;
        }
    };

    match event {
        ClientEvent::Ping => {
            let _ = state
                .hub
                .send_to_connection(connection_id, ServerEvent::Pong)
                .await;
        }
        ClientEvent::JoinRoom { room_id } => {
            let Some(room_id) = parse_room_id(state, connection_id, &room_id).await else {
                return;
            };
            // 进入房间频道前按存储里的最新状态校验成员资格
            match state
                .room_service
                .ensure_participant(room_id, principal.id)
                .await
            {
                Ok(_) => {
                    state.hub.join_room(connection_id, room_id);
                    debug!(connection_id = %connection_id, room_id = %room_id, "joined room channel");
                }
                Err(err) => send_error(state, connection_id, err.to_string()).await,
            }
        }
        ClientEvent::LeaveRoom { room_id } => {
            let Some(room_id) = parse_room_id(state, connection_id, &room_id).await else {
                return;
            };
            state.hub.leave_room(connection_id, room_id);
            debug!(connection_id = %connection_id, room_id = %room_id, "left room channel");
        }
        ClientEvent::SendMessage {
            room_id,
            content,
            content_type,
            media_ref,
        } => {
            let Some(room_id) = parse_room_id(state, connection_id, &room_id).await else {
                return;
            };
            let request = SendMessageRequest {
                room_id,
                sender: principal.clone(),
                connection_id,
                content,
                content_type: content_type.unwrap_or(ContentType::Text),
                media_ref,
            };
            // 确认与扇出都由消息管道完成，这里只负责把失败回给发送方
            if let Err(err) = state.message_service.send(request).await {
                let reason = if err.is_retryable() {
                    format!("temporary failure, please retry: {err}")
                } else {
                    err.to_string()
                };
                send_error(state, connection_id, reason).await;
            }
        }
        ClientEvent::Typing { room_id, is_typing } => {
            // 尽力而为：不持久化、不确认、没人听就丢弃
            let Ok(room_id) = room_id.parse::<Uuid>().map(RoomId::new) else {
                return;
            };
            if state.hub.is_joined(connection_id, room_id) {
                let _ = state
                    .hub
                    .send_to_room(
                        room_id,
                        Some(connection_id),
                        ServerEvent::UserTyping {
                            user_id: principal.id,
                            user_name: principal.display_name.clone(),
                            is_typing,
                        },
                    )
                    .await;
            }
        }
        ClientEvent::MarkRead { room_id } => {
            let Some(room_id) = parse_room_id(state, connection_id, &room_id).await else {
                return;
            };
            if let Err(err) = state.message_service.mark_read(room_id, principal.id).await {
                send_error(state, connection_id, err.to_string()).await;
            }
        }
    }
}

async fn parse_room_id(
    state: &AppState,
    connection_id: ConnectionId,
    raw: &str,
) -> Option<RoomId> {
    match raw.parse::<Uuid>() {
        Ok(id) => Some(RoomId::new(id)),
        Err(_) => {
            send_error(state, connection_id, "invalid room id format").await;
            None
        }
    }
}

async fn send_error(state: &AppState, connection_id: ConnectionId, reason: impl Into<String>) {
    let _ = state
        .hub
        .send_to_connection(
            connection_id,
            ServerEvent::MessageError {
                error: reason.into(),
            },
        )
        .await;
}
