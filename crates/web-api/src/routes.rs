use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use application::{MessageDto, ParticipantSummary, RoomDto};
use domain::{PrincipalId, RoomId};

use crate::{error::ApiError, state::AppState, websocket};

#[derive(Debug, Deserialize)]
struct CreateRoomPayload {
    participant_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    page: Option<u32>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    query: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/chat/rooms",
            get(list_rooms).post(get_or_create_room),
        )
        .route("/chat/rooms/{room_id}", axum::routing::delete(delete_room))
        .route("/chat/rooms/{room_id}/messages", get(get_history))
        .route("/chat/users/search", get(search_users))
        .route("/ws", get(websocket::websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// 按参与者对解析（或懒创建）直聊房间
async fn get_or_create_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateRoomPayload>,
) -> Result<Json<RoomDto>, ApiError> {
    let principal = state.authenticator.authenticate_headers(&headers).await?;
    let dto = state
        .room_service
        .get_or_create(principal.id, PrincipalId::new(payload.participant_id))
        .await?;

    Ok(Json(dto))
}

/// 请求者的会话列表，带未读数和参与者档案
async fn list_rooms(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<RoomDto>>, ApiError> {
    let principal = state.authenticator.authenticate_headers(&headers).await?;
    let rooms = state.room_service.list_for_principal(principal.id).await?;

    Ok(Json(rooms))
}

async fn delete_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let principal = state.authenticator.authenticate_headers(&headers).await?;
    state
        .room_service
        .delete(RoomId::new(room_id), principal.id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// 分页历史，时间顺序返回；拉取即视为已读
async fn get_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageDto>>, ApiError> {
    let principal = state.authenticator.authenticate_headers(&headers).await?;
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(50).clamp(1, 100);
    let messages = state
        .message_service
        .history(RoomId::new(room_id), principal.id, page, limit)
        .await?;

    Ok(Json(messages))
}

/// 发起新会话前的用户搜索
async fn search_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<ParticipantSummary>>, ApiError> {
    let principal = state.authenticator.authenticate_headers(&headers).await?;
    let term = query.query.unwrap_or_default();
    let users = state
        .room_service
        .search_users(&term, principal.id)
        .await?;

    Ok(Json(users))
}
