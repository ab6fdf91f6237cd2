use axum::{
    extract::{rejection::JsonRejection, ws::WebSocketUpgrade, Path, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use application::services::SendMessageRequest;
use application::{ConversationDto, ConversationSummaryDto, MessageDto};
use domain::{ConversationId, UserId};

use crate::ws_connection::WebSocketConnection;
use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    message: String,
}

#[derive(Debug, Serialize)]
struct SendMessageResponse {
    message: &'static str,
    #[serde(rename = "newMessage")]
    new_message: MessageDto,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        // 收件箱同时接受带斜杠和不带斜杠两种形式
        .route("/api/message", get(list_conversations))
        .route("/api/message/", get(list_conversations))
        .route("/api/message/{conversation_id}", get(get_conversation))
        .route("/api/message/send/{receiver_id}", put(send_message))
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn send_message(
    State(state): State<AppState>,
    Path(receiver_id): Path<Uuid>,
    headers: HeaderMap,
    payload: Result<Json<SendMessagePayload>, JsonRejection>,
) -> Result<(StatusCode, Json<SendMessageResponse>), ApiError> {
    // 发送者身份只来自令牌，从不来自请求体
    let sender_id = state.jwt_service.extract_user_from_headers(&headers)?;

    // 缺字段或畸形 JSON 统一按 400 处理，不走 axum 默认的 422
    let Json(payload) = payload.map_err(|err| ApiError::bad_request(err.body_text()))?;

    let outcome = state
        .message_service
        .send_message(SendMessageRequest {
            sender_id: UserId::from(sender_id),
            receiver_id: UserId::from(receiver_id),
            body: payload.message,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            message: "Message successfuly sent",
            new_message: outcome.message,
        }),
    ))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ConversationDto>, ApiError> {
    let requester = state.jwt_service.extract_user_from_headers(&headers)?;

    let dto = state
        .message_service
        .get_conversation(
            UserId::from(requester),
            ConversationId::from(conversation_id),
        )
        .await?;

    Ok(Json(dto))
}

async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ConversationSummaryDto>>, ApiError> {
    let requester = state.jwt_service.extract_user_from_headers(&headers)?;

    let summaries = state
        .message_service
        .list_conversations(UserId::from(requester))
        .await?;

    Ok(Json(summaries))
}

/// WebSocket 升级入口。
/// 令牌缺失或无效不拒绝握手，连接以匿名身份挂起，收不到任何事件。
async fn websocket_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let identity = state
        .jwt_service
        .authenticate(&headers)
        .map(UserId::from);

    ws.on_upgrade(move |socket| async move {
        WebSocketConnection::new(state, identity).run(socket).await;
    })
}
