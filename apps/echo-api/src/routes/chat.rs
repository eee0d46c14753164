//! Chat history and message-level actions.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::middleware::AuthUser;
use crate::db::messages::HistoryQuery;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::models::message::{ChatMessage, ChatTarget, PublicChatMessage};
use crate::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 100;
const MAX_EMOJI_CHARS: usize = 16;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/chat/world", get(world_history))
        .route("/api/chat/streams/{stream_name}", get(stream_history))
        .route("/api/chat/grotto/{username}", get(grotto_history))
        .route("/api/chat/messages/{id}", delete(delete_message))
        .route("/api/chat/messages/{id}/reactions", post(add_reaction))
        .route(
            "/api/chat/messages/{id}/reactions/{emoji}",
            delete(remove_reaction),
        )
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryParams {
    /// Page size, 1–100. Defaults to 50.
    pub limit: Option<i64>,
    /// Only messages older than this message ID.
    pub before: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatHistoryResponse {
    /// Oldest first.
    pub data: Vec<PublicChatMessage>,
    pub has_more: bool,
}

async fn load_history(
    state: &AppState,
    target: ChatTarget,
    params: HistoryParams,
) -> Result<Json<ChatHistoryResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT) as usize;

    let rows = state
        .messages
        .history(&HistoryQuery {
            target,
            limit: limit + 1,
            before: params.before,
        })
        .await?;

    let has_more = rows.len() > limit;
    let mut data: Vec<PublicChatMessage> =
        rows.iter().take(limit).map(ChatMessage::to_public).collect();
    data.reverse();

    Ok(Json(ChatHistoryResponse { data, has_more }))
}

/// World chat history.
#[utoipa::path(
    get,
    path = "/api/chat/world",
    tag = "Chat",
    security(("bearer" = [])),
    params(HistoryParams),
    responses(
        (status = 200, description = "Messages, oldest first", body = ChatHistoryResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn world_history(
    _auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<ChatHistoryResponse>, ApiError> {
    load_history(&state, ChatTarget::World, params).await
}

/// History of one stream.
#[utoipa::path(
    get,
    path = "/api/chat/streams/{stream_name}",
    tag = "Chat",
    security(("bearer" = [])),
    params(("stream_name" = String, Path, description = "Stream name"), HistoryParams),
    responses(
        (status = 200, description = "Messages, oldest first", body = ChatHistoryResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn stream_history(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(stream_name): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<ChatHistoryResponse>, ApiError> {
    load_history(&state, ChatTarget::Stream(stream_name), params).await
}

/// Grotto messages shared with `username`.
#[utoipa::path(
    get,
    path = "/api/chat/grotto/{username}",
    tag = "Chat",
    security(("bearer" = [])),
    params(("username" = String, Path, description = "The other participant"), HistoryParams),
    responses(
        (status = 200, description = "Messages, oldest first", body = ChatHistoryResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn grotto_history(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<ChatHistoryResponse>, ApiError> {
    let target = ChatTarget::grotto([auth.username, username]);
    load_history(&state, target, params).await
}

// ---------------------------------------------------------------------------
// Message actions
// ---------------------------------------------------------------------------

/// Fetch a live message the caller is allowed to see.
async fn visible_message(state: &AppState, id: i64, username: &str) -> Result<ChatMessage, ApiError> {
    let message = state
        .messages
        .find(id)
        .await?
        .filter(|m| !m.is_deleted)
        .ok_or_else(|| ApiError::not_found("Message not found"))?;

    if let ChatTarget::Grotto(participants) = &message.target {
        if !participants.iter().any(|p| p == username) {
            return Err(ApiError::not_found("Message not found"));
        }
    }
    Ok(message)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReactionRequest {
    pub emoji: String,
}

/// React to a message.
#[utoipa::path(
    post,
    path = "/api/chat/messages/{id}/reactions",
    tag = "Chat",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Message ID")),
    request_body = ReactionRequest,
    responses(
        (status = 200, description = "Updated message", body = PublicChatMessage),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Message not found", body = ApiErrorBody),
    ),
)]
pub async fn add_reaction(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<ReactionRequest>,
) -> Result<Json<PublicChatMessage>, ApiError> {
    let emoji = body.emoji.trim();
    if emoji.is_empty() || emoji.chars().count() > MAX_EMOJI_CHARS {
        return Err(ApiError::validation(vec![FieldError {
            field: "emoji".into(),
            message: format!("Emoji must be 1–{MAX_EMOJI_CHARS} characters"),
        }]));
    }

    let mut message = visible_message(&state, id, &auth.username).await?;
    if message.add_reaction(emoji, &auth.username) {
        state.messages.update(message.clone()).await?;
    }
    Ok(Json(message.to_public()))
}

#[derive(Debug, Deserialize)]
pub struct ReactionPath {
    pub id: i64,
    pub emoji: String,
}

/// Withdraw a reaction.
#[utoipa::path(
    delete,
    path = "/api/chat/messages/{id}/reactions/{emoji}",
    tag = "Chat",
    security(("bearer" = [])),
    params(
        ("id" = i64, Path, description = "Message ID"),
        ("emoji" = String, Path, description = "Reaction emoji"),
    ),
    responses(
        (status = 200, description = "Updated message", body = PublicChatMessage),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Message not found", body = ApiErrorBody),
    ),
)]
pub async fn remove_reaction(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(path): Path<ReactionPath>,
) -> Result<Json<PublicChatMessage>, ApiError> {
    let mut message = visible_message(&state, path.id, &auth.username).await?;
    if message.remove_reaction(&path.emoji, &auth.username) {
        state.messages.update(message.clone()).await?;
    }
    Ok(Json(message.to_public()))
}

/// Soft-delete one of your own messages.
#[utoipa::path(
    delete,
    path = "/api/chat/messages/{id}",
    tag = "Chat",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Message ID")),
    responses(
        (status = 204, description = "Message deleted"),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not the author", body = ApiErrorBody),
        (status = 404, description = "Message not found", body = ApiErrorBody),
    ),
)]
pub async fn delete_message(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let mut message = visible_message(&state, id, &auth.username).await?;

    // Only the author can delete.
    if message.username != auth.username {
        return Err(ApiError::forbidden("You can only delete your own messages"));
    }

    message.soft_delete(&auth.username, Utc::now());
    state.messages.update(message).await?;
    tracing::info!(message_id = id, user_id = %auth.user_id, "chat message deleted");

    Ok(StatusCode::NO_CONTENT)
}
