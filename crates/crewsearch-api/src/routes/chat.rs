use axum::{
    Json, Router,
    extract::Path,
    http::StatusCode,
    routing::{delete, post, put},
};
use crewsearch_core::SecretValue;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use super::GuardedState;
use crate::error::ApiError;
use crate::state::{AppState, ChatEntry, ChatRole, MISSING_KEY_REPLY};

#[derive(Debug, Serialize)]
pub struct CreateChatResponse {
    pub chat_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CredentialRequest {
    pub api_key: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub reply: String,
    pub messages: usize,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub chat_id: Uuid,
    pub has_credential: bool,
    pub messages: Vec<ChatEntry>,
}

pub fn chat_router() -> Router<AppState> {
    Router::new()
        .route("/chat", post(create_chat))
        .route("/chat/:id", delete(end_chat))
        .route("/chat/:id/credential", put(set_credential))
        .route(
            "/chat/:id/messages",
            post(send_message).get(history).delete(clear_history),
        )
}

async fn create_chat(
    GuardedState(state): GuardedState,
) -> (StatusCode, Json<CreateChatResponse>) {
    let chat_id = state.create_chat();
    info!(%chat_id, "chat created");
    (StatusCode::CREATED, Json(CreateChatResponse { chat_id }))
}

async fn end_chat(
    GuardedState(state): GuardedState,
    Path(chat_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !state.end_chat(&chat_id) {
        return Err(ApiError::not_found(format!("chat {chat_id}")));
    }
    info!(%chat_id, "chat ended");
    Ok(StatusCode::NO_CONTENT)
}

async fn set_credential(
    GuardedState(state): GuardedState,
    Path(chat_id): Path<Uuid>,
    Json(payload): Json<CredentialRequest>,
) -> Result<StatusCode, ApiError> {
    if payload.api_key.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "api_key must not be empty",
        ));
    }
    if !state.set_credential(&chat_id, SecretValue::new(payload.api_key)) {
        return Err(ApiError::not_found(format!("chat {chat_id}")));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all, fields(%chat_id))]
async fn send_message(
    GuardedState(state): GuardedState,
    Path(chat_id): Path<Uuid>,
    Json(payload): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !state.has_chat(&chat_id) {
        return Err(ApiError::not_found(format!("chat {chat_id}")));
    }
    if payload.content.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "content must not be empty",
        ));
    }

    let reply = match state.credential(&chat_id) {
        None => {
            state.push_message(&chat_id, ChatRole::User, payload.content);
            MISSING_KEY_REPLY.to_string()
        }
        Some(credential) => {
            let _slot = state.try_acquire_slot().ok_or_else(|| {
                ApiError::new(
                    StatusCode::TOO_MANY_REQUESTS,
                    "all research slots are busy; retry later",
                )
            })?;
            state.push_message(&chat_id, ChatRole::User, payload.content.clone());
            state
                .research()
                .research_with_credential(&payload.content, credential)
                .await
        }
    };

    state.push_message(&chat_id, ChatRole::Assistant, reply.clone());
    let messages = state
        .history(&chat_id)
        .map(|history| history.len())
        .unwrap_or_default();
    Ok(Json(MessageResponse { reply, messages }))
}

async fn history(
    GuardedState(state): GuardedState,
    Path(chat_id): Path<Uuid>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let messages = state
        .history(&chat_id)
        .ok_or_else(|| ApiError::not_found(format!("chat {chat_id}")))?;
    Ok(Json(HistoryResponse {
        chat_id,
        has_credential: state.credential(&chat_id).is_some(),
        messages,
    }))
}

async fn clear_history(
    GuardedState(state): GuardedState,
    Path(chat_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !state.clear_history(&chat_id) {
        return Err(ApiError::not_found(format!("chat {chat_id}")));
    }
    Ok(StatusCode::NO_CONTENT)
}
