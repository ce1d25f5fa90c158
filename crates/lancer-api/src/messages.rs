use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use lancer_types::api::{Claims, EditMessageRequest};

use crate::auth::AppState;
use crate::chats::ensure_member;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination — pass the `created_at` timestamp of the
    /// oldest message from the previous page to fetch older messages.
    pub before: Option<String>,
}

fn default_limit() -> u32 {
    50
}

/// GET /chats/{chat_id}/messages — history, newest first. Soft-deleted
/// messages never appear. Members only.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let me = claims.sub.to_string();
    let cid = chat_id.to_string();
    let limit = query.limit.min(200);
    let before = query.before;

    let rows = tokio::task::spawn_blocking(move || {
        ensure_member(&db, &cid, &me)?;
        db.db
            .get_messages(&cid, limit, before.as_deref())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    let messages: Vec<_> = rows.into_iter().map(|row| row.into_message()).collect();
    Ok(Json(messages))
}

/// PATCH /chats/{chat_id}/messages/{message_id} — edit your own message.
pub async fn edit_message(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EditMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.clone();
    let me = claims.sub.to_string();
    let cid = chat_id.to_string();
    let mid = message_id.to_string();

    let row = tokio::task::spawn_blocking(move || {
        let existing = db
            .db
            .get_message(&mid)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::NOT_FOUND)?;
        if existing.chat_id != cid {
            return Err(StatusCode::NOT_FOUND);
        }
        if existing.sender_id != me {
            return Err(StatusCode::FORBIDDEN);
        }

        let updated = db
            .db
            .update_message(&mid, &content, &lancer_db::now_rfc3339())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        if !updated {
            return Err(StatusCode::NOT_FOUND);
        }

        db.db
            .get_message(&mid)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok(Json(row.into_message()))
}

/// DELETE /chats/{chat_id}/messages/{message_id} — delete your own
/// message. Text messages are soft-deleted; a file message takes its blob
/// with it.
pub async fn delete_message(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let me = claims.sub.to_string();
    let cid = chat_id.to_string();
    let mid = message_id.to_string();

    tokio::task::spawn_blocking(move || {
        let existing = db
            .db
            .get_message(&mid)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::NOT_FOUND)?;
        if existing.chat_id != cid {
            return Err(StatusCode::NOT_FOUND);
        }
        if existing.sender_id != me {
            return Err(StatusCode::FORBIDDEN);
        }

        let deleted = db
            .db
            .delete_message(&mid)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        if deleted {
            Ok(())
        } else {
            Err(StatusCode::NOT_FOUND)
        }
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok(StatusCode::NO_CONTENT)
}
