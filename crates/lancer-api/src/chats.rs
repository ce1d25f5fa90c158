use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use lancer_types::api::{
    AddParticipantRequest, ChatResponse, Claims, CreateGroupChatRequest, CreatePrivateChatRequest,
};

use crate::auth::AppState;

/// POST /chats/private — find or create the two-party chat with the given
/// user. Re-requesting an existing pair returns the same chat.
pub async fn create_private_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePrivateChatRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.user_id == claims.sub {
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.clone();
    let me = claims.sub.to_string();
    let other = req.user_id.to_string();

    let (chat, participants, created) = tokio::task::spawn_blocking(move || {
        if db
            .db
            .get_user_by_id(&other)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .is_none()
        {
            return Err(StatusCode::NOT_FOUND);
        }

        let (chat_id, created) = db
            .db
            .find_or_create_private_chat(&Uuid::new_v4().to_string(), &me, &other)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let chat = db
            .db
            .get_chat(&chat_id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
        let participants = db
            .db
            .get_participants(&chat_id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        Ok::<_, StatusCode>((chat, participants, created))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(ChatResponse {
            chat: chat.into_chat(),
            participants: participants
                .into_iter()
                .map(|p| p.into_participant())
                .collect(),
        }),
    ))
}

/// POST /chats/group — create a group chat with the caller plus the named
/// participants.
pub async fn create_group_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupChatRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.name.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.participant_ids.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.clone();
    let me = claims.sub;
    let name = req.name.trim().to_string();
    let mut member_ids: Vec<String> = req.participant_ids.iter().map(|id| id.to_string()).collect();
    member_ids.push(me.to_string());
    member_ids.sort();
    member_ids.dedup();

    let (chat, participants) = tokio::task::spawn_blocking(move || {
        for id in &member_ids {
            if db
                .db
                .get_user_by_id(id)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
                .is_none()
            {
                return Err(StatusCode::NOT_FOUND);
            }
        }

        let chat_id = Uuid::new_v4().to_string();
        db.db
            .create_chat(&chat_id, Some(&name), true, &member_ids)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let chat = db
            .db
            .get_chat(&chat_id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
        let participants = db
            .db
            .get_participants(&chat_id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        Ok::<_, StatusCode>((chat, participants))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok((
        StatusCode::CREATED,
        Json(ChatResponse {
            chat: chat.into_chat(),
            participants: participants
                .into_iter()
                .map(|p| p.into_participant())
                .collect(),
        }),
    ))
}

/// GET /chats — the caller's chats, most recent activity first.
pub async fn list_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let me = claims.sub.to_string();
    let rows = tokio::task::spawn_blocking(move || db.db.get_chats_for_user(&me))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let chats: Vec<_> = rows.into_iter().map(|row| row.into_chat()).collect();
    Ok(Json(chats))
}

/// GET /chats/{chat_id} — chat with its participant list; members only.
pub async fn get_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let me = claims.sub.to_string();
    let cid = chat_id.to_string();

    let (chat, participants) = tokio::task::spawn_blocking(move || {
        ensure_member(&db, &cid, &me)?;

        let chat = db
            .db
            .get_chat(&cid)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::NOT_FOUND)?;
        let participants = db
            .db
            .get_participants(&cid)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        Ok::<_, StatusCode>((chat, participants))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok(Json(ChatResponse {
        chat: chat.into_chat(),
        participants: participants
            .into_iter()
            .map(|p| p.into_participant())
            .collect(),
    }))
}

/// DELETE /chats/{chat_id} — delete the chat; participant links, messages
/// and attached blobs go with it.
pub async fn delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let me = claims.sub.to_string();
    let cid = chat_id.to_string();

    tokio::task::spawn_blocking(move || {
        ensure_member(&db, &cid, &me)?;
        db.db
            .delete_chat(&cid)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /chats/{chat_id}/participants — add a member; group chats only.
pub async fn add_participant(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddParticipantRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let me = claims.sub.to_string();
    let cid = chat_id.to_string();
    let target = req.user_id.to_string();

    tokio::task::spawn_blocking(move || {
        ensure_member(&db, &cid, &me)?;

        let chat = db
            .db
            .get_chat(&cid)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::NOT_FOUND)?;
        if !chat.is_group {
            return Err(StatusCode::BAD_REQUEST);
        }

        if db
            .db
            .get_user_by_id(&target)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .is_none()
        {
            return Err(StatusCode::NOT_FOUND);
        }

        db.db
            .add_participant(&cid, &target)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /chats/{chat_id}/leave
pub async fn leave_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let me = claims.sub.to_string();
    let cid = chat_id.to_string();

    tokio::task::spawn_blocking(move || {
        ensure_member(&db, &cid, &me)?;
        db.db
            .remove_participant(&cid, &me)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /chats/{chat_id}/read — mark the other participants' messages read.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let me = claims.sub.to_string();
    let cid = chat_id.to_string();

    tokio::task::spawn_blocking(move || {
        ensure_member(&db, &cid, &me)?;
        db.db
            .mark_read(&cid, &me)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok(StatusCode::NO_CONTENT)
}

/// Membership gate shared by every per-chat route.
pub(crate) fn ensure_member(
    state: &AppState,
    chat_id: &str,
    user_id: &str,
) -> Result<(), StatusCode> {
    let is_member = state
        .db
        .is_participant(chat_id, user_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if is_member {
        Ok(())
    } else {
        Err(StatusCode::FORBIDDEN)
    }
}
