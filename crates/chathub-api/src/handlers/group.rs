//! Group administration handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use tracing::info;

use chathub_core::error::AppError;
use chathub_core::types::{GroupId, UserId};

use crate::dto::request::{AddMemberRequest, CreateGroupRequest, validate};
use crate::dto::response::{ApiResponse, GroupResponse};
use crate::error::ApiError;
use crate::extractors::AuthUser;
use crate::state::AppState;

/// POST /groups
pub async fn create_group(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<ApiResponse<GroupResponse>>), ApiError> {
    validate(&req)?;

    let mut members = req.members;
    members.push(auth.id());
    members.sort();
    members.dedup();
    for member in &members {
        ensure_user_exists(&state, *member).await?;
    }

    let group = state
        .groups()
        .create(GroupId::new(), req.name.trim(), &members)
        .await?;

    info!(
        group_id = %group.id,
        created_by = %auth.id(),
        members = group.members.len(),
        "Group created"
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(GroupResponse::from(group))),
    ))
}

/// GET /groups/{id}
pub async fn get_group(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(group_id): Path<GroupId>,
) -> Result<Json<ApiResponse<GroupResponse>>, ApiError> {
    let group = state.groups().get(group_id).await?;
    Ok(Json(ApiResponse::ok(GroupResponse::from(group))))
}

/// POST /groups/{id}/members
pub async fn add_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<GroupId>,
    Json(req): Json<AddMemberRequest>,
) -> Result<Json<ApiResponse<GroupResponse>>, ApiError> {
    ensure_user_exists(&state, req.user_id).await?;

    let groups = state.groups();
    groups.add_member(group_id, req.user_id).await?;
    info!(group_id = %group_id, user_id = %req.user_id, by = %auth.id(), "Member added");

    let group = groups.get(group_id).await?;
    Ok(Json(ApiResponse::ok(GroupResponse::from(group))))
}

/// DELETE /groups/{id}/members/{user_id}
pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((group_id, user_id)): Path<(GroupId, UserId)>,
) -> Result<Json<ApiResponse<GroupResponse>>, ApiError> {
    let groups = state.groups();
    groups.remove_member(group_id, user_id).await?;
    info!(group_id = %group_id, user_id = %user_id, by = %auth.id(), "Member removed");

    let group = groups.get(group_id).await?;
    Ok(Json(ApiResponse::ok(GroupResponse::from(group))))
}

async fn ensure_user_exists(state: &AppState, user_id: UserId) -> Result<(), AppError> {
    state
        .authenticator
        .directory()
        .find_by_id(user_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::not_found(format!("User {user_id} not found")))
}
