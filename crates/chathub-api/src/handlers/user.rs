//! User handlers.

use axum::Json;
use axum::extract::{Query, State};

use chathub_core::types::GroupId;
use chathub_entity::UserProfile;
use chathub_realtime::message::KnownUser;

use crate::dto::request::AllUsersQuery;
use crate::dto::response::ApiResponse;
use crate::error::ApiError;
use crate::extractors::AuthUser;
use crate::state::AppState;

/// GET /users/me
pub async fn me(auth: AuthUser) -> Json<ApiResponse<UserProfile>> {
    Json(ApiResponse::ok(auth.profile()))
}

/// GET /users/me/groups
pub async fn my_groups(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<GroupId>>>, ApiError> {
    let mut groups: Vec<GroupId> = state.groups().groups_of(auth.id()).await?.into_iter().collect();
    groups.sort();
    Ok(Json(ApiResponse::ok(groups)))
}

/// GET /all_users
///
/// Active users with their presence flag, optionally leaving one out.
pub async fn all_users(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<AllUsersQuery>,
) -> Result<Json<ApiResponse<Vec<KnownUser>>>, ApiError> {
    let users = state
        .authenticator
        .directory()
        .list_active(query.exclude)
        .await?;
    let online = state.engine.connections.online_users().await;

    let listing = users
        .iter()
        .map(|u| KnownUser {
            profile: u.profile(),
            online: online.contains(&u.id()),
        })
        .collect();
    Ok(Json(ApiResponse::ok(listing)))
}
