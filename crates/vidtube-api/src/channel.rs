//! Public channel profile: who the channel is, how many subscribe to it,
//! how many it subscribes to, and whether the viewer is one of its
//! subscribers.

use axum::{
    Extension,
    extract::{Path, State},
};

use vidtube_types::models::ChannelProfile;

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::response::ApiResponse;
use crate::state::{AppState, run_blocking};

/// Looks up `username` case-insensitively. `viewer_id` of `None` is an
/// anonymous viewer and is never subscribed.
pub async fn channel_profile(
    state: &AppState,
    username: &str,
    viewer_id: Option<String>,
) -> Result<ChannelProfile, ApiError> {
    let username = username.trim().to_lowercase();
    if username.is_empty() {
        return Err(ApiError::Validation("Username is missing".to_string()));
    }

    let row = run_blocking(state, move |s| {
        Ok(s.db.get_channel_profile(&username, viewer_id.as_deref())?)
    })
    .await?
    .ok_or_else(|| ApiError::NotFound("Channel does not exist".to_string()))?;

    Ok(row.into())
}

/// GET /channel/{username}
pub async fn get_channel_profile(
    State(state): State<AppState>,
    Extension(CurrentUser(viewer)): Extension<CurrentUser>,
    Path(username): Path<String>,
) -> Result<ApiResponse<ChannelProfile>, ApiError> {
    let profile = channel_profile(&state, &username, Some(viewer.id.to_string())).await?;
    Ok(ApiResponse::ok(profile, "User channel fetched successfully"))
}
