use axum::{
    Extension, Json,
    extract::{Multipart, State, multipart::MultipartRejection, rejection::JsonRejection},
};
use tracing::{info, warn};

use vidtube_db::is_unique_violation;
use vidtube_types::api::{ChangePasswordRequest, UpdateAccountRequest, UserPayload};
use vidtube_types::models::User;

use crate::auth::{bad_json, bad_multipart, non_blank};
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::password::{hash_password, verify_password};
use crate::response::{ApiResponse, Empty};
use crate::state::{AppState, run_blocking};
use crate::uploads::{MultipartForm, upload_to_media};

fn user_not_found() -> ApiError {
    ApiError::NotFound("User not found".to_string())
}

/// POST|PATCH /change-password
pub async fn change_password(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    body: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<ApiResponse<Empty>, ApiError> {
    let Json(req) = body.map_err(bad_json)?;
    let (Some(old_password), Some(new_password)) = (non_blank(req.old_password), non_blank(req.new_password))
    else {
        return Err(ApiError::Validation("oldPassword and newPassword are required".to_string()));
    };

    let user_id = user.id.to_string();
    run_blocking(&state, move |s| {
        let row = s.db.get_user_by_id(&user_id)?.ok_or_else(user_not_found)?;
        if !verify_password(&old_password, &row.password)? {
            warn!("Wrong old password for user {}", user_id);
            return Err(ApiError::Validation("Invalid old password".to_string()));
        }
        let hash = hash_password(&new_password)?;
        s.deadline.check()?;
        if !s.db.set_password(&user_id, &hash)? {
            return Err(user_not_found());
        }
        Ok(())
    })
    .await?;

    info!("User {} changed password", user.id);
    Ok(ApiResponse::ok(Empty::default(), "Password changed successfully"))
}

/// GET /current-user
pub async fn current_user(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResponse<User> {
    ApiResponse::ok(user, "Current user fetched successfully")
}

/// PATCH /update-account: both `fullName` and `email` are required on
/// every call.
pub async fn update_account(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    body: Result<Json<UpdateAccountRequest>, JsonRejection>,
) -> Result<ApiResponse<User>, ApiError> {
    let Json(req) = body.map_err(bad_json)?;
    let (Some(full_name), Some(email)) = (non_blank(req.full_name), non_blank(req.email)) else {
        return Err(ApiError::Validation("All fields are required".to_string()));
    };

    let email = email.trim().to_lowercase();
    let user_id = user.id.to_string();
    let updated = run_blocking(&state, move |s| {
        s.deadline.check()?;
        s.db.update_account(&user_id, full_name.trim(), &email)
            .map_err(|e| {
                if is_unique_violation(&e) {
                    ApiError::Conflict("Email is already in use".to_string())
                } else {
                    e.into()
                }
            })?
            .ok_or_else(user_not_found)
    })
    .await?;

    info!("User {} updated account details", user.id);
    Ok(ApiResponse::ok(updated.into(), "Account details updated successfully"))
}

/// Which image column an upload replaces.
#[derive(Debug, Clone, Copy)]
enum ProfileImage {
    Avatar,
    CoverImage,
}

impl ProfileImage {
    fn field(self) -> &'static str {
        match self {
            ProfileImage::Avatar => "avatar",
            ProfileImage::CoverImage => "coverImage",
        }
    }

    fn label(self) -> &'static str {
        match self {
            ProfileImage::Avatar => "avatar",
            ProfileImage::CoverImage => "cover image",
        }
    }
}

/// Uploads first, then writes the URL. A failed upload leaves the user
/// record untouched.
async fn replace_image(
    state: AppState,
    user: User,
    multipart: Result<Multipart, MultipartRejection>,
    image: ProfileImage,
) -> Result<ApiResponse<UserPayload>, ApiError> {
    let mut form = MultipartForm::read(multipart.map_err(bad_multipart)?).await?;
    let file = form
        .take_single_file(image.field())?
        .ok_or_else(|| ApiError::Validation(format!("{} file is missing", image.field())))?;

    let url = upload_to_media(&state, &file, image.label()).await?;

    let user_id = user.id.to_string();
    let updated = run_blocking(&state, move |s| {
        s.deadline.check()?;
        let row = match image {
            ProfileImage::Avatar => s.db.set_avatar(&user_id, &url)?,
            ProfileImage::CoverImage => s.db.set_cover_image(&user_id, &url)?,
        };
        row.ok_or_else(user_not_found)
    })
    .await?;

    info!("User {} replaced {}", user.id, image.label());
    Ok(ApiResponse::ok(
        UserPayload { user: updated.into() },
        &format!("{} updated successfully", image.field()),
    ))
}

/// PATCH /avatar
pub async fn update_avatar(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<UserPayload>, ApiError> {
    replace_image(state, user, multipart, ProfileImage::Avatar).await
}

/// PATCH /cover-image
pub async fn update_cover_image(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<UserPayload>, ApiError> {
    replace_image(state, user, multipart, ProfileImage::CoverImage).await
}
