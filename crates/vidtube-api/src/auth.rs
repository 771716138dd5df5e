use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Multipart, State, multipart::MultipartRejection, rejection::JsonRejection},
    http::StatusCode,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tracing::{info, warn};
use uuid::Uuid;

use vidtube_db::is_unique_violation;
use vidtube_db::models::NewUser;
use vidtube_types::api::{LoginRequest, LoginResponse, RefreshTokenRequest, TokenPairResponse};
use vidtube_types::models::User;

use crate::error::ApiError;
use crate::middleware::{ACCESS_TOKEN_COOKIE, CurrentUser, REFRESH_TOKEN_COOKIE};
use crate::password::{hash_password, verify_password};
use crate::response::{ApiResponse, Empty};
use crate::state::{AppState, run_blocking};
use crate::tokens::TokenPair;
use crate::uploads::{MultipartForm, upload_to_media};

/// `Some` only for a value with at least one non-whitespace character.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub(crate) fn bad_json(rejection: JsonRejection) -> ApiError {
    ApiError::Validation(rejection.body_text())
}

pub(crate) fn bad_multipart(rejection: MultipartRejection) -> ApiError {
    ApiError::Validation(rejection.body_text())
}

fn token_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(true)
        .build()
}

/// Overwrites the browser's copy whether or not the request carried one.
fn expired_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = token_cookie(name, String::new());
    cookie.make_removal();
    cookie
}

fn with_token_cookies(jar: CookieJar, pair: &TokenPair) -> CookieJar {
    jar.add(token_cookie(ACCESS_TOKEN_COOKIE, pair.access_token.clone()))
        .add(token_cookie(REFRESH_TOKEN_COOKIE, pair.refresh_token.clone()))
}

/// POST /register: multipart with `fullName`, `email`, `username`,
/// `password`, an `avatar` file and an optional `coverImage` file.
pub async fn register(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<User>, ApiError> {
    let mut form = MultipartForm::read(multipart.map_err(bad_multipart)?).await?;

    let field = |name: &str| non_blank(form.text(name).map(str::to_string));
    let (Some(full_name), Some(email), Some(username), Some(password)) =
        (field("fullName"), field("email"), field("username"), field("password"))
    else {
        return Err(ApiError::Validation("All fields are required".to_string()));
    };
    let full_name = full_name.trim().to_string();
    let email = email.trim().to_lowercase();
    let username = username.trim().to_lowercase();

    let (u, e) = (username.clone(), email.clone());
    let existing = run_blocking(&state, move |s| {
        Ok(s.db.find_user_by_username_or_email(Some(&u), Some(&e))?)
    })
    .await?;
    if existing.is_some() {
        return Err(ApiError::Conflict("User with email or username already exists".to_string()));
    }

    let avatar = form
        .take_single_file("avatar")?
        .ok_or_else(|| ApiError::Validation("Avatar file is required".to_string()))?;
    let cover_image = form.take_single_file("coverImage")?;

    let avatar_url = upload_to_media(&state, &avatar, "avatar").await?;
    let cover_image_url = match cover_image {
        Some(file) => upload_to_media(&state, &file, "cover image").await?,
        None => String::new(),
    };

    let id = Uuid::new_v4().to_string();
    let created = run_blocking(&state, move |s| {
        let new_user = NewUser {
            id: id.clone(),
            username,
            email,
            full_name,
            avatar: avatar_url,
            cover_image: cover_image_url,
            password_hash: hash_password(&password)?,
        };
        s.deadline.check()?;
        s.db.create_user(&new_user).map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::Conflict("User with email or username already exists".to_string())
            } else {
                e.into()
            }
        })?;
        s.db.get_user_by_id(&id)?
            .ok_or_else(|| ApiError::Internal("Something went wrong while registering user".to_string()))
    })
    .await?;

    info!("Registered user {} ({})", created.username, created.id);
    Ok(ApiResponse::new(
        StatusCode::CREATED,
        created.into(),
        "User registered successfully",
    ))
}

/// POST /login: `username` or `email`, plus `password`.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, ApiResponse<LoginResponse>), ApiError> {
    let Json(req) = body.map_err(bad_json)?;

    let username = non_blank(req.username).map(|u| u.trim().to_lowercase());
    let email = non_blank(req.email).map(|e| e.trim().to_lowercase());
    if username.is_none() && email.is_none() {
        return Err(ApiError::Validation("username or email is required".to_string()));
    }
    let password = non_blank(req.password)
        .ok_or_else(|| ApiError::Validation("password is required".to_string()))?;

    let (user, pair) = run_blocking(&state, move |s| {
        let user = s
            .db
            .find_user_by_username_or_email(username.as_deref(), email.as_deref())?
            .ok_or_else(|| ApiError::NotFound("User does not exist".to_string()))?;

        if !verify_password(&password, &user.password)? {
            warn!("Failed login for user {}", user.id);
            return Err(ApiError::Unauthorized("Password is incorrect".to_string()));
        }

        let pair = s.tokens.issue(&s.db, &user.id, s.deadline)?;
        let user = s
            .db
            .get_user_by_id(&user.id)?
            .ok_or_else(|| ApiError::Internal("Something went wrong while logging in".to_string()))?;
        Ok((user, pair))
    })
    .await?;

    info!("User {} logged in", user.id);
    let jar = with_token_cookies(jar, &pair);
    Ok((
        jar,
        ApiResponse::ok(
            LoginResponse {
                user: user.into(),
                access_token: pair.access_token,
                refresh_token: pair.refresh_token,
            },
            "User logged in successfully",
        ),
    ))
}

/// POST /logout: revokes the stored refresh token and clears both cookies.
pub async fn logout(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    jar: CookieJar,
) -> Result<(CookieJar, ApiResponse<Empty>), ApiError> {
    let user_id = user.id.to_string();
    run_blocking(&state, move |s| s.tokens.invalidate(&s.db, &user_id, s.deadline)).await?;

    let jar = jar
        .add(expired_cookie(ACCESS_TOKEN_COOKIE))
        .add(expired_cookie(REFRESH_TOKEN_COOKIE));
    Ok((jar, ApiResponse::ok(Empty::default(), "User logged out")))
}

/// POST /refresh-token: exchanges the refresh token from the
/// `refreshToken` cookie, or a JSON body `{"refreshToken": ...}`, for a new
/// pair.
pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, ApiResponse<TokenPairResponse>), ApiError> {
    let from_cookie = non_blank(jar.get(REFRESH_TOKEN_COOKIE).map(|c| c.value().to_string()));
    let presented = match from_cookie {
        Some(token) => Some(token),
        None if body.is_empty() => None,
        None => serde_json::from_slice::<RefreshTokenRequest>(&body)
            .ok()
            .and_then(|r| non_blank(r.refresh_token)),
    }
    .ok_or_else(|| ApiError::Unauthorized("Unauthorized request".to_string()))?;

    let pair = run_blocking(&state, move |s| s.tokens.rotate(&s.db, &presented, s.deadline)).await?;

    let jar = with_token_cookies(jar, &pair);
    Ok((
        jar,
        ApiResponse::ok(
            TokenPairResponse {
                access_token: pair.access_token,
                refresh_token: pair.refresh_token,
            },
            "Access token refreshed",
        ),
    ))
}
