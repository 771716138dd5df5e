use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use tracing::warn;

use vidtube_types::models::User;

use crate::error::ApiError;
use crate::state::{AppState, run_blocking};

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// The authenticated caller, resolved once per request by [`require_auth`]
/// and handed to handlers through `Extension<CurrentUser>`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Accepts the access token from the `accessToken` cookie or an
/// `Authorization: Bearer` header, verifies it and loads the user it names.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = jar
        .get(ACCESS_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| {
            req.headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| t.trim().to_string())
        })
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Unauthorized request".to_string()))?;

    let claims = state.tokens.verify_access(&token)?;

    let user_id = claims.sub.to_string();
    let user = run_blocking(&state, move |s| Ok(s.db.get_user_by_id(&user_id)?))
        .await?
        .ok_or_else(|| {
            warn!("Access token for unknown user {}", claims.sub);
            ApiError::Unauthorized("Invalid Access Token".to_string())
        })?;

    req.extensions_mut().insert(CurrentUser(user.into()));
    Ok(next.run(req).await)
}
