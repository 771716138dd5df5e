use axum::{
    Router, middleware,
    routing::{get, patch, post},
};

use crate::state::AppState;
use crate::{account, auth, channel, health, middleware::require_auth};

/// Full HTTP surface. User routes live under `/api/v1/users`; everything
/// except register, login and refresh-token needs a valid access token.
pub fn router(state: AppState) -> Router {
    let public_routes: Router<AppState> = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh-token", post(auth::refresh_token));

    let protected_routes: Router<AppState> = Router::new()
        .route("/logout", post(auth::logout))
        .route(
            "/change-password",
            post(account::change_password).patch(account::change_password),
        )
        .route("/current-user", get(account::current_user))
        .route("/update-account", patch(account::update_account))
        .route("/avatar", patch(account::update_avatar))
        .route("/cover-image", patch(account::update_cover_image))
        .route("/channel/{username}", get(channel::get_channel_profile))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/api/v1/healthcheck", get(health::healthcheck))
        .nest("/api/v1/users", public_routes.merge(protected_routes))
        .fallback(health::not_found)
        .with_state(state)
}
