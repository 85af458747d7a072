use axum::{routing::delete, routing::get, routing::post, routing::put, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn auth() -> Router<AppState> {
    Router::new()
        .route("/auth/sign-up", post(handlers::sign_up))
        .route("/auth/access-token", post(handlers::login))
        .route("/auth/refresh-token", post(handlers::refresh_token))
}

pub fn users() -> Router<AppState> {
    Router::new().route("/user/me", get(handlers::get_current_user))
}

pub fn posts() -> Router<AppState> {
    Router::new()
        .route("/post", post(handlers::create_post))
        .route("/post", get(handlers::list_posts))
        .route("/post/:id", get(handlers::get_post))
        .route("/post/:id", put(handlers::update_post))
        .route("/post/:id", delete(handlers::delete_post))
}

pub fn comments() -> Router<AppState> {
    Router::new()
        .route("/comment", post(handlers::create_comment))
        .route(
            "/comment/daily-breakdown",
            get(handlers::comments_daily_breakdown),
        )
        .route("/comment/:id", get(handlers::get_comment))
        .route("/comment/:id", put(handlers::update_comment))
        .route("/comment/:id", delete(handlers::delete_comment))
}
