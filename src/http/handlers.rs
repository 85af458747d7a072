use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::app::auth::{AuthService, LoginOutcome, TokenPair};
use crate::app::classifier::Screened;
use crate::app::comments::{CommentService, CreateCommentOutcome};
use crate::app::posts::PostService;
use crate::domain::comment::{Comment, DailyCommentStats};
use crate::domain::post::{Post, MAX_TEXT_LENGTH};
use crate::domain::user::User;
use crate::http::{AppError, AuthUser, FieldError};
use crate::AppState;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
pub struct PaginationQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

fn parse_cursor(cursor: Option<String>) -> Result<Option<(OffsetDateTime, Uuid)>, AppError> {
    let Some(cursor) = cursor else {
        return Ok(None);
    };

    let mut parts = cursor.splitn(2, '/');
    let timestamp = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;
    let id = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;

    let timestamp = OffsetDateTime::parse(timestamp, &Rfc3339)
        .map_err(|_| AppError::bad_request("invalid cursor"))?;
    let id = Uuid::parse_str(id).map_err(|_| AppError::bad_request("invalid cursor"))?;

    Ok(Some((timestamp, id)))
}

fn encode_cursor(cursor: Option<(OffsetDateTime, Uuid)>) -> Option<String> {
    let (timestamp, id) = cursor?;
    let timestamp = timestamp.format(&Rfc3339).ok()?;
    Some(format!("{}/{}", timestamp, id))
}

fn validate_text(text: &str) -> Result<(), AppError> {
    if text.trim().is_empty() {
        return Err(AppError::validation(vec![FieldError::new(
            "text",
            "text is required",
        )]));
    }
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(AppError::validation(vec![FieldError::new(
            "text",
            format!("text must be at most {} characters", MAX_TEXT_LENGTH),
        )]));
    }
    Ok(())
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.db.ping().await.is_ok() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse { status })
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

fn auth_service(state: &AppState) -> AuthService {
    AuthService::new(
        state.db.clone(),
        state.paseto_access_key,
        state.paseto_refresh_key,
        state.access_ttl_minutes,
        state.refresh_ttl_days,
    )
}

#[derive(Deserialize)]
pub struct SignUpRequest {
    pub name: Option<String>,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Serialize)]
pub struct AuthTokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub access_expires_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub refresh_expires_at: OffsetDateTime,
}

impl From<TokenPair> for AuthTokenResponse {
    fn from(tokens: TokenPair) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            access_expires_at: tokens.access_expires_at,
            refresh_expires_at: tokens.refresh_expires_at,
        }
    }
}

#[derive(Serialize)]
pub struct SignUpResponse {
    pub user: User,
    #[serde(flatten)]
    pub tokens: AuthTokenResponse,
}

pub async fn sign_up(
    State(state): State<AppState>,
    Json(payload): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<SignUpResponse>), AppError> {
    const MIN_PASSWORD_LEN: usize = 8;
    const MAX_PASSWORD_LEN: usize = 128;
    const MAX_NAME_LEN: usize = 40;

    let mut fields = Vec::new();
    if payload.email.trim().is_empty() || !payload.email.contains('@') {
        fields.push(FieldError::new("email", "a valid email is required"));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        fields.push(FieldError::new(
            "password",
            format!("password must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    if payload.password.len() > MAX_PASSWORD_LEN {
        fields.push(FieldError::new(
            "password",
            format!("password must be at most {} characters", MAX_PASSWORD_LEN),
        ));
    }
    if payload.password != payload.password_confirm {
        fields.push(FieldError::new(
            "password_confirm",
            "password confirmation does not match",
        ));
    }
    if let Some(name) = &payload.name {
        if name.chars().count() > MAX_NAME_LEN {
            fields.push(FieldError::new(
                "name",
                format!("name must be at most {} characters", MAX_NAME_LEN),
            ));
        }
    }
    if !fields.is_empty() {
        return Err(AppError::validation(fields));
    }

    let email = payload.email.trim().to_string();
    let created = auth_service(&state)
        .sign_up(payload.name, email.clone(), payload.password)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to sign up");
            AppError::internal("failed to sign up")
        })?;

    match created {
        Some((user, tokens)) => Ok((
            StatusCode::CREATED,
            Json(SignUpResponse {
                user,
                tokens: tokens.into(),
            }),
        )),
        None => Err(AppError::conflict(format!(
            "user with email {} already exists",
            email
        ))),
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthTokenResponse>, AppError> {
    if payload.email.trim().is_empty() || payload.password.trim().is_empty() {
        return Err(AppError::validation(vec![FieldError::new(
            "email",
            "email and password are required",
        )]));
    }

    let outcome = auth_service(&state)
        .login(&payload.email, &payload.password)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to login");
            AppError::internal("failed to login")
        })?;

    match outcome {
        LoginOutcome::Tokens(tokens) => Ok(Json(tokens.into())),
        LoginOutcome::UnknownUser => Err(AppError::not_found("user not found")),
        LoginOutcome::InvalidPassword => Err(AppError::forbidden("invalid credentials")),
    }
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthTokenResponse>, AppError> {
    if payload.refresh_token.trim().is_empty() {
        return Err(AppError::validation(vec![FieldError::new(
            "refresh_token",
            "refresh_token is required",
        )]));
    }

    let tokens = auth_service(&state)
        .refresh(&payload.refresh_token)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to refresh token");
            AppError::internal("failed to refresh token")
        })?;

    match tokens {
        Some(tokens) => Ok(Json(tokens.into())),
        None => Err(AppError::unauthorized("invalid refresh token")),
    }
}

pub async fn get_current_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<User>, AppError> {
    let user = auth_service(&state)
        .get_current_user(auth_user.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to load current user");
            AppError::internal("failed to load current user")
        })?;

    match user {
        Some(user) => Ok(Json(user)),
        None => Err(AppError::unauthorized("invalid token")),
    }
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct PostBody {
    pub text: String,
}

pub async fn create_post(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<PostBody>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    validate_text(&payload.text)?;

    let service = PostService::new(state.db.clone());
    let screened = service
        .create_post(auth_user.user_id, payload.text)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to create post");
            AppError::internal("failed to create post")
        })?;

    match screened {
        Screened::Clean(post) => Ok((StatusCode::CREATED, Json(post))),
        // The blocked row is kept for moderation audit; the request fails.
        Screened::Flagged(_) => Err(AppError::bad_request(
            "post contains inappropriate language",
        )),
    }
}

pub async fn update_post(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
    Json(payload): Json<PostBody>,
) -> Result<Json<Post>, AppError> {
    validate_text(&payload.text)?;

    let service = PostService::new(state.db.clone());
    let updated = service
        .update_post(post_id, auth_user.user_id, payload.text)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to update post");
            AppError::internal("failed to update post")
        })?;

    match updated {
        Some(Screened::Clean(post)) => Ok(Json(post)),
        Some(Screened::Flagged(_)) => Err(AppError::bad_request(
            "post contains inappropriate language",
        )),
        // Missing and foreign rows are deliberately indistinguishable.
        None => Err(AppError::bad_request("post not found or you can't edit it")),
    }
}

pub async fn delete_post(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let service = PostService::new(state.db.clone());
    service
        .delete_post(post_id, auth_user.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to delete post");
            AppError::internal("failed to delete post")
        })?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_post(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Post>, AppError> {
    let service = PostService::new(state.db.clone());
    let post = service.get_post(post_id).await.map_err(|err| {
        tracing::error!(error = ?err, "failed to load post");
        AppError::internal("failed to load post")
    })?;

    match post {
        Some(post) => Ok(Json(post)),
        None => Err(AppError::not_found("post not found")),
    }
}

pub async fn list_posts(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<Post>>, AppError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let cursor = parse_cursor(query.cursor)?;

    let service = PostService::new(state.db.clone());
    let posts = service.list_posts(cursor, limit).await.map_err(|err| {
        tracing::error!(error = ?err, "failed to list posts");
        AppError::internal("failed to list posts")
    })?;

    let next_cursor = if posts.len() as i64 == limit {
        encode_cursor(posts.last().map(|post| (post.created_at, post.id)))
    } else {
        None
    };

    Ok(Json(ListResponse {
        items: posts,
        next_cursor,
    }))
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub text: String,
    pub post_id: Uuid,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct UpdateCommentRequest {
    pub text: String,
}

pub async fn create_comment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    validate_text(&payload.text)?;

    let service = CommentService::new(state.db.clone());
    let outcome = service
        .create_comment(
            auth_user.user_id,
            payload.post_id,
            payload.parent_id,
            payload.text,
        )
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to create comment");
            AppError::internal("failed to create comment")
        })?;

    match outcome {
        CreateCommentOutcome::Screened(Screened::Clean(comment)) => {
            Ok((StatusCode::CREATED, Json(comment)))
        }
        // The blocked row is kept for moderation audit; the request fails.
        CreateCommentOutcome::Screened(Screened::Flagged(_)) => Err(AppError::bad_request(
            "comment contains inappropriate language",
        )),
        CreateCommentOutcome::PostNotFound => Err(AppError::not_found("post not found")),
        CreateCommentOutcome::ParentNotFound => {
            Err(AppError::not_found("parent comment not found"))
        }
    }
}

pub async fn update_comment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(comment_id): Path<Uuid>,
    Json(payload): Json<UpdateCommentRequest>,
) -> Result<Json<Comment>, AppError> {
    validate_text(&payload.text)?;

    let service = CommentService::new(state.db.clone());
    let updated = service
        .update_comment(comment_id, auth_user.user_id, payload.text)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to update comment");
            AppError::internal("failed to update comment")
        })?;

    match updated {
        Some(Screened::Clean(comment)) => Ok(Json(comment)),
        Some(Screened::Flagged(_)) => Err(AppError::bad_request(
            "comment contains inappropriate language",
        )),
        // Missing and foreign rows are deliberately indistinguishable.
        None => Err(AppError::bad_request(
            "comment not found or you can't edit it",
        )),
    }
}

pub async fn delete_comment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(comment_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let service = CommentService::new(state.db.clone());
    service
        .delete_comment(comment_id, auth_user.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to delete comment");
            AppError::internal("failed to delete comment")
        })?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_comment(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(comment_id): Path<Uuid>,
) -> Result<Json<Comment>, AppError> {
    let service = CommentService::new(state.db.clone());
    let comment = service.get_comment(comment_id).await.map_err(|err| {
        tracing::error!(error = ?err, "failed to load comment");
        AppError::internal("failed to load comment")
    })?;

    match comment {
        Some(comment) => Ok(Json(comment)),
        None => Err(AppError::not_found("comment not found")),
    }
}

#[derive(Deserialize)]
pub struct BreakdownQuery {
    pub date_from: String,
    pub date_to: String,
}

#[derive(Serialize)]
pub struct DailyBreakdownResponse {
    pub breakdown: Vec<DailyCommentStats>,
}

pub async fn comments_daily_breakdown(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Query(query): Query<BreakdownQuery>,
) -> Result<Json<DailyBreakdownResponse>, AppError> {
    let format = format_description!("[year]-[month]-[day]");
    let date_from = Date::parse(&query.date_from, &format)
        .map_err(|_| AppError::bad_request("invalid date_from"))?;
    let date_to = Date::parse(&query.date_to, &format)
        .map_err(|_| AppError::bad_request("invalid date_to"))?;

    let service = CommentService::new(state.db.clone());
    let breakdown = service
        .daily_breakdown(date_from, date_to)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to compute daily breakdown");
            AppError::internal("failed to compute daily breakdown")
        })?;

    Ok(Json(DailyBreakdownResponse { breakdown }))
}
