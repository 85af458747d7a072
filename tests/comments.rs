//! Comment lifecycle and daily breakdown tests

mod common;

use axum::http::StatusCode;
use common::app;
use serde_json::json;
use time::macros::datetime;
use uuid::Uuid;

// ===========================================================================
// Creation
// ===========================================================================

#[tokio::test]
async fn create_comment_on_post() {
    let app = app().await;
    let user = app.create_user("cmt_create").await;
    let post_id = app.create_post_for_user(user.id, "a post").await;

    let resp = app
        .post_json(
            "/comment",
            json!({ "text": "nice post", "post_id": post_id, "parent_id": null }),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::CREATED);
    let body = resp.json();
    assert_eq!(body["post_id"].as_str().unwrap(), post_id.to_string());
    assert_eq!(body["creator_id"].as_str().unwrap(), user.id.to_string());
    assert!(body["parent_id"].is_null());
    assert_eq!(body["is_blocked"].as_bool().unwrap(), false);
}

#[tokio::test]
async fn create_reply_persists_parent() {
    let app = app().await;
    let author = app.create_user("cmt_reply_author").await;
    let replier = app.create_user("cmt_replier").await;
    let post_id = app.create_post_for_user(author.id, "a post").await;
    let parent_id = app
        .create_comment_for_post(author.id, post_id, "top level")
        .await;

    let resp = app
        .post_json(
            "/comment",
            json!({ "text": "a reply", "post_id": post_id, "parent_id": parent_id }),
            Some(&replier.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::CREATED);
    let body = resp.json();
    assert_eq!(body["parent_id"].as_str().unwrap(), parent_id.to_string());
}

#[tokio::test]
async fn create_comment_on_nonexistent_post() {
    let app = app().await;
    let user = app.create_user("cmt_nopost").await;

    let resp = app
        .post_json(
            "/comment",
            json!({ "text": "hello", "post_id": Uuid::new_v4(), "parent_id": null }),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.error_message(), "post not found");

    // Rejected before any row is written.
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE creator_id = $1")
        .bind(user.id)
        .fetch_one(app.state.db.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn create_reply_with_parent_from_another_post() {
    let app = app().await;
    let user = app.create_user("cmt_crosspost").await;
    let post_a = app.create_post_for_user(user.id, "post a").await;
    let post_b = app.create_post_for_user(user.id, "post b").await;
    let parent_on_a = app.create_comment_for_post(user.id, post_a, "on a").await;

    // A parent must belong to the same post.
    let resp = app
        .post_json(
            "/comment",
            json!({ "text": "mismatched", "post_id": post_b, "parent_id": parent_on_a }),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.error_message(), "parent comment not found");
}

#[tokio::test]
async fn create_comment_flagged_text_is_rejected_but_persisted() {
    let app = app().await;
    let user = app.create_user("cmt_flagged").await;
    let post_id = app.create_post_for_user(user.id, "a post").await;

    let resp = app
        .post_json(
            "/comment",
            json!({ "text": "some bitch", "post_id": post_id, "parent_id": null }),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.error_message(),
        "comment contains inappropriate language"
    );

    let (text, is_blocked): (String, bool) =
        sqlx::query_as("SELECT text, is_blocked FROM comments WHERE post_id = $1")
            .bind(post_id)
            .fetch_one(app.state.db.pool())
            .await
            .unwrap();
    assert_eq!(text, "some bitch");
    assert!(is_blocked);
}

#[tokio::test]
async fn create_comment_missing_text() {
    let app = app().await;
    let user = app.create_user("cmt_notext").await;
    let post_id = app.create_post_for_user(user.id, "a post").await;

    let resp = app
        .post_json(
            "/comment",
            json!({ "text": "", "post_id": post_id }),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
}

// ===========================================================================
// Update / delete / read
// ===========================================================================

#[tokio::test]
async fn update_comment_by_creator() {
    let app = app().await;
    let user = app.create_user("cmt_update").await;
    let post_id = app.create_post_for_user(user.id, "a post").await;
    let comment_id = app.create_comment_for_post(user.id, post_id, "before").await;

    let resp = app
        .put_json(
            &format!("/comment/{}", comment_id),
            json!({ "text": "after" }),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["text"].as_str().unwrap(), "after");
}

#[tokio::test]
async fn update_comment_by_non_creator_matches_nonexistent() {
    let app = app().await;
    let creator = app.create_user("cmt_upd_creator").await;
    let intruder = app.create_user("cmt_upd_intruder").await;
    let post_id = app.create_post_for_user(creator.id, "a post").await;
    let comment_id = app
        .create_comment_for_post(creator.id, post_id, "mine")
        .await;

    let foreign = app
        .put_json(
            &format!("/comment/{}", comment_id),
            json!({ "text": "hijacked" }),
            Some(&intruder.access_token),
        )
        .await;
    let missing = app
        .put_json(
            &format!("/comment/{}", Uuid::new_v4()),
            json!({ "text": "hijacked" }),
            Some(&intruder.access_token),
        )
        .await;

    assert_eq!(foreign.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(foreign.error_message(), missing.error_message());
    assert_eq!(
        foreign.error_message(),
        "comment not found or you can't edit it"
    );
}

#[tokio::test]
async fn update_comment_flagged_text_saved_then_rejected() {
    let app = app().await;
    let user = app.create_user("cmt_upd_flag").await;
    let post_id = app.create_post_for_user(user.id, "a post").await;
    let comment_id = app.create_comment_for_post(user.id, post_id, "fine").await;

    let resp = app
        .put_json(
            &format!("/comment/{}", comment_id),
            json!({ "text": "some shit" }),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let (text, is_blocked): (String, bool) =
        sqlx::query_as("SELECT text, is_blocked FROM comments WHERE id = $1")
            .bind(comment_id)
            .fetch_one(app.state.db.pool())
            .await
            .unwrap();
    assert_eq!(text, "some shit");
    assert!(is_blocked);
}

#[tokio::test]
async fn delete_comment_is_idempotent() {
    let app = app().await;
    let user = app.create_user("cmt_delete").await;
    let post_id = app.create_post_for_user(user.id, "a post").await;
    let comment_id = app
        .create_comment_for_post(user.id, post_id, "to delete")
        .await;

    let first = app
        .delete(&format!("/comment/{}", comment_id), Some(&user.access_token))
        .await;
    let second = app
        .delete(&format!("/comment/{}", comment_id), Some(&user.access_token))
        .await;

    assert_eq!(first.status, StatusCode::NO_CONTENT);
    assert_eq!(second.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn delete_parent_cascades_to_replies() {
    let app = app().await;
    let user = app.create_user("cmt_cascade").await;
    let post_id = app.create_post_for_user(user.id, "a post").await;
    let parent_id = app.create_comment_for_post(user.id, post_id, "parent").await;

    let reply_id: Uuid = sqlx::query_scalar(
        "INSERT INTO comments (creator_id, post_id, parent_id, text, is_blocked) \
         VALUES ($1, $2, $3, 'reply', false) RETURNING id",
    )
    .bind(user.id)
    .bind(post_id)
    .bind(parent_id)
    .fetch_one(app.state.db.pool())
    .await
    .unwrap();

    let resp = app
        .delete(&format!("/comment/{}", parent_id), Some(&user.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let reply_exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM comments WHERE id = $1)")
            .bind(reply_id)
            .fetch_one(app.state.db.pool())
            .await
            .unwrap();
    assert!(!reply_exists);
}

#[tokio::test]
async fn get_comment_loads_creator() {
    let app = app().await;
    let user = app.create_user("cmt_get").await;
    let post_id = app.create_post_for_user(user.id, "a post").await;
    let comment_id = app
        .create_comment_for_post(user.id, post_id, "readable")
        .await;

    let resp = app
        .get(&format!("/comment/{}", comment_id), Some(&user.access_token))
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["creator_name"].as_str().unwrap(), user.name);
    assert_eq!(body["post_id"].as_str().unwrap(), post_id.to_string());
}

#[tokio::test]
async fn get_nonexistent_comment() {
    let app = app().await;
    let user = app.create_user("cmt_get_missing").await;

    let resp = app
        .get(
            &format!("/comment/{}", Uuid::new_v4()),
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.error_message(), "comment not found");
}

// ===========================================================================
// Daily breakdown
// ===========================================================================

#[tokio::test]
async fn daily_breakdown_counts_by_date_and_flag() {
    let app = app().await;
    let user = app.create_user("cmt_breakdown").await;
    let post_id = app.create_post_for_user(user.id, "a post").await;

    // 2024-01-01: 2 clean + 1 blocked; 2024-01-03: 1 clean; 2024-01-02 empty
    app.create_comment_at(user.id, post_id, false, datetime!(2024-01-01 08:00 UTC))
        .await;
    app.create_comment_at(user.id, post_id, false, datetime!(2024-01-01 12:30 UTC))
        .await;
    app.create_comment_at(user.id, post_id, true, datetime!(2024-01-01 23:59 UTC))
        .await;
    app.create_comment_at(user.id, post_id, false, datetime!(2024-01-03 09:15 UTC))
        .await;
    // Outside the queried range
    app.create_comment_at(user.id, post_id, false, datetime!(2024-02-01 00:00 UTC))
        .await;

    let resp = app
        .get(
            "/comment/daily-breakdown?date_from=2024-01-01&date_to=2024-01-31",
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let breakdown = resp.json()["breakdown"].as_array().unwrap().clone();
    assert_eq!(breakdown.len(), 2);

    assert_eq!(breakdown[0]["date"].as_str().unwrap(), "2024-01-01");
    assert_eq!(breakdown[0]["blocked_count"].as_i64().unwrap(), 1);
    assert_eq!(breakdown[0]["unblocked_count"].as_i64().unwrap(), 2);

    assert_eq!(breakdown[1]["date"].as_str().unwrap(), "2024-01-03");
    assert_eq!(breakdown[1]["blocked_count"].as_i64().unwrap(), 0);
    assert_eq!(breakdown[1]["unblocked_count"].as_i64().unwrap(), 1);
}

#[tokio::test]
async fn daily_breakdown_rejects_malformed_dates() {
    let app = app().await;
    let user = app.create_user("cmt_breakdown_bad").await;

    let resp = app
        .get(
            "/comment/daily-breakdown?date_from=yesterday&date_to=2024-01-31",
            Some(&user.access_token),
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "invalid date_from");
}

#[tokio::test]
async fn daily_breakdown_requires_auth() {
    let app = app().await;

    let resp = app
        .get(
            "/comment/daily-breakdown?date_from=2024-01-01&date_to=2024-01-31",
            None,
        )
        .await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}
