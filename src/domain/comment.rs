use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    /// Another comment on the same post; None for top-level comments.
    pub parent_id: Option<Uuid>,
    pub creator_id: Uuid,
    /// Display name of the creating user, joined at read time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_name: Option<String>,
    pub text: String,
    pub is_blocked: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Per-day counts of blocked vs. unblocked comments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyCommentStats {
    pub date: Date,
    pub blocked_count: i64,
    pub unblocked_count: i64,
}
