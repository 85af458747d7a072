use std::collections::BTreeMap;

use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::Date;
use uuid::Uuid;

use crate::app::classifier::{self, Screened};
use crate::domain::comment::{Comment, DailyCommentStats};
use crate::infra::db::Db;

/// Outcome of comment creation. Missing referents are rejected before
/// any row is written; flagged text is written and then rejected.
#[derive(Debug)]
pub enum CreateCommentOutcome {
    Screened(Screened<Comment>),
    PostNotFound,
    ParentNotFound,
}

#[derive(Clone)]
pub struct CommentService {
    db: Db,
}

impl CommentService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create_comment(
        &self,
        creator_id: Uuid,
        post_id: Uuid,
        parent_id: Option<Uuid>,
        text: String,
    ) -> Result<CreateCommentOutcome> {
        let post_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)")
            .bind(post_id)
            .fetch_one(self.db.pool())
            .await?;
        if !post_exists {
            return Ok(CreateCommentOutcome::PostNotFound);
        }

        // A parent must be a comment on the same post.
        if let Some(parent_id) = parent_id {
            let parent_ok: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM comments WHERE id = $1 AND post_id = $2)",
            )
            .bind(parent_id)
            .bind(post_id)
            .fetch_one(self.db.pool())
            .await?;
            if !parent_ok {
                return Ok(CreateCommentOutcome::ParentNotFound);
            }
        }

        let flagged = classifier::contains_disallowed(&text);

        let row = sqlx::query(
            "WITH inserted_comment AS ( \
                INSERT INTO comments (creator_id, post_id, parent_id, text, is_blocked) \
                VALUES ($1, $2, $3, $4, $5) \
                RETURNING id, creator_id, post_id, parent_id, text, is_blocked, \
                          created_at, updated_at \
             ) \
             SELECT c.*, u.name AS creator_name \
             FROM inserted_comment c \
             JOIN users u ON c.creator_id = u.id",
        )
        .bind(creator_id)
        .bind(post_id)
        .bind(parent_id)
        .bind(&text)
        .bind(flagged)
        .fetch_one(self.db.pool())
        .await?;

        let comment = comment_from_row(&row);
        let screened = if flagged {
            Screened::Flagged(comment)
        } else {
            Screened::Clean(comment)
        };
        Ok(CreateCommentOutcome::Screened(screened))
    }

    /// Ownership is enforced by the lookup predicate alone; a missing row
    /// and a row created by someone else are indistinguishable here.
    pub async fn update_comment(
        &self,
        comment_id: Uuid,
        creator_id: Uuid,
        text: String,
    ) -> Result<Option<Screened<Comment>>> {
        let flagged = classifier::contains_disallowed(&text);

        let row = sqlx::query(
            "WITH updated_comment AS ( \
                UPDATE comments \
                SET text = $3, is_blocked = $4, updated_at = now() \
                WHERE id = $1 AND creator_id = $2 \
                RETURNING id, creator_id, post_id, parent_id, text, is_blocked, \
                          created_at, updated_at \
             ) \
             SELECT c.*, u.name AS creator_name \
             FROM updated_comment c \
             JOIN users u ON c.creator_id = u.id",
        )
        .bind(comment_id)
        .bind(creator_id)
        .bind(&text)
        .bind(flagged)
        .fetch_optional(self.db.pool())
        .await?;

        let comment = match row {
            Some(row) => comment_from_row(&row),
            None => return Ok(None),
        };

        Ok(Some(if flagged {
            Screened::Flagged(comment)
        } else {
            Screened::Clean(comment)
        }))
    }

    /// Idempotent: deleting a missing or foreign row is a no-op. Replies
    /// cascade through the parent_id foreign key.
    pub async fn delete_comment(&self, comment_id: Uuid, creator_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM comments WHERE id = $1 AND creator_id = $2")
            .bind(comment_id)
            .bind(creator_id)
            .execute(self.db.pool())
            .await?;

        Ok(())
    }

    pub async fn get_comment(&self, comment_id: Uuid) -> Result<Option<Comment>> {
        let row = sqlx::query(
            "SELECT c.id, c.creator_id, c.post_id, c.parent_id, c.text, c.is_blocked, \
                    c.created_at, c.updated_at, u.name AS creator_name \
             FROM comments c \
             JOIN users u ON c.creator_id = u.id \
             JOIN posts p ON c.post_id = p.id \
             WHERE c.id = $1",
        )
        .bind(comment_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(comment_from_row))
    }

    /// Per-day blocked/unblocked counts over comments created in
    /// `[date_from, date_to]` inclusive. Dates with no comments are
    /// omitted; output is ascending by date.
    pub async fn daily_breakdown(
        &self,
        date_from: Date,
        date_to: Date,
    ) -> Result<Vec<DailyCommentStats>> {
        let rows = sqlx::query(
            "SELECT (created_at AT TIME ZONE 'UTC')::date AS day, is_blocked, COUNT(*) AS count \
             FROM comments \
             WHERE (created_at AT TIME ZONE 'UTC')::date BETWEEN $1 AND $2 \
             GROUP BY day, is_blocked \
             ORDER BY day",
        )
        .bind(date_from)
        .bind(date_to)
        .fetch_all(self.db.pool())
        .await?;

        let mut stats: BTreeMap<Date, (i64, i64)> = BTreeMap::new();
        for row in rows {
            let day: Date = row.get("day");
            let is_blocked: bool = row.get("is_blocked");
            let count: i64 = row.get("count");
            let entry = stats.entry(day).or_default();
            if is_blocked {
                entry.0 += count;
            } else {
                entry.1 += count;
            }
        }

        Ok(stats
            .into_iter()
            .map(|(date, (blocked_count, unblocked_count))| DailyCommentStats {
                date,
                blocked_count,
                unblocked_count,
            })
            .collect())
    }
}

fn comment_from_row(row: &PgRow) -> Comment {
    Comment {
        id: row.get("id"),
        post_id: row.get("post_id"),
        parent_id: row.get("parent_id"),
        creator_id: row.get("creator_id"),
        creator_name: row.get("creator_name"),
        text: row.get("text"),
        is_blocked: row.get("is_blocked"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
