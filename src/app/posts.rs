use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::classifier::{self, Screened};
use crate::domain::post::Post;
use crate::infra::db::Db;

#[derive(Clone)]
pub struct PostService {
    db: Db,
}

impl PostService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create_post(&self, owner_id: Uuid, text: String) -> Result<Screened<Post>> {
        let flagged = classifier::contains_disallowed(&text);

        let row = sqlx::query(
            "WITH inserted_post AS ( \
                INSERT INTO posts (owner_id, text, is_blocked) \
                VALUES ($1, $2, $3) \
                RETURNING id, owner_id, text, is_blocked, created_at, updated_at \
             ) \
             SELECT p.*, u.name AS owner_name \
             FROM inserted_post p \
             JOIN users u ON p.owner_id = u.id",
        )
        .bind(owner_id)
        .bind(&text)
        .bind(flagged)
        .fetch_one(self.db.pool())
        .await?;

        let post = post_from_row(&row);
        Ok(if flagged {
            Screened::Flagged(post)
        } else {
            Screened::Clean(post)
        })
    }

    /// Ownership is enforced by the lookup predicate alone; a missing row
    /// and a row owned by someone else are indistinguishable here.
    pub async fn update_post(
        &self,
        post_id: Uuid,
        owner_id: Uuid,
        text: String,
    ) -> Result<Option<Screened<Post>>> {
        let flagged = classifier::contains_disallowed(&text);

        let row = sqlx::query(
            "WITH updated_post AS ( \
                UPDATE posts \
                SET text = $3, is_blocked = $4, updated_at = now() \
                WHERE id = $1 AND owner_id = $2 \
                RETURNING id, owner_id, text, is_blocked, created_at, updated_at \
             ) \
             SELECT p.*, u.name AS owner_name \
             FROM updated_post p \
             JOIN users u ON p.owner_id = u.id",
        )
        .bind(post_id)
        .bind(owner_id)
        .bind(&text)
        .bind(flagged)
        .fetch_optional(self.db.pool())
        .await?;

        let post = match row {
            Some(row) => post_from_row(&row),
            None => return Ok(None),
        };

        Ok(Some(if flagged {
            Screened::Flagged(post)
        } else {
            Screened::Clean(post)
        }))
    }

    /// Idempotent: deleting a missing or foreign row is a no-op.
    pub async fn delete_post(&self, post_id: Uuid, owner_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM posts WHERE id = $1 AND owner_id = $2")
            .bind(post_id)
            .bind(owner_id)
            .execute(self.db.pool())
            .await?;

        Ok(())
    }

    pub async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>> {
        let row = sqlx::query(
            "SELECT p.id, p.owner_id, p.text, p.is_blocked, p.created_at, p.updated_at, \
                    u.name AS owner_name \
             FROM posts p \
             JOIN users u ON p.owner_id = u.id \
             WHERE p.id = $1",
        )
        .bind(post_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(post_from_row))
    }

    pub async fn list_posts(
        &self,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<Post>> {
        let rows = match cursor {
            Some((created_at, post_id)) => {
                sqlx::query(
                    "SELECT p.id, p.owner_id, p.text, p.is_blocked, p.created_at, p.updated_at, \
                            u.name AS owner_name \
                     FROM posts p \
                     JOIN users u ON p.owner_id = u.id \
                     WHERE (p.created_at < $1 OR (p.created_at = $1 AND p.id < $2)) \
                     ORDER BY p.created_at DESC, p.id DESC \
                     LIMIT $3",
                )
                .bind(created_at)
                .bind(post_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT p.id, p.owner_id, p.text, p.is_blocked, p.created_at, p.updated_at, \
                            u.name AS owner_name \
                     FROM posts p \
                     JOIN users u ON p.owner_id = u.id \
                     ORDER BY p.created_at DESC, p.id DESC \
                     LIMIT $1",
                )
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        Ok(rows.iter().map(post_from_row).collect())
    }
}

fn post_from_row(row: &PgRow) -> Post {
    Post {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        owner_name: row.get("owner_name"),
        text: row.get("text"),
        is_blocked: row.get("is_blocked"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
