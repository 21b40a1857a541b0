/// Ticket comments
///
/// ```sql
/// CREATE TABLE comments (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     ticket_id UUID NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
///     author_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     content TEXT NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::user::UserSummary;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Comment joined with its author
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommentRow {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author_id: Uuid,
    pub author_email: String,
    pub author_full_name: String,
}

/// Comment as returned by the API, author embedded
#[derive(Debug, Clone, Serialize)]
pub struct CommentWithAuthor {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub content: String,
    pub author: UserSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CommentRow> for CommentWithAuthor {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            ticket_id: row.ticket_id,
            content: row.content,
            author: UserSummary {
                id: row.author_id,
                email: row.author_email,
                full_name: row.author_full_name,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl Comment {
    pub async fn create(
        pool: &PgPool,
        ticket_id: Uuid,
        author_id: Uuid,
        content: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (ticket_id, author_id, content)
            VALUES ($1, $2, $3)
            RETURNING id, ticket_id, author_id, content, created_at, updated_at
            "#,
        )
        .bind(ticket_id)
        .bind(author_id)
        .bind(content.trim())
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, ticket_id, author_id, content, created_at, updated_at
            FROM comments WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Comments on a ticket with their authors, newest first
    pub async fn list_for_ticket(
        pool: &PgPool,
        ticket_id: Uuid,
    ) -> Result<Vec<CommentWithAuthor>, sqlx::Error> {
        let rows = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT c.id, c.ticket_id, c.content, c.created_at, c.updated_at,
                   u.id AS author_id, u.email AS author_email, u.full_name AS author_full_name
            FROM comments c
            JOIN users u ON u.id = c.author_id
            WHERE c.ticket_id = $1
            ORDER BY c.created_at DESC
            "#,
        )
        .bind(ticket_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(CommentWithAuthor::from).collect())
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Users to notify about a new comment
///
/// Ticket creator first, then assignees, each at most once, never the author.
pub fn comment_recipients(author_id: Uuid, creator_id: Uuid, assignees: &[Uuid]) -> Vec<Uuid> {
    let mut recipients: Vec<Uuid> = Vec::with_capacity(assignees.len() + 1);

    for user_id in std::iter::once(creator_id).chain(assignees.iter().copied()) {
        if user_id != author_id && !recipients.contains(&user_id) {
            recipients.push(user_id);
        }
    }

    recipients
}
