/// User model and database operations
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email TEXT NOT NULL UNIQUE,
///     password_hash TEXT NOT NULL,
///     full_name TEXT NOT NULL,
///     email_notifications BOOLEAN NOT NULL DEFAULT TRUE,
///     new_comments BOOLEAN NOT NULL DEFAULT TRUE,
///     ticket_assignment BOOLEAN NOT NULL DEFAULT TRUE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// Emails are normalized with [`normalize_email`] before every write and
/// lookup, so the unique constraint is effectively case-insensitive.
///
/// # Example
///
/// ```no_run
/// use focusforge_shared::models::user::{User, CreateUser};
/// use focusforge_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let user = User::create(&pool, CreateUser {
///     email: "Dana@Example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     full_name: "Dana Scully".to_string(),
/// }).await?;
///
/// assert_eq!(user.email, "dana@example.com");
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Trims and lower-cases an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Splits a display name into first and last name on the first whitespace run
///
/// ```
/// use focusforge_shared::models::user::split_full_name;
///
/// assert_eq!(split_full_name("Ada King Lovelace"), ("Ada".to_string(), "King Lovelace".to_string()));
/// assert_eq!(split_full_name("  Cher "), ("Cher".to_string(), String::new()));
/// ```
pub fn split_full_name(full_name: &str) -> (String, String) {
    let mut parts = full_name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

/// User account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    /// Lower-cased, unique
    pub email: String,

    /// Argon2id PHC string, never serialized
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    pub full_name: String,

    pub email_notifications: bool,
    pub new_comments: bool,
    pub ticket_assignment: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public identity embedded in project, ticket and comment responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
}

/// Per-user notification switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationPreferences {
    pub email_notifications: bool,
    pub new_comments: bool,
    pub ticket_assignment: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            email_notifications: true,
            new_comments: true,
            ticket_assignment: true,
        }
    }
}

/// Input for creating a new user
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
}

const USER_COLUMNS: &str = "id, email, password_hash, full_name, email_notifications, \
                            new_comments, ticket_assignment, created_at, updated_at";

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            email: self.email.clone(),
            full_name: self.full_name.clone(),
        }
    }

    pub fn preferences(&self) -> NotificationPreferences {
        NotificationPreferences {
            email_notifications: self.email_notifications,
            new_comments: self.new_comments,
            ticket_assignment: self.ticket_assignment,
        }
    }

    /// Creates a new user
    ///
    /// # Errors
    ///
    /// Returns a unique-violation database error when the email is taken.
    /// Inserts a user; accepts a pool or an open transaction
    pub async fn create<'e, E>(executor: E, data: CreateUser) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash, full_name)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(normalize_email(&data.email))
        .bind(data.password_hash)
        .bind(data.full_name.trim())
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(normalize_email(email))
            .fetch_optional(pool)
            .await
    }

    pub async fn email_exists(pool: &PgPool, email: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
            .bind(normalize_email(email))
            .fetch_one(pool)
            .await
    }

    /// Returns the subset of `ids` that belong to existing users
    pub async fn existing_ids(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar("SELECT id FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// Public summaries for a set of users in one query
    pub async fn summaries_for(
        pool: &PgPool,
        ids: &[Uuid],
    ) -> Result<Vec<UserSummary>, sqlx::Error> {
        sqlx::query_as::<_, UserSummary>(
            "SELECT id, email, full_name FROM users WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(pool)
        .await
    }

    /// Updates the display name
    pub async fn update_profile(
        pool: &PgPool,
        id: Uuid,
        full_name: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET full_name = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(full_name.trim())
        .fetch_optional(pool)
        .await
    }

    pub async fn update_password(
        pool: &PgPool,
        id: Uuid,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users SET password_hash = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_preferences(
        pool: &PgPool,
        id: Uuid,
    ) -> Result<Option<NotificationPreferences>, sqlx::Error> {
        sqlx::query_as::<_, NotificationPreferences>(
            r#"
            SELECT email_notifications, new_comments, ticket_assignment
            FROM users WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn update_preferences(
        pool: &PgPool,
        id: Uuid,
        prefs: NotificationPreferences,
    ) -> Result<Option<NotificationPreferences>, sqlx::Error> {
        sqlx::query_as::<_, NotificationPreferences>(
            r#"
            UPDATE users
            SET email_notifications = $2, new_comments = $3, ticket_assignment = $4,
                updated_at = NOW()
            WHERE id = $1
            RETURNING email_notifications, new_comments, ticket_assignment
            "#,
        )
        .bind(id)
        .bind(prefs.email_notifications)
        .bind(prefs.new_comments)
        .bind(prefs.ticket_assignment)
        .fetch_optional(pool)
        .await
    }
}
