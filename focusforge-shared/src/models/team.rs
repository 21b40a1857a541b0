/// Teams and their member contact cards
///
/// # Schema
///
/// ```sql
/// CREATE TYPE team_role AS ENUM ('admin', 'member');
///
/// CREATE TABLE teams (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name TEXT NOT NULL,
///     description TEXT,
///     created_by UUID REFERENCES users(id) ON DELETE SET NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE TABLE team_members (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     team_id UUID NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     email TEXT NOT NULL,
///     first_name TEXT NOT NULL,
///     last_name TEXT NOT NULL,
///     phone TEXT,
///     role team_role NOT NULL DEFAULT 'member',
///     added_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     UNIQUE (team_id, user_id),
///     UNIQUE (team_id, email)
/// );
/// ```
///
/// The creator is not a row in `team_members`; they hold implicit full
/// control over the team. Members only join by accepting an invitation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "team_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    Admin,
    #[default]
    Member,
}

impl TeamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamRole::Admin => "admin",
            TeamRole::Member => "member",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TeamMember {
    pub id: Uuid,
    pub team_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: TeamRole,
    pub added_at: DateTime<Utc>,
}

/// Input for adding a member (used by invitation acceptance)
#[derive(Debug, Clone)]
pub struct NewTeamMember {
    pub team_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: TeamRole,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTeam {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
}

/// Contact card / role edit; outer `None` leaves a column alone
#[derive(Debug, Clone, Default)]
pub struct UpdateTeamMember {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<Option<String>>,
    pub role: Option<TeamRole>,
}

const TEAM_COLUMNS: &str = "id, name, description, created_by, created_at, updated_at";
const MEMBER_COLUMNS: &str =
    "id, team_id, user_id, email, first_name, last_name, phone, role, added_at";

impl Team {
    pub fn is_creator(&self, user_id: Uuid) -> bool {
        self.created_by == Some(user_id)
    }

    pub async fn create(
        pool: &PgPool,
        created_by: Uuid,
        name: &str,
        description: Option<String>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Team>(&format!(
            r#"
            INSERT INTO teams (name, description, created_by)
            VALUES ($1, $2, $3)
            RETURNING {TEAM_COLUMNS}
            "#
        ))
        .bind(name.trim())
        .bind(description)
        .bind(created_by)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Team>(&format!("SELECT {TEAM_COLUMNS} FROM teams WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Teams the user created or belongs to, newest first
    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Team>(&format!(
            r#"
            SELECT {TEAM_COLUMNS} FROM teams
            WHERE created_by = $1
               OR id IN (SELECT team_id FROM team_members WHERE user_id = $1)
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateTeam,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE teams SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", name = ${}", bind_count));
        }
        if data.description.is_some() {
            bind_count += 1;
            query.push_str(&format!(", description = ${}", bind_count));
        }

        query.push_str(&format!(" WHERE id = $1 RETURNING {TEAM_COLUMNS}"));

        let mut q = sqlx::query_as::<_, Team>(&query).bind(id);

        if let Some(name) = data.name {
            q = q.bind(name.trim().to_string());
        }
        if let Some(description) = data.description {
            q = q.bind(description);
        }

        q.fetch_optional(pool).await
    }

    /// Deletes a team; members and invitations cascade, tickets keep no team
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM teams WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Members of several teams in one query
    pub async fn members_for(
        pool: &PgPool,
        team_ids: &[Uuid],
    ) -> Result<Vec<TeamMember>, sqlx::Error> {
        sqlx::query_as::<_, TeamMember>(&format!(
            r#"
            SELECT {MEMBER_COLUMNS} FROM team_members
            WHERE team_id = ANY($1)
            ORDER BY added_at ASC
            "#
        ))
        .bind(team_ids)
        .fetch_all(pool)
        .await
    }
}

impl TeamMember {
    /// Adds a member, leaving an existing (team, user) row untouched
    ///
    /// Returns `None` when the user was already a member. A contact email
    /// already held by another member of the team is a unique violation.
    pub async fn add(
        conn: &mut PgConnection,
        data: NewTeamMember,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TeamMember>(&format!(
            r#"
            INSERT INTO team_members (team_id, user_id, email, first_name, last_name, phone, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (team_id, user_id) DO NOTHING
            RETURNING {MEMBER_COLUMNS}
            "#
        ))
        .bind(data.team_id)
        .bind(data.user_id)
        .bind(data.email)
        .bind(data.first_name)
        .bind(data.last_name)
        .bind(data.phone)
        .bind(data.role)
        .fetch_optional(conn)
        .await
    }

    pub async fn find(
        pool: &PgPool,
        team_id: Uuid,
        member_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TeamMember>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM team_members WHERE team_id = $1 AND id = $2"
        ))
        .bind(team_id)
        .bind(member_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_user(
        pool: &PgPool,
        team_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TeamMember>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM team_members WHERE team_id = $1 AND user_id = $2"
        ))
        .bind(team_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn email_is_member(
        pool: &PgPool,
        team_id: Uuid,
        email: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM team_members tm
                LEFT JOIN users u ON u.id = tm.user_id
                WHERE tm.team_id = $1 AND (tm.email = $2 OR u.email = $2)
            )
            "#,
        )
        .bind(team_id)
        .bind(email)
        .fetch_one(pool)
        .await
    }

    pub async fn update(
        pool: &PgPool,
        team_id: Uuid,
        member_id: Uuid,
        data: UpdateTeamMember,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE team_members SET team_id = team_id");
        let mut bind_count = 2;

        if data.email.is_some() {
            bind_count += 1;
            query.push_str(&format!(", email = ${}", bind_count));
        }
        if data.first_name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", first_name = ${}", bind_count));
        }
        if data.last_name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", last_name = ${}", bind_count));
        }
        if data.phone.is_some() {
            bind_count += 1;
            query.push_str(&format!(", phone = ${}", bind_count));
        }
        if data.role.is_some() {
            bind_count += 1;
            query.push_str(&format!(", role = ${}", bind_count));
        }

        query.push_str(&format!(
            " WHERE team_id = $1 AND id = $2 RETURNING {MEMBER_COLUMNS}"
        ));

        let mut q = sqlx::query_as::<_, TeamMember>(&query)
            .bind(team_id)
            .bind(member_id);

        if let Some(email) = data.email {
            q = q.bind(email);
        }
        if let Some(first_name) = data.first_name {
            q = q.bind(first_name);
        }
        if let Some(last_name) = data.last_name {
            q = q.bind(last_name);
        }
        if let Some(phone) = data.phone {
            q = q.bind(phone);
        }
        if let Some(role) = data.role {
            q = q.bind(role);
        }

        q.fetch_optional(pool).await
    }

    pub async fn remove(pool: &PgPool, team_id: Uuid, member_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM team_members WHERE team_id = $1 AND id = $2")
            .bind(team_id)
            .bind(member_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
