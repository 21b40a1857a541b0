/// Project membership model and database operations
///
/// Many-to-many relationship between users and projects with a role.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE project_role AS ENUM ('owner', 'admin', 'member');
///
/// CREATE TABLE project_members (
///     project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     role project_role NOT NULL DEFAULT 'member',
///     added_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (project_id, user_id)
/// );
/// ```
///
/// # Roles
///
/// - **owner**: the project creator; only role that can delete the project
/// - **admin**: edit the project and invite people
/// - **member**: work on tickets and comments

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Roles within a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "project_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProjectRole {
    Owner,
    Admin,
    Member,
}

impl ProjectRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectRole::Owner => "owner",
            ProjectRole::Admin => "admin",
            ProjectRole::Member => "member",
        }
    }

    /// Checks if this role is at least as strong as `required`
    ///
    /// Hierarchy: Owner > Admin > Member
    pub fn has_permission(&self, required: &ProjectRole) -> bool {
        self.permission_level() >= required.permission_level()
    }

    fn permission_level(&self) -> u8 {
        match self {
            ProjectRole::Owner => 3,
            ProjectRole::Admin => 2,
            ProjectRole::Member => 1,
        }
    }
}

/// A row of `project_members`
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectMember {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: ProjectRole,
    pub added_at: DateTime<Utc>,
}

/// Membership joined with the member's user record
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProjectMemberDetail {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: ProjectRole,
    pub added_at: DateTime<Utc>,
}

/// One (participant, project) pair among the caller's projects
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ParticipantRow {
    pub user_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub project_id: Uuid,
    pub role: ProjectRole,
}

impl ProjectMember {
    /// Adds a user to a project
    ///
    /// Takes a connection so it can run inside the project-creation and
    /// invitation-acceptance transactions. An existing membership is left
    /// untouched; returns whether a row was inserted.
    pub async fn add(
        conn: &mut PgConnection,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO project_members (project_id, user_id, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (project_id, user_id) DO NOTHING
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .bind(role)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Gets a user's role in a project, `None` if not a member
    pub async fn get_role(
        pool: &PgPool,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ProjectRole>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT role FROM project_members
            WHERE project_id = $1 AND user_id = $2
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Checks whether a member with this email already belongs to the project
    pub async fn email_is_member(
        pool: &PgPool,
        project_id: Uuid,
        email: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM project_members pm
                JOIN users u ON u.id = pm.user_id
                WHERE pm.project_id = $1 AND u.email = $2
            )
            "#,
        )
        .bind(project_id)
        .bind(email)
        .fetch_one(pool)
        .await
    }

    /// Lists members of several projects in one query, ordered by join time
    pub async fn list_for_projects(
        pool: &PgPool,
        project_ids: &[Uuid],
    ) -> Result<Vec<ProjectMemberDetail>, sqlx::Error> {
        sqlx::query_as::<_, ProjectMemberDetail>(
            r#"
            SELECT pm.project_id, pm.user_id, u.email, u.full_name, pm.role, pm.added_at
            FROM project_members pm
            JOIN users u ON u.id = pm.user_id
            WHERE pm.project_id = ANY($1)
            ORDER BY pm.added_at ASC
            "#,
        )
        .bind(project_ids)
        .fetch_all(pool)
        .await
    }

    /// Counts projects per user for the given users
    ///
    /// Users without any membership are absent from the map.
    pub async fn count_projects_by_user(
        pool: &PgPool,
        user_ids: &[Uuid],
    ) -> Result<std::collections::HashMap<Uuid, i64>, sqlx::Error> {
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            r#"
            SELECT user_id, COUNT(*)::BIGINT
            FROM project_members
            WHERE user_id = ANY($1)
            GROUP BY user_id
            "#,
        )
        .bind(user_ids)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    /// Everyone who shares at least one project with `user_id`, the caller included
    ///
    /// Rows are ordered by project creation and join time so the first row
    /// seen for a user is their earliest shared project.
    pub async fn participants_of(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Vec<ParticipantRow>, sqlx::Error> {
        sqlx::query_as::<_, ParticipantRow>(
            r#"
            SELECT u.id AS user_id, u.email, u.full_name, pm.project_id, pm.role
            FROM project_members pm
            JOIN users u ON u.id = pm.user_id
            JOIN projects p ON p.id = pm.project_id
            WHERE pm.project_id IN (
                SELECT project_id FROM project_members WHERE user_id = $1
            )
            ORDER BY p.created_at ASC, pm.added_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_hierarchy() {
        assert!(ProjectRole::Owner.has_permission(&ProjectRole::Admin));
        assert!(ProjectRole::Owner.has_permission(&ProjectRole::Member));
        assert!(ProjectRole::Admin.has_permission(&ProjectRole::Admin));
        assert!(ProjectRole::Admin.has_permission(&ProjectRole::Member));
        assert!(!ProjectRole::Admin.has_permission(&ProjectRole::Owner));
        assert!(!ProjectRole::Member.has_permission(&ProjectRole::Admin));
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&ProjectRole::Admin).unwrap(), "\"admin\"");
        let role: ProjectRole = serde_json::from_str("\"member\"").unwrap();
        assert_eq!(role, ProjectRole::Member);
        assert!(serde_json::from_str::<ProjectRole>("\"viewer\"").is_err());
    }
}
