/// Project model and database operations
///
/// # Schema
///
/// ```sql
/// CREATE TYPE project_status AS ENUM ('active', 'inactive', 'archived');
/// CREATE TYPE project_kind AS ENUM ('backend', 'frontend', 'design');
///
/// CREATE TABLE projects (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name TEXT NOT NULL,
///     description TEXT,
///     status project_status NOT NULL DEFAULT 'active',
///     kind project_kind NOT NULL DEFAULT 'backend',
///     due_date TIMESTAMPTZ,
///     owner_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// The owner is always recorded in `project_members` with role `owner`;
/// [`Project::create`] writes both rows in one transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::project_member::{ProjectMember, ProjectRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "project_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Active,
    Inactive,
    Archived,
}

/// Kind of work the project tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "project_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    #[default]
    Backend,
    Frontend,
    Design,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    #[serde(rename = "type")]
    pub kind: ProjectKind,
    pub due_date: Option<DateTime<Utc>>,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateProject {
    pub name: String,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub kind: Option<ProjectKind>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Partial update
///
/// Outer `None` leaves a column alone; `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<ProjectStatus>,
    pub kind: Option<ProjectKind>,
    pub due_date: Option<Option<DateTime<Utc>>>,
}

impl UpdateProject {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.kind.is_none()
            && self.due_date.is_none()
    }
}

const PROJECT_COLUMNS: &str =
    "id, name, description, status, kind, due_date, owner_id, created_at, updated_at";

impl Project {
    /// Creates a project and its owner membership atomically
    pub async fn create(
        pool: &PgPool,
        owner_id: Uuid,
        data: CreateProject,
    ) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let project = sqlx::query_as::<_, Project>(&format!(
            r#"
            INSERT INTO projects (name, description, status, kind, due_date, owner_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(data.name.trim())
        .bind(data.description)
        .bind(data.status.unwrap_or_default())
        .bind(data.kind.unwrap_or_default())
        .bind(data.due_date)
        .bind(owner_id)
        .fetch_one(&mut *tx)
        .await?;

        ProjectMember::add(&mut *tx, project.id, owner_id, ProjectRole::Owner).await?;

        tx.commit().await?;

        Ok(project)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Projects the user belongs to (any role), newest first
    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(
            r#"
            SELECT p.id, p.name, p.description, p.status, p.kind, p.due_date, p.owner_id,
                   p.created_at, p.updated_at
            FROM projects p
            JOIN project_members pm ON pm.project_id = p.id
            WHERE pm.user_id = $1
            ORDER BY p.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Applies a partial update, `None` if the project does not exist
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateProject,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE projects SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", name = ${}", bind_count));
        }
        if data.description.is_some() {
            bind_count += 1;
            query.push_str(&format!(", description = ${}", bind_count));
        }
        if data.status.is_some() {
            bind_count += 1;
            query.push_str(&format!(", status = ${}", bind_count));
        }
        if data.kind.is_some() {
            bind_count += 1;
            query.push_str(&format!(", kind = ${}", bind_count));
        }
        if data.due_date.is_some() {
            bind_count += 1;
            query.push_str(&format!(", due_date = ${}", bind_count));
        }

        query.push_str(&format!(" WHERE id = $1 RETURNING {PROJECT_COLUMNS}"));

        let mut q = sqlx::query_as::<_, Project>(&query).bind(id);

        if let Some(name) = data.name {
            q = q.bind(name.trim().to_string());
        }
        if let Some(description) = data.description {
            q = q.bind(description);
        }
        if let Some(status) = data.status {
            q = q.bind(status);
        }
        if let Some(kind) = data.kind {
            q = q.bind(kind);
        }
        if let Some(due_date) = data.due_date {
            q = q.bind(due_date);
        }

        q.fetch_optional(pool).await
    }

    /// Deletes a project; tickets, comments, members and invitations cascade
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(ProjectStatus::default(), ProjectStatus::Active);
        assert_eq!(ProjectKind::default(), ProjectKind::Backend);
    }

    #[test]
    fn test_kind_serializes_as_type() {
        let project = Project {
            id: Uuid::new_v4(),
            name: "Website".to_string(),
            description: None,
            status: ProjectStatus::Archived,
            kind: ProjectKind::Design,
            due_date: None,
            owner_id: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(&project).unwrap();
        assert_eq!(json["type"], "design");
        assert_eq!(json["status"], "archived");
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn test_update_is_empty() {
        assert!(UpdateProject::default().is_empty());
        assert!(!UpdateProject {
            due_date: Some(None),
            ..Default::default()
        }
        .is_empty());
    }
}
