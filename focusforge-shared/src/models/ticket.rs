/// Ticket model and database operations
///
/// # Schema
///
/// ```sql
/// CREATE TYPE ticket_status AS ENUM ('todo', 'in_progress', 'review', 'done');
/// CREATE TYPE ticket_priority AS ENUM ('low', 'medium', 'high', 'urgent');
///
/// CREATE TABLE tickets (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
///     title TEXT NOT NULL,
///     description TEXT,
///     status ticket_status NOT NULL DEFAULT 'todo',
///     priority ticket_priority NOT NULL DEFAULT 'medium',
///     ticket_type TEXT NOT NULL DEFAULT '',
///     team_id UUID REFERENCES teams(id) ON DELETE SET NULL,
///     creator_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     estimated_date TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE TABLE ticket_assignees (
///     ticket_id UUID NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     PRIMARY KEY (ticket_id, user_id)
/// );
/// ```
///
/// Statuses are the kanban board columns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Todo,
    InProgress,
    Review,
    Done,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Todo => "todo",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Review => "review",
            TicketStatus::Done => "done",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    #[serde(rename = "type")]
    pub ticket_type: String,
    pub team_id: Option<Uuid>,
    pub creator_id: Uuid,
    pub estimated_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateTicket {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub ticket_type: Option<String>,
    pub team_id: Option<Uuid>,
    pub estimated_date: Option<DateTime<Utc>>,
    /// Deduplicated user ids
    pub assignees: Vec<Uuid>,
}

/// Partial update
///
/// Outer `None` leaves a column alone; `Some(None)` clears a nullable
/// column. `assignees: Some(_)` replaces the whole assignee set.
#[derive(Debug, Clone, Default)]
pub struct UpdateTicket {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub ticket_type: Option<String>,
    pub team_id: Option<Option<Uuid>>,
    pub estimated_date: Option<Option<DateTime<Utc>>>,
    pub assignees: Option<Vec<Uuid>>,
}

/// Kanban column / priority filter for listing
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
}

/// Result of [`Ticket::update`]
#[derive(Debug, Clone)]
pub struct TicketUpdate {
    pub ticket: Ticket,
    pub previous_status: TicketStatus,
    /// Users assigned by this update who were not assigned before
    pub added_assignees: Vec<Uuid>,
}

/// Assignee joined with the user record
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AssigneeRow {
    pub ticket_id: Uuid,
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
}

/// Removes duplicate ids while keeping first-seen order
pub fn dedup_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

const TICKET_COLUMNS: &str = "id, project_id, title, description, status, priority, ticket_type, \
                              team_id, creator_id, estimated_date, created_at, updated_at";

impl Ticket {
    /// Creates a ticket and its assignee rows in one transaction
    pub async fn create(
        pool: &PgPool,
        project_id: Uuid,
        creator_id: Uuid,
        data: CreateTicket,
    ) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let ticket = sqlx::query_as::<_, Ticket>(&format!(
            r#"
            INSERT INTO tickets
                (project_id, title, description, status, priority, ticket_type, team_id,
                 creator_id, estimated_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {TICKET_COLUMNS}
            "#
        ))
        .bind(project_id)
        .bind(data.title.trim())
        .bind(data.description)
        .bind(data.status.unwrap_or_default())
        .bind(data.priority.unwrap_or_default())
        .bind(data.ticket_type.unwrap_or_default())
        .bind(data.team_id)
        .bind(creator_id)
        .bind(data.estimated_date)
        .fetch_one(&mut *tx)
        .await?;

        insert_assignees(&mut *tx, ticket.id, &data.assignees).await?;

        tx.commit().await?;

        Ok(ticket)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Ticket>(&format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Tickets of a project, newest first, optionally narrowed to a column or priority
    pub async fn list_for_project(
        pool: &PgPool,
        project_id: Uuid,
        filter: TicketFilter,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Ticket>(&format!(
            r#"
            SELECT {TICKET_COLUMNS} FROM tickets
            WHERE project_id = $1
              AND ($2::ticket_status IS NULL OR status = $2)
              AND ($3::ticket_priority IS NULL OR priority = $3)
            ORDER BY created_at DESC
            "#
        ))
        .bind(project_id)
        .bind(filter.status)
        .bind(filter.priority)
        .fetch_all(pool)
        .await
    }

    /// Applies a partial update and, when given, replaces the assignee set
    ///
    /// Returns `None` if the ticket does not exist.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateTicket,
    ) -> Result<Option<TicketUpdate>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let previous_status: Option<TicketStatus> =
            sqlx::query_scalar("SELECT status FROM tickets WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(previous_status) = previous_status else {
            return Ok(None);
        };

        let mut query = String::from("UPDATE tickets SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.title.is_some() {
            bind_count += 1;
            query.push_str(&format!(", title = ${}", bind_count));
        }
        if data.description.is_some() {
            bind_count += 1;
            query.push_str(&format!(", description = ${}", bind_count));
        }
        if data.status.is_some() {
            bind_count += 1;
            query.push_str(&format!(", status = ${}", bind_count));
        }
        if data.priority.is_some() {
            bind_count += 1;
            query.push_str(&format!(", priority = ${}", bind_count));
        }
        if data.ticket_type.is_some() {
            bind_count += 1;
            query.push_str(&format!(", ticket_type = ${}", bind_count));
        }
        if data.team_id.is_some() {
            bind_count += 1;
            query.push_str(&format!(", team_id = ${}", bind_count));
        }
        if data.estimated_date.is_some() {
            bind_count += 1;
            query.push_str(&format!(", estimated_date = ${}", bind_count));
        }

        query.push_str(&format!(" WHERE id = $1 RETURNING {TICKET_COLUMNS}"));

        let mut q = sqlx::query_as::<_, Ticket>(&query).bind(id);

        if let Some(title) = data.title {
            q = q.bind(title.trim().to_string());
        }
        if let Some(description) = data.description {
            q = q.bind(description);
        }
        if let Some(status) = data.status {
            q = q.bind(status);
        }
        if let Some(priority) = data.priority {
            q = q.bind(priority);
        }
        if let Some(ticket_type) = data.ticket_type {
            q = q.bind(ticket_type);
        }
        if let Some(team_id) = data.team_id {
            q = q.bind(team_id);
        }
        if let Some(estimated_date) = data.estimated_date {
            q = q.bind(estimated_date);
        }

        let ticket = q.fetch_one(&mut *tx).await?;

        let mut added_assignees = Vec::new();
        if let Some(assignees) = data.assignees {
            let current: Vec<Uuid> =
                sqlx::query_scalar("SELECT user_id FROM ticket_assignees WHERE ticket_id = $1")
                    .bind(id)
                    .fetch_all(&mut *tx)
                    .await?;

            added_assignees = assignees
                .iter()
                .copied()
                .filter(|user_id| !current.contains(user_id))
                .collect();

            sqlx::query("DELETE FROM ticket_assignees WHERE ticket_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            insert_assignees(&mut *tx, id, &assignees).await?;
        }

        tx.commit().await?;

        Ok(Some(TicketUpdate {
            ticket,
            previous_status,
            added_assignees,
        }))
    }

    /// Deletes a ticket; comments and assignee rows cascade
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tickets WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn assignee_ids(pool: &PgPool, ticket_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar("SELECT user_id FROM ticket_assignees WHERE ticket_id = $1")
            .bind(ticket_id)
            .fetch_all(pool)
            .await
    }

    /// Assignees of several tickets in one query
    pub async fn assignees_for(
        pool: &PgPool,
        ticket_ids: &[Uuid],
    ) -> Result<Vec<AssigneeRow>, sqlx::Error> {
        sqlx::query_as::<_, AssigneeRow>(
            r#"
            SELECT ta.ticket_id, u.id, u.email, u.full_name
            FROM ticket_assignees ta
            JOIN users u ON u.id = ta.user_id
            WHERE ta.ticket_id = ANY($1)
            ORDER BY u.full_name ASC
            "#,
        )
        .bind(ticket_ids)
        .fetch_all(pool)
        .await
    }
}

async fn insert_assignees(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    user_ids: &[Uuid],
) -> Result<(), sqlx::Error> {
    if user_ids.is_empty() {
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO ticket_assignees (ticket_id, user_id)
        SELECT $1, UNNEST($2::uuid[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(ticket_id)
    .bind(user_ids)
    .execute(conn)
    .await?;

    Ok(())
}
