/// Ticket endpoints
///
/// - `POST   /api/tickets/project/:project_id` - Create in a project
/// - `GET    /api/tickets/project/:project_id?status=&priority=` - Kanban listing
/// - `GET    /api/tickets/:ticket_id`
/// - `PUT    /api/tickets/:ticket_id` - Any project member
/// - `DELETE /api/tickets/:ticket_id` - Creator or project owner

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{JsonBody, Path, Query},
    response::{message_only, ApiResponse},
    routes::{current_user, display_name, projects::find_project},
    validation::{deserialize_some, not_blank, trim_optional},
};
use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use focusforge_shared::{
    auth::{authorization::require_project_member, middleware::AuthContext},
    models::{
        notification::{NewNotification, Notification, NotificationKind},
        project_member::{ProjectMember, ProjectRole},
        ticket::{
            dedup_ids, CreateTicket, Ticket, TicketFilter, TicketPriority, TicketStatus,
            UpdateTicket,
        },
        user::{User, UserSummary},
    },
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct CreateTicketRequest {
    #[validate(
        custom(function = "not_blank"),
        length(max = 200, message = "Title must be at most 200 characters")
    )]
    pub title: String,

    pub description: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,

    #[serde(rename = "type")]
    pub ticket_type: Option<String>,

    pub team_id: Option<Uuid>,
    pub estimated_date: Option<DateTime<Utc>>,
    pub assignees: Vec<Uuid>,
}

/// Partial update; `null` clears the nullable fields and `assignees`
/// replaces the whole set
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct UpdateTicketRequest {
    #[validate(
        custom(function = "not_blank"),
        length(max = 200, message = "Title must be at most 200 characters")
    )]
    pub title: Option<String>,

    #[serde(deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,

    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,

    #[serde(rename = "type")]
    pub ticket_type: Option<String>,

    #[serde(deserialize_with = "deserialize_some")]
    pub team_id: Option<Option<Uuid>>,

    #[serde(deserialize_with = "deserialize_some")]
    pub estimated_date: Option<Option<DateTime<Utc>>>,

    pub assignees: Option<Vec<Uuid>>,
}

impl From<UpdateTicketRequest> for UpdateTicket {
    fn from(req: UpdateTicketRequest) -> Self {
        Self {
            title: req.title.map(|t| t.trim().to_string()),
            description: req.description.map(trim_optional),
            status: req.status,
            priority: req.priority,
            ticket_type: req.ticket_type.map(|t| t.trim().to_string()),
            team_id: req.team_id,
            estimated_date: req.estimated_date,
            assignees: req.assignees.map(|ids| dedup_ids(&ids)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssigneeResponse {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    /// Number of projects the assignee belongs to
    pub project_count: i64,
}

#[derive(Debug, Serialize)]
pub struct TicketResponse {
    #[serde(flatten)]
    pub ticket: Ticket,

    pub creator: Option<UserSummary>,

    pub assignees: Vec<AssigneeResponse>,
}

/// Attaches creators and assignees (with project counts) to tickets
///
/// Three queries regardless of how many tickets are passed in.
async fn with_people(
    pool: &PgPool,
    tickets: Vec<Ticket>,
) -> Result<Vec<TicketResponse>, sqlx::Error> {
    let ticket_ids: Vec<Uuid> = tickets.iter().map(|t| t.id).collect();
    let assignee_rows = Ticket::assignees_for(pool, &ticket_ids).await?;

    let assignee_ids = dedup_ids(&assignee_rows.iter().map(|a| a.id).collect::<Vec<_>>());
    let project_counts = ProjectMember::count_projects_by_user(pool, &assignee_ids).await?;

    let creator_ids = dedup_ids(&tickets.iter().map(|t| t.creator_id).collect::<Vec<_>>());
    let creators: HashMap<Uuid, UserSummary> = User::summaries_for(pool, &creator_ids)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let mut by_ticket: HashMap<Uuid, Vec<AssigneeResponse>> = HashMap::new();
    for row in assignee_rows {
        by_ticket.entry(row.ticket_id).or_default().push(AssigneeResponse {
            id: row.id,
            project_count: project_counts.get(&row.id).copied().unwrap_or(0),
            email: row.email,
            full_name: row.full_name,
        });
    }

    Ok(tickets
        .into_iter()
        .map(|ticket| TicketResponse {
            creator: creators.get(&ticket.creator_id).cloned(),
            assignees: by_ticket.remove(&ticket.id).unwrap_or_default(),
            ticket,
        })
        .collect())
}

async fn ticket_response(pool: &PgPool, ticket: Ticket) -> Result<TicketResponse, sqlx::Error> {
    with_people(pool, vec![ticket])
        .await?
        .pop()
        .ok_or_else(|| sqlx::Error::Protocol("ticket enrichment returned no rows".into()))
}

/// Loads a ticket or fails with 404
pub(crate) async fn find_ticket(pool: &PgPool, id: Uuid) -> ApiResult<Ticket> {
    Ticket::find_by_id(pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Ticket not found".to_string()))
}

/// Rejects assignee lists that mention unknown users
async fn ensure_users_exist(pool: &PgPool, ids: &[Uuid]) -> ApiResult<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let found = User::existing_ids(pool, ids).await?;
    if found.len() != ids.len() {
        return Err(ApiError::invalid_field(
            "assignees",
            "One or more assignees do not exist",
        ));
    }
    Ok(())
}

fn assignment_notice(user_id: Uuid, ticket: &Ticket, assigned_by: &str) -> NewNotification {
    NewNotification::new(
        user_id,
        NotificationKind::TicketAssignment,
        "New ticket assignment",
        format!("{} assigned you to \"{}\"", assigned_by, ticket.title),
    )
    .ticket(ticket.id)
    .project(ticket.project_id)
}

pub async fn create_ticket(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(project_id): Path<Uuid>,
    JsonBody(req): JsonBody<CreateTicketRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<TicketResponse>>)> {
    req.validate()?;

    find_project(&state.db, project_id).await?;
    require_project_member(&state.db, project_id, auth.user_id).await?;

    let assignees = dedup_ids(&req.assignees);
    ensure_users_exist(&state.db, &assignees).await?;

    let ticket = Ticket::create(
        &state.db,
        project_id,
        auth.user_id,
        CreateTicket {
            title: req.title.trim().to_string(),
            description: trim_optional(req.description),
            status: req.status,
            priority: req.priority,
            ticket_type: req.ticket_type.map(|t| t.trim().to_string()),
            team_id: req.team_id,
            estimated_date: req.estimated_date,
            assignees: assignees.clone(),
        },
    )
    .await?;

    info!(ticket_id = %ticket.id, project_id = %project_id, "Ticket created");

    if !assignees.is_empty() {
        let creator = current_user(&state, &auth).await?;
        let notices = assignees
            .iter()
            .map(|user_id| assignment_notice(*user_id, &ticket, display_name(&creator)))
            .collect();
        Notification::notify_all(&state.db, notices).await;
    }

    Ok(ApiResponse::created(
        "Ticket created successfully",
        ticket_response(&state.db, ticket).await?,
    ))
}

pub async fn list_tickets(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(project_id): Path<Uuid>,
    Query(filter): Query<TicketFilter>,
) -> ApiResult<Json<ApiResponse<Vec<TicketResponse>>>> {
    find_project(&state.db, project_id).await?;
    require_project_member(&state.db, project_id, auth.user_id).await?;

    let tickets = Ticket::list_for_project(&state.db, project_id, filter).await?;
    Ok(ApiResponse::ok(with_people(&state.db, tickets).await?))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(ticket_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<TicketResponse>>> {
    let ticket = find_ticket(&state.db, ticket_id).await?;
    require_project_member(&state.db, ticket.project_id, auth.user_id).await?;

    Ok(ApiResponse::ok(ticket_response(&state.db, ticket).await?))
}

/// Updates a ticket
///
/// Newly added assignees get an assignment notification. A status change
/// made by someone other than the creator notifies the creator.
pub async fn update_ticket(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(ticket_id): Path<Uuid>,
    JsonBody(req): JsonBody<UpdateTicketRequest>,
) -> ApiResult<Json<ApiResponse<TicketResponse>>> {
    req.validate()?;

    let existing = find_ticket(&state.db, ticket_id).await?;
    require_project_member(&state.db, existing.project_id, auth.user_id).await?;

    let update: UpdateTicket = req.into();
    if let Some(assignees) = &update.assignees {
        ensure_users_exist(&state.db, assignees).await?;
    }

    let outcome = Ticket::update(&state.db, ticket_id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("Ticket not found".to_string()))?;

    info!(ticket_id = %ticket_id, user_id = %auth.user_id, "Ticket updated");

    let ticket = &outcome.ticket;
    let status_changed = outcome.previous_status != ticket.status;
    let notify_creator = status_changed && ticket.creator_id != auth.user_id;

    if !outcome.added_assignees.is_empty() || notify_creator {
        let actor = current_user(&state, &auth).await?;
        let actor_name = display_name(&actor);

        let mut notices: Vec<NewNotification> = outcome
            .added_assignees
            .iter()
            .map(|user_id| assignment_notice(*user_id, ticket, actor_name))
            .collect();

        if notify_creator {
            notices.push(
                NewNotification::new(
                    ticket.creator_id,
                    NotificationKind::TicketUpdate,
                    "Ticket status updated",
                    format!(
                        "{} moved \"{}\" from {} to {}",
                        actor_name,
                        ticket.title,
                        outcome.previous_status.as_str(),
                        ticket.status.as_str()
                    ),
                )
                .ticket(ticket.id)
                .project(ticket.project_id),
            );
        }

        Notification::notify_all(&state.db, notices).await;
    }

    Ok(ApiResponse::with_message(
        "Ticket updated successfully",
        ticket_response(&state.db, outcome.ticket).await?,
    ))
}

pub async fn delete_ticket(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(ticket_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let ticket = find_ticket(&state.db, ticket_id).await?;
    let role = require_project_member(&state.db, ticket.project_id, auth.user_id).await?;

    if ticket.creator_id != auth.user_id && role != ProjectRole::Owner {
        return Err(ApiError::Forbidden(
            "Only the ticket creator or project owner can delete this ticket".to_string(),
        ));
    }

    Ticket::delete(&state.db, ticket_id).await?;

    info!(ticket_id = %ticket_id, "Ticket deleted");

    Ok(message_only("Ticket deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_defaults() {
        let req: CreateTicketRequest = serde_json::from_str(r#"{"title": "Fix login"}"#).unwrap();
        assert!(req.validate().is_ok());
        assert!(req.assignees.is_empty());
        assert_eq!(req.status, None);
        assert_eq!(req.ticket_type, None);
    }

    #[test]
    fn test_empty_title_rejected() {
        let req: CreateTicketRequest = serde_json::from_str(r#"{"title": ""}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_update_request_dedups_assignees() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let req: UpdateTicketRequest = serde_json::from_value(serde_json::json!({
            "status": "in_progress",
            "assignees": [a, b, a],
            "team_id": null
        }))
        .unwrap();

        let update: UpdateTicket = req.into();
        assert_eq!(update.status, Some(TicketStatus::InProgress));
        assert_eq!(update.assignees, Some(vec![a, b]));
        assert_eq!(update.team_id, Some(None));
        assert_eq!(update.description, None);
    }
}
