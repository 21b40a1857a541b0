/// Project endpoints
///
/// - `POST   /api/projects` - Create (caller becomes owner)
/// - `GET    /api/projects` - Projects the caller belongs to
/// - `GET    /api/projects/:id`
/// - `PUT    /api/projects/:id` - Owner or admin
/// - `DELETE /api/projects/:id` - Owner only

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{JsonBody, Path},
    response::{message_only, ApiResponse},
    validation::{deserialize_some, not_blank, trim_optional},
};
use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use focusforge_shared::{
    auth::{
        authorization::{require_ownership, require_project_member, require_project_role},
        middleware::AuthContext,
    },
    models::{
        project::{CreateProject, Project, ProjectKind, ProjectStatus, UpdateProject},
        project_member::{ProjectMember, ProjectMemberDetail, ProjectRole},
        user::UserSummary,
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
pub struct CreateProjectRequest {
    #[validate(
        custom(function = "not_blank"),
        length(max = 200, message = "Project name must be at most 200 characters")
    )]
    pub name: String,

    pub description: Option<String>,

    pub status: Option<ProjectStatus>,

    #[serde(rename = "type")]
    pub kind: Option<ProjectKind>,

    pub due_date: Option<DateTime<Utc>>,
}

/// Partial update; `null` clears `description` / `due_date`
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct UpdateProjectRequest {
    #[validate(
        custom(function = "not_blank"),
        length(max = 200, message = "Project name must be at most 200 characters")
    )]
    pub name: Option<String>,

    #[serde(deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,

    pub status: Option<ProjectStatus>,

    #[serde(rename = "type")]
    pub kind: Option<ProjectKind>,

    #[serde(deserialize_with = "deserialize_some")]
    pub due_date: Option<Option<DateTime<Utc>>>,
}

impl From<UpdateProjectRequest> for UpdateProject {
    fn from(req: UpdateProjectRequest) -> Self {
        Self {
            name: req.name.map(|n| n.trim().to_string()),
            description: req.description.map(trim_optional),
            status: req.status,
            kind: req.kind,
            due_date: req.due_date,
        }
    }
}

/// Project with its owner and member list
#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    #[serde(flatten)]
    pub project: Project,

    pub owner: Option<UserSummary>,

    pub members: Vec<ProjectMemberDetail>,
}

/// Attaches members to projects with one membership query
pub(crate) async fn with_members(
    pool: &PgPool,
    projects: Vec<Project>,
) -> Result<Vec<ProjectResponse>, sqlx::Error> {
    let ids: Vec<Uuid> = projects.iter().map(|p| p.id).collect();
    let mut by_project: HashMap<Uuid, Vec<ProjectMemberDetail>> = HashMap::new();
    for member in ProjectMember::list_for_projects(pool, &ids).await? {
        by_project.entry(member.project_id).or_default().push(member);
    }

    Ok(projects
        .into_iter()
        .map(|project| {
            let members = by_project.remove(&project.id).unwrap_or_default();
            let owner = members
                .iter()
                .find(|m| m.user_id == project.owner_id)
                .map(|m| UserSummary {
                    id: m.user_id,
                    email: m.email.clone(),
                    full_name: m.full_name.clone(),
                });
            ProjectResponse {
                project,
                owner,
                members,
            }
        })
        .collect())
}

pub(crate) async fn project_response(
    pool: &PgPool,
    project: Project,
) -> Result<ProjectResponse, sqlx::Error> {
    let mut enriched = with_members(pool, vec![project]).await?;
    enriched
        .pop()
        .ok_or_else(|| sqlx::Error::Protocol("project enrichment returned no rows".into()))
}

/// Loads a project or fails with 404
pub(crate) async fn find_project(pool: &PgPool, id: Uuid) -> ApiResult<Project> {
    Project::find_by_id(pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Project not found".to_string()))
}

pub async fn create_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    JsonBody(req): JsonBody<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<ProjectResponse>>)> {
    req.validate()?;

    let project = Project::create(
        &state.db,
        auth.user_id,
        CreateProject {
            name: req.name.trim().to_string(),
            description: trim_optional(req.description),
            status: req.status,
            kind: req.kind,
            due_date: req.due_date,
        },
    )
    .await?;

    info!(project_id = %project.id, owner_id = %auth.user_id, "Project created");

    let response = project_response(&state.db, project).await?;
    Ok(ApiResponse::created("Project created successfully", response))
}

pub async fn list_projects(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<ApiResponse<Vec<ProjectResponse>>>> {
    let projects = Project::list_for_user(&state.db, auth.user_id).await?;
    let response = with_members(&state.db, projects).await?;
    Ok(ApiResponse::ok(response))
}

pub async fn get_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<ProjectResponse>>> {
    let project = find_project(&state.db, id).await?;
    require_project_member(&state.db, id, auth.user_id).await?;

    Ok(ApiResponse::ok(project_response(&state.db, project).await?))
}

pub async fn update_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<UpdateProjectRequest>,
) -> ApiResult<Json<ApiResponse<ProjectResponse>>> {
    req.validate()?;

    find_project(&state.db, id).await?;
    require_project_role(&state.db, id, auth.user_id, ProjectRole::Admin).await?;

    let project = Project::update(&state.db, id, req.into())
        .await?
        .ok_or_else(|| ApiError::NotFound("Project not found".to_string()))?;

    info!(project_id = %id, user_id = %auth.user_id, "Project updated");

    Ok(ApiResponse::with_message(
        "Project updated successfully",
        project_response(&state.db, project).await?,
    ))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let project = find_project(&state.db, id).await?;
    require_ownership(auth.user_id, project.owner_id, "Only owner can delete")?;

    Project::delete(&state.db, id).await?;

    info!(project_id = %id, "Project deleted");

    Ok(message_only("Project deleted successfully"))
}
