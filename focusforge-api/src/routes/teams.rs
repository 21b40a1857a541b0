/// Team endpoints
///
/// - `POST   /api/teams` - Create (caller recorded as creator)
/// - `GET    /api/teams` - Teams the caller created or belongs to
/// - `GET    /api/teams/participants` - People sharing a project with the caller
/// - `GET    /api/teams/:id` - Creator or member
/// - `PUT    /api/teams/:id` - Creator or team admin
/// - `DELETE /api/teams/:id` - Creator only
/// - `PUT    /api/teams/:id/members/:member_id` - Creator or team admin
/// - `DELETE /api/teams/:id/members/:member_id` - Creator or team admin
///
/// Invitations live in `team_invitations`.

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
use focusforge_shared::{
    auth::{
        authorization::{require_team_access, require_team_creator, require_team_manager},
        middleware::AuthContext,
    },
    models::{
        project_member::{ParticipantRow, ProjectMember, ProjectRole},
        team::{Team, TeamMember, TeamRole, UpdateTeam, UpdateTeamMember},
        user::{normalize_email, split_full_name},
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
pub struct CreateTeamRequest {
    #[validate(
        custom(function = "not_blank"),
        length(max = 100, message = "Team name must be at most 100 characters")
    )]
    pub name: String,

    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct UpdateTeamRequest {
    #[validate(
        custom(function = "not_blank"),
        length(max = 100, message = "Team name must be at most 100 characters")
    )]
    pub name: Option<String>,

    #[serde(deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
}

/// Contact card / role edit for a member
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct UpdateMemberRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    #[validate(custom(function = "not_blank"))]
    pub first_name: Option<String>,

    #[validate(custom(function = "not_blank"))]
    pub last_name: Option<String>,

    #[serde(deserialize_with = "deserialize_some")]
    pub phone: Option<Option<String>>,

    pub role: Option<TeamRole>,
}

impl From<UpdateMemberRequest> for UpdateTeamMember {
    fn from(req: UpdateMemberRequest) -> Self {
        Self {
            email: req.email.map(|e| normalize_email(&e)),
            first_name: req.first_name.map(|n| n.trim().to_string()),
            last_name: req.last_name.map(|n| n.trim().to_string()),
            phone: req.phone.map(trim_optional),
            role: req.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TeamMemberResponse {
    #[serde(flatten)]
    pub member: TeamMember,

    pub project_count: i64,
}

#[derive(Debug, Serialize)]
pub struct TeamResponse {
    #[serde(flatten)]
    pub team: Team,

    pub members: Vec<TeamMemberResponse>,
}

/// Someone who shares at least one project with the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Participant {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    /// Role in the first shared project seen
    pub role: ProjectRole,
    pub project_count: usize,
    pub project_ids: Vec<Uuid>,
}

/// Folds (user, project) rows into one entry per user, sorted by name
///
/// Rows must arrive in project order; the first row for a user fixes the
/// reported role.
pub fn aggregate_participants(rows: Vec<ParticipantRow>) -> Vec<Participant> {
    let mut index: HashMap<Uuid, usize> = HashMap::new();
    let mut participants: Vec<Participant> = Vec::new();

    for row in rows {
        match index.get(&row.user_id) {
            Some(&i) => {
                let entry = &mut participants[i];
                if !entry.project_ids.contains(&row.project_id) {
                    entry.project_ids.push(row.project_id);
                    entry.project_count += 1;
                }
            }
            None => {
                let (first_name, last_name) = split_full_name(&row.full_name);
                index.insert(row.user_id, participants.len());
                participants.push(Participant {
                    id: row.user_id,
                    email: row.email,
                    full_name: row.full_name,
                    first_name,
                    last_name,
                    role: row.role,
                    project_count: 1,
                    project_ids: vec![row.project_id],
                });
            }
        }
    }

    participants.sort_by(|a, b| {
        a.full_name
            .to_lowercase()
            .cmp(&b.full_name.to_lowercase())
            .then_with(|| a.email.cmp(&b.email))
    });
    participants
}

/// Attaches members (with project counts) to teams
pub(crate) async fn with_members(
    pool: &PgPool,
    teams: Vec<Team>,
) -> Result<Vec<TeamResponse>, sqlx::Error> {
    let team_ids: Vec<Uuid> = teams.iter().map(|t| t.id).collect();
    let members = Team::members_for(pool, &team_ids).await?;

    let user_ids: Vec<Uuid> = members.iter().map(|m| m.user_id).collect();
    let project_counts = ProjectMember::count_projects_by_user(pool, &user_ids).await?;

    let mut by_team: HashMap<Uuid, Vec<TeamMemberResponse>> = HashMap::new();
    for member in members {
        let project_count = project_counts.get(&member.user_id).copied().unwrap_or(0);
        by_team
            .entry(member.team_id)
            .or_default()
            .push(TeamMemberResponse {
                member,
                project_count,
            });
    }

    Ok(teams
        .into_iter()
        .map(|team| TeamResponse {
            members: by_team.remove(&team.id).unwrap_or_default(),
            team,
        })
        .collect())
}

pub(crate) async fn team_response(pool: &PgPool, team: Team) -> Result<TeamResponse, sqlx::Error> {
    with_members(pool, vec![team])
        .await?
        .pop()
        .ok_or_else(|| sqlx::Error::Protocol("team enrichment returned no rows".into()))
}

/// Loads a team or fails with 404
pub(crate) async fn find_team(pool: &PgPool, id: Uuid) -> ApiResult<Team> {
    Team::find_by_id(pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Team not found".to_string()))
}

pub async fn create_team(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    JsonBody(req): JsonBody<CreateTeamRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<TeamResponse>>)> {
    req.validate()?;

    let team = Team::create(
        &state.db,
        auth.user_id,
        req.name.trim(),
        trim_optional(req.description),
    )
    .await?;

    info!(team_id = %team.id, created_by = %auth.user_id, "Team created");

    Ok(ApiResponse::created(
        "Team created successfully",
        team_response(&state.db, team).await?,
    ))
}

pub async fn list_teams(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<ApiResponse<Vec<TeamResponse>>>> {
    let teams = Team::list_for_user(&state.db, auth.user_id).await?;
    Ok(ApiResponse::ok(with_members(&state.db, teams).await?))
}

pub async fn list_participants(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<ApiResponse<Vec<Participant>>>> {
    let rows = ProjectMember::participants_of(&state.db, auth.user_id).await?;
    Ok(ApiResponse::ok(aggregate_participants(rows)))
}

pub async fn get_team(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<TeamResponse>>> {
    let team = find_team(&state.db, id).await?;
    require_team_access(&state.db, &team, auth.user_id).await?;

    Ok(ApiResponse::ok(team_response(&state.db, team).await?))
}

pub async fn update_team(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<UpdateTeamRequest>,
) -> ApiResult<Json<ApiResponse<TeamResponse>>> {
    req.validate()?;

    let team = find_team(&state.db, id).await?;
    require_team_manager(&state.db, &team, auth.user_id).await?;

    let update = UpdateTeam {
        name: req.name.map(|n| n.trim().to_string()),
        description: req.description.map(trim_optional),
    };

    let team = Team::update(&state.db, id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("Team not found".to_string()))?;

    info!(team_id = %id, user_id = %auth.user_id, "Team updated");

    Ok(ApiResponse::with_message(
        "Team updated successfully",
        team_response(&state.db, team).await?,
    ))
}

pub async fn delete_team(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let team = find_team(&state.db, id).await?;
    require_team_creator(&team, auth.user_id)?;

    Team::delete(&state.db, id).await?;

    info!(team_id = %id, "Team deleted");

    Ok(message_only("Team deleted successfully"))
}

pub async fn update_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((team_id, member_id)): Path<(Uuid, Uuid)>,
    JsonBody(req): JsonBody<UpdateMemberRequest>,
) -> ApiResult<Json<ApiResponse<TeamMember>>> {
    req.validate()?;

    let team = find_team(&state.db, team_id).await?;
    require_team_manager(&state.db, &team, auth.user_id).await?;

    let member = TeamMember::update(&state.db, team_id, member_id, req.into())
        .await?
        .ok_or_else(|| ApiError::NotFound("Team member not found".to_string()))?;

    Ok(ApiResponse::with_message("Team member updated", member))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((team_id, member_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let team = find_team(&state.db, team_id).await?;
    require_team_manager(&state.db, &team, auth.user_id).await?;

    if !TeamMember::remove(&state.db, team_id, member_id).await? {
        return Err(ApiError::NotFound("Team member not found".to_string()));
    }

    info!(team_id = %team_id, member_id = %member_id, "Team member removed");

    Ok(message_only("Team member removed"))
}
