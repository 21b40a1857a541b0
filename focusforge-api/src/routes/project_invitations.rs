/// Project invitation endpoints
///
/// - `POST /api/projects/:id/invite` - Owner or admin invites by email
/// - `GET  /api/projects/:id/invitations` - Owner or admin lists all
/// - `GET  /api/projects/invitations/pending` - Caller's live invitations
/// - `POST /api/projects/invitations/:token/accept`
/// - `POST /api/projects/invitations/:id/reject`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{JsonBody, Path},
    response::ApiResponse,
    routes::{
        current_user, display_name,
        projects::{find_project, project_response, ProjectResponse},
    },
    validation::not_blank,
};
use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use focusforge_shared::{
    auth::{authorization::require_project_role, middleware::AuthContext},
    invitations::{lifecycle, InvitationError, InvitationStatus},
    models::{
        notification::{NewNotification, Notification, NotificationKind},
        project_invitation::{NewProjectInvitation, PendingProjectInvitation, ProjectInvitation},
        project_member::{ProjectMember, ProjectRole},
        user::{normalize_email, User},
    },
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct InviteRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(custom(function = "not_blank"))]
    pub first_name: String,

    #[validate(custom(function = "not_blank"))]
    pub last_name: String,

    /// `member` (default) or `admin`
    pub role: Option<ProjectRole>,
}

#[derive(Debug, Serialize)]
pub struct InvitationCreated {
    pub invitation: ProjectInvitation,

    /// Link the invitee opens; carries the only copy of the token
    pub invitation_url: String,
}

/// Role an invitation grants; ownership cannot be handed out this way
fn invited_role(requested: Option<ProjectRole>) -> ApiResult<ProjectRole> {
    match requested.unwrap_or(ProjectRole::Member) {
        ProjectRole::Owner => Err(ApiError::invalid_field(
            "role",
            "Role must be member or admin",
        )),
        role => Ok(role),
    }
}

pub async fn invite(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(project_id): Path<Uuid>,
    JsonBody(req): JsonBody<InviteRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<InvitationCreated>>)> {
    req.validate()?;
    let role = invited_role(req.role)?;

    let project = find_project(&state.db, project_id).await?;
    require_project_role(&state.db, project_id, auth.user_id, ProjectRole::Admin).await?;

    let email = normalize_email(&req.email);

    if ProjectMember::email_is_member(&state.db, project_id, &email).await? {
        return Err(InvitationError::AlreadyMember.into());
    }
    if ProjectInvitation::find_live_for_email(&state.db, project_id, &email)
        .await?
        .is_some()
    {
        return Err(InvitationError::AlreadyInvited.into());
    }

    let inviter = current_user(&state, &auth).await?;
    let invitee = User::find_by_email(&state.db, &email).await?;

    let (invitation, token) = ProjectInvitation::create(
        &state.db,
        NewProjectInvitation {
            project_id,
            invited_user_id: invitee.as_ref().map(|u| u.id),
            invited_by_user_id: inviter.id,
            email,
            first_name: req.first_name,
            last_name: req.last_name,
            role,
            ttl_days: state.config.invitations.ttl_days,
        },
    )
    .await?;

    let invitation_url = state
        .config
        .invitation_link("accept-project-invitation", &token);

    // Stand-in for email delivery
    info!(
        invitation_id = %invitation.id,
        project_id = %project_id,
        email = %invitation.email,
        %invitation_url,
        "Project invitation issued"
    );

    if let Some(invitee) = invitee {
        Notification::notify(
            &state.db,
            NewNotification::new(
                invitee.id,
                NotificationKind::ProjectInvitation,
                "Project invitation",
                format!(
                    "{} invited you to join the project \"{}\"",
                    display_name(&inviter),
                    project.name
                ),
            )
            .project(project_id),
        )
        .await;
    }

    Ok(ApiResponse::created(
        "Invitation sent successfully",
        InvitationCreated {
            invitation,
            invitation_url,
        },
    ))
}

pub async fn list_for_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Vec<ProjectInvitation>>>> {
    find_project(&state.db, project_id).await?;
    require_project_role(&state.db, project_id, auth.user_id, ProjectRole::Admin).await?;

    let invitations = ProjectInvitation::list_for_project(&state.db, project_id).await?;
    Ok(ApiResponse::ok(invitations))
}

pub async fn list_pending(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<ApiResponse<Vec<PendingProjectInvitation>>>> {
    let user = current_user(&state, &auth).await?;
    let invitations = ProjectInvitation::list_pending_for_user(&state.db, &user).await?;
    Ok(ApiResponse::ok(invitations))
}

/// Accepts an invitation by its token and joins the project
///
/// # Errors
///
/// - `404 Not Found`: unknown token, or the invitation is no longer pending
/// - `410 Gone`: expired (persisted as `expired`)
/// - `400 Bad Request`: sent to a different email address
pub async fn accept_invitation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(token): Path<String>,
) -> ApiResult<Json<ApiResponse<ProjectResponse>>> {
    let not_found = || ApiError::NotFound("Invitation not found or already processed".to_string());

    let invitation = ProjectInvitation::find_by_token(&state.db, &token)
        .await?
        .ok_or_else(not_found)?;

    match lifecycle::check_resolvable(invitation.status, invitation.expires_at, Utc::now()) {
        Ok(()) => {}
        Err(InvitationError::Expired) => {
            ProjectInvitation::mark_expired(&state.db, invitation.id).await?;
            return Err(InvitationError::Expired.into());
        }
        Err(_) => return Err(not_found()),
    }

    let user = current_user(&state, &auth).await?;
    if !lifecycle::emails_match(&invitation.email, &user.email) {
        return Err(InvitationError::EmailMismatch.into());
    }

    ProjectInvitation::accept(&state.db, &invitation, &user)
        .await
        .map_err(|e| match e {
            InvitationError::AlreadyResolved(_) | InvitationError::NotFound => not_found(),
            other => other.into(),
        })?;

    let project = find_project(&state.db, invitation.project_id).await?;

    Notification::notify(
        &state.db,
        NewNotification::new(
            invitation.invited_by_user_id,
            NotificationKind::ProjectInvitationAccepted,
            "Invitation accepted",
            format!(
                "{} accepted your invitation to join \"{}\"",
                display_name(&user),
                project.name
            ),
        )
        .project(project.id),
    )
    .await;

    Ok(ApiResponse::with_message(
        "Invitation accepted successfully",
        project_response(&state.db, project).await?,
    ))
}

/// Rejects an invitation by id
///
/// # Errors
///
/// - `404 Not Found`: unknown invitation
/// - `403 Forbidden`: addressed to someone else
/// - `400 Bad Request`: no longer pending
pub async fn reject_invitation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(invitation_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<ProjectInvitation>>> {
    let invitation = ProjectInvitation::find_by_id(&state.db, invitation_id)
        .await?
        .ok_or(InvitationError::NotFound)?;

    let user = current_user(&state, &auth).await?;
    if !invitation.is_addressed_to(&user) {
        return Err(InvitationError::NotAddressee.into());
    }

    if invitation.status != InvitationStatus::Pending {
        return Err(InvitationError::AlreadyResolved(invitation.status).into());
    }

    let rejected = ProjectInvitation::reject(&state.db, invitation.id).await?;

    let project_name = find_project(&state.db, invitation.project_id)
        .await
        .map(|p| p.name)
        .unwrap_or_default();

    Notification::notify(
        &state.db,
        NewNotification::new(
            invitation.invited_by_user_id,
            NotificationKind::ProjectInvitationRejected,
            "Invitation declined",
            format!(
                "{} declined your invitation to join \"{}\"",
                display_name(&user),
                project_name
            ),
        )
        .project(invitation.project_id),
    )
    .await;

    Ok(ApiResponse::with_message("Invitation rejected", rejected))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invited_role() {
        assert_eq!(invited_role(None).unwrap(), ProjectRole::Member);
        assert_eq!(invited_role(Some(ProjectRole::Admin)).unwrap(), ProjectRole::Admin);
        assert!(matches!(
            invited_role(Some(ProjectRole::Owner)),
            Err(ApiError::ValidationError(_))
        ));
    }

    #[test]
    fn test_invite_request_validation() {
        let req: InviteRequest = serde_json::from_str(
            r#"{"email": "new@example.com", "first_name": "New", "last_name": "Person"}"#,
        )
        .unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.role, None);

        let req: InviteRequest =
            serde_json::from_str(r#"{"email": "bad", "first_name": "", "last_name": "X"}"#)
                .unwrap();
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("first_name"));
    }
}
