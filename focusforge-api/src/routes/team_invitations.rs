/// Team invitation endpoints
///
/// - `POST /api/teams/:id/members` - Creator or team admin invites by email
/// - `GET  /api/teams/:id/invitations/statuses` - Invitee → status map
/// - `GET  /api/teams/invitations/pending` - Caller's live invitations
/// - `POST /api/teams/invitations/:id/accept`
/// - `POST /api/teams/invitations/:id/reject`
/// - `POST /api/teams/accept-invitation/:token` - Public; can create the account

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{JsonBody, Path},
    response::ApiResponse,
    routes::{
        current_user, display_name,
        teams::{find_team, team_response, TeamResponse},
    },
    validation::{check_password, not_blank, trim_optional},
};
use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use focusforge_shared::{
    auth::{
        authorization::{require_team_access, require_team_manager},
        jwt::{self, TokenPair},
        middleware::AuthContext,
        password,
    },
    invitations::{lifecycle, InvitationError, InvitationStatus},
    models::{
        notification::{NewNotification, Notification, NotificationKind},
        team::{Team, TeamMember, TeamRole},
        team_invitation::{NewTeamInvitation, PendingTeamInvitation, TeamInvitation},
        user::{normalize_email, CreateUser, User},
    },
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct InviteMemberRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(custom(function = "not_blank"))]
    pub first_name: String,

    #[validate(custom(function = "not_blank"))]
    pub last_name: String,

    #[validate(length(max = 32, message = "Phone must be at most 32 characters"))]
    pub phone: Option<String>,

    /// `member` (default) or `admin`
    pub role: Option<TeamRole>,
}

#[derive(Debug, Serialize)]
pub struct InvitationCreated {
    pub invitation: TeamInvitation,

    /// Link the invitee opens; carries the only copy of the token
    pub invitation_url: String,
}

/// Body of the public token acceptance
///
/// `password` (and optionally `full_name`) are only used when no account
/// exists for `email` yet.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct AcceptByTokenRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub full_name: Option<String>,

    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AcceptedInvitation {
    pub user: User,

    pub team: TeamResponse,

    /// Whether the account was created by this request
    pub new_account: bool,

    /// Present only for newly created accounts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenPair>,
}

/// Latest invitation status per invitee
///
/// Keys are the linked user id, or the email when no account is linked.
/// Expects invitations newest first; the first one seen per key wins.
pub fn status_map(invitations: &[TeamInvitation]) -> BTreeMap<String, InvitationStatus> {
    let mut statuses = BTreeMap::new();
    for invitation in invitations {
        let key = invitation
            .invited_user_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| invitation.email.clone());
        statuses.entry(key).or_insert(invitation.status);
    }
    statuses
}

/// Status and expiry gate shared by every accept path
///
/// An expired pending invitation is persisted as expired before the 410.
async fn ensure_resolvable(state: &AppState, invitation: &TeamInvitation) -> ApiResult<()> {
    match lifecycle::check_resolvable(invitation.status, invitation.expires_at, Utc::now()) {
        Ok(()) => Ok(()),
        Err(InvitationError::Expired) => {
            TeamInvitation::mark_expired(&state.db, invitation.id).await?;
            Err(InvitationError::Expired.into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn notify_inviter(
    state: &AppState,
    invitation: &TeamInvitation,
    team: &Team,
    invitee: &User,
    accepted: bool,
) {
    let (kind, title, verb) = if accepted {
        (NotificationKind::TeamInvitationAccepted, "Invitation accepted", "accepted")
    } else {
        (NotificationKind::TeamInvitationRejected, "Invitation declined", "declined")
    };

    Notification::notify(
        &state.db,
        NewNotification::new(
            invitation.invited_by_user_id,
            kind,
            title,
            format!(
                "{} {} your invitation to join the team \"{}\"",
                display_name(invitee),
                verb,
                team.name
            ),
        )
        .team(team.id),
    )
    .await;
}

/// Invites someone to a team by email
///
/// # Errors
///
/// - `400 Bad Request`: already a member, or a live invitation exists
/// - `403 Forbidden`: caller is neither creator nor team admin
pub async fn invite_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(team_id): Path<Uuid>,
    JsonBody(req): JsonBody<InviteMemberRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<InvitationCreated>>)> {
    req.validate()?;

    let team = find_team(&state.db, team_id).await?;
    require_team_manager(&state.db, &team, auth.user_id).await?;

    let email = normalize_email(&req.email);

    if TeamMember::email_is_member(&state.db, team_id, &email).await? {
        return Err(InvitationError::AlreadyMember.into());
    }
    if TeamInvitation::find_live_for_email(&state.db, team_id, &email)
        .await?
        .is_some()
    {
        return Err(InvitationError::AlreadyInvited.into());
    }

    let inviter = current_user(&state, &auth).await?;
    let invitee = User::find_by_email(&state.db, &email).await?;

    let (invitation, token) = TeamInvitation::create(
        &state.db,
        NewTeamInvitation {
            team_id,
            invited_user_id: invitee.as_ref().map(|u| u.id),
            invited_by_user_id: inviter.id,
            email,
            first_name: req.first_name,
            last_name: req.last_name,
            phone: trim_optional(req.phone),
            role: req.role.unwrap_or_default(),
            ttl_days: state.config.invitations.ttl_days,
        },
    )
    .await?;

    let invitation_url = state.config.invitation_link("accept-invitation", &token);

    // Stand-in for email delivery
    info!(
        invitation_id = %invitation.id,
        team_id = %team_id,
        email = %invitation.email,
        %invitation_url,
        "Team invitation issued"
    );

    if let Some(invitee) = invitee {
        Notification::notify(
            &state.db,
            NewNotification::new(
                invitee.id,
                NotificationKind::TeamInvitation,
                "Team invitation",
                format!(
                    "{} invited you to join the team \"{}\"",
                    display_name(&inviter),
                    team.name
                ),
            )
            .team(team_id),
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

pub async fn invitation_statuses(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(team_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<BTreeMap<String, InvitationStatus>>>> {
    let team = find_team(&state.db, team_id).await?;
    require_team_access(&state.db, &team, auth.user_id).await?;

    let invitations = TeamInvitation::list_for_team(&state.db, team_id).await?;
    Ok(ApiResponse::ok(status_map(&invitations)))
}

pub async fn list_pending(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<ApiResponse<Vec<PendingTeamInvitation>>>> {
    let user = current_user(&state, &auth).await?;
    let invitations = TeamInvitation::list_pending_for_user(&state.db, &user).await?;
    Ok(ApiResponse::ok(invitations))
}

/// Accepts an invitation by id for the signed-in caller
///
/// Allowed when the invitation is linked to the caller, or unlinked and
/// sent to the caller's email. Accepting while already a member still
/// marks the invitation accepted.
///
/// # Errors
///
/// - `404 Not Found`: unknown invitation
/// - `403 Forbidden`: addressed to someone else
/// - `410 Gone`: expired (persisted as `expired`)
/// - `400 Bad Request`: no longer pending
pub async fn accept_invitation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(invitation_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<TeamResponse>>> {
    let invitation = TeamInvitation::find_by_id(&state.db, invitation_id)
        .await?
        .ok_or(InvitationError::NotFound)?;

    let user = current_user(&state, &auth).await?;
    if !invitation.is_addressed_to(&user) {
        return Err(InvitationError::NotAddressee.into());
    }

    ensure_resolvable(&state, &invitation).await?;

    let joined = TeamInvitation::accept(&state.db, &invitation, &user).await?;
    let team = find_team(&state.db, invitation.team_id).await?;

    notify_inviter(&state, &invitation, &team, &user, true).await;

    let message = if joined.is_some() {
        "Invitation accepted successfully"
    } else {
        "You are already a member of this team"
    };

    Ok(ApiResponse::with_message(
        message,
        team_response(&state.db, team).await?,
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
) -> ApiResult<Json<ApiResponse<TeamInvitation>>> {
    let invitation = TeamInvitation::find_by_id(&state.db, invitation_id)
        .await?
        .ok_or(InvitationError::NotFound)?;

    let user = current_user(&state, &auth).await?;
    if !invitation.is_addressed_to(&user) {
        return Err(InvitationError::NotAddressee.into());
    }

    if invitation.status != InvitationStatus::Pending {
        return Err(InvitationError::AlreadyResolved(invitation.status).into());
    }

    let rejected = TeamInvitation::reject(&state.db, invitation.id).await?;

    if let Ok(team) = find_team(&state.db, invitation.team_id).await {
        notify_inviter(&state, &invitation, &team, &user, false).await;
    }

    Ok(ApiResponse::with_message("Invitation rejected", rejected))
}

/// Accepts an invitation from the emailed link, without a session
///
/// When no account exists for the email one is created (password of at
/// least 6 characters required) and a token pair is returned for it. The
/// account is only kept if the invitation is accepted.
///
/// # Errors
///
/// - `404 Not Found`: unknown token, or the invitation is no longer pending
/// - `410 Gone`: expired (persisted as `expired`)
/// - `400 Bad Request`: email differs, or the new account's password fails
///   the policy
pub async fn accept_by_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
    JsonBody(req): JsonBody<AcceptByTokenRequest>,
) -> ApiResult<Json<ApiResponse<AcceptedInvitation>>> {
    req.validate()?;

    let not_found = || ApiError::NotFound("Invalid or expired invitation token".to_string());
    let used_link = |e: InvitationError| match e {
        InvitationError::AlreadyResolved(_) | InvitationError::NotFound => not_found(),
        other => other.into(),
    };

    let invitation = TeamInvitation::find_by_token(&state.db, &token)
        .await?
        .ok_or_else(not_found)?;

    if invitation.status != InvitationStatus::Pending {
        return Err(not_found());
    }
    ensure_resolvable(&state, &invitation).await?;

    if !lifecycle::emails_match(&invitation.email, &req.email) {
        return Err(InvitationError::EmailMismatch.into());
    }

    let (user, new_account) = match User::find_by_email(&state.db, &invitation.email).await? {
        Some(user) => {
            TeamInvitation::accept(&state.db, &invitation, &user)
                .await
                .map_err(used_link)?;
            (user, false)
        }
        None => {
            let new_password = req.password.as_deref().unwrap_or_default();
            check_password("password", new_password)?;

            let full_name = trim_optional(req.full_name).unwrap_or_else(|| {
                format!("{} {}", invitation.first_name, invitation.last_name)
                    .trim()
                    .to_string()
            });

            let (user, _) = TeamInvitation::accept_with_new_user(
                &state.db,
                &invitation,
                CreateUser {
                    email: invitation.email.clone(),
                    password_hash: password::hash_password(new_password)?,
                    full_name,
                },
            )
            .await
            .map_err(used_link)?;
            (user, true)
        }
    };

    let team = find_team(&state.db, invitation.team_id).await?;

    notify_inviter(&state, &invitation, &team, &user, true).await;

    let tokens = if new_account {
        Some(jwt::issue_token_pair(user.id, state.jwt_secret())?)
    } else {
        None
    };

    Ok(ApiResponse::with_message(
        "Invitation accepted successfully",
        AcceptedInvitation {
            user,
            team: team_response(&state.db, team).await?,
            new_account,
            tokens,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn invitation(
        invited_user_id: Option<Uuid>,
        email: &str,
        status: InvitationStatus,
    ) -> TeamInvitation {
        let now = Utc::now();
        TeamInvitation {
            id: Uuid::new_v4(),
            team_id: Uuid::new_v4(),
            invited_user_id,
            invited_by_user_id: Uuid::new_v4(),
            email: email.to_string(),
            first_name: "Sam".to_string(),
            last_name: "Lee".to_string(),
            phone: None,
            role: TeamRole::Member,
            token_hash: String::new(),
            status,
            expires_at: now + Duration::days(7),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_status_map_keys() {
        let linked = Uuid::new_v4();
        let map = status_map(&[
            invitation(Some(linked), "a@example.com", InvitationStatus::Accepted),
            invitation(None, "b@example.com", InvitationStatus::Pending),
        ]);

        assert_eq!(map.get(&linked.to_string()), Some(&InvitationStatus::Accepted));
        assert_eq!(map.get("b@example.com"), Some(&InvitationStatus::Pending));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_status_map_newest_wins() {
        let map = status_map(&[
            invitation(None, "c@example.com", InvitationStatus::Pending),
            invitation(None, "c@example.com", InvitationStatus::Expired),
        ]);

        assert_eq!(map.get("c@example.com"), Some(&InvitationStatus::Pending));
    }

    #[test]
    fn test_accept_request_validation() {
        let req: AcceptByTokenRequest =
            serde_json::from_str(r#"{"email": "sam@example.com"}"#).unwrap();
        assert!(req.validate().is_ok());
        assert!(req.password.is_none());

        let req: AcceptByTokenRequest = serde_json::from_str("{}").unwrap();
        assert!(req.validate().is_err());
    }
}
