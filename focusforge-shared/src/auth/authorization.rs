/// Authorization checks for projects and teams
///
/// # Permission Model
///
/// **Projects** use the `project_members` role hierarchy
/// (Owner > Admin > Member):
/// - any member reads the project and works on tickets and comments
/// - owner or admin edits the project and invites people
/// - only the owner deletes the project
///
/// **Teams** have an implicit creator plus member rows:
/// - creator or any member can view the team
/// - creator or a member with role `admin` can edit the team and invite
/// - only the creator deletes the team
///
/// Checks assume the resource exists; callers look it up first so a
/// missing resource is a 404 before it can be a 403.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::project_member::{ProjectMember, ProjectRole};
use crate::models::team::{Team, TeamMember, TeamRole};

/// Error type for authorization checks
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// Caller is not a member of the project
    #[error("You are not a member of this project")]
    NotProjectMember,

    /// Caller's role is too weak
    #[error("Insufficient permissions: requires {required:?}, has {actual:?}")]
    InsufficientRole {
        required: ProjectRole,
        actual: ProjectRole,
    },

    /// Any other refusal, with the message shown to the caller
    #[error("{0}")]
    NotAuthorized(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Requires project membership and returns the caller's role
pub async fn require_project_member(
    pool: &PgPool,
    project_id: Uuid,
    user_id: Uuid,
) -> Result<ProjectRole, AuthzError> {
    ProjectMember::get_role(pool, project_id, user_id)
        .await?
        .ok_or(AuthzError::NotProjectMember)
}

/// Requires at least `required` in the project
pub async fn require_project_role(
    pool: &PgPool,
    project_id: Uuid,
    user_id: Uuid,
    required: ProjectRole,
) -> Result<ProjectRole, AuthzError> {
    let role = require_project_member(pool, project_id, user_id).await?;
    check_role(role, required)?;
    Ok(role)
}

/// Pure role comparison used by [`require_project_role`]
pub fn check_role(actual: ProjectRole, required: ProjectRole) -> Result<(), AuthzError> {
    if !actual.has_permission(&required) {
        return Err(AuthzError::InsufficientRole { required, actual });
    }
    Ok(())
}

/// Requires `user_id` to be `owner_id`
pub fn require_ownership(
    user_id: Uuid,
    owner_id: Uuid,
    message: &str,
) -> Result<(), AuthzError> {
    if user_id != owner_id {
        return Err(AuthzError::NotAuthorized(message.to_string()));
    }
    Ok(())
}

/// Creator or any member may view the team
pub async fn require_team_access(
    pool: &PgPool,
    team: &Team,
    user_id: Uuid,
) -> Result<(), AuthzError> {
    if team.is_creator(user_id) {
        return Ok(());
    }

    match TeamMember::find_by_user(pool, team.id, user_id).await? {
        Some(_) => Ok(()),
        None => Err(AuthzError::NotAuthorized(
            "You do not have access to this team".to_string(),
        )),
    }
}

/// Creator or a team admin may edit the team and manage members
pub async fn require_team_manager(
    pool: &PgPool,
    team: &Team,
    user_id: Uuid,
) -> Result<(), AuthzError> {
    if team.is_creator(user_id) {
        return Ok(());
    }

    match TeamMember::find_by_user(pool, team.id, user_id).await? {
        Some(member) if member.role == TeamRole::Admin => Ok(()),
        _ => Err(AuthzError::NotAuthorized(
            "Only the team creator or a team admin can do this".to_string(),
        )),
    }
}

/// Only the creator may delete the team
pub fn require_team_creator(team: &Team, user_id: Uuid) -> Result<(), AuthzError> {
    if !team.is_creator(user_id) {
        return Err(AuthzError::NotAuthorized(
            "Only the team creator can delete the team".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_check_role() {
        assert!(check_role(ProjectRole::Owner, ProjectRole::Admin).is_ok());
        assert!(check_role(ProjectRole::Admin, ProjectRole::Admin).is_ok());
        assert!(matches!(
            check_role(ProjectRole::Member, ProjectRole::Admin),
            Err(AuthzError::InsufficientRole {
                required: ProjectRole::Admin,
                actual: ProjectRole::Member
            })
        ));
        assert!(check_role(ProjectRole::Admin, ProjectRole::Owner).is_err());
    }

    #[test]
    fn test_require_ownership() {
        let user_id = Uuid::new_v4();
        assert!(require_ownership(user_id, user_id, "nope").is_ok());

        let err = require_ownership(user_id, Uuid::new_v4(), "Only owner can delete").unwrap_err();
        assert_eq!(err.to_string(), "Only owner can delete");
    }

    #[test]
    fn test_require_team_creator() {
        let creator = Uuid::new_v4();
        let team = Team {
            id: Uuid::new_v4(),
            name: "Design".to_string(),
            description: None,
            created_by: Some(creator),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(require_team_creator(&team, creator).is_ok());
        assert!(require_team_creator(&team, Uuid::new_v4()).is_err());
    }
}
