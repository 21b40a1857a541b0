/// API route handlers, one module per resource
///
/// - `health`: liveness and database check
/// - `auth`: signup, login, token refresh, profile and preferences
/// - `projects` / `project_invitations`
/// - `tickets`, `comments`, `notifications`
/// - `teams` / `team_invitations`

pub mod auth;
pub mod comments;
pub mod health;
pub mod notifications;
pub mod project_invitations;
pub mod projects;
pub mod team_invitations;
pub mod teams;
pub mod tickets;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use focusforge_shared::{auth::middleware::AuthContext, models::user::User};

/// Loads the authenticated caller's account
///
/// A valid token for a deleted account is treated as unauthenticated.
pub(crate) async fn current_user(state: &AppState, auth: &AuthContext) -> ApiResult<User> {
    User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User no longer exists".to_string()))
}

/// Name shown in notification text
pub(crate) fn display_name(user: &User) -> &str {
    if user.full_name.trim().is_empty() {
        &user.email
    } else {
        &user.full_name
    }
}
