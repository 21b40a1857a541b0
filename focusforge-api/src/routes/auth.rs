/// Authentication endpoints
///
/// - `POST /api/auth/signup` - Create an account and get tokens
/// - `POST /api/auth/login` - Exchange credentials for tokens
/// - `POST /api/auth/refresh` - Exchange a refresh token for an access token
/// - `GET  /api/auth/me` - Current account
/// - `PUT  /api/auth/profile` - Change display name
/// - `PUT  /api/auth/change-password`
/// - `GET|PUT /api/auth/notification-preferences`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::JsonBody,
    response::ApiResponse,
    routes::current_user,
    validation::{check_password, not_blank},
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use focusforge_shared::{
    auth::{
        jwt::{self, Claims, TokenPair, TokenType},
        middleware::AuthContext,
        password,
    },
    invitations,
    models::user::{normalize_email, CreateUser, NotificationPreferences, User},
};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

/// Signup request
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct SignupRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Length is checked by the password policy
    pub password: String,

    #[validate(
        custom(function = "not_blank"),
        length(max = 100, message = "Full name must be at most 100 characters")
    )]
    pub full_name: String,
}

/// Login request
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(custom(function = "not_blank"))]
    pub password: String,
}

/// Account plus a fresh token pair
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,

    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// Refresh token request
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Refresh token response
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    /// New access token (24h)
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct UpdateProfileRequest {
    #[validate(
        custom(function = "not_blank"),
        length(max = 100, message = "Full name must be at most 100 characters")
    )]
    pub full_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Missing switches default to on
#[derive(Debug, Deserialize)]
pub struct UpdatePreferencesRequest {
    #[serde(default = "default_true")]
    pub email_notifications: bool,
    #[serde(default = "default_true")]
    pub new_comments: bool,
    #[serde(default = "default_true")]
    pub ticket_assignment: bool,
}

fn default_true() -> bool {
    true
}

impl From<UpdatePreferencesRequest> for NotificationPreferences {
    fn from(req: UpdatePreferencesRequest) -> Self {
        Self {
            email_notifications: req.email_notifications,
            new_comments: req.new_comments,
            ticket_assignment: req.ticket_assignment,
        }
    }
}

/// Creates an account
///
/// Pending team and project invitations already sent to this email are
/// linked to the new account so they appear in its pending lists.
///
/// # Errors
///
/// - `400 Bad Request`: invalid fields or the email is taken
pub async fn signup(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SignupRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<AuthResponse>>)> {
    req.validate()?;
    check_password("password", &req.password)?;

    let email = normalize_email(&req.email);
    if User::email_exists(&state.db, &email).await? {
        return Err(ApiError::BadRequest("User already exists".to_string()));
    }

    let password_hash = password::hash_password(&req.password)?;

    let mut tx = state.db.begin().await?;

    let user = User::create(
        &mut *tx,
        CreateUser {
            email,
            password_hash,
            full_name: req.full_name.trim().to_string(),
        },
    )
    .await?;

    invitations::link_pending_invitations(&mut *tx, user.id, &user.email).await?;

    tx.commit().await?;

    let tokens = jwt::issue_token_pair(user.id, state.jwt_secret())?;

    info!(user_id = %user.id, "User signed up");

    Ok(ApiResponse::created(
        "User created successfully",
        AuthResponse { user, tokens },
    ))
}

/// Logs in with email and password
///
/// # Errors
///
/// - `401 Unauthorized`: unknown email or wrong password (same message)
pub async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> ApiResult<Json<ApiResponse<AuthResponse>>> {
    req.validate()?;

    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let user = User::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(invalid)?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        return Err(invalid());
    }

    let tokens = jwt::issue_token_pair(user.id, state.jwt_secret())?;

    info!(user_id = %user.id, "User logged in");

    Ok(ApiResponse::with_message(
        "Login successful",
        AuthResponse { user, tokens },
    ))
}

/// Exchanges a refresh token for a new access token
///
/// Access tokens are rejected here, as refresh tokens are rejected by the
/// auth layer.
pub async fn refresh(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RefreshRequest>,
) -> ApiResult<Json<ApiResponse<RefreshResponse>>> {
    if req.refresh_token.trim().is_empty() {
        return Err(ApiError::Unauthorized("Missing refresh token".to_string()));
    }

    let claims = jwt::validate_refresh_token(req.refresh_token.trim(), state.jwt_secret())?;

    if User::find_by_id(&state.db, claims.sub).await?.is_none() {
        return Err(ApiError::Unauthorized("User no longer exists".to_string()));
    }

    let access_claims = Claims::new(claims.sub, TokenType::Access);
    let access_token = jwt::create_token(&access_claims, state.jwt_secret())?;

    Ok(ApiResponse::ok(RefreshResponse {
        access_token,
        token_type: "Bearer",
        expires_in: TokenType::Access.default_expiration().num_seconds(),
    }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<ApiResponse<User>>> {
    let user = current_user(&state, &auth).await?;
    Ok(ApiResponse::ok(user))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    JsonBody(req): JsonBody<UpdateProfileRequest>,
) -> ApiResult<Json<ApiResponse<User>>> {
    req.validate()?;

    let user = User::update_profile(&state.db, auth.user_id, req.full_name.trim())
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(ApiResponse::with_message("Profile updated successfully", user))
}

/// Changes the password after checking the current one
///
/// # Errors
///
/// - `400 Bad Request`: new password fails the policy
/// - `401 Unauthorized`: current password is wrong
pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    JsonBody(req): JsonBody<ChangePasswordRequest>,
) -> ApiResult<Json<ApiResponse<()>>> {
    check_password("new_password", &req.new_password)?;

    let user = current_user(&state, &auth).await?;

    if !password::verify_password(&req.current_password, &user.password_hash)? {
        return Err(ApiError::Unauthorized(
            "Current password is incorrect".to_string(),
        ));
    }

    let password_hash = password::hash_password(&req.new_password)?;
    User::update_password(&state.db, user.id, &password_hash).await?;

    info!(user_id = %user.id, "Password changed");

    Ok(ApiResponse::with_message("Password updated successfully", ()))
}

pub async fn get_notification_preferences(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<ApiResponse<NotificationPreferences>>> {
    let prefs = User::get_preferences(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(ApiResponse::ok(prefs))
}

pub async fn update_notification_preferences(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    JsonBody(req): JsonBody<UpdatePreferencesRequest>,
) -> ApiResult<Json<ApiResponse<NotificationPreferences>>> {
    let prefs = User::update_preferences(&state.db, auth.user_id, req.into())
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(ApiResponse::with_message(
        "Notification preferences updated",
        prefs,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signup_validation() {
        let req: SignupRequest = serde_json::from_str(
            r#"{"email": "not-an-email", "password": "secret1", "full_name": "Sam"}"#,
        )
        .unwrap();
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("email"));

        let req: SignupRequest = serde_json::from_str(
            r#"{"email": "sam@example.com", "password": "secret1", "full_name": "  "}"#,
        )
        .unwrap();
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("full_name"));

        let req: SignupRequest = serde_json::from_str(
            r#"{"email": "sam@example.com", "password": "secret1", "full_name": "Sam Lee"}"#,
        )
        .unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_missing_fields_reach_validation() {
        let req: SignupRequest = serde_json::from_str("{}").unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_preferences_default_to_true() {
        let req: UpdatePreferencesRequest =
            serde_json::from_str(r#"{"new_comments": false}"#).unwrap();
        let prefs: NotificationPreferences = req.into();

        assert!(prefs.email_notifications);
        assert!(!prefs.new_comments);
        assert!(prefs.ticket_assignment);
    }
}
