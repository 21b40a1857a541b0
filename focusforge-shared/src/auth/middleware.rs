/// Bearer-token authentication context
///
/// The API server's auth layer calls [`AuthContext::from_headers`] on every
/// protected request and inserts the result into request extensions.
/// Handlers read it back with `Extension<AuthContext>`.
///
/// # Example
///
/// ```
/// use axum::Extension;
/// use focusforge_shared::auth::middleware::AuthContext;
///
/// async fn handler(Extension(auth): Extension<AuthContext>) -> String {
///     format!("User: {}", auth.user_id)
/// }
/// ```

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::jwt::{validate_access_token, JwtError};

/// Authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: Uuid,
}

impl AuthContext {
    pub fn new(user_id: Uuid) -> Self {
        Self { user_id }
    }

    /// Authenticates a request from its `Authorization: Bearer <token>` header
    ///
    /// # Errors
    ///
    /// - `MissingCredentials` when the header is absent or not valid UTF-8
    /// - `InvalidFormat` when the scheme is not `Bearer`
    /// - `InvalidToken` when the token fails validation or is a refresh token
    pub fn from_headers(headers: &HeaderMap, secret: &str) -> Result<Self, AuthError> {
        let auth_header = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingCredentials)?;

        Self::from_bearer(auth_header, secret)
    }

    /// Authenticates a raw `Authorization` header value
    pub fn from_bearer(auth_header: &str, secret: &str) -> Result<Self, AuthError> {
        let token = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidFormat)?;

        let claims = validate_access_token(token, secret).map_err(|e| match e {
            JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
            JwtError::InvalidIssuer => AuthError::InvalidToken("Invalid issuer".to_string()),
            other => AuthError::InvalidToken(other.to_string()),
        })?;

        Ok(Self::new(claims.sub))
    }
}

/// Error type for request authentication
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authorization header")]
    MissingCredentials,

    #[error("Expected Bearer token")]
    InvalidFormat,

    #[error("Invalid token: {0}")]
    InvalidToken(String),
}
