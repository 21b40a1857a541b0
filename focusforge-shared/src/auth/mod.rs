/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and length rules
/// - [`jwt`]: HS256 access/refresh token issue and validation
/// - [`middleware`]: Bearer header parsing into an [`middleware::AuthContext`]
/// - [`authorization`]: project role and team access checks
///
/// # Example
///
/// ```no_run
/// use focusforge_shared::auth::password::{hash_password, verify_password};
/// use focusforge_shared::auth::jwt::{create_token, Claims, TokenType};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("user_password")?;
/// assert!(verify_password("user_password", &hash)?);
///
/// let claims = Claims::new(Uuid::new_v4(), TokenType::Access);
/// let token = create_token(&claims, "secret-key")?;
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
