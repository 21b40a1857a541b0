/// Request validation helpers used with `#[derive(Validate)]`

use crate::error::ApiError;
use serde::{Deserialize, Deserializer};
use validator::ValidationError;

/// Rejects strings that are empty after trimming
///
/// Reported as "<field> is required".
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Distinguishes an absent field from an explicit `null`
///
/// Use with `#[serde(default, deserialize_with = "deserialize_some")]` on an
/// `Option<Option<T>>`: absent → `None`, `null` → `Some(None)`.
pub fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Runs the password policy and reports failures against `field`
pub fn check_password(field: &str, password: &str) -> Result<(), ApiError> {
    focusforge_shared::auth::password::validate_password_strength(password)
        .map_err(|message| ApiError::invalid_field(field, message))
}

/// Trims optional free text, mapping blank to `None`
pub fn trim_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
