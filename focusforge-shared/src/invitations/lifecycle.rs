/// Invitation state machine
///
/// ```text
///            accept
///   pending ────────► accepted
///      │
///      ├────────────► rejected
///      │   reject
///      └────────────► expired
///         now > expires_at
/// ```
///
/// Every status other than `pending` is terminal. Expiry is checked on
/// read (an expired pending invitation is persisted as `expired` the first
/// time someone tries to use it) and by the worker's periodic sweep.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default invitation lifetime
pub const DEFAULT_TTL_DAYS: i64 = 7;

/// Longest configurable lifetime
pub const MAX_TTL_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "invitation_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Rejected => "rejected",
            InvitationStatus::Expired => "expired",
        }
    }

    /// Everything but `pending`; terminal invitations never change again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvitationStatus::Pending)
    }
}

impl std::fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from invitation operations
#[derive(Debug, thiserror::Error)]
pub enum InvitationError {
    #[error("Invitation not found")]
    NotFound,

    #[error("Invitation has already been {0}")]
    AlreadyResolved(InvitationStatus),

    #[error("Invitation has expired")]
    Expired,

    #[error("This invitation was sent to a different email address")]
    EmailMismatch,

    #[error("This invitation is not addressed to you")]
    NotAddressee,

    #[error("User is already a member")]
    AlreadyMember,

    #[error("An invitation has already been sent to this email")]
    AlreadyInvited,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Expiry timestamp for an invitation issued at `issued_at`
pub fn expires_at(issued_at: DateTime<Utc>, ttl_days: i64) -> DateTime<Utc> {
    issued_at + Duration::days(ttl_days)
}

/// Checks that an invitation can be accepted or rejected at `now`
///
/// The expiry instant itself is still valid. Status is checked before expiry: a rejected invitation past its expiry
/// reports `AlreadyResolved(Rejected)`, not `Expired`.
pub fn check_resolvable(
    status: InvitationStatus,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), InvitationError> {
    if status.is_terminal() {
        return Err(InvitationError::AlreadyResolved(status));
    }

    if now > expires_at {
        return Err(InvitationError::Expired);
    }

    Ok(())
}

/// Case- and whitespace-insensitive email comparison
pub fn emails_match(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_pending_is_open() {
        use InvitationStatus::*;

        assert!(!Pending.is_terminal());
        for status in [Accepted, Rejected, Expired] {
            assert!(status.is_terminal(), "{status}");
        }
    }

    #[test]
    fn test_expires_at_seven_days() {
        let issued = Utc::now();
        assert_eq!(expires_at(issued, DEFAULT_TTL_DAYS) - issued, Duration::days(7));
    }

    #[test]
    fn test_check_resolvable_pending_in_time() {
        let now = Utc::now();
        assert!(check_resolvable(InvitationStatus::Pending, now + Duration::days(1), now).is_ok());
        // Boundary instant is still valid
        assert!(check_resolvable(InvitationStatus::Pending, now, now).is_ok());
    }

    #[test]
    fn test_check_resolvable_expired() {
        let now = Utc::now();
        assert!(matches!(
            check_resolvable(InvitationStatus::Pending, now - Duration::seconds(1), now),
            Err(InvitationError::Expired)
        ));
    }

    #[test]
    fn test_status_checked_before_expiry() {
        let now = Utc::now();
        let past = now - Duration::days(30);

        assert!(matches!(
            check_resolvable(InvitationStatus::Rejected, past, now),
            Err(InvitationError::AlreadyResolved(InvitationStatus::Rejected))
        ));
        assert!(matches!(
            check_resolvable(InvitationStatus::Accepted, now + Duration::days(1), now),
            Err(InvitationError::AlreadyResolved(InvitationStatus::Accepted))
        ));
    }

    #[test]
    fn test_emails_match() {
        assert!(emails_match("Sam@Example.com", " sam@example.com"));
        assert!(!emails_match("sam@example.com", "sam@example.org"));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            InvitationError::AlreadyResolved(InvitationStatus::Accepted).to_string(),
            "Invitation has already been accepted"
        );
        assert_eq!(InvitationError::Expired.to_string(), "Invitation has expired");
    }
}
