/// Invitation lifecycle shared by teams and projects
///
/// - [`token`]: random token generation and hashing
/// - [`lifecycle`]: status machine, expiry and error type
///
/// Persistence lives in `models::team_invitation` and
/// `models::project_invitation`; the helpers here act on both tables.

pub mod lifecycle;
pub mod token;

use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::models::{project_invitation::ProjectInvitation, team_invitation::TeamInvitation};

pub use lifecycle::{InvitationError, InvitationStatus, DEFAULT_TTL_DAYS, MAX_TTL_DAYS};

/// Counts returned by the cross-table helpers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvitationCounts {
    pub team: u64,
    pub project: u64,
}

impl InvitationCounts {
    pub fn total(&self) -> u64 {
        self.team + self.project
    }
}

/// Attaches every unlinked pending invitation for `email` to a new account
///
/// Called right after an account is created so invitations sent before the
/// invitee registered show up in their pending lists. Pass the transaction
/// that created the account when there is one.
pub async fn link_pending_invitations(
    conn: &mut PgConnection,
    user_id: Uuid,
    email: &str,
) -> Result<InvitationCounts, sqlx::Error> {
    let counts = InvitationCounts {
        team: TeamInvitation::link_pending_to_user(conn, user_id, email).await?,
        project: ProjectInvitation::link_pending_to_user(conn, user_id, email).await?,
    };

    if counts.total() > 0 {
        info!(
            %user_id,
            team = counts.team,
            project = counts.project,
            "Linked pending invitations to new user"
        );
    }

    Ok(counts)
}

/// Marks every pending invitation past its expiry as expired, in both tables
pub async fn expire_stale_invitations(pool: &PgPool) -> Result<InvitationCounts, sqlx::Error> {
    Ok(InvitationCounts {
        team: TeamInvitation::expire_stale(pool).await?,
        project: ProjectInvitation::expire_stale(pool).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_total() {
        let counts = InvitationCounts { team: 2, project: 3 };
        assert_eq!(counts.total(), 5);
        assert_eq!(InvitationCounts::default().total(), 0);
    }
}
