/// Team invitations
///
/// # Schema
///
/// ```sql
/// CREATE TABLE team_invitations (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     team_id UUID NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
///     invited_user_id UUID REFERENCES users(id) ON DELETE SET NULL,
///     invited_by_user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     email TEXT NOT NULL,
///     first_name TEXT NOT NULL,
///     last_name TEXT NOT NULL,
///     phone TEXT,
///     role team_role NOT NULL DEFAULT 'member',
///     token_hash TEXT NOT NULL UNIQUE,
///     status invitation_status NOT NULL DEFAULT 'pending',
///     expires_at TIMESTAMPTZ NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// `invited_user_id` is null while the invitee has no account; it is filled
/// in by [`TeamInvitation::link_pending_to_user`] at signup or at acceptance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use super::team::{NewTeamMember, TeamMember, TeamRole};
use super::user::{normalize_email, CreateUser, User, UserSummary};
use crate::invitations::lifecycle::{self, InvitationError, InvitationStatus};
use crate::invitations::{self, token};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TeamInvitation {
    pub id: Uuid,
    pub team_id: Uuid,
    pub invited_user_id: Option<Uuid>,
    pub invited_by_user_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: TeamRole,
    #[serde(skip_serializing, default)]
    pub token_hash: String,
    pub status: InvitationStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTeamInvitation {
    pub team_id: Uuid,
    pub invited_user_id: Option<Uuid>,
    pub invited_by_user_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: TeamRole,
    pub ttl_days: i64,
}

/// Pending invitation joined with its team and inviter
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PendingTeamInvitationRow {
    #[sqlx(flatten)]
    pub invitation: TeamInvitation,
    pub team_name: String,
    pub team_description: Option<String>,
    pub inviter_email: String,
    pub inviter_full_name: String,
}

/// Pending invitation as shown to the invitee
#[derive(Debug, Clone, Serialize)]
pub struct PendingTeamInvitation {
    #[serde(flatten)]
    pub invitation: TeamInvitation,
    pub team_name: String,
    pub team_description: Option<String>,
    pub invited_by: UserSummary,
}

impl From<PendingTeamInvitationRow> for PendingTeamInvitation {
    fn from(row: PendingTeamInvitationRow) -> Self {
        let invited_by = UserSummary {
            id: row.invitation.invited_by_user_id,
            email: row.inviter_email,
            full_name: row.inviter_full_name,
        };
        Self {
            invitation: row.invitation,
            team_name: row.team_name,
            team_description: row.team_description,
            invited_by,
        }
    }
}

const INVITATION_COLUMNS: &str = "id, team_id, invited_user_id, invited_by_user_id, email, \
                                  first_name, last_name, phone, role, token_hash, status, \
                                  expires_at, created_at, updated_at";

impl TeamInvitation {
    /// Whether this invitation is addressed to `user`
    ///
    /// Linked invitations match on user id; unlinked ones on email.
    pub fn is_addressed_to(&self, user: &User) -> bool {
        match self.invited_user_id {
            Some(user_id) => user_id == user.id,
            None => lifecycle::emails_match(&self.email, &user.email),
        }
    }

    /// Creates an invitation and returns it with the plaintext token
    ///
    /// Stale pending invitations for the same team and email are marked
    /// expired first.
    pub async fn create(
        pool: &PgPool,
        data: NewTeamInvitation,
    ) -> Result<(Self, String), sqlx::Error> {
        let email = normalize_email(&data.email);
        let (token, token_hash) = token::generate_token();
        let expires_at = lifecycle::expires_at(Utc::now(), data.ttl_days);

        let mut tx = pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE team_invitations SET status = 'expired', updated_at = NOW()
            WHERE team_id = $1 AND email = $2 AND status = 'pending' AND expires_at < NOW()
            "#,
        )
        .bind(data.team_id)
        .bind(&email)
        .execute(&mut *tx)
        .await?;

        let invitation = sqlx::query_as::<_, TeamInvitation>(&format!(
            r#"
            INSERT INTO team_invitations
                (team_id, invited_user_id, invited_by_user_id, email, first_name, last_name,
                 phone, role, token_hash, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {INVITATION_COLUMNS}
            "#
        ))
        .bind(data.team_id)
        .bind(data.invited_user_id)
        .bind(data.invited_by_user_id)
        .bind(&email)
        .bind(data.first_name.trim())
        .bind(data.last_name.trim())
        .bind(data.phone)
        .bind(data.role)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            invitation_id = %invitation.id,
            team_id = %invitation.team_id,
            "Team invitation created"
        );

        Ok((invitation, token))
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TeamInvitation>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM team_invitations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Looks up an invitation by its plaintext token
    pub async fn find_by_token(pool: &PgPool, token: &str) -> Result<Option<Self>, sqlx::Error> {
        if !token::is_well_formed(token) {
            return Ok(None);
        }

        sqlx::query_as::<_, TeamInvitation>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM team_invitations WHERE token_hash = $1"
        ))
        .bind(token::hash_token(token))
        .fetch_optional(pool)
        .await
    }

    /// A pending, unexpired invitation for this team and email, if any
    pub async fn find_live_for_email(
        pool: &PgPool,
        team_id: Uuid,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TeamInvitation>(&format!(
            r#"
            SELECT {INVITATION_COLUMNS} FROM team_invitations
            WHERE team_id = $1 AND email = $2 AND status = 'pending' AND expires_at > NOW()
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(team_id)
        .bind(normalize_email(email))
        .fetch_optional(pool)
        .await
    }

    /// All invitations of a team, newest first
    pub async fn list_for_team(pool: &PgPool, team_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, TeamInvitation>(&format!(
            r#"
            SELECT {INVITATION_COLUMNS} FROM team_invitations
            WHERE team_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(team_id)
        .fetch_all(pool)
        .await
    }

    /// Live invitations addressed to a user, by id or (if unlinked) by email
    pub async fn list_pending_for_user(
        pool: &PgPool,
        user: &User,
    ) -> Result<Vec<PendingTeamInvitation>, sqlx::Error> {
        let rows = sqlx::query_as::<_, PendingTeamInvitationRow>(
            r#"
            SELECT i.id, i.team_id, i.invited_user_id, i.invited_by_user_id, i.email,
                   i.first_name, i.last_name, i.phone, i.role, i.token_hash, i.status,
                   i.expires_at, i.created_at, i.updated_at,
                   t.name AS team_name, t.description AS team_description,
                   u.email AS inviter_email, u.full_name AS inviter_full_name
            FROM team_invitations i
            JOIN teams t ON t.id = i.team_id
            JOIN users u ON u.id = i.invited_by_user_id
            WHERE i.status = 'pending'
              AND i.expires_at > NOW()
              AND (i.invited_user_id = $1 OR (i.invited_user_id IS NULL AND i.email = $2))
            ORDER BY i.created_at DESC
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(PendingTeamInvitation::from).collect())
    }

    /// Accepts the invitation for `user` and adds them to the team
    ///
    /// The status flip is conditional on the row still being pending and
    /// unexpired, and the membership insert ignores an existing row, so two
    /// concurrent acceptances produce one member and one error.
    ///
    /// Returns the new member, or `None` if the user was already a member
    /// (the invitation is still marked accepted).
    pub async fn accept(
        pool: &PgPool,
        invitation: &TeamInvitation,
        user: &User,
    ) -> Result<Option<TeamMember>, InvitationError> {
        let mut tx = pool.begin().await?;

        if !Self::claim(&mut *tx, invitation.id, user.id).await? {
            tx.rollback().await?;
            return Err(Self::resolution_error(pool, invitation.id).await);
        }

        let member = TeamMember::add(&mut *tx, invitation.membership_for(user)).await?;

        tx.commit().await?;

        info!(
            invitation_id = %invitation.id,
            team_id = %invitation.team_id,
            user_id = %user.id,
            already_member = member.is_none(),
            "Team invitation accepted"
        );

        Ok(member)
    }

    /// Creates the invitee's account and accepts in one transaction
    ///
    /// If the invitation cannot be claimed the account is rolled back with
    /// it. Other unlinked invitations for the email are linked to the new
    /// account before commit.
    pub async fn accept_with_new_user(
        pool: &PgPool,
        invitation: &TeamInvitation,
        data: CreateUser,
    ) -> Result<(User, TeamMember), InvitationError> {
        let mut tx = pool.begin().await?;

        let user = User::create(&mut *tx, data).await?;

        if !Self::claim(&mut *tx, invitation.id, user.id).await? {
            tx.rollback().await?;
            return Err(Self::resolution_error(pool, invitation.id).await);
        }

        let member = TeamMember::add(&mut *tx, invitation.membership_for(&user))
            .await?
            .ok_or(InvitationError::AlreadyMember)?;

        invitations::link_pending_invitations(&mut *tx, user.id, &user.email).await?;

        tx.commit().await?;

        info!(
            invitation_id = %invitation.id,
            team_id = %invitation.team_id,
            user_id = %user.id,
            "Account created from team invitation"
        );

        Ok((user, member))
    }

    /// Flips a pending, unexpired invitation to accepted for `user_id`
    ///
    /// Returns false when another request got there first or it expired.
    async fn claim(
        conn: &mut PgConnection,
        invitation_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let flipped: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE team_invitations
            SET status = 'accepted', invited_user_id = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending' AND expires_at >= NOW()
            RETURNING id
            "#,
        )
        .bind(invitation_id)
        .bind(user_id)
        .fetch_optional(conn)
        .await?;

        Ok(flipped.is_some())
    }

    fn membership_for(&self, user: &User) -> NewTeamMember {
        NewTeamMember {
            team_id: self.team_id,
            user_id: user.id,
            email: user.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            phone: self.phone.clone(),
            role: self.role,
        }
    }

    /// Rejects a pending invitation
    pub async fn reject(pool: &PgPool, id: Uuid) -> Result<Self, InvitationError> {
        let rejected = sqlx::query_as::<_, TeamInvitation>(&format!(
            r#"
            UPDATE team_invitations SET status = 'rejected', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {INVITATION_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        match rejected {
            Some(invitation) => {
                info!(invitation_id = %id, "Team invitation rejected");
                Ok(invitation)
            }
            None => Err(Self::resolution_error(pool, id).await),
        }
    }

    /// Persists `expired` on a pending invitation; returns whether it changed
    pub async fn mark_expired(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE team_invitations SET status = 'expired', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Marks every pending invitation past its expiry as expired
    pub async fn expire_stale(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE team_invitations SET status = 'expired', updated_at = NOW()
            WHERE status = 'pending' AND expires_at < NOW()
            "#,
        )
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Links unlinked pending invitations for `email` to a newly registered user
    pub async fn link_pending_to_user(
        conn: &mut PgConnection,
        user_id: Uuid,
        email: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE team_invitations SET invited_user_id = $1, updated_at = NOW()
            WHERE email = $2 AND status = 'pending' AND invited_user_id IS NULL
            "#,
        )
        .bind(user_id)
        .bind(normalize_email(email))
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Explains why a conditional status update matched no row
    async fn resolution_error(pool: &PgPool, id: Uuid) -> InvitationError {
        match Self::find_by_id(pool, id).await {
            Ok(Some(current)) => {
                match lifecycle::check_resolvable(current.status, current.expires_at, Utc::now()) {
                    Err(e) => e,
                    // Database clock says expired, ours does not yet
                    Ok(()) => InvitationError::Expired,
                }
            }
            Ok(None) => InvitationError::NotFound,
            Err(e) => InvitationError::Database(e),
        }
    }
}
