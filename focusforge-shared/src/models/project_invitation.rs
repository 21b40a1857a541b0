/// Project invitations
///
/// # Schema
///
/// ```sql
/// CREATE TABLE project_invitations (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
///     invited_user_id UUID REFERENCES users(id) ON DELETE SET NULL,
///     invited_by_user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     email TEXT NOT NULL,
///     first_name TEXT NOT NULL,
///     last_name TEXT NOT NULL,
///     role project_role NOT NULL DEFAULT 'member',
///     token_hash TEXT NOT NULL UNIQUE,
///     status invitation_status NOT NULL DEFAULT 'pending',
///     expires_at TIMESTAMPTZ NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CHECK (role <> 'owner')
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use super::project_member::{ProjectMember, ProjectRole};
use super::user::{normalize_email, User, UserSummary};
use crate::invitations::lifecycle::{self, InvitationError, InvitationStatus};
use crate::invitations::token;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectInvitation {
    pub id: Uuid,
    pub project_id: Uuid,
    pub invited_user_id: Option<Uuid>,
    pub invited_by_user_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: ProjectRole,
    #[serde(skip_serializing, default)]
    pub token_hash: String,
    pub status: InvitationStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProjectInvitation {
    pub project_id: Uuid,
    pub invited_user_id: Option<Uuid>,
    pub invited_by_user_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// `Admin` or `Member`; the table rejects `Owner`
    pub role: ProjectRole,
    pub ttl_days: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PendingProjectInvitationRow {
    #[sqlx(flatten)]
    pub invitation: ProjectInvitation,
    pub project_name: String,
    pub project_description: Option<String>,
    pub inviter_email: String,
    pub inviter_full_name: String,
}

/// Pending invitation as shown to the invitee
#[derive(Debug, Clone, Serialize)]
pub struct PendingProjectInvitation {
    #[serde(flatten)]
    pub invitation: ProjectInvitation,
    pub project_name: String,
    pub project_description: Option<String>,
    pub invited_by: UserSummary,
}

impl From<PendingProjectInvitationRow> for PendingProjectInvitation {
    fn from(row: PendingProjectInvitationRow) -> Self {
        let invited_by = UserSummary {
            id: row.invitation.invited_by_user_id,
            email: row.inviter_email,
            full_name: row.inviter_full_name,
        };
        Self {
            invitation: row.invitation,
            project_name: row.project_name,
            project_description: row.project_description,
            invited_by,
        }
    }
}

const INVITATION_COLUMNS: &str = "id, project_id, invited_user_id, invited_by_user_id, email, \
                                  first_name, last_name, role, token_hash, status, expires_at, \
                                  created_at, updated_at";

impl ProjectInvitation {
    /// Whether this invitation is addressed to `user`
    pub fn is_addressed_to(&self, user: &User) -> bool {
        match self.invited_user_id {
            Some(user_id) => user_id == user.id,
            None => lifecycle::emails_match(&self.email, &user.email),
        }
    }

    /// Creates an invitation and returns it with the plaintext token
    pub async fn create(
        pool: &PgPool,
        data: NewProjectInvitation,
    ) -> Result<(Self, String), sqlx::Error> {
        let email = normalize_email(&data.email);
        let (token, token_hash) = token::generate_token();
        let expires_at = lifecycle::expires_at(Utc::now(), data.ttl_days);

        let mut tx = pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE project_invitations SET status = 'expired', updated_at = NOW()
            WHERE project_id = $1 AND email = $2 AND status = 'pending' AND expires_at < NOW()
            "#,
        )
        .bind(data.project_id)
        .bind(&email)
        .execute(&mut *tx)
        .await?;

        let invitation = sqlx::query_as::<_, ProjectInvitation>(&format!(
            r#"
            INSERT INTO project_invitations
                (project_id, invited_user_id, invited_by_user_id, email, first_name, last_name,
                 role, token_hash, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {INVITATION_COLUMNS}
            "#
        ))
        .bind(data.project_id)
        .bind(data.invited_user_id)
        .bind(data.invited_by_user_id)
        .bind(&email)
        .bind(data.first_name.trim())
        .bind(data.last_name.trim())
        .bind(data.role)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            invitation_id = %invitation.id,
            project_id = %invitation.project_id,
            "Project invitation created"
        );

        Ok((invitation, token))
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ProjectInvitation>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM project_invitations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_token(pool: &PgPool, token: &str) -> Result<Option<Self>, sqlx::Error> {
        if !token::is_well_formed(token) {
            return Ok(None);
        }

        sqlx::query_as::<_, ProjectInvitation>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM project_invitations WHERE token_hash = $1"
        ))
        .bind(token::hash_token(token))
        .fetch_optional(pool)
        .await
    }

    pub async fn find_live_for_email(
        pool: &PgPool,
        project_id: Uuid,
        email: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ProjectInvitation>(&format!(
            r#"
            SELECT {INVITATION_COLUMNS} FROM project_invitations
            WHERE project_id = $1 AND email = $2 AND status = 'pending' AND expires_at > NOW()
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(project_id)
        .bind(normalize_email(email))
        .fetch_optional(pool)
        .await
    }

    pub async fn list_for_project(
        pool: &PgPool,
        project_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ProjectInvitation>(&format!(
            r#"
            SELECT {INVITATION_COLUMNS} FROM project_invitations
            WHERE project_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(project_id)
        .fetch_all(pool)
        .await
    }

    pub async fn list_pending_for_user(
        pool: &PgPool,
        user: &User,
    ) -> Result<Vec<PendingProjectInvitation>, sqlx::Error> {
        let rows = sqlx::query_as::<_, PendingProjectInvitationRow>(
            r#"
            SELECT i.id, i.project_id, i.invited_user_id, i.invited_by_user_id, i.email,
                   i.first_name, i.last_name, i.role, i.token_hash, i.status, i.expires_at,
                   i.created_at, i.updated_at,
                   p.name AS project_name, p.description AS project_description,
                   u.email AS inviter_email, u.full_name AS inviter_full_name
            FROM project_invitations i
            JOIN projects p ON p.id = i.project_id
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

        Ok(rows.into_iter().map(PendingProjectInvitation::from).collect())
    }

    /// Accepts the invitation for `user` and adds them to the project
    ///
    /// Returns whether a new membership row was created.
    pub async fn accept(
        pool: &PgPool,
        invitation: &ProjectInvitation,
        user: &User,
    ) -> Result<bool, InvitationError> {
        let mut tx = pool.begin().await?;

        let flipped: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE project_invitations
            SET status = 'accepted', invited_user_id = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending' AND expires_at >= NOW()
            RETURNING id
            "#,
        )
        .bind(invitation.id)
        .bind(user.id)
        .fetch_optional(&mut *tx)
        .await?;

        if flipped.is_none() {
            tx.rollback().await?;
            return Err(Self::resolution_error(pool, invitation.id).await);
        }

        let joined =
            ProjectMember::add(&mut *tx, invitation.project_id, user.id, invitation.role).await?;

        tx.commit().await?;

        info!(
            invitation_id = %invitation.id,
            project_id = %invitation.project_id,
            user_id = %user.id,
            joined,
            "Project invitation accepted"
        );

        Ok(joined)
    }

    pub async fn reject(pool: &PgPool, id: Uuid) -> Result<Self, InvitationError> {
        let rejected = sqlx::query_as::<_, ProjectInvitation>(&format!(
            r#"
            UPDATE project_invitations SET status = 'rejected', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {INVITATION_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        match rejected {
            Some(invitation) => {
                info!(invitation_id = %id, "Project invitation rejected");
                Ok(invitation)
            }
            None => Err(Self::resolution_error(pool, id).await),
        }
    }

    pub async fn mark_expired(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE project_invitations SET status = 'expired', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn expire_stale(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE project_invitations SET status = 'expired', updated_at = NOW()
            WHERE status = 'pending' AND expires_at < NOW()
            "#,
        )
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn link_pending_to_user(
        conn: &mut PgConnection,
        user_id: Uuid,
        email: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE project_invitations SET invited_user_id = $1, updated_at = NOW()
            WHERE email = $2 AND status = 'pending' AND invited_user_id IS NULL
            "#,
        )
        .bind(user_id)
        .bind(normalize_email(email))
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }

    async fn resolution_error(pool: &PgPool, id: Uuid) -> InvitationError {
        match Self::find_by_id(pool, id).await {
            Ok(Some(current)) => {
                match lifecycle::check_resolvable(current.status, current.expires_at, Utc::now()) {
                    Err(e) => e,
                    Ok(()) => InvitationError::Expired,
                }
            }
            Ok(None) => InvitationError::NotFound,
            Err(e) => InvitationError::Database(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_addressed_to() {
        let user = User {
            id: Uuid::new_v4(),
            email: "meg@example.com".to_string(),
            password_hash: String::new(),
            full_name: "Meg March".to_string(),
            email_notifications: true,
            new_comments: true,
            ticket_assignment: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let mut invitation = ProjectInvitation {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            invited_user_id: None,
            invited_by_user_id: Uuid::new_v4(),
            email: "Meg@Example.com".to_string(),
            first_name: "Meg".to_string(),
            last_name: "March".to_string(),
            role: ProjectRole::Member,
            token_hash: String::new(),
            status: InvitationStatus::Pending,
            expires_at: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(invitation.is_addressed_to(&user));

        invitation.invited_user_id = Some(Uuid::new_v4());
        assert!(!invitation.is_addressed_to(&user));

        invitation.invited_user_id = Some(user.id);
        assert!(invitation.is_addressed_to(&user));
    }
}
