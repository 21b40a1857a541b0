/// In-app notifications
///
/// # Schema
///
/// ```sql
/// CREATE TABLE notifications (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     kind notification_kind NOT NULL,
///     title TEXT NOT NULL,
///     message TEXT NOT NULL,
///     related_ticket_id UUID REFERENCES tickets(id) ON DELETE CASCADE,
///     related_comment_id UUID REFERENCES comments(id) ON DELETE CASCADE,
///     related_project_id UUID REFERENCES projects(id) ON DELETE CASCADE,
///     related_team_id UUID REFERENCES teams(id) ON DELETE CASCADE,
///     is_read BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Delivery
///
/// [`Notification::notify`] is fire-and-forget: it checks the recipient's
/// preferences, writes the row, and logs failures instead of returning
/// them. A notification never fails the request that triggered it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use super::user::{NotificationPreferences, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Comment,
    TicketAssignment,
    TicketUpdate,
    ProjectInvitation,
    ProjectInvitationAccepted,
    ProjectInvitationRejected,
    TeamInvitation,
    TeamInvitationAccepted,
    TeamInvitationRejected,
}

impl NotificationKind {
    /// Whether the recipient's preferences allow this kind
    ///
    /// Only comment and assignment notifications can be switched off.
    pub fn is_enabled_by(&self, prefs: &NotificationPreferences) -> bool {
        match self {
            NotificationKind::Comment => prefs.new_comments,
            NotificationKind::TicketAssignment => prefs.ticket_assignment,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_ticket_id: Option<Uuid>,
    pub related_comment_id: Option<Uuid>,
    pub related_project_id: Option<Uuid>,
    pub related_team_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Notification to be written
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_ticket_id: Option<Uuid>,
    pub related_comment_id: Option<Uuid>,
    pub related_project_id: Option<Uuid>,
    pub related_team_id: Option<Uuid>,
}

impl NewNotification {
    pub fn new(
        user_id: Uuid,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
            related_ticket_id: None,
            related_comment_id: None,
            related_project_id: None,
            related_team_id: None,
        }
    }

    pub fn ticket(mut self, ticket_id: Uuid) -> Self {
        self.related_ticket_id = Some(ticket_id);
        self
    }

    pub fn comment(mut self, comment_id: Uuid) -> Self {
        self.related_comment_id = Some(comment_id);
        self
    }

    pub fn project(mut self, project_id: Uuid) -> Self {
        self.related_project_id = Some(project_id);
        self
    }

    pub fn team(mut self, team_id: Uuid) -> Self {
        self.related_team_id = Some(team_id);
        self
    }
}

const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, title, message, related_ticket_id, \
                                    related_comment_id, related_project_id, related_team_id, \
                                    is_read, created_at";

impl Notification {
    /// Writes a notification unconditionally
    pub async fn create(pool: &PgPool, data: NewNotification) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            INSERT INTO notifications
                (user_id, kind, title, message, related_ticket_id, related_comment_id,
                 related_project_id, related_team_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(data.user_id)
        .bind(data.kind)
        .bind(data.title)
        .bind(data.message)
        .bind(data.related_ticket_id)
        .bind(data.related_comment_id)
        .bind(data.related_project_id)
        .bind(data.related_team_id)
        .fetch_one(pool)
        .await
    }

    /// Delivers a notification if the recipient's preferences allow it
    ///
    /// Errors are logged and swallowed; returns the stored row when written.
    pub async fn notify(pool: &PgPool, data: NewNotification) -> Option<Self> {
        let user_id = data.user_id;
        let kind = data.kind;

        let prefs = match User::get_preferences(pool, user_id).await {
            Ok(Some(prefs)) => prefs,
            Ok(None) => {
                debug!(%user_id, ?kind, "Notification recipient no longer exists");
                return None;
            }
            Err(e) => {
                warn!(%user_id, ?kind, error = %e, "Failed to load notification preferences");
                return None;
            }
        };

        if !kind.is_enabled_by(&prefs) {
            debug!(%user_id, ?kind, "Notification suppressed by user preferences");
            return None;
        }

        match Self::create(pool, data).await {
            Ok(notification) => Some(notification),
            Err(e) => {
                warn!(%user_id, ?kind, error = %e, "Failed to create notification");
                None
            }
        }
    }

    /// Delivers several notifications sequentially, returning how many were written
    pub async fn notify_all(pool: &PgPool, batch: Vec<NewNotification>) -> usize {
        let mut delivered = 0;
        for data in batch {
            if Self::notify(pool, data).await.is_some() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Newest first, paginated
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS} FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn count_for_user(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
    }

    pub async fn count_unread(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    /// Marks one of the user's notifications read; `None` if it is not theirs
    pub async fn mark_read(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            UPDATE notifications SET is_read = TRUE
            WHERE id = $1 AND user_id = $2
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn mark_all_read(pool: &PgPool, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs(new_comments: bool, ticket_assignment: bool) -> NotificationPreferences {
        NotificationPreferences {
            email_notifications: true,
            new_comments,
            ticket_assignment,
        }
    }

    #[test]
    fn test_comment_gated_by_new_comments() {
        assert!(NotificationKind::Comment.is_enabled_by(&prefs(true, false)));
        assert!(!NotificationKind::Comment.is_enabled_by(&prefs(false, true)));
    }

    #[test]
    fn test_assignment_gated_by_ticket_assignment() {
        assert!(NotificationKind::TicketAssignment.is_enabled_by(&prefs(false, true)));
        assert!(!NotificationKind::TicketAssignment.is_enabled_by(&prefs(true, false)));
    }

    #[test]
    fn test_invitation_kinds_always_delivered() {
        let off = prefs(false, false);
        for kind in [
            NotificationKind::TicketUpdate,
            NotificationKind::ProjectInvitation,
            NotificationKind::ProjectInvitationAccepted,
            NotificationKind::ProjectInvitationRejected,
            NotificationKind::TeamInvitation,
            NotificationKind::TeamInvitationAccepted,
            NotificationKind::TeamInvitationRejected,
        ] {
            assert!(kind.is_enabled_by(&off), "{:?} should not be suppressible", kind);
        }
    }

    #[test]
    fn test_builder_sets_relations() {
        let ticket_id = Uuid::new_v4();
        let project_id = Uuid::new_v4();
        let n = NewNotification::new(Uuid::new_v4(), NotificationKind::Comment, "t", "m")
            .ticket(ticket_id)
            .project(project_id);

        assert_eq!(n.related_ticket_id, Some(ticket_id));
        assert_eq!(n.related_project_id, Some(project_id));
        assert!(n.related_team_id.is_none());
    }

    #[test]
    fn test_kind_wire_format() {
        assert_eq!(
            serde_json::to_string(&NotificationKind::TeamInvitationAccepted).unwrap(),
            "\"team_invitation_accepted\""
        );
    }
}
