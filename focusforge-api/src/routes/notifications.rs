/// Notification endpoints, all scoped to the caller
///
/// - `GET    /api/notifications?limit=&skip=`
/// - `PUT    /api/notifications/:id/read`
/// - `PUT    /api/notifications/mark-all-read`
/// - `DELETE /api/notifications/:id`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{Path, Query},
    response::{message_only, ApiResponse},
};
use axum::{
    extract::State,
    Extension, Json,
};
use focusforge_shared::{auth::middleware::AuthContext, models::notification::Notification};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub skip: Option<i64>,
}

impl ListQuery {
    /// `(limit, offset)` clamped to sane bounds
    pub fn bounds(&self) -> (i64, i64) {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = self.skip.unwrap_or(0).max(0);
        (limit, offset)
    }
}

#[derive(Debug, Serialize)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub total: i64,
    pub unread_count: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkAllRead {
    pub updated: u64,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ApiResponse<NotificationPage>>> {
    let (limit, offset) = query.bounds();

    let notifications = Notification::list_for_user(&state.db, auth.user_id, limit, offset).await?;
    let total = Notification::count_for_user(&state.db, auth.user_id).await?;
    let unread_count = Notification::count_unread(&state.db, auth.user_id).await?;

    Ok(ApiResponse::ok(NotificationPage {
        notifications,
        total,
        unread_count,
    }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Notification>>> {
    let notification = Notification::mark_read(&state.db, id, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Notification not found".to_string()))?;

    Ok(ApiResponse::with_message(
        "Notification marked as read",
        notification,
    ))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<ApiResponse<MarkAllRead>>> {
    let updated = Notification::mark_all_read(&state.db, auth.user_id).await?;

    Ok(ApiResponse::with_message(
        "All notifications marked as read",
        MarkAllRead { updated },
    ))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<()>>> {
    if !Notification::delete(&state.db, id, auth.user_id).await? {
        return Err(ApiError::NotFound("Notification not found".to_string()));
    }

    Ok(message_only("Notification deleted"))
}
