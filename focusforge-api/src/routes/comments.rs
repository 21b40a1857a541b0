/// Comment endpoints
///
/// - `POST   /api/comments/:ticket_id`
/// - `GET    /api/comments/:ticket_id` - Newest first
/// - `DELETE /api/comments/:comment_id` - Author only

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{JsonBody, Path},
    response::{message_only, ApiResponse},
    routes::{current_user, display_name, tickets::find_ticket},
    validation::not_blank,
};
use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use focusforge_shared::{
    auth::{
        authorization::{require_ownership, require_project_member},
        middleware::AuthContext,
    },
    models::{
        comment::{comment_recipients, Comment, CommentWithAuthor},
        notification::{NewNotification, Notification, NotificationKind},
        ticket::Ticket,
    },
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct CreateCommentRequest {
    #[validate(
        custom(function = "not_blank"),
        length(max = 5000, message = "Comment must be at most 5000 characters")
    )]
    pub content: String,
}

/// Adds a comment and notifies the ticket creator and assignees
pub async fn create_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(ticket_id): Path<Uuid>,
    JsonBody(req): JsonBody<CreateCommentRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<CommentWithAuthor>>)> {
    req.validate()?;

    let ticket = find_ticket(&state.db, ticket_id).await?;
    require_project_member(&state.db, ticket.project_id, auth.user_id).await?;

    let author = current_user(&state, &auth).await?;
    let comment = Comment::create(&state.db, ticket.id, author.id, req.content.trim()).await?;

    info!(comment_id = %comment.id, ticket_id = %ticket.id, "Comment added");

    let assignees = Ticket::assignee_ids(&state.db, ticket.id).await?;
    let notices = comment_recipients(author.id, ticket.creator_id, &assignees)
        .into_iter()
        .map(|user_id| {
            NewNotification::new(
                user_id,
                NotificationKind::Comment,
                "New comment",
                format!("{} commented on \"{}\"", display_name(&author), ticket.title),
            )
            .ticket(ticket.id)
            .comment(comment.id)
            .project(ticket.project_id)
        })
        .collect();
    Notification::notify_all(&state.db, notices).await;

    Ok(ApiResponse::created(
        "Comment added successfully",
        CommentWithAuthor {
            id: comment.id,
            ticket_id: comment.ticket_id,
            content: comment.content,
            author: author.summary(),
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        },
    ))
}

pub async fn list_comments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(ticket_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Vec<CommentWithAuthor>>>> {
    let ticket = find_ticket(&state.db, ticket_id).await?;
    require_project_member(&state.db, ticket.project_id, auth.user_id).await?;

    let comments = Comment::list_for_ticket(&state.db, ticket.id).await?;
    Ok(ApiResponse::ok(comments))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(comment_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let comment = Comment::find_by_id(&state.db, comment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Comment not found".to_string()))?;

    require_ownership(
        auth.user_id,
        comment.author_id,
        "You can only delete your own comments",
    )?;

    Comment::delete(&state.db, comment_id).await?;

    info!(comment_id = %comment_id, "Comment deleted");

    Ok(message_only("Comment deleted successfully"))
}
