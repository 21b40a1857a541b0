/// Success envelope shared by every handler
///
/// ```json
/// { "success": true, "message": "Project created successfully", "data": { ... } }
/// ```

use axum::{http::StatusCode, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// 200 with data only
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: None,
            data,
        })
    }

    /// 200 with a message
    pub fn with_message(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.into()),
            data,
        })
    }

    /// 201 with a message
    pub fn created(message: impl Into<String>, data: T) -> (StatusCode, Json<Self>) {
        (StatusCode::CREATED, Self::with_message(message, data))
    }
}

/// Envelope with `data: null`, for deletes and similar
pub fn message_only(message: impl Into<String>) -> Json<ApiResponse<()>> {
    ApiResponse::with_message(message, ())
}
