/// Request extractors that reject with the API error envelope
///
/// axum's own `Json`, `Path` and `Query` answer a bad request with a
/// plain-text 400/415/422 before the handler runs. These wrappers route the
/// rejection through [`ApiError`] so clients always get the
/// `{ success: false, error, message }` body with a 400.
///
/// Responses keep using `axum::Json`; only request bodies go through
/// [`JsonBody`].

use crate::error::ApiError;
use axum::extract::{FromRequest, FromRequestParts};

/// JSON request body
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// Path parameters
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct Path<T>(pub T);

/// Query string
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct Query<T>(pub T);
