/// Tower middleware for the API server
///
/// JWT authentication lives in [`crate::app`] as an axum `from_fn` layer.

pub mod security;
