//! # Focus Forge Shared Library
//!
//! Types, persistence and business rules shared by the API server and the
//! background worker.
//!
//! ## Module Organization
//!
//! - `auth`: passwords, JWTs, bearer authentication, authorization checks
//! - `db`: connection pool and migrations
//! - `invitations`: invitation tokens and lifecycle
//! - `models`: database models

pub mod auth;
pub mod db;
pub mod invitations;
pub mod models;

/// Current version of the Focus Forge shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
