//! # Focus Forge API Server Library
//!
//! HTTP surface of the Focus Forge project tracker.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Environment configuration
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: Request extractors that reject with the error envelope
//! - `middleware`: Response security headers
//! - `response`: Success envelope
//! - `routes`: API route handlers
//! - `validation`: Request validation helpers

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod validation;
