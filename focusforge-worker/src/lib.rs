//! # Focus Forge Worker Library
//!
//! Background maintenance for the Focus Forge API database.
//!
//! ## Modules
//!
//! - `config`: Environment configuration
//! - `sweeper`: Periodic expiry of stale invitations

pub mod config;
pub mod sweeper;
