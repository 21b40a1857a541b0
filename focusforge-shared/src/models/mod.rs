/// Database models for Focus Forge
///
/// Each model owns its SQL. Functions take a `&PgPool`, or a
/// `&mut PgConnection` when they must run inside a caller's transaction.
///
/// # Models
///
/// - `user`: accounts and notification preferences
/// - `project` / `project_member`: projects and role-based membership
/// - `ticket`: kanban tickets and assignees
/// - `comment`: ticket comments
/// - `team`: teams and member contact cards
/// - `team_invitation` / `project_invitation`: invitation persistence
/// - `notification`: in-app notifications

pub mod comment;
pub mod notification;
pub mod project;
pub mod project_invitation;
pub mod project_member;
pub mod team;
pub mod team_invitation;
pub mod ticket;
pub mod user;
