/// End-to-end flows against a real database
///
/// Requires `DATABASE_URL` pointing at a disposable Postgres database;
/// each test returns early when it is unset. Every test registers its own
/// uniquely-named accounts, so they can share one database.

mod common;

use axum::http::{Method, StatusCode};
use common::{token_from_url, unique_email, TestApp, TEST_PASSWORD};
use focusforge_shared::{
    invitations::InvitationStatus,
    models::{
        project_invitation::{NewProjectInvitation, ProjectInvitation},
        project_member::ProjectRole,
        team::TeamRole,
        team_invitation::{NewTeamInvitation, TeamInvitation},
    },
};
use serde_json::{json, Value};
use uuid::Uuid;

macro_rules! require_database {
    () => {
        match TestApp::with_database().await {
            Some(app) => app,
            None => {
                eprintln!("DATABASE_URL not set, skipping");
                return;
            }
        }
    };
}

fn notification_types(body: &Value) -> Vec<String> {
    body["data"]["notifications"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|n| n["type"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

async fn create_project(app: &TestApp, token: &str, name: &str) -> String {
    let (status, body) = app
        .send(
            Method::POST,
            "/api/projects",
            Some(token),
            Some(json!({ "name": name })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["id"].as_str().unwrap().to_string()
}

async fn invite_to_project(app: &TestApp, token: &str, project_id: &str, email: &str) -> String {
    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/projects/{project_id}/invite"),
            Some(token),
            Some(json!({ "email": email, "first_name": "Robin", "last_name": "Park" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    token_from_url(body["data"]["invitation_url"].as_str().unwrap())
}

#[tokio::test]
async fn test_project_invitation_before_signup() {
    let app = require_database!();

    let (_, owner_token) = app.signup(&unique_email("owner"), "Olive Owner").await;
    let project_id = create_project(&app, &owner_token, "Launch").await;

    let invitee_email = unique_email("invitee");
    let invitation_token = invite_to_project(&app, &owner_token, &project_id, &invitee_email).await;

    // A second live invitation for the same address is refused
    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/projects/{project_id}/invite"),
            Some(&owner_token),
            Some(json!({ "email": invitee_email, "first_name": "Robin", "last_name": "Park" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Signing up afterwards links the invitation to the new account
    let (_, invitee_token) = app.signup(&invitee_email, "Robin Park").await;

    let (status, body) = app
        .send(
            Method::GET,
            "/api/projects/invitations/pending",
            Some(&invitee_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let project_uri = format!("/api/projects/{project_id}");
    let (status, _) = app
        .send(Method::GET, &project_uri, Some(&invitee_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let accept_uri = format!("/api/projects/invitations/{invitation_token}/accept");
    let (status, body) = app
        .send(Method::POST, &accept_uri, Some(&invitee_token), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["id"], project_id.as_str());

    let (status, _) = app
        .send(Method::GET, &project_uri, Some(&invitee_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    // Already used
    let (status, _) = app
        .send(Method::POST, &accept_uri, Some(&invitee_token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app
        .send(Method::GET, "/api/notifications", Some(&owner_token), None)
        .await;
    assert!(notification_types(&body).contains(&"project_invitation_accepted".to_string()));
}

#[tokio::test]
async fn test_project_invitation_wrong_account() {
    let app = require_database!();

    let (_, owner_token) = app.signup(&unique_email("owner"), "Olive Owner").await;
    let project_id = create_project(&app, &owner_token, "Private").await;

    let invitation_token =
        invite_to_project(&app, &owner_token, &project_id, &unique_email("intended")).await;

    let (_, stranger_token) = app.signup(&unique_email("stranger"), "Sid Stranger").await;
    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/projects/invitations/{invitation_token}/accept"),
            Some(&stranger_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_team_invitation_creates_account() {
    let app = require_database!();

    let (_, creator_token) = app.signup(&unique_email("lead"), "Lee Lead").await;
    let (status, body) = app
        .send(
            Method::POST,
            "/api/teams",
            Some(&creator_token),
            Some(json!({ "name": "Platform" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let team_id = body["data"]["id"].as_str().unwrap().to_string();

    let invitee_email = unique_email("newcomer");
    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/teams/{team_id}/members"),
            Some(&creator_token),
            Some(json!({ "email": invitee_email, "first_name": "Nia", "last_name": "Newcomer" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let invitation_token = token_from_url(body["data"]["invitation_url"].as_str().unwrap());

    let accept_uri = format!("/api/teams/accept-invitation/{invitation_token}");

    let (status, _) = app
        .send(
            Method::POST,
            &accept_uri,
            None,
            Some(json!({ "email": unique_email("someone-else"), "password": TEST_PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(
            Method::POST,
            &accept_uri,
            None,
            Some(json!({ "email": invitee_email.to_uppercase(), "password": TEST_PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["new_account"], true);
    assert_eq!(body["data"]["user"]["full_name"], "Nia Newcomer");

    // A used link reads as unknown
    let (status, body) = app
        .send(
            Method::POST,
            &accept_uri,
            None,
            Some(json!({ "email": invitee_email, "password": TEST_PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let new_user_id = body["data"]["user"]["id"].as_str().unwrap().to_string();
    let new_token = body["data"]["tokens"]["access_token"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, _) = app
        .send(Method::GET, &format!("/api/teams/{team_id}"), Some(&new_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(
            Method::GET,
            &format!("/api/teams/{team_id}/invitations/statuses"),
            Some(&creator_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][new_user_id.as_str()], "accepted");
}

#[tokio::test]
async fn test_ticket_assignment_and_comment_notifications() {
    let app = require_database!();

    let (_, owner_token) = app.signup(&unique_email("owner"), "Olive Owner").await;
    let member_email = unique_email("member");
    let (member_id, member_token) = app.signup(&member_email, "Max Member").await;

    let project_id = create_project(&app, &owner_token, "Tracker").await;
    let invitation_token = invite_to_project(&app, &owner_token, &project_id, &member_email).await;

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/projects/invitations/{invitation_token}/accept"),
            Some(&member_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let tickets_uri = format!("/api/tickets/project/{project_id}");

    let (status, _) = app
        .send(
            Method::POST,
            &tickets_uri,
            Some(&owner_token),
            Some(json!({ "title": "Ghost", "assignees": [Uuid::new_v4()] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(
            Method::POST,
            &tickets_uri,
            Some(&owner_token),
            Some(json!({ "title": "Fix login", "assignees": [member_id] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let ticket_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["assignees"].as_array().unwrap().len(), 1);

    let (_, body) = app
        .send(Method::GET, "/api/notifications", Some(&member_token), None)
        .await;
    assert!(notification_types(&body).contains(&"ticket_assignment".to_string()));
    assert!(body["data"]["unread_count"].as_i64().unwrap() >= 1);

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/comments/{ticket_id}"),
            Some(&member_token),
            Some(json!({ "content": "On it" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = app
        .send(Method::GET, "/api/notifications", Some(&owner_token), None)
        .await;
    assert!(notification_types(&body).contains(&"comment".to_string()));

    let (status, body) = app
        .send(
            Method::PUT,
            "/api/notifications/mark-all-read",
            Some(&owner_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["updated"].as_u64().unwrap() >= 1);

    // Only the creator or the project owner may delete
    let ticket_uri = format!("/api/tickets/{ticket_id}");
    let (status, _) = app
        .send(Method::DELETE, &ticket_uri, Some(&member_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(Method::DELETE, &ticket_uri, Some(&owner_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_expired_invitation_returns_gone() {
    let app = require_database!();

    let (owner_id, owner_token) = app.signup(&unique_email("owner"), "Olive Owner").await;
    let project_id = create_project(&app, &owner_token, "Stale").await;

    let invitee_email = unique_email("tardy");
    let (invitation, token) = ProjectInvitation::create(
        &app.db,
        NewProjectInvitation {
            project_id: project_id.parse().unwrap(),
            invited_user_id: None,
            invited_by_user_id: owner_id,
            email: invitee_email.clone(),
            first_name: "Tia".to_string(),
            last_name: "Tardy".to_string(),
            role: ProjectRole::Member,
            ttl_days: -1,
        },
    )
    .await
    .unwrap();

    let (_, invitee_token) = app.signup(&invitee_email, "Tia Tardy").await;
    let accept_uri = format!("/api/projects/invitations/{token}/accept");

    let (status, body) = app
        .send(Method::POST, &accept_uri, Some(&invitee_token), None)
        .await;
    assert_eq!(status, StatusCode::GONE, "{body}");

    let stored = ProjectInvitation::find_by_id(&app.db, invitation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, InvitationStatus::Expired);

    // Terminal now, so it reads as already processed
    let (status, _) = app
        .send(Method::POST, &accept_uri, Some(&invitee_token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

async fn create_team(app: &TestApp, token: &str, name: &str) -> String {
    let (status, body) = app
        .send(Method::POST, "/api/teams", Some(token), Some(json!({ "name": name })))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["id"].as_str().unwrap().to_string()
}

/// Invites `email` to the team; returns the invitation id and link token
async fn invite_to_team(
    app: &TestApp,
    token: &str,
    team_id: &str,
    email: &str,
) -> (String, String) {
    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/teams/{team_id}/members"),
            Some(token),
            Some(json!({ "email": email, "first_name": "Tom", "last_name": "Teammate" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    (
        body["data"]["invitation"]["id"].as_str().unwrap().to_string(),
        token_from_url(body["data"]["invitation_url"].as_str().unwrap()),
    )
}

#[tokio::test]
async fn test_team_accept_by_id_for_someone_else_is_forbidden() {
    let app = require_database!();

    let (_, lead_token) = app.signup(&unique_email("lead"), "Lee Lead").await;
    let team_id = create_team(&app, &lead_token, "Ops").await;

    // Unlinked: no account exists for the address yet
    let (unlinked_id, _) =
        invite_to_team(&app, &lead_token, &team_id, &unique_email("future")).await;

    // Linked: the address already has an account
    let invitee_email = unique_email("teammate");
    app.signup(&invitee_email, "Tom Teammate").await;
    let (linked_id, _) = invite_to_team(&app, &lead_token, &team_id, &invitee_email).await;

    let (_, stranger_token) = app.signup(&unique_email("stranger"), "Sid Stranger").await;
    for invitation_id in [unlinked_id, linked_id] {
        let (status, body) = app
            .send(
                Method::POST,
                &format!("/api/teams/invitations/{invitation_id}/accept"),
                Some(&stranger_token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    }
}

#[tokio::test]
async fn test_team_accept_when_already_member_marks_accepted() {
    let app = require_database!();

    let (lead_id, lead_token) = app.signup(&unique_email("lead"), "Lee Lead").await;
    let team_id = create_team(&app, &lead_token, "Support").await;

    let member_email = unique_email("member");
    let (member_id, member_token) = app.signup(&member_email, "Tom Teammate").await;
    let (first_id, _) = invite_to_team(&app, &lead_token, &team_id, &member_email).await;

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/teams/invitations/{first_id}/accept"),
            Some(&member_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // The API refuses to invite a member, so issue the second one directly
    let (second, _) = TeamInvitation::create(
        &app.db,
        NewTeamInvitation {
            team_id: team_id.parse().unwrap(),
            invited_user_id: Some(member_id),
            invited_by_user_id: lead_id,
            email: member_email.clone(),
            first_name: "Tom".to_string(),
            last_name: "Teammate".to_string(),
            phone: None,
            role: TeamRole::Member,
            ttl_days: 7,
        },
    )
    .await
    .unwrap();

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/teams/invitations/{}/accept", second.id),
            Some(&member_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "You are already a member of this team");

    let stored = TeamInvitation::find_by_id(&app.db, second.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, InvitationStatus::Accepted);

    let members = body["data"]["members"].as_array().unwrap();
    assert_eq!(members.len(), 1);
}

#[tokio::test]
async fn test_project_reject_rules() {
    let app = require_database!();

    let (_, owner_token) = app.signup(&unique_email("owner"), "Olive Owner").await;
    let project_id = create_project(&app, &owner_token, "Reject").await;

    let invitee_email = unique_email("invitee");
    let (_, invitee_token) = app.signup(&invitee_email, "Robin Park").await;
    invite_to_project(&app, &owner_token, &project_id, &invitee_email).await;

    let (_, body) = app
        .send(
            Method::GET,
            "/api/projects/invitations/pending",
            Some(&invitee_token),
            None,
        )
        .await;
    let invitation_id = body["data"][0]["id"].as_str().unwrap().to_string();
    let reject_uri = format!("/api/projects/invitations/{invitation_id}/reject");

    let (_, stranger_token) = app.signup(&unique_email("stranger"), "Sid Stranger").await;
    let (status, _) = app
        .send(Method::POST, &reject_uri, Some(&stranger_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(Method::POST, &reject_uri, Some(&invitee_token), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "rejected");

    let (status, _) = app
        .send(Method::POST, &reject_uri, Some(&invitee_token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_permissions() {
    let app = require_database!();

    let (owner_id, owner_token) = app.signup(&unique_email("owner"), "Olive Owner").await;
    let admin_email = unique_email("admin");
    let (_, admin_token) = app.signup(&admin_email, "Ada Admin").await;
    let project_id = create_project(&app, &owner_token, "Guarded").await;

    let (invitation, token) = ProjectInvitation::create(
        &app.db,
        NewProjectInvitation {
            project_id: project_id.parse().unwrap(),
            invited_user_id: None,
            invited_by_user_id: owner_id,
            email: admin_email,
            first_name: "Ada".to_string(),
            last_name: "Admin".to_string(),
            role: ProjectRole::Admin,
            ttl_days: 7,
        },
    )
    .await
    .unwrap();
    assert_eq!(invitation.role, ProjectRole::Admin);

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/projects/invitations/{token}/accept"),
            Some(&admin_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let project_uri = format!("/api/projects/{project_id}");
    let (status, body) = app
        .send(Method::DELETE, &project_uri, Some(&admin_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Only owner can delete");

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/tickets/project/{project_id}"),
            Some(&owner_token),
            Some(json!({ "title": "Audit" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let ticket_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/comments/{ticket_id}"),
            Some(&owner_token),
            Some(json!({ "content": "Mine" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let comment_uri = format!("/api/comments/{}", body["data"]["id"].as_str().unwrap());

    let (status, _) = app
        .send(Method::DELETE, &comment_uri, Some(&admin_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(Method::DELETE, &comment_uri, Some(&owner_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(Method::DELETE, &project_uri, Some(&owner_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_notifications_scoped_to_recipient() {
    let app = require_database!();

    let (_, owner_token) = app.signup(&unique_email("owner"), "Olive Owner").await;
    let invitee_email = unique_email("invitee");
    let (_, invitee_token) = app.signup(&invitee_email, "Robin Park").await;

    let project_id = create_project(&app, &owner_token, "Inbox").await;
    invite_to_project(&app, &owner_token, &project_id, &invitee_email).await;

    let (_, body) = app
        .send(Method::GET, "/api/notifications", Some(&invitee_token), None)
        .await;
    let notification_id = body["data"]["notifications"][0]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let read_uri = format!("/api/notifications/{notification_id}/read");
    let delete_uri = format!("/api/notifications/{notification_id}");

    let (status, _) = app
        .send(Method::PUT, &read_uri, Some(&owner_token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(Method::DELETE, &delete_uri, Some(&owner_token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .send(Method::PUT, &read_uri, Some(&invitee_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_read"], true);

    let (status, _) = app
        .send(Method::DELETE, &delete_uri, Some(&invitee_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}
