/// Invitation persistence against a real database
///
/// Need `DATABASE_URL`; each test returns early when it is unset.

use focusforge_shared::{
    db::{
        migrations::run_migrations,
        pool::{create_pool, DatabaseConfig},
    },
    invitations::{
        expire_stale_invitations, link_pending_invitations, InvitationError, InvitationStatus,
    },
    models::{
        project::{CreateProject, Project},
        project_invitation::{NewProjectInvitation, ProjectInvitation},
        project_member::{ProjectMember, ProjectRole},
        team::{NewTeamMember, Team, TeamMember, TeamRole},
        team_invitation::{NewTeamInvitation, TeamInvitation},
        user::{CreateUser, User},
    },
};
use sqlx::PgPool;
use uuid::Uuid;

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = create_pool(DatabaseConfig {
        url,
        max_connections: 5,
        min_connections: 0,
        ..DatabaseConfig::default()
    })
    .await
    .expect("pool");
    run_migrations(&pool).await.expect("migrations");
    Some(pool)
}

async fn create_user(pool: &PgPool, email: &str) -> User {
    User::create(
        pool,
        CreateUser {
            email: email.to_string(),
            password_hash: "not-a-real-hash".to_string(),
            full_name: "Test User".to_string(),
        },
    )
    .await
    .expect("user")
}

fn unique_email(prefix: &str) -> String {
    format!("{prefix}-{}@example.com", Uuid::new_v4().simple())
}

async fn project_invitation(
    pool: &PgPool,
    project: &Project,
    email: &str,
    ttl_days: i64,
) -> (ProjectInvitation, String) {
    ProjectInvitation::create(
        pool,
        NewProjectInvitation {
            project_id: project.id,
            invited_user_id: None,
            invited_by_user_id: project.owner_id,
            email: email.to_string(),
            first_name: "Ada".to_string(),
            last_name: "Byron".to_string(),
            role: ProjectRole::Member,
            ttl_days,
        },
    )
    .await
    .expect("invitation")
}

async fn owned_project(pool: &PgPool) -> Project {
    let owner = create_user(pool, &unique_email("owner")).await;
    Project::create(
        pool,
        owner.id,
        CreateProject {
            name: "Store test".to_string(),
            ..CreateProject::default()
        },
    )
    .await
    .expect("project")
}

#[tokio::test]
async fn test_token_lookup_uses_hash() {
    let Some(pool) = test_pool().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let project = owned_project(&pool).await;
    let (invitation, token) = project_invitation(&pool, &project, &unique_email("guest"), 7).await;

    assert_ne!(invitation.token_hash, token);

    let found = ProjectInvitation::find_by_token(&pool, &token)
        .await
        .unwrap()
        .expect("found by token");
    assert_eq!(found.id, invitation.id);

    assert!(ProjectInvitation::find_by_token(&pool, &invitation.token_hash)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_signup_links_pending_invitations() {
    let Some(pool) = test_pool().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let project = owned_project(&pool).await;
    let email = unique_email("later");
    let (invitation, _) = project_invitation(&pool, &project, &email, 7).await;
    assert!(invitation.invited_user_id.is_none());

    let user = create_user(&pool, &email).await;
    let mut conn = pool.acquire().await.unwrap();
    let counts = link_pending_invitations(&mut conn, user.id, &user.email)
        .await
        .unwrap();
    drop(conn);
    assert_eq!(counts.project, 1);

    let linked = ProjectInvitation::find_by_id(&pool, invitation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(linked.invited_user_id, Some(user.id));

    let pending = ProjectInvitation::list_pending_for_user(&pool, &user).await.unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn test_concurrent_accept_admits_once() {
    let Some(pool) = test_pool().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let project = owned_project(&pool).await;
    let email = unique_email("racer");
    let (invitation, _) = project_invitation(&pool, &project, &email, 7).await;
    let user = create_user(&pool, &email).await;

    let (first, second) = tokio::join!(
        ProjectInvitation::accept(&pool, &invitation, &user),
        ProjectInvitation::accept(&pool, &invitation, &user),
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| matches!(r, Ok(true))).count(), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|r| matches!(
                r,
                Err(InvitationError::AlreadyResolved(InvitationStatus::Accepted))
            ))
            .count(),
        1
    );

    let role = ProjectMember::get_role(&pool, project.id, user.id).await.unwrap();
    assert_eq!(role, Some(ProjectRole::Member));
}

#[tokio::test]
async fn test_expired_invitation_cannot_be_accepted() {
    let Some(pool) = test_pool().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let project = owned_project(&pool).await;
    let email = unique_email("late");
    let (invitation, _) = project_invitation(&pool, &project, &email, -1).await;
    let user = create_user(&pool, &email).await;

    let result = ProjectInvitation::accept(&pool, &invitation, &user).await;
    assert!(matches!(result, Err(InvitationError::Expired)));

    expire_stale_invitations(&pool).await.unwrap();

    let stored = ProjectInvitation::find_by_id(&pool, invitation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, InvitationStatus::Expired);
}

#[tokio::test]
async fn test_team_invitation_reject_is_final() {
    let Some(pool) = test_pool().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let creator = create_user(&pool, &unique_email("creator")).await;
    let team = Team::create(&pool, creator.id, "Store team", None).await.unwrap();
    let email = unique_email("declines");

    let (invitation, _) = TeamInvitation::create(
        &pool,
        NewTeamInvitation {
            team_id: team.id,
            invited_user_id: None,
            invited_by_user_id: creator.id,
            email: email.clone(),
            first_name: "Dee".to_string(),
            last_name: "Clines".to_string(),
            phone: None,
            role: TeamRole::Member,
            ttl_days: 7,
        },
    )
    .await
    .unwrap();

    let rejected = TeamInvitation::reject(&pool, invitation.id).await.unwrap();
    assert_eq!(rejected.status, InvitationStatus::Rejected);

    assert!(matches!(
        TeamInvitation::reject(&pool, invitation.id).await,
        Err(InvitationError::AlreadyResolved(InvitationStatus::Rejected))
    ));

    let user = create_user(&pool, &email).await;
    assert!(matches!(
        TeamInvitation::accept(&pool, &invitation, &user).await,
        Err(InvitationError::AlreadyResolved(InvitationStatus::Rejected))
    ));
}

async fn team_invitation(
    pool: &PgPool,
    team: &Team,
    inviter: &User,
    email: &str,
    ttl_days: i64,
) -> TeamInvitation {
    let (invitation, _) = TeamInvitation::create(
        pool,
        NewTeamInvitation {
            team_id: team.id,
            invited_user_id: None,
            invited_by_user_id: inviter.id,
            email: email.to_string(),
            first_name: "Kit".to_string(),
            last_name: "Newman".to_string(),
            phone: None,
            role: TeamRole::Member,
            ttl_days,
        },
    )
    .await
    .unwrap();
    invitation
}

fn new_account(email: &str) -> CreateUser {
    CreateUser {
        email: email.to_string(),
        password_hash: "not-a-real-hash".to_string(),
        full_name: "Kit Newman".to_string(),
    }
}

#[tokio::test]
async fn test_new_account_created_with_acceptance() {
    let Some(pool) = test_pool().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let creator = create_user(&pool, &unique_email("creator")).await;
    let team = Team::create(&pool, creator.id, "Signup team", None).await.unwrap();
    let email = unique_email("fresh");

    let invitation = team_invitation(&pool, &team, &creator, &email, 7).await;
    let project = owned_project(&pool).await;
    let (other, _) = project_invitation(&pool, &project, &email, 7).await;

    let (user, member) =
        TeamInvitation::accept_with_new_user(&pool, &invitation, new_account(&email))
            .await
            .unwrap();
    assert_eq!(member.user_id, user.id);

    let other = ProjectInvitation::find_by_id(&pool, other.id).await.unwrap().unwrap();
    assert_eq!(other.invited_user_id, Some(user.id));
}

#[tokio::test]
async fn test_failed_acceptance_leaves_no_account() {
    let Some(pool) = test_pool().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let creator = create_user(&pool, &unique_email("creator")).await;
    let team = Team::create(&pool, creator.id, "Rollback team", None).await.unwrap();

    let email = unique_email("withdrawn");
    let rejected = team_invitation(&pool, &team, &creator, &email, 7).await;
    TeamInvitation::reject(&pool, rejected.id).await.unwrap();

    assert!(matches!(
        TeamInvitation::accept_with_new_user(&pool, &rejected, new_account(&email)).await,
        Err(InvitationError::AlreadyResolved(InvitationStatus::Rejected))
    ));
    assert!(User::find_by_email(&pool, &email).await.unwrap().is_none());

    let email = unique_email("tardy");
    let expired = team_invitation(&pool, &team, &creator, &email, -1).await;

    assert!(matches!(
        TeamInvitation::accept_with_new_user(&pool, &expired, new_account(&email)).await,
        Err(InvitationError::Expired)
    ));
    assert!(User::find_by_email(&pool, &email).await.unwrap().is_none());
}

#[tokio::test]
async fn test_member_contact_email_collision_is_an_error() {
    let Some(pool) = test_pool().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let creator = create_user(&pool, &unique_email("creator")).await;
    let team = Team::create(&pool, creator.id, "Roster", None).await.unwrap();
    let first = create_user(&pool, &unique_email("first")).await;
    let second = create_user(&pool, &unique_email("second")).await;

    let member = |user_id, email: &str| NewTeamMember {
        team_id: team.id,
        user_id,
        email: email.to_string(),
        first_name: "Pat".to_string(),
        last_name: "Doe".to_string(),
        phone: None,
        role: TeamRole::Member,
    };

    let mut conn = pool.acquire().await.unwrap();

    let added = TeamMember::add(&mut conn, member(first.id, &first.email)).await.unwrap();
    assert!(added.is_some());

    let again = TeamMember::add(&mut conn, member(first.id, &first.email)).await.unwrap();
    assert!(again.is_none());

    // Same contact email, different user: not "already a member"
    assert!(TeamMember::add(&mut conn, member(second.id, &first.email)).await.is_err());
    assert!(TeamMember::find_by_user(&pool, team.id, second.id)
        .await
        .unwrap()
        .is_none());
}
