/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use focusforge_api::{app::{build_router, AppState}, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let app = build_router(AppState::new(pool, config));
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:5000").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, error::ApiError, middleware::security::SecurityHeadersLayer, routes};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::{from_fn_with_state, Next},
    response::Response,
    routing::{get, post, put},
    Router,
};
use focusforge_shared::auth::middleware::AuthContext;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        Self {
            db,
            config: Arc::new(config),
        }
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// ```text
/// /health                                      GET    public
/// /api/auth/{signup,login,refresh}             POST   public
/// /api/auth/me                                 GET
/// /api/auth/profile                            PUT
/// /api/auth/change-password                    PUT
/// /api/auth/notification-preferences           GET PUT
/// /api/projects                                GET POST
/// /api/projects/:id                            GET PUT DELETE
/// /api/projects/:id/invite                     POST
/// /api/projects/:id/invitations                GET
/// /api/projects/invitations/pending            GET
/// /api/projects/invitations/:token/accept      POST
/// /api/projects/invitations/:id/reject         POST
/// /api/tickets/project/:project_id             GET POST
/// /api/tickets/:ticket_id                      GET PUT DELETE
/// /api/comments/:ticket_id                     GET POST
/// /api/comments/:comment_id                    DELETE
/// /api/notifications                           GET
/// /api/notifications/mark-all-read             PUT
/// /api/notifications/:id/read                  PUT
/// /api/notifications/:id                       DELETE
/// /api/teams                                   GET POST
/// /api/teams/participants                      GET
/// /api/teams/invitations/pending               GET
/// /api/teams/invitations/:id/{accept,reject}   POST
/// /api/teams/accept-invitation/:token          POST   public
/// /api/teams/:id                               GET PUT DELETE
/// /api/teams/:id/invitations/statuses          GET
/// /api/teams/:id/members                       POST
/// /api/teams/:id/members/:member_id            PUT DELETE
/// ```
///
/// Everything not marked public goes through [`jwt_auth_layer`].
pub fn build_router(state: AppState) -> Router {
    let auth_layer = || from_fn_with_state(state.clone(), jwt_auth_layer);

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let auth_routes = Router::new()
        .route("/me", get(routes::auth::me))
        .route("/profile", put(routes::auth::update_profile))
        .route("/change-password", put(routes::auth::change_password))
        .route(
            "/notification-preferences",
            get(routes::auth::get_notification_preferences)
                .put(routes::auth::update_notification_preferences),
        )
        .route_layer(auth_layer())
        .route("/signup", post(routes::auth::signup))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh));

    let project_routes = Router::new()
        .route(
            "/",
            get(routes::projects::list_projects).post(routes::projects::create_project),
        )
        .route(
            "/invitations/pending",
            get(routes::project_invitations::list_pending),
        )
        .route(
            "/invitations/:invitation/accept",
            post(routes::project_invitations::accept_invitation),
        )
        .route(
            "/invitations/:invitation/reject",
            post(routes::project_invitations::reject_invitation),
        )
        .route(
            "/:id",
            get(routes::projects::get_project)
                .put(routes::projects::update_project)
                .delete(routes::projects::delete_project),
        )
        .route("/:id/invite", post(routes::project_invitations::invite))
        .route(
            "/:id/invitations",
            get(routes::project_invitations::list_for_project),
        )
        .route_layer(auth_layer());

    let ticket_routes = Router::new()
        .route(
            "/project/:project_id",
            get(routes::tickets::list_tickets).post(routes::tickets::create_ticket),
        )
        .route(
            "/:ticket_id",
            get(routes::tickets::get_ticket)
                .put(routes::tickets::update_ticket)
                .delete(routes::tickets::delete_ticket),
        )
        .route_layer(auth_layer());

    // Same path shape, different resource: POST/GET take a ticket id,
    // DELETE takes a comment id
    let comment_routes = Router::new()
        .route(
            "/:id",
            get(routes::comments::list_comments)
                .post(routes::comments::create_comment)
                .delete(routes::comments::delete_comment),
        )
        .route_layer(auth_layer());

    let notification_routes = Router::new()
        .route("/", get(routes::notifications::list_notifications))
        .route("/mark-all-read", put(routes::notifications::mark_all_read))
        .route("/:id/read", put(routes::notifications::mark_read))
        .route(
            "/:id",
            axum::routing::delete(routes::notifications::delete_notification),
        )
        .route_layer(auth_layer());

    let team_routes = Router::new()
        .route(
            "/",
            get(routes::teams::list_teams).post(routes::teams::create_team),
        )
        .route("/participants", get(routes::teams::list_participants))
        .route(
            "/invitations/pending",
            get(routes::team_invitations::list_pending),
        )
        .route(
            "/invitations/:invitation/accept",
            post(routes::team_invitations::accept_invitation),
        )
        .route(
            "/invitations/:invitation/reject",
            post(routes::team_invitations::reject_invitation),
        )
        .route(
            "/:id",
            get(routes::teams::get_team)
                .put(routes::teams::update_team)
                .delete(routes::teams::delete_team),
        )
        .route(
            "/:id/invitations/statuses",
            get(routes::team_invitations::invitation_statuses),
        )
        .route("/:id/members", post(routes::team_invitations::invite_member))
        .route(
            "/:id/members/:member_id",
            put(routes::teams::update_member).delete(routes::teams::remove_member),
        )
        .route_layer(auth_layer())
        .route(
            "/accept-invitation/:token",
            post(routes::team_invitations::accept_by_token),
        );

    let api_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/projects", project_routes)
        .nest("/tickets", ticket_routes)
        .nest("/comments", comment_routes)
        .nest("/notifications", notification_routes)
        .nest("/teams", team_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api", api_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&state.config))
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.api.cors_origins.iter().any(|origin| origin == "*") {
        // Development mode: permissive CORS
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}

/// JWT authentication middleware layer
///
/// Validates the bearer access token and injects [`AuthContext`] into the
/// request extensions.
async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_context = AuthContext::from_headers(req.headers(), state.jwt_secret())?;

    req.extensions_mut().insert(auth_context);

    Ok(next.run(req).await)
}
