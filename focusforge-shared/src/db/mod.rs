/// Database layer
///
/// - `pool`: PostgreSQL connection pool with health checks
/// - `migrations`: embedded sqlx migrations from the workspace `migrations/` directory
///
/// # Example
///
/// ```no_run
/// use focusforge_shared::db::pool::{create_pool, DatabaseConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = DatabaseConfig {
///         url: std::env::var("DATABASE_URL")?,
///         ..Default::default()
///     };
///
///     let pool = create_pool(config).await?;
///     Ok(())
/// }
/// ```

pub mod migrations;
pub mod pool;
