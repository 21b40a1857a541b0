/// Invitation expiry sweeper
///
/// Invitations are also expired lazily when someone tries to use one, so
/// the sweep only keeps listings and status maps honest between uses.
///
/// # Example
///
/// ```no_run
/// use focusforge_worker::sweeper::InvitationSweeper;
/// use sqlx::PgPool;
/// use std::time::Duration;
///
/// # async fn example(pool: PgPool) {
/// let sweeper = InvitationSweeper::new(pool, Duration::from_secs(300));
/// let shutdown = sweeper.shutdown_token();
///
/// tokio::spawn(async move {
///     tokio::signal::ctrl_c().await.ok();
///     shutdown.cancel();
/// });
///
/// sweeper.run().await;
/// # }
/// ```

use focusforge_shared::invitations::{expire_stale_invitations, InvitationCounts};
use sqlx::PgPool;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Something that can expire stale invitations in one pass
pub trait ExpiryStore: Send + Sync {
    fn expire_stale(&self) -> impl Future<Output = Result<InvitationCounts, sqlx::Error>> + Send;
}

impl ExpiryStore for PgPool {
    async fn expire_stale(&self) -> Result<InvitationCounts, sqlx::Error> {
        expire_stale_invitations(self).await
    }
}

pub struct InvitationSweeper<S = PgPool> {
    store: S,
    interval: Duration,
    shutdown_token: CancellationToken,
}

impl<S: ExpiryStore> InvitationSweeper<S> {
    pub fn new(store: S, interval: Duration) -> Self {
        Self {
            store,
            interval,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Cancelling this token stops [`run`](Self::run) after the current pass
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Runs one pass; failures are logged and reported as `None`
    pub async fn sweep_once(&self) -> Option<InvitationCounts> {
        match self.store.expire_stale().await {
            Ok(counts) => {
                if counts.total() > 0 {
                    tracing::info!(
                        team = counts.team,
                        project = counts.project,
                        "Expired stale invitations"
                    );
                } else {
                    tracing::debug!("No stale invitations");
                }
                Some(counts)
            }
            Err(e) => {
                tracing::error!(error = %e, "Invitation sweep failed");
                None
            }
        }
    }

    /// Sweeps immediately, then once per interval until shutdown
    ///
    /// Returns the number of passes made.
    pub async fn run(&self) -> u64 {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Invitation sweeper starting"
        );

        let mut passes = 0;
        loop {
            if self.shutdown_token.is_cancelled() {
                break;
            }

            self.sweep_once().await;
            passes += 1;

            tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!(passes, "Invitation sweeper stopped");
        passes
    }
}
