//! Database connection with bounded retries, used at server start while the
//! database may still be coming up.

use crate::ServiceError;
use crate::config::ServiceConfig;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ConnectRetry {
    attempts: u32,
    first_delay: Duration,
    max_delay: Duration,
}

impl ConnectRetry {
    pub fn new(attempts: u32, first_delay: Duration, max_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            first_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            config.db_connect_attempts,
            Duration::from_secs(1),
            Duration::from_secs(30),
        )
    }

    /// Wait before the attempt after `attempt` (1-based). Doubles up to the cap.
    fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.first_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub async fn connect(&self, url: &str) -> Result<DatabaseConnection, ServiceError> {
        self.retry(|| {
            Database::connect(ConnectOptions::new(url).sqlx_logging(false).to_owned())
        })
        .await
    }

    async fn retry<F, Fut, T>(&self, mut connect: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DbErr>>,
    {
        let mut attempt = 1;
        loop {
            match connect().await {
                Ok(db) => {
                    if attempt > 1 {
                        info!("Database reachable after {} attempts", attempt);
                    }
                    return Ok(db);
                }
                Err(e) if attempt >= self.attempts => {
                    return Err(ServiceError::RecoveryFailed {
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        "Database connection failed ({}/{}): {}. Next try in {:?}",
                        attempt, self.attempts, e, delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
