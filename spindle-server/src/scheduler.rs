//! Cron triggers on top of tokio-cron-scheduler

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::SchedulerError;

/// Check a seconds-precision cron expression
pub fn validate_expression(expression: &str) -> Result<(), SchedulerError> {
    cron::Schedule::from_str(expression)
        .map(|_| ())
        .map_err(|e| SchedulerError::InvalidCron {
            expression: expression.to_string(),
            message: e.to_string(),
        })
}

/// Runs registered callbacks on their cron schedules
pub struct CronScheduler {
    scheduler: Arc<Mutex<JobScheduler>>,
    is_running: AtomicBool,
}

impl CronScheduler {
    pub async fn new() -> Result<Self, SchedulerError> {
        let scheduler = JobScheduler::new().await.map_err(|e| {
            error!("Failed to create JobScheduler: {}", e);
            SchedulerError::Internal(format!("Failed to create JobScheduler: {}", e))
        })?;

        Ok(Self {
            scheduler: Arc::new(Mutex::new(scheduler)),
            is_running: AtomicBool::new(false),
        })
    }

    /// Call `handler` on every firing of `expression`
    pub async fn add<F>(&self, expression: &str, handler: F) -> Result<Uuid, SchedulerError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        validate_expression(expression)?;

        let job = Job::new_async(expression, move |_uuid, _| {
            handler();
            Box::pin(async {})
        })
        .map_err(|e| SchedulerError::InvalidCron {
            expression: expression.to_string(),
            message: e.to_string(),
        })?;

        let job_id = self
            .scheduler
            .lock()
            .await
            .add(job)
            .await
            .map_err(|e| SchedulerError::Internal(format!("Failed to add job: {}", e)))?;

        debug!("Added cron job {} ({})", job_id, expression);
        Ok(job_id)
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.scheduler
            .lock()
            .await
            .start()
            .await
            .map_err(|e| SchedulerError::Internal(format!("Failed to start scheduler: {}", e)))?;

        info!("Cron scheduler started");
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        self.scheduler
            .lock()
            .await
            .shutdown()
            .await
            .map_err(|e| SchedulerError::Internal(format!("Failed to stop scheduler: {}", e)))?;

        info!("Cron scheduler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_validation() {
        assert!(validate_expression("0 */5 * * * *").is_ok());
        assert!(validate_expression("*/1 * * * * *").is_ok());
        assert!(matches!(
            validate_expression("every minute"),
            Err(SchedulerError::InvalidCron { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_bad_expression() {
        let scheduler = CronScheduler::new().await.unwrap();
        let err = scheduler.add("not a cron", || {}).await.unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCron { .. }));
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let scheduler = CronScheduler::new().await.unwrap();
        scheduler.add("0 0 * * * *", || {}).await.unwrap();
        scheduler.start().await.unwrap();
        assert!(scheduler.is_running());
        scheduler.shutdown().await.unwrap();
        assert!(!scheduler.is_running());
    }
}
