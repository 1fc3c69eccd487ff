/// Background log retention service
///
/// Runs a tokio-cron-scheduler job that deletes flow log entries older than
/// the configured TTL. Runs themselves are event-driven and never scheduled.

use crate::logs::store::LogStore;
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// Daily at 02:00 (sec min hour day month weekday)
pub const DEFAULT_RETENTION_SCHEDULE: &str = "0 0 2 * * *";

pub struct LogRetentionScheduler {
    scheduler: Arc<RwLock<JobScheduler>>,
    job_id: RwLock<Option<Uuid>>,
    store: Arc<dyn LogStore>,
    ttl: chrono::Duration,
    schedule: String,
}

impl LogRetentionScheduler {
    pub async fn new(store: Arc<dyn LogStore>, ttl_days: u32, schedule: &str) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler: Arc::new(RwLock::new(scheduler)),
            job_id: RwLock::new(None),
            store,
            ttl: chrono::Duration::days(i64::from(ttl_days)),
            schedule: schedule.to_string(),
        })
    }

    /// Register the retention job and start the scheduler
    pub async fn start(&self) -> Result<()> {
        tracing::info!(
            "⏰ Starting log retention scheduler ({}; TTL {} days)",
            self.schedule,
            self.ttl.num_days()
        );

        let store = Arc::clone(&self.store);
        let ttl = self.ttl;
        let job = Job::new_async(self.schedule.as_str(), move |_uuid, _l| {
            let store = Arc::clone(&store);
            Box::pin(async move {
                if let Err(e) = purge(store.as_ref(), ttl).await {
                    tracing::error!("❌ Log retention run failed: {}", e);
                }
            })
        })?;

        let job_uuid = {
            let scheduler = self.scheduler.read().await;
            let job_uuid = scheduler.add(job).await?;
            scheduler.start().await?;
            job_uuid
        };
        *self.job_id.write().await = Some(job_uuid);

        tracing::info!("✅ Log retention scheduler started");
        Ok(())
    }

    /// Delete expired entries right away
    pub async fn purge_now(&self) -> Result<u64> {
        purge(self.store.as_ref(), self.ttl).await
    }

    pub async fn stop(&self) -> Result<()> {
        tracing::info!("⏹️ Stopping log retention scheduler");

        if let Some(job_uuid) = self.job_id.write().await.take() {
            let scheduler = self.scheduler.read().await;
            if let Err(e) = scheduler.remove(&job_uuid).await {
                tracing::warn!("⚠️ Failed to remove retention job: {}", e);
            }
        }

        let mut scheduler = self.scheduler.write().await;
        scheduler.shutdown().await?;
        Ok(())
    }
}

async fn purge(store: &dyn LogStore, ttl: chrono::Duration) -> Result<u64> {
    let cutoff = Utc::now() - ttl;
    let deleted = store.delete_older_than(cutoff).await?;
    tracing::info!("🧹 Deleted {} flow log entries older than {}", deleted, cutoff.to_rfc3339());
    Ok(deleted)
}
