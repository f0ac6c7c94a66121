//! Background publisher for scheduled posts, using tokio-cron-scheduler.

use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::error::RepoError;
use crate::models::Post;
use crate::repository::RepositoryState;

/// Publishes every due scheduled post once. Shared by the cron job and
/// `POST /api/posts/scheduled/publish`.
pub async fn publish_due(repo: &RepositoryState) -> Result<Vec<Post>, RepoError> {
    let published = repo.publish_due_posts(Utc::now()).await?;
    for post in &published {
        tracing::info!(post_id = %post.id, slug = %post.slug, "Scheduled post published");
    }
    Ok(published)
}

/// PublishScheduler
///
/// Wraps a `JobScheduler` running a single cron job that calls `publish_due`.
pub struct PublishScheduler {
    inner: JobScheduler,
}

impl PublishScheduler {
    /// Registers the publish job on `schedule` (six-field cron, seconds first).
    pub async fn new(repo: RepositoryState, schedule: &str) -> Result<Self, JobSchedulerError> {
        let inner = JobScheduler::new().await?;

        let job = Job::new_async(schedule, move |_uuid, _lock| {
            let repo = repo.clone();
            Box::pin(async move {
                match publish_due(&repo).await {
                    Ok(posts) if posts.is_empty() => tracing::debug!("No scheduled posts due"),
                    Ok(posts) => tracing::info!(count = posts.len(), "Published scheduled posts"),
                    Err(e) => tracing::error!("Scheduled publish failed: {}", e),
                }
            })
        })?;

        let id = inner.add(job).await?;
        tracing::info!(schedule = %schedule, job_id = %id, "Publish job registered");
        Ok(Self { inner })
    }

    pub async fn start(&self) -> Result<(), JobSchedulerError> {
        self.inner.start().await?;
        tracing::info!("Scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), JobSchedulerError> {
        self.inner.shutdown().await?;
        tracing::info!("Scheduler stopped");
        Ok(())
    }
}
