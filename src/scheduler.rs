use std::sync::Arc;

use anyhow::Context;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::error::Error;
use crate::ingest::IngestService;

/// Weekly ingest job. Failures are logged, never propagated.
pub async fn start(ingest: Arc<IngestService>, cron: &str) -> anyhow::Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("creating scheduler")?;

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let ingest = ingest.clone();
        Box::pin(async move {
            info!("running scheduled attendance ingest");
            match ingest.run().await {
                Ok(summary) => info!(
                    inserted = summary.records_inserted,
                    classified = summary.mentees_classified,
                    "scheduled attendance ingest finished"
                ),
                Err(Error::RunInProgress) => {
                    warn!("skipping scheduled ingest; another run is in progress")
                }
                Err(e) => error!(error = %e, "scheduled attendance ingest failed"),
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;

    sched.add(job).await.context("adding scheduler job")?;
    sched.start().await.context("starting scheduler")?;
    info!(cron, "attendance ingest scheduled");
    Ok(sched)
}
