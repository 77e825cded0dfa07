use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info};

use crate::config::SchedulerConfig;
use crate::state::SharedState;

/// Background upkeep: periodic sweeps of the login throttle and rate
/// limiter, plus a cron job purging spent verification/reset tokens.
pub struct Scheduler {
    state: Arc<SharedState>,
    config: SchedulerConfig,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(state: Arc<SharedState>, config: SchedulerConfig) -> Self {
        Self {
            state,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Runs until [`Scheduler::stop`] is called.
    pub async fn start(&self) -> Result<()> {
        *self.running.write().await = true;
        info!("Starting background scheduler");

        let sched = if self.config.enabled {
            Some(self.start_cron_jobs().await?)
        } else {
            info!("Token purge job is disabled in config");
            None
        };

        self.run_sweeps().await;

        if let Some(mut sched) = sched {
            sched.shutdown().await?;
        }
        Ok(())
    }

    async fn start_cron_jobs(&self) -> Result<JobScheduler> {
        let sched = JobScheduler::new().await?;

        let state = Arc::clone(&self.state);
        let running = Arc::clone(&self.running);
        let purge_job = Job::new_async(self.config.token_purge_cron.as_str(), move |_uuid, _lock| {
            let state = Arc::clone(&state);
            let running = Arc::clone(&running);
            Box::pin(async move {
                if !*running.read().await {
                    return;
                }
                purge_tokens(&state).await;
            })
        })?;

        sched.add(purge_job).await?;
        sched.start().await?;

        info!("Token purge scheduled: {}", self.config.token_purge_cron);
        Ok(sched)
    }

    async fn run_sweeps(&self) {
        let throttle_every = Duration::from_secs(
            self.state
                .config
                .security
                .auth_throttle
                .sweep_interval_minutes
                .max(1)
                .saturating_mul(60),
        );
        let rate_limit_every = Duration::from_secs(
            self.state
                .config
                .security
                .rate_limit
                .sweep_interval_seconds
                .max(1),
        );

        info!(
            "Sweeping login throttle every {}s, rate limiter every {}s",
            throttle_every.as_secs(),
            rate_limit_every.as_secs()
        );

        let mut throttle_interval = interval(throttle_every);
        let mut rate_limit_interval = interval(rate_limit_every);
        throttle_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        rate_limit_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stop_check = interval(Duration::from_secs(1));

        loop {
            tokio::select! {
                _ = throttle_interval.tick() => sweep_throttle(&self.state),
                _ = rate_limit_interval.tick() => sweep_rate_limiter(&self.state),
                _ = stop_check.tick() => {
                    if !*self.running.read().await {
                        break;
                    }
                }
            }
        }
    }

    pub async fn stop(&self) {
        info!("Stopping scheduler...");
        *self.running.write().await = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Runs every job once, immediately.
    pub async fn run_once(&self) {
        sweep_throttle(&self.state);
        sweep_rate_limiter(&self.state);
        purge_tokens(&self.state).await;
    }
}

fn sweep_throttle(state: &SharedState) {
    let removed = state.throttle.sweep();
    debug!(
        event = "job_finished",
        job_name = "sweep_login_attempts",
        removed,
        remaining = state.throttle.tracked(),
        "Login attempt sweep finished"
    );
}

fn sweep_rate_limiter(state: &SharedState) {
    let removed = state.rate_limiter.sweep();
    debug!(
        event = "job_finished",
        job_name = "sweep_rate_limits",
        removed,
        remaining = state.rate_limiter.tracked(),
        "Rate limit sweep finished"
    );
}

async fn purge_tokens(state: &SharedState) {
    let start = std::time::Instant::now();
    match state.store.purge_auth_tokens(Utc::now()).await {
        Ok(removed) => info!(
            event = "job_finished",
            job_name = "purge_auth_tokens",
            removed,
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Expired and used tokens purged"
        ),
        Err(e) => error!(
            event = "job_failed",
            job_name = "purge_auth_tokens",
            error = %e,
            "Token purge failed"
        ),
    }
}
