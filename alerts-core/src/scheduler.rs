//! Periodic background tasks: rule evaluation and cache/limiter maintenance.
//!
//! The evaluation loop awaits each cycle before waiting for the next tick,
//! and missed ticks are skipped, so cycles never overlap. On shutdown an
//! in-flight cycle is allowed to finish.

use std::{sync::Arc, time::Duration};

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info};

use crate::{Config, client::WeatherClient, evaluator::RuleEvaluator, model::CycleOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerIntervals {
    pub evaluation_interval: Duration,
    pub sweep_interval: Duration,
}

impl Default for SchedulerIntervals {
    fn default() -> Self {
        Self {
            evaluation_interval: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl From<&Config> for SchedulerIntervals {
    fn from(config: &Config) -> Self {
        Self {
            evaluation_interval: config.evaluation_interval(),
            sweep_interval: config.sweep_interval(),
        }
    }
}

/// Handle to the running background tasks.
#[derive(Debug)]
pub struct Scheduler {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl Scheduler {
    /// Spawns the evaluation and maintenance loops on the current runtime.
    pub fn start(
        evaluator: Arc<RuleEvaluator>,
        client: Arc<WeatherClient>,
        intervals: SchedulerIntervals,
    ) -> Self {
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();

        tracker.spawn(evaluation_loop(evaluator, intervals.evaluation_interval, token.clone()));
        tracker.spawn(maintenance_loop(client, intervals.sweep_interval, token.clone()));
        tracker.close();

        info!(
            "Scheduler started: evaluating every {:?}, sweeping every {:?}",
            intervals.evaluation_interval, intervals.sweep_interval
        );

        Self { token, tracker }
    }

    /// Stops both loops and waits for them to exit.
    pub async fn shutdown(self) {
        info!("Scheduler shutting down");
        self.token.cancel();
        self.tracker.wait().await;
        info!("Scheduler stopped");
    }
}

async fn evaluation_loop(evaluator: Arc<RuleEvaluator>, period: Duration, token: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match evaluator.run_cycle().await {
            Ok(CycleOutcome::Completed(results)) => {
                debug!("Cycle produced {} result(s)", results.len());
            }
            Ok(CycleOutcome::Skipped) => {}
            Err(e) => error!("Evaluation cycle failed: {}", e),
        }
    }
}

async fn maintenance_loop(client: Arc<WeatherClient>, period: Duration, token: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately and there is nothing to sweep yet.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let stats = client.sweep();
        debug!(
            "Swept {} cache entries and {} rate windows",
            stats.cache_entries, stats.rate_windows
        );
    }
}
