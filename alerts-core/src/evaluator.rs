//! Rule evaluation engine.
//!
//! A cycle loads every active rule, evaluates them concurrently and records
//! one history row per successful evaluation. A failing rule only affects
//! its own result. At most one cycle runs at a time per evaluator; an
//! overlapping request is skipped rather than queued.

use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::{
    client::WeatherClient,
    error::EvalError,
    model::{CycleOutcome, EvaluationRecord, EvaluationResult, Parameter, Rule, WeatherSnapshot},
    store::RuleStore,
};

/// Computes the record for `rule` against an already fetched snapshot.
pub fn evaluate(rule: &Rule, snapshot: &WeatherSnapshot) -> Result<EvaluationRecord, EvalError> {
    let parameter: Parameter = rule.parameter.parse()?;
    let observed_value = snapshot.value(parameter);

    Ok(EvaluationRecord {
        rule_id: rule.id.clone(),
        is_triggered: rule.operator.apply(observed_value, rule.threshold),
        observed_value,
        threshold_value: rule.threshold,
        timestamp: Utc::now(),
    })
}

#[derive(Debug)]
pub struct RuleEvaluator {
    client: Arc<WeatherClient>,
    store: Arc<dyn RuleStore>,
    max_concurrent: usize,
    cycle_lock: Mutex<()>,
}

impl RuleEvaluator {
    pub fn new(client: Arc<WeatherClient>, store: Arc<dyn RuleStore>) -> Self {
        Self { client, store, max_concurrent: 4, cycle_lock: Mutex::new(()) }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Evaluates every active rule once.
    ///
    /// Returns [`CycleOutcome::Skipped`] if another cycle is still running.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, EvalError> {
        let Ok(_running) = self.cycle_lock.try_lock() else {
            warn!("Previous evaluation cycle still running, skipping this one");
            return Ok(CycleOutcome::Skipped);
        };

        let rules = self.store.active_rules().await?;
        info!("Evaluating {} active rule(s)", rules.len());

        let permits = Semaphore::new(self.max_concurrent);
        let results = join_all(rules.iter().map(|rule| self.evaluate_bounded(rule, &permits))).await;

        let failed = results.iter().filter(|r| r.outcome.is_err()).count();
        let triggered = results.iter().filter(|r| r.is_triggered()).count();
        info!(
            "Evaluation cycle finished: {} evaluated, {} triggered, {} failed",
            results.len() - failed,
            triggered,
            failed
        );

        Ok(CycleOutcome::Completed(results))
    }

    /// Evaluates one rule on demand, active or not, and records the result.
    pub async fn evaluate_one(&self, rule_id: &str) -> Result<EvaluationRecord, EvalError> {
        let rule = self
            .store
            .get_rule(rule_id)
            .await?
            .ok_or_else(|| EvalError::NotFound(rule_id.to_string()))?;

        self.evaluate_rule(&rule).await
    }

    async fn evaluate_bounded(&self, rule: &Rule, permits: &Semaphore) -> EvaluationResult {
        // The semaphore is never closed, so acquiring cannot fail.
        let _permit = permits.acquire().await.ok();

        let outcome = self.evaluate_rule(rule).await;
        if let Err(e) = &outcome {
            warn!("Rule '{}' ({}) could not be evaluated: {}", rule.name, rule.id, e);
        }

        EvaluationResult { rule_id: rule.id.clone(), rule_name: rule.name.clone(), outcome }
    }

    async fn evaluate_rule(&self, rule: &Rule) -> Result<EvaluationRecord, EvalError> {
        // Reject unknown parameters before spending an upstream request.
        rule.parameter.parse::<Parameter>()?;

        let snapshot = self.client.get_current_weather(&rule.location).await?;
        let record = evaluate(rule, &snapshot)?;

        debug!(
            "Rule '{}': {} = {} {} {} -> {}",
            rule.id,
            rule.parameter,
            record.observed_value,
            rule.operator,
            rule.threshold,
            record.is_triggered
        );

        self.store.append_record(record.clone()).await?;
        Ok(record)
    }
}
