//! Core library for the `weather-alerts` CLI.
//!
//! This crate defines:
//! - The acquisition pipeline wrapping every upstream call
//!   (TTL cache, fixed-window rate limiter, retrying fetch)
//! - The Tomorrow.io provider and the geocoding seam
//! - Threshold rules, their evaluation and the periodic scheduler
//! - Configuration handling
//!
//! It is used by `weather-alerts`, but can also be embedded in a service that
//! owns rule persistence and exposes the same operations over HTTP.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod geocode;
pub mod model;
pub mod provider;
pub mod rate_limit;
pub mod retry;
pub mod scheduler;
pub mod store;

pub use cache::TtlCache;
pub use client::{ClientSettings, WeatherClient};
pub use config::Config;
pub use error::{EvalError, FetchError, WeatherError};
pub use evaluator::RuleEvaluator;
pub use model::{
    CycleOutcome, EvaluationRecord, EvaluationResult, Operator, Parameter, Rule, Timestep,
    WeatherSnapshot,
};
pub use provider::WeatherProvider;
pub use rate_limit::{RateLimitStatus, RateLimiter};
pub use retry::{RetryHandler, RetryPolicy};
pub use scheduler::{Scheduler, SchedulerIntervals};
pub use store::{InMemoryRuleStore, RuleStore};
