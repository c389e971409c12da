//! Acquisition pipeline around every upstream weather call.
//!
//! Per call: cache lookup, then (on a miss) rate-limit admission, location
//! resolution and a retried fetch, then cache store.

use std::{sync::Arc, time::Duration};

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    Config,
    cache::TtlCache,
    error::{FetchError, WeatherError},
    geocode::{Geocoder, StaticGeocoder},
    model::{Coordinates, Timestep, WeatherSnapshot},
    provider::{WeatherProvider, provider_from_config},
    rate_limit::{RateLimitStatus, RateLimiter},
    retry::{RetryHandler, RetryOutcome},
};

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub current_ttl: Duration,
    pub forecast_ttl: Duration,
    /// Shared rate limiter key for every upstream call.
    pub rate_limit_key: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            current_ttl: Duration::from_secs(300),
            forecast_ttl: Duration::from_secs(1800),
            rate_limit_key: "weather-api".to_string(),
        }
    }
}

impl From<&Config> for ClientSettings {
    fn from(config: &Config) -> Self {
        Self {
            current_ttl: Duration::from_secs(config.cache.current_ttl_secs),
            forecast_ttl: Duration::from_secs(config.cache.forecast_ttl_secs),
            rate_limit_key: config.rate_limit.key.clone(),
        }
    }
}

/// Counts of entries dropped by [`WeatherClient::sweep`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub cache_entries: usize,
    pub rate_windows: usize,
}

#[derive(Debug)]
pub struct WeatherClient {
    provider: Arc<dyn WeatherProvider>,
    geocoder: Arc<dyn Geocoder>,
    limiter: Arc<RateLimiter>,
    retry: RetryHandler,
    current_cache: TtlCache<WeatherSnapshot>,
    forecast_cache: TtlCache<serde_json::Value>,
    settings: ClientSettings,
}

impl WeatherClient {
    pub fn new(
        provider: Arc<dyn WeatherProvider>,
        geocoder: Arc<dyn Geocoder>,
        limiter: Arc<RateLimiter>,
        retry: RetryHandler,
        settings: ClientSettings,
    ) -> Self {
        Self {
            provider,
            geocoder,
            limiter,
            retry,
            current_cache: TtlCache::new(),
            forecast_cache: TtlCache::new(),
            settings,
        }
    }

    /// Wires the Tomorrow.io provider, the config location table and a fresh limiter.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let provider: Arc<dyn WeatherProvider> = Arc::from(provider_from_config(config)?);
        let geocoder = Arc::new(StaticGeocoder::from_table(&config.locations));
        let limiter =
            Arc::new(RateLimiter::new(config.rate_limit.max_requests, config.rate_limit_window()));

        Ok(Self::new(
            provider,
            geocoder,
            limiter,
            RetryHandler::new(config.retry_policy()),
            ClientSettings::from(config),
        ))
    }

    pub async fn get_current_weather(&self, location: &str) -> Result<WeatherSnapshot, WeatherError> {
        let key = format!("weather:{location}");
        if let Some(hit) = self.current_cache.get(&key) {
            debug!("Cache hit for {}", key);
            return Ok(hit);
        }
        debug!("Cache miss for {}", key);

        self.admit()?;
        let coords = self.resolve(location).await?;

        let outcome = self.retry.execute(|| self.provider.realtime(&coords)).await;
        let snapshot = finish(outcome)?;

        self.current_cache.set(key, snapshot.clone(), self.settings.current_ttl);
        Ok(snapshot)
    }

    /// Raw forecast payload for `location` at the given granularity.
    pub async fn get_forecast(
        &self,
        location: &str,
        timestep: Timestep,
    ) -> Result<serde_json::Value, WeatherError> {
        let key = format!("forecast:{location}:{timestep}");
        if let Some(hit) = self.forecast_cache.get(&key) {
            debug!("Cache hit for {}", key);
            return Ok(hit);
        }
        debug!("Cache miss for {}", key);

        self.admit()?;
        let coords = self.resolve(location).await?;

        let outcome = self.retry.execute(|| self.provider.forecast(&coords, timestep)).await;
        let payload = finish(outcome)?;

        self.forecast_cache.set(key, payload.clone(), self.settings.forecast_ttl);
        Ok(payload)
    }

    /// Limiter state for the shared upstream key.
    pub fn rate_limit_status(&self) -> RateLimitStatus {
        self.limiter.status(&self.settings.rate_limit_key)
    }

    /// Drops expired cache entries and elapsed rate windows.
    pub fn sweep(&self) -> SweepStats {
        SweepStats {
            cache_entries: self.current_cache.cleanup() + self.forecast_cache.cleanup(),
            rate_windows: self.limiter.sweep(),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.current_cache.size() + self.forecast_cache.size()
    }

    fn admit(&self) -> Result<(), WeatherError> {
        let admission = self.limiter.can_proceed(&self.settings.rate_limit_key);
        if admission.allowed {
            return Ok(());
        }

        let retry_after = admission
            .retry_after
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or_default();
        warn!("Rate limit reached for '{}', retry in {:?}", self.settings.rate_limit_key, retry_after);

        Err(WeatherError::RateLimited { retry_after })
    }

    async fn resolve(&self, location: &str) -> Result<Coordinates, WeatherError> {
        if let Some(coords) = Coordinates::parse(location) {
            return Ok(coords);
        }

        match self.geocoder.resolve(location).await {
            Ok(Some(coords)) => {
                debug!("Resolved '{}' to {}", location, coords);
                Ok(coords)
            }
            Ok(None) => Err(WeatherError::Location(location.to_string())),
            Err(e) => {
                warn!("Geocoding '{}' failed: {:#}", location, e);
                Err(WeatherError::Location(location.to_string()))
            }
        }
    }
}

/// Maps the terminal retry result onto client errors.
fn finish<T>(outcome: RetryOutcome<T, FetchError>) -> Result<T, WeatherError> {
    let attempts = outcome.attempts;
    outcome.result.map_err(|err| match err {
        FetchError::TooManyRequests { retry_after: Some(retry_after) } => {
            WeatherError::RateLimited { retry_after }
        }
        source => WeatherError::Upstream { attempts, source },
    })
}
