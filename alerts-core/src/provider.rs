use crate::{
    Config,
    error::{FetchError, WeatherError},
    model::{Coordinates, Timestep, WeatherSnapshot},
    provider::tomorrow::TomorrowProvider,
};
use async_trait::async_trait;
use std::fmt::Debug;

pub mod tomorrow;

/// One upstream attempt against a weather data source.
///
/// Implementations make exactly one request per call; caching, admission
/// control and retries live in [`crate::WeatherClient`].
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn realtime(&self, location: &Coordinates) -> Result<WeatherSnapshot, FetchError>;

    async fn forecast(
        &self,
        location: &Coordinates,
        timestep: Timestep,
    ) -> Result<serde_json::Value, FetchError>;
}

/// Construct the provider from config.
pub fn provider_from_config(config: &Config) -> anyhow::Result<Box<dyn WeatherProvider>> {
    let api_key = config.api_key().ok_or(WeatherError::MissingApiKey)?;
    let provider = TomorrowProvider::with_settings(api_key, &config.provider)?;

    Ok(Box::new(provider))
}
