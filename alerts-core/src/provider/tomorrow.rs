use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode, header::RETRY_AFTER};
use serde::Deserialize;

use crate::{
    config::ProviderSettings,
    error::FetchError,
    model::{Coordinates, Timestep, WeatherSnapshot, describe_weather_code},
};

use super::WeatherProvider;

/// Tomorrow.io v4 weather API.
#[derive(Debug, Clone)]
pub struct TomorrowProvider {
    api_key: String,
    base_url: String,
    units: String,
    http: Client,
}

impl TomorrowProvider {
    pub fn with_settings(api_key: String, settings: &ProviderSettings) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build HTTP client for Tomorrow.io")?;

        Ok(Self {
            api_key,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            units: settings.units.clone(),
            http,
        })
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<String, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("GET {}", url);

        let res = self
            .http
            .get(&url)
            .query(&[("apikey", self.api_key.as_str()), ("units", self.units.as_str())])
            .query(query)
            .send()
            .await?;

        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::TooManyRequests { retry_after: retry_after(&res) });
        }

        let body = res.text().await?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: truncate_body(&body),
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl WeatherProvider for TomorrowProvider {
    async fn realtime(&self, location: &Coordinates) -> Result<WeatherSnapshot, FetchError> {
        let body = self.get("/weather/realtime", &[("location", location.as_str())]).await?;
        parse_realtime(&body)
    }

    async fn forecast(
        &self,
        location: &Coordinates,
        timestep: Timestep,
    ) -> Result<serde_json::Value, FetchError> {
        let body = self
            .get(
                "/weather/forecast",
                &[("location", location.as_str()), ("timesteps", timestep.as_str())],
            )
            .await?;

        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct TmRealtimeResponse {
    data: TmData,
}

#[derive(Debug, Deserialize)]
struct TmData {
    #[serde(default)]
    time: Option<DateTime<Utc>>,
    #[serde(default)]
    values: TmValues,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TmValues {
    temperature: Option<f64>,
    temperature_apparent: Option<f64>,
    humidity: Option<f64>,
    wind_speed: Option<f64>,
    wind_direction: Option<f64>,
    precipitation_intensity: Option<f64>,
    pressure_surface_level: Option<f64>,
    visibility: Option<f64>,
    uv_index: Option<f64>,
    cloud_cover: Option<f64>,
    weather_code: Option<i64>,
}

/// Parses a realtime envelope. Missing numbers become 0.
pub(crate) fn parse_realtime(body: &str) -> Result<WeatherSnapshot, FetchError> {
    let parsed: TmRealtimeResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;
    let values = parsed.data.values;
    let weather_code = values.weather_code.unwrap_or(0);

    Ok(WeatherSnapshot {
        temperature: values.temperature.unwrap_or_default(),
        feels_like: values.temperature_apparent.unwrap_or_default(),
        humidity: values.humidity.unwrap_or_default(),
        wind_speed: values.wind_speed.unwrap_or_default(),
        wind_direction: values.wind_direction.unwrap_or_default(),
        precipitation: values.precipitation_intensity.unwrap_or_default(),
        pressure: values.pressure_surface_level.unwrap_or_default(),
        visibility: values.visibility.unwrap_or_default(),
        uv_index: values.uv_index.unwrap_or_default(),
        cloud_cover: values.cloud_cover.unwrap_or_default(),
        weather_code,
        weather_description: describe_weather_code(weather_code).to_string(),
        observed_at: parsed.data.time.unwrap_or_else(Utc::now),
    })
}

fn retry_after(res: &Response) -> Option<Duration> {
    res.headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_envelope() {
        let body = r#"{
            "data": {
                "time": "2026-10-19T12:00:00Z",
                "values": {
                    "temperature": 21.5,
                    "temperatureApparent": 20.9,
                    "humidity": 64,
                    "windSpeed": 3.2,
                    "windDirection": 270,
                    "precipitationIntensity": 0.4,
                    "pressureSurfaceLevel": 1013.2,
                    "visibility": 16,
                    "uvIndex": 3,
                    "cloudCover": 45,
                    "weatherCode": 1101
                }
            },
            "location": { "lat": 51.5, "lon": -0.12 }
        }"#;

        let snapshot = parse_realtime(body).expect("valid envelope");
        assert_eq!(snapshot.temperature, 21.5);
        assert_eq!(snapshot.feels_like, 20.9);
        assert_eq!(snapshot.pressure, 1013.2);
        assert_eq!(snapshot.weather_code, 1101);
        assert_eq!(snapshot.weather_description, "Partly Cloudy");
        assert_eq!(snapshot.observed_at.to_rfc3339(), "2026-10-19T12:00:00+00:00");
    }

    #[test]
    fn missing_values_default_to_zero() {
        let snapshot =
            parse_realtime(r#"{"data":{"values":{"temperature":null,"humidity":80}}}"#).unwrap();

        assert_eq!(snapshot.temperature, 0.0);
        assert_eq!(snapshot.humidity, 80.0);
        assert_eq!(snapshot.uv_index, 0.0);
        assert_eq!(snapshot.weather_description, "Unknown");
    }

    #[test]
    fn malformed_body_is_decode_error() {
        let err = parse_realtime("<html>oops</html>").unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn truncates_long_bodies() {
        let long = "x".repeat(500);
        assert_eq!(truncate_body(&long).len(), 203);
        assert_eq!(truncate_body("short"), "short");
    }
}
