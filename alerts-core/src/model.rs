use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// Tolerance used by `eq` / `ne` comparisons.
pub const EQ_EPSILON: f64 = 0.01;

/// Current conditions at one location, as returned by the weather client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub precipitation: f64,
    pub pressure: f64,
    pub visibility: f64,
    pub uv_index: f64,
    pub cloud_cover: f64,
    pub weather_code: i64,
    pub weather_description: String,
    pub observed_at: DateTime<Utc>,
}

impl WeatherSnapshot {
    /// Numeric value of the monitored field.
    pub fn value(&self, parameter: Parameter) -> f64 {
        match parameter {
            Parameter::Temperature => self.temperature,
            Parameter::FeelsLike => self.feels_like,
            Parameter::Humidity => self.humidity,
            Parameter::WindSpeed => self.wind_speed,
            Parameter::WindDirection => self.wind_direction,
            Parameter::Precipitation => self.precipitation,
            Parameter::Pressure => self.pressure,
            Parameter::Visibility => self.visibility,
            Parameter::UvIndex => self.uv_index,
            Parameter::CloudCover => self.cloud_cover,
            Parameter::WeatherCode => self.weather_code as f64,
        }
    }
}

/// Measurable snapshot fields a rule can monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    Temperature,
    FeelsLike,
    Humidity,
    WindSpeed,
    WindDirection,
    Precipitation,
    Pressure,
    Visibility,
    UvIndex,
    CloudCover,
    WeatherCode,
}

impl Parameter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Parameter::Temperature => "temperature",
            Parameter::FeelsLike => "feels_like",
            Parameter::Humidity => "humidity",
            Parameter::WindSpeed => "wind_speed",
            Parameter::WindDirection => "wind_direction",
            Parameter::Precipitation => "precipitation",
            Parameter::Pressure => "pressure",
            Parameter::Visibility => "visibility",
            Parameter::UvIndex => "uv_index",
            Parameter::CloudCover => "cloud_cover",
            Parameter::WeatherCode => "weather_code",
        }
    }

    pub const fn all() -> &'static [Parameter] {
        &[
            Parameter::Temperature,
            Parameter::FeelsLike,
            Parameter::Humidity,
            Parameter::WindSpeed,
            Parameter::WindDirection,
            Parameter::Precipitation,
            Parameter::Pressure,
            Parameter::Visibility,
            Parameter::UvIndex,
            Parameter::CloudCover,
            Parameter::WeatherCode,
        ]
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Parameter {
    type Err = EvalError;

    /// Accepts both `wind_speed` and the provider's `windSpeed` spelling.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized: String =
            value.chars().filter(|c| *c != '_').flat_map(char::to_lowercase).collect();

        Parameter::all()
            .iter()
            .copied()
            .find(|p| p.as_str().replace('_', "") == normalized)
            .ok_or_else(|| EvalError::UnknownParameter(value.to_string()))
    }
}

/// Comparison applied between an observed value and a rule's threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
}

impl Operator {
    pub fn apply(&self, observed: f64, threshold: f64) -> bool {
        match self {
            Operator::Gt => observed > threshold,
            Operator::Gte => observed >= threshold,
            Operator::Lt => observed < threshold,
            Operator::Lte => observed <= threshold,
            Operator::Eq => (observed - threshold).abs() < EQ_EPSILON,
            Operator::Ne => (observed - threshold).abs() >= EQ_EPSILON,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A user-defined threshold condition. Owned by the external rule store.
///
/// `parameter` stays a raw string because stored rules may reference fields
/// that do not exist; those fail at evaluation time, one rule at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub location: String,
    pub parameter: String,
    pub operator: Operator,
    pub threshold: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

/// One evaluation of one rule. Append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub rule_id: String,
    pub is_triggered: bool,
    pub observed_value: f64,
    pub threshold_value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Per-rule result of a cycle or an on-demand evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub rule_id: String,
    pub rule_name: String,
    pub outcome: Result<EvaluationRecord, EvalError>,
}

impl EvaluationResult {
    pub fn is_triggered(&self) -> bool {
        matches!(&self.outcome, Ok(record) if record.is_triggered)
    }
}

/// What happened when a cycle was requested.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Completed(Vec<EvaluationResult>),
    /// Another cycle was still running; nothing was evaluated.
    Skipped,
}

/// A `"lat,lon"` pair accepted by the provider as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinates(String);

impl Coordinates {
    /// Parses strings shaped like `-?\d+(\.\d+)?,-?\d+(\.\d+)?`.
    pub fn parse(value: &str) -> Option<Self> {
        let (lat, lon) = value.split_once(',')?;
        (is_decimal(lat) && is_decimal(lon)).then(|| Coordinates(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_decimal(part: &str) -> bool {
    let digits = part.strip_prefix('-').unwrap_or(part);
    let (int, frac) = match digits.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (digits, None),
    };
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    all_digits(int) && frac.is_none_or(all_digits)
}

/// Time granularity of a forecast request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timestep {
    #[serde(rename = "1m")]
    Minutely,
    #[serde(rename = "1h")]
    Hourly,
    #[serde(rename = "1d")]
    Daily,
}

impl Timestep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timestep::Minutely => "1m",
            Timestep::Hourly => "1h",
            Timestep::Daily => "1d",
        }
    }
}

impl fmt::Display for Timestep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Timestep {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "1m" => Ok(Timestep::Minutely),
            "1h" => Ok(Timestep::Hourly),
            "1d" => Ok(Timestep::Daily),
            _ => Err(anyhow::anyhow!("Unknown timestep '{value}'. Supported: 1m, 1h, 1d.")),
        }
    }
}

/// Human-readable description of a Tomorrow.io weather code.
pub fn describe_weather_code(code: i64) -> &'static str {
    match code {
        1000 => "Clear, Sunny",
        1100 => "Mostly Clear",
        1101 => "Partly Cloudy",
        1102 => "Mostly Cloudy",
        1001 => "Cloudy",
        2000 => "Fog",
        2100 => "Light Fog",
        4000 => "Drizzle",
        4001 => "Rain",
        4200 => "Light Rain",
        4201 => "Heavy Rain",
        5000 => "Snow",
        5001 => "Flurries",
        5100 => "Light Snow",
        5101 => "Heavy Snow",
        6000 => "Freezing Drizzle",
        6001 => "Freezing Rain",
        6200 => "Light Freezing Rain",
        6201 => "Heavy Freezing Rain",
        7000 => "Ice Pellets",
        7101 => "Heavy Ice Pellets",
        7102 => "Light Ice Pellets",
        8000 => "Thunderstorm",
        _ => "Unknown",
    }
}
