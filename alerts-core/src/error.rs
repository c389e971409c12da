//! Error types for the acquisition pipeline and the rule evaluator.

use std::time::Duration;

use thiserror::Error;

/// Failure of a single upstream attempt.
///
/// Carries a structured status so retry classification never has to look
/// at message text.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("provider returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("provider rate limited the request (retry after {retry_after:?})")]
    TooManyRequests { retry_after: Option<Duration> },

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to decode provider response: {0}")]
    Decode(String),
}

impl FetchError {
    /// HTTP status signalled by the provider, if the attempt got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::TooManyRequests { .. } => Some(429),
            FetchError::Network(_) | FetchError::Decode(_) => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Status { status: status.as_u16(), message: err.to_string() }
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Errors surfaced by the weather client.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WeatherError {
    #[error("could not resolve location '{0}'")]
    Location(String),

    #[error("rate limit reached, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("upstream request failed after {attempts} attempt(s): {source}")]
    Upstream {
        attempts: u32,
        #[source]
        source: FetchError,
    },

    #[error(
        "No API key configured for the weather provider.\n\
         Hint: run `weather-alerts configure` or set TOMORROW_API_KEY."
    )]
    MissingApiKey,
}

impl WeatherError {
    /// Underlying provider status for upstream failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            WeatherError::Upstream { source, .. } => source.status(),
            _ => None,
        }
    }
}

/// Errors raised while evaluating rules.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    #[error(transparent)]
    Weather(#[from] WeatherError),

    #[error("unknown weather parameter '{0}'")]
    UnknownParameter(String),

    #[error("rule '{0}' not found")]
    NotFound(String),

    #[error("rule store error: {0}")]
    Store(String),
}

impl EvalError {
    /// Caused by bad caller input (maps to a client error at an API layer).
    pub fn is_client_input(&self) -> bool {
        matches!(
            self,
            EvalError::UnknownParameter(_) | EvalError::Weather(WeatherError::Location(_))
        )
    }

    /// Worth retrying later with backoff.
    pub fn is_retryable_later(&self) -> bool {
        matches!(self, EvalError::Weather(WeatherError::RateLimited { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_exposes_status() {
        let err = FetchError::Status { status: 503, message: "down".into() };
        assert_eq!(err.status(), Some(503));
        assert_eq!(FetchError::TooManyRequests { retry_after: None }.status(), Some(429));
        assert_eq!(FetchError::Network("reset".into()).status(), None);
    }

    #[test]
    fn upstream_error_carries_underlying_status() {
        let err = WeatherError::Upstream {
            attempts: 1,
            source: FetchError::Status { status: 401, message: "bad key".into() },
        };
        assert_eq!(err.status(), Some(401));
        assert!(err.to_string().contains("after 1 attempt"));
    }

    #[test]
    fn api_mapping_helpers() {
        assert!(EvalError::UnknownParameter("dew_point".into()).is_client_input());
        assert!(EvalError::from(WeatherError::Location("Atlantis".into())).is_client_input());

        let limited = EvalError::from(WeatherError::RateLimited { retry_after: Duration::from_secs(3) });
        assert!(limited.is_retryable_later());
        assert!(!limited.is_client_input());
        assert!(!EvalError::NotFound("r1".into()).is_retryable_later());
    }
}
