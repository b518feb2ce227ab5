use std::time::Duration;
use thiserror::Error;

use crate::models::League;

/// Failures from a single provider call.
///
/// None of these ever reach the rotator: they only decide whether the
/// game store for a league gets refreshed.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned HTTP {status}")]
    Status { status: u16, retryable: bool },

    #[error("malformed response: {0}")]
    Parse(String),

    #[error("no team with abbreviation '{team}' in {league}")]
    UnknownTeam { league: League, team: String },

    #[error("fetch failed after {attempts} attempt(s): {last}")]
    FetchFailed {
        attempts: u32,
        last: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Timeout(_) | ProviderError::Transport(_) => true,
            ProviderError::Status { retryable, .. } => *retryable,
            ProviderError::Parse(_)
            | ProviderError::UnknownTeam { .. }
            | ProviderError::FetchFailed { .. } => false,
        }
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, ProviderError::Parse(_))
    }

    pub fn status(status: u16) -> Self {
        ProviderError::Status {
            status,
            retryable: status == 429 || (500..600).contains(&status),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::Parse(e.to_string())
        } else if let Some(status) = e.status() {
            ProviderError::status(status.as_u16())
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

/// Invalid league configuration. Fatal only for the league it names.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("config has no [[leagues]] array")]
    MissingLeagues,

    #[error("leagues[{index}]: {message}")]
    InvalidEntry { index: usize, message: String },

    #[error("{league}: {field} {message}")]
    InvalidValue {
        league: League,
        field: &'static str,
        message: String,
    },

    #[error("{0} is configured more than once")]
    DuplicateLeague(League),
}

impl ConfigError {
    pub fn invalid(league: League, field: &'static str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            league,
            field,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(ProviderError::status(429).is_retryable());
        assert!(ProviderError::status(503).is_retryable());
        assert!(!ProviderError::status(404).is_retryable());
        assert!(!ProviderError::Parse("x".into()).is_retryable());
        assert!(ProviderError::Timeout(Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn test_fetch_failed_message_includes_cause() {
        let err = ProviderError::FetchFailed {
            attempts: 4,
            last: Box::new(ProviderError::Timeout(Duration::from_secs(30))),
        };
        let msg = err.to_string();
        assert!(msg.contains("4 attempt"));
        assert!(msg.contains("timed out"));
    }
}
