use std::fmt;

/// Upstream call a provider was making when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    GridPoint,
    Stations,
    Observation,
    Forecast,
    Alerts,
    Geocode,
    ReverseGeocode,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::GridPoint => "failed to get grid point",
            Stage::Stations => "failed to get observation stations",
            Stage::Observation => "failed to get current observation",
            Stage::Forecast => "failed to get forecast",
            Stage::Alerts => "failed to get alerts",
            Stage::Geocode => "geocoding request failed",
            Stage::ReverseGeocode => "reverse geocoding request failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification callers use to decide on fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network failure, non-200 status or an unreadable response envelope.
    Transport,
    /// The envelope was JSON but did not have the expected shape.
    Decode,
    /// The upstream answered but nothing usable came back.
    Empty,
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("{stage}: HTTP request failed: {source}")]
    Transport {
        stage: Stage,
        #[source]
        source: reqwest::Error,
    },

    #[error("{stage}: API request failed with status {status}")]
    Status { stage: Stage, status: u16 },

    #[error("{stage}: failed to decode response: {source}")]
    MalformedBody {
        stage: Stage,
        #[source]
        source: serde_json::Error,
    },

    #[error("{stage}: failed to parse response: {source}")]
    Decode {
        stage: Stage,
        #[source]
        source: serde_json::Error,
    },

    #[error("{stage}: invalid timestamp {value:?}: {source}")]
    Timestamp {
        stage: Stage,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("{stage}: response is missing {field}")]
    MissingField { stage: Stage, field: &'static str },

    #[error("no observation stations found")]
    NoStations,

    #[error("no geocoding results found for {query}")]
    NoResults { query: String },

    #[error("{stage}: request cancelled")]
    Cancelled { stage: Stage },
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Client(_)
            | ProviderError::Transport { .. }
            | ProviderError::Status { .. }
            | ProviderError::MalformedBody { .. } => ErrorKind::Transport,
            ProviderError::Decode { .. }
            | ProviderError::Timestamp { .. }
            | ProviderError::MissingField { .. } => ErrorKind::Decode,
            ProviderError::NoStations | ProviderError::NoResults { .. } => ErrorKind::Empty,
            ProviderError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// True when the upstream worked but had nothing for the query.
    pub fn is_empty_result(&self) -> bool {
        self.kind() == ErrorKind::Empty
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            ProviderError::Transport { stage, .. }
            | ProviderError::Status { stage, .. }
            | ProviderError::MalformedBody { stage, .. }
            | ProviderError::Decode { stage, .. }
            | ProviderError::Timestamp { stage, .. }
            | ProviderError::MissingField { stage, .. }
            | ProviderError::Cancelled { stage } => Some(*stage),
            ProviderError::Client(_) | ProviderError::NoStations | ProviderError::NoResults { .. } => {
                None
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("cache store is closed")]
    Closed,

    #[error("failed to (de)serialize cached payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("cache operation cancelled")]
    Cancelled,
}

/// A canonical record failed a range or presence check.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: &'static str,
}

impl ValidationError {
    pub(crate) fn new(field: &'static str, reason: &'static str) -> Self {
        Self { field, reason }
    }
}
