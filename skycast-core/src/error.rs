use thiserror::Error;

use crate::source::SourceId;

/// Failure while decoding a national time-series payload.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid XML: {0}")]
    Xml(String),
    /// Both the namespaced and the bare query found zero member blocks.
    /// Legitimately empty data still carries members, so this means the
    /// endpoint returned an unexpected payload shape.
    #[error("no time-series data found")]
    NoData,
}

/// Failures local to one source adapter. Everything that goes wrong
/// inside an adapter (transport, decode, empty result) is folded into
/// `Unavailable` at the adapter boundary so the orchestrator only has to
/// reason about "did this source produce usable data".
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{source_id} source unavailable: {reason}")]
    Unavailable { source_id: SourceId, reason: String },

    /// Raised before any network call when the day's ceiling is reached.
    /// Never downgraded to a fallback.
    #[error("daily API call quota exhausted for {0}")]
    QuotaExceeded(SourceId),
}

impl SourceError {
    pub fn unavailable(source: SourceId, reason: impl std::fmt::Display) -> Self {
        SourceError::Unavailable { source_id: source, reason: reason.to_string() }
    }
}

/// Failures surfaced to the caller of a search. The rendering layer
/// shows these as their literal descriptions; nothing is retried.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search already in progress, please wait")]
    Busy,

    #[error("please wait before searching again")]
    RateLimited,

    #[error("location not found")]
    LocationNotFound,

    #[error("no weather data available from any source")]
    AllSourcesUnavailable,

    #[error(transparent)]
    Source(#[from] SourceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_error_display_names_the_source() {
        let err = SourceError::unavailable(SourceId::National, "connection refused");
        assert_eq!(err.to_string(), "national source unavailable: connection refused");

        let err = SourceError::QuotaExceeded(SourceId::Commercial);
        assert!(err.to_string().contains("commercial"));
    }

    #[test]
    fn search_error_passes_source_description_through() {
        let err = SearchError::from(SourceError::QuotaExceeded(SourceId::Commercial));
        assert_eq!(err.to_string(), "daily API call quota exhausted for commercial");
    }
}
