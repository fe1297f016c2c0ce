use thiserror::Error;

/// Failures of a single search request. All of them are turned into a fixed
/// reply by the pipeline; none of them is fatal to the process.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("movie index unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("movie index returned an unexpected response: {0}")]
    UpstreamMalformed(String),
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SearchError::UpstreamMalformed(err.to_string())
        } else {
            SearchError::UpstreamUnavailable(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}
