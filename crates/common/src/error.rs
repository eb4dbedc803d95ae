use thiserror::Error;

use crate::coder::CoderError;

/// Unified error type for Igloo crates.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Unable to infer a coder for {type_name}; supply one explicitly")]
    CoderResolution { type_name: &'static str },
    #[error("Failed to encode element {index}: {source}")]
    Encode {
        index: usize,
        #[source]
        source: CoderError,
    },
    #[error("Failed to decode element {index}: {source}")]
    Decode {
        index: usize,
        #[source]
        source: CoderError,
    },
    #[error("Reader is not positioned on an element")]
    NoCurrent,
    #[error("Failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Execution error: {0}")]
    Execution(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for failures that abort the bundle being read, as opposed to setup errors.
    pub fn is_read_failure(&self) -> bool {
        matches!(self, Error::Decode { .. } | Error::NoCurrent)
    }
}
