use std::sync::Arc;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while allocating and running experiments.
///
/// Only [`Error::InvalidArgument`] signals a bug in the calling code. Everything else is a runtime
/// degradation: the runner logs it, reports it to the tracker and lets the page load untouched.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("missing required parameter: {0}")]
    InvalidArgument(&'static str),
    #[error("malformed allocation override {0:?}")]
    MalformedOverride(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    // serde_json::Error is not clonable, so we're wrapping it in an Arc.
    #[error(transparent)]
    Serialization(Arc<serde_json::Error>),
    #[error("unable to inject style: {0}")]
    Style(String),
    #[error("experiment {0:?} not found in manifest")]
    UnknownExperiment(String),
    #[error("environment {0:?} not found in product config")]
    UnknownEnvironment(String),
    #[error("experiment run panicked: {0}")]
    RunPanicked(String),
}

impl Error {
    /// Return `true` if the error is caused by the caller rather than by the page environment.
    pub fn is_programmer_error(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(Arc::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_invalid_arguments_are_programmer_errors() {
        assert!(Error::InvalidArgument("experiments").is_programmer_error());
        assert!(!Error::MalformedOverride("1.x".to_owned()).is_programmer_error());
        assert!(!Error::Style("document has no head".to_owned()).is_programmer_error());
        assert!(!Error::RunPanicked("boom".to_owned()).is_programmer_error());
    }
}
