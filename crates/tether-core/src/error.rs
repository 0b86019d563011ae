use thiserror::Error;

/// Failure raised by a compute function or a listener.
pub type ComputeError = Box<dyn std::error::Error + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("computing `{key}` failed: {source}")]
    Compute {
        key: String,
        #[source]
        source: ComputeError,
    },

    #[error("listener for `{event}` failed: {message}")]
    Listener { event: String, message: String },
}

impl Error {
    #[must_use]
    pub fn compute(key: impl Into<String>, source: impl Into<ComputeError>) -> Self {
        Self::Compute {
            key: key.into(),
            source: source.into(),
        }
    }

    #[must_use]
    pub fn listener(event: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Listener {
            event: event.into(),
            message: message.into(),
        }
    }

    /// Key whose computation failed, if this is a compute failure.
    #[must_use]
    pub fn compute_key(&self) -> Option<&str> {
        match self {
            Self::Compute { key, .. } => Some(key),
            Self::Listener { .. } => None,
        }
    }
}
