use thiserror::Error;

pub type Result<T> = std::result::Result<T, CalcError>;

#[derive(Debug, Error)]
pub enum CalcError {
    #[error("invalid target key `{key}`: {reason}")]
    InvalidTarget { key: String, reason: &'static str },

    #[error("invalid source `{spec}`: {reason}")]
    InvalidSource { spec: String, reason: &'static str },

    #[error("invalid foreign source descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    #[error("invalid option `{name}`: expected {expected}, got {found}")]
    InvalidOption {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error(transparent)]
    Runtime(#[from] tether_core::Error),
}

impl CalcError {
    #[must_use]
    pub fn source_spec(spec: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidSource {
            spec: spec.into(),
            reason,
        }
    }

    #[must_use]
    pub fn descriptor(reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            reason: reason.into(),
        }
    }

    /// Whether this error was raised while validating a declaration, as
    /// opposed to while running a compute function or listener.
    #[must_use]
    pub fn is_declaration(&self) -> bool {
        !matches!(self, Self::Runtime(_))
    }
}
