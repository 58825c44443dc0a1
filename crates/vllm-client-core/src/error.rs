//! Error types for the vLLM client.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error produced by a transport implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for the vLLM client.
#[derive(Error, Debug)]
pub enum Error {
    /// The configured base URL is malformed or not allowed.
    #[error("Invalid configuration: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// A sampling parameter constraint was violated.
    #[error("Invalid sampling parameter `{parameter}`: {message}")]
    Validation {
        /// Name of the offending parameter, as it appears on the wire.
        parameter: &'static str,
        /// Description of the violated constraint.
        message: String,
    },

    /// Connection failure or non-success HTTP status, passed through from
    /// the transport untouched.
    #[error("Transport error: {source}")]
    Transport {
        /// The error raised by the transport.
        #[source]
        source: BoxError,
    },

    /// The server responded but violated the response protocol.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Which expectation failed.
        message: String,
    },

    /// The request payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A non-streaming call was cancelled before the response arrived.
    #[error("Request cancelled")]
    Cancelled,
}

impl Error {
    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a validation error for the given parameter.
    #[must_use]
    pub fn validation(parameter: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            parameter,
            message: message.into(),
        }
    }

    /// Wraps a transport failure without reinterpreting it.
    #[must_use]
    pub fn transport(source: impl Into<BoxError>) -> Self {
        Self::Transport {
            source: source.into(),
        }
    }

    /// Creates a protocol error.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Returns `true` if the server could not be reached or answered with
    /// an error status.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Returns `true` if the server answered but broke the wire protocol.
    #[must_use]
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    /// Returns `true` if sampling parameters failed validation.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Returns the transport error, if this is one.
    #[must_use]
    pub fn transport_source(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Transport { source } => Some(source.as_ref()),
            _ => None,
        }
    }
}
