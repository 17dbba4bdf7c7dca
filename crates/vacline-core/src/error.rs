//! Error types shared across the vacline crates.
//!
//! The variants follow the failure taxonomy of the controllers: transport
//! failures that abort a serial exchange, per-attribute value problems that
//! feed the hysteresis counters, and staleness of the event stream.

/// Result type alias for vacline operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the serial and event engines.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The serial-line collaborator did not answer the liveness probe.
    /// Aborts the whole exchange; retried on the next polling cycle.
    #[error("Serial line not available: {device}")]
    TransportUnavailable { device: String },

    /// Nothing (or nothing meaningful) was received before the timeout.
    #[error("Read of '{command}' timed out after {duration_ms}ms")]
    ReadTimeout { command: String, duration_ms: u64 },

    /// The exchange completed but the cleaned reply was empty.
    #[error("Command '{command}' received nothing")]
    EmptyResponse { command: String },

    /// A received value could not be interpreted for an attribute.
    #[error("Unparsable value for '{attribute}': {raw}")]
    UnparsableValue { attribute: String, raw: String },

    /// The parent device is in INIT/UNKNOWN; its values cannot be trusted.
    #[error("Upstream device {device} is not trustworthy")]
    UpstreamUnknown { device: String },

    /// No events received within the staleness window.
    #[error("Events not received since {last_event}")]
    Stale { last_event: String },

    /// A notification source string could not be resolved.
    #[error("Invalid event source: {0}")]
    InvalidSource(String),

    /// An unknown command key was referenced in the command table.
    #[error("Unknown command key: {0}")]
    UnknownCommand(String),

    /// A mandatory device property is missing or malformed.
    #[error("Invalid property '{name}': {message}")]
    InvalidProperty { name: String, message: String },

    /// Generic I/O error (black-box dumps, TTY access).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// Create a new transport-unavailable error.
    pub fn transport_unavailable(device: impl Into<String>) -> Self {
        Self::TransportUnavailable {
            device: device.into(),
        }
    }

    /// Create a new read-timeout error.
    pub fn read_timeout(command: impl Into<String>, duration_ms: u64) -> Self {
        Self::ReadTimeout {
            command: command.into(),
            duration_ms,
        }
    }

    /// Create a new empty-response error.
    pub fn empty_response(command: impl Into<String>) -> Self {
        Self::EmptyResponse {
            command: command.into(),
        }
    }

    /// Create a new unparsable-value error.
    pub fn unparsable(attribute: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::UnparsableValue {
            attribute: attribute.into(),
            raw: raw.into(),
        }
    }

    /// Create a new invalid-property error.
    pub fn invalid_property(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidProperty {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a generic error with custom message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_unavailable_display() {
        let error = CoreError::transport_unavailable("lab/serial/ttyR01");
        assert_eq!(
            error.to_string(),
            "Serial line not available: lab/serial/ttyR01"
        );
    }

    #[test]
    fn test_read_timeout_display() {
        let error = CoreError::read_timeout("PZ", 2000);
        assert_eq!(error.to_string(), "Read of 'PZ' timed out after 2000ms");
    }

    #[test]
    fn test_unparsable_display() {
        let error = CoreError::unparsable("pressure", "LO<1e-11");
        assert!(error.to_string().contains("pressure"));
        assert!(error.to_string().contains("LO<1e-11"));
    }
}
