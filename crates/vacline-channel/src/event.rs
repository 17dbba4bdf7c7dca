//! Attribute notifications and their sources.
//!
//! A source names one attribute of one device, optionally qualified with
//! the host and port of the naming service:
//! `host:port/domain/family/member/attribute` or
//! `domain/family/member/attribute`.

use vacline_core::{AttributeSample, CoreError, Result};

/// Default naming-service host for unqualified sources.
pub const DEFAULT_HOST: &str = "localhost";

/// Default naming-service port for unqualified sources.
pub const DEFAULT_PORT: u16 = 10000;

/// What a notification carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A new attribute value.
    Value,

    /// The source failed to produce a value.
    Error,

    /// Attribute configuration changed; carries no value.
    Config,
}

/// Fully resolved attribute address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSource {
    pub host: String,
    pub port: u16,

    /// Device name, `domain/family/member`.
    pub device: String,

    /// Attribute name, the last path segment.
    pub attribute: String,
}

impl EventSource {
    /// Parse a source string.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSource`] if the string does not name a
    /// `domain/family/member/attribute` path, or the host qualifier is
    /// malformed.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || CoreError::InvalidSource(raw.to_string());

        let segments: Vec<&str> = raw.split('/').collect();
        let (host, port, path) = match segments.len() {
            4 => (DEFAULT_HOST.to_string(), DEFAULT_PORT, &segments[..]),
            5 => {
                let (host, port) = segments[0].split_once(':').ok_or_else(invalid)?;
                let port: u16 = port.parse().map_err(|_| invalid())?;
                if host.is_empty() {
                    return Err(invalid());
                }
                (host.to_string(), port, &segments[1..])
            }
            _ => return Err(invalid()),
        };

        if path.iter().any(|s| s.is_empty()) {
            return Err(invalid());
        }

        Ok(Self {
            host,
            port,
            device: path[..3].join("/"),
            attribute: path[3].to_string(),
        })
    }

    /// Full source string, host qualifier included.
    pub fn full_name(&self) -> String {
        format!("{}:{}/{}/{}", self.host, self.port, self.device, self.attribute)
    }
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.device, self.attribute)
    }
}

/// One notification from a parent device.
#[derive(Debug, Clone)]
pub struct Notification {
    pub source: EventSource,
    pub kind: EventKind,

    /// Present for value notifications.
    pub sample: Option<AttributeSample>,

    /// Present for error notifications.
    pub error: Option<String>,
}

impl Notification {
    /// A value notification.
    pub fn value(source: EventSource, sample: AttributeSample) -> Self {
        Self {
            source,
            kind: EventKind::Value,
            sample: Some(sample),
            error: None,
        }
    }

    /// An error notification.
    pub fn error(source: EventSource, description: impl Into<String>) -> Self {
        Self {
            source,
            kind: EventKind::Error,
            sample: None,
            error: Some(description.into()),
        }
    }

    /// A configuration notification.
    pub fn config(source: EventSource) -> Self {
        Self {
            source,
            kind: EventKind::Config,
            sample: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unqualified_source_uses_defaults() {
        let source = EventSource::parse("lab/vc/dual01/P1").unwrap();
        assert_eq!(source.host, "localhost");
        assert_eq!(source.port, 10000);
        assert_eq!(source.device, "lab/vc/dual01");
        assert_eq!(source.attribute, "P1");
    }

    #[test]
    fn test_parse_qualified_source() {
        let source = EventSource::parse("vacuum01:10123/lab/vc/dual01/Pressure").unwrap();
        assert_eq!(source.host, "vacuum01");
        assert_eq!(source.port, 10123);
        assert_eq!(source.device, "lab/vc/dual01");
        assert_eq!(source.attribute, "Pressure");
        assert_eq!(
            source.full_name(),
            "vacuum01:10123/lab/vc/dual01/Pressure"
        );
    }

    #[test]
    fn test_parse_rejects_malformed_sources() {
        assert!(EventSource::parse("lab/vc/dual01").is_err());
        assert!(EventSource::parse("lab//dual01/P1").is_err());
        assert!(EventSource::parse("vacuum01/lab/vc/dual01/P1").is_err());
        assert!(EventSource::parse(":10000/lab/vc/dual01/P1").is_err());
        assert!(EventSource::parse("vacuum01:x/lab/vc/dual01/P1").is_err());
    }

    #[test]
    fn test_display_omits_host() {
        let source = EventSource::parse("lab/vc/dual01/P1").unwrap();
        assert_eq!(source.to_string(), "lab/vc/dual01/P1");
    }
}
