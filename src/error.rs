//! Error types used by sinks and the sink factory.
//!
//! [`SinkError`] covers the whole delivery surface:
//!
//! - **Configuration errors** (bad destination string, unknown encoding,
//!   missing loader/backend) are raised at sink construction and are fatal
//!   to that sink only. A multiplexing sink skips sub-sinks that fail to
//!   construct instead of failing as a whole.
//! - **Delivery errors** (I/O, encoding, a dead publisher worker) surface
//!   from `send`/`flush`/`close` so the caller can decide whether the
//!   monitoring pipeline as a whole is broken.
//!
//! Broker-level failures have their own fatal/retryable split; see
//! [`BrokerFailure`](crate::sinks::BrokerFailure).

use thiserror::Error;

/// # Errors produced by event sinks and the sink factory.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SinkError {
    /// The destination string could not be parsed or is missing a
    /// required component (e.g. an AMQP URL without an exchange).
    #[error("invalid destination '{url}': {reason}")]
    InvalidDestination {
        /// The offending destination string.
        url: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The requested wire encoding name is not recognized.
    #[error("unknown encoding '{name}'")]
    UnknownEncoding {
        /// The encoding name as requested.
        name: String,
    },

    /// The requested encoding exists but its backend was not compiled in.
    #[error("encoding '{name}' selected, but support is not compiled in")]
    EncodingUnavailable {
        /// The encoding name.
        name: &'static str,
    },

    /// An AMQP destination was selected without the `amqp` feature.
    #[error("AMQP destination selected, but AMQP support is not compiled in")]
    AmqpUnavailable,

    /// A configuration property had an unusable value.
    #[error("invalid value '{value}' for property '{key}'")]
    InvalidProperty {
        /// Property key (after prefix scoping).
        key: String,
        /// The rejected value.
        value: String,
    },

    /// An event filter pattern failed to compile.
    #[error("invalid event filter pattern '{pattern}': {reason}")]
    InvalidFilter {
        /// The comma-separated token that failed.
        pattern: String,
        /// Compile error detail.
        reason: String,
    },

    /// An event could not be serialized with the configured encoding.
    #[error("failed to encode event '{event}': {reason}")]
    Encode {
        /// The unqualified event name.
        event: String,
        /// Serializer error detail.
        reason: String,
    },

    /// Transport-level I/O failure (file write, TCP connect/write).
    #[error("I/O error on {target}: {source}")]
    Io {
        /// Human-readable target (path or host:port).
        target: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A database destination was selected but no loader provider was given.
    #[error("no record loader available for namespace '{namespace}'")]
    NoLoader {
        /// Namespace prefix the loader was looked up for.
        namespace: &'static str,
    },

    /// The external record loader reported a failure.
    #[error("record loader failed: {reason}")]
    Loader {
        /// Loader error detail.
        reason: String,
    },

    /// The broker publisher worker has exited; the sink is permanently
    /// unusable and `send` must not be called again.
    #[error("broker publisher worker is not running")]
    WorkerDead,
}

impl SinkError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SinkError::InvalidDestination { .. } => "invalid_destination",
            SinkError::UnknownEncoding { .. } => "unknown_encoding",
            SinkError::EncodingUnavailable { .. } => "encoding_unavailable",
            SinkError::AmqpUnavailable => "amqp_unavailable",
            SinkError::InvalidProperty { .. } => "invalid_property",
            SinkError::InvalidFilter { .. } => "invalid_filter",
            SinkError::Encode { .. } => "encode_failed",
            SinkError::Io { .. } => "io_error",
            SinkError::NoLoader { .. } => "no_loader",
            SinkError::Loader { .. } => "loader_failed",
            SinkError::WorkerDead => "worker_dead",
        }
    }

    /// True for errors raised at sink construction time.
    ///
    /// Construction errors are fatal to the sink being built but are
    /// skipped (logged, endpoint omitted) by the multiplexing sink.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SinkError::InvalidDestination { .. }
                | SinkError::UnknownEncoding { .. }
                | SinkError::EncodingUnavailable { .. }
                | SinkError::AmqpUnavailable
                | SinkError::InvalidProperty { .. }
                | SinkError::InvalidFilter { .. }
                | SinkError::NoLoader { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        let err = SinkError::WorkerDead;
        assert_eq!(err.as_label(), "worker_dead");

        let err = SinkError::UnknownEncoding { name: "xml".into() };
        assert_eq!(err.as_label(), "unknown_encoding");
    }

    #[test]
    fn test_configuration_split() {
        assert!(SinkError::UnknownEncoding { name: "x".into() }.is_configuration());
        assert!(SinkError::NoLoader {
            namespace: "stampede."
        }
        .is_configuration());
        assert!(!SinkError::WorkerDead.is_configuration());
        assert!(!SinkError::Io {
            target: "f".into(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "boom"),
        }
        .is_configuration());
    }
}
