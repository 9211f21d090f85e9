//! # Event sinks: one `send`/`flush`/`close` contract, many transports.
//!
//! Every destination, regardless of transport, implements [`Sink`]:
//!
//! ```text
//! monitor ── send(event, attrs) ──► Sink ──► encoder ──► transport
//!                                    │
//!             FileSink   append bytes to a local file
//!             TcpSink    write bytes to one persistent socket
//!             DbSink     forward records to an external loader
//!             BrokerSink queue for a background publisher task
//!             MultiplexSink  fan out to all of the above
//! ```
//!
//! ## Rules
//! - `send` delivers one event; failures surface as errors unless the
//!   sink's own policy explicitly swallows them (multiplex fan-out).
//! - `flush` is a best-effort hint; a no-op is a legal implementation.
//! - `close` releases resources and must be safe to call exactly once;
//!   sending after `close` is undefined.
//! - Within one sink, events reach the transport in `send` order.

mod broker;
mod db;
mod file;
mod multiplex;
mod tcp;
mod transport;

pub use broker::{BrokerSink, ConnectionState};
pub use db::{DbSink, LoaderProvider, Record, RecordLoader};
pub use file::FileSink;
pub use multiplex::MultiplexSink;
pub use tcp::TcpSink;
#[cfg(feature = "amqp")]
pub use transport::AmqpTransport;
pub use transport::{BrokerChannel, BrokerFailure, BrokerParams, BrokerTransport};

use async_trait::async_trait;

use crate::encode::Attributes;
use crate::error::SinkError;

/// Namespace prefix prepended to every event name before filtering and
/// encoding. Distinguishes workflow events from dashboard events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// Workflow events (`stampede.`).
    Stampede,
    /// Dashboard events (`dashboard.`).
    Dashboard,
}

impl Namespace {
    /// The prefix string, including the trailing dot.
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Stampede => "stampede.",
            Namespace::Dashboard => "dashboard.",
        }
    }

    /// Prefixes an unqualified event name.
    pub fn qualify(&self, event: &str) -> String {
        let mut full = String::with_capacity(self.as_str().len() + event.len());
        full.push_str(self.as_str());
        full.push_str(event);
        full
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common contract for event destinations.
///
/// The monitor calls [`Sink::send`] once per lifecycle event and
/// [`Sink::close`] once at end-of-run. Sinks are driven by a single
/// caller task; they are `Send` but provide no internal locking.
#[async_trait]
pub trait Sink: Send {
    /// Delivers one event with its attribute map.
    ///
    /// The event name is unqualified (`"wf.plan"`); the sink applies its
    /// namespace prefix internally before encoding or filtering.
    async fn send(&mut self, event: &str, attrs: &Attributes) -> Result<(), SinkError>;

    /// Pushes internally buffered state toward the transport.
    ///
    /// Best effort; the default implementation is a no-op.
    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Releases all resources, draining pending state first where the
    /// transport supports it.
    async fn close(&mut self) -> Result<(), SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_qualify() {
        assert_eq!(Namespace::Stampede.qualify("wf.plan"), "stampede.wf.plan");
        assert_eq!(Namespace::Dashboard.qualify("xwf.end"), "dashboard.xwf.end");
    }
}
