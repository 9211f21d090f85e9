//! # eventflux
//!
//! **eventflux** routes structured lifecycle events from a running
//! workflow-execution monitor to one or more heterogeneous destinations:
//! local files, raw TCP streams, AMQP broker exchanges, or relational
//! datastores (through an external record loader).
//!
//! Destinations are selected dynamically from a URL-like descriptor
//! string, wire encodings are pluggable, and multi-destination fan-out
//! is fault isolated: one broken destination never takes down delivery
//! to the others.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!            monitor.send("wf.plan", attributes)
//!                          │
//!                          ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  create_sink(dest, namespace, encoding, props, loaders)      │
//! │  - parses the destination descriptor                         │
//! │  - detects multiplexed delivery (extra <name>.url props)     │
//! │  - resolves dispatch once, at build time                     │
//! └──────┬───────────────┬───────────────┬───────────────┬───────┘
//!        ▼               ▼               ▼               ▼
//!   ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────────┐
//!   │ FileSink │   │ TcpSink  │   │  DbSink  │   │  BrokerSink  │
//!   │ (append) │   │ (stream) │   │ (loader) │   │ (queue +     │
//!   └──────────┘   └──────────┘   └──────────┘   │  worker task)│
//!                                                └──────┬───────┘
//!                                                       │ unbounded FIFO
//!                                                       ▼
//!                                              publisher worker:
//!                                              connect → publish → ack
//!                                              reconnect with backoff,
//!                                              fatal errors stop it
//! ```
//!
//! ### Delivery guarantees
//! - Within one sink, events reach the transport in `send` order.
//! - The broker sink is at-least-once: a queued event is dropped only
//!   after the broker acknowledges it, across reconnects.
//! - Everything else is best effort; event delivery failures must never
//!   abort the workflow run being observed.
//!
//! ## Features
//! | Area            | Description                                              | Key types / traits                |
//! |-----------------|----------------------------------------------------------|-----------------------------------|
//! | **Sink API**    | One `send`/`flush`/`close` contract for every transport. | [`Sink`], [`create_sink`]         |
//! | **Encodings**   | Name-value, JSON-lines, or BSON wire formats.            | [`Encoding`]                      |
//! | **Filtering**   | Per-broker event-name filter from configuration.         | [`EventFilter`]                   |
//! | **Fan-out**     | Multi-destination delivery with failure isolation.       | [`MultiplexSink`]                 |
//! | **Reliability** | Bounded reconnects with exponential backoff.             | [`ReconnectPolicy`], [`BrokerSink`] |
//! | **Loaders**     | External database loader seam.                           | [`RecordLoader`], [`LoaderProvider`] |
//!
//! ## Optional features
//! - `amqp` *(default)*: AMQP broker destinations via `lapin`.
//! - `bson`: the binary document encoding. Selecting `"bson"` without
//!   this feature is a construction-time configuration error.
//!
//! ## Example
//! ```rust,no_run
//! use eventflux::{create_sink, Attributes, Namespace, Properties};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let props = Properties::new();
//!     let mut sink = create_sink(
//!         Some("/var/run/monitord/events.json"),
//!         Namespace::Stampede,
//!         Some("json"),
//!         &props,
//!         None,
//!         false,
//!     )
//!     .await?
//!     .expect("destination configured");
//!
//!     let mut attrs = Attributes::new();
//!     attrs.insert("wf__id".into(), "wf-42".into());
//!     sink.send("wf.plan", &attrs).await?;
//!     sink.close().await?;
//!     Ok(())
//! }
//! ```

mod dest;
mod encode;
mod error;
mod factory;
mod filter;
mod policy;
mod props;
mod sinks;

// ---- Public re-exports ----

pub use dest::Dest;
pub use encode::{Attributes, Encoding};
pub use error::SinkError;
pub use factory::create_sink;
pub use filter::{EventFilter, RECOGNIZED_EVENTS};
pub use policy::ReconnectPolicy;
pub use props::Properties;
pub use sinks::{
    BrokerChannel, BrokerFailure, BrokerParams, BrokerSink, BrokerTransport, ConnectionState,
    DbSink, FileSink, LoaderProvider, MultiplexSink, Namespace, Record, RecordLoader, Sink,
    TcpSink,
};

// Production AMQP transport; enable with the (default) `amqp` feature.
#[cfg(feature = "amqp")]
pub use sinks::AmqpTransport;
