//! # Multiplexing sink: fan out one event stream to many destinations.
//!
//! Composes independently configured sinks and delivers every event to
//! all of them, with per-destination failure isolation:
//!
//! - An endpoint that fails to **construct** is logged and omitted;
//!   building the multiplexer itself never fails because of one bad
//!   endpoint.
//! - An endpoint whose `send` **fails** is logged, closed best-effort,
//!   and permanently removed from the registry. It is never re-added:
//!   fan-out delivery degrades rather than failing the run.
//!
//! One `send` on the multiplexer reaches every currently-live endpoint
//! exactly once, even when an earlier endpoint fails mid-iteration.
//! No ordering is guaranteed *between* destinations.
//!
//! The registry is mutated only by the task driving `send`/`close`;
//! concurrent callers need external synchronization.

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::encode::Attributes;
use crate::error::SinkError;
use crate::factory;
use crate::props::Properties;
use crate::sinks::{LoaderProvider, Namespace, Sink};

/// Sends events to multiple endpoints.
pub struct MultiplexSink {
    endpoints: IndexMap<String, Box<dyn Sink>>,
}

impl MultiplexSink {
    /// Builds one sub-sink per `<name>.url` property, each configured
    /// from its own `<name>.*` scoped properties.
    ///
    /// Endpoints that fail to construct are logged and skipped.
    pub async fn build(
        namespace: Namespace,
        encoding: Option<&str>,
        props: &Properties,
        loaders: Option<&dyn LoaderProvider>,
        restart: bool,
    ) -> MultiplexSink {
        let declared: Vec<(String, String)> = props
            .iter()
            .filter_map(|(key, value)| {
                key.strip_suffix(".url")
                    .map(|name| (name.to_string(), value.to_string()))
            })
            .collect();

        let mut endpoints: IndexMap<String, Box<dyn Sink>> = IndexMap::new();
        for (name, url) in declared {
            let scoped = props.subset(&format!("{name}."));
            match factory::build_single(&url, namespace, encoding, &scoped, loaders, restart).await
            {
                Ok(sink) => {
                    tracing::debug!(endpoint = %name, url = %url, "multiplex endpoint ready");
                    endpoints.insert(name, sink);
                }
                Err(err) => {
                    tracing::error!(
                        endpoint = %name,
                        url = %url,
                        error = %err,
                        "unable to connect multiplex endpoint, disabling"
                    );
                }
            }
        }

        MultiplexSink { endpoints }
    }

    /// Number of live endpoints.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// True when no endpoint survived construction.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Names of the live endpoints, in configuration order.
    pub fn endpoint_names(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }
}

#[async_trait]
impl Sink for MultiplexSink {
    /// Delivers to every live endpoint; failing endpoints are disabled
    /// after the iteration so each one is reached exactly once.
    async fn send(&mut self, event: &str, attrs: &Attributes) -> Result<(), SinkError> {
        let mut failed: Vec<String> = Vec::new();
        for (name, sink) in self.endpoints.iter_mut() {
            if let Err(err) = sink.send(event, attrs).await {
                tracing::error!(
                    endpoint = %name,
                    error = %err,
                    "error sending event, disabling endpoint"
                );
                failed.push(name.clone());
            }
        }
        for name in failed {
            if let Some(mut sink) = self.endpoints.shift_remove(&name) {
                if let Err(err) = sink.close().await {
                    tracing::debug!(endpoint = %name, error = %err, "close of disabled endpoint failed");
                }
            }
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        for (name, sink) in self.endpoints.iter_mut() {
            tracing::debug!(endpoint = %name, "flushing endpoint");
            if let Err(err) = sink.flush().await {
                tracing::error!(endpoint = %name, error = %err, "endpoint flush failed");
            }
        }
        Ok(())
    }

    /// Closes every endpoint, swallowing per-endpoint errors so one
    /// misbehaving destination cannot block cleanup of the others.
    async fn close(&mut self) -> Result<(), SinkError> {
        for (name, sink) in self.endpoints.iter_mut() {
            tracing::debug!(endpoint = %name, "closing endpoint");
            if let Err(err) = sink.close().await {
                tracing::debug!(endpoint = %name, error = %err, "endpoint close failed");
            }
        }
        Ok(())
    }
}
