//! # Broker transport seam.
//!
//! The publisher worker talks to the broker through [`BrokerTransport`]
//! and [`BrokerChannel`] rather than a concrete client, so the
//! reconnect state machine can be exercised against scripted transports
//! in tests. The production implementation, [`AmqpTransport`], is a thin
//! wrapper over `lapin` behind the `amqp` feature.
//!
//! Failures carry their retry classification with them:
//! [`BrokerFailure::Fatal`] for broker-closed connections and protocol or
//! channel errors (no recovery), [`BrokerFailure::Retryable`] for
//! generic connection-level errors (reconnect with backoff).

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Connection parameters for a broker destination, resolved once by the
/// factory from the destination descriptor and properties.
#[derive(Debug, Clone)]
pub struct BrokerParams {
    /// Broker host.
    pub host: String,
    /// Broker port (scheme default already applied).
    pub port: u16,
    /// Virtual host, if the destination path named one.
    pub virtual_host: Option<String>,
    /// Exchange to declare and publish to.
    pub exchange: String,
    /// User for plain authentication.
    pub user: String,
    /// Password for plain authentication.
    pub password: String,
    /// Whether to use TLS (`amqps`).
    pub tls: bool,
    /// Optional connection timeout from the `timeout` property.
    pub connect_timeout: Option<Duration>,
}

impl BrokerParams {
    /// Renders the connection URI. The virtual host defaults to `/`
    /// (percent-encoded) when the destination path did not name one.
    pub fn uri(&self) -> String {
        let scheme = if self.tls { "amqps" } else { "amqp" };
        let vhost = match &self.virtual_host {
            Some(v) => v.as_str(),
            None => "%2f",
        };
        format!(
            "{scheme}://{}:{}@{}:{}/{vhost}",
            self.user, self.password, self.host, self.port
        )
    }

    /// `host:port` for logs.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A broker-side failure, classified for the reconnect state machine.
#[derive(Error, Debug)]
pub enum BrokerFailure {
    /// No recovery: broker closed the connection or a channel-level
    /// protocol error occurred.
    #[error("fatal broker failure: {0}")]
    Fatal(String),

    /// Generic connection-level error; retried with backoff.
    #[error("retryable broker failure: {0}")]
    Retryable(String),
}

impl BrokerFailure {
    /// True when the worker must stop instead of reconnecting.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BrokerFailure::Fatal(_))
    }
}

/// An open channel to the broker with a declared exchange.
#[async_trait]
pub trait BrokerChannel: Send {
    /// Publishes one payload under `routing_key`, waiting for the
    /// broker's acknowledgement.
    async fn publish(&mut self, routing_key: &str, payload: &[u8]) -> Result<(), BrokerFailure>;

    /// Gives the transport a chance to service keepalives while the
    /// queue is idle. Default: no-op.
    async fn heartbeat(&mut self) -> Result<(), BrokerFailure> {
        Ok(())
    }

    /// Closes the underlying connection, best effort.
    async fn close(&mut self);
}

/// Connects broker channels; implemented by the AMQP client and by
/// scripted test doubles.
#[async_trait]
pub trait BrokerTransport: Send + Sync + 'static {
    /// Opens a connection, creates a channel, and declares the exchange.
    async fn connect(&self, params: &BrokerParams) -> Result<Box<dyn BrokerChannel>, BrokerFailure>;
}

#[cfg(feature = "amqp")]
pub use amqp::AmqpTransport;

#[cfg(feature = "amqp")]
mod amqp {
    use super::*;

    use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions};
    use lapin::types::FieldTable;
    use lapin::{
        BasicProperties, Channel, Connection, ConnectionProperties, Error as LapinError,
        ExchangeKind,
    };

    /// `lapin`-backed broker transport (RabbitMQ).
    pub struct AmqpTransport;

    fn classify(err: LapinError) -> BrokerFailure {
        match &err {
            // Broker-closed connections and protocol violations do not
            // recover; everything else is treated as a connection drop.
            LapinError::ProtocolError(_)
            | LapinError::InvalidChannelState(_)
            | LapinError::InvalidConnectionState(_) => BrokerFailure::Fatal(err.to_string()),
            LapinError::IOError(_) => BrokerFailure::Retryable(err.to_string()),
            _ => BrokerFailure::Retryable(err.to_string()),
        }
    }

    struct AmqpChannel {
        connection: Connection,
        channel: Channel,
        exchange: String,
    }

    #[async_trait]
    impl BrokerTransport for AmqpTransport {
        async fn connect(
            &self,
            params: &BrokerParams,
        ) -> Result<Box<dyn BrokerChannel>, BrokerFailure> {
            let uri = params.uri();
            let connect = Connection::connect(&uri, ConnectionProperties::default());
            let connection = match params.connect_timeout {
                Some(limit) => tokio::time::timeout(limit, connect)
                    .await
                    .map_err(|_| {
                        BrokerFailure::Retryable(format!(
                            "connect to {} timed out after {limit:?}",
                            params.endpoint()
                        ))
                    })?
                    .map_err(classify)?,
                None => connect.await.map_err(classify)?,
            };

            let channel = connection.create_channel().await.map_err(classify)?;
            channel
                .exchange_declare(
                    &params.exchange,
                    ExchangeKind::Topic,
                    ExchangeDeclareOptions {
                        durable: true,
                        auto_delete: false,
                        ..ExchangeDeclareOptions::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(classify)?;

            // Publisher confirms: publish acks carry real meaning only
            // in confirm mode.
            channel
                .confirm_select(ConfirmSelectOptions::default())
                .await
                .map_err(classify)?;

            Ok(Box::new(AmqpChannel {
                connection,
                channel,
                exchange: params.exchange.clone(),
            }))
        }
    }

    #[async_trait]
    impl BrokerChannel for AmqpChannel {
        async fn publish(
            &mut self,
            routing_key: &str,
            payload: &[u8],
        ) -> Result<(), BrokerFailure> {
            let confirm = self
                .channel
                .basic_publish(
                    &self.exchange,
                    routing_key,
                    BasicPublishOptions::default(),
                    payload,
                    BasicProperties::default(),
                )
                .await
                .map_err(classify)?;
            confirm.await.map_err(classify)?;
            Ok(())
        }

        // lapin services AMQP heartbeats on its own executor; nothing to
        // drive here.

        async fn close(&mut self) {
            if let Err(err) = self.connection.close(200, "closing").await {
                tracing::debug!(error = %err, "amqp connection close failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_defaults_vhost_to_root() {
        let params = BrokerParams {
            host: "mq".into(),
            port: 5672,
            virtual_host: None,
            exchange: "workflows".into(),
            user: "guest".into(),
            password: "guest".into(),
            tls: false,
            connect_timeout: None,
        };
        assert_eq!(params.uri(), "amqp://guest:guest@mq:5672/%2f");
    }

    #[test]
    fn test_uri_with_vhost_and_tls() {
        let params = BrokerParams {
            host: "mq".into(),
            port: 5671,
            virtual_host: Some("prod".into()),
            exchange: "workflows".into(),
            user: "alice".into(),
            password: "pw".into(),
            tls: true,
            connect_timeout: None,
        };
        assert_eq!(params.uri(), "amqps://alice:pw@mq:5671/prod");
    }
}
