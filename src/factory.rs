//! # Sink factory: destination string in, configured sink out.
//!
//! [`create_sink`] is the single entry point the monitor uses. Dispatch
//! is resolved once, at build time, from the parsed destination scheme:
//!
//! ```text
//! create_sink(dest, ...)
//!   │
//!   ├─ dest empty ─────────────► None
//!   ├─ extra <name>.url props ─► MultiplexSink (recursing per endpoint)
//!   │
//!   └─ parse scheme:
//!        (none) / file ───────► FileSink
//!        x-tcp ───────────────► TcpSink        (default port 14380)
//!        amqp / amqps ────────► BrokerSink     (ports 5672 / 5671,
//!        │                                      encoding forced to json,
//!        │                                      path = [vhost/]exchange)
//!        └─ anything else ────► DbSink          (dest = connection string,
//!                                               scheme = dialect hint)
//! ```

use std::sync::Arc;

use crate::dest::Dest;
use crate::encode::Encoding;
use crate::error::SinkError;
use crate::filter::EventFilter;
use crate::policy::ReconnectPolicy;
use crate::props::Properties;
use crate::sinks::{
    DbSink, FileSink, LoaderProvider, MultiplexSink, Namespace, Sink, TcpSink,
};

/// Default port for `x-tcp` destinations.
const TCP_DEFAULT_PORT: u16 = 14380;
/// Default AMQP port (plain).
const AMQP_DEFAULT_PORT: u16 = 5672;
/// Default AMQP port (TLS).
const AMQPS_DEFAULT_PORT: u16 = 5671;

/// Sub-destination name the primary destination is installed under when
/// the factory switches to multiplexed delivery.
const PRIMARY_ENDPOINT: &str = "default";

/// Builds the sink for `dest`, or `None` when no destination is
/// configured.
///
/// * `encoding` — wire encoding name (`None`/`"bp"`, `"json"`, `"bson"`);
///   fixed per sink at construction. AMQP destinations force `json`.
/// * `props` — configuration properties already scoped for this sink;
///   any `<name>.url` key switches delivery to a multiplexing sink with
///   the primary destination installed as the `default` endpoint.
/// * `loaders` — record-loader provider for database destinations.
/// * `restart` — truncate file destinations instead of appending (only
///   for an explicitly fresh run).
pub async fn create_sink(
    dest: Option<&str>,
    namespace: Namespace,
    encoding: Option<&str>,
    props: &Properties,
    loaders: Option<&dyn LoaderProvider>,
    restart: bool,
) -> Result<Option<Box<dyn Sink>>, SinkError> {
    let dest = match dest {
        Some(d) if !d.is_empty() => d,
        _ => return Ok(None),
    };

    // Dashboard delivery never multiplexes.
    if namespace != Namespace::Dashboard && wants_multiplex(props) {
        let mut scoped = props.clone();
        scoped.set(format!("{PRIMARY_ENDPOINT}.url"), dest);
        // Bare (dotless) keys apply to the primary destination; remap
        // them into its endpoint scope.
        let bare: Vec<String> = scoped
            .keys()
            .filter(|k| !k.contains('.'))
            .map(str::to_string)
            .collect();
        for key in bare {
            if let Some(value) = scoped.remove(&key) {
                scoped.set(format!("{PRIMARY_ENDPOINT}.{key}"), value);
            }
        }

        let sink = MultiplexSink::build(namespace, encoding, &scoped, loaders, restart).await;
        tracing::info!(
            kind = "multiplex",
            namespace = %namespace,
            endpoints = sink.len(),
            "workflow event sink connected"
        );
        return Ok(Some(Box::new(sink)));
    }

    build_single(dest, namespace, encoding, props, loaders, restart)
        .await
        .map(Some)
}

/// True when the properties declare additional destinations alongside
/// the primary one.
fn wants_multiplex(props: &Properties) -> bool {
    props.keys().any(|k| k.ends_with(".url"))
}

/// Builds exactly one sink for `dest`; multiplex detection does not
/// apply here. Used directly by the multiplexer for its endpoints.
pub(crate) async fn build_single(
    dest: &str,
    namespace: Namespace,
    encoding: Option<&str>,
    props: &Properties,
    loaders: Option<&dyn LoaderProvider>,
    restart: bool,
) -> Result<Box<dyn Sink>, SinkError> {
    let url = Dest::parse(dest)?;

    let (sink, kind, name): (Box<dyn Sink>, &str, String) = match url.scheme.as_deref() {
        None => {
            let enc = Encoding::from_name(encoding)?;
            let sink = FileSink::create(dest, restart, namespace, enc).await?;
            (Box::new(sink), "file", dest.to_string())
        }
        Some("file") => {
            let enc = Encoding::from_name(encoding)?;
            let sink = FileSink::create(&url.path, restart, namespace, enc).await?;
            (Box::new(sink), "file", url.path.clone())
        }
        Some("x-tcp") => {
            let enc = Encoding::from_name(encoding)?;
            let port = url.port.unwrap_or(TCP_DEFAULT_PORT);
            let sink = TcpSink::connect(&url.host, port, namespace, enc).await?;
            (Box::new(sink), "network", format!("{}:{port}", url.host))
        }
        Some(scheme @ ("amqp" | "amqps")) => {
            let sink = build_broker(&url, scheme, namespace, props)?;
            let name = format!("{}{}", url.host, url.path);
            (sink, "amqp", name)
        }
        Some(_dialect) => {
            let provider = loaders.ok_or(SinkError::NoLoader {
                namespace: namespace.as_str(),
            })?;
            let loader = match namespace {
                Namespace::Stampede => provider.workflow(dest, props).await?,
                Namespace::Dashboard => provider.dashboard(dest, props).await?,
            };
            let sink = DbSink::new(loader, namespace);
            (Box::new(sink), "db", dest.to_string())
        }
    };

    tracing::info!(kind, namespace = %namespace, name = %name, "workflow event sink connected");
    Ok(sink)
}

#[cfg(feature = "amqp")]
fn build_broker(
    url: &Dest,
    scheme: &str,
    namespace: Namespace,
    props: &Properties,
) -> Result<Box<dyn Sink>, SinkError> {
    use crate::sinks::{AmqpTransport, BrokerParams, BrokerSink};

    let tls = scheme == "amqps";
    let port = url.port.unwrap_or(if tls {
        AMQPS_DEFAULT_PORT
    } else {
        AMQP_DEFAULT_PORT
    });

    let (virtual_host, exchange) = url.broker_path();
    let exchange = exchange.ok_or_else(|| SinkError::InvalidDestination {
        url: url.raw.clone(),
        reason: "AMQP destination is missing the exchange path segment".to_string(),
    })?;

    // Broker endpoints always carry JSON regardless of the requested
    // encoding; downstream consumers expect it.
    let encoding = Encoding::Json;
    let filter = EventFilter::from_property(props.get("events"))?;
    let connect_timeout = props.connect_timeout()?;

    let params = BrokerParams {
        host: url.host.clone(),
        port,
        virtual_host,
        exchange,
        user: url.user.clone().unwrap_or_else(|| "guest".to_string()),
        password: url.password.clone().unwrap_or_else(|| "guest".to_string()),
        tls,
        connect_timeout,
    };

    Ok(Box::new(BrokerSink::start(
        Arc::new(AmqpTransport),
        params,
        namespace,
        encoding,
        filter,
        ReconnectPolicy::default(),
    )))
}

#[cfg(not(feature = "amqp"))]
fn build_broker(
    _url: &Dest,
    _scheme: &str,
    _namespace: Namespace,
    _props: &Properties,
) -> Result<Box<dyn Sink>, SinkError> {
    Err(SinkError::AmqpUnavailable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiplex_detection() {
        let mut props = Properties::new();
        assert!(!wants_multiplex(&props));
        props.set("events", "*");
        assert!(!wants_multiplex(&props));
        props.set("audit.url", "file:///a.json");
        assert!(wants_multiplex(&props));
    }
}
