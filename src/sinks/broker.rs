//! # Broker sink: queued, at-least-once publishing with reconnects.
//!
//! The only sink with real concurrency. `send` never touches the
//! network: it filters, encodes, and enqueues; a dedicated publisher
//! worker owns the connection and all of its state.
//!
//! ## Architecture
//! ```text
//! send(event, attrs)
//!   │  filter on namespaced name, encode
//!   ▼
//! [unbounded FIFO queue] ──► publisher worker ──► broker channel
//!                              │ holds the in-flight item outside the
//!                              │ queue until the publish is acked
//!                              └─► retryable failure: reconnect with
//!                                  backoff, same item retried first
//! ```
//!
//! ## Connection state machine (worker-owned)
//! ```text
//! Disconnected ──► Connecting ──► Connected ──► Stopping ──► Stopped
//!                      ▲              │
//!                      └── backoff ───┘   retryable failure, attempts ≤ max
//!
//! Connected ──► Stopped    broker closed / protocol error (no retry),
//!                          or retryable attempts exhausted
//! ```
//!
//! ## Rules
//! - An item leaves the queue only after a successful publish
//!   acknowledgement: at-least-once delivery across reconnects.
//! - All connection state is confined to the worker; callers share only
//!   the queue and a pending counter.
//! - `send` after the worker has exited raises [`SinkError::WorkerDead`].
//! - `close` drains best-effort (while the worker is alive and making
//!   progress), then stops and joins the worker.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::encode::{Attributes, Encoding};
use crate::error::SinkError;
use crate::filter::EventFilter;
use crate::policy::ReconnectPolicy;
use crate::sinks::transport::{BrokerChannel, BrokerParams, BrokerTransport};
use crate::sinks::{Namespace, Sink};

/// How long the worker blocks on the queue before giving the transport
/// an idle tick for keepalive processing.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How often `close` re-checks the pending counter while draining.
const DRAIN_POLL: Duration = Duration::from_millis(50);

/// Connection lifecycle of the publisher worker.
///
/// Transitioned exclusively by the worker; observable through
/// [`BrokerSink::state`] for logging and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Worker has not yet attempted a connection.
    Disconnected,
    /// Connection and exchange declaration in progress.
    Connecting,
    /// Publishing from the queue.
    Connected,
    /// Stop requested; closing the connection.
    Stopping,
    /// Worker has exited; the sink is permanently unusable.
    Stopped,
}

/// One queued publish: the namespaced routing key, the raw event name
/// (for logs), and the encoded payload.
struct QueuedEvent {
    routing_key: String,
    event: String,
    payload: Vec<u8>,
}

/// Writes workflow event logs to a message broker exchange.
pub struct BrokerSink {
    tx: mpsc::UnboundedSender<QueuedEvent>,
    pending: Arc<AtomicUsize>,
    stop: CancellationToken,
    worker: Option<JoinHandle<()>>,
    state: watch::Receiver<ConnectionState>,
    namespace: Namespace,
    encoding: Encoding,
    filter: EventFilter,
}

impl BrokerSink {
    /// Creates the sink and starts its publisher worker.
    ///
    /// The worker connects in the background; construction itself never
    /// touches the network.
    #[must_use]
    pub fn start(
        transport: Arc<dyn BrokerTransport>,
        params: BrokerParams,
        namespace: Namespace,
        encoding: Encoding,
        filter: EventFilter,
        policy: ReconnectPolicy,
    ) -> BrokerSink {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let stop = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let worker = PublisherWorker {
            transport,
            params,
            rx,
            pending: Arc::clone(&pending),
            stop: stop.clone(),
            policy,
            state: state_tx,
            inflight: None,
        };
        let handle = tokio::spawn(worker.run());

        BrokerSink {
            tx,
            pending,
            stop,
            worker: Some(handle),
            state: state_rx,
            namespace,
            encoding,
            filter,
        }
    }

    fn worker_alive(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Number of events enqueued but not yet acknowledged by the broker.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Current connection state of the publisher worker.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }
}

#[async_trait]
impl Sink for BrokerSink {
    /// Filters, encodes, and enqueues; never blocks on network I/O.
    async fn send(&mut self, event: &str, attrs: &Attributes) -> Result<(), SinkError> {
        if !self.worker_alive() {
            return Err(SinkError::WorkerDead);
        }

        let routing_key = self.namespace.qualify(event);
        if self.filter.ignore(&routing_key) {
            return Ok(());
        }

        let payload = self.encoding.encode(self.namespace, event, attrs)?;
        self.pending.fetch_add(1, Ordering::SeqCst);
        let queued = QueuedEvent {
            routing_key,
            event: event.to_string(),
            payload,
        };
        if self.tx.send(queued).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(SinkError::WorkerDead);
        }
        Ok(())
    }

    /// Waits for the queue to drain (best effort), then stops and joins
    /// the worker.
    async fn close(&mut self) -> Result<(), SinkError> {
        while self.worker_alive() && self.pending.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(DRAIN_POLL).await;
        }
        self.stop.cancel();
        if let Some(handle) = self.worker.take() {
            if handle.await.is_err() {
                tracing::error!("broker publisher worker panicked");
            }
        }
        tracing::trace!("broker publisher worker exited");
        Ok(())
    }
}

/// The background publisher: sole consumer of the queue and sole owner
/// of connection state.
struct PublisherWorker {
    transport: Arc<dyn BrokerTransport>,
    params: BrokerParams,
    rx: mpsc::UnboundedReceiver<QueuedEvent>,
    pending: Arc<AtomicUsize>,
    stop: CancellationToken,
    policy: ReconnectPolicy,
    state: watch::Sender<ConnectionState>,
    inflight: Option<QueuedEvent>,
}

/// Why the connected inner loop was left.
enum LoopExit {
    /// Retryable failure: reconnect, keeping the in-flight item.
    Reconnect,
    /// Fatal failure or exhausted retries: no further attempts.
    Fatal,
    /// Stop requested or queue closed.
    Stop,
}

impl PublisherWorker {
    async fn run(mut self) {
        let mut attempts: u32 = 0;

        while !self.stop.is_cancelled() {
            self.transition(ConnectionState::Connecting);
            tracing::info!(
                endpoint = %self.params.endpoint(),
                virtual_host = self.params.virtual_host.as_deref().unwrap_or("/"),
                exchange = %self.params.exchange,
                user = %self.params.user,
                tls = self.params.tls,
                "connecting to broker"
            );

            let mut channel = match self.transport.connect(&self.params).await {
                Ok(channel) => {
                    attempts = 0;
                    self.transition(ConnectionState::Connected);
                    channel
                }
                Err(failure) if failure.is_fatal() => {
                    tracing::error!(
                        endpoint = %self.params.endpoint(),
                        error = %failure,
                        "broker connection failed, not recovering"
                    );
                    break;
                }
                Err(failure) => {
                    attempts += 1;
                    if !self.backoff_or_stop(attempts, &failure).await {
                        break;
                    }
                    continue;
                }
            };

            let exit = self.publish_loop(channel.as_mut()).await;
            self.transition(ConnectionState::Stopping);
            channel.close().await;

            match exit {
                LoopExit::Stop | LoopExit::Fatal => break,
                LoopExit::Reconnect => {
                    attempts += 1;
                    if !self
                        .backoff_or_stop(attempts, &BrokerFailureNote("connection lost"))
                        .await
                    {
                        break;
                    }
                }
            }
        }

        self.transition(ConnectionState::Stopped);
    }

    /// The connected inner loop: timed queue polls interleaved with
    /// keepalive ticks, publishing one item at a time.
    async fn publish_loop(&mut self, channel: &mut dyn BrokerChannel) -> LoopExit {
        loop {
            if self.inflight.is_none() {
                tokio::select! {
                    _ = self.stop.cancelled() => return LoopExit::Stop,
                    polled = tokio::time::timeout(POLL_INTERVAL, self.rx.recv()) => {
                        match polled {
                            Ok(Some(item)) => self.inflight = Some(item),
                            // All senders dropped: the sink was dropped
                            // without close; nothing more will arrive.
                            Ok(None) => return LoopExit::Stop,
                            Err(_) => {
                                match channel.heartbeat().await {
                                    Ok(()) => continue,
                                    Err(failure) if failure.is_fatal() => {
                                        tracing::error!(error = %failure, "broker keepalive failed, not recovering");
                                        return LoopExit::Fatal;
                                    }
                                    Err(_) => return LoopExit::Reconnect,
                                }
                            }
                        }
                    }
                }
            }

            // Hold the item outside the queue until the publish is
            // acknowledged; on a retryable failure it stays in-flight
            // and is the first thing retried after reconnect.
            let Some(item) = self.inflight.take() else {
                continue;
            };
            tracing::trace!(event = %item.routing_key, "publish start");
            match channel.publish(&item.routing_key, &item.payload).await {
                Ok(()) => {
                    self.pending.fetch_sub(1, Ordering::SeqCst);
                    tracing::trace!(event = %item.event, "publish end");
                }
                Err(failure) if failure.is_fatal() => {
                    tracing::error!(
                        endpoint = %self.params.endpoint(),
                        error = %failure,
                        "broker closed the connection, not recovering"
                    );
                    return LoopExit::Fatal;
                }
                Err(failure) => {
                    tracing::warn!(
                        endpoint = %self.params.endpoint(),
                        error = %failure,
                        "publish failed, event kept for redelivery"
                    );
                    self.inflight = Some(item);
                    return LoopExit::Reconnect;
                }
            }
        }
    }

    /// Sleeps the backoff delay for `attempt`, honoring stop requests.
    /// Returns false when retries are exhausted or a stop arrived.
    async fn backoff_or_stop(
        &mut self,
        attempt: u32,
        cause: &(dyn std::fmt::Display + Send + Sync),
    ) -> bool {
        if self.policy.exhausted(attempt) {
            tracing::error!(
                endpoint = %self.params.endpoint(),
                attempts = attempt,
                "broker connection lost, retries exhausted, not recovering"
            );
            return false;
        }
        let delay = self.policy.delay(attempt);
        tracing::info!(
            endpoint = %self.params.endpoint(),
            attempt,
            delay_secs = delay.as_secs(),
            cause = %cause,
            "broker connection lost, will try to recover"
        );
        self.transition(ConnectionState::Disconnected);
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.stop.cancelled() => false,
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        let prev = *self.state.borrow();
        if prev != next {
            tracing::debug!(from = ?prev, to = ?next, "broker connection state");
            self.state.send_replace(next);
        }
    }
}

/// Display shim for logging a reconnect cause that is not an error value.
struct BrokerFailureNote(&'static str);

impl std::fmt::Display for BrokerFailureNote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}
