//! The Statok client and its background workers.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use statok_common::time::UnixTimestamp;
use statok_metrics::{Aggregator, Event, EventData};
use tokio::sync::{mpsc, oneshot};

use crate::config::{Config, ConfigError, Credentials};
use crate::frame::{self, BYTES_POOL};
use crate::http::{HttpError, HttpTransport, ReqwestTransport};
use crate::sender;

/// The error returned when the ingest queue is full and an event had to be
/// discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("event dropped")]
pub struct DroppedEvent;

/// An error raised while constructing a [`Client`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The HTTP transport could not be constructed.
    #[error(transparent)]
    Transport(#[from] HttpError),

    /// The background runtime or its thread could not be started.
    #[error("failed to start background worker")]
    Runtime(#[from] io::Error),

    /// The global client was initialized twice.
    #[error("global client is already initialized")]
    AlreadyInitialized,
}

/// A handle to an aggregating metrics client.
///
/// Reporting an event enqueues it on a bounded channel and returns
/// immediately; a background thread owns the aggregation state and the
/// delivery pipeline. Dropping the client (or calling
/// [`shutdown`](Self::shutdown)) closes the ingest queue; the background
/// thread then drains outstanding events, flushes every remaining bucket,
/// and exits. `shutdown` additionally blocks until that teardown finished.
#[derive(Debug)]
pub struct Client {
    events_tx: mpsc::Sender<Event>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Client {
    /// Creates a client delivering over a default [`ReqwestTransport`].
    pub fn new(config: Config) -> Result<Self, ClientError> {
        let transport = Arc::new(ReqwestTransport::new()?);
        Self::with_transport(config, transport)
    }

    /// Creates a client delivering over a caller-provided transport.
    pub fn with_transport(
        config: Config,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ClientError> {
        let credentials = Credentials::parse(&config.api_key)?;

        let (events_tx, events_rx) = mpsc::channel(config.event_queue_size.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let worker = thread::Builder::new()
            .name("statok".to_owned())
            .spawn(move || {
                runtime.block_on(run(config, credentials, transport, events_rx, shutdown_rx));
            })?;

        Ok(Self {
            events_tx,
            shutdown_tx: Some(shutdown_tx),
            worker: Some(worker),
        })
    }

    /// Reports a counter increment, discarding it on overflow.
    pub fn event(&self, name: &str, increment: u32, labels: &[&str]) {
        let _ = self.event_with_error(name, increment, labels);
    }

    /// Reports a counter increment.
    ///
    /// An increment of zero is a no-op. Returns [`DroppedEvent`] when the
    /// ingest queue is full.
    pub fn event_with_error(
        &self,
        name: &str,
        increment: u32,
        labels: &[&str],
    ) -> Result<(), DroppedEvent> {
        if increment == 0 {
            return Ok(());
        }

        self.enqueue(name, EventData::Counter(increment), labels)
    }

    /// Reports a value observation, discarding it on overflow.
    pub fn event_value(&self, name: &str, value: f32, labels: &[&str]) {
        let _ = self.event_value_with_error(name, value, labels);
    }

    /// Reports a value observation.
    ///
    /// Returns [`DroppedEvent`] when the ingest queue is full.
    pub fn event_value_with_error(
        &self,
        name: &str,
        value: f32,
        labels: &[&str],
    ) -> Result<(), DroppedEvent> {
        self.enqueue(name, EventData::Value(value), labels)
    }

    fn enqueue(&self, name: &str, data: EventData, labels: &[&str]) -> Result<(), DroppedEvent> {
        let event = Event {
            name: name.to_owned(),
            labels: labels.iter().map(|&label| label.to_owned()).collect(),
            data,
            timestamp: UnixTimestamp::now(),
        };

        self.events_tx.try_send(event).map_err(|_| DroppedEvent)
    }

    /// Shuts the client down, blocking until all buffered events have been
    /// aggregated, flushed, and handed to the transport.
    pub fn shutdown(self) {
        let Client {
            events_tx,
            shutdown_tx,
            worker,
        } = self;

        drop(events_tx);
        if let Some(shutdown_tx) = shutdown_tx {
            let _ = shutdown_tx.send(());
        }
        if let Some(worker) = worker {
            let _ = worker.join();
        }
    }

    /// Creates a client whose ingest queue has no consumer, for exercising
    /// overflow behavior.
    #[cfg(test)]
    pub(crate) fn disconnected(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (events_tx, events_rx) = mpsc::channel(capacity);
        let client = Self {
            events_tx,
            shutdown_tx: None,
            worker: None,
        };
        (client, events_rx)
    }
}

fn lock_store(store: &Mutex<Aggregator>) -> MutexGuard<'_, Aggregator> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The background main loop: spawns the three workers, then waits for the
/// shutdown signal and performs the drain sequence.
async fn run(
    config: Config,
    credentials: Credentials,
    transport: Arc<dyn HttpTransport>,
    events_rx: mpsc::Receiver<Event>,
    shutdown_rx: oneshot::Receiver<()>,
) {
    let store = Arc::new(Mutex::new(Aggregator::new()));
    let (send_tx, send_rx) = mpsc::channel(config.send_queue_size.max(1));
    let (stop_tx, stop_rx) = oneshot::channel();

    let client_id = credentials.client_id;
    let url = format!("{}/api/i2", config.endpoint);

    let collector = tokio::spawn(collect(events_rx, Arc::clone(&store)));
    let flusher = tokio::spawn(flush_loop(
        Arc::clone(&store),
        send_tx.clone(),
        client_id,
        config.flush_interval(),
        stop_rx,
    ));
    let sender = tokio::spawn(sender::send_loop(
        send_rx,
        transport,
        url,
        credentials.api_key,
        config.send_retries.max(1),
        config.retry_interval(),
    ));

    // Both halves of the teardown trigger arrive when the client handle goes
    // away: the ingest queue closes and the shutdown signal fires.
    let _ = shutdown_rx.await;
    let _ = collector.await;

    let _ = stop_tx.send(());
    let _ = flusher.await;

    // Final flush: everything still in the store goes out, closed or not.
    flush_once(&store, &send_tx, client_id, true).await;

    drop(send_tx);
    let _ = sender.await;
}

/// Stage 1: folds ingested events into the shared store.
async fn collect(mut events_rx: mpsc::Receiver<Event>, store: Arc<Mutex<Aggregator>>) {
    while let Some(event) = events_rx.recv().await {
        lock_store(&store).fold(event);
    }
}

/// Stage 2: serializes closed buckets on every tick.
async fn flush_loop(
    store: Arc<Mutex<Aggregator>>,
    send_tx: mpsc::Sender<Vec<u8>>,
    client_id: u64,
    interval: std::time::Duration,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            biased;

            _ = ticker.tick() => flush_once(&store, &send_tx, client_id, false).await,
            _ = &mut stop_rx => break,
        }
    }
}

async fn flush_once(
    store: &Mutex<Aggregator>,
    send_tx: &mpsc::Sender<Vec<u8>>,
    client_id: u64,
    force: bool,
) {
    let now = UnixTimestamp::now();

    // The store lock is released before the frame is enqueued; a full send
    // queue stalls the flusher, not the collector.
    let frame = frame::serialize_frame(&mut lock_store(store), client_id, now, force);

    if let Some(frame) = frame {
        if let Err(error) = send_tx.send(frame).await {
            let mut frame = error.0;
            frame.clear();
            BYTES_POOL.put(frame);
        }
    }
}
