//! Statok metrics client.
//!
//! Statok ingests two kinds of application events — counter increments and
//! value observations — at high rates, aggregates them in-process, and
//! periodically ships compact bucketed summaries to the Statok collector.
//!
//! # Reporting
//!
//! ```no_run
//! statok::init(statok::Config::new("1001_0123456789abcdef")).unwrap();
//!
//! statok::event("requests", 1, &["GET", "/users"]);
//! statok::event_value("latency_ms", 12.5, &["GET", "/users"]);
//! ```
//!
//! Reporting never blocks: events are pushed onto a bounded queue and the
//! call returns. When the queue is full the event is discarded; the
//! `*_with_error` variants surface that as [`DroppedEvent`].
//!
//! # Pipeline
//!
//! A background thread runs three workers connected by bounded queues:
//!
//! 1. The *collector* folds events into the
//!    [aggregation store](statok_metrics::Aggregator). Counters sum into 10
//!    second buckets; values feed digests in 10s/60s/600s/3600s buckets.
//! 2. The *flusher* ticks every few hundred milliseconds, renders buckets
//!    whose window has closed into a zstd-compressed frame, and evicts
//!    them.
//! 3. The *sender* POSTs frames to the collector, retrying a bounded number
//!    of times before discarding.
//!
//! Delivery is best effort: at most once, no persistence. Memory stays
//! bounded under load because overload drops events rather than queueing
//! them.
#![warn(missing_docs)]

mod client;
mod compress;
mod config;
mod frame;
mod global;
mod http;
mod sender;

pub use client::{Client, ClientError, DroppedEvent};
pub use config::{Config, ConfigError, DEFAULT_ENDPOINT};
pub use global::*;
pub use http::{HttpError, HttpTransport, ReqwestTransport, TransportFuture};

pub use statok_metrics as metrics;
