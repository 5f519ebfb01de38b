//! Metric aggregation core for the Statok client.
//!
//! Applications report two kinds of observations: counter increments and
//! numeric values. Observations are high-volume, so they are never stored
//! individually. Instead, the [`Aggregator`] folds every observation into
//! per-metric [accumulators](Accumulator), one per combination of time
//! resolution ([`Step`]), time bucket, and label tuple.
//!
//! # Aggregation
//!
//! Counter increments are summed. Values additionally feed a
//! [`ValuesDigest`], which keeps the observations verbatim while there are
//! few of them and transparently switches to a fixed-memory summary
//! (min/max/compensated average plus one [`Psqr`] quantile estimator per
//! tracked percentile) once the stream outgrows the exact buffer. Memory per
//! bucket is therefore bounded no matter the event rate.
//!
//! # Draining
//!
//! A bucket is *closed* once wall time has moved past its window. The
//! [`Aggregator::drain`] pass hands every closed accumulator to a caller
//! provided sink — exactly once — and then evicts it, recycling digests and
//! metric slots through pools. Open buckets stay behind and keep
//! aggregating.
//!
//! This crate performs no I/O; serialization and delivery live in the
//! `statok` client crate.
#![warn(missing_docs)]

mod aggregator;
mod digest;
mod psqr;

pub use aggregator::*;
pub use digest::*;
pub use psqr::*;
