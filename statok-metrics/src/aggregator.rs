//! Accumulation of observations into per-bucket summaries.

use std::mem;

use hashbrown::HashMap;
use smallvec::SmallVec;
use statok_common::pool::Pool;
use statok_common::time::UnixTimestamp;

use crate::ValuesDigest;

/// An ordered tuple of label values.
///
/// Labels are purely positional: `["a", "b"]` and `["b", "a"]` address
/// different accumulators. The empty tuple is a valid key.
pub type Labels = SmallVec<[String; 4]>;

/// The time resolutions every metric is aggregated at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    /// 10 second buckets, the finest resolution.
    TenSeconds,
    /// 60 second buckets.
    Minute,
    /// 600 second buckets.
    TenMinutes,
    /// 3600 second buckets.
    Hour,
}

impl Step {
    /// All resolutions, finest first.
    pub const ALL: [Step; 4] = [Step::TenSeconds, Step::Minute, Step::TenMinutes, Step::Hour];

    /// Returns the bucket width in seconds.
    pub fn secs(self) -> u64 {
        match self {
            Step::TenSeconds => 10,
            Step::Minute => 60,
            Step::TenMinutes => 600,
            Step::Hour => 3600,
        }
    }

    /// Returns the index of the bucket `timestamp` falls into at this
    /// resolution.
    pub fn index(self, timestamp: UnixTimestamp) -> u64 {
        timestamp.as_secs() / self.secs()
    }
}

/// A single observation reported by the application.
#[derive(Clone, Debug)]
pub struct Event {
    /// The metric this observation belongs to.
    pub name: String,
    /// The positional label tuple.
    pub labels: Labels,
    /// The observed payload.
    pub data: EventData,
    /// When the observation happened.
    pub timestamp: UnixTimestamp,
}

/// The payload of an [`Event`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EventData {
    /// A counter increment. Folded into the finest resolution only.
    Counter(u32),
    /// A sampled value. Folded into every resolution.
    Value(f32),
}

/// Aggregated state for one `(step, bucket, labels)` combination.
#[derive(Debug)]
pub struct Accumulator {
    step: Step,
    time_index: u64,
    labels: Labels,
    counter: u32,
    digest: Option<ValuesDigest>,
}

impl Accumulator {
    fn new(step: Step, time_index: u64, labels: Labels) -> Self {
        Self {
            step,
            time_index,
            labels,
            counter: 0,
            digest: None,
        }
    }

    /// The resolution of this bucket.
    pub fn step(&self) -> Step {
        self.step
    }

    /// The bucket index at this accumulator's resolution.
    pub fn time_index(&self) -> u64 {
        self.time_index
    }

    /// The positional label tuple.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Counter sum, or the number of values folded in.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// The value digest, present iff at least one value was folded in.
    pub fn digest_mut(&mut self) -> Option<&mut ValuesDigest> {
        self.digest.as_mut()
    }

    /// Returns `true` once wall time has moved past this bucket's window.
    pub fn is_closed(&self, now: UnixTimestamp) -> bool {
        self.step().index(now) > self.time_index
    }
}

/// A metric's accumulator list. Pooled and recycled when a metric empties.
#[derive(Debug, Default)]
struct MetricEntry {
    accums: Vec<Accumulator>,
}

static METRIC_POOL: Pool<MetricEntry> = Pool::new(|| MetricEntry {
    accums: Vec::with_capacity(5),
});

/// A collector of [`Event`] submissions.
///
/// Events are folded into one [`Accumulator`] per applicable [`Step`],
/// deduplicated by `(step, time_index, labels)` with positional label
/// equality. Accumulator lists are scanned linearly; label-tuple
/// cardinality per metric is expected to be low.
///
/// The aggregator itself is not synchronized. The client wraps it in a
/// mutex shared between the collector and the flusher.
#[derive(Default)]
pub struct Aggregator {
    metrics: HashMap<String, MetricEntry>,
    scratch: Vec<Accumulator>,
}

impl Aggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no metric currently holds any state.
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Returns the number of metrics with live accumulators.
    pub fn metric_count(&self) -> usize {
        self.metrics.len()
    }

    /// Returns the total number of live accumulators.
    pub fn bucket_count(&self) -> usize {
        self.metrics.values().map(|entry| entry.accums.len()).sum()
    }

    /// Folds one event into every bucket it contributes to.
    ///
    /// Counter events touch only the [`Step::TenSeconds`] bucket; value
    /// events touch one bucket per resolution.
    pub fn fold(&mut self, event: Event) {
        let entry = self
            .metrics
            .entry_ref(event.name.as_str())
            .or_insert_with(|| METRIC_POOL.get());

        for step in Step::ALL {
            if matches!(event.data, EventData::Counter(_)) && step != Step::TenSeconds {
                continue;
            }

            let time_index = step.index(event.timestamp);
            let position = entry.accums.iter().position(|accum| {
                accum.step() == step
                    && accum.time_index == time_index
                    && accum.labels == event.labels
            });

            let accum = match position {
                Some(position) => &mut entry.accums[position],
                None => {
                    entry
                        .accums
                        .push(Accumulator::new(step, time_index, event.labels.clone()));
                    let last = entry.accums.len() - 1;
                    &mut entry.accums[last]
                }
            };

            match event.data {
                EventData::Counter(increment) => {
                    accum.counter = accum.counter.saturating_add(increment);
                }
                EventData::Value(value) => {
                    accum.counter = accum.counter.saturating_add(1);
                    accum
                        .digest
                        .get_or_insert_with(ValuesDigest::acquire)
                        .add(value);
                }
            }
        }
    }

    /// Hands every accumulator closed at `now` to `sink`, then evicts it.
    ///
    /// `sink` is invoked once per metric that has closed buckets, with all
    /// of that metric's closed accumulators. Digests of evicted
    /// accumulators are recycled afterwards; metrics left without
    /// accumulators are removed.
    pub fn drain<F>(&mut self, now: UnixTimestamp, mut sink: F)
    where
        F: FnMut(&str, &mut [Accumulator]),
    {
        self.drain_inner(Some(now), &mut sink);
    }

    /// Like [`drain`](Self::drain), but treats every bucket as closed.
    ///
    /// Used for the final flush during shutdown.
    pub fn drain_all<F>(&mut self, mut sink: F)
    where
        F: FnMut(&str, &mut [Accumulator]),
    {
        self.drain_inner(None, &mut sink);
    }

    fn drain_inner<F>(&mut self, closed_at: Option<UnixTimestamp>, sink: &mut F)
    where
        F: FnMut(&str, &mut [Accumulator]),
    {
        let Self { metrics, scratch } = self;

        metrics.retain(|name, entry| {
            debug_assert!(scratch.is_empty());

            let mut index = 0;
            while index < entry.accums.len() {
                let closed = match closed_at {
                    Some(now) => entry.accums[index].is_closed(now),
                    None => true,
                };

                if closed {
                    scratch.push(entry.accums.swap_remove(index));
                } else {
                    index += 1;
                }
            }

            if !scratch.is_empty() {
                sink(name, scratch);

                for mut accum in scratch.drain(..) {
                    if let Some(digest) = accum.digest.take() {
                        ValuesDigest::release(digest);
                    }
                }
            }

            if entry.accums.is_empty() {
                METRIC_POOL.put(mem::take(entry));
                false
            } else {
                true
            }
        });
    }
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("metrics", &self.metric_count())
            .field("buckets", &self.bucket_count())
            .finish()
    }
}
