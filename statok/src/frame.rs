//! Serialization of closed buckets into delivery frames.
//!
//! Each flush walks the aggregator and renders every metric's closed
//! buckets into a JSON array, compresses it, and appends a record to the
//! outgoing frame:
//!
//! ```text
//! <client_id>,<metric_name>,<compressed_len>,<compressed_bytes>
//! ```
//!
//! Records are concatenated back to back; the embedded length delimits the
//! binary payload. Label strings are written without escaping — the
//! protocol assumes labels contain neither quotes nor backslashes.

use std::fmt::{self, Write as _};
use std::io::{self, Write as _};

use statok_common::pool::Pool;
use statok_common::time::UnixTimestamp;
use statok_metrics::{Accumulator, Aggregator};

use crate::compress;

pub(crate) static BYTES_POOL: Pool<Vec<u8>> = Pool::new(Vec::new);
static PAYLOAD_POOL: Pool<String> = Pool::new(String::new);

/// Serializes all buckets closed at `now` into one frame.
///
/// Returns `None` when nothing was closed. With `force` set, every bucket
/// is serialized regardless of its window (the shutdown path). Per-metric
/// serialization or compression failures skip that metric's record; the
/// affected buckets are still evicted.
pub(crate) fn serialize_frame(
    store: &mut Aggregator,
    client_id: u64,
    now: UnixTimestamp,
    force: bool,
) -> Option<Vec<u8>> {
    if store.is_empty() {
        return None;
    }

    let mut frame = BYTES_POOL.get();
    frame.clear();
    let mut payload = PAYLOAD_POOL.get();
    let mut compressed = BYTES_POOL.get();
    let mut serialized = 0usize;

    {
        let mut sink = |name: &str, accums: &mut [Accumulator]| {
            payload.clear();
            if render_metric(&mut payload, accums).is_err() {
                return;
            }
            if compress::compress_into(payload.as_bytes(), &mut compressed).is_err() {
                return;
            }
            if append_record(&mut frame, client_id, name, &compressed).is_err() {
                return;
            }
            serialized += 1;
        };

        if force {
            store.drain_all(&mut sink);
        } else {
            store.drain(now, &mut sink);
        }
    }

    payload.clear();
    PAYLOAD_POOL.put(payload);
    compressed.clear();
    BYTES_POOL.put(compressed);

    if serialized == 0 {
        frame.clear();
        BYTES_POOL.put(frame);
        return None;
    }

    tracing::trace!(metrics = serialized, bytes = frame.len(), "serialized flush frame");
    Some(frame)
}

/// Renders one metric's closed buckets as a JSON array.
fn render_metric(out: &mut String, accums: &mut [Accumulator]) -> fmt::Result {
    out.push('[');

    for (index, accum) in accums.iter_mut().enumerate() {
        if index > 0 {
            out.push(',');
        }

        write!(out, "{{\"t\":{},\"s\":{},", accum.time_index(), accum.step().secs())?;

        if !accum.labels().is_empty() {
            out.push_str("\"l\":[");
            for (li, label) in accum.labels().iter().enumerate() {
                if li > 0 {
                    out.push(',');
                }
                write!(out, "\"{label}\"")?;
            }
            out.push_str("],");
        }

        write!(out, "\"c\":{}", accum.counter())?;

        if let Some(digest) = accum.digest_mut() {
            out.push_str(",\"v\":[");
            let mut result = Ok(());
            digest.result(|value, vi| {
                if vi > 0 {
                    out.push(',');
                }
                if let Err(error) = write_value(out, value) {
                    result = Err(error);
                }
            });
            result?;
            out.push(']');
        }

        out.push('}');
    }

    out.push(']');
    Ok(())
}

/// Renders one summary value.
///
/// Values above 999 and values without a fractional part render as
/// integers (truncated towards zero); everything else keeps one decimal.
fn write_value(out: &mut String, value: f32) -> fmt::Result {
    if value > 999.0 || value.fract() == 0.0 {
        write!(out, "{}", value as i64)
    } else {
        write!(out, "{value:.1}")
    }
}

fn append_record(
    frame: &mut Vec<u8>,
    client_id: u64,
    name: &str,
    compressed: &[u8],
) -> io::Result<()> {
    write!(frame, "{client_id},{name},{},", compressed.len())?;
    frame.extend_from_slice(compressed);
    Ok(())
}
