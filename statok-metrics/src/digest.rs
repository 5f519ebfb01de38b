//! Two-mode summaries of observed values.

use std::mem;

use statok_common::pool::Pool;

use crate::Psqr;

/// The percentiles tracked by a digest, in emission order.
pub const PERCENTILES: [f32; 4] = [0.50, 0.75, 0.95, 0.99];

/// Observations kept verbatim before a digest switches to approximation.
const MAX_EXACT_VALUES: usize = 32;

/// Decimal precision of the approximate average: one fractional digit.
const AVG_ROUND_PRECISION: f64 = 10.0;

static DIGEST_POOL: Pool<ValuesDigest> = Pool::new(ValuesDigest::empty);
static VALUE_BUF_POOL: Pool<Vec<f32>> = Pool::new(|| Vec::with_capacity(MAX_EXACT_VALUES));
static APPROX_POOL: Pool<Box<ApproxDigest>> = Pool::new(|| Box::new(ApproxDigest::new()));

/// Fixed-memory summary state: extremes, compensated sum, and one quantile
/// estimator per tracked percentile.
#[derive(Clone, Debug)]
struct ApproxDigest {
    percentiles: [Psqr; 4],
    min: f32,
    max: f32,

    // Kahan summation state for the average.
    sum: f64,
    compensation: f64,
    count: u32,
}

impl ApproxDigest {
    fn new() -> Self {
        Self {
            percentiles: PERCENTILES.map(Psqr::new),
            min: f32::MAX,
            max: f32::MIN,
            sum: 0.0,
            compensation: 0.0,
            count: 0,
        }
    }

    fn reset(&mut self) {
        self.min = f32::MAX;
        self.max = f32::MIN;
        self.sum = 0.0;
        self.compensation = 0.0;
        self.count = 0;

        for psqr in &mut self.percentiles {
            psqr.reset();
        }
    }

    fn add(&mut self, value: f32) {
        for psqr in &mut self.percentiles {
            psqr.add(value);
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);

        let y = f64::from(value) - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
        self.count += 1;
    }

    fn avg(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        round(self.sum / f64::from(self.count), AVG_ROUND_PRECISION) as f32
    }
}

/// A summary of the values observed within one bucket.
///
/// While a bucket holds at most [`MAX_EXACT_VALUES`] observations, they are
/// buffered verbatim and [`result`](Self::result) reports exact statistics.
/// The observation that would overflow the buffer switches the digest to an
/// [`ApproxDigest`]: the buffered values are replayed into it, the buffer is
/// recycled, and all further observations go to the approximate state. The
/// switch is one-way for the lifetime of the digest.
#[derive(Debug, Default)]
pub struct ValuesDigest {
    values: Vec<f32>,
    approx: Option<Box<ApproxDigest>>,
}

impl ValuesDigest {
    fn empty() -> Self {
        Self {
            values: Vec::new(),
            approx: None,
        }
    }

    /// Takes a fresh digest from the pool.
    pub fn acquire() -> Self {
        DIGEST_POOL.get()
    }

    /// Resets `digest` and returns it to the pool.
    pub fn release(mut digest: Self) {
        digest.reset();
        DIGEST_POOL.put(digest);
    }

    /// Folds one observation into the digest.
    pub fn add(&mut self, value: f32) {
        if let Some(approx) = &mut self.approx {
            approx.add(value);
            return;
        }

        if self.values.len() >= MAX_EXACT_VALUES {
            let mut approx = APPROX_POOL.get();
            approx.reset();
            for &buffered in &self.values {
                approx.add(buffered);
            }
            approx.add(value);

            self.values.clear();
            VALUE_BUF_POOL.put(mem::take(&mut self.values));
            self.approx = Some(approx);
            return;
        }

        if self.values.capacity() == 0 {
            self.values = VALUE_BUF_POOL.get();
        }
        self.values.push(value);
    }

    /// Emits the summary as `(value, index)` pairs in the fixed order
    /// average, minimum, maximum, then [`PERCENTILES`].
    ///
    /// A digest without observations emits nothing. Sorts the exact buffer
    /// in place, so this is `&mut self`; folding further observations in
    /// afterwards is allowed.
    pub fn result<F>(&mut self, mut emit: F)
    where
        F: FnMut(f32, usize),
    {
        match &self.approx {
            Some(approx) => {
                emit(approx.avg(), 0);
                emit(approx.min, 1);
                emit(approx.max, 2);
                for (i, psqr) in approx.percentiles.iter().enumerate() {
                    emit(psqr.get(), i + 3);
                }
            }
            None => {
                if self.values.is_empty() {
                    return;
                }

                self.values.sort_unstable_by(f32::total_cmp);

                let sum: f64 = self.values.iter().copied().map(f64::from).sum();
                emit((sum / self.values.len() as f64) as f32, 0);
                emit(self.values[0], 1);
                emit(self.values[self.values.len() - 1], 2);

                for (i, &p) in PERCENTILES.iter().enumerate() {
                    emit(percentile(&self.values, p), i + 3);
                }
            }
        }
    }

    /// Returns the digest to its empty state, recycling pooled memory.
    pub fn reset(&mut self) {
        if self.values.capacity() > 0 {
            self.values.clear();
            VALUE_BUF_POOL.put(mem::take(&mut self.values));
        }

        if let Some(approx) = self.approx.take() {
            APPROX_POOL.put(approx);
        }
    }

    /// Returns `true` if the digest switched to approximate mode.
    pub fn is_approximate(&self) -> bool {
        self.approx.is_some()
    }
}

fn round(value: f64, precision: f64) -> f64 {
    (value * precision).round() / precision
}

/// Linear-interpolation percentile over an ascending slice.
fn percentile(sorted: &[f32], p: f32) -> f32 {
    let k = p * (sorted.len() - 1) as f32;
    let floor = k as usize;
    let ceil = (floor + 1).min(sorted.len() - 1);
    sorted[floor] + (sorted[ceil] - sorted[floor]) * (k - floor as f32)
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn collect(digest: &mut ValuesDigest) -> Vec<f32> {
        let mut out = Vec::new();
        digest.result(|value, index| {
            assert_eq!(index, out.len());
            out.push(value);
        });
        out
    }

    #[test]
    fn test_exact_small_sequence() {
        let mut digest = ValuesDigest::acquire();
        for value in [4.0, 2.0, 5.0, 1.0, 3.0] {
            digest.add(value);
        }

        assert!(!digest.is_approximate());
        let result = collect(&mut digest);
        assert_eq!(result[0], 3.0); // avg
        assert_eq!(result[1], 1.0); // min
        assert_eq!(result[2], 5.0); // max
        assert_eq!(result[3], 3.0); // p50
        assert_eq!(result[4], 4.0); // p75
        assert!((result[5] - 4.8).abs() < 1e-5); // p95
        assert!((result[6] - 4.96).abs() < 1e-5); // p99
        ValuesDigest::release(digest);
    }

    #[test]
    fn test_exact_single_value() {
        let mut digest = ValuesDigest::acquire();
        digest.add(7.5);
        assert_eq!(collect(&mut digest), vec![7.5; 7]);
        ValuesDigest::release(digest);
    }

    #[test]
    fn test_stays_exact_at_threshold() {
        let mut digest = ValuesDigest::acquire();
        for i in 1..=32 {
            digest.add(i as f32);
        }
        assert!(!digest.is_approximate());

        digest.add(33.0);
        assert!(digest.is_approximate());
        ValuesDigest::release(digest);
    }

    #[test]
    fn test_approximate_keeps_exact_extremes() {
        let mut digest = ValuesDigest::acquire();
        for i in (1..=100).rev() {
            digest.add(i as f32);
        }

        assert!(digest.is_approximate());
        let result = collect(&mut digest);
        assert_eq!(result[1], 1.0);
        assert_eq!(result[2], 100.0);
        ValuesDigest::release(digest);
    }

    #[test]
    fn test_approximate_extremes_with_negative_values() {
        let mut digest = ValuesDigest::acquire();
        for i in 1..=50 {
            digest.add(-(i as f32));
        }

        let result = collect(&mut digest);
        assert_eq!(result[1], -50.0);
        assert_eq!(result[2], -1.0);
        ValuesDigest::release(digest);
    }

    #[test]
    fn test_large_uniform_stream() {
        let mut digest = ValuesDigest::acquire();
        for i in 1..=1000 {
            digest.add(i as f32 / 10.0);
        }

        let result = collect(&mut digest);
        assert!((result[0] - 50.05).abs() <= 0.1, "avg {}", result[0]);
        assert_eq!(result[1], 0.1);
        assert_eq!(result[2], 100.0);
        assert!((result[3] - 50.0).abs() <= 1.0, "p50 {}", result[3]);
        assert!((result[6] - 99.0).abs() <= 1.5, "p99 {}", result[6]);
        ValuesDigest::release(digest);
    }

    #[test]
    fn test_kahan_average_precision() {
        let mut digest = ValuesDigest::acquire();
        for _ in 0..1_000_000 {
            digest.add(0.1);
        }

        let result = collect(&mut digest);
        assert!((result[0] - 0.1).abs() <= 1e-7, "avg {}", result[0]);
        ValuesDigest::release(digest);
    }

    #[test]
    fn test_reset_is_indistinguishable_from_fresh() {
        let mut recycled = ValuesDigest::acquire();
        for i in 1..=100 {
            recycled.add(i as f32);
        }
        recycled.reset();

        let mut fresh = ValuesDigest::acquire();
        for value in [2.0, 4.0, 6.0] {
            recycled.add(value);
            fresh.add(value);
        }

        assert_eq!(collect(&mut recycled), collect(&mut fresh));
        ValuesDigest::release(recycled);
        ValuesDigest::release(fresh);
    }

    #[test]
    fn test_empty_digest_emits_nothing() {
        let mut digest = ValuesDigest::acquire();
        digest.result(|_, _| panic!("no values were folded in"));
        ValuesDigest::release(digest);
    }
}
