//! Streaming quantile estimation.

/// Estimates a single quantile over a stream of observations in constant
/// space, using the P² (Jain/Chlamtac) five-marker method.
///
/// The estimator keeps five markers whose heights approximate the minimum,
/// the target quantile, the quantile halfway to either extreme, and the
/// maximum of everything observed so far. Each new observation nudges the
/// inner markers towards their ideal positions with a parabolic prediction,
/// falling back to linear interpolation when the parabola would break
/// marker ordering.
#[derive(Clone, Debug)]
pub struct Psqr {
    quantile: f32,
    count: u64,
    q: [f32; 5],
    n: [i64; 5],
    np: [f32; 5],
    dn: [f32; 5],
}

impl Psqr {
    /// Creates an estimator for the quantile `quantile` in `(0, 1)`.
    pub fn new(quantile: f32) -> Self {
        let mut psqr = Self {
            quantile,
            count: 0,
            q: [0.0; 5],
            n: [0; 5],
            np: [0.0; 5],
            dn: [0.0; 5],
        };
        psqr.reset();
        psqr
    }

    /// Reinitializes the estimator, discarding all observations.
    pub fn reset(&mut self) {
        let q = self.quantile;

        self.count = 0;
        self.q = [0.0; 5];
        self.dn = [0.0, q * 0.5, q, (1.0 + q) * 0.5, 1.0];

        for i in 0..5 {
            self.n[i] = i as i64 + 1;
            self.np[i] = self.dn[i] * 4.0 + 1.0;
        }
    }

    /// Folds a new observation into the estimate.
    pub fn add(&mut self, value: f32) {
        if self.count < 5 {
            self.q[self.count as usize] = value;
            self.count += 1;

            if self.count == 5 {
                self.q.sort_unstable_by(f32::total_cmp);
            }

            return;
        }

        self.count += 1;

        // Find cell k such that q[k-1] <= value < q[k], widening the extreme
        // markers when the observation falls outside of them.
        let mut k = 5;
        for (i, &marker) in self.q.iter().enumerate() {
            if value < marker {
                k = i;
                break;
            }
        }

        if k == 0 {
            k = 1;
            self.q[0] = value;
        } else if k == 5 {
            k = 4;
            self.q[4] = value;
        }

        for i in k..5 {
            self.n[i] += 1;
        }
        for i in 0..5 {
            self.np[i] += self.dn[i];
        }

        // Adjust the inner markers whose actual position drifted at least
        // one slot away from the desired one.
        for i in 1..4 {
            let d = self.np[i] - self.n[i] as f32;
            if (d >= 1.0 && self.n[i + 1] - self.n[i] > 1)
                || (d <= -1.0 && self.n[i - 1] - self.n[i] < -1)
            {
                let ds: i64 = if d < 0.0 { -1 } else { 1 };

                let prediction = self.parabolic(i, ds);
                self.q[i] = if self.q[i - 1] < prediction && prediction < self.q[i + 1] {
                    prediction
                } else {
                    self.linear(i, ds)
                };

                self.n[i] += ds;
            }
        }
    }

    /// Returns the current estimate of the configured quantile.
    ///
    /// Meaningless until five observations have been folded in.
    pub fn get(&self) -> f32 {
        self.q[2]
    }

    fn parabolic(&self, i: usize, ds: i64) -> f32 {
        let (qi, qip, qim) = (self.q[i], self.q[i + 1], self.q[i - 1]);
        let (ni, nip, nim) = (
            self.n[i] as f32,
            self.n[i + 1] as f32,
            self.n[i - 1] as f32,
        );
        let ds = ds as f32;

        qi + ds / (nip - nim)
            * ((ni - nim + ds) * (qip - qi) / (nip - ni) + (nip - ni - ds) * (qi - qim) / (ni - nim))
    }

    fn linear(&self, i: usize, ds: i64) -> f32 {
        let j = (i as i64 + ds) as usize;
        self.q[i] + ds as f32 * (self.q[j] - self.q[i]) / (self.n[j] - self.n[i]) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_sorts_first_five() {
        let mut psqr = Psqr::new(0.5);
        for value in [5.0, 1.0, 4.0, 2.0, 3.0] {
            psqr.add(value);
        }
        assert_eq!(psqr.get(), 3.0);
    }

    #[test]
    fn test_identity_stream_within_one_percent() {
        for quantile in [0.5, 0.75, 0.95, 0.99] {
            let mut psqr = Psqr::new(quantile);
            for i in 1..=10_000 {
                psqr.add(i as f32);
            }

            let expected = quantile * 10_000.0;
            let estimate = psqr.get();
            assert!(
                (estimate - expected).abs() <= expected * 0.01,
                "q={quantile}: estimate {estimate} not within 1% of {expected}"
            );
        }
    }

    #[test]
    fn test_extremes_track_min_and_max() {
        let mut psqr = Psqr::new(0.5);
        for value in [10.0, 20.0, 30.0, 40.0, 50.0, 5.0, 60.0] {
            psqr.add(value);
        }
        assert_eq!(psqr.q[0], 5.0);
        assert_eq!(psqr.q[4], 60.0);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut psqr = Psqr::new(0.95);
        for i in 0..100 {
            psqr.add(i as f32);
        }
        psqr.reset();

        let fresh = Psqr::new(0.95);
        assert_eq!(psqr.count, fresh.count);
        assert_eq!(psqr.n, fresh.n);
        assert_eq!(psqr.np, fresh.np);
        assert_eq!(psqr.dn, fresh.dn);
    }
}
