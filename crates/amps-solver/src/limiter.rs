//! Newton step limiting for voltage variables.
//!
//! Large early steps can throw rectangular voltages far outside any
//! physical operating range, where the constant-power models blow up.
//! The limiter clamps per-coordinate voltage steps and keeps the updated
//! values inside a configurable band. Non-voltage unknowns (currents,
//! reactive powers, multipliers) pass through untouched.

#[derive(Debug, Clone)]
pub struct VoltageLimiter {
    mask: Vec<bool>,
    max_step: f64,
    band: f64,
}

impl VoltageLimiter {
    pub fn new(mask: Vec<bool>, max_step: f64, band: f64) -> Self {
        VoltageLimiter {
            mask,
            max_step,
            band,
        }
    }

    /// Clamp the step in place. Returns true if anything was limited.
    pub fn apply(&self, v: &[f64], delta: &mut [f64]) -> bool {
        let mut limited = false;
        for (i, d) in delta.iter_mut().enumerate() {
            if !self.mask[i] {
                continue;
            }
            if d.abs() > self.max_step {
                *d = d.signum() * self.max_step;
                limited = true;
            }
            let updated = v[i] + *d;
            if updated > self.band {
                *d = self.band - v[i];
                limited = true;
            } else if updated < -self.band {
                *d = -self.band - v[i];
                limited = true;
            }
        }
        limited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamps_voltage_step_only() {
        let limiter = VoltageLimiter::new(vec![true, false], 0.1, 2.0);
        let v = vec![1.0, 0.0];
        let mut delta = vec![0.5, 0.5];
        assert!(limiter.apply(&v, &mut delta));
        assert!((delta[0] - 0.1).abs() < 1e-12);
        assert!((delta[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_band_keeps_voltage_in_range() {
        let limiter = VoltageLimiter::new(vec![true], 1.0, 2.0);
        let v = vec![1.5];
        let mut delta = vec![0.9];
        assert!(limiter.apply(&v, &mut delta));
        assert!((v[0] + delta[0] - 2.0).abs() < 1e-12);

        let mut down = vec![-0.9];
        let vneg = vec![-1.5];
        assert!(limiter.apply(&vneg, &mut down));
        assert!((vneg[0] + down[0] + 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_small_steps_untouched() {
        let limiter = VoltageLimiter::new(vec![true, true], 0.1, 2.0);
        let v = vec![1.0, 0.0];
        let mut delta = vec![0.05, -0.03];
        assert!(!limiter.apply(&v, &mut delta));
        assert_eq!(delta, vec![0.05, -0.03]);
    }
}
