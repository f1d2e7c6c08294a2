//! First-order IIR lag filter
//!
//! A single-pole exponential filter: `y[n] = y[n-1] + alpha * (x[n] - y[n-1])`.
//! Used to smooth bus voltage/current readings and to low-pass the
//! coulomb-counted state of charge against sudden load transients.

pub trait Filter {
    fn update(&mut self, sample: f32) -> Option<f32>;
    fn clear(&mut self);
}

/// Exponential lag filter with a fixed smoothing factor.
///
/// `alpha` is the weight given to the new sample each update, in `(0.0,
/// 1.0]`. Smaller values mean a longer effective time constant. The first
/// sample after construction or [`clear`](Lag::clear) seeds the output
/// directly, matching the original firmware's "prime on first reading"
/// behavior rather than lagging in from zero.
pub struct Lag {
    alpha: f32,
    value: Option<f32>,
}

impl Lag {
    pub const fn new(alpha: f32) -> Self {
        Self { alpha, value: None }
    }

    /// Builds a lag filter from a time constant and sample period, both in
    /// seconds: `alpha = dt / (tau + dt)`.
    pub fn from_time_constant(tau: f32, dt: f32) -> Self {
        Self::new(dt / (tau + dt))
    }

    pub fn value(&self) -> Option<f32> {
        self.value
    }
}

impl Filter for Lag {
    fn update(&mut self, sample: f32) -> Option<f32> {
        let next = match self.value {
            Some(prev) => prev + self.alpha * (sample - prev),
            None => sample,
        };
        self.value = Some(next);
        self.value
    }

    fn clear(&mut self) {
        self.value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_seeds_output() {
        let mut lag = Lag::new(0.1);
        assert_eq!(lag.update(12.0), Some(12.0));
    }

    #[test]
    fn converges_toward_step_input() {
        let mut lag = Lag::new(0.5);
        lag.update(0.0);
        let mut last = 0.0;
        for _ in 0..20 {
            last = lag.update(10.0).unwrap();
        }
        assert!((last - 10.0).abs() < 1e-3);
    }

    #[test]
    fn clear_resets_state() {
        let mut lag = Lag::new(0.2);
        lag.update(5.0);
        lag.clear();
        assert_eq!(lag.value(), None);
        assert_eq!(lag.update(1.0), Some(1.0));
    }
}
