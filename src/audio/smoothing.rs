use anyhow::Result;

/// Exponential moving average over successive magnitude vectors.
///
/// State starts at all zeros and is blended even on the first tick, so the
/// opening frames fade in from silence rather than jumping to full height.
pub struct Smoother {
    state: Vec<f32>,
    alpha: f32,
}

impl Smoother {
    /// `alpha` is the weight of the previous state: 0.0 passes raw values
    /// through, values near 1.0 respond slowly. 1.0 is rejected because the
    /// state would never move off zero.
    pub fn new(num_bins: usize, alpha: f32) -> Result<Self> {
        if !(alpha.is_finite() && (0.0..1.0).contains(&alpha)) {
            anyhow::bail!("Smoothing factor must be in [0, 1) (got {})", alpha);
        }
        Ok(Self {
            state: vec![0.0; num_bins],
            alpha,
        })
    }

    pub fn update(&mut self, raw: &[f32]) -> &[f32] {
        debug_assert_eq!(raw.len(), self.state.len());
        for (s, &r) in self.state.iter_mut().zip(raw) {
            *s = *s * self.alpha + r * (1.0 - self.alpha);
        }
        &self.state
    }

    pub fn state(&self) -> &[f32] {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_is_zero_anchored() {
        let mut smoother = Smoother::new(3, 0.9).unwrap();
        let out = smoother.update(&[10.0, 20.0, 30.0]);
        for (got, expected) in out.iter().zip(&[1.0, 2.0, 3.0]) {
            assert!((got - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn one_tick_is_the_exact_blend() {
        let mut smoother = Smoother::new(2, 0.75).unwrap();
        smoother.update(&[4.0, 8.0]);
        let prev = smoother.state().to_vec();
        let out = smoother.update(&[2.0, 2.0]);
        for i in 0..2 {
            let expected = prev[i] * 0.75 + 2.0 * 0.25;
            assert!((out[i] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn converges_to_a_constant_input() {
        let mut smoother = Smoother::new(4, 0.95).unwrap();
        let target = [1.0, 0.5, 0.25, 0.125];
        for _ in 0..2000 {
            smoother.update(&target);
        }
        for (s, t) in smoother.state().iter().zip(&target) {
            assert!((s - t).abs() < 1e-4);
        }
    }

    #[test]
    fn rejects_alpha_of_one_and_worse() {
        // alpha = 1.0 would pin the state at zero forever.
        assert!(Smoother::new(4, 1.0).is_err());
        assert!(Smoother::new(4, 1.5).is_err());
        assert!(Smoother::new(4, -0.1).is_err());
        assert!(Smoother::new(4, f32::NAN).is_err());
        assert!(Smoother::new(4, 0.0).is_ok());
    }

    #[test]
    fn state_persists_when_not_updated() {
        let mut smoother = Smoother::new(1, 0.5).unwrap();
        smoother.update(&[6.0]);
        let frozen = smoother.state().to_vec();
        // No update during drain; reading the state must not change it.
        assert_eq!(smoother.state(), frozen.as_slice());
    }
}
