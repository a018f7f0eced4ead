//! Stereo phase correlation
//!
//! Both channels pass a one-pole low-pass at 2 kHz, then ⟨L·R⟩, ⟨L²⟩ and
//! ⟨R²⟩ are smoothed with a 0.3 s time constant. The coefficient is
//! `⟨L·R⟩ / sqrt(⟨L²⟩·⟨R²⟩)`.

use meter_core::DspContext;

/// Guards the denominator during silence
const EPSILON: f32 = 1e-10;

/// Denormal bias on the pre-filter taps
const FILTER_BIAS: f32 = 1e-20;

/// Stereo correlation meter
#[derive(Debug, Clone)]
pub struct Correlation {
    w1: f32,
    w2: f32,
    zl: f32,
    zr: f32,
    zlr: f32,
    zll: f32,
    zrr: f32,
}

impl Correlation {
    pub fn new(ctx: &DspContext) -> Self {
        let c = ctx.coeffs();
        Self {
            w1: c.corr_lowpass,
            w2: c.corr_smoothing,
            zl: 0.0,
            zr: 0.0,
            zlr: 0.0,
            zll: 0.0,
            zrr: 0.0,
        }
    }

    /// Feed one block of stereo samples
    ///
    /// Only the common prefix is processed when lengths differ.
    pub fn process(&mut self, left: &[f32], right: &[f32]) {
        let (w1, w2) = (self.w1, self.w2);
        let (mut zl, mut zr) = (self.zl, self.zr);
        let (mut zlr, mut zll, mut zrr) = (self.zlr, self.zll, self.zrr);

        for (&l, &r) in left.iter().zip(right) {
            zl += w1 * (l - zl) + FILTER_BIAS;
            zr += w1 * (r - zr) + FILTER_BIAS;
            zlr += w2 * (zl * zr - zlr);
            zll += w2 * (zl * zl - zll);
            zrr += w2 * (zr * zr - zrr);
        }

        if [zl, zr, zlr, zll, zrr].iter().all(|v| v.is_finite()) {
            self.zl = zl;
            self.zr = zr;
            self.zlr = zlr;
            self.zll = zll;
            self.zrr = zrr;
        } else {
            self.reset();
        }
    }

    /// Correlation in [-1, 1]; pure accessor
    pub fn read(&self) -> f32 {
        let c = self.zlr / (self.zll * self.zrr + EPSILON).sqrt();
        if c.is_nan() {
            0.0
        } else {
            c.clamp(-1.0, 1.0)
        }
    }

    pub fn reset(&mut self) {
        self.zl = 0.0;
        self.zr = 0.0;
        self.zlr = 0.0;
        self.zll = 0.0;
        self.zrr = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> DspContext {
        DspContext::new(48000, 512).unwrap()
    }

    fn sine(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (std::f32::consts::TAU * 440.0 * i as f32 / 48000.0).sin())
            .collect()
    }

    #[test]
    fn test_identical_channels() {
        let mut corr = Correlation::new(&ctx());
        let s = sine(48000);
        corr.process(&s, &s);
        assert!(corr.read() > 0.99);
    }

    #[test]
    fn test_inverted_channels() {
        let mut corr = Correlation::new(&ctx());
        let s = sine(48000);
        let inv: Vec<f32> = s.iter().map(|x| -x).collect();
        corr.process(&s, &inv);
        assert!(corr.read() < -0.99);
    }

    #[test]
    fn test_silence_reads_zero() {
        let corr = Correlation::new(&ctx());
        assert_eq!(corr.read(), 0.0);
    }

    #[test]
    fn test_read_is_pure() {
        let mut corr = Correlation::new(&ctx());
        let s = sine(4800);
        corr.process(&s, &s);
        let first = corr.read();
        assert_eq!(corr.read(), first);
    }

    #[test]
    fn test_nan_resets() {
        let mut corr = Correlation::new(&ctx());
        corr.process(&[f32::NAN; 16], &[0.5; 16]);
        assert!(corr.read().is_finite());
    }
}
