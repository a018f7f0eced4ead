use super::{finite_or_zero, LevelDetector, SubBlockCarry, DENORMAL_BIAS, SUB_BLOCK};
use meter_core::{DetectorKind, DspContext};

/// Output gain so a steady sine reads its peak amplitude
const VU_GAIN: f32 = 1.5 * std::f32::consts::FRAC_PI_2;

/// VU meter (IEC 60268-17)
///
/// Second-order critically damped integrator on the rectified signal,
/// roughly 300 ms to 99 % of the final reading.
#[derive(Debug, Clone)]
pub struct VuMeter {
    w: f32,
    z1: f32,
    z2: f32,
    level: f32,
    carry: SubBlockCarry,
}

impl VuMeter {
    pub fn new(ctx: &DspContext) -> Self {
        Self {
            w: ctx.coeffs().vu_w,
            z1: 0.0,
            z2: 0.0,
            level: 0.0,
            carry: SubBlockCarry::default(),
        }
    }
}

impl LevelDetector for VuMeter {
    fn process(&mut self, samples: &[f32]) {
        let Self { w, z1, z2, carry, .. } = self;
        let w = *w;
        let mut a = z1.clamp(0.0, 20.0);
        let mut b = z2.clamp(0.0, 20.0);

        let steps = carry.feed(samples, |group| {
            for &x in group {
                a += w * (x.abs() - 0.5 * b - a);
            }
            b += SUB_BLOCK as f32 * w * (a - b);
        });
        if steps == 0 {
            return;
        }

        *z1 = finite_or_zero(a + DENORMAL_BIAS);
        *z2 = finite_or_zero(b + DENORMAL_BIAS);

        let level = VU_GAIN * b;
        if level.is_finite() {
            self.level = level;
        }
    }

    fn read(&mut self) -> f32 {
        self.level
    }

    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
        self.level = 0.0;
        self.carry.clear();
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::Vu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(amplitude: f32, freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (std::f32::consts::TAU * freq * i as f32 / 48000.0).sin())
            .collect()
    }

    #[test]
    fn test_sine_reads_amplitude() {
        let ctx = DspContext::new(48000, 512).unwrap();
        let mut vu = VuMeter::new(&ctx);
        for block in sine(0.5, 1000.0, 96000).chunks(512) {
            vu.process(block);
        }
        let db = 20.0 * (vu.read() / 0.5).log10();
        assert!(db.abs() < 0.1, "VU reads {} dB off", db);
    }

    #[test]
    fn test_rise_time() {
        // 300 ms brings the needle within 0.2 dB of the final reading
        let ctx = DspContext::new(48000, 512).unwrap();
        let mut vu = VuMeter::new(&ctx);
        vu.process(&sine(0.5, 1000.0, 14400));
        let db = 20.0 * (vu.read() / 0.5).log10();
        assert!(db > -0.2 && db < 0.5, "after 300 ms: {} dB", db);
    }

    #[test]
    fn test_read_is_pure() {
        let ctx = DspContext::new(48000, 512).unwrap();
        let mut vu = VuMeter::new(&ctx);
        vu.process(&sine(0.3, 440.0, 4800));
        let first = vu.read();
        assert!(first > 0.0);
        assert_eq!(vu.read(), first);
    }

    #[test]
    fn test_non_finite_input_keeps_last_reading() {
        let ctx = DspContext::new(48000, 512).unwrap();
        let mut vu = VuMeter::new(&ctx);
        vu.process(&sine(0.5, 1000.0, 4800));
        let before = vu.read();
        vu.process(&[f32::NAN; 64]);
        assert!(vu.read().is_finite());
        assert_eq!(vu.read(), before);
        vu.process(&sine(0.5, 1000.0, 4800));
        assert!(vu.read().is_finite());
    }

    #[test]
    fn test_reset() {
        let ctx = DspContext::new(48000, 512).unwrap();
        let mut vu = VuMeter::new(&ctx);
        vu.process(&sine(0.5, 1000.0, 4800));
        vu.reset();
        assert_eq!(vu.read(), 0.0);
    }
}
