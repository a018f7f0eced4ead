use super::{finite_or_zero, LevelDetector, SubBlockCarry, SUB_BLOCK};
use meter_core::{DetectorKind, DspContext};

/// Denormal bias for the squared-signal taps
const SQUARED_BIAS: f32 = 1e-20;

/// Both K-meter legs from one read
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KReading {
    /// RMS level, calibrated so a sine reads its peak amplitude
    pub rms: f32,
    /// Largest sample magnitude since the previous peak read
    pub peak: f32,
}

/// K-System meter
///
/// Mean-square integrator (about 600 ms to 99 %) with a sample-peak leg fed
/// from the same `process` call. The RMS leg is continuous; the peak leg is
/// peak-hold since last read.
#[derive(Debug, Clone)]
pub struct KMeter {
    omega: f32,
    z1: f32,
    z2: f32,
    rms: f32,
    peak: f32,
    carry: SubBlockCarry,
}

impl KMeter {
    pub fn new(ctx: &DspContext) -> Self {
        Self {
            omega: ctx.coeffs().kmeter_omega,
            z1: 0.0,
            z2: 0.0,
            rms: 0.0,
            peak: 0.0,
            carry: SubBlockCarry::default(),
        }
    }

    /// RMS and peak together; consumes the peak
    pub fn read_both(&mut self) -> KReading {
        let reading = KReading {
            rms: self.rms,
            peak: self.peak,
        };
        self.peak = 0.0;
        reading
    }
}

impl LevelDetector for KMeter {
    fn process(&mut self, samples: &[f32]) {
        let block_peak = samples
            .iter()
            .map(|x| x.abs())
            .filter(|x| x.is_finite())
            .fold(0.0_f32, f32::max);
        if block_peak > self.peak {
            self.peak = block_peak;
        }

        let Self {
            omega, z1, z2, carry, ..
        } = self;
        let w = *omega;
        let mut a = z1.clamp(0.0, 20.0);
        let mut b = z2.clamp(0.0, 20.0);

        let steps = carry.feed(samples, |group| {
            for &x in group {
                a += w * (x * x - a);
            }
            b += SUB_BLOCK as f32 * w * (a - b);
        });
        if steps == 0 {
            return;
        }

        *z1 = finite_or_zero(a + SQUARED_BIAS);
        *z2 = finite_or_zero(b + SQUARED_BIAS);

        let rms = (2.0 * b).sqrt();
        if rms.is_finite() {
            self.rms = rms;
        }
    }

    fn read(&mut self) -> f32 {
        self.rms
    }

    fn read_peak(&mut self) -> Option<f32> {
        Some(std::mem::take(&mut self.peak))
    }

    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
        self.rms = 0.0;
        self.peak = 0.0;
        self.carry.clear();
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::KMeter
    }
}
