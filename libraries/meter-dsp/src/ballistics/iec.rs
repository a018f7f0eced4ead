//! IEC 60268-10 quasi-peak programme meters

use super::{finite_or_zero, LevelDetector, SubBlockCarry, DENORMAL_BIAS};
use meter_core::{DetectorKind, DspContext};

/// Type I output gain (two integrators summed, calibrated on a steady sine)
const IEC1_GAIN: f32 = 0.5108;

/// Type II output gain
const IEC2_GAIN: f32 = 0.5625;

/// Publish `gain * max` unless it went non-finite, then sanitize the taps
#[inline]
fn publish(level: &mut f32, gain: f32, max: f32) {
    let value = gain * max;
    if value.is_finite() {
        *level = value;
    }
}

/// IEC Type I PPM (DIN 45406, Nordic N9)
///
/// Two parallel peak followers with fast (450/fs) and slower (1300/fs)
/// attacks and a shared 20 dB / 1.7 s release. The reading is the largest
/// summed value seen in the last processed block.
#[derive(Debug, Clone)]
pub struct IecType1Meter {
    attack_fast: f32,
    attack_slow: f32,
    release: f32,
    z1: f32,
    z2: f32,
    level: f32,
    carry: SubBlockCarry,
}

impl IecType1Meter {
    pub fn new(ctx: &DspContext) -> Self {
        let c = ctx.coeffs();
        Self {
            attack_fast: c.iec1_attack_fast,
            attack_slow: c.iec1_attack_slow,
            release: c.iec1_release,
            z1: 0.0,
            z2: 0.0,
            level: 0.0,
            carry: SubBlockCarry::default(),
        }
    }
}

impl LevelDetector for IecType1Meter {
    fn process(&mut self, samples: &[f32]) {
        let Self {
            attack_fast,
            attack_slow,
            release,
            z1,
            z2,
            carry,
            ..
        } = self;
        let (w1, w2, w3) = (*attack_fast, *attack_slow, *release);
        let mut a = z1.clamp(0.0, 20.0);
        let mut b = z2.clamp(0.0, 20.0);
        let mut max = 0.0_f32;

        let steps = carry.feed(samples, |group| {
            for &x in group {
                let t = x.abs();
                a *= w3;
                b *= w3;
                if t > a {
                    a += w1 * (t - a);
                }
                if t > b {
                    b += w2 * (t - b);
                }
            }
            max = max.max(a + b);
        });
        if steps == 0 {
            return;
        }

        *z1 = finite_or_zero(a + DENORMAL_BIAS);
        *z2 = finite_or_zero(b + DENORMAL_BIAS);
        publish(&mut self.level, IEC1_GAIN, max);
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
        DetectorKind::IecType1
    }
}

/// IEC Type II PPM (BBC, EBU)
///
/// One attack constant (200/fs) applied to two followers that take turns on
/// alternate samples, 24 dB / 2.8 s release.
#[derive(Debug, Clone)]
pub struct IecType2Meter {
    attack: f32,
    release: f32,
    z1: f32,
    z2: f32,
    level: f32,
    carry: SubBlockCarry,
}

impl IecType2Meter {
    pub fn new(ctx: &DspContext) -> Self {
        let c = ctx.coeffs();
        Self {
            attack: c.iec2_attack,
            release: c.iec2_release,
            z1: 0.0,
            z2: 0.0,
            level: 0.0,
            carry: SubBlockCarry::default(),
        }
    }
}

impl LevelDetector for IecType2Meter {
    fn process(&mut self, samples: &[f32]) {
        let Self {
            attack,
            release,
            z1,
            z2,
            carry,
            ..
        } = self;
        let (w1, w2) = (*attack, *release);
        let mut a = z1.clamp(0.0, 20.0);
        let mut b = z2.clamp(0.0, 20.0);
        let mut max = 0.0_f32;

        let steps = carry.feed(samples, |group| {
            for pair in group.chunks_exact(2) {
                a *= w2;
                b *= w2;
                let t = pair[0].abs();
                if t > a {
                    a += w1 * (t - a);
                }
                a *= w2;
                b *= w2;
                let t = pair[1].abs();
                if t > b {
                    b += w1 * (t - b);
                }
            }
            max = max.max(a + b);
        });
        if steps == 0 {
            return;
        }

        *z1 = finite_or_zero(a + DENORMAL_BIAS);
        *z2 = finite_or_zero(b + DENORMAL_BIAS);
        publish(&mut self.level, IEC2_GAIN, max);
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
        DetectorKind::IecType2
    }
}
