//! Ballistics filter family
//!
//! Single-channel level detectors sharing one contract: feed samples with
//! [`LevelDetector::process`], then take the published level with
//! [`LevelDetector::read`].
//!
//! Two read semantics coexist on purpose:
//! - VU, IEC PPM and the K-meter RMS leg are *continuous*: `read()` is a pure
//!   accessor and repeated calls return the same value.
//! - True peak and the K-meter peak leg are *peak-hold since last read*:
//!   reading consumes the held maximum.
//!
//! The VU, IEC and K-meter integrators run in sub-blocks of 4 samples. Any
//! block length is accepted; samples that do not complete a sub-block are
//! carried into the next call so the stream stays continuous.

mod iec;
mod kmeter;
mod vu;

pub use iec::{IecType1Meter, IecType2Meter};
pub use kmeter::{KMeter, KReading};
pub use vu::VuMeter;

use crate::true_peak::TruePeakDetector;
use meter_core::{DetectorKind, DspContext, Result};

/// Samples per ballistics sub-block
pub const SUB_BLOCK: usize = 4;

/// Bias added to filter taps so silence never decays into denormals
pub(crate) const DENORMAL_BIAS: f32 = 1e-10;

/// Trait for single-channel level detectors
///
/// # Real-Time Constraints
/// - `process`, `read` and `reset` must not allocate, lock or block
/// - Published readings are always finite
pub trait LevelDetector: Send {
    /// Advance the detector over `samples`
    fn process(&mut self, samples: &[f32]);

    /// Current published level (linear amplitude, 1.0 = full scale)
    fn read(&mut self) -> f32;

    /// Peak leg for detectors that carry one; consumes it
    fn read_peak(&mut self) -> Option<f32> {
        None
    }

    /// Clear all filter state
    fn reset(&mut self);

    fn kind(&self) -> DetectorKind;
}

/// Build the detector for `kind` with coefficients from `ctx`
///
/// # Errors
/// Only the true peak detector can fail (oversampler construction).
pub fn create_detector(kind: DetectorKind, ctx: &DspContext) -> Result<Box<dyn LevelDetector>> {
    Ok(match kind {
        DetectorKind::Vu => Box::new(VuMeter::new(ctx)),
        DetectorKind::IecType1 => Box::new(IecType1Meter::new(ctx)),
        DetectorKind::IecType2 => Box::new(IecType2Meter::new(ctx)),
        DetectorKind::KMeter => Box::new(KMeter::new(ctx)),
        DetectorKind::TruePeak => Box::new(TruePeakDetector::new(ctx)?),
    })
}

/// Carries the tail of a block that does not fill a whole sub-block
#[derive(Debug, Clone, Default)]
pub(crate) struct SubBlockCarry {
    buf: [f32; SUB_BLOCK],
    len: usize,
}

impl SubBlockCarry {
    /// Call `step` for every complete sub-block in carry + `samples`, keeping
    /// the remainder. Returns the number of sub-blocks processed.
    pub(crate) fn feed(&mut self, samples: &[f32], mut step: impl FnMut(&[f32; SUB_BLOCK])) -> usize {
        let mut rest = samples;
        let mut count = 0;

        if self.len > 0 {
            let take = (SUB_BLOCK - self.len).min(rest.len());
            self.buf[self.len..self.len + take].copy_from_slice(&rest[..take]);
            self.len += take;
            rest = &rest[take..];
            if self.len < SUB_BLOCK {
                return 0;
            }
            step(&self.buf);
            self.len = 0;
            count += 1;
        }

        let mut chunks = rest.chunks_exact(SUB_BLOCK);
        for chunk in &mut chunks {
            if let Ok(group) = <&[f32; SUB_BLOCK]>::try_from(chunk) {
                step(group);
                count += 1;
            }
        }

        let tail = chunks.remainder();
        self.buf[..tail.len()].copy_from_slice(tail);
        self.len = tail.len();
        count
    }

    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.len
    }
}

/// Zero a non-finite filter tap
#[inline]
pub(crate) fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
