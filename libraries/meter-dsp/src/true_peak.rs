//! True peak detection (ITU-R BS.1770 Annex 2)
//!
//! The signal is oversampled 4x through a windowed-sinc interpolator and the
//! largest absolute value of the reconstructed waveform is tracked. Reading
//! returns the peak since the previous read and clears it; keeping an
//! all-time maximum is left to [`PeakHold`].

use crate::ballistics::LevelDetector;
use meter_core::{gain_to_db, DetectorKind, DspContext, MeterError, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

/// Oversampled true peak detector for one channel
pub struct TruePeakDetector {
    resampler: SincFixedIn<f32>,
    /// Input staging for one resampler chunk
    input: Vec<f32>,
    staged: usize,
    output: Vec<f32>,
    max: f32,
}

impl TruePeakDetector {
    /// Create a detector with the oversampler settings from `ctx`
    ///
    /// # Errors
    /// Returns [`MeterError::Resampler`] if rubato rejects the settings.
    pub fn new(ctx: &DspContext) -> Result<Self> {
        let settings = ctx.true_peak();
        let params = SincInterpolationParameters {
            sinc_len: settings.sinc_len,
            f_cutoff: settings.f_cutoff,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: settings.table_density,
            window: WindowFunction::BlackmanHarris2,
        };

        let resampler = SincFixedIn::<f32>::new(
            settings.factor as f64,
            1.0, // fixed ratio
            params,
            settings.chunk_size,
            1,
        )
        .map_err(|e| MeterError::Resampler(format!("SincFixedIn creation failed: {}", e)))?;

        let output = vec![0.0; resampler.output_frames_max()];
        let mut detector = Self {
            resampler,
            input: vec![0.0; settings.chunk_size],
            staged: 0,
            output,
            max: 0.0,
        };

        // Prime the interpolator delay line so stream start shows no transient
        detector.run_chunk();
        detector.max = 0.0;

        tracing::debug!(
            "True peak detector ready: {}x, sinc length {}",
            settings.factor,
            settings.sinc_len
        );
        Ok(detector)
    }

    /// Resample the staged chunk and fold its output into the running max
    fn run_chunk(&mut self) {
        let result = self.resampler.process_into_buffer(
            &[&self.input[..]],
            &mut [&mut self.output[..]],
            None,
        );
        self.staged = 0;

        // A failed chunk is dropped and leaves the max untouched
        let Ok((_, written)) = result else {
            return;
        };

        let out = &self.output[..written];
        if out.iter().all(|y| y.is_finite()) {
            self.max = out.iter().fold(self.max, |m, y| m.max(y.abs()));
        } else {
            // Poisoned delay line: keep the previous max and start clean
            self.resampler.reset();
        }
    }

    /// Peak since last read in dBTP; consumes it
    pub fn read_db(&mut self) -> f32 {
        gain_to_db(self.read())
    }

    /// Samples waiting for the next resampler chunk
    pub fn pending(&self) -> usize {
        self.staged
    }
}

impl LevelDetector for TruePeakDetector {
    fn process(&mut self, samples: &[f32]) {
        let mut rest = samples;
        while !rest.is_empty() {
            let take = (self.input.len() - self.staged).min(rest.len());
            self.input[self.staged..self.staged + take].copy_from_slice(&rest[..take]);
            self.staged += take;
            rest = &rest[take..];
            if self.staged == self.input.len() {
                self.run_chunk();
            }
        }
    }

    fn read(&mut self) -> f32 {
        std::mem::take(&mut self.max)
    }

    fn reset(&mut self) {
        self.resampler.reset();
        self.staged = 0;
        self.max = 0.0;
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::TruePeak
    }
}

impl std::fmt::Debug for TruePeakDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TruePeakDetector")
            .field("chunk", &self.input.len())
            .field("staged", &self.staged)
            .field("max", &self.max)
            .finish_non_exhaustive()
    }
}

/// Two true peak detectors driven together
#[derive(Debug)]
pub struct StereoTruePeak {
    left: TruePeakDetector,
    right: TruePeakDetector,
}

impl StereoTruePeak {
    pub fn new(ctx: &DspContext) -> Result<Self> {
        Ok(Self {
            left: TruePeakDetector::new(ctx)?,
            right: TruePeakDetector::new(ctx)?,
        })
    }

    pub fn process(&mut self, left: &[f32], right: &[f32]) {
        self.left.process(left);
        self.right.process(right);
    }

    /// Per-channel peaks since last read; consumes both
    pub fn read(&mut self) -> (f32, f32) {
        (self.left.read(), self.right.read())
    }

    /// Larger of the two channel peaks; consumes both
    pub fn read_max(&mut self) -> f32 {
        let (l, r) = self.read();
        l.max(r)
    }

    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

/// All-time maximum of a consumed peak stream
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeakHold {
    value: f32,
}

impl PeakHold {
    /// Fold in a new interval peak and return the held maximum
    pub fn update(&mut self, peak: f32) -> f32 {
        if peak.is_finite() && peak > self.value {
            self.value = peak;
        }
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}
