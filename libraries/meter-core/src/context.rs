//! Per-process DSP context
//!
//! Everything that depends only on the sample rate (ballistics coefficients,
//! oversampler settings, the FFT plan) is computed here once and then shared by
//! reference with every detector. Build the context before starting audio
//! threads; after construction it is read-only and `Sync`.

use crate::error::{MeterError, Result};
use rustfft::{Fft, FftPlanner};
use std::fmt;
use std::sync::Arc;

/// Lowest supported sample rate in Hz
pub const MIN_SAMPLE_RATE: u32 = 8000;

/// Highest supported sample rate in Hz
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Largest host block the processors preallocate scratch space for
pub const MAX_BLOCK_SIZE: usize = 16384;

/// True peak oversampling factor (ITU-R BS.1770 Annex 2)
pub const TRUE_PEAK_OVERSAMPLING: usize = 4;

/// Filter coefficients for the ballistics family, derived from the sample rate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallisticsCoeffs {
    /// VU integrator coefficient (`11.1 / fs`)
    pub vu_w: f32,
    /// IEC Type I fast attack (`450 / fs`)
    pub iec1_attack_fast: f32,
    /// IEC Type I slow attack (`1300 / fs`)
    pub iec1_attack_slow: f32,
    /// IEC Type I per-sample release multiplier (`1 - 5.4 / fs`)
    pub iec1_release: f32,
    /// IEC Type II attack (`200 / fs`)
    pub iec2_attack: f32,
    /// IEC Type II per-sample release multiplier (`1 - 2.3 / fs`)
    pub iec2_release: f32,
    /// K-meter mean-square integrator coefficient (`9.72 / fs`)
    pub kmeter_omega: f32,
    /// Correlation pre-filter, one-pole low-pass at 2 kHz
    pub corr_lowpass: f32,
    /// Correlation statistics smoothing, 0.3 s time constant
    pub corr_smoothing: f32,
}

impl BallisticsCoeffs {
    /// Derive every coefficient for `sample_rate`
    pub fn for_sample_rate(sample_rate: u32) -> Self {
        let fs = sample_rate as f32;
        Self {
            vu_w: 11.1 / fs,
            iec1_attack_fast: 450.0 / fs,
            iec1_attack_slow: 1300.0 / fs,
            iec1_release: 1.0 - 5.4 / fs,
            iec2_attack: 200.0 / fs,
            iec2_release: 1.0 - 2.3 / fs,
            kmeter_omega: 9.72 / fs,
            corr_lowpass: (std::f32::consts::TAU * 2000.0 / fs).min(1.0),
            corr_smoothing: 1.0 / (0.3 * fs),
        }
    }
}

/// Settings for the true peak oversampler
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TruePeakSettings {
    /// Oversampling factor
    pub factor: usize,
    /// Interpolation filter length in input samples
    pub sinc_len: usize,
    /// Cutoff relative to the input Nyquist frequency
    pub f_cutoff: f32,
    /// Sinc table density (multiple of `factor` so phases fall on table entries)
    pub table_density: usize,
    /// Input frames per resampler call
    pub chunk_size: usize,
}

impl Default for TruePeakSettings {
    fn default() -> Self {
        Self {
            factor: TRUE_PEAK_OVERSAMPLING,
            sinc_len: 48,
            f_cutoff: 0.91,
            table_density: 128,
            chunk_size: 32,
        }
    }
}

/// Shared, read-only DSP state for one process
#[derive(Clone)]
pub struct DspContext {
    sample_rate: u32,
    max_block_size: usize,
    coeffs: BallisticsCoeffs,
    true_peak: TruePeakSettings,
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
}

impl DspContext {
    /// Build the context for a host running at `sample_rate` with blocks of at
    /// most `max_block_size` frames
    ///
    /// # Errors
    /// Fails when the sample rate or block size is outside what the meters
    /// preallocate for. This is the only fatal path in the family.
    pub fn new(sample_rate: u32, max_block_size: usize) -> Result<Self> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
            return Err(MeterError::InvalidSampleRate(sample_rate));
        }
        if max_block_size == 0 || max_block_size > MAX_BLOCK_SIZE {
            return Err(MeterError::BlockSizeTooLarge {
                requested: max_block_size,
                max: MAX_BLOCK_SIZE,
            });
        }

        let fft_size = Self::phase_fft_size(sample_rate);
        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);

        tracing::debug!(
            "DSP context ready: {} Hz, max block {}, phase FFT {}",
            sample_rate,
            max_block_size,
            fft_size
        );

        Ok(Self {
            sample_rate,
            max_block_size,
            coeffs: BallisticsCoeffs::for_sample_rate(sample_rate),
            true_peak: TruePeakSettings::default(),
            fft_size,
            fft,
        })
    }

    /// Override the oversampler settings (tests and offline analysis)
    pub fn with_true_peak_settings(mut self, settings: TruePeakSettings) -> Self {
        self.true_peak = settings;
        self
    }

    /// FFT length giving roughly 20-40 ms frames at any supported rate
    fn phase_fft_size(sample_rate: u32) -> usize {
        match sample_rate {
            0..=24000 => 1024,
            24001..=48000 => 2048,
            48001..=96000 => 4096,
            _ => 8192,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    pub fn coeffs(&self) -> &BallisticsCoeffs {
        &self.coeffs
    }

    pub fn true_peak(&self) -> &TruePeakSettings {
        &self.true_peak
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Shared forward FFT plan of length [`fft_size`](Self::fft_size)
    pub fn fft(&self) -> Arc<dyn Fft<f32>> {
        Arc::clone(&self.fft)
    }
}

impl fmt::Debug for DspContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DspContext")
            .field("sample_rate", &self.sample_rate)
            .field("max_block_size", &self.max_block_size)
            .field("coeffs", &self.coeffs)
            .field("true_peak", &self.true_peak)
            .field("fft_size", &self.fft_size)
            .finish_non_exhaustive()
    }
}
