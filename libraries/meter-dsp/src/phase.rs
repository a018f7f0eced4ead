//! Inter-channel phase analyzer
//!
//! Hann-windowed stereo frames with 50 % overlap are transformed with the
//! shared FFT plan from [`DspContext`]. For every bin the analyzer reports
//! the combined level and the phase of the right channel relative to the
//! left, `arg(L · conj(R))`.

use meter_core::{gain_to_db, DspContext};
use rustfft::num_complex::Complex;
use rustfft::Fft;
use std::sync::Arc;

/// One analyzed frequency bin
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseBin {
    pub frequency: f32,
    /// Amplitude of the channel average, dBFS
    pub level_db: f32,
    /// Phase of L relative to R in radians, -π..π
    pub phase: f32,
}

pub struct PhaseAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// Amplitude normalization for the window
    norm: f32,
    left: Vec<f32>,
    right: Vec<f32>,
    filled: usize,
    spectrum_left: Vec<Complex<f32>>,
    spectrum_right: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    bins: Vec<PhaseBin>,
    ready: bool,
}

impl PhaseAnalyzer {
    pub fn new(ctx: &DspContext) -> Self {
        let fft = ctx.fft();
        let size = fft.len();
        let window: Vec<f32> = (0..size)
            .map(|i| 0.5 - 0.5 * (std::f32::consts::TAU * i as f32 / size as f32).cos())
            .collect();
        let norm = 2.0 / window.iter().sum::<f32>();

        let bin_width = ctx.sample_rate() as f32 / size as f32;
        let bins = (0..size / 2)
            .map(|k| PhaseBin {
                frequency: k as f32 * bin_width,
                level_db: meter_core::LEVEL_FLOOR_DB,
                phase: 0.0,
            })
            .collect();

        Self {
            scratch: vec![Complex::default(); fft.get_inplace_scratch_len()],
            fft,
            window,
            norm,
            left: vec![0.0; size],
            right: vec![0.0; size],
            filled: 0,
            spectrum_left: vec![Complex::default(); size],
            spectrum_right: vec![Complex::default(); size],
            bins,
            ready: false,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.window.len()
    }

    /// Feed a stereo block; analyzes a frame every half FFT length
    pub fn process(&mut self, left: &[f32], right: &[f32]) {
        let frames = left.len().min(right.len());
        let size = self.window.len();
        let hop = size / 2;
        let mut offset = 0;

        while offset < frames {
            let n = (size - self.filled).min(frames - offset);
            self.left[self.filled..self.filled + n].copy_from_slice(&left[offset..offset + n]);
            self.right[self.filled..self.filled + n].copy_from_slice(&right[offset..offset + n]);
            self.filled += n;
            offset += n;

            if self.filled == size {
                self.analyze();
                self.left.copy_within(hop.., 0);
                self.right.copy_within(hop.., 0);
                self.filled = hop;
            }
        }
    }

    fn analyze(&mut self) {
        for (i, w) in self.window.iter().enumerate() {
            self.spectrum_left[i] = Complex::new(self.left[i] * w, 0.0);
            self.spectrum_right[i] = Complex::new(self.right[i] * w, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.spectrum_left, &mut self.scratch);
        self.fft
            .process_with_scratch(&mut self.spectrum_right, &mut self.scratch);

        for (k, bin) in self.bins.iter_mut().enumerate() {
            let l = self.spectrum_left[k];
            let r = self.spectrum_right[k];
            let power = 0.5 * (l.norm_sqr() + r.norm_sqr());
            bin.level_db = gain_to_db(power.sqrt() * self.norm);
            let phase = (l * r.conj()).arg();
            bin.phase = if phase.is_finite() { phase } else { 0.0 };
        }
        self.ready = true;
    }

    /// Whether a new frame was analyzed since the last call
    pub fn frame_ready(&mut self) -> bool {
        std::mem::take(&mut self.ready)
    }

    pub fn bins(&self) -> &[PhaseBin] {
        &self.bins
    }

    pub fn reset(&mut self) {
        self.left.fill(0.0);
        self.right.fill(0.0);
        self.filled = 0;
        self.ready = false;
        for bin in &mut self.bins {
            bin.level_db = meter_core::LEVEL_FLOOR_DB;
            bin.phase = 0.0;
        }
    }
}

impl std::fmt::Debug for PhaseAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseAnalyzer")
            .field("fft_size", &self.window.len())
            .field("filled", &self.filled)
            .field("ready", &self.ready)
            .finish_non_exhaustive()
    }
}
