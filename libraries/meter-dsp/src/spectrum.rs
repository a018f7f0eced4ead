//! Third-octave spectrum analyzer
//!
//! 31 bands on the ISO preferred grid (20 Hz .. 20 kHz, centered on 1 kHz).
//! Each band is two cascaded band-pass biquads followed by a peak detector
//! that falls at 13.5 dB/s. Bands whose center lies above 0.45 fs are
//! disabled and read zero.

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};
use meter_core::{gain_to_db, DspContext, MeterError, Result};

/// Number of third-octave bands
pub const THIRD_OCTAVE_BANDS: usize = 31;

/// Band index of the 1 kHz band
const REFERENCE_BAND: i32 = 17;

/// Q of each band-pass section
const BAND_Q: f32 = 4.32;

/// Peak detector fall rate
const FALL_DB_PER_SECOND: f32 = 13.5;

struct Band {
    center: f32,
    sections: Option<[DirectForm2Transposed<f32>; 2]>,
    level: f32,
}

/// Bank of third-octave band meters
pub struct ThirdOctaveAnalyzer {
    bands: Vec<Band>,
    fall: f32,
}

impl ThirdOctaveAnalyzer {
    /// # Errors
    /// Returns [`MeterError::Filter`] if a band filter cannot be designed.
    pub fn new(ctx: &DspContext) -> Result<Self> {
        let fs = ctx.sample_rate() as f32;
        let limit = 0.45 * fs;

        let mut bands = Vec::with_capacity(THIRD_OCTAVE_BANDS);
        for i in 0..THIRD_OCTAVE_BANDS as i32 {
            let center = 1000.0 * 2.0_f32.powf((i - REFERENCE_BAND) as f32 / 3.0);
            let sections = if center < limit {
                let coeffs = Coefficients::<f32>::from_params(
                    Type::BandPass,
                    fs.hz(),
                    center.hz(),
                    BAND_Q,
                )
                .map_err(|e| MeterError::Filter(format!("{:.0} Hz band: {:?}", center, e)))?;
                Some([
                    DirectForm2Transposed::<f32>::new(coeffs),
                    DirectForm2Transposed::<f32>::new(coeffs),
                ])
            } else {
                None
            };
            bands.push(Band {
                center,
                sections,
                level: 0.0,
            });
        }

        let enabled = bands.iter().filter(|b| b.sections.is_some()).count();
        tracing::debug!(
            "Third-octave analyzer: {} of {} bands active at {} Hz",
            enabled,
            THIRD_OCTAVE_BANDS,
            fs
        );

        Ok(Self {
            bands,
            fall: 10.0_f32.powf(-FALL_DB_PER_SECOND / 20.0 / fs),
        })
    }

    /// Feed a mono block
    pub fn process(&mut self, samples: &[f32]) {
        let fall = self.fall;
        for band in &mut self.bands {
            let Some([a, b]) = band.sections.as_mut() else {
                continue;
            };
            let mut level = band.level;
            for &x in samples {
                let y = b.run(a.run(x)).abs();
                level = if y > level { y } else { level * fall };
            }
            if level.is_finite() {
                band.level = level;
            } else {
                a.reset_state();
                b.reset_state();
                band.level = 0.0;
            }
        }
    }

    /// Feed a stereo block as its mid signal
    pub fn process_stereo(&mut self, left: &[f32], right: &[f32]) {
        let fall = self.fall;
        for band in &mut self.bands {
            let Some([a, b]) = band.sections.as_mut() else {
                continue;
            };
            let mut level = band.level;
            for (&l, &r) in left.iter().zip(right) {
                let y = b.run(a.run(0.5 * (l + r))).abs();
                level = if y > level { y } else { level * fall };
            }
            if level.is_finite() {
                band.level = level;
            } else {
                a.reset_state();
                b.reset_state();
                band.level = 0.0;
            }
        }
    }

    /// Peak-detected level of band `index` (linear)
    pub fn read_band(&self, index: usize) -> f32 {
        self.bands.get(index).map_or(0.0, |b| b.level)
    }

    pub fn read_band_db(&self, index: usize) -> f32 {
        gain_to_db(self.read_band(index))
    }

    pub fn center_frequency(&self, index: usize) -> Option<f32> {
        self.bands.get(index).map(|b| b.center)
    }

    pub fn is_enabled(&self, index: usize) -> bool {
        self.bands.get(index).is_some_and(|b| b.sections.is_some())
    }

    /// `(center frequency, level)` for every band
    pub fn bands(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.bands.iter().map(|b| (b.center, b.level))
    }

    pub fn reset(&mut self) {
        for band in &mut self.bands {
            if let Some([a, b]) = band.sections.as_mut() {
                a.reset_state();
                b.reset_state();
            }
            band.level = 0.0;
        }
    }
}

impl std::fmt::Debug for ThirdOctaveAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThirdOctaveAnalyzer")
            .field("bands", &self.bands.len())
            .field("fall", &self.fall)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, fs: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (std::f32::consts::TAU * freq * i as f32 / fs).sin())
            .collect()
    }

    #[test]
    fn test_band_grid() {
        let ctx = DspContext::new(48000, 512).unwrap();
        let analyzer = ThirdOctaveAnalyzer::new(&ctx).unwrap();
        assert_eq!(analyzer.bands().count(), THIRD_OCTAVE_BANDS);
        assert!((analyzer.center_frequency(17).unwrap() - 1000.0).abs() < 1e-3);
        assert!((analyzer.center_frequency(0).unwrap() - 19.7).abs() < 0.1);
        assert!(analyzer.is_enabled(30));
    }

    #[test]
    fn test_high_bands_disabled_at_low_rate() {
        let ctx = DspContext::new(44100, 512).unwrap();
        let analyzer = ThirdOctaveAnalyzer::new(&ctx).unwrap();
        assert!(!analyzer.is_enabled(30));
        assert!(analyzer.is_enabled(29));
        assert_eq!(analyzer.read_band(30), 0.0);
    }

    #[test]
    fn test_tone_lands_in_its_band() {
        let ctx = DspContext::new(48000, 512).unwrap();
        let mut analyzer = ThirdOctaveAnalyzer::new(&ctx).unwrap();
        // Long enough for the onset transient to fall away in neighbouring bands
        for block in sine(1000.0, 48000.0, 96000).chunks(512) {
            analyzer.process(block);
        }
        let center = analyzer.read_band(17);
        assert!(center > 0.3, "1 kHz band = {}", center);
        assert!(analyzer.read_band(20) < 0.05);
        assert!(analyzer.read_band(14) < 0.05);
    }

    #[test]
    fn test_peak_falls_after_tone() {
        let ctx = DspContext::new(48000, 512).unwrap();
        let mut analyzer = ThirdOctaveAnalyzer::new(&ctx).unwrap();
        analyzer.process(&sine(1000.0, 48000.0, 24000));
        let held = analyzer.read_band_db(17);
        analyzer.process(&vec![0.0; 48000]);
        let fallen = analyzer.read_band_db(17);
        assert!(held - fallen > 12.0 && held - fallen < 15.0);
    }

    #[test]
    fn test_reset() {
        let ctx = DspContext::new(48000, 512).unwrap();
        let mut analyzer = ThirdOctaveAnalyzer::new(&ctx).unwrap();
        analyzer.process(&sine(1000.0, 48000.0, 4800));
        analyzer.reset();
        assert!(analyzer.bands().all(|(_, level)| level == 0.0));
    }
}
