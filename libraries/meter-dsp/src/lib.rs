//! Real-time metering DSP
//!
//! This crate provides:
//! - Deflection curves mapping levels to a 0..1 needle/bar position
//! - The ballistics family (VU, IEC Type I/II PPM, K-meter, true peak) behind
//!   one [`LevelDetector`] trait
//! - Stereo correlation
//! - EBU R128 loudness integration with radar history and histograms
//! - Third-octave spectrum and inter-channel phase analyzers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌──────────────┐
//! │ Audio Block │ ──► │ LevelDetector    │ ──► │ read() level │ ──► deflection
//! └─────────────┘     │ Correlation      │     └──────────────┘
//!                     │ LoudnessIntegr.  │ ──► radar / histogram / record
//!                     └──────────────────┘
//! ```
//!
//! Every `process` method is real-time safe: no allocation, no locks, no
//! blocking. Allocation happens in constructors only.
//!
//! # Example
//!
//! ```rust
//! use meter_core::{DetectorKind, DspContext};
//! use meter_dsp::{create_detector, deflection};
//!
//! let ctx = DspContext::new(48000, 512).unwrap();
//! let mut vu = create_detector(DetectorKind::Vu, &ctx).unwrap();
//!
//! let block = vec![0.0_f32; 512];
//! vu.process(&block);
//! let position = deflection::vu_deflection(meter_core::gain_to_db(vu.read()));
//! assert!(position >= 0.0 && position <= 1.0);
//! ```

#![deny(unsafe_code)]

pub mod ballistics;
pub mod correlation;
pub mod deflection;
pub mod ebu;
pub mod phase;
pub mod spectrum;
pub mod true_peak;

pub use ballistics::{create_detector, IecType1Meter, IecType2Meter, KMeter, KReading, LevelDetector, VuMeter};
pub use correlation::Correlation;
pub use deflection::MeterScale;
pub use ebu::{
    IntegratorState, LoudnessHistogram, LoudnessIntegrator, LoudnessRange, LoudnessSnapshot,
    Radar, RadarPoint, HISTOGRAM_BINS, RADAR_CAPACITY,
};
pub use phase::{PhaseAnalyzer, PhaseBin};
pub use spectrum::ThirdOctaveAnalyzer;
pub use true_peak::{PeakHold, StereoTruePeak, TruePeakDetector};
