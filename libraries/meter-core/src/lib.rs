//! Level Meters Core
//!
//! Platform-agnostic building blocks shared by every meter in the family.
//!
//! This crate provides:
//! - **Error Handling**: a unified `MeterError` and `Result` for setup-time failures
//! - **Levels**: dB/linear conversion, display floors and published sentinels
//! - **DSP Context**: per-process coefficient tables and the FFT plan, built once
//!   before any audio thread starts
//! - **Configuration**: typed meter/loudness settings with their wire bitmasks
//!
//! # Example
//!
//! ```rust
//! use meter_core::{DspContext, DetectorKind, MeterConfig};
//!
//! let ctx = DspContext::new(48000, 1024).unwrap();
//! assert_eq!(ctx.sample_rate(), 48000);
//!
//! let config = MeterConfig::for_kind(DetectorKind::Vu);
//! assert_eq!(config.reference_db, -18.0);
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod context;
pub mod error;
pub mod level;

pub use config::{
    DetectorKind, DisplaySettings, EbuConfig, KSystem, MeterConfig, TransportFollow,
};
pub use context::{BallisticsCoeffs, DspContext, TruePeakSettings};
pub use error::{MeterError, Result};
pub use level::{
    db_to_gain, gain_to_db, lufs_or_sentinel, sanitize, BELOW_FLOOR_LUFS, LEVEL_FLOOR_DB,
    LUFS_FLOOR,
};
