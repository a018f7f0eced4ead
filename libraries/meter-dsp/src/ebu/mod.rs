//! EBU R128 loudness metering
//!
//! - [`LoudnessIntegrator`]: momentary, short-term, integrated loudness and
//!   loudness range with a start/pause/reset state machine
//! - [`Radar`]: circular loudness history for the radar display
//! - [`LoudnessHistogram`]: distribution of momentary and short-term readings
//!
//! All loudness values are in LUFS. Anything undefined or below -70 LUFS is
//! reported as [`meter_core::BELOW_FLOOR_LUFS`].

mod histogram;
mod integrator;
mod radar;
mod range;

pub use histogram::{bin_index, bin_lufs, LoudnessHistogram, HISTOGRAM_BINS, HISTOGRAM_RESOLUTION};
pub use integrator::LoudnessIntegrator;
pub use radar::{Radar, RadarPoint, MAX_RADAR_SECONDS, MIN_RADAR_SECONDS, RADAR_CAPACITY};
pub use range::LoudnessRange;

use serde::{Deserialize, Serialize};

/// Run state of the integrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegratorState {
    /// Not started yet
    #[default]
    Idle,
    Integrating,
    /// Stopped with results retained
    Paused,
}

/// Every published loudness value at one instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoudnessSnapshot {
    pub state: IntegratorState,
    pub momentary: f32,
    pub short_term: f32,
    pub momentary_max: f32,
    pub short_term_max: f32,
    pub integrated: f32,
    /// Loudness range in LU
    pub range: f32,
    pub range_low: f32,
    pub range_high: f32,
    /// Seconds
    pub integration_time: f32,
}
