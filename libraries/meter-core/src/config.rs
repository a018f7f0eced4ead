//! Meter configuration
//!
//! Settings are plain structs with named fields. The packed integer forms used
//! on the wire and in saved state exist only at the serialization boundary
//! (`to_bits`/`from_bits` and the serde `u32` representation).

use crate::error::{MeterError, Result};
use serde::{Deserialize, Serialize};

/// Which ballistics a level meter follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    /// VU meter (IEC 60268-17), ~300 ms integration
    #[default]
    Vu,
    /// IEC 60268-10 Type I quasi-peak (DIN 45406, Nordic)
    IecType1,
    /// IEC 60268-10 Type II quasi-peak (BBC, EBU)
    IecType2,
    /// K-System RMS meter with a peak leg
    KMeter,
    /// Oversampled true peak (ITU-R BS.1770)
    TruePeak,
}

impl DetectorKind {
    /// Level in dBFS that reads as the meter's 0 mark
    pub fn default_reference_db(self) -> f32 {
        match self {
            Self::Vu | Self::IecType2 => -18.0,
            Self::IecType1 => -9.0,
            Self::KMeter | Self::TruePeak => 0.0,
        }
    }

    /// Whether `read()` consumes the value (peak-hold since last read)
    pub fn consumes_on_read(self) -> bool {
        matches!(self, Self::TruePeak)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Vu => "VU",
            Self::IecType1 => "IEC Type I PPM",
            Self::IecType2 => "IEC Type II PPM",
            Self::KMeter => "K-meter",
            Self::TruePeak => "True peak",
        }
    }
}

/// K-System scale (headroom above the 0 mark)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum KSystem {
    K12,
    K14,
    #[default]
    K20,
}

impl KSystem {
    /// Headroom in dB between the 0 mark and digital full scale
    pub fn headroom_db(self) -> f32 {
        match self {
            Self::K12 => 12.0,
            Self::K14 => 14.0,
            Self::K20 => 20.0,
        }
    }
}

/// How the loudness integrator follows the host transport
///
/// Wire form: bit 0 = follow start/stop, bit 1 = reset on restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct TransportFollow {
    /// Start integrating when the transport rolls, pause when it stops
    pub follow_start_stop: bool,
    /// Clear previous results whenever integration (re)starts
    pub reset_on_restart: bool,
}

impl TransportFollow {
    pub fn to_bits(self) -> u32 {
        u32::from(self.follow_start_stop) | (u32::from(self.reset_on_restart) << 1)
    }

    pub fn from_bits(bits: u32) -> Self {
        Self {
            follow_start_stop: bits & 1 != 0,
            reset_on_restart: bits & 2 != 0,
        }
    }
}

impl From<u32> for TransportFollow {
    fn from(bits: u32) -> Self {
        Self::from_bits(bits)
    }
}

impl From<TransportFollow> for u32 {
    fn from(follow: TransportFollow) -> Self {
        follow.to_bits()
    }
}

/// Observer display toggles persisted with the plugin state
///
/// Wire form: one bit per field in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct DisplaySettings {
    /// Show absolute LUFS instead of LU relative to the target
    pub absolute_scale: bool,
    /// Extend the scale to +18 LU instead of +9 LU
    pub extended_range: bool,
    /// Radar traces short-term instead of momentary loudness
    pub radar_short_term: bool,
    /// Histogram shows short-term instead of momentary loudness
    pub histogram_short_term: bool,
    /// Windowed averaging display mode
    pub windowed_average: bool,
    /// Show the true peak readout
    pub show_true_peak: bool,
    /// Logarithmic radial radar scale
    pub radar_log_scale: bool,
}

impl DisplaySettings {
    pub fn to_bits(self) -> u32 {
        [
            self.absolute_scale,
            self.extended_range,
            self.radar_short_term,
            self.histogram_short_term,
            self.windowed_average,
            self.show_true_peak,
            self.radar_log_scale,
        ]
        .iter()
        .enumerate()
        .fold(0, |bits, (i, &on)| bits | (u32::from(on) << i))
    }

    pub fn from_bits(bits: u32) -> Self {
        let bit = |i: u32| bits & (1 << i) != 0;
        Self {
            absolute_scale: bit(0),
            extended_range: bit(1),
            radar_short_term: bit(2),
            histogram_short_term: bit(3),
            windowed_average: bit(4),
            show_true_peak: bit(5),
            radar_log_scale: bit(6),
        }
    }
}

impl From<u32> for DisplaySettings {
    fn from(bits: u32) -> Self {
        Self::from_bits(bits)
    }
}

impl From<DisplaySettings> for u32 {
    fn from(settings: DisplaySettings) -> Self {
        settings.to_bits()
    }
}

/// Level meter settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    pub kind: DetectorKind,
    /// 1 (mono) or 2 (stereo)
    pub channels: usize,
    /// Level in dBFS that reads as the 0 mark
    pub reference_db: f32,
    /// Input gain applied before detection
    pub input_gain_db: f32,
    /// K-System scale, used by K-meters only
    pub k_system: KSystem,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self::for_kind(DetectorKind::default())
    }
}

impl MeterConfig {
    /// Stereo defaults for `kind`
    pub fn for_kind(kind: DetectorKind) -> Self {
        Self {
            kind,
            channels: 2,
            reference_db: kind.default_reference_db(),
            input_gain_db: 0.0,
            k_system: KSystem::default(),
        }
    }

    /// Parse settings from JSON, filling unspecified fields with defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| MeterError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=2).contains(&self.channels) {
            return Err(MeterError::InvalidChannelCount(self.channels));
        }
        if !self.reference_db.is_finite() || !self.input_gain_db.is_finite() {
            return Err(MeterError::InvalidConfig(
                "reference and gain must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// EBU R128 meter settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EbuConfig {
    /// History span of the loudness radar in seconds
    pub radar_seconds: f32,
    /// Radar points replayed per audio block after an observer attaches
    pub resync_batch: usize,
    /// Histogram bins sent per audio block
    pub histogram_batch: usize,
    /// Minimum spacing between loudness records in milliseconds
    pub telemetry_interval_ms: f32,
    pub transport: TransportFollow,
    pub display: DisplaySettings,
}

impl Default for EbuConfig {
    fn default() -> Self {
        Self {
            radar_seconds: 120.0,
            resync_batch: 8,
            histogram_batch: 8,
            telemetry_interval_ms: 40.0,
            transport: TransportFollow::default(),
            display: DisplaySettings::default(),
        }
    }
}

impl EbuConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| MeterError::InvalidConfig(e.to_string()))?;
        if config.resync_batch == 0 || !config.radar_seconds.is_finite() {
            return Err(MeterError::InvalidConfig(
                "resync batch must be non-zero and radar span finite".to_string(),
            ));
        }
        Ok(config)
    }
}
