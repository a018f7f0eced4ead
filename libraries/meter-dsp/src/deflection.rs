//! Deflection curves
//!
//! Pure functions mapping a level to a normalized 0..1 indicator position.
//! Each meter family has its own standard-defined scale; the VU-style
//! segmented log curve is shared by every meter that uses VU-like scaling.

use meter_core::KSystem;

/// Internal full-scale value of the segmented log curve
const LOG_SCALE_MAX: f32 = 115.0;

/// IEC Type I (DIN) scale range in dB relative to the reference
const IEC1_BOTTOM_DB: f32 = -50.0;
const IEC1_TOP_DB: f32 = 5.0;

/// IEC Type II (BBC/EBU) scale: linear in dB above the knee
const IEC2_BOTTOM_DB: f32 = -40.0;
const IEC2_KNEE_DB: f32 = -12.0;
const IEC2_TOP_DB: f32 = 12.0;
const IEC2_KNEE_POSITION: f32 = 0.25;

/// K-meter scale extends this far below the 0 mark
const KMETER_SPAN_BELOW_ZERO_DB: f32 = 40.0;

/// True peak scale in dBTP
const TRUE_PEAK_BOTTOM_DB: f32 = -60.0;
const TRUE_PEAK_TOP_DB: f32 = 6.0;

/// Scale selector for [`deflection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterScale {
    Vu,
    IecType1,
    IecType2,
    KMeter(KSystem),
    TruePeak,
    Correlation,
}

#[inline]
fn unit(x: f32) -> f32 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// Segmented logarithmic deflection
///
/// Piecewise-linear approximation of a log response on a 0..115 internal
/// scale: 0 below -70 dB, saturated at +6 dB, steeper towards 0 dB.
pub fn log_meter_deflection(db: f32) -> f32 {
    if db.is_nan() {
        return 0.0;
    }
    let def = if db < -70.0 {
        0.0
    } else if db < -60.0 {
        (db + 70.0) * 0.25
    } else if db < -50.0 {
        (db + 60.0) * 0.5 + 2.5
    } else if db < -40.0 {
        (db + 50.0) * 0.75 + 7.5
    } else if db < -30.0 {
        (db + 40.0) * 1.5 + 15.0
    } else if db < -20.0 {
        (db + 30.0) * 2.0 + 30.0
    } else if db < 6.0 {
        (db + 20.0) * 2.5 + 50.0
    } else {
        LOG_SCALE_MAX
    };
    def / LOG_SCALE_MAX
}

/// VU meter deflection (dB relative to the 0 VU reference)
#[inline]
pub fn vu_deflection(db: f32) -> f32 {
    log_meter_deflection(db)
}

/// IEC Type I (DIN/Nordic) deflection, square-root law on amplitude
pub fn iec1_deflection(db: f32) -> f32 {
    let root = |d: f32| 10.0_f32.powf((d - IEC1_TOP_DB) / 40.0);
    let floor = root(IEC1_BOTTOM_DB);
    unit((root(db.min(IEC1_TOP_DB)) - floor) / (1.0 - floor))
}

/// IEC Type II (BBC/EBU) deflection
///
/// Linear in dB above the -12 dB knee; amplitude-proportional below it down
/// to -40 dB.
pub fn iec2_deflection(db: f32) -> f32 {
    if db.is_nan() || db <= IEC2_BOTTOM_DB {
        return 0.0;
    }
    if db >= IEC2_KNEE_DB {
        let span = IEC2_TOP_DB - IEC2_KNEE_DB;
        return unit(IEC2_KNEE_POSITION + (1.0 - IEC2_KNEE_POSITION) * (db - IEC2_KNEE_DB) / span);
    }
    let amp = |d: f32| 10.0_f32.powf((d - IEC2_KNEE_DB) / 20.0);
    let floor = amp(IEC2_BOTTOM_DB);
    unit(IEC2_KNEE_POSITION * (amp(db) - floor) / (1.0 - floor))
}

/// K-meter deflection for a level in dBFS, linear in dB
pub fn kmeter_deflection(dbfs: f32, k: KSystem) -> f32 {
    let span = k.headroom_db() + KMETER_SPAN_BELOW_ZERO_DB;
    unit((dbfs + span) / span)
}

/// True peak deflection for a level in dBTP, linear in dB
pub fn true_peak_deflection(dbtp: f32) -> f32 {
    unit((dbtp - TRUE_PEAK_BOTTOM_DB) / (TRUE_PEAK_TOP_DB - TRUE_PEAK_BOTTOM_DB))
}

/// Correlation deflection: -1..1 mapped onto 0..1
pub fn correlation_deflection(correlation: f32) -> f32 {
    unit((correlation + 1.0) * 0.5)
}

/// Deflection for `value` on `scale`
///
/// `value` is dB (relative to the meter's reference for VU/IEC, dBFS for
/// K-meters, dBTP for true peak) except for correlation, where it is the
/// coefficient itself.
pub fn deflection(scale: MeterScale, value: f32) -> f32 {
    match scale {
        MeterScale::Vu => vu_deflection(value),
        MeterScale::IecType1 => iec1_deflection(value),
        MeterScale::IecType2 => iec2_deflection(value),
        MeterScale::KMeter(k) => kmeter_deflection(value, k),
        MeterScale::TruePeak => true_peak_deflection(value),
        MeterScale::Correlation => correlation_deflection(value),
    }
}
