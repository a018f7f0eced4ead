//! Level conversions and published sentinels
//!
//! Readings leave the DSP either as linear amplitude or as dB. A published
//! value is never NaN: anything non-finite is replaced before it reaches an
//! observer.

/// Lowest level any meter displays, in dB
pub const LEVEL_FLOOR_DB: f32 = -70.0;

/// EBU R128 absolute gate and display floor, in LUFS
pub const LUFS_FLOOR: f32 = -70.0;

/// Published in place of a loudness that is below the floor or not yet defined
///
/// Finite so that it survives the JSON event codec unchanged.
pub const BELOW_FLOOR_LUFS: f32 = -200.0;

/// Convert linear gain to dB, floored at [`LEVEL_FLOOR_DB`]
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    if !gain.is_finite() || gain <= 0.0 {
        return LEVEL_FLOOR_DB;
    }
    (20.0 * gain.log10()).max(LEVEL_FLOOR_DB)
}

/// Convert dB to linear gain
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Replace a non-finite value with `fallback`
#[inline]
pub fn sanitize(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Map a loudness from the filter bank to a publishable value
///
/// Returns [`BELOW_FLOOR_LUFS`] for -inf, NaN and anything under [`LUFS_FLOOR`].
#[inline]
pub fn lufs_or_sentinel(lufs: f64) -> f32 {
    if lufs.is_finite() && lufs >= f64::from(LUFS_FLOOR) {
        lufs as f32
    } else {
        BELOW_FLOOR_LUFS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_to_db_reference_points() {
        assert!((gain_to_db(1.0) - 0.0).abs() < 1e-6);
        assert!((gain_to_db(0.5) - (-6.0206)).abs() < 1e-3);
        assert_eq!(gain_to_db(0.0), LEVEL_FLOOR_DB);
        assert_eq!(gain_to_db(1e-9), LEVEL_FLOOR_DB);
    }

    #[test]
    fn test_gain_to_db_never_nan() {
        assert_eq!(gain_to_db(f32::NAN), LEVEL_FLOOR_DB);
        assert_eq!(gain_to_db(f32::INFINITY), LEVEL_FLOOR_DB);
        assert_eq!(gain_to_db(-1.0), LEVEL_FLOOR_DB);
    }

    #[test]
    fn test_db_round_trip() {
        for db in [-60.0_f32, -18.0, -6.0, 0.0, 3.0] {
            assert!((gain_to_db(db_to_gain(db)) - db).abs() < 1e-4);
        }
    }

    #[test]
    fn test_lufs_sentinel() {
        assert_eq!(lufs_or_sentinel(f64::NEG_INFINITY), BELOW_FLOOR_LUFS);
        assert_eq!(lufs_or_sentinel(f64::NAN), BELOW_FLOOR_LUFS);
        assert_eq!(lufs_or_sentinel(-75.0), BELOW_FLOOR_LUFS);
        assert!((lufs_or_sentinel(-23.0) - (-23.0)).abs() < 1e-6);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize(f32::NAN, 0.0), 0.0);
        assert_eq!(sanitize(0.25, 0.0), 0.25);
    }
}
