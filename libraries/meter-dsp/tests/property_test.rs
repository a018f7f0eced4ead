//! Property-based tests for the metering DSP
//!
//! These tests use proptest to verify invariants across many random inputs.

use meter_core::{DetectorKind, DspContext, KSystem};
use meter_dsp::deflection::{deflection, log_meter_deflection};
use meter_dsp::{create_detector, Correlation, MeterScale, Radar, RADAR_CAPACITY};
use proptest::prelude::*;

fn kind_strategy() -> impl Strategy<Value = DetectorKind> {
    prop_oneof![
        Just(DetectorKind::Vu),
        Just(DetectorKind::IecType1),
        Just(DetectorKind::IecType2),
        Just(DetectorKind::KMeter),
        Just(DetectorKind::TruePeak),
    ]
}

fn scale_strategy() -> impl Strategy<Value = MeterScale> {
    prop_oneof![
        Just(MeterScale::Vu),
        Just(MeterScale::IecType1),
        Just(MeterScale::IecType2),
        Just(MeterScale::KMeter(KSystem::K12)),
        Just(MeterScale::KMeter(KSystem::K20)),
        Just(MeterScale::TruePeak),
        Just(MeterScale::Correlation),
    ]
}

/// Samples including the values that break naive filters
fn hostile_sample() -> impl Strategy<Value = f32> {
    prop_oneof![
        8 => -1.0f32..1.0,
        1 => -1.0e6f32..1.0e6,
        1 => Just(f32::NAN),
        1 => Just(f32::INFINITY),
        1 => Just(1.0e-40),
    ]
}

proptest! {
    /// Property: the log scale is 0 at or below -70 dB
    #[test]
    fn log_deflection_floor(db in -1000.0f32..=-70.0) {
        prop_assert_eq!(log_meter_deflection(db), 0.0);
    }

    /// Property: the log scale is 1 at or above +6 dB
    #[test]
    fn log_deflection_ceiling(db in 6.0f32..1000.0) {
        prop_assert_eq!(log_meter_deflection(db), 1.0);
    }

    /// Property: every scale is monotonic and stays in [0, 1]
    #[test]
    fn deflection_monotonic(scale in scale_strategy(), a in -200.0f32..50.0, b in -200.0f32..50.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let (d_lo, d_hi) = (deflection(scale, lo), deflection(scale, hi));
        prop_assert!((0.0..=1.0).contains(&d_lo));
        prop_assert!((0.0..=1.0).contains(&d_hi));
        prop_assert!(d_lo <= d_hi + 1e-6, "{:?}: {} -> {}, {} -> {}", scale, lo, d_lo, hi, d_hi);
    }

    /// Property: published readings are finite whatever the input
    #[test]
    fn detectors_publish_finite_values(
        kind in kind_strategy(),
        samples in prop::collection::vec(hostile_sample(), 1..2000),
        block in 1usize..600
    ) {
        let ctx = DspContext::new(48000, 1024).unwrap();
        let mut detector = create_detector(kind, &ctx).unwrap();
        for chunk in samples.chunks(block) {
            detector.process(chunk);
            prop_assert!(detector.read().is_finite(), "{} published non-finite", kind.name());
        }
        if let Some(peak) = detector.read_peak() {
            prop_assert!(peak.is_finite());
        }
    }

    /// Property: correlation stays in [-1, 1] and reading twice agrees
    #[test]
    fn correlation_bounded(
        left in prop::collection::vec(hostile_sample(), 1..2000),
        right in prop::collection::vec(hostile_sample(), 1..2000)
    ) {
        let ctx = DspContext::new(48000, 1024).unwrap();
        let mut corr = Correlation::new(&ctx);
        corr.process(&left, &right);
        let c = corr.read();
        prop_assert!((-1.0..=1.0).contains(&c));
        prop_assert_eq!(c, corr.read());
    }

    /// Property: the radar keeps exactly the last `capacity` commits
    #[test]
    fn radar_keeps_latest_commits(commits in 0usize..1200) {
        let mut radar = Radar::new(48000, 30.0);
        for i in 0..commits {
            radar.push(i as f32, -(i as f32), 4800);
        }
        prop_assert_eq!(radar.total_points(), commits as u64);
        prop_assert_eq!(radar.wraps(), (commits / RADAR_CAPACITY) as u64);

        let kept: Vec<f32> = radar.latest(RADAR_CAPACITY).map(|(_, p)| p.momentary).collect();
        let start = commits.saturating_sub(RADAR_CAPACITY);
        let expected: Vec<f32> = (start..commits).map(|i| i as f32).collect();
        prop_assert_eq!(kept, expected);
    }
}
