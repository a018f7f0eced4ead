//! Bounded event codec properties

use meter_core::BELOW_FLOOR_LUFS;
use meter_dsp::{IntegratorState, LoudnessSnapshot};
use meter_telemetry::protocol::{
    decode_events, ControlKey, ControlMessage, EventWriter, TelemetryEvent, TelemetryRecord,
    WriteOutcome, MAX_EVENT_BYTES,
};
use proptest::prelude::*;

fn key_strategy() -> impl Strategy<Value = ControlKey> {
    prop_oneof![
        Just(ControlKey::Start),
        Just(ControlKey::Pause),
        Just(ControlKey::Reset),
        Just(ControlKey::FollowTransport),
        Just(ControlKey::AutoReset),
        Just(ControlKey::RadarDuration),
        Just(ControlKey::MetersOn),
        Just(ControlKey::MetersOff),
        Just(ControlKey::DisplaySettings),
    ]
}

fn loudness() -> impl Strategy<Value = f32> {
    prop_oneof![Just(BELOW_FLOOR_LUFS), -70.0f32..5.0]
}

fn event_strategy() -> impl Strategy<Value = TelemetryEvent> {
    prop_oneof![
        (key_strategy(), -1.0e6f32..1.0e6)
            .prop_map(|(key, value)| TelemetryEvent::ControlAck(ControlMessage::acknowledge(key, value))),
        (0usize..360, loudness(), loudness(), 0usize..360).prop_map(|(position, m, s, write_pos)| {
            TelemetryEvent::RadarPoint {
                position,
                momentary: m,
                short_term: s,
                write_pos,
                capacity: 360,
            }
        }),
        (0usize..751, any::<u32>(), any::<u32>()).prop_map(|(index, m, s)| {
            TelemetryEvent::HistogramPoint {
                index,
                momentary: m,
                short_term: s,
            }
        }),
        Just(TelemetryEvent::HistogramReset),
        (loudness(), loudness(), 0.0f32..86_400.0).prop_map(|(m, i, t)| {
            let snapshot = LoudnessSnapshot {
                state: IntegratorState::Integrating,
                momentary: m,
                short_term: m,
                momentary_max: m,
                short_term_max: m,
                integrated: i,
                range: 0.0,
                range_low: BELOW_FLOOR_LUFS,
                range_high: BELOW_FLOOR_LUFS,
                integration_time: t,
            };
            TelemetryEvent::Loudness(TelemetryRecord::new(&snapshot, -1.5, -0.3))
        }),
    ]
}

proptest! {
    /// Property: the writer never exceeds its buffer and the reader returns
    /// exactly the events that were accepted, in order
    #[test]
    fn writer_respects_capacity(
        capacity in 0usize..2048,
        events in prop::collection::vec(event_strategy(), 0..40)
    ) {
        let mut buf = vec![0u8; capacity];
        let mut accepted = Vec::new();
        let used = {
            let mut writer = EventWriter::new(&mut buf);
            for event in &events {
                if writer.write(event) == WriteOutcome::Written {
                    accepted.push(*event);
                }
                prop_assert!(writer.bytes_used() <= capacity);
            }
            prop_assert_eq!(writer.events_written() + writer.events_dropped(), events.len());
            writer.bytes_used()
        };

        let decoded: Vec<_> = decode_events(&buf[..used]).collect();
        prop_assert_eq!(decoded, accepted);
    }

    /// Property: every event fits the scratch buffer
    #[test]
    fn events_fit_scratch(event in event_strategy()) {
        let json = serde_json::to_vec(&event).unwrap();
        prop_assert!(json.len() <= MAX_EVENT_BYTES);
    }
}
