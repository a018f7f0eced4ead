#![allow(dead_code)]

use meter_telemetry::protocol::{decode_events, encode_frame, ControlKey, ControlMessage};
use meter_core::BELOW_FLOOR_LUFS;
use meter_dsp::ebu::HISTOGRAM_BINS;
use meter_dsp::{LoudnessIntegrator, RADAR_CAPACITY};
use meter_telemetry::{BlockContext, EbuProcessor, ProcessOutcome, TelemetryEvent};
use std::f32::consts::PI;
use std::sync::Once;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

pub fn sine(sample_rate: u32, level_dbfs: f32, len: usize) -> Vec<f32> {
    let amplitude = 10.0_f32.powf(level_dbfs / 20.0);
    (0..len)
        .map(|i| amplitude * (2.0 * PI * 1000.0 * i as f32 / sample_rate as f32).sin())
        .collect()
}

pub fn controls(messages: &[(ControlKey, f32)]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for &(key, value) in messages {
        encode_frame(&ControlMessage::command(key, value), &mut bytes).unwrap();
    }
    bytes
}

/// Drives an `EbuProcessor` block by block, collecting decoded events
pub struct EbuHarness {
    pub processor: EbuProcessor,
    pub block: usize,
    pub event_capacity: usize,
    pub rolling: bool,
    out_l: Vec<f32>,
    out_r: Vec<f32>,
    events: Vec<u8>,
}

impl EbuHarness {
    pub fn new(processor: EbuProcessor, block: usize, event_capacity: usize) -> Self {
        Self {
            processor,
            block,
            event_capacity,
            rolling: false,
            out_l: vec![0.0; block],
            out_r: vec![0.0; block],
            events: vec![0; event_capacity],
        }
    }

    /// One block with optional control frames
    pub fn step(&mut self, input: &[f32], control_in: &[u8]) -> (ProcessOutcome, Vec<TelemetryEvent>) {
        let n = input.len();
        let outcome = self.processor.process(&mut BlockContext {
            input: [input, input],
            output: [&mut self.out_l[..n], &mut self.out_r[..n]],
            transport_rolling: self.rolling,
            control_in,
            events_out: &mut self.events[..self.event_capacity],
        });
        let events = decode_events(&self.events[..outcome.bytes_written]).collect();
        (outcome, events)
    }

    /// Feed a whole signal, returning every event emitted along the way
    pub fn feed(&mut self, signal: &[f32]) -> Vec<TelemetryEvent> {
        let mut all = Vec::new();
        for chunk in signal.chunks(self.block) {
            let (_, events) = self.step(chunk, &[]);
            all.extend(events);
        }
        all
    }

    pub fn output(&self) -> (&[f32], &[f32]) {
        (&self.out_l, &self.out_r)
    }
}

/// What a display rebuilds from the event stream alone
pub struct ObserverModel {
    pub radar: Vec<(f32, f32)>,
    pub momentary: Vec<u32>,
    pub short_term: Vec<u32>,
    pub histogram_resets: usize,
}

impl Default for ObserverModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ObserverModel {
    pub fn new() -> Self {
        Self {
            radar: vec![(BELOW_FLOOR_LUFS, BELOW_FLOOR_LUFS); RADAR_CAPACITY],
            momentary: vec![0; HISTOGRAM_BINS],
            short_term: vec![0; HISTOGRAM_BINS],
            histogram_resets: 0,
        }
    }

    pub fn apply(&mut self, events: &[TelemetryEvent]) {
        for event in events {
            match *event {
                TelemetryEvent::RadarPoint {
                    position,
                    momentary,
                    short_term,
                    ..
                } => self.radar[position] = (momentary, short_term),
                TelemetryEvent::HistogramPoint {
                    index,
                    momentary,
                    short_term,
                } => {
                    self.momentary[index] = momentary;
                    self.short_term[index] = short_term;
                }
                TelemetryEvent::HistogramReset => {
                    self.momentary.fill(0);
                    self.short_term.fill(0);
                    self.histogram_resets += 1;
                }
                _ => {}
            }
        }
    }

    /// Panics with the first slot or bin that differs from the integrator
    pub fn assert_matches(&self, integrator: &LoudnessIntegrator) {
        let radar = integrator.radar();
        for (position, &(momentary, short_term)) in self.radar.iter().enumerate() {
            let point = radar.point(position);
            assert!(
                (point.momentary - momentary).abs() < 1e-3 && (point.short_term - short_term).abs() < 1e-3,
                "radar slot {}: dsp {:?}, observer ({}, {})",
                position,
                point,
                momentary,
                short_term
            );
        }
        let histogram = integrator.histogram();
        for bin in 0..HISTOGRAM_BINS {
            assert_eq!(
                (histogram.momentary(bin), histogram.short_term(bin)),
                (self.momentary[bin], self.short_term[bin]),
                "histogram bin {}",
                bin
            );
        }
    }
}
