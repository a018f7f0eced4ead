//! Goniometer: stereo frames to an observer plus a correlation reading

use super::{drain_controls, is_unity, BlockContext, ProcessOutcome};
use crate::protocol::{ControlKey, EventWriter};
use crate::ring_buffer::{capacity_for, stereo_ring, StereoConsumer, StereoProducer};
use meter_core::{db_to_gain, DspContext, MeterError, Result};
use meter_dsp::deflection::correlation_deflection;
use meter_dsp::Correlation;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GonioOutputs {
    /// -1..1
    pub correlation: f32,
    pub deflection: f32,
}

impl Default for GonioOutputs {
    fn default() -> Self {
        Self {
            correlation: 0.0,
            deflection: 0.5,
        }
    }
}

pub struct GonioProcessor {
    producer: StereoProducer,
    consumer: Option<StereoConsumer>,
    correlation: Correlation,
    gain_db: f32,
    gain: f32,
    ui_active: bool,
    outputs: GonioOutputs,
}

impl GonioProcessor {
    pub fn new(ctx: &DspContext) -> Result<Self> {
        let capacity = capacity_for(ctx.sample_rate());
        let (producer, consumer) = stereo_ring(capacity);
        debug!(sample_rate = ctx.sample_rate(), capacity, "Goniometer created");

        Ok(Self {
            producer,
            consumer: Some(consumer),
            correlation: Correlation::new(ctx),
            gain_db: 0.0,
            gain: 1.0,
            ui_active: false,
            outputs: GonioOutputs::default(),
        })
    }

    /// Hand the read side of the ring to the observer
    ///
    /// # Errors
    /// [`MeterError::ObserverTaken`] on every call after the first.
    pub fn observer(&mut self) -> Result<StereoConsumer> {
        self.consumer.take().ok_or(MeterError::ObserverTaken)
    }

    pub fn outputs(&self) -> &GonioOutputs {
        &self.outputs
    }

    pub fn ui_active(&self) -> bool {
        self.ui_active
    }

    /// Frames the ring had no room for
    pub fn dropped_frames(&self) -> u64 {
        self.producer.dropped_frames()
    }

    /// Run one host block; `gain_db` scales the frames sent to the display
    pub fn process(&mut self, block: &mut BlockContext<'_>, gain_db: f32) -> ProcessOutcome {
        block.pass_through();
        let frames = block.frames();
        let mut writer = EventWriter::new(block.events_out);

        let handled = drain_controls(block.control_in, &mut writer, |message| {
            match message.key {
                ControlKey::MetersOn => self.ui_active = true,
                ControlKey::MetersOff => self.ui_active = false,
                _ => return 0.0,
            }
            f32::from(u8::from(self.ui_active))
        });

        if gain_db.is_finite() && gain_db.to_bits() != self.gain_db.to_bits() {
            self.gain_db = gain_db;
            self.gain = db_to_gain(gain_db);
        }

        let (left, right) = (&block.input[0][..frames], &block.input[1][..frames]);
        self.correlation.process(left, right);
        let correlation = self.correlation.read();
        self.outputs = GonioOutputs {
            correlation,
            deflection: correlation_deflection(correlation),
        };

        if self.ui_active {
            self.send(left, right);
        }

        ProcessOutcome::from_writer(handled, &writer)
    }

    /// The whole block goes into the ring, or none of it
    fn send(&mut self, left: &[f32], right: &[f32]) {
        let _ = if is_unity(self.gain) {
            self.producer.write(left, right)
        } else {
            self.producer.write_scaled(left, right, self.gain)
        };
    }
}

impl std::fmt::Debug for GonioProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GonioProcessor")
            .field("producer", &self.producer)
            .field("observer_taken", &self.consumer.is_none())
            .field("gain_db", &self.gain_db)
            .field("ui_active", &self.ui_active)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_frame, ControlMessage};

    fn run(gonio: &mut GonioProcessor, left: &[f32], right: &[f32], controls: &[u8], gain_db: f32) {
        let mut out_l = vec![0.0; left.len()];
        let mut out_r = vec![0.0; right.len()];
        let mut events = [0u8; 256];
        let _ = gonio.process(
            &mut BlockContext {
                input: [left, right],
                output: [&mut out_l[..], &mut out_r[..]],
                transport_rolling: false,
                control_in: controls,
                events_out: &mut events,
            },
            gain_db,
        );
    }

    fn meters_on() -> Vec<u8> {
        let mut bytes = Vec::new();
        encode_frame(&ControlMessage::command(ControlKey::MetersOn, 1.0), &mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_observer_taken_once() {
        let ctx = DspContext::new(48000, 512).unwrap();
        let mut gonio = GonioProcessor::new(&ctx).unwrap();
        assert!(gonio.observer().is_ok());
        assert!(matches!(gonio.observer(), Err(MeterError::ObserverTaken)));
    }

    #[test]
    fn test_frames_flow_only_while_attached() {
        let ctx = DspContext::new(48000, 512).unwrap();
        let mut gonio = GonioProcessor::new(&ctx).unwrap();
        let mut consumer = gonio.observer().unwrap();
        let block = [0.25_f32; 64];

        run(&mut gonio, &block, &block, &[], 0.0);
        assert_eq!(consumer.read_space(), 0);

        run(&mut gonio, &block, &block, &meters_on(), 0.0);
        assert_eq!(consumer.read_space(), 64);
        assert_eq!(consumer.read_one(), Some((0.25, 0.25)));
    }

    #[test]
    fn test_gain_applies_to_sent_frames() {
        let ctx = DspContext::new(48000, 512).unwrap();
        let mut gonio = GonioProcessor::new(&ctx).unwrap();
        let mut consumer = gonio.observer().unwrap();
        let block = [0.25_f32; 16];

        run(&mut gonio, &block, &block, &meters_on(), 20.0 * 2.0_f32.log10());
        let (l, r) = consumer.read_one().unwrap();
        assert!((l - 0.5).abs() < 1e-4 && (r - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_full_ring_drops_whole_blocks() {
        let ctx = DspContext::new(8000, 1024).unwrap();
        let mut gonio = GonioProcessor::new(&ctx).unwrap();
        let consumer = gonio.observer().unwrap();
        let capacity = consumer.capacity();
        let block = vec![0.1_f32; 1000];

        run(&mut gonio, &block, &block, &meters_on(), 0.0);
        let mut blocks = 1;
        while consumer.read_space() + 1000 < capacity {
            run(&mut gonio, &block, &block, &[], 0.0);
            blocks += 1;
        }
        run(&mut gonio, &block, &block, &[], 0.0);
        assert_eq!(consumer.read_space(), blocks * 1000);
        assert_eq!(gonio.dropped_frames(), 1000);
    }

    #[test]
    fn test_scaled_block_longer_than_max_is_all_or_nothing() {
        let ctx = DspContext::new(8000, 256).unwrap();
        let mut gonio = GonioProcessor::new(&ctx).unwrap();
        let mut consumer = gonio.observer().unwrap();
        let gain_db = 20.0 * 2.0_f32.log10();

        let first = vec![0.1_f32; 1500];
        run(&mut gonio, &first, &first, &meters_on(), gain_db);
        assert_eq!(consumer.read_space(), 1500);

        // 547 frames free: several max-size pieces would fit, the block does not
        let second = vec![0.2_f32; 1000];
        run(&mut gonio, &second, &second, &[], gain_db);
        assert_eq!(consumer.read_space(), 1500);
        assert_eq!(gonio.dropped_frames(), 1000);

        let (l, r) = consumer.read_one().unwrap();
        assert!((l - 0.2).abs() < 1e-4 && (r - 0.2).abs() < 1e-4);
    }

    #[test]
    fn test_correlation_output() {
        let ctx = DspContext::new(48000, 512).unwrap();
        let mut gonio = GonioProcessor::new(&ctx).unwrap();
        let signal: Vec<f32> = (0..480).map(|i| (i as f32 * 0.13).sin()).collect();
        let inverted: Vec<f32> = signal.iter().map(|x| -x).collect();
        for _ in 0..200 {
            run(&mut gonio, &signal, &inverted, &[], 0.0);
        }
        assert!(gonio.outputs().correlation < -0.9);
        assert!(gonio.outputs().deflection < 0.1);
    }
}
