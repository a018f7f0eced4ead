//! Per-plugin processors
//!
//! A processor is built once per plugin instance (the only place it can fail)
//! and then driven with one [`BlockContext`] per host callback. Each block:
//!
//! 1. copies inputs to outputs,
//! 2. drains every control message,
//! 3. runs the DSP,
//! 4. emits telemetry into the bounded event buffer.
//!
//! Nothing in `process` allocates, locks or logs.

mod ebu;
mod gonio;
mod level;

pub use ebu::EbuProcessor;
pub use gonio::{GonioOutputs, GonioProcessor};
pub use level::{LevelMeterProcessor, MeterOutputs, MeterParams};

use crate::protocol::{
    decode_control, looks_like_object, ControlMessage, EventReader, EventWriter, TelemetryEvent,
};

/// Everything the host hands over for one block
///
/// Mono hosts pass the same input slice twice.
#[derive(Debug)]
pub struct BlockContext<'a> {
    pub input: [&'a [f32]; 2],
    pub output: [&'a mut [f32]; 2],
    /// Host transport is playing
    pub transport_rolling: bool,
    /// Framed control messages from the observer
    pub control_in: &'a [u8],
    /// Space for framed telemetry events to the observer
    pub events_out: &'a mut [u8],
}

impl BlockContext<'_> {
    /// Stereo frames in this block
    pub fn frames(&self) -> usize {
        self.input[0].len().min(self.input[1].len())
    }

    /// Copy each input to its output
    pub fn pass_through(&mut self) {
        for (output, input) in self.output.iter_mut().zip(self.input) {
            let n = output.len().min(input.len());
            output[..n].copy_from_slice(&input[..n]);
        }
    }
}

/// What one `process` call did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Control messages decoded and applied
    pub controls_handled: usize,
    /// Events written to the output buffer
    pub events_written: usize,
    /// Events that did not fit and were dropped
    pub events_dropped: usize,
    /// Bytes of the output buffer used
    pub bytes_written: usize,
}

impl ProcessOutcome {
    fn from_writer(controls_handled: usize, writer: &EventWriter<'_>) -> Self {
        Self {
            controls_handled,
            events_written: writer.events_written(),
            events_dropped: writer.events_dropped(),
            bytes_written: writer.bytes_used(),
        }
    }
}

/// Apply every control frame in `control_in`, acknowledging each
///
/// `apply` returns the value actually applied, echoed in the ack. Frames that
/// fail to decode are skipped. Frames that are not JSON objects are dropped
/// before parsing; a malformed object still costs one allocation for the
/// decode error.
fn drain_controls(
    control_in: &[u8],
    writer: &mut EventWriter<'_>,
    mut apply: impl FnMut(&ControlMessage) -> f32,
) -> usize {
    let mut handled = 0;
    for payload in EventReader::new(control_in) {
        if !looks_like_object(payload) {
            continue;
        }
        let Ok(message) = decode_control(payload) else {
            continue;
        };
        let applied = apply(&message);
        let ack = ControlMessage::acknowledge(message.key, applied);
        let _ = writer.write(&TelemetryEvent::ControlAck(ack));
        handled += 1;
    }
    handled
}

/// Unity gain is skipped entirely
fn is_unity(gain: f32) -> bool {
    gain.to_bits() == 1.0_f32.to_bits()
}
