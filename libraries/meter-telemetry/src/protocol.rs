//! Control and telemetry protocol
//!
//! Events travel as JSON payloads framed by a little-endian `u16` length.
//! The audio thread encodes into a fixed scratch buffer and copies a frame
//! into the host's event buffer only when the whole frame fits, so a block
//! never writes past the capacity it was given.

use meter_core::{MeterError, Result};
use meter_dsp::{IntegratorState, LoudnessSnapshot};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Bumped whenever a field of [`TelemetryRecord`] changes meaning
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest encoded payload of a single event
pub const MAX_EVENT_BYTES: usize = 512;

const LENGTH_PREFIX: usize = 2;

/// Commands understood by the processors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKey {
    /// Begin or resume loudness integration
    Start,
    /// Pause loudness integration
    Pause,
    /// Clear integrated results
    Reset,
    /// Follow host transport start/stop (value > 0.5 enables)
    FollowTransport,
    /// Reset whenever integration restarts (value > 0.5 enables)
    AutoReset,
    /// Radar history span in seconds
    RadarDuration,
    /// An observer attached
    MetersOn,
    /// The observer detached
    MetersOff,
    /// Display toggles as a bitmask
    DisplaySettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageTopic {
    /// Observer to DSP
    Command,
    /// DSP to observer, echoing the applied value
    Acknowledge,
}

/// A tagged key/value pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub topic: MessageTopic,
    pub key: ControlKey,
    pub value: f32,
}

impl ControlMessage {
    pub fn command(key: ControlKey, value: f32) -> Self {
        Self {
            topic: MessageTopic::Command,
            key,
            value,
        }
    }

    /// Acknowledgement carrying the value actually applied
    pub fn acknowledge(key: ControlKey, value: f32) -> Self {
        Self {
            topic: MessageTopic::Acknowledge,
            key,
            value,
        }
    }

    /// Boolean reading of `value`
    pub fn enabled(&self) -> bool {
        self.value > 0.5
    }
}

/// Loudness readings pushed to the observer at a bounded rate
///
/// Loudness fields are LUFS (LU for the range fields) with
/// [`BELOW_FLOOR_LUFS`](meter_core::BELOW_FLOOR_LUFS) standing in for "no
/// data". True peak fields are dBTP.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub version: u32,
    pub state: IntegratorState,
    pub momentary: f32,
    pub short_term: f32,
    pub momentary_max: f32,
    pub short_term_max: f32,
    pub integrated: f32,
    pub range: f32,
    pub range_low: f32,
    pub range_high: f32,
    /// Seconds of integrated audio
    pub integration_time: f32,
    /// Highest true peak since the previous record
    pub true_peak: f32,
    /// Highest true peak since the last reset
    pub true_peak_hold: f32,
}

impl TelemetryRecord {
    pub fn new(snapshot: &LoudnessSnapshot, true_peak: f32, true_peak_hold: f32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            state: snapshot.state,
            momentary: snapshot.momentary,
            short_term: snapshot.short_term,
            momentary_max: snapshot.momentary_max,
            short_term_max: snapshot.short_term_max,
            integrated: snapshot.integrated,
            range: snapshot.range,
            range_low: snapshot.range_low,
            range_high: snapshot.range_high,
            integration_time: snapshot.integration_time,
            true_peak,
            true_peak_hold,
        }
    }
}

/// Everything the DSP side emits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// A control message was applied
    ControlAck(ControlMessage),

    /// Periodic loudness readings
    Loudness(TelemetryRecord),

    /// One radar slot, with enough ring geometry for a fresh observer to
    /// orient itself
    RadarPoint {
        position: usize,
        momentary: f32,
        short_term: f32,
        write_pos: usize,
        capacity: usize,
    },

    /// Counts of one histogram bin
    HistogramPoint {
        index: usize,
        momentary: u32,
        short_term: u32,
    },

    /// Every bin is back to zero; sent before any bin after a reset or attach
    HistogramReset,

    /// Largest bin counts, for scaling the histogram display
    HistogramSummary {
        max_momentary: u32,
        max_short_term: u32,
    },

    /// Level meter readings for up to two channels
    Levels {
        level_db: [f32; 2],
        deflection: [f32; 2],
        peak_db: [f32; 2],
        peak_hold_db: f32,
    },
}

/// Result of a bounded write
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Did not fit in the remaining capacity; nothing was written
    Dropped,
}

impl WriteOutcome {
    pub fn is_written(self) -> bool {
        self == Self::Written
    }
}

/// Bounded frame writer over a host-provided event buffer
///
/// Never allocates and never writes a partial frame.
pub struct EventWriter<'a> {
    buf: &'a mut [u8],
    used: usize,
    written: usize,
    dropped: usize,
    scratch: [u8; MAX_EVENT_BYTES],
}

impl<'a> EventWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            used: 0,
            written: 0,
            dropped: 0,
            scratch: [0; MAX_EVENT_BYTES],
        }
    }

    /// Encode `event` and append it if the framed bytes fit
    pub fn write<T: Serialize>(&mut self, event: &T) -> WriteOutcome {
        let len = {
            let mut cursor: &mut [u8] = &mut self.scratch;
            if serde_json::to_writer(&mut cursor, event).is_err() {
                self.dropped += 1;
                return WriteOutcome::Dropped;
            }
            MAX_EVENT_BYTES - cursor.len()
        };
        let Ok(prefix) = u16::try_from(len) else {
            self.dropped += 1;
            return WriteOutcome::Dropped;
        };

        let needed = LENGTH_PREFIX + len;
        if needed > self.remaining() {
            self.dropped += 1;
            return WriteOutcome::Dropped;
        }

        let start = self.used;
        self.buf[start..start + LENGTH_PREFIX].copy_from_slice(&prefix.to_le_bytes());
        self.buf[start + LENGTH_PREFIX..start + needed].copy_from_slice(&self.scratch[..len]);
        self.used += needed;
        self.written += 1;
        WriteOutcome::Written
    }

    pub fn bytes_used(&self) -> usize {
        self.used
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.used
    }

    pub fn events_written(&self) -> usize {
        self.written
    }

    pub fn events_dropped(&self) -> usize {
        self.dropped
    }
}

impl std::fmt::Debug for EventWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventWriter")
            .field("capacity", &self.buf.len())
            .field("used", &self.used)
            .field("written", &self.written)
            .field("dropped", &self.dropped)
            .finish()
    }
}

/// Iterator over the payloads of a framed event buffer
///
/// Stops at the first truncated frame.
#[derive(Debug, Clone)]
pub struct EventReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> EventReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }
}

impl<'a> Iterator for EventReader<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.buf.get(self.pos..)?;
        if rest.len() < LENGTH_PREFIX {
            return None;
        }
        let len = usize::from(u16::from_le_bytes([rest[0], rest[1]]));
        let Some(payload) = rest.get(LENGTH_PREFIX..LENGTH_PREFIX + len) else {
            self.pos = self.buf.len();
            return None;
        };
        self.pos += LENGTH_PREFIX + len;
        Some(payload)
    }
}

/// Append one framed event to `out`; observer side only, allocates
pub fn encode_frame<T: Serialize>(event: &T, out: &mut Vec<u8>) -> Result<()> {
    let payload = serde_json::to_vec(event)?;
    if payload.len() > MAX_EVENT_BYTES {
        return Err(MeterError::Codec(format!(
            "event of {} bytes exceeds the {} byte limit",
            payload.len(),
            MAX_EVENT_BYTES
        )));
    }
    let len = u16::try_from(payload.len()).map_err(|e| MeterError::Codec(e.to_string()))?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(())
}

/// Cheap shape check run before parsing on the audio thread
///
/// Rejects empty, oversized and non-object frames without touching
/// `serde_json`, whose errors are heap allocated.
pub fn looks_like_object(payload: &[u8]) -> bool {
    let is_space = |b: &u8| b.is_ascii_whitespace();
    let first = payload.iter().find(|b| !is_space(b));
    let last = payload.iter().rev().find(|b| !is_space(b));
    payload.len() <= MAX_EVENT_BYTES && first == Some(&b'{') && last == Some(&b'}')
}

pub fn decode_control(payload: &[u8]) -> Result<ControlMessage> {
    Ok(serde_json::from_slice(payload)?)
}

pub fn decode_event(payload: &[u8]) -> Result<TelemetryEvent> {
    Ok(serde_json::from_slice(payload)?)
}

/// Decode every event in a block's output, skipping malformed frames
pub fn decode_events(bytes: &[u8]) -> impl Iterator<Item = TelemetryEvent> + '_ {
    EventReader::new(bytes).filter_map(|payload| match decode_event(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, len = payload.len(), "Skipping undecodable telemetry event");
            None
        }
    })
}
