//! Level Meters Telemetry
//!
//! The cross-thread half of the meter family: everything between the audio
//! callback and an observer that draws the results.
//!
//! - **Ring buffer**: SPSC stereo frames for goniometer displays
//! - **Protocol**: control messages in, bounded telemetry events out
//! - **Processors**: one per plugin, each driven once per host block
//! - **State**: settings persisted through the host's key/value store
//!
//! # Example
//!
//! ```rust
//! use meter_core::{DspContext, EbuConfig};
//! use meter_telemetry::processor::{BlockContext, EbuProcessor};
//! use meter_telemetry::protocol::{encode_frame, ControlKey, ControlMessage};
//!
//! let ctx = DspContext::new(48000, 512).unwrap();
//! let mut ebu = EbuProcessor::new(&ctx, EbuConfig::default()).unwrap();
//!
//! let mut controls = Vec::new();
//! encode_frame(&ControlMessage::command(ControlKey::Start, 1.0), &mut controls).unwrap();
//!
//! let input = vec![0.0_f32; 512];
//! let (mut out_l, mut out_r) = (vec![0.0_f32; 512], vec![0.0_f32; 512]);
//! let mut events = [0u8; 4096];
//! let outcome = ebu.process(&mut BlockContext {
//!     input: [&input[..], &input[..]],
//!     output: [&mut out_l[..], &mut out_r[..]],
//!     transport_rolling: false,
//!     control_in: &controls,
//!     events_out: &mut events,
//! });
//! assert_eq!(outcome.controls_handled, 1);
//! ```

#![forbid(unsafe_code)]

pub mod processor;
pub mod protocol;
pub mod ring_buffer;
pub mod state;

pub use processor::{
    BlockContext, EbuProcessor, GonioOutputs, GonioProcessor, LevelMeterProcessor, MeterOutputs,
    MeterParams, ProcessOutcome,
};
pub use protocol::{
    decode_control, decode_event, decode_events, encode_frame, ControlKey, ControlMessage,
    EventReader, EventWriter, MessageTopic, TelemetryEvent, TelemetryRecord, WriteOutcome,
    MAX_EVENT_BYTES, PROTOCOL_VERSION,
};
pub use ring_buffer::{capacity_for, stereo_ring, StereoConsumer, StereoProducer};
pub use state::{MemoryStateStore, PersistedState, StateStore};
