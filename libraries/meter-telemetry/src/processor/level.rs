//! Needle and bar meters: VU, IEC PPM, K-meter, true peak

use super::{drain_controls, is_unity, BlockContext, ProcessOutcome};
use crate::protocol::{ControlKey, EventWriter, TelemetryEvent};
use meter_core::{
    db_to_gain, gain_to_db, DetectorKind, DspContext, MeterConfig, Result, LEVEL_FLOOR_DB,
};
use meter_dsp::deflection::deflection;
use meter_dsp::{create_detector, LevelDetector, MeterScale, PeakHold};
use tracing::debug;

/// Parameter ports, read once per block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterParams {
    pub input_gain_db: f32,
    /// Level in dBFS that reads as the 0 mark
    pub reference_db: f32,
}

impl From<&MeterConfig> for MeterParams {
    fn from(config: &MeterConfig) -> Self {
        Self {
            input_gain_db: config.input_gain_db,
            reference_db: config.reference_db,
        }
    }
}

/// Per-channel readings after a block
///
/// `level_db` is relative to the reference for VU and IEC meters and dBFS
/// (dBTP) for K-meters and true peak. Unused channels read the floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterOutputs {
    pub level_db: [f32; 2],
    /// Indicator position, 0..1
    pub deflection: [f32; 2],
    /// Peak since the previous block: K-meter peak leg or true peak
    pub peak_db: [f32; 2],
    /// Highest true peak since the last reset, either channel
    pub peak_hold_db: f32,
}

impl Default for MeterOutputs {
    fn default() -> Self {
        Self {
            level_db: [LEVEL_FLOOR_DB; 2],
            deflection: [0.0; 2],
            peak_db: [LEVEL_FLOOR_DB; 2],
            peak_hold_db: LEVEL_FLOOR_DB,
        }
    }
}

pub struct LevelMeterProcessor {
    config: MeterConfig,
    scale: MeterScale,
    detectors: Vec<Box<dyn LevelDetector>>,
    scratch: Vec<f32>,
    params: MeterParams,
    gain: f32,
    peak_hold: PeakHold,
    ui_active: bool,
    outputs: MeterOutputs,
}

impl LevelMeterProcessor {
    /// # Errors
    /// Invalid configuration or a true peak oversampler that cannot be built.
    pub fn new(ctx: &DspContext, config: MeterConfig) -> Result<Self> {
        config.validate()?;
        let detectors = (0..config.channels)
            .map(|_| create_detector(config.kind, ctx))
            .collect::<Result<Vec<_>>>()?;
        let params = MeterParams::from(&config);

        debug!(
            kind = config.kind.name(),
            channels = config.channels,
            sample_rate = ctx.sample_rate(),
            "Level meter created"
        );

        Ok(Self {
            scale: scale_for(&config),
            config,
            detectors,
            scratch: vec![0.0; ctx.max_block_size()],
            gain: db_to_gain(params.input_gain_db),
            params,
            peak_hold: PeakHold::default(),
            ui_active: false,
            outputs: MeterOutputs::default(),
        })
    }

    pub fn config(&self) -> &MeterConfig {
        &self.config
    }

    pub fn outputs(&self) -> &MeterOutputs {
        &self.outputs
    }

    pub fn ui_active(&self) -> bool {
        self.ui_active
    }

    pub fn reset(&mut self) {
        for detector in &mut self.detectors {
            detector.reset();
        }
        self.peak_hold.reset();
        self.outputs = MeterOutputs::default();
    }

    /// Run one host block
    pub fn process(&mut self, block: &mut BlockContext<'_>, params: MeterParams) -> ProcessOutcome {
        block.pass_through();
        let mut writer = EventWriter::new(block.events_out);

        let handled = drain_controls(block.control_in, &mut writer, |message| {
            match message.key {
                ControlKey::MetersOn => self.ui_active = true,
                ControlKey::MetersOff => self.ui_active = false,
                ControlKey::Reset => {
                    self.peak_hold.reset();
                    return 0.0;
                }
                _ => return 0.0,
            }
            if self.ui_active {
                1.0
            } else {
                0.0
            }
        });

        self.update_params(params);

        for (channel, detector) in self.detectors.iter_mut().enumerate() {
            feed(detector.as_mut(), block.input[channel], self.gain, &mut self.scratch);
        }
        self.publish();

        if self.ui_active {
            let _ = writer.write(&TelemetryEvent::Levels {
                level_db: self.outputs.level_db,
                deflection: self.outputs.deflection,
                peak_db: self.outputs.peak_db,
                peak_hold_db: self.outputs.peak_hold_db,
            });
        }

        ProcessOutcome::from_writer(handled, &writer)
    }

    /// Recompute derived values only for ports that moved
    fn update_params(&mut self, params: MeterParams) {
        if params.input_gain_db.to_bits() != self.params.input_gain_db.to_bits()
            && params.input_gain_db.is_finite()
        {
            self.params.input_gain_db = params.input_gain_db;
            self.gain = db_to_gain(params.input_gain_db);
        }
        if params.reference_db.is_finite() {
            self.params.reference_db = params.reference_db;
        }
    }

    fn publish(&mut self) {
        let kind = self.config.kind;
        let relative = matches!(
            kind,
            DetectorKind::Vu | DetectorKind::IecType1 | DetectorKind::IecType2
        );
        let mut outputs = MeterOutputs {
            peak_hold_db: self.outputs.peak_hold_db,
            ..MeterOutputs::default()
        };

        for (channel, detector) in self.detectors.iter_mut().enumerate() {
            let level = detector.read();
            let dbfs = gain_to_db(level);
            let peak = match kind {
                DetectorKind::TruePeak => Some(level),
                _ => detector.read_peak(),
            };

            // at the floor the needle rests regardless of reference
            let shown = if relative {
                dbfs - self.params.reference_db
            } else {
                dbfs
            };
            outputs.level_db[channel] = shown;
            outputs.deflection[channel] = if dbfs <= LEVEL_FLOOR_DB {
                0.0
            } else {
                deflection(self.scale, shown)
            };

            if let Some(peak) = peak {
                outputs.peak_db[channel] = gain_to_db(peak);
                if kind == DetectorKind::TruePeak {
                    outputs.peak_hold_db = gain_to_db(self.peak_hold.update(peak));
                }
            }
        }
        self.outputs = outputs;
    }
}

/// Process `input` through `detector`, applying `gain` via `scratch`
fn feed(detector: &mut dyn LevelDetector, input: &[f32], gain: f32, scratch: &mut [f32]) {
    if is_unity(gain) {
        detector.process(input);
        return;
    }
    for chunk in input.chunks(scratch.len().max(1)) {
        let gained = &mut scratch[..chunk.len()];
        for (out, &x) in gained.iter_mut().zip(chunk) {
            *out = x * gain;
        }
        detector.process(gained);
    }
}

fn scale_for(config: &MeterConfig) -> MeterScale {
    match config.kind {
        DetectorKind::Vu => MeterScale::Vu,
        DetectorKind::IecType1 => MeterScale::IecType1,
        DetectorKind::IecType2 => MeterScale::IecType2,
        DetectorKind::KMeter => MeterScale::KMeter(config.k_system),
        DetectorKind::TruePeak => MeterScale::TruePeak,
    }
}

impl std::fmt::Debug for LevelMeterProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelMeterProcessor")
            .field("config", &self.config)
            .field("params", &self.params)
            .field("ui_active", &self.ui_active)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}
