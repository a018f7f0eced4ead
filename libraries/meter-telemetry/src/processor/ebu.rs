//! EBU R128 loudness meter with radar and histogram telemetry

use super::{drain_controls, BlockContext, ProcessOutcome};
use crate::protocol::{ControlKey, ControlMessage, EventWriter, TelemetryEvent, TelemetryRecord};
use crate::state::{PersistedState, StateStore};
use meter_core::{gain_to_db, DisplaySettings, DspContext, EbuConfig, MeterError, Result};
use meter_dsp::ebu::{MAX_RADAR_SECONDS, MIN_RADAR_SECONDS};
use meter_dsp::{LoudnessIntegrator, PeakHold, StereoTruePeak, RADAR_CAPACITY};
use tracing::{debug, info};

pub struct EbuProcessor {
    config: EbuConfig,
    integrator: LoudnessIntegrator,
    true_peak: StereoTruePeak,
    peak_hold: PeakHold,
    /// Highest true peak since the last record
    interval_peak: f32,
    ui_active: bool,
    /// Radar commits already sent to the observer
    radar_sent: u64,
    /// Integrator resets already handled
    resets_seen: u64,
    /// The observer still has to drop its histogram
    histogram_reset_pending: bool,
    record_interval: usize,
    since_record: usize,
}

impl EbuProcessor {
    /// # Errors
    /// Invalid settings, or a filter bank or oversampler that cannot be built.
    pub fn new(ctx: &DspContext, config: EbuConfig) -> Result<Self> {
        if config.resync_batch == 0 || !config.telemetry_interval_ms.is_finite() {
            return Err(MeterError::InvalidConfig(
                "resync batch must be non-zero and telemetry interval finite".to_string(),
            ));
        }
        let mut integrator = LoudnessIntegrator::new(ctx, config.radar_seconds)?;
        integrator.set_transport_follow(config.transport);
        integrator.set_history_enabled(false);

        let record_interval =
            (config.telemetry_interval_ms.max(0.0) * ctx.sample_rate() as f32 / 1000.0) as usize;

        debug!(
            sample_rate = ctx.sample_rate(),
            radar_seconds = config.radar_seconds,
            record_interval,
            "EBU meter created"
        );

        Ok(Self {
            config,
            resets_seen: integrator.reset_count(),
            histogram_reset_pending: false,
            integrator,
            true_peak: StereoTruePeak::new(ctx)?,
            peak_hold: PeakHold::default(),
            interval_peak: 0.0,
            ui_active: false,
            radar_sent: 0,
            record_interval,
            since_record: 0,
        })
    }

    pub fn integrator(&self) -> &LoudnessIntegrator {
        &self.integrator
    }

    pub fn display(&self) -> DisplaySettings {
        self.config.display
    }

    pub fn ui_active(&self) -> bool {
        self.ui_active
    }

    /// Highest true peak since the last reset, dBTP
    pub fn true_peak_hold_db(&self) -> f32 {
        gain_to_db(self.peak_hold.value())
    }

    /// Run one host block
    pub fn process(&mut self, block: &mut BlockContext<'_>) -> ProcessOutcome {
        block.pass_through();
        let frames = block.frames();
        let mut writer = EventWriter::new(block.events_out);

        let handled = drain_controls(block.control_in, &mut writer, |message| {
            self.apply(message)
        });
        self.integrator.transport_changed(block.transport_rolling);
        self.sync_resets();

        let (left, right) = (&block.input[0][..frames], &block.input[1][..frames]);
        self.integrator.process(left, right);
        self.true_peak.process(left, right);

        let peak = self.true_peak.read_max();
        self.interval_peak = self.interval_peak.max(peak);
        self.peak_hold.update(peak);
        self.since_record += frames;

        if self.ui_active {
            self.emit_radar(&mut writer);
            self.emit_histogram(&mut writer);
            self.emit_record(&mut writer);
        }

        ProcessOutcome::from_writer(handled, &writer)
    }

    /// Apply one control message, returning the value in effect afterwards
    fn apply(&mut self, message: &ControlMessage) -> f32 {
        match message.key {
            ControlKey::Start => {
                self.integrator.start();
                1.0
            }
            ControlKey::Pause => {
                self.integrator.pause();
                0.0
            }
            ControlKey::Reset => {
                self.integrator.reset();
                0.0
            }
            ControlKey::FollowTransport => {
                self.config.transport.follow_start_stop = message.enabled();
                self.integrator.set_transport_follow(self.config.transport);
                f32::from(u8::from(message.enabled()))
            }
            ControlKey::AutoReset => {
                self.config.transport.reset_on_restart = message.enabled();
                self.integrator.set_transport_follow(self.config.transport);
                f32::from(u8::from(message.enabled()))
            }
            ControlKey::RadarDuration => {
                let seconds = if message.value.is_finite() {
                    message.value.clamp(MIN_RADAR_SECONDS, MAX_RADAR_SECONDS)
                } else {
                    MIN_RADAR_SECONDS
                };
                self.integrator.set_radar_duration(seconds);
                self.config.radar_seconds = seconds;
                seconds
            }
            ControlKey::MetersOn => {
                self.attach();
                1.0
            }
            ControlKey::MetersOff => {
                self.ui_active = false;
                self.integrator.set_history_enabled(false);
                0.0
            }
            ControlKey::DisplaySettings => {
                let bits = if message.value.is_finite() && message.value >= 0.0 {
                    message.value as u32
                } else {
                    0
                };
                self.config.display = DisplaySettings::from_bits(bits);
                self.config.display.to_bits() as f32
            }
        }
    }

    /// Follow up on integrator resets, whether requested by a control or
    /// made by `start` on a transport restart
    fn sync_resets(&mut self) {
        let resets = self.integrator.reset_count();
        if resets == self.resets_seen {
            return;
        }
        self.resets_seen = resets;
        self.peak_hold.reset();
        self.interval_peak = 0.0;
        self.radar_sent = 0;
        if self.ui_active {
            self.integrator.radar_mut().begin_resync();
            self.histogram_reset_pending = true;
        }
    }

    /// A fresh observer gets the whole radar and every non-empty bin
    fn attach(&mut self) {
        self.ui_active = true;
        self.integrator.set_history_enabled(true);
        self.integrator.radar_mut().begin_resync();
        self.integrator.histogram_mut().mark_all_dirty();
        self.histogram_reset_pending = true;
        self.radar_sent = self.integrator.radar().total_points();
        self.since_record = self.record_interval;
    }

    fn emit_radar(&mut self, writer: &mut EventWriter<'_>) {
        let batch = self.config.resync_batch;
        let radar = self.integrator.radar_mut();
        let (write_pos, capacity) = (radar.write_pos(), radar.capacity());

        if let Some(range) = radar.next_resync_batch(batch) {
            for position in range {
                let point = radar.point(position);
                let _ = writer.write(&TelemetryEvent::RadarPoint {
                    position,
                    momentary: point.momentary,
                    short_term: point.short_term,
                    write_pos,
                    capacity,
                });
            }
        }

        // new commits since the last block; a reset restarts the count
        let total = radar.total_points();
        if total < self.radar_sent {
            self.radar_sent = 0;
        }
        self.radar_sent = self.radar_sent.max(total.saturating_sub(RADAR_CAPACITY as u64));
        while self.radar_sent < total {
            let position = (self.radar_sent % RADAR_CAPACITY as u64) as usize;
            let point = radar.point(position);
            let event = TelemetryEvent::RadarPoint {
                position,
                momentary: point.momentary,
                short_term: point.short_term,
                write_pos,
                capacity,
            };
            if !writer.write(&event).is_written() {
                break;
            }
            self.radar_sent += 1;
        }
    }

    fn emit_histogram(&mut self, writer: &mut EventWriter<'_>) {
        // bins only go out once the observer has cleared its copy
        let cleared = self.histogram_reset_pending;
        if cleared {
            if !writer.write(&TelemetryEvent::HistogramReset).is_written() {
                return;
            }
            self.histogram_reset_pending = false;
        }
        let histogram = self.integrator.histogram_mut();
        let mut sent = 0;
        while sent < self.config.histogram_batch {
            let Some(index) = histogram.next_dirty() else {
                break;
            };
            let event = TelemetryEvent::HistogramPoint {
                index,
                momentary: histogram.momentary(index),
                short_term: histogram.short_term(index),
            };
            if !writer.write(&event).is_written() {
                histogram.mark_dirty(index);
                break;
            }
            sent += 1;
        }
        if sent > 0 || cleared {
            let (max_momentary, max_short_term) = histogram.max_counts();
            let _ = writer.write(&TelemetryEvent::HistogramSummary {
                max_momentary,
                max_short_term,
            });
        }
    }

    /// At most one record per block, no closer than the configured interval
    fn emit_record(&mut self, writer: &mut EventWriter<'_>) {
        if self.since_record < self.record_interval {
            return;
        }
        let record = TelemetryRecord::new(
            &self.integrator.snapshot(),
            gain_to_db(self.interval_peak),
            gain_to_db(self.peak_hold.value()),
        );
        if writer.write(&TelemetryEvent::Loudness(record)).is_written() {
            self.since_record = 0;
            self.interval_peak = 0.0;
        }
    }

    /// Store display and transport settings
    pub fn save_state(&self, store: &mut dyn StateStore) {
        PersistedState {
            display: self.config.display,
            transport: self.config.transport,
        }
        .save(store);
    }

    /// Apply settings saved by a previous session
    pub fn restore_state(&mut self, store: &dyn StateStore) {
        let state = PersistedState::restore(store);
        self.config.display = state.display;
        self.config.transport = state.transport;
        self.integrator.set_transport_follow(state.transport);
        info!(
            follow_transport = state.transport.follow_start_stop,
            auto_reset = state.transport.reset_on_restart,
            "EBU meter state restored"
        );
    }
}

impl std::fmt::Debug for EbuProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EbuProcessor")
            .field("config", &self.config)
            .field("integrator", &self.integrator)
            .field("ui_active", &self.ui_active)
            .field("radar_sent", &self.radar_sent)
            .finish_non_exhaustive()
    }
}
