use super::histogram::LoudnessHistogram;
use super::radar::Radar;
use super::range::LoudnessRange;
use super::{IntegratorState, LoudnessSnapshot};
use ebur128::{EbuR128, Mode};
use meter_core::{lufs_or_sentinel, DspContext, MeterError, Result, TransportFollow, BELOW_FLOOR_LUFS};

/// Integrated loudness needs at least one full 400 ms gating block
const MIN_INTEGRATION_SECONDS: f64 = 0.4;

/// Short-term readings count toward LRA once the 3 s window is full
const RANGE_START_SECONDS: f64 = 3.0;

/// EBU R128 stereo loudness integrator
///
/// Two BS.1770 filter banks run side by side. The live bank always sees
/// audio and drives momentary and short-term loudness. The gated bank only
/// sees audio while integrating, so pausing freezes integrated loudness.
///
/// Outputs are sampled every 100 ms of audio, independent of host block
/// size.
pub struct LoudnessIntegrator {
    live: EbuR128,
    gated: EbuR128,
    sample_rate: u32,
    step_len: usize,
    step_pos: usize,

    state: IntegratorState,
    transport: TransportFollow,
    was_rolling: bool,
    history_enabled: bool,

    momentary: f32,
    short_term: f32,
    momentary_max: f32,
    short_term_max: f32,
    integrated: f32,
    integrated_samples: u64,
    resets: u64,

    range: LoudnessRange,
    radar: Radar,
    histogram: LoudnessHistogram,
}

impl LoudnessIntegrator {
    /// # Errors
    /// Returns [`MeterError::Loudness`] if the filter bank rejects the rate.
    pub fn new(ctx: &DspContext, radar_seconds: f32) -> Result<Self> {
        let sample_rate = ctx.sample_rate();
        let live = EbuR128::new(2, sample_rate, Mode::M | Mode::S)
            .map_err(|e| MeterError::Loudness(format!("live filter bank: {}", e)))?;
        let gated = EbuR128::new(2, sample_rate, Mode::I | Mode::HISTOGRAM)
            .map_err(|e| MeterError::Loudness(format!("gated filter bank: {}", e)))?;

        tracing::debug!(
            "Loudness integrator ready: {} Hz, radar {} s",
            sample_rate,
            radar_seconds
        );

        Ok(Self {
            live,
            gated,
            sample_rate,
            step_len: (sample_rate / 10) as usize,
            step_pos: 0,
            state: IntegratorState::Idle,
            transport: TransportFollow::default(),
            was_rolling: false,
            history_enabled: true,
            momentary: BELOW_FLOOR_LUFS,
            short_term: BELOW_FLOOR_LUFS,
            momentary_max: BELOW_FLOOR_LUFS,
            short_term_max: BELOW_FLOOR_LUFS,
            integrated: BELOW_FLOOR_LUFS,
            integrated_samples: 0,
            resets: 0,
            range: LoudnessRange::new(),
            radar: Radar::new(sample_rate, radar_seconds),
            histogram: LoudnessHistogram::new(),
        })
    }

    /// Feed one block of stereo audio
    ///
    /// Only the common prefix is used when the channel lengths differ.
    pub fn process(&mut self, left: &[f32], right: &[f32]) {
        let frames = left.len().min(right.len());
        let mut offset = 0;

        while offset < frames {
            let n = (self.step_len - self.step_pos).min(frames - offset);
            let chunk = [&left[offset..offset + n], &right[offset..offset + n]];

            // Filter bank errors only arise from malformed input shapes
            let _ = self.live.add_frames_planar_f32(&chunk);
            if self.state == IntegratorState::Integrating {
                let _ = self.gated.add_frames_planar_f32(&chunk);
                self.integrated_samples += n as u64;
            }

            offset += n;
            self.step_pos += n;
            if self.step_pos == self.step_len {
                self.step_pos = 0;
                self.analysis_step();
            }
        }
    }

    fn analysis_step(&mut self) {
        self.momentary = lufs_or_sentinel(self.live.loudness_momentary().unwrap_or(f64::NEG_INFINITY));
        self.short_term = lufs_or_sentinel(self.live.loudness_shortterm().unwrap_or(f64::NEG_INFINITY));

        if self.state != IntegratorState::Integrating {
            return;
        }

        self.momentary_max = self.momentary_max.max(self.momentary);
        self.short_term_max = self.short_term_max.max(self.short_term);

        let seconds = self.integration_seconds();
        self.integrated = if seconds >= MIN_INTEGRATION_SECONDS {
            lufs_or_sentinel(self.gated.loudness_global().unwrap_or(f64::NEG_INFINITY))
        } else {
            BELOW_FLOOR_LUFS
        };

        if seconds >= RANGE_START_SECONDS {
            self.range.add(self.short_term);
        }

        if self.history_enabled {
            self.histogram.add(self.momentary, self.short_term);
            self.radar.push(self.momentary, self.short_term, self.step_len);
        }
    }

    fn integration_seconds(&self) -> f64 {
        self.integrated_samples as f64 / f64::from(self.sample_rate)
    }

    /// Begin or resume integrating
    pub fn start(&mut self) {
        if self.state == IntegratorState::Integrating {
            return;
        }
        if self.transport.reset_on_restart {
            self.reset();
        }
        self.state = IntegratorState::Integrating;
    }

    /// Stop integrating; live loudness keeps updating
    pub fn pause(&mut self) {
        if self.state == IntegratorState::Integrating {
            self.state = IntegratorState::Paused;
        }
    }

    /// Clear every accumulated result; the run state is unchanged
    pub fn reset(&mut self) {
        self.gated.reset();
        self.momentary_max = BELOW_FLOOR_LUFS;
        self.short_term_max = BELOW_FLOOR_LUFS;
        self.integrated = BELOW_FLOOR_LUFS;
        self.integrated_samples = 0;
        self.range.reset();
        self.radar.reset();
        self.histogram.reset();
        self.resets += 1;
    }

    /// Resets so far, including those made by `start` on a transport restart
    pub fn reset_count(&self) -> u64 {
        self.resets
    }

    pub fn set_transport_follow(&mut self, follow: TransportFollow) {
        self.transport = follow;
    }

    pub fn transport_follow(&self) -> TransportFollow {
        self.transport
    }

    /// Report the host transport state; edges start or pause when following
    pub fn transport_changed(&mut self, rolling: bool) {
        let was_rolling = std::mem::replace(&mut self.was_rolling, rolling);
        if !self.transport.follow_start_stop || rolling == was_rolling {
            return;
        }
        if rolling {
            self.start();
        } else {
            self.pause();
        }
    }

    /// Whether radar and histogram accumulate while integrating
    pub fn set_history_enabled(&mut self, enabled: bool) {
        self.history_enabled = enabled;
    }

    pub fn set_radar_duration(&mut self, seconds: f32) {
        self.radar.set_duration(seconds);
    }

    pub fn state(&self) -> IntegratorState {
        self.state
    }

    pub fn momentary(&self) -> f32 {
        self.momentary
    }

    pub fn short_term(&self) -> f32 {
        self.short_term
    }

    pub fn momentary_max(&self) -> f32 {
        self.momentary_max
    }

    pub fn short_term_max(&self) -> f32 {
        self.short_term_max
    }

    /// Gated integrated loudness, sentinel until 400 ms have been integrated
    pub fn integrated(&self) -> f32 {
        self.integrated
    }

    pub fn loudness_range(&self) -> f32 {
        self.range.range()
    }

    pub fn range_low(&self) -> f32 {
        self.range.low()
    }

    pub fn range_high(&self) -> f32 {
        self.range.high()
    }

    /// Seconds of audio integrated since the last reset
    pub fn integration_time(&self) -> f32 {
        self.integration_seconds() as f32
    }

    pub fn radar(&self) -> &Radar {
        &self.radar
    }

    pub fn radar_mut(&mut self) -> &mut Radar {
        &mut self.radar
    }

    pub fn histogram(&self) -> &LoudnessHistogram {
        &self.histogram
    }

    pub fn histogram_mut(&mut self) -> &mut LoudnessHistogram {
        &mut self.histogram
    }

    pub fn snapshot(&self) -> LoudnessSnapshot {
        LoudnessSnapshot {
            state: self.state,
            momentary: self.momentary,
            short_term: self.short_term,
            momentary_max: self.momentary_max,
            short_term_max: self.short_term_max,
            integrated: self.integrated,
            range: self.range.range(),
            range_low: self.range.low(),
            range_high: self.range.high(),
            integration_time: self.integration_time(),
        }
    }
}

impl std::fmt::Debug for LoudnessIntegrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoudnessIntegrator")
            .field("sample_rate", &self.sample_rate)
            .field("state", &self.state)
            .field("transport", &self.transport)
            .field("momentary", &self.momentary)
            .field("integrated", &self.integrated)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integrator() -> LoudnessIntegrator {
        let ctx = DspContext::new(48000, 4800).unwrap();
        LoudnessIntegrator::new(&ctx, 120.0).unwrap()
    }

    fn tone(seconds: f32) -> Vec<f32> {
        let len = (seconds * 48000.0) as usize;
        (0..len)
            .map(|i| 0.1 * (std::f32::consts::TAU * 1000.0 * i as f32 / 48000.0).sin())
            .collect()
    }

    fn feed(meter: &mut LoudnessIntegrator, signal: &[f32]) {
        for block in signal.chunks(1000) {
            meter.process(block, block);
        }
    }

    #[test]
    fn test_starts_idle_with_sentinels() {
        let meter = integrator();
        assert_eq!(meter.state(), IntegratorState::Idle);
        assert_eq!(meter.integrated(), BELOW_FLOOR_LUFS);
        assert_eq!(meter.momentary(), BELOW_FLOOR_LUFS);
    }

    #[test]
    fn test_idle_updates_live_only() {
        let mut meter = integrator();
        feed(&mut meter, &tone(1.0));
        assert!(meter.momentary() > -40.0);
        assert_eq!(meter.integrated(), BELOW_FLOOR_LUFS);
        assert_eq!(meter.momentary_max(), BELOW_FLOOR_LUFS);
        assert_eq!(meter.integration_time(), 0.0);
    }

    #[test]
    fn test_start_pause_cycle() {
        let mut meter = integrator();
        meter.start();
        feed(&mut meter, &tone(2.0));
        assert_eq!(meter.state(), IntegratorState::Integrating);
        assert!(meter.integrated() > -40.0);
        assert!((meter.integration_time() - 2.0).abs() < 1e-3);

        meter.pause();
        assert_eq!(meter.state(), IntegratorState::Paused);
        meter.start();
        assert_eq!(meter.state(), IntegratorState::Integrating);
    }

    #[test]
    fn test_reset_on_restart() {
        let mut meter = integrator();
        meter.set_transport_follow(TransportFollow {
            follow_start_stop: false,
            reset_on_restart: true,
        });
        meter.start();
        feed(&mut meter, &tone(1.0));
        meter.pause();
        assert!(meter.integration_time() > 0.9);
        meter.start();
        assert_eq!(meter.integration_time(), 0.0);
    }

    #[test]
    fn test_transport_restart_counts_reset() {
        let mut meter = integrator();
        meter.set_transport_follow(TransportFollow {
            follow_start_stop: true,
            reset_on_restart: true,
        });
        meter.transport_changed(true);
        let first = meter.reset_count();
        feed(&mut meter, &tone(0.5));
        meter.transport_changed(false);
        assert_eq!(meter.reset_count(), first);

        meter.transport_changed(true);
        assert_eq!(meter.reset_count(), first + 1);
        assert_eq!(meter.radar().total_points(), 0);
        assert_eq!(meter.histogram().max_counts(), (0, 0));
    }

    #[test]
    fn test_transport_edges() {
        let mut meter = integrator();
        meter.transport_changed(true);
        assert_eq!(meter.state(), IntegratorState::Idle);

        meter.set_transport_follow(TransportFollow {
            follow_start_stop: true,
            reset_on_restart: false,
        });
        meter.transport_changed(false);
        meter.transport_changed(true);
        assert_eq!(meter.state(), IntegratorState::Integrating);
        meter.transport_changed(true);
        assert_eq!(meter.state(), IntegratorState::Integrating);
        meter.transport_changed(false);
        assert_eq!(meter.state(), IntegratorState::Paused);
    }

    #[test]
    fn test_history_gate() {
        let mut meter = integrator();
        meter.set_history_enabled(false);
        meter.start();
        feed(&mut meter, &tone(1.0));
        assert_eq!(meter.histogram().max_counts(), (0, 0));

        meter.set_history_enabled(true);
        feed(&mut meter, &tone(1.0));
        assert!(meter.histogram().max_counts().0 > 0);
    }
}
