//! Loudness radar history
//!
//! A fixed ring of [`RADAR_CAPACITY`] slots. Each slot holds the largest
//! momentary and short-term loudness seen while it was open; a slot closes
//! once `samples_per_point` samples have been accounted to it.

use meter_core::BELOW_FLOOR_LUFS;
use std::ops::Range;

/// Slots in one revolution of the radar
pub const RADAR_CAPACITY: usize = 360;

/// Shortest and longest selectable radar history in seconds
pub const MIN_RADAR_SECONDS: f32 = 30.0;
pub const MAX_RADAR_SECONDS: f32 = 86_400.0;

/// One committed radar slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadarPoint {
    pub momentary: f32,
    pub short_term: f32,
}

impl RadarPoint {
    const EMPTY: Self = Self {
        momentary: BELOW_FLOOR_LUFS,
        short_term: BELOW_FLOOR_LUFS,
    };
}

impl Default for RadarPoint {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[derive(Debug, Clone)]
pub struct Radar {
    points: Vec<RadarPoint>,
    write_pos: usize,
    total_points: u64,
    sample_rate: u32,
    samples_per_point: usize,
    accumulated: usize,
    open: RadarPoint,
    resync: Option<usize>,
}

impl Radar {
    pub fn new(sample_rate: u32, seconds: f32) -> Self {
        let mut radar = Self {
            points: vec![RadarPoint::EMPTY; RADAR_CAPACITY],
            write_pos: 0,
            total_points: 0,
            sample_rate,
            samples_per_point: 0,
            accumulated: 0,
            open: RadarPoint::EMPTY,
            resync: None,
        };
        radar.set_duration(seconds);
        radar
    }

    /// Change the history span; committed points are kept
    pub fn set_duration(&mut self, seconds: f32) {
        let seconds = if seconds.is_finite() {
            seconds.clamp(MIN_RADAR_SECONDS, MAX_RADAR_SECONDS)
        } else {
            MIN_RADAR_SECONDS
        };
        let fs = self.sample_rate as f32;
        let floor = (self.sample_rate / 10) as usize;
        self.samples_per_point = ((seconds * fs / RADAR_CAPACITY as f32) as usize).max(floor);
    }

    /// Account `samples` of audio at the given loudness
    ///
    /// Returns the slot position when this call closed a slot.
    pub fn push(&mut self, momentary: f32, short_term: f32, samples: usize) -> Option<usize> {
        self.open.momentary = self.open.momentary.max(momentary);
        self.open.short_term = self.open.short_term.max(short_term);
        self.accumulated += samples;

        if self.accumulated < self.samples_per_point {
            return None;
        }
        self.accumulated -= self.samples_per_point;

        let pos = self.write_pos;
        self.points[pos] = self.open;
        self.open = RadarPoint::EMPTY;
        self.write_pos = (pos + 1) % RADAR_CAPACITY;
        self.total_points += 1;
        Some(pos)
    }

    pub fn reset(&mut self) {
        self.points.fill(RadarPoint::EMPTY);
        self.write_pos = 0;
        self.total_points = 0;
        self.accumulated = 0;
        self.open = RadarPoint::EMPTY;
    }

    pub fn point(&self, index: usize) -> RadarPoint {
        self.points[index % RADAR_CAPACITY]
    }

    /// Position the next commit goes to
    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    pub fn capacity(&self) -> usize {
        RADAR_CAPACITY
    }

    /// Commits since the last reset
    pub fn total_points(&self) -> u64 {
        self.total_points
    }

    /// Completed revolutions of the write cursor
    pub fn wraps(&self) -> u64 {
        self.total_points / RADAR_CAPACITY as u64
    }

    pub fn samples_per_point(&self) -> usize {
        self.samples_per_point
    }

    /// The most recent `n` commits as `(position, point)`, oldest first
    pub fn latest(&self, n: usize) -> impl Iterator<Item = (usize, RadarPoint)> + '_ {
        let available = self.total_points.min(RADAR_CAPACITY as u64) as usize;
        let n = n.min(available);
        (0..n).map(move |k| {
            let pos = (self.write_pos + RADAR_CAPACITY - n + k) % RADAR_CAPACITY;
            (pos, self.points[pos])
        })
    }

    /// Start replaying the whole ring to a newly attached observer
    pub fn begin_resync(&mut self) {
        self.resync = Some(0);
    }

    pub fn resync_pending(&self) -> bool {
        self.resync.is_some()
    }

    /// Next range of slot positions to replay, at most `max` long
    ///
    /// Returns `None` once every slot has been handed out.
    pub fn next_resync_batch(&mut self, max: usize) -> Option<Range<usize>> {
        let start = self.resync?;
        let end = (start + max.max(1)).min(RADAR_CAPACITY);
        self.resync = (end < RADAR_CAPACITY).then_some(end);
        Some(start..end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: u32 = 48000;

    fn step() -> usize {
        (FS / 10) as usize
    }

    #[test]
    fn test_speed_floor() {
        // 30 s over 360 slots is 83 ms, below the 100 ms floor
        let radar = Radar::new(FS, 30.0);
        assert_eq!(radar.samples_per_point(), step());

        let radar = Radar::new(FS, 360.0);
        assert_eq!(radar.samples_per_point(), FS as usize);
    }

    #[test]
    fn test_duration_clamped() {
        let mut radar = Radar::new(FS, 1.0);
        assert_eq!(radar.samples_per_point(), step());
        radar.set_duration(1e9);
        assert_eq!(
            radar.samples_per_point(),
            (MAX_RADAR_SECONDS * FS as f32 / RADAR_CAPACITY as f32) as usize
        );
        radar.set_duration(f32::NAN);
        assert_eq!(radar.samples_per_point(), step());
    }

    #[test]
    fn test_slot_keeps_maximum() {
        let mut radar = Radar::new(FS, 360.0);
        for (i, m) in [-30.0, -20.0, -25.0].iter().enumerate() {
            assert_eq!(radar.push(*m, -40.0 + i as f32, step()), None);
        }
        for _ in 0..6 {
            radar.push(-60.0, -60.0, step());
        }
        let pos = radar.push(-60.0, -60.0, step());
        assert_eq!(pos, Some(0));
        assert_eq!(radar.point(0).momentary, -20.0);
        assert_eq!(radar.point(0).short_term, -38.0);
    }

    #[test]
    fn test_wraps_and_latest() {
        let mut radar = Radar::new(FS, 30.0);
        let total = RADAR_CAPACITY * 2 + 17;
        for i in 0..total {
            radar.push(i as f32, i as f32, step());
        }
        assert_eq!(radar.total_points(), total as u64);
        assert_eq!(radar.wraps(), 2);
        assert_eq!(radar.write_pos(), 17);

        let latest: Vec<f32> = radar
            .latest(RADAR_CAPACITY)
            .map(|(_, p)| p.momentary)
            .collect();
        let expected: Vec<f32> = (total - RADAR_CAPACITY..total).map(|i| i as f32).collect();
        assert_eq!(latest, expected);
    }

    #[test]
    fn test_latest_before_first_wrap() {
        let mut radar = Radar::new(FS, 30.0);
        radar.push(-10.0, -11.0, step());
        radar.push(-12.0, -13.0, step());
        let latest: Vec<_> = radar.latest(10).collect();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].0, 0);
        assert_eq!(latest[1].1.momentary, -12.0);
    }

    #[test]
    fn test_reset_fills_sentinel() {
        let mut radar = Radar::new(FS, 30.0);
        radar.push(-10.0, -10.0, step());
        radar.reset();
        assert_eq!(radar.total_points(), 0);
        assert_eq!(radar.write_pos(), 0);
        assert_eq!(radar.point(0).momentary, BELOW_FLOOR_LUFS);
    }

    #[test]
    fn test_resync_batches() {
        let mut radar = Radar::new(FS, 30.0);
        assert_eq!(radar.next_resync_batch(8), None);

        radar.begin_resync();
        let mut batches = 0;
        let mut covered = 0;
        while let Some(range) = radar.next_resync_batch(8) {
            assert_eq!(range.start, covered);
            covered = range.end;
            batches += 1;
        }
        assert_eq!(covered, RADAR_CAPACITY);
        assert_eq!(batches, 45);
        assert!(!radar.resync_pending());
    }
}
