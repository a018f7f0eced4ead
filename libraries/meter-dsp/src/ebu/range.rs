//! Loudness range (EBU Tech 3342)
//!
//! Short-term readings are binned at 0.1 LU. Values below the -70 LUFS
//! absolute gate are ignored; the relative gate sits 20 LU under the
//! power-mean of what remains. LRA is the spread between the 10th and 95th
//! percentiles of the gated distribution.

use super::histogram::{bin_index, bin_lufs, HISTOGRAM_BINS};
use meter_core::{LUFS_FLOOR, BELOW_FLOOR_LUFS};

const RELATIVE_GATE_LU: f64 = -20.0;
const LOW_PERCENTILE: f64 = 0.10;
const HIGH_PERCENTILE: f64 = 0.95;

#[derive(Debug, Clone)]
pub struct LoudnessRange {
    bins: Vec<u32>,
    count: u64,
    power_sum: f64,
    range: f32,
    low: f32,
    high: f32,
}

impl Default for LoudnessRange {
    fn default() -> Self {
        Self::new()
    }
}

impl LoudnessRange {
    pub fn new() -> Self {
        Self {
            bins: vec![0; HISTOGRAM_BINS],
            count: 0,
            power_sum: 0.0,
            range: 0.0,
            low: BELOW_FLOOR_LUFS,
            high: BELOW_FLOOR_LUFS,
        }
    }

    /// Add one short-term reading and recompute the range
    pub fn add(&mut self, short_term: f32) {
        if !short_term.is_finite() || short_term < LUFS_FLOOR {
            return;
        }
        // Readings above the top bin still count in it
        let bin = bin_index(short_term).unwrap_or(HISTOGRAM_BINS - 1);
        self.bins[bin] = self.bins[bin].saturating_add(1);
        self.count += 1;
        self.power_sum += 10f64.powf(f64::from(short_term) / 10.0);
        self.update();
    }

    fn update(&mut self) {
        if self.count == 0 {
            return;
        }
        let mean = 10.0 * (self.power_sum / self.count as f64).log10();
        let gate = (mean + RELATIVE_GATE_LU) as f32;
        let first = bin_index(gate).unwrap_or(0);

        let gated: u64 = self.bins[first..].iter().map(|&c| u64::from(c)).sum();
        if gated == 0 {
            return;
        }

        let low = self.percentile(first, gated, LOW_PERCENTILE);
        let high = self.percentile(first, gated, HIGH_PERCENTILE);
        self.low = bin_lufs(low);
        self.high = bin_lufs(high);
        self.range = self.high - self.low;
    }

    /// First bin at or after `first` where the cumulative count reaches `p`
    fn percentile(&self, first: usize, total: u64, p: f64) -> usize {
        let target = ((total as f64) * p).ceil().max(1.0) as u64;
        let mut cumulative = 0;
        for (offset, &c) in self.bins[first..].iter().enumerate() {
            cumulative += u64::from(c);
            if cumulative >= target {
                return first + offset;
            }
        }
        HISTOGRAM_BINS - 1
    }

    /// Loudness range in LU
    pub fn range(&self) -> f32 {
        self.range
    }

    /// 10th percentile in LUFS, sentinel while empty
    pub fn low(&self) -> f32 {
        self.low
    }

    /// 95th percentile in LUFS, sentinel while empty
    pub fn high(&self) -> f32 {
        self.high
    }

    pub fn reset(&mut self) {
        self.bins.fill(0);
        self.count = 0;
        self.power_sum = 0.0;
        self.range = 0.0;
        self.low = BELOW_FLOOR_LUFS;
        self.high = BELOW_FLOOR_LUFS;
    }
}
