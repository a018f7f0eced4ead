//! Loudness distribution histograms
//!
//! Counts of momentary and short-term readings in 0.1 LU bins from -70 to
//! +5 LUFS. Changed bins are tracked in a bitset so an observer can be sent
//! only what moved since the last drain.

use meter_core::LUFS_FLOOR;

/// Bins from -70.0 to +5.0 LUFS inclusive at 0.1 LU
pub const HISTOGRAM_BINS: usize = 751;

/// Bin width in LU
pub const HISTOGRAM_RESOLUTION: f32 = 0.1;

const DIRTY_WORDS: usize = HISTOGRAM_BINS.div_ceil(64);

/// Bin for a loudness value, or `None` when it is outside the histogram
pub fn bin_index(lufs: f32) -> Option<usize> {
    if !lufs.is_finite() {
        return None;
    }
    let bin = ((lufs - LUFS_FLOOR) / HISTOGRAM_RESOLUTION).round();
    if bin < 0.0 || bin >= HISTOGRAM_BINS as f32 {
        None
    } else {
        Some(bin as usize)
    }
}

/// Loudness at the center of `bin`
pub fn bin_lufs(bin: usize) -> f32 {
    LUFS_FLOOR + bin as f32 * HISTOGRAM_RESOLUTION
}

#[derive(Debug, Clone)]
pub struct LoudnessHistogram {
    momentary: Vec<u32>,
    short_term: Vec<u32>,
    max_momentary: u32,
    max_short_term: u32,
    dirty: [u64; DIRTY_WORDS],
}

impl Default for LoudnessHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl LoudnessHistogram {
    pub fn new() -> Self {
        Self {
            momentary: vec![0; HISTOGRAM_BINS],
            short_term: vec![0; HISTOGRAM_BINS],
            max_momentary: 0,
            max_short_term: 0,
            dirty: [0; DIRTY_WORDS],
        }
    }

    /// Count one momentary and one short-term reading
    pub fn add(&mut self, momentary: f32, short_term: f32) {
        if let Some(bin) = bin_index(momentary) {
            let count = &mut self.momentary[bin];
            *count = count.saturating_add(1);
            self.max_momentary = self.max_momentary.max(*count);
            self.mark_dirty(bin);
        }
        if let Some(bin) = bin_index(short_term) {
            let count = &mut self.short_term[bin];
            *count = count.saturating_add(1);
            self.max_short_term = self.max_short_term.max(*count);
            self.mark_dirty(bin);
        }
    }

    /// Queue `bin` for resending
    pub fn mark_dirty(&mut self, bin: usize) {
        self.dirty[bin / 64] |= 1 << (bin % 64);
    }

    /// Mark every non-empty bin for resending
    pub fn mark_all_dirty(&mut self) {
        for bin in 0..HISTOGRAM_BINS {
            if self.momentary[bin] > 0 || self.short_term[bin] > 0 {
                self.mark_dirty(bin);
            }
        }
    }

    /// Lowest changed bin, cleared from the dirty set
    pub fn next_dirty(&mut self) -> Option<usize> {
        for (word_index, word) in self.dirty.iter_mut().enumerate() {
            if *word != 0 {
                let bit = word.trailing_zeros() as usize;
                *word &= *word - 1;
                return Some(word_index * 64 + bit);
            }
        }
        None
    }

    pub fn has_dirty(&self) -> bool {
        self.dirty.iter().any(|w| *w != 0)
    }

    pub fn momentary(&self, bin: usize) -> u32 {
        self.momentary.get(bin).copied().unwrap_or(0)
    }

    pub fn short_term(&self, bin: usize) -> u32 {
        self.short_term.get(bin).copied().unwrap_or(0)
    }

    /// Largest single-bin count of each histogram
    pub fn max_counts(&self) -> (u32, u32) {
        (self.max_momentary, self.max_short_term)
    }

    pub fn reset(&mut self) {
        self.momentary.fill(0);
        self.short_term.fill(0);
        self.max_momentary = 0;
        self.max_short_term = 0;
        self.dirty = [0; DIRTY_WORDS];
    }
}
