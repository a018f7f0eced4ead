//! Persisted plugin state
//!
//! Hosts hand us a key/value store of integers at save and restore time.
//! Settings are structs everywhere else; the packed integers exist only here.

use meter_core::{DisplaySettings, TransportFollow};
use std::collections::HashMap;
use tracing::{debug, warn};

const DISPLAY_KEY: &str = "display_settings";
const TRANSPORT_KEY: &str = "transport_mode";

/// Host-mediated key/value storage
pub trait StateStore {
    fn store(&mut self, key: &str, value: i32);

    fn retrieve(&self, key: &str) -> Option<i32>;
}

/// In-memory store, for hosts without one and for tests
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    values: HashMap<String, i32>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl StateStore for MemoryStateStore {
    fn store(&mut self, key: &str, value: i32) {
        self.values.insert(key.to_string(), value);
    }

    fn retrieve(&self, key: &str) -> Option<i32> {
        self.values.get(key).copied()
    }
}

/// Settings that survive a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PersistedState {
    pub display: DisplaySettings,
    pub transport: TransportFollow,
}

impl PersistedState {
    pub fn save(&self, store: &mut dyn StateStore) {
        store.store(DISPLAY_KEY, to_stored(self.display.to_bits()));
        store.store(TRANSPORT_KEY, to_stored(self.transport.to_bits()));
        debug!(
            display = self.display.to_bits(),
            transport = self.transport.to_bits(),
            "Saved meter state"
        );
    }

    /// Load saved settings; missing or invalid keys fall back to defaults
    pub fn restore(store: &dyn StateStore) -> Self {
        let state = Self {
            display: DisplaySettings::from_bits(from_stored(store, DISPLAY_KEY)),
            transport: TransportFollow::from_bits(from_stored(store, TRANSPORT_KEY)),
        };
        debug!(?state, "Restored meter state");
        state
    }
}

fn to_stored(bits: u32) -> i32 {
    i32::try_from(bits).unwrap_or_default()
}

fn from_stored(store: &dyn StateStore, key: &str) -> u32 {
    match store.retrieve(key) {
        Some(value) => u32::try_from(value).unwrap_or_else(|_| {
            warn!(key, value, "Ignoring negative saved state");
            0
        }),
        None => 0,
    }
}
