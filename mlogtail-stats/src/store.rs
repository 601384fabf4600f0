//! The shared counter store
//!
//! One `parking_lot::Mutex` guards the whole array of counters. Every public
//! operation is a single critical section, so a [`Snapshot`] always reflects a
//! prefix of the applied increments and a reset is never observed half done.
//! Nothing here performs I/O while the lock is held.

use std::{
    fmt::{Display, Formatter},
    ops::Index,
};

use parking_lot::Mutex;

use crate::{CounterName, Outcome, Result};

/// A point-in-time copy of every counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Snapshot {
    values: [u64; CounterName::COUNT],
}

impl Snapshot {
    #[must_use]
    pub const fn get(&self, name: CounterName) -> u64 {
        self.values[name.index()]
    }

    /// Counters in wire order
    pub fn iter(&self) -> impl Iterator<Item = (CounterName, u64)> + '_ {
        CounterName::ALL
            .into_iter()
            .map(|name| (name, self.values[name.index()]))
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|v| *v == 0)
    }
}

impl Index<CounterName> for Snapshot {
    type Output = u64;

    fn index(&self, name: CounterName) -> &Self::Output {
        &self.values[name.index()]
    }
}

/// One `name value` line per counter, in wire order
impl Display for Snapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (name, value) in self.iter() {
            writeln!(f, "{:<16}{value}", name.as_str())?;
        }
        Ok(())
    }
}

/// Running delivery counters shared between the aggregator and the servers
#[derive(Debug, Default)]
pub struct CounterStore {
    counters: Mutex<[u64; CounterName::COUNT]>,
}

impl CounterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` to one counter
    pub fn increment(&self, name: CounterName, delta: u64) {
        let mut counters = self.counters.lock();
        let slot = &mut counters[name.index()];
        *slot = slot.saturating_add(delta);
    }

    /// Apply every delta produced by one classified line under one lock
    pub fn apply(&self, outcome: &Outcome) {
        let mut counters = self.counters.lock();
        for (name, delta) in outcome.deltas() {
            let slot = &mut counters[name.index()];
            *slot = slot.saturating_add(delta);
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            values: *self.counters.lock(),
        }
    }

    #[must_use]
    pub fn value(&self, name: CounterName) -> u64 {
        self.counters.lock()[name.index()]
    }

    /// Look a counter up by its wire name
    ///
    /// # Errors
    ///
    /// Returns [`crate::StatsError::UnknownCounter`] when `name` is not one of
    /// the fixed counter names.
    pub fn get(&self, name: &str) -> Result<u64> {
        let name = name.parse::<CounterName>()?;
        Ok(self.value(name))
    }

    /// Zero every counter, returning the values they held just before
    pub fn reset_all(&self) -> Snapshot {
        let mut counters = self.counters.lock();
        let previous = Snapshot { values: *counters };
        *counters = [0; CounterName::COUNT];
        previous
    }
}
