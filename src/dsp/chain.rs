//! Effect chain management
//!
//! Units are processed in chain order (index 0 first). Indices are
//! positions in the current order, not stable identifiers: removing unit
//! `i` shifts every later unit down by one.
//!
//! `SharedChain` wraps a chain for use from two contexts at once. The
//! processing thread holds the lock for one traversal; control edits hold
//! it for one mutation. No device callback ever touches it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use super::effect::{EffectKind, EffectUnit};
use crate::engine::buffer::{AudioBuffer, DEFAULT_SAMPLE_RATE};
use crate::error::{PedalboardError, Result};

// ============================================================================
// Snapshot
// ============================================================================

/// Read-only description of one unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitSnapshot {
    pub index: usize,
    pub id: String,
    pub kind: EffectKind,
    pub parameters: BTreeMap<String, f32>,
}

/// Ordered, owned description of a chain at one moment
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ChainSnapshot {
    pub units: Vec<UnitSnapshot>,
}

impl ChainSnapshot {
    /// Kinds in chain order
    pub fn kinds(&self) -> Vec<EffectKind> {
        self.units.iter().map(|u| u.kind).collect()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl fmt::Display for ChainSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.units.is_empty() {
            return write!(f, "(empty chain)");
        }
        for (i, unit) in self.units.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let params: Vec<String> = unit
                .parameters
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect();
            write!(f, "{}: {} ({})", unit.index, unit.kind, params.join(", "))?;
        }
        Ok(())
    }
}

// ============================================================================
// Effect Chain
// ============================================================================

/// Ordered sequence of effect units
#[derive(Debug)]
pub struct EffectChain {
    units: Vec<EffectUnit>,
    sample_rate: u32,
    channels: usize,
}

impl EffectChain {
    /// Create a new empty effect chain
    pub fn new() -> Self {
        Self::with_format(DEFAULT_SAMPLE_RATE, 1)
    }

    /// Create an empty chain prepared for a sample rate and channel count
    pub fn with_format(sample_rate: u32, channels: usize) -> Self {
        Self {
            units: Vec::new(),
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Prepare all units for processing
    pub fn prepare(&mut self, sample_rate: u32, channels: usize) {
        self.sample_rate = sample_rate;
        self.channels = channels.max(1);
        for unit in &mut self.units {
            unit.prepare(self.sample_rate, self.channels);
        }
    }

    /// Reset the internal history of all units
    pub fn reset(&mut self) {
        for unit in &mut self.units {
            unit.reset();
        }
    }

    /// Insert a unit at `position`, clamped to `[0, len]`
    ///
    /// Returns the index the unit ended up at. A unit not yet prepared for
    /// the chain's format is prepared here.
    pub fn insert(&mut self, mut unit: EffectUnit, position: usize) -> usize {
        if !unit.is_prepared_for(self.sample_rate, self.channels) {
            unit.prepare(self.sample_rate, self.channels);
        }
        let index = position.min(self.units.len());
        debug!(kind = unit.kind().name(), index, "effect inserted");
        self.units.insert(index, unit);
        index
    }

    /// Append a unit at the end of the chain
    pub fn push(&mut self, unit: EffectUnit) -> usize {
        self.insert(unit, self.units.len())
    }

    /// Remove and return the unit at `position`
    pub fn remove_at(&mut self, position: usize) -> Result<EffectUnit> {
        if position >= self.units.len() {
            return Err(PedalboardError::IndexOutOfRange {
                index: position,
                len: self.units.len(),
            });
        }
        let unit = self.units.remove(position);
        debug!(kind = unit.kind().name(), index = position, "effect removed");
        Ok(unit)
    }

    /// Set a parameter on the unit at `position`
    pub fn update_parameter(&mut self, position: usize, name: &str, value: f32) -> Result<()> {
        let len = self.units.len();
        let unit = self
            .units
            .get_mut(position)
            .ok_or(PedalboardError::IndexOutOfRange {
                index: position,
                len,
            })?;
        unit.set_parameter(name, value)
    }

    /// Remove all units
    pub fn clear(&mut self) {
        self.units.clear();
        debug!("chain cleared");
    }

    /// Swap in a complete new unit list in one step
    ///
    /// Returns the units that were replaced.
    pub fn replace_all(&mut self, units: Vec<EffectUnit>) -> Vec<EffectUnit> {
        let previous = std::mem::take(&mut self.units);
        for unit in units {
            self.push(unit);
        }
        previous
    }

    /// Run a block through every unit in order, in place
    pub fn process(&mut self, block: &mut AudioBuffer) {
        for unit in &mut self.units {
            unit.process(block);
        }
    }

    /// Run a copy of `block` through the chain and return it
    ///
    /// An empty chain returns a bit-identical copy.
    pub fn apply(&mut self, block: &AudioBuffer) -> AudioBuffer {
        let mut output = block.clone();
        self.process(&mut output);
        output
    }

    /// Ordered description of kinds and parameter values
    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            units: self
                .units
                .iter()
                .enumerate()
                .map(|(index, unit)| UnitSnapshot {
                    index,
                    id: unit.id().to_string(),
                    kind: unit.kind(),
                    parameters: unit.parameters().to_map(),
                })
                .collect(),
        }
    }

    /// Get the number of units in the chain
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Check if the chain is empty
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Get a reference to the unit at `position`
    pub fn get(&self, position: usize) -> Option<&EffectUnit> {
        self.units.get(position)
    }

    /// Iterate over units in order
    pub fn iter(&self) -> impl Iterator<Item = &EffectUnit> {
        self.units.iter()
    }

    /// Prepared sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Prepared channel count
    pub fn channels(&self) -> usize {
        self.channels
    }
}

impl Default for EffectChain {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Shared Chain
// ============================================================================

/// A chain shared between the control context and the processing thread
///
/// Every method takes the lock for exactly one operation, so each block
/// sees the chain either before or after a given edit.
#[derive(Debug, Clone, Default)]
pub struct SharedChain {
    inner: Arc<Mutex<EffectChain>>,
}

impl SharedChain {
    pub fn new(chain: EffectChain) -> Self {
        Self {
            inner: Arc::new(Mutex::new(chain)),
        }
    }

    /// Run `f` with exclusive access to the chain
    ///
    /// Used for whole-buffer renders of a live chain; edits wait until `f`
    /// returns.
    pub fn with_locked<R>(&self, f: impl FnOnce(&mut EffectChain) -> R) -> R {
        let mut chain = self.inner.lock();
        f(&mut chain)
    }

    /// Format the chain is currently prepared for
    fn format(&self) -> (u32, usize) {
        let chain = self.inner.lock();
        (chain.sample_rate, chain.channels)
    }

    /// Insert a unit, preparing it before the lock is taken
    ///
    /// Preparing may allocate delay lines, so only the list edit itself
    /// runs under the lock.
    pub fn insert(&self, mut unit: EffectUnit, position: usize) -> usize {
        let (sample_rate, channels) = self.format();
        unit.prepare(sample_rate, channels);
        self.inner.lock().insert(unit, position)
    }

    pub fn push(&self, unit: EffectUnit) -> usize {
        self.insert(unit, usize::MAX)
    }

    pub fn remove_at(&self, position: usize) -> Result<EffectUnit> {
        self.inner.lock().remove_at(position)
    }

    pub fn update_parameter(&self, position: usize, name: &str, value: f32) -> Result<()> {
        self.inner.lock().update_parameter(position, name, value)
    }

    pub fn clear(&self) {
        self.replace_all(Vec::new());
    }

    /// Swap in a new unit list; units are prepared and the old ones dropped
    /// outside the lock
    pub fn replace_all(&self, mut units: Vec<EffectUnit>) {
        let (sample_rate, channels) = self.format();
        for unit in &mut units {
            unit.prepare(sample_rate, channels);
        }
        let previous = self.inner.lock().replace_all(units);
        drop(previous);
    }

    pub fn prepare(&self, sample_rate: u32, channels: usize) {
        self.inner.lock().prepare(sample_rate, channels);
    }

    pub fn reset(&self) {
        self.inner.lock().reset();
    }

    /// Process one block in place under the lock
    pub fn process(&self, block: &mut AudioBuffer) {
        self.inner.lock().process(block);
    }

    pub fn apply(&self, block: &AudioBuffer) -> AudioBuffer {
        self.inner.lock().apply(block)
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        self.inner.lock().snapshot()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl From<EffectChain> for SharedChain {
    fn from(chain: EffectChain) -> Self {
        Self::new(chain)
    }
}

// ============================================================================
// Tests
// ============================================================================
