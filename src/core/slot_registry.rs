//! Slot definitions and the live occupancy map.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::util::{PresetId, SlotId};

/// A monitored parking position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Slot identifier.
    pub id: SlotId,
    /// Camera preset aimed at this slot.
    pub preset: PresetId,
    /// Latest occupancy reported by the event source.
    pub occupied: bool,
}

/// Occupancy flags written by the transport callback and read by the orchestrator.
///
/// The transport owns the connection; it only calls [`OccupancyMap::set`].
#[derive(Debug, Clone, Default)]
pub struct OccupancyMap {
    inner: Arc<RwLock<HashMap<SlotId, bool>>>,
}

impl OccupancyMap {
    /// Create an empty map; every slot starts vacant.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an occupancy update for `slot`.
    pub fn set(&self, slot: SlotId, occupied: bool) {
        let previous = self.inner.write().insert(slot, occupied);
        if previous != Some(occupied) {
            tracing::debug!(slot_id = slot, occupied, "occupancy updated");
        }
    }

    /// Current occupancy of `slot`. Unknown slots read as vacant.
    pub fn get(&self, slot: SlotId) -> bool {
        self.inner.read().get(&slot).copied().unwrap_or(false)
    }
}

/// Registry of slots and their presets, owned by the orchestrator.
#[derive(Debug, Default)]
pub struct SlotRegistry {
    presets: BTreeMap<SlotId, PresetId>,
    occupancy: OccupancyMap,
    next_id: SlotId,
}

impl SlotRegistry {
    /// Create a registry reading occupancy from `occupancy`.
    pub fn new(occupancy: OccupancyMap) -> Self {
        Self {
            presets: BTreeMap::new(),
            occupancy,
            next_id: 0,
        }
    }

    /// Register a slot under the next sequential id.
    pub fn insert_slot(&mut self, preset: PresetId) -> SlotId {
        let id = self.next_id;
        self.insert_slot_with_id(id, preset);
        id
    }

    /// Register or re-aim a slot with an explicit id.
    pub fn insert_slot_with_id(&mut self, id: SlotId, preset: PresetId) {
        self.presets.insert(id, preset);
        self.next_id = self.next_id.max(id.saturating_add(1));
        tracing::info!(slot_id = id, preset, "slot registered");
    }

    /// Preset of a registered slot.
    pub fn preset(&self, id: SlotId) -> Option<PresetId> {
        self.presets.get(&id).copied()
    }

    /// Number of registered slots.
    pub fn len(&self) -> usize {
        self.presets.len()
    }

    /// Whether no slots are registered.
    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    /// Handle to the occupancy map this registry reads.
    pub fn occupancy(&self) -> &OccupancyMap {
        &self.occupancy
    }

    /// All slots with their current occupancy, ordered by id.
    pub fn snapshot(&self) -> Vec<Slot> {
        self.presets
            .iter()
            .map(|(&id, &preset)| Slot {
                id,
                preset,
                occupied: self.occupancy.get(id),
            })
            .collect()
    }
}
