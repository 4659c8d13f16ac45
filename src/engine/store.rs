use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::SharedChain;

pub struct InMemoryStore {
    chains: DashMap<Ulid, SharedChain>,
    /// Reverse lookup: component id → group key
    entity_to_group: DashMap<Ulid, Ulid>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            chains: DashMap::new(),
            entity_to_group: DashMap::new(),
        }
    }

    // ── Chains ───────────────────────────────────────────────

    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    pub fn get_chain(&self, group_key: &Ulid) -> Option<SharedChain> {
        self.chains.get(group_key).map(|e| e.value().clone())
    }

    pub fn chain_or_create(&self, group_key: Ulid) -> SharedChain {
        self.chains
            .entry(group_key)
            .or_insert_with(|| Arc::new(RwLock::new(GroupChain::new(group_key))))
            .value()
            .clone()
    }

    /// Whether `chain` is still the one registered for `group_key`.
    pub fn is_current(&self, group_key: &Ulid, chain: &SharedChain) -> bool {
        self.chains
            .get(group_key)
            .is_some_and(|e| Arc::ptr_eq(e.value(), chain))
    }

    /// Forget a chain with no records left (caller holds its write lock).
    pub fn remove_chain_if_empty(&self, chain: &GroupChain) -> bool {
        if !chain.is_empty() {
            return false;
        }
        self.chains.remove(&chain.group_key).is_some()
    }

    // ── Entity index ─────────────────────────────────────────

    pub fn get_group_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_group.get(entity_id).map(|e| *e.value())
    }

    fn map_entity(&self, entity_id: Ulid, group_key: Ulid) {
        self.entity_to_group.insert(entity_id, group_key);
    }

    fn unmap_entity(&self, entity_id: &Ulid) {
        self.entity_to_group.remove(entity_id);
    }

    // ── Change application ───────────────────────────────────

    /// Apply a committed change to its chain (caller holds the chain's write lock).
    pub fn apply_change(&self, chain: &mut GroupChain, change: Change) {
        debug_assert_eq!(chain.group_key, change.group_key());
        match change {
            Change::Saved(record) => {
                if let Some(id) = record.id {
                    self.map_entity(id, record.group_key);
                    chain.upsert(record);
                }
            }
            Change::Deleted { id, .. } => {
                chain.remove(id);
                self.unmap_entity(&id);
            }
        }
    }
}
