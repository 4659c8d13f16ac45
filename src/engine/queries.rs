use ulid::Ulid;

use crate::model::*;

use super::Engine;

impl Engine {
    pub async fn get(&self, id: Ulid) -> Option<IntervalRecord> {
        let group_key = self.store.get_group_for_entity(&id)?;
        let chain = self.store.get_chain(&group_key)?;
        let guard = chain.read().await;
        guard.get(id).cloned()
    }

    /// All components of a group in chain order.
    pub async fn chain(&self, group_key: Ulid) -> Vec<IntervalRecord> {
        let chain = match self.store.get_chain(&group_key) {
            Some(chain) => chain,
            None => return vec![],
        };
        let guard = chain.read().await;
        guard.records().to_vec()
    }

    /// The open-ended component the chain currently ends with, if any.
    pub async fn tail(&self, group_key: Ulid) -> Option<IntervalRecord> {
        let chain = self.store.get_chain(&group_key)?;
        let guard = chain.read().await;
        guard.records().last().filter(|r| r.is_open_ended()).cloned()
    }
}
