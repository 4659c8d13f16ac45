mod checks;
mod error;
mod mutations;
mod queries;
mod store;
mod unit_of_work;

pub use error::EngineError;
pub use store::InMemoryStore;
pub use unit_of_work::UnitOfWork;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::config::ChainConfig;
use crate::hooks::IntervalChainMaintainer;
use crate::model::*;
use crate::validation::ValidationErrors;

pub type SharedChain = Arc<RwLock<GroupChain>>;

/// What a save or delete did to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// On a valid save, carries the assigned id.
    pub record: IntervalRecord,
    pub errors: ValidationErrors,
}

impl Outcome {
    pub fn accepted(record: IntervalRecord) -> Self {
        Self {
            record,
            errors: ValidationErrors::new(),
        }
    }

    pub fn rejected(record: IntervalRecord, errors: ValidationErrors) -> Self {
        Self { record, errors }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// The host data layer the chain hooks run against.
///
/// `save` and `delete` run the full entity lifecycle (validators, hooks,
/// persist) and report validation problems in the returned [`Outcome`];
/// `Err` is reserved for infrastructure failures.
#[async_trait]
pub trait DataLayer: Send + Sync {
    async fn get(&self, id: Ulid) -> Result<Option<IntervalRecord>, EngineError>;

    async fn save(&self, record: IntervalRecord) -> Result<Outcome, EngineError>;

    async fn delete(&self, record: IntervalRecord) -> Result<Outcome, EngineError>;

    /// Persisted record of the same group with the greatest `date_from`
    /// strictly below `record.date_from`, never `record` itself.
    async fn find_previous(&self, record: &IntervalRecord) -> Result<Option<IntervalRecord>, EngineError>;

    /// Whether another record of the same group contains `record.date_from`.
    async fn component_exists_at(&self, record: &IntervalRecord) -> Result<bool, EngineError>;
}

/// In-memory reference data layer.
///
/// Every save or delete locks its group chain, runs the lifecycle inside a
/// [`UnitOfWork`] and commits the staged changes only if the outermost
/// operation came back valid.
pub struct Engine {
    pub(super) store: InMemoryStore,
    pub(super) maintainer: IntervalChainMaintainer,
    pub(super) config: ChainConfig,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(ChainConfig::default())
    }
}

impl Engine {
    pub fn new(config: ChainConfig) -> Self {
        Self {
            store: InMemoryStore::new(),
            maintainer: IntervalChainMaintainer::new(config.gap_ms),
            config,
        }
    }

    pub fn from_env() -> Self {
        Self::new(ChainConfig::from_env())
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn chain_count(&self) -> usize {
        self.store.chain_count()
    }

    /// Lookup entity → group, get chain, acquire write lock.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<(Ulid, OwnedRwLockWriteGuard<GroupChain>), EngineError> {
        let group_key = self
            .store
            .get_group_for_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let chain = self
            .store
            .get_chain(&group_key)
            .ok_or(EngineError::NotFound(group_key))?;
        let guard = chain.write_owned().await;
        Ok((group_key, guard))
    }

    /// Write-lock the chain `record` is saved into. Only new records may
    /// create a chain; an update needs the chain that already holds it.
    pub(super) async fn lock_for_save(
        &self,
        record: &IntervalRecord,
    ) -> Result<OwnedRwLockWriteGuard<GroupChain>, EngineError> {
        loop {
            let chain = match record.id {
                Some(id) => self
                    .store
                    .get_chain(&record.group_key)
                    .ok_or(EngineError::NotFound(id))?,
                None => self.store.chain_or_create(record.group_key),
            };
            let guard = chain.clone().write_owned().await;
            // emptied and dropped from the store while we waited
            if !self.store.is_current(&record.group_key, &chain) {
                continue;
            }
            if let Some(id) = record.id
                && guard.get(id).is_none()
            {
                return Err(EngineError::NotFound(id));
            }
            return Ok(guard);
        }
    }

    /// Apply staged changes to the locked chain.
    pub(super) fn commit(&self, chain: &mut GroupChain, changes: Vec<Change>) {
        for change in changes {
            self.store.apply_change(chain, change);
        }
    }
}
