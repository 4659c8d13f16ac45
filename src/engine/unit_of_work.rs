use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;
use ulid::Ulid;

use crate::config::ChainConfig;
use crate::hooks::IntervalChainMaintainer;
use crate::model::*;
use crate::validation::ValidationErrors;

use super::checks::{check_cascade_depth, check_group_capacity, validate_record};
use super::{DataLayer, EngineError, Outcome};

/// Staged writes over one group chain.
///
/// Reads see the chain as it would look after the staged changes. Nothing
/// touches the chain itself: the caller takes the changes with
/// [`UnitOfWork::into_changes`] and commits or drops them.
///
/// Saves issued by the hooks re-enter [`DataLayer::save`] on the same unit
/// of work; `depth` counts how many are in flight.
pub struct UnitOfWork<'a> {
    base: &'a GroupChain,
    maintainer: &'a IntervalChainMaintainer,
    config: &'a ChainConfig,
    staged: DashMap<Ulid, Change>,
    depth: AtomicUsize,
}

/// One level of save nesting, released on drop.
struct Nesting<'a>(&'a AtomicUsize);

impl<'a> Nesting<'a> {
    fn enter(depth: &'a AtomicUsize) -> (Self, usize) {
        let level = depth.fetch_add(1, Ordering::Relaxed) + 1;
        (Self(depth), level)
    }
}

impl Drop for Nesting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl<'a> UnitOfWork<'a> {
    pub fn new(base: &'a GroupChain, maintainer: &'a IntervalChainMaintainer, config: &'a ChainConfig) -> Self {
        Self {
            base,
            maintainer,
            config,
            staged: DashMap::new(),
            depth: AtomicUsize::new(0),
        }
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    pub fn into_changes(self) -> Vec<Change> {
        self.staged.into_iter().map(|(_, change)| change).collect()
    }

    /// Base records not overridden by a staged change.
    fn unstaged(&self, record: &IntervalRecord) -> bool {
        record.id.is_some_and(|id| !self.staged.contains_key(&id))
    }

    /// Staged saves other than `exclude`.
    fn staged_saves(&self, exclude: Option<Ulid>) -> Vec<IntervalRecord> {
        self.staged
            .iter()
            .filter_map(|entry| match entry.value() {
                Change::Saved(record) if record.id != exclude => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of records the chain would hold after commit.
    fn projected_len(&self) -> usize {
        let mut len = self.base.len();
        for entry in self.staged.iter() {
            let in_base = self.base.get(*entry.key()).is_some();
            match entry.value() {
                Change::Saved(_) if !in_base => len += 1,
                Change::Deleted { .. } if in_base => len = len.saturating_sub(1),
                _ => {}
            }
        }
        len
    }

    fn check_group(&self, record: &IntervalRecord) -> Result<(), EngineError> {
        if record.group_key != self.base.group_key {
            return Err(EngineError::GroupMismatch {
                expected: self.base.group_key,
                found: record.group_key,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DataLayer for UnitOfWork<'_> {
    async fn get(&self, id: Ulid) -> Result<Option<IntervalRecord>, EngineError> {
        if let Some(change) = self.staged.get(&id) {
            return Ok(match change.value() {
                Change::Saved(record) => Some(record.clone()),
                Change::Deleted { .. } => None,
            });
        }
        Ok(self.base.get(id).cloned())
    }

    async fn save(&self, record: IntervalRecord) -> Result<Outcome, EngineError> {
        let (_nesting, level) = Nesting::enter(&self.depth);
        check_cascade_depth(level, self.config)?;
        self.check_group(&record)?;
        validate_record(&record)?;

        let mut errors = ValidationErrors::new();
        errors.absorb(self.maintainer.validates_with(&record));
        if errors.is_empty() {
            errors.absorb(self.maintainer.on_save(self, &record).await);
        }
        if !errors.is_empty() {
            debug!(group = %record.group_key, id = ?record.id, %errors, "save rejected");
            return Ok(Outcome::rejected(record, errors));
        }

        let mut record = record;
        if record.is_new() {
            check_group_capacity(self.projected_len(), self.config)?;
        }
        let id = *record.id.get_or_insert_with(Ulid::new);
        debug!(group = %record.group_key, %id, from = record.date_from, to = ?record.date_to, "save staged");
        self.staged.insert(id, Change::Saved(record.clone()));
        Ok(Outcome::accepted(record))
    }

    async fn delete(&self, record: IntervalRecord) -> Result<Outcome, EngineError> {
        self.check_group(&record)?;
        let id = record.id.ok_or(EngineError::NotPersisted)?;
        if self.get(id).await?.is_none() {
            return Err(EngineError::NotFound(id));
        }

        if let Err(errors) = self.maintainer.on_delete(self, &record).await {
            debug!(group = %record.group_key, %id, %errors, "delete rejected");
            return Ok(Outcome::rejected(record, errors));
        }

        debug!(group = %record.group_key, %id, "delete staged");
        self.staged.insert(
            id,
            Change::Deleted {
                id,
                group_key: record.group_key,
            },
        );
        Ok(Outcome::accepted(record))
    }

    async fn find_previous(&self, record: &IntervalRecord) -> Result<Option<IntervalRecord>, EngineError> {
        self.check_group(record)?;
        let from_base = self
            .base
            .previous_matching(record.date_from, |r| r.id != record.id && self.unstaged(r))
            .cloned();
        let from_staged = self
            .staged_saves(record.id)
            .into_iter()
            .filter(|r| r.date_from < record.date_from);
        Ok(from_base.into_iter().chain(from_staged).max_by_key(|r| (r.date_from, r.id)))
    }

    async fn component_exists_at(&self, record: &IntervalRecord) -> Result<bool, EngineError> {
        self.check_group(record)?;
        let t = record.date_from;
        if self.base.containing(t, record.id).any(|r| self.unstaged(r)) {
            return Ok(true);
        }
        Ok(self.staged_saves(record.id).iter().any(|r| r.contains_instant(t)))
    }
}
