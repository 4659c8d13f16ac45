use tracing::{debug, info};
use ulid::Ulid;

use crate::model::*;
use crate::observability::{DELETES_TOTAL, SAVES_TOTAL, record_validation_errors, status_label};

use super::{DataLayer, Engine, EngineError, Outcome, UnitOfWork};

impl Engine {
    /// Create (no id) or update a component. Predecessor adjustments made by
    /// the hooks are committed together with the record, or not at all.
    pub async fn save(&self, record: IntervalRecord) -> Result<Outcome, EngineError> {
        if let Some(id) = record.id
            && let Some(stored_group) = self.store.get_group_for_entity(&id)
            && stored_group != record.group_key
        {
            return Err(EngineError::GroupKeyChanged(id));
        }

        let mut guard = self.lock_for_save(&record).await?;

        let uow = UnitOfWork::new(&guard, &self.maintainer, &self.config);
        let result = uow.save(record).await;
        let changes = uow.into_changes();
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.store.remove_chain_if_empty(&guard);
                return Err(e);
            }
        };

        metrics::counter!(SAVES_TOTAL, "status" => status_label(&outcome.errors)).increment(1);
        if outcome.is_valid() {
            info!(
                group = %outcome.record.group_key,
                id = ?outcome.record.id,
                changes = changes.len(),
                "component saved"
            );
            self.commit(&mut guard, changes);
        } else {
            record_validation_errors(&outcome.errors);
            debug!(discarded = changes.len(), errors = %outcome.errors, "save rolled back");
            self.store.remove_chain_if_empty(&guard);
        }
        Ok(outcome)
    }

    /// Delete a component. Only tail components may go; the predecessor is
    /// reopened in the same commit.
    pub async fn delete(&self, id: Ulid) -> Result<Outcome, EngineError> {
        let (group_key, mut guard) = self.resolve_entity_write(&id).await?;
        let record = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;

        let uow = UnitOfWork::new(&guard, &self.maintainer, &self.config);
        let outcome = uow.delete(record).await?;
        let changes = uow.into_changes();

        metrics::counter!(DELETES_TOTAL, "status" => status_label(&outcome.errors)).increment(1);
        if outcome.is_valid() {
            info!(group = %group_key, %id, changes = changes.len(), "component deleted");
            self.commit(&mut guard, changes);
            if self.store.remove_chain_if_empty(&guard) {
                debug!(group = %group_key, "dropped empty chain");
            }
        } else {
            record_validation_errors(&outcome.errors);
            debug!(group = %group_key, %id, errors = %outcome.errors, "delete refused");
        }
        Ok(outcome)
    }
}
