//! Save, delete and validate hooks for workstation type components.
//!
//! The components of one workstation type form a chain of closed date
//! intervals. Saving a component closes its predecessor one gap before the
//! new start; deleting the tail reopens the predecessor. Every problem is
//! reported as a [`ValidationErrors`] value for the caller to merge.

use tracing::{debug, warn};

use crate::engine::{DataLayer, EngineError};
use crate::model::*;
use crate::observability::NEIGHBOR_ADJUSTMENTS_TOTAL;
use crate::validation::{Field, Message, ValidationErrors, ValidationResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalChainMaintainer {
    gap_ms: Ms,
}

impl Default for IntervalChainMaintainer {
    fn default() -> Self {
        Self::new(MINUTE_MS)
    }
}

fn storage_error(e: EngineError) -> ValidationErrors {
    ValidationErrors::global(Message::Storage(e.to_string()))
}

impl IntervalChainMaintainer {
    /// Negative gaps count as zero.
    pub fn new(gap_ms: Ms) -> Self {
        Self { gap_ms: gap_ms.max(0) }
    }

    /// Immediate predecessor of `record` in its group, by start time.
    pub async fn find_previous<D: DataLayer + ?Sized>(
        &self,
        data: &D,
        record: &IntervalRecord,
    ) -> Result<Option<IntervalRecord>, EngineError> {
        data.find_previous(record).await
    }

    pub async fn on_save<D: DataLayer + ?Sized>(&self, data: &D, record: &IntervalRecord) -> ValidationResult {
        let mut errors = ValidationErrors::new();

        match self.find_previous(data, record).await {
            Ok(Some(previous)) => errors.absorb(self.close_previous(data, previous, record.date_from).await),
            Ok(None) => {}
            Err(e) => errors.merge(storage_error(e)),
        }

        // Runs after the predecessor was closed, so it no longer counts as covering date_from.
        match self.should_validate_dates(data, record).await {
            Ok(true) => match data.component_exists_at(record).await {
                Ok(true) => errors.add_field(Field::DateFrom, Message::OtherComponentsExist),
                Ok(false) => {}
                Err(e) => errors.merge(storage_error(e)),
            },
            Ok(false) => {}
            Err(e) => errors.merge(storage_error(e)),
        }

        errors.into_result()
    }

    /// Only open-ended components may be deleted. The predecessor becomes the
    /// new tail; failing to reopen it does not block the delete.
    pub async fn on_delete<D: DataLayer + ?Sized>(&self, data: &D, record: &IntervalRecord) -> ValidationResult {
        if record.date_to.is_some() {
            return Err(ValidationErrors::global(Message::HasDates));
        }

        match self.find_previous(data, record).await {
            Ok(Some(mut previous)) => {
                previous.date_to = None;
                let previous_id = previous.id;
                match data.save(previous).await {
                    Ok(outcome) if outcome.is_valid() => {
                        metrics::counter!(NEIGHBOR_ADJUSTMENTS_TOTAL).increment(1);
                        debug!(previous = ?previous_id, "reopened predecessor");
                    }
                    Ok(outcome) => {
                        warn!(previous = ?previous_id, errors = %outcome.errors, "could not reopen predecessor");
                    }
                    Err(e) => warn!(previous = ?previous_id, "could not reopen predecessor: {e}"),
                }
            }
            Ok(None) => {}
            Err(e) => warn!("predecessor lookup failed: {e}"),
        }
        Ok(())
    }

    pub fn validates_with(&self, record: &IntervalRecord) -> ValidationResult {
        if let Some(date_to) = record.date_to
            && date_to < record.date_from
        {
            return Err(ValidationErrors::field(Field::DateFrom, Message::DatesInvalid));
        }
        Ok(())
    }

    /// Set the predecessor's end one gap before `date_from`. Whatever the
    /// nested save rejects lands on the record being saved as global errors.
    async fn close_previous<D: DataLayer + ?Sized>(
        &self,
        data: &D,
        mut previous: IntervalRecord,
        date_from: Ms,
    ) -> ValidationResult {
        let Some(date_to) = date_from.checked_sub(self.gap_ms) else {
            return Err(storage_error(EngineError::LimitExceeded("timestamp out of range")));
        };
        if previous.date_to == Some(date_to) {
            return Ok(());
        }
        previous.date_to = Some(date_to);
        let previous_id = previous.id;

        let outcome = data.save(previous).await.map_err(storage_error)?;
        if outcome.is_valid() {
            metrics::counter!(NEIGHBOR_ADJUSTMENTS_TOTAL).increment(1);
            debug!(previous = ?previous_id, date_to, "closed predecessor");
            return Ok(());
        }

        let mut errors = ValidationErrors::new();
        for message in outcome.errors.messages() {
            errors.add_global(message.clone());
        }
        Err(errors)
    }

    /// New records always need the overlap check; updates only when
    /// `date_from` moved away from the stored value.
    async fn should_validate_dates<D: DataLayer + ?Sized>(
        &self,
        data: &D,
        record: &IntervalRecord,
    ) -> Result<bool, EngineError> {
        let Some(id) = record.id else {
            return Ok(true);
        };
        Ok(match data.get(id).await? {
            Some(stored) => stored.date_from != record.date_from,
            None => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use ulid::Ulid;

    use super::*;
    use crate::engine::Outcome;

    const M: Ms = MINUTE_MS;

    /// Records persisted as-is: no nested hooks, so each test sees exactly
    /// the writes the hook under test issues.
    #[derive(Default)]
    struct FakeData {
        records: Mutex<Vec<IntervalRecord>>,
        saves: Mutex<Vec<IntervalRecord>>,
        reject_saves: Option<ValidationErrors>,
        fail_saves: bool,
        fail_queries: bool,
    }

    impl FakeData {
        fn with(records: Vec<IntervalRecord>) -> Self {
            Self {
                records: Mutex::new(records),
                ..Default::default()
            }
        }

        fn stored(&self, id: Option<Ulid>) -> IntervalRecord {
            self.records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .unwrap()
        }

        fn save_count(&self) -> usize {
            self.saves.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DataLayer for FakeData {
        async fn get(&self, id: Ulid) -> Result<Option<IntervalRecord>, EngineError> {
            Ok(self.records.lock().unwrap().iter().find(|r| r.id == Some(id)).cloned())
        }

        async fn save(&self, record: IntervalRecord) -> Result<Outcome, EngineError> {
            if self.fail_saves {
                return Err(EngineError::LimitExceeded("disk full"));
            }
            self.saves.lock().unwrap().push(record.clone());
            if let Some(errors) = &self.reject_saves {
                return Ok(Outcome::rejected(record, errors.clone()));
            }
            let mut records = self.records.lock().unwrap();
            records.retain(|r| r.id != record.id);
            records.push(record.clone());
            Ok(Outcome::accepted(record))
        }

        async fn delete(&self, record: IntervalRecord) -> Result<Outcome, EngineError> {
            self.records.lock().unwrap().retain(|r| r.id != record.id);
            Ok(Outcome::accepted(record))
        }

        async fn find_previous(&self, record: &IntervalRecord) -> Result<Option<IntervalRecord>, EngineError> {
            if self.fail_queries {
                return Err(EngineError::LimitExceeded("index offline"));
            }
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.group_key == record.group_key && r.id != record.id)
                .filter(|r| r.date_from < record.date_from)
                .max_by_key(|r| (r.date_from, r.id))
                .cloned())
        }

        async fn component_exists_at(&self, record: &IntervalRecord) -> Result<bool, EngineError> {
            if self.fail_queries {
                return Err(EngineError::LimitExceeded("index offline"));
            }
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.group_key == record.group_key && r.id != record.id)
                .any(|r| r.contains_instant(record.date_from)))
        }
    }

    fn persisted(group: Ulid, from: Ms, to: Option<Ms>) -> IntervalRecord {
        IntervalRecord {
            id: Some(Ulid::new()),
            group_key: group,
            date_from: from,
            date_to: to,
        }
    }

    #[tokio::test]
    async fn on_save_closes_open_predecessor() {
        let g = Ulid::new();
        let a = persisted(g, 0, None);
        let data = FakeData::with(vec![a.clone()]);
        let hooks = IntervalChainMaintainer::default();

        let b = IntervalRecord::new(g, 100 * M, None);
        assert!(hooks.on_save(&data, &b).await.is_ok());
        assert_eq!(data.stored(a.id).date_to, Some(99 * M));
    }

    #[tokio::test]
    async fn on_save_skips_persist_when_already_contiguous() {
        let g = Ulid::new();
        let a = persisted(g, 0, Some(99 * M));
        let data = FakeData::with(vec![a]);
        let hooks = IntervalChainMaintainer::default();

        let b = IntervalRecord::new(g, 100 * M, None);
        assert!(hooks.on_save(&data, &b).await.is_ok());
        assert_eq!(data.save_count(), 0);
    }

    #[tokio::test]
    async fn on_save_without_predecessor_persists_nothing() {
        let data = FakeData::default();
        let hooks = IntervalChainMaintainer::default();
        let first = IntervalRecord::new(Ulid::new(), 0, None);
        assert!(hooks.on_save(&data, &first).await.is_ok());
        assert_eq!(data.save_count(), 0);
    }

    #[tokio::test]
    async fn on_save_shrinks_overlong_predecessor() {
        let g = Ulid::new();
        let a = persisted(g, 0, Some(500 * M));
        let data = FakeData::with(vec![a.clone()]);
        let hooks = IntervalChainMaintainer::default();

        let b = IntervalRecord::new(g, 100 * M, None);
        assert!(hooks.on_save(&data, &b).await.is_ok());
        assert_eq!(data.stored(a.id).date_to, Some(99 * M));
    }

    #[tokio::test]
    async fn nested_rejection_becomes_global_errors() {
        let g = Ulid::new();
        let mut data = FakeData::with(vec![persisted(g, 0, None)]);
        let mut rejection = ValidationErrors::field(Field::DateFrom, Message::DatesInvalid);
        rejection.add_global(Message::HasDates);
        data.reject_saves = Some(rejection);
        let hooks = IntervalChainMaintainer::default();

        // a new record two minutes later; the predecessor is open so the overlap check fires too
        let b = IntervalRecord::new(g, 2 * M, None);
        let errors = hooks.on_save(&data, &b).await.unwrap_err();
        assert_eq!(
            errors.global_errors(),
            &[Message::DatesInvalid, Message::HasDates]
        );
        assert_eq!(
            errors.for_field(Field::DateFrom).collect::<Vec<_>>(),
            vec![&Message::OtherComponentsExist]
        );
    }

    #[tokio::test]
    async fn nested_infrastructure_failure_becomes_global_error() {
        let g = Ulid::new();
        let mut data = FakeData::with(vec![persisted(g, 0, Some(10 * M))]);
        data.fail_saves = true;
        let hooks = IntervalChainMaintainer::default();

        let b = IntervalRecord::new(g, 100 * M, None);
        let errors = hooks.on_save(&data, &b).await.unwrap_err();
        assert_eq!(
            errors.global_errors(),
            &[Message::Storage("limit exceeded: disk full".into())]
        );
        assert!(errors.field_errors().is_empty());
    }

    #[tokio::test]
    async fn failing_lookups_become_global_errors() {
        let g = Ulid::new();
        let mut data = FakeData::with(vec![persisted(g, 0, None)]);
        data.fail_queries = true;
        let hooks = IntervalChainMaintainer::default();

        let b = IntervalRecord::new(g, 100 * M, None);
        let errors = hooks.on_save(&data, &b).await.unwrap_err();
        let offline = Message::Storage("limit exceeded: index offline".into());
        assert_eq!(errors.global_errors(), &[offline.clone(), offline]);
        assert!(errors.field_errors().is_empty());
        assert_eq!(data.save_count(), 0);
    }

    #[tokio::test]
    async fn predecessor_end_before_time_range_is_reported() {
        let g = Ulid::new();
        let a = persisted(g, Ms::MIN, None);
        let data = FakeData::with(vec![a.clone()]);
        let hooks = IntervalChainMaintainer::new(2);

        let b = IntervalRecord::new(g, Ms::MIN + 1, None);
        let errors = hooks.on_save(&data, &b).await.unwrap_err();
        assert_eq!(
            errors.global_errors(),
            &[Message::Storage("limit exceeded: timestamp out of range".into())]
        );
        assert_eq!(data.save_count(), 0);
        assert_eq!(data.stored(a.id).date_to, None);
    }

    #[test]
    fn negative_gap_counts_as_zero() {
        assert_eq!(IntervalChainMaintainer::new(-5), IntervalChainMaintainer::new(0));
        assert_eq!(IntervalChainMaintainer::new(Ms::MIN), IntervalChainMaintainer::new(0));
    }

    /// `long` covers 0..1000 min but is not anyone's immediate predecessor.
    fn stale_overlap(g: Ulid) -> (IntervalRecord, IntervalRecord, IntervalRecord) {
        let long = persisted(g, 0, Some(1000 * M));
        let p = persisted(g, 20 * M, Some(49 * M));
        let b = persisted(g, 50 * M, None);
        (long, p, b)
    }

    #[tokio::test]
    async fn new_record_inside_existing_interval_is_flagged() {
        let g = Ulid::new();
        let (long, p, _) = stale_overlap(g);
        let data = FakeData::with(vec![long, p.clone()]);
        let hooks = IntervalChainMaintainer::default();

        let b = IntervalRecord::new(g, 150 * M, None);
        let errors = hooks.on_save(&data, &b).await.unwrap_err();
        assert_eq!(
            errors.for_field(Field::DateFrom).collect::<Vec<_>>(),
            vec![&Message::OtherComponentsExist]
        );
        assert!(errors.global_errors().is_empty());
        assert_eq!(data.stored(p.id).date_to, Some(149 * M));
    }

    #[tokio::test]
    async fn update_with_unchanged_date_from_skips_overlap_check() {
        let g = Ulid::new();
        let (long, p, b) = stale_overlap(g);
        let data = FakeData::with(vec![long, p, b.clone()]);
        let hooks = IntervalChainMaintainer::default();

        let mut edited = b.clone();
        edited.date_to = Some(70 * M);
        assert!(hooks.on_save(&data, &edited).await.is_ok());
        assert_eq!(data.save_count(), 0);
    }

    #[tokio::test]
    async fn update_with_moved_date_from_runs_overlap_check() {
        let g = Ulid::new();
        let (long, p, b) = stale_overlap(g);
        let data = FakeData::with(vec![long, p.clone(), b.clone()]);
        let hooks = IntervalChainMaintainer::default();

        let mut moved = b.clone();
        moved.date_from = 60 * M;
        let errors = hooks.on_save(&data, &moved).await.unwrap_err();
        assert_eq!(
            errors.for_field(Field::DateFrom).collect::<Vec<_>>(),
            vec![&Message::OtherComponentsExist]
        );
        assert_eq!(data.stored(p.id).date_to, Some(59 * M));
    }

    #[tokio::test]
    async fn update_of_vanished_record_runs_overlap_check() {
        let g = Ulid::new();
        let (long, p, _) = stale_overlap(g);
        let data = FakeData::with(vec![long, p.clone()]);
        let hooks = IntervalChainMaintainer::default();

        // carries an id, but the data layer has no stored copy to compare against
        let orphan = persisted(g, 150 * M, None);
        let errors = hooks.on_save(&data, &orphan).await.unwrap_err();
        assert_eq!(
            errors.for_field(Field::DateFrom).collect::<Vec<_>>(),
            vec![&Message::OtherComponentsExist]
        );
        assert_eq!(data.stored(p.id).date_to, Some(149 * M));
    }

    #[tokio::test]
    async fn on_delete_rejects_closed_interval() {
        let g = Ulid::new();
        let a = persisted(g, 0, Some(99 * M));
        let b = persisted(g, 100 * M, Some(200 * M));
        let data = FakeData::with(vec![a.clone(), b.clone()]);
        let hooks = IntervalChainMaintainer::default();

        let errors = hooks.on_delete(&data, &b).await.unwrap_err();
        assert_eq!(errors.global_errors(), &[Message::HasDates]);
        assert_eq!(data.save_count(), 0);
        assert_eq!(data.stored(a.id).date_to, Some(99 * M));
    }

    #[tokio::test]
    async fn on_delete_tail_reopens_predecessor() {
        let g = Ulid::new();
        let a = persisted(g, 0, Some(99 * M));
        let b = persisted(g, 100 * M, None);
        let data = FakeData::with(vec![a.clone(), b.clone()]);
        let hooks = IntervalChainMaintainer::default();

        assert!(hooks.on_delete(&data, &b).await.is_ok());
        assert_eq!(data.stored(a.id).date_to, None);
    }

    #[tokio::test]
    async fn on_delete_ignores_failed_reopen() {
        let g = Ulid::new();
        let a = persisted(g, 0, Some(99 * M));
        let b = persisted(g, 100 * M, None);
        let mut data = FakeData::with(vec![a, b.clone()]);
        data.fail_saves = true;
        let hooks = IntervalChainMaintainer::default();

        assert!(hooks.on_delete(&data, &b).await.is_ok());
    }

    #[tokio::test]
    async fn on_delete_ignores_failed_lookup() {
        let g = Ulid::new();
        let a = persisted(g, 0, Some(99 * M));
        let b = persisted(g, 100 * M, None);
        let mut data = FakeData::with(vec![a.clone(), b.clone()]);
        data.fail_queries = true;
        let hooks = IntervalChainMaintainer::default();

        assert!(hooks.on_delete(&data, &b).await.is_ok());
        assert_eq!(data.stored(a.id).date_to, Some(99 * M));
    }

    #[test]
    fn validates_with_rejects_inverted_range() {
        let hooks = IntervalChainMaintainer::default();
        let g = Ulid::new();

        let errors = hooks
            .validates_with(&IntervalRecord::new(g, 100, Some(99)))
            .unwrap_err();
        assert_eq!(
            errors.field_errors(),
            &[(Field::DateFrom, Message::DatesInvalid)]
        );

        assert!(hooks.validates_with(&IntervalRecord::new(g, 100, Some(100))).is_ok());
        assert!(hooks.validates_with(&IntervalRecord::new(g, 100, None)).is_ok());
    }
}
