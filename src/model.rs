use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;

/// A time-bounded component assignment: one link of a group's interval chain.
///
/// The range is closed, `[date_from, date_to]`. A missing `date_to` makes the
/// record open-ended (the tail of its chain).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalRecord {
    /// Absent until the data layer persists the record.
    pub id: Option<Ulid>,
    /// Owning parent entity (workstation type).
    pub group_key: Ulid,
    pub date_from: Ms,
    pub date_to: Option<Ms>,
}

impl IntervalRecord {
    pub fn new(group_key: Ulid, date_from: Ms, date_to: Option<Ms>) -> Self {
        Self {
            id: None,
            group_key,
            date_from,
            date_to,
        }
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn is_open_ended(&self) -> bool {
        self.date_to.is_none()
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.date_from <= t && self.date_to.is_none_or(|to| t <= to)
    }

    /// Chain order: by start, ties broken by id.
    fn sort_key(&self) -> (Ms, Option<Ulid>) {
        (self.date_from, self.id)
    }
}

/// All persisted records of one group, sorted by `(date_from, id)`.
#[derive(Debug, Clone)]
pub struct GroupChain {
    pub group_key: Ulid,
    records: Vec<IntervalRecord>,
}

impl GroupChain {
    pub fn new(group_key: Ulid) -> Self {
        Self {
            group_key,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[IntervalRecord] {
        &self.records
    }

    pub fn get(&self, id: Ulid) -> Option<&IntervalRecord> {
        self.records.iter().find(|r| r.id == Some(id))
    }

    /// Insert or replace (matched by id) keeping sort order.
    pub fn upsert(&mut self, record: IntervalRecord) {
        if let Some(id) = record.id {
            self.remove(id);
        }
        let key = record.sort_key();
        let pos = self
            .records
            .binary_search_by_key(&key, |r| r.sort_key())
            .unwrap_or_else(|e| e);
        self.records.insert(pos, record);
    }

    /// Remove record by id.
    pub fn remove(&mut self, id: Ulid) -> Option<IntervalRecord> {
        let pos = self.records.iter().position(|r| r.id == Some(id))?;
        Some(self.records.remove(pos))
    }

    /// Immediate predecessor by start time: the greatest `(date_from, id)`
    /// with `date_from` strictly below `date_from`, skipping `exclude`.
    pub fn previous(&self, date_from: Ms, exclude: Option<Ulid>) -> Option<&IntervalRecord> {
        self.previous_matching(date_from, |r| exclude.is_none() || r.id != exclude)
    }

    /// Like [`GroupChain::previous`], but only records accepted by `keep` count.
    pub fn previous_matching(
        &self,
        date_from: Ms,
        keep: impl Fn(&IntervalRecord) -> bool,
    ) -> Option<&IntervalRecord> {
        let bound = self.records.partition_point(|r| r.date_from < date_from);
        self.records[..bound].iter().rev().find(|r| keep(*r))
    }

    /// Records whose range contains `t`, skipping `exclude`.
    /// Only records starting at or before `t` can match.
    pub fn containing(&self, t: Ms, exclude: Option<Ulid>) -> impl Iterator<Item = &IntervalRecord> {
        let bound = self.records.partition_point(|r| r.date_from <= t);
        self.records[..bound]
            .iter()
            .filter(move |r| r.contains_instant(t) && (exclude.is_none() || r.id != exclude))
    }
}

/// A pending write against a group chain, applied on commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    Saved(IntervalRecord),
    Deleted { id: Ulid, group_key: Ulid },
}

impl Change {
    pub fn group_key(&self) -> Ulid {
        match self {
            Change::Saved(record) => record.group_key,
            Change::Deleted { group_key, .. } => *group_key,
        }
    }
}
