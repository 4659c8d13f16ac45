use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    NotFound(Ulid),
    /// Delete requested for a record that was never saved.
    NotPersisted,
    /// An update tried to move a component to another group.
    GroupKeyChanged(Ulid),
    /// A unit of work was handed a record of a group it does not hold.
    GroupMismatch {
        expected: Ulid,
        found: Ulid,
    },
    LimitExceeded(&'static str),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::NotPersisted => write!(f, "record has no id"),
            EngineError::GroupKeyChanged(id) => {
                write!(f, "cannot move component {id} to another group")
            }
            EngineError::GroupMismatch { expected, found } => {
                write!(f, "unit of work holds group {expected}, got record of group {found}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
