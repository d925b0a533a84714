#![forbid(unsafe_code)]

use cm_core::{ChangesetIdError, InputError, ObjectKind};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Sequencer(#[from] SequencerError),
    /// The directive is well-formed but cannot apply to the current data.
    #[error("{0}")]
    Rejected(String),
    #[error("unknown {kind} {id}")]
    UnknownId { kind: ObjectKind, id: i64 },
}

impl StoreError {
    /// Validation-class errors leave a directive `skipped`; everything else
    /// is a persistence failure.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StoreError::Rejected(_) | StoreError::Sequencer(_) | StoreError::UnknownId { .. }
        )
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            StoreError::Sql(rusqlite::Error::SqliteFailure(code, _))
                if matches!(code.code, rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
        )
    }

    pub fn is_constraint_violation(&self) -> bool {
        match self {
            StoreError::Sql(rusqlite::Error::SqliteFailure(code, message)) => {
                code.code == rusqlite::ErrorCode::ConstraintViolation
                    || message.as_deref().is_some_and(|value| {
                        value.contains("FOREIGN KEY constraint failed")
                            || value.contains("UNIQUE constraint failed")
                    })
            }
            _ => false,
        }
    }
}

impl From<ChangesetIdError> for StoreError {
    fn from(value: ChangesetIdError) -> Self {
        StoreError::Input(InputError::from(value))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SequencerError {
    #[error("no nodes, ways, or shapes")]
    NoRelations,
    #[error("invalid relations: {}", entries.join("; "))]
    InvalidRelation { entries: Vec<String> },
    #[error("no member at sequence {sequence}")]
    UnknownSequence { sequence: u32 },
}
