use geist_edit::WorldError;
use thiserror::Error;

use crate::point::PointId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("history point {0} was not being recorded")]
    NotRecording(PointId),
    #[error("history point {0} was still being recorded")]
    StillRecording(PointId),
    #[error("operation touches {requested} blocks, over the change limit of {limit}")]
    ChangeLimitExceeded { limit: u64, requested: u64 },
    #[error(transparent)]
    World(#[from] WorldError),
    #[error("history is busy replaying or committing")]
    Busy,
    #[error("no complete selection")]
    NoSelection,
    #[error("host history failed: {0}")]
    Host(String),
}

pub type Result<T> = std::result::Result<T, HistoryError>;
