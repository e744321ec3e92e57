use geist_geom::IVec3;
use thiserror::Error;

use crate::access::DimensionId;

/// Failures of the block access layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("region at {pos} in dimension {dim} is not loaded")]
    Unloaded { dim: DimensionId, pos: IVec3 },
    #[error("position {pos} is outside the world height range")]
    OutOfBounds { pos: IVec3 },
    #[error("unknown block id {0}")]
    UnknownBlock(u16),
    #[error("region buffer was already released")]
    BufferReleased,
}

pub type Result<T> = std::result::Result<T, WorldError>;
