//! Block access layer: the host world seam, an in-memory chunked world,
//! write-behind buffering, region snapshots and the cooperative scheduler
//! that long edits run on.
#![forbid(unsafe_code)]

pub mod access;
pub mod error;
pub mod raycast;
pub mod region;
pub mod store;
pub mod task;
pub mod unit;
pub mod write_buffer;

pub use access::{BlockAccess, BlockFilter, DimensionId};
pub use error::WorldError;
pub use raycast::{RayHit, raycast_between, raycast_first_hit};
pub use region::{BufferId, BufferStats, BufferStore, CaptureTask, PlaybackTask, RegionBuffer, SharedBuffers};
pub use store::{EditStore, EditStoreStats};
pub use task::{Budget, JobHandle, JobId, Scheduler, Step, Task, TaskCx, TickReport, run_to_completion};
pub use unit::BlockUnit;
pub use write_buffer::WriteBuffer;
