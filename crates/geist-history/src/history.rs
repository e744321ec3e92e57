//! The history contract shared by every backend.

use geist_edit::{DimensionId, Step, Task, TaskCx};
use geist_geom::{BlockBox, IVec3};

use crate::error::{HistoryError, Result};
use crate::point::{PointId, ThreadKey};

/// A resumable history operation, driven by a scheduler or
/// [`geist_edit::run_to_completion`].
pub type HistoryTask<T> = Box<dyn Task<Output = T, Error = HistoryError>>;

/// Undo/redo bookkeeping for block edits.
///
/// A point is opened with [`History::record`], told which blocks it is
/// about to change with the `track_*` calls, and then either committed or
/// canceled. Tracking tasks must run to completion before the tracked
/// blocks are modified: they capture the pre-edit state.
pub trait History {
    fn record(&mut self, thread: ThreadKey) -> Result<PointId>;

    /// Capture the after-state of every tracked block and push the point
    /// onto the undo stack.
    fn commit(&mut self, point: PointId) -> Result<HistoryTask<()>>;

    /// Drop an open point, releasing whatever it captured.
    fn cancel(&mut self, point: PointId) -> Result<()>;

    fn track_region(&mut self, point: PointId, dim: DimensionId, region: BlockBox) -> Result<HistoryTask<()>>;

    fn track_blocks(&mut self, point: PointId, dim: DimensionId, blocks: &[IVec3]) -> Result<HistoryTask<()>>;

    /// Remember the selection as it is now so undo can bring it back.
    fn track_selection(&mut self, point: PointId) -> Result<()>;

    /// Resolves to `false` when there is nothing to undo.
    fn undo(&mut self) -> Result<HistoryTask<bool>>;

    /// Resolves to `false` when there is nothing to redo.
    fn redo(&mut self) -> Result<HistoryTask<bool>>;

    fn clear(&mut self) -> Result<()>;

    fn is_recording(&self) -> bool;

    fn active_points_in_thread(&self, thread: ThreadKey) -> Vec<PointId>;
}

/// Task that finishes in its first step by running a closure.
pub struct OnceTask<F> {
    f: Option<F>,
}

impl<F> OnceTask<F> {
    pub fn new<T>(f: F) -> Self
    where
        F: FnOnce(&mut TaskCx<'_>) -> Result<T>,
    {
        Self { f: Some(f) }
    }
}

impl<T, F> Task for OnceTask<F>
where
    F: FnOnce(&mut TaskCx<'_>) -> Result<T>,
{
    type Output = T;
    type Error = HistoryError;

    fn step(&mut self, cx: &mut TaskCx<'_>) -> Result<Step<T>> {
        match self.f.take() {
            Some(f) => f(cx).map(Step::Done),
            None => Err(HistoryError::Busy),
        }
    }
}

/// A task already holding its result.
pub fn ready<T: 'static>(value: T) -> HistoryTask<T> {
    Box::new(OnceTask::new(move |_| Ok(value)))
}
