//! Per-player editing state: history, selection, gradients and clipboard.

use geist_blocks::BlockRegistry;
use geist_edit::{BlockAccess, BufferStore, RegionBuffer, run_to_completion};
use geist_geom::{IVec3, Vec3};
use geist_pattern::{EvalContext, GradientRegistry, Mask, Pattern};

use crate::config::HistoryConfig;
use crate::error::{HistoryError, Result};
use crate::history::History;
use crate::point::{PointId, ThreadKey};
use crate::ring::RingHistory;
use crate::selection::{Selection, SharedSelection};

pub struct Session {
    history: Box<dyn History>,
    selection: SharedSelection,
    gradients: GradientRegistry,
    clipboard: Option<RegionBuffer>,
    placement: IVec3,
    facing: Vec3,
    blocks_per_tick: usize,
    thread: ThreadKey,
}

impl Session {
    /// Session on the default ring history.
    pub fn new(config: HistoryConfig) -> Self {
        let selection = Selection::default().shared();
        let blocks_per_tick = config.blocks_per_tick;
        let history = RingHistory::new(config, BufferStore::shared()).with_selection(selection.clone());
        Self::with_history(Box::new(history), selection, blocks_per_tick)
    }

    /// Session on any backend. `selection` should be the handle the
    /// backend snapshots.
    pub fn with_history(history: Box<dyn History>, selection: SharedSelection, blocks_per_tick: usize) -> Self {
        Self {
            history,
            selection,
            gradients: GradientRegistry::new(),
            clipboard: None,
            placement: IVec3::ZERO,
            facing: Vec3::new(0.0, 0.0, 1.0),
            blocks_per_tick: blocks_per_tick.max(1),
            thread: ThreadKey::MAIN,
        }
    }

    pub fn with_gradients(mut self, gradients: GradientRegistry) -> Self {
        self.gradients = gradients;
        self
    }

    pub fn history(&self) -> &dyn History {
        &*self.history
    }

    pub fn history_mut(&mut self) -> &mut dyn History {
        &mut *self.history
    }

    pub fn selection(&self) -> Selection {
        self.selection.borrow().clone()
    }

    pub fn set_selection(&mut self, selection: Selection) {
        *self.selection.borrow_mut() = selection;
    }

    pub fn gradients(&self) -> &GradientRegistry {
        &self.gradients
    }

    pub fn gradients_mut(&mut self) -> &mut GradientRegistry {
        &mut self.gradients
    }

    pub fn clipboard(&self) -> Option<&RegionBuffer> {
        self.clipboard.as_ref()
    }

    /// Where the player stands and looks.
    pub fn set_view(&mut self, placement: IVec3, facing: Vec3) {
        self.placement = placement;
        self.facing = facing;
    }

    /// Evaluation context carrying this session's view, gradients and
    /// clipboard, ranged over the selection when it is complete.
    pub fn context<'a>(&'a self, registry: &'a BlockRegistry, seed: u64) -> EvalContext<'a> {
        let sel = self.selection();
        let mut cx = EvalContext::seeded(registry, seed)
            .with_dimension(sel.dim)
            .with_placement(self.placement)
            .with_facing(self.facing)
            .with_gradients(&self.gradients)
            .with_clipboard(self.clipboard.as_ref());
        if let Some(range) = sel.region() {
            cx = cx.with_range(range);
        }
        cx
    }

    /// Copy the selected blocks into the clipboard.
    pub fn copy(&mut self, world: &dyn BlockAccess) -> Result<usize> {
        let sel = self.selection();
        let region = sel.region().ok_or(HistoryError::NoSelection)?;
        let buffer = RegionBuffer::capture(world, sel.dim, region)?;
        let n = buffer.volume();
        self.clipboard = Some(buffer);
        Ok(n)
    }

    /// Apply `pattern` to the selection as one undoable edit. Returns how
    /// many blocks changed type.
    ///
    /// Volume selections track and edit only their listed blocks.
    pub fn fill(
        &mut self,
        world: &mut dyn BlockAccess,
        registry: &BlockRegistry,
        pattern: &Pattern,
        mask: Option<&Mask>,
        seed: u64,
    ) -> Result<u64> {
        let sel = self.selection();
        let region = sel.region().ok_or(HistoryError::NoSelection)?;
        let point = self.history.record(self.thread)?;
        self.history.track_selection(point)?;
        let track = match sel.blocks() {
            Some(blocks) => self.history.track_blocks(point, sel.dim, blocks),
            None => self.history.track_region(point, sel.dim, region),
        };
        let mut track = match track {
            Ok(t) => t,
            Err(e) => {
                self.history.cancel(point)?;
                return Err(e);
            }
        };
        if let Err(e) = run_to_completion(&mut track, world, self.blocks_per_tick) {
            self.abandon(point)?;
            return Err(e);
        }
        let changed = {
            let mut cx = self.context(registry, seed);
            match sel.blocks() {
                Some(blocks) => {
                    let mut n = 0;
                    for p in blocks {
                        if mask.is_some_and(|m| !m.matches_at(&*world, *p, &mut cx)) {
                            continue;
                        }
                        if pattern.set_block(world, *p, &mut cx) {
                            n += 1;
                        }
                    }
                    Ok(n)
                }
                None => pattern.fill_blocks(world, &region, mask, &mut cx),
            }
        };
        let changed = match changed {
            Ok(n) => n,
            Err(e) => {
                log::warn!(target: "history", "fill aborted: {e}");
                self.history.cancel(point)?;
                return Err(e.into());
            }
        };
        let mut commit = self.history.commit(point)?;
        run_to_completion(&mut commit, world, self.blocks_per_tick)?;
        let touched = sel.blocks().map_or(region.volume(), |b| b.len() as u64);
        log::info!(target: "history", "filled {touched} blocks with {pattern}, {changed} changed");
        Ok(changed)
    }

    /// Cancel `point` after a failed step. Backends that already dropped
    /// it report `NotRecording`, which is fine here.
    fn abandon(&mut self, point: PointId) -> Result<()> {
        match self.history.cancel(point) {
            Ok(()) | Err(HistoryError::NotRecording(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn undo(&mut self, world: &mut dyn BlockAccess) -> Result<bool> {
        let mut task = self.history.undo()?;
        run_to_completion(&mut task, world, self.blocks_per_tick)
    }

    pub fn redo(&mut self, world: &mut dyn BlockAccess) -> Result<bool> {
        let mut task = self.history.redo()?;
        run_to_completion(&mut task, world, self.blocks_per_tick)
    }
}
