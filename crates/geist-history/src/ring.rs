//! Default history backend: region snapshots kept in a bounded ring.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use geist_edit::{
    BufferId, CaptureTask, DimensionId, PlaybackTask, RegionBuffer, SharedBuffers, Step, Task, TaskCx,
};
use geist_geom::{BlockBox, IVec3};
use hashbrown::HashMap;

use crate::config::HistoryConfig;
use crate::error::{HistoryError, Result};
use crate::history::{History, HistoryTask, ready};
use crate::point::{PointId, ThreadKey};
use crate::selection::{Selection, SharedSelection};

struct OpenPoint {
    thread: ThreadKey,
    undo: Vec<BufferId>,
    tracked: u64,
    selection: Option<Selection>,
}

struct Entry {
    point: PointId,
    undo: Vec<BufferId>,
    redo: Vec<BufferId>,
    /// Selection before and after the edit.
    selection: Option<(Selection, Selection)>,
}

struct RingState {
    config: HistoryConfig,
    buffers: SharedBuffers,
    selection: Option<SharedSelection>,
    next_point: u64,
    open: HashMap<PointId, OpenPoint>,
    entries: VecDeque<Entry>,
    // entries[..cursor] are applied
    cursor: usize,
    committing: usize,
    replaying: bool,
}

impl RingState {
    fn open_point(&mut self, point: PointId) -> Result<&mut OpenPoint> {
        self.open.get_mut(&point).ok_or(HistoryError::NotRecording(point))
    }

    fn release_all(&self, ids: &[BufferId]) {
        let mut store = self.buffers.borrow_mut();
        for id in ids {
            store.release(*id);
        }
    }

    /// Forget an open point and free its buffers.
    fn drop_point(&mut self, point: PointId) -> bool {
        match self.open.remove(&point) {
            Some(p) => {
                self.release_all(&p.undo);
                true
            }
            None => false,
        }
    }

    fn release_entry(&self, entry: &Entry) {
        self.release_all(&entry.undo);
        self.release_all(&entry.redo);
    }

    fn push_entry(&mut self, entry: Entry) {
        while self.entries.len() > self.cursor {
            if let Some(stale) = self.entries.pop_back() {
                log::debug!(target: "history", "discard redo of point {}", stale.point);
                self.release_entry(&stale);
            }
        }
        self.entries.push_back(entry);
        while self.entries.len() > self.config.max_history_size {
            let Some(old) = self.entries.pop_front() else {
                break;
            };
            log::info!(target: "history", "evict point {}", old.point);
            self.release_entry(&old);
        }
        self.cursor = self.entries.len();
    }

    fn check_idle(&self) -> Result<()> {
        if self.replaying || self.committing > 0 {
            return Err(HistoryError::Busy);
        }
        match self.open.keys().min() {
            Some(p) => Err(HistoryError::StillRecording(*p)),
            None => Ok(()),
        }
    }

    fn current_selection(&self) -> Option<Selection> {
        self.selection.as_ref().map(|s| s.borrow().clone())
    }
}

/// Ring-buffer history over a shared [`geist_edit::BufferStore`].
///
/// Cloning yields another handle to the same history.
#[derive(Clone)]
pub struct RingHistory {
    state: Rc<RefCell<RingState>>,
}

impl RingHistory {
    pub fn new(config: HistoryConfig, buffers: SharedBuffers) -> Self {
        Self {
            state: Rc::new(RefCell::new(RingState {
                config,
                buffers,
                selection: None,
                next_point: 1,
                open: HashMap::new(),
                entries: VecDeque::new(),
                cursor: 0,
                committing: 0,
                replaying: false,
            })),
        }
    }

    /// Snapshot and restore this selection alongside block edits.
    pub fn with_selection(self, selection: SharedSelection) -> Self {
        self.state.borrow_mut().selection = Some(selection);
        self
    }

    pub fn buffers(&self) -> SharedBuffers {
        self.state.borrow().buffers.clone()
    }

    pub fn config(&self) -> HistoryConfig {
        self.state.borrow().config.clone()
    }

    /// Committed points, applied or not.
    pub fn len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn undo_len(&self) -> usize {
        self.state.borrow().cursor
    }

    pub fn redo_len(&self) -> usize {
        let st = self.state.borrow();
        st.entries.len() - st.cursor
    }

    fn track(&mut self, point: PointId, buffer: RegionBuffer) -> Result<HistoryTask<()>> {
        let mut st = self.state.borrow_mut();
        let limit = st.config.change_limit;
        let buffers = st.buffers.clone();
        let open = st.open_point(point)?;
        let volume = buffer.volume() as u64;
        let requested = open.tracked + volume;
        if requested > limit {
            log::debug!(target: "history", "point {point} refused {volume} blocks: {requested} > {limit}");
            return Err(HistoryError::ChangeLimitExceeded { limit, requested });
        }
        open.tracked = requested;
        let capture = CaptureTask::with_buffer(buffers, buffer);
        open.undo.push(capture.buffer());
        log::debug!(target: "history", "point {point} tracks {volume} blocks ({requested} total)");
        Ok(Box::new(TrackTask {
            state: self.state.clone(),
            point,
            capture,
        }))
    }

    fn replay(&mut self, direction: Direction) -> Result<HistoryTask<bool>> {
        let mut st = self.state.borrow_mut();
        st.check_idle()?;
        let index = match direction {
            Direction::Undo if st.cursor > 0 => st.cursor - 1,
            Direction::Redo if st.cursor < st.entries.len() => st.cursor,
            _ => return Ok(ready(false)),
        };
        let entry = &st.entries[index];
        let point = entry.point;
        let pending: VecDeque<BufferId> = match direction {
            // Later snapshots of overlapping regions hold newer pre-states.
            Direction::Undo => entry.undo.iter().rev().copied().collect(),
            Direction::Redo => entry.redo.iter().copied().collect(),
        };
        st.replaying = true;
        log::debug!(target: "history", "{direction:?} point {point} ({} buffers)", pending.len());
        Ok(Box::new(ReplayTask {
            state: self.state.clone(),
            direction,
            point,
            pending,
            current: None,
            done: false,
        }))
    }
}

impl History for RingHistory {
    fn record(&mut self, thread: ThreadKey) -> Result<PointId> {
        let mut st = self.state.borrow_mut();
        if st.replaying {
            return Err(HistoryError::Busy);
        }
        if let Some((id, _)) = st.open.iter().find(|(_, p)| p.thread == thread) {
            return Err(HistoryError::StillRecording(*id));
        }
        let id = PointId(st.next_point);
        st.next_point += 1;
        st.open.insert(
            id,
            OpenPoint {
                thread,
                undo: Vec::new(),
                tracked: 0,
                selection: None,
            },
        );
        log::debug!(target: "history", "record point {id} on thread {}", thread.0);
        Ok(id)
    }

    fn commit(&mut self, point: PointId) -> Result<HistoryTask<()>> {
        let mut st = self.state.borrow_mut();
        let Some(open) = st.open.remove(&point) else {
            return Err(HistoryError::NotRecording(point));
        };
        let templates: Option<VecDeque<RegionBuffer>> = {
            let store = st.buffers.borrow();
            open.undo
                .iter()
                .map(|id| store.get(*id).filter(|b| b.is_complete()).map(RegionBuffer::empty_like))
                .collect()
        };
        let Some(templates) = templates else {
            // a tracking task has not finished yet
            st.open.insert(point, open);
            return Err(HistoryError::Busy);
        };
        let selection = open.selection.zip(st.current_selection());
        st.committing += 1;
        log::debug!(target: "history", "commit point {point} ({} buffers)", templates.len());
        Ok(Box::new(CommitTask {
            state: self.state.clone(),
            point,
            undo: open.undo,
            redo: Vec::new(),
            templates,
            current: None,
            selection,
            done: false,
        }))
    }

    fn cancel(&mut self, point: PointId) -> Result<()> {
        if !self.state.borrow_mut().drop_point(point) {
            return Err(HistoryError::NotRecording(point));
        }
        log::debug!(target: "history", "cancel point {point}");
        Ok(())
    }

    fn track_region(&mut self, point: PointId, dim: DimensionId, region: BlockBox) -> Result<HistoryTask<()>> {
        self.track(point, RegionBuffer::new(dim, region))
    }

    fn track_blocks(&mut self, point: PointId, dim: DimensionId, blocks: &[IVec3]) -> Result<HistoryTask<()>> {
        match RegionBuffer::sparse(dim, blocks.to_vec()) {
            Some(buffer) => self.track(point, buffer),
            None => {
                self.state.borrow_mut().open_point(point)?;
                Ok(ready(()))
            }
        }
    }

    fn track_selection(&mut self, point: PointId) -> Result<()> {
        let mut st = self.state.borrow_mut();
        let current = st.current_selection();
        let open = st.open_point(point)?;
        if open.selection.is_none() {
            open.selection = current;
        }
        Ok(())
    }

    fn undo(&mut self) -> Result<HistoryTask<bool>> {
        self.replay(Direction::Undo)
    }

    fn redo(&mut self) -> Result<HistoryTask<bool>> {
        self.replay(Direction::Redo)
    }

    fn clear(&mut self) -> Result<()> {
        let mut st = self.state.borrow_mut();
        if st.replaying || st.committing > 0 {
            return Err(HistoryError::Busy);
        }
        let entries = std::mem::take(&mut st.entries);
        for e in &entries {
            st.release_entry(e);
        }
        st.cursor = 0;
        log::info!(target: "history", "cleared {} points", entries.len());
        Ok(())
    }

    fn is_recording(&self) -> bool {
        !self.state.borrow().open.is_empty()
    }

    fn active_points_in_thread(&self, thread: ThreadKey) -> Vec<PointId> {
        let st = self.state.borrow();
        let mut out: Vec<PointId> = st
            .open
            .iter()
            .filter(|(_, p)| p.thread == thread)
            .map(|(id, _)| *id)
            .collect();
        out.sort();
        out
    }
}

/// Pre-edit capture of one tracked region. A world error cancels the point.
struct TrackTask {
    state: Rc<RefCell<RingState>>,
    point: PointId,
    capture: CaptureTask,
}

impl Task for TrackTask {
    type Output = ();
    type Error = HistoryError;

    fn step(&mut self, cx: &mut TaskCx<'_>) -> Result<Step<()>> {
        match self.capture.step(cx) {
            Ok(Step::Yield) => Ok(Step::Yield),
            Ok(Step::Done(_)) => Ok(Step::Done(())),
            Err(e) => {
                if self.state.borrow_mut().drop_point(self.point) {
                    log::warn!(target: "history", "point {} canceled: {e}", self.point);
                }
                Err(e.into())
            }
        }
    }
}

struct CommitTask {
    state: Rc<RefCell<RingState>>,
    point: PointId,
    undo: Vec<BufferId>,
    redo: Vec<BufferId>,
    templates: VecDeque<RegionBuffer>,
    current: Option<CaptureTask>,
    selection: Option<(Selection, Selection)>,
    done: bool,
}

impl CommitTask {
    /// Give up on the point, releasing everything it holds.
    fn abort(&mut self) {
        self.done = true;
        let Ok(mut st) = self.state.try_borrow_mut() else {
            return;
        };
        st.committing = st.committing.saturating_sub(1);
        st.release_all(&self.undo);
        st.release_all(&self.redo);
        if let Some(c) = self.current.take() {
            st.release_all(&[c.buffer()]);
        }
    }

    fn finish(&mut self) {
        self.done = true;
        let mut st = self.state.borrow_mut();
        st.committing = st.committing.saturating_sub(1);
        let entry = Entry {
            point: self.point,
            undo: std::mem::take(&mut self.undo),
            redo: std::mem::take(&mut self.redo),
            selection: self.selection.take(),
        };
        log::info!(target: "history", "committed point {} ({} buffers)", self.point, entry.undo.len());
        st.push_entry(entry);
    }
}

impl Task for CommitTask {
    type Output = ();
    type Error = HistoryError;

    fn step(&mut self, cx: &mut TaskCx<'_>) -> Result<Step<()>> {
        loop {
            if self.current.is_none() {
                let Some(template) = self.templates.pop_front() else {
                    break;
                };
                let buffers = self.state.borrow().buffers.clone();
                self.current = Some(CaptureTask::with_buffer(buffers, template));
            }
            let Some(capture) = self.current.as_mut() else {
                break;
            };
            match capture.step(cx) {
                Ok(Step::Yield) => return Ok(Step::Yield),
                Ok(Step::Done(id)) => {
                    self.redo.push(id);
                    self.current = None;
                }
                Err(e) => {
                    log::warn!(target: "history", "commit of point {} failed: {e}", self.point);
                    self.abort();
                    return Err(e.into());
                }
            }
        }
        self.finish();
        Ok(Step::Done(()))
    }
}

impl Drop for CommitTask {
    fn drop(&mut self) {
        if !self.done {
            log::warn!(target: "history", "commit of point {} abandoned", self.point);
            self.abort();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

struct ReplayTask {
    state: Rc<RefCell<RingState>>,
    direction: Direction,
    point: PointId,
    pending: VecDeque<BufferId>,
    current: Option<PlaybackTask>,
    done: bool,
}

impl ReplayTask {
    fn finish(&mut self) {
        self.done = true;
        let mut st = self.state.borrow_mut();
        st.replaying = false;
        let index = match self.direction {
            Direction::Undo => st.cursor.saturating_sub(1),
            Direction::Redo => st.cursor,
        };
        let restored = st.entries.get(index).and_then(|e| e.selection.clone()).map(|(before, after)| {
            match self.direction {
                Direction::Undo => before,
                Direction::Redo => after,
            }
        });
        if let (Some(sel), Some(handle)) = (restored, &st.selection) {
            *handle.borrow_mut() = sel;
        }
        st.cursor = match self.direction {
            Direction::Undo => index,
            Direction::Redo => (index + 1).min(st.entries.len()),
        };
        log::info!(target: "history", "{:?} of point {} complete", self.direction, self.point);
    }
}

impl Task for ReplayTask {
    type Output = bool;
    type Error = HistoryError;

    fn step(&mut self, cx: &mut TaskCx<'_>) -> Result<Step<bool>> {
        loop {
            if self.current.is_none() {
                let Some(id) = self.pending.pop_front() else {
                    break;
                };
                let buffers = self.state.borrow().buffers.clone();
                self.current = Some(PlaybackTask::new(buffers, id));
            }
            let Some(playback) = self.current.as_mut() else {
                break;
            };
            match playback.step(cx) {
                Ok(Step::Yield) => return Ok(Step::Yield),
                Ok(Step::Done(_)) => self.current = None,
                Err(e) => {
                    self.done = true;
                    self.state.borrow_mut().replaying = false;
                    log::warn!(target: "history", "{:?} of point {} failed: {e}", self.direction, self.point);
                    return Err(e.into());
                }
            }
        }
        self.finish();
        Ok(Step::Done(true))
    }
}

impl Drop for ReplayTask {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        log::warn!(target: "history", "{:?} of point {} abandoned part way", self.direction, self.point);
        if let Ok(mut st) = self.state.try_borrow_mut() {
            st.replaying = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geist_blocks::Block;
    use geist_edit::{BlockAccess, BufferStore, EditStore, run_to_completion};

    const DIM: DimensionId = DimensionId::OVERWORLD;

    fn ring(config: HistoryConfig) -> RingHistory {
        RingHistory::new(config, BufferStore::shared())
    }

    fn cube(n: i32) -> BlockBox {
        BlockBox::from_corners(IVec3::ZERO, IVec3::splat(n - 1))
    }

    #[test]
    fn one_open_point_per_thread() {
        let mut h = ring(HistoryConfig::default());
        let a = h.record(ThreadKey::MAIN).unwrap();
        assert_eq!(h.record(ThreadKey::MAIN), Err(HistoryError::StillRecording(a)));
        let b = h.record(ThreadKey(7)).unwrap();
        assert_ne!(a, b);
        assert_eq!(h.active_points_in_thread(ThreadKey(7)), vec![b]);
        assert!(h.is_recording());
        h.cancel(a).unwrap();
        assert_eq!(h.cancel(a), Err(HistoryError::NotRecording(a)));
        assert!(matches!(h.commit(a), Err(HistoryError::NotRecording(_))));
        h.cancel(b).unwrap();
        assert!(!h.is_recording());
    }

    #[test]
    fn nothing_to_undo_or_redo() {
        let mut h = ring(HistoryConfig::default());
        let mut w = EditStore::new(16, 16, 16);
        assert!(!run_to_completion(&mut h.undo().unwrap(), &mut w, 8).unwrap());
        assert!(!run_to_completion(&mut h.redo().unwrap(), &mut w, 8).unwrap());
    }

    #[test]
    fn undo_waits_for_open_points() {
        let mut h = ring(HistoryConfig::default());
        let p = h.record(ThreadKey::MAIN).unwrap();
        assert!(matches!(h.undo(), Err(HistoryError::StillRecording(q)) if q == p));
        h.cancel(p).unwrap();
        assert!(h.undo().is_ok());
    }

    #[test]
    fn commit_before_capture_finishes_is_refused() {
        let mut h = ring(HistoryConfig::default());
        let mut w = EditStore::new(16, 16, 16);
        let p = h.record(ThreadKey::MAIN).unwrap();
        let mut track = h.track_region(p, DIM, cube(4)).unwrap();
        assert!(matches!(h.commit(p), Err(HistoryError::Busy)));
        run_to_completion(&mut track, &mut w, 16).unwrap();
        run_to_completion(&mut h.commit(p).unwrap(), &mut w, 16).unwrap();
        assert_eq!(h.undo_len(), 1);
    }

    #[test]
    fn abandoned_commit_releases_everything() {
        let mut h = ring(HistoryConfig::default());
        let mut w = EditStore::new(16, 16, 16);
        let p = h.record(ThreadKey::MAIN).unwrap();
        run_to_completion(&mut h.track_region(p, DIM, cube(3)).unwrap(), &mut w, 64).unwrap();
        let mut commit = h.commit(p).unwrap();
        let mut cx = TaskCx::new(&mut w, geist_edit::Budget::new(5));
        assert_eq!(commit.step(&mut cx).unwrap(), Step::Yield);
        drop(commit);
        assert_eq!(h.buffers().borrow().stats().live, 0);
        assert!(h.is_empty());
        assert!(h.undo().is_ok());
    }

    #[test]
    fn new_commit_discards_redo_tail() {
        let mut h = ring(HistoryConfig::default());
        let mut w = EditStore::new(16, 16, 16);
        for i in 0..2u16 {
            let p = h.record(ThreadKey::MAIN).unwrap();
            run_to_completion(&mut h.track_region(p, DIM, cube(2)).unwrap(), &mut w, 64).unwrap();
            w.fill(DIM, &cube(2), Block::new(i + 1, 0), None).unwrap();
            run_to_completion(&mut h.commit(p).unwrap(), &mut w, 64).unwrap();
        }
        assert!(run_to_completion(&mut h.undo().unwrap(), &mut w, 64).unwrap());
        assert_eq!(h.redo_len(), 1);
        let p = h.record(ThreadKey::MAIN).unwrap();
        run_to_completion(&mut h.track_region(p, DIM, cube(2)).unwrap(), &mut w, 64).unwrap();
        run_to_completion(&mut h.commit(p).unwrap(), &mut w, 64).unwrap();
        assert_eq!((h.len(), h.undo_len(), h.redo_len()), (2, 2, 0));
        assert_eq!(h.buffers().borrow().stats().live, 4);
    }

    #[test]
    fn clear_releases_buffers() {
        let mut h = ring(HistoryConfig::default());
        let mut w = EditStore::new(16, 16, 16);
        let p = h.record(ThreadKey::MAIN).unwrap();
        run_to_completion(&mut h.track_region(p, DIM, cube(2)).unwrap(), &mut w, 64).unwrap();
        run_to_completion(&mut h.commit(p).unwrap(), &mut w, 64).unwrap();
        h.clear().unwrap();
        assert_eq!(h.buffers().borrow().stats().live, 0);
        assert!(!run_to_completion(&mut h.undo().unwrap(), &mut w, 8).unwrap());
    }
}
