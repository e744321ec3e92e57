//! History that delegates block bookkeeping to a host's own transactions.

use std::cell::RefCell;
use std::rc::Rc;

use geist_edit::{BlockAccess, DimensionId, RegionBuffer};
use geist_geom::{BlockBox, IVec3};
use hashbrown::HashMap;

use crate::config::HistoryConfig;
use crate::error::{HistoryError, Result};
use crate::history::{History, HistoryTask, OnceTask};
use crate::point::{PointId, ThreadKey};
use crate::selection::{Selection, SharedSelection};

/// Host-native transaction manager.
///
/// Footprints are handed over as uncaptured [`RegionBuffer`]s; the host
/// decides how to remember them.
pub trait HostTransactions {
    type Txn: Copy + 'static;

    fn begin(&mut self) -> std::result::Result<Self::Txn, String>;

    /// Remember the current content of `footprint` before it is edited.
    fn track(&mut self, txn: Self::Txn, world: &dyn BlockAccess, footprint: &RegionBuffer)
    -> std::result::Result<(), String>;

    fn commit(&mut self, txn: Self::Txn, world: &dyn BlockAccess) -> std::result::Result<(), String>;

    fn discard(&mut self, txn: Self::Txn);

    fn undo(&mut self, world: &mut dyn BlockAccess) -> std::result::Result<bool, String>;

    fn redo(&mut self, world: &mut dyn BlockAccess) -> std::result::Result<bool, String>;

    fn clear(&mut self);
}

struct HostPoint<T> {
    thread: ThreadKey,
    txn: T,
    tracked: u64,
    selection: Option<Selection>,
}

/// Selection pairs mirror the host's undo stack: `[..cursor]` applied.
#[derive(Default)]
struct SelectionLog {
    entries: Vec<Option<(Selection, Selection)>>,
    cursor: usize,
}

/// [`History`] over a [`HostTransactions`] backend. Every operation
/// finishes in a single task step.
pub struct HostHistory<H: HostTransactions> {
    host: Rc<RefCell<H>>,
    config: HistoryConfig,
    selection: Option<SharedSelection>,
    open: HashMap<PointId, HostPoint<H::Txn>>,
    journal: Rc<RefCell<SelectionLog>>,
    next_point: u64,
}

impl<H: HostTransactions + 'static> HostHistory<H> {
    pub fn new(host: H) -> Self {
        Self {
            host: Rc::new(RefCell::new(host)),
            config: HistoryConfig::default(),
            selection: None,
            open: HashMap::new(),
            journal: Rc::new(RefCell::new(SelectionLog::default())),
            next_point: 1,
        }
    }

    /// Only `change_limit` applies; the host keeps its own undo depth.
    pub fn with_config(mut self, config: HistoryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_selection(mut self, selection: SharedSelection) -> Self {
        self.selection = Some(selection);
        self
    }

    pub fn host(&self) -> std::cell::Ref<'_, H> {
        self.host.borrow()
    }

    fn track_buffer(&mut self, point: PointId, footprint: Option<RegionBuffer>) -> Result<HistoryTask<()>> {
        let limit = self.config.change_limit;
        let open = self.open.get_mut(&point).ok_or(HistoryError::NotRecording(point))?;
        let volume = footprint.as_ref().map_or(0, |f| f.volume() as u64);
        let requested = open.tracked + volume;
        if requested > limit {
            log::debug!(target: "history", "host point {point} refused {volume} blocks: {requested} > {limit}");
            return Err(HistoryError::ChangeLimitExceeded { limit, requested });
        }
        open.tracked = requested;
        let txn = open.txn;
        let host = self.host.clone();
        Ok(Box::new(OnceTask::new(move |cx| {
            let Some(footprint) = footprint else {
                return Ok(());
            };
            host.borrow_mut()
                .track(txn, &*cx.world, &footprint)
                .map_err(HistoryError::Host)
        })))
    }

    fn replay(&mut self, undo: bool) -> Result<HistoryTask<bool>> {
        if let Some(p) = self.open.keys().min() {
            return Err(HistoryError::StillRecording(*p));
        }
        let host = self.host.clone();
        let journal = self.journal.clone();
        let selection = self.selection.clone();
        Ok(Box::new(OnceTask::new(move |cx| {
            let mut host = host.borrow_mut();
            let applied = if undo { host.undo(&mut *cx.world) } else { host.redo(&mut *cx.world) };
            if !applied.map_err(HistoryError::Host)? {
                return Ok(false);
            }
            let mut journal = journal.borrow_mut();
            let index = if undo { journal.cursor.checked_sub(1) } else { Some(journal.cursor) };
            let pair = index.and_then(|i| journal.entries.get(i).cloned().flatten());
            if let (Some((before, after)), Some(handle)) = (pair, &selection) {
                *handle.borrow_mut() = if undo { before } else { after };
            }
            journal.cursor = match index {
                Some(i) if undo => i,
                Some(i) => (i + 1).min(journal.entries.len()),
                None => 0,
            };
            Ok(true)
        })))
    }
}

impl<H: HostTransactions + 'static> History for HostHistory<H> {
    fn record(&mut self, thread: ThreadKey) -> Result<PointId> {
        if let Some((id, _)) = self.open.iter().find(|(_, p)| p.thread == thread) {
            return Err(HistoryError::StillRecording(*id));
        }
        let txn = self.host.borrow_mut().begin().map_err(HistoryError::Host)?;
        let id = PointId(self.next_point);
        self.next_point += 1;
        self.open.insert(
            id,
            HostPoint {
                thread,
                txn,
                tracked: 0,
                selection: None,
            },
        );
        log::debug!(target: "history", "host record point {id}");
        Ok(id)
    }

    fn commit(&mut self, point: PointId) -> Result<HistoryTask<()>> {
        let open = self.open.remove(&point).ok_or(HistoryError::NotRecording(point))?;
        let after = self.selection.as_ref().map(|s| s.borrow().clone());
        let pair = open.selection.zip(after);
        let host = self.host.clone();
        let journal = self.journal.clone();
        Ok(Box::new(OnceTask::new(move |cx| {
            host.borrow_mut()
                .commit(open.txn, &*cx.world)
                .map_err(HistoryError::Host)?;
            let mut journal = journal.borrow_mut();
            let cursor = journal.cursor;
            journal.entries.truncate(cursor);
            journal.entries.push(pair);
            journal.cursor = journal.entries.len();
            log::info!(target: "history", "host committed point {point}");
            Ok(())
        })))
    }

    fn cancel(&mut self, point: PointId) -> Result<()> {
        let open = self.open.remove(&point).ok_or(HistoryError::NotRecording(point))?;
        self.host.borrow_mut().discard(open.txn);
        log::debug!(target: "history", "host cancel point {point}");
        Ok(())
    }

    fn track_region(&mut self, point: PointId, dim: DimensionId, region: BlockBox) -> Result<HistoryTask<()>> {
        self.track_buffer(point, Some(RegionBuffer::new(dim, region)))
    }

    fn track_blocks(&mut self, point: PointId, dim: DimensionId, blocks: &[IVec3]) -> Result<HistoryTask<()>> {
        self.track_buffer(point, RegionBuffer::sparse(dim, blocks.to_vec()))
    }

    fn track_selection(&mut self, point: PointId) -> Result<()> {
        let current = self.selection.as_ref().map(|s| s.borrow().clone());
        let open = self.open.get_mut(&point).ok_or(HistoryError::NotRecording(point))?;
        if open.selection.is_none() {
            open.selection = current;
        }
        Ok(())
    }

    fn undo(&mut self) -> Result<HistoryTask<bool>> {
        self.replay(true)
    }

    fn redo(&mut self) -> Result<HistoryTask<bool>> {
        self.replay(false)
    }

    fn clear(&mut self) -> Result<()> {
        self.host.borrow_mut().clear();
        *self.journal.borrow_mut() = SelectionLog::default();
        Ok(())
    }

    fn is_recording(&self) -> bool {
        !self.open.is_empty()
    }

    fn active_points_in_thread(&self, thread: ThreadKey) -> Vec<PointId> {
        let mut out: Vec<PointId> = self
            .open
            .iter()
            .filter(|(_, p)| p.thread == thread)
            .map(|(id, _)| *id)
            .collect();
        out.sort();
        out
    }
}
