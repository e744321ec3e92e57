use std::cell::RefCell;
use std::rc::Rc;

use geist_blocks::Block;
use geist_geom::{BlockBox, IVec3};

use crate::access::{BlockAccess, DimensionId};
use crate::error::{Result, WorldError};
use crate::task::{Step, Task, TaskCx};

/// Snapshot of a cuboid's blocks, captured in [`BlockBox::index_of`] order,
/// or of an explicit block list in list order.
///
/// A buffer may be partially captured; only the captured prefix is read back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionBuffer {
    dim: DimensionId,
    /// The cuboid, or the bounding box of `points`.
    region: BlockBox,
    points: Option<Vec<IVec3>>,
    blocks: Vec<Block>,
}

impl RegionBuffer {
    pub fn new(dim: DimensionId, region: BlockBox) -> Self {
        Self {
            dim,
            region,
            points: None,
            blocks: Vec::new(),
        }
    }

    /// A buffer over exactly `points`. Duplicates are kept once. Returns
    /// `None` for an empty list.
    pub fn sparse(dim: DimensionId, mut points: Vec<IVec3>) -> Option<Self> {
        let mut seen = hashbrown::HashSet::with_capacity(points.len());
        points.retain(|p| seen.insert(*p));
        let first = *points.first()?;
        let region = points
            .iter()
            .fold(BlockBox::single(first), |b, p| b.union(&BlockBox::single(*p)));
        Some(Self {
            dim,
            region,
            points: Some(points),
            blocks: Vec::new(),
        })
    }

    /// Build a complete buffer from blocks in index order. Missing trailing
    /// blocks are left uncaptured; extras are dropped.
    pub fn from_blocks(dim: DimensionId, region: BlockBox, mut blocks: Vec<Block>) -> Self {
        blocks.truncate(region.volume() as usize);
        Self {
            dim,
            region,
            points: None,
            blocks,
        }
    }

    /// An uncaptured buffer over the same blocks.
    pub fn empty_like(&self) -> Self {
        Self {
            dim: self.dim,
            region: self.region,
            points: self.points.clone(),
            blocks: Vec::new(),
        }
    }

    #[inline]
    fn pos_at(&self, i: usize) -> IVec3 {
        match &self.points {
            Some(points) => points[i],
            None => self.region.pos_at(i),
        }
    }

    fn index_of(&self, pos: IVec3) -> Option<usize> {
        if !self.region.contains(pos) {
            return None;
        }
        match &self.points {
            Some(points) => points.iter().position(|p| *p == pos),
            None => Some(self.region.index_of(pos)),
        }
    }

    /// Capture `region` in one go.
    pub fn capture(world: &dyn BlockAccess, dim: DimensionId, region: BlockBox) -> Result<Self> {
        let mut buf = Self::new(dim, region);
        buf.capture_some(world, usize::MAX)?;
        Ok(buf)
    }

    #[inline]
    pub fn dim(&self) -> DimensionId {
        self.dim
    }

    #[inline]
    pub fn region(&self) -> BlockBox {
        self.region
    }

    #[inline]
    pub fn size(&self) -> IVec3 {
        self.region.size()
    }

    /// Number of blocks the buffer covers.
    #[inline]
    pub fn volume(&self) -> usize {
        match &self.points {
            Some(points) => points.len(),
            None => self.region.volume() as usize,
        }
    }

    #[inline]
    pub fn is_sparse(&self) -> bool {
        self.points.is_some()
    }

    #[inline]
    pub fn captured(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.blocks.len() == self.volume()
    }

    /// Block at world position `pos`, if inside and captured.
    pub fn get(&self, pos: IVec3) -> Option<Block> {
        self.blocks.get(self.index_of(pos)?).copied()
    }

    /// Block at `offset` from the buffer's min corner, wrapping every axis
    /// so the buffer tiles space.
    pub fn sample_wrapped(&self, offset: IVec3) -> Option<Block> {
        let local = offset.rem_euclid(self.size());
        self.get(self.region.min + local)
    }

    /// Capture up to `max` further blocks. Returns how many were read.
    pub fn capture_some(&mut self, world: &dyn BlockAccess, max: usize) -> Result<usize> {
        if self.blocks.is_empty() {
            let unloaded = match &self.points {
                Some(points) => points.iter().copied().find(|p| !world.is_loaded(self.dim, *p)),
                None => (!world.region_loaded(self.dim, &self.region)).then_some(self.region.min),
            };
            if let Some(pos) = unloaded {
                return Err(WorldError::Unloaded { dim: self.dim, pos });
            }
        }
        let start = self.blocks.len();
        let end = start.saturating_add(max).min(self.volume());
        self.blocks.reserve(end - start);
        for i in start..end {
            let b = world.block(self.dim, self.pos_at(i))?;
            self.blocks.push(b);
        }
        Ok(end - start)
    }

    /// Write captured blocks `from..from+max` back with the buffer's min
    /// corner placed at `origin` in `dim`. Returns how many were written.
    pub fn load_some(
        &self,
        world: &mut dyn BlockAccess,
        dim: DimensionId,
        origin: IVec3,
        from: usize,
        max: usize,
    ) -> Result<usize> {
        let end = from.saturating_add(max).min(self.blocks.len());
        let shift = origin - self.region.min;
        for i in from..end {
            world.set_block(dim, self.pos_at(i) + shift, self.blocks[i])?;
        }
        Ok(end.saturating_sub(from))
    }
}

/// Handle to a buffer inside a [`BufferStore`]. Stale handles are inert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    refs: u32,
    buffer: Option<RegionBuffer>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BufferStats {
    pub allocated: u64,
    pub released: u64,
    pub live: usize,
    pub live_blocks: usize,
}

/// Arena of reference-counted region buffers with explicit release.
#[derive(Debug, Default)]
pub struct BufferStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    allocated: u64,
    released: u64,
}

pub type SharedBuffers = Rc<RefCell<BufferStore>>;

impl BufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedBuffers {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Store `buffer` with one reference.
    pub fn alloc(&mut self, buffer: RegionBuffer) -> BufferId {
        self.allocated += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.refs = 1;
            slot.buffer = Some(buffer);
            return BufferId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            refs: 1,
            buffer: Some(buffer),
        });
        BufferId {
            index,
            generation: 0,
        }
    }

    fn slot(&self, id: BufferId) -> Option<&Slot> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation && s.buffer.is_some())
    }

    fn slot_mut(&mut self, id: BufferId) -> Option<&mut Slot> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation && s.buffer.is_some())
    }

    pub fn is_live(&self, id: BufferId) -> bool {
        self.slot(id).is_some()
    }

    pub fn get(&self, id: BufferId) -> Option<&RegionBuffer> {
        self.slot(id).and_then(|s| s.buffer.as_ref())
    }

    pub fn get_mut(&mut self, id: BufferId) -> Option<&mut RegionBuffer> {
        self.slot_mut(id).and_then(|s| s.buffer.as_mut())
    }

    pub fn retain(&mut self, id: BufferId) -> bool {
        match self.slot_mut(id) {
            Some(s) => {
                s.refs += 1;
                true
            }
            None => false,
        }
    }

    /// Drop one reference. Returns true when this call freed the buffer.
    /// Calling it on a released or stale handle does nothing.
    pub fn release(&mut self, id: BufferId) -> bool {
        let Some(slot) = self.slot_mut(id) else {
            return false;
        };
        slot.refs = slot.refs.saturating_sub(1);
        if slot.refs > 0 {
            return false;
        }
        slot.buffer = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.released += 1;
        true
    }

    pub fn stats(&self) -> BufferStats {
        let live = self.slots.iter().filter(|s| s.buffer.is_some());
        BufferStats {
            allocated: self.allocated,
            released: self.released,
            live: live.clone().count(),
            live_blocks: live.filter_map(|s| s.buffer.as_ref()).map(|b| b.captured()).sum(),
        }
    }
}

/// Snapshot a region into a fresh buffer across as many steps as needed.
///
/// The buffer is allocated up front so a caller can release it if the task
/// is abandoned; on failure the task releases it itself.
pub struct CaptureTask {
    buffers: SharedBuffers,
    id: BufferId,
}

impl CaptureTask {
    pub fn new(buffers: SharedBuffers, dim: DimensionId, region: BlockBox) -> Self {
        Self::with_buffer(buffers, RegionBuffer::new(dim, region))
    }

    /// Capture into `buffer`, which should be uncaptured.
    pub fn with_buffer(buffers: SharedBuffers, buffer: RegionBuffer) -> Self {
        let id = buffers.borrow_mut().alloc(buffer);
        Self { buffers, id }
    }

    #[inline]
    pub fn buffer(&self) -> BufferId {
        self.id
    }
}

impl Task for CaptureTask {
    type Output = BufferId;
    type Error = WorldError;

    fn step(&mut self, cx: &mut TaskCx<'_>) -> Result<Step<BufferId>> {
        let mut store = self.buffers.borrow_mut();
        let Some(buf) = store.get_mut(self.id) else {
            return Err(WorldError::BufferReleased);
        };
        let want = buf.volume() - buf.captured();
        let granted = cx.budget.take(want);
        let res = buf.capture_some(&*cx.world, granted);
        match res {
            Ok(_) if buf.is_complete() => Ok(Step::Done(self.id)),
            Ok(_) => Ok(Step::Yield),
            Err(e) => {
                store.release(self.id);
                Err(e)
            }
        }
    }
}

/// Replay a buffer into the world.
pub struct PlaybackTask {
    buffers: SharedBuffers,
    id: BufferId,
    target: Option<(DimensionId, IVec3)>,
    cursor: usize,
}

impl PlaybackTask {
    /// Replay at the location the buffer was captured from.
    pub fn new(buffers: SharedBuffers, id: BufferId) -> Self {
        Self {
            buffers,
            id,
            target: None,
            cursor: 0,
        }
    }

    /// Replay with the min corner at `origin` in `dim`.
    pub fn at(mut self, dim: DimensionId, origin: IVec3) -> Self {
        self.target = Some((dim, origin));
        self
    }
}

impl Task for PlaybackTask {
    type Output = usize;
    type Error = WorldError;

    fn step(&mut self, cx: &mut TaskCx<'_>) -> Result<Step<usize>> {
        let store = self.buffers.borrow();
        let Some(buf) = store.get(self.id) else {
            return Err(WorldError::BufferReleased);
        };
        let (dim, origin) = self.target.unwrap_or((buf.dim(), buf.region().min));
        let granted = cx.budget.take(buf.captured() - self.cursor);
        self.cursor += buf.load_some(&mut *cx.world, dim, origin, self.cursor, granted)?;
        if self.cursor >= buf.captured() {
            Ok(Step::Done(self.cursor))
        } else {
            Ok(Step::Yield)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EditStore;
    use crate::task::run_to_completion;

    const DIM: DimensionId = DimensionId::OVERWORLD;

    fn region() -> BlockBox {
        BlockBox::from_corners(IVec3::ZERO, IVec3::new(2, 1, 2))
    }

    fn striped() -> EditStore {
        let mut w = EditStore::new(16, 16, 16);
        for p in region().iter() {
            w.set_block(DIM, p, Block::new((p.x + 1) as u16, 0)).unwrap();
        }
        w
    }

    #[test]
    fn capture_and_replay_elsewhere() {
        let mut world = striped();
        let buf = RegionBuffer::capture(&world, DIM, region()).unwrap();
        assert!(buf.is_complete());
        assert_eq!(buf.get(IVec3::new(2, 0, 0)), Some(Block::new(3, 0)));
        assert_eq!(buf.get(IVec3::new(3, 0, 0)), None);
        let n = buf.load_some(&mut world, DIM, IVec3::new(10, 0, 0), 0, usize::MAX).unwrap();
        assert_eq!(n, 18);
        assert_eq!(world.block(DIM, IVec3::new(12, 1, 2)).unwrap(), Block::new(3, 0));
    }

    #[test]
    fn wrapped_sampling_tiles() {
        let world = striped();
        let buf = RegionBuffer::capture(&world, DIM, region()).unwrap();
        assert_eq!(buf.sample_wrapped(IVec3::new(-1, 0, 0)), Some(Block::new(3, 0)));
        assert_eq!(buf.sample_wrapped(IVec3::new(4, 7, -5)), Some(Block::new(2, 0)));
    }

    #[test]
    fn capture_task_yields_until_complete() {
        let mut world = striped();
        let buffers = BufferStore::shared();
        let mut task = CaptureTask::new(buffers.clone(), DIM, region());
        let id = run_to_completion(&mut task, &mut world, 4).unwrap();
        let store = buffers.borrow();
        assert!(store.get(id).unwrap().is_complete());
        assert_eq!(store.stats().live_blocks, 18);
    }

    #[test]
    fn capture_of_unloaded_region_fails_and_releases() {
        let mut world = striped();
        world.unload_chunk(DIM, IVec3::ZERO);
        let buffers = BufferStore::shared();
        let mut task = CaptureTask::new(buffers.clone(), DIM, region());
        let err = run_to_completion(&mut task, &mut world, 4).unwrap_err();
        assert!(matches!(err, WorldError::Unloaded { .. }));
        let stats = buffers.borrow().stats();
        assert_eq!((stats.allocated, stats.released, stats.live), (1, 1, 0));
    }

    #[test]
    fn playback_restores_captured_content() {
        let mut world = striped();
        let buffers = BufferStore::shared();
        let id = run_to_completion(&mut CaptureTask::new(buffers.clone(), DIM, region()), &mut world, 5)
            .unwrap();
        world.fill(DIM, &region(), Block::new(9, 0), None).unwrap();
        let written = run_to_completion(&mut PlaybackTask::new(buffers.clone(), id), &mut world, 5).unwrap();
        assert_eq!(written, 18);
        assert_eq!(world.block(DIM, IVec3::new(1, 1, 1)).unwrap(), Block::new(2, 0));
    }

    #[test]
    fn sparse_buffer_touches_only_listed_blocks() {
        let mut world = striped();
        let points = vec![IVec3::new(0, 0, 0), IVec3::new(2, 1, 2), IVec3::new(0, 0, 0)];
        let buf = RegionBuffer::sparse(DIM, points).unwrap();
        assert_eq!(buf.volume(), 2);
        assert_eq!(buf.region(), region());
        let buffers = BufferStore::shared();
        let id = run_to_completion(&mut CaptureTask::with_buffer(buffers.clone(), buf), &mut world, 1).unwrap();
        world.fill(DIM, &region(), Block::new(9, 0), None).unwrap();
        run_to_completion(&mut PlaybackTask::new(buffers.clone(), id), &mut world, 1).unwrap();
        assert_eq!(world.block(DIM, IVec3::new(2, 1, 2)).unwrap(), Block::new(3, 0));
        assert_eq!(world.block(DIM, IVec3::new(1, 0, 0)).unwrap(), Block::new(9, 0));
        assert_eq!(buffers.borrow().get(id).unwrap().get(IVec3::new(1, 0, 0)), None);
        assert!(RegionBuffer::sparse(DIM, Vec::new()).is_none());
    }

    #[test]
    fn release_is_idempotent_and_generational() {
        let mut store = BufferStore::new();
        let a = store.alloc(RegionBuffer::new(DIM, region()));
        assert!(store.retain(a));
        assert!(!store.release(a));
        assert!(store.release(a));
        assert!(!store.release(a));
        assert!(!store.retain(a));
        let b = store.alloc(RegionBuffer::new(DIM, region()));
        // slot reused with a new generation
        assert_ne!(a, b);
        assert!(store.get(a).is_none());
        assert!(store.get(b).is_some());
        assert_eq!(store.stats().released, 1);
        assert_eq!(store.stats().live, 1);
    }
}
