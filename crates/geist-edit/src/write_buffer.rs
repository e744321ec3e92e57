use std::collections::VecDeque;

use geist_blocks::Block;
use geist_geom::IVec3;
use hashbrown::HashMap;

use crate::access::{BlockAccess, DimensionId};
use crate::error::Result;

/// Write-behind cache over another backend.
///
/// Reads see pending writes; nothing reaches the inner world until
/// [`WriteBuffer::flush`]. Writes are applied in first-write order, each
/// position once with its latest value.
#[derive(Debug)]
pub struct WriteBuffer<W> {
    inner: W,
    pending: HashMap<(DimensionId, IVec3), Block>,
    order: VecDeque<(DimensionId, IVec3)>,
}

impl<W: BlockAccess> WriteBuffer<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            pending: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    #[inline]
    pub fn pending_len(&self) -> usize {
        self.order.len()
    }

    pub fn inner(&self) -> &W {
        &self.inner
    }

    /// Apply up to `max` pending writes. Returns how many were applied.
    /// A failing write stays queued.
    pub fn flush(&mut self, max: usize) -> Result<usize> {
        let mut done = 0;
        while done < max {
            let Some(&(dim, pos)) = self.order.front() else {
                break;
            };
            if let Some(&b) = self.pending.get(&(dim, pos)) {
                self.inner.set_block(dim, pos, b)?;
            }
            self.order.pop_front();
            self.pending.remove(&(dim, pos));
            done += 1;
        }
        Ok(done)
    }

    pub fn flush_all(&mut self) -> Result<usize> {
        self.flush(usize::MAX)
    }

    /// Drop every pending write.
    pub fn discard(&mut self) {
        self.pending.clear();
        self.order.clear();
    }

    /// Flush everything and hand back the inner backend.
    pub fn into_inner(mut self) -> Result<W> {
        self.flush_all()?;
        Ok(self.inner)
    }
}

impl<W: BlockAccess> BlockAccess for WriteBuffer<W> {
    fn block(&self, dim: DimensionId, pos: IVec3) -> Result<Block> {
        match self.pending.get(&(dim, pos)) {
            Some(b) => Ok(*b),
            None => self.inner.block(dim, pos),
        }
    }

    fn set_block(&mut self, dim: DimensionId, pos: IVec3, block: Block) -> Result<()> {
        if !self.inner.is_loaded(dim, pos) {
            // surface load errors at write time rather than at flush
            self.inner.block(dim, pos)?;
        }
        if self.pending.insert((dim, pos), block).is_none() {
            self.order.push_back((dim, pos));
        }
        Ok(())
    }

    fn is_loaded(&self, dim: DimensionId, pos: IVec3) -> bool {
        self.inner.is_loaded(dim, pos)
    }

    fn region_loaded(&self, dim: DimensionId, region: &geist_geom::BlockBox) -> bool {
        self.inner.region_loaded(dim, region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EditStore;

    const DIM: DimensionId = DimensionId::OVERWORLD;

    #[test]
    fn reads_see_pending_writes() {
        let mut world = EditStore::new(16, 16, 16);
        let mut buf = WriteBuffer::new(&mut world);
        buf.set_block(DIM, IVec3::ZERO, Block::new(1, 0)).unwrap();
        assert_eq!(buf.block(DIM, IVec3::ZERO).unwrap(), Block::new(1, 0));
        assert_eq!(buf.inner().block(DIM, IVec3::ZERO).unwrap(), Block::AIR);
        buf.flush_all().unwrap();
        assert_eq!(world.block(DIM, IVec3::ZERO).unwrap(), Block::new(1, 0));
    }

    #[test]
    fn repeated_writes_collapse() {
        let mut world = EditStore::new(16, 16, 16);
        let mut buf = WriteBuffer::new(&mut world);
        for i in 0..5 {
            buf.set_block(DIM, IVec3::ZERO, Block::new(i, 0)).unwrap();
        }
        buf.set_block(DIM, IVec3::UP, Block::new(9, 0)).unwrap();
        assert_eq!(buf.pending_len(), 2);
        assert_eq!(buf.flush(1).unwrap(), 1);
        assert_eq!(buf.pending_len(), 1);
        let world = buf.into_inner().unwrap();
        assert_eq!(world.block(DIM, IVec3::ZERO).unwrap(), Block::new(4, 0));
        assert_eq!(world.stats().writes, 2);
    }

    #[test]
    fn discard_leaves_world_untouched() {
        let mut world = EditStore::new(16, 16, 16);
        let mut buf = WriteBuffer::new(&mut world);
        buf.set_block(DIM, IVec3::ZERO, Block::new(1, 0)).unwrap();
        buf.discard();
        assert_eq!(buf.flush_all().unwrap(), 0);
        assert_eq!(world.stats().writes, 0);
    }
}
