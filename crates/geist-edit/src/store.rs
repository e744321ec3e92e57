use geist_blocks::Block;
use geist_geom::{BlockBox, IVec3};
use hashbrown::{HashMap, HashSet};

use crate::access::{BlockAccess, DimensionId};
use crate::error::{Result, WorldError};

type ChunkKey = (DimensionId, i32, i32, i32);

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditStoreStats {
    pub chunk_entries: usize,
    pub block_edits: usize,
    pub unloaded_chunks: usize,
    pub writes: u64,
}

/// In-memory chunked world. Positions never written read as the default
/// block. Chunks are loaded unless explicitly unloaded.
#[derive(Debug, Clone)]
pub struct EditStore {
    sx: i32,
    sy: i32,
    sz: i32,
    min_y: i32,
    max_y: i32,
    default_block: Block,
    // key=(dim,cx,cy,cz) -> world coords -> Block
    inner: HashMap<ChunkKey, HashMap<IVec3, Block>>,
    unloaded: HashSet<ChunkKey>,
    writes: u64,
}

impl EditStore {
    pub fn new(sx: i32, sy: i32, sz: i32) -> Self {
        Self {
            sx: sx.max(1),
            sy: sy.max(1),
            sz: sz.max(1),
            min_y: -64,
            max_y: 319,
            default_block: Block::AIR,
            inner: HashMap::new(),
            unloaded: HashSet::new(),
            writes: 0,
        }
    }

    pub fn with_default_block(mut self, b: Block) -> Self {
        self.default_block = b;
        self
    }

    /// Inclusive build height range.
    pub fn with_height(mut self, min_y: i32, max_y: i32) -> Self {
        self.min_y = min_y.min(max_y);
        self.max_y = max_y.max(min_y);
        self
    }

    pub fn stats(&self) -> EditStoreStats {
        EditStoreStats {
            chunk_entries: self.inner.len(),
            block_edits: self.inner.values().map(|m| m.len()).sum(),
            unloaded_chunks: self.unloaded.len(),
            writes: self.writes,
        }
    }

    #[inline]
    fn chunk_key(&self, dim: DimensionId, p: IVec3) -> ChunkKey {
        (
            dim,
            p.x.div_euclid(self.sx),
            p.y.div_euclid(self.sy),
            p.z.div_euclid(self.sz),
        )
    }

    /// Chunk coordinates covering `p`.
    pub fn chunk_of(&self, p: IVec3) -> IVec3 {
        let (_, cx, cy, cz) = self.chunk_key(DimensionId::OVERWORLD, p);
        IVec3::new(cx, cy, cz)
    }

    pub fn unload_chunk(&mut self, dim: DimensionId, chunk: IVec3) {
        self.unloaded.insert((dim, chunk.x, chunk.y, chunk.z));
    }

    pub fn load_chunk(&mut self, dim: DimensionId, chunk: IVec3) {
        self.unloaded.remove(&(dim, chunk.x, chunk.y, chunk.z));
    }

    fn check(&self, dim: DimensionId, pos: IVec3) -> Result<ChunkKey> {
        if pos.y < self.min_y || pos.y > self.max_y {
            return Err(WorldError::OutOfBounds { pos });
        }
        let k = self.chunk_key(dim, pos);
        if self.unloaded.contains(&k) {
            return Err(WorldError::Unloaded { dim, pos });
        }
        Ok(k)
    }

    /// Snapshot of all edits for a specific chunk.
    pub fn snapshot_for_chunk(&self, dim: DimensionId, chunk: IVec3) -> Vec<(IVec3, Block)> {
        self.inner
            .get(&(dim, chunk.x, chunk.y, chunk.z))
            .map(|m| m.iter().map(|(k, v)| (*k, *v)).collect())
            .unwrap_or_default()
    }

    /// Count blocks of `region` equal to `b`.
    pub fn count(&self, dim: DimensionId, region: &BlockBox, b: Block) -> usize {
        region
            .iter()
            .filter(|p| self.block(dim, *p).is_ok_and(|x| x == b))
            .count()
    }
}

impl BlockAccess for EditStore {
    fn block(&self, dim: DimensionId, pos: IVec3) -> Result<Block> {
        let k = self.check(dim, pos)?;
        Ok(self
            .inner
            .get(&k)
            .and_then(|m| m.get(&pos).copied())
            .unwrap_or(self.default_block))
    }

    fn set_block(&mut self, dim: DimensionId, pos: IVec3, block: Block) -> Result<()> {
        let k = self.check(dim, pos)?;
        self.writes += 1;
        if block == self.default_block {
            if let Some(m) = self.inner.get_mut(&k) {
                m.remove(&pos);
                if m.is_empty() {
                    self.inner.remove(&k);
                }
            }
            return Ok(());
        }
        self.inner.entry(k).or_default().insert(pos, block);
        Ok(())
    }

    fn is_loaded(&self, dim: DimensionId, pos: IVec3) -> bool {
        self.check(dim, pos).is_ok()
    }

    fn region_loaded(&self, dim: DimensionId, region: &BlockBox) -> bool {
        if region.min.y < self.min_y || region.max.y > self.max_y {
            return false;
        }
        if self.unloaded.is_empty() {
            return true;
        }
        let lo = self.chunk_key(dim, region.min);
        let hi = self.chunk_key(dim, region.max);
        for cy in lo.2..=hi.2 {
            for cz in lo.3..=hi.3 {
                for cx in lo.1..=hi.1 {
                    if self.unloaded.contains(&(dim, cx, cy, cz)) {
                        return false;
                    }
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> EditStore {
        EditStore::new(16, 16, 16)
    }

    #[test]
    fn unwritten_blocks_read_default() {
        let store = make_store().with_default_block(Block::new(3, 0));
        let b = store.block(DimensionId::OVERWORLD, IVec3::new(-5, 2, 70)).unwrap();
        assert_eq!(b, Block::new(3, 0));
    }

    #[test]
    fn negative_coords_use_euclid_chunks() {
        let mut store = make_store();
        let dim = DimensionId::OVERWORLD;
        let p = IVec3::new(-1, -1, -17);
        store.set_block(dim, p, Block::new(1, 0)).unwrap();
        assert_eq!(store.chunk_of(p), IVec3::new(-1, -1, -2));
        assert_eq!(store.snapshot_for_chunk(dim, IVec3::new(-1, -1, -2)).len(), 1);
        assert_eq!(store.block(dim, p).unwrap(), Block::new(1, 0));
    }

    #[test]
    fn writing_default_clears_entry() {
        let mut store = make_store();
        let dim = DimensionId::OVERWORLD;
        store.set_block(dim, IVec3::ZERO, Block::new(1, 0)).unwrap();
        store.set_block(dim, IVec3::ZERO, Block::AIR).unwrap();
        let s = store.stats();
        assert_eq!(s.block_edits, 0);
        assert_eq!(s.chunk_entries, 0);
        assert_eq!(s.writes, 2);
    }

    #[test]
    fn unloaded_chunks_refuse_access() {
        let mut store = make_store();
        let dim = DimensionId::OVERWORLD;
        store.unload_chunk(dim, IVec3::new(1, 0, 0));
        let p = IVec3::new(20, 3, 3);
        assert_eq!(store.block(dim, p), Err(WorldError::Unloaded { dim, pos: p }));
        assert!(!store.region_loaded(dim, &BlockBox::from_corners(IVec3::ZERO, p)));
        assert!(store.region_loaded(dim, &BlockBox::from_corners(IVec3::ZERO, IVec3::splat(15))));
        // other dimensions are unaffected
        assert!(store.is_loaded(DimensionId(1), p));
        store.load_chunk(dim, IVec3::new(1, 0, 0));
        assert!(store.is_loaded(dim, p));
    }

    #[test]
    fn height_limits() {
        let store = make_store().with_height(0, 15);
        let p = IVec3::new(0, 16, 0);
        assert_eq!(
            store.block(DimensionId::OVERWORLD, p),
            Err(WorldError::OutOfBounds { pos: p })
        );
    }

    #[test]
    fn fill_counts_type_changes_through_filter() {
        let mut store = make_store();
        let dim = DimensionId::OVERWORLD;
        let region = BlockBox::from_corners(IVec3::ZERO, IVec3::new(1, 0, 1));
        store.set_block(dim, IVec3::ZERO, Block::new(2, 0)).unwrap();
        let filter = crate::access::BlockFilter {
            exclude_types: vec![2],
            ..Default::default()
        };
        let changed = store.fill(dim, &region, Block::new(1, 0), Some(&filter)).unwrap();
        assert_eq!(changed, 3);
        assert_eq!(store.block(dim, IVec3::ZERO).unwrap(), Block::new(2, 0));
        assert_eq!(store.count(dim, &region, Block::new(1, 0)), 3);
    }
}
