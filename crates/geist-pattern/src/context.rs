use geist_blocks::{Block, BlockRegistry};
use geist_edit::{DimensionId, RegionBuffer};
use geist_geom::{BlockBox, IVec3, Vec3};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::gradient::GradientRegistry;

/// Nested gradient/blob evaluations deeper than this yield no block.
pub(crate) const MAX_DEPTH: u32 = 16;

/// Per-invocation state handed to pattern and mask evaluation.
pub struct EvalContext<'a> {
    pub registry: &'a BlockRegistry,
    pub dim: DimensionId,
    /// Where the invoking player stands.
    pub placement: IVec3,
    /// Bounds of the region being edited.
    pub range: Option<BlockBox>,
    /// View direction; picks the axis of linear gradients.
    pub facing: Vec3,
    /// Centres of radial gradients, e.g. brush stroke points.
    pub strokes: Vec<Vec3>,
    pub distance: fn(Vec3, Vec3) -> f32,
    pub hand: Option<Block>,
    pub clipboard: Option<&'a RegionBuffer>,
    pub gradients: Option<&'a GradientRegistry>,
    pub rng: StdRng,
    pub(crate) radial_override: Option<(Vec3, f32)>,
    pub(crate) blob_cache: JitterCache,
    pub(crate) depth: u32,
}

fn euclidean(a: Vec3, b: Vec3) -> f32 {
    a.distance(b)
}

impl<'a> EvalContext<'a> {
    pub fn new(registry: &'a BlockRegistry) -> Self {
        Self::with_rng(registry, StdRng::from_entropy())
    }

    /// Deterministic context for reproducible sampling.
    pub fn seeded(registry: &'a BlockRegistry, seed: u64) -> Self {
        Self::with_rng(registry, StdRng::seed_from_u64(seed))
    }

    fn with_rng(registry: &'a BlockRegistry, rng: StdRng) -> Self {
        Self {
            registry,
            dim: DimensionId::OVERWORLD,
            placement: IVec3::ZERO,
            range: None,
            facing: Vec3::new(0.0, 0.0, 1.0),
            strokes: Vec::new(),
            distance: euclidean,
            hand: None,
            clipboard: None,
            gradients: None,
            rng,
            radial_override: None,
            blob_cache: JitterCache::default(),
            depth: 0,
        }
    }

    pub fn with_dimension(mut self, dim: DimensionId) -> Self {
        self.dim = dim;
        self
    }

    pub fn with_placement(mut self, p: IVec3) -> Self {
        self.placement = p;
        self
    }

    pub fn with_range(mut self, range: BlockBox) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_facing(mut self, facing: Vec3) -> Self {
        self.facing = facing;
        self
    }

    pub fn with_strokes(mut self, strokes: Vec<Vec3>) -> Self {
        self.strokes = strokes;
        self
    }

    pub fn with_hand(mut self, hand: Option<Block>) -> Self {
        self.hand = hand;
        self
    }

    pub fn with_clipboard(mut self, clipboard: Option<&'a RegionBuffer>) -> Self {
        self.clipboard = clipboard;
        self
    }

    pub fn with_gradients(mut self, gradients: &'a GradientRegistry) -> Self {
        self.gradients = Some(gradients);
        self
    }

    /// Closest stroke centre to `p` under the context's distance function.
    pub fn nearest_stroke(&self, p: Vec3) -> Option<Vec3> {
        self.strokes
            .iter()
            .copied()
            .min_by(|a, b| (self.distance)(*a, p).total_cmp(&(self.distance)(*b, p)))
    }
}

#[inline]
fn uhash32(mut a: u32) -> u32 {
    a ^= a >> 16;
    a = a.wrapping_mul(0x7feb_352d);
    a ^= a >> 15;
    a = a.wrapping_mul(0x846c_a68b);
    a ^= a >> 16;
    a
}

pub(crate) fn hash3(p: IVec3, seed: u32) -> u32 {
    let mut h = seed ^ 0x9e37_79b9;
    h ^= uhash32((p.x as u32).wrapping_add(0x85eb_ca6b));
    h ^= uhash32((p.y as u32).wrapping_add(0xc2b2_ae35));
    h ^= uhash32((p.z as u32).wrapping_add(0x27d4_eb2f));
    uhash32(h)
}

/// Hash to `[0.05, 0.95)`, keeping feature points off cell borders.
#[inline]
fn unit01(h: u32) -> f32 {
    0.05 + 0.9 * ((h & 0x00FF_FFFF) as f32 / 16_777_216.0)
}

const JITTER_SLOTS: usize = 256;

/// Direct-mapped memo of blob cell feature points. Collisions simply
/// overwrite the slot.
#[derive(Clone, Debug)]
pub(crate) struct JitterCache {
    slots: Vec<Option<(i32, IVec3, Vec3)>>,
    pub(crate) hits: u64,
    pub(crate) misses: u64,
}

impl Default for JitterCache {
    fn default() -> Self {
        Self {
            slots: vec![None; JITTER_SLOTS],
            hits: 0,
            misses: 0,
        }
    }
}

impl JitterCache {
    /// Feature point of `cell` for a grid of `size`, in world space.
    pub(crate) fn point(&mut self, size: i32, cell: IVec3) -> Vec3 {
        let key = hash3(cell, size as u32);
        let slot = (key.wrapping_mul(0x9E37_79B1) >> 24) as usize % JITTER_SLOTS;
        if let Some((s, c, p)) = self.slots[slot] {
            if s == size && c == cell {
                self.hits += 1;
                return p;
            }
        }
        self.misses += 1;
        let jitter = Vec3::new(
            unit01(hash3(cell, key ^ 0x68e3_1da4)),
            unit01(hash3(cell, key ^ 0xb529_7a4d)),
            unit01(hash3(cell, key ^ 0x1b56_c4e9)),
        );
        let p = (cell * size).as_vec3() + jitter * size as f32;
        self.slots[slot] = Some((size, cell, p));
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_points_stay_in_their_cell_and_memoize() {
        let mut cache = JitterCache::default();
        for x in -3..3 {
            for z in -3..3 {
                let cell = IVec3::new(x, 1, z);
                let p = cache.point(4, cell);
                assert_eq!(p.floor().div_euclid(IVec3::splat(4)), cell);
                assert_eq!(cache.point(4, cell), p);
            }
        }
        assert!(cache.hits >= 36);
    }

    #[test]
    fn nearest_stroke_uses_distance_fn() {
        let reg = BlockRegistry::new();
        let cx = EvalContext::seeded(&reg, 1)
            .with_strokes(vec![Vec3::new(10.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0)]);
        assert_eq!(cx.nearest_stroke(Vec3::ZERO), Some(Vec3::new(-1.0, 0.0, 0.0)));
    }
}
