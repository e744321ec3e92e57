use geist_geom::{IVec3, Vec3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    /// The solid block that was hit.
    pub block: IVec3,
    /// The last empty cell before the hit.
    pub prev: IVec3,
    /// Face normal of the entered face; zero when the ray starts inside.
    pub normal: IVec3,
    pub distance: f32,
}

const MAX_STEPS: usize = 512;

#[inline]
fn inv_or_max(v: f32) -> f32 {
    if v.abs() < 1e-8 { f32::MAX } else { 1.0 / v.abs() }
}

#[inline]
fn step_of(v: f32) -> i32 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// Voxel DDA: walk the cells crossed by the ray and return the first one
/// `is_solid` accepts within `max_dist`.
pub fn raycast_first_hit<F>(origin: Vec3, dir: Vec3, max_dist: f32, mut is_solid: F) -> Option<RayHit>
where
    F: FnMut(IVec3) -> bool,
{
    let len = dir.length();
    if len < 1e-6 {
        return None;
    }
    let d = dir / len;

    let mut v = origin.floor();
    let step = IVec3::new(step_of(d.x), step_of(d.y), step_of(d.z));

    let inv = Vec3::new(inv_or_max(d.x), inv_or_max(d.y), inv_or_max(d.z));
    let tdx = if step.x == 0 { f32::MAX } else { inv.x };
    let tdy = if step.y == 0 { f32::MAX } else { inv.y };
    let tdz = if step.z == 0 { f32::MAX } else { inv.z };

    let frac = |o: f32| o - o.floor();
    let t_max = |s: i32, o: f32, inv: f32| match s {
        1 => (1.0 - frac(o)) * inv,
        -1 => frac(o) * inv,
        _ => f32::MAX,
    };
    let mut tmx = t_max(step.x, origin.x, inv.x);
    let mut tmy = t_max(step.y, origin.y, inv.y);
    let mut tmz = t_max(step.z, origin.z, inv.z);

    let mut prev = v;
    let mut t = 0.0f32;

    for _ in 0..MAX_STEPS {
        if t > max_dist {
            break;
        }
        if is_solid(v) {
            // normal points back along the last step
            let normal = -(v - prev);
            return Some(RayHit {
                block: v,
                prev,
                normal,
                distance: t,
            });
        }
        prev = v;
        if tmx < tmy {
            if tmx < tmz {
                v.x += step.x;
                t = tmx;
                tmx += tdx;
            } else {
                v.z += step.z;
                t = tmz;
                tmz += tdz;
            }
        } else if tmy < tmz {
            v.y += step.y;
            t = tmy;
            tmy += tdy;
        } else {
            v.z += step.z;
            t = tmz;
            tmz += tdz;
        }
    }
    None
}

/// First solid cell on the segment `from -> to`, if any.
pub fn raycast_between<F>(from: Vec3, to: Vec3, is_solid: F) -> Option<RayHit>
where
    F: FnMut(IVec3) -> bool,
{
    raycast_first_hit(from, to - from, from.distance(to), is_solid)
}
