use geist_geom::{BlockBox, IVec3, Vec3};
use proptest::prelude::*;

fn coord() -> impl Strategy<Value = i32> {
    -64i32..=64
}

fn arb_ivec3() -> impl Strategy<Value = IVec3> {
    (coord(), coord(), coord()).prop_map(|(x, y, z)| IVec3::new(x, y, z))
}

fn small_box() -> impl Strategy<Value = BlockBox> {
    (arb_ivec3(), 0i32..6, 0i32..6, 0i32..6)
        .prop_map(|(a, dx, dy, dz)| BlockBox::from_corners(a, a + IVec3::new(dx, dy, dz)))
}

proptest! {
    // Corner order never matters for the effective bounds
    #[test]
    fn from_corners_is_order_independent(a in arb_ivec3(), b in arb_ivec3()) {
        let bb = BlockBox::from_corners(a, b);
        prop_assert_eq!(bb, BlockBox::from_corners(b, a));
        prop_assert!(bb.min.x <= bb.max.x && bb.min.y <= bb.max.y && bb.min.z <= bb.max.z);
        prop_assert!(bb.contains(a) && bb.contains(b));
    }

    // index_of/pos_at are inverse and cover the volume exactly once
    #[test]
    fn index_roundtrip_covers_volume(bb in small_box()) {
        let n = bb.volume() as usize;
        let mut seen = vec![false; n];
        for p in bb.iter() {
            let i = bb.index_of(p);
            prop_assert!(i < n);
            prop_assert!(!seen[i]);
            seen[i] = true;
            prop_assert_eq!(bb.pos_at(i), p);
        }
        prop_assert!(seen.into_iter().all(|s| s));
    }

    // Splitting partitions the box without overlap
    #[test]
    fn split_partitions_box(bb in small_box(), chunk in 1i32..4) {
        let parts = bb.split(chunk);
        let total: u64 = parts.iter().map(|p| p.volume()).sum();
        prop_assert_eq!(total, bb.volume());
        for p in &parts {
            let s = p.size();
            prop_assert!(s.x <= chunk && s.y <= chunk && s.z <= chunk);
            prop_assert!(bb.contains(p.min) && bb.contains(p.max));
        }
    }

    // Wraparound sampling is always inside [0, size)
    #[test]
    fn rem_euclid_is_non_negative(p in arb_ivec3(), s in (1i32..9, 1i32..9, 1i32..9)) {
        let size = IVec3::new(s.0, s.1, s.2);
        let r = p.rem_euclid(size);
        prop_assert!(r.x >= 0 && r.x < size.x);
        prop_assert!(r.y >= 0 && r.y < size.y);
        prop_assert!(r.z >= 0 && r.z < size.z);
    }
}

#[test]
fn floor_and_center_agree() {
    let p = IVec3::new(-3, 7, 0);
    assert_eq!(p.center().floor(), p);
    assert_eq!(Vec3::new(-0.25, 1.9, 2.0).floor(), IVec3::new(-1, 1, 2));
}

#[test]
fn aabb_of_box_spans_cells() {
    let bb = BlockBox::from_corners(IVec3::new(0, 0, 0), IVec3::new(3, 0, 4));
    let a = bb.as_aabb();
    assert_eq!(a.max, Vec3::new(4.0, 1.0, 5.0));
    assert!((a.diagonal() - (16.0f32 + 1.0 + 25.0).sqrt()).abs() < 1e-5);
    assert_eq!(a.corners()[7], a.max);
}
