use geist_blocks::{Block, BlockRegistry};
use geist_edit::{BlockAccess, BlockUnit, DimensionId, EditStore};
use geist_geom::IVec3;
use geist_pattern::{EvalContext, Mask, MaskNode, Pattern, PatternNode};
use proptest::prelude::*;

const DIM: DimensionId = DimensionId::OVERWORLD;

fn registry() -> BlockRegistry {
    BlockRegistry::from_toml_str(
        r#"
        [[blocks]]
        name = "air"
        solid = false

        [[blocks]]
        name = "stone"
        tags = ["hard"]

        [[blocks]]
        name = "dirt"

        [[blocks]]
        name = "sand"
        tags = ["hard"]
        "#,
    )
    .unwrap()
}

const NAMES: [&str; 4] = ["air", "stone", "dirt", "sand"];

fn arb_pattern() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        Just("stone".to_string()),
        Just("dirt".to_string()),
        Just("sand".to_string()),
        Just("void".to_string()),
    ];
    leaf.prop_recursive(4, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 2..4).prop_map(|v| v.join(",")),
            (1u32..100, inner.clone()).prop_map(|(w, p)| format!("{w}%({p})")),
            inner.prop_map(|p| format!("({p})")),
        ]
    })
}

fn arb_mask() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        Just("stone".to_string()),
        Just("dirt".to_string()),
        Just("air".to_string()),
        Just("#existing".to_string()),
        Just("##hard".to_string()),
        Just("=y>1".to_string()),
    ];
    leaf.prop_recursive(4, 24, 3, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("({a}) ({b})")),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{a},{b}")),
            inner.clone().prop_map(|m| format!("!({m})")),
            inner.clone().prop_map(|m| format!("<({m})")),
            inner.prop_map(|m| format!(">({m})")),
        ]
    })
}

/// A 1x6x1 column of arbitrary blocks.
fn column(reg: &BlockRegistry, ids: &[usize]) -> EditStore {
    let mut w = EditStore::new(16, 16, 16);
    for (y, i) in ids.iter().enumerate() {
        let b = reg.make_block_by_name(NAMES[*i], None).unwrap();
        w.set_block(DIM, IVec3::new(0, y as i32, 0), b).unwrap();
    }
    w
}

proptest! {
    #[test]
    fn pattern_optimize_is_idempotent(src in arb_pattern()) {
        let reg = registry();
        let once = Pattern::parse(&src, &reg).unwrap();
        let twice = once.root().clone().optimize();
        prop_assert_eq!(once.root(), &twice);
    }

    #[test]
    fn mask_optimize_is_idempotent(src in arb_mask()) {
        let reg = registry();
        let once = Mask::parse(&src, &reg).unwrap();
        let twice = once.root().clone().optimize();
        prop_assert_eq!(once.root(), &twice);
    }

    #[test]
    fn mask_algebra_holds(a in arb_mask(), b in arb_mask(), ids in prop::collection::vec(0usize..4, 6)) {
        let reg = registry();
        let w = column(&reg, &ids);
        let m1 = Mask::parse(&a, &reg).unwrap();
        let m2 = Mask::parse(&b, &reg).unwrap();
        let both = m1.intersect(&m2);
        let not1 = m1.negate();
        let mut cx = EvalContext::seeded(&reg, 0);
        for y in 1..5 {
            let p = IVec3::new(0, y, 0);
            let r1 = m1.matches_at(&w, p, &mut cx);
            let r2 = m2.matches_at(&w, p, &mut cx);
            prop_assert_eq!(both.matches_at(&w, p, &mut cx), r1 && r2);
            prop_assert_eq!(not1.matches_at(&w, p, &mut cx), !r1);
        }
    }

    #[test]
    fn double_offset_matches_two_single_offsets(src in arb_mask(), ids in prop::collection::vec(0usize..4, 6)) {
        let reg = registry();
        let w = column(&reg, &ids);
        let m = Mask::parse(&src, &reg).unwrap();
        let stepped = m.offset(1).offset(1);
        let mut folded = Mask::parse(&format!("<<({src})"), &reg).unwrap();
        let raw = Mask::from_node(MaskNode::Offset {
            dy: 1,
            child: Box::new(MaskNode::Offset { dy: 1, child: Box::new(m.root().clone()) }),
        });
        folded.optimize();
        let mut cx = EvalContext::seeded(&reg, 0);
        for y in 0..3 {
            let p = IVec3::new(0, y, 0);
            let expect = m.matches_at(&w, p + IVec3::new(0, 2, 0), &mut cx);
            prop_assert_eq!(stepped.matches_at(&w, p, &mut cx), expect);
            prop_assert_eq!(raw.matches_at(&w, p, &mut cx), expect);
            prop_assert_eq!(folded.matches_at(&w, p, &mut cx), expect);
        }
    }
}

#[test]
fn optimize_merges_duplicates_and_flattens() {
    let reg = registry();
    let p = Pattern::parse("stone,(stone,dirt)", &reg).unwrap();
    match p.root() {
        PatternNode::Chain { children, weighted } => {
            assert!(*weighted);
            assert_eq!(children.len(), 2);
            assert_eq!(children[0].weight, 1.5);
            assert_eq!(children[1].weight, 0.5);
        }
        other => panic!("{other:?}"),
    }
    let unit = BlockUnit::new(&reg, DIM, IVec3::ZERO, Block::AIR);
    let single = Pattern::parse("stone,stone", &reg).unwrap();
    assert!(single.is_simple());
    let mut cx = EvalContext::seeded(&reg, 0);
    assert_eq!(single.evaluate(&unit, &mut cx), reg.make_block_by_name("stone", None));
}
