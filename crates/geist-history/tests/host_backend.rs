use geist_blocks::Block;
use geist_edit::{BlockAccess, BufferStore, DimensionId, EditStore, RegionBuffer, run_to_completion};
use geist_geom::{BlockBox, IVec3};
use geist_history::{
    History, HistoryConfig, HistoryError, HostHistory, HostTransactions, RingHistory, Selection, Session, ThreadKey,
};

const DIM: DimensionId = DimensionId::OVERWORLD;

/// Journal-style host: keeps before/after captures per transaction.
#[derive(Default)]
struct JournalHost {
    next: u32,
    open: Vec<(u32, Vec<RegionBuffer>)>,
    done: Vec<(Vec<RegionBuffer>, Vec<RegionBuffer>)>,
    cursor: usize,
    discarded: usize,
}

impl JournalHost {
    fn replay(buffers: &[RegionBuffer], world: &mut dyn BlockAccess) -> Result<(), String> {
        for b in buffers {
            b.load_some(world, b.dim(), b.region().min, 0, usize::MAX)
                .map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

impl HostTransactions for JournalHost {
    type Txn = u32;

    fn begin(&mut self) -> Result<u32, String> {
        self.next += 1;
        self.open.push((self.next, Vec::new()));
        Ok(self.next)
    }

    fn track(&mut self, txn: u32, world: &dyn BlockAccess, footprint: &RegionBuffer) -> Result<(), String> {
        let (_, before) = self.open.iter_mut().find(|(t, _)| *t == txn).ok_or("unknown transaction")?;
        before.push(RegionBuffer::capture(world, footprint.dim(), footprint.region()).map_err(|e| e.to_string())?);
        Ok(())
    }

    fn commit(&mut self, txn: u32, world: &dyn BlockAccess) -> Result<(), String> {
        let i = self.open.iter().position(|(t, _)| *t == txn).ok_or("unknown transaction")?;
        let (_, before) = self.open.remove(i);
        let after = before
            .iter()
            .map(|b| RegionBuffer::capture(world, b.dim(), b.region()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?;
        self.done.truncate(self.cursor);
        self.done.push((before, after));
        self.cursor = self.done.len();
        Ok(())
    }

    fn discard(&mut self, txn: u32) {
        self.open.retain(|(t, _)| *t != txn);
        self.discarded += 1;
    }

    fn undo(&mut self, world: &mut dyn BlockAccess) -> Result<bool, String> {
        if self.cursor == 0 {
            return Ok(false);
        }
        self.cursor -= 1;
        Self::replay(&self.done[self.cursor].0, world)?;
        Ok(true)
    }

    fn redo(&mut self, world: &mut dyn BlockAccess) -> Result<bool, String> {
        if self.cursor == self.done.len() {
            return Ok(false);
        }
        Self::replay(&self.done[self.cursor].1, world)?;
        self.cursor += 1;
        Ok(true)
    }

    fn clear(&mut self) {
        self.done.clear();
        self.cursor = 0;
    }
}

/// The 5x5x5 edit-with-selection scenario, run against any backend.
fn selection_scenario(h: &mut dyn History, selection: &geist_history::SharedSelection) {
    let mut w = EditStore::new(16, 16, 16);
    let region = BlockBox::from_corners(IVec3::ZERO, IVec3::splat(4));
    let before = selection.borrow().clone();

    let p = h.record(ThreadKey::MAIN).unwrap();
    assert_eq!(h.active_points_in_thread(ThreadKey::MAIN), vec![p]);
    h.track_selection(p).unwrap();
    run_to_completion(&mut h.track_region(p, DIM, region).unwrap(), &mut w, 32).unwrap();
    w.fill(DIM, &region, Block::new(9, 0), None).unwrap();
    selection.borrow_mut().set_first(IVec3::splat(2));
    let after = selection.borrow().clone();
    run_to_completion(&mut h.commit(p).unwrap(), &mut w, 32).unwrap();
    assert!(!h.is_recording());

    assert!(run_to_completion(&mut h.undo().unwrap(), &mut w, 32).unwrap());
    assert_eq!(*selection.borrow(), before);
    assert_eq!(w.block(DIM, IVec3::splat(3)).unwrap(), Block::AIR);

    assert!(run_to_completion(&mut h.redo().unwrap(), &mut w, 32).unwrap());
    assert_eq!(*selection.borrow(), after);
    assert_eq!(w.block(DIM, IVec3::splat(3)).unwrap(), Block::new(9, 0));

    let q = h.record(ThreadKey::MAIN).unwrap();
    assert!(matches!(h.undo(), Err(HistoryError::StillRecording(_))));
    h.cancel(q).unwrap();
    assert_eq!(h.commit(q).err(), Some(HistoryError::NotRecording(q)));
}

#[test]
fn ring_backend_scenario() {
    let selection = Selection::cuboid(DIM, IVec3::ZERO, IVec3::splat(4)).shared();
    let mut h = RingHistory::new(HistoryConfig::default(), BufferStore::shared()).with_selection(selection.clone());
    selection_scenario(&mut h, &selection);
}

#[test]
fn host_backend_scenario() {
    let selection = Selection::cuboid(DIM, IVec3::ZERO, IVec3::splat(4)).shared();
    let mut h = HostHistory::new(JournalHost::default()).with_selection(selection.clone());
    selection_scenario(&mut h, &selection);
    assert_eq!(h.host().discarded, 1);
    assert_eq!(h.host().done.len(), 1);
}

#[test]
fn host_errors_surface_as_host_errors() {
    let mut h = HostHistory::new(JournalHost::default());
    let mut w = EditStore::new(16, 16, 16);
    w.unload_chunk(DIM, IVec3::ZERO);
    let p = h.record(ThreadKey::MAIN).unwrap();
    let err = run_to_completion(
        &mut h.track_region(p, DIM, BlockBox::single(IVec3::ZERO)).unwrap(),
        &mut w,
        8,
    )
    .unwrap_err();
    assert!(matches!(err, HistoryError::Host(msg) if msg.contains("not loaded")));
    h.cancel(p).unwrap();
}

#[test]
fn host_change_limit_fails_fast_and_cancel_discards() {
    let config = HistoryConfig {
        change_limit: 100,
        ..HistoryConfig::default()
    };
    let mut h = HostHistory::new(JournalHost::default()).with_config(config);
    let mut w = EditStore::new(16, 16, 16);
    let p = h.record(ThreadKey::MAIN).unwrap();
    let small = BlockBox::from_corners(IVec3::ZERO, IVec3::new(3, 3, 3));
    run_to_completion(&mut h.track_region(p, DIM, small).unwrap(), &mut w, 32).unwrap();

    let big = BlockBox::from_corners(IVec3::ZERO, IVec3::new(4, 4, 4));
    match h.track_region(p, DIM, big) {
        Err(HistoryError::ChangeLimitExceeded { limit, requested }) => {
            assert_eq!(limit, 100);
            assert_eq!(requested, 64 + 125);
        }
        Err(e) => panic!("unexpected error {e}"),
        Ok(_) => panic!("limit not enforced"),
    }
    let blocks: Vec<IVec3> = (0..40).map(|x| IVec3::new(x, 0, 0)).collect();
    assert!(matches!(
        h.track_blocks(p, DIM, &blocks),
        Err(HistoryError::ChangeLimitExceeded { requested: 104, .. })
    ));
    assert!(h.is_recording());
    h.cancel(p).unwrap();
    assert!(!h.is_recording());
    assert_eq!(h.host().discarded, 1);
    assert!(h.host().open.is_empty());
}

#[test]
fn failed_tracking_leaves_the_session_usable() {
    let selection = Selection::cuboid(DIM, IVec3::ZERO, IVec3::splat(2)).shared();
    let history = HostHistory::new(JournalHost::default()).with_selection(selection.clone());
    let mut session = Session::with_history(Box::new(history), selection, 64);
    let reg = geist_blocks::BlockRegistry::from_toml_str(
        r#"
        [[blocks]]
        name = "air"
        solid = false

        [[blocks]]
        name = "stone"
        "#,
    )
    .unwrap();
    let stone = geist_pattern::Pattern::parse("stone", &reg).unwrap();
    let mut w = EditStore::new(16, 16, 16);
    w.unload_chunk(DIM, IVec3::ZERO);
    assert!(matches!(
        session.fill(&mut w, &reg, &stone, None, 0),
        Err(HistoryError::Host(_))
    ));
    assert!(!session.history().is_recording());

    w.load_chunk(DIM, IVec3::ZERO);
    assert_eq!(session.fill(&mut w, &reg, &stone, None, 0).unwrap(), 27);
    assert!(session.undo(&mut w).unwrap());
}
