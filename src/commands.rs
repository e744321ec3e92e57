//! Subcommands of the `wedit` tool.

use std::collections::BTreeMap;
use std::error::Error;

use geist_blocks::BlockRegistry;
use geist_edit::{BlockAccess, BlockUnit, DimensionId, EditStore, Scheduler};
use geist_geom::{BlockBox, IVec3, Vec3};
use geist_history::{Selection, Session};
use geist_pattern::{EvalContext, GradientRegistry, Mask, ParseError, Pattern};

use crate::config::WeditConfig;

const DIM: DimensionId = DimensionId::OVERWORLD;
/// Side of the cube `pattern --samples` spreads its samples over.
const SAMPLE_SIDE: i32 = 16;

/// Everything the commands share after startup.
pub struct Env {
    pub config: WeditConfig,
    pub registry: BlockRegistry,
    pub gradients: GradientRegistry,
}

impl Env {
    pub fn load(config: WeditConfig) -> Result<Self, Box<dyn Error>> {
        let registry = config.registry()?;
        let gradients = config.gradients(&registry)?;
        log::info!(
            "loaded {} block types and {} gradients from {}",
            registry.blocks.len(),
            gradients.len(),
            config.blocks.display()
        );
        Ok(Self {
            config,
            registry,
            gradients,
        })
    }
}

/// Error text with a caret line under the offending source span.
pub fn render_parse_error(src: &str, err: &ParseError) -> String {
    match err {
        ParseError::Syntax(s) => {
            let start = s.start.min(src.len());
            let width = s.end.saturating_sub(start).max(1);
            format!("{err}\n  {src}\n  {}{}", " ".repeat(start), "^".repeat(width))
        }
        other => other.to_string(),
    }
}

pub fn pattern(env: &Env, src: &str, json: bool, samples: usize, seed: u64) -> Result<(), Box<dyn Error>> {
    let pattern = Pattern::parse(src, &env.registry).map_err(|e| render_parse_error(src, &e))?;
    println!("{}", pattern.root());
    if json {
        println!("{}", serde_json::to_string_pretty(&pattern.tree_json())?);
    }
    if let Some(block) = pattern.simple_block() {
        println!("bulk fill: {}", env.registry.describe(block));
    }
    if samples == 0 {
        return Ok(());
    }
    let range = BlockBox::from_corners(IVec3::ZERO, IVec3::splat(SAMPLE_SIDE - 1));
    let mut cx = EvalContext::seeded(&env.registry, seed)
        .with_gradients(&env.gradients)
        .with_range(range)
        .with_facing(Vec3::UP);
    let mut tally: BTreeMap<String, usize> = BTreeMap::new();
    for i in 0..samples {
        let pos = range.pos_at(i % range.volume() as usize);
        let unit = BlockUnit::new(&env.registry, DIM, pos, env.registry.air());
        let key = match pattern.evaluate(&unit, &mut cx) {
            Some(b) => env.registry.describe(b),
            None => "(unchanged)".to_string(),
        };
        *tally.entry(key).or_default() += 1;
    }
    print_tally(&tally, samples);
    Ok(())
}

pub fn mask(env: &Env, src: &str, json: bool) -> Result<(), Box<dyn Error>> {
    let mask = Mask::parse(src, &env.registry).map_err(|e| render_parse_error(src, &e))?;
    println!("{}", mask.root());
    if json {
        println!("{}", serde_json::to_string_pretty(&mask.tree_json())?);
    }
    match mask.simple_block_filter(&env.registry) {
        None => println!("bulk filter: none, evaluated per block"),
        Some(f) if f.is_empty() => println!("bulk filter: everything"),
        Some(f) => {
            let names = |ids: &[geist_blocks::BlockId]| -> Vec<String> {
                ids.iter()
                    .filter_map(|id| env.registry.get(*id).map(|t| t.name.clone()))
                    .collect()
            };
            let perms = |bs: &[geist_blocks::Block]| -> Vec<String> {
                bs.iter().map(|b| env.registry.describe(*b)).collect()
            };
            println!("bulk filter:");
            println!("  include types: {:?}", names(&f.include_types));
            println!("  include permutations: {:?}", perms(&f.include_permutations));
            println!("  exclude types: {:?}", names(&f.exclude_types));
            println!("  exclude permutations: {:?}", perms(&f.exclude_permutations));
        }
    }
    Ok(())
}

/// Scripted edits on an in-memory world, then a scheduled undo and a redo.
pub fn demo(env: &Env, size: i32, blocks_per_tick: Option<usize>) -> Result<(), Box<dyn Error>> {
    let n = size.clamp(1, 64);
    let reg = &env.registry;
    let mut world = EditStore::new(16, 16, 16);
    let mut session = Session::new(env.config.history.clone()).with_gradients(env.gradients.clone());
    let region = BlockBox::from_corners(IVec3::ZERO, IVec3::splat(n - 1));
    session.set_selection(Selection::cuboid(DIM, region.min, region.max));
    session.set_view(IVec3::new(n / 2, n + 4, n / 2), Vec3::UP);

    let steps: [(&str, &str, Option<&str>); 3] = [
        ("fill", "stone", None),
        ("layer", "$terrain", Some("#surface")),
        ("scatter", "10%wool[color=red],90%void", Some("grass")),
    ];
    for (i, (label, pat, mask)) in steps.iter().enumerate() {
        let pattern = Pattern::parse(pat, reg).map_err(|e| render_parse_error(pat, &e))?;
        let mask = match mask {
            Some(m) => Some(Mask::parse(m, reg).map_err(|e| render_parse_error(m, &e))?),
            None => None,
        };
        let changed = session.fill(&mut world, reg, &pattern, mask.as_ref(), i as u64)?;
        println!("{label}: {pattern} changed {changed} blocks");
        print_histogram(&world, reg, &region);
    }

    let budget = blocks_per_tick.unwrap_or(env.config.history.blocks_per_tick);
    let mut scheduler = Scheduler::new(budget);
    let undo = scheduler.spawn("undo", session.history_mut().undo()?);
    while !scheduler.is_idle() {
        let report = scheduler.tick(&mut world);
        log::info!(
            target: "scheduler",
            "tick {}: {} steps, {} blocks, {} completed",
            report.tick, report.steps, report.blocks, report.completed
        );
    }
    match undo.take() {
        Some(Ok(true)) => println!("undo: restored the previous edit over {} ticks", scheduler.now),
        Some(Ok(false)) => println!("undo: nothing to undo"),
        Some(Err(e)) => return Err(e.into()),
        None => return Err("undo job never finished".into()),
    }
    print_histogram(&world, reg, &region);

    if session.redo(&mut world)? {
        println!("redo: reapplied");
        print_histogram(&world, reg, &region);
    }
    Ok(())
}

fn print_histogram(world: &EditStore, registry: &BlockRegistry, region: &BlockBox) {
    let mut tally: BTreeMap<String, usize> = BTreeMap::new();
    for pos in region.iter() {
        let key = match world.block(DIM, pos) {
            Ok(b) => registry.describe(b),
            Err(_) => "(unloaded)".to_string(),
        };
        *tally.entry(key).or_default() += 1;
    }
    print_tally(&tally, region.volume() as usize);
}

fn print_tally(tally: &BTreeMap<String, usize>, total: usize) {
    let mut rows: Vec<_> = tally.iter().collect();
    rows.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (name, count) in rows {
        let pct = *count as f64 * 100.0 / total.max(1) as f64;
        println!("  {name:<40} {count:>7} {pct:>6.2}%");
    }
}
