//! Cooperative tasks and the tick scheduler that drives them.
//!
//! Long operations are explicit state machines: each `step` does at most a
//! budgeted amount of block work and then either yields or finishes. The
//! [`Scheduler`] runs queued jobs round-robin inside a per-tick block budget.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::access::BlockAccess;

/// Outcome of one task step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    Yield,
    Done(T),
}

/// Remaining block operations for the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    remaining: usize,
}

impl Budget {
    pub fn new(blocks: usize) -> Self {
        Self { remaining: blocks }
    }

    pub fn unlimited() -> Self {
        Self::new(usize::MAX)
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Reserve up to `want` operations; returns how many were granted.
    pub fn take(&mut self, want: usize) -> usize {
        let n = want.min(self.remaining);
        self.remaining -= n;
        n
    }
}

/// What a task sees while stepping.
pub struct TaskCx<'a> {
    pub world: &'a mut dyn BlockAccess,
    pub budget: Budget,
}

impl<'a> TaskCx<'a> {
    pub fn new(world: &'a mut dyn BlockAccess, budget: Budget) -> Self {
        Self { world, budget }
    }
}

pub trait Task {
    type Output;
    type Error;

    fn step(&mut self, cx: &mut TaskCx<'_>) -> Result<Step<Self::Output>, Self::Error>;
}

impl<T: Task + ?Sized> Task for Box<T> {
    type Output = T::Output;
    type Error = T::Error;

    fn step(&mut self, cx: &mut TaskCx<'_>) -> Result<Step<Self::Output>, Self::Error> {
        (**self).step(cx)
    }
}

/// Drive `task` to the end, granting `per_step` block operations per step.
pub fn run_to_completion<T: Task + ?Sized>(
    task: &mut T,
    world: &mut dyn BlockAccess,
    per_step: usize,
) -> Result<T::Output, T::Error> {
    let per_step = per_step.max(1);
    loop {
        let mut cx = TaskCx::new(&mut *world, Budget::new(per_step));
        if let Step::Done(v) = task.step(&mut cx)? {
            return Ok(v);
        }
    }
}

pub type JobId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
enum JobState {
    Pending,
    Finished,
    Failed(String),
}

trait Job {
    fn step(&mut self, cx: &mut TaskCx<'_>) -> JobState;
}

type ResultSlot<O, E> = Rc<RefCell<Option<Result<O, E>>>>;

struct Spawned<T: Task> {
    task: T,
    out: ResultSlot<T::Output, T::Error>,
}

impl<T> Job for Spawned<T>
where
    T: Task,
    T::Error: fmt::Display,
{
    fn step(&mut self, cx: &mut TaskCx<'_>) -> JobState {
        match self.task.step(cx) {
            Ok(Step::Yield) => JobState::Pending,
            Ok(Step::Done(v)) => {
                *self.out.borrow_mut() = Some(Ok(v));
                JobState::Finished
            }
            Err(e) => {
                let msg = e.to_string();
                *self.out.borrow_mut() = Some(Err(e));
                JobState::Failed(msg)
            }
        }
    }
}

/// Receiver for a spawned task's result.
pub struct JobHandle<O, E> {
    id: JobId,
    out: ResultSlot<O, E>,
}

impl<O, E> JobHandle<O, E> {
    #[inline]
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.out.borrow().is_some()
    }

    /// Take the result once the job has finished.
    pub fn take(&self) -> Option<Result<O, E>> {
        self.out.borrow_mut().take()
    }
}

struct Entry {
    id: JobId,
    name: String,
    job: Box<dyn Job>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub steps: usize,
    pub completed: usize,
    pub failed: usize,
    pub blocks: usize,
}

/// FIFO round-robin scheduler. Every tick shares one block budget among the
/// queued jobs; a job that yields goes to the back of the queue.
pub struct Scheduler {
    queue: VecDeque<Entry>,
    pub now: u64,
    next_id: JobId,
    blocks_per_tick: usize,
}

impl Scheduler {
    pub fn new(blocks_per_tick: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            now: 0,
            next_id: 1,
            blocks_per_tick: blocks_per_tick.max(1),
        }
    }

    #[inline]
    fn alloc_id(&mut self) -> JobId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    pub fn spawn<T>(&mut self, name: impl Into<String>, task: T) -> JobHandle<T::Output, T::Error>
    where
        T: Task + 'static,
        T::Error: fmt::Display,
    {
        let id = self.alloc_id();
        let out: ResultSlot<T::Output, T::Error> = Rc::new(RefCell::new(None));
        let name = name.into();
        log::debug!(target: "scheduler", "[tick {}] spawn job {} ({})", self.now, id, name);
        self.queue.push_back(Entry {
            id,
            name,
            job: Box::new(Spawned {
                task,
                out: out.clone(),
            }),
        });
        JobHandle { id, out }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop a queued job. Its handle never receives a result.
    pub fn abandon(&mut self, id: JobId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|e| e.id != id);
        before != self.queue.len()
    }

    /// Run one tick worth of work.
    pub fn tick(&mut self, world: &mut dyn BlockAccess) -> TickReport {
        let mut report = TickReport {
            tick: self.now,
            ..Default::default()
        };
        let mut budget = Budget::new(self.blocks_per_tick);
        let mut idle_steps = 0usize;
        while !budget.is_exhausted() {
            let Some(mut entry) = self.queue.pop_front() else {
                break;
            };
            let before = budget.remaining();
            let mut cx = TaskCx::new(&mut *world, budget);
            let state = entry.job.step(&mut cx);
            budget = cx.budget;
            let spent = before - budget.remaining();
            report.steps += 1;
            report.blocks += spent;
            log::trace!(
                target: "scheduler",
                "[tick {}] job {} ({}) step spent={} state={:?}",
                self.now, entry.id, entry.name, spent, state
            );
            match state {
                JobState::Pending => {
                    self.queue.push_back(entry);
                    if spent == 0 {
                        idle_steps += 1;
                        if idle_steps > self.queue.len() * 4 {
                            break;
                        }
                    } else {
                        idle_steps = 0;
                    }
                }
                JobState::Finished => {
                    log::debug!(target: "scheduler", "[tick {}] job {} ({}) finished", self.now, entry.id, entry.name);
                    report.completed += 1;
                    idle_steps = 0;
                }
                JobState::Failed(msg) => {
                    log::warn!(target: "scheduler", "[tick {}] job {} ({}) failed: {}", self.now, entry.id, entry.name, msg);
                    report.failed += 1;
                    idle_steps = 0;
                }
            }
        }
        self.now = self.now.wrapping_add(1);
        report
    }

    /// Tick until the queue drains or `max_ticks` pass. Returns ticks run.
    pub fn run_until_idle(&mut self, world: &mut dyn BlockAccess, max_ticks: u64) -> u64 {
        let mut ticks = 0;
        while !self.is_idle() && ticks < max_ticks {
            self.tick(world);
            ticks += 1;
        }
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EditStore;

    /// Counts to `target`, one unit of budget per count.
    struct Counter {
        n: usize,
        target: usize,
        log: Rc<RefCell<Vec<(char, usize)>>>,
        tag: char,
    }

    impl Task for Counter {
        type Output = usize;
        type Error = String;

        fn step(&mut self, cx: &mut TaskCx<'_>) -> Result<Step<usize>, String> {
            let granted = cx.budget.take(self.target - self.n);
            self.n += granted;
            self.log.borrow_mut().push((self.tag, granted));
            if self.n == self.target {
                Ok(Step::Done(self.n))
            } else {
                Ok(Step::Yield)
            }
        }
    }

    struct Fails;

    impl Task for Fails {
        type Output = ();
        type Error = String;

        fn step(&mut self, cx: &mut TaskCx<'_>) -> Result<Step<()>, String> {
            cx.budget.take(1);
            Err("boom".into())
        }
    }

    #[test]
    fn budget_is_shared_per_tick() {
        let mut world = EditStore::new(16, 16, 16);
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut s = Scheduler::new(10);
        let a = s.spawn("a", Counter { n: 0, target: 25, log: log.clone(), tag: 'a' });
        let r = s.tick(&mut world);
        assert_eq!(r.blocks, 10);
        assert!(!a.is_finished());
        let ticks = s.run_until_idle(&mut world, 100);
        assert_eq!(ticks, 2);
        assert_eq!(a.take(), Some(Ok(25)));
        assert_eq!(a.take(), None);
    }

    #[test]
    fn jobs_run_in_fifo_order() {
        let mut world = EditStore::new(16, 16, 16);
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut s = Scheduler::new(4);
        s.spawn("a", Counter { n: 0, target: 6, log: log.clone(), tag: 'a' });
        s.spawn("b", Counter { n: 0, target: 2, log: log.clone(), tag: 'b' });
        s.tick(&mut world);
        s.tick(&mut world);
        s.tick(&mut world);
        assert!(s.is_idle());
        // tick 0: a takes all 4; tick 1: b runs first, then a
        assert_eq!(*log.borrow(), vec![('a', 4), ('b', 2), ('a', 2)]);
    }

    #[test]
    fn failures_are_reported_and_removed() {
        let mut world = EditStore::new(16, 16, 16);
        let mut s = Scheduler::new(8);
        let h = s.spawn("f", Fails);
        let r = s.tick(&mut world);
        assert_eq!(r.failed, 1);
        assert!(s.is_idle());
        assert_eq!(h.take(), Some(Err("boom".to_string())));
    }

    #[test]
    fn abandon_drops_job() {
        let mut world = EditStore::new(16, 16, 16);
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut s = Scheduler::new(1);
        let h = s.spawn("a", Counter { n: 0, target: 5, log, tag: 'a' });
        s.tick(&mut world);
        assert!(s.abandon(h.id()));
        assert!(!s.abandon(h.id()));
        assert!(s.is_idle());
        assert!(!h.is_finished());
    }

    #[test]
    fn run_to_completion_steps_until_done() {
        let mut world = EditStore::new(16, 16, 16);
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut c = Counter { n: 0, target: 7, log: log.clone(), tag: 'c' };
        assert_eq!(run_to_completion(&mut c, &mut world, 3), Ok(7));
        assert_eq!(log.borrow().len(), 3);
    }
}
