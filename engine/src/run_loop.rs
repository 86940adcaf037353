//! Single-threaded run loop with a virtual clock.
//!
//! Everything in the engine runs on one logical thread. "Later" means one of:
//! - end of the current tick ([`Scheduler::schedule`])
//! - end of the current tick, coalesced by key ([`Scheduler::once`])
//! - after a delay on the virtual clock ([`Scheduler::later`])
//!
//! Nothing runs until the owner pumps the loop with [`Scheduler::run`],
//! [`Scheduler::advance`] or [`Scheduler::settle`]. Time only moves when the
//! loop is advanced, so the same inputs always produce the same outputs.

use crate::Timestamp;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::rc::Rc;

/// A unit of work run against the loop's context.
pub type Task<C> = Box<dyn FnOnce(&mut C)>;

struct Queued<C> {
    key: Option<&'static str>,
    task: Task<C>,
}

/// Queues of pending work. Use through a [`Scheduler`].
pub struct RunLoop<C> {
    now: Timestamp,
    queue: VecDeque<Queued<C>>,
    /// Keys of `once` tasks still waiting in `queue`
    pending_keys: HashSet<&'static str>,
    /// (deadline, sequence) -> task; sequence keeps equal deadlines FIFO
    timers: BTreeMap<(Timestamp, u64), Task<C>>,
    next_seq: u64,
}

impl<C> RunLoop<C> {
    fn new() -> Self {
        Self {
            now: 0,
            queue: VecDeque::new(),
            pending_keys: HashSet::new(),
            timers: BTreeMap::new(),
            next_seq: 0,
        }
    }

    fn next_task(&mut self) -> Option<Task<C>> {
        let queued = self.queue.pop_front()?;
        if let Some(key) = queued.key {
            self.pending_keys.remove(key);
        }
        Some(queued.task)
    }

    fn next_deadline(&self) -> Option<Timestamp> {
        self.timers.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Move the earliest timer due by `until` onto the queue.
    fn fire_next_timer(&mut self, until: Timestamp) -> bool {
        match self.timers.first_key_value() {
            Some((&(deadline, _), _)) if deadline <= until => {}
            _ => return false,
        }
        let Some(((deadline, _), task)) = self.timers.pop_first() else {
            return false;
        };
        self.now = self.now.max(deadline);
        self.queue.push_back(Queued { key: None, task });
        true
    }
}

impl<C> fmt::Debug for RunLoop<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLoop")
            .field("now", &self.now)
            .field("queued", &self.queue.len())
            .field("timers", &self.timers.len())
            .finish()
    }
}

/// Shared handle to a [`RunLoop`].
///
/// Cloning the handle shares the loop, so callbacks can capture a clone and
/// schedule follow-up work.
pub struct Scheduler<C> {
    inner: Rc<RefCell<RunLoop<C>>>,
}

impl<C> Clone for Scheduler<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for Scheduler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.borrow().fmt(f)
    }
}

impl<C> Scheduler<C> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(RunLoop::new())),
        }
    }

    /// Current virtual time in milliseconds.
    pub fn now(&self) -> Timestamp {
        self.inner.borrow().now
    }

    /// Run a task at the end of the current tick.
    pub fn schedule<F>(&self, task: F)
    where
        F: FnOnce(&mut C) + 'static,
    {
        self.inner.borrow_mut().queue.push_back(Queued {
            key: None,
            task: Box::new(task),
        });
    }

    /// Run a task at the end of the current tick unless a task with the same
    /// key is already waiting. Returns false when coalesced.
    pub fn once<F>(&self, key: &'static str, task: F) -> bool
    where
        F: FnOnce(&mut C) + 'static,
    {
        let mut run_loop = self.inner.borrow_mut();
        if !run_loop.pending_keys.insert(key) {
            return false;
        }
        run_loop.queue.push_back(Queued {
            key: Some(key),
            task: Box::new(task),
        });
        true
    }

    /// Run a task once `delay` milliseconds of virtual time have passed.
    pub fn later<F>(&self, delay: Timestamp, task: F)
    where
        F: FnOnce(&mut C) + 'static,
    {
        let mut run_loop = self.inner.borrow_mut();
        let deadline = run_loop.now.saturating_add(delay);
        let seq = run_loop.next_seq;
        run_loop.next_seq += 1;
        run_loop.timers.insert((deadline, seq), Box::new(task));
    }

    /// Tasks waiting in the current tick.
    pub fn queued(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Timers not yet fired.
    pub fn pending_timers(&self) -> usize {
        self.inner.borrow().timers.len()
    }

    pub fn is_idle(&self) -> bool {
        let run_loop = self.inner.borrow();
        run_loop.queue.is_empty() && run_loop.timers.is_empty()
    }

    /// Drain the current tick, including tasks scheduled while draining.
    ///
    /// Returns the number of tasks run.
    pub fn run(&self, ctx: &mut C) -> usize {
        let mut ran = 0;
        loop {
            let task = self.inner.borrow_mut().next_task();
            let Some(task) = task else {
                break;
            };
            task(ctx);
            ran += 1;
        }
        ran
    }

    /// Move the clock forward, firing due timers in deadline order.
    ///
    /// Each timer runs in its own tick.
    pub fn advance(&self, ctx: &mut C, millis: Timestamp) -> usize {
        let target = self.now().saturating_add(millis);
        let mut ran = self.run(ctx);
        loop {
            let fired = self.inner.borrow_mut().fire_next_timer(target);
            if !fired {
                break;
            }
            ran += self.run(ctx);
        }
        self.inner.borrow_mut().now = target;
        ran
    }

    /// Run until no task or timer remains.
    pub fn settle(&self, ctx: &mut C) -> usize {
        let mut ran = self.run(ctx);
        loop {
            let deadline = self.inner.borrow().next_deadline();
            let Some(deadline) = deadline else {
                break;
            };
            let delay = deadline.saturating_sub(self.now());
            ran += self.advance(ctx, delay);
        }
        ran
    }
}
