//! Generation-tagged delayed actions.
//!
//! Every pending action records the scheduler generation current when it
//! was armed. `cancel_all` bumps the generation, so anything armed before
//! it can never fire afterwards, including a `Fired` value that was already
//! handed out and is delivered late.

use std::time::{Duration, Instant};

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// A due action, tagged with the generation it was armed in.
#[derive(Debug, Clone, PartialEq)]
pub struct Fired<A> {
    pub id: TimerId,
    pub generation: u64,
    pub action: A,
}

#[derive(Debug, Clone)]
struct Pending<A> {
    id: TimerId,
    due: Instant,
    generation: u64,
    action: A,
}

#[derive(Debug, Clone)]
pub struct Scheduler<A> {
    pending: Vec<Pending<A>>,
    generation: u64,
    next_id: u64,
}

impl<A: Clone + std::fmt::Debug> Scheduler<A> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            generation: 0,
            next_id: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn schedule(&mut self, now: Instant, delay: Duration, action: A) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        debug!(?id, ?action, delay_ms = delay.as_millis() as u64, "timer armed");
        self.pending.push(Pending {
            id,
            due: now + delay,
            generation: self.generation,
            action,
        });
        id
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.id != id);
        before != self.pending.len()
    }

    /// Cancels the pending actions matching `pred`; returns how many.
    pub fn cancel_matching(&mut self, pred: impl Fn(&A) -> bool) -> usize {
        let before = self.pending.len();
        self.pending.retain(|p| !pred(&p.action));
        before - self.pending.len()
    }

    /// Invalidates everything armed so far.
    pub fn cancel_all(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        self.generation += 1;
        if dropped > 0 {
            debug!(dropped, generation = self.generation, "timers cancelled");
        }
        dropped
    }

    pub fn is_current(&self, fired: &Fired<A>) -> bool {
        fired.generation == self.generation
    }

    /// Removes and returns the earliest action due at `now`.
    ///
    /// Callers fire one action at a time so that an action cancelling
    /// others takes effect before the next one is looked at.
    pub fn poll_next(&mut self, now: Instant) -> Option<Fired<A>> {
        let generation = self.generation;
        self.pending.retain(|p| p.generation == generation);

        let idx = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.due <= now)
            .min_by_key(|(_, p)| (p.due, p.id))
            .map(|(i, _)| i)?;

        let p = self.pending.swap_remove(idx);
        Some(Fired {
            id: p.id,
            generation: p.generation,
            action: p.action,
        })
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.pending.iter().map(|p| p.due).min()
    }
}

impl<A: Clone + std::fmt::Debug> Default for Scheduler<A> {
    fn default() -> Self {
        Self::new()
    }
}
