//! Delayed follow-up activations (multi-wave effects).
//!
//! Tasks are plain data keyed by due time. The engine drains due tasks on
//! [`tick`](crate::ProcEngine::tick) and re-enters the owning effect on the
//! simulation thread. A task whose player has disconnected is dropped.

use std::collections::BTreeMap;

use quarry_shared::{Millis, PlayerId};

use crate::definition::EnchantId;
use crate::event::TriggerEvent;

/// One pending follow-up.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledTask {
    /// When it should run.
    pub due: Millis,
    /// Enchant whose effect owns the task.
    pub enchant: EnchantId,
    /// Level at scheduling time.
    pub level: u32,
    /// The event that started it.
    pub event: TriggerEvent,
    /// Effect-defined step number (wave index).
    pub step: u32,
}

/// Due-time ordered task queue.
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BTreeMap<Millis, Vec<ScheduledTask>>,
    pending: usize,
}

impl Scheduler {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a task.
    pub fn schedule(&mut self, task: ScheduledTask) {
        self.queue.entry(task.due).or_default().push(task);
        self.pending += 1;
    }

    /// Removes and returns every task due at or before `now`, oldest first.
    pub fn take_due(&mut self, now: Millis) -> Vec<ScheduledTask> {
        let later = self.queue.split_off(&now.saturating_add(1));
        let due: Vec<ScheduledTask> = std::mem::replace(&mut self.queue, later)
            .into_values()
            .flatten()
            .collect();
        self.pending -= due.len();
        due
    }

    /// Drops every task belonging to a player. Returns how many were dropped.
    pub fn cancel_player(&mut self, player: PlayerId) -> usize {
        let before = self.pending;
        self.queue.retain(|_, tasks| {
            tasks.retain(|task| task.event.player != player);
            !tasks.is_empty()
        });
        self.pending = self.queue.values().map(Vec::len).sum();
        before - self.pending
    }

    /// Tasks waiting.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending
    }

    /// Returns true if nothing is waiting.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending == 0
    }
}
