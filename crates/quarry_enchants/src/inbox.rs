//! Off-thread trigger intake.
//!
//! Chat commands and network handlers may produce triggers on other threads.
//! They push into a bounded `crossbeam_channel`; the simulation thread drains
//! it with [`ProcEngine::drain_inbox`](crate::ProcEngine::drain_inbox), so all
//! world mutation stays on that thread.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::event::TriggerEvent;

/// Cloneable producer handle.
#[derive(Clone, Debug)]
pub struct TriggerSender {
    tx: Sender<TriggerEvent>,
}

impl TriggerSender {
    /// Queues an event without blocking.
    ///
    /// Returns false if the inbox is full or the engine is gone; the event is
    /// dropped in that case.
    pub fn submit(&self, event: TriggerEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                tracing::warn!("Trigger inbox full, dropping event from player {}", event.player);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Consumer side, owned by the engine.
#[derive(Debug)]
pub struct TriggerInbox {
    tx: Sender<TriggerEvent>,
    rx: Receiver<TriggerEvent>,
}

impl TriggerInbox {
    /// Creates an inbox holding at most `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    /// A new producer handle.
    #[must_use]
    pub fn sender(&self) -> TriggerSender {
        TriggerSender { tx: self.tx.clone() }
    }

    /// Takes every queued event, in arrival order.
    pub fn drain(&self) -> Vec<TriggerEvent> {
        self.rx.try_iter().collect()
    }

    /// Events waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns true if nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
