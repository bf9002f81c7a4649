//! # Player Runtime State
//!
//! Ephemeral per-player state: cooldown expiries, throttle windows, timed
//! buffs, and one typed scratch slot per enchant for stateful effects.
//!
//! The engine owns a [`PlayerStates`] store. Off-thread code reads it through
//! a [`StateReader`], which shares the same `parking_lot::RwLock` but never
//! mutates.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockWriteGuard};
use quarry_shared::{BlockPos, ItemStack, Millis, PlayerId};

use crate::definition::EnchantId;

/// Sliding-window activation counter for the per-second throttle.
#[derive(Clone, Debug, Default)]
pub struct ActivationWindow {
    stamps: VecDeque<Millis>,
}

impl ActivationWindow {
    /// Forgets activations older than the window.
    pub fn prune(&mut self, now: Millis, window_ms: u64) {
        while self
            .stamps
            .front()
            .is_some_and(|&t| now.saturating_sub(t) >= window_ms)
        {
            self.stamps.pop_front();
        }
    }

    /// Activations inside the window ending at `now`, without pruning.
    #[must_use]
    pub fn count_at(&self, now: Millis, window_ms: u64) -> usize {
        self.stamps
            .iter()
            .filter(|&&t| now.saturating_sub(t) < window_ms)
            .count()
    }

    /// Returns true if another activation fits. `max == 0` means unlimited.
    pub fn allows(&mut self, now: Millis, window_ms: u64, max: u32) -> bool {
        if max == 0 {
            return true;
        }
        self.prune(now, window_ms);
        self.stamps.len() < max as usize
    }

    /// Records one activation.
    pub fn record(&mut self, now: Millis) {
        self.stamps.push_back(now);
    }

    /// Returns true if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}

/// Timed additive bonus to every proc chance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnhancerBuff {
    /// When the buff ends.
    pub expiry: Millis,
    /// Added to `1.0` and multiplied into every chance.
    pub bonus: f64,
}

/// Timed drop multipliers applied when effects clear blocks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DropBoost {
    /// When the boost ends.
    pub expiry: Millis,
    /// Multiplier for ore drops.
    pub ore: f64,
    /// Multiplier for stone drops.
    pub stone: f64,
}

/// The most recent item batch an effect delivered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DropRecord {
    /// Increments on every recorded batch.
    pub seq: u64,
    /// Where the batch was delivered.
    pub pos: BlockPos,
    /// The items.
    pub items: Vec<ItemStack>,
}

/// Typed per-enchant scratch slots.
#[derive(Default)]
pub struct EffectSlots {
    slots: HashMap<EnchantId, Box<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for EffectSlots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.slots.keys()).finish()
    }
}

impl EffectSlots {
    /// Takes a slot out, or a fresh default if absent or of another type.
    ///
    /// Put it back with [`put`](Self::put) when done.
    pub fn take<T: Any + Send + Sync + Default>(&mut self, key: &EnchantId) -> T {
        self.slots
            .remove(key)
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed)
            .unwrap_or_default()
    }

    /// Stores a slot.
    pub fn put<T: Any + Send + Sync>(&mut self, key: &EnchantId, value: T) {
        self.slots.insert(key.clone(), Box::new(value));
    }

    /// Reads a slot.
    #[must_use]
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.slots.get(key).and_then(|boxed| boxed.downcast_ref::<T>())
    }

    /// Removes and returns every slot whose key passes `keep`.
    fn split_off(&mut self, keep: impl Fn(&EnchantId) -> bool) -> Self {
        let (kept, rest): (HashMap<_, _>, HashMap<_, _>) = std::mem::take(&mut self.slots)
            .into_iter()
            .partition(|(key, _)| keep(key));
        self.slots = rest;
        Self { slots: kept }
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no slot is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Everything the engine tracks for one online player.
#[derive(Debug, Default)]
pub struct PlayerRuntimeState {
    /// Cooldown expiry per enchant.
    pub cooldowns: HashMap<EnchantId, Millis>,
    /// Throttle window per enchant.
    pub windows: HashMap<EnchantId, ActivationWindow>,
    /// Global proc bonus.
    pub enhancer: Option<EnhancerBuff>,
    /// Drop multipliers.
    pub drop_boost: Option<DropBoost>,
    /// Last delivered item batch.
    pub last_drops: DropRecord,
    /// Per-enchant effect state.
    pub effects: EffectSlots,
}

impl PlayerRuntimeState {
    /// Returns true while the enchant is cooling down.
    #[inline]
    #[must_use]
    pub fn on_cooldown(&self, enchant: &str, now: Millis) -> bool {
        self.cooldowns.get(enchant).is_some_and(|&expiry| now < expiry)
    }

    /// Time left on a cooldown.
    #[must_use]
    pub fn cooldown_remaining(&self, enchant: &str, now: Millis) -> Millis {
        self.cooldowns
            .get(enchant)
            .map_or(0, |&expiry| expiry.saturating_sub(now))
    }

    /// Starts a cooldown. A zero duration clears it.
    pub fn start_cooldown(&mut self, enchant: &EnchantId, now: Millis, duration_ms: u64) {
        if duration_ms == 0 {
            self.cooldowns.remove(enchant);
        } else {
            self.cooldowns.insert(enchant.clone(), now.saturating_add(duration_ms));
        }
    }

    /// Shortens every cooldown except `except` by `by_ms`, never below `now`.
    ///
    /// Returns how many cooldowns were shortened.
    pub fn reduce_cooldowns(&mut self, except: &str, now: Millis, by_ms: u64) -> usize {
        let mut reduced = 0;
        for (id, expiry) in &mut self.cooldowns {
            if id.as_str() == except || *expiry <= now {
                continue;
            }
            *expiry = expiry.saturating_sub(by_ms).max(now);
            reduced += 1;
        }
        reduced
    }

    /// Active enhancer bonus (zero when expired).
    #[must_use]
    pub fn enhancer_bonus(&self, now: Millis) -> f64 {
        match self.enhancer {
            Some(buff) if now < buff.expiry => buff.bonus,
            _ => 0.0,
        }
    }

    /// Active drop boost, if any.
    #[must_use]
    pub fn active_drop_boost(&self, now: Millis) -> Option<DropBoost> {
        self.drop_boost.filter(|boost| now < boost.expiry)
    }

    /// Records a delivered batch for later duplication.
    pub fn record_drops(&mut self, pos: BlockPos, items: &[ItemStack]) {
        if items.is_empty() {
            return;
        }
        self.last_drops = DropRecord {
            seq: self.last_drops.seq + 1,
            pos,
            items: items.to_vec(),
        };
    }

    /// Drops expired timers and empty windows.
    pub fn expire(&mut self, now: Millis, window_ms: u64) {
        self.cooldowns.retain(|_, expiry| now < *expiry);
        self.windows.retain(|_, window| {
            window.prune(now, window_ms);
            !window.is_empty()
        });
        if self.enhancer.is_some_and(|buff| now >= buff.expiry) {
            self.enhancer = None;
        }
        if self.drop_boost.is_some_and(|boost| now >= boost.expiry) {
            self.drop_boost = None;
        }
    }
}

type StateMap = HashMap<PlayerId, PlayerRuntimeState>;

/// Engine-owned store of every player's runtime state.
#[derive(Debug, Default)]
pub struct PlayerStates {
    live: Arc<RwLock<StateMap>>,
    parked: HashMap<PlayerId, EffectSlots>,
}

impl PlayerStates {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only handle for other threads.
    #[must_use]
    pub fn reader(&self) -> StateReader {
        StateReader {
            live: Arc::clone(&self.live),
        }
    }

    /// Locks the store for mutation.
    pub fn lock(&mut self) -> StatesGuard<'_> {
        StatesGuard {
            live: self.live.write(),
            parked: &mut self.parked,
        }
    }

    /// Returns true if the player has live state (is connected).
    #[must_use]
    pub fn contains(&self, player: PlayerId) -> bool {
        self.live.read().contains_key(&player)
    }

    /// Ends a session. Slots passing `retain` are parked for the next one.
    pub fn remove(&mut self, player: PlayerId, retain: impl Fn(&EnchantId) -> bool) {
        let Some(mut state) = self.live.write().remove(&player) else {
            return;
        };
        let kept = state.effects.split_off(retain);
        if !kept.is_empty() {
            tracing::debug!("Parking {} effect slots for player {}", kept.len(), player);
            self.parked.insert(player, kept);
        }
    }

    /// Number of live players.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.read().len()
    }

    /// Returns true if nobody is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.read().is_empty()
    }
}

/// Write access to the store. Restores parked slots on lazy creation.
pub struct StatesGuard<'a> {
    live: RwLockWriteGuard<'a, StateMap>,
    parked: &'a mut HashMap<PlayerId, EffectSlots>,
}

impl StatesGuard<'_> {
    /// State for a player, created on first use.
    pub fn get_or_create(&mut self, player: PlayerId) -> &mut PlayerRuntimeState {
        let parked = &mut *self.parked;
        self.live.entry(player).or_insert_with(|| PlayerRuntimeState {
            effects: parked.remove(&player).unwrap_or_default(),
            ..PlayerRuntimeState::default()
        })
    }

    /// State for a player, if connected.
    pub fn get_mut(&mut self, player: PlayerId) -> Option<&mut PlayerRuntimeState> {
        self.live.get_mut(&player)
    }

    /// Every live state.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&PlayerId, &mut PlayerRuntimeState)> {
        self.live.iter_mut()
    }
}

/// Read-only, thread-safe view of the store.
#[derive(Clone, Debug)]
pub struct StateReader {
    live: Arc<RwLock<StateMap>>,
}

impl StateReader {
    /// Time left on a player's cooldown (zero if none or unknown player).
    #[must_use]
    pub fn cooldown_remaining(&self, player: PlayerId, enchant: &str, now: Millis) -> Millis {
        self.live
            .read()
            .get(&player)
            .map_or(0, |state| state.cooldown_remaining(enchant, now))
    }

    /// Activations counted in the throttle window ending at `now`.
    #[must_use]
    pub fn activations_in_window(&self, player: PlayerId, enchant: &str, now: Millis, window_ms: u64) -> usize {
        self.live
            .read()
            .get(&player)
            .and_then(|state| state.windows.get(enchant))
            .map_or(0, |window| window.count_at(now, window_ms))
    }

    /// Active enhancer bonus.
    #[must_use]
    pub fn enhancer_bonus(&self, player: PlayerId, now: Millis) -> f64 {
        self.live
            .read()
            .get(&player)
            .map_or(0.0, |state| state.enhancer_bonus(now))
    }

    /// Returns true if the player is connected.
    #[must_use]
    pub fn is_tracked(&self, player: PlayerId) -> bool {
        self.live.read().contains_key(&player)
    }
}
