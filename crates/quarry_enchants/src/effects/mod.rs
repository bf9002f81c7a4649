//! # Effect Modules
//!
//! One [`EffectModule`] per effect key. A module is stateless itself; any
//! per-player state lives in the player's [`EffectSlots`] under the enchant
//! id, so two definitions sharing one module never share state.
//!
//! | Category | Modules |
//! |----------|---------|
//! | Instant reward | `token_finder`, `key_finder`, `treasure` |
//! | Block clearing | `explosive`, `laser`, `drill`, `shockwave` |
//! | Stateful | `overclock`, `overload`, `piggy_bank`, `poison` |
//! | Meta | `second_hand`, `mirror`, `rewind`, `enhancer` |
//!
//! Modules never call back into the engine. The one sanctioned way to cause
//! more evaluation is [`EffectContext::request_secondary_roll`].
//!
//! [`EffectSlots`]: crate::state::EffectSlots

mod clearing;
mod meta;
mod rewards;
mod stateful;

use std::collections::HashMap;

use quarry_shared::{Amount, BlockPos, ItemStack, Millis, PlayerId};
use rand_chacha::ChaCha8Rng;

use crate::clear::{self, ClearSpec, DropMode};
use crate::collaborators::{Cosmetic, Services, StatusEffect};
use crate::config::EngineConfig;
use crate::definition::{EnchantDefinition, ProcContext};
use crate::event::TriggerEvent;
use crate::scheduler::ScheduledTask;
use crate::state::PlayerRuntimeState;

pub use clearing::{Drill, Explosive, Laser, LaserMode, Shockwave};
pub use meta::{Enhancer, Mirror, MirrorState, Rewind, RewindState, SecondHand};
pub use rewards::{KeyFinder, TokenFinder, Treasure};
pub use stateful::{Overclock, OverclockState, Overload, OverloadState, PiggyBank, PiggyBankState, Poison};

/// A polymorphic unit of enchant behavior.
pub trait EffectModule: Send + Sync {
    /// Key definitions use to select this module.
    fn key(&self) -> &'static str;

    /// Runs the effect after a successful roll.
    fn execute(&self, ctx: &mut EffectContext<'_, '_>);

    /// Meta effects act on sibling enchants and never run in a secondary roll.
    fn is_meta(&self) -> bool {
        false
    }

    /// Extra gate checked after the block filter and before rolling.
    fn ready(&self, _definition: &EnchantDefinition, _state: &PlayerRuntimeState) -> bool {
        true
    }

    /// Handles a sneaking interact as a deterministic mode change.
    ///
    /// Returns true if it did; the engine then skips rolling this enchant.
    fn control(&self, _ctx: &mut EffectContext<'_, '_>) -> bool {
        false
    }

    /// Runs a follow-up scheduled by [`EffectContext::schedule`].
    fn run_scheduled(&self, _ctx: &mut EffectContext<'_, '_>, _step: u32) {}

    /// Periodic decay of this enchant's slot for one player.
    fn decay(&self, _definition: &EnchantDefinition, _state: &mut PlayerRuntimeState, _now: Millis) {}

    /// Whether this module's slot may be kept across a reconnect.
    fn retains_state(&self) -> bool {
        false
    }
}

/// Shape of a block-clearing invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// Cube of `±radius` around a block.
    Area {
        /// Center.
        anchor: BlockPos,
        /// Half-width.
        radius: u32,
    },
    /// Straight line.
    Line {
        /// Starting block (not broken).
        origin: BlockPos,
        /// Unit axis step.
        direction: BlockPos,
        /// Steps to walk.
        range: u32,
    },
    /// Straight up.
    Column {
        /// Starting block (not broken).
        anchor: BlockPos,
        /// Steps to walk.
        height: u32,
    },
}

/// Everything an effect may touch during one activation.
pub struct EffectContext<'a, 's> {
    /// The triggering event.
    pub event: TriggerEvent,
    /// Definition of the activated enchant.
    pub definition: &'a EnchantDefinition,
    /// Level on the tool, within `[1, max_level]`.
    pub level: u32,
    /// Primary pass or secondary roll.
    pub context: ProcContext,
    /// The player's runtime state.
    pub state: &'a mut PlayerRuntimeState,
    /// Host collaborators.
    pub services: &'a mut Services<'s>,
    /// Engine limits.
    pub config: &'a EngineConfig,
    /// The engine RNG.
    pub rng: &'a mut ChaCha8Rng,
    pub(crate) blocks_broken: u32,
    pub(crate) secondary_requested: bool,
    pub(crate) scheduled: Vec<ScheduledTask>,
}

impl<'a, 's> EffectContext<'a, 's> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        event: TriggerEvent,
        definition: &'a EnchantDefinition,
        level: u32,
        context: ProcContext,
        state: &'a mut PlayerRuntimeState,
        services: &'a mut Services<'s>,
        config: &'a EngineConfig,
        rng: &'a mut ChaCha8Rng,
    ) -> Self {
        Self {
            event,
            definition,
            level,
            context,
            state,
            services,
            config,
            rng,
            blocks_broken: 0,
            secondary_requested: false,
            scheduled: Vec::new(),
        }
    }

    /// Acting player.
    #[inline]
    #[must_use]
    pub fn player(&self) -> PlayerId {
        self.event.player
    }

    /// Event time.
    #[inline]
    #[must_use]
    pub fn now(&self) -> Millis {
        self.event.now
    }

    /// Block the event is anchored on.
    #[inline]
    #[must_use]
    pub fn anchor(&self) -> BlockPos {
        self.event.anchor()
    }

    /// Blocks broken so far by this activation.
    #[inline]
    #[must_use]
    pub fn blocks_broken(&self) -> u32 {
        self.blocks_broken
    }

    /// Asks the engine for one secondary roll after the primary pass.
    ///
    /// Ignored in a secondary roll.
    pub fn request_secondary_roll(&mut self) {
        if self.context == ProcContext::Primary {
            self.secondary_requested = true;
        } else {
            tracing::debug!("{} asked for a nested secondary roll; ignored", self.definition.id);
        }
    }

    /// Schedules a follow-up `delay_ms` from now.
    pub fn schedule(&mut self, delay_ms: u64, step: u32) {
        self.scheduled.push(ScheduledTask {
            due: self.event.now.saturating_add(delay_ms),
            enchant: self.definition.id.clone(),
            level: self.level,
            event: self.event,
            step,
        });
    }

    /// Clears blocks with this enchant's `max_blocks`, `skip` and
    /// `drop_mode` params. Returns the number broken.
    pub fn clear(&mut self, shape: Shape) -> u32 {
        let definition = self.definition;
        let params = &definition.params;
        let skip = params.block_set("skip");
        let requested = params.u32_or("max_blocks", self.config.global_max_blocks_per_proc);
        let max_extent = match shape {
            Shape::Area { .. } => self.config.area_radius(),
            Shape::Line { .. } => self.config.line_range(),
            Shape::Column { .. } => self.config.column_height(),
        };
        let spec = ClearSpec {
            player: self.event.player,
            tool: self.event.tool,
            max_blocks: self.config.block_budget(requested),
            max_extent,
            skip: &skip,
            drop_mode: DropMode::from_param(params.str_or("drop_mode", "inventory")),
            boost: self.state.active_drop_boost(self.event.now),
        };

        let (anchor, outcome) = match shape {
            Shape::Area { anchor, radius } => (anchor, clear::break_area(self.services, &spec, anchor, radius)),
            Shape::Line {
                origin,
                direction,
                range,
            } => (origin, clear::break_line(self.services, &spec, origin, direction, range)),
            Shape::Column { anchor, height } => (anchor, clear::break_column(self.services, &spec, anchor, height)),
        };

        self.state.record_drops(anchor, &outcome.drops);
        self.blocks_broken += outcome.broken;
        outcome.broken
    }

    /// Grants items at the anchor (overflow dropped) and records the batch.
    pub fn grant(&mut self, items: &[ItemStack]) {
        let anchor = self.anchor();
        self.services.grant_or_drop(self.event.player, anchor, items);
        self.state.record_drops(anchor, items);
    }

    /// Deposits currency to the player.
    pub fn deposit(&mut self, currency: &str, amount: Amount) {
        if amount == 0 {
            return;
        }
        let reason = format!("enchant:{}", self.definition.id);
        self.services
            .ledger
            .deposit(self.event.player, currency, amount, &reason);
    }

    /// Applies a status effect to the player.
    pub fn apply_status(&mut self, status: StatusEffect) {
        self.services.world.apply_status(self.event.player, status);
    }

    /// Spawns a decorative effect at the anchor.
    pub fn cosmetic(&mut self, cosmetic: Cosmetic) {
        let anchor = self.anchor();
        self.services.world.spawn_cosmetic(cosmetic, anchor);
    }

    /// Reads this enchant's slot (default if absent). Pair with [`store`](Self::store).
    pub fn slot<T: std::any::Any + Send + Sync + Default>(&mut self) -> T {
        self.state.effects.take(&self.definition.id)
    }

    /// Writes this enchant's slot.
    pub fn store<T: std::any::Any + Send + Sync>(&mut self, value: T) {
        self.state.effects.put(&self.definition.id, value);
    }
}

/// Effect modules by key.
#[derive(Default)]
pub struct EffectRegistry {
    modules: HashMap<&'static str, Box<dyn EffectModule>>,
}

impl std::fmt::Debug for EffectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.modules.keys()).finish()
    }
}

impl EffectRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in module.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        let modules: [Box<dyn EffectModule>; 15] = [
            Box::new(TokenFinder),
            Box::new(KeyFinder),
            Box::new(Treasure),
            Box::new(Explosive),
            Box::new(Laser),
            Box::new(Drill),
            Box::new(Shockwave),
            Box::new(Overclock),
            Box::new(Overload),
            Box::new(PiggyBank),
            Box::new(Poison),
            Box::new(SecondHand),
            Box::new(Mirror),
            Box::new(Rewind),
            Box::new(Enhancer),
        ];
        for module in modules {
            registry.register(module);
        }
        registry
    }

    /// Adds or replaces a module.
    pub fn register(&mut self, module: Box<dyn EffectModule>) {
        self.modules.insert(module.key(), module);
    }

    /// Looks up a module.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&dyn EffectModule> {
        self.modules.get(key).map(Box::as_ref)
    }

    /// Number of modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns true if no module is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Rounds a scaled param to a currency amount (negative and NaN become zero).
pub(crate) fn to_amount(value: f64) -> Amount {
    if value.is_nan() || value <= 0.0 {
        0
    } else if value >= Amount::MAX as f64 {
        Amount::MAX
    } else {
        value.round() as Amount
    }
}

/// Floors a scaled param to a block count.
pub(crate) fn to_extent(value: f64) -> u32 {
    if value.is_nan() || value <= 0.0 {
        0
    } else if value >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        value as u32
    }
}

/// Reads a number from an inline table entry.
pub(crate) fn entry_f64(table: &toml::Table, key: &str, default: f64) -> f64 {
    match table.get(key) {
        Some(toml::Value::Float(v)) => *v,
        Some(toml::Value::Integer(v)) => *v as f64,
        _ => default,
    }
}

/// Reads a non-negative integer from an inline table entry.
pub(crate) fn entry_u32(table: &toml::Table, key: &str, default: u32) -> u32 {
    table
        .get(key)
        .and_then(toml::Value::as_integer)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(default)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Runs one module directly against a mock host.

    use rand::SeedableRng;

    use super::*;
    use crate::collaborators::MockHost;

    pub(crate) struct Harness {
        pub host: MockHost,
        pub state: PlayerRuntimeState,
        pub config: EngineConfig,
        pub rng: ChaCha8Rng,
    }

    impl Harness {
        pub fn new() -> Self {
            Self {
                host: MockHost::new(),
                state: PlayerRuntimeState::default(),
                config: EngineConfig::default(),
                rng: ChaCha8Rng::seed_from_u64(5),
            }
        }

        /// Executes `module` and returns (blocks broken, secondary requested).
        pub fn run(
            &mut self,
            module: &dyn EffectModule,
            definition: &EnchantDefinition,
            level: u32,
            event: TriggerEvent,
            context: ProcContext,
        ) -> (u32, bool, Vec<ScheduledTask>) {
            let mut services = self.host.services();
            let mut ctx = EffectContext::new(
                event,
                definition,
                level,
                context,
                &mut self.state,
                &mut services,
                &self.config,
                &mut self.rng,
            );
            module.execute(&mut ctx);
            (ctx.blocks_broken, ctx.secondary_requested, ctx.scheduled)
        }
    }
}
