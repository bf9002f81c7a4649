//! # Proc Engine
//!
//! Evaluates trigger events against a tool's enchant levels and dispatches
//! successful procs to effect modules.
//!
//! ## Evaluation Order
//!
//! For every enchant on the tool, in registry order:
//!
//! 1. Trigger filter (and meta filter in a secondary roll)
//! 2. Anti-abuse gates: creative, permission, region, throttle
//! 3. Cooldown gate
//! 4. Block filter, then the module's own readiness gate
//! 5. Effective chance: `clamp(chance(level) * beacon * (1 + enhancer))`
//! 6. Roll; on success start the cooldown and execute
//!
//! If any meta effect asked for it, one secondary pass then picks a single
//! eligible non-meta enchant uniformly and runs steps 5-6 for it. A secondary
//! pass never spawns another.
//!
//! Gate failures are silent: no error, no roll consumed.
//!
//! A sneaking interact first offers the enchant's mode toggle. The toggle
//! passes the creative, permission and region gates but skips throttle,
//! cooldown and the roll.

use std::collections::HashMap;
use std::sync::Arc;

use quarry_shared::{Millis, PlayerId};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::collaborators::{GameMode, Services};
use crate::config::EngineConfig;
use crate::definition::{EnchantDefinition, EnchantId, ProcContext, TriggerKind};
use crate::effects::{EffectContext, EffectModule, EffectRegistry};
use crate::error::DefinitionResult;
use crate::event::{ActivationResult, TriggerEvent};
use crate::inbox::{TriggerInbox, TriggerSender};
use crate::registry::{DefinitionRegistry, LoadReport};
use crate::scheduler::Scheduler;
use crate::selector::WeightedSelector;
use crate::state::{PlayerRuntimeState, PlayerStates, StateReader};

/// What one [`ProcEngine::tick`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Scheduled follow-ups that ran.
    pub tasks_run: usize,
    /// Follow-ups dropped (player gone, enchant unloaded).
    pub tasks_cancelled: usize,
    /// Blocks broken by the follow-ups.
    pub blocks_broken: u32,
    /// Whether the decay task ran.
    pub decayed: bool,
}

/// The enchant proc engine.
pub struct ProcEngine {
    config: EngineConfig,
    registry: Arc<DefinitionRegistry>,
    effects: EffectRegistry,
    states: PlayerStates,
    scheduler: Scheduler,
    inbox: TriggerInbox,
    rng: ChaCha8Rng,
    last_decay: Option<Millis>,
}

impl ProcEngine {
    /// Creates an engine with every built-in effect module.
    #[must_use]
    pub fn new(config: EngineConfig, registry: DefinitionRegistry) -> Self {
        Self::with_effects(config, registry, EffectRegistry::builtin())
    }

    /// Creates an engine with a custom effect registry.
    #[must_use]
    pub fn with_effects(config: EngineConfig, registry: DefinitionRegistry, effects: EffectRegistry) -> Self {
        let engine = Self {
            rng: ChaCha8Rng::seed_from_u64(config.effective_seed()),
            inbox: TriggerInbox::new(config.inbox_capacity),
            registry: Arc::new(registry),
            effects,
            states: PlayerStates::new(),
            scheduler: Scheduler::new(),
            last_decay: None,
            config,
        };
        engine.warn_unbound();
        engine
    }

    /// Adds or replaces an effect module.
    pub fn register_effect(&mut self, module: Box<dyn EffectModule>) {
        self.effects.register(module);
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current definitions (shared with upgrade transactions).
    #[must_use]
    pub fn registry(&self) -> Arc<DefinitionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Read-only state handle for other threads.
    #[must_use]
    pub fn state_reader(&self) -> StateReader {
        self.states.reader()
    }

    /// Producer handle for off-thread triggers.
    #[must_use]
    pub fn sender(&self) -> TriggerSender {
        self.inbox.sender()
    }

    /// Follow-ups waiting to run.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.scheduler.len()
    }

    /// Replaces every definition at once.
    ///
    /// Runtime state is untouched; cooldowns of removed enchants simply expire.
    pub fn reload(&mut self, registry: DefinitionRegistry) {
        self.registry = Arc::new(registry);
        tracing::info!("Enchant registry reloaded: {} definitions", self.registry.len());
        self.warn_unbound();
    }

    /// Parses a definition file and swaps it in.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file is not TOML; the old registry stays.
    pub fn reload_toml_str(&mut self, source: &str) -> DefinitionResult<LoadReport> {
        let (registry, report) = DefinitionRegistry::load_toml_str(source)?;
        self.reload(registry);
        Ok(report)
    }

    fn warn_unbound(&self) {
        for definition in self.registry.iter() {
            if self.effects.get(definition.effect_key()).is_none() {
                tracing::warn!(
                    "Enchant {} uses unknown effect module {}; it will never fire",
                    definition.id,
                    definition.effect_key()
                );
            }
        }
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    /// Starts a session, restoring parked effect state.
    pub fn player_joined(&mut self, player: PlayerId) {
        self.states.lock().get_or_create(player);
        tracing::debug!("Player {} joined", player);
    }

    /// Ends a session: transient state is dropped and pending waves cancelled.
    ///
    /// With `retain_effect_state_on_disconnect`, slots of modules that retain
    /// state are parked until the player returns.
    pub fn player_left(&mut self, player: PlayerId) {
        let cancelled = self.scheduler.cancel_player(player);
        if cancelled > 0 {
            tracing::debug!("Cancelled {} scheduled waves for player {}", cancelled, player);
        }

        let retain = self.config.retain_effect_state_on_disconnect;
        let registry = &self.registry;
        let effects = &self.effects;
        self.states.remove(player, |id| {
            retain
                && registry
                    .get(id.as_str())
                    .and_then(|definition| effects.get(definition.effect_key()))
                    .is_some_and(|module| module.retains_state())
        });
    }

    /// Returns true if the player has a live session.
    #[must_use]
    pub fn is_online(&self, player: PlayerId) -> bool {
        self.states.contains(player)
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    /// Evaluates one trigger and returns every activation, in order.
    ///
    /// Levels are read from `services.tools`.
    pub fn evaluate(&mut self, event: &TriggerEvent, services: &mut Services<'_>) -> Vec<ActivationResult> {
        debug_assert_eq!(event.context, ProcContext::Primary, "hosts only send primary triggers");

        let levels = services.tools.levels(event.tool);
        if levels.is_empty() {
            return Vec::new();
        }

        let registry = Arc::clone(&self.registry);
        let mut states = self.states.lock();
        let state = states.get_or_create(event.player);

        let mut pass = Pass {
            config: &self.config,
            effects: &self.effects,
            rng: &mut self.rng,
            scheduler: &mut self.scheduler,
            event: TriggerEvent {
                context: ProcContext::Primary,
                ..*event
            },
            results: Vec::new(),
        };

        if pass.primary(&registry, &levels, state, services) {
            pass.secondary(&registry, &levels, state, services);
        }
        pass.results
    }

    /// Evaluates every event queued by off-thread senders.
    pub fn drain_inbox(&mut self, services: &mut Services<'_>) -> Vec<ActivationResult> {
        let mut results = Vec::new();
        for event in self.inbox.drain() {
            results.extend(self.evaluate(&event, services));
        }
        results
    }

    // =========================================================================
    // Periodic work
    // =========================================================================

    /// Runs due follow-ups and, once per decay interval, the decay task.
    pub fn tick(&mut self, now: Millis, services: &mut Services<'_>) -> TickReport {
        let mut report = TickReport::default();
        let registry = Arc::clone(&self.registry);

        let due = self.scheduler.take_due(now);
        if !due.is_empty() {
            let mut states = self.states.lock();
            for task in due {
                // Re-entry: the player may have left since scheduling
                let Some(state) = states.get_mut(task.event.player) else {
                    tracing::debug!("Dropping wave {} of {}: player {} offline", task.step, task.enchant, task.event.player);
                    report.tasks_cancelled += 1;
                    continue;
                };
                let Some((definition, module)) = registry
                    .get(task.enchant.as_str())
                    .and_then(|definition| Some((definition, self.effects.get(definition.effect_key())?)))
                else {
                    report.tasks_cancelled += 1;
                    continue;
                };

                let event = TriggerEvent { now, ..task.event };
                let mut ctx = EffectContext::new(
                    event,
                    definition,
                    task.level.min(definition.max_level),
                    task.event.context,
                    state,
                    services,
                    &self.config,
                    &mut self.rng,
                );
                module.run_scheduled(&mut ctx, task.step);

                report.tasks_run += 1;
                report.blocks_broken += ctx.blocks_broken;
                for follow_up in ctx.scheduled.drain(..) {
                    self.scheduler.schedule(follow_up);
                }
            }
        }

        let interval = self.config.decay_interval_ms;
        if self.last_decay.map_or(true, |last| now.saturating_sub(last) >= interval) {
            self.decay(now, &registry);
            self.last_decay = Some(now);
            report.decayed = true;
        }
        report
    }

    fn decay(&mut self, now: Millis, registry: &DefinitionRegistry) {
        let window = self.config.throttle_window_ms;
        let mut states = self.states.lock();
        let mut players = 0;
        for (_, state) in states.iter_mut() {
            state.expire(now, window);
            for definition in registry.iter() {
                if let Some(module) = self.effects.get(definition.effect_key()) {
                    module.decay(definition, state, now);
                }
            }
            players += 1;
        }
        tracing::debug!("Decay step at {} over {} players", now, players);
    }
}

impl std::fmt::Debug for ProcEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcEngine")
            .field("definitions", &self.registry.len())
            .field("effects", &self.effects)
            .field("players", &self.states.len())
            .field("pending_tasks", &self.scheduler.len())
            .finish_non_exhaustive()
    }
}

/// Level of a definition on the tool, if it is there at all.
fn level_of(definition: &EnchantDefinition, levels: &HashMap<EnchantId, u32>) -> Option<u32> {
    let level = levels.get(definition.id.as_str()).copied().unwrap_or(0);
    if level == 0 {
        return None;
    }
    debug_assert!(
        level <= definition.max_level,
        "{} is at level {} but max is {}",
        definition.id,
        level,
        definition.max_level
    );
    Some(level.min(definition.max_level))
}

fn filtered(definition: &EnchantDefinition, gate: &str) -> bool {
    tracing::trace!("{} filtered by {} gate", definition.id, gate);
    false
}

/// One evaluation in progress.
struct Pass<'e> {
    config: &'e EngineConfig,
    effects: &'e EffectRegistry,
    rng: &'e mut ChaCha8Rng,
    scheduler: &'e mut Scheduler,
    event: TriggerEvent,
    results: Vec<ActivationResult>,
}

impl Pass<'_> {
    /// Runs the primary pass. Returns true if a secondary roll was requested.
    fn primary(
        &mut self,
        registry: &DefinitionRegistry,
        levels: &HashMap<EnchantId, u32>,
        state: &mut PlayerRuntimeState,
        services: &mut Services<'_>,
    ) -> bool {
        let effects = self.effects;
        let mut secondary = false;

        for definition in registry.iter() {
            let Some(level) = level_of(definition, levels) else {
                continue;
            };
            let Some(module) = effects.get(definition.effect_key()) else {
                continue;
            };

            if self.event.kind == TriggerKind::Interact
                && self.event.sneaking
                && self.permitted(definition, services)
                && self.control(module, definition, level, state, services)
            {
                continue;
            }
            if !self.eligible(module, definition, ProcContext::Primary, state, services) {
                continue;
            }
            if self.roll(definition, level, state) {
                secondary |= self.activate(module, definition, level, ProcContext::Primary, state, services);
            }
        }
        secondary
    }

    /// Picks one eligible non-meta enchant uniformly and rolls it.
    fn secondary(
        &mut self,
        registry: &DefinitionRegistry,
        levels: &HashMap<EnchantId, u32>,
        state: &mut PlayerRuntimeState,
        services: &mut Services<'_>,
    ) {
        let effects = self.effects;
        let mut candidates = WeightedSelector::new();
        for definition in registry.iter() {
            let Some(level) = level_of(definition, levels) else {
                continue;
            };
            let Some(module) = effects.get(definition.effect_key()) else {
                continue;
            };
            if self.eligible(module, definition, ProcContext::SecondaryRoll, state, services) {
                candidates.push((definition, module, level), 1.0);
            }
        }

        let Some((definition, module, level)) = candidates.pick_owned(&mut *self.rng) else {
            tracing::debug!("Secondary roll for player {}: no eligible enchant", self.event.player);
            return;
        };
        tracing::debug!("Secondary roll for player {} picked {}", self.event.player, definition.id);

        if self.roll(definition, level, state) {
            let nested = self.activate(module, definition, level, ProcContext::SecondaryRoll, state, services);
            debug_assert!(!nested, "secondary roll requested another secondary roll");
        }
    }

    /// Steps 1-4: every gate before the roll.
    fn eligible(
        &self,
        module: &dyn EffectModule,
        definition: &EnchantDefinition,
        context: ProcContext,
        state: &mut PlayerRuntimeState,
        services: &Services<'_>,
    ) -> bool {
        let event = &self.event;
        let abuse = &definition.abuse;

        // Step 1: Trigger and recursion filter
        if !definition.responds_to(event.kind) {
            return false;
        }
        if context == ProcContext::SecondaryRoll && module.is_meta() {
            return filtered(definition, "meta");
        }

        // Step 2: Anti-abuse
        if !self.permitted(definition, services) {
            return false;
        }
        if abuse.max_procs_per_second > 0 {
            let window = state.windows.entry(definition.id.clone()).or_default();
            if !window.allows(event.now, self.config.throttle_window_ms, abuse.max_procs_per_second) {
                return filtered(definition, "throttle");
            }
        }

        // Step 3: Cooldown
        if state.on_cooldown(definition.id.as_str(), event.now) {
            return filtered(definition, "cooldown");
        }

        // Step 4: Block filter
        if let Some(block) = event.block {
            if !definition.filters.allows(services.world.block_kind_at(block)) {
                return filtered(definition, "block");
            }
        }
        if !module.ready(definition, state) {
            return filtered(definition, "ready");
        }
        true
    }

    /// Creative, permission and region gates.
    fn permitted(&self, definition: &EnchantDefinition, services: &Services<'_>) -> bool {
        let event = &self.event;
        let abuse = &definition.abuse;

        if abuse.ignore_if_creative && event.game_mode == GameMode::Creative {
            return filtered(definition, "creative");
        }
        if abuse.ignore_if_no_permission {
            let node = definition.permission_node(&self.config.permission_prefix);
            if !services.permissions.has(event.player, &node) {
                return filtered(definition, "permission");
            }
        }
        if let Some(required) = &abuse.requires_region {
            if services.regions.region_at(event.anchor()).as_deref() != Some(required.as_str()) {
                return filtered(definition, "region");
            }
        }
        true
    }

    /// Steps 5-6: effective chance and the roll.
    fn roll(&mut self, definition: &EnchantDefinition, level: u32, state: &PlayerRuntimeState) -> bool {
        let boosted = definition.chance.chance_at(level)
            * self.event.beacon_multiplier
            * (1.0 + state.enhancer_bonus(self.event.now));
        let chance = definition.chance.clamp(boosted);
        debug_assert!((0.0..=definition.chance.cap).contains(&chance));
        self.rng.gen::<f64>() < chance
    }

    /// Starts the cooldown, records the throttle and runs the effect.
    ///
    /// Returns true if the effect asked for a secondary roll.
    fn activate(
        &mut self,
        module: &dyn EffectModule,
        definition: &EnchantDefinition,
        level: u32,
        context: ProcContext,
        state: &mut PlayerRuntimeState,
        services: &mut Services<'_>,
    ) -> bool {
        let now = self.event.now;
        state.start_cooldown(&definition.id, now, definition.cooldown_ms);
        if definition.abuse.max_procs_per_second > 0 {
            state.windows.entry(definition.id.clone()).or_default().record(now);
        }

        let mut ctx = EffectContext::new(self.event, definition, level, context, state, services, self.config, self.rng);
        module.execute(&mut ctx);

        let blocks_broken = ctx.blocks_broken;
        let requested = ctx.secondary_requested;
        for task in ctx.scheduled.drain(..) {
            self.scheduler.schedule(task);
        }

        tracing::debug!(
            "Player {} activated {} level {} ({:?}, {} blocks)",
            self.event.player,
            definition.id,
            level,
            context,
            blocks_broken
        );
        self.results.push(ActivationResult {
            enchant: definition.id.clone(),
            level,
            context,
            blocks_broken,
            control: false,
        });
        requested
    }

    /// Sneak + interact mode changes.
    fn control(
        &mut self,
        module: &dyn EffectModule,
        definition: &EnchantDefinition,
        level: u32,
        state: &mut PlayerRuntimeState,
        services: &mut Services<'_>,
    ) -> bool {
        let mut ctx = EffectContext::new(
            self.event,
            definition,
            level,
            ProcContext::Primary,
            state,
            services,
            self.config,
            self.rng,
        );
        if !module.control(&mut ctx) {
            return false;
        }
        tracing::debug!("Player {} toggled {}", self.event.player, definition.id);
        self.results.push(ActivationResult {
            enchant: definition.id.clone(),
            level,
            context: ProcContext::Primary,
            blocks_broken: 0,
            control: true,
        });
        true
    }
}
