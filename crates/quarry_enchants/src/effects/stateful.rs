//! Accumulating effects: stacks, charge, escrow, timed drop boosts.
//!
//! Each keeps its state in the player's slot for the enchant and only does
//! something visible once a threshold is crossed.

use quarry_shared::{Amount, Millis};

use super::{to_amount, to_extent, EffectContext, EffectModule, Shape};
use crate::collaborators::{Cosmetic, StatusEffect, StatusKind};
use crate::definition::EnchantDefinition;
use crate::state::{DropBoost, PlayerRuntimeState};

/// Overclock stacks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OverclockState {
    /// Current stack count.
    pub stacks: u32,
    /// Last proc or decay step.
    pub last_activity: Millis,
}

/// Stacking haste. Each proc adds a stack up to `max_stacks`; one stack
/// decays per `decay_after_ms` without a proc.
#[derive(Clone, Copy, Debug, Default)]
pub struct Overclock;

impl EffectModule for Overclock {
    fn key(&self) -> &'static str {
        "overclock"
    }

    fn execute(&self, ctx: &mut EffectContext<'_, '_>) {
        let params = &ctx.definition.params;
        let max_stacks = to_extent(params.scaled("max_stacks", ctx.level, 5.0)).max(1);
        let duration_ms = params.u64_or("haste_ms", 5_000);

        let mut slot: OverclockState = ctx.slot();
        slot.stacks = (slot.stacks + 1).min(max_stacks);
        slot.last_activity = ctx.now();
        let amplifier = slot.stacks - 1;
        ctx.store(slot);

        ctx.apply_status(StatusEffect {
            kind: StatusKind::Haste,
            amplifier,
            duration_ms,
        });
    }

    fn decay(&self, definition: &EnchantDefinition, state: &mut PlayerRuntimeState, now: Millis) {
        let mut slot: OverclockState = state.effects.take(&definition.id);
        if slot.stacks == 0 {
            return;
        }
        let idle_ms = definition.params.u64_or("decay_after_ms", 3_000);
        if now.saturating_sub(slot.last_activity) >= idle_ms {
            slot.stacks -= 1;
            slot.last_activity = now;
            tracing::debug!("{} decayed to {} stacks", definition.id, slot.stacks);
        }
        state.effects.put(&definition.id, slot);
    }

    fn retains_state(&self) -> bool {
        true
    }
}

/// Overload charge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OverloadState {
    /// Accumulated charge.
    pub charge: u32,
}

/// Charge-and-burst. Procs add charge; reaching `max_charge` clears an area
/// of `burst_radius` and resets the charge.
#[derive(Clone, Copy, Debug, Default)]
pub struct Overload;

impl EffectModule for Overload {
    fn key(&self) -> &'static str {
        "overload"
    }

    fn execute(&self, ctx: &mut EffectContext<'_, '_>) {
        let params = &ctx.definition.params;
        let gain = to_extent(params.scaled("charge_per_proc", ctx.level, 1.0)).max(1);
        let max_charge = params.u32_or("max_charge", 10).max(1);
        let radius = params.u32_or("burst_radius", 2);

        let mut slot: OverloadState = ctx.slot();
        slot.charge = slot.charge.saturating_add(gain);
        if slot.charge >= max_charge {
            slot.charge = 0;
            let anchor = ctx.anchor();
            let broken = ctx.clear(Shape::Area { anchor, radius });
            ctx.cosmetic(Cosmetic::Explosion { radius });
            tracing::debug!("Player {} overload burst broke {} blocks", ctx.player(), broken);
        }
        ctx.store(slot);
    }

    fn retains_state(&self) -> bool {
        true
    }
}

/// Piggy bank escrow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PiggyBankState {
    /// Hidden balance not yet paid out.
    pub escrow: Amount,
}

/// Escrow-and-payout. Each proc escrows `deposit`; at `threshold` the escrow
/// plus `bonus` is paid in `currency` and the escrow resets.
#[derive(Clone, Copy, Debug, Default)]
pub struct PiggyBank;

impl EffectModule for PiggyBank {
    fn key(&self) -> &'static str {
        "piggy_bank"
    }

    fn execute(&self, ctx: &mut EffectContext<'_, '_>) {
        let definition = ctx.definition;
        let params = &definition.params;
        let threshold = params.u64_or("threshold", 1_000).max(1);

        let mut slot: PiggyBankState = ctx.slot();
        slot.escrow = slot
            .escrow
            .saturating_add(to_amount(params.scaled("deposit", ctx.level, 25.0)));

        if slot.escrow >= threshold {
            let bonus = params.scaled("bonus", ctx.level, 0.25).max(0.0);
            let payout = to_amount(slot.escrow as f64 * (1.0 + bonus));
            slot.escrow = 0;
            ctx.deposit(params.str_or("currency", "tokens"), payout);
            ctx.cosmetic(Cosmetic::Sparkle);
        }
        ctx.store(slot);
    }

    fn retains_state(&self) -> bool {
        true
    }
}

/// Timed drop multipliers for ore and stone broken by clearing effects.
///
/// Params: `duration_ms`, `duration_ms_per_level`, `ore_multiplier`,
/// `ore_multiplier_per_level`, `stone_multiplier`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Poison;

impl EffectModule for Poison {
    fn key(&self) -> &'static str {
        "poison"
    }

    fn execute(&self, ctx: &mut EffectContext<'_, '_>) {
        let params = &ctx.definition.params;
        let duration_ms = to_amount(params.scaled("duration_ms", ctx.level, 5_000.0));
        let boost = DropBoost {
            expiry: ctx.now().saturating_add(duration_ms),
            ore: params.scaled("ore_multiplier", ctx.level, 2.0).max(1.0),
            stone: params.f64_or("stone_multiplier", 1.0).max(1.0),
        };
        ctx.state.drop_boost = Some(boost);
        ctx.apply_status(StatusEffect {
            kind: StatusKind::Poison,
            amplifier: 0,
            duration_ms,
        });
    }
}
