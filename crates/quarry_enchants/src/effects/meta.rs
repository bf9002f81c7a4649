//! Meta effects: act on sibling enchants, never on the block directly.
//!
//! Every module here no-ops outside the primary pass.

use super::{to_amount, EffectContext, EffectModule};
use crate::collaborators::Cosmetic;
use crate::definition::ProcContext;
use crate::state::EnhancerBuff;

/// Requests the single secondary roll.
#[derive(Clone, Copy, Debug, Default)]
pub struct SecondHand;

impl EffectModule for SecondHand {
    fn key(&self) -> &'static str {
        "second_hand"
    }

    fn is_meta(&self) -> bool {
        true
    }

    fn execute(&self, ctx: &mut EffectContext<'_, '_>) {
        if ctx.context != ProcContext::Primary {
            return;
        }
        ctx.request_secondary_roll();
    }
}

/// Last batch this enchant duplicated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MirrorState {
    /// Sequence number of the mirrored batch.
    pub mirrored_seq: u64,
}

/// Re-grants the player's last delivered item batch, at most once per batch.
#[derive(Clone, Copy, Debug, Default)]
pub struct Mirror;

impl EffectModule for Mirror {
    fn key(&self) -> &'static str {
        "mirror"
    }

    fn is_meta(&self) -> bool {
        true
    }

    fn execute(&self, ctx: &mut EffectContext<'_, '_>) {
        if ctx.context != ProcContext::Primary {
            return;
        }
        let mut slot: MirrorState = ctx.slot();
        let record = &ctx.state.last_drops;
        if record.seq > slot.mirrored_seq && !record.items.is_empty() {
            let (pos, items) = (record.pos, record.items.clone());
            slot.mirrored_seq = record.seq;
            ctx.services.grant_or_drop(ctx.event.player, pos, &items);
            ctx.cosmetic(Cosmetic::Sparkle);
        }
        ctx.store(slot);
    }
}

/// Proc counter for rewind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RewindState {
    /// Procs since the last reduction.
    pub procs: u32,
}

/// Every `every` procs, shortens all other running cooldowns by `reduce_ms`
/// (never past zero remaining).
#[derive(Clone, Copy, Debug, Default)]
pub struct Rewind;

impl EffectModule for Rewind {
    fn key(&self) -> &'static str {
        "rewind"
    }

    fn is_meta(&self) -> bool {
        true
    }

    fn execute(&self, ctx: &mut EffectContext<'_, '_>) {
        if ctx.context != ProcContext::Primary {
            return;
        }
        let definition = ctx.definition;
        let every = definition.params.u32_or("every", 3).max(1);
        let reduce_ms = to_amount(definition.params.scaled("reduce_ms", ctx.level, 1_000.0));

        let mut slot: RewindState = ctx.slot();
        slot.procs += 1;
        if slot.procs >= every {
            slot.procs = 0;
            let now = ctx.now();
            let reduced = ctx.state.reduce_cooldowns(definition.id.as_str(), now, reduce_ms);
            tracing::debug!("Player {} rewound {} cooldowns by {}ms", ctx.player(), reduced, reduce_ms);
        }
        ctx.store(slot);
    }
}

/// Timed global proc bonus: every chance is multiplied by `1 + bonus`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Enhancer;

impl EffectModule for Enhancer {
    fn key(&self) -> &'static str {
        "enhancer"
    }

    fn is_meta(&self) -> bool {
        true
    }

    fn execute(&self, ctx: &mut EffectContext<'_, '_>) {
        if ctx.context != ProcContext::Primary {
            return;
        }
        let params = &ctx.definition.params;
        let bonus = params.scaled("bonus", ctx.level, 0.1).max(0.0);
        let duration_ms = to_amount(params.scaled("duration_ms", ctx.level, 10_000.0));
        ctx.state.enhancer = Some(EnhancerBuff {
            expiry: ctx.event.now.saturating_add(duration_ms),
            bonus,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{ChanceFormula, EnchantDefinition, EnchantId, Params, TriggerKind};
    use crate::effects::testing::Harness;
    use crate::event::TriggerEvent;
    use quarry_shared::{BlockPos, ItemStack, ToolHandle};

    fn definition(id: &str, params: Params) -> EnchantDefinition {
        let mut def = EnchantDefinition::new(
            id,
            10,
            ChanceFormula {
                base: 1.0,
                per_level: 0.0,
                cap: 1.0,
            },
            TriggerKind::BlockBreak,
        );
        def.params = params;
        def
    }

    fn event(now: u64) -> TriggerEvent {
        TriggerEvent::block_break(1, ToolHandle(1), BlockPos::ORIGIN, now)
    }

    #[test]
    fn test_second_hand_only_requests_in_primary() {
        let mut harness = Harness::new();
        let def = definition("second_hand", Params::new());
        assert!(harness.run(&SecondHand, &def, 1, event(0), ProcContext::Primary).1);
        assert!(!harness.run(&SecondHand, &def, 1, event(0), ProcContext::SecondaryRoll).1);
    }

    #[test]
    fn test_mirror_once_per_batch() {
        let mut harness = Harness::new();
        harness
            .state
            .record_drops(BlockPos::ORIGIN, &[ItemStack::new(4, 2)]);
        let def = definition("mirror", Params::new());

        harness.run(&Mirror, &def, 1, event(0), ProcContext::Primary);
        harness.run(&Mirror, &def, 1, event(0), ProcContext::Primary);
        assert_eq!(harness.host.inventory.count_item(1, 4), 2);

        harness
            .state
            .record_drops(BlockPos::ORIGIN, &[ItemStack::new(5, 1)]);
        harness.run(&Mirror, &def, 1, event(0), ProcContext::Primary);
        assert_eq!(harness.host.inventory.count_item(1, 5), 1);
    }

    #[test]
    fn test_rewind_every_n_procs() {
        let mut harness = Harness::new();
        let laser = EnchantId::from("laser");
        harness.state.start_cooldown(&laser, 0, 10_000);
        let def = definition("rewind", Params::new().with("every", 2).with("reduce_ms", 4_000));

        harness.run(&Rewind, &def, 1, event(100), ProcContext::Primary);
        assert_eq!(harness.state.cooldowns[&laser], 10_000);
        harness.run(&Rewind, &def, 1, event(200), ProcContext::Primary);
        assert_eq!(harness.state.cooldowns[&laser], 6_000);
    }

    #[test]
    fn test_meta_noop_in_secondary_roll() {
        let mut harness = Harness::new();
        let def = definition("enhancer", Params::new().with("bonus", 0.5));
        harness.run(&Enhancer, &def, 1, event(0), ProcContext::SecondaryRoll);
        assert!(harness.state.enhancer.is_none());

        harness.run(&Enhancer, &def, 1, event(0), ProcContext::Primary);
        assert!((harness.state.enhancer_bonus(5_000) - 0.5).abs() < 1e-9);
        assert_eq!(harness.state.enhancer_bonus(10_000), 0.0);
    }
}
