//! Block-clearing effects.

use quarry_shared::Millis;

use super::{to_extent, EffectContext, EffectModule, Shape};
use crate::collaborators::Cosmetic;
use crate::definition::{EnchantDefinition, ProcContext};
use crate::state::PlayerRuntimeState;

/// Area blast around the broken block. Params: `radius`, `radius_per_level`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Explosive;

impl EffectModule for Explosive {
    fn key(&self) -> &'static str {
        "explosive"
    }

    fn execute(&self, ctx: &mut EffectContext<'_, '_>) {
        let radius = to_extent(ctx.definition.params.scaled("radius", ctx.level, 1.0));
        let anchor = ctx.anchor();
        ctx.clear(Shape::Area { anchor, radius });
        ctx.cosmetic(Cosmetic::Explosion { radius });
    }
}

/// Laser toggle stored in the player's slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LaserMode {
    /// Beam mode on.
    pub enabled: bool,
}

/// Beam along the player's facing axis while beam mode is on.
///
/// Sneak + interact toggles the mode. Params: `range`, `range_per_level`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Laser;

impl EffectModule for Laser {
    fn key(&self) -> &'static str {
        "laser"
    }

    fn ready(&self, definition: &EnchantDefinition, state: &PlayerRuntimeState) -> bool {
        state
            .effects
            .get::<LaserMode>(definition.id.as_str())
            .is_some_and(|mode| mode.enabled)
    }

    fn control(&self, ctx: &mut EffectContext<'_, '_>) -> bool {
        if ctx.context != ProcContext::Primary {
            return false;
        }
        let mut mode: LaserMode = ctx.slot();
        mode.enabled = !mode.enabled;
        tracing::debug!("Player {} laser mode {}", ctx.player(), if mode.enabled { "on" } else { "off" });
        ctx.store(mode);
        true
    }

    fn execute(&self, ctx: &mut EffectContext<'_, '_>) {
        let Some(direction) = ctx.services.world.facing_vector(ctx.player()).dominant_axis() else {
            return;
        };
        let range = to_extent(ctx.definition.params.scaled("range", ctx.level, 8.0));
        let origin = ctx.anchor();
        let broken = ctx.clear(Shape::Line {
            origin,
            direction,
            range,
        });
        if broken > 0 {
            ctx.cosmetic(Cosmetic::Beam { length: range });
        }
    }
}

/// Column straight up from the broken block. Params: `height`, `height_per_level`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Drill;

impl EffectModule for Drill {
    fn key(&self) -> &'static str {
        "drill"
    }

    fn execute(&self, ctx: &mut EffectContext<'_, '_>) {
        let height = to_extent(ctx.definition.params.scaled("height", ctx.level, 4.0));
        let anchor = ctx.anchor();
        if ctx.clear(Shape::Column { anchor, height }) > 0 {
            ctx.cosmetic(Cosmetic::Lightning);
        }
    }
}

/// Expanding area waves. The first wave runs immediately; the rest are
/// scheduled `wave_delay_ms` apart and cancel if the player leaves.
///
/// Params: `waves`, `wave_delay_ms`, `radius`, `radius_per_level`, `radius_step`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Shockwave;

impl Shockwave {
    fn wave(ctx: &mut EffectContext<'_, '_>, step: u32) {
        let params = &ctx.definition.params;
        let radius = to_extent(params.scaled("radius", ctx.level, 1.0))
            .saturating_add(step.saturating_mul(params.u32_or("radius_step", 1)));
        let anchor = ctx.anchor();
        ctx.clear(Shape::Area { anchor, radius });
        ctx.cosmetic(Cosmetic::Explosion { radius });
    }
}

impl EffectModule for Shockwave {
    fn key(&self) -> &'static str {
        "shockwave"
    }

    fn execute(&self, ctx: &mut EffectContext<'_, '_>) {
        let waves = ctx.definition.params.u32_or("waves", 3).max(1);
        let delay: Millis = ctx.definition.params.u64_or("wave_delay_ms", 250);

        Self::wave(ctx, 0);
        for step in 1..waves {
            ctx.schedule(delay.saturating_mul(u64::from(step)), step);
        }
    }

    fn run_scheduled(&self, ctx: &mut EffectContext<'_, '_>, step: u32) {
        Self::wave(ctx, step);
    }
}
