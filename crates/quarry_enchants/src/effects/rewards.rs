//! Instant rewards: currency, keys, treasure.

use quarry_shared::ItemStack;

use super::{entry_f64, entry_u32, to_amount, EffectContext, EffectModule};
use crate::collaborators::Cosmetic;
use crate::selector::WeightedSelector;

/// Deposits `amount + amount_per_level * level` of `currency`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokenFinder;

impl EffectModule for TokenFinder {
    fn key(&self) -> &'static str {
        "token_finder"
    }

    fn execute(&self, ctx: &mut EffectContext<'_, '_>) {
        let definition = ctx.definition;
        let params = &definition.params;
        let amount = to_amount(params.scaled("amount", ctx.level, 10.0));
        let currency = params.str_or("currency", "tokens");
        ctx.deposit(currency, amount);
    }
}

/// Grants one key item picked from the weighted `keys` list.
///
/// ```toml
/// params = { keys = [{ item = 900, weight = 3.0 }, { item = 901, weight = 1.0, count = 2 }] }
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct KeyFinder;

impl EffectModule for KeyFinder {
    fn key(&self) -> &'static str {
        "key_finder"
    }

    fn execute(&self, ctx: &mut EffectContext<'_, '_>) {
        let selector: WeightedSelector<ItemStack> = ctx
            .definition
            .params
            .tables("keys")
            .into_iter()
            .filter_map(|entry| {
                let item = entry_u32(entry, "item", 0);
                let count = entry_u32(entry, "count", 1);
                (item != 0 && count > 0).then(|| (ItemStack::new(item, count), entry_f64(entry, "weight", 1.0)))
            })
            .collect();

        if let Some(key) = selector.pick_owned(ctx.rng) {
            ctx.grant(&[key]);
            ctx.cosmetic(Cosmetic::Sparkle);
        }
    }
}

/// Deposits one weighted currency reward, scaled by level.
///
/// ```toml
/// params = { level_bonus = 0.02, rewards = [{ currency = "tokens", amount = 500, weight = 5 }] }
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct Treasure;

impl EffectModule for Treasure {
    fn key(&self) -> &'static str {
        "treasure"
    }

    fn execute(&self, ctx: &mut EffectContext<'_, '_>) {
        let definition = ctx.definition;
        let selector: WeightedSelector<(&str, f64)> = definition
            .params
            .tables("rewards")
            .into_iter()
            .map(|entry| {
                let currency = entry.get("currency").and_then(toml::Value::as_str).unwrap_or("tokens");
                ((currency, entry_f64(entry, "amount", 0.0)), entry_f64(entry, "weight", 1.0))
            })
            .collect();

        let Some(&(currency, amount)) = selector.pick(ctx.rng) else {
            return;
        };
        let scale = 1.0 + definition.params.f64_or("level_bonus", 0.0) * f64::from(ctx.level);
        ctx.deposit(currency, to_amount(amount * scale));
    }
}
