//! # Enchant Definitions
//!
//! Immutable, data-loaded description of one enchant: its proc-chance and
//! upgrade-cost formulas, the triggers it reacts to, its block filters and its
//! anti-abuse policy. Effect-specific tunables live in a free-form `params`
//! table that only the matching effect module reads.
//!
//! ## File Format
//!
//! ```toml
//! [[enchant]]
//! id = "explosive"
//! max_level = 50
//! rarity = "rare"
//! triggers = ["block_break"]
//! cooldown_ms = 0
//! chance = { base = 0.01, per_level = 0.002, cap = 0.25 }
//! cost = { currency = "tokens", base = 100.0, per_level = 50.0 }
//! success = { enabled = true, base = 1.0, per_level_delta = -0.01, fail_mode = "downgrade" }
//! filters = { blacklist = [7, 8] }
//! abuse = { ignore_if_creative = true, max_procs_per_second = 4 }
//! params = { radius = 1, radius_per_level = 0.1, max_blocks = 48 }
//! ```

use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};

use quarry_shared::{Amount, BlockKind};
use serde::{Deserialize, Serialize};

use crate::effects::to_amount;
use crate::error::{DefinitionError, DefinitionResult};

/// Identifier of an enchant (`"explosive"`, `"token_finder"`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnchantId(String);

impl EnchantId {
    /// Creates an id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EnchantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Borrow<str> for EnchantId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EnchantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Class of game event an enchant may respond to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// The tool broke a block.
    BlockBreak,
    /// Periodic tick while the player is actively mining.
    IdleTick,
    /// The player used the tool (right click).
    Interact,
}

/// Whether an evaluation is a normal trigger or the single bonus re-roll.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProcContext {
    /// A trigger coming straight from the host.
    Primary,
    /// The one bonus pass requested by a meta effect. Never spawns another.
    SecondaryRoll,
}

/// Rarity tier. Used only for sorting and display.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Rarity {
    /// Common enchants (gray).
    #[default]
    Common = 0,
    /// Uncommon enchants (green).
    Uncommon = 1,
    /// Rare enchants (blue).
    Rare = 2,
    /// Epic enchants (purple).
    Epic = 3,
    /// Legendary enchants (orange).
    Legendary = 4,
    /// Mythic enchants (red).
    Mythic = 5,
}

/// Proc chance: `min(base + per_level * level, cap)`, floored at zero.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChanceFormula {
    /// Chance at level zero.
    pub base: f64,
    /// Added per level.
    #[serde(default)]
    pub per_level: f64,
    /// Upper bound, in `[0, 1]`.
    #[serde(default = "default_cap")]
    pub cap: f64,
}

const fn default_cap() -> f64 {
    1.0
}

impl ChanceFormula {
    /// Chance before external multipliers. Always in `[0, cap]`.
    #[inline]
    #[must_use]
    pub fn chance_at(&self, level: u32) -> f64 {
        self.clamp(self.base + self.per_level * f64::from(level))
    }

    /// Clamps an arbitrary chance into `[0, cap]`. NaN becomes zero.
    #[inline]
    #[must_use]
    pub fn clamp(&self, chance: f64) -> f64 {
        if chance.is_nan() {
            return 0.0;
        }
        chance.clamp(0.0, self.cap)
    }
}

/// Upgrade cost per level.
///
/// Linear `base + per_level * (target - 1)` when `factor == 1.0`, otherwise
/// exponential `base * factor^(target - 1)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CostFormula {
    /// Ledger currency the upgrade is priced in.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Cost of level one.
    #[serde(default)]
    pub base: f64,
    /// Linear increment per level.
    #[serde(default)]
    pub per_level: f64,
    /// Exponential growth factor; `1.0` selects the linear formula.
    #[serde(default = "default_factor")]
    pub factor: f64,
}

fn default_currency() -> String {
    "tokens".to_string()
}

const fn default_factor() -> f64 {
    1.0
}

impl Default for CostFormula {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            base: 0.0,
            per_level: 0.0,
            factor: default_factor(),
        }
    }
}

impl CostFormula {
    /// Returns true if the exponential formula is in effect.
    #[inline]
    #[must_use]
    pub fn is_exponential(&self) -> bool {
        (self.factor - 1.0).abs() > f64::EPSILON
    }

    /// Cost of reaching `target_level` from the level below it.
    #[must_use]
    pub fn cost_for_level(&self, target_level: u32) -> Amount {
        let steps = f64::from(target_level.saturating_sub(1));
        let raw = if self.is_exponential() {
            self.base * self.factor.powf(steps)
        } else {
            self.base + self.per_level * steps
        };
        to_amount(raw)
    }

    /// Total cost of going from `current_level` up by `levels`.
    #[must_use]
    pub fn total_cost(&self, current_level: u32, levels: u32) -> Amount {
        (1..=levels)
            .map(|i| self.cost_for_level(current_level.saturating_add(i)))
            .fold(0, Amount::saturating_add)
    }
}

/// What happens to the level when an upgrade roll fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailMode {
    /// No consequence configured; the level stays where it was.
    #[default]
    None,
    /// The level stays where it was.
    NoChange,
    /// The level drops by one, never below zero.
    Downgrade,
    /// The enchant is removed from the tool.
    Remove,
}

impl FailMode {
    /// Level after a failed attempt starting from `current_level`.
    #[inline]
    #[must_use]
    pub const fn apply(self, current_level: u32) -> u32 {
        match self {
            Self::None | Self::NoChange => current_level,
            Self::Downgrade => current_level.saturating_sub(1),
            Self::Remove => 0,
        }
    }
}

/// Optional success-chance gate on upgrades.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuccessGate {
    /// When false every upgrade succeeds.
    #[serde(default)]
    pub enabled: bool,
    /// Chance of reaching level one.
    #[serde(default = "default_cap")]
    pub base: f64,
    /// Added per target level above one (usually negative).
    #[serde(default)]
    pub per_level_delta: f64,
    /// Consequence of a failed roll.
    #[serde(default)]
    pub fail_mode: FailMode,
}

impl Default for SuccessGate {
    fn default() -> Self {
        Self {
            enabled: false,
            base: 1.0,
            per_level_delta: 0.0,
            fail_mode: FailMode::None,
        }
    }
}

impl SuccessGate {
    /// Chance that an upgrade landing on `target_level` succeeds, in `[0, 1]`.
    #[must_use]
    pub fn chance_for(&self, target_level: u32) -> f64 {
        if !self.enabled {
            return 1.0;
        }
        let chance = self.base + self.per_level_delta * f64::from(target_level.saturating_sub(1));
        if chance.is_nan() {
            0.0
        } else {
            chance.clamp(0.0, 1.0)
        }
    }
}

/// Block allow/deny sets.
///
/// A non-empty whitelist is exclusive; otherwise a block is allowed unless it
/// is blacklisted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockFilter {
    /// Blocks that never trigger the enchant.
    #[serde(default)]
    pub blacklist: BTreeSet<BlockKind>,
    /// If non-empty, the only blocks that trigger the enchant.
    #[serde(default)]
    pub whitelist: BTreeSet<BlockKind>,
}

impl BlockFilter {
    /// Returns true if `kind` may trigger the enchant.
    #[inline]
    #[must_use]
    pub fn allows(&self, kind: BlockKind) -> bool {
        if self.whitelist.is_empty() {
            !self.blacklist.contains(&kind)
        } else {
            self.whitelist.contains(&kind)
        }
    }
}

/// Anti-abuse policy checked before any roll.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AbusePolicy {
    /// Skip players in creative mode.
    #[serde(default)]
    pub ignore_if_creative: bool,
    /// Skip players lacking the enchant's permission node.
    #[serde(default)]
    pub ignore_if_no_permission: bool,
    /// Only fire inside this region.
    #[serde(default)]
    pub requires_region: Option<String>,
    /// Activations allowed per player per throttle window. `0` = unlimited.
    #[serde(default)]
    pub max_procs_per_second: u32,
}

/// Free-form effect parameters, read only by the matching effect module.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, toml::Value>);

impl Params {
    /// Creates an empty parameter table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter (builder style, used by hosts and tests).
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Raw access to a parameter.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        self.0.get(key)
    }

    /// Reads a number (integer or float), or `default`.
    #[must_use]
    pub fn f64_or(&self, key: &str, default: f64) -> f64 {
        match self.0.get(key) {
            Some(toml::Value::Float(v)) => *v,
            Some(toml::Value::Integer(v)) => *v as f64,
            _ => default,
        }
    }

    /// Reads a non-negative integer, or `default`.
    #[must_use]
    pub fn u32_or(&self, key: &str, default: u32) -> u32 {
        match self.0.get(key) {
            Some(toml::Value::Integer(v)) => u32::try_from(*v).unwrap_or(default),
            Some(toml::Value::Float(v)) if *v >= 0.0 => *v as u32,
            _ => default,
        }
    }

    /// Reads a non-negative integer as `u64`, or `default`.
    #[must_use]
    pub fn u64_or(&self, key: &str, default: u64) -> u64 {
        match self.0.get(key) {
            Some(toml::Value::Integer(v)) => u64::try_from(*v).unwrap_or(default),
            _ => default,
        }
    }

    /// Reads a boolean, or `default`.
    #[must_use]
    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        match self.0.get(key) {
            Some(toml::Value::Boolean(v)) => *v,
            _ => default,
        }
    }

    /// Reads a string, or `default`.
    #[must_use]
    pub fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        match self.0.get(key) {
            Some(toml::Value::String(v)) => v,
            _ => default,
        }
    }

    /// Reads a list of block kinds. Non-integer entries are skipped.
    #[must_use]
    pub fn block_set(&self, key: &str) -> BTreeSet<BlockKind> {
        match self.0.get(key) {
            Some(toml::Value::Array(items)) => items
                .iter()
                .filter_map(toml::Value::as_integer)
                .filter_map(|v| BlockKind::try_from(v).ok())
                .collect(),
            _ => BTreeSet::new(),
        }
    }

    /// Reads a list of inline tables (`[{ item = 1, weight = 2.0 }, ...]`).
    #[must_use]
    pub fn tables(&self, key: &str) -> Vec<&toml::Table> {
        match self.0.get(key) {
            Some(toml::Value::Array(items)) => items.iter().filter_map(toml::Value::as_table).collect(),
            _ => Vec::new(),
        }
    }

    /// Scaled value `base + per_level * level` read from `{prefix}` and
    /// `{prefix}_per_level`.
    #[must_use]
    pub fn scaled(&self, prefix: &str, level: u32, default_base: f64) -> f64 {
        let base = self.f64_or(prefix, default_base);
        let per_level = self.f64_or(&format!("{prefix}_per_level"), 0.0);
        base + per_level * f64::from(level)
    }
}

/// The immutable description of one enchant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnchantDefinition {
    /// Unique id.
    pub id: EnchantId,
    /// Effect module key. Defaults to the id.
    #[serde(default)]
    pub effect: Option<String>,
    /// Highest level a tool can hold.
    pub max_level: u32,
    /// Display/sorting tier.
    #[serde(default)]
    pub rarity: Rarity,
    /// Proc-chance formula.
    pub chance: ChanceFormula,
    /// Events this enchant reacts to.
    pub triggers: BTreeSet<TriggerKind>,
    /// Cooldown after an activation (0 = none).
    #[serde(default)]
    pub cooldown_ms: u64,
    /// Upgrade pricing.
    #[serde(default)]
    pub cost: CostFormula,
    /// Upgrade success gate.
    #[serde(default)]
    pub success: SuccessGate,
    /// Block allow/deny sets.
    #[serde(default)]
    pub filters: BlockFilter,
    /// Anti-abuse policy.
    #[serde(default)]
    pub abuse: AbusePolicy,
    /// Permission node override.
    #[serde(default)]
    pub permission: Option<String>,
    /// Mutually exclusive enchants.
    #[serde(default)]
    pub conflicts: BTreeSet<EnchantId>,
    /// Effect tunables.
    #[serde(default)]
    pub params: Params,
}

impl EnchantDefinition {
    /// Creates a minimal definition: one trigger, no cooldown, free upgrades.
    #[must_use]
    pub fn new(id: impl Into<String>, max_level: u32, chance: ChanceFormula, trigger: TriggerKind) -> Self {
        Self {
            id: EnchantId::new(id),
            effect: None,
            max_level,
            rarity: Rarity::Common,
            chance,
            triggers: BTreeSet::from([trigger]),
            cooldown_ms: 0,
            cost: CostFormula::default(),
            success: SuccessGate::default(),
            filters: BlockFilter::default(),
            abuse: AbusePolicy::default(),
            permission: None,
            conflicts: BTreeSet::new(),
            params: Params::new(),
        }
    }

    /// Key of the effect module that executes this enchant.
    #[inline]
    #[must_use]
    pub fn effect_key(&self) -> &str {
        self.effect.as_deref().unwrap_or_else(|| self.id.as_str())
    }

    /// Returns true if the enchant reacts to `kind`.
    #[inline]
    #[must_use]
    pub fn responds_to(&self, kind: TriggerKind) -> bool {
        self.triggers.contains(&kind)
    }

    /// Permission node guarding the enchant.
    #[must_use]
    pub fn permission_node(&self, prefix: &str) -> String {
        self.permission
            .clone()
            .unwrap_or_else(|| format!("{prefix}{}", self.id))
    }

    /// Returns true if this definition declares a conflict with `other`.
    #[inline]
    #[must_use]
    pub fn conflicts_with(&self, other: &str) -> bool {
        self.conflicts.contains(other)
    }

    /// Checks every formula and set for consistency.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> DefinitionResult<()> {
        if self.max_level == 0 {
            return Err(DefinitionError::ZeroMaxLevel(self.id.clone()));
        }
        if self.triggers.is_empty() {
            return Err(DefinitionError::NoTriggers(self.id.clone()));
        }

        self.check_finite("chance.base", self.chance.base)?;
        self.check_finite("chance.per_level", self.chance.per_level)?;
        self.check_range("chance.cap", self.chance.cap, 0.0, 1.0)?;

        self.check_range("cost.base", self.cost.base, 0.0, f64::MAX)?;
        self.check_finite("cost.per_level", self.cost.per_level)?;
        if !(self.cost.factor.is_finite() && self.cost.factor > 0.0) {
            return Err(self.invalid("cost.factor", self.cost.factor));
        }

        self.check_finite("success.base", self.success.base)?;
        self.check_finite("success.per_level_delta", self.success.per_level_delta)?;

        if let Some(block) = self.filters.whitelist.intersection(&self.filters.blacklist).next() {
            return Err(DefinitionError::FilterOverlap {
                id: self.id.clone(),
                block: *block,
            });
        }
        if self.conflicts.contains(&self.id) {
            return Err(DefinitionError::SelfConflict(self.id.clone()));
        }
        Ok(())
    }

    fn check_finite(&self, field: &'static str, value: f64) -> DefinitionResult<()> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(self.invalid(field, value))
        }
    }

    fn check_range(&self, field: &'static str, value: f64, min: f64, max: f64) -> DefinitionResult<()> {
        if value.is_finite() && value >= min && value <= max {
            Ok(())
        } else {
            Err(self.invalid(field, value))
        }
    }

    fn invalid(&self, field: &'static str, value: f64) -> DefinitionError {
        DefinitionError::InvalidFormula {
            id: self.id.clone(),
            field,
            value,
        }
    }
}
