//! Engine-wide configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Seed used when the config does not name one. Runs stay reproducible.
pub const DEFAULT_SEED: u64 = 0x5155_4152_5259;

/// Largest accepted `max_area_radius`. A full scan is `(2r + 1)^3` lookups.
pub const AREA_RADIUS_LIMIT: u32 = 32;

/// Largest accepted `max_line_range` and `max_column_height`.
pub const WALK_LIMIT: u32 = 256;

/// Engine-wide limits and switches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// RNG seed. `None` uses [`DEFAULT_SEED`].
    pub seed: Option<u64>,
    /// Hard cap on blocks broken by one block-clearing invocation.
    pub global_max_blocks_per_proc: u32,
    /// Largest cube radius an area effect may scan.
    pub max_area_radius: u32,
    /// Longest line a beam effect may walk.
    pub max_line_range: u32,
    /// Tallest column a drill effect may walk.
    pub max_column_height: u32,
    /// Length of the activation throttle window.
    pub throttle_window_ms: u64,
    /// How often the decay task runs.
    pub decay_interval_ms: u64,
    /// Prefix for per-enchant permission nodes.
    pub permission_prefix: String,
    /// Park long-lived effect state on disconnect and restore it on rejoin.
    pub retain_effect_state_on_disconnect: bool,
    /// Capacity of the off-thread trigger inbox.
    pub inbox_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: None,
            global_max_blocks_per_proc: 64,
            max_area_radius: 8,
            max_line_range: 64,
            max_column_height: 64,
            throttle_window_ms: 1_000,
            decay_interval_ms: 1_000,
            permission_prefix: "quarry.enchant.".to_string(),
            retain_effect_state_on_disconnect: false,
            inbox_capacity: 1_024,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or wrong field types,
    /// and [`ConfigError::OutOfRange`] on invalid values.
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns the first out-of-range field.
    pub fn validate(&self) -> ConfigResult<()> {
        const POSITIVE: &str = "must be greater than zero";
        const TOO_WIDE: &str = "exceeds the clearing scan limit";

        let checks: [(&'static str, bool, &'static str); 9] = [
            ("global_max_blocks_per_proc", self.global_max_blocks_per_proc > 0, POSITIVE),
            ("throttle_window_ms", self.throttle_window_ms > 0, POSITIVE),
            ("decay_interval_ms", self.decay_interval_ms > 0, POSITIVE),
            ("inbox_capacity", self.inbox_capacity > 0, POSITIVE),
            ("max_line_range", self.max_line_range > 0, POSITIVE),
            ("max_column_height", self.max_column_height > 0, POSITIVE),
            ("max_area_radius", self.max_area_radius <= AREA_RADIUS_LIMIT, TOO_WIDE),
            ("max_line_range", self.max_line_range <= WALK_LIMIT, TOO_WIDE),
            ("max_column_height", self.max_column_height <= WALK_LIMIT, TOO_WIDE),
        ];
        match checks.iter().find(|(_, ok, _)| !ok) {
            Some(&(field, _, reason)) => Err(ConfigError::OutOfRange { field, reason }),
            None => Ok(()),
        }
    }

    /// Area radius limit, never above [`AREA_RADIUS_LIMIT`] even if unvalidated.
    #[inline]
    #[must_use]
    pub fn area_radius(&self) -> u32 {
        self.max_area_radius.min(AREA_RADIUS_LIMIT)
    }

    /// Line range limit, never above [`WALK_LIMIT`].
    #[inline]
    #[must_use]
    pub fn line_range(&self) -> u32 {
        self.max_line_range.min(WALK_LIMIT)
    }

    /// Column height limit, never above [`WALK_LIMIT`].
    #[inline]
    #[must_use]
    pub fn column_height(&self) -> u32 {
        self.max_column_height.min(WALK_LIMIT)
    }

    /// The effective RNG seed.
    #[inline]
    #[must_use]
    pub fn effective_seed(&self) -> u64 {
        self.seed.unwrap_or(DEFAULT_SEED)
    }

    /// Caps a requested block budget at the global limit.
    #[inline]
    #[must_use]
    pub fn block_budget(&self, requested: u32) -> u32 {
        requested.min(self.global_max_blocks_per_proc)
    }
}
