//! # Engine Error Types
//!
//! Load-time errors for definitions and configuration, plus the typed reasons
//! an upgrade can be rejected. Gate failures on the trigger path are NOT
//! errors and never appear here.

use quarry_shared::Amount;
use thiserror::Error;

use crate::definition::EnchantId;

/// Errors raised while loading or validating an enchant definition.
///
/// A definition that fails any check is rejected as a whole; the engine
/// never sees it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DefinitionError {
    /// The definition file is not valid TOML.
    #[error("definition file is not valid TOML: {0}")]
    Parse(String),

    /// A table could not be mapped onto a definition (unknown trigger,
    /// unknown fail mode, missing field, wrong type, ...).
    #[error("definition {id} is malformed: {reason}")]
    Malformed {
        /// The id, or `<unknown>` if the table had none.
        id: String,
        /// Deserializer message.
        reason: String,
    },

    /// A formula value is out of range or not a number.
    #[error("definition {id}: invalid formula value {field} = {value}")]
    InvalidFormula {
        /// The offending definition.
        id: EnchantId,
        /// Dotted field path (e.g. `chance.cap`).
        field: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// `max_level` must be at least one.
    #[error("definition {0}: max_level must be at least 1")]
    ZeroMaxLevel(EnchantId),

    /// No triggers were declared, so the enchant could never fire.
    #[error("definition {0}: at least one trigger is required")]
    NoTriggers(EnchantId),

    /// The same block kind appears in both the whitelist and the blacklist.
    #[error("definition {id}: block {block} is both whitelisted and blacklisted")]
    FilterOverlap {
        /// The offending definition.
        id: EnchantId,
        /// The block kind in both sets.
        block: u32,
    },

    /// An enchant lists itself as a conflict.
    #[error("definition {0} conflicts with itself")]
    SelfConflict(EnchantId),

    /// Two definitions share one id.
    #[error("duplicate definition id: {0}")]
    DuplicateId(EnchantId),
}

/// Result type for definition loading.
pub type DefinitionResult<T> = Result<T, DefinitionError>;

/// Errors raised while loading the engine configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration is not valid TOML or has wrongly typed fields.
    #[error("invalid configuration: {0}")]
    Parse(String),

    /// A value is out of its allowed range.
    #[error("invalid configuration value {field}: {reason}")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Why an upgrade attempt was rejected before any roll took place.
///
/// A rejection never mutates the ledger or the tool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// No definition is registered under this id.
    #[error("unknown enchant: {0}")]
    UnknownEnchant(EnchantId),

    /// Asked to add zero levels.
    #[error("must add at least one level")]
    NothingToAdd,

    /// The target level would exceed the definition's maximum.
    #[error("{enchant} cannot go past level {max_level} (requested {requested})")]
    ExceedsMaxLevel {
        /// The enchant being upgraded.
        enchant: EnchantId,
        /// Requested target level.
        requested: u32,
        /// Definition maximum.
        max_level: u32,
    },

    /// A conflicting enchant is already present on the tool.
    #[error("{enchant} conflicts with {existing}, which is already on this tool")]
    Conflict {
        /// The enchant being upgraded.
        enchant: EnchantId,
        /// The conflicting enchant already on the tool.
        existing: EnchantId,
    },

    /// The player cannot afford the upgrade.
    #[error("insufficient {currency}: need {required}, have {available}")]
    InsufficientFunds {
        /// Currency the upgrade is priced in.
        currency: String,
        /// Total cost.
        required: Amount,
        /// Current balance.
        available: Amount,
    },

    /// The ledger refused the withdrawal even though the balance looked
    /// sufficient (concurrent spend elsewhere).
    #[error("ledger refused to withdraw {amount} {currency}")]
    WithdrawFailed {
        /// Currency the upgrade is priced in.
        currency: String,
        /// Amount that could not be withdrawn.
        amount: Amount,
    },
}
