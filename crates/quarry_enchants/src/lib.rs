//! # QUARRY Enchants
//!
//! Trigger-driven enchant proc engine for mining tools.
//!
//! ## Design Principles
//!
//! 1. **Data-defined** - Every chance, cost and tunable comes from TOML
//! 2. **Deterministic** - All randomness flows through one seeded `ChaCha8Rng`
//! 3. **Bounded** - Block clearing never exceeds the engine-wide cap
//! 4. **Host-agnostic** - World, inventory, ledger and tool data are traits
//!
//! ## Thread Safety
//!
//! Evaluation and every effect run on the host's simulation thread. Other
//! threads read cooldowns through a [`StateReader`] and submit triggers
//! through a [`TriggerSender`]; neither ever mutates the world.
//!
//! ## Example
//!
//! ```rust,ignore
//! use quarry_enchants::{DefinitionRegistry, EngineConfig, ProcEngine, TriggerEvent};
//!
//! let (registry, report) = DefinitionRegistry::load_toml_str(&definitions)?;
//! let mut engine = ProcEngine::new(EngineConfig::from_toml_str(&config)?, registry);
//!
//! let event = TriggerEvent::block_break(player, tool, block, now);
//! for activation in engine.evaluate(&event, &mut host.services()) {
//!     println!("{} broke {} blocks", activation.enchant, activation.blocks_broken);
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]

pub mod clear;
pub mod collaborators;
pub mod config;
pub mod definition;
pub mod effects;
pub mod engine;
pub mod error;
pub mod event;
pub mod inbox;
pub mod registry;
pub mod scheduler;
pub mod selector;
pub mod state;
pub mod upgrade;

pub use clear::{break_area, break_column, break_line, ClearOutcome, ClearSpec, DropMode};
pub use collaborators::{
    Cosmetic, CurrencyLedger, GameMode, InventorySink, PermissionCheck, RegionCheck, Services, StatusEffect,
    StatusKind, ToolDataStore, WorldAccess,
};
pub use collaborators::{MockHost, MockInventory, MockLedger, MockPermissions, MockRegions, MockToolStore, MockWorld};
pub use config::EngineConfig;
pub use definition::{
    AbusePolicy, BlockFilter, ChanceFormula, CostFormula, EnchantDefinition, EnchantId, FailMode, Params,
    ProcContext, Rarity, SuccessGate, TriggerKind,
};
pub use effects::{EffectContext, EffectModule, EffectRegistry, Shape};
pub use engine::{ProcEngine, TickReport};
pub use error::{ConfigError, ConfigResult, DefinitionError, DefinitionResult, RejectReason};
pub use event::{ActivationResult, TriggerEvent};
pub use inbox::{TriggerInbox, TriggerSender};
pub use registry::{DefinitionRegistry, LoadReport};
pub use selector::WeightedSelector;
pub use state::{PlayerRuntimeState, StateReader};
pub use upgrade::{UpgradeOutcome, UpgradeQuote, UpgradeRequest, UpgradeTransaction};
