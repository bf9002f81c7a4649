//! # Upgrade Transactions
//!
//! Prices and performs enchant level-ups.
//!
//! ## Transaction
//!
//! 1. Validate: known enchant, at least one level, within `max_level`,
//!    no conflicting enchant on the tool
//! 2. Price: sum of the per-level cost for every added level
//! 3. Check the balance, then withdraw the full cost
//! 4. Roll the success gate once
//! 5. Write the new level (or the fail-mode level) back to the tool
//!
//! The cost is NOT refunded when the roll fails.
//!
//! Attempts on the same tool are serialized by a per-tool lock so concurrent
//! attempts can never double-withdraw. The lock entry is dropped once no
//! attempt holds it.
//!
//! Stores may re-issue a tool on write. The outcome carries the handle the
//! store returned, and callers must use it from then on.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use quarry_shared::{Amount, PlayerId, ToolHandle};
use rand::Rng;

use crate::collaborators::{CurrencyLedger, ToolDataStore};
use crate::definition::{EnchantDefinition, EnchantId, FailMode};
use crate::error::RejectReason;
use crate::registry::DefinitionRegistry;

/// One upgrade request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// Paying player.
    pub player: PlayerId,
    /// Tool being upgraded.
    pub tool: ToolHandle,
    /// Enchant to level up.
    pub enchant: EnchantId,
    /// Levels to add.
    pub levels: u32,
}

impl UpgradeRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(player: PlayerId, tool: ToolHandle, enchant: impl Into<String>, levels: u32) -> Self {
        Self {
            player,
            tool,
            enchant: EnchantId::new(enchant),
            levels,
        }
    }
}

/// Result of an upgrade attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// The roll passed.
    Success {
        /// Level the tool now holds.
        level: u32,
        /// Handle of the written tool.
        tool: ToolHandle,
    },
    /// The roll failed.
    Failure {
        /// Fail mode that was applied.
        mode: FailMode,
        /// Level the fail mode left on the tool.
        level: u32,
        /// Handle of the tool; the request's handle when nothing was written.
        tool: ToolHandle,
    },
    /// Nothing happened.
    Rejected(RejectReason),
}

impl UpgradeOutcome {
    /// Level on the tool after the attempt, if it went through.
    #[must_use]
    pub const fn new_level(&self) -> Option<u32> {
        match self {
            Self::Success { level, .. } | Self::Failure { level, .. } => Some(*level),
            Self::Rejected(_) => None,
        }
    }

    /// Handle to use for the tool after the attempt, if it went through.
    #[must_use]
    pub const fn tool(&self) -> Option<ToolHandle> {
        match self {
            Self::Success { tool, .. } | Self::Failure { tool, .. } => Some(*tool),
            Self::Rejected(_) => None,
        }
    }
}

/// Price preview for a menu.
#[derive(Clone, Debug, PartialEq)]
pub struct UpgradeQuote {
    /// Current level.
    pub from: u32,
    /// Target level.
    pub to: u32,
    /// Ledger currency.
    pub currency: String,
    /// Total cost.
    pub cost: Amount,
    /// Chance the roll succeeds.
    pub success_chance: f64,
}

/// Serialized upgrade executor.
#[derive(Debug)]
pub struct UpgradeTransaction {
    registry: RwLock<Arc<DefinitionRegistry>>,
    locks: Mutex<HashMap<ToolHandle, Arc<Mutex<()>>>>,
}

impl UpgradeTransaction {
    /// Creates an executor over a set of definitions.
    #[must_use]
    pub fn new(registry: Arc<DefinitionRegistry>) -> Self {
        Self {
            registry: RwLock::new(registry),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Swaps in reloaded definitions.
    pub fn set_registry(&self, registry: Arc<DefinitionRegistry>) {
        *self.registry.write() = registry;
    }

    /// Prices an upgrade without touching anything.
    #[must_use]
    pub fn quote(definition: &EnchantDefinition, current_level: u32, levels: u32) -> UpgradeQuote {
        let to = current_level.saturating_add(levels);
        UpgradeQuote {
            from: current_level,
            to,
            currency: definition.cost.currency.clone(),
            cost: definition.cost.total_cost(current_level, levels),
            success_chance: definition.success.chance_for(to),
        }
    }

    fn tool_lock(&self, tool: ToolHandle) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.lock().entry(tool).or_default())
    }

    /// Attempts an upgrade.
    ///
    /// Rejections leave the ledger and the tool untouched. Once funds are
    /// withdrawn the attempt always ends in `Success` or `Failure`.
    pub fn attempt_upgrade<R: Rng + ?Sized>(
        &self,
        request: &UpgradeRequest,
        ledger: &mut dyn CurrencyLedger,
        tools: &mut dyn ToolDataStore,
        rng: &mut R,
    ) -> UpgradeOutcome {
        let lock = self.tool_lock(request.tool);
        let result = {
            let _guard = lock.lock();
            let registry = Arc::clone(&self.registry.read());
            Self::run(&registry, request, ledger, tools, rng)
        };
        self.release_lock(request.tool, &lock);

        match result {
            Ok(outcome) => outcome,
            Err(reason) => {
                tracing::debug!(
                    "Upgrade of {} on {} rejected: {}",
                    request.enchant,
                    request.tool,
                    reason
                );
                UpgradeOutcome::Rejected(reason)
            }
        }
    }

    /// Drops the table entry when only the table and `lock` still hold it.
    fn release_lock(&self, tool: ToolHandle, lock: &Arc<Mutex<()>>) {
        let mut locks = self.locks.lock();
        if Arc::strong_count(lock) == 2 && locks.get(&tool).is_some_and(|held| Arc::ptr_eq(held, lock)) {
            locks.remove(&tool);
        }
    }

    fn run<R: Rng + ?Sized>(
        registry: &DefinitionRegistry,
        request: &UpgradeRequest,
        ledger: &mut dyn CurrencyLedger,
        tools: &mut dyn ToolDataStore,
        rng: &mut R,
    ) -> Result<UpgradeOutcome, RejectReason> {
        // Step 1: Validate
        let definition = registry
            .get(request.enchant.as_str())
            .ok_or_else(|| RejectReason::UnknownEnchant(request.enchant.clone()))?;
        if request.levels == 0 {
            return Err(RejectReason::NothingToAdd);
        }

        let levels = tools.levels(request.tool);
        let current = levels.get(request.enchant.as_str()).copied().unwrap_or(0);
        let target = current.saturating_add(request.levels);
        if target > definition.max_level {
            return Err(RejectReason::ExceedsMaxLevel {
                enchant: definition.id.clone(),
                requested: target,
                max_level: definition.max_level,
            });
        }
        if current == 0 {
            if let Some(existing) = find_conflict(registry, definition, &levels) {
                return Err(RejectReason::Conflict {
                    enchant: definition.id.clone(),
                    existing,
                });
            }
        }

        // Step 2: Price
        let currency = definition.cost.currency.as_str();
        let cost = definition.cost.total_cost(current, request.levels);

        // Step 3: Funds
        let available = ledger.balance(request.player, currency);
        if available < cost {
            return Err(RejectReason::InsufficientFunds {
                currency: currency.to_string(),
                required: cost,
                available,
            });
        }
        if cost > 0 && !ledger.withdraw(request.player, currency, cost) {
            tracing::warn!(
                "Ledger refused {} {} from player {} after balance check",
                cost,
                currency,
                request.player
            );
            return Err(RejectReason::WithdrawFailed {
                currency: currency.to_string(),
                amount: cost,
            });
        }

        // Step 4: Roll
        let succeeded = !definition.success.enabled || rng.gen::<f64>() < definition.success.chance_for(target);

        // Step 5: Write back
        let outcome = if succeeded {
            let tool = tools.set_level(request.tool, &definition.id, target);
            UpgradeOutcome::Success { level: target, tool }
        } else {
            let mode = definition.success.fail_mode;
            let level = mode.apply(current);
            let tool = if level == current {
                request.tool
            } else {
                tools.set_level(request.tool, &definition.id, level)
            };
            UpgradeOutcome::Failure { mode, level, tool }
        };

        tracing::debug!(
            "Player {} upgraded {} on {} for {} {}: {:?}",
            request.player,
            definition.id,
            request.tool,
            cost,
            currency,
            outcome
        );
        Ok(outcome)
    }
}

/// First enchant on the tool that conflicts with `definition` (declared on
/// either side).
fn find_conflict(
    registry: &DefinitionRegistry,
    definition: &EnchantDefinition,
    levels: &HashMap<EnchantId, u32>,
) -> Option<EnchantId> {
    let mut present: Vec<&EnchantId> = levels
        .iter()
        .filter(|(id, level)| **level > 0 && **id != definition.id)
        .map(|(id, _)| id)
        .collect();
    present.sort();

    present
        .into_iter()
        .find(|id| {
            definition.conflicts_with(id.as_str())
                || registry
                    .get(id.as_str())
                    .is_some_and(|other| other.conflicts_with(definition.id.as_str()))
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MockLedger, MockToolStore};
    use crate::definition::{ChanceFormula, CostFormula, SuccessGate, TriggerKind};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const TOOL: ToolHandle = ToolHandle(3);

    fn definition(id: &str) -> EnchantDefinition {
        let mut def = EnchantDefinition::new(
            id,
            10,
            ChanceFormula {
                base: 0.1,
                per_level: 0.0,
                cap: 1.0,
            },
            TriggerKind::BlockBreak,
        );
        def.cost = CostFormula {
            currency: "tokens".to_string(),
            base: 100.0,
            per_level: 50.0,
            factor: 1.0,
        };
        def
    }

    fn setup(defs: Vec<EnchantDefinition>) -> (UpgradeTransaction, MockLedger, ChaCha8Rng) {
        let mut registry = DefinitionRegistry::new();
        for def in defs {
            registry.register(def).unwrap();
        }
        let mut ledger = MockLedger::new();
        ledger.set_balance(1, "tokens", 10_000);
        (
            UpgradeTransaction::new(Arc::new(registry)),
            ledger,
            ChaCha8Rng::seed_from_u64(1),
        )
    }

    #[test]
    fn test_quote() {
        let quote = UpgradeTransaction::quote(&definition("a"), 2, 3);
        assert_eq!((quote.from, quote.to, quote.cost), (2, 5, 750));
        assert_eq!(quote.success_chance, 1.0);
    }

    #[test]
    fn test_success_without_gate() {
        let (txn, mut ledger, mut rng) = setup(vec![definition("a")]);
        let mut tools = MockToolStore::new().with_level(TOOL, "a", 2);

        let outcome = txn.attempt_upgrade(&UpgradeRequest::new(1, TOOL, "a", 3), &mut ledger, &mut tools, &mut rng);
        assert_eq!(outcome, UpgradeOutcome::Success { level: 5, tool: TOOL });
        assert_eq!(tools.level(TOOL, "a"), 5);
        assert_eq!(ledger.balance(1, "tokens"), 10_000 - 750);
    }

    #[test]
    fn test_tool_locks_are_released() {
        let (txn, mut ledger, mut rng) = setup(vec![definition("a")]);
        let mut tools = MockToolStore::new();

        for tool in (0..64).map(ToolHandle) {
            let outcome = txn.attempt_upgrade(&UpgradeRequest::new(1, tool, "a", 1), &mut ledger, &mut tools, &mut rng);
            assert_eq!(outcome.new_level(), Some(1));
        }
        assert!(txn.locks.lock().is_empty());

        let held = txn.tool_lock(TOOL);
        let outcome = txn.attempt_upgrade(&UpgradeRequest::new(1, TOOL, "a", 1), &mut ledger, &mut tools, &mut rng);
        assert_eq!(outcome.new_level(), Some(2));
        assert!(txn.locks.lock().contains_key(&TOOL));
        drop(held);
    }

    #[test]
    fn test_rejections_do_not_charge() {
        let (txn, mut ledger, mut rng) = setup(vec![definition("a")]);
        let mut tools = MockToolStore::new().with_level(TOOL, "a", 9);

        let cases = [
            (UpgradeRequest::new(1, TOOL, "nope", 1), "unknown"),
            (UpgradeRequest::new(1, TOOL, "a", 0), "zero"),
            (UpgradeRequest::new(1, TOOL, "a", 2), "max"),
            (UpgradeRequest::new(2, TOOL, "a", 1), "funds"),
        ];
        for (request, label) in cases {
            let outcome = txn.attempt_upgrade(&request, &mut ledger, &mut tools, &mut rng);
            assert!(matches!(outcome, UpgradeOutcome::Rejected(_)), "{label}: {outcome:?}");
        }
        assert!(ledger.withdrawals.is_empty());
        assert_eq!(tools.level(TOOL, "a"), 9);
    }

    #[test]
    fn test_conflict_either_direction() {
        let mut a = definition("a");
        a.conflicts.insert(EnchantId::from("b"));
        let (txn, mut ledger, mut rng) = setup(vec![a, definition("b"), definition("c")]);

        let mut tools = MockToolStore::new().with_level(TOOL, "a", 1);
        let outcome = txn.attempt_upgrade(&UpgradeRequest::new(1, TOOL, "b", 1), &mut ledger, &mut tools, &mut rng);
        assert_eq!(
            outcome,
            UpgradeOutcome::Rejected(RejectReason::Conflict {
                enchant: EnchantId::from("b"),
                existing: EnchantId::from("a"),
            })
        );

        let outcome = txn.attempt_upgrade(&UpgradeRequest::new(1, TOOL, "c", 1), &mut ledger, &mut tools, &mut rng);
        assert_eq!(outcome, UpgradeOutcome::Success { level: 1, tool: TOOL });
    }

    #[test]
    fn test_withdraw_refused() {
        let (txn, mut ledger, mut rng) = setup(vec![definition("a")]);
        ledger.refuse_withdrawals = true;
        let mut tools = MockToolStore::new();

        let outcome = txn.attempt_upgrade(&UpgradeRequest::new(1, TOOL, "a", 1), &mut ledger, &mut tools, &mut rng);
        assert_eq!(
            outcome,
            UpgradeOutcome::Rejected(RejectReason::WithdrawFailed {
                currency: "tokens".to_string(),
                amount: 100,
            })
        );
        assert!(!tools.has(TOOL, "a"));
    }

    #[test]
    fn test_failure_charges_and_applies_mode() {
        let mut gated = definition("a");
        gated.success = SuccessGate {
            enabled: true,
            base: 0.0,
            per_level_delta: 0.0,
            fail_mode: FailMode::None,
        };
        let (txn, mut ledger, mut rng) = setup(vec![gated]);
        let mut tools = MockToolStore::new().with_level(TOOL, "a", 4);

        let outcome = txn.attempt_upgrade(&UpgradeRequest::new(1, TOOL, "a", 1), &mut ledger, &mut tools, &mut rng);
        assert_eq!(
            outcome,
            UpgradeOutcome::Failure {
                mode: FailMode::None,
                level: 4,
                tool: TOOL,
            }
        );
        assert_eq!(outcome.new_level(), Some(4));
        assert_eq!(ledger.balance(1, "tokens"), 10_000 - 300);
    }
}
