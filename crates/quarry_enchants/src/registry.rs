//! # Definition Registry
//!
//! Owns every validated [`EnchantDefinition`], in registration order.
//!
//! Iteration order is the order definitions were registered (file order when
//! loaded from TOML). The proc engine evaluates candidates in this order, which
//! is what makes a seeded run reproducible.
//!
//! Loading is per-definition: a malformed `[[enchant]]` table is rejected and
//! logged while its siblings load normally. Reload builds a fresh registry and
//! the engine swaps it in wholesale.

use std::collections::HashMap;
use std::sync::Arc;

use crate::definition::{EnchantDefinition, EnchantId};
use crate::error::{DefinitionError, DefinitionResult};

/// Summary of one load pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadReport {
    /// Ids that loaded, in file order.
    pub loaded: Vec<EnchantId>,
    /// Tables that were rejected, with the reason.
    pub rejected: Vec<DefinitionError>,
}

/// Registry of enchant definitions.
#[derive(Clone, Debug, Default)]
pub struct DefinitionRegistry {
    /// Definitions in registration order.
    ordered: Vec<Arc<EnchantDefinition>>,
    /// Index into `ordered` by id.
    index: HashMap<EnchantId, usize>,
}

impl DefinitionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a definition file.
    ///
    /// The file is an array of `[[enchant]]` tables. Each table is validated
    /// on its own; rejects are logged and listed in the report.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::Parse`] only if the file itself is not TOML.
    pub fn load_toml_str(source: &str) -> DefinitionResult<(Self, LoadReport)> {
        let document: toml::Table = source
            .parse()
            .map_err(|e: toml::de::Error| DefinitionError::Parse(e.to_string()))?;

        let mut registry = Self::new();
        let mut report = LoadReport::default();

        let tables: &[toml::Value] = match document.get("enchant") {
            Some(toml::Value::Array(tables)) => tables.as_slice(),
            Some(_) => {
                return Err(DefinitionError::Parse(
                    "`enchant` must be an array of tables".to_string(),
                ))
            }
            None => &[],
        };

        for table in tables {
            let outcome = table
                .clone()
                .try_into::<EnchantDefinition>()
                .map_err(|e| DefinitionError::Malformed {
                    id: table
                        .get("id")
                        .and_then(toml::Value::as_str)
                        .unwrap_or("<unknown>")
                        .to_string(),
                    reason: e.to_string(),
                })
                .and_then(|definition| {
                    let id = definition.id.clone();
                    registry.register(definition).map(|()| id)
                });

            match outcome {
                Ok(id) => report.loaded.push(id),
                Err(error) => {
                    tracing::warn!("Rejected enchant definition: {}", error);
                    report.rejected.push(error);
                }
            }
        }

        tracing::info!(
            "Loaded {} enchant definitions ({} rejected)",
            report.loaded.len(),
            report.rejected.len()
        );

        Ok((registry, report))
    }

    /// Validates and adds a definition.
    ///
    /// # Errors
    ///
    /// Returns the validation error, or [`DefinitionError::DuplicateId`].
    pub fn register(&mut self, definition: EnchantDefinition) -> DefinitionResult<()> {
        definition.validate()?;
        if self.index.contains_key(&definition.id) {
            return Err(DefinitionError::DuplicateId(definition.id));
        }
        self.index.insert(definition.id.clone(), self.ordered.len());
        self.ordered.push(Arc::new(definition));
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn with(mut self, definition: EnchantDefinition) -> DefinitionResult<Self> {
        self.register(definition)?;
        Ok(self)
    }

    /// Looks up a definition by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<EnchantDefinition>> {
        self.index.get(id).and_then(|&i| self.ordered.get(i))
    }

    /// Registration position of an id (evaluation order).
    #[must_use]
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// All definitions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<EnchantDefinition>> {
        self.ordered.iter()
    }

    /// Definitions sorted for display: rarest first, ties in registration order.
    #[must_use]
    pub fn by_rarity(&self) -> Vec<&Arc<EnchantDefinition>> {
        let mut sorted: Vec<_> = self.ordered.iter().collect();
        sorted.sort_by(|a, b| b.rarity.cmp(&a.rarity));
        sorted
    }

    /// Number of definitions.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Returns true if no definitions are registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{FailMode, Rarity, TriggerKind};

    const SAMPLE: &str = r#"
        [[enchant]]
        id = "explosive"
        max_level = 50
        rarity = "rare"
        triggers = ["block_break"]
        chance = { base = 0.01, per_level = 0.002, cap = 0.25 }
        cost = { base = 100.0, per_level = 50.0 }
        success = { enabled = true, base = 1.0, per_level_delta = -0.01, fail_mode = "downgrade" }
        filters = { blacklist = [7, 8] }
        params = { radius = 1, max_blocks = 48 }

        [[enchant]]
        id = "broken"
        max_level = 5
        triggers = ["block_break"]
        chance = { base = 0.1 }
        success = { enabled = true, fail_mode = "explode" }

        [[enchant]]
        id = "token_finder"
        max_level = 100
        rarity = "common"
        triggers = ["block_break", "idle_tick"]
        chance = { base = 0.05, per_level = 0.001 }
        conflicts = ["explosive"]
    "#;

    #[test]
    fn test_load_keeps_order_and_rejects_malformed() {
        let (registry, report) = DefinitionRegistry::load_toml_str(SAMPLE).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(
            report.loaded,
            vec![EnchantId::from("explosive"), EnchantId::from("token_finder")]
        );
        assert_eq!(report.rejected.len(), 1);
        assert!(matches!(
            &report.rejected[0],
            DefinitionError::Malformed { id, .. } if id == "broken"
        ));

        let explosive = registry.get("explosive").unwrap();
        assert_eq!(explosive.rarity, Rarity::Rare);
        assert_eq!(explosive.success.fail_mode, FailMode::Downgrade);
        assert!(explosive.responds_to(TriggerKind::BlockBreak));
        assert!(!explosive.responds_to(TriggerKind::Interact));
        assert_eq!(explosive.params.u32_or("radius", 0), 1);

        assert_eq!(registry.position("token_finder"), Some(1));
        assert!(registry.get("token_finder").unwrap().conflicts_with("explosive"));
    }

    #[test]
    fn test_invalid_formula_rejected_at_load() {
        let source = r#"
            [[enchant]]
            id = "greedy"
            max_level = 5
            triggers = ["block_break"]
            chance = { base = 0.1, cap = 2.0 }
        "#;
        let (registry, report) = DefinitionRegistry::load_toml_str(source).unwrap();
        assert!(registry.is_empty());
        assert!(matches!(
            report.rejected[0],
            DefinitionError::InvalidFormula { field: "chance.cap", .. }
        ));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let source = r#"
            [[enchant]]
            id = "twin"
            max_level = 5
            triggers = ["interact"]
            chance = { base = 0.1 }

            [[enchant]]
            id = "twin"
            max_level = 9
            triggers = ["interact"]
            chance = { base = 0.2 }
        "#;
        let (registry, report) = DefinitionRegistry::load_toml_str(source).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("twin").unwrap().max_level, 5);
        assert_eq!(report.rejected, vec![DefinitionError::DuplicateId(EnchantId::from("twin"))]);
    }

    #[test]
    fn test_not_toml_is_an_error() {
        assert!(matches!(
            DefinitionRegistry::load_toml_str("[[enchant"),
            Err(DefinitionError::Parse(_))
        ));
    }

    #[test]
    fn test_by_rarity() {
        let (registry, _) = DefinitionRegistry::load_toml_str(SAMPLE).unwrap();
        let sorted: Vec<_> = registry.by_rarity().iter().map(|d| d.id.to_string()).collect();
        assert_eq!(sorted, vec!["explosive", "token_finder"]);
    }
}
