//! Identifier and value types shared across the engine boundary.

use serde::{Deserialize, Serialize};

/// Unique identifier of a connected player.
pub type PlayerId = u64;

/// Block type in the world. `0` is always air.
pub type BlockKind = u32;

/// Item type. `0` is the empty item.
pub type ItemId = u32;

/// Currency amount held by the external ledger (whole units).
pub type Amount = u64;

/// Simulation time in milliseconds.
///
/// The engine never reads a wall clock; the host passes `now` in with every
/// event so that runs are reproducible.
pub type Millis = u64;

/// Opaque handle to a tool instance owned by the host's tool-data store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ToolHandle(pub u64);

impl std::fmt::Display for ToolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tool#{}", self.0)
    }
}

/// A stack of items.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemStack {
    /// The item type ID, or 0 for nothing.
    pub item_id: ItemId,
    /// Number of items in this stack.
    pub count: u32,
}

impl ItemStack {
    /// Creates a new item stack.
    #[inline]
    #[must_use]
    pub const fn new(item_id: ItemId, count: u32) -> Self {
        Self { item_id, count }
    }

    /// Returns true if this stack carries nothing.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0 || self.item_id == 0
    }

    /// Returns the same item with its count scaled by `factor`.
    ///
    /// Rounds down but never drops a non-empty stack below one item.
    #[must_use]
    pub fn scaled(self, factor: f64) -> Self {
        if self.is_empty() || factor <= 1.0 {
            return self;
        }
        let scaled = (f64::from(self.count) * factor).floor();
        let count = if scaled >= f64::from(u32::MAX) {
            u32::MAX
        } else {
            (scaled as u32).max(1)
        };
        Self { item_id: self.item_id, count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_stack() {
        assert!(ItemStack::new(0, 5).is_empty());
        assert!(ItemStack::new(3, 0).is_empty());
        assert!(!ItemStack::new(3, 1).is_empty());
    }

    #[test]
    fn test_scaled_rounds_down() {
        assert_eq!(ItemStack::new(4, 3).scaled(1.5).count, 4);
        assert_eq!(ItemStack::new(4, 3).scaled(1.0).count, 3);
        // Factors below one never shrink a drop
        assert_eq!(ItemStack::new(4, 3).scaled(0.5).count, 3);
    }
}
