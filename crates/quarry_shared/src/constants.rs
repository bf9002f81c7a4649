//! # Engine Constants
//!
//! The handful of block kinds the engine itself reasons about. Every other
//! block kind is opaque data owned by the host.

/// Well-known block kinds.
///
/// The engine recognizes empty space, indestructible blocks and the ore/stone
/// split used by drop multipliers. Hosts and tests share this numbering.
pub mod blocks {
    use crate::types::BlockKind;

    /// Empty space. Never broken, never counted.
    pub const AIR: BlockKind = 0;
    /// Plain stone.
    pub const STONE: BlockKind = 1;
    /// Cobblestone.
    pub const COBBLESTONE: BlockKind = 2;
    /// Coal ore.
    pub const COAL_ORE: BlockKind = 3;
    /// Iron ore.
    pub const IRON_ORE: BlockKind = 4;
    /// Gold ore.
    pub const GOLD_ORE: BlockKind = 5;
    /// Diamond ore.
    pub const DIAMOND_ORE: BlockKind = 6;
    /// Indestructible floor of a mine.
    pub const BEDROCK: BlockKind = 7;
    /// Mine wall marker.
    pub const BARRIER: BlockKind = 8;

    /// Returns true for the ore kinds drop multipliers treat as ore.
    #[inline]
    #[must_use]
    pub const fn is_ore(kind: BlockKind) -> bool {
        matches!(kind, COAL_ORE | IRON_ORE | GOLD_ORE | DIAMOND_ORE)
    }

    /// Returns true for stone-like filler.
    #[inline]
    #[must_use]
    pub const fn is_stone(kind: BlockKind) -> bool {
        matches!(kind, STONE | COBBLESTONE)
    }

    /// Returns true if no effect may ever break this kind.
    #[inline]
    #[must_use]
    pub const fn is_indestructible(kind: BlockKind) -> bool {
        matches!(kind, AIR | BEDROCK | BARRIER)
    }
}
