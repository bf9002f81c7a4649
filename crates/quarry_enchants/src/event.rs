//! Trigger events going into the engine and activation results coming out.

use quarry_shared::{BlockPos, Millis, PlayerId, ToolHandle};

use crate::collaborators::GameMode;
use crate::definition::{EnchantId, ProcContext, TriggerKind};

/// One game event that may activate enchants.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriggerEvent {
    /// Acting player.
    pub player: PlayerId,
    /// Tool in hand.
    pub tool: ToolHandle,
    /// Event class.
    pub kind: TriggerKind,
    /// Always `Primary` for host events.
    pub context: ProcContext,
    /// Affected block, for block-anchored triggers.
    pub block: Option<BlockPos>,
    /// Player position (anchor when there is no block).
    pub position: BlockPos,
    /// Player game mode.
    pub game_mode: GameMode,
    /// Whether the player is sneaking.
    pub sneaking: bool,
    /// External proc multiplier (beacons, boosters). `1.0` is neutral.
    pub beacon_multiplier: f64,
    /// Event time.
    pub now: Millis,
}

impl TriggerEvent {
    fn new(player: PlayerId, tool: ToolHandle, kind: TriggerKind, position: BlockPos, now: Millis) -> Self {
        Self {
            player,
            tool,
            kind,
            context: ProcContext::Primary,
            block: None,
            position,
            game_mode: GameMode::Survival,
            sneaking: false,
            beacon_multiplier: 1.0,
            now,
        }
    }

    /// The tool broke `block`.
    #[must_use]
    pub fn block_break(player: PlayerId, tool: ToolHandle, block: BlockPos, now: Millis) -> Self {
        Self {
            block: Some(block),
            ..Self::new(player, tool, TriggerKind::BlockBreak, block, now)
        }
    }

    /// Periodic tick while the player is mining at `position`.
    #[must_use]
    pub fn idle_tick(player: PlayerId, tool: ToolHandle, position: BlockPos, now: Millis) -> Self {
        Self::new(player, tool, TriggerKind::IdleTick, position, now)
    }

    /// The player used the tool at `position`.
    #[must_use]
    pub fn interact(player: PlayerId, tool: ToolHandle, position: BlockPos, now: Millis) -> Self {
        Self::new(player, tool, TriggerKind::Interact, position, now)
    }

    /// Sets the sneaking flag.
    #[must_use]
    pub const fn sneaking(mut self, sneaking: bool) -> Self {
        self.sneaking = sneaking;
        self
    }

    /// Sets the game mode.
    #[must_use]
    pub const fn in_mode(mut self, game_mode: GameMode) -> Self {
        self.game_mode = game_mode;
        self
    }

    /// Sets the external proc multiplier.
    #[must_use]
    pub const fn with_beacon(mut self, multiplier: f64) -> Self {
        self.beacon_multiplier = multiplier;
        self
    }

    /// Block the event is anchored on: the affected block, else the player.
    #[inline]
    #[must_use]
    pub fn anchor(&self) -> BlockPos {
        self.block.unwrap_or(self.position)
    }
}

/// One enchant that activated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivationResult {
    /// Which enchant.
    pub enchant: EnchantId,
    /// Its level on the tool.
    pub level: u32,
    /// Primary pass or the bonus re-roll.
    pub context: ProcContext,
    /// Blocks broken by the effect (feedback messaging).
    pub blocks_broken: u32,
    /// A deterministic mode change (no roll, no cooldown).
    pub control: bool,
}
