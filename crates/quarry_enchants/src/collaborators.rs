//! # Collaborator Traits
//!
//! The engine never touches the world, inventories, currency or tool data
//! directly. The host implements these traits and hands them to the engine
//! for the duration of one call.
//!
//! ```text
//! Engine defines:         Host implements:
//! ┌──────────────────┐    ┌──────────────────┐
//! │ trait WorldAccess│ ←─ │ impl WorldAccess │
//! └──────────────────┘    └──────────────────┘
//! ```
//!
//! Every call that can fail (withdraw, grant) reports the failure in its
//! return value; callers must check it.

use std::collections::{HashMap, HashSet};

use quarry_shared::{blocks, Amount, BlockKind, BlockPos, ItemStack, PlayerId, ToolHandle, Vec3};

use crate::definition::EnchantId;

/// Player game mode, as far as the anti-abuse gates care.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GameMode {
    /// Normal play.
    #[default]
    Survival,
    /// Unlimited resources; enchants may be configured to ignore it.
    Creative,
    /// Map-restricted play.
    Adventure,
    /// Observer.
    Spectator,
}

/// Purely decorative world effect. Never required for correctness.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Cosmetic {
    /// Area burst around a block.
    Explosion {
        /// Visual radius.
        radius: u32,
    },
    /// Straight beam from a block.
    Beam {
        /// Beam length in blocks.
        length: u32,
    },
    /// Vertical strike.
    Lightning,
    /// Small sparkle (rewards, buffs).
    Sparkle,
}

/// Kind of timed status applied to a player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusKind {
    /// Faster mining.
    Haste,
    /// Marker for an active poison drop buff.
    Poison,
}

/// A timed status effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusEffect {
    /// What the status does.
    pub kind: StatusKind,
    /// Strength, zero-based.
    pub amplifier: u32,
    /// How long it lasts.
    pub duration_ms: u64,
}

// ============================================================================
// Traits
// ============================================================================

/// Read/write access to the block world.
pub trait WorldAccess: Send + Sync {
    /// Block kind at a position (`blocks::AIR` for empty space).
    fn block_kind_at(&self, pos: BlockPos) -> BlockKind;

    /// Breaks a block with a tool and returns what it dropped.
    ///
    /// Breaking air returns nothing.
    fn break_block(&mut self, pos: BlockPos, tool: ToolHandle) -> Vec<ItemStack>;

    /// Drops items on the ground at a position.
    fn drop_items(&mut self, pos: BlockPos, items: &[ItemStack]);

    /// Spawns a decorative effect.
    fn spawn_cosmetic(&mut self, cosmetic: Cosmetic, pos: BlockPos);

    /// Direction the player is looking.
    fn facing_vector(&self, player: PlayerId) -> Vec3;

    /// Applies a timed status to a player.
    fn apply_status(&mut self, player: PlayerId, status: StatusEffect);
}

/// A player's item inventory.
pub trait InventorySink: Send + Sync {
    /// Adds items and returns whatever did not fit.
    ///
    /// The caller must drop the overflow into the world, never discard it.
    fn grant(&mut self, player: PlayerId, items: &[ItemStack]) -> Vec<ItemStack>;
}

/// The external currency ledger.
pub trait CurrencyLedger: Send + Sync {
    /// Current balance.
    fn balance(&self, player: PlayerId, currency: &str) -> Amount;

    /// Removes funds. Returns false (and changes nothing) if it cannot.
    fn withdraw(&mut self, player: PlayerId, currency: &str, amount: Amount) -> bool;

    /// Adds funds.
    fn deposit(&mut self, player: PlayerId, currency: &str, amount: Amount, reason: &str);
}

/// Per-tool enchant levels, owned by the host.
pub trait ToolDataStore: Send + Sync {
    /// Current enchant levels on a tool. Absent means level zero.
    fn levels(&self, tool: ToolHandle) -> HashMap<EnchantId, u32>;

    /// Writes a new level (zero removes the enchant) and returns the handle of
    /// the mutated tool.
    fn set_level(&mut self, tool: ToolHandle, enchant: &EnchantId, level: u32) -> ToolHandle;
}

/// Permission lookups.
pub trait PermissionCheck: Send + Sync {
    /// Returns true if the player holds the permission node.
    fn has(&self, player: PlayerId, permission: &str) -> bool;
}

/// Region lookups.
pub trait RegionCheck: Send + Sync {
    /// Region containing a position, if any.
    fn region_at(&self, pos: BlockPos) -> Option<String>;
}

/// Everything the engine needs from the host for one call.
pub struct Services<'a> {
    /// The block world.
    pub world: &'a mut dyn WorldAccess,
    /// Player inventories.
    pub inventory: &'a mut dyn InventorySink,
    /// Currency ledger.
    pub ledger: &'a mut dyn CurrencyLedger,
    /// Tool enchant levels (read-only on the trigger path).
    pub tools: &'a dyn ToolDataStore,
    /// Permission lookups.
    pub permissions: &'a dyn PermissionCheck,
    /// Region lookups.
    pub regions: &'a dyn RegionCheck,
}

impl Services<'_> {
    /// Grants items and drops any overflow at `pos`.
    ///
    /// Returns the number of items that overflowed.
    pub fn grant_or_drop(&mut self, player: PlayerId, pos: BlockPos, items: &[ItemStack]) -> u32 {
        if items.is_empty() {
            return 0;
        }
        let overflow = self.inventory.grant(player, items);
        if overflow.is_empty() {
            return 0;
        }
        let spilled = overflow.iter().map(|s| s.count).sum();
        tracing::warn!(
            "Inventory full for player {}: dropping {} items at {}",
            player,
            spilled,
            pos
        );
        self.world.drop_items(pos, &overflow);
        spilled
    }
}

// ============================================================================
// MOCK IMPLEMENTATIONS (For Testing)
// ============================================================================

/// In-memory block world.
///
/// Breaking a block turns it into air and drops one item whose id equals the
/// block kind.
#[derive(Debug, Default)]
pub struct MockWorld {
    blocks: HashMap<BlockPos, BlockKind>,
    facing: HashMap<PlayerId, Vec3>,
    /// Every block broken, in order.
    pub broken: Vec<BlockPos>,
    /// Every item dropped on the ground.
    pub dropped: Vec<(BlockPos, ItemStack)>,
    /// Every cosmetic spawned.
    pub cosmetics: Vec<(Cosmetic, BlockPos)>,
    /// Every status applied.
    pub statuses: Vec<(PlayerId, StatusEffect)>,
}

impl MockWorld {
    /// Creates an empty (all air) world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets one block.
    pub fn set_block(&mut self, pos: BlockPos, kind: BlockKind) {
        if kind == blocks::AIR {
            self.blocks.remove(&pos);
        } else {
            self.blocks.insert(pos, kind);
        }
    }

    /// Fills the inclusive cube between two corners.
    pub fn fill(&mut self, min: BlockPos, max: BlockPos, kind: BlockKind) {
        for x in min.x..=max.x {
            for y in min.y..=max.y {
                for z in min.z..=max.z {
                    self.set_block(BlockPos::new(x, y, z), kind);
                }
            }
        }
    }

    /// Sets where a player is looking.
    pub fn set_facing(&mut self, player: PlayerId, facing: Vec3) {
        self.facing.insert(player, facing);
    }

    /// Number of non-air blocks left.
    #[must_use]
    pub fn solid_count(&self) -> usize {
        self.blocks.len()
    }

    /// Total items dropped on the ground.
    #[must_use]
    pub fn dropped_count(&self) -> u32 {
        self.dropped.iter().map(|(_, s)| s.count).sum()
    }
}

impl WorldAccess for MockWorld {
    fn block_kind_at(&self, pos: BlockPos) -> BlockKind {
        *self.blocks.get(&pos).unwrap_or(&blocks::AIR)
    }

    fn break_block(&mut self, pos: BlockPos, _tool: ToolHandle) -> Vec<ItemStack> {
        match self.blocks.remove(&pos) {
            Some(kind) => {
                self.broken.push(pos);
                vec![ItemStack::new(kind, 1)]
            }
            None => Vec::new(),
        }
    }

    fn drop_items(&mut self, pos: BlockPos, items: &[ItemStack]) {
        self.dropped.extend(items.iter().map(|s| (pos, *s)));
    }

    fn spawn_cosmetic(&mut self, cosmetic: Cosmetic, pos: BlockPos) {
        self.cosmetics.push((cosmetic, pos));
    }

    fn facing_vector(&self, player: PlayerId) -> Vec3 {
        self.facing
            .get(&player)
            .copied()
            .unwrap_or(Vec3::new(0.0, 0.0, 1.0))
    }

    fn apply_status(&mut self, player: PlayerId, status: StatusEffect) {
        self.statuses.push((player, status));
    }
}

/// Inventory with an optional per-player item cap.
#[derive(Debug, Default)]
pub struct MockInventory {
    contents: HashMap<PlayerId, Vec<ItemStack>>,
    capacity: Option<u32>,
}

impl MockInventory {
    /// Unlimited inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inventory holding at most `capacity` items per player.
    #[must_use]
    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            contents: HashMap::new(),
            capacity: Some(capacity),
        }
    }

    /// Total items a player holds.
    #[must_use]
    pub fn total(&self, player: PlayerId) -> u32 {
        self.contents
            .get(&player)
            .map_or(0, |stacks| stacks.iter().map(|s| s.count).sum())
    }

    /// Count of one item a player holds.
    #[must_use]
    pub fn count_item(&self, player: PlayerId, item_id: u32) -> u32 {
        self.contents.get(&player).map_or(0, |stacks| {
            stacks
                .iter()
                .filter(|s| s.item_id == item_id)
                .map(|s| s.count)
                .sum()
        })
    }
}

impl InventorySink for MockInventory {
    fn grant(&mut self, player: PlayerId, items: &[ItemStack]) -> Vec<ItemStack> {
        let mut free = self
            .capacity
            .map_or(u32::MAX, |cap| cap.saturating_sub(self.total(player)));
        let held = self.contents.entry(player).or_default();
        let mut overflow = Vec::new();

        for stack in items.iter().filter(|s| !s.is_empty()) {
            let fits = stack.count.min(free);
            free -= fits;
            if fits > 0 {
                held.push(ItemStack::new(stack.item_id, fits));
            }
            if fits < stack.count {
                overflow.push(ItemStack::new(stack.item_id, stack.count - fits));
            }
        }
        overflow
    }
}

/// In-memory currency ledger.
#[derive(Debug, Default)]
pub struct MockLedger {
    balances: HashMap<(PlayerId, String), Amount>,
    /// Every deposit: player, currency, amount, reason.
    pub deposits: Vec<(PlayerId, String, Amount, String)>,
    /// Every successful withdrawal: player, currency, amount.
    pub withdrawals: Vec<(PlayerId, String, Amount)>,
    /// When set, every withdrawal is refused.
    pub refuse_withdrawals: bool,
}

impl MockLedger {
    /// Empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a balance.
    pub fn set_balance(&mut self, player: PlayerId, currency: &str, amount: Amount) {
        self.balances.insert((player, currency.to_string()), amount);
    }

    /// Sum of all deposits of one currency to a player.
    #[must_use]
    pub fn deposited(&self, player: PlayerId, currency: &str) -> Amount {
        self.deposits
            .iter()
            .filter(|(p, c, _, _)| *p == player && c == currency)
            .map(|(_, _, a, _)| *a)
            .sum()
    }
}

impl CurrencyLedger for MockLedger {
    fn balance(&self, player: PlayerId, currency: &str) -> Amount {
        *self.balances.get(&(player, currency.to_string())).unwrap_or(&0)
    }

    fn withdraw(&mut self, player: PlayerId, currency: &str, amount: Amount) -> bool {
        if self.refuse_withdrawals {
            return false;
        }
        let balance = self.balances.entry((player, currency.to_string())).or_insert(0);
        if *balance < amount {
            return false;
        }
        *balance -= amount;
        self.withdrawals.push((player, currency.to_string(), amount));
        true
    }

    fn deposit(&mut self, player: PlayerId, currency: &str, amount: Amount, reason: &str) {
        let balance = self.balances.entry((player, currency.to_string())).or_insert(0);
        *balance = balance.saturating_add(amount);
        self.deposits
            .push((player, currency.to_string(), amount, reason.to_string()));
    }
}

/// In-memory tool data.
#[derive(Debug, Default)]
pub struct MockToolStore {
    tools: HashMap<ToolHandle, HashMap<EnchantId, u32>>,
}

impl MockToolStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: puts an enchant on a tool.
    #[must_use]
    pub fn with_level(mut self, tool: ToolHandle, enchant: &str, level: u32) -> Self {
        self.set_level(tool, &EnchantId::from(enchant), level);
        self
    }

    /// Current level of one enchant.
    #[must_use]
    pub fn level(&self, tool: ToolHandle, enchant: &str) -> u32 {
        self.tools
            .get(&tool)
            .and_then(|levels| levels.get(enchant))
            .copied()
            .unwrap_or(0)
    }

    /// Returns true if the tool carries the enchant at all.
    #[must_use]
    pub fn has(&self, tool: ToolHandle, enchant: &str) -> bool {
        self.tools
            .get(&tool)
            .is_some_and(|levels| levels.contains_key(enchant))
    }
}

impl ToolDataStore for MockToolStore {
    fn levels(&self, tool: ToolHandle) -> HashMap<EnchantId, u32> {
        self.tools.get(&tool).cloned().unwrap_or_default()
    }

    fn set_level(&mut self, tool: ToolHandle, enchant: &EnchantId, level: u32) -> ToolHandle {
        let levels = self.tools.entry(tool).or_default();
        if level == 0 {
            levels.remove(enchant);
        } else {
            levels.insert(enchant.clone(), level);
        }
        tool
    }
}

/// Permission table.
#[derive(Debug, Default)]
pub struct MockPermissions {
    granted: HashSet<(PlayerId, String)>,
    /// When set, every check passes.
    pub allow_all: bool,
}

impl MockPermissions {
    /// Grants everything to everyone.
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            granted: HashSet::new(),
            allow_all: true,
        }
    }

    /// Grants nothing.
    #[must_use]
    pub fn deny_all() -> Self {
        Self::default()
    }

    /// Grants one node to one player.
    pub fn grant(&mut self, player: PlayerId, permission: &str) {
        self.granted.insert((player, permission.to_string()));
    }
}

impl PermissionCheck for MockPermissions {
    fn has(&self, player: PlayerId, permission: &str) -> bool {
        self.allow_all || self.granted.contains(&(player, permission.to_string()))
    }
}

/// Axis-aligned named regions.
#[derive(Debug, Default)]
pub struct MockRegions {
    regions: Vec<(BlockPos, BlockPos, String)>,
}

impl MockRegions {
    /// No regions anywhere.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an inclusive cuboid region.
    pub fn add(&mut self, min: BlockPos, max: BlockPos, name: &str) {
        self.regions.push((min, max, name.to_string()));
    }
}

impl RegionCheck for MockRegions {
    fn region_at(&self, pos: BlockPos) -> Option<String> {
        self.regions
            .iter()
            .find(|(min, max, _)| {
                (min.x..=max.x).contains(&pos.x)
                    && (min.y..=max.y).contains(&pos.y)
                    && (min.z..=max.z).contains(&pos.z)
            })
            .map(|(_, _, name)| name.clone())
    }
}

/// Owns one of every mock so tests can borrow a [`Services`] in one line.
#[derive(Debug, Default)]
pub struct MockHost {
    /// World.
    pub world: MockWorld,
    /// Inventories.
    pub inventory: MockInventory,
    /// Ledger.
    pub ledger: MockLedger,
    /// Tools.
    pub tools: MockToolStore,
    /// Permissions.
    pub permissions: MockPermissions,
    /// Regions.
    pub regions: MockRegions,
}

impl MockHost {
    /// Host where every permission is granted.
    #[must_use]
    pub fn new() -> Self {
        Self {
            permissions: MockPermissions::allow_all(),
            ..Self::default()
        }
    }

    /// Borrows every collaborator at once.
    pub fn services(&mut self) -> Services<'_> {
        Services {
            world: &mut self.world,
            inventory: &mut self.inventory,
            ledger: &mut self.ledger,
            tools: &self.tools,
            permissions: &self.permissions,
            regions: &self.regions,
        }
    }
}
