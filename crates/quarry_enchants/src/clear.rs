//! # Block Clearing
//!
//! Three bounded block-elimination routines shared by the clearing effects:
//!
//! - [`break_area`]: cube of `±radius` around an anchor
//! - [`break_line`]: straight walk along a direction
//! - [`break_column`]: straight walk upward
//!
//! None of them roll; given the same world and inputs they break the same
//! blocks in the same order. Every routine stops at `max_blocks`, which the
//! caller has already capped at the engine-wide limit.

use std::collections::BTreeSet;

use quarry_shared::{blocks, BlockKind, BlockPos, ItemStack, PlayerId, ToolHandle};
use serde::{Deserialize, Serialize};

use crate::collaborators::Services;
use crate::state::DropBoost;

/// Where the drops of cleared blocks go.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropMode {
    /// Straight into the player's inventory; overflow is dropped at the anchor.
    #[default]
    Inventory,
    /// On the ground where each block was.
    WorldDrop,
}

impl DropMode {
    /// Parses a params value; anything unknown falls back to `Inventory`.
    #[must_use]
    pub fn from_param(value: &str) -> Self {
        match value {
            "world_drop" | "world" => Self::WorldDrop,
            _ => Self::Inventory,
        }
    }
}

/// Inputs shared by all three routines.
#[derive(Clone, Copy, Debug)]
pub struct ClearSpec<'a> {
    /// Acting player.
    pub player: PlayerId,
    /// Tool breaking the blocks.
    pub tool: ToolHandle,
    /// Hard cap on blocks broken (already capped globally).
    pub max_blocks: u32,
    /// Largest radius/range/height the routine may walk.
    pub max_extent: u32,
    /// Block kinds that are never broken.
    pub skip: &'a BTreeSet<BlockKind>,
    /// Drop routing.
    pub drop_mode: DropMode,
    /// Active drop multipliers, if any.
    pub boost: Option<DropBoost>,
}

impl ClearSpec<'_> {
    fn eligible(&self, kind: BlockKind) -> bool {
        !blocks::is_indestructible(kind) && !self.skip.contains(&kind)
    }

    fn multiplier(&self, kind: BlockKind) -> f64 {
        match self.boost {
            Some(boost) if blocks::is_ore(kind) => boost.ore,
            Some(boost) if blocks::is_stone(kind) => boost.stone,
            _ => 1.0,
        }
    }
}

/// What one clearing invocation did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClearOutcome {
    /// Blocks actually broken.
    pub broken: u32,
    /// Items delivered (to the inventory or the ground).
    pub drops: Vec<ItemStack>,
}

/// Breaks up to `max_blocks` eligible blocks in the cube `±radius` around
/// `anchor`, excluding the anchor itself.
///
/// # Algorithm
///
/// 1. Clamp the radius to `max_extent`
/// 2. Scan x→y→z, collecting eligible blocks until the budget is full
/// 3. Break every collected block and route its drops
pub fn break_area(services: &mut Services<'_>, spec: &ClearSpec<'_>, anchor: BlockPos, radius: u32) -> ClearOutcome {
    let r = extent(radius, spec.max_extent);
    let budget = spec.max_blocks as usize;

    // Step 1: Collect
    let mut targets = Vec::with_capacity(budget.min(64));
    'scan: for dx in -r..=r {
        for dy in -r..=r {
            for dz in -r..=r {
                if targets.len() >= budget {
                    break 'scan;
                }
                if dx == 0 && dy == 0 && dz == 0 {
                    continue;
                }
                let pos = anchor.offset(dx, dy, dz);
                let kind = services.world.block_kind_at(pos);
                if spec.eligible(kind) {
                    targets.push((pos, kind));
                }
            }
        }
    }

    // Step 2: Break
    let mut router = DropRouter::new(spec, anchor);
    for (pos, kind) in targets {
        router.break_one(services, pos, kind);
    }
    router.finish(services)
}

/// Walks `range` steps from `origin` along `direction`, breaking eligible
/// blocks until `max_blocks` have been broken.
///
/// Skipped and empty positions cost one step like any other.
pub fn break_line(
    services: &mut Services<'_>,
    spec: &ClearSpec<'_>,
    origin: BlockPos,
    direction: BlockPos,
    range: u32,
) -> ClearOutcome {
    walk(services, spec, origin, direction, range)
}

/// Walks `height` steps straight up from `anchor`.
pub fn break_column(services: &mut Services<'_>, spec: &ClearSpec<'_>, anchor: BlockPos, height: u32) -> ClearOutcome {
    walk(services, spec, anchor, BlockPos::UP, height)
}

/// Clamps a requested extent and converts it without wrapping.
fn extent(requested: u32, max_extent: u32) -> i32 {
    i32::try_from(requested.min(max_extent)).unwrap_or(i32::MAX)
}

fn walk(
    services: &mut Services<'_>,
    spec: &ClearSpec<'_>,
    origin: BlockPos,
    direction: BlockPos,
    steps: u32,
) -> ClearOutcome {
    let steps = extent(steps, spec.max_extent);
    let mut router = DropRouter::new(spec, origin);

    for step in 1..=steps {
        if router.broken >= spec.max_blocks {
            break;
        }
        let pos = origin.step(direction, step);
        let kind = services.world.block_kind_at(pos);
        if spec.eligible(kind) {
            router.break_one(services, pos, kind);
        }
    }
    router.finish(services)
}

/// Breaks blocks and routes their drops per [`DropMode`].
struct DropRouter<'s, 'a> {
    spec: &'s ClearSpec<'a>,
    anchor: BlockPos,
    broken: u32,
    drops: Vec<ItemStack>,
}

impl<'s, 'a> DropRouter<'s, 'a> {
    fn new(spec: &'s ClearSpec<'a>, anchor: BlockPos) -> Self {
        Self {
            spec,
            anchor,
            broken: 0,
            drops: Vec::new(),
        }
    }

    fn break_one(&mut self, services: &mut Services<'_>, pos: BlockPos, kind: BlockKind) {
        let multiplier = self.spec.multiplier(kind);
        let items: Vec<ItemStack> = services
            .world
            .break_block(pos, self.spec.tool)
            .into_iter()
            .map(|stack| stack.scaled(multiplier))
            .filter(|stack| !stack.is_empty())
            .collect();
        self.broken += 1;

        if self.spec.drop_mode == DropMode::WorldDrop && !items.is_empty() {
            services.world.drop_items(pos, &items);
        }
        self.drops.extend(items);
    }

    fn finish(self, services: &mut Services<'_>) -> ClearOutcome {
        if self.spec.drop_mode == DropMode::Inventory {
            services.grant_or_drop(self.spec.player, self.anchor, &self.drops);
        }
        ClearOutcome {
            broken: self.broken,
            drops: self.drops,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MockHost, MockInventory};

    fn spec(skip: &BTreeSet<BlockKind>, max_blocks: u32) -> ClearSpec<'_> {
        ClearSpec {
            player: 1,
            tool: ToolHandle(1),
            max_blocks,
            max_extent: 8,
            skip,
            drop_mode: DropMode::Inventory,
            boost: None,
        }
    }

    fn stone_cube(host: &mut MockHost, half: i32) {
        host.world.fill(
            BlockPos::new(-half, -half, -half),
            BlockPos::new(half, half, half),
            blocks::STONE,
        );
    }

    #[test]
    fn test_area_respects_budget() {
        let mut host = MockHost::new();
        stone_cube(&mut host, 2);
        let skip = BTreeSet::new();

        let outcome = break_area(&mut host.services(), &spec(&skip, 8), BlockPos::ORIGIN, 100);

        assert_eq!(outcome.broken, 8);
        assert_eq!(host.world.broken.len(), 8);
        assert_eq!(host.inventory.total(1), 8);
    }

    #[test]
    fn test_area_breaks_everything_available() {
        let mut host = MockHost::new();
        host.world.set_block(BlockPos::new(1, 0, 0), blocks::IRON_ORE);
        host.world.set_block(BlockPos::new(0, 0, 1), blocks::BEDROCK);
        host.world.set_block(BlockPos::new(0, 1, 0), blocks::STONE);
        let skip = BTreeSet::new();

        let outcome = break_area(&mut host.services(), &spec(&skip, 64), BlockPos::ORIGIN, 1);
        assert_eq!(outcome.broken, 2, "bedrock is never broken");
    }

    #[test]
    fn test_area_order_is_stable() {
        let mut a = MockHost::new();
        let mut b = MockHost::new();
        stone_cube(&mut a, 3);
        stone_cube(&mut b, 3);
        let skip = BTreeSet::new();

        break_area(&mut a.services(), &spec(&skip, 10), BlockPos::ORIGIN, 3);
        break_area(&mut b.services(), &spec(&skip, 10), BlockPos::ORIGIN, 3);
        assert_eq!(a.world.broken, b.world.broken);
        assert_eq!(a.world.broken[0], BlockPos::new(-3, -3, -3));
    }

    #[test]
    fn test_line_skips_without_extra_range() {
        let mut host = MockHost::new();
        for z in 1..=6 {
            host.world.set_block(BlockPos::new(0, 0, z), blocks::STONE);
        }
        host.world.set_block(BlockPos::new(0, 0, 2), blocks::COAL_ORE);
        let skip = BTreeSet::from([blocks::COAL_ORE]);

        let outcome = break_line(
            &mut host.services(),
            &spec(&skip, 64),
            BlockPos::ORIGIN,
            BlockPos::new(0, 0, 1),
            4,
        );

        // Steps 1..=4: z=2 skipped, z=5 and z=6 out of range
        assert_eq!(outcome.broken, 3);
        assert_eq!(host.world.broken, vec![
            BlockPos::new(0, 0, 1),
            BlockPos::new(0, 0, 3),
            BlockPos::new(0, 0, 4),
        ]);
    }

    #[test]
    fn test_column_stops_at_budget() {
        let mut host = MockHost::new();
        host.world.fill(BlockPos::new(0, 1, 0), BlockPos::new(0, 20, 0), blocks::STONE);
        let skip = BTreeSet::new();

        let outcome = break_column(&mut host.services(), &spec(&skip, 5), BlockPos::ORIGIN, 20);
        assert_eq!(outcome.broken, 5);
        assert_eq!(host.world.broken.last(), Some(&BlockPos::new(0, 5, 0)));
    }

    #[test]
    fn test_world_drop_mode_skips_inventory() {
        let mut host = MockHost::new();
        host.world.fill(BlockPos::new(0, 1, 0), BlockPos::new(0, 3, 0), blocks::STONE);
        let skip = BTreeSet::new();
        let mut world_spec = spec(&skip, 64);
        world_spec.drop_mode = DropMode::WorldDrop;

        break_column(&mut host.services(), &world_spec, BlockPos::ORIGIN, 3);
        assert_eq!(host.inventory.total(1), 0);
        assert_eq!(host.world.dropped_count(), 3);
    }

    #[test]
    fn test_full_inventory_overflows_to_world() {
        let mut host = MockHost::new();
        host.inventory = MockInventory::with_capacity(2);
        host.world.fill(BlockPos::new(0, 1, 0), BlockPos::new(0, 5, 0), blocks::STONE);
        let skip = BTreeSet::new();

        let outcome = break_column(&mut host.services(), &spec(&skip, 64), BlockPos::ORIGIN, 5);
        assert_eq!(outcome.broken, 5);
        assert_eq!(host.inventory.total(1), 2);
        assert_eq!(host.world.dropped_count(), 3);
    }

    #[test]
    fn test_boost_multiplies_ore_only() {
        let mut host = MockHost::new();
        host.world.set_block(BlockPos::new(0, 1, 0), blocks::GOLD_ORE);
        host.world.set_block(BlockPos::new(0, 2, 0), blocks::STONE);
        let skip = BTreeSet::new();
        let mut boosted = spec(&skip, 64);
        boosted.boost = Some(DropBoost {
            expiry: u64::MAX,
            ore: 3.0,
            stone: 1.0,
        });

        break_column(&mut host.services(), &boosted, BlockPos::ORIGIN, 2);
        assert_eq!(host.inventory.count_item(1, blocks::GOLD_ORE), 3);
        assert_eq!(host.inventory.count_item(1, blocks::STONE), 1);
    }
}
