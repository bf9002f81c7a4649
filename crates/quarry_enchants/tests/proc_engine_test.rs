//! Integration tests for the proc engine against mock collaborators.

use quarry_enchants::{
    DefinitionRegistry, EngineConfig, EnchantId, GameMode, MockHost, MockPermissions, ProcContext, ProcEngine,
    ToolDataStore, TriggerEvent,
};
use quarry_shared::{blocks, BlockPos, PlayerId, ToolHandle, Vec3};

const PLAYER: PlayerId = 1;
const TOOL: ToolHandle = ToolHandle(1);

fn engine_with(config: EngineConfig, definitions: &str) -> ProcEngine {
    let (registry, report) = DefinitionRegistry::load_toml_str(definitions).unwrap();
    assert!(report.rejected.is_empty(), "{:?}", report.rejected);
    ProcEngine::new(config, registry)
}

fn engine(definitions: &str) -> ProcEngine {
    engine_with(EngineConfig::default(), definitions)
}

fn host(levels: &[(&str, u32)]) -> MockHost {
    let mut host = MockHost::new();
    for (id, level) in levels {
        host.tools.set_level(TOOL, &EnchantId::from(*id), *level);
    }
    host
}

fn break_at(now: u64) -> TriggerEvent {
    TriggerEvent::block_break(PLAYER, TOOL, BlockPos::ORIGIN, now)
}

#[test]
fn test_cooldown_blocks_reactivation() {
    let mut engine = engine(
        r#"
        [[enchant]]
        id = "token_finder"
        max_level = 10
        triggers = ["block_break"]
        cooldown_ms = 1000
        chance = { base = 1.0 }
        "#,
    );
    let mut host = host(&[("token_finder", 5)]);

    assert_eq!(engine.evaluate(&break_at(0), &mut host.services()).len(), 1);
    for t in (1..1_000).step_by(7) {
        assert!(
            engine.evaluate(&break_at(t), &mut host.services()).is_empty(),
            "re-activated at {t}"
        );
    }
    assert_eq!(engine.evaluate(&break_at(1_000), &mut host.services()).len(), 1);
    assert_eq!(host.ledger.deposits.len(), 2);
}

#[test]
fn test_throttle_caps_activations() {
    let mut engine = engine(
        r#"
        [[enchant]]
        id = "token_finder"
        max_level = 10
        triggers = ["block_break"]
        chance = { base = 1.0 }
        abuse = { max_procs_per_second = 2 }
        "#,
    );
    let mut host = host(&[("token_finder", 1)]);

    let activations: usize = (0..5)
        .map(|i| engine.evaluate(&break_at(i * 100), &mut host.services()).len())
        .sum();
    assert_eq!(activations, 2);

    let reader = engine.state_reader();
    assert_eq!(reader.activations_in_window(PLAYER, "token_finder", 400, 1_000), 2);

    // The window slides
    assert_eq!(engine.evaluate(&break_at(1_000), &mut host.services()).len(), 1);
}

const SECOND_HAND_SET: &str = r#"
    [[enchant]]
    id = "second_hand"
    max_level = 5
    triggers = ["block_break"]
    chance = { base = 1.0 }

    [[enchant]]
    id = "echo"
    effect = "second_hand"
    max_level = 5
    triggers = ["block_break"]
    chance = { base = 1.0 }

    [[enchant]]
    id = "mirror"
    max_level = 5
    triggers = ["block_break"]
    chance = { base = 1.0 }

    [[enchant]]
    id = "token_finder"
    max_level = 5
    triggers = ["block_break"]
    chance = { base = 1.0 }

    [[enchant]]
    id = "treasure"
    max_level = 5
    triggers = ["block_break"]
    chance = { base = 1.0 }
"#;

#[test]
fn test_secondary_roll_never_recurses() {
    let mut engine = engine(SECOND_HAND_SET);
    let mut host = host(&[
        ("second_hand", 1),
        ("echo", 1),
        ("mirror", 1),
        ("token_finder", 1),
        ("treasure", 1),
    ]);

    for t in 0..500 {
        let results = engine.evaluate(&break_at(t), &mut host.services());
        let secondary: Vec<_> = results
            .iter()
            .filter(|r| r.context == ProcContext::SecondaryRoll)
            .collect();

        assert_eq!(secondary.len(), 1, "exactly one bonus activation per trigger");
        let picked = secondary[0].enchant.as_str();
        assert!(
            picked == "token_finder" || picked == "treasure",
            "meta enchant {picked} ran in a secondary roll"
        );
        assert_eq!(results.last().map(|r| r.context), Some(ProcContext::SecondaryRoll));
    }
}

#[test]
fn test_secondary_roll_skips_cooling_enchants() {
    let mut engine = engine(
        r#"
        [[enchant]]
        id = "second_hand"
        max_level = 5
        triggers = ["block_break"]
        chance = { base = 1.0 }

        [[enchant]]
        id = "token_finder"
        max_level = 5
        triggers = ["block_break"]
        cooldown_ms = 60000
        chance = { base = 1.0 }
        "#,
    );
    let mut host = host(&[("second_hand", 1), ("token_finder", 1)]);

    let results = engine.evaluate(&break_at(0), &mut host.services());
    let ids: Vec<_> = results.iter().map(|r| (r.enchant.as_str(), r.context)).collect();
    assert_eq!(
        ids,
        vec![
            ("second_hand", ProcContext::Primary),
            ("token_finder", ProcContext::Primary)
        ]
    );
}

#[test]
fn test_anti_abuse_gates() {
    let mut engine = engine(
        r#"
        [[enchant]]
        id = "token_finder"
        max_level = 5
        triggers = ["block_break"]
        chance = { base = 1.0 }
        abuse = { ignore_if_creative = true, ignore_if_no_permission = true, requires_region = "mine_a" }
        "#,
    );
    let mut host = host(&[("token_finder", 1)]);
    host.permissions = MockPermissions::deny_all();
    host.regions.add(BlockPos::new(-10, -10, -10), BlockPos::new(10, 10, 10), "mine_a");

    assert!(engine.evaluate(&break_at(0), &mut host.services()).is_empty(), "no permission");

    host.permissions.grant(PLAYER, "quarry.enchant.token_finder");
    let creative = break_at(0).in_mode(GameMode::Creative);
    assert!(engine.evaluate(&creative, &mut host.services()).is_empty(), "creative");

    let outside = TriggerEvent::block_break(PLAYER, TOOL, BlockPos::new(50, 0, 0), 0);
    assert!(engine.evaluate(&outside, &mut host.services()).is_empty(), "outside region");

    assert_eq!(engine.evaluate(&break_at(0), &mut host.services()).len(), 1);
}

#[test]
fn test_area_clear_respects_caps() {
    let mut engine = engine(
        r#"
        [[enchant]]
        id = "explosive"
        max_level = 5
        triggers = ["block_break"]
        chance = { base = 1.0 }
        params = { radius = 100, max_blocks = 8 }

        [[enchant]]
        id = "nuke"
        effect = "explosive"
        max_level = 5
        triggers = ["interact"]
        chance = { base = 1.0 }
        params = { radius = 100, max_blocks = 5000 }
        "#,
    );
    let mut host = host(&[("explosive", 1), ("nuke", 1)]);
    host.world
        .fill(BlockPos::new(-5, -5, -5), BlockPos::new(5, 5, 5), blocks::STONE);

    let results = engine.evaluate(&break_at(0), &mut host.services());
    assert_eq!(results[0].blocks_broken, 8);

    let interact = TriggerEvent::interact(PLAYER, TOOL, BlockPos::ORIGIN, 0);
    let results = engine.evaluate(&interact, &mut host.services());
    assert_eq!(results[0].blocks_broken, 64, "global cap");
    assert_eq!(host.world.broken.len(), 72);
}

#[test]
fn test_laser_toggle_is_control() {
    let mut engine = engine(
        r#"
        [[enchant]]
        id = "laser"
        max_level = 5
        triggers = ["block_break"]
        chance = { base = 1.0 }
        params = { range = 6 }
        "#,
    );
    let mut host = host(&[("laser", 1)]);
    host.world
        .fill(BlockPos::new(0, 0, -10), BlockPos::new(0, 0, -1), blocks::STONE);
    host.world.set_facing(PLAYER, Vec3::new(0.1, 0.3, -0.9));

    assert!(engine.evaluate(&break_at(0), &mut host.services()).is_empty(), "mode off");

    let toggle = TriggerEvent::interact(PLAYER, TOOL, BlockPos::ORIGIN, 10).sneaking(true);
    let results = engine.evaluate(&toggle, &mut host.services());
    assert_eq!(results.len(), 1);
    assert!(results[0].control);

    let results = engine.evaluate(&break_at(20), &mut host.services());
    assert_eq!(results[0].blocks_broken, 6);
    assert_eq!(host.world.broken.last(), Some(&BlockPos::new(0, 0, -6)));

    // Toggle back off
    engine.evaluate(&toggle, &mut host.services());
    assert!(engine.evaluate(&break_at(30), &mut host.services()).is_empty());
}

#[test]
fn test_laser_toggle_needs_permission() {
    let mut engine = engine(
        r#"
        [[enchant]]
        id = "laser"
        max_level = 5
        triggers = ["block_break"]
        chance = { base = 1.0 }
        params = { range = 6 }
        abuse = { ignore_if_creative = true, ignore_if_no_permission = true }
        "#,
    );
    let mut host = host(&[("laser", 1)]);
    host.permissions = MockPermissions::deny_all();

    let toggle = TriggerEvent::interact(PLAYER, TOOL, BlockPos::ORIGIN, 0).sneaking(true);
    assert!(engine.evaluate(&toggle, &mut host.services()).is_empty(), "no permission");

    host.permissions.grant(PLAYER, "quarry.enchant.laser");
    let creative = toggle.in_mode(GameMode::Creative);
    assert!(engine.evaluate(&creative, &mut host.services()).is_empty(), "creative");

    let results = engine.evaluate(&toggle, &mut host.services());
    assert_eq!(results.len(), 1);
    assert!(results[0].control);
}

#[test]
fn test_oversized_radius_still_clears() {
    let config = EngineConfig {
        max_area_radius: 3_000_000_000,
        ..EngineConfig::default()
    };
    let mut engine = engine_with(
        config,
        r#"
        [[enchant]]
        id = "explosive"
        max_level = 5
        triggers = ["block_break"]
        chance = { base = 1.0 }
        params = { radius = 3000000000, max_blocks = 8 }
        "#,
    );
    let mut host = host(&[("explosive", 1)]);
    host.world
        .fill(BlockPos::new(-2, -2, -2), BlockPos::new(2, 2, 2), blocks::STONE);

    let results = engine.evaluate(&break_at(0), &mut host.services());
    assert_eq!(results[0].blocks_broken, 8);
}

#[test]
fn test_shockwave_waves_and_disconnect() {
    let definitions = r#"
        [[enchant]]
        id = "shockwave"
        max_level = 5
        triggers = ["block_break"]
        chance = { base = 1.0 }
        params = { waves = 3, wave_delay_ms = 200, radius = 1, max_blocks = 4 }
    "#;

    // Connected: all three waves run
    let mut engine_a = engine(definitions);
    let mut host_a = host(&[("shockwave", 1)]);
    host_a
        .world
        .fill(BlockPos::new(-4, -4, -4), BlockPos::new(4, 4, 4), blocks::STONE);
    engine_a.evaluate(&break_at(0), &mut host_a.services());
    assert_eq!(engine_a.pending_tasks(), 2);

    let early = engine_a.tick(100, &mut host_a.services());
    assert_eq!(early.tasks_run, 0);
    let first = engine_a.tick(200, &mut host_a.services());
    assert_eq!((first.tasks_run, first.blocks_broken), (1, 4));
    let second = engine_a.tick(400, &mut host_a.services());
    assert_eq!(second.tasks_run, 1);
    assert_eq!(host_a.world.broken.len(), 12);

    // Disconnected after the first wave: the rest never run
    let mut engine_b = engine(definitions);
    let mut host_b = host(&[("shockwave", 1)]);
    host_b
        .world
        .fill(BlockPos::new(-4, -4, -4), BlockPos::new(4, 4, 4), blocks::STONE);
    engine_b.evaluate(&break_at(0), &mut host_b.services());
    engine_b.player_left(PLAYER);
    assert!(!engine_b.is_online(PLAYER));
    assert_eq!(engine_b.pending_tasks(), 0);

    let report = engine_b.tick(1_000, &mut host_b.services());
    assert_eq!(report.tasks_run, 0);
    assert_eq!(host_b.world.broken.len(), 4);
}

#[test]
fn test_decay_runs_on_interval() {
    let mut engine = engine(
        r#"
        [[enchant]]
        id = "overclock"
        max_level = 5
        triggers = ["block_break"]
        chance = { base = 1.0 }
        params = { max_stacks = 5, decay_after_ms = 1000 }
        "#,
    );
    let mut host = host(&[("overclock", 1)]);
    for t in 0..3 {
        engine.evaluate(&break_at(t), &mut host.services());
    }
    assert_eq!(host.world.statuses.len(), 3);

    assert!(engine.tick(500, &mut host.services()).decayed, "first tick always decays");
    assert!(!engine.tick(900, &mut host.services()).decayed);
    assert!(engine.tick(1_500, &mut host.services()).decayed);
    assert!(engine.tick(2_500, &mut host.services()).decayed);

    // Stacks went 3 -> 2 (at 1500) -> 1 (at 2500); the next proc makes 2
    engine.evaluate(&break_at(2_600), &mut host.services());
    let amplifier = host.world.statuses.last().map(|(_, status)| status.amplifier);
    assert_eq!(amplifier, Some(1));
}

const PIGGY: &str = r#"
    [[enchant]]
    id = "piggy_bank"
    max_level = 5
    triggers = ["block_break"]
    chance = { base = 1.0 }
    params = { deposit = 400, threshold = 1000, bonus = 0.25 }
"#;

fn piggy_after_reconnect(retain: bool) -> u64 {
    let config = EngineConfig {
        retain_effect_state_on_disconnect: retain,
        ..EngineConfig::default()
    };
    let mut engine = engine_with(config, PIGGY);
    let mut host = host(&[("piggy_bank", 1)]);

    engine.player_joined(PLAYER);
    engine.evaluate(&break_at(0), &mut host.services());
    engine.evaluate(&break_at(1), &mut host.services());
    engine.player_left(PLAYER);
    engine.player_joined(PLAYER);
    engine.evaluate(&break_at(2), &mut host.services());
    host.ledger.deposited(PLAYER, "tokens")
}

#[test]
fn test_escrow_retention_is_configurable() {
    assert_eq!(piggy_after_reconnect(true), 1_500);
    assert_eq!(piggy_after_reconnect(false), 0);
}

#[test]
fn test_enhancer_boosts_other_chances() {
    let mut engine = engine(
        r#"
        [[enchant]]
        id = "enhancer"
        max_level = 5
        triggers = ["interact"]
        chance = { base = 1.0 }
        params = { bonus = 1.0, duration_ms = 100000 }

        [[enchant]]
        id = "token_finder"
        max_level = 5
        triggers = ["block_break"]
        chance = { base = 0.5 }
        "#,
    );
    let mut host = host(&[("enhancer", 1), ("token_finder", 1)]);

    engine.evaluate(
        &TriggerEvent::interact(PLAYER, TOOL, BlockPos::ORIGIN, 0),
        &mut host.services(),
    );
    let fired: usize = (1..200)
        .map(|t| engine.evaluate(&break_at(t), &mut host.services()).len())
        .sum();
    assert_eq!(fired, 199);
}

#[test]
fn test_inbox_from_other_thread() {
    let mut engine = engine(
        r#"
        [[enchant]]
        id = "token_finder"
        max_level = 5
        triggers = ["interact"]
        chance = { base = 1.0 }
        "#,
    );
    let mut host = host(&[("token_finder", 1)]);
    let sender = engine.sender();

    std::thread::spawn(move || {
        for t in 0..4 {
            assert!(sender.submit(TriggerEvent::interact(PLAYER, TOOL, BlockPos::ORIGIN, t)));
        }
    })
    .join()
    .unwrap();

    assert_eq!(engine.drain_inbox(&mut host.services()).len(), 4);
    assert!(engine.drain_inbox(&mut host.services()).is_empty());
}

#[test]
fn test_reload_swaps_definitions() {
    let mut engine = engine(
        r#"
        [[enchant]]
        id = "token_finder"
        max_level = 5
        triggers = ["block_break"]
        chance = { base = 1.0 }
        "#,
    );
    let mut host = host(&[("token_finder", 1)]);
    assert_eq!(engine.evaluate(&break_at(0), &mut host.services()).len(), 1);

    let report = engine
        .reload_toml_str(
            r#"
            [[enchant]]
            id = "token_finder"
            max_level = 5
            triggers = ["idle_tick"]
            chance = { base = 1.0 }
            "#,
        )
        .unwrap();
    assert_eq!(report.loaded.len(), 1);
    assert!(engine.evaluate(&break_at(1), &mut host.services()).is_empty());
    assert_eq!(engine.registry().len(), 1);
}

#[test]
fn test_reader_sees_cooldown_from_other_thread() {
    let mut engine = engine(
        r#"
        [[enchant]]
        id = "drill"
        max_level = 5
        triggers = ["block_break"]
        cooldown_ms = 5000
        chance = { base = 1.0 }
        "#,
    );
    let mut host = host(&[("drill", 1)]);
    engine.evaluate(&break_at(1_000), &mut host.services());

    let reader = engine.state_reader();
    let remaining = std::thread::spawn(move || reader.cooldown_remaining(PLAYER, "drill", 2_000))
        .join()
        .unwrap();
    assert_eq!(remaining, 4_000);
    assert_eq!(host.tools.levels(TOOL).len(), 1);
}
