//! Integration tests for void_managed (reload, handles, reflection)

use glam::{Vec2, Vec3, Vec4};
use void_managed::prelude::*;
use void_managed::{FieldDocument, ReloadPhase, RuntimeConfig, ScriptError, StaticModuleLoader};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn id(n: u64) -> EntityId {
    EntityId::new(n).unwrap()
}

#[derive(Default)]
struct Player {
    health: i32,
    speed: f32,
    stamina: f64,
    alive: bool,
    level: u8,
    armor: i16,
    gold: i64,
    kills: u32,
    xp: u64,
    facing: Vec2,
    spawn: Vec3,
    tint: Vec4,
    target: Option<EntityId>,
}

impl ScriptObject for Player {
    fn on_create(&mut self, _ctx: &mut ScriptContext<'_>) -> HookResult {
        self.health = 100;
        self.alive = true;
        Ok(())
    }
}

#[derive(Default)]
struct Enemy {
    score: i32,
}

impl ScriptObject for Enemy {
    fn on_update(&mut self, _ctx: &mut ScriptContext<'_>, _dt: f32) -> HookResult {
        self.score += 1;
        Ok(())
    }
}

#[derive(Default)]
struct Bomb {
    fuse: f32,
}

impl ScriptObject for Bomb {
    fn on_create(&mut self, _ctx: &mut ScriptContext<'_>) -> HookResult {
        panic!("bomb exploded during creation");
    }

    fn on_update(&mut self, _ctx: &mut ScriptContext<'_>, _dt: f32) -> HookResult {
        Err("fuse is wet".into())
    }
}

fn player_class() -> ClassBuilder<Player> {
    ClassBuilder::new("Game.Player", Player::default)
        .field("health", |p| &p.health, |p| &mut p.health)
        .field("speed", |p| &p.speed, |p| &mut p.speed)
        .field("stamina", |p| &p.stamina, |p| &mut p.stamina)
        .field("alive", |p| &p.alive, |p| &mut p.alive)
        .field("level", |p| &p.level, |p| &mut p.level)
        .field("armor", |p| &p.armor, |p| &mut p.armor)
        .field("gold", |p| &p.gold, |p| &mut p.gold)
        .field("kills", |p| &p.kills, |p| &mut p.kills)
        .field("xp", |p| &p.xp, |p| &mut p.xp)
        .field("facing", |p| &p.facing, |p| &mut p.facing)
        .field("spawn", |p| &p.spawn, |p| &mut p.spawn)
        .field("tint", |p| &p.tint, |p| &mut p.tint)
        .field("target", |p| &p.target, |p| &mut p.target)
}

fn game_v1(module: &mut ModuleBuilder) {
    module
        .version(Version::new(1, 0, 0))
        .abstract_type("Game.Actor")
        .class(player_class())
        .class(ClassBuilder::new("Game.Enemy", Enemy::default).field("Score", |e| &e.score, |e| &mut e.score))
        .class(ClassBuilder::new("Game.Bomb", Bomb::default).field("fuse", |b| &b.fuse, |b| &mut b.fuse));
}

/// Second build of the game module: `Enemy` was removed
fn game_v2(module: &mut ModuleBuilder) {
    module.version(Version::new(1, 1, 0)).class(player_class());
}

fn runtime_with(loader: &StaticModuleLoader) -> ScriptRuntime {
    init_logging();
    let config = RuntimeConfig::from_toml_str("[reload]\nreclaim_timeout_ms = 0").unwrap();
    ScriptRuntime::with_config(loader.clone(), config).unwrap()
}

fn loaded_runtime() -> (StaticModuleLoader, ScriptRuntime) {
    let loader = StaticModuleLoader::new();
    loader.insert("Game.dll", game_v1);
    let mut runtime = runtime_with(&loader);
    assert!(runtime.load_module("Game.dll").is_loaded());
    (loader, runtime)
}

#[test]
fn test_classes_registered_under_both_names() {
    let (_, runtime) = loaded_runtime();

    assert!(runtime.class_exists("Game.Player"));
    assert!(runtime.class_exists("Player"));
    assert!(runtime.class_exists("Enemy"));
    assert!(!runtime.class_exists("Actor"));
    assert!(!runtime.class_exists("player"));
    assert_eq!(runtime.class_names(), ["Game.Player", "Game.Enemy", "Game.Bomb"]);
    assert_eq!(runtime.module_info().unwrap().version, Version::new(1, 0, 0));
}

#[test]
fn test_round_trip_every_field_type() {
    let (_, mut runtime) = loaded_runtime();
    let source = runtime.create_instance(id(1), "Player");

    runtime.set_field(source, "health", 42i32).unwrap();
    runtime.set_field(source, "speed", 5.5f32).unwrap();
    runtime.set_field(source, "stamina", 0.125f64).unwrap();
    runtime.set_field(source, "alive", false).unwrap();
    runtime.set_field(source, "level", 200u8).unwrap();
    runtime.set_field(source, "armor", -300i16).unwrap();
    runtime.set_field(source, "gold", -9_000_000_000i64).unwrap();
    runtime.set_field(source, "kills", 4_000_000_000u32).unwrap();
    runtime.set_field(source, "xp", u64::MAX).unwrap();
    runtime.set_field(source, "facing", Vec2::new(0.0, -1.0)).unwrap();
    runtime.set_field(source, "spawn", Vec3::new(1.5, 0.0, -2.25)).unwrap();
    runtime.set_field(source, "tint", Vec4::new(1.0, 0.5, 0.25, 1.0)).unwrap();
    runtime.set_field(source, "target", EntityId::new(99)).unwrap();

    let document = runtime.serialize(source).unwrap();
    let copy = runtime.create_instance(id(2), "Game.Player");
    assert_eq!(runtime.deserialize(copy, &document).unwrap(), 0);

    assert_eq!(runtime.get_field::<i32>(copy, "health").unwrap(), 42);
    assert_eq!(runtime.get_field::<f32>(copy, "speed").unwrap(), 5.5);
    assert_eq!(runtime.get_field::<f64>(copy, "stamina").unwrap(), 0.125);
    assert!(!runtime.get_field::<bool>(copy, "alive").unwrap());
    assert_eq!(runtime.get_field::<u8>(copy, "level").unwrap(), 200);
    assert_eq!(runtime.get_field::<i16>(copy, "armor").unwrap(), -300);
    assert_eq!(runtime.get_field::<i64>(copy, "gold").unwrap(), -9_000_000_000);
    assert_eq!(runtime.get_field::<u32>(copy, "kills").unwrap(), 4_000_000_000);
    assert_eq!(runtime.get_field::<u64>(copy, "xp").unwrap(), u64::MAX);
    assert_eq!(runtime.get_field::<Vec2>(copy, "facing").unwrap(), Vec2::new(0.0, -1.0));
    assert_eq!(runtime.get_field::<Vec3>(copy, "spawn").unwrap(), Vec3::new(1.5, 0.0, -2.25));
    assert_eq!(runtime.get_field::<Vec4>(copy, "tint").unwrap(), Vec4::new(1.0, 0.5, 0.25, 1.0));
    assert_eq!(runtime.get_field::<Option<EntityId>>(copy, "target").unwrap(), EntityId::new(99));
}

#[test]
fn test_entity_reference_serializes_as_identifier() {
    let (_, mut runtime) = loaded_runtime();
    let handle = runtime.create_instance(id(1), "Player");

    let document = FieldDocument::from_json(&runtime.serialize(handle).unwrap()).unwrap();
    assert_eq!(document.get("target"), Some(&serde_json::json!(0)));

    runtime.set_field(handle, "target", EntityId::new(12)).unwrap();
    let document = FieldDocument::from_json(&runtime.serialize(handle).unwrap()).unwrap();
    assert_eq!(document.get("target"), Some(&serde_json::json!(12)));
}

#[test]
fn test_reload_preserves_field_values() {
    let (_, mut runtime) = loaded_runtime();
    let player = runtime.create_instance(id(7), "Player");
    runtime.set_int(player, "health", 42);
    runtime.set_vec3(player, "spawn", Vec3::new(3.0, 4.0, 5.0));
    let enemy = runtime.create_instance(id(8), "Enemy");
    runtime.release_handle(player);
    runtime.release_handle(enemy);

    let report = runtime.load_module("Game.dll");

    assert!(report.is_loaded());
    assert_eq!(report.snapshot_len, 2);
    assert_eq!(report.restored, [id(7), id(8)]);
    assert!(report.dropped.is_empty());
    assert_eq!(report.previous_reclaimed, Some(true));

    let player = runtime.instance_handle(id(7)).unwrap();
    assert_eq!(runtime.get_int(player, "health"), Some(42));
    assert_eq!(runtime.get_vec3(player, "spawn"), Some(Vec3::new(3.0, 4.0, 5.0)));
    assert_eq!(runtime.reload_phase(), ReloadPhase::Idle);
}

#[test]
fn test_reload_drops_removed_classes_only() {
    let (loader, mut runtime) = loaded_runtime();
    let player = runtime.create_instance(id(1), "Player");
    runtime.set_int(player, "health", 7);
    runtime.create_instance(id(2), "Enemy");
    runtime.create_instance(id(3), "Player");

    loader.insert("Game.dll", game_v2);
    let report = runtime.load_module("Game.dll");

    assert_eq!(report.restored, [id(1), id(3)]);
    assert_eq!(report.dropped, [id(2)]);
    assert!(!runtime.instances().contains(id(2)));
    assert!(!runtime.class_exists("Enemy"));
    assert_eq!(runtime.module_info().unwrap().version, Version::new(1, 1, 0));

    let restored = runtime.instance_handle(id(1)).unwrap();
    assert_eq!(runtime.get_int(restored, "health"), Some(7));
}

#[test]
fn test_old_handles_are_rejected_after_reload() {
    let (_, mut runtime) = loaded_runtime();
    let stale = runtime.create_instance(id(1), "Player");

    runtime.load_module("Game.dll");

    assert!(matches!(
        runtime.get_field::<i32>(stale, "health"),
        Err(ScriptError::OrphanedHandle(_))
    ));
    assert_eq!(runtime.list_fields(stale), "");
    runtime.release_handle(stale);
    runtime.release_handle(stale);
}

#[test]
fn test_type_exact_field_access() {
    let (_, mut runtime) = loaded_runtime();
    let handle = runtime.create_instance(id(1), "Enemy");

    runtime.set_field(handle, "Score", 5i32).unwrap();
    assert!(matches!(
        runtime.get_field::<f32>(handle, "Score"),
        Err(ScriptError::FieldTypeMismatch { .. })
    ));
    assert_eq!(runtime.get_field::<i32>(handle, "Score").unwrap(), 5);

    assert!(!runtime.set_float(handle, "Score", 1.0));
    assert!(!runtime.set_int(handle, "Missing", 1));
    assert_eq!(runtime.get_int(handle, "Score"), Some(5));
}

#[test]
fn test_handle_lifecycle() {
    let (_, mut runtime) = loaded_runtime();
    let handle = runtime.create_instance(id(1), "Player");
    let second = runtime.instance_handle(id(1)).unwrap();
    assert_ne!(handle, second);

    runtime.release_handle(handle);
    assert!(matches!(
        runtime.get_field::<i32>(handle, "health"),
        Err(ScriptError::InvalidHandle { .. })
    ));
    runtime.release_handle(handle);

    assert_eq!(runtime.get_int(second, "health"), Some(100));
    assert!(runtime.instances().contains(id(1)));
}

#[test]
fn test_update_missing_entity_is_noop() {
    let (_, runtime) = loaded_runtime();
    runtime.update_entity(id(999), 0.016);
    assert!(runtime.instances().is_empty());
}

#[test]
fn test_faulting_scripts_are_isolated() {
    let (_, mut runtime) = loaded_runtime();
    let bomb = runtime.create_instance(id(1), "Bomb");
    let enemy = runtime.create_instance(id(2), "Enemy");

    assert!(!bomb.is_null());
    assert!(runtime.instances().contains(id(1)));

    runtime.update_all(0.016);
    runtime.update_entity(id(1), 0.016);
    runtime.update_entity(id(2), 0.016);

    assert_eq!(runtime.get_int(enemy, "Score"), Some(2));
}

#[test]
fn test_load_failure_leaves_no_partial_state() {
    let (_, mut runtime) = loaded_runtime();
    runtime.create_instance(id(1), "Player");

    let report = runtime.load_module("does/not/exist.dll");

    assert!(!report.is_loaded());
    assert!(matches!(report.error, Some(ScriptError::LoadFailed { .. })));
    assert_eq!(report.dropped, [id(1)]);
    assert!(runtime.class_names().is_empty());
    assert!(!runtime.class_exists("Player"));
    assert!(runtime.instances().is_empty());
    assert!(runtime.module_info().is_none());
    assert!(runtime.create_instance(id(2), "Player").is_null());
}

#[test]
fn test_debug_symbols_are_attached_when_present() {
    let dir = tempfile::tempdir().unwrap();
    let module = dir.path().join("Game.dll");
    std::fs::write(&module, b"").unwrap();

    let loader = StaticModuleLoader::new();
    loader.insert(&module, game_v1);
    let mut runtime = runtime_with(&loader);

    runtime.load_module(&module);
    assert_eq!(runtime.module_info().unwrap().debug_symbols, None);

    let symbols = dir.path().join("Game.pdb");
    std::fs::write(&symbols, b"").unwrap();
    runtime.load_module(&module);
    assert_eq!(runtime.module_info().unwrap().debug_symbols, Some(symbols));
}

#[test]
fn test_runtime_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scripting.toml");
    std::fs::write(
        &path,
        "[reload]\npreserve_state = false\ndebug_symbol_extensions = [\"sym\"]\n\n[watch]\ndebounce_ms = 250\n",
    )
    .unwrap();

    let config = RuntimeConfig::from_file(&path).unwrap();
    assert!(!config.reload.preserve_state);
    assert_eq!(config.reload.debug_symbol_extensions, ["sym"]);
    assert_eq!(config.watch.debounce_ms, 250);
    assert!(!config.watch.enabled);

    let loader = StaticModuleLoader::new();
    loader.insert("Game.dll", game_v1);
    let mut runtime = ScriptRuntime::with_config(loader, config).unwrap();
    runtime.load_module("Game.dll");
    runtime.create_instance(id(1), "Player");

    let report = runtime.load_module("Game.dll");
    assert_eq!(report.snapshot_len, 0);
    assert!(runtime.instances().is_empty());
}

#[test]
fn test_missing_config_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = RuntimeConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ScriptError::Io(_)));
}
