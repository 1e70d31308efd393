//! Hot-reload coordinator
//!
//! Replaces the loaded script module while the host keeps running:
//!
//! ```text
//! Idle -> Snapshotting -> Unloading -> Loading -> Restoring -> Idle
//!                                          \-> Idle   (load failed)
//! ```
//!
//! Only the flat snapshot documents cross from the old module to the new
//! one; no live reference does. The old module is reclaimed whenever its
//! last class or instance is dropped, which may be after the reload
//! returns (outstanding handles keep it alive, for example).

use crate::bindings::EngineBindings;
use crate::config::ReloadConfig;
use crate::error::ScriptError;
use crate::instance::InstanceRegistry;
use crate::loader::{find_debug_symbols, LoadRequest, ModuleLoader};
use crate::module::{ModuleContext, ModuleInfo};
use crate::reflection::{self, FieldDocument};
use crate::registry::ClassRegistry;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use void_core::EntityId;

/// Where the coordinator is in a reload cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReloadPhase {
    Idle,
    Snapshotting,
    Unloading,
    Loading,
    Restoring,
}

impl fmt::Display for ReloadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReloadPhase::Idle => "idle",
            ReloadPhase::Snapshotting => "snapshotting",
            ReloadPhase::Unloading => "unloading",
            ReloadPhase::Loading => "loading",
            ReloadPhase::Restoring => "restoring",
        };
        f.write_str(name)
    }
}

/// Saved state of one entity
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    /// Fully-qualified class name
    pub class_name: String,
    pub document: FieldDocument,
}

/// Entity state carried across one reload
#[derive(Debug, Clone, Default)]
pub struct ReloadSnapshot {
    entries: BTreeMap<EntityId, SnapshotEntry>,
}

impl ReloadSnapshot {
    /// Serialize every registered instance
    ///
    /// An instance that fails to serialize is logged and left out.
    pub fn capture(instances: &InstanceRegistry) -> Self {
        let mut entries = BTreeMap::new();
        for (entity, instance) in instances.iter() {
            let guard = instance.lock();
            match reflection::serialize(&guard) {
                Ok(document) => {
                    entries.insert(
                        entity,
                        SnapshotEntry {
                            class_name: guard.class().full_name().to_string(),
                            document,
                        },
                    );
                }
                Err(e) => log::warn!("Entity {} left out of reload snapshot: {}", entity, e),
            }
        }
        Self { entries }
    }

    pub fn get(&self, entity: EntityId) -> Option<&SnapshotEntry> {
        self.entries.get(&entity)
    }

    /// Entries in entity order
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &SnapshotEntry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of one reload cycle
#[derive(Debug, Default)]
pub struct ReloadReport {
    /// Module now loaded; `None` when loading failed
    pub module: Option<ModuleInfo>,
    /// Why loading failed
    pub error: Option<ScriptError>,
    /// Phases entered, in order, ending with `Idle`
    pub phases: Vec<ReloadPhase>,
    /// Entities captured before unloading
    pub snapshot_len: usize,
    /// Entities recreated from the snapshot
    pub restored: Vec<EntityId>,
    /// Entities whose state was lost
    pub dropped: Vec<EntityId>,
    /// Fields skipped while restoring
    pub field_failures: usize,
    /// Whether the previous module was freed within the reclaim timeout
    pub previous_reclaimed: Option<bool>,
}

impl ReloadReport {
    /// Whether the new module loaded
    pub fn is_loaded(&self) -> bool {
        self.module.is_some()
    }
}

struct LoadedModule {
    info: ModuleInfo,
    context: Arc<ModuleContext>,
}

/// Orchestrates snapshot, unload, load and restore
pub struct HotReloadCoordinator {
    loader: Box<dyn ModuleLoader>,
    config: ReloadConfig,
    phase: ReloadPhase,
    current: Option<LoadedModule>,
    generation: u64,
}

impl HotReloadCoordinator {
    /// Create a coordinator with no module loaded
    pub fn new(loader: Box<dyn ModuleLoader>, config: ReloadConfig) -> Self {
        Self {
            loader,
            config,
            phase: ReloadPhase::Idle,
            current: None,
            generation: 0,
        }
    }

    /// Current phase; `Idle` between reloads
    pub fn phase(&self) -> ReloadPhase {
        self.phase
    }

    /// Metadata of the loaded module
    pub fn module_info(&self) -> Option<&ModuleInfo> {
        self.current.as_ref().map(|m| &m.info)
    }

    /// Whether a module is loaded
    pub fn is_loaded(&self) -> bool {
        self.current.is_some()
    }

    /// Number of load attempts so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &ReloadConfig {
        &self.config
    }

    fn enter(&mut self, phase: ReloadPhase, report: &mut ReloadReport) {
        log::debug!("Reload phase: {} -> {}", self.phase, phase);
        self.phase = phase;
        report.phases.push(phase);
    }

    /// Replace the loaded module with the one at `path`
    ///
    /// Never fails outright: a load failure leaves no module loaded, drops
    /// the snapshot and is reported through the log and the returned report.
    pub fn reload(
        &mut self,
        path: &Path,
        classes: &mut ClassRegistry,
        instances: &mut InstanceRegistry,
        bindings: &EngineBindings,
    ) -> ReloadReport {
        let mut report = ReloadReport::default();

        self.enter(ReloadPhase::Snapshotting, &mut report);
        let snapshot = if self.current.is_some() && self.config.preserve_state {
            ReloadSnapshot::capture(instances)
        } else {
            ReloadSnapshot::default()
        };
        report.snapshot_len = snapshot.len();

        self.enter(ReloadPhase::Unloading, &mut report);
        report.previous_reclaimed = self.unload(classes, instances);

        self.enter(ReloadPhase::Loading, &mut report);
        self.generation += 1;
        let request = LoadRequest {
            path: path.to_path_buf(),
            debug_symbols: find_debug_symbols(path, &self.config.debug_symbol_extensions),
            generation: self.generation,
        };

        let module = match self.loader.load(&request) {
            Ok(module) => module,
            Err(e) => {
                log::error!("Failed to load script module {}: {}", path.display(), e);
                if !snapshot.is_empty() {
                    log::warn!("Discarding saved state of {} entities", snapshot.len());
                }
                report.dropped = snapshot.iter().map(|(entity, _)| entity).collect();
                report.error = Some(e);
                self.enter(ReloadPhase::Idle, &mut report);
                return report;
            }
        };

        let info = module.info.clone();
        let context = module.context().clone();
        let registered = classes.register(module);
        log::info!(
            "Loaded script module '{}' from {} ({} classes{})",
            info.name,
            path.display(),
            registered,
            if info.debug_symbols.is_some() { ", with debug symbols" } else { "" }
        );
        self.current = Some(LoadedModule { info: info.clone(), context });
        report.module = Some(info);

        self.enter(ReloadPhase::Restoring, &mut report);
        self.restore(&snapshot, classes, instances, bindings, &mut report);

        self.enter(ReloadPhase::Idle, &mut report);
        report
    }

    /// Drop registries and mark the current module unloaded
    ///
    /// Returns whether the old module was reclaimed before the timeout, or
    /// `None` when nothing was loaded.
    fn unload(&mut self, classes: &mut ClassRegistry, instances: &mut InstanceRegistry) -> Option<bool> {
        instances.clear_all();
        classes.clear();

        let previous = self.current.take()?;
        previous.context.mark_unloaded();
        log::info!("Unloaded script module '{}'", previous.info.name);

        let weak = Arc::downgrade(&previous.context);
        drop(previous);
        Some(wait_for_reclaim(&weak, self.config.reclaim_timeout()))
    }

    fn restore(
        &mut self,
        snapshot: &ReloadSnapshot,
        classes: &ClassRegistry,
        instances: &mut InstanceRegistry,
        bindings: &EngineBindings,
        report: &mut ReloadReport,
    ) {
        for (entity, entry) in snapshot.iter() {
            if !classes.contains(&entry.class_name) {
                log::warn!(
                    "Class '{}' no longer exists; dropping state of entity {}",
                    entry.class_name,
                    entity
                );
                report.dropped.push(entity);
                continue;
            }

            match instances.create(classes, entity, &entry.class_name, bindings) {
                Ok(instance) => {
                    let failures = reflection::deserialize(&mut instance.lock(), &entry.document);
                    report.field_failures += failures.len();
                    report.restored.push(entity);
                }
                Err(e) => {
                    log::warn!("Could not restore entity {}: {}", entity, e);
                    report.dropped.push(entity);
                }
            }
        }

        log::info!(
            "Restored {} of {} entities after reload",
            report.restored.len(),
            snapshot.len()
        );
    }
}

/// Best-effort wait for the last strong reference to go away
fn wait_for_reclaim(module: &Weak<ModuleContext>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = module.strong_count();
        if remaining == 0 {
            return true;
        }
        if Instant::now() >= deadline {
            log::debug!("Previous module still referenced {} times; continuing", remaining);
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassBuilder, ScriptObject};
    use crate::loader::StaticModuleLoader;
    use crate::module::ModuleBuilder;

    #[derive(Default)]
    struct Crate {
        durability: i32,
    }

    impl ScriptObject for Crate {}

    fn crates_v1(module: &mut ModuleBuilder) {
        module.class(
            ClassBuilder::new("Props.Crate", Crate::default)
                .field("durability", |c| &c.durability, |c| &mut c.durability),
        );
    }

    fn empty(_: &mut ModuleBuilder) {}

    fn coordinator(loader: &StaticModuleLoader) -> HotReloadCoordinator {
        let config = ReloadConfig { reclaim_timeout_ms: 0, ..ReloadConfig::default() };
        HotReloadCoordinator::new(Box::new(loader.clone()), config)
    }

    #[test]
    fn test_first_load_has_empty_snapshot() {
        let loader = StaticModuleLoader::new();
        loader.insert("Props.dll", crates_v1);
        let mut coordinator = coordinator(&loader);
        let (mut classes, mut instances) = (ClassRegistry::new(), InstanceRegistry::new());

        let report = coordinator.reload(Path::new("Props.dll"), &mut classes, &mut instances, &EngineBindings::empty());

        assert!(report.is_loaded());
        assert_eq!(report.snapshot_len, 0);
        assert_eq!(report.previous_reclaimed, None);
        assert_eq!(
            report.phases,
            [
                ReloadPhase::Snapshotting,
                ReloadPhase::Unloading,
                ReloadPhase::Loading,
                ReloadPhase::Restoring,
                ReloadPhase::Idle
            ]
        );
        assert_eq!(coordinator.phase(), ReloadPhase::Idle);
        assert!(classes.contains("Crate"));
    }

    #[test]
    fn test_failed_load_skips_restore() {
        let loader = StaticModuleLoader::new();
        loader.insert("Props.dll", crates_v1);
        let mut coordinator = coordinator(&loader);
        let (mut classes, mut instances) = (ClassRegistry::new(), InstanceRegistry::new());
        let bindings = EngineBindings::empty();

        coordinator.reload(Path::new("Props.dll"), &mut classes, &mut instances, &bindings);
        instances
            .create(&classes, EntityId::new(1).unwrap(), "Crate", &bindings)
            .unwrap();

        let report = coordinator.reload(Path::new("Missing.dll"), &mut classes, &mut instances, &bindings);

        assert!(!report.is_loaded());
        assert!(matches!(report.error, Some(ScriptError::LoadFailed { .. })));
        assert_eq!(report.dropped, [EntityId::new(1).unwrap()]);
        assert_eq!(
            report.phases,
            [ReloadPhase::Snapshotting, ReloadPhase::Unloading, ReloadPhase::Loading, ReloadPhase::Idle]
        );
        assert!(!coordinator.is_loaded());
        assert!(classes.is_empty());
        assert!(instances.is_empty());
    }

    #[test]
    fn test_reload_marks_old_module_unloaded() {
        let loader = StaticModuleLoader::new();
        loader.insert("Props.dll", crates_v1);
        let mut coordinator = coordinator(&loader);
        let (mut classes, mut instances) = (ClassRegistry::new(), InstanceRegistry::new());
        let bindings = EngineBindings::empty();

        coordinator.reload(Path::new("Props.dll"), &mut classes, &mut instances, &bindings);
        let old = instances
            .create(&classes, EntityId::new(2).unwrap(), "Crate", &bindings)
            .unwrap();

        let report = coordinator.reload(Path::new("Props.dll"), &mut classes, &mut instances, &bindings);

        // `old` still pins the previous module
        assert_eq!(report.previous_reclaimed, Some(false));
        assert!(old.lock().is_orphaned());
        let fresh = instances.get(EntityId::new(2).unwrap()).unwrap();
        assert!(!fresh.lock().is_orphaned());
        assert_eq!(coordinator.generation(), 2);
    }

    #[test]
    fn test_preserve_state_disabled() {
        let loader = StaticModuleLoader::new();
        loader.insert("Props.dll", crates_v1);
        let config = ReloadConfig { preserve_state: false, reclaim_timeout_ms: 0, ..ReloadConfig::default() };
        let mut coordinator = HotReloadCoordinator::new(Box::new(loader.clone()), config);
        let (mut classes, mut instances) = (ClassRegistry::new(), InstanceRegistry::new());
        let bindings = EngineBindings::empty();

        coordinator.reload(Path::new("Props.dll"), &mut classes, &mut instances, &bindings);
        instances
            .create(&classes, EntityId::new(1).unwrap(), "Crate", &bindings)
            .unwrap();

        let report = coordinator.reload(Path::new("Props.dll"), &mut classes, &mut instances, &bindings);
        assert_eq!(report.snapshot_len, 0);
        assert!(instances.is_empty());
    }

    #[test]
    fn test_removed_class_is_dropped() {
        let loader = StaticModuleLoader::new();
        loader.insert("Props.dll", crates_v1);
        let mut coordinator = coordinator(&loader);
        let (mut classes, mut instances) = (ClassRegistry::new(), InstanceRegistry::new());
        let bindings = EngineBindings::empty();

        coordinator.reload(Path::new("Props.dll"), &mut classes, &mut instances, &bindings);
        instances
            .create(&classes, EntityId::new(9).unwrap(), "Crate", &bindings)
            .unwrap();

        loader.insert("Props.dll", empty);
        let report = coordinator.reload(Path::new("Props.dll"), &mut classes, &mut instances, &bindings);

        assert!(report.is_loaded());
        assert_eq!(report.snapshot_len, 1);
        assert_eq!(report.dropped, [EntityId::new(9).unwrap()]);
        assert!(instances.is_empty());
    }

    #[test]
    fn test_wait_for_reclaim() {
        let context = ModuleContext::detached("Gone");
        let weak = Arc::downgrade(&context);
        let pinned = context.clone();
        drop(context);

        assert!(!wait_for_reclaim(&weak, Duration::ZERO));
        drop(pinned);
        assert!(wait_for_reclaim(&weak, Duration::ZERO));
    }
}
