//! Script runtime
//!
//! [`ScriptRuntime`] owns every registry and the reload coordinator. The
//! host creates one, installs its engine bindings, loads a module and then
//! drives it from the main thread:
//!
//! ```ignore
//! let mut runtime = ScriptRuntime::new(DynamicLibraryLoader::new());
//! runtime.set_bindings(bindings);
//! runtime.load_module("scripts/libgame.so");
//!
//! let player = EntityId::new(7).unwrap();
//! let handle = runtime.create_instance(player, "Player");
//! runtime.update_entity(player, 0.016);
//! let health = runtime.get_int(handle, "health");
//! ```

use crate::bindings::EngineBindings;
use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::handles::{HandleTable, InstanceHandle};
use crate::hot_reload::{HotReloadCoordinator, ReloadPhase, ReloadReport};
use crate::instance::InstanceRegistry;
use crate::loader::ModuleLoader;
use crate::module::ModuleInfo;
use crate::reflection::{self, FieldDocument, ReflectionBridge};
use crate::registry::ClassRegistry;
use crate::value::ScriptField;
use glam::{Vec2, Vec3, Vec4};
use std::path::Path;
use void_core::EntityId;

#[cfg(feature = "hot-reload")]
use crate::watcher::ModuleWatcher;

macro_rules! typed_field_access {
    ($($get:ident, $set:ident => $ty:ty;)*) => {
        $(
            #[doc = concat!("Read a `", stringify!($ty), "` field; `None` on any failure")]
            pub fn $get(&self, handle: InstanceHandle, field: &str) -> Option<$ty> {
                self.get_field::<$ty>(handle, field).ok()
            }

            #[doc = concat!("Write a `", stringify!($ty), "` field; returns whether it was written")]
            pub fn $set(&self, handle: InstanceHandle, field: &str, value: $ty) -> bool {
                self.set_field(handle, field, value).is_ok()
            }
        )*
    };
}

/// Owned scripting context: registries, handles and the reload coordinator
pub struct ScriptRuntime {
    config: RuntimeConfig,
    classes: ClassRegistry,
    instances: InstanceRegistry,
    handles: HandleTable,
    coordinator: HotReloadCoordinator,
    bindings: EngineBindings,
    #[cfg(feature = "hot-reload")]
    watcher: ModuleWatcher,
}

impl ScriptRuntime {
    /// Create a runtime with the default configuration
    pub fn new(loader: impl ModuleLoader + 'static) -> Self {
        let config = RuntimeConfig::default();
        Self {
            classes: ClassRegistry::new(),
            instances: InstanceRegistry::new(),
            handles: HandleTable::new(),
            coordinator: HotReloadCoordinator::new(Box::new(loader), config.reload.clone()),
            bindings: EngineBindings::empty(),
            #[cfg(feature = "hot-reload")]
            watcher: ModuleWatcher::disabled(),
            config,
        }
    }

    /// Create a runtime with an explicit configuration
    pub fn with_config(loader: impl ModuleLoader + 'static, config: RuntimeConfig) -> Result<Self> {
        Ok(Self {
            classes: ClassRegistry::new(),
            instances: InstanceRegistry::new(),
            handles: HandleTable::new(),
            coordinator: HotReloadCoordinator::new(Box::new(loader), config.reload.clone()),
            bindings: EngineBindings::empty(),
            #[cfg(feature = "hot-reload")]
            watcher: ModuleWatcher::new(&config.watch)?,
            config,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Install the engine call table hooks see through their context
    pub fn set_bindings(&mut self, bindings: EngineBindings) {
        self.bindings = bindings;
    }

    pub fn bindings(&self) -> &EngineBindings {
        &self.bindings
    }

    // ========== Module Management ==========

    /// Load or replace the script module
    ///
    /// Live entities are carried over when state preservation is enabled.
    /// Failures are logged and leave no module loaded.
    pub fn load_module(&mut self, path: impl AsRef<Path>) -> ReloadReport {
        let path = path.as_ref();
        let report = self
            .coordinator
            .reload(path, &mut self.classes, &mut self.instances, &self.bindings);

        if report.is_loaded() {
            self.watch_module(path);
        }
        report
    }

    #[cfg(feature = "hot-reload")]
    fn watch_module(&mut self, path: &Path) {
        if let Err(e) = self.watcher.watch(path) {
            log::warn!("Hot-reload disabled for {}: {}", path.display(), e);
        }
    }

    #[cfg(not(feature = "hot-reload"))]
    fn watch_module(&mut self, _path: &Path) {}

    /// Reload the module if its file changed; call once per frame
    #[cfg(feature = "hot-reload")]
    pub fn poll_reload(&mut self) -> Option<ReloadReport> {
        let path = self.watcher.poll()?;
        log::info!("Script module changed, reloading: {}", path.display());
        Some(self.load_module(path))
    }

    /// Metadata of the loaded module
    pub fn module_info(&self) -> Option<&ModuleInfo> {
        self.coordinator.module_info()
    }

    /// Current reload phase
    pub fn reload_phase(&self) -> ReloadPhase {
        self.coordinator.phase()
    }

    /// Whether `name` is a registered class (full or short name)
    pub fn class_exists(&self, name: &str) -> bool {
        self.classes.contains(name)
    }

    /// Fully-qualified names of the registered classes
    pub fn class_names(&self) -> &[String] {
        self.classes.class_names()
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    pub fn instances(&self) -> &InstanceRegistry {
        &self.instances
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    // ========== Entities ==========

    /// Create an instance for `entity` and hand out a handle to it
    ///
    /// The instance is also registered for update dispatch. Returns the
    /// null handle if the class is unknown or cannot be constructed.
    pub fn create_instance(&mut self, entity: EntityId, class_name: &str) -> InstanceHandle {
        match self.instances.create(&self.classes, entity, class_name, &self.bindings) {
            Ok(instance) => self.handles.allocate(instance),
            Err(e) => {
                log::error!("Could not create script instance for entity {}: {}", entity, e);
                InstanceHandle::null()
            }
        }
    }

    /// Create an instance for `entity` and apply editor-configured fields
    ///
    /// Fields that cannot be applied are logged and skipped.
    pub fn spawn_entity(&mut self, entity: EntityId, class_name: &str, fields: &FieldDocument) -> Result<()> {
        let instance = self.instances.create(&self.classes, entity, class_name, &self.bindings)?;
        if !fields.is_empty() {
            let skipped = reflection::deserialize(&mut instance.lock(), fields);
            if !skipped.is_empty() {
                log::warn!("Entity {}: {} initial fields skipped", entity, skipped.len());
            }
        }
        Ok(())
    }

    /// Unregister `entity`; handles to its instance stay valid
    pub fn destroy_entity(&mut self, entity: EntityId) -> bool {
        self.instances.remove(entity).is_some()
    }

    /// Hand out a new handle to the instance registered for `entity`
    pub fn instance_handle(&mut self, entity: EntityId) -> Option<InstanceHandle> {
        let instance = self.instances.get(entity)?.clone();
        Some(self.handles.allocate(instance))
    }

    /// Release a handle; null and released handles are ignored
    pub fn release_handle(&mut self, handle: InstanceHandle) {
        self.handles.release(handle);
    }

    /// Dispatch the update hook of one entity; unknown entities are ignored
    pub fn update_entity(&self, entity: EntityId, delta_time: f32) {
        // Hook failures are logged by the registry
        let _ = self.instances.update(entity, delta_time, &self.bindings);
    }

    /// Dispatch every update hook
    pub fn update_all(&self, delta_time: f32) {
        let failed = self.instances.update_all(delta_time, &self.bindings);
        if failed > 0 {
            log::debug!("{} update hooks failed this frame", failed);
        }
    }

    /// Release every handle and drop every instance without teardown hooks
    pub fn stop(&mut self) {
        let released = self.handles.release_all();
        let dropped = self.instances.len();
        self.instances.clear_all();
        log::info!("Script runtime stopped ({} instances, {} handles)", dropped, released);
    }

    // ========== Reflection ==========

    /// Field access through handles
    pub fn bridge(&self) -> ReflectionBridge<'_> {
        ReflectionBridge::new(&self.handles)
    }

    /// `name:Type` pairs joined with `;`, or empty for an invalid handle
    pub fn list_fields(&self, handle: InstanceHandle) -> String {
        match self.bridge().list_fields(handle) {
            Ok(fields) => fields
                .iter()
                .map(|(name, ty)| format!("{}:{}", name, ty))
                .collect::<Vec<_>>()
                .join(";"),
            Err(e) => {
                log::debug!("list_fields: {}", e);
                String::new()
            }
        }
    }

    /// Typed read by field name
    pub fn get_field<T: ScriptField>(&self, handle: InstanceHandle, field: &str) -> Result<T> {
        self.bridge().get_field(handle, field)
    }

    /// Typed write by field name
    pub fn set_field<T: ScriptField>(&self, handle: InstanceHandle, field: &str, value: T) -> Result<()> {
        self.bridge().set_field(handle, field, value).map_err(|e| {
            log::debug!("set_field '{}': {}", field, e);
            e
        })
    }

    typed_field_access! {
        get_float, set_float => f32;
        get_int, set_int => i32;
        get_bool, set_bool => bool;
        get_vec2, set_vec2 => Vec2;
        get_vec3, set_vec3 => Vec3;
        get_vec4, set_vec4 => Vec4;
    }

    /// Flat JSON document of every public field
    pub fn serialize(&self, handle: InstanceHandle) -> Option<String> {
        match self.bridge().serialize(handle) {
            Ok(document) => Some(document.to_json()),
            Err(e) => {
                log::warn!("Could not serialize handle {:#x}: {}", handle.to_bits(), e);
                None
            }
        }
    }

    /// Apply a flat JSON document; returns how many fields were skipped
    pub fn deserialize(&self, handle: InstanceHandle, document: &str) -> Result<usize> {
        let document = FieldDocument::from_json(document)?;
        let skipped = self.bridge().deserialize(handle, &document)?;
        Ok(skipped.len())
    }
}
