//! # void_managed - Managed Script Runtime
//!
//! Owns user-script objects bound to engine entities, exposes them to native
//! code through opaque handles, and swaps the compiled script module at
//! runtime without restarting the engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │  Script module  │────▶│  ModuleLoader   │  libloading / static
//! │ (libgame.so)    │     │                 │
//! └─────────────────┘     └────────┬────────┘
//!                                  │ ScriptModule
//!                                  ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ HotReload       │────▶│  ClassRegistry  │  full + short names
//! │ Coordinator     │     └────────┬────────┘
//! └────────┬────────┘              │ ScriptClass
//!          │ snapshot/restore      ▼
//!          │              ┌─────────────────┐     ┌─────────────────┐
//!          └─────────────▶│InstanceRegistry │◀───▶│   HandleTable   │
//!                         │ (by EntityId)   │     │ (opaque u64)    │
//!                         └────────┬────────┘     └────────┬────────┘
//!                                  │                       │
//!                                  ▼                       ▼
//!                         ┌───────────────────────────────────────┐
//!                         │  ReflectionBridge (typed get/set,     │
//!                         │  flat JSON serialize/deserialize)     │
//!                         └───────────────────────────────────────┘
//! ```
//!
//! ## Script Side
//!
//! ```ignore
//! use void_managed::prelude::*;
//!
//! #[derive(Default)]
//! struct Player {
//!     health: i32,
//!     speed: f32,
//!     target: Option<EntityId>,
//! }
//!
//! impl ScriptObject for Player {
//!     fn on_update(&mut self, ctx: &mut ScriptContext<'_>, dt: f32) -> HookResult {
//!         if ctx.engine().is_key_down(KEY_SPACE) == Some(true) {
//!             ctx.engine().apply_linear_impulse_to_center(ctx.entity(), Vec2::Y * self.speed * dt, true);
//!         }
//!         Ok(())
//!     }
//! }
//!
//! fn register(module: &mut ModuleBuilder) {
//!     module.class(
//!         ClassBuilder::new("Game.Player", Player::default)
//!             .field("health", |p| &p.health, |p| &mut p.health)
//!             .field("speed", |p| &p.speed, |p| &mut p.speed)
//!             .field("target", |p| &p.target, |p| &mut p.target),
//!     );
//! }
//!
//! void_managed::export_script_module!(register);
//! ```
//!
//! ## Host Side
//!
//! ```ignore
//! let mut runtime = ScriptRuntime::new(DynamicLibraryLoader::new());
//! runtime.load_module("libgame.so");
//! let handle = runtime.create_instance(EntityId::new(7).unwrap(), "Player");
//! runtime.update_all(0.016);
//! let state = runtime.serialize(handle);
//! ```

pub mod bindings;
pub mod class;
pub mod config;
pub mod error;
pub mod ffi;
pub mod handles;
pub mod hot_reload;
pub mod instance;
pub mod loader;
pub mod module;
pub mod reflection;
pub mod registry;
pub mod runtime;
pub mod value;
#[cfg(feature = "hot-reload")]
pub mod watcher;

pub use bindings::{Engine, EngineBindings, RaycastHit};
pub use class::{ClassBuilder, FieldDescriptor, HookError, HookResult, Lifecycle, ScriptClass, ScriptContext, ScriptObject};
pub use config::{ReloadConfig, RuntimeConfig, WatchConfig};
pub use error::{Result, ScriptError};
pub use handles::{HandleTable, InstanceHandle};
pub use hot_reload::{HotReloadCoordinator, ReloadPhase, ReloadReport, ReloadSnapshot};
pub use instance::{InstanceRegistry, ScriptInstance, SharedInstance};
pub use loader::{DynamicLibraryLoader, LoadRequest, ModuleLoader, StaticModuleLoader, MODULE_API_VERSION};
pub use module::{ModuleBuilder, ModuleContext, ModuleInfo, ScriptModule};
pub use reflection::{FieldDocument, ReflectionBridge};
pub use registry::ClassRegistry;
pub use runtime::ScriptRuntime;
pub use value::{FieldType, FieldValue, ScriptField};
#[cfg(feature = "hot-reload")]
pub use watcher::ModuleWatcher;

pub use void_core::{EntityId, Version};

/// Prelude for script modules and hosts
pub mod prelude {
    pub use crate::bindings::Engine;
    pub use crate::class::{ClassBuilder, HookResult, Lifecycle, ScriptContext, ScriptObject};
    pub use crate::module::ModuleBuilder;
    pub use crate::runtime::ScriptRuntime;
    pub use crate::value::{FieldType, FieldValue};
    pub use glam::{Vec2, Vec3, Vec4};
    pub use void_core::{EntityId, Version};
}
