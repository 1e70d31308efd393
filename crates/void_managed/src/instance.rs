//! Script instances and the entity-keyed instance registry

use crate::bindings::EngineBindings;
use crate::class::{run_isolated, HookResult, ScriptClass, ScriptContext, ScriptObject};
use crate::error::{Result, ScriptError};
use crate::registry::ClassRegistry;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use void_core::EntityId;

/// One live script object bound to one entity
pub struct ScriptInstance {
    entity: EntityId,
    object: Box<dyn ScriptObject>,
    // After `object`: the class keeps the object's code mapped.
    class: Arc<ScriptClass>,
}

impl ScriptInstance {
    /// Entity this instance represents
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// Runtime class
    pub fn class(&self) -> &Arc<ScriptClass> {
        &self.class
    }

    /// The user object
    pub fn object(&self) -> &dyn ScriptObject {
        self.object.as_ref()
    }

    /// The user object, mutably
    pub fn object_mut(&mut self) -> &mut dyn ScriptObject {
        self.object.as_mut()
    }

    /// Whether the module that defined this instance's class was unloaded
    pub fn is_orphaned(&self) -> bool {
        self.class.module().is_unloaded()
    }

    fn run_hook(
        &mut self,
        hook: &'static str,
        bindings: &EngineBindings,
        f: impl FnOnce(&mut dyn ScriptObject, &mut ScriptContext<'_>) -> HookResult,
    ) -> Result<()> {
        let entity = self.entity;
        let object = self.object.as_mut();
        let mut ctx = ScriptContext::new(entity, bindings);

        let message = match run_isolated(|| f(object, &mut ctx)) {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("panicked: {}", panic),
        };

        log::error!("{} failed for entity {} ({}): {}", hook, entity, self.class.full_name(), message);
        Err(ScriptError::HookFailed { hook, entity, message })
    }
}

impl fmt::Debug for ScriptInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptInstance")
            .field("entity", &self.entity)
            .field("class", &self.class.full_name())
            .finish()
    }
}

/// Instance shared between the entity map and outstanding handles
pub type SharedInstance = Arc<Mutex<ScriptInstance>>;

/// Live instances keyed by entity identifier
#[derive(Default)]
pub struct InstanceRegistry {
    instances: HashMap<EntityId, SharedInstance>,
}

impl InstanceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiate `class_name` for `entity` and run its creation hook
    ///
    /// Replaces any instance already registered for `entity`. A failing
    /// creation hook is logged; the instance still counts as created.
    pub fn create(
        &mut self,
        classes: &ClassRegistry,
        entity: EntityId,
        class_name: &str,
        bindings: &EngineBindings,
    ) -> Result<SharedInstance> {
        let class = classes
            .lookup(class_name)
            .ok_or_else(|| ScriptError::ClassNotFound(class_name.to_string()))?;

        let object = class.construct().map_err(|message| ScriptError::InstantiationFailed {
            class_name: class.full_name().to_string(),
            entity,
            message,
        })?;

        let mut instance = ScriptInstance { entity, object, class };
        if instance.class.lifecycle().on_create {
            // Already logged; creation stands.
            let _ = instance.run_hook("on_create", bindings, |object, ctx| object.on_create(ctx));
        }

        let shared = Arc::new(Mutex::new(instance));
        if self.instances.insert(entity, shared.clone()).is_some() {
            log::debug!("Replaced script instance for entity {}", entity);
        }
        log::debug!("Created '{}' for entity {}", class_name, entity);
        Ok(shared)
    }

    /// Run the update hook of the instance registered for `entity`
    ///
    /// No instance is a silent no-op. A failing hook is logged and returned.
    pub fn update(&self, entity: EntityId, delta_time: f32, bindings: &EngineBindings) -> Result<()> {
        match self.instances.get(&entity) {
            Some(instance) => Self::dispatch_update(instance, delta_time, bindings),
            None => Ok(()),
        }
    }

    /// Run every update hook; returns how many failed
    pub fn update_all(&self, delta_time: f32, bindings: &EngineBindings) -> usize {
        self.instances
            .values()
            .filter(|instance| Self::dispatch_update(instance, delta_time, bindings).is_err())
            .count()
    }

    fn dispatch_update(instance: &SharedInstance, delta_time: f32, bindings: &EngineBindings) -> Result<()> {
        let mut instance = instance.lock();
        if !instance.class.lifecycle().on_update {
            return Ok(());
        }
        instance.run_hook("on_update", bindings, |object, ctx| object.on_update(ctx, delta_time))
    }

    /// Instance registered for `entity`
    pub fn get(&self, entity: EntityId) -> Option<&SharedInstance> {
        self.instances.get(&entity)
    }

    /// Whether an instance is registered for `entity`
    pub fn contains(&self, entity: EntityId) -> bool {
        self.instances.contains_key(&entity)
    }

    /// Unregister `entity`; outstanding handles keep the instance alive
    pub fn remove(&mut self, entity: EntityId) -> Option<SharedInstance> {
        self.instances.remove(&entity)
    }

    /// Iterate over registered instances
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &SharedInstance)> {
        self.instances.iter().map(|(id, instance)| (*id, instance))
    }

    /// Number of registered instances
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether no instance is registered
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Drop every entry without running any hook
    pub fn clear_all(&mut self) {
        self.instances.clear();
    }
}
