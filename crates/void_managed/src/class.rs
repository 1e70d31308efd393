//! Script class descriptors
//!
//! A [`ScriptClass`] is everything the runtime knows about one instantiable
//! script type: its names, its lifecycle capabilities, a constructor, and a
//! field descriptor table. The table is built once when the module is
//! scanned, so reflection by name is a map lookup plus a typed accessor
//! call instead of per-call introspection.

use crate::bindings::{Engine, EngineBindings};
use crate::error::{Result, ScriptError};
use crate::module::ModuleContext;
use crate::value::{FieldType, FieldValue, ScriptField};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use void_core::EntityId;

/// Error type user hooks may return
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a lifecycle hook
pub type HookResult = std::result::Result<(), HookError>;

/// Object-safe access to `Any` for script objects
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// User-authored script behaviour
///
/// Implementors are plain structs; their public data is exposed through the
/// field table declared with [`ClassBuilder::field`]. Both hooks run inside
/// an isolated failure boundary: returning an error or panicking is logged
/// and never reaches sibling entities or the host.
pub trait ScriptObject: AsAny + Send {
    /// Called once after construction, before any restored state is applied
    fn on_create(&mut self, _ctx: &mut ScriptContext<'_>) -> HookResult {
        Ok(())
    }

    /// Called once per frame
    fn on_update(&mut self, _ctx: &mut ScriptContext<'_>, _delta_time: f32) -> HookResult {
        Ok(())
    }
}

/// What a hook can see of the outside world
pub struct ScriptContext<'a> {
    entity: EntityId,
    bindings: &'a EngineBindings,
}

impl<'a> ScriptContext<'a> {
    pub(crate) fn new(entity: EntityId, bindings: &'a EngineBindings) -> Self {
        Self { entity, bindings }
    }

    /// Entity this script instance is bound to
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// Engine calls (transform, input, physics, tilemap)
    pub fn engine(&self) -> Engine<'a> {
        Engine::new(self.bindings)
    }
}

/// Lifecycle hooks a class implements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    pub on_create: bool,
    pub on_update: bool,
}

impl Lifecycle {
    pub const NONE: Lifecycle = Lifecycle { on_create: false, on_update: false };
    pub const ALL: Lifecycle = Lifecycle { on_create: true, on_update: true };
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::ALL
    }
}

type Getter = Box<dyn Fn(&dyn Any) -> Option<FieldValue> + Send + Sync>;
type Setter = Box<dyn Fn(&mut dyn Any, FieldValue) -> bool + Send + Sync>;
type Constructor = Box<dyn Fn() -> Box<dyn ScriptObject> + Send + Sync>;

/// One public data field of a script class
pub struct FieldDescriptor {
    name: String,
    field_type: FieldType,
    getter: Getter,
    setter: Setter,
}

impl FieldDescriptor {
    fn new<C, T>(name: &str, get: fn(&C) -> &T, get_mut: fn(&mut C) -> &mut T) -> Self
    where
        C: ScriptObject,
        T: ScriptField,
    {
        Self {
            name: name.to_string(),
            field_type: T::TYPE,
            getter: Box::new(move |object| object.downcast_ref::<C>().map(|c| get(c).to_value())),
            setter: Box::new(move |object, value| {
                match (object.downcast_mut::<C>(), T::from_value(value)) {
                    (Some(c), Some(v)) => {
                        *get_mut(c) = v;
                        true
                    }
                    _ => false,
                }
            }),
        }
    }

    /// Field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Read the field from an object of the owning class
    pub fn get(&self, object: &dyn ScriptObject) -> Option<FieldValue> {
        (self.getter)(AsAny::as_any(object))
    }

    /// Write the field; rejects values whose tag differs from the declared type
    pub fn set(&self, object: &mut dyn ScriptObject, value: FieldValue) -> bool {
        value.field_type() == self.field_type && (self.setter)(AsAny::as_any_mut(object), value)
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.field_type)
    }
}

/// A named, instantiable type discovered in a loaded module
pub struct ScriptClass {
    full_name: String,
    short_name: String,
    lifecycle: Lifecycle,
    fields: Vec<FieldDescriptor>,
    field_index: HashMap<String, usize>,
    constructor: Constructor,
    // Declared last: the module (and any library it maps) must outlive the
    // accessor and constructor code above when the class is dropped.
    module: Arc<ModuleContext>,
}

impl ScriptClass {
    /// Fully-qualified name (`Game.Player`)
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Name after the last namespace separator (`Player`)
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// Hooks this class implements
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Public fields in declaration order
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Look up a field by exact name
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.field_index.get(name).map(|&i| &self.fields[i])
    }

    /// Module this class was discovered in
    pub fn module(&self) -> &Arc<ModuleContext> {
        &self.module
    }

    /// Construct a default instance inside a failure boundary
    pub(crate) fn construct(&self) -> std::result::Result<Box<dyn ScriptObject>, String> {
        run_isolated(|| (self.constructor)())
    }
}

impl fmt::Debug for ScriptClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptClass")
            .field("full_name", &self.full_name)
            .field("lifecycle", &self.lifecycle)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Short name of a fully-qualified type name
pub fn short_name_of(full_name: &str) -> &str {
    let after_dot = full_name.rsplit('.').next().unwrap_or(full_name);
    after_dot.rsplit("::").next().unwrap_or(after_dot)
}

/// Declares a script class and its field table
///
/// ```ignore
/// ClassBuilder::new("Game.Player", Player::default)
///     .field("health", |p| &p.health, |p| &mut p.health)
///     .field("speed", |p| &p.speed, |p| &mut p.speed)
/// ```
pub struct ClassBuilder<C: ScriptObject> {
    full_name: String,
    lifecycle: Lifecycle,
    fields: Vec<FieldDescriptor>,
    constructor: fn() -> C,
}

impl<C: ScriptObject> ClassBuilder<C> {
    /// Start describing a class
    pub fn new(full_name: impl Into<String>, constructor: fn() -> C) -> Self {
        Self {
            full_name: full_name.into(),
            lifecycle: Lifecycle::ALL,
            fields: Vec::new(),
            constructor,
        }
    }

    /// Fully-qualified name being declared
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Declare a public field
    pub fn field<T: ScriptField>(
        mut self,
        name: &str,
        get: fn(&C) -> &T,
        get_mut: fn(&mut C) -> &mut T,
    ) -> Self {
        self.fields.push(FieldDescriptor::new(name, get, get_mut));
        self
    }

    /// Restrict which lifecycle hooks the runtime dispatches
    pub fn lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Validate and freeze the descriptor
    pub(crate) fn build(self, module: Arc<ModuleContext>) -> Result<ScriptClass> {
        let introspection = |message: String| ScriptError::Introspection {
            type_name: self.full_name.clone(),
            message,
        };

        let short_name = short_name_of(&self.full_name).to_string();
        if self.full_name.is_empty() || short_name.is_empty() {
            return Err(introspection("empty type name".into()));
        }

        let mut field_index = HashMap::with_capacity(self.fields.len());
        for (i, field) in self.fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(introspection(format!("field #{} has no name", i)));
            }
            if field_index.insert(field.name.clone(), i).is_some() {
                return Err(introspection(format!("duplicate field '{}'", field.name)));
            }
        }

        let constructor = self.constructor;
        Ok(ScriptClass {
            full_name: self.full_name,
            short_name,
            lifecycle: self.lifecycle,
            fields: self.fields,
            field_index,
            constructor: Box::new(move || Box::new(constructor()) as Box<dyn ScriptObject>),
            module,
        })
    }
}

/// Run user code, turning a panic into an error message
pub(crate) fn run_isolated<R>(f: impl FnOnce() -> R) -> std::result::Result<R, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with non-string payload".to_string()
        }
    })
}
