//! Reflection bridge
//!
//! Typed field access and flat (de)serialization over any live instance,
//! driven by the class's field descriptor table. Access is exact: a field
//! declared `Int` can only be read or written as `i32`.
//!
//! A [`FieldDocument`] is a one-level JSON object mapping field names to
//! values. Vectors are arrays, entity references are their identifier
//! (`0` for none), everything else is a JSON scalar:
//!
//! ```json
//! {"health": 42, "speed": 3.5, "spawn": [0.0, 1.0, 0.0], "target": 7}
//! ```

use crate::error::{Result, ScriptError};
use crate::handles::{HandleTable, InstanceHandle};
use crate::instance::ScriptInstance;
use crate::value::{FieldType, FieldValue, ScriptField};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Flat field-name to value document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldDocument {
    values: BTreeMap<String, JsonValue>,
}

impl FieldDocument {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a document; anything but a JSON object is rejected
    pub fn from_json(text: &str) -> Result<Self> {
        let values: BTreeMap<String, JsonValue> = serde_json::from_str(text)?;
        Ok(Self { values })
    }

    /// Render as compact JSON
    pub fn to_json(&self) -> String {
        JsonValue::Object(self.values.iter().map(|(k, v)| (k.clone(), v.clone())).collect()).to_string()
    }

    /// Store a typed value
    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) {
        self.values.insert(field.into(), value.to_document());
    }

    /// Store a raw document value
    pub fn insert_raw(&mut self, field: impl Into<String>, value: JsonValue) {
        self.values.insert(field.into(), value);
    }

    /// Raw stored value
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.values.get(field)
    }

    /// Fields in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Public fields of an instance in declaration order
pub fn list_fields(instance: &ScriptInstance) -> Vec<(String, FieldType)> {
    instance
        .class()
        .fields()
        .iter()
        .map(|f| (f.name().to_string(), f.field_type()))
        .collect()
}

/// Read a field whose declared type must be `requested`
pub fn get_value(instance: &ScriptInstance, field: &str, requested: FieldType) -> Result<FieldValue> {
    let class = instance.class();
    let descriptor = class
        .field(field)
        .ok_or_else(|| ScriptError::field_not_found(class.full_name(), field))?;

    if descriptor.field_type() != requested {
        return Err(ScriptError::FieldTypeMismatch {
            field: field.to_string(),
            declared: descriptor.field_type(),
            requested,
        });
    }

    descriptor.get(instance.object()).ok_or_else(|| ScriptError::Introspection {
        type_name: class.full_name().to_string(),
        message: format!("accessor for '{}' does not match the instance", field),
    })
}

/// Write a field whose declared type must match the value's tag
///
/// Nothing is written on failure.
pub fn set_value(instance: &mut ScriptInstance, field: &str, value: FieldValue) -> Result<()> {
    let class = instance.class().clone();
    let descriptor = class
        .field(field)
        .ok_or_else(|| ScriptError::field_not_found(class.full_name(), field))?;

    if descriptor.field_type() != value.field_type() {
        return Err(ScriptError::FieldTypeMismatch {
            field: field.to_string(),
            declared: descriptor.field_type(),
            requested: value.field_type(),
        });
    }

    if descriptor.set(instance.object_mut(), value) {
        Ok(())
    } else {
        Err(ScriptError::Introspection {
            type_name: class.full_name().to_string(),
            message: format!("accessor for '{}' does not match the instance", field),
        })
    }
}

/// Typed read
pub fn get<T: ScriptField>(instance: &ScriptInstance, field: &str) -> Result<T> {
    let value = get_value(instance, field, T::TYPE)?;
    T::from_value(value).ok_or(ScriptError::FieldTypeMismatch {
        field: field.to_string(),
        declared: value.field_type(),
        requested: T::TYPE,
    })
}

/// Typed write
pub fn set<T: ScriptField>(instance: &mut ScriptInstance, field: &str, value: T) -> Result<()> {
    set_value(instance, field, value.to_value())
}

/// Capture every public field
pub fn serialize(instance: &ScriptInstance) -> Result<FieldDocument> {
    let mut document = FieldDocument::new();
    for descriptor in instance.class().fields() {
        let value = get_value(instance, descriptor.name(), descriptor.field_type())?;
        document.insert(descriptor.name(), value);
    }
    Ok(document)
}

/// Apply every field present in `document`
///
/// Each field is converted and assigned independently. Failures are
/// logged and returned; they never stop the remaining fields.
pub fn deserialize(instance: &mut ScriptInstance, document: &FieldDocument) -> Vec<ScriptError> {
    let mut failures = Vec::new();

    for (field, raw) in document.iter() {
        if let Err(e) = apply_field(instance, field, raw) {
            log::warn!("Entity {}: skipping field '{}': {}", instance.entity(), field, e);
            failures.push(e);
        }
    }

    failures
}

fn apply_field(instance: &mut ScriptInstance, field: &str, raw: &JsonValue) -> Result<()> {
    let class = instance.class();
    let expected = class
        .field(field)
        .map(|d| d.field_type())
        .ok_or_else(|| ScriptError::field_not_found(class.full_name(), field))?;

    let value = FieldValue::from_document(expected, raw).map_err(|e| ScriptError::SerializationField {
        field: field.to_string(),
        expected,
        message: e.to_string(),
    })?;

    set_value(instance, field, value)
}

/// Field access through handles
///
/// Every call resolves the handle first; an invalid handle is an
/// [`ScriptError::InvalidHandle`] (or [`ScriptError::OrphanedHandle`]) and
/// nothing is touched.
pub struct ReflectionBridge<'a> {
    handles: &'a HandleTable,
}

impl<'a> ReflectionBridge<'a> {
    pub fn new(handles: &'a HandleTable) -> Self {
        Self { handles }
    }

    /// Public fields of the instance behind `handle`
    pub fn list_fields(&self, handle: InstanceHandle) -> Result<Vec<(String, FieldType)>> {
        let instance = self.handles.resolve(handle)?;
        let guard = instance.lock();
        Ok(list_fields(&guard))
    }

    /// Typed read by field name
    pub fn get_field<T: ScriptField>(&self, handle: InstanceHandle, field: &str) -> Result<T> {
        let instance = self.handles.resolve(handle)?;
        let guard = instance.lock();
        get(&guard, field)
    }

    /// Typed write by field name
    pub fn set_field<T: ScriptField>(&self, handle: InstanceHandle, field: &str, value: T) -> Result<()> {
        let instance = self.handles.resolve(handle)?;
        let mut guard = instance.lock();
        set(&mut guard, field, value)
    }

    /// Capture the instance behind `handle`
    pub fn serialize(&self, handle: InstanceHandle) -> Result<FieldDocument> {
        let instance = self.handles.resolve(handle)?;
        let guard = instance.lock();
        serialize(&guard)
    }

    /// Apply `document` to the instance behind `handle`
    ///
    /// Returns the per-field failures that were skipped.
    pub fn deserialize(&self, handle: InstanceHandle, document: &FieldDocument) -> Result<Vec<ScriptError>> {
        let instance = self.handles.resolve(handle)?;
        let mut guard = instance.lock();
        Ok(deserialize(&mut guard, document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::EngineBindings;
    use crate::class::{ClassBuilder, ScriptObject};
    use crate::instance::{InstanceRegistry, SharedInstance};
    use crate::module::{ModuleBuilder, ModuleContext};
    use crate::registry::ClassRegistry;
    use glam::{Vec2, Vec3};
    use serde_json::json;
    use std::path::Path;
    use void_core::EntityId;

    #[derive(Default)]
    struct Turret {
        score: i32,
        range: f32,
        armed: bool,
        aim: Vec2,
        mount: Vec3,
        target: Option<EntityId>,
    }

    impl ScriptObject for Turret {}

    fn turret() -> (ClassRegistry, InstanceRegistry, SharedInstance) {
        let mut builder = ModuleBuilder::new(ModuleContext::detached("Defense"), Path::new("Defense.dll"), None);
        builder.class(
            ClassBuilder::new("Defense.Turret", Turret::default)
                .field("Score", |t| &t.score, |t| &mut t.score)
                .field("Range", |t| &t.range, |t| &mut t.range)
                .field("Armed", |t| &t.armed, |t| &mut t.armed)
                .field("Aim", |t| &t.aim, |t| &mut t.aim)
                .field("Mount", |t| &t.mount, |t| &mut t.mount)
                .field("Target", |t| &t.target, |t| &mut t.target),
        );
        let mut classes = ClassRegistry::new();
        classes.register(builder.finish());

        let mut instances = InstanceRegistry::new();
        let instance = instances
            .create(&classes, EntityId::new(10).unwrap(), "Turret", &EngineBindings::empty())
            .unwrap();
        (classes, instances, instance)
    }

    #[test]
    fn test_list_fields_in_declaration_order() {
        let (_, _, instance) = turret();
        let fields = list_fields(&instance.lock());
        let rendered: Vec<String> = fields.iter().map(|(n, t)| format!("{}:{}", n, t)).collect();

        assert_eq!(
            rendered,
            ["Score:Int", "Range:Float", "Armed:Bool", "Aim:Vector2", "Mount:Vector3", "Target:Entity"]
        );
    }

    #[test]
    fn test_type_exact_access() {
        let (_, _, instance) = turret();
        let mut guard = instance.lock();

        set(&mut guard, "Score", 5i32).unwrap();
        assert_eq!(get::<i32>(&guard, "Score").unwrap(), 5);
        assert!(matches!(get::<f32>(&guard, "Score"), Err(ScriptError::FieldTypeMismatch { .. })));
        assert!(matches!(get::<i64>(&guard, "Score"), Err(ScriptError::FieldTypeMismatch { .. })));
        assert!(matches!(get::<i32>(&guard, "score"), Err(ScriptError::FieldNotFound { .. })));

        assert!(set(&mut guard, "Score", 9.0f32).is_err());
        assert_eq!(get::<i32>(&guard, "Score").unwrap(), 5);
    }

    #[test]
    fn test_serialize_encodes_entity_references_as_ids() {
        let (_, _, instance) = turret();
        let mut guard = instance.lock();
        set(&mut guard, "Target", EntityId::new(77)).unwrap();
        set(&mut guard, "Aim", Vec2::new(1.0, -1.0)).unwrap();

        let document = serialize(&guard).unwrap();
        assert_eq!(document.len(), 6);
        assert_eq!(document.get("Target"), Some(&json!(77)));
        assert_eq!(document.get("Aim"), Some(&json!([1.0, -1.0])));
        assert_eq!(document.get("Armed"), Some(&json!(false)));

        set(&mut guard, "Target", None::<EntityId>).unwrap();
        assert_eq!(serialize(&guard).unwrap().get("Target"), Some(&json!(0)));
    }

    #[test]
    fn test_round_trip_onto_fresh_instance() {
        let (classes, mut instances, source) = turret();
        {
            let mut guard = source.lock();
            set(&mut guard, "Score", -12i32).unwrap();
            set(&mut guard, "Range", 14.25f32).unwrap();
            set(&mut guard, "Armed", true).unwrap();
            set(&mut guard, "Aim", Vec2::new(0.5, 0.25)).unwrap();
            set(&mut guard, "Mount", Vec3::new(1.0, 2.0, 3.0)).unwrap();
            set(&mut guard, "Target", EntityId::new(3)).unwrap();
        }
        let text = serialize(&source.lock()).unwrap().to_json();

        let copy = instances
            .create(&classes, EntityId::new(11).unwrap(), "Defense.Turret", &EngineBindings::empty())
            .unwrap();
        let failures = deserialize(&mut copy.lock(), &FieldDocument::from_json(&text).unwrap());
        assert!(failures.is_empty());

        let guard = copy.lock();
        assert_eq!(get::<i32>(&guard, "Score").unwrap(), -12);
        assert_eq!(get::<f32>(&guard, "Range").unwrap(), 14.25);
        assert!(get::<bool>(&guard, "Armed").unwrap());
        assert_eq!(get::<Vec2>(&guard, "Aim").unwrap(), Vec2::new(0.5, 0.25));
        assert_eq!(get::<Vec3>(&guard, "Mount").unwrap(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(get::<Option<EntityId>>(&guard, "Target").unwrap(), EntityId::new(3));
    }

    #[test]
    fn test_round_trip_keeps_non_finite_floats() {
        let (classes, mut instances, source) = turret();
        {
            let mut guard = source.lock();
            set(&mut guard, "Range", f32::INFINITY).unwrap();
            set(&mut guard, "Mount", Vec3::new(f32::NEG_INFINITY, 0.0, 2.0)).unwrap();
        }
        let text = serialize(&source.lock()).unwrap().to_json();

        let copy = instances
            .create(&classes, EntityId::new(12).unwrap(), "Turret", &EngineBindings::empty())
            .unwrap();
        let failures = deserialize(&mut copy.lock(), &FieldDocument::from_json(&text).unwrap());
        assert!(failures.is_empty());

        let guard = copy.lock();
        assert_eq!(get::<f32>(&guard, "Range").unwrap(), f32::INFINITY);
        assert_eq!(get::<Vec3>(&guard, "Mount").unwrap(), Vec3::new(f32::NEG_INFINITY, 0.0, 2.0));
    }

    #[test]
    fn test_deserialize_isolates_bad_fields() {
        let (_, _, instance) = turret();
        let mut document = FieldDocument::new();
        document.insert_raw("Score", json!("not a number"));
        document.insert_raw("Ghost", json!(1));
        document.insert_raw("Range", json!(8));
        document.insert_raw("Target", json!(0));

        let mut guard = instance.lock();
        set(&mut guard, "Target", EntityId::new(5)).unwrap();
        let failures = deserialize(&mut guard, &document);

        assert_eq!(failures.len(), 2);
        assert!(failures.iter().any(|e| matches!(e, ScriptError::SerializationField { .. })));
        assert!(failures.iter().any(|e| matches!(e, ScriptError::FieldNotFound { .. })));
        assert_eq!(get::<f32>(&guard, "Range").unwrap(), 8.0);
        assert_eq!(get::<Option<EntityId>>(&guard, "Target").unwrap(), None);
        assert_eq!(get::<i32>(&guard, "Score").unwrap(), 0);
    }

    #[test]
    fn test_document_must_be_an_object() {
        assert!(FieldDocument::from_json("[1, 2]").is_err());
        assert!(FieldDocument::from_json("42").is_err());
        assert!(FieldDocument::from_json("{}").unwrap().is_empty());
    }

    #[test]
    fn test_bridge_rejects_released_handles() {
        let (_, _, instance) = turret();
        let mut handles = HandleTable::new();
        let handle = handles.allocate(instance);

        {
            let bridge = ReflectionBridge::new(&handles);
            bridge.set_field(handle, "Score", 5i32).unwrap();
            assert_eq!(bridge.get_field::<i32>(handle, "Score").unwrap(), 5);
            assert_eq!(bridge.list_fields(handle).unwrap().len(), 6);
        }

        handles.release(handle);
        let bridge = ReflectionBridge::new(&handles);
        assert!(matches!(bridge.serialize(handle), Err(ScriptError::InvalidHandle { .. })));
        assert!(matches!(bridge.list_fields(handle), Err(ScriptError::InvalidHandle { .. })));
    }
}
