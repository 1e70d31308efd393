//! Field values exchanged with native code
//!
//! Reflection works over a closed set of value categories. Every public
//! field of a script class is tagged with a [`FieldType`] when the class is
//! registered; reads and writes carry a [`FieldValue`] whose tag must match
//! exactly. Nothing is widened or converted implicitly.

use glam::{Vec2, Vec3, Vec4};
use serde::de::Error as _;
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use void_core::EntityId;

/// Declared type of a script field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Float,
    Double,
    Bool,
    Byte,
    Short,
    Int,
    Long,
    UInt,
    ULong,
    Vector2,
    Vector3,
    Vector4,
    /// Reference to another entity, stored by identifier
    Entity,
}

impl FieldType {
    /// Every supported field type, in declaration order
    pub const ALL: [FieldType; 13] = [
        FieldType::Float,
        FieldType::Double,
        FieldType::Bool,
        FieldType::Byte,
        FieldType::Short,
        FieldType::Int,
        FieldType::Long,
        FieldType::UInt,
        FieldType::ULong,
        FieldType::Vector2,
        FieldType::Vector3,
        FieldType::Vector4,
        FieldType::Entity,
    ];

    /// Name reported to native code
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Float => "Float",
            FieldType::Double => "Double",
            FieldType::Bool => "Bool",
            FieldType::Byte => "Byte",
            FieldType::Short => "Short",
            FieldType::Int => "Int",
            FieldType::Long => "Long",
            FieldType::UInt => "UInt",
            FieldType::ULong => "ULong",
            FieldType::Vector2 => "Vector2",
            FieldType::Vector3 => "Vector3",
            FieldType::Vector4 => "Vector4",
            FieldType::Entity => "Entity",
        }
    }

    /// Zero value of this type
    pub fn default_value(&self) -> FieldValue {
        match self {
            FieldType::Float => FieldValue::Float(0.0),
            FieldType::Double => FieldValue::Double(0.0),
            FieldType::Bool => FieldValue::Bool(false),
            FieldType::Byte => FieldValue::Byte(0),
            FieldType::Short => FieldValue::Short(0),
            FieldType::Int => FieldValue::Int(0),
            FieldType::Long => FieldValue::Long(0),
            FieldType::UInt => FieldValue::UInt(0),
            FieldType::ULong => FieldValue::ULong(0),
            FieldType::Vector2 => FieldValue::Vector2(Vec2::ZERO),
            FieldType::Vector3 => FieldValue::Vector3(Vec3::ZERO),
            FieldType::Vector4 => FieldValue::Vector4(Vec4::ZERO),
            FieldType::Entity => FieldValue::Entity(None),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldType::ALL
            .iter()
            .copied()
            .find(|ty| ty.name() == s)
            .ok_or_else(|| format!("unknown field type '{}'", s))
    }
}

/// A typed field value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Float(f32),
    Double(f64),
    Bool(bool),
    Byte(u8),
    Short(i16),
    Int(i32),
    Long(i64),
    UInt(u32),
    ULong(u64),
    Vector2(Vec2),
    Vector3(Vec3),
    Vector4(Vec4),
    Entity(Option<EntityId>),
}

impl FieldValue {
    /// Type tag of this value
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Float(_) => FieldType::Float,
            FieldValue::Double(_) => FieldType::Double,
            FieldValue::Bool(_) => FieldType::Bool,
            FieldValue::Byte(_) => FieldType::Byte,
            FieldValue::Short(_) => FieldType::Short,
            FieldValue::Int(_) => FieldType::Int,
            FieldValue::Long(_) => FieldType::Long,
            FieldValue::UInt(_) => FieldType::UInt,
            FieldValue::ULong(_) => FieldType::ULong,
            FieldValue::Vector2(_) => FieldType::Vector2,
            FieldValue::Vector3(_) => FieldType::Vector3,
            FieldValue::Vector4(_) => FieldType::Vector4,
            FieldValue::Entity(_) => FieldType::Entity,
        }
    }

    /// Encode for a flat document
    ///
    /// Entity references become their identifier, or `0` when unset, so a
    /// document never nests another entity's state. Non-finite floats have no
    /// JSON number form and are written as `"NaN"`, `"Infinity"` or
    /// `"-Infinity"`.
    pub fn to_document(&self) -> JsonValue {
        match *self {
            FieldValue::Float(v) => float_document(v),
            FieldValue::Double(v) => double_document(v),
            FieldValue::Bool(v) => JsonValue::from(v),
            FieldValue::Byte(v) => JsonValue::from(v),
            FieldValue::Short(v) => JsonValue::from(v),
            FieldValue::Int(v) => JsonValue::from(v),
            FieldValue::Long(v) => JsonValue::from(v),
            FieldValue::UInt(v) => JsonValue::from(v),
            FieldValue::ULong(v) => JsonValue::from(v),
            FieldValue::Vector2(v) => components_document(&v.to_array()),
            FieldValue::Vector3(v) => components_document(&v.to_array()),
            FieldValue::Vector4(v) => components_document(&v.to_array()),
            FieldValue::Entity(id) => JsonValue::from(EntityId::to_bits(id)),
        }
    }

    /// Decode a document value as the given declared type
    pub fn from_document(ty: FieldType, value: &JsonValue) -> Result<Self, serde_json::Error> {
        use serde_json::from_value;

        let value = value.clone();
        Ok(match ty {
            FieldType::Float => FieldValue::Float(decode_float(value)?),
            FieldType::Double => FieldValue::Double(decode_double(value)?),
            FieldType::Bool => FieldValue::Bool(from_value(value)?),
            FieldType::Byte => FieldValue::Byte(from_value(value)?),
            FieldType::Short => FieldValue::Short(from_value(value)?),
            FieldType::Int => FieldValue::Int(from_value(value)?),
            FieldType::Long => FieldValue::Long(from_value(value)?),
            FieldType::UInt => FieldValue::UInt(from_value(value)?),
            FieldType::ULong => FieldValue::ULong(from_value(value)?),
            FieldType::Vector2 => FieldValue::Vector2(Vec2::from_array(decode_components(value)?)),
            FieldType::Vector3 => FieldValue::Vector3(Vec3::from_array(decode_components(value)?)),
            FieldType::Vector4 => FieldValue::Vector4(Vec4::from_array(decode_components(value)?)),
            FieldType::Entity => FieldValue::Entity(EntityId::from_bits(from_value(value)?)),
        })
    }
}

fn non_finite_name(v: f64) -> Option<&'static str> {
    if v.is_nan() {
        Some("NaN")
    } else if v == f64::INFINITY {
        Some("Infinity")
    } else if v == f64::NEG_INFINITY {
        Some("-Infinity")
    } else {
        None
    }
}

fn non_finite_value(value: &JsonValue) -> Option<f64> {
    match value.as_str()? {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

fn float_document(v: f32) -> JsonValue {
    match non_finite_name(f64::from(v)) {
        Some(name) => JsonValue::from(name),
        None => JsonValue::from(v),
    }
}

fn double_document(v: f64) -> JsonValue {
    match non_finite_name(v) {
        Some(name) => JsonValue::from(name),
        None => JsonValue::from(v),
    }
}

fn components_document(components: &[f32]) -> JsonValue {
    JsonValue::Array(components.iter().map(|c| float_document(*c)).collect())
}

fn decode_float(value: JsonValue) -> Result<f32, serde_json::Error> {
    match non_finite_value(&value) {
        Some(v) => Ok(v as f32),
        None => serde_json::from_value(value),
    }
}

fn decode_double(value: JsonValue) -> Result<f64, serde_json::Error> {
    match non_finite_value(&value) {
        Some(v) => Ok(v),
        None => serde_json::from_value(value),
    }
}

fn decode_components<const N: usize>(value: JsonValue) -> Result<[f32; N], serde_json::Error> {
    let parts: Vec<JsonValue> = serde_json::from_value(value)?;
    if parts.len() != N {
        return Err(serde_json::Error::invalid_length(parts.len(), &"a vector component array"));
    }
    let mut components = [0.0; N];
    for (slot, part) in components.iter_mut().zip(parts) {
        *slot = decode_float(part)?;
    }
    Ok(components)
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_document())
    }
}

/// A Rust type that can be exposed as a script field
pub trait ScriptField: Clone + Send + 'static {
    /// The tag this type is declared as
    const TYPE: FieldType;

    /// Wrap into a tagged value
    fn to_value(&self) -> FieldValue;

    /// Unwrap a tagged value; `None` if the tag differs
    fn from_value(value: FieldValue) -> Option<Self>;
}

macro_rules! impl_script_field {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl ScriptField for $ty {
                const TYPE: FieldType = FieldType::$variant;

                #[inline]
                fn to_value(&self) -> FieldValue {
                    FieldValue::$variant(*self)
                }

                #[inline]
                fn from_value(value: FieldValue) -> Option<Self> {
                    match value {
                        FieldValue::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for FieldValue {
                fn from(v: $ty) -> Self {
                    FieldValue::$variant(v)
                }
            }
        )*
    };
}

impl_script_field! {
    f32 => Float,
    f64 => Double,
    bool => Bool,
    u8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    u32 => UInt,
    u64 => ULong,
    Vec2 => Vector2,
    Vec3 => Vector3,
    Vec4 => Vector4,
    Option<EntityId> => Entity,
}
