//! Property schema: value types, values, and definitions.
//!
//! A [`PropertyDefinition`] fixes the static [`ValueType`] of a group
//! property, its optional default, and whether values may be overwritten
//! after a group is created. The value type also decides which column
//! representation stores the property (see [`crate::engine::storage`]).

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::error::{IncompatibleValueError, PropertyError};
use crate::engine::types::GroupPropertyId;


/// A named, ordered set of enum variants.
///
/// Variants are addressed by ordinal inside enum columns; the ordinal is the
/// variant's position in `variants`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumType {
    name: String,
    variants: Vec<String>,
}

impl EnumType {
    /// Creates an enum type. Fails when `variants` is empty.
    pub fn new<N, I, V>(name: N, variants: I) -> Result<Arc<Self>, PropertyError>
    where
        N: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let name = name.into();
        let variants: Vec<String> = variants.into_iter().map(Into::into).collect();
        if variants.is_empty() {
            return Err(PropertyError::EmptyEnum(name));
        }
        Ok(Arc::new(Self { name, variants }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variants(&self) -> &[String] {
        &self.variants
    }

    /// Ordinal of `variant`, if it belongs to this enum.
    pub fn ordinal(&self, variant: &str) -> Option<u32> {
        self.variants
            .iter()
            .position(|v| v == variant)
            .map(|i| i as u32)
    }

    /// Variant name for `ordinal`.
    pub fn variant(&self, ordinal: u32) -> Option<&str> {
        self.variants.get(ordinal as usize).map(String::as_str)
    }
}

/// Static type of a property.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Enum(Arc<EnumType>),
    Text,
}

impl ValueType {
    /// Returns true if `value` may be stored under this type.
    ///
    /// Floating values must be finite: NaN and the infinities have no JSON
    /// form, so a snapshot holding one could not be read back.
    pub fn accepts(&self, value: &PropertyValue) -> bool {
        match (self, value) {
            (ValueType::Float, PropertyValue::Float(v)) => v.is_finite(),
            (ValueType::Double, PropertyValue::Double(v)) => v.is_finite(),
            (ValueType::Boolean, PropertyValue::Boolean(_))
            | (ValueType::Byte, PropertyValue::Byte(_))
            | (ValueType::Short, PropertyValue::Short(_))
            | (ValueType::Int, PropertyValue::Int(_))
            | (ValueType::Long, PropertyValue::Long(_))
            | (ValueType::Text, PropertyValue::Text(_)) => true,
            (ValueType::Enum(enum_type), PropertyValue::Enum(variant)) => {
                enum_type.ordinal(variant).is_some()
            }
            _ => false,
        }
    }

    /// Checks `value` against this type, reporting the mismatch for `property`.
    pub fn check(
        &self,
        property: GroupPropertyId,
        value: &PropertyValue,
    ) -> Result<(), IncompatibleValueError> {
        if self.accepts(value) {
            return Ok(());
        }
        Err(IncompatibleValueError {
            property,
            expected: self.to_string(),
            actual: value.describe(),
        })
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Boolean => write!(f, "boolean"),
            ValueType::Byte => write!(f, "byte"),
            ValueType::Short => write!(f, "short"),
            ValueType::Int => write!(f, "int"),
            ValueType::Long => write!(f, "long"),
            ValueType::Float => write!(f, "float"),
            ValueType::Double => write!(f, "double"),
            ValueType::Enum(enum_type) => write!(f, "enum {}", enum_type.name()),
            ValueType::Text => write!(f, "text"),
        }
    }
}

/// A property value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Enum(String),
    Text(String),
}

impl PropertyValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Boolean(_) => "boolean",
            PropertyValue::Byte(_) => "byte",
            PropertyValue::Short(_) => "short",
            PropertyValue::Int(_) => "int",
            PropertyValue::Long(_) => "long",
            PropertyValue::Float(_) => "float",
            PropertyValue::Double(_) => "double",
            PropertyValue::Enum(_) => "enum",
            PropertyValue::Text(_) => "text",
        }
    }

    /// Type name, with the value itself for non-finite floats.
    pub fn describe(&self) -> String {
        match self.as_f64() {
            Some(v) if !v.is_finite() => format!("{} {v}", self.type_name()),
            _ => self.type_name().to_string(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Widens any integer variant to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Byte(v) => Some(i64::from(*v)),
            PropertyValue::Short(v) => Some(i64::from(*v)),
            PropertyValue::Int(v) => Some(i64::from(*v)),
            PropertyValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Widens either floating variant to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(v) => Some(f64::from(*v)),
            PropertyValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Enum(v) | PropertyValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Boolean(v) => write!(f, "{v}"),
            PropertyValue::Byte(v) => write!(f, "{v}"),
            PropertyValue::Short(v) => write!(f, "{v}"),
            PropertyValue::Int(v) => write!(f, "{v}"),
            PropertyValue::Long(v) => write!(f, "{v}"),
            PropertyValue::Float(v) => write!(f, "{v}"),
            PropertyValue::Double(v) => write!(f, "{v}"),
            PropertyValue::Enum(v) | PropertyValue::Text(v) => write!(f, "{v}"),
        }
    }
}

/// Static schema of one group property.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    value_type: ValueType,
    default: Option<PropertyValue>,
    mutable: bool,
}

impl PropertyDefinition {
    /// Starts a definition. Properties are mutable unless stated otherwise.
    pub fn builder() -> PropertyDefinitionBuilder {
        PropertyDefinitionBuilder::new()
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn default_value(&self) -> Option<&PropertyValue> {
        self.default.as_ref()
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }
}

/// Builder for [`PropertyDefinition`].
#[derive(Clone, Debug)]
pub struct PropertyDefinitionBuilder {
    value_type: Option<ValueType>,
    default: Option<PropertyValue>,
    mutable: bool,
}

impl Default for PropertyDefinitionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyDefinitionBuilder {
    pub fn new() -> Self {
        Self { value_type: None, default: None, mutable: true }
    }

    pub fn value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    pub fn default_value(mut self, value: PropertyValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn mutable(mut self, mutable: bool) -> Self {
        self.mutable = mutable;
        self
    }

    /// Finalizes the definition, checking the default against the value type.
    pub fn build(self) -> Result<PropertyDefinition, PropertyError> {
        let value_type = self.value_type.ok_or(PropertyError::MissingValueType)?;
        if let Some(default) = &self.default {
            if !value_type.accepts(default) {
                return Err(PropertyError::IncompatibleDefault {
                    expected: value_type.to_string(),
                    actual: default.describe(),
                });
            }
        }
        Ok(PropertyDefinition {
            value_type,
            default: self.default,
            mutable: self.mutable,
        })
    }
}
