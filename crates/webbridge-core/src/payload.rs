use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::errors::CoreError;

/// The native shapes an untyped `data` value can be narrowed to.
///
/// `Any` is the raw-value fallback. It never appears in a [`NarrowingOrder`];
/// it is what a value becomes when no ordered trial matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Shape {
    Integer,
    String,
    Object,
    IntegerArray,
    Array,
    StringArray,
    Any,
}

impl Shape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::String => "string",
            Self::Object => "object",
            Self::IntegerArray => "integerArray",
            Self::Array => "array",
            Self::StringArray => "stringArray",
            Self::Any => "any",
        }
    }

    /// One trial of the ordered narrowing. `Any` always succeeds.
    fn try_narrow(self, value: &Value) -> Option<Payload> {
        match self {
            Self::Integer => value.as_i64().map(Payload::Integer),
            Self::String => value.as_str().map(|s| Payload::String(s.to_owned())),
            Self::Object => value.as_object().cloned().map(Payload::Object),
            Self::IntegerArray => value
                .as_array()?
                .iter()
                .map(Value::as_i64)
                .collect::<Option<Vec<_>>>()
                .map(Payload::IntegerArray),
            Self::Array => value.as_array().cloned().map(Payload::Array),
            Self::StringArray => value
                .as_array()?
                .iter()
                .map(|v| v.as_str().map(str::to_owned))
                .collect::<Option<Vec<_>>>()
                .map(Payload::StringArray),
            Self::Any => Some(Payload::Value(value.clone())),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Shape {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "integer" => Ok(Self::Integer),
            "string" => Ok(Self::String),
            "object" => Ok(Self::Object),
            "integerArray" => Ok(Self::IntegerArray),
            "array" => Ok(Self::Array),
            "stringArray" => Ok(Self::StringArray),
            "any" => Ok(Self::Any),
            other => Err(CoreError::UnknownShape(other.to_owned())),
        }
    }
}

/// An inbound `data` value after narrowing.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Integer(i64),
    String(String),
    Object(Map<String, Value>),
    IntegerArray(Vec<i64>),
    Array(Vec<Value>),
    StringArray(Vec<String>),
    /// Present, but matched none of the ordered trials (bool, float, null, ...).
    Value(Value),
    /// `data` was absent from the envelope.
    Null,
}

impl Payload {
    pub fn shape(&self) -> Shape {
        match self {
            Self::Integer(_) => Shape::Integer,
            Self::String(_) => Shape::String,
            Self::Object(_) => Shape::Object,
            Self::IntegerArray(_) => Shape::IntegerArray,
            Self::Array(_) => Shape::Array,
            Self::StringArray(_) => Shape::StringArray,
            Self::Value(_) | Self::Null => Shape::Any,
        }
    }

    /// Back to an untyped JSON value. The absent marker becomes `null`.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Integer(n) => Value::from(*n),
            Self::String(s) => Value::String(s.clone()),
            Self::Object(map) => Value::Object(map.clone()),
            Self::IntegerArray(items) => Value::from(items.clone()),
            Self::Array(items) => Value::Array(items.clone()),
            Self::StringArray(items) => Value::from(items.clone()),
            Self::Value(v) => v.clone(),
            Self::Null => Value::Null,
        }
    }
}

/// Fixed tie-break order used to narrow untyped payloads.
///
/// Trials run first to last and the first match wins; anything left over
/// becomes [`Payload::Value`]. Under the default order a non-integer array
/// is always claimed by `Array`, so `StringArray` only wins when configured
/// ahead of it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NarrowingOrder(Vec<Shape>);

impl NarrowingOrder {
    pub const DEFAULT_SHAPES: [Shape; 6] = [
        Shape::Integer,
        Shape::String,
        Shape::Object,
        Shape::IntegerArray,
        Shape::Array,
        Shape::StringArray,
    ];

    /// Build an order from explicit shapes. Duplicates keep their first
    /// position; `Any` is rejected since it is always the implicit last step.
    pub fn new(shapes: impl IntoIterator<Item = Shape>) -> Result<Self, CoreError> {
        let mut order: Vec<Shape> = Vec::new();
        for shape in shapes {
            if shape == Shape::Any {
                return Err(CoreError::ReservedShape);
            }
            if !order.contains(&shape) {
                order.push(shape);
            }
        }
        Ok(Self(order))
    }

    /// Parse shape names, as they appear in settings files.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, CoreError> {
        let shapes = names
            .iter()
            .map(|n| n.as_ref().parse::<Shape>())
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(shapes)
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.0
    }

    /// Narrow `data` to the first matching shape.
    pub fn narrow(&self, data: Option<&Value>) -> Payload {
        let Some(value) = data else {
            return Payload::Null;
        };
        self.0
            .iter()
            .find_map(|shape| shape.try_narrow(value))
            .unwrap_or_else(|| Payload::Value(value.clone()))
    }
}

impl Default for NarrowingOrder {
    fn default() -> Self {
        Self(Self::DEFAULT_SHAPES.to_vec())
    }
}
