//! Native representation of process variables.
//!
//! [`Value`] is a closed set of kinds. Everything that is not a primitive goes
//! through the [`Value::Object`] escape hatch, which carries a type name, a
//! data format and the serialized payload (and, when available, the
//! deserialized Rust value). Pre-serialized JSON/XML documents that must not be
//! re-encoded use [`Value::Opaque`].
//!
//! Transience is not part of the value; it lives on [`TypedValue`].

use super::error::{CodecError, Result};
use super::object_type::ObjectType;
use super::serialization::DataFormat;
use chrono::{DateTime, SubsecRound, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Ordered variable map keyed by variable name.
pub type VariableMap = IndexMap<String, TypedValue>;

/// The kind of a [`Value`], named after its wire `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Boolean,
    Short,
    Integer,
    Long,
    Double,
    String,
    Date,
    Bytes,
    File,
    Object,
    Json,
    Xml,
}

impl ValueKind {
    /// Returns the wire type name (`valueDto.type`).
    pub fn type_name(&self) -> &'static str {
        match self {
            ValueKind::Null => "Null",
            ValueKind::Boolean => "Boolean",
            ValueKind::Short => "Short",
            ValueKind::Integer => "Integer",
            ValueKind::Long => "Long",
            ValueKind::Double => "Double",
            ValueKind::String => "String",
            ValueKind::Date => "Date",
            ValueKind::Bytes => "Bytes",
            ValueKind::File => "File",
            ValueKind::Object => "Object",
            ValueKind::Json => "Json",
            ValueKind::Xml => "Xml",
        }
    }

    /// Looks a kind up by wire type name. Matching is case-insensitive, the
    /// engine accepts both `"Long"` and `"long"`.
    pub fn from_type_name(name: &str) -> Option<Self> {
        const ALL: [ValueKind; 13] = [
            ValueKind::Null,
            ValueKind::Boolean,
            ValueKind::Short,
            ValueKind::Integer,
            ValueKind::Long,
            ValueKind::Double,
            ValueKind::String,
            ValueKind::Date,
            ValueKind::Bytes,
            ValueKind::File,
            ValueKind::Object,
            ValueKind::Json,
            ValueKind::Xml,
        ];
        ALL.into_iter()
            .find(|kind| kind.type_name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A process variable value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Short(i16),
    Integer(i32),
    Long(i64),
    Double(f64),
    String(String),
    /// Millisecond precision on the wire; build through [`Value::date`] to match it.
    Date(DateTime<Utc>),
    Bytes(Vec<u8>),
    File(FileValue),
    Object(ObjectValue),
    Opaque(Opaque),
}

impl Value {
    /// Returns the kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Short(_) => ValueKind::Short,
            Value::Integer(_) => ValueKind::Integer,
            Value::Long(_) => ValueKind::Long,
            Value::Double(_) => ValueKind::Double,
            Value::String(_) => ValueKind::String,
            Value::Date(_) => ValueKind::Date,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::File(_) => ValueKind::File,
            Value::Object(_) => ValueKind::Object,
            Value::Opaque(Opaque::Json(_)) => ValueKind::Json,
            Value::Opaque(Opaque::Xml(_)) => ValueKind::Xml,
        }
    }

    /// Wraps a serializable value as an object variable in the client's
    /// default format.
    pub fn object<T>(value: T) -> Self
    where
        T: ObjectType + Serialize + fmt::Debug + Send + Sync + 'static,
    {
        Value::Object(ObjectValue::new(value))
    }

    /// Converts an arbitrary runtime value through the closed kind table.
    ///
    /// Only the primitive Rust types with a wire mapping are accepted; anything
    /// else fails with [`CodecError::UnsupportedType`] naming the concrete type.
    /// Use [`Value::object`] for structured data.
    pub fn from_native<T: Any>(value: T) -> Result<Self> {
        let any: Box<dyn Any> = Box::new(value);
        let any = match any.downcast::<Value>() {
            Ok(v) => return Ok(*v),
            Err(any) => any,
        };
        macro_rules! try_kinds {
            ($any:ident; $($ty:ty => $ctor:expr),* $(,)?) => {
                $(
                    let $any = match $any.downcast::<$ty>() {
                        Ok(v) => return Ok($ctor(*v)),
                        Err(any) => any,
                    };
                )*
            };
        }
        try_kinds! { any;
            bool => Value::Boolean,
            i16 => Value::Short,
            i32 => Value::Integer,
            i64 => Value::Long,
            f64 => Value::Double,
            String => Value::String,
            &'static str => |s: &str| Value::String(s.to_string()),
            DateTime<Utc> => Value::date,
            Vec<u8> => Value::Bytes,
            FileValue => Value::File,
            ObjectValue => Value::Object,
            () => |_| Value::Null,
        }
        drop(any);
        Err(CodecError::unsupported(
            std::any::type_name::<T>(),
            "no value mapper for this kind",
        ))
    }

    /// A date truncated to the milliseconds the wire format carries.
    pub fn date(date: DateTime<Utc>) -> Self {
        Value::Date(date.trunc_subsecs(3))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// A pre-serialized document passed through without re-encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opaque {
    Json(String),
    Xml(String),
}

/// A file variable: content plus descriptive metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileValue {
    pub filename: String,
    pub mime_type: Option<String>,
    pub encoding: Option<String>,
    pub content: Vec<u8>,
}

impl FileValue {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: None,
            encoding: None,
            content: content.into(),
        }
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }
}

/// Object-safe view over a concrete serializable Rust value.
pub(crate) trait ErasedObject: Send + Sync + fmt::Debug {
    fn serialize_as(&self, format: DataFormat) -> std::result::Result<String, String>;
    fn as_any(&self) -> &dyn Any;
}

struct Erased<T>(T);

pub(crate) fn erase<T>(value: T) -> Arc<dyn ErasedObject>
where
    T: Serialize + fmt::Debug + Send + Sync + 'static,
{
    Arc::new(Erased(value))
}

impl<T: fmt::Debug> fmt::Debug for Erased<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<T> ErasedObject for Erased<T>
where
    T: Serialize + fmt::Debug + Send + Sync + 'static,
{
    fn serialize_as(&self, format: DataFormat) -> std::result::Result<String, String> {
        format.serialize(&self.0).map_err(|e| e.to_string())
    }

    fn as_any(&self) -> &dyn Any {
        &self.0
    }
}

/// An object variable.
///
/// Objects built by a handler hold the Rust value and are serialized when the
/// request is encoded, in the explicitly requested format or the client's
/// default. Objects received from the engine hold both the serialized payload
/// and the deserialized value.
#[derive(Clone)]
pub struct ObjectValue {
    type_name: Option<String>,
    format: Option<String>,
    serialized: Option<String>,
    deserialized: Option<Arc<dyn ErasedObject>>,
}

impl ObjectValue {
    /// Creates an object value from a Rust value, using its registered type name.
    pub fn new<T>(value: T) -> Self
    where
        T: ObjectType + Serialize + fmt::Debug + Send + Sync + 'static,
    {
        Self {
            type_name: Some(T::object_type_name().to_string()),
            format: None,
            serialized: None,
            deserialized: Some(erase(value)),
        }
    }

    /// Creates an object value from an already serialized payload.
    pub fn serialized(
        type_name: impl Into<String>,
        format: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            type_name: Some(type_name.into()),
            format: Some(format.into()),
            serialized: Some(payload.into()),
            deserialized: None,
        }
    }

    pub(crate) fn decoded(
        type_name: String,
        format: DataFormat,
        payload: String,
        deserialized: Arc<dyn ErasedObject>,
    ) -> Self {
        Self {
            type_name: Some(type_name),
            format: Some(format.name().to_string()),
            serialized: Some(payload),
            deserialized: Some(deserialized),
        }
    }

    /// Requests a specific serialization data format by wire name.
    pub fn serialization_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Requests a specific serialization data format.
    pub fn with_format(self, format: DataFormat) -> Self {
        self.serialization_format(format.name())
    }

    pub fn object_type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    pub fn format_name(&self) -> Option<&str> {
        self.format.as_deref()
    }

    /// Returns the serialized payload, if the value was received from the
    /// engine or created from a payload.
    pub fn value_serialized(&self) -> Option<&str> {
        self.serialized.as_deref()
    }

    /// Returns the deserialized value if it is of type `T`.
    pub fn deserialized<T: 'static>(&self) -> Option<&T> {
        self.deserialized
            .as_ref()
            .and_then(|obj| obj.as_any().downcast_ref::<T>())
    }

    pub fn is_deserialized(&self) -> bool {
        self.deserialized.is_some()
    }

    /// Produces the payload in `format`, reusing the stored payload when it
    /// was produced in the same format.
    pub(crate) fn payload_in(&self, format: DataFormat) -> Result<String> {
        let type_name = self.type_name.clone().unwrap_or_default();
        if let (Some(serialized), Some(current)) = (&self.serialized, &self.format) {
            if current == format.name() {
                return Ok(serialized.clone());
            }
        }
        match &self.deserialized {
            Some(obj) => obj
                .serialize_as(format)
                .map_err(|e| CodecError::unsupported(type_name, e)),
            None => Err(CodecError::unsupported(
                type_name,
                format!("payload is only available in format '{}'", self.format.as_deref().unwrap_or("?")),
            )),
        }
    }

    fn comparable_payload(&self) -> Option<String> {
        let format = self
            .format
            .as_deref()
            .and_then(DataFormat::from_name)
            .unwrap_or(DataFormat::Json);
        self.payload_in(format).ok()
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectValue")
            .field("type_name", &self.type_name)
            .field("format", &self.format)
            .field("serialized", &self.serialized)
            .field("deserialized", &self.deserialized)
            .finish()
    }
}

impl PartialEq for ObjectValue {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && self.comparable_payload() == other.comparable_payload()
    }
}

/// A value plus its transience flag.
///
/// Transient variables are passed to the engine but not persisted there.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    pub value: Value,
    pub transient: bool,
}

impl TypedValue {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            transient: false,
        }
    }

    pub fn transient(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            transient: true,
        }
    }

    pub fn kind(&self) -> ValueKind {
        self.value.kind()
    }
}

impl<V: Into<Value>> From<V> for TypedValue {
    fn from(value: V) -> Self {
        TypedValue::new(value)
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

value_from! {
    bool => Boolean,
    i16 => Short,
    i32 => Integer,
    i64 => Long,
    f64 => Double,
    String => String,
    &str => String,
    Vec<u8> => Bytes,
    &[u8] => Bytes,
    FileValue => File,
    ObjectValue => Object,
    Opaque => Opaque,
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::date(v)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Conversion from a variable value back into a Rust type.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! from_value {
    ($($ty:ty => $pat:pat => $out:expr),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        $pat => Some($out),
                        _ => None,
                    }
                }
            }
        )*
    };
}

from_value! {
    bool => Value::Boolean(v) => *v,
    i16 => Value::Short(v) => *v,
    i32 => Value::Integer(v) => *v,
    f64 => Value::Double(v) => *v,
    String => Value::String(v) => v.clone(),
    DateTime<Utc> => Value::Date(v) => *v,
    Vec<u8> => Value::Bytes(v) => v.clone(),
    FileValue => Value::File(v) => v.clone(),
    ObjectValue => Value::Object(v) => v.clone(),
}

impl FromValue for i64 {
    /// Longs widen from the smaller integer kinds.
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Long(v) => Some(*v),
            Value::Integer(v) => Some(i64::from(*v)),
            Value::Short(v) => Some(i64::from(*v)),
            _ => None,
        }
    }
}

/// Reads a deserialized object of type `T` out of an object variable.
pub fn object_from_value<T: Clone + 'static>(value: &Value) -> Option<T> {
    match value {
        Value::Object(obj) => obj.deserialized::<T>().cloned(),
        _ => None,
    }
}
