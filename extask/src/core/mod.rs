//! Core types shared by the engine and the worker client.
//!
//! # Values
//! - [`Value`], [`TypedValue`]: native variable values and their transience flag
//! - [`ObjectValue`], [`FileValue`], [`Opaque`]: the structured kinds
//! - [`VariableMap`]: insertion-ordered variables by name
//!
//! # Codec
//! - [`VariableCodec`]: native ⇄ wire mapping of variables
//! - [`TypedValueDto`], [`ValueInfo`]: the wire form
//! - [`ValueMapper`], [`ValueMappers`]: per-kind mapping, registered by wire type name
//! - [`ObjectTypes`], [`ObjectType`]: which object types can be materialized
//! - [`DataFormat`]: JSON, XML and bincode serialization for objects
//!
//! # Retry
//! - [`RetryPolicy`], [`Retryable`], [`retry_with_policy`]
//!
//! # Example
//!
//! ```
//! use extask::core::{TypedValue, VariableCodec, Value};
//!
//! let codec = VariableCodec::default();
//! let dto = codec.encode(&TypedValue::new(47i64)).unwrap();
//! assert_eq!(dto.value_type.as_deref(), Some("Long"));
//! assert_eq!(codec.decode(&dto).unwrap().value, Value::Long(47));
//! ```

pub mod codec;
mod error;
mod object_type;
pub mod retry;
pub mod serialization;
mod value;

pub use codec::{
    format_date, parse_date, MapperContext, ObjectTypes, TypedValueDto, ValueInfo, ValueMapper,
    ValueMappers, VariableCodec, VariableDtoMap, DATE_FORMAT,
};
pub use error::{CodecError, Result};
pub use object_type::ObjectType;
pub use retry::{retry_with_policy, RetryPolicy, Retryable};
pub use serialization::{DataFormat, FormatError, BINARY_FORMAT, JSON_FORMAT, XML_FORMAT};
pub use value::{
    object_from_value, FileValue, FromValue, ObjectValue, Opaque, TypedValue, Value, ValueKind,
    VariableMap,
};

/// Boxed error returned by task handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
