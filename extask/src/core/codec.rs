//! Mapping between native [`TypedValue`]s and their wire form.
//!
//! The wire form of a variable is a [`TypedValueDto`]:
//!
//! ```json
//! { "value": "...", "type": "Object",
//!   "valueInfo": { "objectTypeName": "com.acme.Order",
//!                  "serializationDataFormat": "application/json" } }
//! ```
//!
//! Each wire `type` is handled by one registered [`ValueMapper`]. The set of
//! mappers is closed at construction of the [`VariableCodec`]; a kind with no
//! mapper is rejected at encode time, an unknown `type` at decode time.

use super::error::{CodecError, Result};
use super::object_type::ObjectType;
use super::serialization::{decode_base64, encode_base64, DataFormat, FormatError};
use super::value::{erase, ErasedObject, FileValue, ObjectValue, Opaque, TypedValue, Value, ValueKind, VariableMap};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Date wire format, millisecond precision with a numeric offset.
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// Wire map of variables, in insertion order.
pub type VariableDtoMap = IndexMap<String, TypedValueDto>;

// =============================================================================
// WIRE TYPES
// =============================================================================

/// Wire representation of one variable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedValueDto {
    #[serde(default)]
    pub value: serde_json::Value,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,

    #[serde(default, skip_serializing_if = "ValueInfo::is_empty")]
    pub value_info: ValueInfo,
}

impl TypedValueDto {
    pub fn new(value_type: &str, value: serde_json::Value) -> Self {
        Self {
            value,
            value_type: Some(value_type.to_string()),
            value_info: ValueInfo::default(),
        }
    }

    /// `true` when `valueInfo.transient` is set. Absent means not transient.
    pub fn is_transient(&self) -> bool {
        self.value_info.transient.unwrap_or(false)
    }
}

/// The `valueInfo` object. Absent fields are omitted on the wire.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transient: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serialization_data_format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

impl ValueInfo {
    pub fn is_empty(&self) -> bool {
        self == &ValueInfo::default()
    }
}

// =============================================================================
// OBJECT TYPE REGISTRY
// =============================================================================

type ObjectDecoder =
    Arc<dyn Fn(DataFormat, &str) -> std::result::Result<Arc<dyn ErasedObject>, FormatError> + Send + Sync>;

/// Object types the decoding side can materialize, keyed by `objectTypeName`.
#[derive(Clone, Default)]
pub struct ObjectTypes {
    decoders: HashMap<String, ObjectDecoder>,
}

impl ObjectTypes {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the generic container types.
    pub fn with_builtins() -> Self {
        let mut types = Self::new();
        types
            .register::<Vec<i32>>()
            .register::<Vec<i64>>()
            .register::<Vec<String>>()
            .register::<BTreeMap<String, String>>()
            .register::<serde_json::Value>();
        types
    }

    /// Registers `T` under its [`ObjectType::object_type_name`].
    pub fn register<T>(&mut self) -> &mut Self
    where
        T: ObjectType + Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static,
    {
        let decoder: ObjectDecoder = Arc::new(
            |format: DataFormat,
             payload: &str|
             -> std::result::Result<Arc<dyn ErasedObject>, FormatError> {
                let value: T = format.deserialize(payload)?;
                Ok(erase(value))
            },
        );
        self.decoders
            .insert(T::object_type_name().to_string(), decoder);
        self
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.decoders.contains_key(type_name)
    }

    fn decoder(&self, type_name: &str) -> Option<&ObjectDecoder> {
        self.decoders.get(type_name)
    }
}

impl fmt::Debug for ObjectTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.decoders.keys().collect();
        names.sort();
        f.debug_struct("ObjectTypes").field("types", &names).finish()
    }
}

// =============================================================================
// VALUE MAPPERS
// =============================================================================

/// Settings a mapper may consult.
#[derive(Debug)]
pub struct MapperContext<'a> {
    pub default_format: DataFormat,
    pub object_types: &'a ObjectTypes,
}

/// Converts one value kind to and from its wire form.
///
/// Mappers never deal with transience, the codec applies it around them.
pub trait ValueMapper: Send + Sync {
    /// Wire type name handled by this mapper.
    fn type_name(&self) -> &'static str;

    fn write(&self, value: &Value, ctx: &MapperContext<'_>) -> Result<TypedValueDto>;

    fn read(&self, dto: &TypedValueDto, ctx: &MapperContext<'_>) -> Result<Value>;
}

/// Registry of value mappers, keyed case-insensitively by wire type name.
#[derive(Clone, Default)]
pub struct ValueMappers {
    mappers: HashMap<String, Arc<dyn ValueMapper>>,
}

impl ValueMappers {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Mappers for every [`ValueKind`].
    pub fn builtin() -> Self {
        let mut mappers = Self::empty();
        for kind in [
            ValueKind::Null,
            ValueKind::Boolean,
            ValueKind::Short,
            ValueKind::Integer,
            ValueKind::Long,
            ValueKind::Double,
            ValueKind::String,
            ValueKind::Date,
            ValueKind::Bytes,
        ] {
            mappers.register(PrimitiveMapper(kind));
        }
        mappers.register(FileMapper);
        mappers.register(ObjectMapper);
        mappers.register(OpaqueMapper(ValueKind::Json));
        mappers.register(OpaqueMapper(ValueKind::Xml));
        mappers
    }

    /// Adds or replaces the mapper for its type name.
    pub fn register(&mut self, mapper: impl ValueMapper + 'static) -> &mut Self {
        self.mappers
            .insert(mapper.type_name().to_ascii_lowercase(), Arc::new(mapper));
        self
    }

    pub fn get(&self, type_name: &str) -> Option<&Arc<dyn ValueMapper>> {
        self.mappers.get(&type_name.to_ascii_lowercase())
    }
}

impl fmt::Debug for ValueMappers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.mappers.keys().collect();
        names.sort();
        f.debug_struct("ValueMappers").field("types", &names).finish()
    }
}

struct PrimitiveMapper(ValueKind);

impl PrimitiveMapper {
    fn integer(&self, dto: &TypedValueDto) -> Result<i64> {
        dto.value
            .as_i64()
            .ok_or_else(|| CodecError::invalid(self.type_name(), format!("expected an integer, got {}", dto.value)))
    }
}

impl ValueMapper for PrimitiveMapper {
    fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    fn write(&self, value: &Value, _ctx: &MapperContext<'_>) -> Result<TypedValueDto> {
        let json = match value {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Short(v) => serde_json::Value::from(*v),
            Value::Integer(v) => serde_json::Value::from(*v),
            Value::Long(v) => serde_json::Value::from(*v),
            Value::Double(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .ok_or_else(|| CodecError::unsupported("Double", format!("{} has no JSON representation", v)))?,
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => serde_json::Value::String(format_date(d)),
            Value::Bytes(b) => serde_json::Value::String(encode_base64(b)),
            other => {
                return Err(CodecError::unsupported(
                    other.kind().type_name(),
                    "value does not match the mapper's kind",
                ))
            }
        };
        Ok(TypedValueDto::new(self.type_name(), json))
    }

    fn read(&self, dto: &TypedValueDto, _ctx: &MapperContext<'_>) -> Result<Value> {
        if dto.value.is_null() {
            return Ok(Value::Null);
        }
        let name = self.type_name();
        let value = match self.0 {
            ValueKind::Boolean => Value::Boolean(
                dto.value
                    .as_bool()
                    .ok_or_else(|| CodecError::invalid(name, "expected a boolean"))?,
            ),
            ValueKind::Short => Value::Short(
                i16::try_from(self.integer(dto)?).map_err(|e| CodecError::invalid(name, e))?,
            ),
            ValueKind::Integer => Value::Integer(
                i32::try_from(self.integer(dto)?).map_err(|e| CodecError::invalid(name, e))?,
            ),
            ValueKind::Long => Value::Long(self.integer(dto)?),
            ValueKind::Double => Value::Double(
                dto.value
                    .as_f64()
                    .ok_or_else(|| CodecError::invalid(name, "expected a number"))?,
            ),
            ValueKind::String => Value::String(expect_str(dto, name)?.to_string()),
            ValueKind::Date => Value::date(parse_date(expect_str(dto, name)?)?),
            ValueKind::Bytes => Value::Bytes(
                decode_base64(expect_str(dto, name)?)
                    .map_err(|e| CodecError::unsupported(name, e))?,
            ),
            _ => Value::Null,
        };
        Ok(value)
    }
}

struct FileMapper;

impl ValueMapper for FileMapper {
    fn type_name(&self) -> &'static str {
        ValueKind::File.type_name()
    }

    fn write(&self, value: &Value, _ctx: &MapperContext<'_>) -> Result<TypedValueDto> {
        let Value::File(file) = value else {
            return Err(CodecError::unsupported(value.kind().type_name(), "expected a file value"));
        };
        let mut dto = TypedValueDto::new(self.type_name(), encode_base64(&file.content).into());
        dto.value_info.filename = Some(file.filename.clone());
        dto.value_info.mime_type = file.mime_type.clone();
        dto.value_info.encoding = file.encoding.clone();
        Ok(dto)
    }

    fn read(&self, dto: &TypedValueDto, _ctx: &MapperContext<'_>) -> Result<Value> {
        let filename = dto
            .value_info
            .filename
            .clone()
            .ok_or_else(|| CodecError::invalid(self.type_name(), "no 'filename' in valueInfo"))?;
        let content = if dto.value.is_null() {
            Vec::new()
        } else {
            decode_base64(expect_str(dto, self.type_name())?)
                .map_err(|e| CodecError::unsupported(self.type_name(), e))?
        };
        Ok(Value::File(FileValue {
            filename,
            mime_type: dto.value_info.mime_type.clone(),
            encoding: dto.value_info.encoding.clone(),
            content,
        }))
    }
}

struct ObjectMapper;

impl ObjectMapper {
    fn format(name: Option<&str>, ctx: &MapperContext<'_>, type_name: &str) -> Result<DataFormat> {
        match name {
            None => Ok(ctx.default_format),
            Some(name) => DataFormat::from_name(name).ok_or_else(|| {
                CodecError::unsupported(
                    type_name,
                    format!("unknown serialization data format '{}'", name),
                )
            }),
        }
    }
}

impl ValueMapper for ObjectMapper {
    fn type_name(&self) -> &'static str {
        ValueKind::Object.type_name()
    }

    fn write(&self, value: &Value, ctx: &MapperContext<'_>) -> Result<TypedValueDto> {
        let Value::Object(object) = value else {
            return Err(CodecError::unsupported(value.kind().type_name(), "expected an object value"));
        };
        let type_name = object
            .object_type_name()
            .ok_or(CodecError::MissingObjectTypeName)?;
        let format = Self::format(object.format_name(), ctx, type_name)?;
        let payload = object.payload_in(format)?;

        let mut dto = TypedValueDto::new(self.type_name(), serde_json::Value::String(payload));
        dto.value_info.object_type_name = Some(type_name.to_string());
        dto.value_info.serialization_data_format = Some(format.name().to_string());
        Ok(dto)
    }

    fn read(&self, dto: &TypedValueDto, ctx: &MapperContext<'_>) -> Result<Value> {
        if dto.value.is_null() {
            return Ok(Value::Null);
        }
        let type_name = dto
            .value_info
            .object_type_name
            .clone()
            .ok_or(CodecError::MissingObjectTypeName)?;
        let format = Self::format(
            dto.value_info.serialization_data_format.as_deref(),
            ctx,
            &type_name,
        )?;
        let payload = match &dto.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let decoder = ctx
            .object_types
            .decoder(&type_name)
            .ok_or_else(|| CodecError::UnknownType {
                type_name: type_name.clone(),
            })?;
        let deserialized =
            decoder(format, &payload).map_err(|e| CodecError::unsupported(type_name.clone(), e))?;
        Ok(Value::Object(ObjectValue::decoded(
            type_name,
            format,
            payload,
            deserialized,
        )))
    }
}

struct OpaqueMapper(ValueKind);

impl ValueMapper for OpaqueMapper {
    fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    fn write(&self, value: &Value, _ctx: &MapperContext<'_>) -> Result<TypedValueDto> {
        let text = match value {
            Value::Opaque(Opaque::Json(text)) | Value::Opaque(Opaque::Xml(text)) => text.clone(),
            other => {
                return Err(CodecError::unsupported(
                    other.kind().type_name(),
                    "expected a pre-serialized document",
                ))
            }
        };
        Ok(TypedValueDto::new(self.type_name(), serde_json::Value::String(text)))
    }

    fn read(&self, dto: &TypedValueDto, _ctx: &MapperContext<'_>) -> Result<Value> {
        if dto.value.is_null() {
            return Ok(Value::Null);
        }
        let text = match &dto.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Ok(Value::Opaque(match self.0 {
            ValueKind::Xml => Opaque::Xml(text),
            _ => Opaque::Json(text),
        }))
    }
}

fn expect_str<'a>(dto: &'a TypedValueDto, type_name: &str) -> Result<&'a str> {
    dto.value
        .as_str()
        .ok_or_else(|| CodecError::invalid(type_name, format!("expected a string, got {}", dto.value)))
}

/// Formats a date in the wire format.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parses a wire date. RFC 3339 is accepted as well.
pub fn parse_date(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(text))
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| CodecError::unsupported("Date", e))
}

// =============================================================================
// CODEC
// =============================================================================

/// Encodes and decodes variables with a fixed set of mappers and object types.
///
/// Cheap to clone; the registries are shared.
#[derive(Clone, Debug)]
pub struct VariableCodec {
    mappers: Arc<ValueMappers>,
    object_types: Arc<ObjectTypes>,
    default_format: DataFormat,
}

impl Default for VariableCodec {
    fn default() -> Self {
        Self::new(ObjectTypes::with_builtins(), DataFormat::Json)
    }
}

impl VariableCodec {
    pub fn new(object_types: ObjectTypes, default_format: DataFormat) -> Self {
        Self {
            mappers: Arc::new(ValueMappers::builtin()),
            object_types: Arc::new(object_types),
            default_format,
        }
    }

    /// Replaces the mapper table.
    pub fn with_mappers(mut self, mappers: ValueMappers) -> Self {
        self.mappers = Arc::new(mappers);
        self
    }

    pub fn default_format(&self) -> DataFormat {
        self.default_format
    }

    pub fn object_types(&self) -> &ObjectTypes {
        &self.object_types
    }

    fn context(&self) -> MapperContext<'_> {
        MapperContext {
            default_format: self.default_format,
            object_types: &self.object_types,
        }
    }

    /// Encodes one variable. `transient = false` is omitted from the output.
    pub fn encode(&self, value: &TypedValue) -> Result<TypedValueDto> {
        let kind = value.kind();
        let mapper = self.mappers.get(kind.type_name()).ok_or_else(|| {
            CodecError::unsupported(kind.type_name(), "no value mapper registered")
        })?;
        let mut dto = mapper.write(&value.value, &self.context())?;
        dto.value_info.transient = value.transient.then_some(true);
        Ok(dto)
    }

    /// Decodes one variable. An absent `type` is inferred from the JSON value.
    pub fn decode(&self, dto: &TypedValueDto) -> Result<TypedValue> {
        let type_name = match &dto.value_type {
            Some(name) => name.as_str(),
            None => infer_type(&dto.value).type_name(),
        };
        let mapper = self.mappers.get(type_name).ok_or_else(|| {
            CodecError::unsupported(type_name, "unknown value type")
        })?;
        let value = mapper.read(dto, &self.context())?;
        Ok(TypedValue {
            value,
            transient: dto.is_transient(),
        })
    }

    /// Encodes a whole variable map, failing on the first bad variable.
    pub fn encode_map(&self, variables: &VariableMap) -> Result<VariableDtoMap> {
        variables
            .iter()
            .map(|(name, value)| Ok((name.clone(), self.encode(value)?)))
            .collect()
    }

    pub fn decode_map(&self, variables: &VariableDtoMap) -> Result<VariableMap> {
        variables
            .iter()
            .map(|(name, dto)| Ok((name.clone(), self.decode(dto)?)))
            .collect()
    }
}

fn infer_type(value: &serde_json::Value) -> ValueKind {
    match value {
        serde_json::Value::Null => ValueKind::Null,
        serde_json::Value::Bool(_) => ValueKind::Boolean,
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) if i32::try_from(i).is_ok() => ValueKind::Integer,
            Some(_) => ValueKind::Long,
            None => ValueKind::Double,
        },
        serde_json::Value::String(_) => ValueKind::String,
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => ValueKind::Json,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Order {
        id: String,
        amount: i64,
    }

    impl ObjectType for Order {
        fn object_type_name() -> &'static str {
            "test.Order"
        }
    }

    fn codec() -> VariableCodec {
        let mut types = ObjectTypes::with_builtins();
        types.register::<Order>();
        VariableCodec::new(types, DataFormat::Json)
    }

    #[test]
    fn test_transient_false_is_omitted() {
        let dto = codec().encode(&TypedValue::new(5i32)).unwrap();
        let wire = serde_json::to_value(&dto).unwrap();
        assert_eq!(wire, json!({"value": 5, "type": "Integer"}));
    }

    #[test]
    fn test_transient_true_is_explicit() {
        let dto = codec().encode(&TypedValue::transient("x")).unwrap();
        let wire = serde_json::to_value(&dto).unwrap();
        assert_eq!(
            wire,
            json!({"value": "x", "type": "String", "valueInfo": {"transient": true}})
        );
    }

    #[test]
    fn test_decode_without_transient_key() {
        let dto: TypedValueDto = serde_json::from_value(json!({"value": 47, "type": "Long"})).unwrap();
        let value = codec().decode(&dto).unwrap();
        assert_eq!(value, TypedValue::new(47i64));
        assert!(!value.transient);
    }

    #[test]
    fn test_bytes_are_base64() {
        let dto = codec().encode(&TypedValue::new(vec![0u8, 1, 2, 255])).unwrap();
        assert_eq!(dto.value, json!("AAEC/w=="));
    }

    #[test]
    fn test_date_wire_format() {
        let date = DateTime::parse_from_rfc3339("2024-03-01T10:15:30.250Z")
            .unwrap()
            .with_timezone(&Utc);
        let dto = codec().encode(&TypedValue::new(date)).unwrap();
        assert_eq!(dto.value, json!("2024-03-01T10:15:30.250+0000"));
        assert_eq!(codec().decode(&dto).unwrap().value, Value::Date(date));
    }

    #[test]
    fn test_date_accepts_rfc3339() {
        let dto = TypedValueDto::new("Date", json!("2024-03-01T10:15:30Z"));
        assert!(matches!(codec().decode(&dto).unwrap().value, Value::Date(_)));
    }

    #[test]
    fn test_object_uses_default_format() {
        let value = Value::object(Order {
            id: "o-1".into(),
            amount: 10,
        });
        let dto = codec().encode(&TypedValue::new(value)).unwrap();
        assert_eq!(dto.value_info.object_type_name.as_deref(), Some("test.Order"));
        assert_eq!(
            dto.value_info.serialization_data_format.as_deref(),
            Some("application/json")
        );
        assert_eq!(dto.value, json!(r#"{"id":"o-1","amount":10}"#));
    }

    #[test]
    fn test_object_explicit_format_wins() {
        let value = ObjectValue::new(Order {
            id: "o-1".into(),
            amount: 10,
        })
        .with_format(DataFormat::Xml);
        let dto = codec().encode(&TypedValue::new(value)).unwrap();
        assert_eq!(
            dto.value_info.serialization_data_format.as_deref(),
            Some("application/xml")
        );
        let decoded = codec().decode(&dto).unwrap();
        let Value::Object(object) = decoded.value else {
            panic!("expected object");
        };
        assert_eq!(object.deserialized::<Order>().map(|o| o.amount), Some(10));
    }

    #[test]
    fn test_unknown_object_type() {
        let mut dto = TypedValueDto::new("Object", json!("{}"));
        dto.value_info.object_type_name = Some("com.acme.Missing".into());
        dto.value_info.serialization_data_format = Some("application/json".into());
        let err = codec().decode(&dto).unwrap_err();
        assert!(matches!(&err, CodecError::UnknownType { type_name } if type_name == "com.acme.Missing"));
        assert!(err.to_string().contains("not on the class path"));
    }

    #[test]
    fn test_unknown_format_is_unsupported() {
        let mut dto = TypedValueDto::new("Object", json!("{}"));
        dto.value_info.object_type_name = Some("test.Order".into());
        dto.value_info.serialization_data_format = Some("text/csv".into());
        assert!(matches!(
            codec().decode(&dto),
            Err(CodecError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_object_without_type_name() {
        let dto = TypedValueDto::new("Object", json!("{}"));
        assert!(matches!(
            codec().decode(&dto),
            Err(CodecError::MissingObjectTypeName)
        ));
    }

    #[test]
    fn test_opaque_passes_through() {
        let value = Value::Opaque(Opaque::Json(r#"{"a": [1, 2]}"#.into()));
        let dto = codec().encode(&TypedValue::new(value.clone())).unwrap();
        assert_eq!(dto.value_type.as_deref(), Some("Json"));
        assert_eq!(dto.value, json!(r#"{"a": [1, 2]}"#));
        assert_eq!(codec().decode(&dto).unwrap().value, value);
    }

    #[test]
    fn test_file_carries_metadata() {
        let file = FileValue::new("report.txt", b"hello".to_vec()).mime_type("text/plain");
        let dto = codec().encode(&TypedValue::new(file.clone())).unwrap();
        assert_eq!(dto.value_info.filename.as_deref(), Some("report.txt"));
        assert_eq!(dto.value_info.mime_type.as_deref(), Some("text/plain"));
        assert_eq!(codec().decode(&dto).unwrap().value, Value::File(file));
    }

    #[test]
    fn test_untyped_values_are_inferred() {
        let dto: TypedValueDto = serde_json::from_value(json!({"value": 5_000_000_000i64})).unwrap();
        assert_eq!(codec().decode(&dto).unwrap().value, Value::Long(5_000_000_000));
        let dto: TypedValueDto = serde_json::from_value(json!({"value": "s"})).unwrap();
        assert_eq!(codec().decode(&dto).unwrap().value, Value::String("s".into()));
    }

    #[test]
    fn test_unregistered_kind_is_rejected_at_encode() {
        let codec = VariableCodec::default().with_mappers(ValueMappers::empty());
        let err = codec.encode(&TypedValue::new(1i32)).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedType { type_name, .. } if type_name == "Integer"));
    }

    #[test]
    fn test_non_finite_double_is_rejected() {
        assert!(codec().encode(&TypedValue::new(f64::NAN)).is_err());
    }

    #[test]
    fn test_short_out_of_range() {
        let dto = TypedValueDto::new("Short", json!(70000));
        assert!(matches!(
            codec().decode(&dto),
            Err(CodecError::InvalidValue { .. })
        ));
    }
}
