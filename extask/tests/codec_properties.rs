//! Round-trip and failure behavior of the variable codec.

use chrono::{TimeZone, Utc};
use extask::core::{
    CodecError, DataFormat, ObjectValue, TypedValue, TypedValueDto, Value, VariableCodec,
};
use extask::ObjectType;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ObjectType)]
#[object_type(name = "com.acme.Customer")]
struct Customer {
    name: String,
    credit: i64,
    tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ObjectType)]
struct Unregistered {
    id: u32,
}

fn codec() -> VariableCodec {
    let mut types = extask::core::ObjectTypes::with_builtins();
    types.register::<Customer>();
    VariableCodec::new(types, DataFormat::Json)
}

fn customer() -> Customer {
    Customer {
        name: "Ada".into(),
        credit: 1_000,
        tags: vec!["gold".into(), "eu".into()],
    }
}

/// Dates between 1970 and 2100.
const MAX_SECS: i64 = 4_102_444_800;

fn primitive() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Boolean),
        any::<i16>().prop_map(Value::Short),
        any::<i32>().prop_map(Value::Integer),
        any::<i64>().prop_map(Value::Long),
        any::<f64>()
            .prop_filter("finite", |d| d.is_finite())
            .prop_map(Value::Double),
        ".*".prop_map(Value::String),
        (0i64..MAX_SECS, 0u32..1_000_000_000)
            .prop_map(|(secs, nanos)| Value::from(Utc.timestamp_opt(secs, nanos).unwrap())),
        proptest::collection::vec(any::<u8>(), 0..64).prop_map(Value::Bytes),
    ]
}

proptest! {
    #[test]
    fn decode_inverts_encode(value in primitive(), transient in any::<bool>()) {
        let codec = codec();
        let typed = TypedValue { value, transient };
        let dto = codec.encode(&typed).unwrap();
        prop_assert_eq!(codec.decode(&dto).unwrap(), typed);
    }

    #[test]
    fn decode_inverts_encode_through_json_text(value in primitive()) {
        let codec = codec();
        let typed = TypedValue::new(value);
        let text = serde_json::to_string(&codec.encode(&typed).unwrap()).unwrap();
        let dto: TypedValueDto = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(codec.decode(&dto).unwrap(), typed);
    }
}

#[test]
fn sub_millisecond_dates_round_trip_through_json_text() {
    let codec = codec();
    let typed = TypedValue::new(Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap());
    let text = serde_json::to_string(&codec.encode(&typed).unwrap()).unwrap();
    assert!(text.contains("2023-11-14T22:13:20.123+0000"), "{}", text);
    let dto: TypedValueDto = serde_json::from_str(&text).unwrap();
    assert_eq!(codec.decode(&dto).unwrap(), typed);
}

#[test]
fn doubles_keep_their_bits_through_json_text() {
    let codec = codec();
    for d in [1.0715660391465826e-75, 0.1 + 0.2, f64::MAX, f64::MIN_POSITIVE, -0.0] {
        let text = serde_json::to_string(&codec.encode(&TypedValue::new(d)).unwrap()).unwrap();
        let dto: TypedValueDto = serde_json::from_str(&text).unwrap();
        match codec.decode(&dto).unwrap().value {
            Value::Double(back) => assert_eq!(back.to_bits(), d.to_bits(), "{}", text),
            other => panic!("expected a double, got {:?}", other),
        }
    }
}

#[test]
fn transient_flag_is_normalized() {
    let codec = codec();

    let persistent = codec.encode(&TypedValue::new(5i32)).unwrap();
    let text = serde_json::to_value(&persistent).unwrap();
    assert_eq!(text, json!({"value": 5, "type": "Integer"}));

    let transient = codec.encode(&TypedValue::transient(5i32)).unwrap();
    let text = serde_json::to_value(&transient).unwrap();
    assert_eq!(text["valueInfo"], json!({"transient": true}));

    let absent: TypedValueDto = serde_json::from_value(json!({"value": 5, "type": "Integer"})).unwrap();
    assert!(!codec.decode(&absent).unwrap().transient);
}

#[test]
fn objects_round_trip_in_every_format() {
    let codec = codec();
    for format in [DataFormat::Json, DataFormat::Xml, DataFormat::Binary] {
        let original = Value::Object(ObjectValue::new(customer()).with_format(format));
        let dto = codec.encode(&TypedValue::new(original.clone())).unwrap();
        assert_eq!(dto.value_type.as_deref(), Some("Object"));
        assert_eq!(dto.value_info.object_type_name.as_deref(), Some("com.acme.Customer"));
        assert_eq!(dto.value_info.serialization_data_format.as_deref(), Some(format.name()));

        let decoded = codec.decode(&dto).unwrap().value;
        assert_eq!(decoded, original, "format {}", format.name());
        match decoded {
            Value::Object(object) => assert_eq!(object.deserialized::<Customer>(), Some(&customer())),
            other => panic!("expected an object, got {:?}", other),
        }
    }
}

#[test]
fn client_default_format_applies_when_none_is_requested() {
    let mut types = extask::core::ObjectTypes::with_builtins();
    types.register::<Customer>();
    let codec = VariableCodec::new(types, DataFormat::Xml);

    let dto = codec
        .encode(&TypedValue::new(ObjectValue::new(customer())))
        .unwrap();
    assert_eq!(
        dto.value_info.serialization_data_format.as_deref(),
        Some("application/xml")
    );
}

#[test]
fn unknown_object_type_names_the_type() {
    let codec = codec();
    let dto = codec
        .encode(&TypedValue::new(ObjectValue::new(Unregistered { id: 1 })))
        .unwrap();

    let err = codec.decode(&dto).unwrap_err();
    assert!(matches!(&err, CodecError::UnknownType { type_name } if type_name == "Unregistered"));
    assert!(err.to_string().contains("Unregistered"));
}

#[test]
fn malformed_payloads_are_unsupported() {
    let codec = codec();
    for (format, payload) in [
        ("application/json", r#"{"name": "Ada", "credit": "#),
        ("application/xml", "<Customer><name>Ada</name>"),
        ("application/x-bincode", "AAEC"),
        ("application/x-bincode", "%%% not base64 %%%"),
    ] {
        let mut dto = TypedValueDto::new("Object", json!(payload));
        dto.value_info.object_type_name = Some("com.acme.Customer".into());
        dto.value_info.serialization_data_format = Some(format.into());

        let err = codec.decode(&dto).unwrap_err();
        assert!(
            matches!(err, CodecError::UnsupportedType { .. }),
            "{} payload {:?} gave {:?}",
            format,
            payload,
            err
        );
    }
}

#[test]
fn unsupported_native_kind_fails_at_the_call_site() {
    #[derive(Debug)]
    struct Socket;

    let err = Value::from_native(Socket).unwrap_err();
    assert!(matches!(err, CodecError::UnsupportedType { .. }));
    assert!(err.to_string().contains("Socket"));
}
