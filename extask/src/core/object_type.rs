//! Stable object type names.
//!
//! Object variables travel with an `objectTypeName` so the receiving side can
//! pick the right type to deserialize into. `std::any::type_name()` is not
//! stable across compiler versions, so types opt in through [`ObjectType`],
//! normally via `#[derive(ObjectType)]`:
//!
//! ```ignore
//! use extask::prelude::*;
//!
//! #[derive(Serialize, Deserialize, ObjectType)]
//! #[object_type(name = "com.acme.Order")]
//! struct Order {
//!     id: String,
//! }
//!
//! assert_eq!(Order::object_type_name(), "com.acme.Order");
//! ```
//!
//! Without the attribute the type's identifier is used (`"Order"`).

/// Provides the stable `objectTypeName` recorded next to serialized objects.
///
/// The name is part of the wire contract between engine and workers; changing
/// it makes previously stored objects undecodable.
pub trait ObjectType {
    /// Returns the type name written to `valueInfo.objectTypeName`.
    fn object_type_name() -> &'static str;
}

macro_rules! builtin_object_type {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl ObjectType for $ty {
                fn object_type_name() -> &'static str {
                    $name
                }
            }
        )*
    };
}

// Collections used in handlers often enough to register by default.
builtin_object_type! {
    Vec<i32> => "Vec<i32>",
    Vec<i64> => "Vec<i64>",
    Vec<String> => "Vec<String>",
    std::collections::BTreeMap<String, String> => "BTreeMap<String,String>",
    serde_json::Value => "serde_json::Value",
}
