//! Derive macros for extask.
//!
//! `#[derive(ObjectType)]` gives a type the stable `objectTypeName` under
//! which its object variables travel on the wire. The name defaults to the
//! type's identifier and can be overridden:
//!
//! ```ignore
//! #[derive(ObjectType, Serialize, Deserialize, Debug)]
//! #[object_type(name = "com.acme.Invoice")]
//! struct Invoice {
//!     number: String,
//! }
//! ```

use proc_macro::TokenStream;

mod object_type;
mod parsing;

/// Implements `extask::core::ObjectType`.
///
/// Accepts `#[object_type(name = "...")]` to set the wire name explicitly.
#[proc_macro_derive(ObjectType, attributes(object_type))]
pub fn derive_object_type(input: TokenStream) -> TokenStream {
    object_type::derive_object_type_impl(input)
}
