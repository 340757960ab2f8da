//! Attribute parsing for `#[object_type(...)]`.

use syn::{Attribute, LitStr};

/// Arguments of the `#[object_type]` helper attribute.
#[derive(Default)]
pub(crate) struct ObjectTypeArgs {
    /// Explicit wire name; the type's identifier when absent.
    pub name: Option<LitStr>,
}

impl ObjectTypeArgs {
    /// Collects the arguments of every `#[object_type]` attribute in `attrs`.
    pub fn from_attributes(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut args = Self::default();
        for attr in attrs.iter().filter(|a| a.path().is_ident("object_type")) {
            attr.parse_nested_meta(|meta| args.parse_meta(meta))?;
        }
        Ok(args)
    }

    fn parse_meta(&mut self, meta: syn::meta::ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("name") {
            if self.name.is_some() {
                return Err(meta.error("duplicate `name` argument"));
            }
            let name: LitStr = meta.value()?.parse()?;
            if name.value().trim().is_empty() {
                return Err(syn::Error::new(name.span(), "object type name must not be empty"));
            }
            self.name = Some(name);
            Ok(())
        } else {
            Err(meta.error("unsupported object_type argument, expected `name = \"...\"`"))
        }
    }
}
