use crate::parsing::ObjectTypeArgs;
use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput, LitStr};

pub fn derive_object_type_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let args = match ObjectTypeArgs::from_attributes(&input.attrs) {
        Ok(args) => args,
        Err(e) => return e.to_compile_error().into(),
    };

    let ident = &input.ident;
    let name = args
        .name
        .unwrap_or_else(|| LitStr::new(&ident.to_string(), ident.span()));
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        #[automatically_derived]
        impl #impl_generics ::extask::core::ObjectType for #ident #ty_generics #where_clause {
            fn object_type_name() -> &'static str {
                #name
            }
        }
    };

    TokenStream::from(expanded)
}
