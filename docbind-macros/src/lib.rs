//! Procedural macros for the docbind project.
//!
//! `#[derive(Model)]` generates the `docbind::model::Model` implementation of a struct
//! with named fields: its collection name, the serialized names of its persisted fields
//! and access to its identifier and update timestamp.
//!
//! ```ignore
//! use docbind::{Model, bson::{DateTime, oid::ObjectId}};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize, Model)]
//! #[serde(default)]
//! #[model(collection = "profiles")]
//! pub struct Profile {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     pub id: Option<ObjectId>,
//!     #[serde(rename = "_updated", skip_serializing_if = "Option::is_none")]
//!     pub updated: Option<DateTime>,
//!     pub title: String,
//!     #[serde(rename = "mail")]
//!     pub email: String,
//!     #[model(skip)]
//!     pub session_token: String,
//! }
//! ```
//!
//! The identifier is the `Option<ObjectId>` field serialized as `_id`; the optional
//! update timestamp is the `Option<DateTime>` field serialized as `_updated`. Either may
//! also be marked explicitly with `#[model(id)]` / `#[model(updated)]`. Fields marked
//! `#[model(skip)]` or `#[serde(skip)]` are not persisted.

#[allow(unused_extern_crates)]
extern crate self as docbind_macros;

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{
    Attribute, Data, DeriveInput, Fields, Ident, LitStr, Token, meta::ParseNestedMeta, parenthesized,
    parse_macro_input, spanned::Spanned,
};

const ID_KEY: &str = "_id";
const UPDATED_KEY: &str = "_updated";

/// Derives `docbind::model::Model` for a struct with named fields.
#[proc_macro_derive(Model, attributes(model))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

#[derive(Default)]
struct FieldAttrs {
    key: String,
    id: bool,
    updated: bool,
    skip: bool,
}

fn expand(input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let ident = &input.ident;
    let collection = container_collection(&input.attrs)?;

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(Span::call_site(), "Model can only be derived for structs"));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new(data.fields.span(), "Model requires a struct with named fields"));
    };

    let mut id_field: Option<&Ident> = None;
    let mut updated_field: Option<&Ident> = None;
    let mut persisted = Vec::new();

    for field in &fields.named {
        let Some(name) = field.ident.as_ref() else {
            continue;
        };
        let parsed = field_attrs(name, &field.attrs)?;

        if parsed.id || parsed.key == ID_KEY {
            if parsed.key != ID_KEY {
                return Err(syn::Error::new(
                    name.span(),
                    "the identifier field must be serialized as `_id`, add #[serde(rename = \"_id\")]",
                ));
            }
            if id_field.replace(name).is_some() {
                return Err(syn::Error::new(name.span(), "more than one identifier field"));
            }
        } else if parsed.updated || parsed.key == UPDATED_KEY {
            if parsed.key != UPDATED_KEY {
                return Err(syn::Error::new(
                    name.span(),
                    "the update timestamp field must be serialized as `_updated`, add #[serde(rename = \"_updated\")]",
                ));
            }
            if updated_field.replace(name).is_some() {
                return Err(syn::Error::new(name.span(), "more than one update timestamp field"));
            }
        } else if !parsed.skip {
            persisted.push(parsed.key);
        }
    }

    let Some(id_field) = id_field else {
        return Err(syn::Error::new(
            ident.span(),
            "Model requires an `Option<ObjectId>` field serialized as `_id`",
        ));
    };

    let collection_name = collection.map(|name| {
        quote! {
            fn collection_name() -> ::std::string::String {
                ::std::string::String::from(#name)
            }
        }
    });

    let set_updated = updated_field.map(|field| {
        quote! {
            fn set_updated(&mut self, at: ::docbind::bson::DateTime) {
                self.#field = ::std::option::Option::Some(at);
            }
        }
    });

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::docbind::model::Model for #ident #ty_generics #where_clause {
            #collection_name

            fn fields() -> &'static [&'static str] {
                &[#(#persisted),*]
            }

            fn id(&self) -> ::std::option::Option<&::docbind::bson::oid::ObjectId> {
                self.#id_field.as_ref()
            }

            fn set_id(&mut self, id: ::docbind::bson::oid::ObjectId) {
                self.#id_field = ::std::option::Option::Some(id);
            }

            #set_updated
        }
    })
}

fn container_collection(attrs: &[Attribute]) -> syn::Result<Option<LitStr>> {
    let mut collection = None;

    for attr in attrs {
        if attr.path().is_ident("model") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("collection") {
                    collection = Some(meta.value()?.parse::<LitStr>()?);
                    Ok(())
                } else {
                    Err(meta.error("expected `collection = \"...\"`"))
                }
            })?;
        } else if attr.path().is_ident("serde") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename_all") {
                    return Err(meta.error("Model does not support rename_all, rename fields individually"));
                }
                skip_value(&meta)
            })?;
        }
    }

    Ok(collection)
}

fn field_attrs(name: &Ident, attrs: &[Attribute]) -> syn::Result<FieldAttrs> {
    let mut parsed = FieldAttrs {
        key: name.to_string(),
        ..Default::default()
    };

    for attr in attrs {
        if attr.path().is_ident("model") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("id") {
                    parsed.id = true;
                } else if meta.path.is_ident("updated") {
                    parsed.updated = true;
                } else if meta.path.is_ident("skip") {
                    parsed.skip = true;
                } else {
                    return Err(meta.error("expected `id`, `updated` or `skip`"));
                }
                Ok(())
            })?;
        } else if attr.path().is_ident("serde") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") && meta.input.peek(Token![=]) {
                    parsed.key = meta.value()?.parse::<LitStr>()?.value();
                    Ok(())
                } else if meta.path.is_ident("skip") {
                    parsed.skip = true;
                    Ok(())
                } else {
                    skip_value(&meta)
                }
            })?;
        }
    }

    Ok(parsed)
}

/// Consumes the value of a serde attribute this macro does not interpret.
fn skip_value(meta: &ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(Token![=]) {
        meta.value()?.parse::<syn::Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        let _content;
        parenthesized!(_content in meta.input);
    }

    Ok(())
}
