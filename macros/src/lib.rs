use proc_macro::TokenStream;
use std::collections::HashMap;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, LitStr};

/// Define a struct whose fields can be populated from the environment
///
/// The struct is emitted as written and `viaenv::EnvTarget` is implemented
/// for it. Every named field takes part unless marked `#[env(skip)]`.
/// `#[env(rename = "name")]` builds the environment key from `name` instead
/// of the field identifier. Two fields whose environment names are equal
/// ignoring case are a compile error.
#[proc_macro]
pub fn define_config(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match generate_config(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn generate_config(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let struct_name = &input.ident;
    let vis = &input.vis;
    let struct_attrs = &input.attrs;
    let generics = &input.generics;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "define_config! only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "define_config! only supports structs",
            ));
        }
    };

    let mut field_defs = Vec::new();
    let mut descriptor_pushes = Vec::new();
    let mut setter_arms = Vec::new();
    // Upper-cased environment name to the name that claimed it first
    let mut env_names: HashMap<String, String> = HashMap::new();

    for field in fields {
        let field_name = field
            .ident
            .as_ref()
            .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;
        let field_vis = &field.vis;
        let field_type = &field.ty;

        let config = parse_field_config(&field.attrs)?;

        // Keep everything but our own attribute on the emitted field
        let kept_attrs: Vec<&Attribute> = field
            .attrs
            .iter()
            .filter(|attr| !attr.path().is_ident("env"))
            .collect();
        field_defs.push(quote! {
            #(#kept_attrs)*
            #field_vis #field_name: #field_type
        });

        if config.skip {
            continue;
        }

        // Carry cfg attributes so feature gated fields stay consistent
        let cfg_attrs: Vec<&Attribute> = field
            .attrs
            .iter()
            .filter(|attr| attr.path().is_ident("cfg"))
            .collect();
        let env_name = config.rename.unwrap_or_else(|| field_name.to_string());
        if let Some(first) = env_names.insert(env_name.to_uppercase(), env_name.clone()) {
            return Err(syn::Error::new_spanned(
                field_name,
                format!(
                    "environment name `{}` is already used by `{}`",
                    env_name, first
                ),
            ));
        }

        descriptor_pushes.push(quote! {
            #(#cfg_attrs)*
            fields.push(::viaenv::FieldDescriptor::new::<#field_type>(#env_name));
        });
        setter_arms.push(quote! {
            #(#cfg_attrs)*
            #env_name => {
                self.#field_name = *value.downcast::<#field_type>()?;
                ::std::result::Result::Ok(())
            }
        });
    }

    let struct_def = quote! {
        #(#struct_attrs)*
        #vis struct #struct_name #generics #where_clause {
            #(#field_defs),*
        }
    };

    let target_impl = quote! {
        impl #impl_generics ::viaenv::EnvTarget for #struct_name #ty_generics #where_clause {
            fn env_fields(&self) -> ::std::vec::Vec<::viaenv::FieldDescriptor> {
                #[allow(unused_mut)]
                let mut fields = ::std::vec::Vec::new();
                #(#descriptor_pushes)*
                fields
            }

            fn set_field(
                &mut self,
                name: &str,
                value: ::viaenv::AnyValue,
            ) -> ::std::result::Result<(), ::viaenv::AnyValue> {
                match name {
                    #(#setter_arms)*
                    _ => ::std::result::Result::Err(value),
                }
            }
        }
    };

    Ok(quote! {
        #struct_def
        #target_impl
    })
}

#[derive(Debug, Default)]
struct FieldConfig {
    skip: bool,
    rename: Option<String>,
}

/// Parse `#[env(skip)]` and `#[env(rename = "name")]`
fn parse_field_config(attrs: &[Attribute]) -> syn::Result<FieldConfig> {
    let mut config = FieldConfig::default();

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("env")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                config.skip = true;
                Ok(())
            } else if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                if value.value().is_empty() {
                    return Err(meta.error("rename must not be empty"));
                }
                config.rename = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("expected `skip` or `rename = \"...\"`"))
            }
        })?;
    }

    if config.skip && config.rename.is_some() {
        return Err(syn::Error::new(
            proc_macro2::Span::call_site(),
            "a skipped field cannot be renamed",
        ));
    }

    Ok(config)
}
