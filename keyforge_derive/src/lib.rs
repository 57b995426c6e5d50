use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::{
    Data, DeriveInput, Field, Fields, Ident, LitStr, Token, Type, parse_macro_input,
    spanned::Spanned,
};

/// Derives `keyforge::Keyed` from a `#[key_strategy(...)]` field attribute.
///
/// ```ignore
/// #[derive(Keyed)]
/// struct Person {
///     #[key_strategy(property, property, properties("last_name", "first_name"), separator = ",")]
///     id: Option<String>,
///     last_name: String,
///     first_name: String,
/// }
/// ```
///
/// Segments are listed in order (`property`, `random`, `time`,
/// `inverse_time`). Property names that match a struct field read that
/// field; any other name reads a same-named `&self` method.
#[proc_macro_derive(Keyed, attributes(key_strategy))]
pub fn derive_keyed(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_keyed(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct KeyStrategyAttr {
    segments: Vec<Ident>,
    properties: Vec<LitStr>,
    separator: Option<LitStr>,
    lowercase: bool,
}

fn expand_keyed(input: DeriveInput) -> syn::Result<TokenStream2> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            "#[derive(Keyed)] does not support generic types",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new(
                    input.ident.span(),
                    "#[derive(Keyed)] requires a struct with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new(
                input.ident.span(),
                "#[derive(Keyed)] can only be used on structs",
            ));
        }
    };

    let mut key: Option<(&Field, KeyStrategyAttr)> = None;
    for field in fields {
        let Some(parsed) = parse_key_strategy_attr(field)? else {
            continue;
        };
        if key.is_some() {
            return Err(syn::Error::new(
                field.span(),
                "only one field may carry #[key_strategy(...)]",
            ));
        }
        key = Some((field, parsed));
    }

    let Some((key_field, strategy)) = key else {
        return Err(syn::Error::new(
            input.ident.span(),
            "#[derive(Keyed)] requires one Option<String> field marked #[key_strategy(...)]",
        ));
    };

    if !is_option_string(&key_field.ty) {
        return Err(syn::Error::new(
            key_field.ty.span(),
            "#[key_strategy(...)] field must have type Option<String>",
        ));
    }

    let ident = &input.ident;
    let type_name = ident.to_string();
    let key_ident = key_field
        .ident
        .as_ref()
        .ok_or_else(|| syn::Error::new(key_field.span(), "key field must be named"))?;
    let key_name = key_ident.to_string();

    let segments = strategy.segments.iter().map(|segment| {
        let variant = match segment.to_string().as_str() {
            "property" => quote!(Property),
            "random" => quote!(Random),
            "time" => quote!(Time),
            _ => quote!(InverseTime),
        };
        quote!(::keyforge::KeySegment::#variant)
    });
    let names = &strategy.properties;
    let separator = strategy
        .separator
        .as_ref()
        .map(|lit| quote!(.separator(#lit)));
    let lowercase = strategy.lowercase;

    let mut registered = Vec::<String>::new();
    let mut readers = Vec::new();
    for lit in names {
        let name = lit.value().trim().to_string();
        if name.is_empty() || name == key_name || registered.contains(&name) {
            continue;
        }
        let field = fields
            .iter()
            .filter_map(|field| field.ident.as_ref())
            .find(|field_ident| *field_ident == name.as_str());
        readers.push(match field {
            Some(field_ident) => quote! {
                .field(#name, |entity: &#ident| ::keyforge::KeyPart::to_key_part(&entity.#field_ident))
            },
            None => {
                let method = syn::parse_str::<Ident>(&name)
                    .map_err(|_| syn::Error::new(lit.span(), format!("'{name}' is not a valid member name")))?;
                quote! {
                    .property(#name, |entity: &#ident| ::keyforge::KeyPart::to_key_part(&entity.#method()))
                }
            }
        });
        registered.push(name);
    }

    Ok(quote! {
        impl ::keyforge::Keyed for #ident {
            fn accessors() -> ::keyforge::EntityAccessors<Self> {
                ::keyforge::EntityAccessors::named(#type_name)
                    .key_field(
                        #key_name,
                        ::keyforge::KeyStrategy::new(::std::vec![#(#segments),*])
                            .properties(::std::vec::Vec::<&str>::from([#(#names),*]))
                            #separator
                            .lowercase(#lowercase),
                        |entity: &#ident| entity.#key_ident.as_deref(),
                        |entity: &mut #ident, key: ::std::string::String| entity.#key_ident = ::std::option::Option::Some(key),
                    )
                    #(#readers)*
            }
        }
    })
}

fn parse_key_strategy_attr(field: &Field) -> syn::Result<Option<KeyStrategyAttr>> {
    let mut parsed: Option<KeyStrategyAttr> = None;

    for attr in &field.attrs {
        if !attr.path().is_ident("key_strategy") {
            continue;
        }
        if parsed.is_some() {
            return Err(syn::Error::new(
                attr.span(),
                "duplicate #[key_strategy(...)] attribute",
            ));
        }

        let mut options = KeyStrategyAttr::default();
        attr.parse_nested_meta(|meta| {
            for segment in ["property", "random", "time", "inverse_time"] {
                if meta.path.is_ident(segment) {
                    options
                        .segments
                        .push(Ident::new(segment, meta.path.span()));
                    return Ok(());
                }
            }

            if meta.path.is_ident("properties") {
                let content;
                syn::parenthesized!(content in meta.input);
                let names = Punctuated::<LitStr, Token![,]>::parse_terminated(&content)?;
                options.properties.extend(names);
                return Ok(());
            }

            if meta.path.is_ident("separator") {
                let value = meta.value()?;
                options.separator = Some(value.parse()?);
                return Ok(());
            }

            if meta.path.is_ident("lowercase") {
                options.lowercase = true;
                return Ok(());
            }

            Err(meta.error(
                "Unsupported #[key_strategy(...)] option. Supported: property, random, time, inverse_time, properties(\"...\"), separator = \"...\", lowercase",
            ))
        })?;

        if options.segments.is_empty() {
            options.segments = options
                .properties
                .iter()
                .map(|lit| Ident::new("property", lit.span()))
                .collect();
        }
        parsed = Some(options);
    }

    Ok(parsed)
}

fn is_option_string(ty: &Type) -> bool {
    let Type::Path(path) = ty else {
        return false;
    };
    let Some(last) = path.path.segments.last() else {
        return false;
    };
    if last.ident != "Option" {
        return false;
    }
    let syn::PathArguments::AngleBracketed(args) = &last.arguments else {
        return false;
    };
    matches!(
        args.args.first(),
        Some(syn::GenericArgument::Type(Type::Path(inner)))
            if inner.path.segments.last().is_some_and(|segment| segment.ident == "String")
    )
}
