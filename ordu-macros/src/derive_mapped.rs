use crate::{
    prelude::*,
    utils::{build_fields_enum, extract_named_fields, extract_serde_rename},
};

#[derive(Default, FromMeta)]
struct EntityAttribute {
    #[darling(default)]
    collection: Option<String>,
}

#[derive(FromAttributes)]
#[darling(attributes(ordu))]
struct Attributes {
    #[darling(default)]
    entity: Option<Override<EntityAttribute>>,
    #[darling(default)]
    embedded: Flag,
    #[darling(default)]
    discriminator: Option<String>,
    #[darling(default)]
    discriminator_key: Option<String>,
    #[darling(default)]
    no_discriminator: Flag,
}

#[derive(Default, FromMeta)]
struct ReferenceAttribute {
    #[darling(default)]
    id_only: Flag,
    #[darling(default)]
    lazy: Flag,
}

#[derive(FromAttributes)]
#[darling(attributes(ordu))]
struct FieldAttributes {
    #[darling(default)]
    id: Flag,
    #[darling(default)]
    version: Flag,
    #[darling(default)]
    transient: Flag,
    #[darling(default)]
    load_only: Flag,
    #[darling(default)]
    rename: Option<String>,
    #[darling(multiple)]
    also_load: Vec<String>,
    #[darling(default)]
    reference: Option<Override<ReferenceAttribute>>,
}

enum Kind {
    Entity { collection: Option<String> },
    Embedded,
}

struct FieldConfig {
    ident: Ident,
    ty: Type,
    attributes: FieldAttributes,
    rename: Option<String>,
}

pub fn derive_mapped(item: TokenStream) -> Result<TokenStream> {
    let input = parse2::<DeriveInput>(item)?;

    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.generics,
            "generic types cannot derive `Mapped`; describe them with `ClassDef`",
        ));
    }

    let attributes = Attributes::from_attributes(&input.attrs)?;

    let kind = match (attributes.entity, attributes.embedded.is_present()) {
        (Some(entity), false) => Kind::Entity {
            collection: entity.unwrap_or_default().collection,
        },
        (None, true) => Kind::Embedded,
        (Some(_), true) => {
            return Err(Error::new_spanned(
                &input.ident,
                "a type cannot be both `entity` and `embedded`",
            ));
        }
        (None, false) => {
            return Err(Error::new_spanned(
                &input.ident,
                "expected `#[ordu(entity)]` or `#[ordu(embedded)]`",
            ));
        }
    };

    let fields = extract_named_fields(input.span(), input.data)?
        .named
        .into_iter()
        .map(|field| {
            let attributes = FieldAttributes::from_attributes(&field.attrs)?;
            let rename = attributes
                .rename
                .clone()
                .or_else(|| extract_serde_rename(&field));

            let ident = field
                .ident
                .ok_or_else(|| Error::new(field.ty.span(), "expected named field"))?;

            Ok(FieldConfig {
                ident,
                ty: field.ty,
                attributes,
                rename,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if matches!(kind, Kind::Entity { .. })
        && !fields.iter().any(|field| field.attributes.id.is_present())
    {
        return Err(Error::new_spanned(
            &input.ident,
            "an entity must have a field marked `#[ordu(id)]`",
        ));
    }

    let class = ClassConfig {
        kind,
        discriminator: attributes.discriminator,
        discriminator_key: attributes.discriminator_key,
        no_discriminator: attributes.no_discriminator.is_present(),
    };

    Ok(build(&input.vis, &input.ident, &class, &fields))
}

struct ClassConfig {
    kind: Kind,
    discriminator: Option<String>,
    discriminator_key: Option<String>,
    no_discriminator: bool,
}

fn build(
    vis: &Visibility,
    ident: &Ident,
    class: &ClassConfig,
    fields: &[FieldConfig],
) -> TokenStream {
    let krate = krate();

    let mod_ident = Ident::new(&ident.to_string().to_snake_case(), Span::call_site());
    let class_name = LitStr::new(&ident.to_string(), Span::call_site());

    let field_idents = fields.iter().map(|field| &field.ident).collect_vec();
    let field_types = fields.iter().map(|field| &field.ty).collect_vec();
    let field_lits = fields
        .iter()
        .map(|field| LitStr::new(&field.ident.to_string(), Span::call_site()))
        .collect_vec();

    let class_def = {
        let mut class_def = match &class.kind {
            Kind::Entity { collection } => {
                let collection = collection
                    .as_ref()
                    .map(|collection| quote! { .collection(#collection) });
                quote! { #krate::ClassDef::entity(#class_name) #collection }
            }
            Kind::Embedded => quote! { #krate::ClassDef::embedded(#class_name) },
        };

        if let Some(discriminator) = &class.discriminator {
            class_def.extend(quote! { .discriminator(#discriminator) });
        }
        if let Some(key) = &class.discriminator_key {
            class_def.extend(quote! { .discriminator_key(#key) });
        }
        if class.no_discriminator {
            class_def.extend(quote! { .use_discriminator(false) });
        }

        for (field, lit) in fields.iter().zip(&field_lits) {
            let ty = &field.ty;
            let attributes = &field.attributes;

            let mut field_def = quote! {
                #krate::FieldDef::new(#lit, <#ty as #krate::Reflect>::type_ref())
            };

            if attributes.id.is_present() {
                field_def.extend(quote! { .id() });
            }
            if attributes.version.is_present() {
                field_def.extend(quote! { .version() });
            }
            if attributes.transient.is_present() {
                field_def.extend(quote! { .transient() });
            }
            if attributes.load_only.is_present() {
                field_def.extend(quote! { .load_only() });
            }
            if let Some(rename) = &field.rename {
                field_def.extend(quote! { .rename(#rename) });
            }
            if !attributes.also_load.is_empty() {
                let aliases = &attributes.also_load;
                field_def.extend(quote! { .also_load([ #( #aliases ),* ]) });
            }
            if let Some(reference) = &attributes.reference {
                let (id_only, lazy) = match reference {
                    Override::Inherit => (false, false),
                    Override::Explicit(reference) => {
                        (reference.id_only.is_present(), reference.lazy.is_present())
                    }
                };
                field_def.extend(quote! {
                    .reference(#krate::ReferenceOptions { id_only: #id_only, lazy: #lazy })
                });
            }

            class_def.extend(quote! {
                .field({
                    let field = #field_def;
                    if <#ty as #krate::Reflect>::NULLABLE {
                        field.default_value(#krate::Value::Null)
                    } else {
                        field
                    }
                })
            });
        }

        class_def
    };

    let fields_enum = build_fields_enum(field_idents.iter().copied(), field_lits.iter());

    quote! {
        impl #krate::Reflect for #ident {
            fn type_ref() -> #krate::TypeRef {
                #krate::TypeRef::class(#class_name)
            }

            fn register_classes(mapper: &#krate::Mapper) {
                if #krate::Mapper::register_class(mapper, <Self as #krate::Mapped>::class_def()) {
                    #(
                        <#field_types as #krate::Reflect>::register_classes(mapper);
                    )*
                }
            }
        }

        impl #krate::IntoValue for #ident {
            fn to_value(&self) -> #krate::Value {
                let mut object = #krate::Object::new(#class_name);
                #(
                    object.set(#field_lits, #krate::IntoValue::to_value(&self.#field_idents));
                )*
                #krate::Value::Object(object)
            }
        }

        impl #krate::FromValue for #ident {
            fn from_value(value: #krate::Value) -> #krate::Result<Self> {
                let mut object =
                    <#krate::Object as ::std::convert::TryFrom<#krate::Value>>::try_from(value)?;

                ::std::result::Result::Ok(Self {
                    #(
                        #field_idents: #krate::take_slot(&mut object, #field_lits)?
                    ),*
                })
            }
        }

        impl #krate::Mapped for #ident {
            const CLASS_NAME: &'static str = #class_name;

            fn class_def() -> #krate::ClassDef {
                #class_def
            }
        }

        #vis mod #mod_ident {
            #fields_enum
        }
    }
}
