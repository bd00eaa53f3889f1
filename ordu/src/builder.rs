//! Building an [`EntityModel`] from registered class definitions.

use std::{collections::HashMap, sync::Arc};

use crate::{
    class::{Callback, ClassDef, HookDef, HookKind, Marker, TypeRef},
    discovery::{Candidate, slot_defaults},
    error::MappingError,
    generics::Bindings,
    mapper::Mapper,
    model::{
        BoundConstructor, BoundHook, Discriminator, EntityModel, Hooks, ModelKind, PropertyModel,
    },
    value::Value,
};

type Lineage = Vec<(Arc<ClassDef>, Bindings)>;

struct Pending {
    property: PropertyModel,
    is_id: bool,
    is_version: bool,
}

impl Mapper {
    pub(crate) fn build(&self, name: &str) -> Result<EntityModel, MappingError> {
        let class = self.class_def(name)?;

        let Some(marker) = &class.marker else {
            return Err(MappingError::NotMappable {
                class: class.name.clone(),
            });
        };

        if class.is_inner && *marker == Marker::Embedded {
            return Err(MappingError::NonStaticInner {
                class: class.name.clone(),
            });
        }

        let lineage = self.lineage(&class)?;

        let (pending, slots) = self.collect_properties(&lineage)?;
        let (properties, id, version) = Self::identify(&class, marker, pending)?;

        let ancestors = lineage[1..]
            .iter()
            .filter(|(def, _)| def.marker.is_some())
            .map(|(def, _)| def.name.clone())
            .collect::<Vec<_>>();

        let subtypes = self.subtypes_of(&class.name);

        let use_discriminator = class
            .use_discriminator
            .or_else(|| lineage.iter().find_map(|(def, _)| def.use_discriminator))
            .unwrap_or(self.options.enable_discriminators);

        let discriminator_key = lineage
            .iter()
            .find_map(|(def, _)| def.discriminator_key.clone())
            .unwrap_or_else(|| self.options.discriminator_key.clone());

        let in_hierarchy = !ancestors.is_empty() || !subtypes.is_empty();

        let discriminator = (use_discriminator
            && (in_hierarchy || self.options.always_store_discriminator))
            .then(|| Discriminator {
                key: discriminator_key.clone(),
                value: self.discriminator_value(&class),
            });

        let mut discriminators = HashMap::new();
        discriminators.insert(self.discriminator_value(&class), class.name.clone());
        for subtype in &subtypes {
            let def = self.class_def(subtype)?;
            let value = self.discriminator_value(&def);
            if let Some(first) = discriminators.insert(value.clone(), def.name.clone()) {
                return Err(MappingError::DuplicateDiscriminator {
                    class: class.name.clone(),
                    value,
                    first,
                    second: def.name.clone(),
                });
            }
        }

        let hooks = self.bind_hooks(&lineage)?;

        let constructor = match &class.constructor {
            Some(constructor) => Some(BoundConstructor {
                params: constructor
                    .params
                    .iter()
                    .map(|param| {
                        properties
                            .iter()
                            .position(|property| property.name == *param)
                            .ok_or_else(|| MappingError::InvalidConstructor {
                                class: class.name.clone(),
                                parameter: param.clone(),
                            })
                    })
                    .collect::<Result<_, _>>()?,
                construct: Arc::clone(&constructor.construct),
            }),
            None => None,
        };

        let kind = match marker {
            Marker::Entity { collection } => ModelKind::Entity {
                collection: collection
                    .clone()
                    .or_else(|| Self::inherited_collection(&lineage))
                    .unwrap_or_else(|| self.options.collection_naming.apply(class.simple_name())),
            },
            Marker::Embedded => ModelKind::Embedded,
        };

        Ok(EntityModel {
            class: class.name.clone(),
            kind,
            properties,
            id,
            version,
            discriminator,
            discriminator_key,
            discriminators,
            ancestors,
            subtypes,
            hooks,
            slots,
            constructor,
            is_abstract: class.is_abstract,
            validate_paths: class.validate_paths,
        })
    }

    /// The class followed by its superclasses, each with the type variable
    /// bindings seen from the modeled class.
    fn lineage(&self, class: &Arc<ClassDef>) -> Result<Lineage, MappingError> {
        let mut lineage: Lineage = vec![];
        let mut current = Arc::clone(class);
        let mut bindings = Bindings::unbound(&class.type_params);

        loop {
            let next = match &current.superclass {
                Some(TypeRef::Class { name, args }) => {
                    let superclass = self.class_def(name)?;
                    let super_bindings = bindings.for_superclass(&superclass, args);
                    Some((superclass, super_bindings))
                }
                _ => None,
            };

            lineage.push((current, bindings));

            let Some((superclass, super_bindings)) = next else {
                break;
            };

            if lineage.iter().any(|(def, _)| def.name == superclass.name) {
                return Err(MappingError::InheritanceCycle {
                    class: class.name.clone(),
                });
            }

            current = superclass;
            bindings = super_bindings;
        }

        Ok(lineage)
    }

    /// Walks the lineage from the root down. A property redeclared by a
    /// subclass under the same name replaces the ancestor's in place.
    fn collect_properties(
        &self,
        lineage: &Lineage,
    ) -> Result<(Vec<Pending>, Vec<(String, Value)>), MappingError> {
        let mut pending: Vec<Pending> = vec![];
        let mut slots: Vec<(String, Value)> = vec![];

        for (def, bindings) in lineage.iter().rev() {
            let mut declared_here = HashMap::new();

            for candidate in self.discovery.discover(def)? {
                if !candidate.is_persistent() {
                    continue;
                }

                let next = self.property(def, bindings, candidate)?;

                // Several identifiers in one class are reported by `identify`.
                if let Some((first, first_is_id)) = declared_here.insert(
                    next.property.mapped_name.clone(),
                    (next.property.name.clone(), next.is_id),
                ) {
                    if !(first_is_id && next.is_id) {
                        return Err(MappingError::DuplicateMappedName {
                            class: def.name.clone(),
                            mapped_name: next.property.mapped_name,
                            first,
                            second: next.property.name,
                        });
                    }
                }

                let shadowed = pending.iter().position(|existing| {
                    existing.property.declared_by != def.name
                        && (existing.property.mapped_name == next.property.mapped_name
                            || existing.property.name == next.property.name)
                });

                match shadowed {
                    Some(i) => pending[i] = next,
                    None => pending.push(next),
                }
            }

            for (slot, ty, default) in slot_defaults(def) {
                let value = default
                    .cloned()
                    .unwrap_or_else(|| bindings.resolve(ty).zero_value());

                match slots.iter_mut().find(|(name, _)| name == slot) {
                    Some(existing) => existing.1 = value,
                    None => slots.push((slot.to_owned(), value)),
                }
            }
        }

        Ok((pending, slots))
    }

    fn property(
        &self,
        def: &ClassDef,
        bindings: &Bindings,
        candidate: Candidate,
    ) -> Result<Pending, MappingError> {
        let Candidate {
            name,
            ty,
            accessor,
            mapping,
            ..
        } = candidate;

        let ty = bindings.resolve(&ty);

        let mapped_name = if mapping.id {
            "_id".to_owned()
        } else if let Some(rename) = &mapping.rename {
            rename.clone()
        } else {
            self.options.property_naming.apply(&name)
        };

        let unmappable = |reason: String| MappingError::UnmappableMember {
            class: def.name.clone(),
            property: name.clone(),
            reason,
        };

        if let Some(target) = ty.element_class() {
            let target = self
                .class(target)
                .ok_or_else(|| unmappable(format!("`{target}` is not registered")))?;

            match (&target.marker, &mapping.reference) {
                (None, _) => {
                    return Err(unmappable(format!("`{}` is not mapped", target.name)));
                }
                (Some(Marker::Embedded), Some(_)) => {
                    return Err(unmappable(format!(
                        "`{}` is embedded and cannot be referenced",
                        target.name
                    )));
                }
                (Some(_), None) if target.is_inner => {
                    return Err(MappingError::NonStaticInner {
                        class: target.name.clone(),
                    });
                }
                _ => {}
            }
        } else if mapping.reference.is_some() {
            return Err(unmappable(format!("references need an entity type, found {ty}")));
        }

        if mapping.id && mapping.load_only {
            return Err(unmappable("an identifier cannot be load-only".into()));
        }

        Ok(Pending {
            property: PropertyModel {
                name,
                mapped_name,
                also_load: mapping.also_load,
                ty,
                declared_by: def.name.clone(),
                accessor,
                load_only: mapping.load_only,
                reference: mapping.reference,
            },
            is_id: mapping.id,
            is_version: mapping.version,
        })
    }

    /// Finds the identifier and version properties and moves the identifier
    /// to the front.
    #[allow(clippy::type_complexity)]
    fn identify(
        class: &ClassDef,
        marker: &Marker,
        pending: Vec<Pending>,
    ) -> Result<(Vec<PropertyModel>, Option<usize>, Option<usize>), MappingError> {
        let names = |filter: fn(&Pending) -> bool| {
            pending
                .iter()
                .filter(|p| filter(p))
                .map(|p| p.property.name.clone())
                .collect::<Vec<_>>()
        };

        if let Some(both) = pending.iter().find(|p| p.is_id && p.is_version) {
            return Err(MappingError::IdIsVersion {
                class: class.name.clone(),
                property: both.property.name.clone(),
            });
        }

        let ids = names(|p| p.is_id);
        if ids.len() > 1 {
            return Err(MappingError::MultipleIds {
                class: class.name.clone(),
                properties: ids,
            });
        }
        if ids.is_empty() && matches!(marker, Marker::Entity { .. }) {
            return Err(MappingError::MissingId {
                class: class.name.clone(),
            });
        }

        let versions = names(|p| p.is_version);
        if versions.len() > 1 {
            return Err(MappingError::MultipleVersions {
                class: class.name.clone(),
                properties: versions,
            });
        }

        let mut pending = pending;
        if let Some(i) = pending.iter().position(|p| p.is_id) {
            let id = pending.remove(i);
            pending.insert(0, id);
        }

        let id = pending.first().filter(|p| p.is_id).map(|_| 0);
        let version = pending.iter().position(|p| p.is_version);

        if let Some(i) = version {
            let property = &pending[i].property;
            if property.ty != TypeRef::INT32 && property.ty != TypeRef::INT64 {
                return Err(MappingError::InvalidVersionType {
                    class: class.name.clone(),
                    property: property.name.clone(),
                });
            }
        }

        let properties = pending.into_iter().map(|p| p.property).collect();

        Ok((properties, id, version))
    }

    /// Registered mapped classes that descend from `class`, sorted by name.
    fn subtypes_of(&self, class: &str) -> Vec<String> {
        let snapshot = self
            .classes
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect::<HashMap<_, _>>();

        let mut subtypes = snapshot
            .values()
            .filter(|def| def.marker.is_some() && def.name != class)
            .filter(|def| {
                let mut seen = vec![];
                let mut next = def.superclass_name();
                while let Some(name) = next {
                    if name == class {
                        return true;
                    }
                    if seen.contains(&name) {
                        return false;
                    }
                    seen.push(name);
                    next = snapshot.get(name).and_then(|def| def.superclass_name());
                }
                false
            })
            .map(|def| def.name.clone())
            .collect::<Vec<_>>();

        subtypes.sort();
        subtypes
    }

    fn discriminator_value(&self, class: &ClassDef) -> String {
        class.discriminator.clone().unwrap_or_else(|| {
            self.options
                .discriminator_value(&class.name, class.simple_name())
        })
    }

    fn inherited_collection(lineage: &Lineage) -> Option<String> {
        lineage[1..].iter().find_map(|(def, _)| match &def.marker {
            Some(Marker::Entity { collection }) => collection.clone(),
            _ => None,
        })
    }

    /// Class-declared hooks from the root down, each overriding an inherited
    /// hook method of the same name, followed by listener hooks.
    fn bind_hooks(&self, lineage: &Lineage) -> Result<Hooks, MappingError> {
        let mut hooks = Hooks::default();

        for (def, _) in lineage.iter().rev() {
            for hook in &def.hooks {
                Self::check_hook(def, hook)?;
                hooks.bind(hook.kind, Self::bound(def, hook));
            }
        }

        for (def, _) in lineage.iter().rev() {
            if let Some(listeners) = self.listeners.get(&def.name) {
                for hook in listeners.iter() {
                    Self::check_hook(def, hook)?;
                    hooks.push(hook.kind, Self::bound(def, hook));
                }
            }
        }

        Ok(hooks)
    }

    fn bound(def: &ClassDef, hook: &HookDef) -> BoundHook {
        BoundHook {
            name: hook.name.clone(),
            declared_by: def.name.clone(),
            callback: hook.callback.clone(),
        }
    }

    /// A post-load hook returning a document has nowhere to put it.
    fn check_hook(def: &ClassDef, hook: &HookDef) -> Result<(), MappingError> {
        if hook.kind == HookKind::PostLoad && matches!(hook.callback, Callback::Replace(_)) {
            return Err(MappingError::InvalidHook {
                class: def.name.clone(),
                hook: hook.name.clone(),
                kind: hook.kind.to_string(),
            });
        }

        Ok(())
    }
}
