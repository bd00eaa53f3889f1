//! Property discovery: which members of a class become mapped properties.

use std::collections::HashMap;

use crate::{
    class::{ClassDef, Mapping, MethodKind, TypeRef},
    error::MappingError,
    model::Accessor,
    value::Value,
};

/// A member that may become a property, before type resolution and naming.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub name: String,
    pub ty: TypeRef,
    pub accessor: Accessor,
    pub mapping: Mapping,
    /// Language-level transience.
    pub is_transient: bool,
}

impl Candidate {
    pub fn is_persistent(&self) -> bool {
        !self.is_transient && !self.mapping.transient
    }
}

/// Enumerates candidate properties declared directly on one class.
pub trait PropertyDiscovery: Send + Sync {
    fn discover(&self, class: &ClassDef) -> Result<Vec<Candidate>, MappingError>;
}

/// Discovers state members.
#[derive(Clone, Copy, Debug, Default)]
pub struct FieldDiscovery;

impl PropertyDiscovery for FieldDiscovery {
    fn discover(&self, class: &ClassDef) -> Result<Vec<Candidate>, MappingError> {
        let candidates = class
            .fields
            .iter()
            .filter(|field| !field.is_static)
            .map(|field| Candidate {
                name: field.name.clone(),
                ty: field.ty.clone(),
                accessor: Accessor::Field(field.name.clone()),
                mapping: field.mapping.clone(),
                is_transient: field.is_transient,
            })
            .collect();

        Ok(candidates)
    }
}

/// Discovers getter/setter pairs. A getter without a setter (or the other
/// way around) is not a property.
#[derive(Clone, Copy, Debug, Default)]
pub struct AccessorDiscovery;

impl AccessorDiscovery {
    fn property_name(method: &str, prefixes: &[&str]) -> Option<String> {
        let rest = prefixes
            .iter()
            .find_map(|prefix| method.strip_prefix(prefix))?;

        if let Some(snake) = rest.strip_prefix('_') {
            return (!snake.is_empty()).then(|| snake.to_owned());
        }

        let mut chars = rest.chars();
        let first = chars.next()?;
        if !first.is_uppercase() {
            return None;
        }

        Some(first.to_lowercase().chain(chars).collect())
    }
}

impl PropertyDiscovery for AccessorDiscovery {
    fn discover(&self, class: &ClassDef) -> Result<Vec<Candidate>, MappingError> {
        let mut order = vec![];
        let mut getters = HashMap::new();
        let mut setters = HashMap::new();

        for method in &class.methods {
            match &method.kind {
                MethodKind::Getter { ty, get } => {
                    if let Some(name) = Self::property_name(&method.name, &["get", "is"]) {
                        if !order.contains(&name) {
                            order.push(name.clone());
                        }
                        getters.insert(name, (ty, get, &method.mapping));
                    }
                }
                MethodKind::Setter { ty, set } => {
                    if let Some(name) = Self::property_name(&method.name, &["set"]) {
                        setters.insert(name, (ty, set, &method.mapping));
                    }
                }
            }
        }

        let mut candidates = vec![];

        for name in order {
            let (Some((getter_ty, get, getter_mapping)), Some((setter_ty, set, setter_mapping))) =
                (getters.remove(&name), setters.remove(&name))
            else {
                continue;
            };

            if getter_ty != setter_ty {
                return Err(MappingError::UnmappableMember {
                    class: class.name.clone(),
                    property: name,
                    reason: format!("getter returns {getter_ty} but setter takes {setter_ty}"),
                });
            }

            candidates.push(Candidate {
                name,
                ty: getter_ty.clone(),
                accessor: Accessor::Method {
                    getter: get.clone(),
                    setter: set.clone(),
                },
                mapping: getter_mapping.clone().merge(setter_mapping),
                is_transient: false,
            });
        }

        Ok(candidates)
    }
}

/// The initial state of every non-static slot a class declares. Slots exist
/// whichever discovery strategy is in use.
pub(crate) fn slot_defaults(
    class: &ClassDef,
) -> impl Iterator<Item = (&str, &TypeRef, Option<&Value>)> {
    class
        .fields
        .iter()
        .filter(|field| !field.is_static)
        .map(|field| (field.name.as_str(), &field.ty, field.default.as_ref()))
}
