use mongodb::bson::{Bson, Document};
use std::collections::HashMap;

use crate::{
    class::{Callback, Construct, Getter, HookKind, ReferenceOptions, Setter, TypeRef},
    value::{Object, Value},
};

/// How a property's value is read from and written to an instance.
#[derive(Clone)]
pub enum Accessor {
    /// Direct access to a state slot.
    Field(String),
    Method { getter: Getter, setter: Setter },
}

impl Accessor {
    pub fn get(&self, object: &Object) -> Value {
        match self {
            Self::Field(slot) => object.get(slot).cloned().unwrap_or_default(),
            Self::Method { getter, .. } => getter(object),
        }
    }

    pub fn set(&self, object: &mut Object, value: Value) {
        match self {
            Self::Field(slot) => object.set(slot.clone(), value),
            Self::Method { setter, .. } => setter(object, value),
        }
    }
}

impl std::fmt::Debug for Accessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Field(slot) => f.debug_tuple("Field").field(slot).finish(),
            Self::Method { .. } => f.write_str("Method"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PropertyModel {
    pub(crate) name: String,
    pub(crate) mapped_name: String,
    pub(crate) also_load: Vec<String>,
    pub(crate) ty: TypeRef,
    pub(crate) declared_by: String,
    pub(crate) accessor: Accessor,
    pub(crate) load_only: bool,
    pub(crate) reference: Option<ReferenceOptions>,
}

impl PropertyModel {
    /// The in-memory name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The storage name.
    pub fn mapped_name(&self) -> &str {
        &self.mapped_name
    }

    /// Additional storage names accepted when loading.
    pub fn also_load(&self) -> &[String] {
        &self.also_load
    }

    /// The declared type with every type variable resolved.
    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }

    pub fn declared_by(&self) -> &str {
        &self.declared_by
    }

    pub fn accessor(&self) -> &Accessor {
        &self.accessor
    }

    pub fn is_load_only(&self) -> bool {
        self.load_only
    }

    pub fn reference(&self) -> Option<&ReferenceOptions> {
        self.reference.as_ref()
    }

    pub fn get(&self, object: &Object) -> Value {
        self.accessor.get(object)
    }

    pub fn set(&self, object: &mut Object, value: Value) {
        self.accessor.set(object, value);
    }

    pub(crate) fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.mapped_name == name || self.also_load.iter().any(|n| n == name)
    }

    /// The value stored under the canonical name, or else under the first
    /// alias present in the document.
    pub(crate) fn lookup<'d>(&self, document: &'d Document) -> Option<&'d Bson> {
        document
            .get(&self.mapped_name)
            .or_else(|| self.also_load.iter().find_map(|alias| document.get(alias)))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelKind {
    Entity { collection: String },
    Embedded,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Discriminator {
    pub key: String,
    pub value: String,
}

#[derive(Clone, Debug)]
pub struct BoundHook {
    pub name: String,
    pub declared_by: String,
    pub callback: Callback,
}

/// Lifecycle hooks bound to a model, in invocation order per kind.
#[derive(Clone, Debug, Default)]
pub struct Hooks(HashMap<HookKind, Vec<BoundHook>>);

impl Hooks {
    pub fn get(&self, kind: HookKind) -> &[BoundHook] {
        self.0.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    pub(crate) fn invoke(&self, kind: HookKind, object: &mut Object, document: &mut Document) {
        for hook in self.get(kind) {
            hook.callback.call(object, document);
        }
    }

    /// Adds a hook, replacing an inherited hook method of the same name.
    pub(crate) fn bind(&mut self, kind: HookKind, hook: BoundHook) {
        let hooks = self.0.entry(kind).or_default();
        match hooks.iter_mut().find(|bound| bound.name == hook.name) {
            Some(overridden) => *overridden = hook,
            None => hooks.push(hook),
        }
    }

    pub(crate) fn push(&mut self, kind: HookKind, hook: BoundHook) {
        self.0.entry(kind).or_default().push(hook);
    }
}

#[derive(Clone)]
pub(crate) struct BoundConstructor {
    pub(crate) params: Vec<usize>,
    pub(crate) construct: Construct,
}

/// The metamodel of one mapped class. Built once by a
/// [`Mapper`](crate::Mapper) and immutable afterwards.
#[derive(Clone)]
pub struct EntityModel {
    pub(crate) class: String,
    pub(crate) kind: ModelKind,
    pub(crate) properties: Vec<PropertyModel>,
    pub(crate) id: Option<usize>,
    pub(crate) version: Option<usize>,
    pub(crate) discriminator: Option<Discriminator>,
    pub(crate) discriminator_key: String,
    pub(crate) discriminators: HashMap<String, String>,
    pub(crate) ancestors: Vec<String>,
    pub(crate) subtypes: Vec<String>,
    pub(crate) hooks: Hooks,
    pub(crate) slots: Vec<(String, Value)>,
    pub(crate) constructor: Option<BoundConstructor>,
    pub(crate) is_abstract: bool,
    pub(crate) validate_paths: bool,
}

impl EntityModel {
    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn kind(&self) -> &ModelKind {
        &self.kind
    }

    pub fn is_entity(&self) -> bool {
        matches!(self.kind, ModelKind::Entity { .. })
    }

    pub fn collection(&self) -> Option<&str> {
        match &self.kind {
            ModelKind::Entity { collection } => Some(collection),
            ModelKind::Embedded => None,
        }
    }

    /// Persistent properties, identifier first.
    pub fn properties(&self) -> &[PropertyModel] {
        &self.properties
    }

    /// Looks a property up by in-memory name, storage name or alias.
    pub fn property(&self, name: &str) -> Option<&PropertyModel> {
        self.position(name).map(|i| &self.properties[i])
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.properties
            .iter()
            .position(|property| property.name == name)
            .or_else(|| {
                self.properties
                    .iter()
                    .position(|property| property.answers_to(name))
            })
    }

    pub fn id_property(&self) -> Option<&PropertyModel> {
        self.id.map(|i| &self.properties[i])
    }

    pub fn version_property(&self) -> Option<&PropertyModel> {
        self.version.map(|i| &self.properties[i])
    }

    pub fn discriminator(&self) -> Option<&Discriminator> {
        self.discriminator.as_ref()
    }

    /// The field the hierarchy stores discriminators under.
    pub fn discriminator_key(&self) -> &str {
        &self.discriminator_key
    }

    /// The class a discriminator value selects, limited to this class and
    /// its subtypes.
    pub fn class_for_discriminator(&self, value: &str) -> Option<&str> {
        self.discriminators.get(value).map(String::as_str)
    }

    /// Mapped ancestors, nearest first.
    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    /// Every registered mapped class descending from this one.
    pub fn subtypes(&self) -> &[String] {
        &self.subtypes
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn validates_paths(&self) -> bool {
        self.validate_paths
    }

    /// A fresh instance with every slot at its default or zero value.
    pub fn blank(&self) -> Object {
        let mut object = Object::new(self.class.clone());
        object.fill_missing(&self.slots);
        object
    }
}

impl std::fmt::Debug for EntityModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityModel")
            .field("class", &self.class)
            .field("kind", &self.kind)
            .field("properties", &self.properties)
            .field("id", &self.id_property().map(PropertyModel::name))
            .field("version", &self.version_property().map(PropertyModel::name))
            .field("discriminator", &self.discriminator)
            .field("subtypes", &self.subtypes)
            .finish_non_exhaustive()
    }
}
