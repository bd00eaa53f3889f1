use dashmap::{DashMap, mapref::entry::Entry};
use once_cell::sync::OnceCell;
use std::sync::Arc;

use crate::{
    Result,
    class::{Callback, ClassDef, HookDef, HookKind},
    convert::{Mapped, Reflect},
    discovery::PropertyDiscovery,
    error::MappingError,
    model::EntityModel,
    options::MapperOptions,
};

/// A mapping session: registered class definitions and listeners, the
/// options they are mapped with, and the models built from them.
///
/// Models are built lazily on first use and cached for the lifetime of the
/// mapper. Independently configured mappers never share models.
pub struct Mapper {
    pub(crate) options: MapperOptions,
    pub(crate) discovery: Box<dyn PropertyDiscovery>,
    pub(crate) classes: DashMap<String, Arc<ClassDef>>,
    pub(crate) listeners: DashMap<String, Vec<HookDef>>,
    models: DashMap<String, Arc<OnceCell<Arc<EntityModel>>>>,
}

impl Mapper {
    pub fn new(options: MapperOptions) -> Self {
        let discovery = options.discovery.discovery();
        Self::with_discovery(options, discovery)
    }

    /// A mapper with a custom discovery strategy, ignoring
    /// [`MapperOptions::discovery`].
    pub fn with_discovery(options: MapperOptions, discovery: Box<dyn PropertyDiscovery>) -> Self {
        Self {
            options,
            discovery,
            classes: DashMap::new(),
            listeners: DashMap::new(),
            models: DashMap::new(),
        }
    }

    pub fn options(&self) -> &MapperOptions {
        &self.options
    }

    /// Registers a class definition. Returns `false` if a class with the
    /// same name is already registered, in which case the first one is kept.
    ///
    /// Classes should be registered before any model of their hierarchy is
    /// built: published models are never updated.
    pub fn register_class(&self, class: ClassDef) -> bool {
        // Ancestors are looked up before the entry locks its shard.
        let ancestors = self.ancestor_names(&class);

        let Entry::Vacant(entry) = self.classes.entry(class.name.clone()) else {
            return false;
        };

        for ancestor in ancestors {
            if self.is_published(&ancestor) {
                tracing::warn!(
                    class = class.name,
                    ancestor,
                    "class registered after the model of its ancestor was built; \
                     the ancestor will not know this subtype"
                );
            }
        }

        entry.insert(Arc::new(class));
        true
    }

    /// Registers a typed class together with every class its fields use.
    pub fn register<T: Reflect>(&self) {
        T::register_classes(self);
    }

    pub fn class(&self, name: &str) -> Option<Arc<ClassDef>> {
        self.classes.get(name).map(|entry| Arc::clone(&entry))
    }

    /// Binds a listener hook to a class and its subclasses. Listener hooks
    /// run after the hooks a class declares itself.
    pub fn add_listener(
        &self,
        class: impl Into<String>,
        kind: HookKind,
        name: impl Into<String>,
        callback: Callback,
    ) {
        let class = class.into();

        if self.is_published(&class) {
            tracing::warn!(class, %kind, "listener added after the model was built");
        }

        self.listeners.entry(class).or_default().push(HookDef {
            name: name.into(),
            kind,
            callback,
        });
    }

    /// The model of a class, built on first use.
    ///
    /// Concurrent first calls for one class build it once; every caller
    /// receives the same instance. A failed build publishes nothing.
    pub fn model(&self, class: &str) -> Result<Arc<EntityModel>> {
        let cell = Arc::clone(&self.models.entry(class.to_owned()).or_default());

        let model = cell.get_or_try_init(|| {
            let model = self.build(class)?;

            tracing::debug!(
                class,
                properties = model.properties().len(),
                subtypes = model.subtypes().len(),
                "built entity model"
            );

            Ok::<_, MappingError>(Arc::new(model))
        })?;

        Ok(Arc::clone(model))
    }

    pub fn model_of<T: Mapped>(&self) -> Result<Arc<EntityModel>> {
        self.model(T::CLASS_NAME)
    }

    /// Models of every subtype of `model`.
    pub fn subtype_models(&self, model: &EntityModel) -> Result<Vec<Arc<EntityModel>>> {
        model
            .subtypes()
            .iter()
            .map(|subtype| self.model(subtype))
            .collect()
    }

    pub(crate) fn class_def(&self, name: &str) -> Result<Arc<ClassDef>, MappingError> {
        self.class(name).ok_or_else(|| MappingError::UnknownClass {
            class: name.to_owned(),
        })
    }

    fn is_published(&self, class: &str) -> bool {
        self.models
            .get(class)
            .is_some_and(|cell| cell.get().is_some())
    }

    fn ancestor_names(&self, class: &ClassDef) -> Vec<String> {
        let mut names = vec![];
        let mut next = class.superclass_name().map(ToOwned::to_owned);

        while let Some(name) = next {
            if name == class.name || names.contains(&name) {
                break;
            }
            next = self
                .class(&name)
                .and_then(|def| def.superclass_name().map(ToOwned::to_owned));
            names.push(name);
        }

        names
    }
}

impl Default for Mapper {
    fn default() -> Self {
        Self::new(MapperOptions::default())
    }
}

impl std::fmt::Debug for Mapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapper")
            .field("options", &self.options)
            .field("classes", &self.classes.len())
            .field("models", &self.models.len())
            .finish_non_exhaustive()
    }
}
