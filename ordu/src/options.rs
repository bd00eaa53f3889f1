use heck::{ToKebabCase, ToLowerCamelCase, ToSnakeCase};
use serde::{Deserialize, Serialize};

use crate::discovery::{AccessorDiscovery, FieldDiscovery, PropertyDiscovery};

/// How in-memory names become storage names.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingStrategy {
    #[default]
    Identity,
    LowerCamelCase,
    SnakeCase,
    KebabCase,
    LowerCase,
}

impl NamingStrategy {
    pub fn apply(self, name: &str) -> String {
        match self {
            Self::Identity => name.to_owned(),
            Self::LowerCamelCase => name.to_lower_camel_case(),
            Self::SnakeCase => name.to_snake_case(),
            Self::KebabCase => name.to_kebab_case(),
            Self::LowerCase => name.to_lowercase(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryStrategy {
    /// State members become properties.
    #[default]
    Fields,
    /// Paired getter/setter methods become properties.
    Accessors,
}

impl DiscoveryStrategy {
    pub fn discovery(self) -> Box<dyn PropertyDiscovery> {
        match self {
            Self::Fields => Box::new(FieldDiscovery),
            Self::Accessors => Box::new(AccessorDiscovery),
        }
    }
}

/// The default discriminator value derived from a class name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscriminatorNaming {
    #[default]
    ClassName,
    SimpleName,
    LowerSimpleName,
}

/// Options of one mapping session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperOptions {
    pub discovery: DiscoveryStrategy,
    pub property_naming: NamingStrategy,
    pub collection_naming: NamingStrategy,
    pub discriminator_key: String,
    pub discriminator_naming: DiscriminatorNaming,
    pub enable_discriminators: bool,
    /// Store a discriminator even for classes outside any hierarchy.
    pub always_store_discriminator: bool,
    pub validate_paths: bool,
    pub store_nulls: bool,
    pub store_empties: bool,
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            discovery: DiscoveryStrategy::Fields,
            property_naming: NamingStrategy::Identity,
            collection_naming: NamingStrategy::SnakeCase,
            discriminator_key: "_t".into(),
            discriminator_naming: DiscriminatorNaming::ClassName,
            enable_discriminators: true,
            always_store_discriminator: false,
            validate_paths: true,
            store_nulls: false,
            store_empties: true,
        }
    }
}

impl MapperOptions {
    pub fn with_discovery(mut self, discovery: DiscoveryStrategy) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_property_naming(mut self, naming: NamingStrategy) -> Self {
        self.property_naming = naming;
        self
    }

    pub fn with_collection_naming(mut self, naming: NamingStrategy) -> Self {
        self.collection_naming = naming;
        self
    }

    pub fn with_discriminator_key(mut self, key: impl Into<String>) -> Self {
        self.discriminator_key = key.into();
        self
    }

    pub fn with_discriminator_naming(mut self, naming: DiscriminatorNaming) -> Self {
        self.discriminator_naming = naming;
        self
    }

    pub fn with_discriminators(mut self, enabled: bool) -> Self {
        self.enable_discriminators = enabled;
        self
    }

    pub fn with_always_store_discriminator(mut self, enabled: bool) -> Self {
        self.always_store_discriminator = enabled;
        self
    }

    pub fn with_path_validation(mut self, enabled: bool) -> Self {
        self.validate_paths = enabled;
        self
    }

    pub fn with_store_nulls(mut self, enabled: bool) -> Self {
        self.store_nulls = enabled;
        self
    }

    pub fn with_store_empties(mut self, enabled: bool) -> Self {
        self.store_empties = enabled;
        self
    }

    pub(crate) fn discriminator_value(&self, class_name: &str, simple_name: &str) -> String {
        match self.discriminator_naming {
            DiscriminatorNaming::ClassName => class_name.to_owned(),
            DiscriminatorNaming::SimpleName => simple_name.to_owned(),
            DiscriminatorNaming::LowerSimpleName => simple_name.to_lowercase(),
        }
    }
}
