//! Class definitions: the runtime description of a type that the mapper
//! introspects to build an [`EntityModel`](crate::EntityModel).
//!
//! A [`ClassDef`] plays the role that reflection plays in other languages. It
//! lists the type parameters, the superclass (with type arguments), state
//! members, accessor methods, lifecycle hook methods and, optionally, a
//! designated constructor.
//!
//! ```
//! use ordu::{ClassDef, FieldDef, TypeRef};
//!
//! let base = ClassDef::embedded("Base")
//!     .type_param("T")
//!     .field(FieldDef::new("value", TypeRef::var("T")));
//!
//! let leaf = ClassDef::entity("Leaf")
//!     .extends(TypeRef::generic("Base", [TypeRef::STRING]))
//!     .field(FieldDef::new("id", TypeRef::OBJECT_ID).id());
//! # let _ = (base, leaf);
//! ```

use mongodb::bson::Document;
use std::{fmt::Display, sync::Arc};

use crate::value::{Object, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Bool,
    Int32,
    Int64,
    Double,
    String,
    ObjectId,
    DateTime,
    Binary,
    Document,
}

impl Display for ScalarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Double => "double",
            Self::String => "string",
            Self::ObjectId => "objectId",
            Self::DateTime => "date",
            Self::Binary => "binary",
            Self::Document => "document",
        };

        f.write_str(name)
    }
}

/// A declared type, as written on a member. After model building every
/// `Var` and `Wildcard` has been substituted away.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Scalar(ScalarType),
    Class { name: String, args: Vec<TypeRef> },
    Var(String),
    Wildcard(Option<Box<TypeRef>>),
    List(Box<TypeRef>),
    /// String-keyed map.
    Map(Box<TypeRef>),
    Any,
}

impl TypeRef {
    pub const BOOL: Self = Self::Scalar(ScalarType::Bool);
    pub const INT32: Self = Self::Scalar(ScalarType::Int32);
    pub const INT64: Self = Self::Scalar(ScalarType::Int64);
    pub const DOUBLE: Self = Self::Scalar(ScalarType::Double);
    pub const STRING: Self = Self::Scalar(ScalarType::String);
    pub const OBJECT_ID: Self = Self::Scalar(ScalarType::ObjectId);
    pub const DATE_TIME: Self = Self::Scalar(ScalarType::DateTime);
    pub const BINARY: Self = Self::Scalar(ScalarType::Binary);
    pub const DOCUMENT: Self = Self::Scalar(ScalarType::Document);

    pub fn class(name: impl Into<String>) -> Self {
        Self::Class {
            name: name.into(),
            args: vec![],
        }
    }

    pub fn generic(name: impl Into<String>, args: impl IntoIterator<Item = TypeRef>) -> Self {
        Self::Class {
            name: name.into(),
            args: args.into_iter().collect(),
        }
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    pub fn wildcard(upper: Option<TypeRef>) -> Self {
        Self::Wildcard(upper.map(Box::new))
    }

    pub fn list(element: TypeRef) -> Self {
        Self::List(Box::new(element))
    }

    pub fn map(value: TypeRef) -> Self {
        Self::Map(Box::new(value))
    }

    /// The class this type stores, looking through lists and maps.
    pub fn element_class(&self) -> Option<&str> {
        match self {
            Self::Class { name, .. } => Some(name),
            Self::List(inner) | Self::Map(inner) => inner.element_class(),
            _ => None,
        }
    }

    /// The value an unset slot of this type holds.
    pub fn zero_value(&self) -> Value {
        match self {
            Self::Scalar(ScalarType::Bool) => Value::Bool(false),
            Self::Scalar(ScalarType::Int32) => Value::Int32(0),
            Self::Scalar(ScalarType::Int64) => Value::Int64(0),
            Self::Scalar(ScalarType::Double) => Value::Double(0.0),
            _ => Value::Null,
        }
    }
}

impl Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar(scalar) => write!(f, "{scalar}"),
            Self::Class { name, args } if args.is_empty() => f.write_str(name),
            Self::Class { name, args } => {
                write!(f, "{name}<")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(">")
            }
            Self::Var(name) => f.write_str(name),
            Self::Wildcard(None) => f.write_str("?"),
            Self::Wildcard(Some(upper)) => write!(f, "? extends {upper}"),
            Self::List(inner) => write!(f, "list<{inner}>"),
            Self::Map(inner) => write!(f, "map<{inner}>"),
            Self::Any => f.write_str("any"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeParam {
    pub name: String,
    pub bound: Option<TypeRef>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Marker {
    Entity { collection: Option<String> },
    Embedded,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReferenceOptions {
    /// Store only the id instead of a `{ $ref, $id }` link.
    pub id_only: bool,
    pub lazy: bool,
}

/// Mapping annotations carried by a field or accessor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Mapping {
    pub id: bool,
    pub version: bool,
    pub transient: bool,
    pub load_only: bool,
    pub rename: Option<String>,
    pub also_load: Vec<String>,
    pub reference: Option<ReferenceOptions>,
}

impl Mapping {
    /// Combines the annotations of a getter with those of its setter; the
    /// getter wins where both set a value.
    pub(crate) fn merge(mut self, other: &Self) -> Self {
        self.id |= other.id;
        self.version |= other.version;
        self.transient |= other.transient;
        self.load_only |= other.load_only;
        if self.rename.is_none() {
            self.rename.clone_from(&other.rename);
        }
        for alias in &other.also_load {
            if !self.also_load.contains(alias) {
                self.also_load.push(alias.clone());
            }
        }
        if self.reference.is_none() {
            self.reference.clone_from(&other.reference);
        }
        self
    }
}

macro_rules! mapping_builders {
    () => {
        pub fn id(mut self) -> Self {
            self.mapping.id = true;
            self
        }

        pub fn version(mut self) -> Self {
            self.mapping.version = true;
            self
        }

        /// Excludes the member from persistence through a mapping annotation.
        pub fn not_persisted(mut self) -> Self {
            self.mapping.transient = true;
            self
        }

        pub fn load_only(mut self) -> Self {
            self.mapping.load_only = true;
            self
        }

        pub fn rename(mut self, name: impl Into<String>) -> Self {
            self.mapping.rename = Some(name.into());
            self
        }

        pub fn also_load(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
            self.mapping
                .also_load
                .extend(names.into_iter().map(Into::into));
            self
        }

        pub fn reference(mut self, options: ReferenceOptions) -> Self {
            self.mapping.reference = Some(options);
            self
        }

        pub fn mapping(mut self, mapping: Mapping) -> Self {
            self.mapping = mapping;
            self
        }
    };
}

/// A state member.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeRef,
    pub is_static: bool,
    /// Language-level transience, as opposed to [`Mapping::transient`].
    pub is_transient: bool,
    pub default: Option<Value>,
    pub mapping: Mapping,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            is_static: false,
            is_transient: false,
            default: None,
            mapping: Mapping::default(),
        }
    }

    pub fn transient(mut self) -> Self {
        self.is_transient = true;
        self
    }

    pub fn static_member(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    mapping_builders!();
}

pub type Getter = Arc<dyn Fn(&Object) -> Value + Send + Sync>;
pub type Setter = Arc<dyn Fn(&mut Object, Value) + Send + Sync>;

#[derive(Clone)]
pub enum MethodKind {
    Getter { ty: TypeRef, get: Getter },
    Setter { ty: TypeRef, set: Setter },
}

/// An accessor method. Getters are named `get_x`, `getX` or `isX`, setters
/// `set_x` or `setX`.
#[derive(Clone)]
pub struct MethodDef {
    pub name: String,
    pub kind: MethodKind,
    pub mapping: Mapping,
}

impl MethodDef {
    pub fn getter(
        name: impl Into<String>,
        ty: TypeRef,
        get: impl Fn(&Object) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind: MethodKind::Getter {
                ty,
                get: Arc::new(get),
            },
            mapping: Mapping::default(),
        }
    }

    pub fn setter(
        name: impl Into<String>,
        ty: TypeRef,
        set: impl Fn(&mut Object, Value) + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind: MethodKind::Setter {
                ty,
                set: Arc::new(set),
            },
            mapping: Mapping::default(),
        }
    }

    mapping_builders!();
}

impl std::fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (kind, ty) = match &self.kind {
            MethodKind::Getter { ty, .. } => ("getter", ty),
            MethodKind::Setter { ty, .. } => ("setter", ty),
        };

        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("kind", &kind)
            .field("ty", ty)
            .field("mapping", &self.mapping)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookKind {
    PrePersist,
    PostPersist,
    PreLoad,
    PostLoad,
}

impl Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PrePersist => "pre-persist",
            Self::PostPersist => "post-persist",
            Self::PreLoad => "pre-load",
            Self::PostLoad => "post-load",
        };

        f.write_str(name)
    }
}

/// A lifecycle callback. The three shapes correspond to a hook method that
/// takes no arguments, one that takes the document, and one that takes the
/// document and returns its replacement.
#[derive(Clone)]
pub enum Callback {
    Plain(Arc<dyn Fn(&mut Object) + Send + Sync>),
    Document(Arc<dyn Fn(&mut Object, &mut Document) + Send + Sync>),
    Replace(Arc<dyn Fn(&mut Object, Document) -> Document + Send + Sync>),
}

impl Callback {
    pub fn plain(fun: impl Fn(&mut Object) + Send + Sync + 'static) -> Self {
        Self::Plain(Arc::new(fun))
    }

    pub fn document(fun: impl Fn(&mut Object, &mut Document) + Send + Sync + 'static) -> Self {
        Self::Document(Arc::new(fun))
    }

    pub fn replace(
        fun: impl Fn(&mut Object, Document) -> Document + Send + Sync + 'static,
    ) -> Self {
        Self::Replace(Arc::new(fun))
    }

    pub(crate) fn call(&self, object: &mut Object, document: &mut Document) {
        match self {
            Self::Plain(fun) => fun(object),
            Self::Document(fun) => fun(object, document),
            Self::Replace(fun) => {
                let taken = std::mem::take(document);
                *document = fun(object, taken);
            }
        }
    }
}

impl std::fmt::Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Plain(_) => "Callback::Plain",
            Self::Document(_) => "Callback::Document",
            Self::Replace(_) => "Callback::Replace",
        })
    }
}

#[derive(Clone, Debug)]
pub struct HookDef {
    pub name: String,
    pub kind: HookKind,
    pub callback: Callback,
}

pub type Construct = Arc<dyn Fn(Vec<Value>) -> Object + Send + Sync>;

/// A designated constructor whose parameters are bound by property name.
#[derive(Clone)]
pub struct ConstructorDef {
    pub params: Vec<String>,
    pub construct: Construct,
}

impl std::fmt::Debug for ConstructorDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstructorDef")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct ClassDef {
    pub name: String,
    pub marker: Option<Marker>,
    pub type_params: Vec<TypeParam>,
    pub superclass: Option<TypeRef>,
    pub is_abstract: bool,
    /// A non-static inner class, which needs an enclosing instance.
    pub is_inner: bool,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
    pub hooks: Vec<HookDef>,
    pub constructor: Option<ConstructorDef>,
    pub discriminator: Option<String>,
    pub discriminator_key: Option<String>,
    pub use_discriminator: Option<bool>,
    pub validate_paths: bool,
}

impl ClassDef {
    /// A class without a mapping marker. It can still contribute members as
    /// a superclass.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            marker: None,
            type_params: vec![],
            superclass: None,
            is_abstract: false,
            is_inner: false,
            fields: vec![],
            methods: vec![],
            hooks: vec![],
            constructor: None,
            discriminator: None,
            discriminator_key: None,
            use_discriminator: None,
            validate_paths: true,
        }
    }

    pub fn entity(name: impl Into<String>) -> Self {
        Self {
            marker: Some(Marker::Entity { collection: None }),
            ..Self::new(name)
        }
    }

    pub fn embedded(name: impl Into<String>) -> Self {
        Self {
            marker: Some(Marker::Embedded),
            ..Self::new(name)
        }
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.marker = Some(Marker::Entity {
            collection: Some(collection.into()),
        });
        self
    }

    pub fn type_param(self, name: impl Into<String>) -> Self {
        self.bounded_type_param(name, None)
    }

    pub fn bounded_type_param(mut self, name: impl Into<String>, bound: Option<TypeRef>) -> Self {
        self.type_params.push(TypeParam {
            name: name.into(),
            bound,
        });
        self
    }

    pub fn extends(mut self, superclass: TypeRef) -> Self {
        self.superclass = Some(superclass);
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn inner(mut self) -> Self {
        self.is_inner = true;
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    pub fn hook(mut self, kind: HookKind, name: impl Into<String>, callback: Callback) -> Self {
        self.hooks.push(HookDef {
            name: name.into(),
            kind,
            callback,
        });
        self
    }

    pub fn constructor(
        mut self,
        params: impl IntoIterator<Item = impl Into<String>>,
        construct: impl Fn(Vec<Value>) -> Object + Send + Sync + 'static,
    ) -> Self {
        self.constructor = Some(ConstructorDef {
            params: params.into_iter().map(Into::into).collect(),
            construct: Arc::new(construct),
        });
        self
    }

    pub fn discriminator(mut self, value: impl Into<String>) -> Self {
        self.discriminator = Some(value.into());
        self
    }

    pub fn discriminator_key(mut self, key: impl Into<String>) -> Self {
        self.discriminator_key = Some(key.into());
        self
    }

    pub fn use_discriminator(mut self, enabled: bool) -> Self {
        self.use_discriminator = Some(enabled);
        self
    }

    pub fn validate_paths(mut self, enabled: bool) -> Self {
        self.validate_paths = enabled;
        self
    }

    pub(crate) fn superclass_name(&self) -> Option<&str> {
        match &self.superclass {
            Some(TypeRef::Class { name, .. }) => Some(name),
            _ => None,
        }
    }

    /// The last segment of a `::` or `.` qualified class name.
    pub fn simple_name(&self) -> &str {
        self.name
            .rsplit(['.', ':'])
            .next()
            .unwrap_or(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_name_strips_qualifiers() {
        assert_eq!(ClassDef::new("app::model::User").simple_name(), "User");
        assert_eq!(ClassDef::new("com.example.User").simple_name(), "User");
        assert_eq!(ClassDef::new("User").simple_name(), "User");
    }

    #[test]
    fn getter_mapping_wins_over_setter() {
        let getter = Mapping {
            rename: Some("n".into()),
            also_load: vec!["old".into()],
            ..Default::default()
        };
        let setter = Mapping {
            rename: Some("other".into()),
            also_load: vec!["old".into(), "older".into()],
            load_only: true,
            ..Default::default()
        };

        let merged = getter.merge(&setter);

        assert_eq!(merged.rename.as_deref(), Some("n"));
        assert_eq!(merged.also_load, ["old", "older"]);
        assert!(merged.load_only);
    }

    #[test]
    fn replace_callback_swaps_the_document() {
        let callback = Callback::replace(|_, _| mongodb::bson::doc! { "replaced": true });
        let mut object = Object::new("User");
        let mut document = mongodb::bson::doc! { "name": "Kit" };

        callback.call(&mut object, &mut document);

        assert_eq!(document, mongodb::bson::doc! { "replaced": true });
    }
}
