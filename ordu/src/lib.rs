//! ordu is an object-document mapping core for `MongoDB`.
//!
//! It turns class definitions into entity models, encodes instances to BSON
//! documents and decodes them back, translates property paths into storage
//! paths, and drives optimistic versioning of writes.
//!
//! ## Example
//!
//! ```
//! use ordu::{Mapped, Mapper};
//! use mongodb::bson::oid::ObjectId;
//!
//! #[derive(Clone, Debug, PartialEq, Mapped)]
//! #[ordu(entity(collection = "users"))]
//! struct User {
//!     #[ordu(id)]
//!     id: Option<ObjectId>,
//!     #[ordu(version)]
//!     version: i64,
//!     #[ordu(rename = "n")]
//!     name: String,
//!     address: Address,
//! }
//!
//! #[derive(Clone, Debug, Default, PartialEq, Mapped)]
//! #[ordu(embedded)]
//! struct Address {
//!     street: String,
//! }
//!
//! let mapper = Mapper::default();
//! mapper.register::<User>();
//!
//! let mut user = User {
//!     id: Some(ObjectId::new()),
//!     version: 0,
//!     name: "Kit".into(),
//!     address: Address { street: "Main".into() },
//! };
//!
//! // Equivalent to:
//! // { _id: ObjectId(..), version: 0, n: "Kit", address: { street: "Main" } }
//! let document = mapper.to_document(&mut user).unwrap();
//! assert_eq!(document.get_str("n").unwrap(), "Kit");
//!
//! let loaded: User = mapper.from_document(document).unwrap();
//! assert_eq!(loaded, user);
//!
//! assert_eq!(
//!     mapper.path("User", &user::Fields::Name.to_string()).unwrap().translated(),
//!     "n"
//! );
//! ```
//!
//! Classes can also be described at runtime with [`ClassDef`] and handled
//! as dynamic [`Object`]s, which is what the derive macro generates.

#![warn(clippy::pedantic)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

extern crate self as ordu;

mod builder;
mod class;
mod codec;
mod convert;
mod datastore;
mod discovery;
mod error;
mod generics;
mod mapper;
mod model;
mod options;
mod path;
mod query;
mod store;
mod value;
mod versioning;

pub use class::{
    Callback, ClassDef, ConstructorDef, FieldDef, Getter, HookDef, HookKind, Mapping, Marker,
    MethodDef, MethodKind, ReferenceOptions, ScalarType, Setter, TypeParam, TypeRef,
};
pub use convert::{FromValue, IntoValue, Mapped, Reference, Reflect, take_slot};
pub use datastore::Datastore;
pub use discovery::{AccessorDiscovery, Candidate, FieldDiscovery, PropertyDiscovery};
pub use error::{Error, MappingError, Result};
pub use generics::Bindings;
pub use mapper::Mapper;
pub use model::{
    Accessor, BoundHook, Discriminator, EntityModel, Hooks, ModelKind, PropertyModel,
};
pub use options::{DiscoveryStrategy, DiscriminatorNaming, MapperOptions, NamingStrategy};
pub use path::{PathTarget, Resolution, Segment};
pub use query::{Filter, FilterOperator, Order, Sort, Update};
pub use store::{DocumentStore, MemoryStore, MongoStore, WriteOutcome};
pub use value::{Link, Object, Value};
pub use versioning::{WriteDirective, WriteKind};

pub use ordu_macros::Mapped;
