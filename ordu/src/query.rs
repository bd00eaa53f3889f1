//! Filter, update and sort documents keyed by property paths.
//!
//! Paths are written in terms of in-memory property names and translated
//! to storage names when the document is built:
//!
//! ```
//! use ordu::{ClassDef, FieldDef, Filter, FilterOperator, Mapper, TypeRef};
//! use mongodb::bson::doc;
//!
//! let mapper = Mapper::default();
//! mapper.register_class(
//!     ClassDef::entity("User")
//!         .field(FieldDef::new("id", TypeRef::OBJECT_ID).id())
//!         .field(FieldDef::new("name", TypeRef::STRING).rename("n")),
//! );
//!
//! let filter = Filter::new().field("name", FilterOperator::Eq("Kit".into()));
//!
//! assert_eq!(
//!     filter.to_document(&mapper, "User").unwrap(),
//!     doc! { "n": { "$eq": "Kit" } },
//! );
//! ```

use mongodb::bson::{Bson, Document, doc};
use std::fmt::Display;

use crate::{Error, Mapper, Result, class::TypeRef, path::PathTarget};

#[derive(Clone, Debug, PartialEq)]
pub enum FilterOperator {
    Eq(Bson),
    Ne(Bson),
    Gt(Bson),
    Gte(Bson),
    Lt(Bson),
    Lte(Bson),
    In(Vec<Bson>),
    Nin(Vec<Bson>),
    Exists(bool),
}

impl FilterOperator {
    pub fn to_document(&self) -> Document {
        let (operator, bson) = match self {
            Self::Eq(val) => ("$eq", val.clone()),
            Self::Ne(val) => ("$ne", val.clone()),
            Self::Gt(val) => ("$gt", val.clone()),
            Self::Gte(val) => ("$gte", val.clone()),
            Self::Lt(val) => ("$lt", val.clone()),
            Self::Lte(val) => ("$lte", val.clone()),
            Self::In(vals) => ("$in", Bson::Array(vals.clone())),
            Self::Nin(vals) => ("$nin", Bson::Array(vals.clone())),
            Self::Exists(exists) => ("$exists", Bson::Boolean(*exists)),
        };

        doc! { operator: bson }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, FilterOperator)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches the document with the given identifier.
    pub fn by_id(id: impl Into<Bson>) -> Self {
        Self::new().field("_id", FilterOperator::Eq(id.into()))
    }

    pub fn field(mut self, path: impl Display, operator: FilterOperator) -> Self {
        self.clauses.push((path.to_string(), operator));
        self
    }

    pub fn eq(self, path: impl Display, value: impl Into<Bson>) -> Self {
        self.field(path, FilterOperator::Eq(value.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Builds the filter document, translating every path against `class`.
    /// Several operators on one path are merged into one condition.
    pub fn to_document(&self, mapper: &Mapper, class: &str) -> Result<Document> {
        let mut document = Document::new();

        for (path, operator) in &self.clauses {
            let target = mapper.path(class, path)?.translated();

            match document.get_mut(&target) {
                Some(Bson::Document(condition)) => {
                    for (key, val) in operator.to_document() {
                        condition.insert(key, val);
                    }
                }
                _ => {
                    document.insert(target, operator.to_document());
                }
            }
        }

        Ok(document)
    }
}

#[derive(Clone, Debug, PartialEq)]
enum UpdateOperator {
    Set(Bson),
    Unset,
    Inc(Bson),
}

impl UpdateOperator {
    fn name(&self) -> &'static str {
        match self {
            Self::Set(_) => "$set",
            Self::Unset => "$unset",
            Self::Inc(_) => "$inc",
        }
    }

    fn operand(&self) -> Bson {
        match self {
            Self::Set(val) | Self::Inc(val) => val.clone(),
            Self::Unset => Bson::String(String::new()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Update {
    operations: Vec<(String, UpdateOperator)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Display, value: impl Into<Bson>) -> Self {
        self.operations
            .push((path.to_string(), UpdateOperator::Set(value.into())));
        self
    }

    pub fn unset(mut self, path: impl Display) -> Self {
        self.operations.push((path.to_string(), UpdateOperator::Unset));
        self
    }

    pub fn inc(mut self, path: impl Display, by: impl Into<Bson>) -> Self {
        self.operations
            .push((path.to_string(), UpdateOperator::Inc(by.into())));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Builds the update document, translating every path against `class`.
    ///
    /// Writes through a load-only property fail with
    /// [`Error::LoadOnlyWrite`]. Writes to a version property fail with
    /// [`Error::VersionWrite`]. For a versioned class the stored version is
    /// incremented along with the update, so copies read before it fail
    /// their next conditional write.
    pub fn to_document(&self, mapper: &Mapper, class: &str) -> Result<Document> {
        let mut document = Document::new();

        for (path, operator) in &self.operations {
            let target = mapper.path(class, path)?;
            check_writable(&target)?;

            insert_operand(
                &mut document,
                operator.name(),
                target.translated(),
                operator.operand(),
            );
        }

        if let Some(version) = mapper.model(class)?.version_property() {
            let one = if *version.ty() == TypeRef::INT32 {
                Bson::Int32(1)
            } else {
                Bson::Int64(1)
            };
            insert_operand(&mut document, "$inc", version.mapped_name().to_owned(), one);
        }

        Ok(document)
    }
}

fn insert_operand(document: &mut Document, operator: &str, path: String, operand: Bson) {
    let entry = document
        .entry(operator.to_owned())
        .or_insert_with(|| Bson::Document(Document::new()));
    if let Bson::Document(fields) = entry {
        fields.insert(path, operand);
    }
}

fn check_writable(target: &PathTarget) -> Result<()> {
    for (model, property) in target.properties() {
        if property.is_load_only() {
            return Err(Error::LoadOnlyWrite {
                class: model.class().to_owned(),
                path: target.path().to_owned(),
            });
        }

        if model
            .version_property()
            .is_some_and(|version| version.name() == property.name())
        {
            return Err(Error::VersionWrite {
                class: model.class().to_owned(),
                path: target.path().to_owned(),
            });
        }
    }

    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sort {
    keys: Vec<(String, Order)>,
}

impl Sort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by(mut self, path: impl Display, order: Order) -> Self {
        self.keys.push((path.to_string(), order));
        self
    }

    pub fn to_document(&self, mapper: &Mapper, class: &str) -> Result<Document> {
        let mut document = Document::new();

        for (path, order) in &self.keys {
            let direction = match order {
                Order::Asc => 1,
                Order::Desc => -1,
            };
            document.insert(mapper.path(class, path)?.translated(), direction);
        }

        Ok(document)
    }
}
