//! The in-memory side of the mapping: a small object graph that the codec
//! reads from and writes into.

use mongodb::bson::{self, Bson, Document, oid::ObjectId};
use std::{collections::BTreeMap, fmt::Display};

use crate::{Error, Result};

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(String),
    ObjectId(ObjectId),
    DateTime(bson::DateTime),
    Binary(bson::Binary),
    /// A raw document, stored as-is.
    Document(Document),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Object(Object),
    /// An unresolved reference to another entity.
    Link(Link),
    /// A BSON value with no counterpart above, kept as stored.
    Bson(Bson),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int32(val) => Some(i64::from(*val)),
            Self::Int64(val) => Some(*val),
            _ => None,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::ObjectId(_) => "objectId",
            Self::DateTime(_) => "date",
            Self::Binary(_) => "binary",
            Self::Document(_) => "document",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Object(_) => "object",
            Self::Link(_) => "link",
            Self::Bson(_) => "bson",
        }
    }

    /// Converts a BSON value without any type information.
    pub fn from_bson(bson: Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Self::Null,
            Bson::Boolean(val) => Self::Bool(val),
            Bson::Int32(val) => Self::Int32(val),
            Bson::Int64(val) => Self::Int64(val),
            Bson::Double(val) => Self::Double(val),
            Bson::String(val) => Self::String(val),
            Bson::ObjectId(val) => Self::ObjectId(val),
            Bson::DateTime(val) => Self::DateTime(val),
            Bson::Binary(val) => Self::Binary(val),
            Bson::Array(vals) => Self::List(vals.into_iter().map(Self::from_bson).collect()),
            Bson::Document(document) => Self::Map(
                document
                    .into_iter()
                    .map(|(key, val)| (key, Self::from_bson(val)))
                    .collect(),
            ),
            other => Self::Bson(other),
        }
    }

    /// Converts a value that holds no objects or links into BSON.
    pub fn to_bson(&self) -> Result<Bson> {
        let bson = match self {
            Self::Null => Bson::Null,
            Self::Bool(val) => Bson::Boolean(*val),
            Self::Int32(val) => Bson::Int32(*val),
            Self::Int64(val) => Bson::Int64(*val),
            Self::Double(val) => Bson::Double(*val),
            Self::String(val) => Bson::String(val.clone()),
            Self::ObjectId(val) => Bson::ObjectId(*val),
            Self::DateTime(val) => Bson::DateTime(*val),
            Self::Binary(val) => Bson::Binary(val.clone()),
            Self::Document(document) => Bson::Document(document.clone()),
            Self::List(vals) => Bson::Array(vals.iter().map(Self::to_bson).collect::<Result<_>>()?),
            Self::Map(vals) => Bson::Document(
                vals.iter()
                    .map(|(key, val)| Ok((key.clone(), val.to_bson()?)))
                    .collect::<Result<_>>()?,
            ),
            Self::Object(object) => {
                return Err(Error::codec(object.class(), "a plain value", "an object"));
            }
            Self::Link(link) => link.to_bson(),
            Self::Bson(val) => val.clone(),
        };

        Ok(bson)
    }
}

macro_rules! impl_from {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Self::$variant(value)
            }
        }
    };
}

impl_from!(bool, Bool);
impl_from!(i32, Int32);
impl_from!(i64, Int64);
impl_from!(f64, Double);
impl_from!(String, String);
impl_from!(ObjectId, ObjectId);
impl_from!(bson::DateTime, DateTime);
impl_from!(Document, Document);
impl_from!(Vec<Value>, List);
impl_from!(Object, Object);
impl_from!(Link, Link);
impl_from!(bson::Binary, Binary);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

/// An instance of a mapped class: the class name and its state slots.
#[derive(Clone, Debug, PartialEq)]
pub struct Object {
    class: String,
    slots: BTreeMap<String, Value>,
}

impl Object {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            slots: BTreeMap::new(),
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn get(&self, slot: &str) -> Option<&Value> {
        self.slots.get(slot)
    }

    pub fn get_mut(&mut self, slot: &str) -> Option<&mut Value> {
        self.slots.get_mut(slot)
    }

    pub fn set(&mut self, slot: impl Into<String>, value: impl Into<Value>) {
        self.slots.insert(slot.into(), value.into());
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, slot: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(slot, value);
        self
    }

    /// Removes a slot, returning [`Value::Null`] if it was never set.
    pub fn take(&mut self, slot: &str) -> Value {
        self.slots.remove(slot).unwrap_or_default()
    }

    pub fn slots(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.slots.iter().map(|(name, val)| (name.as_str(), val))
    }

    pub(crate) fn fill_missing(&mut self, blank: &[(String, Value)]) {
        for (slot, value) in blank {
            self.slots
                .entry(slot.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

impl TryFrom<Value> for Object {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(object) => Ok(object),
            other => Err(Error::codec("", "an object", other.kind())),
        }
    }
}

/// A stored reference to an entity: the id, plus the collection when the
/// reference was not stored as a bare id.
#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    pub collection: Option<String>,
    pub id: Bson,
}

impl Link {
    pub fn new(collection: impl Into<String>, id: impl Into<Bson>) -> Self {
        Self {
            collection: Some(collection.into()),
            id: id.into(),
        }
    }

    pub fn to_bson(&self) -> Bson {
        match &self.collection {
            Some(collection) => Bson::Document(bson::doc! {
                "$ref": collection.as_str(),
                "$id": self.id.clone(),
            }),
            None => self.id.clone(),
        }
    }

    pub(crate) fn from_bson(bson: Bson) -> Self {
        if let Bson::Document(document) = &bson {
            if let (Ok(collection), Some(id)) = (document.get_str("$ref"), document.get("$id")) {
                return Self {
                    collection: Some(collection.to_owned()),
                    id: id.clone(),
                };
            }
        }

        Self {
            collection: None,
            id: bson,
        }
    }
}

impl Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.collection {
            Some(collection) => write!(f, "{collection}/{}", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}
