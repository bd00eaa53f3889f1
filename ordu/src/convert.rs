//! Typed access: converting Rust values into the object graph and back.
//!
//! `#[derive(Mapped)]` implements every trait here for a struct.

use mongodb::bson::{self, Document, oid::ObjectId};
use std::collections::{BTreeMap, HashMap};

use crate::{
    Error, Mapper, Result,
    class::{ClassDef, TypeRef},
    value::{Link, Object, Value},
};

/// A Rust type with a declared [`TypeRef`].
pub trait Reflect {
    /// Whether an absent value is `None` rather than the type's zero value.
    const NULLABLE: bool = false;

    fn type_ref() -> TypeRef;

    /// Registers the class definitions this type needs.
    fn register_classes(_mapper: &Mapper) {}
}

pub trait IntoValue {
    fn to_value(&self) -> Value;
}

pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

/// A struct mapped to a class.
pub trait Mapped: Reflect + IntoValue + FromValue {
    const CLASS_NAME: &'static str;

    fn class_def() -> ClassDef;
}

fn mismatch<T>(expected: &str, value: &Value) -> Result<T> {
    Err(Error::codec("", expected, value.kind()))
}

macro_rules! impl_scalar {
    ($ty:ty, $type_ref:expr, $variant:ident, $zero:expr) => {
        impl Reflect for $ty {
            fn type_ref() -> TypeRef {
                $type_ref
            }
        }

        impl IntoValue for $ty {
            fn to_value(&self) -> Value {
                Value::$variant(self.clone())
            }
        }

        impl FromValue for $ty {
            fn from_value(value: Value) -> Result<Self> {
                match value {
                    Value::$variant(val) => Ok(val),
                    Value::Null => Ok($zero),
                    other => mismatch(stringify!($ty), &other),
                }
            }
        }
    };
}

impl_scalar!(bool, TypeRef::BOOL, Bool, false);
impl_scalar!(f64, TypeRef::DOUBLE, Double, 0.0);
impl_scalar!(String, TypeRef::STRING, String, String::new());
impl_scalar!(Document, TypeRef::DOCUMENT, Document, Document::new());

impl Reflect for i32 {
    fn type_ref() -> TypeRef {
        TypeRef::INT32
    }
}

impl IntoValue for i32 {
    fn to_value(&self) -> Value {
        Value::Int32(*self)
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int32(val) => Ok(val),
            Value::Int64(val) => i32::try_from(val).map_err(|_| Error::codec("", "int32", val)),
            Value::Null => Ok(0),
            other => mismatch("int32", &other),
        }
    }
}

impl Reflect for i64 {
    fn type_ref() -> TypeRef {
        TypeRef::INT64
    }
}

impl IntoValue for i64 {
    fn to_value(&self) -> Value {
        Value::Int64(*self)
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int64(val) => Ok(val),
            Value::Int32(val) => Ok(i64::from(val)),
            Value::Null => Ok(0),
            other => mismatch("int64", &other),
        }
    }
}

impl Reflect for ObjectId {
    fn type_ref() -> TypeRef {
        TypeRef::OBJECT_ID
    }
}

impl IntoValue for ObjectId {
    fn to_value(&self) -> Value {
        Value::ObjectId(*self)
    }
}

impl FromValue for ObjectId {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::ObjectId(val) => Ok(val),
            other => mismatch("objectId", &other),
        }
    }
}

impl Reflect for bson::DateTime {
    fn type_ref() -> TypeRef {
        TypeRef::DATE_TIME
    }
}

impl IntoValue for bson::DateTime {
    fn to_value(&self) -> Value {
        Value::DateTime(*self)
    }
}

impl FromValue for bson::DateTime {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::DateTime(val) => Ok(val),
            other => mismatch("date", &other),
        }
    }
}

impl Reflect for chrono::DateTime<chrono::Utc> {
    fn type_ref() -> TypeRef {
        TypeRef::DATE_TIME
    }
}

impl IntoValue for chrono::DateTime<chrono::Utc> {
    fn to_value(&self) -> Value {
        Value::DateTime(bson::DateTime::from_millis(self.timestamp_millis()))
    }
}

impl FromValue for chrono::DateTime<chrono::Utc> {
    fn from_value(value: Value) -> Result<Self> {
        let millis = bson::DateTime::from_value(value)?.timestamp_millis();

        chrono::DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| Error::codec("", "a representable date", millis))
    }
}

impl Reflect for Value {
    fn type_ref() -> TypeRef {
        TypeRef::Any
    }
}

impl IntoValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl<T: Reflect> Reflect for Option<T> {
    const NULLABLE: bool = true;

    fn type_ref() -> TypeRef {
        T::type_ref()
    }

    fn register_classes(mapper: &Mapper) {
        T::register_classes(mapper);
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, IntoValue::to_value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            value => T::from_value(value).map(Some),
        }
    }
}

impl<T: Reflect> Reflect for Vec<T> {
    fn type_ref() -> TypeRef {
        TypeRef::list(T::type_ref())
    }

    fn register_classes(mapper: &Mapper) {
        T::register_classes(mapper);
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(IntoValue::to_value).collect())
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::List(vals) => vals.into_iter().map(T::from_value).collect(),
            Value::Null => Ok(vec![]),
            other => mismatch("list", &other),
        }
    }
}

macro_rules! impl_map {
    ($map:ident) => {
        impl<T: Reflect> Reflect for $map<String, T> {
            fn type_ref() -> TypeRef {
                TypeRef::map(T::type_ref())
            }

            fn register_classes(mapper: &Mapper) {
                T::register_classes(mapper);
            }
        }

        impl<T: IntoValue> IntoValue for $map<String, T> {
            fn to_value(&self) -> Value {
                Value::Map(
                    self.iter()
                        .map(|(key, val)| (key.clone(), val.to_value()))
                        .collect(),
                )
            }
        }

        impl<T: FromValue> FromValue for $map<String, T> {
            fn from_value(value: Value) -> Result<Self> {
                match value {
                    Value::Map(vals) => vals
                        .into_iter()
                        .map(|(key, val)| Ok((key, T::from_value(val)?)))
                        .collect(),
                    Value::Null => Ok(Self::new()),
                    other => mismatch("map", &other),
                }
            }
        }
    };
}

impl_map!(BTreeMap);
impl_map!(HashMap);

/// A field holding a referenced entity: loaded, or only its stored link.
#[derive(Clone, Debug, PartialEq)]
pub enum Reference<T> {
    Loaded(T),
    Link(Link),
}

impl<T: Reflect> Reflect for Reference<T> {
    fn type_ref() -> TypeRef {
        T::type_ref()
    }

    fn register_classes(mapper: &Mapper) {
        T::register_classes(mapper);
    }
}

impl<T: IntoValue> IntoValue for Reference<T> {
    fn to_value(&self) -> Value {
        match self {
            Self::Loaded(val) => val.to_value(),
            Self::Link(link) => Value::Link(link.clone()),
        }
    }
}

impl<T: FromValue> FromValue for Reference<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Link(link) => Ok(Self::Link(link)),
            value => T::from_value(value).map(Self::Loaded),
        }
    }
}

/// Used by derived [`FromValue`] implementations.
#[doc(hidden)]
pub fn take_slot<T: FromValue>(object: &mut Object, slot: &str) -> Result<T> {
    T::from_value(object.take(slot)).map_err(|err| match err {
        Error::Codec {
            path,
            expected,
            found,
        } => Error::Codec {
            path: if path.is_empty() {
                format!("{}.{slot}", object.class())
            } else {
                format!("{}.{slot}.{path}", object.class())
            },
            expected,
            found,
        },
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nulls_become_rust_zero_values() {
        assert_eq!(String::from_value(Value::Null).unwrap(), "");
        assert_eq!(i64::from_value(Value::Null).unwrap(), 0);
        assert_eq!(Vec::<i32>::from_value(Value::Null).unwrap(), Vec::<i32>::new());
        assert_eq!(Option::<String>::from_value(Value::Null).unwrap(), None);
        assert!(ObjectId::from_value(Value::Null).is_err());
    }

    #[test]
    fn integers_widen_and_narrow_when_lossless() {
        assert_eq!(i64::from_value(Value::Int32(7)).unwrap(), 7);
        assert_eq!(i32::from_value(Value::Int64(7)).unwrap(), 7);
        assert!(i32::from_value(Value::Int64(i64::MAX)).is_err());
    }

    #[test]
    fn slot_errors_carry_the_path() {
        let mut object = Object::new("User").with("age", "old");

        let err = take_slot::<i32>(&mut object, "age").unwrap_err();

        assert!(matches!(err, Error::Codec { path, .. } if path == "User.age"));
    }

    #[test]
    fn chrono_dates_keep_millisecond_precision() {
        let now = chrono::DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();

        let value = now.to_value();

        assert_eq!(chrono::DateTime::<chrono::Utc>::from_value(value).unwrap(), now);
    }
}
