//! Encoding objects into documents and decoding them back.

use mongodb::bson::{Bson, Document};
use std::sync::Arc;

use crate::{
    Error, Mapper, Result,
    class::{HookKind, ReferenceOptions, ScalarType, TypeRef},
    convert::Mapped,
    model::{EntityModel, PropertyModel},
    value::{Link, Object, Value},
};

impl Mapper {
    /// Encodes an object with the model of its runtime class.
    pub fn encode(&self, object: &mut Object) -> Result<Document> {
        let model = self.model(object.class())?;
        self.encode_object(&model, object)
    }

    /// Decodes a document into an instance of `class`, or of the subtype
    /// its discriminator names.
    pub fn decode(&self, class: &str, document: Document) -> Result<Object> {
        let model = self.model(class)?;
        self.decode_object(&model, document)
    }

    /// Encodes a typed value. Changes pre-persist hooks make to the object are
    /// written back into `value`.
    pub fn to_document<T: Mapped>(&self, value: &mut T) -> Result<Document> {
        let mut object = Object::try_from(value.to_value())?;
        let document = self.encode(&mut object)?;
        *value = T::from_value(Value::Object(object))?;
        Ok(document)
    }

    pub fn from_document<T: Mapped>(&self, document: Document) -> Result<T> {
        let object = self.decode(T::CLASS_NAME, document)?;
        T::from_value(Value::Object(object))
    }

    pub(crate) fn encode_object(
        &self,
        model: &EntityModel,
        object: &mut Object,
    ) -> Result<Document> {
        let mut document = Document::new();

        model.hooks().invoke(HookKind::PrePersist, object, &mut document);

        for property in model.properties() {
            if property.is_load_only() {
                continue;
            }

            let mut value = property.get(object);
            let encoded = self.encode_property(model, property, &mut value)?;

            if property.ty().element_class().is_some() && property.reference().is_none() {
                property.set(object, value);
            }

            if let Some(bson) = encoded {
                document.insert(property.mapped_name(), bson);
            }
        }

        if let Some(discriminator) = model.discriminator() {
            document.insert(discriminator.key.as_str(), discriminator.value.as_str());
        }

        model.hooks().invoke(HookKind::PostPersist, object, &mut document);

        Ok(document)
    }

    fn encode_property(
        &self,
        model: &EntityModel,
        property: &PropertyModel,
        value: &mut Value,
    ) -> Result<Option<Bson>> {
        let path = format!("{}.{}", model.class(), property.name());

        if let Some(options) = property.reference() {
            return self.encode_reference(&path, property.ty(), options, value);
        }

        self.encode_value(&path, property.ty(), value)
    }

    fn encode_value(&self, path: &str, ty: &TypeRef, value: &mut Value) -> Result<Option<Bson>> {
        let bson = match (ty, value) {
            (_, Value::Null) => return Ok(self.options.store_nulls.then_some(Bson::Null)),
            (TypeRef::List(_), Value::List(vals))
                if vals.is_empty() && !self.options.store_empties =>
            {
                return Ok(None);
            }
            (TypeRef::Map(_), Value::Map(vals))
                if vals.is_empty() && !self.options.store_empties =>
            {
                return Ok(None);
            }
            (TypeRef::List(element), Value::List(vals)) => {
                let mut array = Vec::with_capacity(vals.len());
                for (i, val) in vals.iter_mut().enumerate() {
                    let element_path = format!("{path}.{i}");
                    let bson = self.encode_value(&element_path, element, val)?;
                    array.push(bson.unwrap_or(Bson::Null));
                }
                Bson::Array(array)
            }
            (TypeRef::Map(element), Value::Map(vals)) => {
                let mut document = Document::new();
                for (key, val) in vals.iter_mut() {
                    let entry_path = format!("{path}.{key}");
                    if let Some(bson) = self.encode_value(&entry_path, element, val)? {
                        document.insert(key.as_str(), bson);
                    }
                }
                Bson::Document(document)
            }
            (TypeRef::Class { .. }, Value::Object(object)) => {
                let model = self.model(object.class())?;
                Bson::Document(self.encode_object(&model, object)?)
            }
            (TypeRef::Scalar(scalar), value) => Self::encode_scalar(path, *scalar, value)?,
            (TypeRef::Any, Value::Object(object)) => {
                let model = self.model(object.class())?;
                Bson::Document(self.encode_object(&model, object)?)
            }
            (TypeRef::Any, value) => self.encode_any(path, value)?,
            (ty, value) => return Err(Error::codec(path, ty, value.kind())),
        };

        Ok(Some(bson))
    }

    fn encode_any(&self, path: &str, value: &mut Value) -> Result<Bson> {
        let bson = match value {
            Value::List(vals) => Bson::Array(
                vals.iter_mut()
                    .map(|val| {
                        self.encode_value(path, &TypeRef::Any, val)
                            .map(|bson| bson.unwrap_or(Bson::Null))
                    })
                    .collect::<Result<_>>()?,
            ),
            Value::Map(vals) => {
                let mut document = Document::new();
                for (key, val) in vals.iter_mut() {
                    if let Some(bson) = self.encode_value(path, &TypeRef::Any, val)? {
                        document.insert(key.as_str(), bson);
                    }
                }
                Bson::Document(document)
            }
            other => other.to_bson()?,
        };

        Ok(bson)
    }

    #[allow(clippy::cast_precision_loss)]
    fn encode_scalar(path: &str, scalar: ScalarType, value: &Value) -> Result<Bson> {
        let matches = matches!(
            (scalar, value),
            (ScalarType::Bool, Value::Bool(_))
                | (ScalarType::Int32, Value::Int32(_))
                | (ScalarType::Int64, Value::Int64(_))
                | (ScalarType::Double, Value::Double(_))
                | (ScalarType::String, Value::String(_))
                | (ScalarType::ObjectId, Value::ObjectId(_))
                | (ScalarType::DateTime, Value::DateTime(_))
                | (ScalarType::Binary, Value::Binary(_))
                | (ScalarType::Document, Value::Document(_) | Value::Map(_))
        );

        match (scalar, value) {
            _ if matches => value.to_bson(),
            (ScalarType::Int64, Value::Int32(val)) => Ok(Bson::Int64(i64::from(*val))),
            (ScalarType::Int32, Value::Int64(val)) => i32::try_from(*val)
                .map(Bson::Int32)
                .map_err(|_| Error::codec(path, scalar, "an out of range int64")),
            (ScalarType::Double, Value::Int32(val)) => Ok(Bson::Double(f64::from(*val))),
            (ScalarType::Double, Value::Int64(val)) => Ok(Bson::Double(*val as f64)),
            _ => Err(Error::codec(path, scalar, value.kind())),
        }
    }

    fn encode_reference(
        &self,
        path: &str,
        ty: &TypeRef,
        options: &ReferenceOptions,
        value: &mut Value,
    ) -> Result<Option<Bson>> {
        let bson = match (ty, value) {
            (_, Value::Null) => return Ok(self.options.store_nulls.then_some(Bson::Null)),
            (_, Value::Link(link)) => link.to_bson(),
            (TypeRef::List(element), Value::List(vals)) => Bson::Array(
                vals.iter_mut()
                    .map(|val| {
                        self.encode_reference(path, element, options, val)
                            .map(|bson| bson.unwrap_or(Bson::Null))
                    })
                    .collect::<Result<_>>()?,
            ),
            (TypeRef::Map(element), Value::Map(vals)) => {
                let mut document = Document::new();
                for (key, val) in vals.iter_mut() {
                    if let Some(bson) = self.encode_reference(path, element, options, val)? {
                        document.insert(key.as_str(), bson);
                    }
                }
                Bson::Document(document)
            }
            (TypeRef::Class { .. }, Value::Object(object)) => {
                self.link_to(path, object, options)?.to_bson()
            }
            (ty, value) => return Err(Error::codec(path, ty, value.kind())),
        };

        Ok(Some(bson))
    }

    fn link_to(&self, path: &str, object: &Object, options: &ReferenceOptions) -> Result<Link> {
        let model = self.model(object.class())?;

        let (Some(id), Some(collection)) = (model.id_property(), model.collection()) else {
            return Err(Error::codec(path, "a referenceable entity", object.class()));
        };

        let id = id.get(object);
        if id.is_null() {
            return Err(Error::codec(path, "a saved entity with an id", "an unsaved entity"));
        }

        Ok(Link {
            collection: (!options.id_only).then(|| collection.to_owned()),
            id: id.to_bson()?,
        })
    }

    /// The model a document should be decoded with: the subtype named by
    /// its discriminator, or `model` itself.
    pub(crate) fn concrete_model(
        &self,
        model: &Arc<EntityModel>,
        document: &Document,
    ) -> Result<Arc<EntityModel>> {
        let Some(value) = document.get(model.discriminator_key()) else {
            return Ok(Arc::clone(model));
        };

        let value = match value {
            Bson::String(value) => value.as_str(),
            other => {
                return Err(Error::UnknownDiscriminator {
                    class: model.class().to_owned(),
                    value: other.to_string(),
                });
            }
        };

        if model.discriminator().is_some_and(|own| own.value == value) {
            return Ok(Arc::clone(model));
        }

        let class = model
            .class_for_discriminator(value)
            .ok_or_else(|| Error::UnknownDiscriminator {
                class: model.class().to_owned(),
                value: value.to_owned(),
            })?;

        tracing::trace!(static_class = model.class(), class, "resolved discriminator");

        self.model(class)
    }

    pub(crate) fn decode_object(
        &self,
        model: &Arc<EntityModel>,
        mut document: Document,
    ) -> Result<Object> {
        let model = self.concrete_model(model, &document)?;

        if model.is_abstract() {
            return Err(Error::Abstract {
                class: model.class().to_owned(),
            });
        }

        let mut object = model.blank();

        model.hooks().invoke(HookKind::PreLoad, &mut object, &mut document);

        let mut constructed = vec![];

        if let Some(constructor) = &model.constructor {
            let mut args = Vec::with_capacity(constructor.params.len());
            for &i in &constructor.params {
                let property = &model.properties()[i];
                let value = match property.lookup(&document) {
                    Some(bson) => self.decode_property(&model, property, bson.clone())?,
                    None => property.get(&object),
                };
                args.push(value);
            }

            let mut built = (constructor.construct)(args);
            built.fill_missing(&model.slots);
            object = built;
            constructed.extend_from_slice(&constructor.params);
        }

        for (i, property) in model.properties().iter().enumerate() {
            if constructed.contains(&i) {
                continue;
            }

            if let Some(bson) = property.lookup(&document) {
                let value = self.decode_property(&model, property, bson.clone())?;
                property.set(&mut object, value);
            }
        }

        if tracing::enabled!(tracing::Level::TRACE) {
            for key in document.keys() {
                let known = key == model.discriminator_key()
                    || model.properties().iter().any(|p| p.lookup_key(key));
                if !known {
                    tracing::trace!(class = model.class(), field = key, "ignored unmapped field");
                }
            }
        }

        model.hooks().invoke(HookKind::PostLoad, &mut object, &mut document);

        Ok(object)
    }

    fn decode_property(
        &self,
        model: &EntityModel,
        property: &PropertyModel,
        bson: Bson,
    ) -> Result<Value> {
        let path = format!("{}.{}", model.class(), property.name());

        if property.reference().is_some() {
            return Self::decode_reference(&path, property.ty(), bson);
        }

        self.decode_value(&path, property.ty(), bson)
    }

    fn decode_value(&self, path: &str, ty: &TypeRef, bson: Bson) -> Result<Value> {
        let value = match (ty, bson) {
            (_, Bson::Null | Bson::Undefined) => Value::Null,
            (TypeRef::List(element), Bson::Array(vals)) => Value::List(
                vals.into_iter()
                    .enumerate()
                    .map(|(i, val)| self.decode_value(&format!("{path}.{i}"), element, val))
                    .collect::<Result<_>>()?,
            ),
            (TypeRef::Map(element), Bson::Document(document)) => Value::Map(
                document
                    .into_iter()
                    .map(|(key, val)| {
                        let val = self.decode_value(&format!("{path}.{key}"), element, val)?;
                        Ok((key, val))
                    })
                    .collect::<Result<_>>()?,
            ),
            (TypeRef::Class { name, .. }, Bson::Document(document)) => {
                let model = self.model(name)?;
                Value::Object(self.decode_object(&model, document)?)
            }
            (TypeRef::Scalar(scalar), bson) => Self::decode_scalar(path, *scalar, bson)?,
            (TypeRef::Any, bson) => Value::from_bson(bson),
            (ty, bson) => return Err(Error::codec(path, ty, bson.element_type_name())),
        };

        Ok(value)
    }

    #[allow(clippy::cast_precision_loss)]
    fn decode_scalar(path: &str, scalar: ScalarType, bson: Bson) -> Result<Value> {
        let value = match (scalar, bson) {
            (ScalarType::Bool, Bson::Boolean(val)) => Value::Bool(val),
            (ScalarType::Int32, Bson::Int32(val)) => Value::Int32(val),
            (ScalarType::Int32, Bson::Int64(val)) => Value::Int32(
                i32::try_from(val)
                    .map_err(|_| Error::codec(path, scalar, "an out of range int64"))?,
            ),
            (ScalarType::Int64, Bson::Int64(val)) => Value::Int64(val),
            (ScalarType::Int64, Bson::Int32(val)) => Value::Int64(i64::from(val)),
            (ScalarType::Double, Bson::Double(val)) => Value::Double(val),
            (ScalarType::Double, Bson::Int32(val)) => Value::Double(f64::from(val)),
            (ScalarType::Double, Bson::Int64(val)) => Value::Double(val as f64),
            (ScalarType::String, Bson::String(val)) => Value::String(val),
            (ScalarType::ObjectId, Bson::ObjectId(val)) => Value::ObjectId(val),
            (ScalarType::DateTime, Bson::DateTime(val)) => Value::DateTime(val),
            (ScalarType::Binary, Bson::Binary(val)) => Value::Binary(val),
            (ScalarType::Document, Bson::Document(val)) => Value::Document(val),
            (scalar, bson) => return Err(Error::codec(path, scalar, bson.element_type_name())),
        };

        Ok(value)
    }

    fn decode_reference(path: &str, ty: &TypeRef, bson: Bson) -> Result<Value> {
        let value = match (ty, bson) {
            (_, Bson::Null | Bson::Undefined) => Value::Null,
            (TypeRef::List(element), Bson::Array(vals)) => Value::List(
                vals.into_iter()
                    .map(|val| Self::decode_reference(path, element, val))
                    .collect::<Result<_>>()?,
            ),
            (TypeRef::Map(element), Bson::Document(document)) if !is_link(&document) => Value::Map(
                document
                    .into_iter()
                    .map(|(key, val)| Ok((key, Self::decode_reference(path, element, val)?)))
                    .collect::<Result<_>>()?,
            ),
            (TypeRef::Class { .. }, bson) => Value::Link(Link::from_bson(bson)),
            (ty, bson) => return Err(Error::codec(path, ty, bson.element_type_name())),
        };

        Ok(value)
    }
}

fn is_link(document: &Document) -> bool {
    document.contains_key("$ref") && document.contains_key("$id")
}

trait BsonTypeName {
    fn element_type_name(&self) -> String;
}

impl BsonTypeName for Bson {
    fn element_type_name(&self) -> String {
        format!("{:?}", self.element_type())
    }
}

impl PropertyModel {
    fn lookup_key(&self, key: &str) -> bool {
        self.mapped_name == key || self.also_load.iter().any(|alias| alias == key)
    }
}
