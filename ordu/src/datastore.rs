use futures_util::{FutureExt, future::BoxFuture};
use mongodb::bson::{Bson, Document, doc};
use std::sync::Arc;

use crate::{
    Error, Mapper, Result,
    convert::Mapped,
    query::{Filter, Update},
    store::{DocumentStore, WriteOutcome},
    value::{Object, Value},
};

/// A [`Mapper`] paired with a [`DocumentStore`].
#[derive(Debug)]
pub struct Datastore<S> {
    mapper: Arc<Mapper>,
    store: S,
}

impl<S: DocumentStore> Datastore<S> {
    pub fn new(mapper: Arc<Mapper>, store: S) -> Self {
        Self { mapper, store }
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Inserts or replaces an entity. Versioned entities are written
    /// conditionally and their version is advanced on success.
    pub fn save<'a>(&'a self, object: &'a mut Object) -> BoxFuture<'a, Result<()>> {
        async move {
            let model = self.mapper.model(object.class())?;
            let directive = self.mapper.prepare_write(&model, object)?;
            let outcome = self.store.write(&directive).await?;

            directive.confirm(object, outcome)
        }
        .boxed()
    }

    /// [`save`](Self::save) for a typed entity. Generated ids and advanced
    /// versions are written back into `value`.
    pub fn save_typed<'a, T: Mapped + Send>(
        &'a self,
        value: &'a mut T,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let mut object = Object::try_from(value.to_value())?;
            let saved = self.save(&mut object).await;
            *value = T::from_value(Value::Object(object))?;

            saved
        }
        .boxed()
    }

    pub fn find_by_id<'a>(
        &'a self,
        class: &'a str,
        id: impl Into<Bson>,
    ) -> BoxFuture<'a, Result<Option<Object>>> {
        let filter = doc! { "_id": id.into() };

        async move { self.find_raw(class, filter).await }.boxed()
    }

    pub fn find_one<'a>(
        &'a self,
        class: &'a str,
        filter: &'a Filter,
    ) -> BoxFuture<'a, Result<Option<Object>>> {
        async move {
            let filter = filter.to_document(&self.mapper, class)?;
            self.find_raw(class, filter).await
        }
        .boxed()
    }

    pub fn find_typed<'a, T: Mapped + Send>(
        &'a self,
        filter: &'a Filter,
    ) -> BoxFuture<'a, Result<Option<T>>> {
        async move {
            self.find_one(T::CLASS_NAME, filter)
                .await?
                .map(|object| T::from_value(Value::Object(object)))
                .transpose()
        }
        .boxed()
    }

    /// Applies an update to the first entity of `class` matching `filter`.
    pub fn update<'a>(
        &'a self,
        class: &'a str,
        filter: &'a Filter,
        update: &'a Update,
    ) -> BoxFuture<'a, Result<WriteOutcome>> {
        async move {
            let collection = self.collection(class)?;
            let filter = filter.to_document(&self.mapper, class)?;
            let update = update.to_document(&self.mapper, class)?;

            self.store.update(&collection, filter, update).await
        }
        .boxed()
    }

    fn collection(&self, class: &str) -> Result<String> {
        let model = self.mapper.model(class)?;

        model
            .collection()
            .map(ToOwned::to_owned)
            .ok_or_else(|| Error::codec(class, "an entity", "an embedded type"))
    }

    async fn find_raw(&self, class: &str, filter: Document) -> Result<Option<Object>> {
        let model = self.mapper.model(class)?;
        let collection = self.collection(class)?;

        match self.store.find_one(&collection, filter).await? {
            Some(document) => self.mapper.decode_object(&model, document).map(Some),
            None => Ok(None),
        }
    }
}
