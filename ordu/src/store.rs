//! The boundary between mapped documents and the database.

use dashmap::DashMap;
use futures_util::{FutureExt, future::BoxFuture};
use mongodb::{
    Collection, Database,
    bson::{Bson, Document, doc},
    error::{ErrorKind, WriteFailure},
};

use crate::{
    Result,
    versioning::{WriteDirective, WriteKind},
};

const DUPLICATE_KEY: i32 = 11000;

/// What a write did, as reported by the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Updated { matched: u64, modified: u64 },
    /// The write was rejected because a document with the same unique key
    /// exists.
    DuplicateKey,
}

pub trait DocumentStore: Send + Sync {
    fn insert<'a>(
        &'a self,
        collection: &'a str,
        document: Document,
    ) -> BoxFuture<'a, Result<WriteOutcome>>;

    /// Replaces the first document matching `filter`, inserting `document`
    /// when nothing matches and `upsert` is set.
    fn replace<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        document: Document,
        upsert: bool,
    ) -> BoxFuture<'a, Result<WriteOutcome>>;

    fn update<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        update: Document,
    ) -> BoxFuture<'a, Result<WriteOutcome>>;

    fn find_one<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
    ) -> BoxFuture<'a, Result<Option<Document>>>;

    /// Executes a prepared write.
    fn write<'a>(&'a self, directive: &'a WriteDirective) -> BoxFuture<'a, Result<WriteOutcome>> {
        async move {
            let collection = directive.collection();
            let document = directive.document().clone();
            let by_id = || doc! { "_id": directive.id().clone() };

            match directive.kind() {
                WriteKind::Insert => self.insert(collection, document).await,
                WriteKind::Save => {
                    let filter = directive.predicate().cloned().unwrap_or_else(by_id);
                    self.replace(collection, filter, document, true).await
                }
                WriteKind::ConditionalUpdate => {
                    let filter = directive.predicate().cloned().unwrap_or_else(by_id);
                    self.replace(collection, filter, document, false).await
                }
            }
        }
        .boxed()
    }
}

/// A [`DocumentStore`] backed by a `MongoDB` database.
#[derive(Clone, Debug)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection(name)
    }
}

impl From<Database> for MongoStore {
    fn from(value: Database) -> Self {
        Self::new(value)
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY
        }
        ErrorKind::Command(command_error) => command_error.code == DUPLICATE_KEY,
        _ => false,
    }
}

macro_rules! or_duplicate_key {
    ($result: expr) => {
        match $result {
            Err(err) if is_duplicate_key(&err) => return Ok(WriteOutcome::DuplicateKey),
            other => other?,
        }
    };
}

impl DocumentStore for MongoStore {
    fn insert<'a>(
        &'a self,
        collection: &'a str,
        document: Document,
    ) -> BoxFuture<'a, Result<WriteOutcome>> {
        async move {
            or_duplicate_key!(self.collection(collection).insert_one(document).await);

            Ok(WriteOutcome::Inserted)
        }
        .boxed()
    }

    fn replace<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        document: Document,
        upsert: bool,
    ) -> BoxFuture<'a, Result<WriteOutcome>> {
        async move {
            let result = or_duplicate_key!(
                self.collection(collection)
                    .replace_one(filter, document)
                    .upsert(upsert)
                    .await
            );

            if result.upserted_id.is_some() {
                return Ok(WriteOutcome::Inserted);
            }

            Ok(WriteOutcome::Updated {
                matched: result.matched_count,
                modified: result.modified_count,
            })
        }
        .boxed()
    }

    fn update<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        update: Document,
    ) -> BoxFuture<'a, Result<WriteOutcome>> {
        async move {
            let result =
                or_duplicate_key!(self.collection(collection).update_one(filter, update).await);

            Ok(WriteOutcome::Updated {
                matched: result.matched_count,
                modified: result.modified_count,
            })
        }
        .boxed()
    }

    fn find_one<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
    ) -> BoxFuture<'a, Result<Option<Document>>> {
        async move { Ok(self.collection(collection).find_one(filter).await?) }.boxed()
    }
}

/// An in-process [`DocumentStore`].
///
/// Filters match on top-level fields, by equality or `$eq`. Updates support
/// `$set`, `$unset` and `$inc` on top-level fields. `_id` is the only unique
/// key.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, Vec<Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every document of a collection, in insertion order.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|documents| documents.clone())
            .unwrap_or_default()
    }

    fn insert_now(&self, collection: &str, document: Document) -> WriteOutcome {
        let mut documents = self.collections.entry(collection.to_owned()).or_default();

        let id = document.get("_id");
        if id.is_some() && documents.iter().any(|existing| existing.get("_id") == id) {
            return WriteOutcome::DuplicateKey;
        }

        documents.push(document);
        WriteOutcome::Inserted
    }
}

fn matches(document: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, expected)| {
        let expected = match expected {
            Bson::Document(condition) if condition.len() == 1 && condition.contains_key("$eq") => {
                condition.get("$eq")
            }
            other => Some(other),
        };

        document.get(key) == expected
    })
}

fn apply_update(document: &mut Document, update: &Document) -> Result<()> {
    for (operator, fields) in update {
        let Bson::Document(fields) = fields else {
            continue;
        };

        for (key, val) in fields {
            match operator.as_str() {
                "$set" => {
                    document.insert(key.as_str(), val.clone());
                }
                "$unset" => {
                    document.remove(key);
                }
                "$inc" => {
                    let sum = match (document.get(key), val) {
                        (None | Some(Bson::Null), by) => by.clone(),
                        (Some(Bson::Int32(cur)), Bson::Int32(by)) => Bson::Int32(cur + by),
                        (Some(Bson::Int64(cur)), Bson::Int64(by)) => Bson::Int64(cur + by),
                        (Some(Bson::Int64(cur)), Bson::Int32(by)) => {
                            Bson::Int64(cur + i64::from(*by))
                        }
                        (Some(Bson::Int32(cur)), Bson::Int64(by)) => {
                            Bson::Int64(i64::from(*cur) + by)
                        }
                        (Some(Bson::Double(cur)), Bson::Double(by)) => Bson::Double(cur + by),
                        (Some(cur), by) => {
                            return Err(crate::Error::codec(
                                key.as_str(),
                                "a number to increment",
                                format!("{cur} += {by}"),
                            ));
                        }
                    };
                    document.insert(key.as_str(), sum);
                }
                _ => tracing::warn!(operator, "unsupported update operator ignored"),
            }
        }
    }

    Ok(())
}

impl DocumentStore for MemoryStore {
    fn insert<'a>(
        &'a self,
        collection: &'a str,
        document: Document,
    ) -> BoxFuture<'a, Result<WriteOutcome>> {
        async move { Ok(self.insert_now(collection, document)) }.boxed()
    }

    fn replace<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        document: Document,
        upsert: bool,
    ) -> BoxFuture<'a, Result<WriteOutcome>> {
        async move {
            if let Some(mut documents) = self.collections.get_mut(collection) {
                if let Some(existing) = documents.iter_mut().find(|doc| matches(doc, &filter)) {
                    let modified = u64::from(*existing != document);
                    *existing = document;
                    return Ok(WriteOutcome::Updated {
                        matched: 1,
                        modified,
                    });
                }
            }

            if upsert {
                return Ok(self.insert_now(collection, document));
            }

            Ok(WriteOutcome::Updated {
                matched: 0,
                modified: 0,
            })
        }
        .boxed()
    }

    fn update<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        update: Document,
    ) -> BoxFuture<'a, Result<WriteOutcome>> {
        async move {
            let Some(mut documents) = self.collections.get_mut(collection) else {
                return Ok(WriteOutcome::Updated {
                    matched: 0,
                    modified: 0,
                });
            };

            let Some(existing) = documents.iter_mut().find(|doc| matches(doc, &filter)) else {
                return Ok(WriteOutcome::Updated {
                    matched: 0,
                    modified: 0,
                });
            };

            let mut updated = existing.clone();
            apply_update(&mut updated, &update)?;
            let modified = u64::from(*existing != updated);
            *existing = updated;

            Ok(WriteOutcome::Updated {
                matched: 1,
                modified,
            })
        }
        .boxed()
    }

    fn find_one<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
    ) -> BoxFuture<'a, Result<Option<Document>>> {
        async move {
            Ok(self.collections.get(collection).and_then(|documents| {
                documents
                    .iter()
                    .find(|doc| matches(doc, &filter))
                    .cloned()
            }))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_rejects_duplicate_ids() {
        let store = MemoryStore::new();

        let first = store.insert("users", doc! { "_id": 1, "name": "Kit" }).await.unwrap();
        let second = store.insert("users", doc! { "_id": 1, "name": "Kat" }).await.unwrap();

        assert_eq!(first, WriteOutcome::Inserted);
        assert_eq!(second, WriteOutcome::DuplicateKey);
        assert_eq!(store.documents("users").len(), 1);
    }

    #[tokio::test]
    async fn memory_store_replaces_only_matching_documents() {
        let store = MemoryStore::new();
        store.insert("users", doc! { "_id": 1, "v": 1 }).await.unwrap();

        let stale = store
            .replace("users", doc! { "_id": 1, "v": 0 }, doc! { "_id": 1, "v": 9 }, false)
            .await
            .unwrap();
        let fresh = store
            .replace("users", doc! { "_id": 1, "v": 1 }, doc! { "_id": 1, "v": 2 }, false)
            .await
            .unwrap();

        assert_eq!(stale, WriteOutcome::Updated { matched: 0, modified: 0 });
        assert_eq!(fresh, WriteOutcome::Updated { matched: 1, modified: 1 });
        assert_eq!(
            store.find_one("users", doc! { "_id": { "$eq": 1 } }).await.unwrap(),
            Some(doc! { "_id": 1, "v": 2 })
        );
    }

    #[tokio::test]
    async fn memory_store_applies_update_operators() {
        let store = MemoryStore::new();
        store
            .insert("posts", doc! { "_id": 1, "views": 1, "draft": true })
            .await
            .unwrap();

        store
            .update(
                "posts",
                doc! { "_id": 1 },
                doc! {
                    "$inc": { "views": 2 },
                    "$unset": { "draft": "" },
                    "$set": { "title": "Hi" },
                },
            )
            .await
            .unwrap();

        assert_eq!(
            store.documents("posts"),
            vec![doc! { "_id": 1, "views": 3, "title": "Hi" }]
        );
    }
}
