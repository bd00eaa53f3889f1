//! Optimistic concurrency for versioned entities.
//!
//! A write is prepared, handed to a store, and confirmed with the store's
//! outcome:
//!
//! ```no_run
//! # async fn save(
//! #     mapper: &ordu::Mapper,
//! #     store: &impl ordu::DocumentStore,
//! #     mut user: ordu::Object,
//! # ) -> ordu::Result<()> {
//! let model = mapper.model(user.class())?;
//! let directive = mapper.prepare_write(&model, &mut user)?;
//! let outcome = store.write(&directive).await?;
//! directive.confirm(&mut user, outcome)?;
//! # Ok(())
//! # }
//! ```

use mongodb::bson::{Bson, Document, doc, oid::ObjectId};

use crate::{
    Error, Mapper, Result,
    class::TypeRef,
    error::MappingError,
    model::EntityModel,
    store::WriteOutcome,
    value::{Object, Value},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteKind {
    /// Upsert by id. The entity has no version property.
    Save,
    /// Unconditional insert of a new versioned entity.
    Insert,
    /// Replacement of the document whose stored version matches.
    ConditionalUpdate,
}

#[derive(Clone, Debug)]
struct VersionStep {
    slot: usize,
    previous: Value,
    next: Value,
    expected: Option<i64>,
}

/// A prepared write: what to send to the store and how to interpret the
/// outcome.
#[derive(Clone, Debug)]
pub struct WriteDirective {
    class: String,
    collection: String,
    kind: WriteKind,
    id: Bson,
    document: Document,
    predicate: Option<Document>,
    version: Option<VersionStep>,
    model: std::sync::Arc<EntityModel>,
}

impl WriteDirective {
    pub fn kind(&self) -> WriteKind {
        self.kind
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &Bson {
        &self.id
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// The filter a replacement must match: the id, plus the expected
    /// version for conditional updates. `None` for inserts.
    pub fn predicate(&self) -> Option<&Document> {
        self.predicate.as_ref()
    }

    /// The version the instance holds once the write is confirmed.
    pub fn next_version(&self) -> Option<&Value> {
        self.version.as_ref().map(|step| &step.next)
    }

    /// Applies a store outcome to the instance the directive was prepared
    /// from.
    ///
    /// A conditional update advances the in-memory version only when
    /// exactly one document matched and was modified. A failed insert
    /// restores the version the instance had before preparation.
    pub fn confirm(&self, object: &mut Object, outcome: WriteOutcome) -> Result<()> {
        match (self.kind, outcome) {
            (WriteKind::Save, WriteOutcome::Inserted | WriteOutcome::Updated { .. })
            | (WriteKind::Insert, WriteOutcome::Inserted) => Ok(()),

            (_, WriteOutcome::DuplicateKey) => {
                self.restore(object);
                Err(Error::ConcurrentCreation {
                    class: self.class.clone(),
                    id: self.id.clone(),
                })
            }

            (
                WriteKind::ConditionalUpdate,
                WriteOutcome::Updated {
                    matched: 1,
                    modified: 1,
                },
            ) => {
                if let Some(step) = &self.version {
                    self.model.properties()[step.slot].set(object, step.next.clone());
                }
                Ok(())
            }

            (WriteKind::ConditionalUpdate, WriteOutcome::Updated { matched: 0, .. }) => {
                Err(Error::VersionMismatch {
                    class: self.class.clone(),
                    id: self.id.clone(),
                    expected: self
                        .version
                        .as_ref()
                        .and_then(|step| step.expected)
                        .unwrap_or_default(),
                })
            }

            (_, WriteOutcome::Updated { matched, modified }) => {
                Err(Error::UnexpectedOutcome { matched, modified })
            }

            (WriteKind::ConditionalUpdate, WriteOutcome::Inserted) => {
                Err(Error::UnexpectedOutcome {
                    matched: 0,
                    modified: 0,
                })
            }
        }
    }

    fn restore(&self, object: &mut Object) {
        if let Some(step) = &self.version {
            self.model.properties()[step.slot].set(object, step.previous.clone());
        }
    }
}

impl Mapper {
    /// Prepares a write of `object`, an instance of `model`'s class or one
    /// of its subtypes.
    ///
    /// A null `ObjectId` identifier is generated in place. For an unsaved
    /// versioned entity the version is set to 1 in place; for a saved one
    /// the encoded document carries the next version while the instance
    /// keeps the current one until [`WriteDirective::confirm`].
    pub fn prepare_write(
        &self,
        model: &EntityModel,
        object: &mut Object,
    ) -> Result<WriteDirective> {
        let (Some(id_slot), Some(collection)) = (model.id, model.collection()) else {
            return Err(MappingError::MissingId {
                class: model.class().to_owned(),
            }
            .into());
        };

        let runtime = self.model(object.class())?;

        let id_property = &model.properties()[id_slot];
        if id_property.get(object).is_null() && *id_property.ty() == TypeRef::OBJECT_ID {
            id_property.set(object, Value::ObjectId(ObjectId::new()));
        }

        let Some(version_slot) = model.version else {
            let document = self.encode_object(&runtime, object)?;
            let id = document.get("_id").cloned().unwrap_or(Bson::Null);

            return Ok(WriteDirective {
                class: model.class().to_owned(),
                collection: collection.to_owned(),
                kind: WriteKind::Save,
                predicate: Some(doc! { "_id": id.clone() }),
                id,
                document,
                version: None,
                model: runtime,
            });
        };

        let version_property = &model.properties()[version_slot];
        let current = version_property.get(object);
        let path = format!("{}.{}", model.class(), version_property.name());

        let (kind, expected) = match (&current, current.as_i64()) {
            (Value::Null, _) | (_, Some(0)) => (WriteKind::Insert, None),
            (_, Some(version)) => (WriteKind::ConditionalUpdate, Some(version)),
            (_, None) => return Err(Error::codec(path, version_property.ty(), current.kind())),
        };

        let next = expected
            .unwrap_or_default()
            .checked_add(1)
            .ok_or_else(|| Error::codec(&path, version_property.ty(), "an exhausted version"))?;
        let next = version_value(&path, version_property.ty(), next)?;

        version_property.set(object, next.clone());
        let encoded = self.encode_object(&runtime, object);
        if kind == WriteKind::ConditionalUpdate {
            version_property.set(object, current.clone());
        }
        let document = match encoded {
            Ok(document) => document,
            Err(err) => {
                version_property.set(object, current);
                return Err(err);
            }
        };

        let id = document.get("_id").cloned().unwrap_or(Bson::Null);

        let predicate = match expected {
            Some(_) => {
                let mut predicate = doc! { "_id": id.clone() };
                predicate.insert(version_property.mapped_name(), current.to_bson()?);
                Some(predicate)
            }
            None => None,
        };

        tracing::trace!(
            class = model.class(),
            ?kind,
            version = ?expected,
            "prepared versioned write"
        );

        Ok(WriteDirective {
            class: model.class().to_owned(),
            collection: collection.to_owned(),
            kind,
            id,
            document,
            predicate,
            version: Some(VersionStep {
                slot: runtime
                    .position(version_property.name())
                    .unwrap_or(version_slot),
                previous: current,
                next,
                expected,
            }),
            model: runtime,
        })
    }
}

fn version_value(path: &str, ty: &TypeRef, version: i64) -> Result<Value> {
    if *ty == TypeRef::INT32 {
        return i32::try_from(version)
            .map(Value::Int32)
            .map_err(|_| Error::codec(path, ty, version));
    }

    Ok(Value::Int64(version))
}
