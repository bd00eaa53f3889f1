use mongodb::bson::{Bson, doc, oid::ObjectId};
use ordu::{
    ClassDef, Datastore, DocumentStore, Error, FieldDef, Filter, Mapper, MemoryStore, Object,
    TypeRef, Update, Value, WriteOutcome,
};
use std::sync::Arc;

fn datastore() -> Datastore<MemoryStore> {
    let mapper = Mapper::default();
    mapper.register_class(
        ClassDef::entity("Account")
            .collection("accounts")
            .field(FieldDef::new("id", TypeRef::OBJECT_ID).id())
            .field(FieldDef::new("version", TypeRef::INT64).version().rename("v"))
            .field(FieldDef::new("owner", TypeRef::STRING))
            .field(FieldDef::new("balance", TypeRef::INT64))
            .field(FieldDef::new("note", TypeRef::STRING).load_only()),
    );
    mapper.register_class(
        ClassDef::entity("Setting")
            .collection("settings")
            .field(FieldDef::new("key", TypeRef::STRING).id())
            .field(FieldDef::new("value", TypeRef::STRING)),
    );

    Datastore::new(Arc::new(mapper), MemoryStore::new())
}

fn account(datastore: &Datastore<MemoryStore>) -> Object {
    datastore
        .mapper()
        .model("Account")
        .unwrap()
        .blank()
        .with("owner", "kit")
        .with("balance", 10_i64)
}

#[tokio::test]
async fn saves_advance_the_version() {
    let datastore = datastore();
    let mut account = account(&datastore);

    datastore.save(&mut account).await.unwrap();
    assert_eq!(account.get("version"), Some(&Value::Int64(1)));

    let id = account.get("id").unwrap().to_bson().unwrap();
    assert!(matches!(id, Bson::ObjectId(_)));

    account.set("balance", 20_i64);
    datastore.save(&mut account).await.unwrap();
    assert_eq!(account.get("version"), Some(&Value::Int64(2)));

    let stored = datastore.store().documents("accounts");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].get_i64("v").unwrap(), 2);
    assert_eq!(stored[0].get_i64("balance").unwrap(), 20);
}

#[tokio::test]
async fn stale_copies_are_rejected() {
    let datastore = datastore();
    let mut first = account(&datastore);
    datastore.save(&mut first).await.unwrap();

    let mut stale = first.clone();

    first.set("balance", 30_i64);
    datastore.save(&mut first).await.unwrap();

    stale.set("balance", 99_i64);
    let err = datastore.save(&mut stale).await.unwrap_err();

    assert!(err.is_conflict());
    assert!(matches!(err, Error::VersionMismatch { expected: 1, .. }));
    assert_eq!(stale.get("version"), Some(&Value::Int64(1)));

    let stored = datastore.store().documents("accounts");
    assert_eq!(stored[0].get_i64("v").unwrap(), 2);
    assert_eq!(stored[0].get_i64("balance").unwrap(), 30);
}

#[tokio::test]
async fn concurrent_creation_is_detected() {
    let datastore = datastore();
    let id = ObjectId::new();

    let mut first = account(&datastore).with("id", id);
    let mut second = account(&datastore).with("id", id);

    datastore.save(&mut first).await.unwrap();
    let err = datastore.save(&mut second).await.unwrap_err();

    assert!(matches!(
        err,
        Error::ConcurrentCreation { id: Bson::ObjectId(found), .. } if found == id
    ));
    assert_eq!(second.get("version"), Some(&Value::Int64(0)));
    assert_eq!(datastore.store().documents("accounts").len(), 1);
}

#[tokio::test]
async fn unversioned_entities_are_upserted() {
    let datastore = datastore();
    let mut setting = Object::new("Setting")
        .with("key", "theme")
        .with("value", "dark");

    datastore.save(&mut setting).await.unwrap();
    setting.set("value", "light");
    datastore.save(&mut setting).await.unwrap();

    assert_eq!(
        datastore.store().documents("settings"),
        vec![doc! { "_id": "theme", "value": "light" }]
    );
}

#[tokio::test]
async fn saved_entities_can_be_found() {
    let datastore = datastore();
    let mut account = account(&datastore);
    datastore.save(&mut account).await.unwrap();

    let id = account.get("id").unwrap().to_bson().unwrap();

    let found = datastore.find_by_id("Account", id).await.unwrap().unwrap();
    assert_eq!(found, account);

    let found = datastore
        .find_one("Account", &Filter::new().eq("owner", "kit"))
        .await
        .unwrap();
    assert_eq!(found.as_ref(), Some(&account));

    let missing = datastore
        .find_one("Account", &Filter::new().eq("owner", "nobody"))
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn filters_reject_unknown_properties() {
    let datastore = datastore();

    let err = datastore
        .find_one("Account", &Filter::new().eq("ownr", "kit"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidPath { segment, .. } if segment == "ownr"));
}

#[tokio::test]
async fn updates_translate_paths_and_guard_managed_properties() {
    let datastore = datastore();
    let mut account = account(&datastore);
    datastore.save(&mut account).await.unwrap();

    let filter = Filter::new().eq("owner", "kit");

    let outcome = datastore
        .update("Account", &filter, &Update::new().inc("balance", 5_i64))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        WriteOutcome::Updated {
            matched: 1,
            modified: 1
        }
    );
    assert_eq!(
        datastore.store().documents("accounts")[0].get_i64("balance").unwrap(),
        15
    );

    let err = datastore
        .update("Account", &filter, &Update::new().set("version", 7_i64))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::VersionWrite { .. }));

    let err = datastore
        .update("Account", &filter, &Update::new().set("note", "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::LoadOnlyWrite { .. }));
}

#[tokio::test]
async fn updates_invalidate_copies_read_before_them() {
    let datastore = datastore();
    let mut account = account(&datastore);
    datastore.save(&mut account).await.unwrap();

    datastore
        .update(
            "Account",
            &Filter::new().eq("owner", "kit"),
            &Update::new().inc("balance", 100_i64),
        )
        .await
        .unwrap();

    let stored = datastore.store().documents("accounts");
    assert_eq!(stored[0].get_i64("v").unwrap(), 2);
    assert_eq!(stored[0].get_i64("balance").unwrap(), 110);

    account.set("owner", "kat");
    let err = datastore.save(&mut account).await.unwrap_err();
    assert!(matches!(err, Error::VersionMismatch { expected: 1, .. }));

    let stored = datastore.store().documents("accounts");
    assert_eq!(stored[0].get_str("owner").unwrap(), "kit");
    assert_eq!(stored[0].get_i64("balance").unwrap(), 110);
}

#[tokio::test]
async fn directives_can_be_written_by_hand() {
    let datastore = datastore();
    let mapper = datastore.mapper();
    let model = mapper.model("Account").unwrap();
    let mut account = account(&datastore);

    let directive = mapper.prepare_write(&model, &mut account).unwrap();
    let outcome = datastore.store().write(&directive).await.unwrap();
    directive.confirm(&mut account, outcome).unwrap();

    let directive = mapper.prepare_write(&model, &mut account).unwrap();
    assert_eq!(directive.next_version(), Some(&Value::Int64(2)));

    let outcome = datastore
        .store()
        .replace(
            directive.collection(),
            directive.predicate().cloned().unwrap(),
            directive.document().clone(),
            false,
        )
        .await
        .unwrap();
    directive.confirm(&mut account, outcome).unwrap();

    assert_eq!(account.get("version"), Some(&Value::Int64(2)));
}
