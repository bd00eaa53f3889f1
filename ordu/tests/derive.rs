use mongodb::bson::{doc, oid::ObjectId};
use ordu::{
    Datastore, Filter, Link, Mapped, Mapper, MemoryStore, Reference, Value, WriteOutcome,
};
use proptest::prelude::*;
use std::{collections::BTreeMap, sync::Arc};

#[derive(Clone, Debug, Default, PartialEq, Mapped)]
#[ordu(embedded)]
struct Address {
    street: String,
    #[ordu(rename = "zip")]
    postal_code: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Mapped)]
#[ordu(entity(collection = "people"))]
struct Person {
    #[ordu(id)]
    id: Option<ObjectId>,
    #[ordu(version)]
    version: i64,
    #[ordu(rename = "n", also_load = "fullName")]
    name: String,
    nickname: Option<String>,
    tags: Vec<String>,
    scores: BTreeMap<String, i32>,
    home: Option<Address>,
    #[ordu(transient)]
    session: Option<String>,
}

impl Person {
    fn new(name: &str) -> Self {
        Self {
            id: None,
            version: 0,
            name: name.to_owned(),
            nickname: None,
            tags: vec!["admin".into()],
            scores: BTreeMap::from([("chess".to_owned(), 1200)]),
            home: Some(Address {
                street: "Main".into(),
                postal_code: None,
            }),
            session: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, Mapped)]
#[ordu(entity)]
struct Badge {
    #[ordu(id)]
    code: String,
    #[serde(rename = "t")]
    title: String,
}

#[derive(Clone, Debug, PartialEq, Mapped)]
#[ordu(entity, discriminator = "post")]
struct Post {
    #[ordu(id)]
    id: i64,
    #[ordu(reference)]
    author: Reference<Person>,
    #[ordu(reference(id_only))]
    reviewers: Vec<Reference<Person>>,
}

#[test]
fn class_definitions_follow_the_attributes() {
    let class = Person::class_def();

    assert_eq!(class.name, "Person");
    assert_eq!(Person::CLASS_NAME, "Person");
    assert_eq!(class.fields.len(), 8);

    let field = |name: &str| class.fields.iter().find(|field| field.name == name).unwrap();

    assert!(field("id").mapping.id);
    assert!(field("version").mapping.version);
    assert_eq!(field("name").mapping.rename.as_deref(), Some("n"));
    assert_eq!(field("name").mapping.also_load, ["fullName"]);
    assert!(field("session").is_transient);
    assert_eq!(field("nickname").default, Some(Value::Null));
    assert_eq!(field("tags").default, None);

    assert_eq!(Post::class_def().discriminator.as_deref(), Some("post"));
}

#[test]
fn models_are_built_from_derived_definitions() {
    let mapper = Mapper::default();
    mapper.register::<Person>();

    let model = mapper.model_of::<Person>().unwrap();

    assert_eq!(model.collection(), Some("people"));
    assert_eq!(model.id_property().unwrap().mapped_name(), "_id");
    assert_eq!(model.version_property().unwrap().name(), "version");
    assert_eq!(model.property("name").unwrap().mapped_name(), "n");
    assert!(model.property("session").is_none());
    assert_eq!(
        mapper.model("Address").unwrap().property("postal_code").unwrap().mapped_name(),
        "zip"
    );
}

#[test]
fn serde_renames_are_honored() {
    let mapper = Mapper::default();
    mapper.register::<Badge>();

    let mut badge = Badge {
        code: "gold".into(),
        title: "Gold".into(),
    };

    let document = mapper.to_document(&mut badge).unwrap();

    assert_eq!(document, doc! { "_id": "gold", "t": "Gold" });
    assert_eq!(mapper.model("Badge").unwrap().collection(), Some("badge"));
}

#[test]
fn fields_enums_name_properties() {
    assert_eq!(person::Fields::Name.to_string(), "name");
    assert_eq!(String::from(person::Fields::Tags), "tags");
    assert_eq!(address::Fields::PostalCode.to_string(), "postal_code");

    let mapper = Mapper::default();
    mapper.register::<Person>();

    let path = format!("{}.{}", person::Fields::Home, address::Fields::PostalCode);
    assert_eq!(mapper.path("Person", &path).unwrap().translated(), "home.zip");
}

#[test]
fn typed_values_round_trip() {
    let mapper = Mapper::default();
    mapper.register::<Person>();

    let mut person = Person::new("Kit");
    person.id = Some(ObjectId::new());
    person.session = Some("not stored".into());

    let document = mapper.to_document(&mut person).unwrap();
    assert!(!document.contains_key("session"));
    assert!(!document.contains_key("nickname"));
    assert_eq!(document.get_str("n").unwrap(), "Kit");

    let loaded: Person = mapper.from_document(document).unwrap();

    assert_eq!(loaded.session, None);
    assert_eq!(
        loaded,
        Person {
            session: None,
            ..person
        }
    );
}

#[test]
fn aliases_are_read_into_typed_values() {
    let mapper = Mapper::default();
    mapper.register::<Person>();

    let loaded: Person = mapper
        .from_document(doc! { "_id": ObjectId::new(), "version": 3_i64, "fullName": "Kit" })
        .unwrap();

    assert_eq!(loaded.name, "Kit");
    assert_eq!(loaded.version, 3);
    assert_eq!(loaded.home, None);
    assert!(loaded.tags.is_empty());
}

#[test]
fn references_decode_to_links() {
    let mapper = Mapper::default();
    mapper.register::<Post>();

    let author_id = ObjectId::new();
    let mut author = Person::new("Kit");
    author.id = Some(author_id);

    let mut post = Post {
        id: 1,
        author: Reference::Loaded(author.clone()),
        reviewers: vec![Reference::Loaded(author)],
    };

    let document = mapper.to_document(&mut post).unwrap();

    assert_eq!(
        document,
        doc! {
            "_id": 1_i64,
            "author": { "$ref": "people", "$id": author_id },
            "reviewers": [author_id],
        }
    );

    let loaded: Post = mapper.from_document(document).unwrap();

    assert_eq!(
        loaded.author,
        Reference::Link(Link::new("people", author_id))
    );
    assert_eq!(
        loaded.reviewers,
        [Reference::Link(Link {
            collection: None,
            id: author_id.into(),
        })]
    );
}

#[tokio::test]
async fn typed_entities_are_saved_and_found() {
    let mapper = Mapper::default();
    mapper.register::<Person>();
    let datastore = Datastore::new(Arc::new(mapper), MemoryStore::new());

    let mut person = Person::new("Kit");
    datastore.save_typed(&mut person).await.unwrap();

    let id = person.id.unwrap();
    assert_eq!(person.version, 1);

    person.nickname = Some("kit".into());
    datastore.save_typed(&mut person).await.unwrap();
    assert_eq!(person.version, 2);

    let found = datastore
        .find_typed::<Person>(&Filter::by_id(id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found, person);

    let mut stale = Person {
        version: 1,
        ..person.clone()
    };
    let err = datastore.save_typed(&mut stale).await.unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(stale.version, 1);

    let outcome = datastore
        .update(
            "Person",
            &Filter::by_id(id),
            &ordu::Update::new().set(person::Fields::Name, "Kat"),
        )
        .await
        .unwrap();
    assert_eq!(
        outcome,
        WriteOutcome::Updated {
            matched: 1,
            modified: 1
        }
    );

    let found = datastore
        .find_typed::<Person>(&Filter::new().eq(person::Fields::Name, "Kat"))
        .await
        .unwrap();
    assert_eq!(found.map(|person| person.version), Some(3));
}

#[derive(Clone, Debug, PartialEq, Mapped)]
#[ordu(embedded)]
struct Sample {
    ratio: f64,
    label: Option<String>,
    items: Vec<String>,
}

proptest! {
    #[test]
    fn embedded_values_survive_encoding(
        ratio in -1.0e12_f64..1.0e12,
        label in proptest::option::of("[a-z]{0,8}"),
        items in proptest::collection::vec("[a-z ]{0,6}", 0..4),
    ) {
        let mapper = Mapper::default();
        mapper.register::<Sample>();

        let mut sample = Sample { ratio, label, items };

        let document = mapper.to_document(&mut sample).unwrap();
        let decoded: Sample = mapper.from_document(document).unwrap();

        prop_assert_eq!(decoded, sample);
    }
}
