use ordu::{
    Callback, ClassDef, DiscoveryStrategy, Error, FieldDef, HookKind, MapperOptions, MappingError,
    MethodDef, Mapper, ModelKind, ReferenceOptions, TypeRef, Value,
};
use std::sync::Arc;

fn entity(name: &str) -> ClassDef {
    ClassDef::entity(name).field(FieldDef::new("id", TypeRef::OBJECT_ID).id())
}

fn mapping_error(mapper: &Mapper, class: &str) -> MappingError {
    match mapper.model(class).unwrap_err() {
        Error::Mapping(err) => err,
        other => panic!("expected a mapping error, got {other:?}"),
    }
}

#[test]
fn type_variables_resolve_through_the_lineage() {
    let mapper = Mapper::default();
    mapper.register_class(
        ClassDef::new("Base")
            .type_param("T")
            .field(FieldDef::new("value", TypeRef::var("T")))
            .field(FieldDef::new("values", TypeRef::list(TypeRef::var("T")))),
    );
    mapper.register_class(
        ClassDef::new("Mid").extends(TypeRef::generic("Base", [TypeRef::STRING])),
    );
    mapper.register_class(entity("Leaf").extends(TypeRef::class("Mid")));

    let model = mapper.model("Leaf").unwrap();

    assert_eq!(model.property("value").unwrap().ty(), &TypeRef::STRING);
    assert_eq!(
        model.property("values").unwrap().ty(),
        &TypeRef::list(TypeRef::STRING)
    );
    assert_eq!(model.property("value").unwrap().declared_by(), "Base");
}

#[test]
fn raw_generic_use_falls_back_to_bounds() {
    let mapper = Mapper::default();
    mapper.register_class(
        ClassDef::new("Holder")
            .bounded_type_param("N", Some(TypeRef::INT64))
            .field(FieldDef::new("amount", TypeRef::var("N"))),
    );
    mapper.register_class(entity("Wallet").extends(TypeRef::class("Holder")));

    let model = mapper.model("Wallet").unwrap();

    assert_eq!(model.property("amount").unwrap().ty(), &TypeRef::INT64);
}

#[test]
fn subclass_declarations_shadow_inherited_properties() {
    let mapper = Mapper::default();
    mapper.register_class(entity("Parent").field(FieldDef::new("data", TypeRef::INT32)));
    mapper.register_class(
        ClassDef::entity("Child")
            .extends(TypeRef::class("Parent"))
            .field(FieldDef::new("data", TypeRef::STRING)),
    );

    let model = mapper.model("Child").unwrap();

    assert_eq!(model.properties().len(), 2);
    let data = model.property("data").unwrap();
    assert_eq!(data.ty(), &TypeRef::STRING);
    assert_eq!(data.declared_by(), "Child");
}

#[test]
fn identifier_comes_first_and_is_stored_as_underscore_id() {
    let mapper = Mapper::default();
    mapper.register_class(
        ClassDef::entity("Order")
            .field(FieldDef::new("total", TypeRef::DOUBLE))
            .field(FieldDef::new("number", TypeRef::STRING).id())
            .field(FieldDef::new("version", TypeRef::INT32).version()),
    );

    let model = mapper.model("Order").unwrap();

    let id = model.id_property().unwrap();
    assert_eq!(id.name(), "number");
    assert_eq!(id.mapped_name(), "_id");
    assert_eq!(model.properties()[0].name(), "number");
    assert_eq!(model.version_property().unwrap().name(), "version");
    assert_eq!(model.collection(), Some("order"));
}

#[test]
fn transient_and_static_members_are_not_properties() {
    let mapper = Mapper::default();
    mapper.register_class(
        entity("Session")
            .field(FieldDef::new("token", TypeRef::STRING).transient())
            .field(FieldDef::new("cache", TypeRef::STRING).not_persisted())
            .field(FieldDef::new("COUNT", TypeRef::INT32).static_member())
            .field(FieldDef::new("user", TypeRef::STRING)),
    );

    let model = mapper.model("Session").unwrap();

    let names = model.properties().iter().map(|p| p.name()).collect::<Vec<_>>();
    assert_eq!(names, ["id", "user"]);

    let blank = model.blank();
    assert!(blank.get("token").is_some());
    assert!(blank.get("COUNT").is_none());
}

#[test]
fn collection_names_follow_the_naming_strategy_and_inheritance() {
    let mapper = Mapper::default();
    mapper.register_class(entity("BlogPost"));
    mapper.register_class(entity("Event").collection("events"));
    mapper.register_class(ClassDef::entity("Login").extends(TypeRef::class("Event")));

    assert_eq!(mapper.model("BlogPost").unwrap().collection(), Some("blog_post"));
    assert_eq!(mapper.model("Login").unwrap().collection(), Some("events"));
    assert_eq!(
        mapper.model("Login").unwrap().kind(),
        &ModelKind::Entity {
            collection: "events".into()
        }
    );
}

#[test]
fn hierarchies_know_their_subtypes_and_discriminators() {
    let mapper = Mapper::default();
    mapper.register_class(entity("Animal").abstract_class());
    mapper.register_class(ClassDef::entity("Dog").extends(TypeRef::class("Animal")));
    mapper.register_class(
        ClassDef::entity("Cat")
            .extends(TypeRef::class("Animal"))
            .discriminator("kitty"),
    );
    mapper.register_class(entity("Rock"));

    let animal = mapper.model("Animal").unwrap();
    assert_eq!(animal.subtypes(), ["Cat", "Dog"]);
    assert_eq!(animal.class_for_discriminator("kitty"), Some("Cat"));
    assert_eq!(animal.class_for_discriminator("Dog"), Some("Dog"));
    assert!(animal.is_abstract());

    let dog = mapper.model("Dog").unwrap();
    assert_eq!(dog.ancestors(), ["Animal"]);
    assert_eq!(dog.discriminator().unwrap().value, "Dog");
    assert_eq!(dog.discriminator().unwrap().key, "_t");

    assert!(mapper.model("Rock").unwrap().discriminator().is_none());
}

#[test]
fn hooks_bind_root_first_with_overrides_and_listeners_last() {
    let noop = || Callback::plain(|_| {});

    let mapper = Mapper::default();
    mapper.register_class(
        entity("Base")
            .hook(HookKind::PrePersist, "stamp", noop())
            .hook(HookKind::PrePersist, "audit", noop()),
    );
    mapper.register_class(
        ClassDef::entity("Derived")
            .extends(TypeRef::class("Base"))
            .hook(HookKind::PrePersist, "audit", noop())
            .hook(HookKind::PrePersist, "check", noop()),
    );
    mapper.add_listener("Base", HookKind::PrePersist, "metrics", noop());

    let model = mapper.model("Derived").unwrap();

    let bound = model
        .hooks()
        .get(HookKind::PrePersist)
        .iter()
        .map(|hook| (hook.name.as_str(), hook.declared_by.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(
        bound,
        [
            ("stamp", "Base"),
            ("audit", "Derived"),
            ("check", "Derived"),
            ("metrics", "Base"),
        ]
    );
    assert!(model.hooks().get(HookKind::PostLoad).is_empty());
}

#[test]
fn accessor_discovery_pairs_getters_with_setters() {
    let mapper = Mapper::new(MapperOptions::default().with_discovery(DiscoveryStrategy::Accessors));
    mapper.register_class(
        ClassDef::entity("Person")
            .field(FieldDef::new("raw_name", TypeRef::STRING))
            .method(
                MethodDef::getter("getId", TypeRef::STRING, |o| {
                    o.get("key").cloned().unwrap_or_default()
                })
                .id(),
            )
            .method(MethodDef::setter("setId", TypeRef::STRING, |o, v| o.set("key", v)))
            .method(MethodDef::getter("getName", TypeRef::STRING, |o| {
                o.get("raw_name").cloned().unwrap_or_default()
            }))
            .method(MethodDef::setter("set_name", TypeRef::STRING, |o, v| o.set("raw_name", v)))
            .method(MethodDef::getter("isActive", TypeRef::BOOL, |_| Value::Bool(true))),
    );

    let model = mapper.model("Person").unwrap();

    let names = model.properties().iter().map(|p| p.name()).collect::<Vec<_>>();
    assert_eq!(names, ["id", "name"]);

    let mut person = model.blank();
    model.property("name").unwrap().set(&mut person, "Kit".into());
    assert_eq!(person.get("raw_name"), Some(&Value::from("Kit")));
}

#[test]
fn mismatched_accessor_types_are_rejected() {
    let mapper = Mapper::new(MapperOptions::default().with_discovery(DiscoveryStrategy::Accessors));
    mapper.register_class(
        ClassDef::embedded("Gauge")
            .method(MethodDef::getter("getLevel", TypeRef::INT32, |_| Value::Int32(0)))
            .method(MethodDef::setter("setLevel", TypeRef::STRING, |_, _| {})),
    );

    assert!(matches!(
        mapping_error(&mapper, "Gauge"),
        MappingError::UnmappableMember { property, .. } if property == "level"
    ));
}

#[test]
fn malformed_definitions_are_rejected() {
    let mapper = Mapper::default();
    mapper.register_class(ClassDef::new("Plain"));
    mapper.register_class(ClassDef::entity("NoId"));
    mapper.register_class(
        entity("TwoIds").field(FieldDef::new("other", TypeRef::STRING).id()),
    );
    mapper.register_class(
        entity("TwoVersions")
            .field(FieldDef::new("v1", TypeRef::INT64).version())
            .field(FieldDef::new("v2", TypeRef::INT64).version()),
    );
    mapper.register_class(
        ClassDef::entity("IdVersion").field(FieldDef::new("id", TypeRef::INT64).id().version()),
    );
    mapper.register_class(
        entity("TextVersion").field(FieldDef::new("v", TypeRef::STRING).version()),
    );
    mapper.register_class(ClassDef::embedded("Inner").inner());
    mapper.register_class(entity("Holder").field(FieldDef::new("inner", TypeRef::class("Inner"))));
    mapper.register_class(
        entity("Dangling").field(FieldDef::new("ghost", TypeRef::class("Ghost"))),
    );
    mapper.register_class(
        entity("Clash")
            .field(FieldDef::new("a", TypeRef::STRING).rename("x"))
            .field(FieldDef::new("b", TypeRef::STRING).rename("x")),
    );
    mapper.register_class(
        entity("IdClash").field(FieldDef::new("legacy", TypeRef::STRING).rename("_id")),
    );
    mapper.register_class(entity("Vehicle"));
    mapper.register_class(
        ClassDef::entity("Car").extends(TypeRef::class("Vehicle")).discriminator("wheels"),
    );
    mapper.register_class(
        ClassDef::entity("Bus").extends(TypeRef::class("Vehicle")).discriminator("wheels"),
    );
    mapper.register_class(
        entity("BadCtor").constructor(["missing"], |_| ordu::Object::new("BadCtor")),
    );
    mapper.register_class(entity("BadHook").hook(
        HookKind::PostLoad,
        "rewrite",
        Callback::replace(|_, document| document),
    ));
    mapper.register_class(entity("A").extends(TypeRef::class("B")));
    mapper.register_class(entity("B").extends(TypeRef::class("A")));
    mapper.register_class(ClassDef::embedded("Address"));
    mapper.register_class(
        entity("RefToEmbedded").field(
            FieldDef::new("address", TypeRef::class("Address"))
                .reference(ReferenceOptions::default()),
        ),
    );
    mapper.register_class(
        entity("RefToScalar")
            .field(FieldDef::new("name", TypeRef::STRING).reference(ReferenceOptions::default())),
    );

    assert!(matches!(mapping_error(&mapper, "Missing"), MappingError::UnknownClass { .. }));
    assert!(matches!(mapping_error(&mapper, "Plain"), MappingError::NotMappable { .. }));
    assert!(matches!(mapping_error(&mapper, "NoId"), MappingError::MissingId { .. }));
    assert!(matches!(
        mapping_error(&mapper, "TwoIds"),
        MappingError::MultipleIds { properties, .. } if properties == ["id", "other"]
    ));
    assert!(matches!(mapping_error(&mapper, "TwoVersions"), MappingError::MultipleVersions { .. }));
    assert!(matches!(mapping_error(&mapper, "IdVersion"), MappingError::IdIsVersion { .. }));
    assert!(matches!(
        mapping_error(&mapper, "TextVersion"),
        MappingError::InvalidVersionType { .. }
    ));
    assert!(matches!(mapping_error(&mapper, "Inner"), MappingError::NonStaticInner { .. }));
    assert!(matches!(mapping_error(&mapper, "Holder"), MappingError::NonStaticInner { .. }));
    assert!(matches!(mapping_error(&mapper, "Dangling"), MappingError::UnmappableMember { .. }));
    assert!(matches!(
        mapping_error(&mapper, "Clash"),
        MappingError::DuplicateMappedName { mapped_name, .. } if mapped_name == "x"
    ));
    assert!(matches!(
        mapping_error(&mapper, "IdClash"),
        MappingError::DuplicateMappedName { mapped_name, first, second, .. }
            if mapped_name == "_id" && first == "id" && second == "legacy"
    ));
    assert!(matches!(
        mapping_error(&mapper, "Vehicle"),
        MappingError::DuplicateDiscriminator { value, first, second, .. }
            if value == "wheels" && first == "Bus" && second == "Car"
    ));
    assert!(matches!(mapping_error(&mapper, "BadCtor"), MappingError::InvalidConstructor { .. }));
    assert!(matches!(mapping_error(&mapper, "BadHook"), MappingError::InvalidHook { .. }));
    assert!(matches!(mapping_error(&mapper, "A"), MappingError::InheritanceCycle { .. }));
    assert!(matches!(
        mapping_error(&mapper, "RefToEmbedded"),
        MappingError::UnmappableMember { .. }
    ));
    assert!(matches!(mapping_error(&mapper, "RefToScalar"), MappingError::UnmappableMember { .. }));
}

#[test]
fn failed_builds_publish_nothing() {
    let mapper = Mapper::default();
    mapper.register_class(
        entity("User").field(FieldDef::new("address", TypeRef::class("Address"))),
    );

    assert!(mapper.model("User").is_err());

    mapper.register_class(
        ClassDef::embedded("Address").field(FieldDef::new("street", TypeRef::STRING)),
    );

    assert!(mapper.model("User").is_ok());
}

#[test]
fn models_are_built_once_and_shared() {
    let mapper = Arc::new(Mapper::default());
    mapper.register_class(entity("Shared").field(FieldDef::new("name", TypeRef::STRING)));

    let models = (0..8)
        .map(|_| {
            let mapper = Arc::clone(&mapper);
            std::thread::spawn(move || mapper.model("Shared").unwrap())
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect::<Vec<_>>();

    assert!(models.iter().all(|model| Arc::ptr_eq(model, &models[0])));
    assert!(Arc::ptr_eq(&models[0], &mapper.model("Shared").unwrap()));
}

#[test]
fn registering_twice_keeps_the_first_definition() {
    let mapper = Mapper::default();

    assert!(mapper.register_class(entity("Note").field(FieldDef::new("text", TypeRef::STRING))));
    assert!(!mapper.register_class(entity("Note")));

    assert!(mapper.model("Note").unwrap().property("text").is_some());
}

#[test]
fn concurrent_registrations_accept_one_definition() {
    let mapper = Arc::new(Mapper::default());

    let accepted = (0..8)
        .map(|i| {
            let mapper = Arc::clone(&mapper);
            std::thread::spawn(move || {
                let field = FieldDef::new(format!("field{i}"), TypeRef::STRING);
                mapper.register_class(entity("Racy").field(field)).then_some(i)
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .filter_map(|handle| handle.join().unwrap())
        .collect::<Vec<_>>();

    assert_eq!(accepted.len(), 1);

    let model = mapper.model("Racy").unwrap();
    assert!(model.property(&format!("field{}", accepted[0])).is_some());
    assert_eq!(model.properties().len(), 2);
}
