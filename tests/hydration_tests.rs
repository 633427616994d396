use anyhow::Result;
use rustodm::core::{document_from_json, props_from_json};
use rustodm::{
    ClassRegistration, DiscriminatorDeclaration, DiscriminatorPolicy, DocumentManager,
    FieldDeclaration, MapperConfig, MetadataRegistry, ObjectId, OdmError, Property, Type,
    TypeRegistry, Value,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

fn people() -> Result<MetadataRegistry> {
    Ok(MetadataRegistry::new()
        .with(
            ClassRegistration::document("Person", "people")
                .field(FieldDeclaration::identifier("id", "stringId"))
                .field(FieldDeclaration::field("name"))
                .field(FieldDeclaration::embedded_array("tags", "Tag"))
                .field(FieldDeclaration::embedded("address", "Address")),
        )?
        .with(
            ClassRegistration::embedded("Tag")
                .field(FieldDeclaration::field("v"))
                .back_reference("owner"),
        )?
        .with(
            ClassRegistration::embedded("Address")
                .field(FieldDeclaration::field("city"))
                .field(FieldDeclaration::field("zip").name("z")),
        )?)
}

fn animals() -> Result<MetadataRegistry> {
    Ok(MetadataRegistry::new()
        .with(
            ClassRegistration::document("Animal", "animals")
                .field(FieldDeclaration::identifier("id", "objectId"))
                .field(FieldDeclaration::field("type"))
                .field(FieldDeclaration::field("name"))
                .discriminator(
                    DiscriminatorDeclaration::new("type")
                        .variant("dog", "Dog")
                        .variant("cat", "Cat"),
                ),
        )?
        .with(
            ClassRegistration::embedded("Dog")
                .extends("Animal")
                .field(FieldDeclaration::field("sound")),
        )?
        .with(
            ClassRegistration::embedded("Cat")
                .extends("Animal")
                .field(FieldDeclaration::field("lives").typed("integer")),
        )?)
}

#[test]
fn test_init_generates_identifier_and_embeds_tags() -> Result<()> {
    let manager = DocumentManager::new(&people()?, MapperConfig::default())?;
    let mapper = manager.document("Person")?;

    let person = mapper
        .init(&props_from_json(json!({
            "name": "John",
            "tags": [{ "v": "a" }, { "v": "b" }]
        })))?
        .expect("no discriminator, always hydrated");

    let id = person.get("id").expect("identifier generated");
    assert!(ObjectId::is_valid_hex(id.as_str().unwrap()));
    assert_eq!(person.get("name"), Some(Property::from("John")));

    let tags = person.get("tags").unwrap();
    let tags = tags.as_list().unwrap();
    assert_eq!(tags.len(), 2);
    for tag in tags {
        let tag = tag.as_model().unwrap();
        assert_eq!(tag.class().as_str(), "Tag");
        assert!(tag.parent().unwrap().ptr_eq(&person));
        assert_eq!(tag.read().back_reference_property(), Some("owner"));
    }

    let doc = mapper.to_persisted(&person)?.unwrap();
    let keys: Vec<&str> = doc.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["_id", "name", "tags"]);
    assert_eq!(
        doc["_id"],
        Value::ObjectId(ObjectId::parse_str(id.as_str().unwrap())?)
    );
    assert_eq!(doc["name"], Value::from("John"));
    assert_eq!(doc["tags"], Value::from(json!([{ "v": "a" }, { "v": "b" }])));
    Ok(())
}

#[test]
fn test_round_trip_through_persisted_form() -> Result<()> {
    let manager = DocumentManager::new(&people()?, MapperConfig::default())?;
    let mapper = manager.document("Person")?;

    let person = mapper
        .init(&props_from_json(json!({
            "name": "Ann",
            "tags": [{ "v": "x" }],
            "address": { "city": "Oslo", "zip": "0150" }
        })))?
        .unwrap();

    let doc = mapper.to_persisted(&person)?.unwrap();
    assert_eq!(doc["address"], Value::from(json!({ "city": "Oslo", "z": "0150" })));

    let restored = mapper.from_persisted(&doc)?.unwrap();
    assert_eq!(restored, person);

    let tag = restored.get("tags").unwrap().as_list().unwrap()[0].clone();
    assert!(tag.as_model().unwrap().parent().unwrap().ptr_eq(&restored));
    Ok(())
}

#[test]
fn test_from_persisted_never_generates_identifier() -> Result<()> {
    let manager = DocumentManager::new(&people()?, MapperConfig::default())?;
    let mapper = manager.document("Person")?;

    let person = mapper
        .from_persisted(&document_from_json(json!({ "name": "NoId" })))?
        .unwrap();
    assert!(person.get("id").is_none());
    Ok(())
}

#[test]
fn test_invalid_persisted_value_is_rejected() -> Result<()> {
    let manager = DocumentManager::new(&people()?, MapperConfig::default())?;
    let mapper = manager.document("Person")?;

    let err = mapper
        .from_persisted(&document_from_json(json!({ "_id": 42 })))
        .unwrap_err();
    assert!(err.is_invalid_value());

    let err = mapper
        .from_persisted(&document_from_json(json!({ "address": "nowhere" })))
        .unwrap_err();
    assert!(err.is_invalid_value());
    Ok(())
}

#[test]
fn test_discriminator_selects_variant() -> Result<()> {
    let manager = DocumentManager::new(&animals()?, MapperConfig::default())?;
    let animals = manager.document("Animal")?;

    let dog = animals
        .from_persisted(&document_from_json(json!({ "type": "dog", "sound": "bark" })))?
        .expect("dog is mapped");
    assert_eq!(dog.class().as_str(), "Dog");
    assert_eq!(dog.get("sound"), Some(Property::from("bark")));

    let fish = animals.from_persisted(&document_from_json(json!({ "type": "fish", "fins": 2 })))?;
    assert!(fish.is_none());

    let untagged = animals.init(&props_from_json(json!({ "name": "?" })))?;
    assert!(untagged.is_none());
    Ok(())
}

#[test]
fn test_strict_policy_fails_on_unmapped_tag() -> Result<()> {
    let config = MapperConfig::new().discriminator_policy(DiscriminatorPolicy::Strict);
    let manager = DocumentManager::new(&animals()?, config)?;
    let animals = manager.document("Animal")?;

    let err = animals
        .from_persisted(&document_from_json(json!({ "type": "fish" })))
        .unwrap_err();
    match err {
        OdmError::UnmappedDiscriminator { class, value } => {
            assert_eq!(class, "Animal");
            assert_eq!(value, "fish");
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[test]
fn test_variant_to_persisted_includes_variant_fields() -> Result<()> {
    let manager = DocumentManager::new(&animals()?, MapperConfig::default())?;
    let animals = manager.document("Animal")?;

    let cat = animals
        .init(&props_from_json(json!({ "type": "cat", "name": "Tom", "lives": 9 })))?
        .unwrap();
    assert_eq!(cat.class().as_str(), "Cat");

    let doc = animals.to_persisted(&cat)?.unwrap();
    assert!(matches!(doc["_id"], Value::ObjectId(_)));
    assert_eq!(doc["lives"], Value::Integer(9));
    assert_eq!(doc["type"], Value::from("cat"));
    Ok(())
}

#[test]
fn test_merge_across_variant_change_replaces_instance() -> Result<()> {
    let manager = DocumentManager::new(&animals()?, MapperConfig::default())?;
    let animals = manager.document("Animal")?;

    let dog = animals
        .init(&props_from_json(json!({ "type": "dog", "name": "Rex", "sound": "woof" })))?
        .unwrap();

    let merged = animals
        .merge(Some(&dog), &props_from_json(json!({ "type": "cat", "name": "Tom" })))?
        .unwrap();

    assert_eq!(merged.class().as_str(), "Cat");
    assert!(!merged.ptr_eq(&dog));
    assert!(merged.get("sound").is_none());
    assert_eq!(dog.class().as_str(), "Dog");
    assert_eq!(dog.get("sound"), Some(Property::from("woof")));
    Ok(())
}

#[test]
fn test_merge_same_variant_mutates_in_place() -> Result<()> {
    let manager = DocumentManager::new(&animals()?, MapperConfig::default())?;
    let animals = manager.document("Animal")?;

    let dog = animals
        .init(&props_from_json(json!({ "type": "dog", "name": "Rex" })))?
        .unwrap();
    let id = dog.get("id");

    let merged = animals
        .merge(Some(&dog), &props_from_json(json!({ "sound": "grr" })))?
        .unwrap();

    assert!(merged.ptr_eq(&dog));
    assert_eq!(dog.get("sound"), Some(Property::from("grr")));
    assert_eq!(dog.get("name"), Some(Property::from("Rex")));
    assert_eq!(dog.get("id"), id);
    Ok(())
}

#[test]
fn test_merge_rebuilds_embedded_arrays() -> Result<()> {
    let manager = DocumentManager::new(&people()?, MapperConfig::default())?;
    let mapper = manager.document("Person")?;

    let person = mapper
        .init(&props_from_json(json!({ "tags": [{ "v": "a" }, { "v": "b" }] })))?
        .unwrap();
    mapper.merge(Some(&person), &props_from_json(json!({ "tags": [{ "v": "c" }] })))?;

    let tags = person.get("tags").unwrap();
    let tags = tags.as_list().unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].as_model().unwrap().get("v"), Some(Property::from("c")));
    Ok(())
}

#[test]
fn test_merge_without_model_initializes() -> Result<()> {
    let manager = DocumentManager::new(&people()?, MapperConfig::default())?;
    let mapper = manager.document("Person")?;

    let person = mapper
        .merge(None, &props_from_json(json!({ "name": "New" })))?
        .unwrap();
    assert!(person.get("id").is_some());
    assert_eq!(person.get("name"), Some(Property::from("New")));
    Ok(())
}

#[test]
fn test_init_accepts_persisted_encoding() -> Result<()> {
    let manager = DocumentManager::new(&people()?, MapperConfig::default())?;
    let mapper = manager.document("Person")?;
    let raw = ObjectId::new();

    let mut props = props_from_json(json!({ "name": "Enc" }));
    props.insert("id".into(), Property::from(raw));
    let person = mapper.init(&props)?.unwrap();

    assert_eq!(person.get("id"), Some(Property::from(raw.to_hex())));

    let mut bad = props_from_json(json!({}));
    bad.insert("id".into(), Property::from(true));
    assert!(mapper.init(&bad).unwrap_err().is_invalid_value());
    Ok(())
}

static CREATED: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Default)]
struct CountingIdType;

impl Type for CountingIdType {
    fn name(&self) -> &'static str {
        "countingId"
    }

    fn is_valid_model_value(&self, value: &Value) -> bool {
        value.as_str().is_some()
    }

    fn is_valid_persisted_value(&self, value: &Value) -> bool {
        value.as_str().is_some()
    }

    fn convert_to_persisted(&self, value: &Value) -> Value {
        value.clone()
    }

    fn convert_to_model(&self, value: &Value) -> Value {
        value.clone()
    }

    fn can_create_model_value(&self) -> bool {
        true
    }

    fn create_model_value(&self, _seed: Option<&Value>) -> Option<Value> {
        let n = CREATED.fetch_add(1, Ordering::SeqCst);
        Some(Value::Text(format!("gen-{n}")))
    }
}

#[test]
fn test_present_value_is_never_synthesized() -> Result<()> {
    let types = TypeRegistry::with_builtin_types();
    types.register(CountingIdType);
    let registry = MetadataRegistry::new().with(
        ClassRegistration::document("Ticket", "tickets")
            .field(FieldDeclaration::identifier("id", "countingId"))
            .field(FieldDeclaration::field("title")),
    )?;
    let manager = DocumentManager::with_types(&registry, types, MapperConfig::default())?;
    let tickets = manager.document("Ticket")?;

    let before = CREATED.load(Ordering::SeqCst);
    let ticket = tickets
        .init(&props_from_json(json!({ "id": "given", "title": "t" })))?
        .unwrap();
    tickets.merge(Some(&ticket), &props_from_json(json!({ "title": "u" })))?;
    let doc = tickets.to_persisted(&ticket)?.unwrap();
    assert_eq!(CREATED.load(Ordering::SeqCst), before);
    assert_eq!(doc["_id"], Value::from("given"));

    let fresh = tickets.init(&props_from_json(json!({ "title": "v" })))?.unwrap();
    assert!(CREATED.load(Ordering::SeqCst) > before);
    assert!(fresh.get("id").unwrap().as_str().unwrap().starts_with("gen-"));
    Ok(())
}
