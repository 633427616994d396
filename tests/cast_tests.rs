use anyhow::Result;
use rustodm::core::document_from_json;
use rustodm::{
    CastOptions, ClassRegistration, DiscriminatorDeclaration, DocumentManager, FieldDeclaration,
    MapperConfig, MetadataRegistry, ObjectId, Value,
};
use serde_json::json;

fn orders() -> Result<MetadataRegistry> {
    Ok(MetadataRegistry::new()
        .with(
            ClassRegistration::document("Order", "orders")
                .field(FieldDeclaration::identifier("id", "stringId"))
                .field(FieldDeclaration::field("status"))
                .field(FieldDeclaration::field("tags").typed("stringId").array())
                .field(FieldDeclaration::field("placed").typed("date").name("at"))
                .field(FieldDeclaration::embedded_array("items", "Item")),
        )?
        .with(
            ClassRegistration::embedded("Item")
                .field(FieldDeclaration::field("code").name("cd"))
                .field(FieldDeclaration::field("sku").typed("stringId")),
        )?)
}

#[test]
fn test_identifier_filter_is_encoded() -> Result<()> {
    let manager = DocumentManager::new(&orders()?, MapperConfig::default())?;
    let orders = manager.document("Order")?;

    let cast = orders.cast_filter(&document_from_json(json!({ "_id": "507f191e810c19729de860ea" })));

    assert_eq!(
        cast["_id"],
        Value::ObjectId(ObjectId::parse_str("507f191e810c19729de860ea")?)
    );
    Ok(())
}

#[test]
fn test_identifier_property_name_resolves() -> Result<()> {
    let manager = DocumentManager::new(&orders()?, MapperConfig::default())?;
    let orders = manager.document("Order")?;
    let id = ObjectId::new();

    let cast = orders.cast_filter(&document_from_json(json!({ "id": { "$ne": id.to_hex() } })));

    let condition = cast["_id"].as_document().expect("renamed to _id");
    assert_eq!(condition["$ne"], Value::ObjectId(id));
    Ok(())
}

#[test]
fn test_numeric_segment_is_kept_and_name_renamed() -> Result<()> {
    let manager = DocumentManager::new(&orders()?, MapperConfig::default())?;
    let orders = manager.document("Order")?;

    let cast = orders.cast_update(&document_from_json(json!({ "$set": { "items.0.code": "abc" } })));

    assert_eq!(cast, document_from_json(json!({ "$set": { "items.0.cd": "abc" } })));
    Ok(())
}

#[test]
fn test_embedded_condition_recurses() -> Result<()> {
    let manager = DocumentManager::new(&orders()?, MapperConfig::default())?;
    let orders = manager.document("Order")?;
    let sku = ObjectId::new();

    let cast = orders.cast_filter(&document_from_json(json!({
        "items": { "$elemMatch": { "code": "a", "sku": sku.to_hex() } }
    })));

    let matched = cast["items"].as_document().unwrap()["$elemMatch"]
        .as_document()
        .unwrap()
        .clone();
    assert_eq!(matched["cd"], Value::from("a"));
    assert_eq!(matched["sku"], Value::ObjectId(sku));
    Ok(())
}

#[test]
fn test_exempt_operator_payload_is_not_cast() -> Result<()> {
    let manager = DocumentManager::new(&orders()?, MapperConfig::default())?;
    let orders = manager.document("Order")?;

    let cast = orders.cast_update(&document_from_json(json!({
        "$pop": { "tags": 1 },
        "$unset": { "placed": "" }
    })));

    assert_eq!(
        cast,
        document_from_json(json!({ "$pop": { "tags": 1 }, "$unset": { "at": "" } }))
    );
    Ok(())
}

#[test]
fn test_array_field_push_each_is_cast() -> Result<()> {
    let manager = DocumentManager::new(&orders()?, MapperConfig::default())?;
    let orders = manager.document("Order")?;
    let a = ObjectId::new();
    let b = ObjectId::new();

    let cast = orders.cast_update(&document_from_json(json!({
        "$push": { "tags": { "$each": [a.to_hex(), b.to_hex()], "$position": 0 } }
    })));

    let push = cast["$push"].as_document().unwrap()["tags"]
        .as_document()
        .unwrap()
        .clone();
    assert_eq!(push["$each"], Value::Array(vec![Value::ObjectId(a), Value::ObjectId(b)]));
    assert_eq!(push["$position"], Value::Integer(0));
    Ok(())
}

#[test]
fn test_configured_exemption() -> Result<()> {
    let config = MapperConfig::new().cast_options(CastOptions::default().exempt_operator("$raw"));
    let manager = DocumentManager::new(&orders()?, config)?;
    let orders = manager.document("Order")?;
    let hex = ObjectId::new().to_hex();

    let cast = orders.cast_filter(&document_from_json(json!({ "_id": { "$raw": hex.clone() } })));

    assert_eq!(cast["_id"].as_document().unwrap()["$raw"], Value::Text(hex));
    Ok(())
}

#[test]
fn test_date_strings_become_timestamps() -> Result<()> {
    let manager = DocumentManager::new(&orders()?, MapperConfig::default())?;
    let orders = manager.document("Order")?;

    let cast = orders.cast_filter(&document_from_json(json!({
        "placed": { "$gte": "2024-01-01T00:00:00Z", "$exists": true }
    })));

    let range = cast["at"].as_document().unwrap();
    assert!(matches!(range["$gte"], Value::Timestamp(_)));
    assert_eq!(range["$exists"], Value::Boolean(true));
    Ok(())
}

#[test]
fn test_dbref_keys_are_fields() -> Result<()> {
    let manager = DocumentManager::new(&orders()?, MapperConfig::default())?;
    let orders = manager.document("Order")?;
    let filter = document_from_json(json!({ "status": { "$ref": "x", "$id": 1 } }));

    assert_eq!(orders.cast_filter(&filter), filter);
    Ok(())
}

#[test]
fn test_plain_class_is_identity() -> Result<()> {
    let registry = MetadataRegistry::new().with(
        ClassRegistration::embedded("Note")
            .field(FieldDeclaration::field("text"))
            .field(FieldDeclaration::field("score")),
    )?;
    let manager = DocumentManager::new(&registry, MapperConfig::default())?;
    let notes = manager.document("Note")?;

    let filter = document_from_json(json!({
        "$or": [{ "text": "a" }, { "score": { "$gt": 3 } }],
        "unknown.path": [1, 2]
    }));
    assert_eq!(notes.cast_filter(&filter), filter);
    assert_eq!(notes.cast_update(&filter), filter);
    Ok(())
}

#[test]
fn test_discriminator_tag_selects_variant_fields() -> Result<()> {
    let registry = MetadataRegistry::new()
        .with(
            ClassRegistration::document("Shape", "shapes")
                .field(FieldDeclaration::identifier("id", "objectId"))
                .field(FieldDeclaration::field("kind"))
                .discriminator(DiscriminatorDeclaration::new("kind").variant("circle", "Circle")),
        )?
        .with(
            ClassRegistration::embedded("Circle")
                .extends("Shape")
                .field(FieldDeclaration::field("radius").name("r")),
        )?;
    let manager = DocumentManager::new(&registry, MapperConfig::default())?;
    let shapes = manager.document("Shape")?;

    let tagged = shapes.cast_filter(&document_from_json(json!({ "kind": "circle", "radius": 2 })));
    assert_eq!(tagged, document_from_json(json!({ "kind": "circle", "r": 2 })));

    let untagged = shapes.cast_filter(&document_from_json(json!({ "radius": 2 })));
    assert_eq!(untagged, document_from_json(json!({ "radius": 2 })));
    Ok(())
}
