/// Concurrent access tests
///
/// One manager shared by many tasks, all hitting classes that have not
/// been compiled yet.
/// Run with: cargo test --test concurrent_access_tests

use rustodm::core::{document_from_json, props_from_json};
use rustodm::{
    ClassRegistration, DocumentManager, FieldDeclaration, MapperConfig, MetadataRegistry, ObjectId,
    Property, Value,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Barrier;

fn manager() -> Arc<DocumentManager> {
    let registry = MetadataRegistry::new()
        .with(
            ClassRegistration::document("Order", "orders")
                .field(FieldDeclaration::identifier("id", "stringId"))
                .field(FieldDeclaration::field("status").name("s"))
                .field(FieldDeclaration::embedded_array("items", "Item")),
        )
        .unwrap()
        .with(
            ClassRegistration::embedded("Item")
                .field(FieldDeclaration::field("sku").typed("stringId"))
                .field(FieldDeclaration::field("qty").typed("integer").name("q")),
        )
        .unwrap();
    Arc::new(DocumentManager::new(&registry, MapperConfig::default()).unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_use() {
    let manager = manager();
    let num_tasks = 16;
    let barrier = Arc::new(Barrier::new(num_tasks));
    let mut handles = vec![];

    for task_id in 0..num_tasks {
        let manager = Arc::clone(&manager);
        let barrier = Arc::clone(&barrier);

        let handle = tokio::spawn(async move {
            barrier.wait().await;
            let orders = manager.document("Order").unwrap();
            let sku = ObjectId::new().to_hex();
            let qty = task_id as i64;

            let order = orders
                .init(&props_from_json(json!({
                    "status": format!("task_{}", task_id),
                    "items": [{ "sku": sku.clone(), "qty": qty }]
                })))
                .unwrap()
                .unwrap();

            let doc = orders.to_persisted(&order).unwrap().unwrap();
            assert_eq!(doc["s"], Value::from(format!("task_{}", task_id)));
            let item = doc["items"].as_array().unwrap()[0].as_document().unwrap();
            assert_eq!(item["sku"], Value::ObjectId(ObjectId::parse_str(&sku).unwrap()));
            assert_eq!(item["q"], Value::Integer(qty));

            let restored = orders.from_persisted(&doc).unwrap().unwrap();
            assert_eq!(restored, order, "Task {} lost data in round trip", task_id);

            let cast = orders.cast_filter(&document_from_json(json!({ "items.sku": sku.clone() })));
            assert_eq!(
                cast["items.sku"],
                Value::ObjectId(ObjectId::parse_str(&sku).unwrap())
            );
        });

        handles.push(handle);
    }

    for handle in handles {
        handle.await.unwrap();
    }
}

#[test]
fn test_concurrent_reads_across_threads() {
    let manager = manager();
    manager.warm_up();

    std::thread::scope(|scope| {
        for thread_id in 0..8 {
            let manager = &manager;
            scope.spawn(move || {
                let orders = manager.document("Order").unwrap();
                for i in 0..50 {
                    let order = orders
                        .init(&props_from_json(json!({ "status": format!("{}-{}", thread_id, i) })))
                        .unwrap()
                        .unwrap();
                    orders
                        .merge(Some(&order), &props_from_json(json!({ "status": "done" })))
                        .unwrap();
                    assert_eq!(order.get("status"), Some(Property::from("done")));
                }
            });
        }
    });
}
