use serde_json::json;

use quant_relay::store::sqlite::SqliteStore;
use quant_relay::store::{DocumentStore, Filter, filter_eq};

fn or_filter(username: &str) -> Filter {
    json!({"$or": [
        {"username": username},
        {"profile_data.username": username},
    ]})
    .as_object()
    .cloned()
    .unwrap()
}

#[tokio::test]
async fn find_preserves_insertion_order() {
    let store: Box<dyn DocumentStore> = Box::new(SqliteStore::in_memory().unwrap());

    store.insert_one("c", json!({"n": 1})).await.unwrap();
    store.insert_one("c", json!({"n": 2})).await.unwrap();

    let docs = store.find("c", &Filter::new()).await.unwrap();
    assert_eq!(docs, vec![json!({"n": 1}), json!({"n": 2})]);
}

#[tokio::test]
async fn nested_and_or_filters() {
    let store = SqliteStore::in_memory().unwrap();

    store
        .insert_one("c", json!({"username": "nasa", "profile_data": {"username": "nasa"}}))
        .await
        .unwrap();
    store
        .insert_one("c", json!({"profile_data": {"username": "nasa"}}))
        .await
        .unwrap();
    store
        .insert_one("c", json!({"username": "esa"}))
        .await
        .unwrap();

    assert_eq!(store.count("c", &or_filter("nasa")).await.unwrap(), 2);
    assert_eq!(
        store
            .count("c", &filter_eq("profile_data.username", "nasa"))
            .await
            .unwrap(),
        2
    );
    assert_eq!(store.delete_many("c", &or_filter("esa")).await.unwrap(), 1);
    assert_eq!(store.count("c", &Filter::new()).await.unwrap(), 2);
}

#[tokio::test]
async fn empty_store_lists_no_collections() {
    let store = SqliteStore::in_memory().unwrap();
    assert!(store.list_collections().await.unwrap().is_empty());
    assert_eq!(store.delete_many("missing", &Filter::new()).await.unwrap(), 0);
}
