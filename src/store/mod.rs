pub mod data_api;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// A filter document: field equality on dotted paths, plus `$or`.
pub type Filter = Map<String, Value>;

/// Collection-level CRUD over a document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert one document, returning its id.
    async fn insert_one(&self, collection: &str, document: Value) -> Result<String>;
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>>;
    /// Delete every matching document, returning how many went.
    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64>;
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64>;
    async fn list_collections(&self) -> Result<Vec<String>>;
}

/// Build a single-field equality filter.
pub fn filter_eq(field: &str, value: impl Into<Value>) -> Filter {
    let mut filter = Map::new();
    filter.insert(field.to_string(), value.into());
    filter
}

/// Does `document` satisfy `filter`?
///
/// Every key must match. `$or` holds an array of sub-filters, at least one of
/// which must match. Other keys are dotted paths compared for equality.
pub fn matches(document: &Value, filter: &Filter) -> bool {
    filter.iter().all(|(key, expected)| {
        if key == "$or" {
            return expected.as_array().is_some_and(|alternatives| {
                alternatives
                    .iter()
                    .filter_map(Value::as_object)
                    .any(|sub| matches(document, sub))
            });
        }
        lookup(document, key) == Some(expected)
    })
}

fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |current, segment| current.get(segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "username": "cristiano",
            "profile_data": {"username": "cristiano", "followers_count": 10},
        })
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches(&doc(), &Filter::new()));
        assert!(matches(&json!({}), &Filter::new()));
    }

    #[test]
    fn top_level_equality() {
        assert!(matches(&doc(), &filter_eq("username", "cristiano")));
        assert!(!matches(&doc(), &filter_eq("username", "messi")));
    }

    #[test]
    fn dotted_path_equality() {
        assert!(matches(&doc(), &filter_eq("profile_data.followers_count", 10)));
        assert!(!matches(&doc(), &filter_eq("profile_data.missing", 10)));
    }

    #[test]
    fn or_needs_one_alternative() {
        let filter = json!({"$or": [
            {"username": "messi"},
            {"profile_data.username": "cristiano"},
        ]});
        assert!(matches(&doc(), filter.as_object().unwrap()));

        let filter = json!({"$or": [{"username": "messi"}]});
        assert!(!matches(&doc(), filter.as_object().unwrap()));
    }

    #[test]
    fn malformed_or_matches_nothing() {
        let filter = json!({"$or": "nope"});
        assert!(!matches(&doc(), filter.as_object().unwrap()));
    }
}
