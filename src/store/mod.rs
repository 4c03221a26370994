//! Local item store for collected records.

use crate::errors::{OfscError, OfscErrorKind, OfscResult};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// A stored item: a JSON object with a numeric `id` field.
pub type Item = Map<String, Value>;

/// Storage for items keyed by their numeric `id`.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Adds a new item; fails if its id is already taken.
    async fn add(&self, item: Item) -> OfscResult<()>;

    /// Gets an item by id.
    async fn get(&self, id: i64) -> OfscResult<Option<Item>>;

    /// Gets every item, ordered by id.
    async fn get_all(&self) -> OfscResult<Vec<Item>>;

    /// Inserts or replaces an item.
    async fn update(&self, item: Item) -> OfscResult<()>;

    /// Removes an item, returning whether it existed.
    async fn remove(&self, id: i64) -> OfscResult<bool>;

    /// Removes every item.
    async fn clear(&self) -> OfscResult<()>;
}

fn item_id(item: &Item) -> OfscResult<i64> {
    item.get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| OfscError::validation("Item must have a numeric id"))
}

/// In-memory item store.
pub struct InMemoryItemStore {
    items: RwLock<BTreeMap<i64, Item>>,
}

impl InMemoryItemStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryItemStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ItemStore for InMemoryItemStore {
    async fn add(&self, item: Item) -> OfscResult<()> {
        let id = item_id(&item)?;
        let mut items = self.items.write().await;
        if items.contains_key(&id) {
            return Err(OfscError::new(
                OfscErrorKind::AlreadyExists,
                format!("Item {} already exists", id),
            ));
        }
        items.insert(id, item);
        Ok(())
    }

    async fn get(&self, id: i64) -> OfscResult<Option<Item>> {
        Ok(self.items.read().await.get(&id).cloned())
    }

    async fn get_all(&self) -> OfscResult<Vec<Item>> {
        Ok(self.items.read().await.values().cloned().collect())
    }

    async fn update(&self, item: Item) -> OfscResult<()> {
        let id = item_id(&item)?;
        self.items.write().await.insert(id, item);
        Ok(())
    }

    async fn remove(&self, id: i64) -> OfscResult<bool> {
        Ok(self.items.write().await.remove(&id).is_some())
    }

    async fn clear(&self) -> OfscResult<()> {
        self.items.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(value: Value) -> Item {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_add_and_get() {
        let store = InMemoryItemStore::new();
        store.add(item(json!({"id": 2, "name": "b"}))).await.unwrap();
        store.add(item(json!({"id": 1, "name": "a"}))).await.unwrap();

        assert_eq!(store.get(1).await.unwrap().unwrap()["name"], "a");
        assert!(store.get(3).await.unwrap().is_none());

        let ids: Vec<i64> = store
            .get_all()
            .await
            .unwrap()
            .iter()
            .filter_map(|i| i["id"].as_i64())
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_add_duplicate_fails() {
        let store = InMemoryItemStore::new();
        store.add(item(json!({"id": 1}))).await.unwrap();

        let err = store.add(item(json!({"id": 1}))).await.unwrap_err();
        assert_eq!(*err.kind(), OfscErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn test_missing_id_rejected() {
        let store = InMemoryItemStore::new();
        let err = store.update(item(json!({"name": "x"}))).await.unwrap_err();
        assert_eq!(*err.kind(), OfscErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn test_update_remove_clear() {
        let store = InMemoryItemStore::new();
        store.update(item(json!({"id": 1, "v": 1}))).await.unwrap();
        store.update(item(json!({"id": 1, "v": 2}))).await.unwrap();
        assert_eq!(store.get(1).await.unwrap().unwrap()["v"], 2);

        assert!(store.remove(1).await.unwrap());
        assert!(!store.remove(1).await.unwrap());

        store.update(item(json!({"id": 5}))).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
    }
}
