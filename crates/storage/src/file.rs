use std::{collections::HashMap, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::{fs, sync::Mutex};
use tracing::warn;

use crate::errors::StorageError;
use crate::repository::{into_object, validate_namespace, Repository, ID_FIELD};

/// File-backed repository: one JSON file per namespace under a root
/// directory, holding a map of string identifier to record.
///
/// The whole map is rewritten on every mutation, so mutations on the same
/// namespace are serialized behind a per-namespace mutex; two concurrent
/// rewrites could otherwise race and silently drop one side's change.
/// Namespaces are loaded lazily while holding that mutex, so callers that
/// arrive during the initial load queue up instead of seeing partial data.
pub struct FileStore {
    root: PathBuf,
    namespaces: DashMap<String, Arc<Mutex<Dataset>>>,
}

/// In-memory state of one namespace.
struct Dataset {
    loaded: bool,
    records: HashMap<String, Value>,
    /// Highest numeric identifier ever observed; `create` issues cursor + 1.
    cursor: u64,
}

impl Dataset {
    fn new() -> Self {
        Self { loaded: false, records: HashMap::new(), cursor: 0 }
    }
}

impl FileStore {
    /// Build a store rooted at the given data directory. The directory is
    /// created lazily before the first write.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into(), namespaces: DashMap::new() }
    }

    fn namespace_path(&self, namespace: &str) -> PathBuf {
        self.root.join(format!("{namespace}.json"))
    }

    fn dataset(&self, namespace: &str) -> Arc<Mutex<Dataset>> {
        self.namespaces
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Dataset::new())))
            .clone()
    }

    /// Load the backing file on first access. A missing file is a fresh
    /// namespace; an unreadable or malformed file is logged and the dataset
    /// falls back to explicitly empty rather than propagating undefined state.
    async fn ensure_loaded(&self, namespace: &str, dataset: &mut Dataset) {
        if dataset.loaded {
            return;
        }
        let path = self.namespace_path(namespace);
        match fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<HashMap<String, Value>>(&bytes) {
                Ok(records) => {
                    dataset.cursor = records
                        .keys()
                        .filter_map(|k| k.parse::<u64>().ok())
                        .max()
                        .unwrap_or(0);
                    dataset.records = records;
                }
                Err(error) => {
                    warn!(namespace, %error, "malformed namespace file, starting from an empty dataset");
                }
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => {
                warn!(namespace, %error, "unreadable namespace file, starting from an empty dataset");
            }
        }
        dataset.loaded = true;
    }

    /// Serialize the entire dataset to the namespace's backing file.
    async fn persist(&self, namespace: &str, dataset: &Dataset) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).await.map_err(|e| StorageError::Persist {
            namespace: namespace.to_string(),
            source: e,
        })?;
        let bytes = serde_json::to_vec(&dataset.records).map_err(|e| StorageError::Serialize {
            namespace: namespace.to_string(),
            source: e,
        })?;
        fs::write(self.namespace_path(namespace), bytes)
            .await
            .map_err(|e| StorageError::Persist { namespace: namespace.to_string(), source: e })
    }
}

/// Canonical storage key for a caller-supplied identifier: numeric ids
/// collapse to their decimal form, so "010" addresses the same record as
/// "10"; anything else is used verbatim.
fn canonical_key(id: &str) -> String {
    match id.parse::<u64>() {
        Ok(n) => n.to_string(),
        Err(_) => id.to_string(),
    }
}

/// Identifier as embedded inside a record: numeric when it parses as an
/// integer (store-assigned ids), the raw string otherwise.
fn embedded_id(id: &str) -> Value {
    match id.parse::<u64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::from(id),
    }
}

#[async_trait]
impl Repository for FileStore {
    async fn create(&self, namespace: &str, data: Value) -> Result<Value, StorageError> {
        validate_namespace(namespace)?;
        let mut record = into_object(data)?;
        let handle = self.dataset(namespace);
        let mut dataset = handle.lock().await;
        self.ensure_loaded(namespace, &mut dataset).await;

        let id = dataset
            .cursor
            .checked_add(1)
            .ok_or_else(|| StorageError::IdentifiersExhausted(namespace.to_string()))?;
        let key = id.to_string();
        record.insert(ID_FIELD.to_string(), Value::from(id));
        let record = Value::Object(record);
        dataset.records.insert(key.clone(), record.clone());
        match self.persist(namespace, &dataset).await {
            Ok(()) => {
                // The identifier counts as issued only once it is durable.
                dataset.cursor = id;
                Ok(record)
            }
            Err(e) => {
                dataset.records.remove(&key);
                Err(e)
            }
        }
    }

    async fn read(&self, namespace: &str) -> Result<Vec<Value>, StorageError> {
        validate_namespace(namespace)?;
        let handle = self.dataset(namespace);
        let mut dataset = handle.lock().await;
        self.ensure_loaded(namespace, &mut dataset).await;
        Ok(dataset.records.values().cloned().collect())
    }

    async fn update(&self, namespace: &str, id: &str, data: Value) -> Result<bool, StorageError> {
        validate_namespace(namespace)?;
        let mut record = into_object(data)?;
        record.insert(ID_FIELD.to_string(), embedded_id(id));
        let record = Value::Object(record);
        let key = canonical_key(id);

        let handle = self.dataset(namespace);
        let mut dataset = handle.lock().await;
        self.ensure_loaded(namespace, &mut dataset).await;

        let prev = dataset.records.insert(key.clone(), record);
        let created = prev.is_none();
        match self.persist(namespace, &dataset).await {
            Ok(()) => {
                // A manually supplied identifier above the cursor must move
                // it forward, or a later create would collide with it.
                if let Ok(n) = id.parse::<u64>() {
                    if n > dataset.cursor {
                        dataset.cursor = n;
                    }
                }
                Ok(created)
            }
            Err(e) => {
                match prev {
                    Some(prev) => {
                        dataset.records.insert(key, prev);
                    }
                    None => {
                        dataset.records.remove(&key);
                    }
                }
                Err(e)
            }
        }
    }

    async fn delete(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
        validate_namespace(namespace)?;
        let handle = self.dataset(namespace);
        let mut dataset = handle.lock().await;
        self.ensure_loaded(namespace, &mut dataset).await;

        let key = canonical_key(id);
        let Some(prev) = dataset.records.remove(&key) else {
            return Ok(false);
        };
        match self.persist(namespace, &dataset).await {
            Ok(()) => Ok(true),
            Err(e) => {
                dataset.records.insert(key, prev);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("databox_file_store_{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn create_and_read_persists() -> Result<(), anyhow::Error> {
        let root = temp_root();
        let store = FileStore::new(&root);

        let rec = store.create("notes", json!({"text": "hello"})).await?;
        assert_eq!(rec[ID_FIELD], json!(1));
        assert_eq!(rec["text"], json!("hello"));

        // fresh store over the same directory sees the record
        let store2 = FileStore::new(&root);
        let all = store2.read("notes").await?;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], json!({"id": 1, "text": "hello"}));

        let _ = tokio::fs::remove_dir_all(&root).await;
        Ok(())
    }

    #[tokio::test]
    async fn rejects_non_object_data() {
        let root = temp_root();
        let store = FileStore::new(&root);
        let err = store.create("notes", json!([1, 2, 3])).await.unwrap_err();
        assert!(matches!(err, StorageError::NotAnObject));
        assert!(matches!(
            store.create("..", json!({})).await.unwrap_err(),
            StorageError::InvalidNamespace(_)
        ));
        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn namespaces_are_isolated() -> Result<(), anyhow::Error> {
        let root = temp_root();
        let store = FileStore::new(&root);
        store.create("alpha", json!({"v": 1})).await?;
        store.create("beta", json!({"v": 2})).await?;
        assert_eq!(store.read("alpha").await?.len(), 1);
        assert_eq!(store.read("beta").await?.len(), 1);
        assert_eq!(store.read("gamma").await?.len(), 0);
        let _ = tokio::fs::remove_dir_all(&root).await;
        Ok(())
    }
}
