use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::{
    bson::{self, doc, oid::ObjectId, Bson, Document},
    options::ReplaceOptions,
    Client,
};
use serde_json::Value;

use crate::errors::StorageError;
use crate::repository::{into_object, validate_namespace, Repository, ID_FIELD};

/// MongoDB-backed repository: one collection per namespace, one document per
/// record, identifiers assigned by the database as ObjectIds.
///
/// Every operation opens its own client, runs one action against the
/// namespace's collection, and shuts the client down whether the action
/// succeeded or not. Per-document atomicity is the database's concern; no
/// extra serialization is layered on top.
pub struct MongoStore {
    url: String,
    database: String,
}

impl MongoStore {
    pub fn new(url: impl Into<String>, database: impl Into<String>) -> Self {
        Self { url: url.into(), database: database.into() }
    }

    async fn connect(&self, namespace: &str) -> Result<Client, StorageError> {
        Client::with_uri_str(&self.url)
            .await
            .map_err(|e| StorageError::backend(namespace, e))
    }

    fn parse_object_id(namespace: &str, id: &str) -> Result<ObjectId, StorageError> {
        ObjectId::parse_str(id).map_err(|e| StorageError::backend(namespace, e))
    }
}

/// Materialize a stored document as a record: `_id` becomes the record's
/// [`ID_FIELD`] as a hex string.
fn document_to_record(namespace: &str, mut doc: Document) -> Result<Value, StorageError> {
    let id = match doc.remove("_id") {
        Some(Bson::ObjectId(oid)) => oid.to_hex(),
        Some(other) => other.to_string(),
        None => return Err(StorageError::backend(namespace, anyhow::anyhow!("document missing _id"))),
    };
    let mut value = serde_json::to_value(&doc)
        .map_err(|e| StorageError::backend(namespace, e))?;
    if let Value::Object(map) = &mut value {
        map.insert(ID_FIELD.to_string(), Value::String(id));
    }
    Ok(value)
}

#[async_trait]
impl Repository for MongoStore {
    async fn create(&self, namespace: &str, data: Value) -> Result<Value, StorageError> {
        validate_namespace(namespace)?;
        let mut record = into_object(data)?;
        // `_id` is authoritative; never store a stale caller-supplied id.
        record.remove(ID_FIELD);
        let doc = bson::to_document(&record).map_err(|e| StorageError::backend(namespace, e))?;

        let client = self.connect(namespace).await?;
        let coll = client.database(&self.database).collection::<Document>(namespace);
        let outcome = coll.insert_one(doc, None).await;
        client.shutdown().await;

        let inserted = outcome.map_err(|e| StorageError::backend(namespace, e))?;
        let id = match inserted.inserted_id {
            Bson::ObjectId(oid) => oid.to_hex(),
            other => other.to_string(),
        };
        record.insert(ID_FIELD.to_string(), Value::String(id));
        Ok(Value::Object(record))
    }

    async fn read(&self, namespace: &str) -> Result<Vec<Value>, StorageError> {
        validate_namespace(namespace)?;
        let client = self.connect(namespace).await?;
        let coll = client.database(&self.database).collection::<Document>(namespace);
        let outcome = async {
            let mut cursor = coll.find(None, None).await?;
            let mut docs = Vec::new();
            while let Some(doc) = cursor.try_next().await? {
                docs.push(doc);
            }
            Ok::<_, mongodb::error::Error>(docs)
        }
        .await;
        client.shutdown().await;

        let docs = outcome.map_err(|e| StorageError::backend(namespace, e))?;
        docs.into_iter()
            .map(|doc| document_to_record(namespace, doc))
            .collect()
    }

    async fn update(&self, namespace: &str, id: &str, data: Value) -> Result<bool, StorageError> {
        validate_namespace(namespace)?;
        let mut record = into_object(data)?;
        record.remove(ID_FIELD);
        let oid = Self::parse_object_id(namespace, id)?;
        let replacement =
            bson::to_document(&record).map_err(|e| StorageError::backend(namespace, e))?;

        let client = self.connect(namespace).await?;
        let coll = client.database(&self.database).collection::<Document>(namespace);
        let opts = ReplaceOptions::builder().upsert(true).build();
        let outcome = coll.replace_one(doc! { "_id": oid }, replacement, opts).await;
        client.shutdown().await;

        let result = outcome.map_err(|e| StorageError::backend(namespace, e))?;
        // Nothing modified means the upsert inserted a new document.
        Ok(result.modified_count == 0)
    }

    async fn delete(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
        validate_namespace(namespace)?;
        let oid = Self::parse_object_id(namespace, id)?;

        let client = self.connect(namespace).await?;
        let coll = client.database(&self.database).collection::<Document>(namespace);
        let outcome = coll.delete_one(doc! { "_id": oid }, None).await;
        client.shutdown().await;

        let result = outcome.map_err(|e| StorageError::backend(namespace, e))?;
        Ok(result.deleted_count == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::options::ClientOptions;
    use serde_json::json;
    use std::time::Duration;
    use uuid::Uuid;

    const TEST_DATABASE: &str = "databox_test";

    /// Connect with a short selection timeout; skip the test when no MongoDB
    /// server is reachable, same as the database-backed tests elsewhere.
    async fn test_client(url: &str) -> Option<Client> {
        let mut opts = match ClientOptions::parse(url).await {
            Ok(o) => o,
            Err(e) => {
                eprintln!("skip: cannot parse mongo url: {}", e);
                return None;
            }
        };
        opts.server_selection_timeout = Some(Duration::from_secs(2));
        let client = match Client::with_options(opts) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("skip: cannot build mongo client: {}", e);
                return None;
            }
        };
        if let Err(e) = client.database("admin").run_command(doc! {"ping": 1}, None).await {
            eprintln!("skip: cannot connect to mongodb: {}", e);
            return None;
        }
        Some(client)
    }

    #[tokio::test]
    async fn mongo_store_full_crud() {
        let url =
            std::env::var("MONGODB_URL").unwrap_or_else(|_| "mongodb://localhost:27017".into());
        let Some(client) = test_client(&url).await else { return };
        let namespace = format!("it_{}", Uuid::new_v4().simple());
        let store = MongoStore::new(&url, TEST_DATABASE);

        let rec = store.create(&namespace, json!({"item": "pen"})).await.expect("create");
        let id = rec[ID_FIELD].as_str().expect("hex id").to_string();

        let all = store.read(&namespace).await.expect("read");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0]["item"], json!("pen"));
        assert_eq!(all[0][ID_FIELD], json!(id.clone()));

        // replace existing -> created = false, full replacement
        let created = store
            .update(&namespace, &id, json!({"item": "pencil"}))
            .await
            .expect("update");
        assert!(!created);
        let all = store.read(&namespace).await.expect("read");
        assert_eq!(all[0]["item"], json!("pencil"));

        // upsert under a fresh identifier -> created = true
        let fresh = ObjectId::new().to_hex();
        let created = store
            .update(&namespace, &fresh, json!({"item": "ink"}))
            .await
            .expect("upsert");
        assert!(created);
        assert_eq!(store.read(&namespace).await.expect("read").len(), 2);

        assert!(store.delete(&namespace, &id).await.expect("delete"));
        assert!(!store.delete(&namespace, &id).await.expect("delete again"));

        // malformed identifiers surface as backend errors
        assert!(store.update(&namespace, "not-an-oid", json!({})).await.is_err());
        assert!(store.delete(&namespace, "not-an-oid").await.is_err());

        let _ = client
            .database(TEST_DATABASE)
            .collection::<Document>(&namespace)
            .drop(None)
            .await;
    }

    #[tokio::test]
    async fn mongo_read_of_untouched_namespace_is_empty() {
        let url =
            std::env::var("MONGODB_URL").unwrap_or_else(|_| "mongodb://localhost:27017".into());
        if test_client(&url).await.is_none() {
            return;
        }
        let store = MongoStore::new(&url, TEST_DATABASE);
        let namespace = format!("it_{}", Uuid::new_v4().simple());
        let all = store.read(&namespace).await.expect("read");
        assert!(all.is_empty());
    }
}
