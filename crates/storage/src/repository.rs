use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::errors::StorageError;

/// Field name under which every record carries its identifier.
pub const ID_FIELD: &str = "id";

/// Repository abstraction for namespaced record persistence.
///
/// All operations are namespace-scoped. Absence of a namespace or a record
/// is a normal outcome (empty read, `false` from delete), never an error;
/// errors mean the backend itself failed.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Assign a fresh identifier, store `data` under it, and return the full
    /// record with the identifier embedded under [`ID_FIELD`]. The identifier
    /// is not issued if persisting fails.
    async fn create(&self, namespace: &str, data: Value) -> Result<Value, StorageError>;

    /// All records in the namespace, order not guaranteed. A namespace that
    /// was never written yields an empty vec.
    async fn read(&self, namespace: &str) -> Result<Vec<Value>, StorageError>;

    /// Upsert `data` under a caller-supplied identifier. Returns `true` when
    /// the identifier did not previously exist. Replaces content entirely,
    /// no field merging. Prior state is kept intact on failure.
    async fn update(&self, namespace: &str, id: &str, data: Value) -> Result<bool, StorageError>;

    /// Remove the record if present; `true` iff something was removed.
    async fn delete(&self, namespace: &str, id: &str) -> Result<bool, StorageError>;
}

/// Namespaces become file names and collection names, so only URL-safe
/// characters are accepted.
pub(crate) fn validate_namespace(namespace: &str) -> Result<(), StorageError> {
    let ok = !namespace.is_empty()
        && namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidNamespace(namespace.to_string()))
    }
}

pub(crate) fn into_object(data: Value) -> Result<Map<String, Value>, StorageError> {
    match data {
        Value::Object(map) => Ok(map),
        _ => Err(StorageError::NotAnObject),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_validation() {
        assert!(validate_namespace("orders").is_ok());
        assert!(validate_namespace("order-items_2").is_ok());
        assert!(validate_namespace("").is_err());
        assert!(validate_namespace("../etc").is_err());
        assert!(validate_namespace("a/b").is_err());
        assert!(validate_namespace("a b").is_err());
    }

    #[test]
    fn only_objects_are_records() {
        assert!(into_object(serde_json::json!({"a": 1})).is_ok());
        assert!(into_object(serde_json::json!([1, 2])).is_err());
        assert!(into_object(serde_json::json!("text")).is_err());
    }
}
