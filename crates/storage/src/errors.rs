use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid namespace {0:?}")]
    InvalidNamespace(String),
    #[error("identifier space exhausted in namespace {0}")]
    IdentifiersExhausted(String),
    #[error("record data must be a JSON object")]
    NotAnObject,
    #[error("serialize namespace {namespace}: {source}")]
    Serialize {
        namespace: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("persist namespace {namespace}: {source}")]
    Persist {
        namespace: String,
        #[source]
        source: std::io::Error,
    },
    #[error("backend error on collection {collection}: {source}")]
    Backend {
        collection: String,
        #[source]
        source: anyhow::Error,
    },
}

impl StorageError {
    pub fn backend(collection: &str, source: impl Into<anyhow::Error>) -> Self {
        Self::Backend { collection: collection.to_string(), source: source.into() }
    }

    /// Whether the error is the caller's fault rather than a storage failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidNamespace(_) | Self::NotAnObject)
    }
}
