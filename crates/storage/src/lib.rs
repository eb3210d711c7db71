//! Storage layer: namespaced CRUD over interchangeable repository backends.
//! - `FileStore` keeps one JSON file per namespace, rewritten whole on every
//!   mutation, with a monotonic identifier cursor.
//! - `MongoStore` keeps one collection per namespace and lets the database
//!   assign ObjectId identifiers.
//! Everything above this crate depends only on the `Repository` trait.

pub mod errors;
pub mod file;
pub mod mongo;
pub mod repository;

pub use errors::StorageError;
pub use file::FileStore;
pub use mongo::MongoStore;
pub use repository::{Repository, ID_FIELD};

use std::sync::Arc;

use configs::{StorageBackend, StorageConfig};

/// Open the repository backend selected by configuration.
pub fn open_repository(cfg: &StorageConfig) -> Arc<dyn Repository> {
    match cfg.backend {
        StorageBackend::File => Arc::new(FileStore::new(&cfg.data_dir)),
        StorageBackend::Mongo => Arc::new(MongoStore::new(&cfg.mongo_url, &cfg.mongo_database)),
    }
}
