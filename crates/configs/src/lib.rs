use anyhow::{anyhow, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".into(), port: 8080, worker_threads: Some(4) }
    }
}

/// Which repository backend the service persists through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Mongo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_mongo_url")]
    pub mongo_url: String,
    #[serde(default = "default_mongo_database")]
    pub mongo_database: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            data_dir: default_data_dir(),
            mongo_url: default_mongo_url(),
            mongo_database: default_mongo_database(),
        }
    }
}

fn default_data_dir() -> String { "data".to_string() }
fn default_mongo_url() -> String { "mongodb://localhost:27017".to_string() }
fn default_mongo_database() -> String { "databox".to_string() }

pub fn load_default() -> Result<AppConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    load_from_file(&path)
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let cfg: AppConfig = toml::from_str(&content)?;
    Ok(cfg)
}

impl AppConfig {
    pub fn load_and_validate() -> Result<Self> {
        let mut cfg = load_default()?;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.server.normalize()?;
        self.storage.normalize_from_env();
        self.storage.validate()?;
        Ok(())
    }
}

impl ServerConfig {
    fn normalize(&mut self) -> Result<()> {
        if self.host.trim().is_empty() {
            self.host = "127.0.0.1".to_string();
        }
        if self.port == 0 {
            return Err(anyhow!("server.port must be in 1..=65535"));
        }
        if self.worker_threads == Some(0) || self.worker_threads.is_none() {
            self.worker_threads = Some(4);
        }
        Ok(())
    }
}

impl StorageConfig {
    /// Fill settings from environment variables when present; env wins over TOML.
    pub fn normalize_from_env(&mut self) {
        if let Ok(backend) = std::env::var("STORAGE_BACKEND") {
            match backend.to_ascii_lowercase().as_str() {
                "file" => self.backend = StorageBackend::File,
                "mongo" => self.backend = StorageBackend::Mongo,
                _ => {}
            }
        }
        if let Ok(dir) = std::env::var("DATA_DIR") {
            if !dir.trim().is_empty() {
                self.data_dir = dir;
            }
        }
        if let Ok(url) = std::env::var("MONGODB_URL") {
            if !url.trim().is_empty() {
                self.mongo_url = url;
            }
        }
        if let Ok(db) = std::env::var("MONGODB_DATABASE") {
            if !db.trim().is_empty() {
                self.mongo_database = db;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.backend {
            StorageBackend::File => {
                if self.data_dir.trim().is_empty() {
                    return Err(anyhow!("storage.data_dir is empty; set it in config.toml or DATA_DIR"));
                }
            }
            StorageBackend::Mongo => {
                let lower = self.mongo_url.to_lowercase();
                if !(lower.starts_with("mongodb://") || lower.starts_with("mongodb+srv://")) {
                    return Err(anyhow!("storage.mongo_url must start with mongodb:// or mongodb+srv://"));
                }
                if self.mongo_database.trim().is_empty() {
                    return Err(anyhow!("storage.mongo_database is empty; set it in config.toml or MONGODB_DATABASE"));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_file_backend() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.storage.backend, StorageBackend::File);
        assert_eq!(cfg.storage.data_dir, "data");
        assert_eq!(cfg.server.port, 8080);
    }

    #[test]
    fn parses_toml_with_mongo_backend() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [server]
            host = "0.0.0.0"
            port = 9000

            [storage]
            backend = "mongo"
            mongo_url = "mongodb://db.internal:27017"
            mongo_database = "objects"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.storage.backend, StorageBackend::Mongo);
        assert_eq!(cfg.storage.mongo_database, "objects");
        assert_eq!(cfg.server.port, 9000);
        assert!(cfg.storage.validate().is_ok());
    }

    #[test]
    fn rejects_bad_mongo_url() {
        let cfg = StorageConfig {
            backend: StorageBackend::Mongo,
            mongo_url: "postgres://nope".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_port() {
        let mut cfg = AppConfig::default();
        cfg.server.port = 0;
        assert!(cfg.normalize_and_validate().is_err());
    }
}
