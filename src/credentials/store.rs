use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::CredentialError;

/// Хранилище ключей, перечитываемое по требованию
pub trait CredentialStore: Send + Sync {
    /// Все ключи в порядке добавления: (имя, секрет)
    fn list(&self) -> Result<Vec<(String, String)>, CredentialError>;

    fn get(&self, name: &str) -> Result<Option<String>, CredentialError> {
        Ok(self
            .list()?
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, secret)| secret))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCredential {
    name: String,
    #[serde(default)]
    secret: String,
}

/// Ключи в JSON-файле вида `[{"name": "key1", "secret": "..."}]`
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for JsonFileStore {
    fn list(&self) -> Result<Vec<(String, String)>, CredentialError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| CredentialError::Store(format!("{}: {}", self.path.display(), e)))?;
        let stored: Vec<StoredCredential> = serde_json::from_str(&content)
            .map_err(|e| CredentialError::Store(format!("{}: {}", self.path.display(), e)))?;
        Ok(stored.into_iter().map(|c| (c.name, c.secret)).collect())
    }
}

/// Хранилище в памяти
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<Vec<(String, String)>>,
}

impl MemoryStore {
    pub fn new<I, N, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: Into<String>,
    {
        Self {
            entries: RwLock::new(
                entries
                    .into_iter()
                    .map(|(n, s)| (n.into(), s.into()))
                    .collect(),
            ),
        }
    }

    /// Добавляет ключ или обновляет секрет существующего
    pub fn set(&self, name: &str, secret: &str) {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = secret.to_string(),
            None => entries.push((name.to_string(), secret.to_string())),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn list(&self) -> Result<Vec<(String, String)>, CredentialError> {
        Ok(self.entries.read().clone())
    }
}
