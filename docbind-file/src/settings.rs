//! Connection settings for the file-backed store.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where and how a [`FileStore`](crate::FileStore) keeps its files.
///
/// Deserializes with defaults for missing keys, so a partial configuration is enough:
///
/// ```ignore
/// let settings: FileStoreSettings = serde_json::from_str(r#"{ "directory_path": "data" }"#)?;
/// assert_eq!(settings.database_name, "test");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileStoreSettings {
    /// Folder holding one journal file per collection. Defaults to the current directory.
    pub directory_path: PathBuf,
    /// Logical name of the database.
    pub database_name: String,
    /// Fsync every journal append before the write returns.
    pub sync_writes: bool,
}

impl Default for FileStoreSettings {
    fn default() -> Self {
        Self {
            directory_path: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            database_name: "test".to_string(),
            sync_writes: false,
        }
    }
}

impl FileStoreSettings {
    /// Settings rooted at `directory_path`, defaults elsewhere.
    pub fn new(directory_path: impl Into<PathBuf>) -> Self {
        Self::default().with_directory_path(directory_path)
    }

    pub fn with_directory_path(mut self, directory_path: impl Into<PathBuf>) -> Self {
        self.directory_path = directory_path.into();
        self
    }

    pub fn with_database_name(mut self, database_name: impl Into<String>) -> Self {
        self.database_name = database_name.into();
        self
    }

    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }

    /// Path of the journal file of `collection`.
    pub fn journal_path(&self, collection: &str) -> PathBuf {
        self.directory_path.join(format!("{collection}.{JOURNAL_EXTENSION}"))
    }

    pub fn directory(&self) -> &Path {
        &self.directory_path
    }
}

/// Extension of journal files.
pub const JOURNAL_EXTENSION: &str = "journal";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = FileStoreSettings::default();

        assert_eq!(settings.database_name, "test");
        assert!(!settings.sync_writes);
        assert_eq!(settings.directory_path, std::env::current_dir().unwrap());
    }

    #[test]
    fn partial_configuration_fills_defaults() {
        let settings: FileStoreSettings =
            serde_json::from_str(r#"{ "directory_path": "/var/lib/app", "sync_writes": true }"#).unwrap();

        assert_eq!(settings.directory_path, PathBuf::from("/var/lib/app"));
        assert_eq!(settings.database_name, "test");
        assert!(settings.sync_writes);
    }

    #[test]
    fn journal_files_live_in_the_directory() {
        let settings = FileStoreSettings::new("/data").with_database_name("shop");

        assert_eq!(settings.journal_path("profile"), PathBuf::from("/data/profile.journal"));
    }
}
