//! Machine Registry (C10): a pure, static lookup from `machine_id` to database
//! connection parameters and to the list of (folder, dataset, table) assignments
//! `batch_process_machine` works through. Loaded once from a TOML file at process
//! start; never mutated.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::dataset::Dataset;

#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_client_encoding")]
    pub client_encoding: String,
}

fn default_port() -> u16 {
    5432
}

fn default_client_encoding() -> String {
    "utf8".to_string()
}

impl DbConfig {
    /// A libpq-style keyword/value connection string for `tokio_postgres::connect`.
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={} client_encoding={} connect_timeout=10",
            self.host, self.port, self.database, self.user, self.password, self.client_encoding
        )
    }
}

#[derive(Debug, Clone)]
pub struct FolderAssignment {
    pub folder: String,
    pub dataset: Dataset,
    pub table: String,
}

#[derive(Debug, Deserialize)]
struct FolderAssignmentRaw {
    folder: String,
    dataset: String,
    table: String,
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    db_config: HashMap<String, DbConfig>,
    #[serde(default)]
    machine_config: HashMap<String, Vec<FolderAssignmentRaw>>,
}

pub struct MachineRegistry {
    db_config: HashMap<String, DbConfig>,
    folders: HashMap<String, Vec<FolderAssignment>>,
}

#[derive(Debug)]
pub struct UnknownMachine(pub String);

impl fmt::Display for UnknownMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown machine id: {}", self.0)
    }
}
impl std::error::Error for UnknownMachine {}

#[derive(Debug)]
pub enum RegistryError {
    Toml(toml::de::Error),
    Dataset(crate::dataset::UnknownDataset),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Toml(e) => write!(f, "invalid machine registry config: {e}"),
            Self::Dataset(e) => write!(f, "invalid machine registry config: {e}"),
        }
    }
}
impl std::error::Error for RegistryError {}

impl MachineRegistry {
    /// An empty registry, for callers that need a valid default before any config
    /// file has been loaded (every lookup against it fails with [`UnknownMachine`]).
    pub fn empty() -> Self {
        Self {
            db_config: HashMap::new(),
            folders: HashMap::new(),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, RegistryError> {
        let raw: RegistryFile = toml::from_str(s).map_err(RegistryError::Toml)?;
        let mut folders = HashMap::new();
        for (machine_id, assignments) in raw.machine_config {
            let mut resolved = Vec::with_capacity(assignments.len());
            for a in assignments {
                let dataset: Dataset = a.dataset.parse().map_err(RegistryError::Dataset)?;
                resolved.push(FolderAssignment {
                    folder: a.folder,
                    dataset,
                    table: a.table,
                });
            }
            folders.insert(machine_id, resolved);
        }
        Ok(Self {
            db_config: raw.db_config,
            folders,
        })
    }

    pub fn db_config(&self, machine_id: &str) -> Result<&DbConfig, UnknownMachine> {
        self.db_config
            .get(machine_id)
            .ok_or_else(|| UnknownMachine(machine_id.to_string()))
    }

    pub fn assignments(&self, machine_id: &str) -> Result<&[FolderAssignment], UnknownMachine> {
        self.folders
            .get(machine_id)
            .map(Vec::as_slice)
            .ok_or_else(|| UnknownMachine(machine_id.to_string()))
    }

    /// Resolve a folder name that may not exist verbatim under `base_dir` by retrying
    /// with hyphens/underscores swapped, matching the source's `find_folder_flexible`.
    pub fn resolve_folder(base_dir: &Path, folder_name: &str) -> Option<PathBuf> {
        let verbatim = base_dir.join(folder_name);
        if verbatim.is_dir() {
            return Some(verbatim);
        }
        let swapped = if folder_name.contains('-') {
            folder_name.replace('-', "_")
        } else if folder_name.contains('_') {
            folder_name.replace('_', "-")
        } else {
            return None;
        };
        let alt = base_dir.join(&swapped);
        alt.is_dir().then_some(alt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[db_config.machine0]
host = "db0.internal"
database = "s2orc"
user = "ingest"
password = "secret"

[machine_config]
machine0 = [
  { folder = "s2orc", dataset = "s2orc", table = "s2orc" },
  { folder = "citations", dataset = "citations", table = "citation_raw" },
]
"#;

    #[test]
    fn loads_db_config_and_folder_assignments() {
        let reg = MachineRegistry::from_toml_str(SAMPLE).unwrap();
        let db = reg.db_config("machine0").unwrap();
        assert_eq!(db.host, "db0.internal");
        assert_eq!(db.port, 5432);
        assert_eq!(db.client_encoding, "utf8");

        let assignments = reg.assignments("machine0").unwrap();
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[0].dataset, Dataset::S2orc);
        assert_eq!(assignments[1].table, "citation_raw");
    }

    #[test]
    fn unknown_machine_errors() {
        let reg = MachineRegistry::from_toml_str(SAMPLE).unwrap();
        assert!(reg.db_config("machine99").is_err());
        assert!(reg.assignments("machine99").is_err());
    }

    #[test]
    fn connection_string_contains_fields() {
        let reg = MachineRegistry::from_toml_str(SAMPLE).unwrap();
        let db = reg.db_config("machine0").unwrap();
        let conn = db.connection_string();
        assert!(conn.contains("host=db0.internal"));
        assert!(conn.contains("dbname=s2orc"));
        assert!(conn.contains("client_encoding=utf8"));
    }

    #[test]
    fn resolve_folder_verbatim() {
        let base = TempDir::new().unwrap();
        fs::create_dir(base.path().join("publication_venues")).unwrap();
        let resolved = MachineRegistry::resolve_folder(base.path(), "publication_venues").unwrap();
        assert_eq!(resolved, base.path().join("publication_venues"));
    }

    #[test]
    fn resolve_folder_swaps_separator() {
        let base = TempDir::new().unwrap();
        fs::create_dir(base.path().join("publication-venues")).unwrap();
        let resolved = MachineRegistry::resolve_folder(base.path(), "publication_venues").unwrap();
        assert_eq!(resolved, base.path().join("publication-venues"));
    }

    #[test]
    fn resolve_folder_missing_returns_none() {
        let base = TempDir::new().unwrap();
        assert!(MachineRegistry::resolve_folder(base.path(), "nonexistent").is_none());
    }

    #[test]
    fn empty_registry_rejects_every_lookup() {
        let reg = MachineRegistry::empty();
        assert!(reg.db_config("machine0").is_err());
        assert!(reg.assignments("machine0").is_err());
    }

    #[test]
    fn invalid_dataset_name_errors() {
        let bad = r#"
[db_config.machine0]
host = "h"
database = "d"
user = "u"
password = "p"

[machine_config]
machine0 = [{ folder = "x", dataset = "not_a_dataset", table = "x" }]
"#;
        assert!(MachineRegistry::from_toml_str(bad).is_err());
    }
}
