//! Configuration loading from TOML files: the `db_config`/`machine_config` tables
//! consumed by [`papeline_core::MachineRegistry`], plus this binary's own path
//! settings, following this codebase's `Config::load()`/`from_file()` convention.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use papeline_core::MachineRegistry;

/// Global configuration for the `papeline` CLI. `registry` is parsed straight out of
/// the same TOML file's `[db_config.*]`/`[machine_config]` tables; `paths` covers
/// everything specific to this binary (where ledgers and merge progress live).
pub struct Config {
    pub registry: MachineRegistry,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub logs_dir: PathBuf,
    pub merge_ledger: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("./logs"),
            merge_ledger: PathBuf::from("./logs/merge_progress.db"),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct PathsWrapper {
    paths: PathsConfig,
}

impl Config {
    /// Search order: `./papeline.toml`, then the platform config dir, then an empty
    /// default registry (every machine lookup will then fail fast with
    /// [`papeline_core::machine::UnknownMachine`]).
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("papeline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "papeline") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("no config file found, using an empty machine registry");
        Ok(Self {
            registry: MachineRegistry::empty(),
            paths: PathsConfig::default(),
        })
    }

    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let registry = MachineRegistry::from_toml_str(&content)
            .with_context(|| format!("failed to parse machine registry in {}", path.display()))?;
        let PathsWrapper { paths } = toml::from_str(&content)
            .with_context(|| format!("failed to parse [paths] in {}", path.display()))?;

        log::info!("loaded config from {}", path.display());
        Ok(Self { registry, paths })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[paths]
logs_dir = "/var/log/papeline"
merge_ledger = "/var/log/papeline/merge.db"

[db_config.machine0]
host = "db0.internal"
database = "s2orc"
user = "ingest"
password = "secret"

[machine_config]
machine0 = [{ folder = "s2orc", dataset = "s2orc", table = "s2orc" }]
"#;

    #[test]
    fn default_paths_use_relative_logs_dir() {
        let paths = PathsConfig::default();
        assert_eq!(paths.logs_dir, PathBuf::from("./logs"));
        assert_eq!(paths.merge_ledger, PathBuf::from("./logs/merge_progress.db"));
    }

    #[test]
    fn from_file_parses_both_registry_and_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("papeline.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.paths.logs_dir, PathBuf::from("/var/log/papeline"));
        assert!(config.registry.db_config("machine0").is_ok());
    }

    #[test]
    fn missing_paths_table_falls_back_to_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("papeline.toml");
        std::fs::write(
            &path,
            r#"
[db_config.machine0]
host = "h"
database = "d"
user = "u"
password = "p"

[machine_config]
machine0 = []
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.paths.logs_dir, PathBuf::from("./logs"));
    }
}
