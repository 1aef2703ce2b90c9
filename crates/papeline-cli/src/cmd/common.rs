//! Shared lookups used by more than one subcommand: resolving a `--machine` id to its
//! [`DbConfig`], and picking the target table for a dataset assigned to a machine.

use anyhow::{Context, Result};
use papeline_core::machine::DbConfig;
use papeline_core::Dataset;

use crate::config::Config;

/// The `--machine` id used when a tool's own CLI surface never named the flag (e.g.
/// `extract_corpusid`, `init_table`) but still needs a database connection.
pub const DEFAULT_MACHINE: &str = "machine0";

pub fn db_config<'a>(config: &'a Config, machine: &str) -> Result<&'a DbConfig> {
    config
        .registry
        .db_config(machine)
        .with_context(|| format!("no db_config entry for machine '{machine}'"))
}

/// The table assigned to `dataset` on `machine`, falling back to the dataset's
/// canonical name when the machine has no explicit assignment for it (e.g. a
/// single-machine setup with no `machine_config` table at all).
pub fn table_for_dataset(config: &Config, machine: &str, dataset: Dataset) -> String {
    config
        .registry
        .assignments(machine)
        .ok()
        .and_then(|assignments| assignments.iter().find(|a| a.dataset == dataset))
        .map(|a| a.table.clone())
        .unwrap_or_else(|| dataset.name().to_string())
}

/// Expand a `--dir(s)` argument that contains glob metacharacters (`*`, `?`, `[`) into
/// the directories it matches; an argument with none is returned unchanged. Lets
/// `extract_corpusid --dirs 'data/shard_*'` address a whole family of sibling shard
/// directories without the caller enumerating them by hand.
pub fn expand_dir_globs(raw: &std::path::Path) -> Vec<std::path::PathBuf> {
    let pattern = raw.to_string_lossy();
    if !pattern.contains(['*', '?', '[']) {
        return vec![raw.to_path_buf()];
    }
    match glob::glob(&pattern) {
        Ok(paths) => {
            let mut matched: Vec<_> = paths.filter_map(Result::ok).filter(|p| p.is_dir()).collect();
            matched.sort();
            matched
        }
        Err(e) => {
            log::warn!("invalid glob pattern '{pattern}': {e}, treating as a literal path");
            vec![raw.to_path_buf()]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_dir_globs_passes_through_a_literal_path() {
        let dirs = expand_dir_globs(std::path::Path::new("/data/s2orc"));
        assert_eq!(dirs, vec![std::path::PathBuf::from("/data/s2orc")]);
    }

    #[test]
    fn expand_dir_globs_matches_sibling_directories() {
        let tmp = tempfile::TempDir::new().unwrap();
        for name in ["shard_a", "shard_b", "other"] {
            std::fs::create_dir(tmp.path().join(name)).unwrap();
        }
        let pattern = tmp.path().join("shard_*");
        let dirs = expand_dir_globs(&pattern);
        let names: Vec<String> = dirs.iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect();
        assert_eq!(names, vec!["shard_a", "shard_b"]);
    }
}
