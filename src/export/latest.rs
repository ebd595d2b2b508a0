//! Latest-run pointers, one per `(league_key, module)`.
//!
//! Downstream modules locate a prerequisite run only through these pointers.
//! A pointer is written after its manifest is sealed and is replaced whole.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::manifest::SealedRun;
use crate::core::files::{read_if_exists, to_json_bytes, write_atomic};
use crate::core::paths::ExportPaths;
use crate::error::{Result, YahooError};
use crate::{LeagueKey, RunId};

/// Role under which the manifest itself is recorded.
pub const MANIFEST_ROLE: &str = "manifest";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestPointer {
    pub module_name: String,
    pub league_key: LeagueKey,
    pub pointed_run_id: RunId,
    /// Role to path relative to the league export root.
    pub pointed_artifact_paths: BTreeMap<String, String>,
    pub updated_at: DateTime<Utc>,
}

pub struct LatestPointerStore {
    paths: ExportPaths,
}

impl LatestPointerStore {
    pub fn new(paths: ExportPaths) -> Self {
        Self { paths }
    }

    /// Absolute path of a pointed artifact.
    pub fn artifact_path(&self, pointer: &LatestPointer, role: &str) -> Option<PathBuf> {
        pointer
            .pointed_artifact_paths
            .get(role)
            .map(|rel| self.paths.league_root(&pointer.league_key).join(rel))
    }

    /// Point `(league_key, module)` at a sealed run.
    ///
    /// A pointer already at a later run is left in place and returned.
    pub fn update(&self, sealed: &SealedRun) -> Result<LatestPointer> {
        let manifest = &sealed.manifest;
        if !sealed.manifest_path.is_file() {
            return Err(YahooError::ArtifactMissing {
                path: sealed.manifest_path.clone(),
            });
        }

        let path = self
            .paths
            .latest_pointer_path(&manifest.league_key, &manifest.module_name);
        if let Some(existing) = self.load(&path)? {
            if existing.pointed_run_id > manifest.run_id {
                warn!(
                    "Latest {} pointer already at newer run {}; leaving it",
                    manifest.module_name, existing.pointed_run_id
                );
                return Ok(existing);
            }
        }

        let module_paths = self
            .paths
            .module(&manifest.league_key, &manifest.module_name);
        let mut pointed_artifact_paths: BTreeMap<String, String> = manifest
            .files
            .iter()
            .filter_map(|f| f.role.clone().map(|role| (role, f.path.clone())))
            .collect();
        pointed_artifact_paths.insert(
            MANIFEST_ROLE.to_string(),
            module_paths.relative(&sealed.manifest_path),
        );

        let pointer = LatestPointer {
            module_name: manifest.module_name.clone(),
            league_key: manifest.league_key.clone(),
            pointed_run_id: manifest.run_id.clone(),
            pointed_artifact_paths,
            updated_at: Utc::now(),
        };
        write_atomic(&path, &to_json_bytes(&pointer, true)?)?;

        info!(
            "Latest {} for {} -> {}",
            pointer.module_name, pointer.league_key, pointer.pointed_run_id
        );
        Ok(pointer)
    }

    /// The latest pointer, with every pointed artifact checked on disk.
    pub fn read(&self, module_name: &str, league_key: &LeagueKey) -> Result<LatestPointer> {
        let path = self.paths.latest_pointer_path(league_key, module_name);
        let pointer = self
            .load(&path)?
            .ok_or_else(|| YahooError::PointerNotFound {
                module: module_name.to_string(),
                league_key: league_key.to_string(),
            })?;

        for role in pointer.pointed_artifact_paths.keys() {
            if let Some(artifact) = self.artifact_path(&pointer, role) {
                if !artifact.is_file() {
                    return Err(YahooError::StalePointer {
                        module: module_name.to_string(),
                        league_key: league_key.to_string(),
                        path: artifact,
                    });
                }
            }
        }
        Ok(pointer)
    }

    fn load(&self, path: &std::path::Path) -> Result<Option<LatestPointer>> {
        match read_if_exists(path)? {
            Some(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::manifest::RunManifestBuilder;
    use chrono::TimeZone;
    use std::fs;
    use std::str::FromStr;
    use tempfile::tempdir;

    fn key() -> LeagueKey {
        LeagueKey::from_str("453.l.33099").unwrap()
    }

    fn sealed_run(builder: &RunManifestBuilder, second: u32) -> SealedRun {
        let at = Utc.with_ymd_and_hms(2025, 9, 12, 14, 30, second).unwrap();
        let mut handle = builder.start_run_at("league_dump", &key(), vec![], at);
        let path = handle
            .paths()
            .processed_dir
            .join(handle.artifact_name("league", "json"));
        builder
            .write_json_artifact(&mut handle, "league", &path, &serde_json::json!({"s": second}))
            .unwrap();
        builder.seal(handle).unwrap()
    }

    #[test]
    fn test_read_missing_pointer_is_not_found() {
        let dir = tempdir().unwrap();
        let store = LatestPointerStore::new(ExportPaths::new(dir.path()));

        let err = store.read("league_dump", &key()).unwrap_err();
        assert!(matches!(err, YahooError::PointerNotFound { .. }));
        assert!(err.is_precondition_failure());
    }

    #[test]
    fn test_update_then_read() {
        let dir = tempdir().unwrap();
        let paths = ExportPaths::new(dir.path());
        let builder = RunManifestBuilder::new(paths.clone());
        let store = LatestPointerStore::new(paths);

        let sealed = sealed_run(&builder, 12);
        store.update(&sealed).unwrap();
        let pointer = store.read("league_dump", &key()).unwrap();

        assert_eq!(pointer.pointed_run_id.as_str(), "20250912T143012Z");
        assert_eq!(
            pointer.pointed_artifact_paths["manifest"],
            "league_dump/manifest/manifest.20250912T143012Z.json"
        );
        assert_eq!(
            pointer.pointed_artifact_paths["league"],
            "league_dump/processed/league.20250912T143012Z.json"
        );
        assert_eq!(
            store.artifact_path(&pointer, "manifest").unwrap(),
            sealed.manifest_path
        );
    }

    #[test]
    fn test_pointer_never_moves_backwards() {
        let dir = tempdir().unwrap();
        let paths = ExportPaths::new(dir.path());
        let builder = RunManifestBuilder::new(paths.clone());
        let store = LatestPointerStore::new(paths);

        let older = sealed_run(&builder, 12);
        let newer = sealed_run(&builder, 40);
        store.update(&newer).unwrap();
        let kept = store.update(&older).unwrap();

        assert_eq!(kept.pointed_run_id, newer.manifest.run_id);
        assert_eq!(
            store.read("league_dump", &key()).unwrap().pointed_run_id,
            newer.manifest.run_id
        );
    }

    #[test]
    fn test_pointer_to_deleted_artifact_is_stale() {
        let dir = tempdir().unwrap();
        let paths = ExportPaths::new(dir.path());
        let builder = RunManifestBuilder::new(paths.clone());
        let store = LatestPointerStore::new(paths);

        let sealed = sealed_run(&builder, 12);
        let pointer = store.update(&sealed).unwrap();
        fs::remove_file(store.artifact_path(&pointer, "league").unwrap()).unwrap();

        assert!(matches!(
            store.read("league_dump", &key()),
            Err(YahooError::StalePointer { .. })
        ));
    }

    #[test]
    fn test_update_requires_sealed_manifest_on_disk() {
        let dir = tempdir().unwrap();
        let paths = ExportPaths::new(dir.path());
        let builder = RunManifestBuilder::new(paths.clone());
        let store = LatestPointerStore::new(paths);

        let sealed = sealed_run(&builder, 12);
        fs::remove_file(&sealed.manifest_path).unwrap();

        assert!(matches!(
            store.update(&sealed),
            Err(YahooError::ArtifactMissing { .. })
        ));
        assert!(store.read("league_dump", &key()).is_err());
    }

    #[test]
    fn test_modules_have_separate_pointers() {
        let dir = tempdir().unwrap();
        let paths = ExportPaths::new(dir.path());
        let builder = RunManifestBuilder::new(paths.clone());
        let store = LatestPointerStore::new(paths);

        store.update(&sealed_run(&builder, 12)).unwrap();
        assert!(matches!(
            store.read("players_dump", &key()),
            Err(YahooError::PointerNotFound { .. })
        ));
    }
}
