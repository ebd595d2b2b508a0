//! Export directory layout.
//!
//! ```text
//! <export_root>/
//! ├── _debug/                          raw fetches (not tracked by manifests)
//! └── <league_key>/
//!     ├── _meta/latest.<module>.json   latest pointer per module
//!     └── <module>/
//!         ├── raw/
//!         ├── processed/
//!         ├── manifest/manifest.<run_id>.json
//!         └── cache/<scope>/<entity>.json
//! ```

use std::path::{Path, PathBuf};

use crate::LeagueKey;

/// Paths for one export module of one league.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePaths {
    pub league_root: PathBuf,
    pub meta_dir: PathBuf,
    pub module_root: PathBuf,
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub manifest_dir: PathBuf,
    pub cache_root: PathBuf,
}

/// Root of all exports (`EXPORT_DIR`, default `./exports`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    root: PathBuf,
}

impl ExportPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn debug_dir(&self) -> PathBuf {
        self.root.join("_debug")
    }

    pub fn league_root(&self, league_key: &LeagueKey) -> PathBuf {
        self.root.join(league_key.as_str())
    }

    pub fn meta_dir(&self, league_key: &LeagueKey) -> PathBuf {
        self.league_root(league_key).join("_meta")
    }

    pub fn latest_pointer_path(&self, league_key: &LeagueKey, module: &str) -> PathBuf {
        self.meta_dir(league_key)
            .join(format!("latest.{}.json", module))
    }

    pub fn module(&self, league_key: &LeagueKey, module: &str) -> ModulePaths {
        let league_root = self.league_root(league_key);
        let module_root = league_root.join(module);
        ModulePaths {
            meta_dir: league_root.join("_meta"),
            raw_dir: module_root.join("raw"),
            processed_dir: module_root.join("processed"),
            manifest_dir: module_root.join("manifest"),
            cache_root: module_root.join("cache"),
            module_root,
            league_root,
        }
    }
}

impl ModulePaths {
    pub fn manifest_path(&self, run_id: &crate::RunId) -> PathBuf {
        self.manifest_dir
            .join(format!("manifest.{}.json", run_id))
    }

    /// `path` relative to the league root with `/` separators, as recorded
    /// in manifests and pointers. Paths outside the league root are kept as-is.
    pub fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.league_root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}
