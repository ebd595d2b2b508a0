//! Run manifests: the sealed inventory of one export run.
//!
//! A run registers each artifact as it is written and seals the manifest
//! once, at the end. An unsealed run leaves no manifest behind.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::files::{sha256_file, to_json_bytes, write_atomic, write_atomic_new};
use crate::core::paths::{ExportPaths, ModulePaths};
use crate::error::{Result, YahooError};
use crate::{LeagueKey, RunId};

/// One artifact produced by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Relative to the league export root, `/`-separated.
    pub path: String,
    pub size_bytes: u64,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: RunId,
    pub module_name: String,
    pub league_key: LeagueKey,
    pub cli_args: Vec<String>,
    pub files: Vec<ManifestFile>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// An open run. Consumed by [`RunManifestBuilder::seal`].
#[derive(Debug)]
pub struct RunHandle {
    run_id: RunId,
    module_name: String,
    league_key: LeagueKey,
    cli_args: Vec<String>,
    started_at: DateTime<Utc>,
    paths: ModulePaths,
    files: Vec<ManifestFile>,
}

impl RunHandle {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn league_key(&self) -> &LeagueKey {
        &self.league_key
    }

    pub fn paths(&self) -> &ModulePaths {
        &self.paths
    }

    pub fn files(&self) -> &[ManifestFile] {
        &self.files
    }

    /// `<stem>.<run_id>.<ext>`, the shared naming for a run's artifacts.
    pub fn artifact_name(&self, stem: &str, ext: &str) -> String {
        format!("{}.{}.{}", stem, self.run_id, ext)
    }
}

/// A manifest that has been written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedRun {
    pub manifest: RunManifest,
    pub manifest_path: PathBuf,
}

pub struct RunManifestBuilder {
    paths: ExportPaths,
    pretty: bool,
    last_run_id: Mutex<Option<RunId>>,
}

impl RunManifestBuilder {
    pub fn new(paths: ExportPaths) -> Self {
        Self {
            paths,
            pretty: true,
            last_run_id: Mutex::new(None),
        }
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn export_paths(&self) -> &ExportPaths {
        &self.paths
    }

    pub fn start_run(
        &self,
        module_name: &str,
        league_key: &LeagueKey,
        cli_args: Vec<String>,
    ) -> RunHandle {
        self.start_run_at(module_name, league_key, cli_args, Utc::now())
    }

    /// Start a run whose id derives from `at`.
    ///
    /// The id is moved forward a second at a time until it is later than any
    /// id this builder handed out and no manifest with that id exists.
    pub fn start_run_at(
        &self,
        module_name: &str,
        league_key: &LeagueKey,
        cli_args: Vec<String>,
        at: DateTime<Utc>,
    ) -> RunHandle {
        let paths = self.paths.module(league_key, module_name);

        let mut last = self
            .last_run_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut run_id = RunId::from_datetime(at);
        if let Some(previous) = last.as_ref() {
            if run_id <= *previous {
                run_id = previous.next();
            }
        }
        while paths.manifest_path(&run_id).exists() {
            run_id = run_id.next();
        }
        *last = Some(run_id.clone());
        drop(last);

        info!("Starting {} run {} for {}", module_name, run_id, league_key);
        RunHandle {
            run_id,
            module_name: module_name.to_string(),
            league_key: league_key.clone(),
            cli_args,
            started_at: at,
            paths,
            files: Vec::new(),
        }
    }

    /// Record an artifact already on disk. Its size must equal `bytes_written`.
    pub fn register(&self, handle: &mut RunHandle, path: &Path, bytes_written: u64) -> Result<()> {
        self.register_file(handle, None, path, bytes_written)
    }

    /// Like [`register`](Self::register), naming the artifact's role for the
    /// latest pointer.
    pub fn register_as(
        &self,
        handle: &mut RunHandle,
        role: &str,
        path: &Path,
        bytes_written: u64,
    ) -> Result<()> {
        self.register_file(handle, Some(role), path, bytes_written)
    }

    /// Write `value` as JSON to `path` atomically and register it under `role`.
    pub fn write_json_artifact<T: Serialize>(
        &self,
        handle: &mut RunHandle,
        role: &str,
        path: &Path,
        value: &T,
    ) -> Result<()> {
        let bytes = to_json_bytes(value, self.pretty)?;
        write_atomic(path, &bytes)?;
        self.register_as(handle, role, path, bytes.len() as u64)
    }

    fn register_file(
        &self,
        handle: &mut RunHandle,
        role: Option<&str>,
        path: &Path,
        bytes_written: u64,
    ) -> Result<()> {
        if !path.is_file() {
            return Err(YahooError::ArtifactMissing {
                path: path.to_path_buf(),
            });
        }
        let (content_hash, size_bytes) = sha256_file(path)?;
        if size_bytes != bytes_written {
            return Err(YahooError::ManifestSeal {
                path: path.to_path_buf(),
                message: format!("expected {bytes_written} bytes, found {size_bytes}"),
            });
        }

        let relative = handle.paths.relative(path);
        debug!("Registered {} ({} bytes)", relative, size_bytes);
        let file = ManifestFile {
            path: relative,
            size_bytes,
            content_hash,
            role: role.map(String::from),
        };
        match handle.files.iter_mut().find(|f| f.path == file.path) {
            Some(existing) => *existing = file,
            None => handle.files.push(file),
        }
        Ok(())
    }

    /// Write the manifest. It is never written twice for the same run id.
    pub fn seal(&self, handle: RunHandle) -> Result<SealedRun> {
        for file in &handle.files {
            let on_disk = handle.paths.league_root.join(&file.path);
            match std::fs::metadata(&on_disk) {
                Ok(meta) if meta.len() == file.size_bytes => {}
                Ok(meta) => {
                    return Err(YahooError::ManifestSeal {
                        path: on_disk,
                        message: format!(
                            "artifact changed after registration ({} bytes, registered {})",
                            meta.len(),
                            file.size_bytes
                        ),
                    })
                }
                Err(_) => return Err(YahooError::ArtifactMissing { path: on_disk }),
            }
        }

        let manifest_path = handle.paths.manifest_path(&handle.run_id);
        let manifest = RunManifest {
            run_id: handle.run_id,
            module_name: handle.module_name,
            league_key: handle.league_key,
            cli_args: handle.cli_args,
            files: handle.files,
            started_at: handle.started_at,
            completed_at: Utc::now(),
        };

        let seal_error = |message: String| YahooError::ManifestSeal {
            path: manifest_path.clone(),
            message,
        };
        let bytes = to_json_bytes(&manifest, self.pretty).map_err(|e| seal_error(e.to_string()))?;
        write_atomic_new(&manifest_path, &bytes).map_err(|e| seal_error(e.to_string()))?;

        info!(
            "Sealed {} run {} ({} files)",
            manifest.module_name,
            manifest.run_id,
            manifest.files.len()
        );
        Ok(SealedRun {
            manifest,
            manifest_path,
        })
    }
}
