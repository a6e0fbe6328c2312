// File: caretaker/src/artifacts/store.rs
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, instrument, warn};

use super::retention::{plan_prune, RetentionPolicy};
use crate::clock::Clock;
use crate::constants::artifacts::{PARTIAL_PREFIX, STAMP_FORMAT};
use crate::errors::{EngineError, EngineResult, StorageError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// File name, `<stamp>-<label>`
    pub name: String,
    pub category: String,
    /// What produced the artifact (backup source, pipeline name)
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    /// Location inside the store
    pub path: PathBuf,
}

pub struct ArtifactStore {
    root: PathBuf,
    clock: Arc<dyn Clock>,
    category_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            root: root.into(),
            clock,
            category_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// One writer per category at a time; categories are independent
    fn category_lock(&self, category: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .category_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        locks
            .entry(category.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Persists `payload` as a new artifact in `category`
    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    pub async fn write(&self, category: &str, label: &str, payload: &[u8]) -> EngineResult<Artifact> {
        validate_segment(category)?;
        validate_segment(label)?;

        let lock = self.category_lock(category);
        let _guard = lock.lock().await;

        let dir = self.root.join(category);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(&dir, e))?;
        sweep_partials(&dir).await;

        let mut created_at = truncate_to_millis(self.clock.now());
        if let Some(newest) = Self::scan(&dir, category).await?.into_iter().next() {
            if created_at < newest.created_at {
                warn!(
                    "Clock is behind newest artifact in '{}' ({} < {}), clamping",
                    category, created_at, newest.created_at
                );
                created_at = newest.created_at;
            }
        }

        let mut name = artifact_name(created_at, label);
        while fs::try_exists(dir.join(&name))
            .await
            .map_err(|e| StorageError::io(dir.join(&name), e))?
        {
            created_at += Duration::milliseconds(1);
            name = artifact_name(created_at, label);
        }

        let final_path = dir.join(&name);
        let partial_path = dir.join(format!("{}{}", PARTIAL_PREFIX, name));

        // Removed on drop unless the rename went through, which covers both
        // I/O errors and a caller abandoning the write mid-way
        let mut partial = PartialFile::new(partial_path);
        let write_result = async {
            let mut file = fs::File::create(partial.path()).await?;
            file.write_all(payload).await?;
            file.sync_all().await?;
            fs::rename(partial.path(), &final_path).await
        }
        .await;

        if let Err(e) = write_result {
            return Err(StorageError::io(&final_path, e).into());
        }
        partial.persisted();

        info!(
            "Stored artifact {}/{} ({} bytes)",
            category,
            name,
            payload.len()
        );

        Ok(Artifact {
            name,
            category: category.to_string(),
            label: label.to_string(),
            created_at,
            size_bytes: payload.len() as u64,
            path: final_path,
        })
    }

    /// Artifacts in `category`, newest first
    pub async fn list(&self, category: &str) -> EngineResult<Vec<Artifact>> {
        validate_segment(category)?;
        Self::scan(&self.root.join(category), category).await
    }

    pub async fn latest(&self, category: &str) -> EngineResult<Option<Artifact>> {
        Ok(self.list(category).await?.into_iter().next())
    }

    /// Removes expired artifacts, always keeping the newest one.
    ///
    /// A failed delete is logged and not counted; the artifact will be
    /// retried on the next prune.
    #[instrument(skip(self))]
    pub async fn prune(&self, category: &str, policy: &RetentionPolicy) -> EngineResult<usize> {
        validate_segment(category)?;

        let lock = self.category_lock(category);
        let _guard = lock.lock().await;

        let dir = self.root.join(category);
        sweep_partials(&dir).await;
        let artifacts = Self::scan(&dir, category).await?;
        let plan = plan_prune(artifacts, policy, self.clock.now());

        if plan.remove.is_empty() {
            debug!(
                "Nothing to prune in '{}' ({} artifacts within {} days)",
                category,
                plan.keep.len(),
                policy.max_age_days
            );
            return Ok(0);
        }

        let mut removed = 0;
        for artifact in &plan.remove {
            match fs::remove_file(&artifact.path).await {
                Ok(()) => {
                    debug!("Pruned {}/{}", category, artifact.name);
                    removed += 1;
                }
                Err(e) => {
                    warn!("Failed to prune {}: {}", artifact.path.display(), e);
                }
            }
        }

        info!(
            "Pruned {} of {} expired artifacts in '{}' (kept {}, max age {} days)",
            removed,
            plan.remove.len(),
            category,
            plan.keep.len(),
            policy.max_age_days
        );
        Ok(removed)
    }

    /// Sum of surviving artifact sizes in `category`
    pub async fn total_size(&self, category: &str) -> EngineResult<u64> {
        Ok(self.list(category).await?.iter().map(|a| a.size_bytes).sum())
    }

    pub async fn read(&self, category: &str, name: &str) -> EngineResult<Vec<u8>> {
        validate_segment(category)?;
        validate_segment(name)?;

        let path = self.root.join(category).join(name);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::not_found("Artifact", format!("{}/{}", category, name)))
            }
            Err(e) => Err(StorageError::io(&path, e).into()),
        }
    }

    /// Category directories currently present under the root
    pub async fn categories(&self) -> EngineResult<Vec<String>> {
        let mut categories = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(categories),
            Err(e) => return Err(StorageError::io(&self.root, e).into()),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.root, e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if let (true, Some(name)) = (is_dir, entry.file_name().to_str()) {
                categories.push(name.to_string());
            }
        }

        categories.sort();
        Ok(categories)
    }

    async fn scan(dir: &Path, category: &str) -> EngineResult<Vec<Artifact>> {
        let mut artifacts = Vec::new();
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(artifacts),
            Err(e) => return Err(StorageError::io(dir, e).into()),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(dir, e))?
        {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }

            let Some((created_at, label)) = parse_artifact_name(name) else {
                debug!("Ignoring foreign file in '{}': {}", category, name);
                continue;
            };

            let metadata = entry
                .metadata()
                .await
                .map_err(|e| StorageError::io(entry.path(), e))?;
            if !metadata.is_file() {
                continue;
            }

            artifacts.push(Artifact {
                name: name.to_string(),
                category: category.to_string(),
                label,
                created_at,
                size_bytes: metadata.len(),
                path: entry.path(),
            });
        }

        artifacts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.name.cmp(&a.name)));
        Ok(artifacts)
    }
}

pub(crate) fn validate_segment(name: &str) -> EngineResult<()> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..");
    if invalid {
        return Err(StorageError::InvalidName {
            name: name.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Temporary file of an in-progress write
struct PartialFile {
    path: PathBuf,
    persisted: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            persisted: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn persisted(&mut self) {
        self.persisted = true;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed partial file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove partial file {}: {}", self.path.display(), e),
        }
    }
}

/// Deletes leftovers of interrupted writes. Callers hold the category lock,
/// so no live write owns a partial file in `dir`.
async fn sweep_partials(dir: &Path) {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return,
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let is_partial = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(PARTIAL_PREFIX));
        if !is_partial {
            continue;
        }
        match fs::remove_file(entry.path()).await {
            Ok(()) => info!("Swept stale partial file {}", entry.path().display()),
            Err(e) => warn!("Failed to sweep {}: {}", entry.path().display(), e),
        }
    }
}

fn truncate_to_millis(instant: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(instant.timestamp_millis()).unwrap_or(instant)
}

pub(crate) fn artifact_name(created_at: DateTime<Utc>, label: &str) -> String {
    format!("{}-{}", created_at.format(STAMP_FORMAT), label)
}

pub(crate) fn parse_artifact_name(name: &str) -> Option<(DateTime<Utc>, String)> {
    let (stamp, label) = name.split_once('-')?;
    if label.is_empty() {
        return None;
    }
    let created_at = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT)
        .ok()?
        .and_utc();
    Some((created_at, label.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn artifact_names_round_trip_through_the_stamp() {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 2, 30, 0).unwrap() + Duration::milliseconds(42);
        let name = artifact_name(at, "db-main.sql.gz");
        assert_eq!(name, "20261016T023000.042Z-db-main.sql.gz");

        let (parsed, label) = parse_artifact_name(&name).unwrap();
        assert_eq!(parsed, at);
        assert_eq!(label, "db-main.sql.gz");
    }

    #[test]
    fn foreign_names_are_not_artifacts() {
        assert!(parse_artifact_name("README").is_none());
        assert!(parse_artifact_name("notastamp-label").is_none());
        assert!(parse_artifact_name("20261016T023000.042Z-").is_none());
    }

    #[test]
    fn path_segments_are_validated() {
        assert!(validate_segment("logs").is_ok());
        assert!(validate_segment("").is_err());
        assert!(validate_segment("../etc").is_err());
        assert!(validate_segment("a/b").is_err());
        assert!(validate_segment(".hidden").is_err());
    }
}
