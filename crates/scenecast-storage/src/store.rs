//! Project store rooted at a projects directory.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};

use scenecast_models::{
    CharacterDossier, Project, ProjectId, Scene, SegmentationSettings, TranscriptionSegment,
};

use crate::error::{StorageError, StorageResult};
use crate::layout::{
    ProjectManifest, ScenesFile, ASSETS_DIR, DOSSIER_FILE, MANIFEST_FILE, REPORTS_DIR,
    SCENES_FILE, SCRIPT_FILE, TRANSCRIPTION_FILE, TRANSIENT_DIR,
};

/// Filesystem store holding one directory per project.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    root: PathBuf,
}

impl ProjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a project. Ids that could escape the root are rejected.
    pub fn project_dir(&self, id: &ProjectId) -> StorageResult<PathBuf> {
        let raw = id.as_str();
        if raw.is_empty()
            || raw == "."
            || raw == ".."
            || raw.contains(['/', '\\'])
            || raw == REPORTS_DIR
        {
            return Err(StorageError::invalid_id(raw));
        }
        Ok(self.root.join(raw))
    }

    /// Ids of every project directory that holds a manifest, sorted.
    pub async fn discover(&self) -> StorageResult<Vec<ProjectId>> {
        let mut ids = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(root = %self.root.display(), "Projects directory does not exist");
                return Ok(ids);
            }
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if fs::try_exists(entry.path().join(MANIFEST_FILE)).await? {
                ids.push(ProjectId::from_string(name));
            }
        }

        ids.sort();
        debug!(root = %self.root.display(), count = ids.len(), "Discovered projects");
        Ok(ids)
    }

    /// Load a project with whatever derived data has been persisted.
    pub async fn load(&self, id: &ProjectId) -> StorageResult<Project> {
        let dir = self.project_dir(id)?;
        let manifest: ProjectManifest = match read_json(&dir.join(MANIFEST_FILE)).await? {
            Some(m) => m,
            None => return Err(StorageError::not_found(id.as_str())),
        };

        let script = match fs::read_to_string(dir.join(SCRIPT_FILE)).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let segments: Vec<TranscriptionSegment> =
            read_json(&dir.join(TRANSCRIPTION_FILE)).await?.unwrap_or_default();
        let scenes = read_json::<ScenesFile>(&dir.join(SCENES_FILE))
            .await?
            .map(|f| f.scenes)
            .unwrap_or_default();
        let dossier: Option<CharacterDossier> = read_json(&dir.join(DOSSIER_FILE)).await?;

        let mut project = Project::new(manifest.title, script)
            .with_id(manifest.id)
            .with_context(manifest.context)
            .with_segments(segments)
            .with_settings(manifest.settings);
        project.audio = manifest.audio;
        project.status = manifest.status;
        project.created_at = manifest.created_at;
        project.scenes = scenes;
        project.dossier = dossier;
        Ok(project)
    }

    /// Write the manifest and script text.
    pub async fn save_manifest(&self, project: &Project) -> StorageResult<()> {
        let dir = self.ensure_dir(&project.id).await?;
        write_json(&dir.join(MANIFEST_FILE), &ProjectManifest::from(project)).await?;
        write_atomic(&dir.join(SCRIPT_FILE), project.script.as_bytes()).await
    }

    pub async fn save_segments(
        &self,
        id: &ProjectId,
        segments: &[TranscriptionSegment],
    ) -> StorageResult<()> {
        let dir = self.ensure_dir(id).await?;
        write_json(&dir.join(TRANSCRIPTION_FILE), &segments).await
    }

    /// Write scenes along with the settings that produced them.
    pub async fn save_scenes(
        &self,
        id: &ProjectId,
        scenes: &[Scene],
        segmentation: Option<&SegmentationSettings>,
    ) -> StorageResult<()> {
        let dir = self.ensure_dir(id).await?;
        let file = ScenesFile::new(scenes.to_vec(), segmentation.cloned());
        debug!(
            project_id = %id,
            scenes = file.scenes.len(),
            total_duration = file.total_duration,
            "Saving scenes"
        );
        write_json(&dir.join(SCENES_FILE), &file).await
    }

    pub async fn save_dossier(
        &self,
        id: &ProjectId,
        dossier: &CharacterDossier,
    ) -> StorageResult<()> {
        let dir = self.ensure_dir(id).await?;
        write_json(&dir.join(DOSSIER_FILE), dossier).await
    }

    /// Write a batch report under `reports/` and return its path.
    pub async fn save_report<T: Serialize>(&self, report: &T) -> StorageResult<PathBuf> {
        let dir = self.root.join(REPORTS_DIR);
        fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}.json", Utc::now().format("%Y%m%dT%H%M%S%.3fZ")));
        write_json(&path, report).await?;
        info!(path = %path.display(), "Saved batch report");
        Ok(path)
    }

    /// Transient artifact directory, created on demand.
    pub async fn transient_dir(&self, id: &ProjectId) -> StorageResult<PathBuf> {
        let dir = self.project_dir(id)?.join(TRANSIENT_DIR);
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Generated asset directory, created on demand.
    pub async fn assets_dir(&self, id: &ProjectId) -> StorageResult<PathBuf> {
        let dir = self.project_dir(id)?.join(ASSETS_DIR);
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Remove the transient directory. Returns the number of files removed.
    pub async fn cleanup_transient(&self, id: &ProjectId) -> StorageResult<usize> {
        let dir = self.project_dir(id)?.join(TRANSIENT_DIR);
        let removed = match count_files(&dir).await {
            Ok(n) => n,
            Err(StorageError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        fs::remove_dir_all(&dir).await?;
        debug!(project_id = %id, removed, "Removed transient artifacts");
        Ok(removed)
    }

    async fn ensure_dir(&self, id: &ProjectId) -> StorageResult<PathBuf> {
        let dir = self.project_dir(id)?;
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }
}

async fn count_files(dir: &Path) -> StorageResult<usize> {
    let mut count = 0;
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let mut entries = fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                pending.push(entry.path());
            } else {
                count += 1;
            }
        }
    }
    Ok(count)
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> StorageResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes).await
}

/// Write through a sibling temp file so readers never see a partial file.
async fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let tmp = path.with_extension("partial");
    let wrap = |source| StorageError::WriteFailed {
        path: path.display().to_string(),
        source,
    };
    fs::write(&tmp, bytes).await.map_err(wrap)?;
    fs::rename(&tmp, path).await.map_err(wrap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenecast_models::{AssetRef, ProjectStatus};

    fn sample_project() -> Project {
        Project::new("San Blas", "Primer párrafo.\n\nSegundo párrafo.")
            .with_id(ProjectId::from_string("san-blas"))
            .with_context("San Blas, obispo de Sebaste, siglo IV")
            .with_segments(vec![TranscriptionSegment::new("Primer párrafo.", 0.0, 5.0)])
    }

    #[tokio::test]
    async fn test_round_trip_project() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        let mut project = sample_project();

        store.save_manifest(&project).await.unwrap();
        store.save_segments(&project.id, &project.segments).await.unwrap();

        project.scenes = vec![Scene::new(0, "Primer párrafo.", 0.0, 5.0)];
        project.scenes[0].mark_generated(AssetRef::new("assets/scene_000.webp"));
        store.save_scenes(&project.id, &project.scenes, None).await.unwrap();
        store
            .save_dossier(&project.id, &CharacterDossier::placeholder())
            .await
            .unwrap();

        let loaded = store.load(&project.id).await.unwrap();
        assert_eq!(loaded.title, "San Blas");
        assert_eq!(loaded.script, project.script);
        assert_eq!(loaded.segments.len(), 1);
        assert_eq!(loaded.scenes, project.scenes);
        assert!(loaded.dossier.unwrap().is_degraded());
        assert_eq!(loaded.status, ProjectStatus::Created);
    }

    #[tokio::test]
    async fn test_scenes_file_records_total_duration() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        let id = ProjectId::from_string("p1");
        let scenes = vec![Scene::new(0, "a", 0.0, 11.0), Scene::new(1, "b", 11.0, 31.0)];
        let settings = SegmentationSettings::default();

        store.save_scenes(&id, &scenes, Some(&settings)).await.unwrap();

        let raw = std::fs::read(dir.path().join("p1").join(SCENES_FILE)).unwrap();
        let file: ScenesFile = serde_json::from_slice(&raw).unwrap();
        assert_eq!(file.total_duration, 31.0);
        assert_eq!(file.segmentation, Some(settings));
    }

    #[tokio::test]
    async fn test_discover_only_lists_projects_with_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        store.save_manifest(&sample_project()).await.unwrap();
        std::fs::create_dir_all(dir.path().join("stray")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let ids = store.discover().await.unwrap();
        assert_eq!(ids, vec![ProjectId::from_string("san-blas")]);
    }

    #[tokio::test]
    async fn test_discover_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path().join("missing"));
        assert!(store.discover().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_unknown_project() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        let err = store.load(&ProjectId::from_string("nope")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_escaping_ids() {
        let store = ProjectStore::new("/tmp/projects");
        for bad in ["", "..", "a/b", "reports"] {
            assert!(store.project_dir(&ProjectId::from_string(bad)).is_err(), "{bad}");
        }
    }

    #[tokio::test]
    async fn test_cleanup_transient_keeps_assets() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        let id = ProjectId::from_string("p1");

        let tmp = store.transient_dir(&id).await.unwrap();
        std::fs::write(tmp.join("audio.wav"), b"x").unwrap();
        std::fs::create_dir_all(tmp.join("frames")).unwrap();
        std::fs::write(tmp.join("frames").join("0.png"), b"x").unwrap();
        let assets = store.assets_dir(&id).await.unwrap();
        std::fs::write(assets.join("scene_000.webp"), b"x").unwrap();

        assert_eq!(store.cleanup_transient(&id).await.unwrap(), 2);
        assert!(!tmp.exists());
        assert!(assets.join("scene_000.webp").exists());
        assert_eq!(store.cleanup_transient(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_save_report_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        let path = store
            .save_report(&serde_json::json!({"succeeded": 2}))
            .await
            .unwrap();
        let raw = std::fs::read_to_string(path).unwrap();
        assert!(raw.contains("succeeded"));
    }
}
