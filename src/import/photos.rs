use crate::core::{Territory, TerritoryId};
use crate::import::{ImportError, ImportSummary};
use crate::storage::TerritoryStore;
use crate::storage::persistence::atomic_write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// URL under which stored photos are served.
pub const PHOTO_URL_PREFIX: &str = "/static/uploads/territories";

const PHOTO_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Lower-cased extension of an accepted photo file name.
pub fn photo_extension(file_name: &str) -> Option<String> {
    let extension = Path::new(file_name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    PHOTO_EXTENSIONS
        .contains(&extension.as_str())
        .then_some(extension)
}

/// Directory of territory photos, one `{id}.{ext}` file per territory.
#[derive(Debug, Clone)]
pub struct PhotoStore {
    dir: PathBuf,
}

impl PhotoStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn url_for(file_name: &str) -> String {
        format!("{}/{}", PHOTO_URL_PREFIX, file_name)
    }

    /// Stores an uploaded photo and points the territory at it.
    pub async fn save_upload(
        &self,
        store: &TerritoryStore,
        id: TerritoryId,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<Territory, ImportError> {
        let extension = photo_extension(original_name)
            .ok_or_else(|| ImportError::UnsupportedFormat(original_name.to_string()))?;
        if bytes.is_empty() {
            return Err(ImportError::EmptyUpload);
        }

        let mut tx = store.begin().await;
        tx.get_territory(id)?;

        let file_name = format!("{}.{}", id, extension);
        atomic_write(&self.dir.join(&file_name), bytes).await?;
        self.remove_stale(id, &extension).await;

        let url = Self::url_for(&file_name);
        let updated = tx.update_territory(id, |territory| territory.image_url = Some(url))?;
        tx.commit().await?;

        info!(territory_id = %id, file = %file_name, size = bytes.len(), "territory photo stored");
        Ok(updated)
    }

    /// Links every `{id}.{jpg,jpeg,png}` file of `source` to its territory,
    /// copying it into the photo directory when it lives elsewhere. Unknown
    /// ids are created when `create_missing` is set, otherwise skipped.
    pub async fn import_dir(
        &self,
        store: &TerritoryStore,
        source: &Path,
        create_missing: bool,
    ) -> Result<ImportSummary, ImportError> {
        let mut summary = ImportSummary::default();
        let mut photos = Vec::new();

        let mut entries = tokio::fs::read_dir(source)
            .await
            .map_err(|e| ImportError::io(source, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ImportError::io(source, e))?
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let Some(extension) = photo_extension(file_name) else {
                continue;
            };
            let stem = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or_default();
            match stem.parse::<TerritoryId>() {
                Ok(id) => photos.push((id, path.clone(), extension)),
                Err(_) => summary.skip(file_name, "file name is not a territory id"),
            }
        }
        photos.sort_by_key(|(id, _, _)| *id);

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ImportError::io(&self.dir, e))?;
        let same_dir = same_directory(source, &self.dir).await;

        let mut tx = store.begin().await;
        for (id, path, extension) in photos {
            let created = !tx.contains(id);
            if created {
                if !create_missing {
                    summary.skip(path.display().to_string(), format!("territory {} does not exist", id));
                    continue;
                }
                tx.insert_territory(Territory::new(id))?;
            }

            let file_name = format!("{}.{}", id, extension);
            let in_place = same_dir && path.file_name().and_then(|n| n.to_str()) == Some(file_name.as_str());
            if !in_place {
                let target = self.dir.join(&file_name);
                tokio::fs::copy(&path, &target)
                    .await
                    .map_err(|e| ImportError::io(&target, e))?;
                debug!(from = %path.display(), to = %target.display(), "photo copied");
            }

            let url = Self::url_for(&file_name);
            if tx.get_territory(id)?.image_url.as_deref() == Some(url.as_str()) {
                summary.unchanged += 1;
                continue;
            }
            tx.update_territory(id, |territory| territory.image_url = Some(url))?;
            if created {
                summary.created += 1;
            } else {
                summary.updated += 1;
            }
        }
        tx.commit().await?;

        info!(
            source = %source.display(),
            created = summary.created,
            updated = summary.updated,
            unchanged = summary.unchanged,
            skipped = summary.skipped.len(),
            "territory photos imported"
        );
        Ok(summary)
    }

    async fn remove_stale(&self, id: TerritoryId, keep_extension: &str) {
        for extension in PHOTO_EXTENSIONS {
            if extension == keep_extension {
                continue;
            }
            let stale = self.dir.join(format!("{}.{}", id, extension));
            if tokio::fs::remove_file(&stale).await.is_ok() {
                debug!(file = %stale.display(), "replaced photo removed");
            }
        }
    }
}

async fn same_directory(a: &Path, b: &Path) -> bool {
    match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
