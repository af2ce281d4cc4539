// One-shot backfill of monster image references from the local asset tree.
//
// Layout: <monsters_dir>/<monster_id>/{metadata.json, 280x200.png}. A
// directory belongs to the monster whose name equals `klass` in its
// metadata. Monsters that already carry a monster_id are never touched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::AssetConfig;
use crate::db::{Character, Database, StoreError};
use crate::metrics;

pub const METADATA_FILE: &str = "metadata.json";
pub const IMAGE_FILE: &str = "280x200.png";

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Could not read monster assets in {}: {source}", path.display())]
    Scan {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetMetadata {
    klass: Option<String>,
    image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMatch {
    pub monster_id: String,
    pub image_url: String,
}

/// Asset directories keyed by the monster name they depict. When several
/// directories claim the same name, the first one listed wins.
#[derive(Debug, Default)]
pub struct AssetIndex {
    by_klass: HashMap<String, AssetMatch>,
}

impl AssetIndex {
    pub async fn scan(assets: &AssetConfig) -> Result<Self, SyncError> {
        let root = &assets.monsters_dir;
        let scan_err = |source| SyncError::Scan {
            path: root.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(root).await.map_err(scan_err)?;
        let mut index = AssetIndex::default();

        while let Some(entry) = entries.next_entry().await.map_err(scan_err)? {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            let Some(dir_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(metadata) = read_metadata(&entry.path()).await else {
                continue;
            };
            let Some(klass) = metadata.klass else {
                continue;
            };
            if index.by_klass.contains_key(&klass) {
                continue;
            }
            let image_exists = tokio::fs::try_exists(entry.path().join(IMAGE_FILE))
                .await
                .unwrap_or(false);
            if !image_exists {
                tracing::debug!(dir = %dir_name, klass = %klass, "Asset directory has no image");
                continue;
            }

            let image_url = metadata
                .image_url
                .filter(|url| !url.is_empty())
                .unwrap_or_else(|| format!("{}/{}/{}", assets.cdn_prefix, dir_name, IMAGE_FILE));
            index.by_klass.insert(
                klass,
                AssetMatch {
                    monster_id: dir_name,
                    image_url,
                },
            );
        }

        Ok(index)
    }

    pub fn lookup(&self, name: &str) -> Option<&AssetMatch> {
        self.by_klass.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_klass.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_klass.is_empty()
    }
}

async fn read_metadata(dir: &Path) -> Option<AssetMetadata> {
    let path = dir.join(METADATA_FILE);
    let raw = tokio::fs::read_to_string(&path).await.ok()?;
    match serde_json::from_str(&raw) {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable asset metadata");
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncFailure {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub updated: usize,
    /// Monsters that already had a monster_id.
    pub skipped: usize,
    /// Monsters with no matching asset directory.
    pub not_found: usize,
    pub errors: Vec<SyncFailure>,
}

fn needs_image(monster: &Character) -> bool {
    monster
        .monster_id
        .as_deref()
        .map_or(true, |id| id.trim().is_empty())
}

/// Backfill `monster_id` and `image_url` for every monster missing them.
///
/// Records are patched one at a time; a failed patch is recorded in the
/// report and the batch carries on.
pub async fn sync_monster_images(
    db: &Database,
    assets: &AssetConfig,
) -> Result<SyncReport, SyncError> {
    let monsters = db.get_all_monsters().await?;
    let mut report = SyncReport::default();

    let pending = monsters.iter().filter(|m| needs_image(m)).count();
    report.skipped = monsters.len() - pending;
    if pending == 0 {
        tracing::info!(skipped = report.skipped, "All monsters already have images");
        metrics::record_sync(&report);
        return Ok(report);
    }

    let index = AssetIndex::scan(assets).await?;
    tracing::info!(
        assets = index.len(),
        pending,
        root = %assets.monsters_dir.display(),
        "Scanned monster assets"
    );

    for monster in monsters.iter().filter(|m| needs_image(m)) {
        let Some(found) = index.lookup(&monster.name) else {
            report.not_found += 1;
            continue;
        };

        match db
            .update_monster_image(&monster.name, &found.monster_id, &found.image_url)
            .await
        {
            Ok(true) => {
                tracing::info!(
                    name = %monster.name,
                    monster_id = %found.monster_id,
                    "Monster image linked"
                );
                report.updated += 1;
            }
            Ok(false) => report.errors.push(SyncFailure {
                name: monster.name.clone(),
                error: "Monster no longer exists".to_string(),
            }),
            Err(e) => {
                tracing::warn!(name = %monster.name, error = %e, "Monster image update failed");
                report.errors.push(SyncFailure {
                    name: monster.name.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    metrics::record_sync(&report);
    Ok(report)
}
