//! Durable snapshots for the local store.
//!
//! The whole database is written as one JSON document with a SHA-256
//! checksum of its collections, so a truncated or hand-edited file is
//! detected on load instead of silently serving partial data.

use crate::error::StoreError;
use crate::store::local::CollectionData;
use crate::store::StoreResult;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Snapshot format version. Increment when the layout changes.
const SNAPSHOT_VERSION: u32 = 1;

/// Identifies snapshot files.
const SNAPSHOT_FORMAT: &str = "toolbox-snapshot";

#[derive(Serialize, Deserialize)]
struct SnapshotFile<C> {
    format: String,
    version: u32,
    database: String,
    checksum: String,
    collections: C,
}

/// Collections by name, borrowed from the live map or a staged copy.
pub type CollectionsView<'a> = BTreeMap<&'a str, &'a CollectionData>;

fn checksum<C: Serialize>(collections: &C) -> StoreResult<String> {
    let bytes = serde_json::to_vec(collections)
        .map_err(|e| StoreError::Backend(format!("Failed to serialize collections: {}", e)))?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Serialize `collections` into snapshot bytes for [`write_atomic`].
pub fn encode(database: &str, collections: &CollectionsView<'_>) -> StoreResult<Vec<u8>> {
    let snapshot = SnapshotFile {
        format: SNAPSHOT_FORMAT.to_string(),
        version: SNAPSHOT_VERSION,
        database: database.to_string(),
        checksum: checksum(collections)?,
        collections,
    };

    serde_json::to_vec(&snapshot)
        .map_err(|e| StoreError::Backend(format!("Failed to serialize snapshot: {}", e)))
}

/// Write encoded snapshot bytes to `path`. Blocks on file I/O.
///
/// The file is written beside the target and renamed over it, so readers see
/// either the old snapshot or the new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            StoreError::Backend(format!("Failed to create snapshot directory: {}", e))
        })?;
    }

    let tmp_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp_path)
            .map_err(|e| StoreError::Backend(format!("Failed to create snapshot file: {}", e)))?;
        file.write_all(bytes)
            .map_err(|e| StoreError::Backend(format!("Failed to write snapshot: {}", e)))?;
        file.sync_all()
            .map_err(|e| StoreError::Backend(format!("Failed to flush snapshot: {}", e)))?;
    }
    fs::rename(&tmp_path, path)
        .map_err(|e| StoreError::Backend(format!("Failed to replace snapshot: {}", e)))?;

    tracing::debug!(
        path = %path.display(),
        size_bytes = bytes.len(),
        "Store snapshot saved"
    );

    Ok(())
}

/// Read the snapshot at `path`.
///
/// Returns `None` if the file does not exist. Any other problem (wrong
/// format, version, database, or checksum) is an error: the snapshot is the
/// data, not a cache.
pub fn load(path: &Path, database: &str) -> StoreResult<Option<BTreeMap<String, CollectionData>>> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "Snapshot file does not exist");
        return Ok(None);
    }

    let bytes = fs::read(path)
        .map_err(|e| StoreError::Backend(format!("Failed to read snapshot: {}", e)))?;

    let snapshot: SnapshotFile<BTreeMap<String, CollectionData>> =
        serde_json::from_slice(&bytes).map_err(|e| {
            StoreError::Backend(format!("Snapshot is not valid JSON: {}", e))
        })?;

    if snapshot.format != SNAPSHOT_FORMAT {
        return Err(StoreError::Backend(format!(
            "{} is not a store snapshot",
            path.display()
        )));
    }

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(StoreError::Backend(format!(
            "Snapshot version {} is not supported (expected {})",
            snapshot.version, SNAPSHOT_VERSION
        )));
    }

    if snapshot.database != database {
        return Err(StoreError::Backend(format!(
            "Snapshot belongs to database '{}', not '{}'",
            snapshot.database, database
        )));
    }

    if checksum(&snapshot.collections)? != snapshot.checksum {
        return Err(StoreError::Backend(format!(
            "Snapshot checksum mismatch for {}",
            path.display()
        )));
    }

    tracing::info!(
        path = %path.display(),
        database,
        collections = snapshot.collections.len(),
        "Store snapshot loaded"
    );

    Ok(Some(snapshot.collections))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn tools() -> CollectionData {
        CollectionData {
            indexes: Vec::new(),
            documents: vec![json!({ "name": "add", "embedding": [0.25, 0.5] })],
        }
    }

    fn save(path: &Path, database: &str) {
        let data = tools();
        let view: CollectionsView<'_> = [("tools", &data)].into_iter().collect();
        write_atomic(path, &encode(database, &view).unwrap()).unwrap();
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        save(&path, "function_calling_db");
        let loaded = load(&path, "function_calling_db").unwrap().unwrap();

        assert_eq!(loaded["tools"].documents.len(), 1);
        assert_eq!(loaded["tools"].documents[0]["name"], "add");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_write_fails_when_parent_is_a_file() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();

        let err = write_atomic(&blocker.join("store.json"), b"{}").unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempdir().unwrap();
        assert!(load(&dir.path().join("absent.json"), "db").unwrap().is_none());
    }

    #[test]
    fn test_tampered_snapshot_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        save(&path, "db");

        let text = fs::read_to_string(&path).unwrap().replace("\"add\"", "\"sub\"");
        fs::write(&path, text).unwrap();

        let err = load(&path, "db").unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_other_database_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        save(&path, "db_one");

        assert!(load(&path, "db_two").is_err());
    }
}
