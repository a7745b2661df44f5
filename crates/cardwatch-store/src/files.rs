//! Directory-backed record store: one `<id>.yaml` per card.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use cardwatch_core::Record;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::StoreError;

/// Card files under a data directory, indexed by file stem.
///
/// The index is built once at [`open`](Self::open); a run assumes nobody else
/// adds or removes cards while it is in progress.
pub struct RecordStore {
    dir: PathBuf,
    paths: BTreeMap<String, PathBuf>,
}

impl RecordStore {
    /// Index every `*.yaml` / `*.yml` file directly under `dir`.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        if !dir.is_dir() {
            return Err(StoreError::DataDirNotFound(dir.to_path_buf()));
        }
        let mut paths = BTreeMap::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yaml" || e == "yml");
            if !is_yaml {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                paths.insert(stem.to_string(), path.clone());
            }
        }
        info!(dir = %dir.display(), count = paths.len(), "indexed card files");
        Ok(Self {
            dir: dir.to_path_buf(),
            paths,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All record ids, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.paths.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Read one record: its verbatim text plus the parsed fields.
    pub fn load(&self, id: &str) -> Result<Record, StoreError> {
        let path = self
            .paths
            .get(id)
            .ok_or_else(|| StoreError::UnknownRecord(id.to_string()))?;
        let raw_text = fs::read_to_string(path)?;
        let fields = parse_fields(path, &raw_text)?;
        Ok(Record {
            id: id.to_string(),
            location: path.clone(),
            fields,
            raw_text,
        })
    }

    /// Read every record in id order. Any unreadable file fails the whole load.
    pub fn load_all(&self) -> Result<Vec<Record>, StoreError> {
        self.paths.keys().map(|id| self.load(id)).collect()
    }

    /// Persist `text` verbatim for `id`.
    ///
    /// Writes to a temporary file in the same directory and renames it over
    /// the original, so a crash never leaves a half-written card. The card
    /// keeps its existing permissions.
    pub fn write(&self, id: &str, text: &str) -> Result<(), StoreError> {
        let path = self
            .paths
            .get(id)
            .ok_or_else(|| StoreError::UnknownRecord(id.to_string()))?;
        let permissions = fs::metadata(path)?.permissions();
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.as_file().set_permissions(permissions)?;
        tmp.write_all(text.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|source| StoreError::Persist {
            path: path.clone(),
            source,
        })?;
        debug!(record_id = id, path = %path.display(), "wrote card file");
        Ok(())
    }
}

fn parse_fields(path: &Path, raw_text: &str) -> Result<Value, StoreError> {
    let fields: Value = serde_yaml::from_str(raw_text).map_err(|source| StoreError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    if !fields.is_object() {
        return Err(StoreError::NotAMapping {
            path: path.to_path_buf(),
        });
    }
    Ok(fields)
}
