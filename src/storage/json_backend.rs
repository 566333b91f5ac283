use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use crate::{errors::EngineError, store::Planner};

use super::{Result, StorageBackend};

const SNAPSHOT_EXTENSION: &str = "json";
const TMP_SUFFIX: &str = "tmp";

/// File-per-planner JSON storage with atomic writes.
#[derive(Clone)]
pub struct JsonStorage {
    root: PathBuf,
}

impl JsonStorage {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        ensure_dir(&root)?;
        Ok(Self { root })
    }

    pub fn snapshot_path(&self, name: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", canonical_name(name), SNAPSHOT_EXTENSION))
    }
}

impl StorageBackend for JsonStorage {
    fn save(&self, planner: &Planner, name: &str) -> Result<()> {
        save_planner_to_path(planner, &self.snapshot_path(name))
    }

    fn load(&self, name: &str) -> Result<Planner> {
        let path = self.snapshot_path(name);
        if !path.exists() {
            return Err(EngineError::SnapshotNotFound(name.to_string()));
        }
        load_planner_from_path(&path)
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SNAPSHOT_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn delete(&self, name: &str) -> Result<()> {
        let path = self.snapshot_path(name);
        if !path.exists() {
            return Err(EngineError::SnapshotNotFound(name.to_string()));
        }
        fs::remove_file(path)?;
        Ok(())
    }
}

pub fn save_planner_to_path(planner: &Planner, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let json = serde_json::to_string_pretty(planner)?;
    write_atomic(path, &json)
}

pub fn load_planner_from_path(path: &Path) -> Result<Planner> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Writes through a sibling temp file then renames, so readers never observe
/// a partially-written snapshot.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp_path = path.with_extension(TMP_SUFFIX);
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn canonical_name(name: &str) -> String {
    name.trim()
        .to_ascii_lowercase()
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() {
                character
            } else {
                '_'
            }
        })
        .collect()
}
