//! Paths of every stored artifact

use cyclebar_core::{SeriesKey, StoreError};
use std::fs;
use std::path::{Path, PathBuf};

/// Scope of the base 1-minute bars
pub const BASE_SCOPE: &str = "1m";

#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_dir(&self, symbol: &str) -> PathBuf {
        self.root.join("bars").join(BASE_SCOPE).join(symbol)
    }

    pub fn base_partition(&self, symbol: &str, year: i32) -> PathBuf {
        self.base_dir(symbol).join(format!("{year}.csv"))
    }

    pub fn derived_dir(&self, key: &SeriesKey) -> PathBuf {
        self.root.join("derived").join(&key.scope).join(&key.symbol)
    }

    pub fn derived_partition(&self, key: &SeriesKey, year: i32) -> PathBuf {
        self.derived_dir(key).join(format!("{year}.csv"))
    }

    pub fn checkpoint_path(&self, key: &SeriesKey) -> PathBuf {
        self.state_dir(key).join("checkpoint.json")
    }

    pub fn bounds_path(&self, key: &SeriesKey) -> PathBuf {
        self.state_dir(key).join("bounds.json")
    }

    pub fn matrix_path(&self, key: &SeriesKey, model: &str) -> PathBuf {
        self.root
            .join("matrices")
            .join(&key.scope)
            .join(&key.symbol)
            .join(format!("{model}.json"))
    }

    fn state_dir(&self, key: &SeriesKey) -> PathBuf {
        self.root.join("state").join(&key.scope).join(&key.symbol)
    }
}

/// Reject names that would escape their directory
pub fn check_path_component(kind: &str, name: &str) -> Result<(), StoreError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0');
    if bad {
        return Err(StoreError::Backend {
            reason: format!("invalid {kind} name '{name}'"),
        });
    }
    Ok(())
}

/// Year partitions (`{year}.csv`) in `dir`, ascending; empty when `dir` is absent
pub fn list_partitions(dir: &Path) -> Result<Vec<(i32, PathBuf)>, StoreError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut partitions = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        let year = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<i32>().ok());
        if let Some(year) = year {
            partitions.push((year, path));
        }
    }
    partitions.sort_by_key(|(year, _)| *year);
    Ok(partitions)
}

/// Write through `write` into a temporary sibling, then rename over `path`
pub(crate) fn write_atomic(
    path: &Path,
    write: impl FnOnce(&Path) -> Result<(), StoreError>,
) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    if let Err(e) = write(&tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

pub(crate) fn corrupt(path: &Path, reason: impl ToString) -> StoreError {
    StoreError::Corrupt {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}
