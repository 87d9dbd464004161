//! JSON state files: checkpoints and normalization bounds

use crate::layout::{corrupt, write_atomic};
use cyclebar_core::{StoreError, StoredBounds};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Bounds of one series, keyed by column name
pub type BoundsFile = BTreeMap<String, StoredBounds>;

/// `None` when the file does not exist
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| corrupt(path, e))
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    write_atomic(path, |tmp| {
        let mut writer = BufWriter::new(fs::File::create(tmp)?);
        serde_json::to_writer_pretty(&mut writer, value).map_err(|e| corrupt(tmp, e))?;
        writer.flush()?;
        Ok(())
    })
}
