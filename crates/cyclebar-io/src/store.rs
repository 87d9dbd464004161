//! [`FileStore`]: every core collaborator trait over the directory layout

use crate::bars::{
    by_year, read_base_partition, read_derived_partition, write_base_partition,
    write_derived_partition,
};
use crate::layout::{check_path_component, list_partitions, StoreLayout, BASE_SCOPE};
use crate::matrix::{append_matrix, read_matrix};
use crate::state::{read_json, write_json, BoundsFile};
use chrono::{Datelike, NaiveDateTime};
use cyclebar_core::{
    Bar, BarSource, BoundsStore, Checkpoint, CheckpointStore, CycleBar, DerivedBarStore,
    FeatureMatrix, MatrixStore, RawBar, SeriesKey, StoreError, StoredBounds,
};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Store rooted at one directory; see the crate docs for the layout
#[derive(Debug, Clone)]
pub struct FileStore {
    layout: StoreLayout,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            layout: StoreLayout::new(root),
        }
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Symbols with at least one base partition
    pub fn symbols(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.layout.root().join("bars").join(BASE_SCOPE);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !list_partitions(&entry.path())?.is_empty() {
                    symbols.push(name.to_string());
                }
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    /// Merge base bars into their year partitions; stored rows win on equal timestamps
    pub fn import_base_bars(&self, symbol: &str, bars: &[Bar]) -> Result<usize, StoreError> {
        check_path_component("symbol", symbol)?;
        let mut added = 0;
        for (year, incoming) in by_year(bars, |b| b.timestamp) {
            let path = self.layout.base_partition(symbol, year);
            let mut rows: BTreeMap<NaiveDateTime, Bar> = BTreeMap::new();
            if path.exists() {
                for raw in read_base_partition(&path)? {
                    if let Some(bar) = complete(raw) {
                        rows.insert(bar.timestamp, bar);
                    }
                }
            }
            for bar in incoming {
                if let Entry::Vacant(slot) = rows.entry(bar.timestamp) {
                    slot.insert(bar);
                    added += 1;
                }
            }
            let merged: Vec<Bar> = rows.into_values().collect();
            write_base_partition(&path, &merged)?;
        }
        debug!(symbol, added, "base bars imported");
        Ok(added)
    }

    /// Persisted matrix for `(key, model)`, if any
    pub fn load_feature_matrix(
        &self,
        key: &SeriesKey,
        model: &str,
    ) -> Result<Option<FeatureMatrix>, StoreError> {
        read_matrix(&self.layout.matrix_path(key, model))
    }

    fn check_key(key: &SeriesKey) -> Result<(), StoreError> {
        check_path_component("symbol", &key.symbol)?;
        check_path_component("scope", &key.scope)
    }
}

/// Fully populated rows only; imports never rewrite gaps in stored files
fn complete(raw: RawBar) -> Option<Bar> {
    Some(Bar {
        timestamp: raw.timestamp,
        open: raw.open?,
        high: raw.high?,
        low: raw.low?,
        close: raw.close?,
        volume: raw.volume.unwrap_or(0),
        money: raw.money.unwrap_or(0),
    })
}

impl BarSource for FileStore {
    fn load_base_bars(
        &self,
        symbol: &str,
        since: Option<NaiveDateTime>,
    ) -> Result<Vec<RawBar>, StoreError> {
        check_path_component("symbol", symbol)?;
        let mut rows = Vec::new();
        for (year, path) in list_partitions(&self.layout.base_dir(symbol))? {
            if since.is_some_and(|s| year < s.year()) {
                continue;
            }
            rows.extend(
                read_base_partition(&path)?
                    .into_iter()
                    .filter(|r| since.map_or(true, |s| r.timestamp >= s)),
            );
        }
        debug!(symbol, rows = rows.len(), ?since, "base bars loaded");
        Ok(rows)
    }
}

impl DerivedBarStore for FileStore {
    fn append_derived_bars(&mut self, key: &SeriesKey, bars: &[CycleBar]) -> Result<(), StoreError> {
        Self::check_key(key)?;
        let mut staged = Vec::new();
        for (year, incoming) in by_year(bars, |b| b.timestamp) {
            let path = self.layout.derived_partition(key, year);
            let mut rows = if path.exists() {
                read_derived_partition(&path)?
            } else {
                Vec::new()
            };
            let stored: HashSet<NaiveDateTime> = rows.iter().map(|b| b.timestamp).collect();
            if let Some(dup) = incoming.iter().find(|b| stored.contains(&b.timestamp)) {
                return Err(StoreError::DuplicateKey {
                    key: key.to_string(),
                    timestamp: dup.timestamp,
                });
            }
            rows.extend(incoming);
            rows.sort_by_key(|b| b.timestamp);
            staged.push((path, rows));
        }
        // Nothing is written until every partition passed the duplicate check
        for (path, rows) in staged {
            write_derived_partition(&path, &rows)?;
        }
        debug!(series = %key, rows = bars.len(), "derived bars appended");
        Ok(())
    }

    fn replace_derived_bars(&mut self, key: &SeriesKey, bars: &[CycleBar]) -> Result<(), StoreError> {
        Self::check_key(key)?;
        let groups = by_year(bars, |b| b.timestamp);
        for (year, rows) in &groups {
            write_derived_partition(&self.layout.derived_partition(key, *year), rows)?;
        }
        for (year, path) in list_partitions(&self.layout.derived_dir(key))? {
            if !groups.contains_key(&year) {
                fs::remove_file(path)?;
            }
        }
        debug!(series = %key, rows = bars.len(), "derived bars replaced");
        Ok(())
    }

    fn load_derived_bars(&self, key: &SeriesKey) -> Result<Vec<CycleBar>, StoreError> {
        Self::check_key(key)?;
        let mut rows = Vec::new();
        for (_, path) in list_partitions(&self.layout.derived_dir(key))? {
            rows.extend(read_derived_partition(&path)?);
        }
        Ok(rows)
    }
}

impl CheckpointStore for FileStore {
    fn read_checkpoint(&self, key: &SeriesKey) -> Result<Option<Checkpoint>, StoreError> {
        Self::check_key(key)?;
        read_json(&self.layout.checkpoint_path(key))
    }

    fn write_checkpoint(&mut self, key: &SeriesKey, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        Self::check_key(key)?;
        write_json(&self.layout.checkpoint_path(key), checkpoint)
    }
}

impl BoundsStore for FileStore {
    fn read_normalization_bounds(
        &self,
        key: &SeriesKey,
        column: &str,
    ) -> Result<Option<StoredBounds>, StoreError> {
        Self::check_key(key)?;
        let bounds: Option<BoundsFile> = read_json(&self.layout.bounds_path(key))?;
        Ok(bounds.and_then(|b| b.get(column).copied()))
    }

    fn write_normalization_bounds(
        &mut self,
        key: &SeriesKey,
        column: &str,
        bounds: &StoredBounds,
    ) -> Result<(), StoreError> {
        Self::check_key(key)?;
        let path = self.layout.bounds_path(key);
        let mut all: BoundsFile = read_json(&path)?.unwrap_or_default();
        all.insert(column.to_string(), *bounds);
        write_json(&path, &all)
    }
}

impl MatrixStore for FileStore {
    fn persist_feature_matrix(
        &mut self,
        key: &SeriesKey,
        model: &str,
        matrix: &FeatureMatrix,
    ) -> Result<(), StoreError> {
        Self::check_key(key)?;
        check_path_component("model", model)?;
        let total = append_matrix(&self.layout.matrix_path(key, model), model, matrix)?;
        debug!(series = %key, model, added = matrix.len(), total, "feature matrix persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyclebar_core::test_utils::{bar_at, flat_session_day, trading_day, ts};

    fn derived(hour: u32, minute: u32, day: u32) -> CycleBar {
        let bar = bar_at(ts(trading_day(day), hour, minute), 10.0, 100);
        CycleBar {
            timestamp: bar.timestamp,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            money: bar.money,
            ..CycleBar::default()
        }
    }

    #[test]
    fn test_base_bars_since_filter() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let mut bars = flat_session_day(trading_day(0), 10.0, 100);
        bars.extend(flat_session_day(trading_day(1), 10.5, 200));
        assert_eq!(store.import_base_bars("000001.XSHE", &bars).unwrap(), 480);
        // Re-import adds nothing
        assert_eq!(store.import_base_bars("000001.XSHE", &bars).unwrap(), 0);

        assert_eq!(store.load_base_bars("000001.XSHE", None).unwrap().len(), 480);
        let since = ts(trading_day(1), 9, 31);
        let later = store.load_base_bars("000001.XSHE", Some(since)).unwrap();
        assert_eq!(later.len(), 240);
        assert!(later.iter().all(|r| r.timestamp >= since));

        assert!(store.load_base_bars("600000.XSHG", None).unwrap().is_empty());
        assert_eq!(store.symbols().unwrap(), vec!["000001.XSHE".to_string()]);
    }

    #[test]
    fn test_append_rejects_duplicates_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path());
        let key = SeriesKey::new("000001.XSHE", "15m");

        store
            .append_derived_bars(&key, &[derived(9, 45, 0), derived(10, 0, 0)])
            .unwrap();
        let err = store
            .append_derived_bars(&key, &[derived(10, 0, 0), derived(10, 15, 0)])
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
        assert_eq!(store.load_derived_bars(&key).unwrap().len(), 2);

        store.append_derived_bars(&key, &[derived(10, 15, 0)]).unwrap();
        let rows = store.load_derived_bars(&key).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_replace_drops_stale_years() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path());
        let key = SeriesKey::new("000001.XSHE", "15m");

        let mut old = derived(9, 45, 0);
        old.timestamp = ts(chrono::NaiveDate::from_ymd_opt(2023, 12, 29).unwrap(), 9, 45);
        store.append_derived_bars(&key, &[old, derived(9, 45, 0)]).unwrap();
        assert_eq!(list_partitions(&store.layout().derived_dir(&key)).unwrap().len(), 2);

        store.replace_derived_bars(&key, &[derived(10, 0, 1)]).unwrap();
        let rows = store.load_derived_bars(&key).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(list_partitions(&store.layout().derived_dir(&key)).unwrap().len(), 1);
    }

    #[test]
    fn test_bounds_per_column() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path());
        let key = SeriesKey::new("000001.XSHE", "15m");
        let range = StoredBounds::Range(cyclebar_core::ScaleBounds::new(1.0, 2.0));

        assert_eq!(store.read_normalization_bounds(&key, "length").unwrap(), None);
        store.write_normalization_bounds(&key, "length", &range).unwrap();
        store
            .write_normalization_bounds(
                &key,
                "volume_baseline",
                &StoredBounds::Max(cyclebar_core::BaselineMax { max: 3.0 }),
            )
            .unwrap();
        assert_eq!(store.read_normalization_bounds(&key, "length").unwrap(), Some(range));

        // Another scope is a separate series
        let hourly = SeriesKey::new("000001.XSHE", "60m");
        assert_eq!(store.read_normalization_bounds(&hourly, "length").unwrap(), None);
    }

    #[test]
    fn test_path_escape_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.load_base_bars("../secrets", None).is_err());
    }
}
