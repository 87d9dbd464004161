//! In-memory store for orchestrator tests

use crate::checkpoint::Checkpoint;
use crate::cycle::CycleBar;
use crate::ingest::RawBar;
use crate::matrix::FeatureMatrix;
use crate::normalize::StoredBounds;
use crate::store::{
    BarSource, BoundsStore, CheckpointStore, DerivedBarStore, MatrixStore, SeriesKey, StoreError,
};
use crate::types::Bar;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// Operation a test wants to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    DerivedWrite,
    BoundsWrite,
    MatrixWrite,
    CheckpointWrite,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub base: BTreeMap<String, Vec<RawBar>>,
    pub derived: BTreeMap<SeriesKey, Vec<CycleBar>>,
    pub checkpoints: BTreeMap<SeriesKey, Checkpoint>,
    pub bounds: BTreeMap<(SeriesKey, String), StoredBounds>,
    pub matrices: BTreeMap<(SeriesKey, String), FeatureMatrix>,
    /// Calls per operation name
    pub calls: BTreeMap<&'static str, usize>,
    pub fail_on: Option<FailPoint>,
}

impl MemoryStore {
    pub fn with_bars(symbol: &str, bars: &[Bar]) -> Self {
        let mut store = Self::default();
        store.push_bars(symbol, bars);
        store
    }

    pub fn push_bars(&mut self, symbol: &str, bars: &[Bar]) {
        self.push_raw(symbol, bars.iter().copied().map(RawBar::from));
    }

    pub fn push_raw(&mut self, symbol: &str, bars: impl IntoIterator<Item = RawBar>) {
        self.base.entry(symbol.to_string()).or_default().extend(bars);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.get(op).copied().unwrap_or(0)
    }

    fn enter(&mut self, op: &'static str, point: Option<FailPoint>) -> Result<(), StoreError> {
        *self.calls.entry(op).or_default() += 1;
        if point.is_some() && point == self.fail_on {
            return Err(StoreError::Backend {
                reason: format!("injected failure in {op}"),
            });
        }
        Ok(())
    }
}

impl BarSource for MemoryStore {
    fn load_base_bars(
        &self,
        symbol: &str,
        since: Option<NaiveDateTime>,
    ) -> Result<Vec<RawBar>, StoreError> {
        Ok(self
            .base
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| since.map_or(true, |s| b.timestamp >= s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl DerivedBarStore for MemoryStore {
    fn append_derived_bars(&mut self, key: &SeriesKey, bars: &[CycleBar]) -> Result<(), StoreError> {
        self.enter("append_derived_bars", Some(FailPoint::DerivedWrite))?;
        let stored = self.derived.entry(key.clone()).or_default();
        if let Some(dup) = bars
            .iter()
            .find(|b| stored.iter().any(|s| s.timestamp == b.timestamp))
        {
            return Err(StoreError::DuplicateKey {
                key: key.to_string(),
                timestamp: dup.timestamp,
            });
        }
        stored.extend_from_slice(bars);
        stored.sort_by_key(|b| b.timestamp);
        Ok(())
    }

    fn replace_derived_bars(&mut self, key: &SeriesKey, bars: &[CycleBar]) -> Result<(), StoreError> {
        self.enter("replace_derived_bars", Some(FailPoint::DerivedWrite))?;
        self.derived.insert(key.clone(), bars.to_vec());
        Ok(())
    }

    fn load_derived_bars(&self, key: &SeriesKey) -> Result<Vec<CycleBar>, StoreError> {
        Ok(self.derived.get(key).cloned().unwrap_or_default())
    }
}

impl CheckpointStore for MemoryStore {
    fn read_checkpoint(&self, key: &SeriesKey) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self.checkpoints.get(key).cloned())
    }

    fn write_checkpoint(&mut self, key: &SeriesKey, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        self.enter("write_checkpoint", Some(FailPoint::CheckpointWrite))?;
        self.checkpoints.insert(key.clone(), checkpoint.clone());
        Ok(())
    }
}

impl BoundsStore for MemoryStore {
    fn read_normalization_bounds(
        &self,
        key: &SeriesKey,
        column: &str,
    ) -> Result<Option<StoredBounds>, StoreError> {
        Ok(self.bounds.get(&(key.clone(), column.to_string())).cloned())
    }

    fn write_normalization_bounds(
        &mut self,
        key: &SeriesKey,
        column: &str,
        bounds: &StoredBounds,
    ) -> Result<(), StoreError> {
        self.enter("write_normalization_bounds", Some(FailPoint::BoundsWrite))?;
        self.bounds
            .insert((key.clone(), column.to_string()), bounds.clone());
        Ok(())
    }
}

impl MatrixStore for MemoryStore {
    fn persist_feature_matrix(
        &mut self,
        key: &SeriesKey,
        model: &str,
        matrix: &FeatureMatrix,
    ) -> Result<(), StoreError> {
        self.enter("persist_feature_matrix", Some(FailPoint::MatrixWrite))?;
        let slot = (key.clone(), model.to_string());
        let merged = match self.matrices.get(&slot) {
            Some(existing) => existing.extend_newer(matrix).map_err(|e| StoreError::Backend {
                reason: e.to_string(),
            })?,
            None => matrix.clone(),
        };
        self.matrices.insert(slot, merged);
        Ok(())
    }
}
