//! Data location and symbol selection

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where bars and state live, and which symbols to process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Root of the file store (`bars/`, `state/`, `matrices/` below it)
    pub data_dir: PathBuf,

    /// Symbols processed by `cyclebar-prepare`
    pub symbols: Vec<String>,

    /// Start of history for series without a checkpoint
    pub initial_start: Option<NaiveDateTime>,

    /// Extra days reloaded before the checkpoint's next start
    pub warmup_days: i64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            symbols: Vec::new(),
            initial_start: None,
            warmup_days: 30,
        }
    }
}

impl DataConfig {
    /// Symbols with surrounding whitespace removed, empty and repeated entries dropped
    pub fn normalized_symbols(&self) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        self.symbols
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_symbols() {
        let config = DataConfig {
            symbols: vec![
                " 000001.XSHE".into(),
                "".into(),
                "600000.XSHG".into(),
                "000001.XSHE".into(),
            ],
            ..DataConfig::default()
        };
        assert_eq!(
            config.normalized_symbols(),
            vec!["000001.XSHE".to_string(), "600000.XSHG".to_string()]
        );
    }
}
