//! Feature-matrix artifacts as flat JSON records

use crate::layout::corrupt;
use crate::state::{read_json, write_json};
use cyclebar_core::{CycleId, FeatureMatrix, StoreError};
use ndarray::{Array2, Array4};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Row-major dump of a [`FeatureMatrix`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixRecord {
    pub model: String,
    /// (N, height, width, 1)
    pub x_shape: [usize; 4],
    /// (N, label width)
    pub y_shape: [usize; 2],
    pub cycles: Vec<CycleId>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl MatrixRecord {
    pub fn from_matrix(model: &str, matrix: &FeatureMatrix) -> Self {
        let x_dim = matrix.x.dim();
        let y_dim = matrix.y.dim();
        Self {
            model: model.to_string(),
            x_shape: [x_dim.0, x_dim.1, x_dim.2, x_dim.3],
            y_shape: [y_dim.0, y_dim.1],
            cycles: matrix.cycles.clone(),
            x: matrix.x.iter().copied().collect(),
            y: matrix.y.iter().copied().collect(),
        }
    }

    pub fn into_matrix(self) -> Result<FeatureMatrix, ndarray::ShapeError> {
        let [n, h, w, c] = self.x_shape;
        let [yn, yw] = self.y_shape;
        Ok(FeatureMatrix {
            x: Array4::from_shape_vec((n, h, w, c), self.x)?,
            y: Array2::from_shape_vec((yn, yw), self.y)?,
            cycles: self.cycles,
        })
    }
}

pub fn read_matrix(path: &Path) -> Result<Option<FeatureMatrix>, StoreError> {
    let Some(record) = read_json::<MatrixRecord>(path)? else {
        return Ok(None);
    };
    if record.cycles.len() != record.x_shape[0] || record.y_shape[0] != record.x_shape[0] {
        return Err(corrupt(path, "batch sizes of x, y and cycles differ"));
    }
    record.into_matrix().map(Some).map_err(|e| corrupt(path, e))
}

/// Concatenate the slices of `matrix` newer than the stored last cycle and write back
pub fn append_matrix(path: &Path, model: &str, matrix: &FeatureMatrix) -> Result<usize, StoreError> {
    let merged = match read_matrix(path)? {
        Some(existing) => existing.extend_newer(matrix).map_err(|e| corrupt(path, e))?,
        None => matrix.clone(),
    };
    write_json(path, &MatrixRecord::from_matrix(model, &merged))?;
    Ok(merged.len())
}
