//! Fixed-size feature tensors, one slice per cycle
//!
//! For each cycle: the trailing `height` complete rows of the model's X columns,
//! a leading direction column prepended, zero-padded to `height × width`; plus
//! the cycle's last complete row of Y columns.

use crate::errors::PipelineError;
use crate::frame::{Column, FeatureFrame};
use crate::types::CycleId;
use ndarray::{concatenate, s, Array2, Array4, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Matrix height and width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixShape {
    pub height: usize,
    pub width: usize,
}

impl Default for MatrixShape {
    fn default() -> Self {
        Self {
            height: 30,
            width: 30,
        }
    }
}

/// Zero padding around a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Padding {
    pub top: usize,
    pub bottom: usize,
    pub left: usize,
    pub right: usize,
}

impl Padding {
    /// Smaller vertical half on top, smaller horizontal half on the right
    pub fn for_block(rows: usize, cols: usize, shape: MatrixShape) -> Self {
        let dh = shape.height.saturating_sub(rows);
        let dw = shape.width.saturating_sub(cols);
        let top = dh / 2;
        let right = dw / 2;
        Self {
            top,
            bottom: dh - top,
            left: dw - right,
            right,
        }
    }
}

/// One model's columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub x_columns: Vec<Column>,
    pub y_columns: Vec<Column>,
}

impl ModelSpec {
    pub fn new(name: &str, x_columns: Vec<Column>, y_columns: Vec<Column>) -> Self {
        Self {
            name: name.to_string(),
            x_columns,
            y_columns,
        }
    }

    /// The four standard models
    pub fn defaults() -> Vec<ModelSpec> {
        use Column::*;
        vec![
            ModelSpec::new(
                "cycle_length",
                vec![
                    Length,
                    Position,
                    Amplitude,
                    AmplitudePerBar,
                    Volume,
                    BarVolPeak1,
                    BarVolPeak5,
                    CycleVolPeak1,
                    CycleVolPeak5,
                    PrevLength,
                    PrevAmplitude,
                ],
                vec![NextLength],
            ),
            ModelSpec::new(
                "cycle_change",
                vec![
                    Amplitude,
                    AmplitudePerBar,
                    Length,
                    Position,
                    Volume,
                    CycleVolPeak1,
                    CycleVolPeak5,
                    PrevAmplitude,
                    PrevLength,
                    PrevVolPeak1,
                    PrevVolPeak5,
                ],
                vec![NextAmplitude],
            ),
            ModelSpec::new(
                "bar_change",
                vec![
                    AmplitudePerBar,
                    Position,
                    Volume,
                    BarVolPeak1,
                    BarVolPeak5,
                    SessionVolPeak1,
                    SessionVolPeak5,
                    SessionVolPeak15,
                    PrevAmplitude,
                    PrevLength,
                ],
                vec![Amplitude],
            ),
            ModelSpec::new(
                "bar_volume",
                vec![
                    Volume,
                    BarVolPeak1,
                    BarVolPeak5,
                    SessionVolPeak1,
                    SessionVolPeak5,
                    SessionVolPeak15,
                    Position,
                    AmplitudePerBar,
                ],
                vec![EndSessionVolPeak5],
            ),
        ]
    }

    /// Fail when the X block (plus the direction column) is wider than `shape`
    pub fn check_width(&self, shape: MatrixShape) -> Result<(), PipelineError> {
        let columns = self.x_columns.len() + 1;
        if columns > shape.width {
            return Err(PipelineError::MatrixTooWide {
                model: self.name.clone(),
                columns,
                width: shape.width,
            });
        }
        Ok(())
    }
}

/// Stacked tensors for one model
///
/// `x` is (N, height, width, 1), `y` is (N, label width).
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub x: Array4<f64>,
    pub y: Array2<f64>,
    /// Cycle of each slice, batch order
    pub cycles: Vec<CycleId>,
}

impl FeatureMatrix {
    pub fn empty(shape: MatrixShape, label_width: usize) -> Self {
        Self {
            x: Array4::zeros((0, shape.height, shape.width, 1)),
            y: Array2::zeros((0, label_width)),
            cycles: Vec::new(),
        }
    }

    /// Number of slices
    pub fn len(&self) -> usize {
        self.x.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_cycle(&self) -> Option<CycleId> {
        self.cycles.last().copied()
    }

    /// Slices whose cycle is newer than `last` (all of them for `None`)
    pub fn after(&self, last: Option<CycleId>) -> FeatureMatrix {
        let keep: Vec<usize> = self
            .cycles
            .iter()
            .enumerate()
            .filter(|(_, id)| last.map_or(true, |l| **id > l))
            .map(|(i, _)| i)
            .collect();
        FeatureMatrix {
            x: self.x.select(Axis(0), &keep),
            y: self.y.select(Axis(0), &keep),
            cycles: keep.iter().map(|&i| self.cycles[i]).collect(),
        }
    }

    /// Append the slices of `other` that are newer than this matrix's last cycle
    ///
    /// Re-appending an already stored batch is a no-op.
    pub fn extend_newer(&self, other: &FeatureMatrix) -> Result<FeatureMatrix, PipelineError> {
        self.concat(&other.after(self.last_cycle()))
    }

    /// Append `other` along the batch axis
    pub fn concat(&self, other: &FeatureMatrix) -> Result<FeatureMatrix, PipelineError> {
        let x = concatenate(Axis(0), &[self.x.view(), other.x.view()])?;
        let y = concatenate(Axis(0), &[self.y.view(), other.y.view()])?;
        let mut cycles = self.cycles.clone();
        cycles.extend_from_slice(&other.cycles);
        Ok(FeatureMatrix { x, y, cycles })
    }
}

/// Matrix assembler
#[derive(Debug, Clone, Copy, Default)]
pub struct MatrixBuilder {
    shape: MatrixShape,
}

impl MatrixBuilder {
    pub fn new(shape: MatrixShape) -> Result<Self, PipelineError> {
        if shape.height == 0 || shape.width == 0 {
            return Err(PipelineError::invalid_parameter(
                "matrix shape",
                format!("{}x{} must be non-empty", shape.height, shape.width),
            ));
        }
        Ok(Self { shape })
    }

    pub fn shape(&self) -> MatrixShape {
        self.shape
    }

    /// One slice per cycle with complete X and Y rows
    pub fn build(
        &self,
        frame: &FeatureFrame,
        spec: &ModelSpec,
    ) -> Result<FeatureMatrix, PipelineError> {
        self.build_for(frame, spec, |_| true)
    }

    /// Like [`build`](Self::build) but only for cycles accepted by `include`
    pub fn build_for(
        &self,
        frame: &FeatureFrame,
        spec: &ModelSpec,
        include: impl Fn(CycleId) -> bool,
    ) -> Result<FeatureMatrix, PipelineError> {
        spec.check_width(self.shape)?;

        let direction = frame.column(Column::Direction)?;
        let x_cols = spec
            .x_columns
            .iter()
            .map(|c| frame.column(*c))
            .collect::<Result<Vec<_>, _>>()?;
        let y_cols = spec
            .y_columns
            .iter()
            .map(|c| frame.column(*c))
            .collect::<Result<Vec<_>, _>>()?;

        let mut slices: Vec<Array2<f64>> = Vec::new();
        let mut labels: Vec<Vec<f64>> = Vec::new();
        let mut cycles: Vec<CycleId> = Vec::new();

        for (id, rows) in frame.cycle_rows() {
            if !include(id) {
                continue;
            }

            let x_rows: Vec<Vec<f64>> = rows
                .clone()
                .filter_map(|r| complete_row(r, direction, &x_cols))
                .collect();
            let y_row = rows
                .clone()
                .rev()
                .find_map(|r| complete_row(r, &[], &y_cols));

            let (Some(y_row), false) = (y_row, x_rows.is_empty()) else {
                debug!(model = %spec.name, cycle = %id, "skipping cycle without complete rows");
                continue;
            };

            let tail = &x_rows[x_rows.len().saturating_sub(self.shape.height)..];
            slices.push(self.pad(tail));
            labels.push(y_row);
            cycles.push(id);
        }

        self.stack(slices, labels, cycles, spec.y_columns.len())
    }

    /// Zero-pad a (rows × cols) block into a (height × width) matrix
    pub fn pad(&self, block: &[Vec<f64>]) -> Array2<f64> {
        let rows = block.len();
        let cols = block.first().map_or(0, Vec::len);
        let pad = Padding::for_block(rows, cols, self.shape);

        let mut out = Array2::zeros((self.shape.height, self.shape.width));
        for (r, row) in block.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                out[[pad.top + r, pad.left + c]] = *value;
            }
        }
        out
    }

    fn stack(
        &self,
        slices: Vec<Array2<f64>>,
        labels: Vec<Vec<f64>>,
        cycles: Vec<CycleId>,
        label_width: usize,
    ) -> Result<FeatureMatrix, PipelineError> {
        let n = slices.len();
        let mut x = Array4::zeros((n, self.shape.height, self.shape.width, 1));
        for (i, slice) in slices.iter().enumerate() {
            x.slice_mut(s![i, .., .., 0]).assign(slice);
        }
        let flat: Vec<f64> = labels.into_iter().flatten().collect();
        let y = Array2::from_shape_vec((n, label_width), flat)?;
        Ok(FeatureMatrix { x, y, cycles })
    }
}

/// Values of `cols` at row `r` (prefixed by `lead` if given), if all present
fn complete_row(r: usize, lead: &[Option<f64>], cols: &[&[Option<f64>]]) -> Option<Vec<f64>> {
    let mut row = Vec::with_capacity(cols.len() + 1);
    if !lead.is_empty() {
        row.push(lead[r]?);
    }
    for col in cols {
        row.push(col[r]?);
    }
    Some(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::CycleBar;
    use crate::types::Direction;

    fn frame(cycles: &[(i64, usize)]) -> FeatureFrame {
        let mut bars = Vec::new();
        for &(id, n) in cycles {
            for i in 0..n {
                bars.push(CycleBar {
                    volume: (i + 1) as u64,
                    direction: Some(Direction::Upturn),
                    cycle_id: Some(CycleId(id)),
                    cycle_start: i == 0,
                    position: Some(i as u32),
                    length: Some(n as u32),
                    next_length: Some(n as u32 + 1),
                    ..Default::default()
                });
            }
        }
        FeatureFrame::from_cycle_bars(&bars)
    }

    fn spec() -> ModelSpec {
        ModelSpec::new(
            "test",
            vec![Column::Volume, Column::Position],
            vec![Column::NextLength],
        )
    }

    #[test]
    fn test_padding_split() {
        let shape = MatrixShape::default();
        assert_eq!(
            Padding::for_block(10, 8, shape),
            Padding {
                top: 10,
                bottom: 10,
                left: 11,
                right: 11
            }
        );
        assert_eq!(
            Padding::for_block(9, 7, shape),
            Padding {
                top: 10,
                bottom: 11,
                left: 12,
                right: 11
            }
        );
        assert_eq!(
            Padding::for_block(30, 30, shape),
            Padding {
                top: 0,
                bottom: 0,
                left: 0,
                right: 0
            }
        );
    }

    #[test]
    fn test_pad_places_block() {
        let builder = MatrixBuilder::default();
        let block: Vec<Vec<f64>> = (0..10).map(|r| vec![1.0 + r as f64; 8]).collect();
        let out = builder.pad(&block);
        assert_eq!(out.dim(), (30, 30));
        assert_eq!(out[[9, 11]], 0.0);
        assert_eq!(out[[10, 11]], 1.0);
        assert_eq!(out[[19, 18]], 10.0);
        assert_eq!(out[[20, 18]], 0.0);
        assert_eq!(out[[10, 19]], 0.0);
        assert_eq!(out.sum(), (1..=10).map(|v| v as f64 * 8.0).sum::<f64>());
    }

    #[test]
    fn test_build_one_slice_per_cycle() {
        let matrix = MatrixBuilder::default()
            .build(&frame(&[(1, 5), (2, 40)]), &spec())
            .unwrap();
        assert_eq!(matrix.x.dim(), (2, 30, 30, 1));
        assert_eq!(matrix.y.dim(), (2, 1));
        assert_eq!(matrix.cycles, vec![CycleId(1), CycleId(2)]);
        assert_eq!(matrix.y[[0, 0]], 6.0);
        assert_eq!(matrix.y[[1, 0]], 41.0);

        // 3 columns padded 14 left / 13 right; direction leads
        assert_eq!(matrix.x[[1, 0, 13, 0]], 0.0);
        assert_eq!(matrix.x[[1, 0, 14, 0]], 1.0);
        // 40-row cycle keeps its trailing 30 rows: volumes 11..=40
        assert_eq!(matrix.x[[1, 0, 15, 0]], 11.0);
        assert_eq!(matrix.x[[1, 29, 15, 0]], 40.0);
        assert_eq!(matrix.x[[1, 29, 16, 0]], 39.0);
    }

    #[test]
    fn test_incomplete_cycle_skipped_and_filter() {
        let mut bars: Vec<CycleBar> = Vec::new();
        for i in 0..3 {
            bars.push(CycleBar {
                direction: Some(Direction::Downturn),
                cycle_id: Some(CycleId(7)),
                cycle_start: i == 0,
                position: Some(i),
                next_length: None,
                ..Default::default()
            });
        }
        let f = FeatureFrame::from_cycle_bars(&bars);
        let matrix = MatrixBuilder::default().build(&f, &spec()).unwrap();
        assert!(matrix.is_empty());
        assert_eq!(matrix.x.dim(), (0, 30, 30, 1));

        let filtered = MatrixBuilder::default()
            .build_for(&frame(&[(1, 5), (2, 6)]), &spec(), |id| id > CycleId(1))
            .unwrap();
        assert_eq!(filtered.cycles, vec![CycleId(2)]);
    }

    #[test]
    fn test_too_wide_rejected() {
        let builder = MatrixBuilder::new(MatrixShape {
            height: 30,
            width: 2,
        })
        .unwrap();
        let err = builder.build(&frame(&[(1, 5)]), &spec()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MatrixTooWide {
                columns: 3,
                width: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_defaults_fit_and_concat() {
        let shape = MatrixShape::default();
        for model in ModelSpec::defaults() {
            assert!(model.check_width(shape).is_ok(), "{}", model.name);
        }
        let a = MatrixBuilder::default()
            .build(&frame(&[(1, 5)]), &spec())
            .unwrap();
        let b = MatrixBuilder::default()
            .build(&frame(&[(2, 5), (3, 4)]), &spec())
            .unwrap();
        let merged = a.concat(&b).unwrap();
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.last_cycle(), Some(CycleId(3)));
        assert_eq!(merged.x.slice(s![1, .., .., ..]), b.x.slice(s![0, .., .., ..]));
    }

    #[test]
    fn test_extend_newer_skips_stored_cycles() {
        let builder = MatrixBuilder::default();
        let stored = builder.build(&frame(&[(1, 5), (2, 5)]), &spec()).unwrap();
        let batch = builder
            .build(&frame(&[(2, 5), (3, 4), (4, 6)]), &spec())
            .unwrap();

        let merged = stored.extend_newer(&batch).unwrap();
        assert_eq!(merged.cycles, vec![CycleId(1), CycleId(2), CycleId(3), CycleId(4)]);
        assert_eq!(merged.x.dim(), (4, 30, 30, 1));
        assert_eq!(merged.y.dim(), (4, 1));
        assert_eq!(merged.x.slice(s![2, .., .., ..]), batch.x.slice(s![1, .., .., ..]));

        // Same batch again changes nothing
        let again = merged.extend_newer(&batch).unwrap();
        assert_eq!(again, merged);
        assert!(batch.after(Some(CycleId(4))).is_empty());
        assert_eq!(batch.after(None), batch);
    }
}
