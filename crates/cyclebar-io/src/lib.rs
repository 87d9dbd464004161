//! File-backed storage for cyclebar series
//!
//! Directory layout under the store root:
//!
//! ```text
//! bars/1m/{symbol}/{year}.csv             base 1-minute bars
//! derived/{scope}/{symbol}/{year}.csv     cycle-annotated bars per period
//! state/{scope}/{symbol}/checkpoint.json  run checkpoint
//! state/{scope}/{symbol}/bounds.json      normalization bounds by column
//! matrices/{scope}/{symbol}/{model}.json  accumulated feature matrices
//! ```
//!
//! Every write goes to a temporary sibling first and is renamed into place.

pub mod bars;
pub mod layout;
pub mod matrix;
pub mod state;
pub mod store;

pub use layout::StoreLayout;
pub use matrix::MatrixRecord;
pub use store::FileStore;
