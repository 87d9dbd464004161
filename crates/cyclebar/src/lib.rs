//! Directional price cycles and normalized feature matrices from 1-minute bars.
//!
//! ## Meta-Crate
//!
//! Re-exports the cyclebar sub-crates. Depend on a sub-crate directly when
//! only part of the stack is needed:
//!
//! - `cyclebar-core` - pipeline stages, checkpoint records, store traits
//! - `cyclebar-config` - layered settings
//! - `cyclebar-io` - file-backed store
//! - `cyclebar-cli` - the `cyclebar-prepare` batch binary
//!
//! ## Features
//!
//! - `config` - configuration management (default)
//! - `io` - file-backed store (default)
//! - `full` - enable all features
//!
//! ## Basic Usage
//!
//! ```rust
//! use cyclebar::{Bar, Period, Resampler};
//! use chrono::NaiveDate;
//!
//! let t = NaiveDate::from_ymd_opt(2024, 1, 2)
//!     .unwrap()
//!     .and_hms_opt(9, 31, 0)
//!     .unwrap();
//! let bar = Bar { timestamp: t, open: 10.0, high: 10.1, low: 9.9, close: 10.0, volume: 100, money: 1000 };
//!
//! let resampler = Resampler::new("15m".parse::<Period>().unwrap());
//! let bars = resampler.resample(&[bar]).unwrap();
//! assert_eq!(bars[0].timestamp.format("%H:%M").to_string(), "09:45");
//! ```

// Re-export core (always available)
pub use cyclebar_core as core;

#[cfg(feature = "config")]
pub use cyclebar_config as config;

#[cfg(feature = "io")]
pub use cyclebar_io as io;

// Re-export commonly used types at crate root for convenience
pub use cyclebar_core::{
    Bar, Checkpoint, CycleBar, CycleId, Direction, FeatureMatrix, Orchestrator, Period,
    PipelineError, PipelineParams, Resampler, RunOutcome, RunReport, SeriesKey,
};

#[cfg(feature = "config")]
pub use cyclebar_config::Settings;

#[cfg(feature = "io")]
pub use cyclebar_io::FileStore;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
