//! # metronome
//!
//! Periodic telemetry recorder.
//!
//! metronome calls a user-supplied getter at a fixed rate on a background
//! thread and appends each reading, stamped with the current time, to an
//! in-memory columnar store. Recordings can be read back while they are
//! being taken, saved to a JSON file, reloaded later, and turned into
//! plot-ready curves.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Drift-free cadence: sample `k` is due at `start + k / rate`, so a slow
//!   sample does not push every later one back
//! - One timestamp column (`time`) added implicitly; all columns always have
//!   the same length
//! - `stop` joins the sampling thread, so no row lands after it returns
//! - Lock-protected store shared with readers through a cheap [`LiveSeries`] handle
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use metronome::{Recorder, Row, Value};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Declare the fields the getter reports; `time` is added for you
//! let mut recorder = Recorder::with_getter(&["power"], || {
//!     Ok(Row::from([("power".to_string(), Value::from(42.0))]))
//! })?;
//!
//! // Five samples per second for three seconds
//! recorder.start(5.0, Some(Duration::from_secs(3)))?;
//! recorder.wait()?;
//!
//! // Read back
//! for value in recorder.get("power")? {
//!     println!("{value}");
//! }
//!
//! // Persist and reload
//! recorder.save("power.json")?;
//! recorder.load("power.json")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Recorder`] - Owns the store and the sampling thread; start, stop, sample, save, load
//! - [`SeriesStore`] - Append-only columns, one per field
//! - [`LiveSeries`] - Thread-safe read-only view of a recorder's store
//! - [`SamplingConfig`] / [`Schedule`] - Rate, duration, and due-time arithmetic
//! - [`Curve`] - A field plotted against elapsed seconds
//!
//! ## Modules
//!
//! - [`recorder`] - Recorder lifecycle and the sampling loop
//! - [`series`] - Columnar storage and row/column access
//! - [`schedule`] - Sampling configuration, schedule, and clock
//! - [`value`] - Scalar values stored in a column
//! - [`persist`] - JSON recording files
//! - [`plot`] - Plot-ready curves
//! - [`error`] - Error types

pub mod error;
pub mod persist;
pub mod plot;
pub mod recorder;
pub mod schedule;
pub mod series;
pub mod value;

// Re-export primary API types at crate root for convenience.
pub use error::{BoxError, MetronomeError, Result};
pub use plot::Curve;
pub use recorder::{Getter, GetterResult, Recorder};
pub use schedule::{Clock, SamplingConfig, Schedule};
pub use series::{LiveSeries, RawSeries, Row, SeriesStore, TIME_FIELD};
pub use value::Value;
