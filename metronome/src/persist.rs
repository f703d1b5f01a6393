//! Saving and loading recordings as JSON.
//!
//! A recording file is a JSON array of `[field, [values...]]` pairs in field
//! order, `time` first:
//!
//! ```json
//! [["time",[0.0,1.0]],["power",[5,7]]]
//! ```
//!
//! Floats are written with enough digits to reload bit-for-bit. Non-finite
//! floats have no JSON form and are written as `null`.

use std::path::Path;

use crate::error::{PersistError, Result};
use crate::series::{RawSeries, SeriesStore};

/// Writes `raw` to `path`, replacing any existing file.
///
/// # Errors
///
/// Returns [`PersistError::Serialize`] or [`PersistError::Write`] naming
/// `path`.
pub fn write_raw(path: &Path, raw: &RawSeries) -> Result<()> {
    let json = serde_json::to_vec(raw).map_err(|source| PersistError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;

    std::fs::write(path, json).map_err(|source| PersistError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(())
}

/// Reads a recording file from `path`.
///
/// The columns are returned as stored; use
/// [`SeriesStore::from_raw`] to check them.
///
/// # Errors
///
/// Returns [`PersistError::Read`] or [`PersistError::Parse`] naming `path`.
pub fn read_raw(path: &Path) -> Result<RawSeries> {
    let json = std::fs::read_to_string(path).map_err(|source| PersistError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let raw = serde_json::from_str(&json).map_err(|source| PersistError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(raw)
}

impl SeriesStore {
    /// Writes the store to `path` as JSON.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistError`] naming `path` if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_raw(path.as_ref(), &self.to_raw())
    }

    /// Opens a saved recording for offline inspection or plotting.
    ///
    /// # Errors
    ///
    /// - a [`PersistError`] naming `path` if the file cannot be read or parsed
    /// - a [`SeriesError`](crate::error::SeriesError) if its columns differ in
    ///   length or repeat
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = read_raw(path.as_ref())?;
        let mut store = Self::default();
        store.from_raw(raw)?;
        Ok(store)
    }
}
