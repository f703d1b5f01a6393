//! Plot-ready curves extracted from a recording.
//!
//! Rendering is left to the caller. This module only turns columns into
//! `(elapsed seconds, value)` point lists, which any plotting library can
//! draw. The x axis is `time - time[0]`.

use serde::Serialize;

use crate::error::{FieldError, MetronomeError, Result};
use crate::series::{SeriesStore, TIME_FIELD};

/// One field plotted against elapsed time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Curve {
    /// The plotted field.
    pub field: String,
    /// `[elapsed seconds, value]` points in row order.
    ///
    /// Rows where either coordinate has no numeric view are skipped.
    pub points: Vec<[f64; 2]>,
}

impl Curve {
    /// Returns true if no row had a numeric value for this field.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Returns seconds since the first sample for every row.
///
/// Rows whose `time` is not numeric yield `None`.
pub fn elapsed(store: &SeriesStore) -> Vec<Option<f64>> {
    let Ok(times) = store.get(TIME_FIELD) else {
        return Vec::new();
    };
    let origin = times.first().and_then(|t| t.as_f64());
    times
        .iter()
        .map(|t| Some(t.as_f64()? - origin?))
        .collect()
}

/// Returns one curve per non-time field, in field order.
pub fn curves(store: &SeriesStore) -> Vec<Curve> {
    let elapsed = elapsed(store);
    store
        .fields()
        .iter()
        .filter(|field| field.as_str() != TIME_FIELD)
        .filter_map(|field| curve(store, field, &elapsed))
        .collect()
}

/// Returns one curve per requested field, in the order requested.
///
/// # Errors
///
/// Returns [`FieldError::UnknownField`] if a field is not in the store.
pub fn curves_for<S: AsRef<str>>(store: &SeriesStore, fields: &[S]) -> Result<Vec<Curve>> {
    let elapsed = elapsed(store);
    fields
        .iter()
        .map(|field| {
            let field = field.as_ref();
            curve(store, field, &elapsed).ok_or_else(|| {
                MetronomeError::from(FieldError::UnknownField {
                    field: field.to_string(),
                })
            })
        })
        .collect()
}

fn curve(store: &SeriesStore, field: &str, elapsed: &[Option<f64>]) -> Option<Curve> {
    let values = store.get(field).ok()?;
    let points = elapsed
        .iter()
        .zip(values)
        .filter_map(|(x, y)| Some([(*x)?, y.as_f64()?]))
        .collect();
    Some(Curve {
        field: field.to_string(),
        points,
    })
}
