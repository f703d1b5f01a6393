//! Columnar storage for recorded samples.
//!
//! A [`SeriesStore`] keeps one append-only column of [`Value`]s per declared
//! field. The implicit `time` column always comes first. Every column has the
//! same length at all times, so row `i` is simply the `i`-th value of every
//! column.
//!
//! # Overview
//!
//! - [`SeriesStore`] - the columns themselves, with append and read access
//! - [`LiveSeries`] - a cloneable, thread-safe read-only view of a store that
//!   is being appended to by a running recorder
//! - [`Row`] / [`RawSeries`] - the shapes data is handed out in
//!
//! # Example
//!
//! ```rust
//! use metronome::series::{Row, SeriesStore};
//! use metronome::Value;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = SeriesStore::new(&["power"])?;
//!
//! store.append(&Row::from([
//!     ("time".to_string(), Value::from(0.0)),
//!     ("power".to_string(), Value::from(5)),
//! ]))?;
//!
//! assert_eq!(store.fields(), ["time", "power"]);
//! assert_eq!(store.latest_time(), Some(0.0));
//! assert_eq!(store.row(-1)?["power"], Value::Int(5));
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{FieldError, IndexError, Result, SeriesError};
use crate::schedule::Clock;
use crate::value::Value;

/// Name of the implicit timestamp column.
pub const TIME_FIELD: &str = "time";

/// One sample: field name to value.
///
/// Used both as the input to [`SeriesStore::append`] (extra keys are ignored)
/// and as the output of [`SeriesStore::row`].
pub type Row = BTreeMap<String, Value>;

/// Ordered `(field, values)` pairs, one per declared field.
///
/// Returned by [`SeriesStore::slice`] and used as the persisted form.
pub type RawSeries = Vec<(String, Vec<Value>)>;

/// Append-only columnar store with an implicit `time` column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SeriesStore {
    /// Column names in declaration order, `time` first.
    fields: Vec<String>,
    /// Column values, parallel to `fields`.
    columns: Vec<Vec<Value>>,
}

impl SeriesStore {
    /// Creates an empty store declared with `time` followed by `fields`.
    ///
    /// # Errors
    ///
    /// - [`FieldError::ReservedField`] if `fields` contains `time`
    /// - [`FieldError::DuplicateField`] if a name appears twice
    pub fn new<S: AsRef<str>>(fields: &[S]) -> Result<Self> {
        let mut declared = Vec::with_capacity(fields.len() + 1);
        declared.push(TIME_FIELD.to_string());

        let mut seen = HashSet::with_capacity(fields.len());
        for field in fields {
            let field = field.as_ref();
            if field == TIME_FIELD {
                return Err(FieldError::ReservedField {
                    field: field.to_string(),
                }
                .into());
            }
            if !seen.insert(field) {
                return Err(FieldError::DuplicateField {
                    field: field.to_string(),
                }
                .into());
            }
            declared.push(field.to_string());
        }

        let columns = vec![Vec::new(); declared.len()];
        Ok(Self {
            fields: declared,
            columns,
        })
    }

    /// Returns the field names in declaration order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// Returns true if no rows have been appended.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends one row, taking each declared field's value from `row`.
    ///
    /// Keys in `row` that are not declared fields are ignored. The row is
    /// checked in full before any column grows, so a rejected row leaves the
    /// store untouched.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::MissingField`] naming the first declared field
    /// absent from `row`.
    pub fn append(&mut self, row: &Row) -> Result<()> {
        if let Some(missing) = self.fields.iter().find(|f| !row.contains_key(f.as_str())) {
            return Err(FieldError::MissingField {
                field: missing.clone(),
            }
            .into());
        }

        for (field, column) in self.fields.iter().zip(self.columns.iter_mut()) {
            // Presence checked above.
            if let Some(value) = row.get(field) {
                column.push(value.clone());
            }
        }

        Ok(())
    }

    /// Returns the timestamp of the newest row, or `None` if there is none.
    pub fn latest_time(&self) -> Option<f64> {
        self.column(TIME_FIELD)?.last()?.as_f64()
    }

    /// Returns every value recorded for `field`.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::UnknownField`] if `field` was never declared.
    pub fn get(&self, field: &str) -> Result<&[Value]> {
        self.column(field).map(Vec::as_slice).ok_or_else(|| {
            FieldError::UnknownField {
                field: field.to_string(),
            }
            .into()
        })
    }

    /// Returns the row at `index`; negative indices count from the end.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::RowOutOfRange`] if no such row exists.
    pub fn row(&self, index: isize) -> Result<Row> {
        let position = self.resolve_index(index)?;
        Ok(self
            .fields
            .iter()
            .zip(&self.columns)
            .map(|(field, column)| (field.clone(), column[position].clone()))
            .collect())
    }

    /// Returns every column restricted to `range`.
    ///
    /// Open-ended ranges are supported: `store.slice(10..)` yields rows 10
    /// through the newest.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::SliceOutOfRange`] if the range ends past the last
    /// row or starts after it ends.
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> Result<RawSeries> {
        let len = self.len();
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&e) => e.saturating_add(1),
            Bound::Excluded(&e) => e,
            Bound::Unbounded => len,
        };

        if start > end || end > len {
            return Err(IndexError::SliceOutOfRange { start, end, len }.into());
        }

        Ok(self
            .fields
            .iter()
            .zip(&self.columns)
            .map(|(field, column)| (field.clone(), column[start..end].to_vec()))
            .collect())
    }

    /// Returns a copy of the store in its raw persisted form.
    pub fn to_raw(&self) -> RawSeries {
        self.fields
            .iter()
            .cloned()
            .zip(self.columns.iter().cloned())
            .collect()
    }

    /// Replaces the entire contents of the store with `raw`.
    ///
    /// The field order of `raw` becomes the store's field order. `time` is
    /// not required to come first.
    ///
    /// # Errors
    ///
    /// - [`SeriesError::DuplicateColumn`] if a name appears twice
    /// - [`SeriesError::RaggedColumns`] if the columns differ in length
    ///
    /// On error the store is left unchanged.
    pub fn from_raw(&mut self, raw: RawSeries) -> Result<()> {
        let expected = raw.first().map_or(0, |(_, values)| values.len());
        let mut seen = HashSet::with_capacity(raw.len());

        for (field, values) in &raw {
            if !seen.insert(field.as_str()) {
                return Err(SeriesError::DuplicateColumn {
                    field: field.clone(),
                }
                .into());
            }
            if values.len() != expected {
                return Err(SeriesError::RaggedColumns {
                    field: field.clone(),
                    expected,
                    found: values.len(),
                }
                .into());
            }
        }

        let (fields, columns): (Vec<String>, Vec<Vec<Value>>) = raw.into_iter().unzip();
        self.fields = fields;
        self.columns = columns;
        Ok(())
    }

    fn column(&self, field: &str) -> Option<&Vec<Value>> {
        self.fields
            .iter()
            .position(|f| f == field)
            .map(|i| &self.columns[i])
    }

    fn resolve_index(&self, index: isize) -> Result<usize> {
        let len = self.len();
        let resolved = if index < 0 {
            len.checked_sub(index.unsigned_abs())
        } else {
            Some(index.unsigned_abs()).filter(|&i| i < len)
        };
        resolved.ok_or_else(|| IndexError::RowOutOfRange { index, len }.into())
    }
}

/// Thread-safe, read-only view of a store owned by a recorder.
///
/// Cloning is cheap (one `Arc` bump). Every accessor takes the read lock for
/// the duration of a single call and returns owned data, so a reader never
/// observes a half-appended row and never blocks the recorder for longer than
/// one copy.
#[derive(Debug, Clone)]
pub struct LiveSeries {
    inner: Arc<RwLock<SeriesStore>>,
}

impl LiveSeries {
    pub(crate) fn new(store: SeriesStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    /// Stamps `row` with the current time and appends it.
    ///
    /// The clock is read under the write lock, so rows from concurrent
    /// writers land in timestamp order.
    pub(crate) fn append_stamped(&self, mut row: Row, clock: &Clock) -> Result<()> {
        let mut store = self.inner.write();
        row.insert(TIME_FIELD.to_string(), Value::Float(clock.now()));
        store.append(&row)
    }

    /// Replaces the contents under the write lock.
    pub(crate) fn replace(&self, raw: RawSeries) -> Result<()> {
        self.inner.write().from_raw(raw)
    }

    /// Returns the field names in declaration order.
    pub fn fields(&self) -> Vec<String> {
        self.inner.read().fields().to_vec()
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns true if no rows have been recorded.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Returns the timestamp of the newest row.
    pub fn latest_time(&self) -> Option<f64> {
        self.inner.read().latest_time()
    }

    /// Returns a copy of every value recorded for `field`.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::UnknownField`] if `field` was never declared.
    pub fn get(&self, field: &str) -> Result<Vec<Value>> {
        self.inner.read().get(field).map(<[Value]>::to_vec)
    }

    /// Returns the row at `index`; negative indices count from the end.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::RowOutOfRange`] if no such row exists.
    pub fn row(&self, index: isize) -> Result<Row> {
        self.inner.read().row(index)
    }

    /// Returns every column restricted to `range`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::SliceOutOfRange`] if the range does not fit.
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> Result<RawSeries> {
        self.inner.read().slice(range)
    }

    /// Returns a consistent copy of the whole store.
    pub fn snapshot(&self) -> SeriesStore {
        self.inner.read().clone()
    }

    /// Returns the raw persisted form, taken under a single read lock.
    pub fn to_raw(&self) -> RawSeries {
        self.inner.read().to_raw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MetronomeError;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn power_store(samples: &[(f64, i64)]) -> SeriesStore {
        let mut store = SeriesStore::new(&["power"]).unwrap();
        for &(t, p) in samples {
            store
                .append(&row(&[("time", Value::from(t)), ("power", Value::from(p))]))
                .unwrap();
        }
        store
    }

    #[test]
    fn test_time_is_prepended() {
        let store = SeriesStore::new(&["power", "voltage"]).unwrap();
        assert_eq!(store.fields(), ["time", "power", "voltage"]);
        assert!(store.is_empty());
        assert_eq!(store.latest_time(), None);
    }

    #[test]
    fn test_reserved_time_rejected() {
        let err = SeriesStore::new(&["power", "time"]).unwrap_err();
        assert!(matches!(
            err,
            MetronomeError::Field(FieldError::ReservedField { ref field }) if field == "time"
        ));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let err = SeriesStore::new(&["power", "power"]).unwrap_err();
        assert!(matches!(
            err,
            MetronomeError::Field(FieldError::DuplicateField { .. })
        ));
    }

    #[test]
    fn test_append_ignores_extra_keys() {
        let mut store = SeriesStore::new(&["power"]).unwrap();
        store
            .append(&row(&[
                ("time", Value::from(1.0)),
                ("power", Value::from(3)),
                ("unrelated", Value::from("x")),
            ]))
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.fields(), ["time", "power"]);
    }

    #[test]
    fn test_missing_field_commits_nothing() {
        let mut store = power_store(&[(0.0, 5)]);

        let err = store.append(&row(&[("time", Value::from(1.0))])).unwrap_err();
        match err {
            MetronomeError::Field(FieldError::MissingField { field }) => assert_eq!(field, "power"),
            other => panic!("expected MissingField, got {other:?}"),
        }

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("time").unwrap().len(), 1);
        assert_eq!(store.get("power").unwrap().len(), 1);
    }

    #[test]
    fn test_get_unknown_field() {
        let store = power_store(&[]);
        assert!(matches!(
            store.get("voltage"),
            Err(MetronomeError::Field(FieldError::UnknownField { .. }))
        ));
    }

    #[test]
    fn test_row_positive_and_negative_indices() {
        let store = power_store(&[(0.0, 5), (1.0, 7), (2.0, 9)]);

        assert_eq!(store.row(0).unwrap()["power"], Value::Int(5));
        assert_eq!(store.row(2).unwrap()["power"], Value::Int(9));
        assert_eq!(store.row(-1).unwrap()["power"], Value::Int(9));
        assert_eq!(store.row(-3).unwrap()["time"], Value::Float(0.0));
        assert_eq!(store.latest_time(), Some(2.0));
    }

    #[test]
    fn test_row_out_of_range() {
        let store = power_store(&[(0.0, 5), (1.0, 7)]);

        for index in [2, 10, -3] {
            match store.row(index) {
                Err(MetronomeError::Index(IndexError::RowOutOfRange { index: i, len })) => {
                    assert_eq!(i, index);
                    assert_eq!(len, 2);
                }
                other => panic!("expected RowOutOfRange for {index}, got {other:?}"),
            }
        }
        assert!(power_store(&[]).row(0).is_err());
        assert!(power_store(&[]).row(-1).is_err());
    }

    #[test]
    fn test_slice_ranges() {
        let store = power_store(&[(0.0, 1), (1.0, 2), (2.0, 3), (3.0, 4)]);

        let tail = store.slice(2..).unwrap();
        assert_eq!(tail[0].0, "time");
        assert_eq!(tail[1].1, vec![Value::Int(3), Value::Int(4)]);

        let head = store.slice(..1).unwrap();
        assert_eq!(head[1].1, vec![Value::Int(1)]);

        let middle = store.slice(1..=2).unwrap();
        assert_eq!(middle[1].1, vec![Value::Int(2), Value::Int(3)]);

        let all = store.slice(..).unwrap();
        assert_eq!(all, store.to_raw());

        assert_eq!(store.slice(4..).unwrap()[0].1, Vec::<Value>::new());
    }

    #[test]
    fn test_slice_out_of_range() {
        let store = power_store(&[(0.0, 1), (1.0, 2)]);
        assert!(matches!(
            store.slice(1..5),
            Err(MetronomeError::Index(IndexError::SliceOutOfRange { start: 1, end: 5, len: 2 }))
        ));
        #[allow(clippy::reversed_empty_ranges)]
        let inverted = store.slice(2..1);
        assert!(inverted.is_err());
        assert!(store.slice(3..).is_err());
    }

    #[test]
    fn test_from_raw_replaces_contents() {
        let mut store = power_store(&[(0.0, 5)]);
        let raw = vec![
            ("voltage".to_string(), vec![Value::from(120.0), Value::from(121.0)]),
            ("time".to_string(), vec![Value::from(10.0), Value::from(11.0)]),
        ];

        store.from_raw(raw.clone()).unwrap();

        assert_eq!(store.fields(), ["voltage", "time"]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.latest_time(), Some(11.0));
        assert_eq!(store.to_raw(), raw);
    }

    #[test]
    fn test_from_raw_rejects_ragged_columns() {
        let mut store = power_store(&[(0.0, 5)]);
        let before = store.clone();
        let raw = vec![
            ("time".to_string(), vec![Value::from(0.0), Value::from(1.0)]),
            ("power".to_string(), vec![Value::from(5)]),
        ];

        let err = store.from_raw(raw).unwrap_err();
        assert!(matches!(
            err,
            MetronomeError::Series(SeriesError::RaggedColumns { expected: 2, found: 1, .. })
        ));
        assert_eq!(store, before);
    }

    #[test]
    fn test_from_raw_rejects_duplicate_columns() {
        let mut store = SeriesStore::default();
        let raw = vec![
            ("time".to_string(), vec![]),
            ("time".to_string(), vec![]),
        ];
        assert!(matches!(
            store.from_raw(raw),
            Err(MetronomeError::Series(SeriesError::DuplicateColumn { .. }))
        ));
    }

    #[test]
    fn test_live_series_sees_appends() {
        let live = LiveSeries::new(SeriesStore::new(&["power"]).unwrap());
        let reader = live.clone();

        live.append_stamped(row(&[("power", Value::from(2))]), &Clock::new())
            .unwrap();

        assert_eq!(reader.len(), 1);
        assert_eq!(reader.get("power").unwrap(), vec![Value::Int(2)]);
        assert!(reader.latest_time().is_some());
        assert_eq!(reader.snapshot().len(), 1);
    }

    #[test]
    fn test_concurrent_writers_keep_time_ordered() {
        let live = LiveSeries::new(SeriesStore::new(&["writer"]).unwrap());
        let clock = Clock::new();

        let writers: Vec<_> = (0..4)
            .map(|id| {
                let live = live.clone();
                std::thread::spawn(move || {
                    for _ in 0..2_000 {
                        live.append_stamped(row(&[("writer", Value::from(id))]), &clock)
                            .unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let times: Vec<f64> = live
            .get("time")
            .unwrap()
            .iter()
            .map(|t| t.as_f64().unwrap())
            .collect();
        assert_eq!(times.len(), 8_000);
        assert!(times.windows(2).all(|w| w[0] <= w[1]), "time went backwards");
    }
}
