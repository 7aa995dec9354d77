//! In-memory time series table with named, nullable columns.

use std::io::Write;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CSV_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Text,
    Timestamp,
    Float,
}

/// A single column. `None` cells are the missing-value marker.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Text(Vec<Option<String>>),
    Timestamp(Vec<Option<NaiveDateTime>>),
    Float(Vec<Option<f64>>),
}

impl Column {
    pub fn text<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Text(values.into_iter().map(|v| Some(v.into())).collect())
    }

    pub fn float<I>(values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        Self::Float(values.into_iter().map(Some).collect())
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Self::Text(_) => ColumnKind::Text,
            Self::Timestamp(_) => ColumnKind::Timestamp,
            Self::Float(_) => ColumnKind::Float,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Text(cells) => cells.len(),
            Self::Timestamp(cells) => cells.len(),
            Self::Float(cells) => cells.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shifts cells forward by `periods` rows, filling the head with missing
    /// cells. Length and type are preserved.
    pub fn shifted(&self, periods: usize) -> Self {
        match self {
            Self::Text(cells) => Self::Text(shift_cells(cells, periods)),
            Self::Timestamp(cells) => Self::Timestamp(shift_cells(cells, periods)),
            Self::Float(cells) => Self::Float(shift_cells(cells, periods)),
        }
    }

    fn csv_cell(&self, row: usize) -> String {
        match self {
            Self::Text(cells) => cells[row].clone().unwrap_or_default(),
            Self::Timestamp(cells) => cells[row]
                .map(|ts| ts.format(CSV_TIMESTAMP_FORMAT).to_string())
                .unwrap_or_default(),
            Self::Float(cells) => cells[row].map(|v| v.to_string()).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("column {name} has {found} rows, frame has {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ordered set of equal-length named columns.
///
/// Inserting under an existing name replaces that column in place; a new
/// name is appended after the existing columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeriesFrame {
    names: Vec<String>,
    columns: Vec<Column>,
}

impl TimeSeriesFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(
        mut self,
        name: impl Into<String>,
        column: Column,
    ) -> Result<Self, FrameError> {
        self.insert_column(name, column)?;
        Ok(self)
    }

    pub fn insert_column(
        &mut self,
        name: impl Into<String>,
        column: Column,
    ) -> Result<(), FrameError> {
        let name = name.into();
        if !self.columns.is_empty() && column.len() != self.height() {
            return Err(FrameError::LengthMismatch {
                name,
                expected: self.height(),
                found: column.len(),
            });
        }

        match self.position(&name) {
            Some(idx) => self.columns[idx] = column,
            None => {
                self.names.push(name);
                self.columns.push(column);
            }
        }
        Ok(())
    }

    /// Removes a column by name, returning it if present.
    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        let idx = self.position(name)?;
        self.names.remove(idx);
        Some(self.columns.remove(idx))
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.position(name).map(|idx| &self.columns[idx])
    }

    pub fn float_column(&self, name: &str) -> Option<&[Option<f64>]> {
        match self.column(name)? {
            Column::Float(cells) => Some(cells),
            _ => None,
        }
    }

    pub fn contains_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.names.iter().map(String::as_str).collect()
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.height() == 0
    }

    /// Writes the frame as CSV with a header row. Missing cells are empty.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), FrameError> {
        let mut out = csv::Writer::from_writer(writer);
        out.write_record(&self.names)?;
        for row in 0..self.height() {
            out.write_record(self.columns.iter().map(|column| column.csv_cell(row)))?;
        }
        out.flush()?;
        Ok(())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|existing| existing == name)
    }
}

fn shift_cells<T: Clone>(cells: &[Option<T>], periods: usize) -> Vec<Option<T>> {
    let lead = periods.min(cells.len());
    let mut out = Vec::with_capacity(cells.len());
    out.resize(lead, None);
    out.extend(cells[..cells.len() - lead].iter().cloned());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn insert_replaces_in_place_and_appends_new_names() {
        let mut frame = TimeSeriesFrame::new()
            .with_column("a", Column::float([1.0, 2.0]))
            .unwrap()
            .with_column("b", Column::float([3.0, 4.0]))
            .unwrap();

        frame.insert_column("a", Column::float([9.0, 9.0])).unwrap();
        frame.insert_column("c", Column::float([0.0, 0.0])).unwrap();

        assert_eq!(frame.column_names(), vec!["a", "b", "c"]);
        assert_eq!(frame.float_column("a"), Some(&[Some(9.0), Some(9.0)][..]));
    }

    #[test]
    fn insert_rejects_length_mismatch() {
        let mut frame = TimeSeriesFrame::new()
            .with_column("a", Column::float([1.0, 2.0]))
            .unwrap();

        let err = frame
            .insert_column("b", Column::float([1.0]))
            .expect_err("length mismatch");
        assert!(matches!(
            err,
            FrameError::LengthMismatch {
                expected: 2,
                found: 1,
                ..
            }
        ));
        assert_eq!(frame.width(), 1);
    }

    #[test]
    fn drop_column_removes_name_and_cells() {
        let mut frame = TimeSeriesFrame::new()
            .with_column("a", Column::float([1.0]))
            .unwrap()
            .with_column("b", Column::float([2.0]))
            .unwrap();

        assert_eq!(frame.drop_column("a"), Some(Column::float([1.0])));
        assert_eq!(frame.drop_column("missing"), None);
        assert_eq!(frame.column_names(), vec!["b"]);
        assert_eq!(frame.height(), 1);
    }

    #[test]
    fn shifted_pads_head_with_missing() {
        let column = Column::float([1.0, 2.0, 3.0]);
        assert_eq!(
            column.shifted(1),
            Column::Float(vec![None, Some(1.0), Some(2.0)])
        );
        assert_eq!(column.shifted(0), column);
        assert_eq!(column.shifted(5), Column::Float(vec![None, None, None]));
    }

    #[test]
    fn write_csv_formats_cells() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(13, 30, 0)
            .unwrap();
        let frame = TimeSeriesFrame::new()
            .with_column("ds", Column::Timestamp(vec![Some(ts), None]))
            .unwrap()
            .with_column("y", Column::Float(vec![Some(1.5), None]))
            .unwrap();

        let mut buf = Vec::new();
        frame.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "ds,y\n2024-03-05 13:30:00,1.5\n,\n");
    }
}
