use crate::error::CoreError;
use chrono::NaiveDate;
use serde::Serialize;

/// A date-indexed table of `f64` columns.
///
/// Frames built with [`DailyFrame::zeroed`] hold one row per calendar day of
/// their span. Filtering and slicing keep the index sorted but may leave gaps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyFrame {
    index: Vec<NaiveDate>,
    columns: Vec<String>,
    /// Row-major cells, `index.len() * columns.len()` long.
    cells: Vec<f64>,
}

/// Per-ticker allocation weights, one column per held ticker.
pub type AllocationSeries = DailyFrame;

/// Portfolio capital value in a single `capital` column.
pub type PortfolioValueSeries = DailyFrame;

impl DailyFrame {
    /// Builds a frame covering every calendar day in `[start, end]`, all cells 0.0.
    ///
    /// An inverted span produces an empty frame.
    pub fn zeroed(start: NaiveDate, end: NaiveDate, columns: Vec<String>) -> Self {
        let index: Vec<NaiveDate> = start.iter_days().take_while(|day| *day <= end).collect();
        let cells = vec![0.0; index.len() * columns.len()];
        Self { index, columns, cells }
    }

    /// Builds a frame from explicit rows. The index must be strictly increasing
    /// and every row must have one value per column.
    pub fn from_rows(
        index: Vec<NaiveDate>,
        columns: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self, CoreError> {
        if index.len() != rows.len() {
            return Err(CoreError::InvalidInput(
                "frame rows".to_string(),
                format!("{} dates but {} rows", index.len(), rows.len()),
            ));
        }
        if let Some(pair) = index.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(CoreError::InvalidInput(
                "frame index".to_string(),
                format!("{} is not before {}", pair[0], pair[1]),
            ));
        }

        let mut cells = Vec::with_capacity(rows.len() * columns.len());
        for (date, row) in index.iter().zip(rows) {
            if row.len() != columns.len() {
                return Err(CoreError::InvalidInput(
                    "frame row".to_string(),
                    format!("{date} has {} values for {} columns", row.len(), columns.len()),
                ));
            }
            cells.extend(row);
        }

        Ok(Self { index, columns, cells })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[NaiveDate] {
        &self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Row position of `date`, if present in the index.
    pub fn position(&self, date: NaiveDate) -> Option<usize> {
        self.index.binary_search(&date).ok()
    }

    pub fn row(&self, position: usize) -> Option<&[f64]> {
        let width = self.columns.len();
        let start = position.checked_mul(width)?;
        self.cells.get(start..start + width)
    }

    pub fn rows(&self) -> impl Iterator<Item = (NaiveDate, &[f64])> + '_ {
        let width = self.columns.len().max(1);
        self.index
            .iter()
            .copied()
            .zip(self.cells.chunks(width).chain(std::iter::repeat(&[][..])))
    }

    pub fn get(&self, date: NaiveDate, column: &str) -> Option<f64> {
        let col = self.column_index(column)?;
        self.row(self.position(date)?).map(|row| row[col])
    }

    /// Overwrites one cell. Returns `false` when the date or column is outside the frame.
    pub fn set(&mut self, date: NaiveDate, column: usize, value: f64) -> bool {
        let width = self.columns.len();
        match self.position(date) {
            Some(row) if column < width => {
                self.cells[row * width + column] = value;
                true
            }
            _ => false,
        }
    }

    /// All values of one column, in index order.
    pub fn column(&self, column: usize) -> Option<Vec<f64>> {
        let width = self.columns.len();
        (column < width).then(|| self.cells.iter().skip(column).step_by(width).copied().collect())
    }

    /// Keeps only the rows for which `keep` returns true.
    pub fn filter_rows(&self, mut keep: impl FnMut(&[f64]) -> bool) -> Self {
        let mut index = Vec::new();
        let mut cells = Vec::new();
        for (date, row) in self.rows() {
            if keep(row) {
                index.push(date);
                cells.extend_from_slice(row);
            }
        }
        Self { index, columns: self.columns.clone(), cells }
    }

    /// The rows from `position` (inclusive) to the end.
    pub fn slice_from(&self, position: usize) -> Self {
        let start = position.min(self.index.len());
        let width = self.columns.len();
        Self {
            index: self.index[start..].to_vec(),
            columns: self.columns.clone(),
            cells: self.cells[start * width..].to_vec(),
        }
    }
}
