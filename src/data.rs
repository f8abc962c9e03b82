use ndarray::{Array1, ArrayView1};
use thiserror::Error;

pub const RT_COLUMN: &str = "rt";
pub const RESPONSE_COLUMN: &str = "response";

/// Errors raised while assembling or validating trial data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("Data must contain at least one trial.")]
    Empty,

    #[error("Column `{column}` has {found} rows but the data has {expected} trials.")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("Column `{column}` is already present in the data.")]
    DuplicateColumn { column: String },

    #[error("Response at trial {index} is {value}; responses must be coded as -1/1 (or 0/1).")]
    InvalidResponse { index: usize, value: f64 },

    #[error("Response time at trial {index} is {value}; response times must be finite and positive.")]
    InvalidRt { index: usize, value: f64 },
}

/// Column-major store of trial data: mandatory `rt` and `response` columns
/// plus arbitrary covariate columns referenceable from regression formulas.
///
/// Responses are recoded to -1/1 on construction; 0/1 coding is accepted.
#[derive(Debug, Clone)]
pub struct Data {
    columns: Vec<(String, Array1<f64>)>,
    n_trials: usize,
}

impl Data {
    pub fn new(rt: Vec<f64>, response: Vec<f64>) -> Result<Self, DataError> {
        if rt.is_empty() {
            return Err(DataError::Empty);
        }
        if response.len() != rt.len() {
            return Err(DataError::LengthMismatch {
                column: RESPONSE_COLUMN.to_string(),
                expected: rt.len(),
                found: response.len(),
            });
        }
        for (index, &value) in rt.iter().enumerate() {
            if !value.is_finite() || value <= 0.0 {
                return Err(DataError::InvalidRt { index, value });
            }
        }
        let mut coded = Vec::with_capacity(response.len());
        for (index, &value) in response.iter().enumerate() {
            let c = match value {
                v if v == 1.0 => 1.0,
                v if v == -1.0 || v == 0.0 => -1.0,
                other => return Err(DataError::InvalidResponse { index, value: other }),
            };
            coded.push(c);
        }
        let n_trials = rt.len();
        Ok(Self {
            columns: vec![
                (RT_COLUMN.to_string(), Array1::from_vec(rt)),
                (RESPONSE_COLUMN.to_string(), Array1::from_vec(coded)),
            ],
            n_trials,
        })
    }

    /// Attach a covariate column, builder style.
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<Self, DataError> {
        let name = name.into();
        if self.has_column(&name) {
            return Err(DataError::DuplicateColumn { column: name });
        }
        if values.len() != self.n_trials {
            return Err(DataError::LengthMismatch {
                column: name,
                expected: self.n_trials,
                found: values.len(),
            });
        }
        self.columns.push((name, Array1::from_vec(values)));
        Ok(self)
    }

    pub fn n_trials(&self) -> usize {
        self.n_trials
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.view())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn rt(&self) -> ArrayView1<'_, f64> {
        self.column(RT_COLUMN).expect("rt column always present")
    }

    pub fn response(&self) -> ArrayView1<'_, f64> {
        self.column(RESPONSE_COLUMN)
            .expect("response column always present")
    }

    /// Sorted distinct values of a column, used to enumerate random-effect
    /// group levels.
    pub fn unique_levels(&self, name: &str) -> Option<Vec<f64>> {
        let col = self.column(name)?;
        let mut levels: Vec<f64> = col.to_vec();
        levels.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        levels.dedup();
        Some(levels)
    }
}
