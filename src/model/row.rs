use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Number;

use crate::error::AppError;

pub const EMPLOYEE_NAME_KEY: &str = "EMPLOYEE_NAME";
pub const PROJECT_KEY: &str = "PROJECT";
pub const MONTH_TOTAL_KEY: &str = "Month_Total";

/// A single cell of a submitted attendance row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowValue {
    Text(String),
    Number(Number),
    Null,
}

/// Column name → value, in submission order; columns are not schema-fixed.
pub type RowData = IndexMap<String, RowValue>;

/// A row after key normalization with the typed fields pulled out.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub employee_name: String,
    pub project: Option<String>,
    pub month_total: f64,
    pub row_data: RowData,
}

/// Replace every space in a column name with an underscore.
pub fn normalize_key(key: &str) -> String {
    key.replace(' ', "_")
}

impl NormalizedRow {
    /// `index` is only used to point at the offending row in error messages.
    ///
    /// When two raw keys normalize to the same name, the later one's value wins
    /// and the column keeps the position of the first.
    pub fn from_raw(index: usize, raw: &RowData) -> Result<Self, AppError> {
        let row_data: RowData = raw
            .iter()
            .map(|(k, v)| (normalize_key(k), v.clone()))
            .collect();

        let employee_name = match row_data.get(EMPLOYEE_NAME_KEY) {
            Some(RowValue::Text(name)) => name.clone(),
            Some(RowValue::Number(_)) => {
                return Err(AppError::Validation(format!(
                    "Row {index}: {EMPLOYEE_NAME_KEY} must be a string"
                )));
            }
            Some(RowValue::Null) | None => {
                return Err(AppError::Validation(format!(
                    "Row {index}: {EMPLOYEE_NAME_KEY} is required"
                )));
            }
        };

        let project = project_of(&row_data);
        let month_total = parse_month_total(index, row_data.get(MONTH_TOTAL_KEY))?;

        Ok(Self {
            employee_name,
            project,
            month_total,
            row_data,
        })
    }
}

/// The `PROJECT` column as stored in the record's `project` field.
pub fn project_of(row_data: &RowData) -> Option<String> {
    match row_data.get(PROJECT_KEY) {
        Some(RowValue::Text(p)) => Some(p.clone()),
        Some(RowValue::Number(n)) => Some(n.to_string()),
        Some(RowValue::Null) | None => None,
    }
}

/// Missing, null and blank values count as 0; anything else must be a finite number.
fn parse_month_total(index: usize, value: Option<&RowValue>) -> Result<f64, AppError> {
    match value {
        None | Some(RowValue::Null) => Ok(0.0),
        Some(RowValue::Number(n)) => n.as_f64().ok_or_else(|| {
            AppError::Parse(format!("Row {index}: {MONTH_TOTAL_KEY} {n} is out of range"))
        }),
        Some(RowValue::Text(s)) if s.trim().is_empty() => Ok(0.0),
        Some(RowValue::Text(s)) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(AppError::Parse(format!(
                "Row {index}: {MONTH_TOTAL_KEY} {s:?} is not a number"
            ))),
        },
    }
}
