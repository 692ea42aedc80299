use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use super::row::{NormalizedRow, RowData};
use crate::error::AppError;

/// A validated save request for one period.
#[derive(Debug, Clone)]
pub struct NewBatch {
    pub period: String,
    pub holidays: Vec<Value>,
    pub working_days: i64,
    pub rows: Vec<RowData>,
}

impl NewBatch {
    /// Rejects the request when any required field is absent. An empty row list is
    /// treated the same as a missing one.
    pub fn try_new(
        period: Option<String>,
        holidays: Option<Vec<Value>>,
        working_days: Option<i64>,
        rows: Option<Vec<RowData>>,
    ) -> Result<Self, AppError> {
        match (period, holidays, working_days, rows) {
            (Some(period), Some(holidays), Some(working_days), Some(rows))
                if !period.trim().is_empty() && !rows.is_empty() =>
            {
                Ok(Self {
                    period,
                    holidays,
                    working_days,
                    rows,
                })
            }
            _ => Err(AppError::Validation("Missing required fields".to_string())),
        }
    }

    /// Normalizes every row up front so a bad row fails before anything is written.
    pub fn normalized_rows(&self) -> Result<Vec<NormalizedRow>, AppError> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, raw)| NormalizedRow::from_raw(i, raw))
            .collect()
    }
}

/// Stored batch metadata.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: i64,
    pub period: String,
    pub holidays: Vec<Value>,
    pub working_days: i64,
    pub created_at: DateTime<Utc>,
}

/// One stored row as seen from its batch.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AttendanceRecord {
    #[schema(example = "Alice")]
    pub employee_name: String,
    #[schema(example = "Apollo", nullable = true)]
    pub project: Option<String>,
    #[schema(example = 19.5)]
    pub month_total: f64,
    #[schema(value_type = Object)]
    pub row_data: RowData,
}

/// One employee row joined with its batch metadata.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct EmployeeAttendance {
    #[schema(example = "May 2025")]
    pub period: String,
    #[schema(value_type = Vec<Object>)]
    pub holidays: Vec<Value>,
    #[schema(example = 20)]
    pub working_days: i64,
    #[schema(value_type = Object)]
    pub row_data: RowData,
}

/// A batch with all of its records.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MonthAttendance {
    #[schema(example = "May 2025")]
    pub period: String,
    #[schema(value_type = Vec<Object>)]
    pub holidays: Vec<Value>,
    #[schema(example = 20)]
    pub working_days: i64,
    pub records: Vec<AttendanceRecord>,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
}

impl MonthAttendance {
    pub fn from_parts(batch: Batch, records: Vec<AttendanceRecord>) -> Self {
        Self {
            period: batch.period,
            holidays: batch.holidays,
            working_days: batch.working_days,
            records,
            created_at: batch.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows() -> Vec<RowData> {
        vec![serde_json::from_value(json!({"EMPLOYEE_NAME": "Alice"})).unwrap()]
    }

    #[test]
    fn test_complete_request_is_accepted() {
        let batch = NewBatch::try_new(
            Some("May 2025".into()),
            Some(vec![]),
            Some(20),
            Some(rows()),
        )
        .unwrap();
        assert_eq!(batch.period, "May 2025");
        assert!(batch.holidays.is_empty());
    }

    #[test]
    fn test_missing_fields_are_rejected() {
        let cases = [
            NewBatch::try_new(None, Some(vec![]), Some(20), Some(rows())),
            NewBatch::try_new(Some("  ".into()), Some(vec![]), Some(20), Some(rows())),
            NewBatch::try_new(Some("May 2025".into()), None, Some(20), Some(rows())),
            NewBatch::try_new(Some("May 2025".into()), Some(vec![]), None, Some(rows())),
            NewBatch::try_new(Some("May 2025".into()), Some(vec![]), Some(20), None),
        ];
        for case in cases {
            assert!(matches!(case, Err(AppError::Validation(_))));
        }
    }

    #[test]
    fn test_empty_rows_rejected_like_missing_rows() {
        let err = NewBatch::try_new(Some("May 2025".into()), Some(vec![]), Some(20), Some(vec![]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields");
    }

    #[test]
    fn test_normalized_rows_stop_at_first_bad_row() {
        let batch = NewBatch::try_new(
            Some("May 2025".into()),
            Some(vec![]),
            Some(20),
            Some(vec![
                serde_json::from_value(json!({"EMPLOYEE_NAME": "Alice"})).unwrap(),
                serde_json::from_value(json!({"EMPLOYEE_NAME": "Bob", "Month_Total": "x"}))
                    .unwrap(),
            ]),
        )
        .unwrap();
        let err = batch.normalized_rows().unwrap_err();
        assert!(matches!(err, AppError::Parse(ref m) if m.contains("Row 1")));
    }
}
