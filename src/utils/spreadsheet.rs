//! Spreadsheet upload → CSV text, with the attendance code substitutions applied.

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{CellErrorType, Data, Reader, open_workbook_auto_from_rs};
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};

use crate::error::AppError;

/// Marks a half day anywhere in a cell.
const HALF_DAY_MARKER: &str = "HD";
/// A cell holding exactly this is a leave day.
const LEAVE_MARKER: &str = "L";

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Int(i64),
    Float(f64),
}

impl CellValue {
    fn render(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Int(i) => i.to_string(),
            CellValue::Float(f) => f.to_string(),
        }
    }

    /// Half-day marker wins over the leave marker.
    fn substitute(self) -> Self {
        match self {
            CellValue::Text(s) if s.contains(HALF_DAY_MARKER) => CellValue::Float(0.5),
            CellValue::Text(s) if s == LEAVE_MARKER => CellValue::Int(0),
            other => other,
        }
    }
}

/// First sheet of an upload, keyed by its header row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Table {
    pub fn to_csv(&self) -> Result<String, AppError> {
        if self.headers.is_empty() {
            return Ok(String::new());
        }

        let mut wtr = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        wtr.write_record(&self.headers).map_err(csv_error)?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(CellValue::render))
                .map_err(csv_error)?;
        }

        let bytes = wtr
            .into_inner()
            .map_err(|e| AppError::Internal(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| AppError::Internal(e.to_string()))
    }
}

fn csv_error(e: csv::Error) -> AppError {
    tracing::error!(error = %e, "Failed to write CSV");
    AppError::Internal(e.to_string())
}

/// Parses the first sheet of `bytes` and returns it as CSV text.
pub fn normalize_spreadsheet(bytes: &[u8]) -> Result<String, AppError> {
    read_first_sheet(bytes)?.to_csv()
}

pub fn read_first_sheet(bytes: &[u8]) -> Result<Table, AppError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| AppError::Parse(format!("Failed to read Excel: {e}")))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::Parse("Failed to read Excel: workbook has no sheets".to_string()))?
        .map_err(|e| AppError::Parse(format!("Failed to read Excel: {e}")))?;

    // the used range may start right of column A; columns are still counted from A
    let lead = range.start().map_or(0, |(_, col)| col as usize);

    let mut rows = range.rows().filter(|row| !is_blank(row));
    let Some(header_row) = rows.next() else {
        return Ok(Table::default());
    };

    let header_row: Vec<Data> = std::iter::repeat_n(Data::Empty, lead)
        .chain(header_row.iter().cloned())
        .collect();
    let headers = unique_headers(&header_row);
    let rows = rows
        .map(|row| {
            std::iter::repeat_n(CellValue::Text(String::new()), lead)
                .chain(row.iter().map(|cell| cell_value(cell).substitute()))
                .collect()
        })
        .collect();

    Ok(Table { headers, rows })
}

fn is_blank(row: &[Data]) -> bool {
    row.iter().all(|cell| matches!(cell, Data::Empty))
}

/// Blank headers become `Unnamed: <col>`, repeats get `.1`, `.2`, ...
fn unique_headers(row: &[Data]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    row.iter()
        .enumerate()
        .map(|(col, cell)| {
            let mut name = cell_value(cell).render();
            if name.is_empty() {
                name = format!("Unnamed: {col}");
            }
            let count = seen.entry(name.clone()).or_insert(0);
            let unique = if *count == 0 {
                name
            } else {
                format!("{name}.{count}")
            };
            *count += 1;
            unique
        })
        .collect()
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Text(String::new()),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => float_value(*f),
        Data::Bool(b) => CellValue::Text(if *b { "True" } else { "False" }.to_string()),
        Data::DateTime(dt) if dt.is_datetime() => CellValue::Text(
            excel_serial_to_datetime(dt.as_f64())
                .map(format_datetime)
                .unwrap_or_else(|| dt.as_f64().to_string()),
        ),
        Data::DateTime(dt) => float_value(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(CellErrorType::NA) => CellValue::Text(String::new()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}

/// Whole numbers print without a fractional part.
fn float_value(f: f64) -> CellValue {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        CellValue::Int(f as i64)
    } else {
        CellValue::Float(f)
    }
}

/// Excel's 1900 date system, counted from 1899-12-30.
fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

fn format_datetime(dt: NaiveDateTime) -> String {
    if dt.num_seconds_from_midnight() == 0 {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    /// Builds an xlsx in memory; `None` leaves the cell blank.
    pub(crate) fn xlsx(rows: &[&[Option<&str>]]) -> Vec<u8> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                if let Some(value) = cell {
                    sheet.write_string(r as u32, c as u16, *value).unwrap();
                }
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn test_substitution_rules() {
        let bytes = xlsx(&[
            &[Some("EMPLOYEE NAME"), Some("1"), Some("2"), Some("3"), Some("4")],
            &[Some("Alice"), Some("2 HD"), Some("L"), Some("P"), None],
        ]);
        let table = read_first_sheet(&bytes).unwrap();

        assert_eq!(table.headers, ["EMPLOYEE NAME", "1", "2", "3", "4"]);
        assert_eq!(
            table.rows[0],
            vec![
                CellValue::Text("Alice".into()),
                CellValue::Float(0.5),
                CellValue::Int(0),
                CellValue::Text("P".into()),
                CellValue::Text(String::new()),
            ]
        );
    }

    #[test]
    fn test_csv_output() {
        let bytes = xlsx(&[
            &[Some("EMPLOYEE NAME"), Some("PROJECT"), Some("1"), Some("2")],
            &[Some("Alice"), Some("Apollo, Phase 2"), Some("HD"), Some("L")],
            &[Some("Bob"), None, Some("P"), Some("LL")],
        ]);
        let csv = normalize_spreadsheet(&bytes).unwrap();
        assert_eq!(
            csv,
            "EMPLOYEE NAME,PROJECT,1,2\nAlice,\"Apollo, Phase 2\",0.5,0\nBob,,P,LL\n"
        );
    }

    #[test]
    fn test_half_day_is_case_sensitive_substring() {
        assert_eq!(
            CellValue::Text("morning HD only".into()).substitute(),
            CellValue::Float(0.5)
        );
        assert_eq!(
            CellValue::Text("hd".into()).substitute(),
            CellValue::Text("hd".into())
        );
        assert_eq!(
            CellValue::Text(" L".into()).substitute(),
            CellValue::Text(" L".into())
        );
    }

    #[test]
    fn test_numbers_are_not_substituted() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "A").unwrap();
        sheet.write_string(0, 1, "B").unwrap();
        sheet.write_number(1, 0, 8.0).unwrap();
        sheet.write_number(1, 1, 7.25).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        assert_eq!(normalize_spreadsheet(&bytes).unwrap(), "A,B\n8,7.25\n");
    }

    #[test]
    fn test_blank_and_duplicate_headers() {
        let bytes = xlsx(&[
            &[Some("Day"), None, Some("Day"), Some("Day")],
            &[Some("P"), Some("P"), Some("P"), Some("P")],
        ]);
        let table = read_first_sheet(&bytes).unwrap();
        assert_eq!(table.headers, ["Day", "Unnamed: 1", "Day.1", "Day.2"]);
    }

    #[test]
    fn test_blank_rows_are_skipped() {
        let bytes = xlsx(&[
            &[Some("EMPLOYEE NAME"), Some("1")],
            &[Some("Alice"), Some("P")],
            &[None, None],
            &[Some("Bob"), Some("L")],
        ]);
        let table = read_first_sheet(&bytes).unwrap();
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn test_columns_count_from_column_a() {
        let bytes = xlsx(&[
            &[None, None, Some("EMPLOYEE NAME"), None],
            &[None, None, Some("Alice"), Some("HD")],
        ]);
        assert_eq!(
            normalize_spreadsheet(&bytes).unwrap(),
            "Unnamed: 0,Unnamed: 1,EMPLOYEE NAME,Unnamed: 3\n,,Alice,0.5\n"
        );
    }

    #[test]
    fn test_header_is_first_non_blank_row() {
        let bytes = xlsx(&[
            &[None],
            &[None, None],
            &[Some("EMPLOYEE NAME"), Some("1")],
            &[Some("Bob"), Some("L")],
        ]);
        let table = read_first_sheet(&bytes).unwrap();
        assert_eq!(table.headers, ["EMPLOYEE NAME", "1"]);
        assert_eq!(
            table.rows,
            vec![vec![CellValue::Text("Bob".into()), CellValue::Int(0)]]
        );
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        let err = normalize_spreadsheet(b"definitely not a spreadsheet").unwrap_err();
        assert!(matches!(err, AppError::Parse(ref m) if m.starts_with("Failed to read Excel")));
    }

    #[test]
    fn test_excel_dates() {
        let dt = excel_serial_to_datetime(45778.0).unwrap();
        assert_eq!(format_datetime(dt), "2025-05-01");

        let dt = excel_serial_to_datetime(45778.5).unwrap();
        assert_eq!(format_datetime(dt), "2025-05-01 12:00:00");
    }

    #[test]
    fn test_empty_table_renders_nothing() {
        assert_eq!(Table::default().to_csv().unwrap(), "");
    }
}
