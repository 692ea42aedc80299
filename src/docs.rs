use crate::error::ErrorBody;
use crate::model::batch::{AttendanceRecord, EmployeeAttendance, MonthAttendance};
use crate::models::{SaveAttendanceReq, SaveAttendanceResponse, UploadForm, UploadResponse};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attendance Batch API",
        version = "1.0.0",
        description = r#"
## Monthly Attendance Batches

Stores one attendance batch per reporting period (e.g. `May 2025`) and serves it back
by period or by employee.

### 🔹 Workflow
- **Upload** a spreadsheet to `/api/upload_attendance_excel` and get normalized CSV text
  back (`HD` cells become `0.5`, `L` cells become `0`)
- **Save** the reviewed rows to `/api/save_attendance`; saving a period again replaces
  all of its rows
- **Query** by period or by employee

### 📦 Response Format
- JSON bodies; failures are `{"error": "..."}`
- Row keys are stored with spaces replaced by underscores

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::attendance::save_attendance,
        crate::api::attendance::get_employee_attendance,
        crate::api::attendance::get_attendance_by_month,
        crate::api::attendance::upload_attendance_excel
    ),
    components(
        schemas(
            SaveAttendanceReq,
            SaveAttendanceResponse,
            EmployeeAttendance,
            MonthAttendance,
            AttendanceRecord,
            UploadForm,
            UploadResponse,
            ErrorBody
        )
    ),
    tags(
        (name = "Attendance", description = "Attendance batch APIs"),
    )
)]
pub struct ApiDoc;
