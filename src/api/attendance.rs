use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use futures_util::TryStreamExt;
use tracing::{info, warn};

use crate::{
    config::Config,
    error::{AppError, ErrorBody},
    model::batch::{EmployeeAttendance, MonthAttendance, NewBatch},
    models::{SaveAttendanceReq, SaveAttendanceResponse, UploadForm, UploadResponse},
    store::AttendanceStore,
    utils::spreadsheet,
};

/// Save (replace) the attendance batch of one period
#[utoipa::path(
    post,
    path = "/api/save_attendance",
    request_body = SaveAttendanceReq,
    responses(
        (status = 200, description = "Batch saved", body = SaveAttendanceResponse, example = json!({
            "success": true
        })),
        (status = 400, description = "Missing fields or unparsable row", body = ErrorBody, example = json!({
            "error": "Missing required fields"
        })),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    tag = "Attendance"
)]
pub async fn save_attendance(
    store: web::Data<AttendanceStore>,
    payload: web::Json<SaveAttendanceReq>,
) -> Result<HttpResponse, AppError> {
    let batch = NewBatch::try_from(payload.into_inner()).inspect_err(|e| {
        warn!(error = %e, "Rejected attendance save");
    })?;

    store.save_batch(&batch).await?;

    Ok(HttpResponse::Ok().json(SaveAttendanceResponse { success: true }))
}

/// All attendance rows of one employee, ordered by period label
#[utoipa::path(
    get,
    path = "/api/attendance/employee/{employee_name}",
    params(
        ("employee_name" = String, Path, description = "Exact, case-sensitive employee name")
    ),
    responses(
        (status = 200, description = "Rows across all periods", body = [EmployeeAttendance]),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    tag = "Attendance"
)]
pub async fn get_employee_attendance(
    store: web::Data<AttendanceStore>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let employee_name = path.into_inner();
    let entries = store.get_by_employee(&employee_name).await?;
    Ok(HttpResponse::Ok().json(entries))
}

/// One period's batch with all of its records
#[utoipa::path(
    get,
    path = "/api/attendance/month/{period}",
    params(
        ("period" = String, Path, description = "Period label, e.g. `May 2025`")
    ),
    responses(
        (status = 200, description = "Batch found", body = MonthAttendance),
        (status = 404, description = "No batch for this period", body = ErrorBody, example = json!({
            "error": "No data for this month"
        })),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    tag = "Attendance"
)]
pub async fn get_attendance_by_month(
    store: web::Data<AttendanceStore>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let period = path.into_inner();
    let month = store.get_by_period(&period).await?;
    Ok(HttpResponse::Ok().json(month))
}

/// Convert an uploaded spreadsheet into normalized CSV text
#[utoipa::path(
    post,
    path = "/api/upload_attendance_excel",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Spreadsheet converted", body = UploadResponse),
        (status = 400, description = "Missing file or unreadable spreadsheet", body = ErrorBody, example = json!({
            "error": "No file uploaded"
        }))
    ),
    tag = "Attendance"
)]
pub async fn upload_attendance_excel(
    config: web::Data<Config>,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let mut file: Option<Vec<u8>> = None;

    while let Some(mut field) = payload.try_next().await.map_err(multipart_error)? {
        let is_file = file.is_none() && field.content_disposition().get_name() == Some("file");

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(multipart_error)? {
            if !is_file {
                continue;
            }
            if bytes.len() + chunk.len() > config.max_upload_bytes {
                return Err(AppError::Validation(format!(
                    "File exceeds the {} byte upload limit",
                    config.max_upload_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        if is_file {
            file = Some(bytes);
        }
    }

    let Some(bytes) = file else {
        return Err(AppError::Validation("No file uploaded".to_string()));
    };

    // calamine parsing is blocking CPU work
    let size = bytes.len();
    let tabular_text = web::block(move || spreadsheet::normalize_spreadsheet(&bytes))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    info!(size, "Spreadsheet converted");
    Ok(HttpResponse::Ok().json(UploadResponse { tabular_text }))
}

fn multipart_error(e: actix_multipart::MultipartError) -> AppError {
    AppError::Validation(format!("Invalid multipart payload: {e}"))
}
