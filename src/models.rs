use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::model::batch::NewBatch;
use crate::model::row::RowData;

/// Body of `POST /save_attendance`. Every field is optional here so that a missing
/// field comes back as a validation error instead of a deserialization error.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SaveAttendanceReq {
    #[serde(alias = "year_month")]
    #[schema(example = "May 2025")]
    pub period: Option<String>,

    #[schema(value_type = Option<Vec<Object>>, example = json!(["2025-05-01", "2025-05-12"]))]
    pub holidays: Option<Vec<Value>>,

    #[schema(example = 20)]
    pub working_days: Option<i64>,

    #[schema(
        value_type = Option<Vec<Object>>,
        example = json!([{"EMPLOYEE NAME": "Alice", "PROJECT": "Apollo", "Month Total": 19.5, "1": "P", "2": 0.5}])
    )]
    pub data: Option<Vec<RowData>>,
}

impl TryFrom<SaveAttendanceReq> for NewBatch {
    type Error = AppError;

    fn try_from(req: SaveAttendanceReq) -> Result<Self, Self::Error> {
        NewBatch::try_new(req.period, req.holidays, req.working_days, req.data)
    }
}

#[derive(Serialize, ToSchema)]
pub struct SaveAttendanceResponse {
    #[schema(example = true)]
    pub success: bool,
}

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    #[schema(example = "EMPLOYEE NAME,1,2\nAlice,0.5,0\n")]
    pub tabular_text: String,
}

/// Multipart form accepted by the upload endpoint (documentation only).
#[allow(dead_code)]
#[derive(ToSchema)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}
