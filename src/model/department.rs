use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    #[schema(example = "4a1d6c0e-2f0b-4c7e-8c5a-9e8d7c6b5a40")]
    pub id: String,

    #[schema(example = "Engineering")]
    pub department_name: String,

    /// Latest on-time clock-in, `HH:MM:SS`.
    #[schema(example = "09:00:00")]
    pub max_clock_in_time: String,

    /// Earliest on-time clock-out, `HH:MM:SS`.
    #[schema(example = "17:30:00")]
    pub max_clock_out_time: String,

    #[schema(example = "2024-01-01T08:00:00", format = "date-time", value_type = String)]
    pub created_at: NaiveDateTime,

    #[schema(example = "EMP-001")]
    pub created_by: String,

    #[schema(format = "date-time", value_type = String, nullable = true)]
    pub updated_at: Option<NaiveDateTime>,

    #[schema(nullable = true)]
    pub updated_by: Option<String>,
}
