use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct LoginReqDto {
    #[serde(rename = "employeeID", default)]
    #[schema(example = "EMP-001")]
    pub employee_id: String,
    #[serde(default)]
    #[schema(example = "password123")]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Employee row id (UUID).
    pub id: String,
    /// Business employee id used for attendance and audit columns.
    pub employee_id: String,
    pub iat: usize,
    pub exp: usize,
}
