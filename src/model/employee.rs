use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(
    example = json!({
        "id": "0b7f3c2e-7a53-4f3e-9d0e-1b2c3d4e5f60",
        "employeeID": "EMP-001",
        "departmentID": "4a1d6c0e-2f0b-4c7e-8c5a-9e8d7c6b5a40",
        "departmentName": "Engineering",
        "name": "John Doe",
        "address": "Jl. Sudirman 1"
    })
)]
pub struct Employee {
    pub id: String,

    #[serde(rename = "employeeID")]
    pub employee_id: String,

    #[serde(rename = "departmentID")]
    pub department_id: String,

    pub department_name: String,

    pub name: String,

    #[schema(nullable = true)]
    pub address: Option<String>,
}

/// Row used to authenticate a login attempt.
#[derive(sqlx::FromRow)]
pub struct EmployeeCredentials {
    pub id: String,
    pub employee_id: String,
    pub password: String,
}
