use crate::api::attendance::{AttendanceListResponse, ClockRequest};
use crate::api::department::{DepartmentListResponse, DepartmentPayload, UpdateDepartment};
use crate::api::employee::{CreateEmployee, EmployeeListResponse, UpdateEmployee};
use crate::auth::ACCESS_TOKEN_COOKIE;
use crate::model::attendance::{AttendanceItem, AttendanceStatus};
use crate::model::department::Department;
use crate::model::employee::Employee;
use crate::models::LoginReqDto;
use crate::utils::query_builder::{ListMeta, QueryParams, SortField};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Employee Management API",
        version = "1.0.0",
        description = r#"
## Employee Management

Backend for employee records, departments and daily attendance.

### 🔹 Key Features
- **Employees**: create, update, soft delete, list with filter/sort/pagination
- **Departments**: clock-in and clock-out cutoffs per department
- **Attendance**: clock in/out once per day, history with late / left-early status

### 🔐 Security
Login sets an HttpOnly `access_token` cookie. Every endpoint except login and
logout requires it (a `Bearer` header is accepted too).

### 📦 List endpoints
`POST .../GetData` with `{"page", "per_page", "sort_by": [{"key", "order"}], "filter": {}}`.
Filter keys accept `.gte`, `.lte` and `.like` suffixes; bare keys are substring matches.
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::logout,
        crate::auth::handlers::me,

        crate::api::employee::list_employees,
        crate::api::employee::get_employee,
        crate::api::employee::create_employee,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee,

        crate::api::department::list_departments,
        crate::api::department::get_department,
        crate::api::department::create_department,
        crate::api::department::update_department,
        crate::api::department::delete_department,

        crate::api::attendance::clock,
        crate::api::attendance::today,
        crate::api::attendance::my_logs,
        crate::api::attendance::all_logs
    ),
    components(
        schemas(
            LoginReqDto,
            QueryParams,
            SortField,
            ListMeta,
            Employee,
            CreateEmployee,
            UpdateEmployee,
            EmployeeListResponse,
            Department,
            DepartmentPayload,
            UpdateDepartment,
            DepartmentListResponse,
            ClockRequest,
            AttendanceItem,
            AttendanceStatus,
            AttendanceListResponse
        )
    ),
    modifiers(&SessionCookie),
    tags(
        (name = "Auth", description = "Session APIs"),
        (name = "Employee", description = "Employee management APIs"),
        (name = "Department", description = "Department management APIs"),
        (name = "Attendance", description = "Attendance APIs"),
    )
)]
pub struct ApiDoc;

/// Registers the `cookie_auth` scheme referenced by protected paths.
struct SessionCookie;

impl Modify for SessionCookie {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "cookie_auth",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(ACCESS_TOKEN_COOKIE))),
        );
    }
}
