use crate::{
    api::department::ensure_department,
    auth::{auth::AuthUser, password::hash_password},
    config::Config,
    error::{AppError, AppResult},
    model::employee::Employee,
    utils::{
        db_utils::{
            AuditStamp, Change, SqlValue, UpdatePayload, build_update_sql, execute_update,
            is_duplicate_key, soft_delete,
        },
        query_builder::{FieldWhitelist, ListMeta, ListQuery, QueryParams, build_meta},
    },
};
use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info};
use utoipa::ToSchema;
use uuid::Uuid;

/// Public filter/sort keys for the employee list.
pub const EMPLOYEE_FIELDS: FieldWhitelist = FieldWhitelist::new(&[
    ("employeeID", "e.employee_id"),
    ("departmentName", "d.department_name"),
    ("name", "e.name"),
    ("address", "e.address"),
]);

/// Columns a partial update may touch.
const EMPLOYEE_UPDATE_COLUMNS: &[&str] = &["name", "department_id", "address"];

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreateEmployee {
    #[serde(rename = "employeeID")]
    #[schema(example = "EMP-001")]
    pub employee_id: String,
    #[schema(example = "John Doe")]
    pub name: String,
    #[serde(rename = "departmentID")]
    #[schema(example = "4a1d6c0e-2f0b-4c7e-8c5a-9e8d7c6b5a40")]
    pub department_id: String,
    #[schema(example = "Jl. Sudirman 1")]
    pub address: Option<String>,
    /// Initial password; the configured default is used when omitted.
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateEmployee {
    #[schema(example = "Jane Doe")]
    pub name: Option<String>,
    #[serde(rename = "departmentID")]
    pub department_id: Option<String>,
    pub address: Option<String>,
}

impl UpdatePayload for UpdateEmployee {
    fn changes(&self) -> AppResult<Vec<Change>> {
        let mut changes = Vec::new();

        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(AppError::validation("name must not be empty"));
            }
            changes.push(("name", SqlValue::String(name.trim().to_string())));
        }
        if let Some(department_id) = &self.department_id {
            changes.push(("department_id", SqlValue::String(department_id.clone())));
        }
        if let Some(address) = &self.address {
            // blank clears the column
            let value = if address.trim().is_empty() {
                SqlValue::Null
            } else {
                SqlValue::String(address.clone())
            };
            changes.push(("address", value));
        }

        Ok(changes)
    }
}

#[derive(Serialize, ToSchema)]
pub struct EmployeeListResponse {
    pub data: Vec<Employee>,
    pub meta: ListMeta,
}

const EMPLOYEE_FROM: &str = r#"
    FROM employee e
    JOIN department d ON e.department_id = d.id
    WHERE e.deleted_at IS NULL
"#;

/// List employees
#[utoipa::path(
    post,
    path = "/api/employee/GetData",
    request_body = QueryParams,
    responses(
        (status = 200, description = "Employee list", body = EmployeeListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Employee",
    security(("cookie_auth" = []))
)]
pub async fn list_employees(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    params: web::Json<QueryParams>,
) -> AppResult<HttpResponse> {
    let query = ListQuery::new(&params, &EMPLOYEE_FIELDS);

    // ---------- data query ----------
    let data_sql = format!(
        r#"
        SELECT e.id, e.employee_id, e.department_id, d.department_name, e.name, e.address
        {} {} {} {}
        "#,
        EMPLOYEE_FROM,
        query.filter.sql,
        query.order_by,
        query.limit_sql()
    );
    debug!(sql = %data_sql, args = ?query.filter.args, "Fetching employees");

    let mut data_query = sqlx::query_as::<_, Employee>(&data_sql);
    for arg in &query.filter.args {
        data_query = data_query.bind(arg);
    }
    if query.pagination.enabled {
        data_query = data_query
            .bind(query.pagination.limit)
            .bind(query.pagination.offset);
    }

    let employees = data_query.fetch_all(pool.get_ref()).await.map_err(|e| {
        error!(error = %e, sql = %data_sql, "Failed to fetch employees");
        AppError::from(e)
    })?;

    // ---------- total count ----------
    let count_sql = format!("SELECT COUNT(*) {} {}", EMPLOYEE_FROM, query.filter.sql);

    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for arg in &query.filter.args {
        count_query = count_query.bind(arg);
    }

    let total = count_query.fetch_one(pool.get_ref()).await.map_err(|e| {
        error!(error = %e, sql = %count_sql, "Failed to count employees");
        AppError::from(e)
    })?;

    Ok(HttpResponse::Ok().json(EmployeeListResponse {
        data: employees,
        meta: build_meta(params.page, params.per_page, total, &params.sort_by),
    }))
}

/// Get Employee by ID
#[utoipa::path(
    get,
    path = "/api/employee/{id}",
    params(("id", Path, description = "Employee row id")),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 404, description = "Employee not found", body = Object, example = json!({
            "error": "Employee not found"
        })),
        (status = 500, description = "Internal server error")
    ),
    tag = "Employee",
    security(("cookie_auth" = []))
)]
pub async fn get_employee(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();

    let sql = format!(
        r#"
        SELECT e.id, e.employee_id, e.department_id, d.department_name, e.name, e.address
        {} AND e.id = ?
        "#,
        EMPLOYEE_FROM
    );

    let employee = sqlx::query_as::<_, Employee>(&sql)
        .bind(&id)
        .fetch_optional(pool.get_ref())
        .await?;

    match employee {
        Some(emp) => Ok(HttpResponse::Ok().json(emp)),
        None => Err(AppError::not_found("Employee")),
    }
}

/// Create Employee
#[utoipa::path(
    post,
    path = "/api/employee",
    request_body = CreateEmployee,
    responses(
        (status = 200, description = "Employee created", body = Object, example = json!({
            "message": "employee created",
            "id": "0b7f3c2e-7a53-4f3e-9d0e-1b2c3d4e5f60"
        })),
        (status = 400, description = "Invalid payload, unknown department or employee id already exists"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Employee",
    security(("cookie_auth" = []))
)]
pub async fn create_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<CreateEmployee>,
) -> AppResult<HttpResponse> {
    let employee_id = payload.employee_id.trim();
    let name = payload.name.trim();

    if employee_id.is_empty() || name.is_empty() || payload.department_id.trim().is_empty() {
        return Err(AppError::validation(
            "employeeID, name and departmentID are required",
        ));
    }

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM employee WHERE employee_id = ? AND deleted_at IS NULL",
    )
    .bind(employee_id)
    .fetch_one(pool.get_ref())
    .await?;

    if existing > 0 {
        return Err(AppError::validation("Employee ID already exists"));
    }

    ensure_department(pool.get_ref(), payload.department_id.trim()).await?;

    let password = payload
        .password
        .as_deref()
        .unwrap_or(&config.default_employee_password);
    let hashed = hash_password(password).map_err(|e| {
        error!(error = %e, "Password hashing failed");
        AppError::internal("failed to hash password")
    })?;

    let id = Uuid::new_v4().to_string();

    let result = sqlx::query(
        r#"
        INSERT INTO employee
            (id, employee_id, department_id, name, address, password, created_at, created_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(employee_id)
    .bind(payload.department_id.trim())
    .bind(name)
    .bind(&payload.address)
    .bind(hashed)
    .bind(Utc::now().naive_utc())
    .bind(&auth.employee_id)
    .execute(pool.get_ref())
    .await;

    match result {
        Ok(_) => {
            info!(%id, employee_id, created_by = %auth.employee_id, "Employee created");
            Ok(HttpResponse::Ok().json(json!({ "message": "employee created", "id": id })))
        }
        Err(e) if is_duplicate_key(&e) => Err(AppError::validation("Employee ID already exists")),
        Err(e) => {
            error!(error = %e, "Failed to create employee");
            Err(e.into())
        }
    }
}

/// Update Employee
#[utoipa::path(
    put,
    path = "/api/employee/{id}",
    params(("id", Path, description = "Employee row id")),
    request_body = UpdateEmployee,
    responses(
        (status = 200, description = "Employee updated", body = Object, example = json!({
            "message": "employee updated"
        })),
        (status = 400, description = "Invalid payload, unknown department or field not allowed"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Employee",
    security(("cookie_auth" = []))
)]
pub async fn update_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    body: web::Json<UpdateEmployee>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let changes = body.changes()?;

    if let Some(department_id) = &body.department_id {
        ensure_department(pool.get_ref(), department_id).await?;
    }

    let update = build_update_sql(
        "employee",
        changes,
        EMPLOYEE_UPDATE_COLUMNS,
        &AuditStamp::now(&auth),
        &id,
    )?;

    let affected = execute_update(pool.get_ref(), update).await?;

    // Zero rows: missing or soft-deleted, treated as a no-op.
    debug!(%id, affected, "Employee update applied");

    Ok(HttpResponse::Ok().json(json!({ "message": "employee updated" })))
}

/// Delete Employee (soft delete)
#[utoipa::path(
    delete,
    path = "/api/employee/{id}",
    params(("id", Path, description = "Employee row id")),
    responses(
        (status = 200, description = "Employee deleted", body = Object, example = json!({
            "message": "employee deleted"
        })),
        (status = 404, description = "Employee not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Employee",
    security(("cookie_auth" = []))
)]
pub async fn delete_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();

    let affected = soft_delete(pool.get_ref(), "employee", &id, &auth).await?;
    if affected == 0 {
        return Err(AppError::not_found("Employee"));
    }

    info!(%id, deleted_by = %auth.employee_id, "Employee deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "employee deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_payload_lists_only_present_fields() {
        let body: UpdateEmployee =
            serde_json::from_str(r#"{"name": " Ann ", "address": "Jl. Merdeka"}"#).unwrap();
        assert_eq!(
            body.changes().unwrap(),
            vec![
                ("name", SqlValue::String("Ann".into())),
                ("address", SqlValue::String("Jl. Merdeka".into())),
            ]
        );
    }

    #[test]
    fn update_payload_rejects_unknown_keys() {
        let parsed = serde_json::from_str::<UpdateEmployee>(r#"{"password": "x"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn update_payload_columns_are_whitelisted() {
        let body = UpdateEmployee {
            name: Some("Ann".into()),
            department_id: Some("d-1".into()),
            address: Some("x".into()),
        };
        for (column, _) in body.changes().unwrap() {
            assert!(EMPLOYEE_UPDATE_COLUMNS.contains(&column));
        }
    }

    #[test]
    fn blank_address_clears_the_column() {
        let body: UpdateEmployee = serde_json::from_str(r#"{"address": ""}"#).unwrap();
        assert_eq!(body.changes().unwrap(), vec![("address", SqlValue::Null)]);
    }

    #[test]
    fn blank_name_is_a_validation_error() {
        let body = UpdateEmployee {
            name: Some("  ".into()),
            ..Default::default()
        };
        assert!(matches!(body.changes(), Err(AppError::Validation(_))));
    }

    /// Needs `DATABASE_URL` pointing at a schema loaded from `db/schema.sql`.
    #[actix_web::test]
    #[ignore = "requires a MySQL database (DATABASE_URL)"]
    async fn department_must_exist_and_be_live() {
        use crate::auth::{ACCESS_TOKEN_COOKIE, jwt::generate_access_token};
        use crate::routes::{self, RateLimiters};
        use actix_web::test as actix_test;
        use actix_web::{App, cookie::Cookie, http::StatusCode};

        let mut config = Config::for_tests();
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = url;
        }
        let pool = MySqlPool::connect(&config.database_url).await.unwrap();

        let department_id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO department (id, department_name, max_clock_in_time, max_clock_out_time, \
             created_at, created_by, deleted_at, deleted_by) \
             VALUES (?, 'Closed', '09:00:00', '17:00:00', NOW(), 'test', NOW(), 'test')",
        )
        .bind(&department_id)
        .execute(&pool)
        .await
        .unwrap();

        let token = generate_access_token("row-1", "EMP-ADMIN", &config.jwt_secret, 60).unwrap();
        let cookie = Cookie::new(ACCESS_TOKEN_COOKIE, token);
        let limiters = RateLimiters::from_config(&config).unwrap();
        let api_prefix = config.api_prefix.clone();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(pool.clone()))
                .app_data(web::Data::new(config))
                .configure(|cfg| routes::configure(cfg, &api_prefix, &limiters)),
        )
        .await;

        for department in ["no-such-department", department_id.as_str()] {
            let req = actix_test::TestRequest::post()
                .uri("/api/employee")
                .peer_addr("127.0.0.1:40002".parse().unwrap())
                .cookie(cookie.clone())
                .set_json(json!({
                    "employeeID": format!("EMP-{}", Uuid::new_v4().to_simple()),
                    "name": "Ann",
                    "departmentID": department,
                }))
                .to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", department);
            let body: serde_json::Value = actix_test::read_body_json(resp).await;
            assert_eq!(body["error"], "departmentID does not exist");
        }

        let req = actix_test::TestRequest::put()
            .uri("/api/employee/any-id")
            .peer_addr("127.0.0.1:40002".parse().unwrap())
            .cookie(cookie)
            .set_json(json!({ "departmentID": "no-such-department" }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
