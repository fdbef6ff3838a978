use actix_web::{HttpResponse, web};
use chrono::{NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::department::Department,
    utils::{
        attendance_status::parse_cutoff,
        db_utils::{
            AuditStamp, Change, SqlValue, UpdatePayload, build_update_sql, execute_update,
            soft_delete,
        },
        query_builder::{FieldWhitelist, ListMeta, ListQuery, QueryParams, build_meta},
    },
};

pub const DEPARTMENT_FIELDS: FieldWhitelist = FieldWhitelist::new(&[
    ("id", "d.id"),
    ("departmentName", "d.department_name"),
    ("maxClockInTime", "d.max_clock_in_time"),
    ("maxClockOutTime", "d.max_clock_out_time"),
    ("createdAt", "d.created_at"),
]);

const DEPARTMENT_UPDATE_COLUMNS: &[&str] =
    &["department_name", "max_clock_in_time", "max_clock_out_time"];

const DEPARTMENT_SELECT: &str = r#"
    SELECT d.id, d.department_name,
           CAST(d.max_clock_in_time AS CHAR) AS max_clock_in_time,
           CAST(d.max_clock_out_time AS CHAR) AS max_clock_out_time,
           d.created_at, d.created_by, d.updated_at, d.updated_by
    FROM department d
    WHERE d.deleted_at IS NULL
"#;

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentPayload {
    #[schema(example = "Engineering")]
    pub department_name: Option<String>,
    #[schema(example = "09:00:00")]
    pub max_clock_in_time: Option<String>,
    #[schema(example = "17:30:00")]
    pub max_clock_out_time: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateDepartment {
    pub department_name: Option<String>,
    #[schema(example = "09:00:00")]
    pub max_clock_in_time: Option<String>,
    #[schema(example = "17:30:00")]
    pub max_clock_out_time: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct DepartmentListResponse {
    pub data: Vec<Department>,
    pub meta: ListMeta,
}

fn cutoff(field: &str, raw: &str) -> AppResult<NaiveTime> {
    parse_cutoff(raw).map_err(|_| AppError::validation(format!("{} must be HH:MM:SS", field)))
}

/// Rejects a `departmentID` that is unknown or soft-deleted.
pub async fn ensure_department(pool: &MySqlPool, department_id: &str) -> AppResult<()> {
    let found = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM department WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(department_id)
    .fetch_one(pool)
    .await?;

    if found == 0 {
        debug!(%department_id, "Unknown department referenced");
        return Err(AppError::validation("departmentID does not exist"));
    }
    Ok(())
}

impl UpdatePayload for UpdateDepartment {
    fn changes(&self) -> AppResult<Vec<Change>> {
        let mut changes = Vec::new();

        if let Some(name) = &self.department_name {
            if name.trim().is_empty() {
                return Err(AppError::validation("departmentName must not be empty"));
            }
            changes.push(("department_name", SqlValue::String(name.trim().to_string())));
        }
        if let Some(raw) = &self.max_clock_in_time {
            changes.push((
                "max_clock_in_time",
                SqlValue::Time(cutoff("maxClockInTime", raw)?),
            ));
        }
        if let Some(raw) = &self.max_clock_out_time {
            changes.push((
                "max_clock_out_time",
                SqlValue::Time(cutoff("maxClockOutTime", raw)?),
            ));
        }

        Ok(changes)
    }
}

/// List departments
#[utoipa::path(
    post,
    path = "/api/department/GetData",
    request_body = QueryParams,
    responses(
        (status = 200, description = "Department list", body = DepartmentListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Department",
    security(("cookie_auth" = []))
)]
pub async fn list_departments(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    params: web::Json<QueryParams>,
) -> AppResult<HttpResponse> {
    let query = ListQuery::new(&params, &DEPARTMENT_FIELDS);

    let data_sql = format!(
        "{} {} {} {}",
        DEPARTMENT_SELECT,
        query.filter.sql,
        query.order_by,
        query.limit_sql()
    );
    debug!(sql = %data_sql, args = ?query.filter.args, "Fetching departments");

    let mut data_query = sqlx::query_as::<_, Department>(&data_sql);
    for arg in &query.filter.args {
        data_query = data_query.bind(arg);
    }
    if query.pagination.enabled {
        data_query = data_query
            .bind(query.pagination.limit)
            .bind(query.pagination.offset);
    }

    let departments = data_query.fetch_all(pool.get_ref()).await.map_err(|e| {
        error!(error = %e, sql = %data_sql, "Failed to fetch departments");
        AppError::from(e)
    })?;

    let count_sql = format!(
        "SELECT COUNT(*) FROM department d WHERE d.deleted_at IS NULL {}",
        query.filter.sql
    );

    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for arg in &query.filter.args {
        count_query = count_query.bind(arg);
    }

    let total = count_query.fetch_one(pool.get_ref()).await.map_err(|e| {
        error!(error = %e, sql = %count_sql, "Failed to count departments");
        AppError::from(e)
    })?;

    Ok(HttpResponse::Ok().json(DepartmentListResponse {
        data: departments,
        meta: build_meta(params.page, params.per_page, total, &params.sort_by),
    }))
}

#[utoipa::path(
    get,
    path = "/api/department/{id}",
    params(("id", Path, description = "Department id")),
    responses(
        (status = 200, description = "Department found", body = Department),
        (status = 404, description = "Department not found")
    ),
    tag = "Department",
    security(("cookie_auth" = []))
)]
pub async fn get_department(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();

    let sql = format!("{} AND d.id = ?", DEPARTMENT_SELECT);
    let department = sqlx::query_as::<_, Department>(&sql)
        .bind(&id)
        .fetch_optional(pool.get_ref())
        .await?;

    department
        .map(|d| HttpResponse::Ok().json(d))
        .ok_or_else(|| AppError::not_found("Department"))
}

/// Create department
#[utoipa::path(
    post,
    path = "/api/department",
    request_body = DepartmentPayload,
    responses(
        (status = 200, description = "Department created", body = Object, example = json!({
            "message": "department created",
            "id": "4a1d6c0e-2f0b-4c7e-8c5a-9e8d7c6b5a40"
        })),
        (status = 400, description = "Missing fields or malformed cutoff")
    ),
    tag = "Department",
    security(("cookie_auth" = []))
)]
pub async fn create_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<DepartmentPayload>,
) -> AppResult<HttpResponse> {
    let (Some(name), Some(clock_in), Some(clock_out)) = (
        payload.department_name.as_deref(),
        payload.max_clock_in_time.as_deref(),
        payload.max_clock_out_time.as_deref(),
    ) else {
        return Err(AppError::validation("all fields are required"));
    };

    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("all fields are required"));
    }
    let clock_in = cutoff("maxClockInTime", clock_in)?;
    let clock_out = cutoff("maxClockOutTime", clock_out)?;

    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO department
            (id, department_name, max_clock_in_time, max_clock_out_time, created_at, created_by)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(name)
    .bind(clock_in)
    .bind(clock_out)
    .bind(Utc::now().naive_utc())
    .bind(&auth.employee_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to create department");
        AppError::from(e)
    })?;

    info!(%id, created_by = %auth.employee_id, "Department created");
    Ok(HttpResponse::Ok().json(json!({ "message": "department created", "id": id })))
}

#[utoipa::path(
    put,
    path = "/api/department/{id}",
    params(("id", Path, description = "Department id")),
    request_body = UpdateDepartment,
    responses(
        (status = 200, description = "Department updated", body = Object, example = json!({
            "message": "department updated"
        })),
        (status = 400, description = "Invalid payload, malformed cutoff or field not allowed")
    ),
    tag = "Department",
    security(("cookie_auth" = []))
)]
pub async fn update_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    body: web::Json<UpdateDepartment>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();

    let update = build_update_sql(
        "department",
        body.changes()?,
        DEPARTMENT_UPDATE_COLUMNS,
        &AuditStamp::now(&auth),
        &id,
    )?;

    let affected = execute_update(pool.get_ref(), update).await?;
    debug!(%id, affected, "Department update applied");

    Ok(HttpResponse::Ok().json(json!({ "message": "department updated" })))
}

#[utoipa::path(
    delete,
    path = "/api/department/{id}",
    params(("id", Path, description = "Department id")),
    responses(
        (status = 200, description = "Department deleted", body = Object, example = json!({
            "message": "department deleted"
        })),
        (status = 404, description = "Department not found")
    ),
    tag = "Department",
    security(("cookie_auth" = []))
)]
pub async fn delete_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();

    if soft_delete(pool.get_ref(), "department", &id, &auth).await? == 0 {
        return Err(AppError::not_found("Department"));
    }

    info!(%id, deleted_by = %auth.employee_id, "Department deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "department deleted" })))
}
