use actix_web::{HttpResponse, web};
use chrono::{NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, MySqlPool};
use std::str::FromStr;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::auth::AuthUser,
    config::Config,
    error::{AppError, AppResult},
    model::attendance::{
        Attendance, AttendanceDay, AttendanceItem, AttendanceStatus, AttendanceType, ClockAction,
        ClockTransition, TodayRecord,
    },
    utils::{
        attendance_status::classify,
        db_utils::{is_deadlock, is_duplicate_key},
        query_builder::{FieldWhitelist, ListMeta, ListQuery, QueryParams, build_meta},
    },
};

pub const ATTENDANCE_FIELDS: FieldWhitelist = FieldWhitelist::new(&[
    ("dateAttendance", "h.date_attendance"),
    ("employeeName", "e.name"),
    ("departmentID", "e.department_id"),
    ("attendanceType", "h.attendance_type"),
    ("description", "h.description"),
]);

#[derive(Deserialize, ToSchema)]
pub struct ClockRequest {
    /// `clock_in` or `clock_out`
    #[serde(rename = "type", default)]
    #[schema(example = "clock_in")]
    pub kind: Option<String>,
    #[serde(default)]
    #[schema(example = "working from office")]
    pub description: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceListResponse {
    pub data: Vec<AttendanceItem>,
    pub meta: ListMeta,
}

#[derive(Debug, FromRow)]
struct AttendanceLogRow {
    id: String,
    employee_id: String,
    employee_name: String,
    department_name: String,
    max_clock_in_time: Option<String>,
    max_clock_out_time: Option<String>,
    date_attendance: NaiveDateTime,
    attendance_type: i32,
    description: String,
}

impl AttendanceLogRow {
    /// Classifies the row against its department cutoff in `zone`.
    fn into_item(self, zone: Tz) -> AttendanceItem {
        let clock = self.date_attendance.and_utc();

        let (kind, cutoff) = match AttendanceType::from_code(self.attendance_type) {
            Some(AttendanceType::In) => (Some(AttendanceType::In), self.max_clock_in_time),
            Some(AttendanceType::Out) => (Some(AttendanceType::Out), self.max_clock_out_time),
            None => (None, None),
        };

        let cutoff = cutoff.unwrap_or_default();
        let status = match kind {
            Some(kind) => classify(kind, clock, &cutoff, zone),
            None => {
                warn!(id = %self.id, code = self.attendance_type, "Unknown attendance type");
                AttendanceStatus::Unknown
            }
        };

        AttendanceItem {
            id: self.id,
            employee_id: self.employee_id,
            employee_name: self.employee_name,
            department_name: self.department_name,
            clock,
            max_clock: cutoff,
            date_attendance: clock,
            description: self.description,
            status,
            attendance_type: kind.map(|k| k.to_string()).unwrap_or_else(|| "unknown".into()),
        }
    }
}

const LOG_FROM: &str = r#"
    FROM attendance a
    JOIN employee e ON a.employee_id = e.employee_id
    JOIN department d ON e.department_id = d.id
    JOIN attendance_history h ON h.attendance_id = a.id
    WHERE a.deleted_at IS NULL
"#;

/// Shared body of the per-employee and global log listings.
async fn fetch_logs(
    pool: &MySqlPool,
    zone: Tz,
    params: &QueryParams,
    employee_id: Option<&str>,
) -> AppResult<AttendanceListResponse> {
    let query = ListQuery::new(params, &ATTENDANCE_FIELDS);
    let owner_sql = if employee_id.is_some() {
        "AND a.employee_id = ?"
    } else {
        ""
    };

    let data_sql = format!(
        r#"
        SELECT h.id, a.employee_id, e.name AS employee_name, d.department_name,
               CAST(d.max_clock_in_time AS CHAR) AS max_clock_in_time,
               CAST(d.max_clock_out_time AS CHAR) AS max_clock_out_time,
               h.date_attendance, h.attendance_type, h.description
        {} {} {} {} {}
        "#,
        LOG_FROM,
        owner_sql,
        query.filter.sql,
        query.order_by,
        query.limit_sql()
    );
    debug!(sql = %data_sql, args = ?query.filter.args, "Fetching attendance logs");

    let mut data_query = sqlx::query_as::<_, AttendanceLogRow>(&data_sql);
    if let Some(employee_id) = employee_id {
        data_query = data_query.bind(employee_id);
    }
    for arg in &query.filter.args {
        data_query = data_query.bind(arg);
    }
    if query.pagination.enabled {
        data_query = data_query
            .bind(query.pagination.limit)
            .bind(query.pagination.offset);
    }

    let rows = data_query.fetch_all(pool).await.map_err(|e| {
        error!(error = %e, sql = %data_sql, "Attendance query failed");
        AppError::from(e)
    })?;

    let count_sql = format!("SELECT COUNT(*) {} {} {}", LOG_FROM, owner_sql, query.filter.sql);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(employee_id) = employee_id {
        count_query = count_query.bind(employee_id);
    }
    for arg in &query.filter.args {
        count_query = count_query.bind(arg);
    }

    let total = count_query.fetch_one(pool).await.map_err(|e| {
        error!(error = %e, sql = %count_sql, "Attendance count failed");
        AppError::from(e)
    })?;

    Ok(AttendanceListResponse {
        data: rows.into_iter().map(|row| row.into_item(zone)).collect(),
        meta: build_meta(params.page, params.per_page, total, &params.sort_by),
    })
}

/// A concurrent first clock-in loses either on the unique key or, under the
/// gap lock taken by `FOR UPDATE`, as the deadlock victim.
fn clock_in_error(e: sqlx::Error, employee_id: &str) -> AppError {
    if is_duplicate_key(&e) || is_deadlock(&e) {
        debug!(error = %e, %employee_id, "Concurrent clock-in rejected");
        AppError::conflict("already clocked in today")
    } else {
        error!(error = %e, %employee_id, "Clock-in insert failed");
        AppError::from(e)
    }
}

/// Clock in or out for the authenticated employee.
#[utoipa::path(
    post,
    path = "/api/attendance",
    request_body = ClockRequest,
    responses(
        (status = 200, description = "Clock action recorded", body = Object, example = json!({
            "message": "clock-in successful"
        })),
        (status = 400, description = "already clocked in today / no clock-in record found today / invalid type", body = Object, example = json!({
            "error": "already clocked in today"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(("cookie_auth" = [])),
    tag = "Attendance"
)]
pub async fn clock(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    body: web::Json<ClockRequest>,
) -> AppResult<HttpResponse> {
    let (Some(kind), Some(description)) = (body.kind.as_deref(), body.description.as_deref())
    else {
        return Err(AppError::validation("type and description required"));
    };

    let action = ClockAction::from_str(kind).map_err(|_| AppError::validation("invalid type"))?;

    let now = Utc::now();
    let today = now.with_timezone(&config.timezone).date_naive();
    let stamp = now.naive_utc();

    // Existence check and writes share one transaction; the row lock plus the
    // (employee_id, attendance_date) unique key reject concurrent duplicates.
    let mut tx = pool.begin().await?;

    let record = sqlx::query_as::<_, TodayRecord>(
        r#"
        SELECT id, clock_out
        FROM attendance
        WHERE employee_id = ? AND attendance_date = ? AND deleted_at IS NULL
        FOR UPDATE
        "#,
    )
    .bind(&auth.employee_id)
    .bind(today)
    .fetch_optional(&mut *tx)
    .await?;

    let attendance_id = match AttendanceDay::from(record).apply(action)? {
        ClockTransition::Open => {
            let attendance_id = Uuid::new_v4().to_string();

            sqlx::query(
                r#"
                INSERT INTO attendance
                    (id, employee_id, attendance_date, clock_in, created_at, created_by)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&attendance_id)
            .bind(&auth.employee_id)
            .bind(today)
            .bind(stamp)
            .bind(stamp)
            .bind(&auth.employee_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| clock_in_error(e, &auth.employee_id))?;

            attendance_id
        }
        ClockTransition::Close { attendance_id } => {
            sqlx::query(
                r#"
                UPDATE attendance
                SET clock_out = ?, updated_at = ?, updated_by = ?
                WHERE id = ?
                "#,
            )
            .bind(stamp)
            .bind(stamp)
            .bind(&auth.employee_id)
            .bind(&attendance_id)
            .execute(&mut *tx)
            .await?;

            attendance_id
        }
    };

    sqlx::query(
        r#"
        INSERT INTO attendance_history
            (id, employee_id, attendance_id, date_attendance, attendance_type, description,
             created_at, created_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&auth.employee_id)
    .bind(&attendance_id)
    .bind(stamp)
    .bind(action.history_type().code())
    .bind(description)
    .bind(stamp)
    .bind(&auth.employee_id)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        error!(error = %e, %attendance_id, "Failed to save attendance history");
        AppError::from(e)
    })?;

    tx.commit().await?;

    info!(employee_id = %auth.employee_id, %attendance_id, %action, "Clock action recorded");

    let message = match action {
        ClockAction::ClockIn => "clock-in successful",
        ClockAction::ClockOut => "clock-out successful",
    };
    Ok(HttpResponse::Ok().json(json!({ "message": message })))
}

/// Today's clock-in/out for the authenticated employee, `{}` when none.
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses(
        (status = 200, description = "Today's attendance", body = Object, example = json!({
            "clockIn": "2024-03-04T01:02:03Z",
            "clockOut": null
        })),
        (status = 401, description = "Unauthorized")
    ),
    security(("cookie_auth" = [])),
    tag = "Attendance"
)]
pub async fn today(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let today = Utc::now().with_timezone(&config.timezone).date_naive();

    let record = sqlx::query_as::<_, Attendance>(
        r#"
        SELECT id, employee_id, attendance_date, clock_in, clock_out
        FROM attendance
        WHERE employee_id = ? AND attendance_date = ? AND deleted_at IS NULL
        LIMIT 1
        "#,
    )
    .bind(&auth.employee_id)
    .bind(today)
    .fetch_optional(pool.get_ref())
    .await?;

    Ok(match record {
        Some(record) => HttpResponse::Ok().json(json!({
            "clockIn": record.clock_in.map(|t| t.and_utc()),
            "clockOut": record.clock_out.map(|t| t.and_utc()),
        })),
        None => HttpResponse::Ok().json(json!({})),
    })
}

/// Attendance history of the authenticated employee.
#[utoipa::path(
    post,
    path = "/api/attendance/logs",
    request_body = QueryParams,
    responses(
        (status = 200, description = "Attendance history", body = AttendanceListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("cookie_auth" = [])),
    tag = "Attendance"
)]
pub async fn my_logs(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    params: web::Json<QueryParams>,
) -> AppResult<HttpResponse> {
    let response = fetch_logs(
        pool.get_ref(),
        config.timezone,
        &params,
        Some(&auth.employee_id),
    )
    .await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Attendance history across all employees.
#[utoipa::path(
    post,
    path = "/api/attendance/GetData",
    request_body = QueryParams,
    responses(
        (status = 200, description = "Attendance history", body = AttendanceListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("cookie_auth" = [])),
    tag = "Attendance"
)]
pub async fn all_logs(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    params: web::Json<QueryParams>,
) -> AppResult<HttpResponse> {
    let response = fetch_logs(pool.get_ref(), config.timezone, &params, None).await?;
    Ok(HttpResponse::Ok().json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ACCESS_TOKEN_COOKIE, jwt::generate_access_token};
    use crate::routes::{self, RateLimiters};
    use actix_web::test as actix_test;
    use actix_web::{App, cookie::Cookie, http::StatusCode};
    use chrono::NaiveDate;

    fn row(kind: i32, hh: u32, mm: u32, cutoff_in: Option<&str>) -> AttendanceLogRow {
        AttendanceLogRow {
            id: "h-1".into(),
            employee_id: "EMP-001".into(),
            employee_name: "John".into(),
            department_name: "Engineering".into(),
            max_clock_in_time: cutoff_in.map(str::to_string),
            max_clock_out_time: Some("17:30:00".into()),
            // stored as UTC; Singapore is UTC+8
            date_attendance: NaiveDate::from_ymd_opt(2024, 3, 4)
                .unwrap()
                .and_hms_opt(hh, mm, 0)
                .unwrap(),
            attendance_type: kind,
            description: "x".into(),
        }
    }

    #[test]
    fn late_clock_in_row_is_flagged() {
        // 01:15 UTC = 09:15 SGT
        let item = row(1, 1, 15, Some("09:00:00")).into_item(chrono_tz::Asia::Singapore);
        assert_eq!(item.status, AttendanceStatus::Late);
        assert_eq!(item.attendance_type, "in");
        assert_eq!(item.max_clock, "09:00:00");
    }

    #[test]
    fn early_clock_out_row_is_flagged() {
        // 09:00 UTC = 17:00 SGT
        let item = row(2, 9, 0, Some("09:00:00")).into_item(chrono_tz::Asia::Singapore);
        assert_eq!(item.status, AttendanceStatus::LeftEarly);
        assert_eq!(item.attendance_type, "out");
    }

    #[test]
    fn bad_cutoff_degrades_only_that_row() {
        let items: Vec<_> = vec![
            row(1, 0, 30, Some("garbage")),
            row(1, 0, 30, Some("09:00:00")),
        ]
        .into_iter()
        .map(|r| r.into_item(chrono_tz::Asia::Singapore))
        .collect();

        assert_eq!(items[0].status, AttendanceStatus::Unknown);
        assert_eq!(items[1].status, AttendanceStatus::OnTime);
    }

    #[test]
    fn unknown_type_code_is_unknown_status() {
        let item = row(9, 1, 0, Some("09:00:00")).into_item(chrono_tz::Asia::Singapore);
        assert_eq!(item.status, AttendanceStatus::Unknown);
        assert_eq!(item.attendance_type, "unknown");
    }

    #[test]
    fn losing_a_clock_in_race_is_a_conflict() {
        use crate::utils::db_utils::fake::{Failure, db_error};

        for failure in [Failure::Unique, Failure::Deadlock] {
            match clock_in_error(db_error(failure), "EMP-001") {
                AppError::StateConflict(msg) => assert_eq!(msg, "already clocked in today"),
                other => panic!("{failure:?} mapped to {other:?}"),
            }
        }

        assert!(matches!(
            clock_in_error(db_error(Failure::ForeignKey), "EMP-001"),
            AppError::Database(_)
        ));
    }

    fn lazy_pool(config: &Config) -> MySqlPool {
        sqlx::mysql::MySqlPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(200))
            .connect_lazy(&config.database_url)
            .unwrap()
    }

    fn session(config: &Config) -> Cookie<'static> {
        let token =
            generate_access_token("row-1", "EMP-001", &config.jwt_secret, 60).unwrap();
        Cookie::new(ACCESS_TOKEN_COOKIE, token)
    }

    macro_rules! app {
        ($config:expr) => {{
            let config = $config;
            let limiters = RateLimiters::from_config(&config).unwrap();
            let api_prefix = config.api_prefix.clone();
            actix_test::init_service(
                App::new()
                    .app_data(web::Data::new(lazy_pool(&config)))
                    .app_data(web::Data::new(config))
                    .configure(|cfg| routes::configure(cfg, &api_prefix, &limiters)),
            )
            .await
        }};
    }

    #[actix_web::test]
    async fn clock_requires_session() {
        let app = app!(Config::for_tests());

        let req = actix_test::TestRequest::post()
            .uri("/api/attendance")
            .peer_addr("127.0.0.1:40000".parse().unwrap())
            .set_json(json!({ "type": "clock_in", "description": "hi" }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["error"], "missing token");
    }

    #[actix_web::test]
    async fn invalid_clock_type_is_rejected_before_any_write() {
        let config = Config::for_tests();
        let cookie = session(&config);
        let app = app!(config);

        let req = actix_test::TestRequest::post()
            .uri("/api/attendance")
            .peer_addr("127.0.0.1:40000".parse().unwrap())
            .cookie(cookie)
            .set_json(json!({ "type": "lunch_break", "description": "hi" }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["error"], "invalid type");
    }

    #[actix_web::test]
    async fn missing_description_is_rejected() {
        let config = Config::for_tests();
        let cookie = session(&config);
        let app = app!(config);

        let req = actix_test::TestRequest::post()
            .uri("/api/attendance")
            .peer_addr("127.0.0.1:40000".parse().unwrap())
            .cookie(cookie)
            .set_json(json!({ "type": "clock_out" }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["error"], "type and description required");
    }

    #[actix_web::test]
    async fn unwhitelisted_update_field_is_rejected() {
        let config = Config::for_tests();
        let cookie = session(&config);
        let app = app!(config);

        let req = actix_test::TestRequest::put()
            .uri("/api/employee/some-id")
            .peer_addr("127.0.0.1:40000".parse().unwrap())
            .cookie(cookie)
            .set_json(json!({ "password": "hunter2" }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    /// Full NoRecord -> ClockedIn -> ClockedOut walk against a real database.
    ///
    /// Run with `DATABASE_URL` pointing at a scratch schema loaded from
    /// `db/schema.sql`: `cargo test -- --ignored clock_flow`.
    #[actix_web::test]
    #[ignore = "requires a MySQL database (DATABASE_URL)"]
    async fn clock_flow_against_database() {
        let mut config = Config::for_tests();
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = url;
        }
        let pool = MySqlPool::connect(&config.database_url).await.unwrap();

        let employee_id = format!("EMP-{}", Uuid::new_v4().to_simple());
        let token = generate_access_token("row-1", &employee_id, &config.jwt_secret, 60).unwrap();
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

        let clock = |kind: &str| {
            actix_test::TestRequest::post()
                .uri("/api/attendance")
                .peer_addr("127.0.0.1:40000".parse().unwrap())
                .cookie(cookie.clone())
                .set_json(json!({ "type": kind, "description": "flow test" }))
                .to_request()
        };

        let count = |sql: &'static str| {
            let pool = pool.clone();
            let employee_id = employee_id.clone();
            async move {
                sqlx::query_scalar::<_, i64>(sql)
                    .bind(employee_id)
                    .fetch_one(&pool)
                    .await
                    .unwrap()
            }
        };

        let resp = actix_test::call_service(&app, clock("clock_in")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(count("SELECT COUNT(*) FROM attendance WHERE employee_id = ?").await, 1);
        assert_eq!(
            count("SELECT COUNT(*) FROM attendance_history WHERE employee_id = ? AND attendance_type = 1").await,
            1
        );

        let resp = actix_test::call_service(&app, clock("clock_in")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["error"], "already clocked in today");

        let resp = actix_test::call_service(&app, clock("clock_out")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(count("SELECT COUNT(*) FROM attendance WHERE employee_id = ?").await, 1);
        assert_eq!(
            count("SELECT COUNT(*) FROM attendance_history WHERE employee_id = ? AND attendance_type = 2").await,
            1
        );
        assert_eq!(
            count("SELECT COUNT(*) FROM attendance WHERE employee_id = ? AND clock_out IS NOT NULL").await,
            1
        );

        // A soft-deleted day no longer blocks a fresh clock-in.
        sqlx::query("UPDATE attendance SET deleted_at = NOW(), deleted_by = 'test' WHERE employee_id = ?")
            .bind(&employee_id)
            .execute(&pool)
            .await
            .unwrap();

        let resp = actix_test::call_service(&app, clock("clock_in")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            count("SELECT COUNT(*) FROM attendance WHERE employee_id = ? AND deleted_at IS NULL").await,
            1
        );
    }
}
