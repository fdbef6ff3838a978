use actix_web::cookie::{Cookie, SameSite, time::Duration};
use actix_web::{HttpResponse, Responder, web};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument};

use crate::{
    auth::{
        ACCESS_TOKEN_COOKIE,
        auth::AuthUser,
        jwt::generate_access_token,
        password::verify_password,
    },
    config::Config,
    error::{AppError, AppResult},
    model::employee::EmployeeCredentials,
    models::LoginReqDto,
};

fn session_cookie(config: &Config, token: String) -> Cookie<'static> {
    Cookie::build(ACCESS_TOKEN_COOKIE, token)
        .path("/")
        .domain(config.cookie_domain.clone())
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(SameSite::Lax)
        .max_age(Duration::seconds(config.access_token_ttl as i64))
        .finish()
}

/// Login with employee id and password; the token is returned as an HttpOnly cookie.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Logged in", body = Object, example = json!({
            "message": "login successful"
        })),
        (status = 400, description = "Missing credentials"),
        (status = 401, description = "Invalid employee id or password")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(employee_id = %user.employee_id)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    info!("Login request received");

    // 1️⃣ Basic validation
    if user.employee_id.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty employee id or password");
        return Err(AppError::validation(
            "employeeID and password are required",
        ));
    }

    // 2️⃣ Fetch employee
    let employee = sqlx::query_as::<_, EmployeeCredentials>(
        r#"
        SELECT id, employee_id, password
        FROM employee
        WHERE employee_id = ? AND deleted_at IS NULL
        "#,
    )
    .bind(user.employee_id.trim())
    .fetch_optional(pool.get_ref())
    .await?;

    let Some(employee) = employee else {
        info!("Invalid credentials: employee not found");
        return Err(AppError::unauthorized("invalid employee_id"));
    };

    debug!(id = %employee.id, "Employee found, verifying password");

    // 3️⃣ Verify password
    if let Err(e) = verify_password(&user.password, &employee.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(AppError::unauthorized("invalid password"));
    }

    // 4️⃣ Issue token
    let token = generate_access_token(
        &employee.id,
        &employee.employee_id,
        &config.jwt_secret,
        config.access_token_ttl,
    )
    .map_err(|e| {
        error!(error = %e, "JWT generation failed");
        AppError::internal("failed to generate token")
    })?;

    info!("Login successful");

    Ok(HttpResponse::Ok()
        .cookie(session_cookie(&config, token))
        .json(json!({ "message": "login successful" })))
}

/// Clears the session cookie.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = Object, example = json!({
            "message": "logout successful"
        }))
    ),
    tag = "Auth"
)]
pub async fn logout(config: web::Data<Config>) -> impl Responder {
    let mut cookie = session_cookie(&config, String::new());
    cookie.make_removal();

    HttpResponse::Ok()
        .cookie(cookie)
        .json(json!({ "message": "logout successful" }))
}

/// Current session's employee.
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current employee", body = Object, example = json!({
            "id": "0b7f3c2e-7a53-4f3e-9d0e-1b2c3d4e5f60",
            "employeeID": "EMP-001",
            "name": "John Doe"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Employee not found")
    ),
    security(("cookie_auth" = [])),
    tag = "Auth"
)]
pub async fn me(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let row = sqlx::query_as::<_, (String, String, String)>(
        r#"
        SELECT id, employee_id, name
        FROM employee
        WHERE employee_id = ? AND deleted_at IS NULL
        "#,
    )
    .bind(&auth.employee_id)
    .fetch_optional(pool.get_ref())
    .await?;

    let (id, employee_id, name) = row.ok_or_else(|| AppError::not_found("Employee"))?;

    Ok(HttpResponse::Ok().json(json!({
        "id": id,
        "employeeID": employee_id,
        "name": name,
    })))
}
