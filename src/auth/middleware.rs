use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, HttpRequest, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use jsonwebtoken::errors::ErrorKind;
use tracing::debug;

use crate::auth::ACCESS_TOKEN_COOKIE;
use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::AppError;

/// Token from the session cookie, else from `Authorization: Bearer`.
pub fn extract_token(req: &HttpRequest) -> Option<String> {
    if let Some(cookie) = req.cookie(ACCESS_TOKEN_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn authenticate(req: &ServiceRequest) -> Result<AuthUser, AppError> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| AppError::internal("App config missing"))?;

    let token = extract_token(req.request()).ok_or_else(|| AppError::unauthorized("missing token"))?;

    let claims = verify_token(&token, &config.jwt_secret).map_err(|e| {
        debug!(error = %e, "Rejected access token");
        match e.kind() {
            ErrorKind::ExpiredSignature => AppError::unauthorized("token expired"),
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                AppError::unauthorized("malformed token")
            }
            _ => AppError::unauthorized("invalid token"),
        }
    })?;

    if claims.employee_id.trim().is_empty() {
        return Err(AppError::unauthorized("employee_id missing in token"));
    }

    Ok(AuthUser {
        id: claims.id,
        employee_id: claims.employee_id,
    })
}

pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    match authenticate(&req) {
        Ok(auth_user) => {
            req.extensions_mut().insert(auth_user);
            next.call(req).await
        }
        Err(e) => Ok(req.into_response(e.error_response())),
    }
}
