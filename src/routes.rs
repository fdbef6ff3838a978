use crate::{
    api::{attendance, department, employee},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
    error::AppError,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use anyhow::{Result, anyhow};
use std::sync::Arc;

type Limiter = Governor<PeerIpKeyExtractor, NoOpMiddleware>;

/// Per-IP limiters, built once and shared by every worker.
#[derive(Clone)]
pub struct RateLimiters {
    login: Arc<Limiter>,
    protected: Arc<Limiter>,
}

impl RateLimiters {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            login: Arc::new(build_limiter(config.rate_login_per_min)?),
            protected: Arc::new(build_limiter(config.rate_protected_per_min)?),
        })
    }
}

fn build_limiter(requests_per_min: u32) -> Result<Limiter> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        60_000 / requests_per_min as u64
    };
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms.max(1))
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("invalid rate limit: {} requests/min", requests_per_min))?;
    Ok(Governor::new(&cfg))
}

pub fn configure(cfg: &mut web::ServiceConfig, api_prefix: &str, limiters: &RateLimiters) {
    // Malformed bodies and unknown update keys surface as {"error": ...} 400s
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        AppError::validation(format!("invalid request body: {}", err)).into()
    }));

    // Public routes
    cfg.service(
        web::scope(&format!("{}/auth", api_prefix))
            .service(
                web::resource("/login")
                    .wrap(limiters.login.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/logout")
                    .wrap(limiters.login.clone())
                    .route(web::post().to(handlers::logout)),
            )
            .service(
                web::resource("/me")
                    .wrap(from_fn(auth_middleware))
                    .route(web::get().to(handlers::me)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(limiters.protected.clone())
            .service(
                web::scope("/employee")
                    .service(
                        web::resource("/GetData").route(web::post().to(employee::list_employees)),
                    )
                    .service(web::resource("").route(web::post().to(employee::create_employee)))
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(employee::get_employee))
                            .route(web::put().to(employee::update_employee))
                            .route(web::delete().to(employee::delete_employee)),
                    ),
            )
            .service(
                web::scope("/department")
                    .service(
                        web::resource("/GetData")
                            .route(web::post().to(department::list_departments)),
                    )
                    .service(
                        web::resource("").route(web::post().to(department::create_department)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(department::get_department))
                            .route(web::put().to(department::update_department))
                            .route(web::delete().to(department::delete_department)),
                    ),
            )
            .service(
                web::scope("/attendance")
                    .service(web::resource("").route(web::post().to(attendance::clock)))
                    .service(web::resource("/today").route(web::get().to(attendance::today)))
                    .service(web::resource("/logs").route(web::post().to(attendance::my_logs)))
                    .service(
                        web::resource("/GetData").route(web::post().to(attendance::all_logs)),
                    ),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test as actix_test;
    use actix_web::{App, http::StatusCode};
    use sqlx::MySqlPool;

    #[test]
    fn zero_rate_still_builds_a_limiter() {
        assert!(build_limiter(0).is_ok());
        assert!(build_limiter(120_000).is_ok());
    }

    #[actix_web::test]
    async fn protected_scope_rejects_anonymous_requests() {
        let config = Config::for_tests();
        let limiters = RateLimiters::from_config(&config).unwrap();
        let pool = MySqlPool::connect_lazy(&config.database_url).unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(pool))
                .app_data(web::Data::new(config))
                .configure(|cfg| configure(cfg, "/api", &limiters)),
        )
        .await;

        for (method, uri) in [
            (actix_web::http::Method::POST, "/api/employee/GetData"),
            (actix_web::http::Method::GET, "/api/department/d-1"),
            (actix_web::http::Method::GET, "/api/attendance/today"),
            (actix_web::http::Method::GET, "/api/auth/me"),
        ] {
            let req = actix_test::TestRequest::default()
                .method(method)
                .uri(uri)
                .peer_addr("127.0.0.1:40001".parse().unwrap())
                .to_request();
            let resp = actix_test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }

    #[actix_web::test]
    async fn logout_is_public_and_clears_cookie() {
        let config = Config::for_tests();
        let limiters = RateLimiters::from_config(&config).unwrap();
        let pool = MySqlPool::connect_lazy(&config.database_url).unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(pool))
                .app_data(web::Data::new(config))
                .configure(|cfg| configure(cfg, "/api", &limiters)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/api/auth/logout")
            .peer_addr("127.0.0.1:40001".parse().unwrap())
            .to_request();
        let resp = actix_test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = resp
            .response()
            .cookies()
            .find(|c| c.name() == crate::auth::ACCESS_TOKEN_COOKIE)
            .expect("removal cookie");
        assert_eq!(cookie.value(), "");
    }
}
