use crate::{api::attendance, config::Config, error::AppError};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::Condition, web};

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config) {
    // Malformed JSON bodies get the same {"error": ...} shape as every other failure
    cfg.app_data(
        web::JsonConfig::default()
            .limit(config.json_limit_bytes)
            .error_handler(|err, _req| AppError::Validation(err.to_string()).into()),
    );

    let limiter_enabled = config.rate_api_per_min > 0;

    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(Condition::new(
                limiter_enabled,
                build_limiter(config.rate_api_per_min),
            ))
            .service(
                web::resource("/save_attendance")
                    .route(web::post().to(attendance::save_attendance)),
            )
            .service(
                web::resource("/upload_attendance_excel")
                    .route(web::post().to(attendance::upload_attendance_excel)),
            )
            .service(
                web::scope("/attendance")
                    // /attendance/employee/{employee_name}
                    .service(
                        web::resource("/employee/{employee_name}")
                            .route(web::get().to(attendance::get_employee_attendance)),
                    )
                    // /attendance/month/{period}
                    .service(
                        web::resource("/month/{period}")
                            .route(web::get().to(attendance::get_attendance_by_month)),
                    ),
            ),
    );
}

/// Per-IP limiter; a rate of 0 still builds a valid limiter but the caller leaves it disabled.
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);
    let mut builder = GovernorConfigBuilder::default();
    builder
        .per_millisecond(per_ms)
        .burst_size(requests_per_min);
    match builder.key_extractor(PeerIpKeyExtractor).finish() {
        Some(cfg) => Governor::new(&cfg),
        // unreachable with both values clamped to >= 1; fall back to the crate defaults
        None => Governor::new(&GovernorConfig::default()),
    }
}
