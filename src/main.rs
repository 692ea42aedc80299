use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use dotenvy::dotenv;

mod api;
mod config;
mod docs;
mod error;
mod model;
mod models;
mod routes;
mod store;
mod utils;

use config::Config;
use store::AttendanceStore;

use crate::docs::ApiDoc;
use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Attendance server is running"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "attendance.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(config.log_level)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let store = AttendanceStore::connect(&config.database_url, config.db_max_connections).await?;
    store.migrate().await?;

    let prefix = config.api_prefix.clone();
    info!("POST {prefix}/save_attendance - Save attendance data");
    info!("GET  {prefix}/attendance/employee/{{employee_name}} - Attendance records for an employee");
    info!("GET  {prefix}/attendance/month/{{period}} - Attendance records for a month");
    info!("POST {prefix}/upload_attendance_excel - Convert a spreadsheet to CSV");
    info!(addr = %config.server_addr, "Listening");

    let server_addr = config.server_addr.clone();
    let store = Data::new(store);
    let config_data = Data::new(config.clone());

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(store.clone())
            .app_data(config_data.clone())
            .service(index)
            .configure(|cfg| routes::configure(cfg, &config))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await?;

    Ok(())
}
