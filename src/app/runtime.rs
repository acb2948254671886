use std::sync::{Arc, Mutex};

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware::Logger, web};
use chrono::Utc;

use crate::adapters::api::{ApiState, configure_routes};
use crate::adapters::db::{count_ports, open_connection, run_migrations, schema_version};
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::app::services::SqlitePortService;
use crate::domain::models::Timestamp;
use crate::domain::port_analytics::Clock;

#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

pub fn run(config: AppConfig) -> Result<(), AppError> {
    let mut connection = open_connection(&config.db_path).map_err(AppError::database_init)?;
    run_migrations(&mut connection).map_err(AppError::database_init)?;

    let version = schema_version(&connection).map_err(AppError::database_init)?;
    let ports = count_ports(&connection).map_err(AppError::database_init)?;
    tracing::info!(
        db_path = %config.db_path,
        schema_version = version,
        ports,
        "port store ready"
    );

    let api_state = ApiState {
        ports: SqlitePortService::new(Arc::new(Mutex::new(connection))),
        clock: Arc::new(SystemClock),
    };
    let cors_allowed_origin = config.cors_allowed_origin.clone();

    tracing::info!(bind = %config.http_bind, workers = config.http_workers, "http server starting");

    actix_web::rt::System::new()
        .block_on(async move {
            HttpServer::new(move || {
                App::new()
                    .wrap(build_cors(cors_allowed_origin.as_deref()))
                    .wrap(Logger::default())
                    .app_data(web::Data::new(api_state.clone()))
                    .configure(configure_routes)
            })
            .workers(config.http_workers)
            .bind(&config.http_bind)?
            .run()
            .await
        })
        .map_err(AppError::runtime)
}

fn build_cors(allowed_origin: Option<&str>) -> Cors {
    match allowed_origin {
        Some(origin) => Cors::default()
            .allowed_origin(origin)
            .allowed_methods(vec!["GET", "POST", "PUT"])
            .allow_any_header()
            .max_age(3600),
        None => Cors::permissive(),
    }
}
