mod config;
mod error;
mod logging;
mod runtime;
pub mod services;

pub use error::AppError;
pub use runtime::SystemClock;

pub fn run_api() -> Result<(), AppError> {
    logging::init()?;

    let config = config::AppConfig::from_env()?;

    tracing::info!(
        db_path = %config.db_path,
        http_bind = %config.http_bind,
        http_workers = config.http_workers,
        cors_allowed_origin = config.cors_allowed_origin.as_deref().unwrap_or("*"),
        "application bootstrap initialized"
    );

    runtime::run(config)
}
