//! Логирование на базе `tracing`.
//!
//! - `config`: секция `[logging]` настроек.
//! - `filters`: `EnvFilter` из конфигурации, `RUST_LOG` имеет приоритет.
//! - `formatter`: pretty/compact/json слои.
//! - `sinks`: консоль и файл с ежедневной ротацией.
//! - `handle`: `LoggingHandle`, сбрасывающий файловый буфер при завершении.

pub mod config;
mod filters;
mod formatter;
pub mod handle;
pub mod sinks;

use std::error::Error;

pub use config::{ConsoleConfig, FileConfig, LogFormat, LoggingConfig};
pub use handle::LoggingHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

/// Инициализация глобального подписчика по конфигурации.
///
/// Возвращает ошибку, если конфигурация некорректна или подписчик уже
/// установлен.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingHandle, Box<dyn Error + Send + Sync>> {
    config.validate()?;
    config.ensure_log_dir()?;

    let env_filter = filters::build_filter_from_config(config);
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console.enabled {
        layers.push(sinks::console::layer_with_config(config));
    }

    let file_guard = if config.file.enabled {
        let (file_layer, guard) = sinks::file::layer_with_config(config);
        layers.push(file_layer);
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        directive = %config.build_filter_directive(),
        log_dir = %config.log_dir.display(),
        console_enabled = config.console.enabled,
        file_enabled = config.file.enabled,
        "Logging system initialized"
    );

    Ok(LoggingHandle::new(file_guard))
}
