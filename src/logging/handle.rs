use std::time::Duration;

use tracing_appender::non_blocking::WorkerGuard;

/// Сколько ждать сброса файлового буфера при shutdown.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle для управления lifecycle логирования.
///
/// Держит `WorkerGuard` файлового вывода; при `shutdown` guard удаляется и
/// буфер сбрасывается на диск.
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
    shutdown_started: bool,
}

impl LoggingHandle {
    pub fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self {
            file_guard,
            shutdown_started: false,
        }
    }

    /// Включён ли файловый вывод.
    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }

    /// Завершение с ожиданием сброса файлового буфера в блокирующем потоке.
    pub async fn shutdown(mut self) {
        self.shutdown_started = true;
        tracing::info!(
            timeout_ms = FLUSH_TIMEOUT.as_millis() as u64,
            file_sink = self.has_file_sink(),
            "Logging shutdown initiated"
        );

        let Some(guard) = self.file_guard.take() else {
            return;
        };
        match tokio::time::timeout(FLUSH_TIMEOUT, tokio::task::spawn_blocking(move || drop(guard))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => eprintln!("Logging shutdown task panicked: {e}"),
            Err(_) => eprintln!(
                "WARNING: Logging shutdown exceeded timeout of {}ms",
                FLUSH_TIMEOUT.as_millis()
            ),
        }
    }
}

impl Drop for LoggingHandle {
    fn drop(&mut self) {
        if self.file_guard.is_some() && !self.shutdown_started {
            eprintln!(
                "WARNING: LoggingHandle dropped without explicit shutdown(). \
                 Some logs may be lost."
            );
        }
    }
}
