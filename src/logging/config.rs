use std::{collections::BTreeMap, fs, io, path::PathBuf};

use serde::{Deserialize, Serialize};

const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Формат строк лога.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Многострочный, для разработки.
    Pretty,
    #[default]
    Compact,
    /// Одна JSON-строка на событие, для сборщиков логов.
    Json,
}

/// Настройки вывода в консоль.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    /// Если не задан, используется общий `format`.
    pub format: Option<LogFormat>,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
}

/// Настройки файлового вывода (ежедневная ротация).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub enabled: bool,
    /// Префикс имени файла; к нему добавляется дата.
    pub file_name: String,
    pub format: LogFormat,
}

/// Конфигурация логирования (секция `[logging]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Базовый уровень: trace, debug, info, warn, error, off.
    pub level: String,
    pub format: LogFormat,
    pub log_dir: PathBuf,
    pub console: ConsoleConfig,
    pub file: FileConfig,
    /// Уровни для отдельных модулей, например `fleetcast::gateway = "debug"`.
    pub modules: BTreeMap<String, String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: None,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            file_name: "fleetcast.log".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            log_dir: PathBuf::from("logs"),
            console: ConsoleConfig::default(),
            file: FileConfig::default(),
            modules: BTreeMap::new(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl LoggingConfig {
    /// Директива для `EnvFilter`: базовый уровень, затем уровни модулей.
    pub fn build_filter_directive(&self) -> String {
        let mut parts = vec![self.level.to_lowercase()];
        parts.extend(
            self.modules
                .iter()
                .map(|(module, level)| format!("{module}={}", level.to_lowercase())),
        );
        parts.join(",")
    }

    pub fn console_format(&self) -> LogFormat {
        self.console.format.unwrap_or(self.format)
    }

    pub fn validate(&self) -> Result<(), String> {
        let check = |what: &str, level: &str| {
            if LEVELS.contains(&level.to_lowercase().as_str()) {
                Ok(())
            } else {
                Err(format!("invalid log level '{level}' for {what}"))
            }
        };
        check("logging.level", &self.level)?;
        for (module, level) in &self.modules {
            check(module, level)?;
        }
        if self.file.enabled && self.file.file_name.trim().is_empty() {
            return Err("logging.file.file_name must not be empty".to_string());
        }
        if !self.console.enabled && !self.file.enabled {
            return Err("at least one of console or file logging must be enabled".to_string());
        }
        Ok(())
    }

    /// Создаёт каталог логов, если включён файловый вывод.
    pub fn ensure_log_dir(&self) -> io::Result<()> {
        if self.file.enabled {
            fs::create_dir_all(&self.log_dir)?;
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_includes_modules() {
        let mut cfg = LoggingConfig {
            level: "WARN".into(),
            ..Default::default()
        };
        cfg.modules.insert("fleetcast::gateway".into(), "debug".into());
        assert_eq!(cfg.build_filter_directive(), "warn,fleetcast::gateway=debug");
    }

    /// Тест проверяет отклонение неизвестного уровня и пустого имени файла.
    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(LoggingConfig::default().validate().is_ok());

        let cfg = LoggingConfig {
            level: "loud".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let mut cfg = LoggingConfig::default();
        cfg.file.enabled = true;
        cfg.file.file_name = " ".into();
        assert!(cfg.validate().is_err());

        let mut cfg = LoggingConfig::default();
        cfg.console.enabled = false;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_console_format_falls_back_to_global() {
        let mut cfg = LoggingConfig {
            format: LogFormat::Json,
            ..Default::default()
        };
        assert_eq!(cfg.console_format(), LogFormat::Json);
        cfg.console.format = Some(LogFormat::Pretty);
        assert_eq!(cfg.console_format(), LogFormat::Pretty);
    }

    #[test]
    fn test_ensure_log_dir_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = LoggingConfig {
            log_dir: tmp.path().join("nested/logs"),
            ..Default::default()
        };
        cfg.ensure_log_dir().unwrap();
        assert!(!cfg.log_dir.exists());

        cfg.file.enabled = true;
        cfg.ensure_log_dir().unwrap();
        assert!(cfg.log_dir.is_dir());
    }
}
