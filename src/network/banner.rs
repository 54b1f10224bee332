use std::env;

use chrono::{DateTime, Local};
use tracing::info;

/// Полный баннер с информацией о сервере.
pub const ASCII_FULL: &str = r#"
    fleetcast {version}
    ----------------------------------------------
    Mode:             {mode}
    Listening:        {listen}
    Storage:          {storage}
    Sync interval:    {interval} ms
    Auto sync:        {auto_sync}
    PID:              {pid}
    OS/Arch:          {os}/{arch}
    Build:            {git} ({build_time})
"#;

/// Компактный баннер.
pub const ASCII_COMPACT: &str = "fleetcast {version} | {mode} | {listen} | {storage} | PID {pid}";

/// Параметры, выводимые в баннере.
#[derive(Debug, Clone)]
pub struct BannerInfo<'a> {
    pub listen: &'a str,
    pub storage: &'a str,
    pub sync_interval_ms: u64,
    pub auto_sync: bool,
}

/// Выводит баннер сервера в лог построчно.
///
/// Режим выбирается переменной `FLEETCAST_BANNER` (`full` или `compact`);
/// по умолчанию полный в debug-сборке и компактный в release.
pub fn log_banner(info: &BannerInfo<'_>) {
    let forced = env::var("FLEETCAST_BANNER").ok();
    let full = match forced.as_deref() {
        Some("full") => true,
        Some("compact") => false,
        _ => cfg!(debug_assertions),
    };
    let template = if full { ASCII_FULL } else { ASCII_COMPACT };

    for line in render(template, info).lines().filter(|l| !l.trim().is_empty()) {
        info!("{line}");
    }
}

/// Подставляет значения в шаблон баннера.
pub fn render(
    template: &str,
    info: &BannerInfo<'_>,
) -> String {
    let version = env!("CARGO_PKG_VERSION");
    let bits = std::mem::size_of::<usize>() * 8;
    let mode = if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    };

    let git = option_env!("GIT_COMMIT").unwrap_or("unknown");
    let build_time_raw = option_env!("BUILD_TIME").unwrap_or("unknown");
    let build_time = match DateTime::parse_from_rfc3339(build_time_raw) {
        Ok(dt) => dt
            .with_timezone(&Local)
            .format("%d.%m.%Y %H:%M:%S")
            .to_string(),
        Err(_) => build_time_raw.to_string(),
    };

    template
        .replace("{version}", &format!("{version} ({bits}-bit)"))
        .replace("{mode}", mode)
        .replace("{listen}", info.listen)
        .replace("{storage}", info.storage)
        .replace("{interval}", &info.sync_interval_ms.to_string())
        .replace("{auto_sync}", if info.auto_sync { "on" } else { "off" })
        .replace("{pid}", &std::process::id().to_string())
        .replace("{os}", env::consts::OS)
        .replace("{arch}", env::consts::ARCH)
        .replace("{git}", git)
        .replace("{build_time}", &build_time)
}
