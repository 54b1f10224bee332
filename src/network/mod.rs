//! Сетевой слой fleetcast.
//!
//! ## Подмодули
//!
//! - `banner`: баннер запуска, выводимый в лог.
//! - `server`: HTTP-роутер `axum` и запуск с корректным завершением.
//! - `websocket`: соединения зрителей на `/vehicles`.
//! - `health`: эндпоинты `/health*` и проверка актива.

pub mod banner;
pub mod health;
pub mod server;
pub mod websocket;

pub use banner::*;
pub use server::*;
