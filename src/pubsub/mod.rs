//! Подсистема Publish–Subscribe (pub/sub).
//!
//! - `broker`: именованные каналы на `tokio::sync::broadcast` и glob-подписки.
//! - `message`: сырое сообщение брокера.
//! - `subscriber`: подписки на канал и на шаблон.
//! - `bus`: типизированная шина изменений телеметрии поверх брокера.

pub mod broker;
pub mod bus;
pub mod message;
pub mod subscriber;

pub use broker::*;
pub use bus::*;
pub use message::*;
pub use subscriber::*;
