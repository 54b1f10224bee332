pub mod bus;
pub mod command;
pub mod store;
pub mod validation;

// Публичный экспорт всех типов ошибок из вложенных модулей, чтобы упростить
// доступ к ним из внешнего кода.
pub use bus::*;
pub use command::*;
pub use store::*;
pub use validation::*;
