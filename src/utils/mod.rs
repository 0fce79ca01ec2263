pub mod bytes;
pub mod shell;
pub mod ui;
