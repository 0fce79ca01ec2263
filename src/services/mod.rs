pub mod aggregate;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod gate;
pub mod hosts;
pub mod logger;
