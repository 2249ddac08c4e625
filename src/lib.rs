#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod cache;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod data;
pub mod feed;
pub mod model;
pub mod projection;
pub mod protocol;
pub mod script;
pub mod telemetry;
pub mod viewport;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::replay;
