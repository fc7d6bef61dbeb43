pub mod config;
pub mod date;
pub mod logging;
pub mod path;
