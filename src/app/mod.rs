pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod logging;
pub mod models;
pub mod session;
pub mod tools;
