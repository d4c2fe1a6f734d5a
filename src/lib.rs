pub mod analyzer;
pub mod config;
pub mod inference;
pub mod server;
