pub mod auth;
pub mod cli;
pub mod csv_store;
pub mod load_config;
pub mod youtube;

pub use cli::{run, Cli, Commands};
