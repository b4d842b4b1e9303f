pub mod cli;
pub mod convert_client;
pub mod json_store;
pub mod load_config;

pub use cli::{run, Cli, Commands};
