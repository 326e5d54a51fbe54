pub mod cli;
pub mod load_config;
pub mod telemetry;
pub mod upload;

pub use cli::{run, Cli};
