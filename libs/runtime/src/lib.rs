//! Process bootstrap for the OData query engine: layered configuration,
//! logging and the connected request processor.

pub mod bootstrap;
pub mod config;
pub mod logging;
pub mod paths;

pub use bootstrap::{bootstrap, Engine};
pub use config::{default_logging_config, AppConfig, DatabaseConfig, LoggingConfig, Section};
pub use logging::init_logging;
