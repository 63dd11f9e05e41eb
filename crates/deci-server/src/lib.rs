pub mod config;
pub mod maintenance;
pub mod observability;
pub mod server;

pub use config::{AppConfig, LoggingConfig, LoginConfig, ServerConfig};
pub use maintenance::Maintenance;
pub use observability::init_tracing;
pub use server::{DeciServer, ServerBuilder, Services, build_app};
