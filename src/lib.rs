pub mod cli;
pub mod config;
pub mod logging;
pub mod observability;
pub mod routing;
pub mod server;
