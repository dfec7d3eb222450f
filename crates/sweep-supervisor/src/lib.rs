pub mod error;
pub mod config;
pub mod partition;
pub mod status;
pub mod aggregate;
pub mod fleet;
pub mod dashboard;
pub mod lifecycle;
