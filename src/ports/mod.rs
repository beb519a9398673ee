//! Port traits the domain depends on. Adapters implement them.

pub mod config_port;
pub mod data_port;
pub mod notification_port;
pub mod report_port;
