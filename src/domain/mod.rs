//! Core domain types and logic.

pub mod bar;
pub mod indicator;
pub mod anomaly;
pub mod signal;
pub mod classifier;
pub mod position;
pub mod portfolio;
pub mod simulator;
pub mod metrics;
pub mod security_data;
pub mod analysis;
pub mod backtest;
pub mod config;
pub mod config_validation;
pub mod universe;
pub mod engine;
pub mod error;
