//! Security universe selection.
//!
//! Codes come from `[backtest] codes` when present, otherwise from every
//! symbol the data source knows.

use crate::domain::error::TraderError;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in code list")]
    EmptyToken,

    #[error("duplicate code: {0}")]
    DuplicateCode(String),
}

pub fn parse_codes(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut codes = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let code = trimmed.to_uppercase();
        if !seen.insert(code.clone()) {
            return Err(UniverseError::DuplicateCode(code));
        }
        codes.push(code);
    }

    Ok(codes)
}

/// Explicit codes win over the data source listing. The result is sorted.
pub fn resolve_codes(
    explicit: Option<&str>,
    config: &dyn ConfigPort,
    data_port: &dyn DataPort,
) -> Result<Vec<String>, TraderError> {
    let configured = config.get_string("backtest", "codes");
    let mut codes = match explicit.map(str::to_string).or(configured) {
        Some(list) if !list.trim().is_empty() => parse_codes(&list)
            .map_err(|e| TraderError::config_invalid("backtest", "codes", e.to_string()))?,
        _ => data_port.list_symbols()?,
    };
    codes.sort();
    Ok(codes)
}
