//! Configuration validation.
//!
//! Runs before any analysis or backtest so that a bad value fails fast with
//! the section and key that caused it.

use crate::domain::config::StrategyConfig;
use crate::domain::error::TraderError;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub const DEFAULT_INITIAL_CAPITAL: f64 = 1_000_000.0;
pub const DEFAULT_WARMUP_DAYS: i64 = 120;

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    validate_backtest_params(config)?;
    validate_dates(config)?;
    Ok(())
}

/// The `[backtest]` keys other than the dates.
pub fn validate_backtest_params(config: &dyn ConfigPort) -> Result<(), TraderError> {
    validate_initial_capital(config)?;
    validate_risk_free_rate(config)?;
    validate_warmup_days(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &StrategyConfig) -> Result<(), TraderError> {
    validate_indicators(config)?;
    validate_rsi_bands(config)?;
    validate_anomaly_thresholds(config)?;
    validate_trading(config)?;
    validate_price_filter(config)?;
    Ok(())
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let value = config.get_double("backtest", "initial_capital", DEFAULT_INITIAL_CAPITAL);
    if value <= 0.0 {
        return Err(TraderError::config_invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let value = config.get_double("backtest", "risk_free_rate", 0.0);
    if !(0.0..1.0).contains(&value) {
        return Err(TraderError::config_invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_warmup_days(config: &dyn ConfigPort) -> Result<(), TraderError> {
    if config.get_int("backtest", "warmup_days", DEFAULT_WARMUP_DAYS) < 0 {
        return Err(TraderError::config_invalid(
            "backtest",
            "warmup_days",
            "warmup_days must be non-negative",
        ));
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let start_date = parse_date(config.get_string("backtest", "start_date").as_deref(), "start_date")?;
    let end_date = parse_date(config.get_string("backtest", "end_date").as_deref(), "end_date")?;

    if start_date > end_date {
        return Err(TraderError::config_invalid(
            "backtest",
            "start_date",
            "start_date must not be after end_date",
        ));
    }
    Ok(())
}

pub fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate, TraderError> {
    match value {
        None => Err(TraderError::ConfigMissing {
            section: "backtest".to_string(),
            key: field.to_string(),
        }),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            TraderError::config_invalid(
                "backtest",
                field,
                format!("invalid {} format, expected YYYY-MM-DD", field),
            )
        }),
    }
}

fn validate_indicators(config: &StrategyConfig) -> Result<(), TraderError> {
    let p = &config.indicators;
    for (key, value) in [
        ("rsi_period", p.rsi_period),
        ("ma_short", p.ma_short),
        ("ma_medium", p.ma_medium),
        ("ma_long", p.ma_long),
        ("trend_lookback", p.trend_lookback),
    ] {
        if value < 1 {
            return Err(TraderError::config_invalid(
                "indicator",
                key,
                format!("{} must be at least 1", key),
            ));
        }
    }
    Ok(())
}

fn validate_rsi_bands(config: &StrategyConfig) -> Result<(), TraderError> {
    let g = &config.grading;
    for (section, key, value) in [
        ("indicator", "rsi_oversold", g.rsi_oversold),
        ("indicator", "rsi_overbought", g.rsi_overbought),
        ("grade", "s_rsi", g.s_rsi),
        ("grade", "urgent_rsi", g.urgent_rsi),
    ] {
        if !(0.0..=100.0).contains(&value) {
            return Err(TraderError::config_invalid(
                section,
                key,
                format!("{} must be between 0 and 100", key),
            ));
        }
    }
    if g.rsi_oversold >= g.rsi_overbought {
        return Err(TraderError::config_invalid(
            "indicator",
            "rsi_oversold",
            "rsi_oversold must be below rsi_overbought",
        ));
    }
    if g.strong_move_pct < 0.0 {
        return Err(TraderError::config_invalid(
            "grade",
            "strong_move_pct",
            "strong_move_pct must be non-negative",
        ));
    }
    Ok(())
}

fn validate_anomaly_thresholds(config: &StrategyConfig) -> Result<(), TraderError> {
    let a = &config.anomaly;
    for (key, value) in [
        ("margin_increase_threshold", a.margin_increase),
        ("margin_usage_threshold", a.margin_usage),
        ("short_increase_threshold", a.short_increase),
        ("short_to_margin_ratio", a.short_to_margin),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(TraderError::config_invalid(
                "anomaly",
                key,
                format!("{} must be a non-negative number", key),
            ));
        }
    }
    Ok(())
}

fn validate_trading(config: &StrategyConfig) -> Result<(), TraderError> {
    let t = &config.trading;
    if t.holding_days < 1 {
        return Err(TraderError::config_invalid(
            "trading",
            "holding_days",
            "holding_days must be at least 1",
        ));
    }
    if !(t.stop_loss_pct < 0.0 && t.stop_loss_pct > -1.0) {
        return Err(TraderError::config_invalid(
            "trading",
            "stop_loss",
            "stop_loss must be between -1 and 0 (exclusive)",
        ));
    }
    if t.take_profit_pct <= 0.0 {
        return Err(TraderError::config_invalid(
            "trading",
            "take_profit",
            "take_profit must be positive",
        ));
    }
    if t.max_holdings < 1 {
        return Err(TraderError::config_invalid(
            "trading",
            "max_holdings",
            "max_holdings must be at least 1",
        ));
    }
    if t.max_position_size <= 0.0 || t.max_position_size > 1.0 {
        return Err(TraderError::config_invalid(
            "trading",
            "max_position_size",
            "max_position_size must be between 0 and 1",
        ));
    }
    if t.total_position_limit < t.max_position_size || t.total_position_limit > 1.0 {
        return Err(TraderError::config_invalid(
            "trading",
            "total_position_limit",
            "total_position_limit must be between max_position_size and 1",
        ));
    }
    Ok(())
}

fn validate_price_filter(config: &StrategyConfig) -> Result<(), TraderError> {
    let f = &config.filter;
    if f.min_price < 0.0 || f.min_price >= f.max_price {
        return Err(TraderError::config_invalid(
            "filter",
            "min_price",
            "min_price must be non-negative and below max_price",
        ));
    }
    Ok(())
}
