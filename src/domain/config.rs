//! Immutable strategy configuration, read once from a [`ConfigPort`].

use crate::domain::anomaly::AnomalyThresholds;
use crate::domain::classifier::GradeThresholds;
use crate::domain::error::TraderError;
use crate::domain::indicator::IndicatorParams;
use crate::domain::signal::PriceFilter;
use crate::domain::simulator::TradingParams;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyConfig {
    pub anomaly: AnomalyThresholds,
    pub indicators: IndicatorParams,
    pub grading: GradeThresholds,
    pub trading: TradingParams,
    pub filter: PriceFilter,
}

impl StrategyConfig {
    /// Every key is optional; missing keys keep their default.
    pub fn from_port(config: &dyn ConfigPort) -> Result<Self, TraderError> {
        let defaults = StrategyConfig::default();

        let anomaly = AnomalyThresholds {
            margin_increase: config.get_double(
                "anomaly",
                "margin_increase_threshold",
                defaults.anomaly.margin_increase,
            ),
            margin_usage: config.get_double(
                "anomaly",
                "margin_usage_threshold",
                defaults.anomaly.margin_usage,
            ),
            short_increase: config.get_double(
                "anomaly",
                "short_increase_threshold",
                defaults.anomaly.short_increase,
            ),
            short_to_margin: config.get_double(
                "anomaly",
                "short_to_margin_ratio",
                defaults.anomaly.short_to_margin,
            ),
        };

        let ind = &defaults.indicators;
        let indicators = IndicatorParams {
            rsi_period: get_count(config, "indicator", "rsi_period", ind.rsi_period)?,
            ma_short: get_count(config, "indicator", "ma_short", ind.ma_short)?,
            ma_medium: get_count(config, "indicator", "ma_medium", ind.ma_medium)?,
            ma_long: get_count(config, "indicator", "ma_long", ind.ma_long)?,
            trend_lookback: get_count(config, "indicator", "trend_lookback", ind.trend_lookback)?,
        };

        let g = &defaults.grading;
        let grading = GradeThresholds {
            rsi_oversold: config.get_double("indicator", "rsi_oversold", g.rsi_oversold),
            rsi_overbought: config.get_double("indicator", "rsi_overbought", g.rsi_overbought),
            s_margin_increase: config.get_double("grade", "s_margin_increase", g.s_margin_increase),
            s_rsi: config.get_double("grade", "s_rsi", g.s_rsi),
            strong_move_pct: config.get_double("grade", "strong_move_pct", g.strong_move_pct),
            a_margin_increase: config.get_double("grade", "a_margin_increase", g.a_margin_increase),
            urgent_short_increase: config.get_double(
                "grade",
                "urgent_short_increase",
                g.urgent_short_increase,
            ),
            urgent_rsi: config.get_double("grade", "urgent_rsi", g.urgent_rsi),
        };

        let t = &defaults.trading;
        let trading = TradingParams {
            holding_days: config.get_int("trading", "holding_days", t.holding_days),
            stop_loss_pct: config.get_double("trading", "stop_loss", t.stop_loss_pct),
            take_profit_pct: config.get_double("trading", "take_profit", t.take_profit_pct),
            max_holdings: get_count(config, "trading", "max_holdings", t.max_holdings)?,
            max_position_size: config.get_double(
                "trading",
                "max_position_size",
                t.max_position_size,
            ),
            total_position_limit: config.get_double(
                "trading",
                "total_position_limit",
                t.total_position_limit,
            ),
        };

        let filter = PriceFilter {
            min_price: config.get_double("filter", "min_price", defaults.filter.min_price),
            max_price: config.get_double("filter", "max_price", defaults.filter.max_price),
        };

        Ok(StrategyConfig {
            anomaly,
            indicators,
            grading,
            trading,
            filter,
        })
    }
}

fn get_count(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, TraderError> {
    let value = config.get_int(section, key, default as i64);
    usize::try_from(value)
        .map_err(|_| TraderError::config_invalid(section, key, format!("{} must not be negative", key)))
}
