//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

use crate::adapters::console_notifier::ConsoleNotifier;
use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::BacktestResult;
use crate::domain::config::StrategyConfig;
use crate::domain::config_validation::{
    DEFAULT_INITIAL_CAPITAL, DEFAULT_WARMUP_DAYS, parse_date, validate_backtest_config,
    validate_backtest_params, validate_strategy_config,
};
use crate::domain::engine::{DateRange, SignalEngine, SignalReport};
use crate::domain::error::TraderError;
use crate::domain::universe::resolve_codes;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::notification_port::NotificationPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(
    name = "margintrader",
    about = "Margin and short-balance momentum signals and backtester"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate and deliver graded signals for one trading date
    Analyze {
        #[arg(short, long)]
        config: PathBuf,
        /// Defaults to the latest date present in the data
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Comma-separated codes, overriding [backtest] codes
        #[arg(long)]
        codes: Option<String>,
    },
    /// Replay history through the position simulator
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Report directory, overriding [report] output
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        codes: Option<String>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List symbols available from the data source
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show data range for symbol(s)
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: Option<String>,
    },
    /// Load CSV bar files into the SQLite database
    #[cfg(feature = "sqlite")]
    Import {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        csv_dir: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Analyze {
            config,
            date,
            codes,
        } => run_analyze(&config, date, codes.as_deref()),
        Command::Backtest {
            config,
            output,
            codes,
            start,
            end,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config)
            } else {
                run_backtest(&config, output.as_deref(), codes.as_deref(), start, end)
            }
        }
        Command::Validate { config } => run_validate(&config),
        Command::ListSymbols { config } => run_list_symbols(&config),
        Command::Info { config, code } => run_info(&config, code.as_deref()),
        #[cfg(feature = "sqlite")]
        Command::Import { config, csv_dir } => run_import(&config, &csv_dir),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(&e)
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, TraderError> {
    info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

/// Loads and validates the strategy section of a config.
pub fn load_strategy(config: &dyn ConfigPort) -> Result<StrategyConfig, TraderError> {
    let strategy = StrategyConfig::from_port(config)?;
    validate_strategy_config(&strategy)?;
    Ok(strategy)
}

/// Opens the data source named by `[data] source` (csv or sqlite).
pub fn open_data_port(config: &dyn ConfigPort) -> Result<Box<dyn DataPort>, TraderError> {
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "csv".to_string());

    match source.trim().to_lowercase().as_str() {
        "csv" => {
            let dir = config
                .get_string("data", "csv_dir")
                .unwrap_or_else(|| "data".to_string());
            Ok(Box::new(CsvAdapter::new(PathBuf::from(dir))))
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let adapter = crate::adapters::sqlite_adapter::SqliteAdapter::from_config(config)?;
            adapter.initialize_schema()?;
            Ok(Box::new(adapter))
        }
        other => Err(TraderError::config_invalid(
            "data",
            "source",
            format!("unsupported data source {:?}", other),
        )),
    }
}

/// Backtest range from `[backtest]` dates, with optional overrides.
pub fn build_backtest_range(
    config: &dyn ConfigPort,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<DateRange, TraderError> {
    let start = match start {
        Some(d) => d,
        None => parse_date(config.get_string("backtest", "start_date").as_deref(), "start_date")?,
    };
    let end = match end {
        Some(d) => d,
        None => parse_date(config.get_string("backtest", "end_date").as_deref(), "end_date")?,
    };
    DateRange::new(start, end)
}

/// Latest last-bar date across `codes`.
pub fn latest_data_date(
    data_port: &dyn DataPort,
    codes: &[String],
) -> Result<Option<NaiveDate>, TraderError> {
    let mut latest = None;
    for code in codes {
        if let Some((_, last, _)) = data_port.get_data_range(code)? {
            latest = latest.max(Some(last));
        }
    }
    Ok(latest)
}

pub fn run_analyze_pipeline(
    data_port: &dyn DataPort,
    config: &dyn ConfigPort,
    strategy: &StrategyConfig,
    codes: Vec<String>,
    date: NaiveDate,
    notifier: &dyn NotificationPort,
) -> Result<SignalReport, TraderError> {
    let warmup = config.get_int("backtest", "warmup_days", DEFAULT_WARMUP_DAYS);
    let engine = SignalEngine::new(data_port, strategy, codes).with_warmup_days(warmup);
    let report = engine.generate_signals(date)?;
    notifier.notify(report.date, &report.signals)?;
    Ok(report)
}

pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    config: &dyn ConfigPort,
    strategy: &StrategyConfig,
    codes: Vec<String>,
    range: DateRange,
) -> Result<BacktestResult, TraderError> {
    validate_backtest_params(config)?;
    let initial_capital = config.get_double("backtest", "initial_capital", DEFAULT_INITIAL_CAPITAL);
    let engine = SignalEngine::new(data_port, strategy, codes)
        .with_warmup_days(config.get_int("backtest", "warmup_days", DEFAULT_WARMUP_DAYS))
        .with_risk_free_rate(config.get_double("backtest", "risk_free_rate", 0.0));
    engine.run_backtest(range, initial_capital)
}

fn run_analyze(
    config_path: &Path,
    date: Option<NaiveDate>,
    codes_override: Option<&str>,
) -> Result<(), TraderError> {
    let config = load_config(config_path)?;
    let strategy = load_strategy(&config)?;
    let data_port = open_data_port(&config)?;
    let codes = resolve_codes(codes_override, &config, data_port.as_ref())?;

    let date = match date {
        Some(d) => d,
        None => latest_data_date(data_port.as_ref(), &codes)?.ok_or_else(|| {
            TraderError::NoData {
                code: "all".to_string(),
            }
        })?,
    };

    eprintln!("Analyzing {} securities for {}", codes.len(), date);
    let notifier = ConsoleNotifier::stdout(strategy.trading.holding_days);
    let report = run_analyze_pipeline(data_port.as_ref(), &config, &strategy, codes, date, &notifier)?;

    eprintln!(
        "{} BUY, {} SELL signals",
        report.buys().count(),
        report.sells().count()
    );
    print_degraded(&report.degraded);
    Ok(())
}

fn run_backtest(
    config_path: &Path,
    output: Option<&Path>,
    codes_override: Option<&str>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<(), TraderError> {
    eprintln!("Loading config from {}", config_path.display());
    let config = load_config(config_path)?;
    validate_backtest_params(&config)?;
    let strategy = load_strategy(&config)?;
    let range = build_backtest_range(&config, start, end)?;

    let data_port = open_data_port(&config)?;
    let codes = resolve_codes(codes_override, &config, data_port.as_ref())?;
    eprintln!(
        "Backtesting {} securities from {} to {}",
        codes.len(),
        range.start,
        range.end
    );

    let result = run_backtest_pipeline(data_port.as_ref(), &config, &strategy, codes, range)?;
    print_backtest_summary(&result);

    let output = output
        .map(|p| p.display().to_string())
        .or_else(|| config.get_string("report", "output"));
    if let Some(path) = output {
        CsvReportAdapter::new().write(&result, &path)?;
        eprintln!("Report written to {}", path);
    }
    Ok(())
}

pub fn print_backtest_summary(result: &BacktestResult) {
    let m = &result.metrics;
    eprintln!("\n=== Backtest Results ===");
    eprintln!("Period:            {} to {}", result.start_date, result.end_date);
    eprintln!("Simulated days:    {}", result.simulated_days());
    eprintln!("Initial capital:   {:.2}", result.initial_capital);
    eprintln!("Final equity:      {:.2}", result.final_equity);
    eprintln!("Total return:      {:.2}%", m.total_return * 100.0);
    eprintln!("Annualized return: {:.2}%", m.annualized_return * 100.0);
    eprintln!("Sharpe ratio:      {:.2}", m.sharpe_ratio);
    eprintln!("Max drawdown:      {:.2}%", m.max_drawdown * 100.0);
    eprintln!("Total trades:      {}", m.total_trades);
    eprintln!("Win rate:          {:.2}%", m.win_rate * 100.0);
    eprintln!("Average return:    {:.2}%", m.avg_return * 100.0);

    if !m.per_grade.is_empty() {
        eprintln!("\nBy grade:");
        for (grade, stats) in &m.per_grade {
            eprintln!(
                "  {}: {} trades, win rate {:.2}%, avg return {:.2}%",
                grade,
                stats.trades,
                stats.win_rate() * 100.0,
                stats.avg_return * 100.0
            );
        }
    }
    if !m.exits.is_empty() {
        eprintln!("\nExits:");
        for (reason, count) in &m.exits {
            eprintln!("  {}: {}", reason, count);
        }
    }
    if !result.open_positions.is_empty() {
        eprintln!("\nStill open: {}", result.open_positions.len());
    }
    if !result.dropped.is_empty() {
        eprintln!("Dropped signals: {}", result.dropped.len());
    }
    print_degraded(&result.degraded);
}

fn print_degraded(degraded: &[crate::domain::security_data::DegradedSecurity]) {
    if degraded.is_empty() {
        return;
    }
    eprintln!("\nDegraded securities:");
    for d in degraded {
        eprintln!("  {}", d);
    }
}

pub fn run_dry_run(config_path: &Path) -> Result<(), TraderError> {
    eprintln!("Dry run: validating {}", config_path.display());
    let config = load_config(config_path)?;
    validate_backtest_config(&config)?;
    let strategy = load_strategy(&config)?;
    let range = build_backtest_range(&config, None, None)?;

    eprintln!("\nBacktest:");
    eprintln!("  range: {} to {}", range.start, range.end);
    eprintln!(
        "  initial capital: {:.2}",
        config.get_double("backtest", "initial_capital", DEFAULT_INITIAL_CAPITAL)
    );
    eprintln!("\nIndicators:");
    let p = &strategy.indicators;
    eprintln!(
        "  RSI({}), MA({}/{}/{}), trend lookback {}",
        p.rsi_period, p.ma_short, p.ma_medium, p.ma_long, p.trend_lookback
    );
    eprintln!("\nTrading:");
    let t = &strategy.trading;
    eprintln!(
        "  stop {:.1}%, target {:.1}%, hold {} days, max {} holdings",
        t.stop_loss_pct * 100.0,
        t.take_profit_pct * 100.0,
        t.holding_days,
        t.max_holdings
    );

    match config.get_string("backtest", "codes") {
        Some(codes) => eprintln!("\nUniverse: {}", codes),
        None => eprintln!("\nUniverse: every symbol in the data source"),
    }

    eprintln!("\nDry run complete: configuration is valid");
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), TraderError> {
    eprintln!("Validating config: {}", config_path.display());
    let config = load_config(config_path)?;
    let strategy = load_strategy(&config)?;

    let g = &strategy.grading;
    eprintln!("  RSI bands: oversold < {}, overbought > {}", g.rsi_oversold, g.rsi_overbought);
    eprintln!(
        "  S grade: margin increase > {:.0}%, RSI < {}, decline > {:.0}%",
        g.s_margin_increase * 100.0,
        g.s_rsi,
        g.strong_move_pct * 100.0
    );
    eprintln!(
        "  URGENT grade: short increase > {:.0}%, RSI > {}",
        g.urgent_short_increase * 100.0,
        g.urgent_rsi
    );
    eprintln!(
        "  Price filter: {} to {}",
        strategy.filter.min_price, strategy.filter.max_price
    );
    eprintln!("\nConfiguration is valid");
    Ok(())
}

fn run_list_symbols(config_path: &Path) -> Result<(), TraderError> {
    let config = load_config(config_path)?;
    let data_port = open_data_port(&config)?;
    let symbols = data_port.list_symbols()?;

    if symbols.is_empty() {
        eprintln!("No symbols found");
    } else {
        for symbol in &symbols {
            println!("{}", symbol);
        }
        eprintln!("{} symbols found", symbols.len());
    }
    Ok(())
}

fn run_info(config_path: &Path, code: Option<&str>) -> Result<(), TraderError> {
    let config = load_config(config_path)?;
    let data_port = open_data_port(&config)?;

    let codes = match code {
        Some(c) => vec![c.to_string()],
        None => data_port.list_symbols()?,
    };

    for code in &codes {
        match data_port.get_data_range(code)? {
            Some((first, last, count)) => {
                println!("{}: {} bars, {} to {}", code, count, first, last);
            }
            None => println!("{}: no data", code),
        }
    }
    Ok(())
}

#[cfg(feature = "sqlite")]
fn run_import(config_path: &Path, csv_dir: &Path) -> Result<(), TraderError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;

    let config = load_config(config_path)?;
    let db = SqliteAdapter::from_config(&config)?;
    db.initialize_schema()?;

    let source = CsvAdapter::new(csv_dir.to_path_buf());
    let mut total = 0usize;
    for code in source.list_symbols()? {
        let bars = source.fetch_bars(&code, NaiveDate::MIN, NaiveDate::MAX)?;
        total += db.insert_bars(&bars)?;
        eprintln!("  {}: {} bars", code, bars.len());
    }
    eprintln!("Imported {} bars", total);
    Ok(())
}
