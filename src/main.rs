mod aggregate;
mod cache;
mod cleaner;
mod config;
mod error;
mod export;
mod forecast;
mod kpi;
mod loader;
mod models;
mod pipeline;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::aggregate::{AggOp, Measure, Order, aggregate_by_names, daily_series, rank};
use crate::config::AppConfig;
use crate::forecast::FittedModel;
use crate::cache::SourceCache;
use crate::models::{KpiBundle, SalesRecord};
use crate::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "sales-forecast", about = "Store sales aggregation and forecasting", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Transaction table (overrides config)
    #[arg(long, global = true, env = "SALES_TRANSACTIONS")]
    transactions: Option<PathBuf>,

    /// Store attribute table (overrides config)
    #[arg(long, global = true, env = "SALES_STORES")]
    stores: Option<PathBuf>,

    /// Only these store ids (repeatable)
    #[arg(long = "store", global = true)]
    store_filter: Vec<u32>,

    /// Only these state-holiday categories (repeatable)
    #[arg(long = "holiday", global = true)]
    holiday_filter: Vec<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OpArg {
    Sum,
    Mean,
}

#[derive(Clone, Copy, ValueEnum)]
enum OrderArg {
    Asc,
    Desc,
}

#[derive(Subcommand)]
enum Command {
    /// Full run: forecast, report views and KPIs, written to the output dir
    Report {
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Forecast total daily sales
    Forecast {
        /// Days beyond the last observed date
        #[arg(long)]
        horizon: Option<u32>,

        /// Write the forecast table here instead of printing a preview
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Grouped sum/mean over one or more fields
    Aggregate {
        /// Comma-separated fields, e.g. `year,month` or `store_type,date`
        #[arg(long, value_delimiter = ',', required = true)]
        by: Vec<String>,

        #[arg(long, default_value = "sales")]
        measure: String,

        #[arg(long, value_enum, default_value_t = OpArg::Sum)]
        op: OpArg,

        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Top/bottom groups
    Rank {
        #[arg(long, value_delimiter = ',', required = true)]
        by: Vec<String>,

        #[arg(long, default_value = "sales")]
        measure: String,

        #[arg(long, value_enum, default_value_t = OpArg::Sum)]
        op: OpArg,

        #[arg(long, value_enum, default_value_t = OrderArg::Desc)]
        order: OrderArg,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Summary KPIs
    Kpi,

    /// Write the cleaned (and filtered) record set
    ExportRecords {
        #[arg(short, long, default_value = "out/records.csv")]
        out: PathBuf,
    },
}

impl From<OpArg> for AggOp {
    fn from(op: OpArg) -> Self {
        match op {
            OpArg::Sum => AggOp::Sum,
            OpArg::Mean => AggOp::Mean,
        }
    }
}

impl From<OrderArg> for Order {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::Asc => Order::Asc,
            OrderArg::Desc => Order::Desc,
        }
    }
}

fn print_kpis(kpis: &KpiBundle) {
    println!("─────────────────────────────────");
    println!("  Sales KPIs");
    println!("─────────────────────────────────");
    println!("  Total sales     : {}", utils::fmt_amount(kpis.total_sales));
    println!("  Avg daily sales : {}", utils::fmt_amount(kpis.avg_daily_sales));
    println!("  Best month      : {}", kpis.best_period_key);
    println!("  Top store       : {}", kpis.top_entity_id);
    println!("  Records / days  : {} / {}", utils::fmt_number(kpis.record_count as i64), kpis.distinct_days);
    println!("─────────────────────────────────");
}

/// Filtered records for a one-shot command. The filtered copy is all the
/// command needs, so the cached dataset is released straight away.
fn load_records(config: AppConfig) -> Result<Arc<Vec<SalesRecord>>> {
    let pipeline = Pipeline::new(config);
    let records = pipeline.records()?;
    pipeline.evict();
    if records.is_empty() {
        warn!("no records left after cleaning and filtering");
    }
    Ok(records)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "store_sales_forecast=info,warn",
        1 => "store_sales_forecast=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let mut config = AppConfig::load().context("Failed to load configuration")?;
    if let Some(path) = cli.transactions {
        config.sources.transactions = path;
    }
    if let Some(path) = cli.stores {
        config.sources.stores = path;
    }
    config.filter.stores.extend(cli.store_filter);
    config.filter.state_holidays.extend(cli.holiday_filter);

    match cli.command {
        Command::Report { out } => {
            let _t = utils::Timer::start("Pipeline run");
            let pipeline = Pipeline::new(config);
            let out_dir = out.unwrap_or_else(|| pipeline.config().output.dir.clone());
            let report = pipeline.run().await?;
            SourceCache::global().clear();

            if let Ok(kpis) = &report.kpis {
                print_kpis(kpis);
            }
            if let Some(Ok(top)) = report.view("top_stores") {
                for (i, (key, value)) in top.rows.iter().enumerate() {
                    println!("  #{:<2} store {:<8} {:>16}", i + 1, key.to_string(), utils::fmt_amount(*value));
                }
            }
            for (output, err) in report.failures() {
                error!("{}: {}", output, err);
            }
            for (output, written) in report.write_artifacts(&out_dir) {
                match written {
                    Ok(path) => info!("{} → {:?}", output, path),
                    Err(e) => error!("{}: {}", output, e),
                }
            }
            info!(
                "Done: {} records | {} unmatched | {} closed/zero",
                report.record_count, report.load.dropped_unmatched, report.load.dropped_filtered
            );
        }

        Command::Forecast { horizon, out } => {
            let _t = utils::Timer::start("Forecast");
            let horizon = horizon.unwrap_or(config.forecast.horizon_days);
            let params = config.forecast.model.clone();
            let records = load_records(config)?;
            let series = daily_series(&records);
            if series.is_empty() {
                anyhow::bail!("nothing to forecast: no sales left after filtering");
            }
            if let (Some(first), Some(last)) = (series.first_date(), series.last_date()) {
                info!("history: {} days ({} → {})", series.len(), first, last);
            }
            let model = FittedModel::fit(&series, &params).context("forecast failed")?;
            info!(
                "fit: residual std {} | slope {}/day",
                utils::fmt_amount(model.residual_std()),
                utils::fmt_amount(model.daily_slope())
            );
            let points = model.predict(horizon)?;

            match out {
                Some(path) => export::forecast_to_file(&path, &points)?,
                None => {
                    println!(
                        "{:<12} {:>14} {:>12} {:>14} {:>14} {:>14}",
                        "ds", "trend", "seasonal", "yhat", "lower", "upper"
                    );
                    for p in points.iter().rev().take(horizon.max(7) as usize).rev() {
                        println!(
                            "{:<12} {:>14.2} {:>12.2} {:>14.2} {:>14.2} {:>14.2}",
                            p.date,
                            p.trend,
                            p.seasonal(),
                            p.yhat,
                            p.yhat_lower,
                            p.yhat_upper
                        );
                    }
                }
            }
        }

        Command::Aggregate { by, measure, op, out } => {
            let measure: Measure = measure.parse()?;
            let records = load_records(config)?;
            let result = aggregate_by_names(&records, &by, measure, op.into())?;
            if result.is_empty() {
                warn!("no groups to report");
            }

            match out {
                Some(path) => export::aggregation_to_file(&path, &result)?,
                None => export::write_aggregation(std::io::stdout().lock(), &result)?,
            }
        }

        Command::Rank { by, measure, op, order, limit } => {
            let measure: Measure = measure.parse()?;
            let records = load_records(config)?;
            let result = aggregate_by_names(&records, &by, measure, op.into())?;
            for (i, (key, value)) in rank(&result, order.into(), limit).iter().enumerate() {
                println!("{:>3}. {:<24} {:>16}", i + 1, key.to_string(), utils::fmt_amount(*value));
            }
        }

        Command::Kpi => {
            let records = load_records(config)?;
            print_kpis(&kpi::summarize(&records)?);
        }

        Command::ExportRecords { out } => {
            let records = load_records(config)?;
            export::records_to_file(&out, &records)?;
            println!("{} records written to {:?}", utils::fmt_number(records.len() as i64), out);
        }
    }

    Ok(())
}
