use crate::aggregate::RecordFilter;
use crate::forecast::ForecastParams;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub filter: RecordFilter,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Input tables
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourcesConfig {
    #[serde(default = "default_transactions_path")]
    pub transactions: PathBuf,

    #[serde(default = "default_stores_path")]
    pub stores: PathBuf,
}

/// Forecast horizon and model knobs
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForecastConfig {
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,

    #[serde(default)]
    pub model: ForecastParams,
}

/// Ranking sizes for the standard report views
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    #[serde(default = "default_top_stores")]
    pub top_stores: usize,

    #[serde(default = "default_lowest_months")]
    pub lowest_months: usize,
}

/// Where artifacts are written
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_transactions_path() -> PathBuf {
    PathBuf::from("data/train.csv")
}
fn default_stores_path() -> PathBuf {
    PathBuf::from("data/store.csv")
}
fn default_horizon_days() -> u32 {
    90
}
fn default_top_stores() -> usize {
    10
}
fn default_lowest_months() -> usize {
    5
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            transactions: default_transactions_path(),
            stores: default_stores_path(),
        }
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_days: default_horizon_days(),
            model: ForecastParams::default(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_stores: default_top_stores(),
            lowest_months: default_lowest_months(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { dir: default_output_dir() }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::Environment::with_prefix("SALES")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("filter.stores")
                    .with_list_parse_key("filter.state_holidays")
                    .try_parsing(true),
            )
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize()?;
        Ok(app_cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.forecast.horizon_days, 90);
        assert_eq!(cfg.forecast.model.n_changepoints, 25);
        assert_eq!(cfg.report.top_stores, 10);
        assert!(cfg.filter.is_empty());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml = r#"
            [forecast]
            horizon_days = 30

            [forecast.model]
            interval_width = 0.95

            [filter]
            stores = [1, 2]
        "#;
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.forecast.horizon_days, 30);
        assert_eq!(cfg.forecast.model.interval_width, 0.95);
        assert_eq!(cfg.forecast.model.weekly_order, 3);
        assert_eq!(cfg.filter.stores.len(), 2);
        assert_eq!(cfg.sources.stores, PathBuf::from("data/store.csv"));
    }
}
