//! Pipeline orchestrator: sources → cleaned records → outputs.
//!
//! ## Run
//!
//! `run()`:
//!   1. Load + clean both tables through the source cache (fatal on failure)
//!   2. Apply the record filter
//!   3. Forecast, every report view and the KPI bundle run as independent
//!      blocking tasks over the same immutable record set
//!   Each output carries its own `Result`; one failing never hides another.

use crate::aggregate::views::{ViewSpec, default_views};
use crate::aggregate::{AggregationResult, daily_series};
use crate::cache::SourceCache;
use crate::cleaner::{Dataset, LoadReport, clean};
use crate::config::AppConfig;
use crate::error::{PipelineError, Result};
use crate::export;
use crate::forecast::fit_and_forecast_with;
use crate::kpi::summarize;
use crate::loader::{SourceKey, load_stores, load_transactions};
use crate::models::{ForecastPoint, KpiBundle, SalesRecord};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const FORECAST_OUTPUT: &str = "forecast";
pub const KPI_OUTPUT: &str = "kpis";

pub struct Pipeline<'c> {
    config: AppConfig,
    cache: &'c SourceCache,
}

impl Pipeline<'static> {
    /// Pipeline backed by the process-wide cache.
    pub fn new(config: AppConfig) -> Self {
        Self::with_cache(config, SourceCache::global())
    }
}

impl<'c> Pipeline<'c> {
    pub fn with_cache(config: AppConfig, cache: &'c SourceCache) -> Self {
        Self { config, cache }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn source_key(&self) -> SourceKey {
        SourceKey::new(&self.config.sources.transactions, &self.config.sources.stores)
    }

    /// Cleaned dataset for the configured sources, loaded at most once.
    pub fn load(&self) -> Result<Arc<Dataset>> {
        let sources = &self.config.sources;
        let key = self.source_key();
        if self.cache.contains(&key) {
            debug!("cache hit for {:?}", key);
        }
        self.cache.get_or_load(&key, || {
            let transactions = load_transactions(&sources.transactions)?;
            let stores = load_stores(&sources.stores)?;
            Ok(clean(&transactions, &stores))
        })
    }

    fn filtered(&self, dataset: &Dataset) -> Arc<Vec<SalesRecord>> {
        let filter = &self.config.filter;
        let records = if filter.is_empty() {
            dataset.records.clone()
        } else {
            let kept = filter.apply(&dataset.records);
            info!("filter: {} of {} records kept", kept.len(), dataset.records.len());
            kept
        };
        Arc::new(records)
    }

    /// Cleaned records with the configured filter applied.
    pub fn records(&self) -> Result<Arc<Vec<SalesRecord>>> {
        let dataset = self.load()?;
        Ok(self.filtered(&dataset))
    }

    /// Drop this pipeline's dataset from the cache; true if one was held.
    pub fn evict(&self) -> bool {
        self.cache.invalidate(&self.source_key())
    }

    pub fn views(&self) -> Vec<ViewSpec> {
        default_views(self.config.report.top_stores, self.config.report.lowest_months)
    }

    pub async fn run(&self) -> Result<PipelineReport> {
        let dataset = self.load()?;
        let records = self.filtered(&dataset);

        info!("=== {} records → forecast, {} views, kpis ===", records.len(), self.views().len());

        let horizon = self.config.forecast.horizon_days;
        let params = self.config.forecast.model.clone();
        let forecast_task = {
            let records = Arc::clone(&records);
            tokio::task::spawn_blocking(move || {
                let series = daily_series(&records);
                fit_and_forecast_with(&series, horizon, &params)
            })
        };

        let view_tasks: Vec<(String, JoinHandle<Result<AggregationResult>>)> = self
            .views()
            .into_iter()
            .map(|view| {
                let records = Arc::clone(&records);
                let name = view.name.clone();
                let handle = tokio::task::spawn_blocking(move || Ok(view.compute(&records)));
                (name, handle)
            })
            .collect();

        let kpi_task = {
            let records = Arc::clone(&records);
            tokio::task::spawn_blocking(move || summarize(&records))
        };

        let forecast = join(FORECAST_OUTPUT, forecast_task).await;
        let mut views = Vec::with_capacity(view_tasks.len());
        for (name, handle) in view_tasks {
            let result = join(&name, handle).await;
            views.push((name, result));
        }
        let kpis = join(KPI_OUTPUT, kpi_task).await;

        let report = PipelineReport {
            load: dataset.report.clone(),
            record_count: records.len(),
            forecast,
            views,
            kpis,
        };

        for (output, err) in report.failures() {
            warn!("{} failed: {}", output, err);
        }
        info!(
            "=== Done: {} outputs ok | {} failed ===",
            report.output_count() - report.failures().len(),
            report.failures().len()
        );

        Ok(report)
    }
}

async fn join<T>(name: &str, handle: JoinHandle<Result<T>>) -> Result<T> {
    match handle.await {
        Ok(result) => result,
        Err(e) => {
            error!("Task panic for {}: {}", name, e);
            Err(PipelineError::TaskFailed(name.to_string()))
        }
    }
}

/// Per-output results of one run.
#[derive(Debug)]
pub struct PipelineReport {
    pub load: LoadReport,
    pub record_count: usize,
    pub forecast: Result<Vec<ForecastPoint>>,
    pub views: Vec<(String, Result<AggregationResult>)>,
    pub kpis: Result<KpiBundle>,
}

impl PipelineReport {
    pub fn output_count(&self) -> usize {
        self.views.len() + 2
    }

    pub fn view(&self, name: &str) -> Option<&Result<AggregationResult>> {
        self.views.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    /// Every failed output, named.
    pub fn failures(&self) -> Vec<(&str, &PipelineError)> {
        let mut out = Vec::new();
        if let Err(e) = &self.forecast {
            out.push((FORECAST_OUTPUT, e));
        }
        for (name, result) in &self.views {
            if let Err(e) = result {
                out.push((name.as_str(), e));
            }
        }
        if let Err(e) = &self.kpis {
            out.push((KPI_OUTPUT, e));
        }
        out
    }

    /// Write every successful output under `dir`. Failed outputs produce no
    /// file; a write failure is reported against that output alone.
    pub fn write_artifacts(&self, dir: &Path) -> Vec<(String, Result<PathBuf>)> {
        let mut written = Vec::new();

        if let Ok(points) = &self.forecast {
            let path = dir.join("forecast.csv");
            let result = export::forecast_to_file(&path, points).map(|_| path);
            written.push((FORECAST_OUTPUT.to_string(), result));
        }
        for (name, result) in &self.views {
            if let Ok(agg) = result {
                let path = dir.join(format!("{name}.csv"));
                let result = export::aggregation_to_file(&path, agg).map(|_| path);
                written.push((name.clone(), result));
            }
        }
        if let Ok(kpis) = &self.kpis {
            let path = dir.join("kpis.json");
            let result = export::kpis_to_file(&path, kpis).map(|_| path);
            written.push((KPI_OUTPUT.to_string(), result));
        }

        written
    }
}
