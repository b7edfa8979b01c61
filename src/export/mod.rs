//! Delimited-text (and JSON) artifacts for the presentation layer.

use crate::aggregate::AggregationResult;
use crate::error::{PipelineError, Result};
use crate::models::{ForecastPoint, KpiBundle, SalesRecord};
use chrono::NaiveDate;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

#[derive(Serialize)]
struct ForecastRow {
    ds: NaiveDate,
    trend: f64,
    yhat: f64,
    yhat_lower: f64,
    yhat_upper: f64,
}

fn export_err(path: &Path, e: impl ToString) -> PipelineError {
    PipelineError::Export {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// `ds,trend,yhat,yhat_lower,yhat_upper`, one row per date.
pub fn write_forecast<W: Write>(out: W, points: &[ForecastPoint]) -> csv::Result<()> {
    let mut w = csv::Writer::from_writer(out);
    if points.is_empty() {
        w.write_record(["ds", "trend", "yhat", "yhat_lower", "yhat_upper"])?;
    }
    for p in points {
        w.serialize(ForecastRow {
            ds: p.date,
            trend: p.trend,
            yhat: p.yhat,
            yhat_lower: p.yhat_lower,
            yhat_upper: p.yhat_upper,
        })?;
    }
    w.flush()?;
    Ok(())
}

/// Group field names as leading columns, then `<op>_<measure>`.
pub fn write_aggregation<W: Write>(out: W, result: &AggregationResult) -> csv::Result<()> {
    let mut w = csv::Writer::from_writer(out);

    let value_col = format!(
        "{}_{}",
        match result.op {
            crate::aggregate::AggOp::Sum => "sum",
            crate::aggregate::AggOp::Mean => "mean",
        },
        result.measure.name()
    );
    let mut header: Vec<String> = result.group_by.iter().map(|f| f.name().to_string()).collect();
    header.push(value_col);
    w.write_record(&header)?;

    for (key, value) in &result.rows {
        let mut row: Vec<String> = key.values().iter().map(|v| v.to_string()).collect();
        row.push(value.to_string());
        w.write_record(&row)?;
    }
    w.flush()?;
    Ok(())
}

/// Every cleaned field, one row per record.
pub fn write_records<W: Write>(out: W, records: &[SalesRecord]) -> csv::Result<()> {
    let mut w = csv::Writer::from_writer(out);
    if records.is_empty() {
        w.write_record(SalesRecord::FIELDS)?;
    }
    for r in records {
        w.serialize(r)?;
    }
    w.flush()?;
    Ok(())
}

// ── File helpers ──────────────────────────────────────────────────────────────

fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| export_err(path, e))?;
    }
    let file = File::create(path).map_err(|e| export_err(path, e))?;
    Ok(BufWriter::new(file))
}

pub fn forecast_to_file(path: &Path, points: &[ForecastPoint]) -> Result<()> {
    write_forecast(create(path)?, points).map_err(|e| export_err(path, e))?;
    info!("forecast: {} rows → {:?}", points.len(), path);
    Ok(())
}

pub fn aggregation_to_file(path: &Path, result: &AggregationResult) -> Result<()> {
    write_aggregation(create(path)?, result).map_err(|e| export_err(path, e))?;
    info!("aggregation: {} groups → {:?}", result.len(), path);
    Ok(())
}

pub fn records_to_file(path: &Path, records: &[SalesRecord]) -> Result<()> {
    write_records(create(path)?, records).map_err(|e| export_err(path, e))?;
    info!("records: {} rows → {:?}", records.len(), path);
    Ok(())
}

pub fn kpis_to_file(path: &Path, kpis: &KpiBundle) -> Result<()> {
    let mut out = create(path)?;
    serde_json::to_writer_pretty(&mut out, kpis).map_err(|e| export_err(path, e))?;
    out.flush().map_err(|e| export_err(path, e))?;
    info!("kpis → {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::record;
    use crate::aggregate::{AggOp, GroupField, Measure, aggregate};

    fn point(day: u32, yhat: f64) -> ForecastPoint {
        ForecastPoint {
            date: NaiveDate::from_ymd_opt(2015, 8, day).unwrap(),
            trend: yhat - 1.0,
            seasonal_weekly: 1.0,
            seasonal_yearly: 0.0,
            yhat,
            yhat_lower: yhat - 10.0,
            yhat_upper: yhat + 10.0,
            actual: None,
        }
    }

    #[test]
    fn test_forecast_csv_layout() {
        let mut buf = Vec::new();
        write_forecast(&mut buf, &[point(1, 100.0), point(2, 110.5)]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ds,trend,yhat,yhat_lower,yhat_upper");
        assert_eq!(lines[1], "2015-08-01,99.0,100.0,90.0,110.0");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_empty_forecast_still_has_header() {
        let mut buf = Vec::new();
        write_forecast(&mut buf, &[]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap().trim(), "ds,trend,yhat,yhat_lower,yhat_upper");
    }

    #[test]
    fn test_empty_records_still_have_header() {
        let mut buf = Vec::new();
        write_records(&mut buf, &[]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().collect::<Vec<_>>(), vec![SalesRecord::FIELDS.join(",")]);
    }

    #[test]
    fn test_aggregation_csv_layout() {
        let records = vec![record(1, "2015-01-01", 10.0), record(1, "2015-02-01", 5.0)];
        let result = aggregate(&records, &[GroupField::Year, GroupField::Month], Measure::Sales, AggOp::Sum);
        let mut buf = Vec::new();
        write_aggregation(&mut buf, &result).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "year,month,sum_sales\n2015,1,10\n2015,2,5\n");
    }

    #[test]
    fn test_records_csv_has_all_fields() {
        let mut buf = Vec::new();
        write_records(&mut buf, &[record(3, "2015-01-01", 10.0)]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(header, SalesRecord::FIELDS.join(","));
        assert!(text.lines().nth(1).unwrap().starts_with("3,2015-01-01,10.0,1,true,false"));
    }
}
