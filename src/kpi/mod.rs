//! Summary cards: totals, per-day average, best month, top store.

use crate::aggregate::{AggOp, GroupField, KeyValue, Measure, aggregate};
use crate::error::{PipelineError, Result};
use crate::models::{KpiBundle, SalesRecord};

/// Highest value wins; ties go to the lowest key.
fn argmax_lowest_key(rows: &[(i64, f64)]) -> Option<i64> {
    rows.iter()
        .copied()
        .reduce(|best, cur| {
            if cur.1 > best.1 || (cur.1 == best.1 && cur.0 < best.0) {
                cur
            } else {
                best
            }
        })
        .map(|(k, _)| k)
}

fn int_keyed(records: &[SalesRecord], field: GroupField) -> Vec<(i64, f64)> {
    aggregate(records, &[field], Measure::Sales, AggOp::Sum)
        .rows
        .into_iter()
        .filter_map(|(key, v)| match key.values() {
            [KeyValue::Int(k)] => Some((*k, v)),
            _ => None,
        })
        .collect()
}

pub fn summarize(records: &[SalesRecord]) -> Result<KpiBundle> {
    if records.is_empty() {
        return Err(PipelineError::EmptyDataset);
    }

    let total_sales: f64 = records.iter().map(|r| r.sales).sum();

    let per_day = aggregate(records, &[GroupField::Date], Measure::Sales, AggOp::Sum);
    let distinct_days = per_day.len();
    let avg_daily_sales = per_day.total() / distinct_days as f64;

    let best_month = argmax_lowest_key(&int_keyed(records, GroupField::Month))
        .ok_or(PipelineError::EmptyDataset)?;
    let top_store = argmax_lowest_key(&int_keyed(records, GroupField::Store))
        .ok_or(PipelineError::EmptyDataset)?;

    Ok(KpiBundle {
        total_sales,
        avg_daily_sales,
        best_period_key: best_month as u32,
        top_entity_id: top_store as u32,
        record_count: records.len(),
        distinct_days,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::record;

    #[test]
    fn test_avg_daily_is_mean_of_daily_totals() {
        let records = vec![
            record(1, "2015-03-01", 100.0),
            record(2, "2015-03-01", 100.0),
            record(3, "2015-03-01", 100.0),
            record(1, "2015-03-02", 200.0),
            record(2, "2015-03-02", 300.0),
        ];
        let kpi = summarize(&records).unwrap();
        assert_eq!(kpi.total_sales, 800.0);
        assert_eq!(kpi.avg_daily_sales, 400.0);
        assert_eq!(kpi.distinct_days, 2);
        assert_eq!(kpi.record_count, 5);
    }

    #[test]
    fn test_best_month_and_top_store() {
        let records = vec![
            record(4, "2014-12-01", 500.0),
            record(9, "2015-01-10", 300.0),
            record(9, "2014-01-10", 300.0),
            record(2, "2015-06-01", 100.0),
        ];
        let kpi = summarize(&records).unwrap();
        // January (600, across years) beats December (500).
        assert_eq!(kpi.best_period_key, 1);
        assert_eq!(kpi.top_entity_id, 9);
    }

    #[test]
    fn test_ties_go_to_lowest_key() {
        let records = vec![
            record(7, "2015-05-01", 100.0),
            record(3, "2015-02-01", 100.0),
        ];
        let kpi = summarize(&records).unwrap();
        assert_eq!(kpi.best_period_key, 2);
        assert_eq!(kpi.top_entity_id, 3);
    }

    #[test]
    fn test_empty_records_fail() {
        assert!(matches!(summarize(&[]), Err(PipelineError::EmptyDataset)));
    }
}
