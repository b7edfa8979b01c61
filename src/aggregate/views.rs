//! The standard report views: monthly trend, per-category daily means,
//! best stores and weakest months.

use super::{AggOp, AggregationResult, GroupField, Measure, Order, aggregate, rank};
use crate::models::SalesRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct ViewSpec {
    pub name: String,
    pub group_by: Vec<GroupField>,
    pub measure: Measure,
    pub op: AggOp,
    /// When set, the view keeps only the ranked top/bottom groups.
    pub ranking: Option<(Order, usize)>,
}

impl ViewSpec {
    pub fn new(name: &str, group_by: &[GroupField], op: AggOp) -> Self {
        Self {
            name: name.to_string(),
            group_by: group_by.to_vec(),
            measure: Measure::Sales,
            op,
            ranking: None,
        }
    }

    pub fn ranked(mut self, order: Order, limit: usize) -> Self {
        self.ranking = Some((order, limit));
        self
    }

    pub fn compute(&self, records: &[SalesRecord]) -> AggregationResult {
        let mut result = aggregate(records, &self.group_by, self.measure, self.op);
        if let Some((order, limit)) = self.ranking {
            result.rows = rank(&result, order, limit);
        }
        result
    }
}

pub fn default_views(top_n: usize, bottom_n: usize) -> Vec<ViewSpec> {
    use GroupField::*;
    vec![
        ViewSpec::new("monthly_trend", &[Year, Month], AggOp::Sum),
        ViewSpec::new("store_type_daily_mean", &[StoreType, Date], AggOp::Mean),
        ViewSpec::new("assortment_daily_mean", &[Assortment, Date], AggOp::Mean),
        ViewSpec::new("promo_daily_mean", &[Promo, Date], AggOp::Mean),
        ViewSpec::new("top_stores", &[Store], AggOp::Sum).ranked(Order::Desc, top_n),
        ViewSpec::new("lowest_months", &[Month], AggOp::Mean).ranked(Order::Asc, bottom_n),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::record;
    use crate::aggregate::{GroupKey, KeyValue};

    #[test]
    fn test_default_views_compute() {
        let records = vec![
            record(1, "2015-01-05", 100.0),
            record(2, "2015-01-05", 300.0),
            record(1, "2015-02-02", 50.0),
        ];
        let views = default_views(1, 1);
        assert_eq!(views.len(), 6);

        let top = views.iter().find(|v| v.name == "top_stores").unwrap().compute(&records);
        assert_eq!(top.rows, vec![(GroupKey(vec![KeyValue::Int(2)]), 300.0)]);

        let low = views.iter().find(|v| v.name == "lowest_months").unwrap().compute(&records);
        assert_eq!(low.rows, vec![(GroupKey(vec![KeyValue::Int(2)]), 50.0)]);

        let promo = views.iter().find(|v| v.name == "promo_daily_mean").unwrap().compute(&records);
        assert_eq!(promo.len(), 3);
    }
}
