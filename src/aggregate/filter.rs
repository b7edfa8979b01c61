use crate::models::SalesRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Store / state-holiday restriction applied before every downstream output.
/// An empty set means "no restriction" on that field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RecordFilter {
    #[serde(default)]
    pub stores: BTreeSet<u32>,
    #[serde(default)]
    pub state_holidays: BTreeSet<String>,
}

impl RecordFilter {
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty() && self.state_holidays.is_empty()
    }

    pub fn matches(&self, r: &SalesRecord) -> bool {
        (self.stores.is_empty() || self.stores.contains(&r.store_id))
            && (self.state_holidays.is_empty() || self.state_holidays.contains(&r.state_holiday))
    }

    pub fn apply(&self, records: &[SalesRecord]) -> Vec<SalesRecord> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::record;

    #[test]
    fn test_empty_filter_keeps_everything() {
        let records = vec![record(1, "2015-01-01", 1.0), record(2, "2015-01-02", 2.0)];
        assert_eq!(RecordFilter::default().apply(&records).len(), 2);
    }

    #[test]
    fn test_store_and_holiday_sets_combine() {
        let mut records = vec![
            record(1, "2015-01-01", 1.0),
            record(2, "2015-01-01", 2.0),
            record(1, "2015-01-02", 3.0),
        ];
        records[2].state_holiday = "a".into();

        let filter = RecordFilter {
            stores: [1].into_iter().collect(),
            state_holidays: ["0".to_string()].into_iter().collect(),
        };
        let kept = filter.apply(&records);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].sales, 1.0);
    }
}
