//! Grouped SUM/MEAN over any tuple of record fields, plus ranking.
//!
//! Groups are emitted in the order their first record appears, and only
//! groups with at least one contributing value are ever built.

pub mod filter;
pub mod views;

use crate::error::{PipelineError, Result};
use crate::models::{DailySeries, SalesRecord};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub use filter::RecordFilter;

// ── Fields ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupField {
    Date,
    Year,
    Month,
    DayOfWeek,
    Store,
    StoreType,
    Assortment,
    Promo,
    StateHoliday,
    SchoolHoliday,
}

impl GroupField {
    pub fn name(&self) -> &'static str {
        match self {
            GroupField::Date => "date",
            GroupField::Year => "year",
            GroupField::Month => "month",
            GroupField::DayOfWeek => "day_of_week",
            GroupField::Store => "store",
            GroupField::StoreType => "store_type",
            GroupField::Assortment => "assortment",
            GroupField::Promo => "promo",
            GroupField::StateHoliday => "state_holiday",
            GroupField::SchoolHoliday => "school_holiday",
        }
    }

    fn extract(&self, r: &SalesRecord) -> KeyValue {
        match self {
            GroupField::Date => KeyValue::Date(r.date),
            GroupField::Year => KeyValue::Int(i64::from(r.year)),
            GroupField::Month => KeyValue::Int(i64::from(r.month)),
            GroupField::DayOfWeek => KeyValue::Int(i64::from(r.day_of_week)),
            GroupField::Store => KeyValue::Int(i64::from(r.store_id)),
            GroupField::StoreType => KeyValue::Text(r.store_type.clone()),
            GroupField::Assortment => KeyValue::Text(r.assortment.clone()),
            GroupField::Promo => KeyValue::Flag(r.promo_flag),
            GroupField::StateHoliday => KeyValue::Text(r.state_holiday.clone()),
            GroupField::SchoolHoliday => match r.school_holiday {
                Some(b) => KeyValue::Flag(b),
                None => KeyValue::Missing,
            },
        }
    }
}

impl fmt::Display for GroupField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GroupField {
    type Err = PipelineError;

    /// Accepts snake_case names and the source's CamelCase column names.
    fn from_str(s: &str) -> Result<Self> {
        let norm: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-' && *c != ' ')
            .collect::<String>()
            .to_lowercase();
        let field = match norm.as_str() {
            "date" | "ds" => GroupField::Date,
            "year" => GroupField::Year,
            "month" => GroupField::Month,
            "dayofweek" | "weekday" => GroupField::DayOfWeek,
            "store" | "storeid" => GroupField::Store,
            "storetype" => GroupField::StoreType,
            "assortment" => GroupField::Assortment,
            "promo" | "promoflag" => GroupField::Promo,
            "stateholiday" => GroupField::StateHoliday,
            "schoolholiday" => GroupField::SchoolHoliday,
            _ => return Err(PipelineError::InvalidGroupKey(s.to_string())),
        };
        Ok(field)
    }
}

/// Parse an ordered list of field names, rejecting unknown and repeated names.
pub fn parse_group_fields<S: AsRef<str>>(names: &[S]) -> Result<Vec<GroupField>> {
    let mut fields = Vec::with_capacity(names.len());
    for name in names {
        let field: GroupField = name.as_ref().parse()?;
        if fields.contains(&field) {
            return Err(PipelineError::InvalidGroupKey(name.as_ref().to_string()));
        }
        fields.push(field);
    }
    Ok(fields)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    Sales,
    Customers,
}

impl Measure {
    fn extract(&self, r: &SalesRecord) -> Option<f64> {
        match self {
            Measure::Sales => Some(r.sales),
            Measure::Customers => r.customers.map(f64::from),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Measure::Sales => "sales",
            Measure::Customers => "customers",
        }
    }
}

impl FromStr for Measure {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sales" => Ok(Measure::Sales),
            "customers" => Ok(Measure::Customers),
            _ => Err(PipelineError::InvalidMeasure(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggOp {
    Sum,
    Mean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

// ── Keys ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum KeyValue {
    Missing,
    Flag(bool),
    Int(i64),
    Date(NaiveDate),
    Text(String),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Missing => Ok(()),
            KeyValue::Flag(b) => write!(f, "{}", u8::from(*b)),
            KeyValue::Int(i) => write!(f, "{}", i),
            KeyValue::Date(d) => write!(f, "{}", d),
            KeyValue::Text(s) => f.write_str(s),
        }
    }
}

/// The tuple of field values identifying one group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupKey(pub Vec<KeyValue>);

impl GroupKey {
    pub fn values(&self) -> &[KeyValue] {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", v)?;
        }
        Ok(())
    }
}

// ── Aggregation ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    pub group_by: Vec<GroupField>,
    pub measure: Measure,
    pub op: AggOp,
    /// First-encountered group order.
    pub rows: Vec<(GroupKey, f64)>,
}

impl AggregationResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, key: &GroupKey) -> Option<f64> {
        self.rows.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    pub fn total(&self) -> f64 {
        self.rows.iter().map(|(_, v)| v).sum()
    }
}

pub fn aggregate(
    records: &[SalesRecord],
    group_by: &[GroupField],
    measure: Measure,
    op: AggOp,
) -> AggregationResult {
    let mut index: HashMap<GroupKey, usize> = HashMap::new();
    // (key, sum, count) in first-seen order
    let mut groups: Vec<(GroupKey, f64, usize)> = Vec::new();

    for r in records {
        let Some(value) = measure.extract(r) else { continue };
        let key = GroupKey(group_by.iter().map(|f| f.extract(r)).collect());
        match index.get(&key) {
            Some(&i) => {
                groups[i].1 += value;
                groups[i].2 += 1;
            }
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, value, 1));
            }
        }
    }

    let rows = groups
        .into_iter()
        .map(|(key, sum, count)| {
            let value = match op {
                AggOp::Sum => sum,
                AggOp::Mean => sum / count as f64,
            };
            (key, value)
        })
        .collect();

    AggregationResult {
        group_by: group_by.to_vec(),
        measure,
        op,
        rows,
    }
}

/// `aggregate` with field names resolved first.
pub fn aggregate_by_names<S: AsRef<str>>(
    records: &[SalesRecord],
    group_by: &[S],
    measure: Measure,
    op: AggOp,
) -> Result<AggregationResult> {
    let fields = parse_group_fields(group_by)?;
    Ok(aggregate(records, &fields, measure, op))
}

/// Top/bottom `limit` groups. The sort is stable, so ties keep group order.
pub fn rank(result: &AggregationResult, order: Order, limit: usize) -> Vec<(GroupKey, f64)> {
    let mut rows = result.rows.clone();
    match order {
        Order::Asc => rows.sort_by(|a, b| a.1.total_cmp(&b.1)),
        Order::Desc => rows.sort_by(|a, b| b.1.total_cmp(&a.1)),
    }
    rows.truncate(limit);
    rows
}

/// Total sales per date, ascending.
pub fn daily_series(records: &[SalesRecord]) -> DailySeries {
    DailySeries::from_pairs(records.iter().map(|r| (r.date, r.sales)))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
