//! Raw rows → cleaned `SalesRecord`s.
//!
//! Order of operations matters and is fixed:
//!   1. inner join on store id (unmatched rows dropped and counted)
//!   2. keep only open days with positive sales
//!   3. forward-fill every remaining gap from the previous kept row
//!   4. derive day-of-week / month / year from the date

use crate::error::PipelineError;
use crate::models::{RawStoreRow, RawTransactionRow, SalesRecord, StoreAttributes};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

// ── Parsers ───────────────────────────────────────────────────────────────────

fn is_missing(s: &str) -> bool {
    matches!(s, "" | "NA" | "N/A" | "NaN" | "nan" | "null" | "-")
}

/// Parse a finite number, ignoring thousands separators. Any other stray
/// character rejects the value.
/// "5,263" → 5263.0 | "1270.0" → 1270.0 | "12abc3" → None
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if is_missing(s) {
        return None;
    }
    let cleaned = s.replace(',', "");
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integers may arrive float-formatted ("9.0") when the column had gaps.
pub fn parse_int(s: &str) -> Option<i64> {
    let v = parse_number(s)?;
    if v.fract() == 0.0 && v.is_finite() {
        Some(v as i64)
    } else {
        None
    }
}

fn parse_u32(s: &str) -> Option<u32> {
    parse_int(s).and_then(|v| u32::try_from(v).ok())
}

fn parse_i32(s: &str) -> Option<i32> {
    parse_int(s).and_then(|v| i32::try_from(v).ok())
}

/// "1"/"0", "true"/"false", "yes"/"no".
pub fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "1.0" | "true" | "yes" | "y" => Some(true),
        "0" | "0.0" | "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Parse dates: ISO first, then the usual day/month variants.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();

    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%d/%m/%Y") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%m/%d/%Y") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%b %d, %Y") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%d %b %Y") {
        return Some(d);
    }

    None
}

pub fn parse_category(s: &str) -> Option<String> {
    let s = s.trim();
    if is_missing(s) { None } else { Some(s.to_string()) }
}

fn field<T>(raw: &Option<String>, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    raw.as_deref().and_then(parse)
}

// ── Store table → StoreAttributes ─────────────────────────────────────────────

pub fn store_row_to_attributes(row: &RawStoreRow) -> Option<StoreAttributes> {
    let store_id = field(&row.store, parse_u32)?;

    Some(StoreAttributes {
        store_id,
        store_type: field(&row.store_type, parse_category),
        assortment: field(&row.assortment, parse_category),
        competition_distance: field(&row.competition_distance, parse_number),
        competition_open_since_month: field(&row.competition_open_since_month, parse_u32),
        competition_open_since_year: field(&row.competition_open_since_year, parse_i32),
        promo2: field(&row.promo2, parse_flag),
        promo2_since_week: field(&row.promo2_since_week, parse_u32),
        promo2_since_year: field(&row.promo2_since_year, parse_i32),
        promo_interval: field(&row.promo_interval, parse_category),
    })
}

/// Store id → attributes. Duplicate ids keep the first row.
pub fn index_stores(rows: &[RawStoreRow]) -> HashMap<u32, StoreAttributes> {
    let mut stores = HashMap::with_capacity(rows.len());
    let mut duplicates = 0usize;
    for attrs in rows.iter().filter_map(store_row_to_attributes) {
        if stores.contains_key(&attrs.store_id) {
            duplicates += 1;
            continue;
        }
        stores.insert(attrs.store_id, attrs);
    }
    if duplicates > 0 {
        warn!("store table: {} duplicate store ids ignored", duplicates);
    }
    stores
}

// ── Forward fill ──────────────────────────────────────────────────────────────

/// Carries the last present value forward.
#[derive(Debug)]
struct ForwardFill<T: Clone> {
    last: Option<T>,
}

impl<T: Clone> ForwardFill<T> {
    fn new() -> Self {
        Self { last: None }
    }

    fn fill(&mut self, value: Option<T>) -> Option<T> {
        if value.is_some() {
            self.last = value;
        }
        self.last.clone()
    }
}

/// One fill column per optional field of the joined row.
#[derive(Debug)]
struct FillState {
    customers: ForwardFill<u32>,
    promo: ForwardFill<bool>,
    state_holiday: ForwardFill<String>,
    school_holiday: ForwardFill<bool>,
    store_type: ForwardFill<String>,
    assortment: ForwardFill<String>,
    competition_distance: ForwardFill<f64>,
    competition_open_since_month: ForwardFill<u32>,
    competition_open_since_year: ForwardFill<i32>,
    promo2: ForwardFill<bool>,
    promo2_since_week: ForwardFill<u32>,
    promo2_since_year: ForwardFill<i32>,
    promo_interval: ForwardFill<String>,
}

impl FillState {
    fn new() -> Self {
        Self {
            customers: ForwardFill::new(),
            promo: ForwardFill::new(),
            state_holiday: ForwardFill::new(),
            school_holiday: ForwardFill::new(),
            store_type: ForwardFill::new(),
            assortment: ForwardFill::new(),
            competition_distance: ForwardFill::new(),
            competition_open_since_month: ForwardFill::new(),
            competition_open_since_year: ForwardFill::new(),
            promo2: ForwardFill::new(),
            promo2_since_week: ForwardFill::new(),
            promo2_since_year: ForwardFill::new(),
            promo_interval: ForwardFill::new(),
        }
    }
}

// ── Cleaning ──────────────────────────────────────────────────────────────────

/// Row accounting for a single load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub rows_read: usize,
    pub dropped_unmatched: usize,
    pub dropped_filtered: usize,
    /// Rows with no earlier value to fill a required category from.
    pub dropped_unfillable: usize,
    pub rows_kept: usize,
}

impl LoadReport {
    /// Join mismatches as the recoverable `Join` error, for reporting.
    pub fn join_error(&self) -> Option<PipelineError> {
        (self.dropped_unmatched > 0).then_some(PipelineError::Join {
            dropped: self.dropped_unmatched,
        })
    }
}

/// The cleaned, immutable record set for one pair of sources.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub records: Vec<SalesRecord>,
    pub report: LoadReport,
}

/// A joined row that passed the open/sales filter, before filling.
struct Candidate<'a> {
    row: &'a RawTransactionRow,
    store: &'a StoreAttributes,
    date: NaiveDate,
    sales: f64,
}

fn passes_filter(row: &RawTransactionRow) -> Option<(NaiveDate, f64)> {
    let open = field(&row.open, parse_flag)?;
    let sales = field(&row.sales, parse_number)?;
    let date = field(&row.date, parse_date)?;
    (open && sales > 0.0).then_some((date, sales))
}

pub fn clean(transactions: &[RawTransactionRow], stores: &[RawStoreRow]) -> Dataset {
    let store_index = index_stores(stores);
    let mut report = LoadReport {
        rows_read: transactions.len(),
        ..Default::default()
    };

    // ── 1 + 2. Join, then filter ──────────────────────────────────────────────
    let mut candidates = Vec::with_capacity(transactions.len());
    for row in transactions {
        let store = match field(&row.store, parse_u32).and_then(|id| store_index.get(&id)) {
            Some(s) => s,
            None => {
                report.dropped_unmatched += 1;
                continue;
            }
        };
        match passes_filter(row) {
            Some((date, sales)) => candidates.push(Candidate { row, store, date, sales }),
            None => report.dropped_filtered += 1,
        }
    }

    if let Some(join_err) = report.join_error() {
        warn!("{}; rows dropped", join_err);
    }

    // ── 3 + 4. Fill and derive ────────────────────────────────────────────────
    let mut fill = FillState::new();
    let mut records = Vec::with_capacity(candidates.len());

    for c in candidates {
        let promo = fill.promo.fill(field(&c.row.promo, parse_flag));
        let state_holiday = fill.state_holiday.fill(field(&c.row.state_holiday, parse_category));
        let store_type = fill.store_type.fill(c.store.store_type.clone());
        let assortment = fill.assortment.fill(c.store.assortment.clone());

        let record = SalesRecord {
            store_id: c.store.store_id,
            date: c.date,
            sales: c.sales,
            customers: fill.customers.fill(field(&c.row.customers, parse_u32)),
            open_flag: true,
            promo_flag: promo.unwrap_or_default(),
            state_holiday: state_holiday.clone().unwrap_or_default(),
            school_holiday: fill.school_holiday.fill(field(&c.row.school_holiday, parse_flag)),
            store_type: store_type.clone().unwrap_or_default(),
            assortment: assortment.clone().unwrap_or_default(),
            competition_distance: fill.competition_distance.fill(c.store.competition_distance),
            competition_open_since_month: fill
                .competition_open_since_month
                .fill(c.store.competition_open_since_month),
            competition_open_since_year: fill
                .competition_open_since_year
                .fill(c.store.competition_open_since_year),
            promo2: fill.promo2.fill(c.store.promo2),
            promo2_since_week: fill.promo2_since_week.fill(c.store.promo2_since_week),
            promo2_since_year: fill.promo2_since_year.fill(c.store.promo2_since_year),
            promo_interval: fill.promo_interval.fill(c.store.promo_interval.clone()),
            day_of_week: c.date.weekday().num_days_from_monday(),
            month: c.date.month(),
            year: c.date.year(),
        };

        if promo.is_none() || state_holiday.is_none() || store_type.is_none() || assortment.is_none() {
            debug!("store {} on {}: required category missing with nothing to fill from", record.store_id, record.date);
            report.dropped_unfillable += 1;
            continue;
        }

        records.push(record);
    }

    if report.dropped_unfillable > 0 {
        warn!("{} leading rows dropped: no prior value to forward-fill", report.dropped_unfillable);
    }

    report.rows_kept = records.len();
    info!(
        "cleaned: {} read | {} unmatched | {} closed/zero | {} kept",
        report.rows_read, report.dropped_unmatched, report.dropped_filtered, report.rows_kept
    );

    Dataset { records, report }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
