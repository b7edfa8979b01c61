use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ── Store attributes ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreAttributes {
    pub store_id: u32,
    pub store_type: Option<String>,
    pub assortment: Option<String>,
    pub competition_distance: Option<f64>,
    pub competition_open_since_month: Option<u32>,
    pub competition_open_since_year: Option<i32>,
    pub promo2: Option<bool>,
    pub promo2_since_week: Option<u32>,
    pub promo2_since_year: Option<i32>,
    pub promo_interval: Option<String>,
}

// ── Cleaned sales record ──────────────────────────────────────────────────────

/// One open, selling store-day. Only built by the cleaner; never mutated after.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SalesRecord {
    pub store_id: u32,
    pub date: NaiveDate,
    pub sales: f64,
    pub customers: Option<u32>,
    pub open_flag: bool,
    pub promo_flag: bool,
    pub state_holiday: String,
    pub school_holiday: Option<bool>,
    pub store_type: String,
    pub assortment: String,
    pub competition_distance: Option<f64>,
    pub competition_open_since_month: Option<u32>,
    pub competition_open_since_year: Option<i32>,
    pub promo2: Option<bool>,
    pub promo2_since_week: Option<u32>,
    pub promo2_since_year: Option<i32>,
    pub promo_interval: Option<String>,
    /// 0 = Monday … 6 = Sunday
    pub day_of_week: u32,
    pub month: u32,
    pub year: i32,
}

impl SalesRecord {
    /// Column names in serialization order.
    pub const FIELDS: [&'static str; 20] = [
        "store_id",
        "date",
        "sales",
        "customers",
        "open_flag",
        "promo_flag",
        "state_holiday",
        "school_holiday",
        "store_type",
        "assortment",
        "competition_distance",
        "competition_open_since_month",
        "competition_open_since_year",
        "promo2",
        "promo2_since_week",
        "promo2_since_year",
        "promo_interval",
        "day_of_week",
        "month",
        "year",
    ];
}

// ── Raw CSV rows ──────────────────────────────────────────────────────────────

/// Transaction CSV: Store, DayOfWeek, Date, Sales, Customers, Open, Promo,
/// StateHoliday, SchoolHoliday
#[derive(Debug, Clone, Default)]
pub struct RawTransactionRow {
    pub store: Option<String>,
    pub date: Option<String>,
    pub sales: Option<String>,
    pub customers: Option<String>,
    pub open: Option<String>,
    pub promo: Option<String>,
    pub state_holiday: Option<String>,
    pub school_holiday: Option<String>,
}

/// Store CSV: Store, StoreType, Assortment, CompetitionDistance,
/// CompetitionOpenSinceMonth, CompetitionOpenSinceYear, Promo2,
/// Promo2SinceWeek, Promo2SinceYear, PromoInterval
#[derive(Debug, Clone, Default)]
pub struct RawStoreRow {
    pub store: Option<String>,
    pub store_type: Option<String>,
    pub assortment: Option<String>,
    pub competition_distance: Option<String>,
    pub competition_open_since_month: Option<String>,
    pub competition_open_since_year: Option<String>,
    pub promo2: Option<String>,
    pub promo2_since_week: Option<String>,
    pub promo2_since_year: Option<String>,
    pub promo_interval: Option<String>,
}

// ── Derived outputs ───────────────────────────────────────────────────────────

/// Total sales per calendar date, ascending, one entry per date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailySeries {
    points: Vec<(NaiveDate, f64)>,
}

impl DailySeries {
    /// Build from arbitrary pairs: duplicate dates are summed, output sorted.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        let mut totals = std::collections::BTreeMap::new();
        for (date, value) in pairs {
            *totals.entry(date).or_insert(0.0) += value;
        }
        Self { points: totals.into_iter().collect() }
    }

    pub fn points(&self) -> &[(NaiveDate, f64)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|(d, _)| *d)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|(d, _)| *d)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub trend: f64,
    pub seasonal_weekly: f64,
    pub seasonal_yearly: f64,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
    /// Observed total for the date, `None` for gaps and the future horizon.
    pub actual: Option<f64>,
}

impl ForecastPoint {
    pub fn seasonal(&self) -> f64 {
        self.seasonal_weekly + self.seasonal_yearly
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct KpiBundle {
    pub total_sales: f64,
    pub avg_daily_sales: f64,
    /// Calendar month (1–12) with the highest summed sales across all years.
    pub best_period_key: u32,
    pub top_entity_id: u32,
    pub record_count: usize,
    pub distinct_days: usize,
}
