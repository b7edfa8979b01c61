//! CSV loader for the transaction and store-attribute tables.
//!
//! Columns are located by header name, so extra or reordered columns are
//! fine. Missing required columns make the whole source unavailable.

use crate::error::{PipelineError, Result, SourceKind};
use crate::models::{RawStoreRow, RawTransactionRow};
use csv::StringRecord;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const TRANSACTION_REQUIRED: &[&str] = &["store", "date", "sales", "open", "promo", "stateholiday"];
const STORE_REQUIRED: &[&str] = &["store", "storetype", "assortment"];

// ── Source identity ──────────────────────────────────────────────────────────

/// Identity of a pair of input tables; the cache key for cleaned datasets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub transactions: PathBuf,
    pub stores: PathBuf,
}

impl SourceKey {
    /// Paths are canonicalised when they exist so `./a.csv` and `a.csv` share a slot.
    pub fn new(transactions: &Path, stores: &Path) -> Self {
        let canon = |p: &Path| p.canonicalize().unwrap_or_else(|_| p.to_path_buf());
        Self {
            transactions: canon(transactions),
            stores: canon(stores),
        }
    }
}

// ── Header lookup ────────────────────────────────────────────────────────────

/// Header name → column position. Names are compared lowercase with `_`
/// and spaces stripped, so `StateHoliday` and `state_holiday` both match.
struct HeaderIndex {
    positions: HashMap<String, usize>,
}

fn normalise_header(s: &str) -> String {
    s.trim()
        .trim_start_matches('\u{feff}')
        .chars()
        .filter(|c| *c != '_' && *c != ' ')
        .collect::<String>()
        .to_lowercase()
}

impl HeaderIndex {
    fn new(headers: &StringRecord) -> Self {
        let positions = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (normalise_header(h), i))
            .collect();
        Self { positions }
    }

    fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|name| !self.positions.contains_key(*name))
            .collect()
    }

    fn get(&self, record: &StringRecord, name: &str) -> Option<String> {
        let idx = *self.positions.get(name)?;
        record.get(idx).map(|s| s.to_string())
    }
}

fn unavailable(source_kind: SourceKind, path: &Path, reason: impl ToString) -> PipelineError {
    PipelineError::SourceUnavailable {
        source_kind,
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Shared header handling + row iteration. Malformed rows are skipped.
fn read_rows<R: Read, T>(
    reader: R,
    source_kind: SourceKind,
    path: &Path,
    required: &[&str],
    build: impl Fn(&HeaderIndex, &StringRecord) -> T,
) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| unavailable(source_kind, path, e))?
        .clone();
    let index = HeaderIndex::new(&headers);

    let missing = index.missing(required);
    if !missing.is_empty() {
        return Err(unavailable(
            source_kind,
            path,
            format!("missing required columns: {}", missing.join(", ")),
        ));
    }

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for (i, result) in reader.records().enumerate() {
        match result {
            Ok(record) => rows.push(build(&index, &record)),
            Err(e) => {
                warn!("Row {} in {} source: {}", i + 1, source_kind, e);
                skipped += 1;
            }
        }
    }

    debug!("{}: {} rows read, {} malformed", source_kind, rows.len(), skipped);
    Ok(rows)
}

// ── Transactions ─────────────────────────────────────────────────────────────

pub fn read_transactions_from<R: Read>(reader: R, path: &Path) -> Result<Vec<RawTransactionRow>> {
    read_rows(reader, SourceKind::Transactions, path, TRANSACTION_REQUIRED, |idx, rec| {
        RawTransactionRow {
            store: idx.get(rec, "store"),
            date: idx.get(rec, "date"),
            sales: idx.get(rec, "sales"),
            customers: idx.get(rec, "customers"),
            open: idx.get(rec, "open"),
            promo: idx.get(rec, "promo"),
            state_holiday: idx.get(rec, "stateholiday"),
            school_holiday: idx.get(rec, "schoolholiday"),
        }
    })
}

pub fn load_transactions(path: &Path) -> Result<Vec<RawTransactionRow>> {
    let file = open_source(SourceKind::Transactions, path)?;
    let rows = read_transactions_from(file, path)?;
    info!("transactions: {} rows loaded from {:?}", rows.len(), path);
    Ok(rows)
}

// ── Stores ───────────────────────────────────────────────────────────────────

pub fn read_stores_from<R: Read>(reader: R, path: &Path) -> Result<Vec<RawStoreRow>> {
    read_rows(reader, SourceKind::Stores, path, STORE_REQUIRED, |idx, rec| RawStoreRow {
        store: idx.get(rec, "store"),
        store_type: idx.get(rec, "storetype"),
        assortment: idx.get(rec, "assortment"),
        competition_distance: idx.get(rec, "competitiondistance"),
        competition_open_since_month: idx.get(rec, "competitionopensincemonth"),
        competition_open_since_year: idx.get(rec, "competitionopensinceyear"),
        promo2: idx.get(rec, "promo2"),
        promo2_since_week: idx.get(rec, "promo2sinceweek"),
        promo2_since_year: idx.get(rec, "promo2sinceyear"),
        promo_interval: idx.get(rec, "promointerval"),
    })
}

pub fn load_stores(path: &Path) -> Result<Vec<RawStoreRow>> {
    let file = open_source(SourceKind::Stores, path)?;
    let rows = read_stores_from(file, path)?;
    info!("stores: {} rows loaded from {:?}", rows.len(), path);
    Ok(rows)
}

fn open_source(source_kind: SourceKind, path: &Path) -> Result<std::fs::File> {
    std::fs::File::open(path).map_err(|e| unavailable(source_kind, path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_columns_by_header_name() {
        let data = "Date,Store,Sales,Open,Promo,StateHoliday,Extra\n\
                    2015-07-31,1,5263,1,1,0,x\n";
        let rows = read_transactions_from(data.as_bytes(), Path::new("train.csv")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].store.as_deref(), Some("1"));
        assert_eq!(rows[0].date.as_deref(), Some("2015-07-31"));
        assert_eq!(rows[0].sales.as_deref(), Some("5263"));
        assert_eq!(rows[0].customers, None);
    }

    #[test]
    fn test_missing_required_column_is_source_unavailable() {
        let data = "Store,StoreType\n1,a\n";
        let err = read_stores_from(data.as_bytes(), Path::new("store.csv")).unwrap_err();
        match err {
            PipelineError::SourceUnavailable { source_kind, reason, .. } => {
                assert_eq!(source_kind, SourceKind::Stores);
                assert!(reason.contains("assortment"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_file_is_source_unavailable() {
        let err = load_transactions(Path::new("/nonexistent/train.csv")).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::SourceUnavailable { source_kind: SourceKind::Transactions, .. }
        ));
    }

    #[test]
    fn test_header_normalisation() {
        assert_eq!(normalise_header("State_Holiday"), "stateholiday");
        assert_eq!(normalise_header("\u{feff}Store"), "store");
    }
}
