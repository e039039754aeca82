//! Client-side list derivation shared by every entity table.
//!
//! `derive` applies search, the status filters, the role filter and then the
//! ordering, in that order. All functions are pure: the source slice is never
//! reordered, so re-deriving after a sort toggle always starts from the order
//! the backend returned.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::cmp::Ordering;

use crate::models::{Record, ReviewStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortState {
    pub field: String,
    pub direction: SortDirection,
}

impl SortState {
    /// Column-header click: a new column sorts ascending, the same column
    /// flips direction.
    pub fn toggle(current: Option<&SortState>, field: &str) -> SortState {
        match current {
            Some(s) if s.field == field => SortState {
                field: s.field.clone(),
                direction: s.direction.flipped(),
            },
            _ => SortState {
                field: field.to_string(),
                direction: SortDirection::Ascending,
            },
        }
    }
}

/// Equality filter on a single field, e.g. position = "Foreman".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub search: String,
    /// Status dropdown. `None` means "all".
    pub status: Option<ReviewStatus>,
    /// Status imposed by the hosting page (e.g. a "Pending" tab).
    pub external_status: Option<ReviewStatus>,
    pub role: Option<FieldFilter>,
    pub sort: Option<SortState>,
}

/// Filter and order `records` according to `query`. When no explicit sort is
/// set, the first of `timestamp_fields` present on any record orders the
/// result newest-first.
pub fn derive<'a>(
    records: &'a [Record],
    query: &ListQuery,
    timestamp_fields: &[&str],
) -> Vec<&'a Record> {
    let needle = query.search.trim().to_lowercase();

    let mut rows: Vec<&Record> = records
        .iter()
        .filter(|r| r.matches_search(&needle))
        .filter(|r| status_matches(r, query.status))
        .filter(|r| status_matches(r, query.external_status))
        .filter(|r| role_matches(r, query.role.as_ref()))
        .collect();

    match &query.sort {
        Some(sort) => sort_by_field(&mut rows, sort),
        None => sort_newest_first(&mut rows, timestamp_fields),
    }
    rows
}

fn status_matches(record: &Record, wanted: Option<ReviewStatus>) -> bool {
    match wanted {
        Some(status) => record.effective_status() == status,
        None => true,
    }
}

fn role_matches(record: &Record, filter: Option<&FieldFilter>) -> bool {
    match filter {
        Some(f) => record
            .field_text(&f.field)
            .map(|v| v.trim().eq_ignore_ascii_case(f.value.trim()))
            .unwrap_or(false),
        None => true,
    }
}

/// Stable, case-insensitive sort on a field's string form. Missing values
/// go last in both directions.
pub fn sort_by_field(rows: &mut Vec<&Record>, sort: &SortState) {
    let mut keyed: Vec<(Option<String>, &Record)> = rows
        .drain(..)
        .map(|r| (r.field_text(&sort.field).map(|v| v.to_lowercase()), r))
        .collect();

    keyed.sort_by(|(a, _), (b, _)| match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => match sort.direction {
            SortDirection::Ascending => x.cmp(y),
            SortDirection::Descending => y.cmp(x),
        },
    });

    rows.extend(keyed.into_iter().map(|(_, r)| r));
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Stamp {
    Millis(i64),
    Text(String),
}

impl Stamp {
    fn from_value(value: &Value) -> Option<Stamp> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
                .map(Stamp::Millis),
            Value::String(s) if !s.trim().is_empty() => {
                Some(parse_millis(s.trim()).map(Stamp::Millis).unwrap_or_else(|| {
                    Stamp::Text(s.trim().to_string())
                }))
            }
            _ => None,
        }
    }
}

impl PartialOrd for Stamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Stamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Stamp::Millis(a), Stamp::Millis(b)) => a.cmp(b),
            (Stamp::Text(a), Stamp::Text(b)) => a.cmp(b),
            // parseable timestamps rank as newer than free text
            (Stamp::Millis(_), Stamp::Text(_)) => Ordering::Greater,
            (Stamp::Text(_), Stamp::Millis(_)) => Ordering::Less,
        }
    }
}

fn parse_millis(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// Default ordering. Keeps the received order when none of the candidate
/// fields appears on any row.
pub fn sort_newest_first(rows: &mut Vec<&Record>, timestamp_fields: &[&str]) {
    let Some(field) = timestamp_fields
        .iter()
        .find(|f| rows.iter().any(|r| r.field(f).map(|v| !v.is_null()).unwrap_or(false)))
    else {
        return;
    };

    let mut keyed: Vec<(Option<Stamp>, &Record)> = rows
        .drain(..)
        .map(|r| (r.field(field).and_then(Stamp::from_value), r))
        .collect();

    keyed.sort_by(|(a, _), (b, _)| match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => y.cmp(x),
    });

    rows.extend(keyed.into_iter().map(|(_, r)| r));
}

/// One page of derived rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<'a> {
    pub rows: Vec<&'a Record>,
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub total_pages: usize,
}

/// Slice `rows` into a page. Out-of-range page numbers clamp to the nearest
/// valid page so a shrinking result set never shows an empty page.
pub fn paginate<'a>(rows: Vec<&'a Record>, page: usize, page_size: usize) -> Page<'a> {
    let page_size = page_size.max(1);
    let total = rows.len();
    let total_pages = total.div_ceil(page_size).max(1);
    let page = page.clamp(1, total_pages);
    let start = (page - 1) * page_size;

    Page {
        rows: rows.into_iter().skip(start).take(page_size).collect(),
        page,
        page_size,
        total,
        total_pages,
    }
}
