//! Pagination, sorting and list filtering.

use crate::validator::{permitted_value, Validator};
use serde::Serialize;

/// Sort keys accepted when listing movies.
pub const MOVIE_SORT_SAFELIST: &[&str] = &[
    "id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime",
];

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

impl SortDirection {
    /// Returns the SQL keyword for this direction.
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// Page and sort selection for list queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    /// 1-based page number.
    pub page: u32,
    /// Records per page.
    pub page_size: u32,
    /// Sort key, optionally prefixed with `-` for descending order.
    pub sort: String,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            sort: "id".to_string(),
        }
    }
}

impl Filters {
    /// Returns the column to sort by. Only meaningful after [`validate_filters`].
    pub fn sort_column(&self) -> &str {
        self.sort.trim_start_matches('-')
    }

    /// Returns the sort direction.
    pub fn sort_direction(&self) -> SortDirection {
        if self.sort.starts_with('-') {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        }
    }

    /// Number of records per page.
    pub fn limit(&self) -> u32 {
        self.page_size
    }

    /// Number of records to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

/// Checks `filters` against the page bounds and `safelist`.
pub fn validate_filters(v: &mut Validator, filters: &Filters, safelist: &[&str]) {
    v.check(filters.page > 0, "page", "must be greater than zero");
    v.check(
        filters.page <= 10_000_000,
        "page",
        "must be a maximum of 10 million",
    );
    v.check(filters.page_size > 0, "page_size", "must be greater than zero");
    v.check(
        filters.page_size <= 100,
        "page_size",
        "must be a maximum of 100",
    );
    v.check(
        permitted_value(&filters.sort.as_str(), safelist),
        "sort",
        "invalid sort value",
    );
}

/// A movie list query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovieQuery {
    /// Words that must appear in the title (case-insensitive). Empty matches all.
    pub title: String,
    /// Genres the movie must contain. Empty matches all.
    pub genres: Vec<String>,
    /// Paging and sorting.
    pub filters: Filters,
}

/// Pagination details returned alongside a page of results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    /// Page returned.
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: u32,
    /// Page size used.
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: u32,
    /// Always 1 when there are results.
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: u32,
    /// Last page holding results.
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: u32,
    /// Total records matching the query.
    #[serde(skip_serializing_if = "is_zero_u64")]
    pub total_records: u64,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

impl Metadata {
    /// Computes metadata for `total_records` matches. Empty results yield all zeros.
    pub fn calculate(total_records: u64, page: u32, page_size: u32) -> Self {
        if total_records == 0 || page_size == 0 {
            return Self::default();
        }
        let last_page = total_records.div_ceil(u64::from(page_size));
        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: u32::try_from(last_page).unwrap_or(u32::MAX),
            total_records,
        }
    }
}
