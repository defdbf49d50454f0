//! Pagination helpers shared by all list endpoints.
//!
//! Every paginated endpoint takes `page`/`limit` query integers and returns
//! its items together with `total_pages`/`has_next_page`/`has_prev_page`.

use serde::{Deserialize, Serialize};

/// Default page number (1-indexed for API consumers)
pub const DEFAULT_PAGE: i64 = 1;
/// Default page size if not specified
pub const DEFAULT_LIMIT: i64 = 10;
/// Maximum allowed page size
pub const MAX_LIMIT: i64 = 100;

/// Standard pagination query parameters
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    DEFAULT_PAGE
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

impl PaginationParams {
    /// SQL OFFSET value
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.limit()
    }

    /// SQL LIMIT value
    pub fn limit(&self) -> i64 {
        self.limit.clamp(1, MAX_LIMIT)
    }

    pub fn page(&self) -> i64 {
        self.page.max(1)
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Pagination metadata returned with list responses
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl PaginationMeta {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let total_pages = if total == 0 {
            1
        } else {
            (total as f64 / limit as f64).ceil() as i64
        };
        Self {
            page,
            limit,
            total,
            total_pages,
            has_next_page: page < total_pages,
            has_prev_page: page > 1,
        }
    }
}

/// Standard paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, params: &PaginationParams, total: i64) -> Self {
        Self {
            items,
            pagination: PaginationMeta::new(params.page(), params.limit(), total),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_offset() {
        let params = PaginationParams { page: 3, limit: 10 };
        assert_eq!(params.offset(), 20);
        assert_eq!(params.limit(), 10);
    }

    #[test]
    fn test_pagination_clamps() {
        let params = PaginationParams {
            page: -1,
            limit: 500,
        };
        assert_eq!(params.offset(), 0); // page clamped to 1
        assert_eq!(params.limit(), MAX_LIMIT);
    }

    #[test]
    fn test_exactly_one_full_page() {
        // With exactly `limit` matching records there is a single page and
        // no next page.
        let meta = PaginationMeta::new(1, 10, 10);
        assert_eq!(meta.total_pages, 1);
        assert!(!meta.has_next_page);
        assert!(!meta.has_prev_page);
    }

    #[test]
    fn test_pagination_meta_middle_page() {
        let meta = PaginationMeta::new(2, 10, 35);
        assert_eq!(meta.total_pages, 4);
        assert!(meta.has_next_page);
        assert!(meta.has_prev_page);
    }

    #[test]
    fn test_empty_result_has_one_page() {
        let meta = PaginationMeta::new(1, 10, 0);
        assert_eq!(meta.total_pages, 1);
        assert!(!meta.has_next_page);
    }
}
