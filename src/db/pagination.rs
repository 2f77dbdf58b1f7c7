/// Offset pagination for list queries
use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: u32 = 10;
pub const MAX_PER_PAGE: u32 = 100;

/// Requested page, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl PageRequest {
    /// Build from optional query values, clamping out-of-range input
    pub fn from_query(page: Option<u32>, per_page: Option<u32>, max_per_page: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, max_per_page.max(1)),
        }
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }
}

/// A page of results with totals
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub current_page: u32,
    pub per_page: u32,
    pub total: i64,
    pub last_page: u32,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, request: PageRequest, total: i64) -> Self {
        let per_page = request.per_page.max(1) as i64;
        let last_page = ((total + per_page - 1) / per_page).max(1) as u32;

        Self {
            data,
            current_page: request.page,
            per_page: request.per_page,
            total,
            last_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets() {
        let request = PageRequest { page: 3, per_page: 10 };
        assert_eq!(request.offset(), 20);
        assert_eq!(request.limit(), 10);
    }

    #[test]
    fn test_from_query_clamps() {
        let request = PageRequest::from_query(Some(0), Some(1000), MAX_PER_PAGE);
        assert_eq!(request.page, 1);
        assert_eq!(request.per_page, MAX_PER_PAGE);

        assert_eq!(PageRequest::from_query(None, None, MAX_PER_PAGE), PageRequest::default());
    }

    #[test]
    fn test_last_page() {
        let request = PageRequest::default();
        assert_eq!(Page::new(Vec::<u8>::new(), request, 0).last_page, 1);
        assert_eq!(Page::new(Vec::<u8>::new(), request, 10).last_page, 1);
        assert_eq!(Page::new(Vec::<u8>::new(), request, 11).last_page, 2);
    }
}
