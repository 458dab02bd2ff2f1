pub mod ads;
pub mod games;
pub mod points;
pub mod protection;
pub mod referrals;
pub mod sessions;
pub mod stats;
pub mod users;
pub mod withdrawals;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl PageQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page.unwrap_or(20).clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.per_page())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub pages: i64,
    pub current_page: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, query: &PageQuery) -> Self {
        let per_page = query.per_page();

        Page {
            items,
            total,
            pages: (total + per_page - 1) / per_page,
            current_page: query.page(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_query_defaults_and_clamps() {
        let query = PageQuery {
            page: None,
            per_page: None,
        };
        assert_eq!(query.page(), 1);
        assert_eq!(query.per_page(), 20);
        assert_eq!(query.offset(), 0);

        let query = PageQuery {
            page: Some(0),
            per_page: Some(1000),
        };
        assert_eq!(query.page(), 1);
        assert_eq!(query.per_page(), 100);

        let query = PageQuery {
            page: Some(3),
            per_page: Some(10),
        };
        assert_eq!(query.offset(), 20);
    }

    #[test]
    fn test_page_count_rounds_up() {
        let query = PageQuery {
            page: Some(2),
            per_page: Some(20),
        };
        let page = Page::new(vec![1, 2, 3], 41, &query);
        assert_eq!(page.pages, 3);
        assert_eq!(page.current_page, 2);

        let empty: Page<i32> = Page::new(vec![], 0, &query);
        assert_eq!(empty.pages, 0);
    }

    #[test]
    fn test_huge_page_saturates_offset() {
        let query = PageQuery {
            page: Some(i64::MAX),
            per_page: Some(20),
        };
        assert_eq!(query.offset(), i64::MAX);

        let query = PageQuery {
            page: Some(i64::MIN),
            per_page: Some(20),
        };
        assert_eq!(query.offset(), 0);
    }
}
