use serde::{Deserialize, Serialize};

#[derive(Serialize, Debug)]
pub struct PageContext<T> {
    pub rows: Vec<T>,
    pub total_rows: i64,
    pub next_offset: Option<i64>,
    pub prev_offset: Option<i64>,
}

impl<T> PageContext<T> {
    pub fn from_rows(rows: Vec<T>, total_rows: i64, page_size: i64, current_offset: i64) -> Self {
        if rows.is_empty() {
            return Self::no_rows();
        }

        let next_offset = match current_offset + page_size {
            next if next < total_rows => Some(next),
            _ => None,
        };
        let prev_offset = match current_offset {
            0 => None,
            offset => Some((offset - page_size).max(0)),
        };

        Self {
            rows,
            total_rows,
            next_offset,
            prev_offset,
        }
    }

    pub fn no_rows() -> Self {
        Self {
            rows: vec![],
            total_rows: 0,
            next_offset: None,
            prev_offset: None,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageContext<U> {
        PageContext {
            rows: self.rows.into_iter().map(f).collect(),
            total_rows: self.total_rows,
            next_offset: self.next_offset,
            prev_offset: self.prev_offset,
        }
    }
}

/// `limit`/`offset` query parameters shared by the paginated listings.
#[derive(Deserialize, Debug, Default, Clone, Copy)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    pub fn limit_or(&self, default: i64) -> i64 {
        self.limit.filter(|limit| *limit > 0).unwrap_or(default)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_page_has_no_prev() {
        let page = PageContext::from_rows(vec![1, 2, 3], 10, 3, 0);
        assert_eq!(page.prev_offset, None);
        assert_eq!(page.next_offset, Some(3));
        assert_eq!(page.total_rows, 10);
    }

    #[test]
    fn middle_page_links_both_ways() {
        let page = PageContext::from_rows(vec![4, 5, 6], 10, 3, 3);
        assert_eq!(page.prev_offset, Some(0));
        assert_eq!(page.next_offset, Some(6));
    }

    #[test]
    fn last_page_has_no_next() {
        let page = PageContext::from_rows(vec![10], 10, 3, 9);
        assert_eq!(page.prev_offset, Some(6));
        assert_eq!(page.next_offset, None);
    }

    #[test]
    fn empty_result_collapses() {
        let page: PageContext<i32> = PageContext::from_rows(vec![], 0, 3, 0);
        assert_eq!(page.total_rows, 0);
        assert!(page.rows.is_empty());
        assert_eq!(page.next_offset, None);
    }

    #[test]
    fn page_query_defaults() {
        let query = PageQuery::default();
        assert_eq!(query.limit_or(6), 6);
        assert_eq!(query.offset(), 0);

        let query = PageQuery {
            limit: Some(0),
            offset: Some(-3),
        };
        assert_eq!(query.limit_or(6), 6);
        assert_eq!(query.offset(), 0);
    }
}
