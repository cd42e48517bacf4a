use ns_core::{ArticleQuery, DateRange, Result, Sentiment, DEFAULT_PAGE_SIZE};

use crate::key::QueryKey;
use crate::queries::ARTICLES;

/// Filter and pagination state of an article list view.
///
/// Any change to a filter sends the view back to the first page. Paging is
/// clamped to the pages the last response reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleFilter {
    source_id: Option<i64>,
    sentiment: Option<Sentiment>,
    range: Option<DateRange>,
    search: Option<String>,
    page: u32,
    size: u32,
}

impl ArticleFilter {
    pub fn new(size: u32) -> Self {
        Self {
            source_id: None,
            sentiment: None,
            range: None,
            search: None,
            page: 0,
            size,
        }
    }

    pub fn source_id(&self) -> Option<i64> {
        self.source_id
    }

    pub fn sentiment(&self) -> Option<Sentiment> {
        self.sentiment
    }

    pub fn range(&self) -> Option<DateRange> {
        self.range
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Returns true when the filter actually changed.
    pub fn set_source(&mut self, source_id: Option<i64>) -> bool {
        if self.source_id == source_id {
            return false;
        }
        self.source_id = source_id;
        self.page = 0;
        true
    }

    pub fn set_sentiment(&mut self, sentiment: Option<Sentiment>) -> bool {
        if self.sentiment == sentiment {
            return false;
        }
        self.sentiment = sentiment;
        self.page = 0;
        true
    }

    pub fn set_range(&mut self, range: Option<DateRange>) -> bool {
        if self.range == range {
            return false;
        }
        self.range = range;
        self.page = 0;
        true
    }

    /// Blank input clears the search.
    pub fn set_search(&mut self, search: Option<&str>) -> bool {
        let search = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        if self.search == search {
            return false;
        }
        self.search = search;
        self.page = 0;
        true
    }

    pub fn can_go_previous(&self) -> bool {
        self.page > 0
    }

    pub fn can_go_next(&self, total_pages: u32) -> bool {
        self.page + 1 < total_pages
    }

    /// No-op on the first page.
    pub fn previous_page(&mut self) -> bool {
        if !self.can_go_previous() {
            return false;
        }
        self.page -= 1;
        true
    }

    /// No-op on the last page.
    pub fn next_page(&mut self, total_pages: u32) -> bool {
        if !self.can_go_next(total_pages) {
            return false;
        }
        self.page += 1;
        true
    }

    /// Jumps to `page`, clamped to `[0, total_pages - 1]`.
    pub fn go_to(&mut self, page: u32, total_pages: u32) -> bool {
        let page = page.min(total_pages.saturating_sub(1));
        if self.page == page {
            return false;
        }
        self.page = page;
        true
    }

    pub fn to_query(&self) -> ArticleQuery {
        ArticleQuery {
            source_id: self.source_id,
            sentiment: self.sentiment,
            from: self.range.map(|r| r.from),
            to: self.range.map(|r| r.to),
            q: self.search.clone(),
            page: self.page,
            size: self.size,
        }
    }

    pub fn cache_key(&self) -> Result<QueryKey> {
        QueryKey::from_params(ARTICLES, &self.to_query())
    }
}

impl Default for ArticleFilter {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn on_page(page: u32) -> ArticleFilter {
        let mut filter = ArticleFilter::default();
        filter.go_to(page, 10);
        filter
    }

    #[test]
    fn test_filter_changes_reset_page() {
        let mut filter = on_page(3);
        assert!(filter.set_source(Some(2)));
        assert_eq!(filter.page(), 0);

        let mut filter = on_page(3);
        assert!(filter.set_sentiment(Some(Sentiment::Neutral)));
        assert_eq!(filter.page(), 0);

        let mut filter = on_page(3);
        assert!(filter.set_search(Some("budget")));
        assert_eq!(filter.page(), 0);

        let mut filter = on_page(3);
        let range = DateRange::last_days(Utc.with_ymd_and_hms(2024, 3, 8, 0, 0, 0).unwrap(), 7).unwrap();
        assert!(filter.set_range(Some(range)));
        assert_eq!(filter.page(), 0);
    }

    #[test]
    fn test_same_value_is_not_a_change() {
        let mut filter = on_page(3);
        filter.set_sentiment(Some(Sentiment::Positive));
        filter.next_page(10);
        assert!(!filter.set_sentiment(Some(Sentiment::Positive)));
        assert_eq!(filter.page(), 1);
        assert!(!filter.set_search(Some("   ")));
    }

    #[test]
    fn test_paging_bounds() {
        let mut filter = ArticleFilter::default();
        assert!(!filter.can_go_previous());
        assert!(!filter.previous_page());
        assert_eq!(filter.page(), 0);

        assert!(filter.next_page(3));
        assert!(filter.next_page(3));
        assert_eq!(filter.page(), 2);
        assert!(!filter.can_go_next(3));
        assert!(!filter.next_page(3));
        assert_eq!(filter.page(), 2);

        assert!(filter.can_go_previous());
        assert!(filter.previous_page());
        assert_eq!(filter.page(), 1);
    }

    #[test]
    fn test_no_pages_disables_next() {
        let mut filter = ArticleFilter::default();
        assert!(!filter.can_go_next(0));
        assert!(!filter.can_go_next(1));
        assert!(!filter.next_page(0));
        assert!(!filter.go_to(5, 0));
        assert_eq!(filter.page(), 0);
    }

    #[test]
    fn test_go_to_clamps() {
        let mut filter = ArticleFilter::default();
        assert!(filter.go_to(99, 4));
        assert_eq!(filter.page(), 3);
    }

    #[test]
    fn test_equal_states_share_a_key() {
        let mut a = ArticleFilter::default();
        a.set_sentiment(Some(Sentiment::Negative));
        a.set_source(Some(1));

        let mut b = ArticleFilter::default();
        b.set_source(Some(1));
        b.set_search(Some("x"));
        b.set_search(None);
        b.set_sentiment(Some(Sentiment::Negative));

        assert_eq!(a.cache_key().unwrap(), b.cache_key().unwrap());

        a.next_page(5);
        assert_ne!(a.cache_key().unwrap(), b.cache_key().unwrap());
    }

    #[test]
    fn test_to_query() {
        let mut filter = ArticleFilter::new(5);
        filter.set_search(Some("  election "));
        let query = filter.to_query();
        assert_eq!(query.q.as_deref(), Some("election"));
        assert_eq!(query.size, 5);
        assert_eq!(query.from, None);
    }
}
