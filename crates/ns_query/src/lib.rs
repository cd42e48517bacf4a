//! Query layer between view state and the news API: a keyed cache with
//! request deduplication and stale-while-revalidate, per-view filter state,
//! topic mutations with cache invalidation, and the derived chart and table
//! shapes the pages render.

pub mod client;
pub mod filter;
pub mod key;
pub mod mutation;
pub mod pages;
pub mod queries;
pub mod store;
pub mod transform;

pub use client::QueryClient;
pub use filter::ArticleFilter;
pub use key::QueryKey;
pub use mutation::{parse_keywords, TopicForm, TopicMutations};
pub use pages::{ArticlesPage, DashboardPage, TopicsPage};
pub use store::{
    Query, QueryObserver, QueryResult, QueryStatus, QueryStore, StoreConfig,
};
