//! View-models for the three dashboard pages.
//!
//! A page owns its local state and the observers for the keys it shows.
//! Dropping a page unmounts it.

use chrono::{DateTime, Utc};
use ns_core::{
    AggregateQuery, Article, DateRange, Error, GroupBy, PageResponse, Result, Sentiment,
    SentimentAggregate, SentimentSummary, Source, SourceQuery, Topic,
};
use tracing::debug;

use crate::client::QueryClient;
use crate::filter::ArticleFilter;
use crate::mutation::{TopicForm, TopicMutations};
use crate::queries;
use crate::store::{QueryObserver, QueryResult};
use crate::transform::{
    article_rows, page_caption, pie_slices, sentiment_icon, short_timestamp, topic_rows,
    trend_series, ArticleRow, PieSlice, TopicRow, TrendPoint,
};

pub const RECENT_ARTICLES_SIZE: u32 = 5;
pub const DASHBOARD_DAYS: i64 = 7;

/// Inline error text for a query, if it failed.
fn error_text<T>(state: &QueryResult<T>) -> Option<String> {
    state.error().map(Error::to_string)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArticlesView {
    pub loading: bool,
    pub error: Option<String>,
    pub rows: Vec<ArticleRow>,
    pub caption: String,
    pub page: u32,
    pub total_pages: u32,
    pub can_previous: bool,
    pub can_next: bool,
    /// Active sources offered in the source filter.
    pub sources: Vec<(i64, String)>,
}

pub struct ArticlesPage {
    client: QueryClient,
    filter: ArticleFilter,
    sources: QueryObserver<Vec<Source>>,
    articles: QueryObserver<PageResponse<Article>>,
}

impl ArticlesPage {
    pub fn new(client: QueryClient) -> Result<Self> {
        Self::with_filter(client, ArticleFilter::default())
    }

    pub fn with_filter(client: QueryClient, filter: ArticleFilter) -> Result<Self> {
        let active = SourceQuery {
            active: Some(true),
            ..SourceQuery::default()
        };
        let sources = client.store().observe(queries::sources(client.api(), active)?);
        let articles = client
            .store()
            .observe(queries::articles(client.api(), filter.to_query())?);
        Ok(Self {
            client,
            filter,
            sources,
            articles,
        })
    }

    pub fn filter(&self) -> &ArticleFilter {
        &self.filter
    }

    /// Points the article observer at the key of the current filter.
    fn remount(&mut self) -> Result<()> {
        let query = queries::articles(self.client.api(), self.filter.to_query())?;
        debug!("🔎 articles view now shows {}", query.key());
        self.articles = self.client.store().observe(query);
        Ok(())
    }

    fn apply(&mut self, changed: bool) -> Result<bool> {
        if changed {
            self.remount()?;
        }
        Ok(changed)
    }

    pub fn set_source(&mut self, source_id: Option<i64>) -> Result<bool> {
        let changed = self.filter.set_source(source_id);
        self.apply(changed)
    }

    pub fn set_sentiment(&mut self, sentiment: Option<Sentiment>) -> Result<bool> {
        let changed = self.filter.set_sentiment(sentiment);
        self.apply(changed)
    }

    pub fn set_range(&mut self, range: Option<DateRange>) -> Result<bool> {
        let changed = self.filter.set_range(range);
        self.apply(changed)
    }

    pub fn set_search(&mut self, search: Option<&str>) -> Result<bool> {
        let changed = self.filter.set_search(search);
        self.apply(changed)
    }

    fn total_pages(&self) -> u32 {
        self.articles.current().data.map_or(0, |page| page.total_pages)
    }

    pub fn next_page(&mut self) -> Result<bool> {
        let changed = self.filter.next_page(self.total_pages());
        self.apply(changed)
    }

    pub fn previous_page(&mut self) -> Result<bool> {
        let changed = self.filter.previous_page();
        self.apply(changed)
    }

    pub fn go_to(&mut self, page: u32) -> Result<bool> {
        let changed = self.filter.go_to(page, self.total_pages());
        self.apply(changed)
    }

    /// Retries the visible article query.
    pub fn retry(&self) -> bool {
        self.client.store().refetch(self.articles.key())
    }

    pub async fn settled(&mut self) -> Result<ArticlesView> {
        self.sources.settled().await?;
        self.articles.settled().await?;
        Ok(self.view())
    }

    pub fn view(&self) -> ArticlesView {
        let articles = self.articles.current();
        let page = articles.data.as_deref();
        let total_pages = page.map_or(0, |p| p.total_pages);
        let sources = self
            .sources
            .current()
            .data
            .map(|sources| sources.iter().map(|s| (s.id, s.name.clone())).collect())
            .unwrap_or_default();
        ArticlesView {
            loading: articles.is_loading(),
            error: error_text(&articles),
            rows: page.map(|p| article_rows(&p.content)).unwrap_or_default(),
            caption: page_caption(page),
            page: self.filter.page(),
            total_pages,
            can_previous: self.filter.can_go_previous(),
            can_next: self.filter.can_go_next(total_pages),
            sources,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentArticle {
    pub icon: char,
    pub title: String,
    pub source: String,
    pub published: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    /// `None` while the summary is still loading.
    pub summary: Option<SentimentSummary>,
    pub slices: Vec<PieSlice>,
    pub trend: Vec<TrendPoint>,
    pub recent: Vec<RecentArticle>,
    pub errors: Vec<String>,
}

pub struct DashboardPage {
    summary: QueryObserver<SentimentSummary>,
    trend: QueryObserver<Vec<SentimentAggregate>>,
    recent: QueryObserver<Vec<Article>>,
}

impl DashboardPage {
    /// Mounts the dashboard over the `days` days ending at `now`.
    pub fn new(client: &QueryClient, now: DateTime<Utc>, days: i64) -> Result<Self> {
        let range = DateRange::last_days(now, days)?;
        let store = client.store();
        let api = client.api();
        Ok(Self {
            summary: store.observe(queries::sentiment_summary(api, range)?),
            trend: store.observe(queries::sentiment_trend(api, AggregateQuery::new(GroupBy::Day, range))?),
            recent: store.observe(queries::recent_articles(api, RECENT_ARTICLES_SIZE)),
        })
    }

    pub async fn settled(&mut self) -> Result<DashboardView> {
        self.summary.settled().await?;
        self.trend.settled().await?;
        self.recent.settled().await?;
        Ok(self.view())
    }

    pub fn view(&self) -> DashboardView {
        let summary = self.summary.current();
        let trend = self.trend.current();
        let recent = self.recent.current();
        let errors = [error_text(&summary), error_text(&trend), error_text(&recent)]
            .into_iter()
            .flatten()
            .collect();
        DashboardView {
            summary: summary.data.as_deref().copied(),
            slices: summary.data.as_deref().map(pie_slices).unwrap_or_default(),
            trend: trend.data.as_deref().map(|t| trend_series(t)).unwrap_or_default(),
            recent: recent
                .data
                .as_deref()
                .map(|articles| {
                    articles
                        .iter()
                        .map(|a| RecentArticle {
                            icon: sentiment_icon(a.sentiment),
                            title: a.title.clone(),
                            source: a.source_name.clone(),
                            published: short_timestamp(a.published_at),
                        })
                        .collect()
                })
                .unwrap_or_default(),
            errors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicsView {
    pub loading: bool,
    pub error: Option<String>,
    pub rows: Vec<TopicRow>,
    /// Submit and delete buttons are disabled while true.
    pub pending: bool,
}

pub struct TopicsPage {
    topics: QueryObserver<Vec<Topic>>,
    mutations: TopicMutations,
    pub form: TopicForm,
}

impl TopicsPage {
    pub fn new(client: &QueryClient) -> Self {
        Self {
            topics: client.store().observe(queries::topics(client.api())),
            mutations: client.topic_mutations(),
            form: TopicForm::default(),
        }
    }

    pub async fn submit(&mut self) -> Result<Topic> {
        self.mutations.create(&mut self.form).await
    }

    pub async fn save(&mut self, id: i64) -> Result<Topic> {
        self.mutations.update(id, &mut self.form).await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.mutations.delete(id).await
    }

    pub async fn settled(&mut self) -> Result<TopicsView> {
        self.topics.settled().await?;
        Ok(self.view())
    }

    pub fn view(&self) -> TopicsView {
        let topics = self.topics.current();
        TopicsView {
            loading: topics.is_loading(),
            error: error_text(&topics),
            rows: topics.data.as_deref().map(|t| topic_rows(t)).unwrap_or_default(),
            pending: self.mutations.is_pending(),
        }
    }
}
