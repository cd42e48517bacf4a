//! Query definitions for every resource the dashboard reads.

use ns_core::{
    AggregateQuery, Article, ArticleQuery, DateRange, NewsApi, PageResponse, Result,
    SentimentAggregate, SentimentSummary, Source, SourceQuery, Topic,
};
use std::sync::Arc;

use crate::key::QueryKey;
use crate::store::Query;

pub const ARTICLES: &str = "articles";
pub const ARTICLE: &str = "article";
pub const RECENT_ARTICLES: &str = "recent-articles";
pub const SOURCES: &str = "sources";
pub const SOURCE: &str = "source";
pub const TOPICS: &str = "topics";
pub const TOPIC: &str = "topic";
pub const SENTIMENT_TREND: &str = "sentiment-trend";
pub const SENTIMENT_SUMMARY: &str = "sentiment-summary";

pub fn articles(api: &Arc<dyn NewsApi>, query: ArticleQuery) -> Result<Query<PageResponse<Article>>> {
    let key = QueryKey::from_params(ARTICLES, &query)?;
    let api = api.clone();
    Ok(Query::new(key, move || {
        let api = api.clone();
        let query = query.clone();
        async move { api.list_articles(&query).await }
    }))
}

/// The newest `size` articles, unfiltered.
pub fn recent_articles(api: &Arc<dyn NewsApi>, size: u32) -> Query<Vec<Article>> {
    let key = QueryKey::new(RECENT_ARTICLES).with_param("size", size);
    let api = api.clone();
    Query::new(key, move || {
        let api = api.clone();
        async move {
            let query = ArticleQuery {
                size,
                ..ArticleQuery::default()
            };
            api.list_articles(&query).await.map(|page| page.content)
        }
    })
}

pub fn article(api: &Arc<dyn NewsApi>, id: i64) -> Query<Article> {
    let key = QueryKey::new(ARTICLE).with_param("id", id);
    let api = api.clone();
    Query::new(key, move || {
        let api = api.clone();
        async move { api.get_article(id).await }
    })
}

pub fn sources(api: &Arc<dyn NewsApi>, query: SourceQuery) -> Result<Query<Vec<Source>>> {
    let key = QueryKey::from_params(SOURCES, &query)?;
    let api = api.clone();
    Ok(Query::new(key, move || {
        let api = api.clone();
        let query = query.clone();
        async move { api.list_sources(&query).await }
    }))
}

pub fn source(api: &Arc<dyn NewsApi>, id: i64) -> Query<Source> {
    let key = QueryKey::new(SOURCE).with_param("id", id);
    let api = api.clone();
    Query::new(key, move || {
        let api = api.clone();
        async move { api.get_source(id).await }
    })
}

pub fn topics(api: &Arc<dyn NewsApi>) -> Query<Vec<Topic>> {
    let api = api.clone();
    Query::new(QueryKey::new(TOPICS), move || {
        let api = api.clone();
        async move { api.list_topics().await }
    })
}

pub fn topic(api: &Arc<dyn NewsApi>, id: i64) -> Query<Topic> {
    let key = QueryKey::new(TOPIC).with_param("id", id);
    let api = api.clone();
    Query::new(key, move || {
        let api = api.clone();
        async move { api.get_topic(id).await }
    })
}

pub fn sentiment_trend(api: &Arc<dyn NewsApi>, query: AggregateQuery) -> Result<Query<Vec<SentimentAggregate>>> {
    let key = QueryKey::from_params(SENTIMENT_TREND, &query)?;
    let api = api.clone();
    Ok(Query::new(key, move || {
        let api = api.clone();
        async move { api.sentiment_aggregate(&query).await }
    }))
}

pub fn sentiment_summary(api: &Arc<dyn NewsApi>, range: DateRange) -> Result<Query<SentimentSummary>> {
    let key = QueryKey::from_params(SENTIMENT_SUMMARY, &range)?;
    let api = api.clone();
    Ok(Query::new(key, move || {
        let api = api.clone();
        async move { api.sentiment_summary(&range).await }
    }))
}
