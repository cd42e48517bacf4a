use async_trait::async_trait;
use crate::types::{
    AggregateQuery, Article, ArticleQuery, AuthToken, Credentials, DateRange, PageResponse,
    Registration, SentimentAggregate, SentimentSummary, Source, SourceQuery, Topic, TopicRequest,
};
use crate::Result;

/// The dashboard backend, one method per REST operation.
///
/// Implementations attach the current session token to every call and tear
/// the session down when the backend answers `401`.
#[async_trait]
pub trait NewsApi: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &str;

    async fn login(&self, credentials: &Credentials) -> Result<AuthToken>;

    async fn register(&self, registration: &Registration) -> Result<AuthToken>;

    async fn list_articles(&self, query: &ArticleQuery) -> Result<PageResponse<Article>>;

    async fn get_article(&self, id: i64) -> Result<Article>;

    async fn sentiment_aggregate(&self, query: &AggregateQuery) -> Result<Vec<SentimentAggregate>>;

    async fn sentiment_summary(&self, range: &DateRange) -> Result<SentimentSummary>;

    async fn list_sources(&self, query: &SourceQuery) -> Result<Vec<Source>>;

    async fn get_source(&self, id: i64) -> Result<Source>;

    async fn list_topics(&self) -> Result<Vec<Topic>>;

    async fn get_topic(&self, id: i64) -> Result<Topic>;

    async fn create_topic(&self, request: &TopicRequest) -> Result<Topic>;

    async fn update_topic(&self, id: i64, request: &TopicRequest) -> Result<Topic>;

    async fn delete_topic(&self, id: i64) -> Result<()>;
}
