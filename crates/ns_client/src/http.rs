use async_trait::async_trait;
use ns_core::{
    AggregateQuery, Article, ArticleQuery, AuthToken, Credentials, DateRange, Error, NewsApi,
    PageResponse, Registration, Result, SentimentAggregate, SentimentSummary, Source, SourceQuery,
    Topic, TopicRequest,
};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::session::Session;

/// REST gateway to the dashboard backend.
pub struct HttpGateway {
    client: Arc<Client>,
    config: ClientConfig,
    session: Session,
}

impl HttpGateway {
    pub fn new(config: ClientConfig, session: Session) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client: Arc::new(client),
            config,
            session,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.config.endpoint(path)?;
        debug!("➡️ {} {}", method, url);
        let mut builder = self.client.request(method, url);
        if let Some(token) = self.session.bearer() {
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().path().to_string();
        let body = response.text().await.unwrap_or_default();
        Err(self.status_error(status, url, body))
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = self.execute(builder).await?;
        response.json::<T>().await.map_err(|e| self.transport_error(e))
    }

    fn transport_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout(self.config.timeout.as_secs())
        } else {
            Error::from(err)
        }
    }

    fn status_error(&self, status: StatusCode, path: String, body: String) -> Error {
        match status {
            StatusCode::UNAUTHORIZED => {
                warn!("🔒 {} answered 401, tearing down the session", path);
                self.session.expire();
                Error::Unauthorized
            }
            StatusCode::NOT_FOUND => Error::NotFound(path),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                Error::Validation(if body.is_empty() { status.to_string() } else { body })
            }
            _ => Error::Server {
                status: status.as_u16(),
                message: if body.is_empty() { status.to_string() } else { body },
            },
        }
    }
}

impl fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpGateway")
            .field("client", &"<reqwest::Client>")
            .field("base_url", &self.config.base_url().as_str())
            .field("session", &self.session)
            .finish()
    }
}

#[async_trait]
impl NewsApi for HttpGateway {
    fn name(&self) -> &str {
        "http"
    }

    async fn login(&self, credentials: &Credentials) -> Result<AuthToken> {
        let request = self.request(Method::POST, "auth/login")?.json(credentials);
        self.fetch(request).await
    }

    async fn register(&self, registration: &Registration) -> Result<AuthToken> {
        let request = self.request(Method::POST, "auth/register")?.json(registration);
        self.fetch(request).await
    }

    async fn list_articles(&self, query: &ArticleQuery) -> Result<PageResponse<Article>> {
        let request = self.request(Method::GET, "articles")?.query(query);
        self.fetch(request).await
    }

    async fn get_article(&self, id: i64) -> Result<Article> {
        let request = self.request(Method::GET, &format!("articles/{}", id))?;
        self.fetch(request).await
    }

    async fn sentiment_aggregate(&self, query: &AggregateQuery) -> Result<Vec<SentimentAggregate>> {
        let request = self.request(Method::GET, "sentiment/aggregate")?.query(query);
        self.fetch(request).await
    }

    async fn sentiment_summary(&self, range: &DateRange) -> Result<SentimentSummary> {
        let request = self.request(Method::GET, "sentiment/summary")?.query(range);
        self.fetch(request).await
    }

    async fn list_sources(&self, query: &SourceQuery) -> Result<Vec<Source>> {
        let request = self.request(Method::GET, "sources")?.query(query);
        self.fetch(request).await
    }

    async fn get_source(&self, id: i64) -> Result<Source> {
        let request = self.request(Method::GET, &format!("sources/{}", id))?;
        self.fetch(request).await
    }

    async fn list_topics(&self) -> Result<Vec<Topic>> {
        let request = self.request(Method::GET, "topics")?;
        self.fetch(request).await
    }

    async fn get_topic(&self, id: i64) -> Result<Topic> {
        let request = self.request(Method::GET, &format!("topics/{}", id))?;
        self.fetch(request).await
    }

    async fn create_topic(&self, request: &TopicRequest) -> Result<Topic> {
        let builder = self.request(Method::POST, "topics")?.json(request);
        self.fetch(builder).await
    }

    async fn update_topic(&self, id: i64, request: &TopicRequest) -> Result<Topic> {
        let builder = self.request(Method::PUT, &format!("topics/{}", id))?.json(request);
        self.fetch(builder).await
    }

    async fn delete_topic(&self, id: i64) -> Result<()> {
        let request = self.request(Method::DELETE, &format!("topics/{}", id))?;
        self.execute(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let session = Session::with_token("abc", 3600);
        let gateway = HttpGateway::new(ClientConfig::default(), session.clone()).unwrap();

        assert_eq!(
            gateway.status_error(StatusCode::NOT_FOUND, "/api/v1/topics/9".into(), String::new()),
            Error::NotFound("/api/v1/topics/9".into())
        );
        assert!(matches!(
            gateway.status_error(StatusCode::UNPROCESSABLE_ENTITY, "/topics".into(), "bad".into()),
            Error::Validation(body) if body == "bad"
        ));
        assert!(matches!(
            gateway.status_error(StatusCode::BAD_GATEWAY, "/articles".into(), String::new()),
            Error::Server { status: 502, .. }
        ));
        assert!(session.is_authenticated());

        assert_eq!(
            gateway.status_error(StatusCode::UNAUTHORIZED, "/topics".into(), String::new()),
            Error::Unauthorized
        );
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_debug_hides_token() {
        let gateway =
            HttpGateway::new(ClientConfig::default(), Session::with_token("secret", 3600)).unwrap();
        assert!(!format!("{:?}", gateway).contains("secret"));
    }
}
