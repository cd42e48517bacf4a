use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use ns_core::{
    AggregateQuery, Article, ArticleQuery, AuthToken, Credentials, DateRange, Error, GroupBy,
    Language, NewsApi, PageResponse, Registration, Result, Sentiment, SentimentAggregate,
    SentimentSummary, Source, SourceQuery, SourceType, Topic, TopicRequest,
};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use crate::session::Session;

const TOKEN_LIFETIME_SECS: u64 = 86_400;
const DEFAULT_SEARCH_INTERVAL: u32 = 60;

#[derive(Debug, Default)]
pub struct MemoryStore {
    articles: Vec<Article>,
    sources: Vec<Source>,
    topics: Vec<Topic>,
    next_topic_id: i64,
    users: HashMap<String, (String, Option<String>)>,
    tokens: HashSet<String>,
}

impl MemoryStore {
    fn issue_token(&mut self) -> AuthToken {
        let token = uuid::Uuid::new_v4().to_string();
        self.tokens.insert(token.clone());
        AuthToken {
            token,
            expires_in: TOKEN_LIFETIME_SECS,
        }
    }

    fn articles(&self, query: &ArticleQuery) -> PageResponse<Article> {
        let needle = query.q.as_ref().map(|q| q.to_lowercase());
        let mut matching: Vec<Article> = self
            .articles
            .iter()
            .filter(|a| query.source_id.map_or(true, |id| a.source_id == id))
            .filter(|a| query.sentiment.map_or(true, |s| a.sentiment == Some(s)))
            .filter(|a| query.from.map_or(true, |from| a.published_at >= from))
            .filter(|a| query.to.map_or(true, |to| a.published_at <= to))
            .filter(|a| {
                needle
                    .as_ref()
                    .map_or(true, |n| a.title.to_lowercase().contains(n))
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        PageResponse::from_items(matching, query.page, query.size)
    }

    fn aggregate(&self, query: &AggregateQuery) -> Vec<SentimentAggregate> {
        let range = query.range();
        let mut groups: BTreeMap<String, (u64, u64, u64)> = BTreeMap::new();
        for article in self.articles.iter().filter(|a| range.contains(a.published_at)) {
            let Some(sentiment) = article.sentiment else {
                continue;
            };
            let group = match query.group_by {
                GroupBy::Day => article.published_at.format("%Y-%m-%d").to_string(),
                GroupBy::Source => article.source_name.clone(),
            };
            let counts = groups.entry(group).or_default();
            match sentiment {
                Sentiment::Positive => counts.0 += 1,
                Sentiment::Negative => counts.1 += 1,
                Sentiment::Neutral => counts.2 += 1,
            }
        }
        groups
            .into_iter()
            .map(|(group, (pos, neg, neu))| SentimentAggregate::new(group, pos, neg, neu))
            .collect()
    }

    fn summary(&self, range: &DateRange) -> SentimentSummary {
        let mut summary = SentimentSummary::default();
        for article in self.articles.iter().filter(|a| range.contains(a.published_at)) {
            match article.sentiment {
                Some(Sentiment::Positive) => summary.positive += 1,
                Some(Sentiment::Negative) => summary.negative += 1,
                Some(Sentiment::Neutral) => summary.neutral += 1,
                None => {}
            }
        }
        summary
    }

    fn sources(&self, query: &SourceQuery) -> Vec<Source> {
        self.sources
            .iter()
            .filter(|s| query.active.map_or(true, |active| s.active == active))
            .filter(|s| query.language.map_or(true, |lang| s.language == lang))
            .cloned()
            .collect()
    }

    fn topics(&self) -> Vec<Topic> {
        let mut topics = self.topics.clone();
        topics.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        topics
    }

    fn create_topic(&mut self, request: &TopicRequest) -> Result<Topic> {
        validate_topic(request)?;
        self.next_topic_id += 1;
        let topic = Topic {
            id: self.next_topic_id,
            name: request.name.clone(),
            keywords: request.keywords.clone(),
            source_ids: request.source_ids.clone(),
            global_search: request.global_search.unwrap_or(false),
            language: Some(request.language.clone().unwrap_or_else(|| "en".to_string())),
            search_interval_minutes: Some(DEFAULT_SEARCH_INTERVAL),
            created_at: Utc::now(),
            last_searched_at: None,
        };
        self.topics.push(topic.clone());
        Ok(topic)
    }

    fn update_topic(&mut self, id: i64, request: &TopicRequest) -> Result<Topic> {
        validate_topic(request)?;
        let topic = self
            .topics
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::NotFound(format!("/topics/{}", id)))?;
        topic.name = request.name.clone();
        topic.keywords = request.keywords.clone();
        topic.source_ids = request.source_ids.clone();
        if let Some(global) = request.global_search {
            topic.global_search = global;
        }
        if let Some(language) = &request.language {
            topic.language = Some(language.clone());
        }
        Ok(topic.clone())
    }

    fn delete_topic(&mut self, id: i64) -> Result<()> {
        let before = self.topics.len();
        self.topics.retain(|t| t.id != id);
        if self.topics.len() == before {
            return Err(Error::NotFound(format!("/topics/{}", id)));
        }
        Ok(())
    }
}

fn validate_topic(request: &TopicRequest) -> Result<()> {
    if request.name.trim().is_empty() {
        return Err(Error::Validation("Topic name is required".to_string()));
    }
    if request.keywords.is_empty() {
        return Err(Error::Validation("At least one keyword is required".to_string()));
    }
    Ok(())
}

/// In-process backend with the same contract as the REST API.
///
/// Responses are computed when a call starts and delivered after the next
/// queued latency, so tests can make an earlier request land after a later
/// one.
pub struct InMemoryApi {
    store: RwLock<MemoryStore>,
    session: Session,
    calls: Mutex<HashMap<&'static str, usize>>,
    latencies: Mutex<VecDeque<Duration>>,
    failures: Mutex<HashMap<&'static str, VecDeque<Error>>>,
}

impl InMemoryApi {
    pub fn new(session: Session) -> Self {
        Self {
            store: RwLock::new(MemoryStore::default()),
            session,
            calls: Mutex::new(HashMap::new()),
            latencies: Mutex::new(VecDeque::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// A backend populated with a week of sample coverage and one account,
    /// `demo@example.com` / `demo`.
    pub async fn seeded(session: Session) -> Self {
        let api = Self::new(session);
        api.add_user("demo@example.com", "demo", Some("Demo User")).await;
        let now = Utc::now();
        api.add_source(source(1, "Armenpress", "https://armenpress.am/rss", SourceType::Rss, Language::Armenian, true)).await;
        api.add_source(source(2, "News.am", "https://news.am", SourceType::WebScrape, Language::Russian, true)).await;
        api.add_source(source(3, "CivilNet", "https://t.me/civilnet", SourceType::Telegram, Language::English, false)).await;

        let sentiments = [
            Some(Sentiment::Positive),
            Some(Sentiment::Negative),
            Some(Sentiment::Neutral),
            Some(Sentiment::Positive),
            None,
        ];
        let sources = [(1, "Armenpress"), (2, "News.am"), (3, "CivilNet")];
        for i in 0..42i64 {
            let (source_id, source_name) = sources[(i % 3) as usize];
            let sentiment = sentiments[(i % 5) as usize];
            api.add_article(Article {
                id: i + 1,
                source_id,
                source_name: source_name.to_string(),
                title: format!("{} report #{}", source_name, i + 1),
                url: format!("https://example.com/articles/{}", i + 1),
                author: (i % 4 == 0).then(|| "Staff".to_string()),
                published_at: now - ChronoDuration::hours(i * 4),
                sentiment,
                confidence: sentiment.map(|_| 0.5 + (i % 5) as f64 / 10.0),
            })
            .await;
        }
        api.store
            .write()
            .await
            .create_topic(&TopicRequest {
                name: "Armenia Tech Industry".to_string(),
                keywords: vec!["Armenia startup".to_string(), "Yerevan tech".to_string()],
                source_ids: None,
                global_search: Some(true),
                language: Some("en".to_string()),
            })
            .ok();
        api
    }

    pub async fn add_user(&self, email: &str, password: &str, name: Option<&str>) {
        self.store.write().await.users.insert(
            email.to_string(),
            (password.to_string(), name.map(str::to_string)),
        );
    }

    pub async fn add_source(&self, source: Source) {
        self.store.write().await.sources.push(source);
    }

    pub async fn add_article(&self, article: Article) {
        let mut store = self.store.write().await;
        if let Some(existing) = store.articles.iter_mut().find(|a| a.id == article.id) {
            *existing = article;
        } else {
            store.articles.push(article);
        }
    }

    /// Issues a token outside the login flow and starts the session with it.
    pub async fn sign_in(&self) -> AuthToken {
        let token = self.store.write().await.issue_token();
        self.session.begin(&token);
        token
    }

    /// Invalidates every issued token, as a server-side expiry would.
    pub async fn revoke_tokens(&self) {
        self.store.write().await.tokens.clear();
    }

    /// Delays the next call by `latency`; queued latencies are consumed in
    /// call order.
    pub fn push_latency(&self, latency: Duration) {
        self.latencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(latency);
    }

    /// Makes the next call to `operation` fail with `error`.
    pub fn fail_next(&self, operation: &'static str, error: Error) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn enter(&self, operation: &'static str) -> Result<()> {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(operation)
            .or_insert(0) += 1;
        debug!("🧪 memory backend: {}", operation);
        let injected = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(operation)
            .and_then(VecDeque::pop_front);
        match injected {
            Some(Error::Unauthorized) => {
                self.session.expire();
                Err(Error::Unauthorized)
            }
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn authorize(&self, operation: &'static str) -> Result<()> {
        self.enter(operation)?;
        let valid = match self.session.bearer() {
            Some(token) => self.store.read().await.tokens.contains(&token),
            None => false,
        };
        if !valid {
            self.session.expire();
            return Err(Error::Unauthorized);
        }
        Ok(())
    }

    async fn respond<T>(&self, value: Result<T>) -> Result<T> {
        let latency = self
            .latencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        value
    }
}

fn source(
    id: i64,
    name: &str,
    url: &str,
    source_type: SourceType,
    language: Language,
    active: bool,
) -> Source {
    let fetched: Option<DateTime<Utc>> = active.then(Utc::now);
    Source {
        id,
        name: name.to_string(),
        url: url.to_string(),
        source_type,
        language,
        active,
        last_fetched: fetched,
        last_success: fetched,
    }
}

#[async_trait]
impl NewsApi for InMemoryApi {
    fn name(&self) -> &str {
        "memory"
    }

    async fn login(&self, credentials: &Credentials) -> Result<AuthToken> {
        self.enter("login")?;
        let mut store = self.store.write().await;
        let known = store
            .users
            .get(&credentials.email)
            .map_or(false, |(password, _)| *password == credentials.password);
        let result = if known {
            Ok(store.issue_token())
        } else {
            Err(Error::Unauthorized)
        };
        drop(store);
        self.respond(result).await
    }

    async fn register(&self, registration: &Registration) -> Result<AuthToken> {
        self.enter("register")?;
        let mut store = self.store.write().await;
        let result = if store.users.contains_key(&registration.email) {
            Err(Error::Validation("Email already registered".to_string()))
        } else {
            store.users.insert(
                registration.email.clone(),
                (registration.password.clone(), registration.name.clone()),
            );
            Ok(store.issue_token())
        };
        drop(store);
        self.respond(result).await
    }

    async fn list_articles(&self, query: &ArticleQuery) -> Result<PageResponse<Article>> {
        self.authorize("list_articles").await?;
        let page = self.store.read().await.articles(query);
        self.respond(Ok(page)).await
    }

    async fn get_article(&self, id: i64) -> Result<Article> {
        self.authorize("get_article").await?;
        let article = self
            .store
            .read()
            .await
            .articles
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("/articles/{}", id)));
        self.respond(article).await
    }

    async fn sentiment_aggregate(&self, query: &AggregateQuery) -> Result<Vec<SentimentAggregate>> {
        self.authorize("sentiment_aggregate").await?;
        let groups = self.store.read().await.aggregate(query);
        self.respond(Ok(groups)).await
    }

    async fn sentiment_summary(&self, range: &DateRange) -> Result<SentimentSummary> {
        self.authorize("sentiment_summary").await?;
        let summary = self.store.read().await.summary(range);
        self.respond(Ok(summary)).await
    }

    async fn list_sources(&self, query: &SourceQuery) -> Result<Vec<Source>> {
        self.authorize("list_sources").await?;
        let sources = self.store.read().await.sources(query);
        self.respond(Ok(sources)).await
    }

    async fn get_source(&self, id: i64) -> Result<Source> {
        self.authorize("get_source").await?;
        let source = self
            .store
            .read()
            .await
            .sources
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("/sources/{}", id)));
        self.respond(source).await
    }

    async fn list_topics(&self) -> Result<Vec<Topic>> {
        self.authorize("list_topics").await?;
        let topics = self.store.read().await.topics();
        self.respond(Ok(topics)).await
    }

    async fn get_topic(&self, id: i64) -> Result<Topic> {
        self.authorize("get_topic").await?;
        let topic = self
            .store
            .read()
            .await
            .topics
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("/topics/{}", id)));
        self.respond(topic).await
    }

    async fn create_topic(&self, request: &TopicRequest) -> Result<Topic> {
        self.authorize("create_topic").await?;
        let topic = self.store.write().await.create_topic(request);
        self.respond(topic).await
    }

    async fn update_topic(&self, id: i64, request: &TopicRequest) -> Result<Topic> {
        self.authorize("update_topic").await?;
        let topic = self.store.write().await.update_topic(id, request);
        self.respond(topic).await
    }

    async fn delete_topic(&self, id: i64) -> Result<()> {
        self.authorize("delete_topic").await?;
        let result = self.store.write().await.delete_topic(id);
        self.respond(result).await
    }
}
