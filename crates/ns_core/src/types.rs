use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

pub const DEFAULT_PAGE_SIZE: u32 = 20;

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Negative, Sentiment::Neutral];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "POSITIVE",
            Sentiment::Negative => "NEGATIVE",
            Sentiment::Neutral => "NEUTRAL",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "POSITIVE" => Ok(Sentiment::Positive),
            "NEGATIVE" => Ok(Sentiment::Negative),
            "NEUTRAL" => Ok(Sentiment::Neutral),
            other => Err(format!("Unknown sentiment: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: i64,
    pub source_id: i64,
    pub source_name: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub author: Option<String>,
    pub published_at: DateTime<Utc>,
    /// Absent until the analyzer has scored the article.
    #[serde(default)]
    pub sentiment: Option<Sentiment>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    Rss,
    WebScrape,
    Telegram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Language {
    Armenian,
    Russian,
    English,
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ARMENIAN" | "HY" => Ok(Language::Armenian),
            "RUSSIAN" | "RU" => Ok(Language::Russian),
            "ENGLISH" | "EN" => Ok(Language::English),
            other => Err(format!("Unknown language: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub language: Language,
    #[serde(default, deserialize_with = "null_as_default")]
    pub active: bool,
    #[serde(default)]
    pub last_fetched: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_success: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: i64,
    pub name: String,
    /// Kept in submission order, duplicates included.
    pub keywords: Vec<String>,
    #[serde(default)]
    pub source_ids: Option<Vec<i64>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub global_search: bool,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub search_interval_minutes: Option<u32>,
    pub created_at: DateTime<Utc>,
    /// Written by the server only.
    #[serde(default)]
    pub last_searched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentAggregate {
    pub group: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub positive: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub negative: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub neutral: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total: u64,
}

impl SentimentAggregate {
    pub fn new(group: impl Into<String>, positive: u64, negative: u64, neutral: u64) -> Self {
        Self {
            group: group.into(),
            positive,
            negative,
            neutral,
            total: positive + negative + neutral,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.total == self.positive + self.negative + self.neutral
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentSummary {
    #[serde(rename = "POSITIVE", default)]
    pub positive: u64,
    #[serde(rename = "NEGATIVE", default)]
    pub negative: u64,
    #[serde(rename = "NEUTRAL", default)]
    pub neutral: u64,
}

impl SentimentSummary {
    pub fn new(positive: u64, negative: u64, neutral: u64) -> Self {
        Self { positive, negative, neutral }
    }

    pub fn count(&self, sentiment: Sentiment) -> u64 {
        match sentiment {
            Sentiment::Positive => self.positive,
            Sentiment::Negative => self.negative,
            Sentiment::Neutral => self.neutral,
        }
    }

    pub fn total(&self) -> u64 {
        self.positive + self.negative + self.neutral
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub content: Vec<T>,
    pub total_elements: u64,
    pub total_pages: u32,
    pub size: u32,
    /// Zero-based page index.
    #[serde(rename = "number")]
    pub page: u32,
}

impl<T> PageResponse<T> {
    /// Slices `items` into the requested page.
    pub fn from_items(items: Vec<T>, page: u32, size: u32) -> Self {
        let total_elements = items.len() as u64;
        let total_pages = if size == 0 {
            0
        } else {
            ((total_elements + size as u64 - 1) / size as u64) as u32
        };
        let start = (page as usize).saturating_mul(size as usize);
        let content = items
            .into_iter()
            .skip(start)
            .take(size as usize)
            .collect();
        Self {
            content,
            total_elements,
            total_pages,
            size,
            page,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn is_last(&self) -> bool {
        self.page + 1 >= self.total_pages
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    pub token: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Body of `POST /topics` and `PUT /topics/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRequest {
    pub name: String,
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ids: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_search: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    pub page: u32,
    pub size: u32,
}

impl Default for ArticleQuery {
    fn default() -> Self {
        Self {
            source_id: None,
            sentiment: None,
            from: None,
            to: None,
            q: None,
            page: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    Day,
    Source,
}

impl FromStr for GroupBy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(GroupBy::Day),
            "source" => Ok(GroupBy::Source),
            other => Err(format!("Invalid groupBy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// The `days` days ending at `now`, truncated to the minute so repeated
    /// renders within the same minute produce the same range.
    pub fn last_days(now: DateTime<Utc>, days: i64) -> Result<Self> {
        if days < 1 {
            return Err(Error::Validation(format!("Range must cover at least one day, got {}", days)));
        }
        let to = now.duration_trunc(Duration::minutes(1)).unwrap_or(now);
        let from = Duration::try_days(days)
            .and_then(|span| to.checked_sub_signed(span))
            .ok_or_else(|| Error::Validation(format!("Range of {} days is out of bounds", days)))?;
        Ok(Self { from, to })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at <= self.to
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateQuery {
    pub group_by: GroupBy,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl AggregateQuery {
    pub fn new(group_by: GroupBy, range: DateRange) -> Self {
        Self {
            group_by,
            from: range.from,
            to: range.to,
        }
    }

    pub fn range(&self) -> DateRange {
        DateRange::new(self.from, self.to)
    }
}
