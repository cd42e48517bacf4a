//! Chart and table shapes derived from raw responses.
//!
//! Everything here is pure: the same response always yields the same view.

use chrono::{DateTime, NaiveDate, Utc};
use ns_core::{Article, PageResponse, Sentiment, SentimentAggregate, SentimentSummary, Topic};
use std::fmt;

use crate::mutation::language_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Green,
    Red,
    Gray,
}

impl Color {
    pub fn hex(&self) -> &'static str {
        match self {
            Color::Green => "#22c55e",
            Color::Red => "#ef4444",
            Color::Gray => "#6b7280",
        }
    }

    pub fn for_sentiment(sentiment: Sentiment) -> Self {
        match sentiment {
            Sentiment::Positive => Color::Green,
            Sentiment::Negative => Color::Red,
            Sentiment::Neutral => Color::Gray,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hex())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Badge {
    pub label: &'static str,
    pub color: Color,
}

/// Badge for an article's sentiment. Unscored articles read "Pending".
pub fn sentiment_badge(sentiment: Option<Sentiment>) -> Badge {
    match sentiment {
        Some(Sentiment::Positive) => Badge { label: "Positive", color: Color::Green },
        Some(Sentiment::Negative) => Badge { label: "Negative", color: Color::Red },
        Some(Sentiment::Neutral) => Badge { label: "Neutral", color: Color::Gray },
        None => Badge { label: "Pending", color: Color::Gray },
    }
}

/// Single glyph used in the recent articles list.
pub fn sentiment_icon(sentiment: Option<Sentiment>) -> char {
    match sentiment {
        Some(Sentiment::Positive) => '+',
        Some(Sentiment::Negative) => '-',
        _ => '○',
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PieSlice {
    pub label: &'static str,
    pub value: u64,
    pub color: Color,
    /// Share of the total, rounded to a whole percent.
    pub percent: u32,
}

pub fn pie_slices(summary: &SentimentSummary) -> Vec<PieSlice> {
    let total = summary.total();
    Sentiment::ALL
        .iter()
        .map(|&sentiment| {
            let value = summary.count(sentiment);
            PieSlice {
                label: sentiment_badge(Some(sentiment)).label,
                value,
                color: Color::for_sentiment(sentiment),
                percent: percent(value, total),
            }
        })
        .collect()
}

fn percent(value: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    (value as f64 * 100.0 / total as f64).round() as u32
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrendPoint {
    pub label: String,
    pub positive: u64,
    pub negative: u64,
    pub neutral: u64,
}

/// One point per aggregate, in the order the backend returned them.
pub fn trend_series(aggregates: &[SentimentAggregate]) -> Vec<TrendPoint> {
    aggregates
        .iter()
        .map(|a| TrendPoint {
            label: bucket_label(&a.group),
            positive: a.positive,
            negative: a.negative,
            neutral: a.neutral,
        })
        .collect()
}

/// Day buckets (`2024-03-01`) read as `Mar 1`; any other group label, such as
/// a source name, is kept.
pub fn bucket_label(group: &str) -> String {
    match NaiveDate::parse_from_str(group, "%Y-%m-%d") {
        Ok(day) => day.format("%b %-d").to_string(),
        Err(_) => group.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArticleRow {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub source: String,
    pub badge: Badge,
    pub published: String,
}

pub fn article_rows(articles: &[Article]) -> Vec<ArticleRow> {
    articles
        .iter()
        .map(|a| ArticleRow {
            id: a.id,
            title: a.title.clone(),
            url: a.url.clone(),
            source: a.source_name.clone(),
            badge: sentiment_badge(a.sentiment),
            published: a.published_at.format("%b %-d, %Y %H:%M").to_string(),
        })
        .collect()
}

pub fn short_timestamp(at: DateTime<Utc>) -> String {
    at.format("%b %-d, %H:%M").to_string()
}

pub fn page_caption<T>(page: Option<&PageResponse<T>>) -> String {
    let (shown, total) = page.map_or((0, 0), |p| (p.content.len() as u64, p.total_elements));
    format!("Showing {} of {} articles", shown, total)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRow {
    pub id: i64,
    pub name: String,
    pub global: bool,
    pub language: String,
    pub keywords: Vec<String>,
    pub last_searched: Option<String>,
}

pub fn topic_rows(topics: &[Topic]) -> Vec<TopicRow> {
    topics
        .iter()
        .map(|t| TopicRow {
            id: t.id,
            name: t.name.clone(),
            global: t.global_search,
            language: t.language.as_deref().map(language_name).unwrap_or_default().to_string(),
            keywords: t.keywords.clone(),
            last_searched: t
                .last_searched_at
                .map(|at| at.format("%Y-%m-%d %H:%M").to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_pie_percentages() {
        let slices = pie_slices(&SentimentSummary::new(6, 3, 1));
        let percents: Vec<u32> = slices.iter().map(|s| s.percent).collect();
        assert_eq!(percents, vec![60, 30, 10]);
        assert_eq!(slices[0].label, "Positive");
        assert_eq!(slices[1].color.hex(), "#ef4444");
        assert_eq!(slices[2].color.hex(), "#6b7280");
    }

    #[test]
    fn test_pie_rounds_and_handles_zero() {
        let zero = pie_slices(&SentimentSummary::default());
        assert!(zero.iter().all(|s| s.percent == 0 && s.value == 0));

        let thirds = pie_slices(&SentimentSummary::new(1, 1, 1));
        assert!(thirds.iter().all(|s| s.percent == 33));

        let skewed = pie_slices(&SentimentSummary::new(2, 1, 0));
        assert_eq!(skewed[0].percent, 67);
        assert_eq!(skewed[2].percent, 0);
    }

    #[test]
    fn test_badges_cover_every_state() {
        assert_eq!(sentiment_badge(Some(Sentiment::Positive)).label, "Positive");
        assert_eq!(sentiment_badge(Some(Sentiment::Negative)).color, Color::Red);
        assert_eq!(sentiment_badge(Some(Sentiment::Neutral)).label, "Neutral");
        let pending = sentiment_badge(None);
        assert_eq!(pending.label, "Pending");
        assert_eq!(pending.color, Color::Gray);

        assert_eq!(sentiment_icon(Some(Sentiment::Positive)), '+');
        assert_eq!(sentiment_icon(Some(Sentiment::Neutral)), '○');
        assert_eq!(sentiment_icon(None), '○');
    }

    #[test]
    fn test_trend_keeps_order() {
        let series = trend_series(&[
            SentimentAggregate::new("2024-03-02", 1, 0, 0),
            SentimentAggregate::new("2024-03-01", 0, 2, 1),
            SentimentAggregate::new("Armenpress", 3, 0, 0),
        ]);
        let labels: Vec<&str> = series.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["Mar 2", "Mar 1", "Armenpress"]);
        assert_eq!(series[1].negative, 2);
    }

    #[test]
    fn test_article_rows_and_caption() {
        let article = Article {
            id: 7,
            source_id: 1,
            source_name: "Armenpress".into(),
            title: "Budget passed".into(),
            url: "https://armenpress.am/7".into(),
            author: None,
            published_at: Utc.with_ymd_and_hms(2024, 3, 5, 9, 30, 0).unwrap(),
            sentiment: None,
            confidence: None,
        };
        let rows = article_rows(std::slice::from_ref(&article));
        assert_eq!(rows[0].published, "Mar 5, 2024 09:30");
        assert_eq!(rows[0].badge.label, "Pending");

        let page = PageResponse::from_items(vec![article; 25], 1, 20);
        assert_eq!(page_caption(Some(&page)), "Showing 5 of 25 articles");
        assert_eq!(page_caption::<Article>(None), "Showing 0 of 0 articles");
    }

    #[test]
    fn test_topic_rows() {
        let topic = Topic {
            id: 1,
            name: "Tech".into(),
            keywords: vec!["AI".into(), "AI".into()],
            source_ids: None,
            global_search: true,
            language: Some("hy".into()),
            search_interval_minutes: Some(60),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            last_searched_at: None,
        };
        let rows = topic_rows(&[topic]);
        assert!(rows[0].global);
        assert_eq!(rows[0].language, "Armenian");
        assert_eq!(rows[0].keywords.len(), 2);
        assert_eq!(rows[0].last_searched, None);
    }
}
