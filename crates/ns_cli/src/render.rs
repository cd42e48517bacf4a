use ns_core::{Article, Source};
use ns_query::pages::{ArticlesView, DashboardView, TopicsView};
use ns_query::transform::{sentiment_badge, short_timestamp};
use std::fmt::{self, Write};

const TITLE_WIDTH: usize = 56;

fn clip(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(width.saturating_sub(1)).collect();
    clipped.push('…');
    clipped
}

fn button(label: &str, enabled: bool) -> String {
    if enabled {
        format!("[{}]", label)
    } else {
        format!("({})", label)
    }
}

pub fn dashboard(out: &mut impl Write, view: &DashboardView, days: i64) -> fmt::Result {
    writeln!(out, "📊 Sentiment over the last {} days", days)?;
    match &view.summary {
        Some(summary) => {
            writeln!(
                out,
                "   Positive {:>5}   Negative {:>5}   Neutral {:>5}",
                summary.positive, summary.negative, summary.neutral
            )?;
            let shares: Vec<String> = view
                .slices
                .iter()
                .map(|s| format!("{} {}%", s.label, s.percent))
                .collect();
            writeln!(out, "   {}", shares.join(" · "))?;
        }
        None => {
            writeln!(out, "   ...")?;
        }
    }

    writeln!(out, "\n📈 Trend")?;
    if view.trend.is_empty() {
        writeln!(out, "   no data")?;
    }
    for point in &view.trend {
        writeln!(
            out,
            "   {:<12} +{:<4} -{:<4} ○{:<4}",
            point.label, point.positive, point.negative, point.neutral
        )?;
    }

    writeln!(out, "\n📰 Recent articles")?;
    for article in &view.recent {
        writeln!(
            out,
            "   {} {:<width$} {:<14} {}",
            article.icon,
            clip(&article.title, TITLE_WIDTH),
            article.source,
            article.published,
            width = TITLE_WIDTH
        )?;
    }
    for error in &view.errors {
        writeln!(out, "⚠️ {}", error)?;
    }
    Ok(())
}

pub fn articles(out: &mut impl Write, view: &ArticlesView) -> fmt::Result {
    if view.loading {
        writeln!(out, "Loading...")?;
        return Ok(());
    }
    if let Some(error) = &view.error {
        writeln!(out, "⚠️ {}", error)?;
    }
    if view.rows.is_empty() {
        writeln!(out, "No articles found")?;
    }
    for row in &view.rows {
        writeln!(
            out,
            "{:>5}  {:<width$} {:<14} {:<9} {}",
            row.id,
            clip(&row.title, TITLE_WIDTH),
            row.source,
            row.badge.label,
            row.published,
            width = TITLE_WIDTH
        )?;
    }
    writeln!(
        out,
        "\n{}   {} page {} of {} {}",
        view.caption,
        button("Previous", view.can_previous),
        view.page + 1,
        view.total_pages.max(1),
        button("Next", view.can_next)
    )?;
    Ok(())
}

pub fn article(out: &mut impl Write, article: &Article) -> fmt::Result {
    let badge = sentiment_badge(article.sentiment);
    writeln!(out, "{}", article.title)?;
    writeln!(out, "  source     {}", article.source_name)?;
    if let Some(author) = &article.author {
        writeln!(out, "  author     {}", author)?;
    }
    writeln!(out, "  published  {}", short_timestamp(article.published_at))?;
    match article.confidence {
        Some(confidence) => {
            writeln!(out, "  sentiment  {} ({:.0}%)", badge.label, confidence * 100.0)?;
        }
        None => {
            writeln!(out, "  sentiment  {}", badge.label)?;
        }
    }
    writeln!(out, "  {}", article.url)?;
    Ok(())
}

pub fn sources(out: &mut impl Write, sources: &[Source]) -> fmt::Result {
    for source in sources {
        writeln!(
            out,
            "{:>4}  {:<16} {:<11} {:<9} {:<8} {}",
            source.id,
            source.name,
            format!("{:?}", source.source_type),
            format!("{:?}", source.language),
            if source.active { "active" } else { "paused" },
            source.url
        )?;
    }
    if sources.is_empty() {
        writeln!(out, "No sources")?;
    }
    Ok(())
}

pub fn source(out: &mut impl Write, source: &Source) -> fmt::Result {
    sources(out, std::slice::from_ref(source))?;
    let fetched = source
        .last_fetched
        .map(short_timestamp)
        .unwrap_or_else(|| "never".to_string());
    let success = source
        .last_success
        .map(short_timestamp)
        .unwrap_or_else(|| "never".to_string());
    writeln!(out, "      last fetched {}, last success {}", fetched, success)?;
    Ok(())
}

pub fn topics(out: &mut impl Write, view: &TopicsView) -> fmt::Result {
    if let Some(error) = &view.error {
        writeln!(out, "⚠️ {}", error)?;
    }
    if view.rows.is_empty() && !view.loading {
        writeln!(out, "No topics yet")?;
    }
    for row in &view.rows {
        let tag = if row.global { " [Global]" } else { "" };
        writeln!(out, "{:>4}  {}{}  {}", row.id, row.name, tag, row.language)?;
        let chips: Vec<String> = row.keywords.iter().map(|k| format!("‹{}›", k)).collect();
        writeln!(out, "      {}", chips.join(" "))?;
        if let Some(at) = &row.last_searched {
            writeln!(out, "      Last searched: {}", at)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ns_query::transform::{ArticleRow, Badge, Color, TopicRow};

    #[test]
    fn test_clip() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("abcdefghij", 5), "abcd…");
    }

    #[test]
    fn test_articles_footer_shows_button_states() {
        let view = ArticlesView {
            loading: false,
            error: None,
            rows: vec![ArticleRow {
                id: 1,
                title: "Budget".into(),
                url: "https://armenpress.am/1".into(),
                source: "Armenpress".into(),
                badge: Badge { label: "Positive", color: Color::Green },
                published: "Mar 5, 2024 09:30".into(),
            }],
            caption: "Showing 1 of 21 articles".into(),
            page: 1,
            total_pages: 2,
            can_previous: true,
            can_next: false,
            sources: vec![],
        };
        let mut out = String::new();
        articles(&mut out, &view).unwrap();
        assert!(out.contains("Showing 1 of 21 articles"));
        assert!(out.contains("[Previous] page 2 of 2 (Next)"));
    }

    #[test]
    fn test_topics_render_tags() {
        let view = TopicsView {
            loading: false,
            error: None,
            rows: vec![TopicRow {
                id: 3,
                name: "Tech".into(),
                global: true,
                language: "English".into(),
                keywords: vec!["AI".into()],
                last_searched: None,
            }],
            pending: false,
        };
        let mut out = String::new();
        topics(&mut out, &view).unwrap();
        assert!(out.contains("Tech [Global]  English"));
        assert!(out.contains("‹AI›"));
    }
}
