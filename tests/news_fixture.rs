// tests/news_fixture.rs
//
// News retrieval against a stored Google News RSS response: parsing, publisher
// extraction and text cleanup as the refiner will see them.

use std::sync::Arc;

use chrono::NaiveDate;
use pageview_cache_advisor::config::NewsConfig;
use pageview_cache_advisor::news::{GoogleNewsRss, NewsRetriever};
use pageview_cache_advisor::refine::prompt::render_news;
use pageview_cache_advisor::retry::RetryPolicy;

const RSS: &str = include_str!("fixtures/google_news_rss.xml");

fn retriever(max_results: usize) -> NewsRetriever {
    NewsRetriever::new(
        Arc::new(GoogleNewsRss::from_fixture_str(RSS)),
        NewsConfig {
            max_results,
            ..NewsConfig::default()
        },
        RetryPolicy::none(),
    )
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 12, 31).unwrap()
}

#[tokio::test]
async fn fixture_items_are_parsed_and_cleaned() {
    let items = retriever(30).search("2015_in_film_en", date()).await.unwrap();
    assert_eq!(items.len(), 3);

    let first = &items[0];
    assert_eq!(first.title, "Star Wars: The Force Awakens crosses $1 billion worldwide");
    assert_eq!(first.publisher, "Variety");
    assert!(first.summary.contains("crosses $1 billion"));
    assert!(!first.summary.contains('<'), "tags must be stripped: {}", first.summary);

    assert_eq!(items[1].publisher, "The Guardian");
    assert_eq!(
        items[1].summary,
        "Critics look back at a record year for cinema & box office."
    );
}

#[tokio::test]
async fn result_count_is_capped() {
    let items = retriever(2).search("2015_in_film_en", date()).await.unwrap();
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn rendered_news_lists_every_item() {
    let items = retriever(30).search("2015_in_film_en", date()).await.unwrap();
    let rendered = render_news(&items);
    assert_eq!(rendered.lines().count(), 3);
    assert!(rendered.starts_with("- Title: Star Wars"));
    assert!(rendered.contains("Publisher: Deadline"));
}
