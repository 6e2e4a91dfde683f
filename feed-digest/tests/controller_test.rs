mod common;

use chrono::{TimeZone, Utc};
use common::{init_tracing, source, ScriptedFetcher, Step};
use feed_digest::{FetchConfig, RetryController, Source};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn cutoff() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap()
}

fn controller(fetcher: &Arc<ScriptedFetcher>) -> RetryController {
    RetryController::new(fetcher.clone(), FetchConfig::default())
}

#[tokio::test(start_paused = true)]
async fn test_all_sources_succeed_in_first_round() {
    init_tracing();

    let sources = vec![
        source("https://a.example/feed", "A", 1.0),
        source("https://b.example/feed", "B", 2.0),
        source("https://c.example/feed", "C", 3.0),
    ];
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .script("https://a.example/feed", vec![Step::Items(1)])
            .script("https://b.example/feed", vec![Step::Items(2)])
            .script("https://c.example/feed", vec![Step::Items(3)]),
    );

    let outcome = controller(&fetcher).run(&sources, cutoff()).await;

    assert_eq!(outcome.rounds, 1);
    assert_eq!(outcome.digests.len(), 3);
    assert_eq!(outcome.total_items(), 6);
    assert!(outcome.unresolved.is_empty());
    assert_eq!(fetcher.total_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_source_timing_out_three_times_succeeds_in_fourth_round() {
    init_tracing();

    let url = "https://slow.example/rss";
    let sources = vec![source(url, "Slow", 1.0)];
    let fetcher = Arc::new(ScriptedFetcher::new().script(
        url,
        vec![Step::Hang, Step::Hang, Step::Hang, Step::Items(2)],
    ));

    let outcome = controller(&fetcher).run(&sources, cutoff()).await;

    assert_eq!(outcome.rounds, 4);
    assert_eq!(fetcher.calls(url), 4);
    assert_eq!(outcome.digests.len(), 1);
    assert_eq!(outcome.digests[0].source.url, url);
    assert_eq!(outcome.digests[0].items.len(), 2);
    assert!(outcome.unresolved.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_source_failing_every_round_is_dropped() {
    init_tracing();

    let url = "https://broken.example/rss";
    let sources = vec![source(url, "Broken", 1.0)];
    let fetcher = Arc::new(ScriptedFetcher::new().script(url, vec![Step::Fail]));

    let outcome = controller(&fetcher).run(&sources, cutoff()).await;

    assert_eq!(outcome.rounds, 4);
    assert_eq!(fetcher.calls(url), 4);
    assert!(outcome.is_empty());
    assert_eq!(outcome.unresolved, sources);
}

#[tokio::test(start_paused = true)]
async fn test_succeeded_sources_are_never_fetched_again() {
    init_tracing();

    let quiet = "https://quiet.example/rss";
    let flaky = "https://flaky.example/rss";
    let sources = vec![source(quiet, "Quiet", 1.0), source(flaky, "Flaky", 1.0)];
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .script(quiet, vec![Step::Empty])
            .script(flaky, vec![Step::Fail, Step::Fail, Step::Items(1)]),
    );

    let outcome = controller(&fetcher).run(&sources, cutoff()).await;

    assert_eq!(outcome.rounds, 3);
    // "Nothing new" counts as success and is not retried.
    assert_eq!(fetcher.calls(quiet), 1);
    assert_eq!(fetcher.calls(flaky), 3);
    assert_eq!(outcome.digests.len(), 1);
    assert_eq!(outcome.digests[0].source.url, flaky);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_never_exceeds_limit() {
    init_tracing();

    let sources: Vec<Source> = (0..40)
        .map(|i| source(&format!("https://site{i}.example/feed"), &format!("Site {i}"), 1.0))
        .collect();
    let fetcher = Arc::new(ScriptedFetcher::new().with_latency(Duration::from_millis(50)));

    let outcome = controller(&fetcher).run(&sources, cutoff()).await;

    assert_eq!(outcome.rounds, 1);
    assert_eq!(fetcher.total_calls(), 40);
    assert!(fetcher.peak_in_flight() <= 15);
    assert_eq!(fetcher.peak_in_flight(), 15);
}

#[tokio::test(start_paused = true)]
async fn test_custom_limits_are_respected() {
    init_tracing();

    let sources: Vec<Source> = (0..6)
        .map(|i| source(&format!("https://down{i}.example/feed"), "Down", 1.0))
        .collect();
    let mut fetcher = ScriptedFetcher::new().with_latency(Duration::from_millis(10));
    for s in &sources {
        fetcher = fetcher.script(&s.url, vec![Step::Fail]);
    }
    let fetcher = Arc::new(fetcher);
    let config = FetchConfig {
        max_concurrency: 2,
        max_rounds: 2,
        ..FetchConfig::default()
    };

    let outcome = RetryController::new(fetcher.clone(), config).run(&sources, cutoff()).await;

    assert_eq!(outcome.rounds, 2);
    assert_eq!(fetcher.total_calls(), 12);
    assert!(fetcher.peak_in_flight() <= 2);
    assert_eq!(outcome.unresolved.len(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_source_urls_yield_one_entry() {
    init_tracing();

    let url = "https://dup.example/feed";
    let sources = vec![
        source(url, "Dup", 1.0),
        source(url, "Dup again", 5.0),
        source("https://other.example/feed", "Other", 1.0),
    ];
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .script(url, vec![Step::Items(2)])
            .script("https://other.example/feed", vec![Step::Items(1)]),
    );

    let outcome = controller(&fetcher).run(&sources, cutoff()).await;

    let urls: HashSet<&str> = outcome.digests.iter().map(|d| d.source.url.as_str()).collect();
    assert_eq!(outcome.digests.len(), 2);
    assert_eq!(urls.len(), 2);
    assert_eq!(fetcher.calls(url), 1);
}

#[tokio::test(start_paused = true)]
async fn test_every_fetch_sees_the_batch_cutoff() {
    init_tracing();

    let url = "https://retry.example/feed";
    let sources = vec![source(url, "Retry", 1.0), source("https://ok.example/feed", "Ok", 1.0)];
    let fetcher = Arc::new(ScriptedFetcher::new().script(url, vec![Step::Fail, Step::Items(1)]));

    controller(&fetcher).run(&sources, cutoff()).await;

    let cutoffs = fetcher.seen_cutoffs();
    assert_eq!(cutoffs.len(), 3);
    assert!(cutoffs.iter().all(|c| *c == cutoff()));
}

#[tokio::test(start_paused = true)]
async fn test_empty_source_list_finishes_immediately() {
    init_tracing();

    let fetcher = Arc::new(ScriptedFetcher::new());
    let outcome = controller(&fetcher).run(&[], cutoff()).await;

    assert_eq!(outcome.rounds, 0);
    assert!(outcome.is_empty());
    assert_eq!(fetcher.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_outcome_keeps_the_given_batch_id() {
    init_tracing();

    let url = "https://a.example/feed";
    let fetcher = Arc::new(ScriptedFetcher::new().script(url, vec![Step::Items(1)]));
    let batch_id = Uuid::new_v4();

    let outcome = controller(&fetcher)
        .run_batch(batch_id, &[source(url, "A", 1.0)], cutoff())
        .await;

    assert_eq!(outcome.batch_id, batch_id);
}
