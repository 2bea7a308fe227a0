//! HTTP fetcher and end-to-end extraction against a wiremock server

use crate::{scheduler, settle, test_config};
use std::sync::Arc;
use std::time::Duration;
use swarm_scraper::config::{PoolConfig, UserAgentConfig};
use swarm_scraper::crawler::{FetchError, Fetcher, HtmlExtractor, HttpFetcher};
use swarm_scraper::state::ErrorKind;
use swarm_scraper::{ExtractionMode, JobStatus};
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARTICLE: &str = r#"<html><head>
    <title>Quarterly Report</title>
    <meta name="description" content="Numbers for the quarter">
    <script type="application/ld+json">{"@type": "Article", "headline": "Report"}</script>
    </head><body>
    <h1>Report</h1><h2>Revenue</h2><h2>Costs</h2>
    <span class="price">$10</span><span class="price">$12</span>
    <a href="/archive">Archive</a><a href="mailto:x@example.com">Mail</a>
    </body></html>"#;

fn fetcher(fetch_timeout_ms: u64) -> HttpFetcher {
    let pool = PoolConfig {
        fetch_timeout_ms,
        ..PoolConfig::default()
    };
    HttpFetcher::new(&UserAgentConfig::default(), &pool).expect("Failed to build fetcher")
}

async fn serve(server: &MockServer, route: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html")
}

#[tokio::test]
async fn test_fetch_success_sends_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header_exists("user-agent"))
        .respond_with(html(ARTICLE))
        .expect(1)
        .mount(&server)
        .await;

    let page = fetcher(2_000).fetch(&server.uri()).await.unwrap();

    assert_eq!(page.status_code, 200);
    assert!(page.body.contains("Quarterly Report"));
    assert!(page
        .content_type
        .is_some_and(|content_type| content_type.starts_with("text/html")));
}

#[tokio::test]
async fn test_fetch_error_status() {
    let server = MockServer::start().await;
    serve(&server, "/missing", ResponseTemplate::new(404)).await;

    let err = fetcher(2_000)
        .fetch(&format!("{}/missing", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Status { status: 404, .. }));
    assert_eq!(err.kind(), ErrorKind::NetworkError);
}

#[tokio::test]
async fn test_fetch_timeout() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/slow",
        html(ARTICLE).set_delay(Duration::from_millis(1_000)),
    )
    .await;

    let err = fetcher(100)
        .fetch(&format!("{}/slow", server.uri()))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn test_fetch_connection_refused() {
    // Nothing listens on port 1
    let err = fetcher(1_000).fetch("http://127.0.0.1:1/").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NetworkError);

    // The transport's own description is kept, including the target
    match err {
        FetchError::Network { url, message } => {
            assert_eq!(url, "http://127.0.0.1:1/");
            assert!(message.contains("127.0.0.1"), "{message}");
        }
        other => panic!("expected a network error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_pool_extracts_every_mode_over_http() {
    let server = MockServer::start().await;
    serve(&server, "/article", html(ARTICLE)).await;
    let url = format!("{}/article", server.uri());

    let pool = scheduler(
        test_config(3),
        Arc::new(fetcher(2_000)),
        Arc::new(HtmlExtractor::new()),
    );

    let modes = [
        ExtractionMode::Title,
        ExtractionMode::MetaDescription,
        ExtractionMode::StructuredData,
        ExtractionMode::HeaderHierarchy,
        ExtractionMode::Links,
        ExtractionMode::CustomSelector(".price".to_string()),
    ];
    let ids: Vec<_> = modes
        .iter()
        .map(|mode| pool.submit(&url, mode.clone()).unwrap())
        .collect();
    settle(&pool).await;

    let results: Vec<_> = ids
        .iter()
        .map(|id| {
            let job = pool.job(*id).unwrap();
            assert_eq!(job.status, JobStatus::Succeeded, "{:?}", job.error);
            job.result.unwrap()
        })
        .collect();

    assert_eq!(results[0].get("title"), Some("Quarterly Report"));
    assert_eq!(results[1].get("description"), Some("Numbers for the quarter"));
    assert_eq!(results[2].get("ld_type.0"), Some("Article"));
    assert_eq!(results[3].names(), vec!["h1.0", "h2.0", "h2.1"]);
    assert_eq!(results[3].get("h2.1"), Some("Costs"));
    assert_eq!(
        results[4].get("link.0"),
        Some(format!("{}/archive", server.uri()).as_str())
    );
    assert_eq!(results[4].len(), 1);
    assert_eq!(results[5].get("match.0"), Some("$10"));
    assert_eq!(results[5].get("match.1"), Some("$12"));
}

#[tokio::test]
async fn test_pool_classifies_http_failures() {
    let server = MockServer::start().await;
    serve(&server, "/down", ResponseTemplate::new(503)).await;
    serve(&server, "/slow", html(ARTICLE).set_delay(Duration::from_secs(2))).await;
    serve(&server, "/empty", html("<html><body>nothing</body></html>")).await;

    let mut config = test_config(3);
    config.pool.fetch_timeout_ms = 150;
    config.pool.job_timeout_ms = 1_000;
    let fetcher = HttpFetcher::new(&config.user_agent, &config.pool).unwrap();
    let pool = scheduler(config, Arc::new(fetcher), Arc::new(HtmlExtractor::new()));

    let down = pool
        .submit(&format!("{}/down", server.uri()), ExtractionMode::Title)
        .unwrap();
    let slow = pool
        .submit(&format!("{}/slow", server.uri()), ExtractionMode::Title)
        .unwrap();
    let empty = pool
        .submit(&format!("{}/empty", server.uri()), ExtractionMode::Title)
        .unwrap();
    settle(&pool).await;

    let kind = |id| pool.job(id).unwrap().error.unwrap().kind;
    assert_eq!(kind(down), ErrorKind::NetworkError);
    assert_eq!(kind(slow), ErrorKind::Timeout);
    assert_eq!(kind(empty), ErrorKind::ExtractionFailed);

    let metrics = pool.metrics();
    assert_eq!(metrics.failed, 3);
    assert_eq!(metrics.success_rate, 0);
}
