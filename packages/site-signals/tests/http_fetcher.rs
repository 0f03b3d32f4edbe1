//! HttpFetcher against a real local HTTP server.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Query;
use axum::http::header;
use axum::response::Redirect;
use axum::routing::get;
use axum::Router;
use site_signals::testing::StaticResolver;
use site_signals::{Fetcher, HttpFetcher, NormalizedUrl, Pipeline, TargetPolicy, UrlGuard};
use tokio_test::assert_ok;

async fn serve() -> SocketAddr {
    let app = Router::new()
        .route("/", get(|| async { "<html><head><title>Home</title></head></html>" }))
        .route("/big", get(|| async { "a".repeat(100_000) }))
        .route("/accents", get(|| async { "é".repeat(100) }))
        .route(
            "/latin1",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "text/html; charset=iso-8859-1")],
                    b"<p>caf\xe9</p>".to_vec(),
                )
            }),
        )
        .route(
            "/sniffed",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "text/html")],
                    b"<meta charset=\"windows-1252\"><p>\x93quoted\x94</p>".to_vec(),
                )
            }),
        )
        .route("/missing", get(|| async { (axum::http::StatusCode::NOT_FOUND, "<h1>Gone</h1>") }))
        .route("/redirect", get(|| async { Redirect::temporary("/final") }))
        .route("/final", get(|| async { "<title>Final</title>" }))
        .route("/loop", get(|| async { Redirect::temporary("/loop") }))
        .route("/to-private", get(|| async { Redirect::temporary("http://10.255.255.1/") }))
        .route("/to-ftp", get(|| async { Redirect::temporary("ftp://acme.test/") }))
        .route(
            "/hop",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                Redirect::temporary(params.get("to").map(String::as_str).unwrap_or("/"))
            }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                "late"
            }),
        )
        .route(
            "/robots.txt",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                "User-agent: *\nDisallow: /"
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Guard policy that admits the loopback test server.
fn local_policy() -> TargetPolicy {
    TargetPolicy::default()
        .with_private_ips_disallowed(false)
        .with_timeout(Duration::from_secs(2))
}

async fn target(addr: SocketAddr, path: &str) -> NormalizedUrl {
    let url = format!("http://{}{}", addr, path);
    UrlGuard::new().check(&url, &local_policy()).await.unwrap()
}

#[tokio::test]
async fn fetches_page_with_status_and_final_url() {
    let addr = serve().await;
    let policy = local_policy();

    let result = HttpFetcher::new(&policy)
        .fetch(&target(addr, "/").await, &policy.fetch_limits())
        .await;

    assert_eq!(result.status, 200);
    assert_eq!(result.final_url, format!("http://{}/", addr));
    assert!(result.html.unwrap().contains("<title>Home</title>"));
}

#[tokio::test]
async fn body_truncated_to_byte_cap() {
    let addr = serve().await;
    let policy = local_policy().with_max_bytes(1024);

    let result = HttpFetcher::new(&policy)
        .fetch(&target(addr, "/big").await, &policy.fetch_limits())
        .await;

    assert_eq!(result.status, 200);
    assert_eq!(result.html.unwrap().len(), 1024);
}

#[tokio::test]
async fn decoded_body_never_exceeds_cap_on_char_boundary() {
    let addr = serve().await;
    let policy = local_policy().with_max_bytes(5);

    let result = HttpFetcher::new(&policy)
        .fetch(&target(addr, "/accents").await, &policy.fetch_limits())
        .await;

    let html = result.html.unwrap();
    assert!(html.len() <= 5);
    assert!(html.chars().all(|c| c == 'é' || c == '\u{FFFD}'));
}

#[tokio::test]
async fn declared_and_sniffed_charsets_decoded() {
    let addr = serve().await;
    let policy = local_policy();
    let fetcher = HttpFetcher::new(&policy);

    let latin1 = fetcher
        .fetch(&target(addr, "/latin1").await, &policy.fetch_limits())
        .await;
    assert_eq!(latin1.html.as_deref(), Some("<p>café</p>"));

    let sniffed = fetcher
        .fetch(&target(addr, "/sniffed").await, &policy.fetch_limits())
        .await;
    assert!(sniffed.html.unwrap().contains("\u{201c}quoted\u{201d}"));
}

#[tokio::test]
async fn error_status_keeps_body() {
    let addr = serve().await;
    let policy = local_policy();

    let result = HttpFetcher::new(&policy)
        .fetch(&target(addr, "/missing").await, &policy.fetch_limits())
        .await;

    assert_eq!(result.status, 404);
    assert_eq!(result.html.as_deref(), Some("<h1>Gone</h1>"));
}

#[tokio::test]
async fn redirect_followed_and_final_url_reported() {
    let addr = serve().await;
    let policy = local_policy();

    let result = HttpFetcher::new(&policy)
        .fetch(&target(addr, "/redirect").await, &policy.fetch_limits())
        .await;

    assert_eq!(result.status, 200);
    assert_eq!(result.final_url, format!("http://{}/final", addr));
}

#[tokio::test]
async fn redirect_loop_hits_cap() {
    let addr = serve().await;
    let policy = local_policy().with_max_redirects(3);

    let result = HttpFetcher::new(&policy)
        .fetch(&target(addr, "/loop").await, &policy.fetch_limits())
        .await;

    assert!(result.is_transport_failure());
    assert!(result.html.is_none());
}

#[tokio::test]
async fn redirects_to_unsafe_targets_refused() {
    let addr = serve().await;
    // The fetcher screens hops strictly even though the guard admitted loopback
    let strict = TargetPolicy::default().with_timeout(Duration::from_secs(2));
    let fetcher = HttpFetcher::new(&strict);

    for path in ["/to-private", "/to-ftp"] {
        let result = fetcher
            .fetch(&target(addr, path).await, &strict.fetch_limits())
            .await;
        assert!(result.is_transport_failure(), "{path} should be refused");
    }
}

#[tokio::test]
async fn slow_response_times_out_as_status_zero() {
    let addr = serve().await;
    let policy = local_policy().with_timeout(Duration::from_millis(200));

    let started = std::time::Instant::now();
    let result = HttpFetcher::new(&policy)
        .fetch(&target(addr, "/slow").await, &policy.fetch_limits())
        .await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(result.is_transport_failure());
}

#[tokio::test]
async fn connection_pinned_to_guarded_address() {
    let addr = serve().await;
    let policy = local_policy();
    // The name only exists in the guard's resolver; reqwest never resolves it
    let guard = UrlGuard::with_resolver(Arc::new(
        StaticResolver::new().with_host("pinned.test", ["127.0.0.1"]),
    ));
    let url = format!("http://pinned.test:{}/", addr.port());
    let target = assert_ok!(guard.check(&url, &policy).await);

    let result = HttpFetcher::new(&policy)
        .fetch(&target, &policy.fetch_limits())
        .await;

    assert_eq!(result.status, 200);
    assert_eq!(result.final_url, url);
}

#[tokio::test]
async fn hanging_robots_fails_open_over_http() {
    let addr = serve().await;
    let policy = local_policy().with_timeout(Duration::from_millis(300));

    let output = Pipeline::new(policy)
        .run(&format!("http://{}/", addr))
        .await
        .unwrap();

    assert!(output.robots_allowed());
    assert_eq!(output.http_status(), 200);
    assert_eq!(output.content.title.as_deref(), Some("Home"));
}

#[tokio::test]
async fn redirect_to_name_resolving_private_refused() {
    let addr = serve().await;
    let strict = TargetPolicy::default().with_timeout(Duration::from_secs(2));
    // Any name other than the target resolves through the fetcher's resolver
    let fetcher = HttpFetcher::new(&strict).with_resolver(Arc::new(
        StaticResolver::new().with_host("intranet.test", ["127.0.0.1"]),
    ));
    let path = format!("/hop?to=http://intranet.test:{}/final", addr.port());

    let result = fetcher
        .fetch(&target(addr, &path).await, &strict.fetch_limits())
        .await;

    assert!(result.is_transport_failure());
    assert!(result.html.is_none());
}

#[tokio::test]
async fn redirect_to_named_host_followed_when_policy_permits() {
    let addr = serve().await;
    let policy = local_policy();
    let fetcher = HttpFetcher::new(&policy).with_resolver(Arc::new(
        StaticResolver::new().with_host("intranet.test", ["127.0.0.1"]),
    ));
    let path = format!("/hop?to=http://intranet.test:{}/final", addr.port());

    let result = fetcher
        .fetch(&target(addr, &path).await, &policy.fetch_limits())
        .await;

    assert_eq!(result.status, 200);
    assert_eq!(result.final_url, format!("http://intranet.test:{}/final", addr.port()));
}
