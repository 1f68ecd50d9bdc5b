//! Pagination behavior of the customer fetcher: cursor walks, the safety
//! cap, window filtering, and the fallback listing endpoint.

mod common;

use common::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use magpie_square::{CustomerFetcher, SquareClient, SquareError};

fn client_for(server: &MockServer) -> SquareClient {
    SquareClient::new(server.uri(), "2023-10-18").unwrap()
}

#[tokio::test]
async fn test_cursor_walk_collects_all_pages() {
    let server = MockServer::start().await;

    let pages = vec![
        customer_page(
            (0..100).map(|i| recent_customer(&format!("c{i}"), 5)).collect(),
            Some("page-2"),
        ),
        customer_page(
            (100..200).map(|i| recent_customer(&format!("c{i}"), 5)).collect(),
            Some("page-3"),
        ),
        customer_page(
            (200..240).map(|i| recent_customer(&format!("c{i}"), 5)).collect(),
            None,
        ),
    ];

    Mock::given(method("POST"))
        .and(path("/v2/customers/search"))
        .respond_with(SequentialResponder::from_json(pages))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let fetcher = CustomerFetcher::new(&client, 365, 100, 2000);
    let customers = fetcher.fetch("token").await.unwrap();

    assert_eq!(customers.len(), 240);
    assert_eq!(customers[0].customer_id, "c0");
    assert_eq!(customers[239].customer_id, "c239");
}

#[tokio::test]
async fn test_safety_cap_stops_pagination_early() {
    let server = MockServer::start().await;

    // Every page returns a cursor; only the cap ends the walk.
    let endless = customer_page(
        (0..100).map(|i| recent_customer(&format!("c{i}"), 5)).collect(),
        Some("again"),
    );
    Mock::given(method("POST"))
        .and(path("/v2/customers/search"))
        .respond_with(SequentialResponder::from_json(vec![endless]))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let fetcher = CustomerFetcher::new(&client, 365, 100, 250);
    let customers = fetcher.fetch("token").await.unwrap();

    // The cap is checked after each page: 100, 200, then 300 >= 250 stops.
    assert_eq!(customers.len(), 300);
}

#[tokio::test]
async fn test_window_filter_drops_stale_and_malformed_records() {
    let server = MockServer::start().await;

    let page = customer_page(
        vec![
            // Created long ago but updated recently: included.
            customer_with_timestamps("keep-updated", "2020-01-01T00:00:00Z", &chrono::Utc::now().to_rfc3339()),
            // Both timestamps ancient: excluded.
            customer_with_timestamps("drop-stale", "2020-01-01T00:00:00Z", "2020-02-01T00:00:00Z"),
            // Unparseable timestamps: excluded, not a crash.
            customer_with_timestamps("drop-bad", "never", "also-never"),
            recent_customer("keep-recent", 5),
        ],
        None,
    );

    Mock::given(method("POST"))
        .and(path("/v2/customers/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let fetcher = CustomerFetcher::new(&client, 90, 100, 2000);
    let customers = fetcher.fetch("token").await.unwrap();

    let ids: Vec<&str> = customers.iter().map(|c| c.customer_id.as_str()).collect();
    assert_eq!(ids, vec!["keep-updated", "keep-recent"]);
}

#[tokio::test]
async fn test_search_failure_falls_back_to_listing_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/customers/search"))
        .respond_with(ResponseTemplate::new(500).set_body_json(square_error(
            "INTERNAL_SERVER_ERROR",
            "search is down",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let listing_pages = vec![
        customer_page(
            (0..100).map(|i| recent_customer(&format!("f{i}"), 5)).collect(),
            Some("page-2"),
        ),
        customer_page(
            (100..150).map(|i| recent_customer(&format!("f{i}"), 5)).collect(),
            None,
        ),
    ];
    Mock::given(method("GET"))
        .and(path("/v2/customers"))
        .respond_with(SequentialResponder::from_json(listing_pages))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let fetcher = CustomerFetcher::new(&client, 365, 100, 2000);
    let customers = fetcher.fetch("token").await.unwrap();

    assert_eq!(customers.len(), 150);
}

#[tokio::test]
async fn test_search_mid_pagination_failure_keeps_accumulated_records() {
    let server = MockServer::start().await;

    // Page 1 succeeds, page 2 dies; the walk keeps its first page and the
    // listing endpoint must not be consulted.
    let first_page = ResponseTemplate::new(200).set_body_json(customer_page(
        (0..100).map(|i| recent_customer(&format!("c{i}"), 5)).collect(),
        Some("page-2"),
    ));
    Mock::given(method("POST"))
        .and(path("/v2/customers/search"))
        .respond_with(SequentialResponder::new(vec![
            first_page,
            ResponseTemplate::new(502),
        ]))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/customers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(customer_page(vec![], None)))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let fetcher = CustomerFetcher::new(&client, 365, 100, 2000);
    let customers = fetcher.fetch("token").await.unwrap();

    assert_eq!(customers.len(), 100);
    assert_eq!(customers[0].customer_id, "c0");
}

#[tokio::test]
async fn test_fallback_mid_pagination_keeps_accumulated_records() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/customers/search"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let first_page = ResponseTemplate::new(200).set_body_json(customer_page(
        (0..100).map(|i| recent_customer(&format!("f{i}"), 5)).collect(),
        Some("page-2"),
    ));
    Mock::given(method("GET"))
        .and(path("/v2/customers"))
        .respond_with(SequentialResponder::new(vec![
            first_page,
            ResponseTemplate::new(502),
        ]))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let fetcher = CustomerFetcher::new(&client, 365, 100, 2000);
    let customers = fetcher.fetch("token").await.unwrap();

    assert_eq!(customers.len(), 100);
}

#[tokio::test]
async fn test_error_when_both_endpoints_fail() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/customers/search"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/customers"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let fetcher = CustomerFetcher::new(&client, 365, 100, 2000);
    let err = fetcher.fetch("token").await.unwrap_err();

    assert!(matches!(err, SquareError::Api { status: 503, .. }));
}

#[tokio::test]
async fn test_unparseable_rows_are_skipped_not_fatal() {
    let server = MockServer::start().await;

    let page = customer_page(
        vec![
            recent_customer("good", 5),
            // No id at all; skipped with a warning.
            serde_json::json!({
                "given_name": "Ghost",
                "created_at": chrono::Utc::now().to_rfc3339()
            }),
        ],
        None,
    );
    Mock::given(method("POST"))
        .and(path("/v2/customers/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let fetcher = CustomerFetcher::new(&client, 365, 100, 2000);
    let customers = fetcher.fetch("token").await.unwrap();

    assert_eq!(customers.len(), 1);
    assert_eq!(customers[0].customer_id, "good");
}
