//! Unit tests for CatalogHttpClient against a mock provider

use catalog_sync::source::http::API_KEY_HEADER;
use catalog_sync::source::{CatalogHttpClient, CatalogSource, SourceError};
use httpmock::prelude::*;
use serde_json::json;
use std::net::TcpListener;
use std::time::Duration;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn client(server: &MockServer, max_retries: u32) -> CatalogHttpClient {
    CatalogHttpClient::new(server.base_url(), Some("test-key".to_string()))
        .with_cooldown(Duration::ZERO)
        .with_max_throttle_retries(max_retries)
}

#[tokio::test]
async fn test_fetch_teams_sends_key_and_parses_envelope() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/teams")
                .query_param("league", "39")
                .query_param("season", "2024")
                .header(API_KEY_HEADER, "test-key");
            then.status(200).json_body(json!({
                "errors": [],
                "results": 2,
                "response": [
                    {
                        "team": { "id": 33, "name": "Manchester United", "code": "MUN",
                                  "country": "England", "founded": 1878, "national": false },
                        "venue": { "name": "Old Trafford", "city": "Manchester" }
                    },
                    { "team": { "id": 50, "name": "Manchester City" } }
                ]
            }));
        })
        .await;

    let client = client(&server, 5);
    let teams = client.fetch_teams(39, 2024).await.unwrap().records;

    mock.assert_async().await;
    assert_eq!(teams.len(), 2);
    assert_eq!(teams[0].code.as_deref(), Some("MUN"));
    assert_eq!(teams[0].venue_city.as_deref(), Some("Manchester"));
    assert_eq!(teams[1].venue_name, None);
    assert_eq!(client.requests_made(), 1);
}

#[tokio::test]
async fn test_persistent_429_gives_up_after_bounded_retries() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/players/squads");
            then.status(429).body("Too Many Requests");
        })
        .await;

    let client = client(&server, 3);
    let err = client.fetch_squad(33).await.unwrap_err();

    assert!(matches!(err, SourceError::RateLimitExceeded { attempts: 4 }));
    assert!(err.is_transient());
    assert_eq!(mock.hits_async().await, 4);
    assert_eq!(client.requests_made(), 4);
}

#[tokio::test]
async fn test_429_then_success_recovers() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    let mut throttled = server
        .mock_async(|when, then| {
            when.method(GET).path("/coachs");
            then.status(429);
        })
        .await;

    let client = client(&server, 5).with_cooldown(Duration::from_millis(300));
    let task = tokio::spawn({
        let client = client.clone();
        async move { client.fetch_coaches(33).await }
    });

    // swap the throttling mock for a real answer once it has been hit
    while throttled.hits_async().await == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    throttled.delete_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/coachs").query_param("team", "33");
            then.status(200).json_body(json!({
                "errors": [],
                "response": [{
                    "id": 40,
                    "name": "E. ten Hag",
                    "career": [
                        { "team": { "id": 33 }, "start": "2022-07-01", "end": null },
                        { "team": { "id": null }, "start": "2017-12-28", "end": "2022-06-30" }
                    ]
                }]
            }));
        })
        .await;

    let coaches = task.await.unwrap().unwrap().records;
    assert_eq!(coaches.len(), 1);
    assert_eq!(coaches[0].career.len(), 1);
    assert_eq!(client.requests_made(), 2);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/teams");
            then.status(403).body("forbidden");
        })
        .await;

    let err = client(&server, 5).fetch_teams(39, 2024).await.unwrap_err();

    match &err {
        SourceError::HttpError { status, body } => {
            assert_eq!(*status, 403);
            assert_eq!(body, "forbidden");
        }
        other => panic!("Expected HttpError, got {:?}", other),
    }
    assert!(!err.is_transient());
    assert_eq!(mock.hits_async().await, 1);
}

#[tokio::test]
async fn test_server_error_is_transient_without_retry() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/teams");
            then.status(502);
        })
        .await;

    let err = client(&server, 5).fetch_teams(39, 2024).await.unwrap_err();

    assert!(matches!(err, SourceError::HttpError { status: 502, .. }));
    assert!(err.is_transient());
    assert_eq!(mock.hits_async().await, 1);
}

#[tokio::test]
async fn test_rate_limit_envelope_is_throttling() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/teams");
            then.status(200).json_body(json!({
                "errors": { "rateLimit": "Too many requests. Your rate limit is 10 requests per minute." },
                "results": 0,
                "response": []
            }));
        })
        .await;

    let client = client(&server, 2);
    let err = client.fetch_teams(39, 2024).await.unwrap_err();

    assert!(matches!(err, SourceError::RateLimitExceeded { attempts: 3 }));
    assert_eq!(mock.hits_async().await, 3);
    assert_eq!(client.requests_made(), 3);
}

#[tokio::test]
async fn test_daily_quota_envelope_is_not_retried() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/players/squads");
            then.status(200).json_body(json!({
                "errors": { "requests": "You have reached the request limit for the day" },
                "response": []
            }));
        })
        .await;

    let err = client(&server, 5).fetch_squad(33).await.unwrap_err();

    assert!(err.is_quota_exhausted());
    assert!(!err.is_transient());
    assert!(err.to_string().contains("request limit for the day"));
    assert_eq!(mock.hits_async().await, 1);
}

#[tokio::test]
async fn test_other_envelope_errors_surface_as_api_error() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/teams");
            then.status(200).json_body(json!({
                "errors": { "season": "The Season field must contain 4 characters." },
                "response": []
            }));
        })
        .await;

    let err = client(&server, 5).fetch_teams(39, 24).await.unwrap_err();

    match err {
        SourceError::ApiError(message) => assert!(message.starts_with("season: ")),
        other => panic!("Expected ApiError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_squad_players_are_flattened() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/players/squads").query_param("team", "50");
            then.status(200).json_body(json!({
                "errors": [],
                "response": [{
                    "team": { "id": 50, "name": "Manchester City" },
                    "players": [
                        { "id": 617, "name": "Ederson", "age": 30, "number": 31, "position": "Goalkeeper" },
                        { "id": 1100, "name": "E. Haaland", "age": 24, "number": 9, "position": "Attacker" }
                    ]
                }]
            }));
        })
        .await;

    let players = client(&server, 5).fetch_squad(50).await.unwrap().records;

    assert_eq!(players.len(), 2);
    assert_eq!(players[1].name, "E. Haaland");
    assert_eq!(players[1].number, Some(9));
}
