//! Multi-platform dispatch

use std::sync::Arc;

use libtricast::http::mock::MockTransport;
use libtricast::http::{HttpResponse, Method, TransportError};
use libtricast::{Config, Dispatcher, ErrorKind, FeedOptions, PlatformKind, PostOptions};
use serde_json::json;

const CONFIG: &str = r#"
[twitter]
api_key = "key"
api_secret = "secret"
access_token = "token"
access_token_secret = "token-secret"

[instagram]
access_token = "ig-token"
business_account_id = "17841400000000000"

[linkedin]
access_token = "li-token"
"#;

fn linkedin_routes(mock: MockTransport) -> MockTransport {
    mock.on(
        Method::Get,
        "/v2/userinfo",
        HttpResponse::json_value(200, json!({"sub": "782bbtaQ", "name": "Ada Lovelace"})),
    )
    .on(
        Method::Post,
        "/v2/ugcPosts",
        HttpResponse::new(201, "").with_header("x-restli-id", "urn:li:share:42"),
    )
}

fn dispatcher(mock: &Arc<MockTransport>) -> Dispatcher {
    Dispatcher::with_transport(Config::from_toml_str(CONFIG).unwrap(), mock.clone())
}

#[tokio::test]
async fn test_one_failure_does_not_abort_others() {
    let mock = Arc::new(linkedin_routes(MockTransport::new().on(
        Method::Get,
        "/2/users/me",
        HttpResponse::json_value(
            401,
            json!({"title": "Unauthorized", "type": "about:blank", "status": 401, "detail": "Unauthorized"}),
        ),
    )));
    let dispatcher = dispatcher(&mock);

    let targets = dispatcher.resolve_all(&["twitter", "linkedin"]).unwrap();
    let report = dispatcher
        .cross_post(&targets, &PostOptions::text("Hello from tricast"))
        .await;

    assert_eq!(report.outcomes.len(), 2);
    assert!(report.any_succeeded());
    assert!(!report.all_succeeded());

    let succeeded: Vec<_> = report.succeeded().collect();
    assert_eq!(succeeded.len(), 1);
    assert_eq!(succeeded[0].0, PlatformKind::LinkedIn);
    assert_eq!(succeeded[0].1.id, "urn:li:share:42");
    assert_eq!(succeeded[0].1.platform, PlatformKind::LinkedIn);

    let failed: Vec<_> = report.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, PlatformKind::Twitter);
    assert_eq!(failed[0].1.kind(), ErrorKind::AuthenticationFailed);

    assert_eq!(report.exit_code(), 2);
}

#[tokio::test]
async fn test_transport_failure_is_reported_per_platform() {
    let mock = Arc::new(linkedin_routes(MockTransport::new().on(
        Method::Get,
        "/2/users/me",
        TransportError::Timeout("operation timed out".to_string()),
    )));
    let dispatcher = dispatcher(&mock);

    let report = dispatcher
        .identify_all(&[PlatformKind::Twitter, PlatformKind::LinkedIn])
        .await;

    let failed: Vec<_> = report.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].1.kind(), ErrorKind::Unknown);
    assert!(failed[0].1.to_string().contains("timed out"));
    assert_eq!(report.succeeded().count(), 1);
}

#[tokio::test]
async fn test_cross_post_preflight_per_platform() {
    let mock = Arc::new(linkedin_routes(MockTransport::new()));
    let dispatcher = dispatcher(&mock);

    // Instagram cannot take a text-only post; LinkedIn still goes ahead
    let report = dispatcher
        .cross_post(
            &[PlatformKind::Instagram, PlatformKind::LinkedIn],
            &PostOptions::text("text only"),
        )
        .await;

    assert_eq!(report.outcomes[0].platform, PlatformKind::Instagram);
    assert_eq!(
        report.outcomes[0].result.as_ref().unwrap_err().kind(),
        ErrorKind::UnsupportedOperation
    );
    assert!(report.outcomes[1].is_success());

    // Instagram never authenticated
    assert!(mock.requests_to(Method::Get, "/me").is_empty());
}

#[tokio::test]
async fn test_feed_all_collects_each_platform() {
    let mock = Arc::new(
        linkedin_routes(MockTransport::new())
            .on(
                Method::Get,
                "/v2/ugcPosts",
                HttpResponse::json_value(200, json!({"elements": [], "paging": {"total": 0}})),
            )
            .on(
                Method::Get,
                "/me",
                HttpResponse::json_value(200, json!({"id": "10150000", "name": "Owner"})),
            )
            .on(
                Method::Get,
                "/17841400000000000",
                HttpResponse::json_value(
                    200,
                    json!({"id": "17841400000000000", "username": "tricast.photos"}),
                ),
            )
            .on(
                Method::Get,
                "/17841400000000000/media",
                HttpResponse::json_value(200, json!({"data": [{"id": "m1", "caption": "sunset"}]})),
            ),
    );
    let dispatcher = dispatcher(&mock);

    let report = dispatcher
        .feed_all(
            &[PlatformKind::Instagram, PlatformKind::LinkedIn],
            &FeedOptions::default(),
        )
        .await;

    assert!(report.all_succeeded());
    assert_eq!(report.exit_code(), 0);

    let feeds: Vec<_> = report.succeeded().collect();
    assert_eq!(feeds[0].1.posts.len(), 1);
    assert_eq!(feeds[0].1.posts[0].platform, PlatformKind::Instagram);
    assert!(feeds[1].1.posts.is_empty());
    assert!(feeds[1].1.next_cursor.is_none());
}
