#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use http::header::AUTHORIZATION;
use http::{HeaderValue, StatusCode};
use httpmock::prelude::*;
use odata_http::{HttpTransport, HttpTransportConfig, HttpTransportError};
use odata_query::{
    EntityProxy, Error, ODataEntity, ODataV4Context, ODataV4Options, PropertyProxy, ProxyNode,
    RequestOptions, RequestOptionsFactory, Transport,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct User {
    first_name: String,
}

struct UserProxy(ProxyNode);

impl EntityProxy for UserProxy {
    fn from_node(node: ProxyNode) -> Self {
        Self(node)
    }

    fn node(&self) -> &ProxyNode {
        &self.0
    }
}

impl UserProxy {
    fn first_name(&self) -> PropertyProxy<String> {
        self.0.property("firstName")
    }

    fn age(&self) -> PropertyProxy<i32> {
        self.0.property("age")
    }
}

impl ODataEntity for User {
    type Proxy = UserProxy;
}

fn test_transport() -> HttpTransport {
    HttpTransport::new(HttpTransportConfig::for_testing()).unwrap()
}

#[tokio::test]
async fn get_returns_status_headers_and_body() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(Method::GET)
            .path("/odata/users")
            .header_exists("user-agent");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({ "value": [] }));
    });

    let response = test_transport()
        .send(&server.url("/odata/users"), RequestOptions::default())
        .await
        .unwrap();

    mock.assert();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.ok());
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(response.json::<serde_json::Value>().unwrap(), json!({ "value": [] }));
}

#[tokio::test]
async fn request_headers_are_forwarded() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(Method::GET)
            .path("/odata/users")
            .header("authorization", "Bearer abc")
            .header("user-agent", "custom-agent");
        then.status(200).body("{}");
    });

    let options = RequestOptions::default()
        .with_header(AUTHORIZATION, HeaderValue::from_static("Bearer abc"))
        .with_header(http::header::USER_AGENT, HeaderValue::from_static("custom-agent"));
    test_transport()
        .send(&server.url("/odata/users"), options)
        .await
        .unwrap();

    mock.assert();
}

#[tokio::test]
async fn error_statuses_are_responses() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.path("/odata/missing");
        then.status(404).body("not here");
    });

    let response = test_transport()
        .send(&server.url("/odata/missing"), RequestOptions::default())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(!response.ok());
    assert_eq!(response.text(), "not here");
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.path("/odata/users");
        then.status(200).body("x".repeat(64));
    });

    let transport = HttpTransport::new(HttpTransportConfig {
        max_body_size: 16,
        ..HttpTransportConfig::for_testing()
    })
    .unwrap();
    let err = transport
        .execute(&server.url("/odata/users"), RequestOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, HttpTransportError::BodyTooLarge { limit: 16, .. }));
}

#[tokio::test]
async fn slow_servers_time_out() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.path("/odata/users");
        then.status(200).delay(Duration::from_secs(2)).body("{}");
    });

    let transport = HttpTransport::new(HttpTransportConfig {
        request_timeout: Duration::from_millis(100),
        ..HttpTransportConfig::for_testing()
    })
    .unwrap();
    let err = transport
        .execute(&server.url("/odata/users"), RequestOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, HttpTransportError::Timeout(d) if d == Duration::from_millis(100)));
}

#[tokio::test]
async fn queries_run_end_to_end() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(Method::GET)
            .path("/odata/users")
            .query_param("$filter", "age gt 30")
            .query_param("$select", "firstName")
            .header("authorization", "Bearer token");
        then.status(200).json_body(json!({
            "@odata.context": "$metadata#users(firstName)",
            "value": [{ "firstName": "Ann" }, { "firstName": "Bob" }]
        }));
    });

    let options = ODataV4Options::new()
        .with_transport(Arc::new(test_transport()))
        .with_request_options(RequestOptionsFactory::from_fn(|| {
            RequestOptions::default()
                .with_header(AUTHORIZATION, HeaderValue::from_static("Bearer token"))
        }));
    let context = ODataV4Context::new(server.url("/odata"), options);

    let page = context
        .query::<User>("/users")
        .filter(|u| u.age().greater_than(30))
        .unwrap()
        .select(|u| u.first_name())
        .unwrap()
        .get_many()
        .await
        .unwrap();

    mock.assert();
    let names: Vec<_> = page.value.into_iter().map(|u| u.first_name).collect();
    assert_eq!(names, vec!["Ann", "Bob"]);
}

#[tokio::test]
async fn relative_next_links_are_followed() {
    let server = MockServer::start();
    let first = server.mock(|when, then| {
        when.method(Method::GET).path("/odata/users").query_param("$top", "1");
        then.status(200).json_body(json!({
            "@odata.nextLink": "users?$skiptoken=2",
            "value": [{ "firstName": "Ann" }]
        }));
    });
    let second = server.mock(|when, then| {
        when.method(Method::GET).path("/odata/users").query_param("$skiptoken", "2");
        then.status(200).json_body(json!({ "value": [{ "firstName": "Bob" }] }));
    });

    let context = ODataV4Context::new(
        server.url("/odata"),
        ODataV4Options::new().with_transport(Arc::new(test_transport())),
    );
    let names: Vec<String> = context
        .query::<User>("/users")
        .top(1)
        .items()
        .map(|user| user.unwrap().first_name)
        .collect()
        .await;

    first.assert();
    second.assert();
    assert_eq!(names, vec!["Ann", "Bob"]);
}

#[tokio::test]
async fn query_errors_carry_status_and_body() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.path("/odata/users");
        then.status(400)
            .json_body(json!({ "error": { "code": "BadRequest", "message": "bad $filter" } }));
    });

    let context = ODataV4Context::new(
        server.url("/odata"),
        ODataV4Options::new().with_transport(Arc::new(test_transport())),
    );
    let err = context.query::<User>("/users").get_many().await.unwrap_err();

    match err {
        Error::Http { status, body } => {
            assert_eq!(status, 400);
            let body: serde_json::Value = serde_json::from_str(&body).unwrap();
            assert_eq!(body["error"]["code"], "BadRequest");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn transport_failures_surface_as_connection_errors() {
    let context = ODataV4Context::new(
        "http://127.0.0.1:9/odata",
        ODataV4Options::new().with_transport(Arc::new(test_transport())),
    );
    let err = context.query::<User>("/users").get_many().await.unwrap_err();

    match err {
        Error::Connection(source) => {
            assert!(source.downcast_ref::<HttpTransportError>().is_some());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
