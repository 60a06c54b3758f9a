#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{MockTransport, User, decoded};
use futures_util::StreamExt;
use http::header::AUTHORIZATION;
use http::HeaderValue;
use odata_query::{
    Error, ODataQuery, ODataV4Context, ODataV4Options, RequestOptions, RequestOptionsFactory,
};
use serde::Deserialize;
use serde_json::json;

fn users(transport: &Arc<MockTransport>) -> ODataQuery<User> {
    let options = ODataV4Options::new().with_transport(transport.clone());
    ODataV4Context::new("https://host/odata", options).query("/users")
}

fn ann() -> serde_json::Value {
    json!({ "id": 1, "firstName": "Ann", "lastName": "Lee", "age": 34 })
}

fn bob() -> serde_json::Value {
    json!({ "id": 2, "firstName": "Bob", "lastName": "Ng", "email": "bob@host" })
}

#[tokio::test]
async fn get_many_decodes_a_page() {
    let transport = MockTransport::new();
    transport.respond_json(
        200,
        json!({
            "@odata.context": "https://host/odata/$metadata#users",
            "@odata.nextLink": "https://host/odata/users?$skip=2",
            "value": [ann(), bob()]
        }),
    );

    let page = users(&transport)
        .filter(|u| u.age().greater_than(30))
        .unwrap()
        .get_many()
        .await
        .unwrap();

    assert_eq!(page.value.len(), 2);
    assert_eq!(page.value[0].first_name, "Ann");
    assert_eq!(page.value[1].email.as_deref(), Some("bob@host"));
    assert_eq!(page.next_link.as_deref(), Some("https://host/odata/users?$skip=2"));
    assert_eq!(
        transport.urls().iter().map(|u| decoded(u)).collect::<Vec<_>>(),
        vec!["https://host/odata/users?$filter=age gt 30"]
    );
}

#[tokio::test]
async fn get_many_with_count_requests_and_reads_count() {
    let transport = MockTransport::new();
    transport.respond_json(200, json!({ "@odata.count": 42, "value": [ann()] }));

    let page = users(&transport).top(1).get_many_with_count().await.unwrap();

    assert_eq!(page.count, Some(42));
    assert_eq!(page.value[0].id, 1);
    assert_eq!(transport.urls(), vec!["https://host/odata/users?$top=1&$count=true"]);
}

#[tokio::test]
async fn get_fetches_single_entity_by_key() {
    let transport = MockTransport::new();
    let mut body = bob();
    body["@odata.context"] = json!("https://host/odata/$metadata#users/$entity");
    transport.respond_json(200, body);

    let response = users(&transport).get(2).await.unwrap();

    assert_eq!(response.entity.last_name, "Ng");
    assert_eq!(
        response.context.as_deref(),
        Some("https://host/odata/$metadata#users/$entity")
    );
    assert_eq!(transport.urls(), vec!["https://host/odata/users(2)"]);
}

#[tokio::test]
async fn get_value_returns_raw_body() {
    let transport = MockTransport::new();
    transport.respond(200, "Ann");

    let body = users(&transport)
        .by_key(1)
        .select(|u| u.first_name())
        .unwrap()
        .get_value()
        .await
        .unwrap();

    assert_eq!(&body[..], b"Ann");
    assert_eq!(
        transport.urls(),
        vec!["https://host/odata/users(1)/$value?$select=firstName"]
    );
}

#[derive(Debug, PartialEq, Deserialize)]
struct Contact {
    name: String,
    mother: Option<String>,
}

#[tokio::test]
async fn projection_reshapes_records() {
    let transport = MockTransport::new();
    transport.respond_json(
        200,
        json!({
            "value": [
                { "firstName": "Ann", "mother": { "lastName": "Lee" } },
                { "firstName": "Bob" }
            ]
        }),
    );

    let contacts = users(&transport).select_with::<Contact, _>(|u| {
        json!({ "name": u.first_name().value(), "mother": u.mother().last_name().value() })
    });
    let page = contacts.get_many().await.unwrap();

    assert_eq!(
        page.value,
        vec![
            Contact { name: "Ann".to_owned(), mother: Some("Lee".to_owned()) },
            Contact { name: "Bob".to_owned(), mother: None },
        ]
    );
    assert_eq!(
        decoded(&transport.urls()[0]),
        "https://host/odata/users?$select=firstName,mother/lastName"
    );
}

#[tokio::test]
async fn plain_select_after_projection_returns_entities() {
    let transport = MockTransport::new();
    transport.respond_json(200, json!({ "value": [ann()] }));

    let page = users(&transport)
        .select_with::<Contact, _>(|u| json!({ "name": u.last_name().value(), "mother": null }))
        .select(|u| (u.id(), u.first_name(), u.last_name()))
        .unwrap()
        .get_many()
        .await
        .unwrap();

    assert_eq!(page.value[0].first_name, "Ann");
    assert_eq!(page.value[0].age, Some(34));
    assert_eq!(
        decoded(&transport.urls()[0]),
        "https://host/odata/users?$select=id,firstName,lastName"
    );
}

#[tokio::test]
async fn projection_applies_to_single_entities() {
    let transport = MockTransport::new();
    transport.respond_json(200, ann());

    let response = users(&transport)
        .select_with::<Contact, _>(|u| json!({ "name": u.first_name().value(), "mother": null }))
        .get(1)
        .await
        .unwrap();

    assert_eq!(response.entity, Contact { name: "Ann".to_owned(), mother: None });
}

#[tokio::test]
async fn json_error_body_is_reported_compactly() {
    let transport = MockTransport::new();
    transport.respond(
        404,
        "{\n  \"error\": {\n    \"code\": \"NotFound\"\n  }\n}",
    );

    let err = users(&transport).get_many().await.unwrap_err();

    match err {
        Error::Http { status, body } => {
            assert_eq!(status, 404);
            assert_eq!(body, r#"{"error":{"code":"NotFound"}}"#);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn text_error_body_is_reported_verbatim() {
    let transport = MockTransport::new();
    transport.respond(500, "upstream exploded");

    let err = users(&transport).get_many().await.unwrap_err();
    assert!(matches!(&err, Error::Http { status: 500, body } if body == "upstream exploded"));
    assert_eq!(err.status(), Some(500));

    transport.respond(503, r#"{"error":"busy"}"#);
    let err = users(&transport).by_key(1).get_value().await.unwrap_err();
    assert!(matches!(&err, Error::Http { status: 503, body } if body == r#"{"error":"busy"}"#));
}

#[tokio::test]
async fn transport_failure_is_a_connection_error() {
    let transport = MockTransport::new();
    transport.fail("connection refused");

    let err = users(&transport).get_many().await.unwrap_err();

    assert!(matches!(err, Error::Connection(_)));
    assert_eq!(err.status(), None);
}

#[tokio::test]
async fn malformed_payload_is_a_json_error() {
    let transport = MockTransport::new();
    transport.respond(200, "not json");

    let err = users(&transport).get_many().await.unwrap_err();
    assert!(matches!(err, Error::Json(_)));
}

#[tokio::test]
async fn missing_transport_fails_execution() {
    let err = ODataQuery::<User>::for_v4("/odata/users").get_many().await.unwrap_err();
    assert!(matches!(err, Error::TransportUnavailable));
}

#[tokio::test]
async fn default_request_is_a_plain_get() {
    let transport = MockTransport::new();
    transport.respond_json(200, json!({ "value": [] }));

    users(&transport).get_many().await.unwrap();

    let options = transport.options();
    assert_eq!(options[0].method, http::Method::GET);
    assert!(options[0].headers.is_empty());
}

#[tokio::test]
async fn sync_request_options_are_applied_to_every_request() {
    let transport = MockTransport::new();
    transport.respond_json(200, json!({ "value": [] }));
    transport.respond_json(200, ann());

    let options = ODataV4Options::new()
        .with_transport(transport.clone())
        .with_request_options(RequestOptionsFactory::from_fn(|| {
            RequestOptions::default()
                .with_header(AUTHORIZATION, HeaderValue::from_static("Bearer static"))
        }));
    let query = ODataQuery::<User>::for_v4_with("https://host/odata/users", options);

    query.get_many().await.unwrap();
    query.get(1).await.unwrap();

    for recorded in transport.options() {
        assert_eq!(recorded.headers[AUTHORIZATION], "Bearer static");
    }
}

#[tokio::test]
async fn async_request_options_are_resolved_per_request() {
    let transport = MockTransport::new();
    transport.respond_json(200, json!({ "value": [] }));
    transport.respond_json(200, json!({ "value": [] }));

    let issued = Arc::new(AtomicUsize::new(0));
    let counter = issued.clone();
    let options = ODataV4Options::new()
        .with_transport(transport.clone())
        .with_request_options(RequestOptionsFactory::from_async(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::task::yield_now().await;
                let token = HeaderValue::from_str(&format!("Bearer token-{n}")).unwrap();
                RequestOptions::default().with_header(AUTHORIZATION, token)
            }
        }));
    let query = ODataQuery::<User>::for_v4_with("https://host/odata/users", options);

    query.get_many().await.unwrap();
    query.get_many().await.unwrap();

    let headers: Vec<_> = transport
        .options()
        .into_iter()
        .map(|o| o.headers[AUTHORIZATION].to_str().unwrap().to_owned())
        .collect();
    assert_eq!(headers, vec!["Bearer token-0", "Bearer token-1"]);
    assert_eq!(issued.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn items_follow_next_links() {
    let transport = MockTransport::new();
    transport.respond_json(
        200,
        json!({ "@odata.nextLink": "https://host/odata/users?$skiptoken=2", "value": [ann()] }),
    );
    transport.respond_json(200, json!({ "value": [bob()] }));

    let names: Vec<String> = users(&transport)
        .order_by(|u| u.id())
        .unwrap()
        .items()
        .map(|user| user.unwrap().first_name)
        .collect()
        .await;

    assert_eq!(names, vec!["Ann", "Bob"]);
    assert_eq!(
        transport.urls(),
        vec![
            "https://host/odata/users?$orderby=id",
            "https://host/odata/users?$skiptoken=2",
        ]
    );
}

#[tokio::test]
async fn relative_next_links_resolve_against_previous_request() {
    let transport = MockTransport::new();
    transport.respond_json(200, json!({ "@odata.nextLink": "users?$skiptoken=2", "value": [ann()] }));
    transport.respond_json(200, json!({ "@odata.nextLink": "/odata/users?$skiptoken=3", "value": [bob()] }));
    transport.respond_json(200, json!({ "value": [] }));

    let pages: Vec<_> = users(&transport).top(1).pages().collect().await;

    assert_eq!(pages.len(), 3);
    assert!(pages.iter().all(Result::is_ok));
    assert_eq!(
        transport.urls(),
        vec![
            "https://host/odata/users?$top=1",
            "https://host/odata/users?$skiptoken=2",
            "https://host/odata/users?$skiptoken=3",
        ]
    );
}

#[tokio::test]
async fn pages_apply_projection_to_every_page() {
    let transport = MockTransport::new();
    transport.respond_json(
        200,
        json!({ "@odata.nextLink": "https://host/odata/users?page=2", "value": [ann()] }),
    );
    transport.respond_json(200, json!({ "value": [bob()] }));

    let pages: Vec<_> = users(&transport)
        .select_with::<Contact, _>(|u| json!({ "name": u.last_name().value(), "mother": null }))
        .pages()
        .collect()
        .await;

    let names: Vec<_> = pages
        .into_iter()
        .flat_map(|page| page.unwrap().value)
        .map(|contact| contact.name)
        .collect();
    assert_eq!(names, vec!["Lee", "Ng"]);
}
