#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use odata_query::{
    BoxError, CollectionProxy, EntityProxy, ODataEntity, PropertyProxy, ProxyNode, RequestOptions,
    Transport, TransportResponse,
};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub age: Option<i32>,
}

pub struct UserProxy(ProxyNode);

impl EntityProxy for UserProxy {
    fn from_node(node: ProxyNode) -> Self {
        Self(node)
    }

    fn node(&self) -> &ProxyNode {
        &self.0
    }
}

impl UserProxy {
    pub fn id(&self) -> PropertyProxy<i64> {
        self.0.property("id")
    }

    pub fn first_name(&self) -> PropertyProxy<String> {
        self.0.property("firstName")
    }

    pub fn last_name(&self) -> PropertyProxy<String> {
        self.0.property("lastName")
    }

    pub fn email(&self) -> PropertyProxy<String> {
        self.0.property("email")
    }

    pub fn age(&self) -> PropertyProxy<i32> {
        self.0.property("age")
    }

    pub fn birthday(&self) -> PropertyProxy<chrono::NaiveDate> {
        self.0.property("birthday")
    }

    pub fn mother(&self) -> UserProxy {
        self.0.navigate("mother")
    }

    pub fn children(&self) -> CollectionProxy<UserProxy> {
        self.0.collection("children")
    }

    pub fn tags(&self) -> CollectionProxy<PropertyProxy<String>> {
        self.0.collection("tags")
    }
}

impl ODataEntity for User {
    type Proxy = UserProxy;
}

/// Percent-decoded URL, for readable assertions.
pub fn decoded(url: &str) -> String {
    urlencoding::decode(url).expect("valid UTF-8").into_owned()
}

/// Transport replaying canned responses and recording every request.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<std::result::Result<TransportResponse, String>>>,
    requests: Mutex<Vec<(String, RequestOptions)>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond_json(&self, status: u16, body: serde_json::Value) {
        self.respond(status, Bytes::from(body.to_string()));
    }

    pub fn respond(&self, status: u16, body: impl Into<Bytes>) {
        let response = TransportResponse::new(
            StatusCode::from_u16(status).expect("valid status"),
            HeaderMap::new(),
            body.into(),
        );
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn fail(&self, message: &str) {
        self.responses.lock().unwrap().push_back(Err(message.to_owned()));
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|(url, _)| url.clone()).collect()
    }

    pub fn options(&self) -> Vec<RequestOptions> {
        self.requests.lock().unwrap().iter().map(|(_, o)| o.clone()).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> std::result::Result<TransportResponse, BoxError> {
        self.requests.lock().unwrap().push((url.to_owned(), options));
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(message.into()),
            None => Err("no canned response".into()),
        }
    }
}
