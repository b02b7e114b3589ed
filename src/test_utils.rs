//! Scripted HTTP backend for tests. Built for unit tests and, through the
//! `test-utils` feature, for the integration tests under `tests/`.
//!
//! Responses are queued per endpoint, keyed by the last path segment of the
//! request URL (`synccheck`, `webwxsync`, `login`, ...). Every request is
//! recorded so tests can inspect what the client sent.

use crate::client::Client;
use crate::config::ClientConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use wxcore::contacts::{Contact, ContactDirectory};
use wxcore::net::{HttpClient, HttpRequest, HttpResponse};
use wxcore::session::{Credentials, SelfUser, Session, SyncKey};

#[derive(Debug, Clone)]
pub enum MockResponse {
    Reply(HttpResponse),
    /// Simulates a network-level failure with no response.
    Fail(String),
}

impl MockResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        MockResponse::Reply(HttpResponse::new(200, body.into()))
    }

    pub fn status(status_code: u16, body: impl Into<String>) -> Self {
        MockResponse::Reply(HttpResponse::new(status_code, body.into()))
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        MockResponse::Fail(reason.into())
    }
}

#[derive(Default)]
struct Route {
    queue: VecDeque<MockResponse>,
    /// Served once the queue is empty.
    fallback: Option<MockResponse>,
}

#[derive(Default)]
pub struct MockHttpClient {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

pub fn endpoint_of(url: &str) -> &str {
    let path = url.split('?').next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues responses for an endpoint; chains for setup.
    pub fn route(self, endpoint: &str, responses: impl IntoIterator<Item = MockResponse>) -> Self {
        self.push(endpoint, responses);
        self
    }

    /// Serves `response` for an endpoint whenever its queue is empty.
    pub fn route_repeat(self, endpoint: &str, response: MockResponse) -> Self {
        self.routes
            .lock()
            .expect("Mutex should not be poisoned")
            .entry(endpoint.to_string())
            .or_default()
            .fallback = Some(response);
        self
    }

    pub fn push(&self, endpoint: &str, responses: impl IntoIterator<Item = MockResponse>) {
        self.routes
            .lock()
            .expect("Mutex should not be poisoned")
            .entry(endpoint.to_string())
            .or_default()
            .queue
            .extend(responses);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .expect("Mutex should not be poisoned")
            .clone()
    }

    pub fn requests_to(&self, endpoint: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| endpoint_of(&r.url) == endpoint)
            .collect()
    }

    /// Queues a complete, successful login for `login_script_user()`.
    pub fn with_login_script(self) -> Self {
        self.route("jslogin", [MockResponse::ok(
            r#"window.QRLogin.code = 200; window.QRLogin.uuid = "uuid-1";"#,
        )])
        .route("login", [
            MockResponse::ok("window.code=408;"),
            MockResponse::ok("window.code=201;"),
            MockResponse::ok(
                r#"window.code=200;
window.redirect_uri="https://wx.test/cgi-bin/mmwebwx-bin/webwxnewloginpage?ticket=T&uuid=uuid-1&scan=1";"#,
            ),
        ])
        .route("webwxnewloginpage", [MockResponse::ok(
            "<error><ret>0</ret><message></message><skey>@crypt_k</skey><wxsid>sid-1</wxsid>\
             <wxuin>1001</wxuin><pass_ticket>pt-1</pass_ticket><isgrayscale>1</isgrayscale></error>",
        )])
        .route("webwxinit", [MockResponse::ok(init_body())])
        .route("webwxstatusnotify", [MockResponse::ok(
            r#"{"BaseResponse":{"Ret":0,"ErrMsg":""},"MsgID":"1"}"#,
        )])
    }
}

#[async_trait::async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, anyhow::Error> {
        let endpoint = endpoint_of(&request.url).to_string();
        self.requests
            .lock()
            .expect("Mutex should not be poisoned")
            .push(request);

        let next = {
            let mut routes = self.routes.lock().expect("Mutex should not be poisoned");
            routes
                .get_mut(&endpoint)
                .and_then(|route| route.queue.pop_front().or_else(|| route.fallback.clone()))
        };
        match next {
            Some(MockResponse::Reply(response)) => Ok(response),
            Some(MockResponse::Fail(reason)) => Err(anyhow::anyhow!(reason)),
            None => Err(anyhow::anyhow!("no scripted response for '{endpoint}'")),
        }
    }
}

/// The account `with_login_script` logs in as.
pub fn login_script_user() -> SelfUser {
    SelfUser {
        user_name: "@me".to_string(),
        nick_name: "Bob".to_string(),
    }
}

fn init_body() -> String {
    serde_json::json!({
        "BaseResponse": {"Ret": 0, "ErrMsg": ""},
        "User": {"UserName": "@me", "NickName": "Bob"},
        "SyncKey": {"Count": 2, "List": [{"Key": 1, "Val": 100}, {"Key": 2, "Val": 200}]},
        "ContactList": [
            {"UserName": "@@room", "NickName": "Hiking"},
            {"UserName": "@alice", "NickName": "Alice"},
            {"UserName": "@@family", "NickName": "Family"}
        ]
    })
    .to_string()
}

pub fn sync_check_body(retcode: u32, selector: u32) -> String {
    format!(r#"window.synccheck={{retcode:"{retcode}",selector:"{selector}"}}"#)
}

pub fn text_message_json(id: &str, from: &str, to: &str, content: &str) -> serde_json::Value {
    serde_json::json!({
        "MsgId": id,
        "FromUserName": from,
        "ToUserName": to,
        "MsgType": 1,
        "Content": content,
        "CreateTime": 1_700_000_000
    })
}

pub fn sync_body(messages: Vec<serde_json::Value>, sync_key: &[(i64, i64)]) -> String {
    let list: Vec<_> = sync_key
        .iter()
        .map(|(k, v)| serde_json::json!({"Key": k, "Val": v}))
        .collect();
    serde_json::json!({
        "BaseResponse": {"Ret": 0, "ErrMsg": ""},
        "AddMsgCount": messages.len(),
        "AddMsgList": messages,
        "SyncKey": {"Count": list.len(), "List": list}
    })
    .to_string()
}

pub fn send_ack_body(msg_id: &str, local_id: &str) -> String {
    serde_json::json!({
        "BaseResponse": {"Ret": 0, "ErrMsg": ""},
        "MsgID": msg_id,
        "LocalID": local_id
    })
    .to_string()
}

pub fn test_config() -> ClientConfig {
    ClientConfig {
        login_host: "https://login.test".to_string(),
        sync_warmup_ms: 0,
        ..Default::default()
    }
}

pub fn test_session() -> Session {
    Session::new(
        login_script_user(),
        Credentials {
            skey: "@crypt_k".to_string(),
            sid: "sid-1".to_string(),
            uin: 1001,
            pass_ticket: "pt-1".to_string(),
        },
        "https://wx.test/cgi-bin/mmwebwx-bin",
        SyncKey::from_pairs([(1, 100), (2, 200)]),
    )
}

/// A client that skips the handshake and starts from `test_session()`.
pub async fn create_logged_in_client(http: Arc<MockHttpClient>) -> Arc<Client> {
    let client = Client::new(test_config(), http);
    let contacts = ContactDirectory::from_contacts(&[Contact {
        user_name: "@@room".to_string(),
        nick_name: "Hiking".to_string(),
        ..Default::default()
    }]);
    client.install_session(test_session(), contacts).await;
    client
}
