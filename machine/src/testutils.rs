use crate::client::{AppClient, ClientError};
use crate::types::{MachineConfig, Part};
use async_trait::async_trait;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response};
use parking_lot::Mutex;
use serde_json::{Value as JsonValue, json};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

#[derive(Default)]
struct Store {
    // (machine id, part)
    parts: Vec<(String, Part)>,
    updates: Vec<(String, MachineConfig)>,
}

/// Keeps parts in memory. Every call yields once so concurrent callers interleave.
#[derive(Default)]
pub struct InMemoryAppClient {
    store: Mutex<Store>,
    list_calls: AtomicUsize,
    failing_updates: AtomicUsize,
}

impl InMemoryAppClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_part(
        &self,
        machine_id: &str,
        part_id: &str,
        name: &str,
        main_part: bool,
        config_json: Option<&str>,
    ) {
        self.store.lock().parts.push((
            machine_id.to_string(),
            Part {
                id: part_id.to_string(),
                name: name.to_string(),
                main_part,
                config_json: config_json.map(String::from),
            },
        ));
    }

    pub fn config_json(&self, part_id: &str) -> Option<String> {
        self.store
            .lock()
            .parts
            .iter()
            .find(|(_, p)| p.id == part_id)
            .and_then(|(_, p)| p.config_json.clone())
    }

    pub fn updates(&self) -> Vec<(String, MachineConfig)> {
        self.store.lock().updates.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Makes the next `count` updates fail with a server error.
    pub fn fail_updates(&self, count: usize) {
        self.failing_updates.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl AppClient for InMemoryAppClient {
    async fn list_parts(&self, machine_id: &str) -> Result<Vec<Part>, ClientError> {
        tokio::task::yield_now().await;
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .store
            .lock()
            .parts
            .iter()
            .filter(|(m, _)| m == machine_id)
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn get_part(&self, part_id: &str) -> Result<Part, ClientError> {
        tokio::task::yield_now().await;
        self.store
            .lock()
            .parts
            .iter()
            .find(|(_, p)| p.id == part_id)
            .map(|(_, p)| p.clone())
            .ok_or_else(|| ClientError::PartNotFound(part_id.to_string()))
    }

    async fn update_part(
        &self,
        part_id: &str,
        part_name: &str,
        config: &MachineConfig,
    ) -> Result<Part, ClientError> {
        tokio::task::yield_now().await;
        let failing = self.failing_updates.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_updates.store(failing - 1, Ordering::SeqCst);
            return Err(ClientError::HttpStatus(
                StatusCode::INTERNAL_SERVER_ERROR,
                "update failed".into(),
            ));
        }

        let text = serde_json::to_string(config)
            .map_err(|e| ClientError::HttpStatus(StatusCode::BAD_REQUEST, e.to_string()))?;

        let mut store = self.store.lock();
        let part = store
            .parts
            .iter_mut()
            .find(|(_, p)| p.id == part_id)
            .map(|(_, p)| p)
            .ok_or_else(|| ClientError::PartNotFound(part_id.to_string()))?;
        part.name = part_name.to_string();
        part.config_json = Some(text);
        let updated = part.clone();
        store.updates.push((part_id.to_string(), config.clone()));

        Ok(updated)
    }
}

const MOCK_TOKEN: &str = "mock-access-token";

#[derive(thiserror::Error, Debug)]
pub enum MockError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

type MockResponse = Response<BoxBody<Bytes, MockError>>;

/// An HTTP server speaking the JSON app API, backed by an [`InMemoryAppClient`].
pub struct MockAppServer {
    addr: SocketAddr,
    store: Arc<InMemoryAppClient>,
    handle: JoinHandle<()>,
}

impl MockAppServer {
    pub async fn spawn(secret: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = Arc::new(InMemoryAppClient::new());

        let service = MockAppService {
            store: store.clone(),
            secret: secret.to_string(),
        };
        let handle = tokio::spawn(async move {
            if let Err(e) = shared::http::serve(listener, service).await {
                eprintln!("mock app server stopped: {e}");
            }
        });

        MockAppServer {
            addr,
            store,
            handle,
        }
    }

    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}/", self.addr)).unwrap()
    }

    pub fn add_part(
        &self,
        machine_id: &str,
        part_id: &str,
        name: &str,
        main_part: bool,
        config_json: Option<&str>,
    ) {
        self.store
            .add_part(machine_id, part_id, name, main_part, config_json);
    }
}

impl Drop for MockAppServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Clone)]
struct MockAppService {
    store: Arc<InMemoryAppClient>,
    secret: String,
}

impl Service<Request<Incoming>> for MockAppService {
    type Response = MockResponse;
    type Error = MockError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let svc = self.clone();
        Box::pin(async move { Ok(svc.handle(req).await) })
    }
}

impl MockAppService {
    async fn handle(&self, req: Request<Incoming>) -> MockResponse {
        let method = req.method().clone();
        let segments: Vec<String> = req
            .uri()
            .path()
            .trim_matches('/')
            .split('/')
            .map(|s| {
                urlencoding::decode(s)
                    .map(|d| d.into_owned())
                    .unwrap_or_else(|_| s.to_string())
            })
            .collect();
        let authorized = req
            .headers()
            .get(AUTHORIZATION)
            .is_some_and(|v| v.as_bytes() == format!("Bearer {MOCK_TOKEN}").as_bytes());

        let body: JsonValue = match req.into_body().collect().await {
            Ok(collected) => {
                serde_json::from_slice(&collected.to_bytes()).unwrap_or(JsonValue::Null)
            }
            Err(_) => return json_response(StatusCode::BAD_REQUEST, json!({})),
        };

        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        match (&method, segments.as_slice()) {
            (&Method::POST, ["auth", "token"]) => {
                if body["credentials"]["type"] == "api-key"
                    && body["credentials"]["payload"] == self.secret.as_str()
                {
                    json_response(StatusCode::OK, json!({"accessToken": MOCK_TOKEN}))
                } else {
                    json_response(StatusCode::UNAUTHORIZED, json!({"error": "bad key"}))
                }
            }
            _ if !authorized => {
                json_response(StatusCode::UNAUTHORIZED, json!({"error": "no token"}))
            }
            (&Method::GET, ["v1", "machines", machine_id, "parts"]) => {
                match self.store.list_parts(machine_id).await {
                    Ok(parts) => json_response(StatusCode::OK, json!({"parts": parts})),
                    Err(e) => error_response(e),
                }
            }
            (&Method::GET, ["v1", "parts", part_id]) => match self.store.get_part(part_id).await {
                Ok(part) => json_response(StatusCode::OK, json!({"part": part})),
                Err(e) => error_response(e),
            },
            (&Method::PUT, ["v1", "parts", part_id]) => {
                let config: MachineConfig =
                    match serde_json::from_value(body["robotConfig"].clone()) {
                        Ok(config) => config,
                        Err(e) => {
                            return json_response(
                                StatusCode::BAD_REQUEST,
                                json!({"error": e.to_string()}),
                            );
                        }
                    };
                let name = body["name"].as_str().unwrap_or_default();
                match self.store.update_part(part_id, name, &config).await {
                    Ok(part) => json_response(StatusCode::OK, json!({"part": part})),
                    Err(e) => error_response(e),
                }
            }
            _ => json_response(StatusCode::NOT_FOUND, json!({"error": "no route"})),
        }
    }
}

fn error_response(error: ClientError) -> MockResponse {
    let status = match error {
        ClientError::PartNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_response(status, json!({"error": error.to_string()}))
}

fn json_response(status: StatusCode, body: JsonValue) -> MockResponse {
    let mut response = Response::new(
        Full::new(Bytes::from(body.to_string()))
            .map_err(|e| match e {})
            .boxed(),
    );
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
