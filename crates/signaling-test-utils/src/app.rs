//! In-process harness for the real HTTP routes.
//!
//! `TestApp` builds the production [`AppState`] and routes, sends requests
//! through `tower::ServiceExt::oneshot`, and lets tests attach pseudo
//! WebSocket clients directly to the connection registry so they can read
//! the frames a real socket would carry.

use crate::fixtures::{pid, TestRoom};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use signaling_service::collaborators::{NoopNotifier, PARTICIPANT_HEADER};
use signaling_service::config::Config;
use signaling_service::http::{build_routes, AppState};
use signaling_service::session::{InMemorySessionPersistence, SessionPersistence};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;

/// How long [`TestClient::next_frame`] waits before failing the test.
const FRAME_TIMEOUT: Duration = Duration::from_secs(1);

pub struct TestApp {
    pub state: Arc<AppState>,
    pub persistence: Arc<InMemorySessionPersistence>,
}

impl TestApp {
    /// Build with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_vars(&[])
    }

    /// Build with configuration overrides, e.g. `("SIG_MAX_CONCURRENT_SCREENS", "2")`.
    #[must_use]
    pub fn with_vars(vars: &[(&str, &str)]) -> Self {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let config = Config::from_vars(&vars).expect("test config should load");
        let persistence = Arc::new(InMemorySessionPersistence::new());

        let state = Arc::new(AppState::new(
            &config,
            Arc::clone(&persistence) as Arc<dyn SessionPersistence>,
            Arc::new(NoopNotifier),
            CancellationToken::new(),
        ));
        Self { state, persistence }
    }

    /// Install the room's roles in the directory.
    pub fn install(&self, room: &TestRoom) {
        self.state.directory.assign_roles(&room.id, room.roles());
    }

    /// Join every participant to the room through the router.
    pub async fn join_all(&self, room: &TestRoom, participants: &[&str]) {
        for participant in participants {
            self.state
                .router
                .join_room(&room.id, &pid(participant))
                .await
                .expect("join should succeed");
        }
    }

    /// Attach a client to the connection registry, as a WebSocket upgrade would.
    #[must_use]
    pub fn connect(&self, room: &TestRoom, participant: &str) -> TestClient {
        let (_, frames) = self.state.connections.register(&room.id, &pid(participant));
        TestClient { frames }
    }

    /// Send a request and decode the JSON response body (`Null` when empty).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        caller: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(caller) = caller {
            builder = builder.header(PARTICIPANT_HEADER, caller);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request should build"),
            None => builder.body(Body::empty()).expect("request should build"),
        };

        let response = build_routes(Arc::clone(&self.state))
            .oneshot(request)
            .await
            .expect("request should complete");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should be readable")
            .to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("body should be JSON")
        };
        (status, value)
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// Reading end of one registered connection.
pub struct TestClient {
    frames: mpsc::Receiver<String>,
}

impl TestClient {
    /// Next queued frame, decoded. Panics after one second.
    pub async fn next_frame(&mut self) -> Value {
        let frame = tokio::time::timeout(FRAME_TIMEOUT, self.frames.recv())
            .await
            .expect("frame should arrive in time")
            .expect("connection queue should be open");
        serde_json::from_str(&frame).expect("frame should be JSON")
    }

    /// Every frame queued so far, decoded.
    pub fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.frames.try_recv() {
            frames.push(serde_json::from_str(&frame).expect("frame should be JSON"));
        }
        frames
    }

    /// `type` of every frame queued so far.
    pub fn drain_types(&mut self) -> Vec<String> {
        self.drain()
            .into_iter()
            .map(|frame| frame["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}
