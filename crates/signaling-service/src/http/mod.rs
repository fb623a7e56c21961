//! HTTP surface: the WebSocket endpoint and the REST API.
//!
//! - `GET /ws/:room_id` - Signaling WebSocket, bound to one room and one identity
//! - `/api/v1/...` - WebRTC configuration, session queries and screen-share management

pub mod handlers;
pub mod ws;

use crate::collaborators::{
    HeaderIdentityResolver, IdentityResolver, InMemoryRoomDirectory, MeetingNotifier, RoomDirectory,
};
use crate::config::Config;
use crate::errors::SignalingError;
use crate::ice::IceConfiguration;
use crate::presence::PresenceRegistry;
use crate::router::{RouterDeps, SignalRouter};
use crate::session::{SessionPersistence, SessionStore};
use crate::transport::{ConnectionRegistry, Transport};
use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum::routing::{get, post, put};
use axum::Router;
use common::types::ParticipantId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// REST request timeout. Not applied to WebSocket connections.
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
pub struct AppState {
    pub router: Arc<SignalRouter>,
    pub connections: Arc<ConnectionRegistry>,
    /// Concrete directory, so operators can assign roles over HTTP.
    pub directory: Arc<InMemoryRoomDirectory>,
    pub identity: Arc<dyn IdentityResolver>,
    pub ice: IceConfiguration,
    /// Serve the unauthenticated roles endpoint.
    pub roles_api_enabled: bool,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire the router, connection registry and in-memory directory.
    pub fn new(
        config: &Config,
        persistence: Arc<dyn SessionPersistence>,
        notifier: Arc<dyn MeetingNotifier>,
        shutdown: CancellationToken,
    ) -> Self {
        let connections = Arc::new(ConnectionRegistry::new(
            config.outbound_buffer,
            shutdown.child_token(),
        ));
        let directory = Arc::new(InMemoryRoomDirectory::new());

        let router = Arc::new(SignalRouter::new(RouterDeps {
            presence: Arc::new(PresenceRegistry::new()),
            store: Arc::new(SessionStore::new()),
            directory: Arc::clone(&directory) as Arc<dyn RoomDirectory>,
            persistence,
            notifier,
            transport: Arc::clone(&connections) as Arc<dyn Transport>,
            max_concurrent_screens: config.max_concurrent_screens,
        }));

        Self {
            router,
            connections,
            directory,
            identity: Arc::new(HeaderIdentityResolver::new(config.allow_guests)),
            ice: IceConfiguration::from_config(config),
            roles_api_enabled: config.roles_api_enabled,
            shutdown,
        }
    }
}

/// Identity of the caller, resolved from headers or the query string.
#[derive(Debug, Clone)]
pub struct Caller(pub ParticipantId);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = SignalingError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map(|Query(q)| q)
            .unwrap_or_default();
        state.identity.resolve(&parts.headers, &query).map(Caller)
    }
}

/// Build the application routes.
///
/// The API routes get a request timeout; the WebSocket route does not,
/// since a connection lives as long as the participant stays.
pub fn build_routes(state: Arc<AppState>) -> Router {
    let mut api_routes: Router<Arc<AppState>> = Router::new()
        .route("/webrtc/ice-servers", get(handlers::ice_servers))
        .route("/webrtc/config", get(handlers::webrtc_config))
        .route(
            "/webrtc/screen-share-config",
            get(handlers::screen_share_config),
        )
        .route("/rooms/:room_id/session", get(handlers::get_session_info))
        .route("/rooms/:room_id/session/end", post(handlers::end_session))
        .route(
            "/rooms/:room_id/screen-shares",
            get(handlers::list_screen_shares).post(handlers::register_screen_share),
        )
        .route(
            "/rooms/:room_id/screen-shares/pinned",
            get(handlers::get_pinned_screen_share),
        )
        .route(
            "/rooms/:room_id/screen-shares/:stream_id",
            put(handlers::update_screen_share),
        )
        .route(
            "/rooms/:room_id/pin",
            put(handlers::pin_screen).delete(handlers::unpin_screen),
        )
        .route(
            "/rooms/:room_id/permissions/screen-share",
            put(handlers::update_screen_share_permission),
        )
        .route(
            "/rooms/:room_id/connection-status",
            post(handlers::record_connection_status),
        )
        .route("/rooms/:room_id/quality-stats", get(handlers::quality_stats));

    if state.roles_api_enabled {
        api_routes = api_routes.route("/rooms/:room_id/roles", put(handlers::assign_roles));
    }
    let api_routes = api_routes.layer(TimeoutLayer::new(API_TIMEOUT));

    Router::new()
        .route("/ws/:room_id", get(ws::ws_handler))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::collaborators::{NoopNotifier, PARTICIPANT_HEADER};
    use crate::session::InMemorySessionPersistence;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use common::types::RoomId;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    fn state() -> Arc<AppState> {
        state_with(&[])
    }

    fn state_with(vars: &[(&str, &str)]) -> Arc<AppState> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let config = Config::from_vars(&vars).unwrap();
        Arc::new(AppState::new(
            &config,
            Arc::new(InMemorySessionPersistence::new()),
            Arc::new(NoopNotifier),
            CancellationToken::new(),
        ))
    }

    async fn call(
        state: &Arc<AppState>,
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
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = build_routes(Arc::clone(state))
            .oneshot(request)
            .await
            .expect("request should complete");
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_ice_servers_endpoint() {
        let state = state();
        let (status, body) = call(&state, Method::GET, "/api/v1/webrtc/ice-servers", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["iceCandidatePoolSize"], 10);
        assert!(body["iceServers"][0]["urls"][0]
            .as_str()
            .unwrap()
            .starts_with("stun:"));
    }

    #[tokio::test]
    async fn test_screen_share_config_quality() {
        let state = state();
        let (status, body) = call(
            &state,
            Method::GET,
            "/api/v1/webrtc/screen-share-config?quality=high",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["width"], 1920);

        let (_, default) = call(
            &state,
            Method::GET,
            "/api/v1/webrtc/screen-share-config",
            None,
            None,
        )
        .await;
        assert_eq!(default["frameRate"], 24);
    }

    #[tokio::test]
    async fn test_session_info_without_session() {
        let state = state();
        let (status, body) = call(&state, Method::GET, "/api/v1/rooms/42/session", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "NO_ACTIVE_SESSION");
        assert_eq!(body["participants"], json!([]));
    }

    #[tokio::test]
    async fn test_end_session_requires_privilege() {
        let state = state_with(&[("SIG_ENABLE_ROLES_API", "true")]);
        let room = RoomId::new("42");
        state
            .router
            .join_room(&room, &ParticipantId::new("host"))
            .await
            .unwrap();

        let (status, body) = call(
            &state,
            Method::POST,
            "/api/v1/rooms/42/session/end",
            Some("alice"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");

        let (status, _) = call(
            &state,
            Method::PUT,
            "/api/v1/rooms/42/roles",
            None,
            Some(json!({"host": "host", "coHosts": []})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = call(
            &state,
            Method::POST,
            "/api/v1/rooms/42/session/end",
            Some("host"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ENDED");

        let (status, _) = call(
            &state,
            Method::POST,
            "/api/v1/rooms/42/session/end",
            Some("host"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_roles_endpoint_absent_unless_enabled() {
        let state = state();

        let (status, _) = call(
            &state,
            Method::PUT,
            "/api/v1/rooms/42/roles",
            None,
            Some(json!({"host": "mallory", "coHosts": []})),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(state
            .directory
            .roles(&RoomId::new("42"))
            .await
            .unwrap()
            .host
            .is_none());
    }

    #[tokio::test]
    async fn test_register_requires_membership() {
        let state = state();

        let (status, body) = call(
            &state,
            Method::POST,
            "/api/v1/rooms/42/screen-shares",
            Some("outsider"),
            Some(json!({"streamId": "s1"})),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");
        let (_, list) = call(&state, Method::GET, "/api/v1/rooms/42/screen-shares", None, None).await;
        assert!(list.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_and_list_screen_shares() {
        let state = state();
        state
            .router
            .join_room(&RoomId::new("42"), &ParticipantId::new("alice"))
            .await
            .unwrap();
        let (status, share) = call(
            &state,
            Method::POST,
            "/api/v1/rooms/42/screen-shares",
            Some("alice"),
            Some(json!({"streamId": "s1", "screenTitle": "Slides"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(share["participantId"], "alice");

        let (_, list) = call(&state, Method::GET, "/api/v1/rooms/42/screen-shares", None, None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, _) = call(
            &state,
            Method::PUT,
            "/api/v1/rooms/42/pin",
            Some("alice"),
            Some(json!({"participantId": "alice"})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, pinned) = call(
            &state,
            Method::GET,
            "/api/v1/rooms/42/screen-shares/pinned",
            None,
            None,
        )
        .await;
        assert_eq!(pinned["pinnedScreenShare"]["streamId"], "s1");

        let (status, _) = call(&state, Method::DELETE, "/api/v1/rooms/42/pin", Some("alice"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = call(&state, Method::DELETE, "/api/v1/rooms/42/pin", Some("alice"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "INVALID_STATE");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let state = state();
        let (status, _) = call(&state, Method::GET, "/api/v1/nope", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
