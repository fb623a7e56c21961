//! REST handlers.
//!
//! Thin adapters over [`SignalRouter`](crate::router::SignalRouter): each
//! resolves the caller, invokes one router operation, and maps the result to
//! JSON. Events caused by a REST call reach WebSocket clients exactly as if
//! the call had arrived over the socket.

use crate::arbiter::ShareAnnouncement;
use crate::collaborators::RoomRoles;
use crate::errors::SignalingError;
use crate::http::{AppState, Caller};
use crate::ice::{IceConfiguration, ScreenShareConstraints, ScreenShareQuality, WebRtcConfiguration};
use crate::protocol::QualityReport;
use crate::quality::{QualitySample, QualityStatistics};
use crate::router::SessionInfo;
use crate::session::{ScreenShare, SessionRecord};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use common::types::{ParticipantId, RoomId, StreamId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

// ============================================================================
// Request / response bodies
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ScreenShareConfigQuery {
    #[serde(default)]
    pub quality: ScreenShareQuality,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterScreenShareRequest {
    pub stream_id: StreamId,
    #[serde(default)]
    pub screen_title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScreenShareRequest {
    pub screen_title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinScreenRequest {
    pub participant_id: ParticipantId,
}

#[derive(Debug, Deserialize)]
pub struct PermissionRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PinnedScreenShareResponse {
    pub pinned_screen_share: Option<ScreenShare>,
}

// ============================================================================
// WebRTC configuration
// ============================================================================

/// Handler for GET /api/v1/webrtc/ice-servers
pub async fn ice_servers(State(state): State<Arc<AppState>>) -> Json<IceConfiguration> {
    Json(state.ice.clone())
}

/// Handler for GET /api/v1/webrtc/config
pub async fn webrtc_config(State(state): State<Arc<AppState>>) -> Json<WebRtcConfiguration> {
    Json(WebRtcConfiguration::new(state.ice.clone()))
}

/// Handler for GET /api/v1/webrtc/screen-share-config
///
/// `quality` is one of `low`, `medium` (default) or `high`.
pub async fn screen_share_config(
    Query(query): Query<ScreenShareConfigQuery>,
) -> Json<ScreenShareConstraints> {
    Json(query.quality.constraints())
}

// ============================================================================
// Session
// ============================================================================

/// Handler for GET /api/v1/rooms/:room_id/session
#[instrument(skip_all, fields(room_id = %room_id))]
pub async fn get_session_info(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
) -> Json<SessionInfo> {
    Json(state.router.session_info(&room_id))
}

/// Handler for POST /api/v1/rooms/:room_id/session/end
///
/// Host or co-host only.
#[instrument(skip_all, fields(room_id = %room_id, participant_id = %caller.0))]
pub async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
    caller: Caller,
) -> Result<Json<SessionRecord>, SignalingError> {
    let record = state.router.end_session(&room_id, &caller.0).await?;
    Ok(Json(record))
}

// ============================================================================
// Screen sharing
// ============================================================================

/// Handler for GET /api/v1/rooms/:room_id/screen-shares
pub async fn list_screen_shares(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
) -> Json<Vec<ScreenShare>> {
    Json(state.router.active_screen_shares(&room_id))
}

/// Handler for POST /api/v1/rooms/:room_id/screen-shares
///
/// Registers the caller's share and announces it as `new-screen-share`.
#[instrument(skip_all, fields(room_id = %room_id, participant_id = %caller.0))]
pub async fn register_screen_share(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
    caller: Caller,
    Json(body): Json<RegisterScreenShareRequest>,
) -> Result<(StatusCode, Json<ScreenShare>), SignalingError> {
    if body.stream_id.is_blank() {
        return Err(SignalingError::InvalidMessage(
            "streamId must not be empty".to_string(),
        ));
    }

    let share = state
        .router
        .start_screen_share(
            &room_id,
            &caller.0,
            body.stream_id,
            body.screen_title,
            ShareAnnouncement::Registered,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(share)))
}

/// Handler for GET /api/v1/rooms/:room_id/screen-shares/pinned
pub async fn get_pinned_screen_share(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
) -> Json<PinnedScreenShareResponse> {
    Json(PinnedScreenShareResponse {
        pinned_screen_share: state.router.pinned_screen_share(&room_id),
    })
}

/// Handler for PUT /api/v1/rooms/:room_id/screen-shares/:stream_id
///
/// Retitles the caller's own share.
#[instrument(skip_all, fields(room_id = %room_id, participant_id = %caller.0))]
pub async fn update_screen_share(
    State(state): State<Arc<AppState>>,
    Path((room_id, stream_id)): Path<(RoomId, StreamId)>,
    caller: Caller,
    Json(body): Json<UpdateScreenShareRequest>,
) -> Result<Json<ScreenShare>, SignalingError> {
    let share = state
        .router
        .update_screen_share(&room_id, &caller.0, &stream_id, body.screen_title)
        .await?;
    Ok(Json(share))
}

/// Handler for PUT /api/v1/rooms/:room_id/pin
#[instrument(skip_all, fields(room_id = %room_id, participant_id = %caller.0))]
pub async fn pin_screen(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
    caller: Caller,
    Json(body): Json<PinScreenRequest>,
) -> Result<StatusCode, SignalingError> {
    state
        .router
        .pin_screen(&room_id, &caller.0, &body.participant_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for DELETE /api/v1/rooms/:room_id/pin
#[instrument(skip_all, fields(room_id = %room_id, participant_id = %caller.0))]
pub async fn unpin_screen(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
    caller: Caller,
) -> Result<StatusCode, SignalingError> {
    state.router.unpin_screen(&room_id, &caller.0).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for PUT /api/v1/rooms/:room_id/permissions/screen-share
///
/// Host only.
#[instrument(skip_all, fields(room_id = %room_id, participant_id = %caller.0))]
pub async fn update_screen_share_permission(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
    caller: Caller,
    Json(body): Json<PermissionRequest>,
) -> Result<StatusCode, SignalingError> {
    state
        .router
        .update_screen_share_permission(&room_id, &caller.0, body.enabled)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Connection quality
// ============================================================================

/// Handler for POST /api/v1/rooms/:room_id/connection-status
#[instrument(skip_all, fields(room_id = %room_id, participant_id = %caller.0))]
pub async fn record_connection_status(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
    caller: Caller,
    Json(report): Json<QualityReport>,
) -> Result<Json<QualitySample>, SignalingError> {
    let sample = state
        .router
        .connection_status(&room_id, &caller.0, report)
        .await?;
    Ok(Json(sample))
}

/// Handler for GET /api/v1/rooms/:room_id/quality-stats
///
/// Host or co-host only.
#[instrument(skip_all, fields(room_id = %room_id, participant_id = %caller.0))]
pub async fn quality_stats(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
    caller: Caller,
) -> Result<Json<QualityStatistics>, SignalingError> {
    let stats = state.router.quality_statistics(&room_id, &caller.0).await?;
    Ok(Json(stats))
}

// ============================================================================
// Roles
// ============================================================================

/// Handler for PUT /api/v1/rooms/:room_id/roles
///
/// Operator endpoint: replaces the room's host and co-host assignment.
/// It is unauthenticated and only routed when `SIG_ENABLE_ROLES_API` is
/// set; deployments must keep it off the public listener.
#[instrument(skip_all, fields(room_id = %room_id))]
pub async fn assign_roles(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
    Json(roles): Json<RoomRoles>,
) -> StatusCode {
    state.directory.assign_roles(&room_id, roles);
    StatusCode::NO_CONTENT
}
