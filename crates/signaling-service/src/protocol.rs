//! Wire messages exchanged with signaling clients.
//!
//! Inbound frames are JSON objects internally tagged by `type` with
//! camelCase fields. [`ClientMessage::validate`] runs at the transport
//! boundary so the router only ever sees well-formed input bound to the
//! connection's room and identity.
//!
//! Every outbound message is a [`Notification`]: a [`ServerEvent`] plus a
//! server-stamped `timestamp` (milliseconds since the Unix epoch). Client
//! timestamps are accepted on input and ignored.

use crate::errors::SignalingError;
use crate::quality::QualityTier;
use crate::session::ScreenShare;
use chrono::{DateTime, Utc};
use common::types::{ParticipantId, RoomId, SessionId, StreamId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// WebRTC handshake message kinds relayed between peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
        }
    }
}

/// Envelope shared by handshake and presence messages.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalEnvelope {
    pub room_id: RoomId,
    pub from_participant_id: ParticipantId,
    #[serde(default)]
    pub to_participant_id: Option<ParticipantId>,
    /// SDP or ICE payload; opaque to the server.
    #[serde(default)]
    pub data: Value,
}

/// Kind of media a control message toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaType {
    #[serde(alias = "AUDIO")]
    Audio,
    #[serde(alias = "VIDEO")]
    Video,
    #[serde(alias = "SCREEN_SHARE")]
    ScreenShare,
}

/// Mute/unmute and camera toggles. The last one per participant is kept
/// in the session's media states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaControlMessage {
    pub participant_id: ParticipantId,
    pub room_id: RoomId,
    pub media_type: MediaType,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<StreamId>,
}

/// Start or stop a screen share.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenShareMessage {
    pub participant_id: ParticipantId,
    pub room_id: RoomId,
    /// Required when `is_sharing` is true.
    #[serde(default)]
    pub stream_id: Option<StreamId>,
    pub is_sharing: bool,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub screen_title: Option<String>,
}

/// Periodic connection-quality report from a client.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    #[serde(alias = "packetLoss")]
    pub packet_loss_percent: f64,
    #[serde(alias = "latency")]
    pub latency_ms: f64,
    #[serde(alias = "bandwidth")]
    pub bandwidth_kbps: f64,
}

impl QualityReport {
    /// Rejects non-finite or negative loss/latency values.
    pub fn validate(&self) -> Result<(), SignalingError> {
        let finite = self.packet_loss_percent.is_finite()
            && self.latency_ms.is_finite()
            && self.bandwidth_kbps.is_finite();
        if !finite {
            return Err(SignalingError::InvalidMessage(
                "quality metrics must be finite numbers".to_string(),
            ));
        }
        if self.packet_loss_percent < 0.0 || self.latency_ms < 0.0 {
            return Err(SignalingError::InvalidMessage(
                "packet loss and latency cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Inbound WebSocket frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinRoom(SignalEnvelope),
    LeaveRoom(SignalEnvelope),
    Offer(SignalEnvelope),
    Answer(SignalEnvelope),
    IceCandidate(SignalEnvelope),
    MediaControl(MediaControlMessage),
    ScreenShare(ScreenShareMessage),
    #[serde(rename_all = "camelCase")]
    PinScreen {
        participant_id: ParticipantId,
    },
    UnpinScreen,
    #[serde(rename_all = "camelCase")]
    UpdateScreenShare {
        stream_id: StreamId,
        screen_title: String,
    },
    ConnectionStatus(QualityReport),
    #[serde(rename_all = "camelCase")]
    UpdatePermissions {
        allow_screen_sharing: bool,
    },
    EndSession,
}

impl ClientMessage {
    /// Bounded label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::JoinRoom(_) => "join-room",
            ClientMessage::LeaveRoom(_) => "leave-room",
            ClientMessage::Offer(_) => "offer",
            ClientMessage::Answer(_) => "answer",
            ClientMessage::IceCandidate(_) => "ice-candidate",
            ClientMessage::MediaControl(_) => "media-control",
            ClientMessage::ScreenShare(_) => "screen-share",
            ClientMessage::PinScreen { .. } => "pin-screen",
            ClientMessage::UnpinScreen => "unpin-screen",
            ClientMessage::UpdateScreenShare { .. } => "update-screen-share",
            ClientMessage::ConnectionStatus(_) => "connection-status",
            ClientMessage::UpdatePermissions { .. } => "update-permissions",
            ClientMessage::EndSession => "end-session",
        }
    }

    /// Checks the message against the connection it arrived on.
    ///
    /// A connection is bound to one room and one identity; a message naming
    /// another room, or claiming to come from another participant, is
    /// rejected here and never reaches the router.
    pub fn validate(&self, room: &RoomId, caller: &ParticipantId) -> Result<(), SignalingError> {
        match self {
            ClientMessage::JoinRoom(envelope)
            | ClientMessage::LeaveRoom(envelope)
            | ClientMessage::Offer(envelope)
            | ClientMessage::Answer(envelope)
            | ClientMessage::IceCandidate(envelope) => {
                check_binding(&envelope.room_id, &envelope.from_participant_id, room, caller)?;
                if let Some(to) = &envelope.to_participant_id {
                    if to.is_blank() {
                        return Err(SignalingError::InvalidMessage(
                            "toParticipantId cannot be blank".to_string(),
                        ));
                    }
                }
                Ok(())
            }
            ClientMessage::MediaControl(message) => {
                check_binding(&message.room_id, &message.participant_id, room, caller)
            }
            ClientMessage::ScreenShare(message) => {
                check_binding(&message.room_id, &message.participant_id, room, caller)?;
                let has_stream = message.stream_id.as_ref().is_some_and(|s| !s.is_blank());
                if message.is_sharing && !has_stream {
                    return Err(SignalingError::InvalidMessage(
                        "streamId is required to start a screen share".to_string(),
                    ));
                }
                Ok(())
            }
            ClientMessage::PinScreen { participant_id } => {
                if participant_id.is_blank() {
                    return Err(SignalingError::InvalidMessage(
                        "participantId cannot be blank".to_string(),
                    ));
                }
                Ok(())
            }
            ClientMessage::UpdateScreenShare { stream_id, .. } => {
                if stream_id.is_blank() {
                    return Err(SignalingError::InvalidMessage(
                        "streamId cannot be blank".to_string(),
                    ));
                }
                Ok(())
            }
            ClientMessage::ConnectionStatus(report) => report.validate(),
            ClientMessage::UnpinScreen
            | ClientMessage::UpdatePermissions { .. }
            | ClientMessage::EndSession => Ok(()),
        }
    }
}

fn check_binding(
    message_room: &RoomId,
    message_participant: &ParticipantId,
    room: &RoomId,
    caller: &ParticipantId,
) -> Result<(), SignalingError> {
    if message_room != room {
        return Err(SignalingError::InvalidMessage(format!(
            "message addressed to room {message_room} on a connection for room {room}"
        )));
    }
    if message_participant != caller {
        return Err(SignalingError::AccessDenied(
            "cannot send on behalf of another participant".to_string(),
        ));
    }
    Ok(())
}

/// A handshake message as forwarded to its recipients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayedSignal {
    pub room_id: RoomId,
    pub from_participant_id: ParticipantId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_participant_id: Option<ParticipantId>,
    pub data: Value,
}

/// Outbound event payloads, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    ParticipantJoined {
        participant_id: ParticipantId,
        room_id: RoomId,
        #[serde(skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
        participants: Vec<ParticipantId>,
    },
    #[serde(rename_all = "camelCase")]
    ParticipantLeft {
        participant_id: ParticipantId,
        room_id: RoomId,
        participants: Vec<ParticipantId>,
    },
    #[serde(rename_all = "camelCase")]
    ParticipantsList {
        room_id: RoomId,
        participants: Vec<ParticipantId>,
    },
    #[serde(rename_all = "camelCase")]
    RoomInfo {
        room_id: RoomId,
        session_id: SessionId,
        participant_count: usize,
        max_concurrent_screens: usize,
    },
    Offer(RelayedSignal),
    Answer(RelayedSignal),
    IceCandidate(RelayedSignal),
    #[serde(rename_all = "camelCase")]
    MediaControlChanged {
        participant_id: ParticipantId,
        media_type: MediaType,
        enabled: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        stream_id: Option<StreamId>,
    },
    #[serde(rename_all = "camelCase")]
    ScreenShareChanged {
        participant_id: ParticipantId,
        stream_id: Option<StreamId>,
        is_sharing: bool,
        is_pinned: bool,
        screen_title: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    NewScreenShare {
        participant_id: ParticipantId,
        stream_id: StreamId,
        screen_title: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ScreenShareUpdated {
        participant_id: ParticipantId,
        stream_id: StreamId,
        screen_title: String,
    },
    #[serde(rename_all = "camelCase")]
    ScreenPinned {
        pinned_participant_id: ParticipantId,
    },
    ScreenUnpinned,
    #[serde(rename_all = "camelCase")]
    SessionEnded {
        room_id: RoomId,
        session_id: SessionId,
        ended_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    ConnectionStatusUpdate {
        participant_id: ParticipantId,
        status: QualityReport,
        quality: QualityTier,
        label: &'static str,
        color: &'static str,
        score: u8,
        last_ping: DateTime<Utc>,
    },
    PermissionsUpdated {
        permission: &'static str,
        enabled: bool,
    },
    Error {
        code: i32,
        message: String,
    },
}

impl ServerEvent {
    /// Bounded label for logs and metrics; matches the serialized `type`.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::ParticipantJoined { .. } => "participant-joined",
            ServerEvent::ParticipantLeft { .. } => "participant-left",
            ServerEvent::ParticipantsList { .. } => "participants-list",
            ServerEvent::RoomInfo { .. } => "room-info",
            ServerEvent::Offer(_) => "offer",
            ServerEvent::Answer(_) => "answer",
            ServerEvent::IceCandidate(_) => "ice-candidate",
            ServerEvent::MediaControlChanged { .. } => "media-control-changed",
            ServerEvent::ScreenShareChanged { .. } => "screen-share-changed",
            ServerEvent::NewScreenShare { .. } => "new-screen-share",
            ServerEvent::ScreenShareUpdated { .. } => "screen-share-updated",
            ServerEvent::ScreenPinned { .. } => "screen-pinned",
            ServerEvent::ScreenUnpinned => "screen-unpinned",
            ServerEvent::SessionEnded { .. } => "session-ended",
            ServerEvent::ConnectionStatusUpdate { .. } => "connection-status-update",
            ServerEvent::PermissionsUpdated { .. } => "permissions-updated",
            ServerEvent::Error { .. } => "error",
        }
    }

    /// Builds the relayed form of a handshake message.
    pub fn relayed(kind: SignalKind, envelope: SignalEnvelope) -> Self {
        let signal = RelayedSignal {
            room_id: envelope.room_id,
            from_participant_id: envelope.from_participant_id,
            to_participant_id: envelope.to_participant_id,
            data: envelope.data,
        };
        match kind {
            SignalKind::Offer => ServerEvent::Offer(signal),
            SignalKind::Answer => ServerEvent::Answer(signal),
            SignalKind::IceCandidate => ServerEvent::IceCandidate(signal),
        }
    }

    /// `screen-share-changed` for a share that just started.
    pub fn share_started(share: &ScreenShare, is_pinned: bool) -> Self {
        ServerEvent::ScreenShareChanged {
            participant_id: share.participant_id.clone(),
            stream_id: Some(share.stream_id.clone()),
            is_sharing: true,
            is_pinned,
            screen_title: share.title.clone(),
        }
    }
}

/// Outbound envelope: an event plus the server send time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    #[serde(flatten)]
    pub event: ServerEvent,
    pub timestamp: i64,
}

impl Notification {
    /// Stamp an event with the current server time.
    pub fn new(event: ServerEvent) -> Self {
        Self {
            event,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Client-facing error notification; carries no internal details.
    pub fn error(err: &SignalingError) -> Self {
        Self::new(ServerEvent::Error {
            code: err.error_code(),
            message: err.client_message(),
        })
    }

    pub fn kind(&self) -> &'static str {
        self.event.kind()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn room() -> RoomId {
        RoomId::new("42")
    }

    fn alice() -> ParticipantId {
        ParticipantId::new("alice")
    }

    #[test]
    fn test_decode_offer_with_target() {
        let raw = json!({
            "type": "offer",
            "roomId": "42",
            "fromParticipantId": "alice",
            "toParticipantId": "bob",
            "data": {"sdp": "v=0"},
            "timestamp": 1_700_000_000_000_i64
        });

        let message: ClientMessage = serde_json::from_value(raw).unwrap();
        let ClientMessage::Offer(envelope) = message else {
            panic!("expected offer");
        };
        assert_eq!(envelope.to_participant_id, Some(ParticipantId::new("bob")));
        assert_eq!(envelope.data["sdp"], "v=0");
    }

    #[test]
    fn test_decode_media_control_accepts_upper_case_media_type() {
        let raw = json!({
            "type": "media-control",
            "participantId": "alice",
            "roomId": "42",
            "mediaType": "AUDIO",
            "enabled": false
        });

        let message: ClientMessage = serde_json::from_value(raw).unwrap();
        assert!(matches!(
            message,
            ClientMessage::MediaControl(MediaControlMessage {
                media_type: MediaType::Audio,
                enabled: false,
                ..
            })
        ));
    }

    #[test]
    fn test_decode_unit_variants() {
        let unpin: ClientMessage = serde_json::from_value(json!({"type": "unpin-screen"})).unwrap();
        assert_eq!(unpin, ClientMessage::UnpinScreen);

        let end: ClientMessage = serde_json::from_value(json!({"type": "end-session"})).unwrap();
        assert_eq!(end.kind(), "end-session");
    }

    #[test]
    fn test_unknown_type_is_rejected_by_decoder() {
        let result = serde_json::from_value::<ClientMessage>(json!({"type": "teleport"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_spoofed_sender() {
        let message = ClientMessage::Offer(SignalEnvelope {
            room_id: room(),
            from_participant_id: ParticipantId::new("mallory"),
            to_participant_id: None,
            data: Value::Null,
        });

        let result = message.validate(&room(), &alice());
        assert!(matches!(result, Err(SignalingError::AccessDenied(_))));
    }

    #[test]
    fn test_validate_rejects_other_room() {
        let message = ClientMessage::JoinRoom(SignalEnvelope {
            room_id: RoomId::new("other"),
            from_participant_id: alice(),
            to_participant_id: None,
            data: Value::Null,
        });

        let result = message.validate(&room(), &alice());
        assert!(matches!(result, Err(SignalingError::InvalidMessage(_))));
    }

    #[test]
    fn test_validate_requires_stream_to_start_share() {
        let message = ClientMessage::ScreenShare(ScreenShareMessage {
            participant_id: alice(),
            room_id: room(),
            stream_id: None,
            is_sharing: true,
            is_pinned: false,
            screen_title: None,
        });
        assert!(matches!(
            message.validate(&room(), &alice()),
            Err(SignalingError::InvalidMessage(_))
        ));

        let stop = ClientMessage::ScreenShare(ScreenShareMessage {
            participant_id: alice(),
            room_id: room(),
            stream_id: None,
            is_sharing: false,
            is_pinned: false,
            screen_title: None,
        });
        assert!(stop.validate(&room(), &alice()).is_ok());
    }

    #[test]
    fn test_quality_report_validation() {
        let ok = QualityReport {
            packet_loss_percent: 0.5,
            latency_ms: 40.0,
            bandwidth_kbps: 1200.0,
        };
        assert!(ok.validate().is_ok());

        let negative = QualityReport {
            latency_ms: -1.0,
            ..ok
        };
        assert!(negative.validate().is_err());

        let nan = QualityReport {
            bandwidth_kbps: f64::NAN,
            ..ok
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_notification_serializes_type_fields_and_timestamp() {
        let notification = Notification::new(ServerEvent::ParticipantJoined {
            participant_id: alice(),
            room_id: room(),
            display_name: None,
            participants: vec![alice(), ParticipantId::new("bob")],
        });

        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["type"], "participant-joined");
        assert_eq!(value["participantId"], "alice");
        assert_eq!(value["roomId"], "42");
        assert_eq!(value["participants"], json!(["alice", "bob"]));
        assert!(value["timestamp"].as_i64().unwrap() > 0);
        assert!(value.get("displayName").is_none());
    }

    #[test]
    fn test_unit_event_serializes_with_type_only() {
        let value = serde_json::to_value(Notification::new(ServerEvent::ScreenUnpinned)).unwrap();
        assert_eq!(value["type"], "screen-unpinned");
        assert!(value["timestamp"].is_i64());
    }

    #[test]
    fn test_relayed_signal_keeps_payload_and_kind() {
        let envelope = SignalEnvelope {
            room_id: room(),
            from_participant_id: alice(),
            to_participant_id: None,
            data: json!({"candidate": "candidate:1 1 udp"}),
        };

        let event = ServerEvent::relayed(SignalKind::IceCandidate, envelope);
        let value = serde_json::to_value(Notification::new(event)).unwrap();
        assert_eq!(value["type"], "ice-candidate");
        assert_eq!(value["fromParticipantId"], "alice");
        assert_eq!(value["data"]["candidate"], "candidate:1 1 udp");
        assert!(value.get("toParticipantId").is_none());
    }

    #[test]
    fn test_error_notification_uses_client_message() {
        let notification = Notification::error(&SignalingError::Redis("10.1.1.1 down".to_string()));
        let value = serde_json::to_value(notification).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], 6);
        assert_eq!(value["message"], "An internal error occurred");
    }
}
