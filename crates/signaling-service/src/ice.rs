//! WebRTC client configuration handed out over REST.
//!
//! STUN servers come from configuration; TURN servers are included only
//! when configured and carry the shared TURN credentials. The credential is
//! exposed only when the configuration is serialized for a client response.

use crate::config::Config;
use common::secret::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};

/// ICE candidate pool size suggested to clients.
pub const ICE_CANDIDATE_POOL_SIZE: u32 = 10;

/// One ICE server entry, in the shape `RTCPeerConnection` expects.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "expose_credential"
    )]
    pub credential: Option<SecretString>,
}

fn expose_credential<S: Serializer>(
    credential: &Option<SecretString>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match credential {
        Some(secret) => serializer.serialize_str(secret.expose_secret()),
        None => serializer.serialize_none(),
    }
}

/// ICE servers plus candidate gathering policy.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IceConfiguration {
    pub ice_servers: Vec<IceServer>,
    pub ice_candidate_pool_size: u32,
    pub ice_transport_policy: &'static str,
}

impl IceConfiguration {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let mut ice_servers = Vec::new();
        if !config.stun_servers.is_empty() {
            ice_servers.push(IceServer {
                urls: config.stun_servers.clone(),
                username: None,
                credential: None,
            });
        }
        if !config.turn_servers.is_empty() {
            ice_servers.push(IceServer {
                urls: config.turn_servers.clone(),
                username: Some(config.turn_username.clone()),
                credential: Some(config.turn_credential.clone()),
            });
        }

        Self {
            ice_servers,
            ice_candidate_pool_size: ICE_CANDIDATE_POOL_SIZE,
            ice_transport_policy: "all",
        }
    }
}

/// Full peer-connection configuration with default media constraints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebRtcConfiguration {
    #[serde(flatten)]
    pub ice: IceConfiguration,
    pub bundle_policy: &'static str,
    pub rtcp_mux_policy: &'static str,
    pub media_constraints: Value,
}

impl WebRtcConfiguration {
    #[must_use]
    pub fn new(ice: IceConfiguration) -> Self {
        Self {
            ice,
            bundle_policy: "max-bundle",
            rtcp_mux_policy: "require",
            media_constraints: default_media_constraints(),
        }
    }
}

fn default_media_constraints() -> Value {
    json!({
        "audio": {
            "echoCancellation": true,
            "noiseSuppression": true,
            "autoGainControl": true
        },
        "video": {
            "width": {"ideal": 1280, "max": 1920},
            "height": {"ideal": 720, "max": 1080},
            "frameRate": {"ideal": 30, "max": 60}
        }
    })
}

/// Screen capture quality presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenShareQuality {
    Low,
    #[default]
    Medium,
    High,
}

/// `getDisplayMedia` constraints for a quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenShareConstraints {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub cursor: &'static str,
    pub audio: bool,
}

impl ScreenShareQuality {
    #[must_use]
    pub fn constraints(self) -> ScreenShareConstraints {
        let (width, height, frame_rate) = match self {
            ScreenShareQuality::Low => (640, 480, 15),
            ScreenShareQuality::Medium => (1280, 720, 24),
            ScreenShareQuality::High => (1920, 1080, 30),
        };
        ScreenShareConstraints {
            width,
            height,
            frame_rate,
            cursor: "always",
            audio: false,
        }
    }
}
