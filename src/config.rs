//! Coordinator configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::signaling::SignalingError;

/// Budget for a session to reach `Connected` once negotiation starts
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";
/// Remote candidates kept per room while no session exists for it
pub const DEFAULT_MAX_EARLY_CANDIDATES: usize = 64;

const ICE_URL_SCHEMES: [&str; 4] = ["stun:", "stuns:", "turn:", "turns:"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub connect_timeout_secs: u64,
    pub media: MediaConstraints,
    pub rtc: RtcConfig,
    pub max_early_candidates: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            media: MediaConstraints::default(),
            rtc: RtcConfig::default(),
            max_early_candidates: DEFAULT_MAX_EARLY_CANDIDATES,
        }
    }
}

impl CoordinatorConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, SignalingError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), SignalingError> {
        if self.connect_timeout_secs == 0 {
            return Err(SignalingError::Config(
                "connect_timeout_secs must be positive".to_string(),
            ));
        }
        if !self.media.video && !self.media.audio {
            return Err(SignalingError::Config(
                "media must request video or audio".to_string(),
            ));
        }
        self.rtc.validate()
    }
}

/// What to request from the capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConstraints {
    pub video: bool,
    pub audio: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }
}

/// Configuration handed to every new peer connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtcConfig {
    pub ice_servers: Vec<IceServer>,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServer {
                urls: vec![DEFAULT_STUN_SERVER.to_string()],
                username: None,
                credential: None,
            }],
        }
    }
}

impl RtcConfig {
    pub fn validate(&self) -> Result<(), SignalingError> {
        for server in &self.ice_servers {
            if server.urls.is_empty() {
                return Err(SignalingError::Config("ICE server without urls".to_string()));
            }
            for url in &server.urls {
                if url.is_empty() {
                    return Err(SignalingError::Config(
                        "ICE server URL cannot be empty".to_string(),
                    ));
                }
                if !ICE_URL_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
                    return Err(SignalingError::Config(format!(
                        "ICE server URL has no stun/turn scheme: {}",
                        url
                    )));
                }
                let has_credentials = server.username.is_some() && server.credential.is_some();
                if server_is_turn(url) && !has_credentials {
                    return Err(SignalingError::Config(format!(
                        "TURN server requires username and credential: {}",
                        url
                    )));
                }
            }
        }
        Ok(())
    }
}

fn server_is_turn(url: &str) -> bool {
    url.starts_with("turn:") || url.starts_with("turns:")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}
