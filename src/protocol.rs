//! # Request / result protocol
//!
//! ## Design
//!
//! The wire shapes exchanged with the caller: one inbound [`DecodeRequest`],
//! and a stream of outbound [`WorkerMessage`]s (decoded frames or a failure).
//! Field names stay camelCase on the wire; Rust code uses the snake_case fields.
//!
//! ## Implementation
//!
//! - `loadMethod` is parsed leniently: unknown or missing values fall back to
//!   single-shot loading and are never reported as errors.
//! - Durations serialize as whole milliseconds, pixel buffers as base64.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::decoder::FrameInfo;
use crate::error::LoadError;

/// Loading strategy selected by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadMethod {
    /// Fetch the whole body, decode once.
    #[default]
    Single,
    /// Re-decode on every received fragment.
    Streamed,
    /// One request per resolution level, decoded in level order.
    Tiered,
}

impl LoadMethod {
    /// Map the wire name to a method; anything unknown is single-shot.
    pub fn from_wire(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("progressive") => Self::Streamed,
            Some("tlm") => Self::Tiered,
            _ => Self::Single,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "default",
            Self::Streamed => "progressive",
            Self::Tiered => "tlm",
        }
    }
}

impl<'de> Deserialize<'de> for LoadMethod {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(Self::from_wire(raw.as_ref().and_then(|v| v.as_str())))
    }
}

impl Serialize for LoadMethod {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// `tlmDecodeLevel` value asking for every available tier.
pub const ALL_TIERS: i64 = -1;

/// Inbound decode request. Immutable once dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeRequest {
    pub url: String,
    /// Opaque caller token, echoed back on every result.
    #[serde(default)]
    pub instance: serde_json::Value,
    #[serde(default)]
    pub load_method: LoadMethod,
    /// Highest tier to fetch in tiered mode. [`ALL_TIERS`] means every level;
    /// absent or any other negative value means tier 0 only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tlm_decode_level: Option<i64>,
}

impl DecodeRequest {
    pub fn new(url: impl Into<String>, instance: serde_json::Value, load_method: LoadMethod) -> Self {
        Self {
            url: url.into(),
            instance,
            load_method,
            tlm_decode_level: None,
        }
    }

    pub fn with_tier_level(mut self, level: i64) -> Self {
        self.tlm_decode_level = Some(level);
        self
    }

    /// Caller's tier ceiling, `None` meaning "every level the resource has".
    pub fn requested_max_tier(&self) -> Option<u32> {
        match self.tlm_decode_level {
            Some(ALL_TIERS) => None,
            Some(level) if level >= 0 => Some(u32::try_from(level).unwrap_or(u32::MAX)),
            _ => Some(0),
        }
    }

    /// Parse one JSON request line.
    pub fn from_json(line: &str) -> Result<Self, LoadError> {
        let request: Self = serde_json::from_str(line)
            .map_err(|e| LoadError::InvalidRequest(format!("malformed request: {}", e)))?;
        if request.url.trim().is_empty() {
            return Err(LoadError::InvalidRequest("request url is empty".to_string()));
        }
        Ok(request)
    }

    /// The `url` of a request line that [`DecodeRequest::from_json`] rejected,
    /// when the line still carries one.
    pub fn url_of_rejected(line: &str) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(line).ok()?;
        value.get("url")?.as_str().map(str::to_string)
    }
}

/// One decoded frame. Many may be emitted per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeResult {
    pub url: String,
    pub instance: serde_json::Value,
    pub frame_info: FrameInfo,
    /// Decoded pixels, owned by the receiver.
    #[serde(serialize_with = "serialize_base64")]
    pub buffer: Vec<u8>,
    /// Bytes handed to the decoder for this pass.
    pub encoded_size: usize,
    #[serde(serialize_with = "serialize_opt_millis", skip_serializing_if = "Option::is_none")]
    pub fetch_time: Option<Duration>,
    #[serde(serialize_with = "serialize_millis")]
    pub decode_time: Duration,
    /// Tier this frame was decoded through (tiered mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    /// Level index → encoded byte size, only on the level-0 tiered result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decomposition_data: Option<BTreeMap<u32, u64>>,
}

/// Terminal failure of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeFailure {
    pub url: String,
    pub error: String,
    pub code: &'static str,
    pub stage: &'static str,
}

impl DecodeFailure {
    pub fn new(url: impl Into<String>, error: &LoadError) -> Self {
        Self {
            url: url.into(),
            error: error.to_string(),
            code: error.code(),
            stage: error.stage(),
        }
    }
}

/// Everything the worker sends back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WorkerMessage {
    Frame(DecodeResult),
    Failure(DecodeFailure),
}

impl WorkerMessage {
    pub fn url(&self) -> &str {
        match self {
            Self::Frame(result) => &result.url,
            Self::Failure(failure) => &failure.url,
        }
    }

    pub fn as_frame(&self) -> Option<&DecodeResult> {
        match self {
            Self::Frame(result) => Some(result),
            Self::Failure(_) => None,
        }
    }

    pub fn as_failure(&self) -> Option<&DecodeFailure> {
        match self {
            Self::Failure(failure) => Some(failure),
            Self::Frame(_) => None,
        }
    }

    pub fn to_json_line(&self) -> Result<String, LoadError> {
        serde_json::to_string(self)
            .map_err(|e| LoadError::Worker(format!("cannot serialize result: {}", e)))
    }
}

fn serialize_base64<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
}

fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

fn serialize_opt_millis<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match duration {
        Some(duration) => serialize_millis(duration, serializer),
        None => serializer.serialize_none(),
    }
}
