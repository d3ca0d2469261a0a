//! # Configuration
//!
//! ## Design
//!
//! Every tunable of the fetch and decode stages lives in `LoaderConfig`, so a
//! worker's behaviour is observable and testable from one place.
//!
//! ## Implementation
//!
//! - `Default` gives production-ready values.
//! - Fields deserialize with per-field defaults, so a partial JSON file only
//!   overrides what it names.
//! - `validate` range-checks the values before the worker starts.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::decoder::MAX_DECOMPOSITION_LEVELS;
use crate::error::LoadError;

/// Environment variable naming an optional JSON config file.
pub const CONFIG_PATH_ENV: &str = "PROGRESSIVE_LOADER_CONFIG";

/// Loader and transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoaderConfig {
    /// Whole-request timeout for body fetches (seconds).
    pub request_timeout_secs: u64,
    /// TCP/TLS connect timeout (seconds).
    pub connect_timeout_secs: u64,
    /// Wait for the first fragment of a streamed body (milliseconds).
    pub stream_first_byte_timeout_ms: u64,
    /// Wait between two fragments of a streamed body (milliseconds).
    pub stream_chunk_timeout_ms: u64,
    /// Redirect hops the HTTP client follows before giving up.
    pub max_redirects: usize,
    /// Maximum encoded bytes fetched for one request.
    pub max_encoded_bytes: u64,
    /// Pixel budget (`width * height`) for the raster decoder.
    pub max_decoded_pixels: u64,
    /// Ceiling on the decomposition levels a header may claim.
    pub max_decomposition_levels: u32,
    /// Query key carrying the first tier of a tiered request.
    pub start_level_param: String,
    /// Query key carrying the last tier of a tiered request.
    pub end_level_param: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            connect_timeout_secs: 8,
            stream_first_byte_timeout_ms: 10_000,
            stream_chunk_timeout_ms: 15_000,
            max_redirects: 5,
            max_encoded_bytes: 256 * 1024 * 1024,
            max_decoded_pixels: 100_000_000,
            max_decomposition_levels: MAX_DECOMPOSITION_LEVELS,
            start_level_param: "startLevel".to_string(),
            end_level_param: "endLevel".to_string(),
        }
    }
}

impl LoaderConfig {
    /// Load from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LoadError::InvalidRequest(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            LoadError::InvalidRequest(format!("cannot parse config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the file named by [`CONFIG_PATH_ENV`], or defaults when unset.
    pub fn from_env() -> Result<Self, LoadError> {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        if !(1..=600).contains(&self.request_timeout_secs) {
            return Err(LoadError::InvalidRequest(
                "requestTimeoutSecs must be within 1..=600".to_string(),
            ));
        }
        if !(1..=120).contains(&self.connect_timeout_secs) {
            return Err(LoadError::InvalidRequest(
                "connectTimeoutSecs must be within 1..=120".to_string(),
            ));
        }
        if !(100..=120_000).contains(&self.stream_first_byte_timeout_ms) {
            return Err(LoadError::InvalidRequest(
                "streamFirstByteTimeoutMs must be within 100..=120000".to_string(),
            ));
        }
        if !(100..=120_000).contains(&self.stream_chunk_timeout_ms) {
            return Err(LoadError::InvalidRequest(
                "streamChunkTimeoutMs must be within 100..=120000".to_string(),
            ));
        }
        if self.max_encoded_bytes == 0 {
            return Err(LoadError::InvalidRequest(
                "maxEncodedBytes must be positive".to_string(),
            ));
        }
        if self.max_decoded_pixels == 0 {
            return Err(LoadError::InvalidRequest(
                "maxDecodedPixels must be positive".to_string(),
            ));
        }
        if !(1..=MAX_DECOMPOSITION_LEVELS).contains(&self.max_decomposition_levels) {
            return Err(LoadError::InvalidRequest(format!(
                "maxDecompositionLevels must be within 1..={}",
                MAX_DECOMPOSITION_LEVELS
            )));
        }
        if self.start_level_param.is_empty() || self.end_level_param.is_empty() {
            return Err(LoadError::InvalidRequest(
                "tier query parameter names must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn stream_first_byte_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_first_byte_timeout_ms)
    }

    pub fn stream_chunk_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_chunk_timeout_ms)
    }
}
