//! # Progressive loader — library entry
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  caller (viewer / JSON-lines stdin)                          │
//! └───────┬──────────────────────────────────────▲───────────────┘
//!         │ DecodeRequest                        │ WorkerMessage
//! ┌───────▼──────────────────────────────────────┴───────────────┐
//! │  dispatch ── readiness gate + ordered queue                  │
//! │     │                                                        │
//! │     ├─ loader::single    whole body, one decode              │
//! │     ├─ loader::streamed  re-decode per fragment              │
//! │     └─ loader::tiered    per-level requests, ordered emits   │
//! │            │                                                 │
//! │            ├─ tier       TierBuffer, tier URLs, clamp        │
//! │            └─ assemble   fragment concatenation              │
//! │                                                              │
//! │  transport ── Fetcher (reqwest)    decoder ── DecoderHandle   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Role |
//! |--------|------|
//! | [`error`] | `LoadError`, the single error type |
//! | [`config`] | `LoaderConfig` timeouts, limits, tier query names |
//! | [`protocol`] | request / result wire types |
//! | [`assemble`] | buffer assembly |
//! | [`decoder`] | decode engine trait, exclusive handle, raster engine |
//! | [`transport`] | fetch trait and HTTP implementation |
//! | [`tier`] | tiered-request bookkeeping |
//! | [`loader`] | the three loading strategies |
//! | [`dispatch`] | `Worker`: readiness gate and routing |

pub mod assemble;
pub mod config;
pub mod decoder;
pub mod dispatch;
pub mod error;
pub mod loader;
pub mod protocol;
pub mod tier;
pub mod transport;

pub use config::LoaderConfig;
pub use decoder::{DecodedFrame, Decoder, DecoderHandle, FrameInfo, RasterDecoder};
pub use dispatch::{Readiness, Worker};
pub use error::LoadError;
pub use loader::{Emitter, LoadContext};
pub use protocol::{ALL_TIERS, DecodeFailure, DecodeRequest, DecodeResult, LoadMethod, WorkerMessage};
pub use transport::{ChunkStream, Fetcher, HttpFetcher};
