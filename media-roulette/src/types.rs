use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handles::DisplayHandle;

// Use the interfaces crate for the collaborator contract types
pub use interfaces::defs::{
    ClassifyItem, ClassifyReply, ClassifyRequest, Classifier, DenyStore, LabelScore, RenderSink,
    RenderedMedia,
};

/// Hard ceiling on displayed items per run, regardless of requested count.
pub const MAX_DISPLAYED: usize = 100;

/// Batch ceiling when no classification filter is active (images are
/// displayed directly and never enter the channel).
pub const DIRECT_BATCH_MAX: usize = 20;

/// Batch ceiling when a classification filter is active, bounding peak
/// memory and model load.
pub const CLASSIFY_BATCH_MAX: usize = 8;

/// Supported media-hosting services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageService {
    Imgur,
    PostImg,
}

impl ImageService {
    /// Length of the random code for this service.
    pub fn code_len(&self) -> usize {
        match self {
            ImageService::Imgur => 5,
            ImageService::PostImg => 6,
        }
    }

    /// Direct-fetch URL for a code.
    pub fn link_for(&self, code: &str) -> String {
        match self {
            ImageService::Imgur => format!("https://i.imgur.com/{}.jpg", code),
            ImageService::PostImg => format!("https://i.postimg.cc/{}.jpg", code),
        }
    }

    /// Fixed dimensions of the sentinel image the host returns for a code
    /// with no resource behind it.
    pub fn placeholder_dims(&self) -> (u32, u32) {
        match self {
            ImageService::Imgur => (161, 81),
            ImageService::PostImg => (300, 200),
        }
    }
}

impl fmt::Display for ImageService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageService::Imgur => write!(f, "imgur"),
            ImageService::PostImg => write!(f, "postimg"),
        }
    }
}

impl FromStr for ImageService {
    type Err = RouletteError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "imgur" => Ok(ImageService::Imgur),
            "postimg" => Ok(ImageService::PostImg),
            other => Err(RouletteError::General(format!(
                "unknown service '{}', expected 'imgur' or 'postimg'",
                other
            ))),
        }
    }
}

/// Label filter applied to classification results. `All` is the wildcard:
/// images are displayed without classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelFilter {
    All,
    Only(String),
}

impl LabelFilter {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, LabelFilter::All)
    }
}

impl fmt::Display for LabelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelFilter::All => write!(f, "all"),
            LabelFilter::Only(label) => write!(f, "{}", label),
        }
    }
}

impl FromStr for LabelFilter {
    type Err = RouletteError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(RouletteError::General("empty label filter".to_string()));
        }
        if trimmed.eq_ignore_ascii_case("all") {
            Ok(LabelFilter::All)
        } else {
            Ok(LabelFilter::Only(trimmed.to_string()))
        }
    }
}

/// A generated identifier plus its derived fetch URL, awaiting a probe.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub code: String,
    pub link: String,
}

/// A successfully fetched image, owner of its payload until the payload is
/// transferred to the classification channel, and of a display handle that
/// must be released exactly once.
#[derive(Debug)]
pub struct FetchedImage {
    pub code: String,
    pub link: String,
    payload: Option<Vec<u8>>,
    pub handle: DisplayHandle,
    pub width: u32,
    pub height: u32,
}

impl FetchedImage {
    pub fn new(
        candidate: &Candidate,
        payload: Vec<u8>,
        width: u32,
        height: u32,
        handle: DisplayHandle,
    ) -> Self {
        Self {
            code: candidate.code.clone(),
            link: candidate.link.clone(),
            payload: Some(payload),
            handle,
            width,
            height,
        }
    }

    /// Transfer ownership of the raw payload. After the first call the
    /// sender side holds nothing; subsequent calls return `None`.
    pub fn take_payload(&mut self) -> Option<Vec<u8>> {
        self.payload.take()
    }

    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }
}

/// Transient reject reasons; each triggers exactly one replacement fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryReason {
    /// The host answered with its fixed "no such resource" sentinel.
    Placeholder { width: u32, height: u32 },
    /// The request itself failed before a status was obtained.
    Transport(String),
    /// The body could not be decoded as an image.
    UndecodableBody,
}

/// Permanent reject reasons; the identifier is deny-listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermanentReason {
    HttpStatus(u16),
}

/// Outcome of probing one candidate.
#[derive(Debug)]
pub enum FetchOutcome {
    Accepted(FetchedImage),
    RejectRetry(RetryReason),
    RejectPermanent(PermanentReason),
}

/// Demand-facing configuration for one run, as supplied by the UI layer.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub desired: usize,
    pub service: ImageService,
    pub filter: LabelFilter,
    pub confidence_cutoff: f32,
}

impl RunRequest {
    /// Clamp the request into its valid domain: count to the hard maximum,
    /// cutoff into [0, 1].
    pub fn clamped(mut self) -> Self {
        self.desired = self.desired.min(MAX_DISPLAYED);
        self.confidence_cutoff = self.confidence_cutoff.clamp(0.0, 1.0);
        self
    }
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            desired: 12,
            service: ImageService::Imgur,
            filter: LabelFilter::All,
            confidence_cutoff: 0.75,
        }
    }
}

/// HTTP probe configuration.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_redirects: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            user_agent: "media-roulette/0.1".to_string(),
            timeout_seconds: 20,
            max_redirects: 3,
        }
    }
}

/// Per-run counters, one per taxonomy outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub probe_attempts: u64,
    pub placeholders: u64,
    pub transport_retries: u64,
    pub undecodable: u64,
    pub network_rejects: u64,
    pub label_rejects: u64,
    pub confidence_rejects: u64,
    pub channel_failures: u64,
    pub stale_replies_discarded: u64,
}

/// What one run did, returned at `Idle` termination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub requested: usize,
    pub desired: usize,
    pub displayed: usize,
    /// True when the candidate space or the classifier starved progress
    /// before demand was met.
    pub starved: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stats: RunStats,
}

#[derive(Debug, thiserror::Error)]
pub enum RouletteError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("classification channel closed")]
    ChannelClosed,

    #[error("classification batch mismatch: submitted {expected} items, got {got} results")]
    ChannelContract { expected: usize, got: usize },

    #[error("classification model is not ready")]
    ModelNotReady,

    #[error("retries exhausted after {attempts} attempts")]
    RetryExhausted { attempts: usize },

    #[error("{0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, RouletteError>;
