use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One label with the model's confidence in it, in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub confidence: f32,
}

/// One image handed over for classification. The payload is owned by the
/// receiver for the duration of the batch; the sender keeps no copy.
#[derive(Debug)]
pub struct ClassifyItem {
    pub link: String,
    pub payload: Vec<u8>,
}

/// An ordered batch of images plus the active filter settings.
///
/// `generation` identifies the run that submitted the batch; it is echoed
/// verbatim in the reply so late replies from an earlier run can be told
/// apart from current ones.
#[derive(Debug)]
pub struct ClassifyRequest {
    pub generation: u64,
    pub items: Vec<ClassifyItem>,
    pub label_filter: String,
    pub confidence_cutoff: f32,
}

/// Replies flowing back from the classification worker.
#[derive(Debug, Clone)]
pub enum ClassifyReply {
    /// Sent once, unsolicited, when the model has finished initializing.
    Ready,
    /// One score per submitted item, in submission order.
    Results {
        generation: u64,
        scores: Vec<LabelScore>,
    },
    /// The whole batch is lost.
    Failed { generation: u64, message: String },
}

/// Media accepted for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedMedia {
    pub link: String,
    pub width: u32,
    pub height: u32,
    pub label: Option<String>,
    pub confidence: Option<f32>,
}

// Object style note:
// Implementations of these traits are external collaborators: the persistent
// store, the model runtime, and the visible surface all live outside the
// pipeline. The pipeline only relies on the contracts below and must keep
// working (possibly degraded) when a collaborator fails.

/// Bounded persistent set of already-consumed identifiers.
#[async_trait]
pub trait DenyStore: Send + Sync {
    /// Load every stored identifier.
    async fn load_all(&self) -> Result<Vec<String>>;

    /// Store identifiers, evicting the oldest entries once the configured
    /// ceiling is exceeded.
    async fn put_many(&self, codes: &[String]) -> Result<()>;
}

/// The pre-trained image classification model.
#[async_trait]
pub trait Classifier: Send + Sync {
    fn model_name(&self) -> String;

    /// Initialize the model. Classification requests must not be issued
    /// before this returns.
    async fn load(&self) -> Result<()>;

    /// Classify a batch, returning exactly one score per item, in the same
    /// order. Takes ownership of the payloads.
    async fn classify(&self, items: Vec<ClassifyItem>) -> Result<Vec<LabelScore>>;
}

/// The surface accepted media is appended to.
#[async_trait]
pub trait RenderSink: Send + Sync {
    async fn append(&self, media: RenderedMedia) -> Result<()>;
}
