use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::types::{
    ClassifyItem, ClassifyReply, ClassifyRequest, Classifier, LabelScore, Result, RouletteError,
};

const REPLY_BUFFER: usize = 16;
const REQUEST_BUFFER: usize = 4;

/// Message-passing boundary to the classification collaborator.
///
/// The classifier runs in its own spawned task; the pipeline talks to it
/// purely through channels. One `Ready` reply is sent, unsolicited, when the
/// model finishes loading; afterwards each submitted request yields exactly
/// one `Results` or `Failed` reply carrying the request's generation tag.
pub struct ClassificationChannel {
    requests: mpsc::Sender<ClassifyRequest>,
    replies: mpsc::Receiver<ClassifyReply>,
    ready: watch::Receiver<bool>,
}

impl ClassificationChannel {
    /// Spawn the worker task around a classifier and return the pipeline's
    /// end of the channel.
    pub fn spawn(classifier: Box<dyn Classifier>) -> Self {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_BUFFER);
        let (reply_tx, reply_rx) = mpsc::channel(REPLY_BUFFER);
        let (ready_tx, ready_rx) = watch::channel(false);

        tokio::spawn(worker(classifier, request_rx, reply_tx, ready_tx));

        Self {
            requests: request_tx,
            replies: reply_rx,
            ready: ready_rx,
        }
    }

    /// Whether the model has finished initializing. Filtered runs must not
    /// submit before this is true.
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait until the model reports ready.
    pub async fn wait_ready(&mut self) -> Result<()> {
        while !*self.ready.borrow_and_update() {
            self.ready
                .changed()
                .await
                .map_err(|_| RouletteError::ChannelClosed)?;
        }
        Ok(())
    }

    pub async fn submit(&self, request: ClassifyRequest) -> Result<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| RouletteError::ChannelClosed)
    }

    /// Receive the next reply, blocking until one arrives.
    pub async fn next_reply(&mut self) -> Result<ClassifyReply> {
        self.replies
            .recv()
            .await
            .ok_or(RouletteError::ChannelClosed)
    }

    /// Drain any reply already queued without waiting. Used at run start to
    /// flush leftovers from a previous run.
    pub fn try_next_reply(&mut self) -> Option<ClassifyReply> {
        self.replies.try_recv().ok()
    }
}

async fn worker(
    classifier: Box<dyn Classifier>,
    mut requests: mpsc::Receiver<ClassifyRequest>,
    replies: mpsc::Sender<ClassifyReply>,
    ready: watch::Sender<bool>,
) {
    match classifier.load().await {
        Ok(()) => {
            info!("Classification model ready: {}", classifier.model_name());
            let _ = ready.send(true);
            if replies.send(ClassifyReply::Ready).await.is_err() {
                return;
            }
        }
        Err(e) => {
            // The ready flag stays false; filtered runs keep refusing.
            error!("Failed to load classification model: {}", e);
            return;
        }
    }

    while let Some(request) = requests.recv().await {
        let generation = request.generation;
        let submitted = request.items.len();
        debug!(
            "Classifying batch of {} items (generation {}, filter '{}')",
            submitted, generation, request.label_filter
        );

        let reply = match classifier.classify(request.items).await {
            Ok(scores) => ClassifyReply::Results { generation, scores },
            Err(e) => ClassifyReply::Failed {
                generation,
                message: e.to_string(),
            },
        };

        if replies.send(reply).await.is_err() {
            break;
        }
    }
}

/// Scripted behavior for one batch submitted to the mock classifier.
#[derive(Debug, Clone)]
pub enum BatchScript {
    Scores(Vec<LabelScore>),
    Fail(String),
}

/// Mock classifier for development and testing.
///
/// Scripted batches are consumed in order; once the script is exhausted, a
/// deterministic per-payload rule takes over so unscripted runs still
/// produce stable results.
pub struct MockClassifier {
    name: String,
    load_delay_ms: u64,
    response_delay_ms: u64,
    batches: Mutex<VecDeque<BatchScript>>,
}

impl MockClassifier {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            load_delay_ms: 0,
            response_delay_ms: 0,
            batches: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_load_delay(mut self, delay_ms: u64) -> Self {
        self.load_delay_ms = delay_ms;
        self
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.response_delay_ms = delay_ms;
        self
    }

    pub fn with_batches(self, batches: Vec<BatchScript>) -> Self {
        self.batches.lock().unwrap().extend(batches);
        self
    }

    fn fallback_score(item: &ClassifyItem) -> LabelScore {
        let sum: u64 = item.payload.iter().map(|b| u64::from(*b)).sum();
        let label = if sum % 2 == 0 { "sfw" } else { "nsfw" };
        LabelScore {
            label: label.to_string(),
            confidence: 0.5 + (sum % 50) as f32 / 100.0,
        }
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    fn model_name(&self) -> String {
        format!("mock-nsfw-detector ({})", self.name)
    }

    async fn load(&self) -> anyhow::Result<()> {
        if self.load_delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.load_delay_ms)).await;
        }
        Ok(())
    }

    async fn classify(&self, items: Vec<ClassifyItem>) -> anyhow::Result<Vec<LabelScore>> {
        if self.response_delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.response_delay_ms)).await;
        }

        let scripted = self.batches.lock().unwrap().pop_front();
        match scripted {
            Some(BatchScript::Scores(scores)) => Ok(scores),
            Some(BatchScript::Fail(message)) => Err(anyhow!(message)),
            None => Ok(items.iter().map(Self::fallback_score).collect()),
        }
    }
}
