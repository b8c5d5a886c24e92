// Shared test doubles and helpers for the pipeline tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use media_roulette::handles::{DisplayHandle, HandleRegistry};
use media_roulette::traits::ImageProbe;
use media_roulette::types::{
    Candidate, FetchOutcome, FetchedImage, PermanentReason, Result, RetryReason,
};

/// What the scripted probe should answer for one candidate.
#[derive(Debug, Clone)]
pub enum ProbeScript {
    Image {
        payload: Vec<u8>,
        width: u32,
        height: u32,
    },
    Placeholder,
    HttpError(u16),
    Transport,
}

impl ProbeScript {
    /// A small valid image answer.
    pub fn image() -> Self {
        ProbeScript::Image {
            payload: vec![1, 2, 3, 4],
            width: 640,
            height: 480,
        }
    }
}

/// Probe double that answers from a script, then from a configurable
/// default once the script runs out.
pub struct ScriptedProbe {
    scripts: Mutex<VecDeque<ProbeScript>>,
    default: ProbeScript,
    handles: Arc<HandleRegistry>,
}

impl ScriptedProbe {
    pub fn new(scripts: Vec<ProbeScript>, handles: Arc<HandleRegistry>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            default: ProbeScript::image(),
            handles,
        }
    }

    /// A probe that accepts every candidate with a stock image.
    pub fn endless(handles: Arc<HandleRegistry>) -> Self {
        Self::new(Vec::new(), handles)
    }

    /// Change what happens after the script is exhausted.
    pub fn with_default(mut self, default: ProbeScript) -> Self {
        self.default = default;
        self
    }
}

#[async_trait]
impl ImageProbe for ScriptedProbe {
    async fn probe(&self, candidate: &Candidate) -> Result<FetchOutcome> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());

        Ok(match script {
            ProbeScript::Image {
                payload,
                width,
                height,
            } => FetchOutcome::Accepted(FetchedImage::new(
                candidate,
                payload,
                width,
                height,
                DisplayHandle::new(&self.handles),
            )),
            ProbeScript::Placeholder => FetchOutcome::RejectRetry(RetryReason::Placeholder {
                width: 161,
                height: 81,
            }),
            ProbeScript::HttpError(status) => {
                FetchOutcome::RejectPermanent(PermanentReason::HttpStatus(status))
            }
            ProbeScript::Transport => {
                FetchOutcome::RejectRetry(RetryReason::Transport("connection reset".to_string()))
            }
        })
    }
}
