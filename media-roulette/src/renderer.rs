use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::types::{RenderSink, RenderedMedia};

/// Render sink that logs accepted media instead of drawing it.
#[derive(Debug, Default)]
pub struct LogRenderer;

#[async_trait]
impl RenderSink for LogRenderer {
    async fn append(&self, media: RenderedMedia) -> Result<()> {
        match (&media.label, media.confidence) {
            (Some(label), Some(confidence)) => info!(
                "Rendered {} ({}x{}, {} @ {:.2})",
                media.link, media.width, media.height, label, confidence
            ),
            _ => info!("Rendered {} ({}x{})", media.link, media.width, media.height),
        }
        Ok(())
    }
}

/// Render sink that collects accepted media for inspection in tests.
#[derive(Debug, Default)]
pub struct CollectingRenderer {
    items: Mutex<Vec<RenderedMedia>>,
}

impl CollectingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered(&self) -> Vec<RenderedMedia> {
        self.items.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RenderSink for CollectingRenderer {
    async fn append(&self, media: RenderedMedia) -> Result<()> {
        self.items.lock().unwrap().push(media);
        Ok(())
    }
}
