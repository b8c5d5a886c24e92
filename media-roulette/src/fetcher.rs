use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::GenericImageView;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::handles::{DisplayHandle, HandleRegistry};
use crate::traits::ImageProbe;
use crate::types::{
    Candidate, FetchOutcome, FetchedImage, ImageService, PermanentReason, ProbeConfig, Result,
    RetryReason,
};

/// Fetches candidate links over HTTP and triages the response: permanent
/// failures for non-success statuses, transient rejects for transport
/// problems and the host's fixed-size placeholder, accepted otherwise.
pub struct HttpImageProbe {
    client: Client,
    service: ImageService,
    handles: Arc<HandleRegistry>,
}

impl HttpImageProbe {
    pub fn new(
        config: ProbeConfig,
        service: ImageService,
        handles: Arc<HandleRegistry>,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            service,
            handles,
        })
    }
}

#[async_trait]
impl ImageProbe for HttpImageProbe {
    async fn probe(&self, candidate: &Candidate) -> Result<FetchOutcome> {
        let url = Url::parse(&candidate.link)?;
        debug!("Probing candidate: {}", candidate.link);

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Transport error for {}: {}", candidate.link, e);
                return Ok(FetchOutcome::RejectRetry(RetryReason::Transport(
                    e.to_string(),
                )));
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!("Candidate {} answered HTTP {}", candidate.code, status);
            return Ok(FetchOutcome::RejectPermanent(PermanentReason::HttpStatus(
                status.as_u16(),
            )));
        }

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Body read failed for {}: {}", candidate.link, e);
                return Ok(FetchOutcome::RejectRetry(RetryReason::Transport(
                    e.to_string(),
                )));
            }
        };

        let (width, height) = match image::load_from_memory(&bytes) {
            Ok(decoded) => decoded.dimensions(),
            Err(e) => {
                warn!("Undecodable body for {}: {}", candidate.link, e);
                return Ok(FetchOutcome::RejectRetry(RetryReason::UndecodableBody));
            }
        };

        if (width, height) == self.service.placeholder_dims() {
            debug!("Placeholder {}x{} for {}", width, height, candidate.code);
            return Ok(FetchOutcome::RejectRetry(RetryReason::Placeholder {
                width,
                height,
            }));
        }

        let handle = DisplayHandle::new(&self.handles);
        let image = FetchedImage::new(candidate, bytes.to_vec(), width, height, handle);
        debug!(
            "Accepted {} ({} bytes, {}x{})",
            candidate.code,
            bytes.len(),
            width,
            height
        );
        Ok(FetchOutcome::Accepted(image))
    }
}
