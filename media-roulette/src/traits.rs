use crate::types::{Candidate, FetchOutcome, Result};
use async_trait::async_trait;

/// Trait for probing candidate links and triaging the response.
///
/// The HTTP implementation lives in `fetcher`; tests drive the pipeline with
/// scripted probes.
#[async_trait]
pub trait ImageProbe: Send + Sync {
    /// Fetch one candidate and classify the outcome as accepted, transient
    /// reject, or permanent reject.
    async fn probe(&self, candidate: &Candidate) -> Result<FetchOutcome>;
}
