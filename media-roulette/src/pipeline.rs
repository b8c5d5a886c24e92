use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classifier::ClassificationChannel;
use crate::deny_list::DenyList;
use crate::generator::LinkGenerator;
use crate::policy::{decide, Decision};
use crate::traits::ImageProbe;
use crate::types::{
    ClassifyItem, ClassifyReply, ClassifyRequest, FetchOutcome, FetchedImage, LabelFilter,
    LabelScore, PermanentReason, RenderSink, RenderedMedia, Result, RetryReason, RouletteError,
    RunRequest, RunStats, RunSummary, CLASSIFY_BATCH_MAX, DIRECT_BATCH_MAX,
};

/// Probe attempts allowed per unit of demand before a run soft-stops.
pub const DEFAULT_ATTEMPT_FACTOR: usize = 40;

/// Target size for the next classification batch: larger when no filter is
/// active (images bypass the channel entirely), smaller when filtering, and
/// never more than the remaining demand.
pub fn batch_ceiling(filter: &LabelFilter, remaining: usize) -> usize {
    let cap = if filter.is_wildcard() {
        DIRECT_BATCH_MAX
    } else {
        CLASSIFY_BATCH_MAX
    };
    cap.min(remaining)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    Filling,
    Draining,
}

/// Everything one run mutates, owned by the orchestrator and rebuilt from
/// scratch at every `run` call so no stale counters or buffers can leak
/// across runs.
struct RunState {
    request: RunRequest,
    displayed: usize,
    session_seen: HashSet<String>,
    buffer: Vec<FetchedImage>,
    batch_in_flight: bool,
    phase: RunPhase,
    stats: RunStats,
    starved: bool,
}

impl RunState {
    fn new(request: RunRequest) -> Self {
        Self {
            request,
            displayed: 0,
            session_seen: HashSet::new(),
            buffer: Vec::new(),
            batch_in_flight: false,
            phase: RunPhase::Filling,
            stats: RunStats::default(),
            starved: false,
        }
    }
}

/// Drives a run: candidate generation, concurrent fetching, batching into
/// the classification channel, acceptance, rendering, and deny-list upkeep.
pub struct Orchestrator {
    probe: Arc<dyn ImageProbe>,
    channel: ClassificationChannel,
    deny: DenyList,
    sink: Arc<dyn RenderSink>,
    generation: u64,
    rng_seed: Option<u64>,
    attempt_factor: usize,
}

impl Orchestrator {
    pub fn new(
        probe: Arc<dyn ImageProbe>,
        channel: ClassificationChannel,
        deny: DenyList,
        sink: Arc<dyn RenderSink>,
    ) -> Self {
        Self {
            probe,
            channel,
            deny,
            sink,
            generation: 0,
            rng_seed: None,
            attempt_factor: DEFAULT_ATTEMPT_FACTOR,
        }
    }

    /// Deterministic candidate generation for tests.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn with_attempt_factor(mut self, factor: usize) -> Self {
        self.attempt_factor = factor.max(1);
        self
    }

    /// Whether the classification model has reported ready.
    pub fn classification_ready(&self) -> bool {
        self.channel.is_ready()
    }

    /// Block until the classification model reports ready.
    pub async fn wait_model_ready(&mut self) -> Result<()> {
        self.channel.wait_ready().await
    }

    pub fn deny_list(&self) -> &DenyList {
        &self.deny
    }

    /// Execute one run to completion and return its summary.
    ///
    /// Each call owns a fresh `RunState` and a new generation tag; replies
    /// left over from a previous run are discarded up front, and a filtered
    /// run refuses to start before the model is ready.
    pub async fn run(&mut self, request: RunRequest) -> Result<RunSummary> {
        let requested = request.desired;
        let request = request.clamped();

        self.generation += 1;
        let generation = self.generation;
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let mut state = RunState::new(request.clone());
        while let Some(reply) = self.channel.try_next_reply() {
            if !matches!(reply, ClassifyReply::Ready) {
                debug!("Discarding reply queued by a previous run");
                state.stats.stale_replies_discarded += 1;
            }
        }

        if !request.filter.is_wildcard() && !self.channel.is_ready() {
            return Err(RouletteError::ModelNotReady);
        }

        info!(
            "Run {} started: {} items from {}, filter '{}', cutoff {:.2} (generation {})",
            run_id,
            request.desired,
            request.service,
            request.filter,
            request.confidence_cutoff,
            generation
        );

        self.deny.begin_hydration();

        let mut generator = match self.rng_seed {
            Some(seed) => LinkGenerator::with_seed(request.service, seed),
            None => LinkGenerator::new(request.service),
        };
        let attempt_budget = (request.desired.max(1) * self.attempt_factor) as u64;

        let result = self
            .run_inner(&mut state, &mut generator, generation, attempt_budget)
            .await;

        // Whatever happened, nothing buffered may outlive the run.
        for image in &mut state.buffer {
            if !image.handle.is_released() {
                image.handle.release();
            }
        }
        state.buffer.clear();

        result?;

        let summary = RunSummary {
            run_id,
            requested,
            desired: state.request.desired,
            displayed: state.displayed,
            starved: state.starved,
            started_at,
            finished_at: Utc::now(),
            stats: state.stats,
        };
        info!(
            "Run {} finished: {}/{} displayed{}",
            run_id,
            summary.displayed,
            summary.desired,
            if summary.starved { " (starved)" } else { "" }
        );
        Ok(summary)
    }

    async fn run_inner(
        &mut self,
        state: &mut RunState,
        generator: &mut LinkGenerator,
        generation: u64,
        attempt_budget: u64,
    ) -> Result<()> {
        while state.displayed < state.request.desired {
            self.deny.poll_hydration();

            let remaining = state.request.desired - state.displayed;
            let ceiling = batch_ceiling(&state.request.filter, remaining);
            let need = ceiling.saturating_sub(state.buffer.len());

            if need > 0 && !state.starved {
                if state.stats.probe_attempts >= attempt_budget {
                    warn!(
                        "Probe attempt budget ({}) exhausted with {}/{} displayed",
                        attempt_budget, state.displayed, state.request.desired
                    );
                    state.starved = true;
                } else {
                    self.fill_round(state, generator, need).await?;
                }
            }

            if !state.request.filter.is_wildcard()
                && !state.buffer.is_empty()
                && (state.buffer.len() >= ceiling || state.starved)
            {
                self.drain_batch(state, generation).await?;
            }

            if state.starved {
                break;
            }
        }
        Ok(())
    }

    /// One fill step: generate up to `need` candidates against the union of
    /// the session set and the deny snapshot, probe them concurrently, and
    /// settle the outcomes. Rejects are replaced by the next round.
    async fn fill_round(
        &mut self,
        state: &mut RunState,
        generator: &mut LinkGenerator,
        need: usize,
    ) -> Result<()> {
        debug_assert_eq!(state.phase, RunPhase::Filling);
        let mut exclude: HashSet<String> = self.deny.snapshot().clone();
        exclude.extend(state.session_seen.iter().cloned());

        let mut candidates = Vec::with_capacity(need);
        for _ in 0..need {
            match generator.next(&exclude) {
                Ok(candidate) => {
                    exclude.insert(candidate.code.clone());
                    state.session_seen.insert(candidate.code.clone());
                    candidates.push(candidate);
                }
                Err(RouletteError::RetryExhausted { attempts }) => {
                    warn!("Candidate space exhausted after {} redraws", attempts);
                    state.starved = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        if candidates.is_empty() {
            return Ok(());
        }

        let outcomes = join_all(candidates.iter().map(|candidate| {
            let probe = Arc::clone(&self.probe);
            async move { probe.probe(candidate).await }
        }))
        .await;

        let mut denied = Vec::new();
        for (candidate, outcome) in candidates.iter().zip(outcomes) {
            state.stats.probe_attempts += 1;
            match outcome {
                Ok(FetchOutcome::Accepted(image)) => {
                    if state.request.filter.is_wildcard() {
                        self.render_direct(state, image).await;
                    } else {
                        state.buffer.push(image);
                    }
                }
                Ok(FetchOutcome::RejectRetry(reason)) => {
                    match reason {
                        RetryReason::Placeholder { .. } => state.stats.placeholders += 1,
                        RetryReason::Transport(_) => state.stats.transport_retries += 1,
                        RetryReason::UndecodableBody => state.stats.undecodable += 1,
                    }
                    debug!("Transient reject for {}, replacing", candidate.code);
                }
                Ok(FetchOutcome::RejectPermanent(PermanentReason::HttpStatus(status))) => {
                    state.stats.network_rejects += 1;
                    debug!("Permanent reject for {} (HTTP {})", candidate.code, status);
                    denied.push(candidate.code.clone());
                }
                Err(e) => {
                    state.stats.transport_retries += 1;
                    warn!("Probe error for {}: {}", candidate.code, e);
                }
            }
        }

        self.deny.record_many(denied).await;
        Ok(())
    }

    /// Render an image that bypassed classification (wildcard filter).
    async fn render_direct(&mut self, state: &mut RunState, mut image: FetchedImage) {
        let media = RenderedMedia {
            link: image.link.clone(),
            width: image.width,
            height: image.height,
            label: None,
            confidence: None,
        };
        if let Err(e) = self.sink.append(media).await {
            warn!("Render sink failed for {}: {}", image.link, e);
        }
        image.handle.release();
        state.displayed += 1;
        self.deny.record_many(vec![image.code.clone()]).await;
    }

    /// Hand the buffered batch to the classification channel and settle the
    /// reply. The in-flight flag and every display handle are cleared by a
    /// barrier that runs on success, channel failure, and error paths alike.
    async fn drain_batch(&mut self, state: &mut RunState, generation: u64) -> Result<()> {
        // Single-batch backpressure: a new batch is never submitted while
        // one is outstanding.
        debug_assert!(!state.batch_in_flight);
        state.phase = RunPhase::Draining;
        let mut pending = std::mem::take(&mut state.buffer);

        // Payload ownership transfers to the channel; the pipeline keeps
        // only the display handles.
        let mut items = Vec::with_capacity(pending.len());
        for image in &mut pending {
            let payload = image.take_payload().unwrap_or_default();
            items.push(ClassifyItem {
                link: image.link.clone(),
                payload,
            });
        }

        let request = ClassifyRequest {
            generation,
            items,
            label_filter: state.request.filter.to_string(),
            confidence_cutoff: state.request.confidence_cutoff,
        };

        state.batch_in_flight = true;
        let result = self.drain_inner(state, &mut pending, generation, request).await;

        for image in &mut pending {
            if !image.handle.is_released() {
                image.handle.release();
            }
        }
        state.batch_in_flight = false;
        state.phase = RunPhase::Filling;

        result
    }

    async fn drain_inner(
        &mut self,
        state: &mut RunState,
        pending: &mut [FetchedImage],
        generation: u64,
        request: ClassifyRequest,
    ) -> Result<()> {
        let submitted = request.items.len();
        debug!(
            "Submitting batch of {} items (generation {})",
            submitted, generation
        );
        self.channel.submit(request).await?;

        loop {
            match self.channel.next_reply().await? {
                ClassifyReply::Ready => continue,
                ClassifyReply::Results {
                    generation: reply_generation,
                    scores,
                } => {
                    if reply_generation != generation {
                        state.stats.stale_replies_discarded += 1;
                        debug!(
                            "Discarding stale results from generation {}",
                            reply_generation
                        );
                        continue;
                    }
                    if scores.len() != submitted {
                        return Err(RouletteError::ChannelContract {
                            expected: submitted,
                            got: scores.len(),
                        });
                    }
                    self.settle(state, pending, &scores).await;
                    return Ok(());
                }
                ClassifyReply::Failed {
                    generation: reply_generation,
                    message,
                } => {
                    if reply_generation != generation {
                        state.stats.stale_replies_discarded += 1;
                        debug!(
                            "Discarding stale failure from generation {}",
                            reply_generation
                        );
                        continue;
                    }
                    warn!("Classification batch lost: {}", message);
                    state.stats.channel_failures += 1;
                    return Ok(());
                }
            }
        }
    }

    /// Apply the acceptance policy to each result, strictly by index.
    async fn settle(
        &mut self,
        state: &mut RunState,
        pending: &mut [FetchedImage],
        scores: &[LabelScore],
    ) {
        let mut displayed_codes = Vec::new();
        for (image, score) in pending.iter_mut().zip(scores) {
            match decide(score, &state.request.filter, state.request.confidence_cutoff) {
                Decision::Accept => {
                    let media = RenderedMedia {
                        link: image.link.clone(),
                        width: image.width,
                        height: image.height,
                        label: Some(score.label.clone()),
                        confidence: Some(score.confidence),
                    };
                    if let Err(e) = self.sink.append(media).await {
                        warn!("Render sink failed for {}: {}", image.link, e);
                    }
                    image.handle.release();
                    state.displayed += 1;
                    displayed_codes.push(image.code.clone());
                }
                Decision::RejectLabel => {
                    state.stats.label_rejects += 1;
                    image.handle.release();
                }
                Decision::RejectConfidence => {
                    state.stats.confidence_rejects += 1;
                    image.handle.release();
                }
            }
        }
        self.deny.record_many(displayed_codes).await;
    }
}
