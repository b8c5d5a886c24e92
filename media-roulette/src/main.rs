use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use media_roulette::{
    ClassificationChannel, DenyList, HandleRegistry, HttpImageProbe, ImageService, LabelFilter,
    LogRenderer, MockClassifier, Orchestrator, ProbeConfig, RunRequest,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "media-roulette", about = "Random media discovery pipeline")]
struct Args {
    /// How many images to display.
    #[arg(long, default_value_t = 12)]
    count: usize,

    /// Content service to probe: imgur or postimg.
    #[arg(long, default_value = "imgur")]
    service: String,

    /// Label filter: 'all' for no filtering, or a label such as 'sfw'.
    #[arg(long, default_value = "all")]
    filter: String,

    /// Minimum classifier confidence for filtered runs, in [0, 1].
    #[arg(long, default_value_t = 0.75)]
    confidence: f32,

    /// Sqlite file backing the deny list.
    #[arg(long, default_value = "sqlite://roulette-deny.db")]
    deny_db: String,

    /// Maximum deny-list entries kept before the oldest are evicted.
    #[arg(long, default_value_t = 512)]
    deny_cap: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let service = ImageService::from_str(&args.service)?;
    let filter = LabelFilter::from_str(&args.filter)?;

    info!("Starting media roulette against {}", service);

    let handles = HandleRegistry::new();
    let probe = HttpImageProbe::new(ProbeConfig::default(), service, Arc::clone(&handles))?;
    let channel = ClassificationChannel::spawn(Box::new(MockClassifier::new("default")));
    let deny = DenyList::open_or_memory(&args.deny_db, args.deny_cap).await;

    let mut orchestrator = Orchestrator::new(
        Arc::new(probe),
        channel,
        deny,
        Arc::new(LogRenderer::default()),
    );

    if !filter.is_wildcard() {
        info!("Waiting for the classification model");
        orchestrator.wait_model_ready().await?;
    }

    let request = RunRequest {
        desired: args.count,
        service,
        filter,
        confidence_cutoff: args.confidence,
    };

    let summary = orchestrator.run(request).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if handles.outstanding() > 0 || handles.double_releases() > 0 {
        anyhow::bail!(
            "display handle accounting broken: {} outstanding, {} double releases",
            handles.outstanding(),
            handles.double_releases()
        );
    }

    Ok(())
}
