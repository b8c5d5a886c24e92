use std::collections::HashSet;

use interfaces::{DenyStore, MemoryDenyStore, SqliteDenyStore};
use media_roulette::{
    batch_ceiling, decide, Candidate, Decision, DisplayHandle, FetchedImage, HandleRegistry,
    ImageService, LabelFilter, LabelScore, LinkGenerator, Result, RouletteError, RunRequest,
    CLASSIFY_BATCH_MAX, DIRECT_BATCH_MAX, MAX_DISPLAYED,
};
use uuid::Uuid;

fn score(label: &str, confidence: f32) -> LabelScore {
    LabelScore {
        label: label.to_string(),
        confidence,
    }
}

#[test]
fn test_policy_rejects_low_confidence_match() {
    let filter = LabelFilter::Only("nsfw".to_string());
    let decision = decide(&score("nsfw", 0.60), &filter, 0.75);
    assert_eq!(decision, Decision::RejectConfidence);
}

#[test]
fn test_policy_label_mismatch_dominates_confidence() {
    let filter = LabelFilter::Only("nsfw".to_string());
    let decision = decide(&score("sfw", 0.99), &filter, 0.75);
    assert_eq!(
        decision,
        Decision::RejectLabel,
        "A wrong label must reject before confidence is even considered"
    );
}

#[test]
fn test_policy_wildcard_accepts_anything() {
    assert_eq!(decide(&score("sfw", 0.01), &LabelFilter::All, 0.99), Decision::Accept);
    assert_eq!(decide(&score("nsfw", 0.99), &LabelFilter::All, 0.0), Decision::Accept);
}

#[test]
fn test_policy_label_comparison_is_case_insensitive() {
    let filter = LabelFilter::Only("NSFW".to_string());
    assert_eq!(decide(&score("nsfw", 0.9), &filter, 0.75), Decision::Accept);
    assert_eq!(decide(&score("NsFw", 0.9), &filter, 0.75), Decision::Accept);
}

#[test]
fn test_policy_is_pure_and_idempotent() {
    let filter = LabelFilter::Only("nsfw".to_string());
    let input = score("nsfw", 0.80);
    let first = decide(&input, &filter, 0.75);
    let second = decide(&input, &filter, 0.75);
    assert_eq!(first, second);
    assert_eq!(first, Decision::Accept);
}

#[test]
fn test_generator_code_shape_per_service() -> Result<()> {
    let empty = HashSet::new();

    let mut imgur = LinkGenerator::with_seed(ImageService::Imgur, 1);
    let candidate = imgur.next(&empty)?;
    assert_eq!(candidate.code.len(), 5);
    assert!(candidate.code.chars().all(|c| c.is_ascii_alphanumeric()));
    assert_eq!(
        candidate.link,
        format!("https://i.imgur.com/{}.jpg", candidate.code)
    );

    let mut postimg = LinkGenerator::with_seed(ImageService::PostImg, 1);
    let candidate = postimg.next(&empty)?;
    assert_eq!(candidate.code.len(), 6);
    assert_eq!(
        candidate.link,
        format!("https://i.postimg.cc/{}.jpg", candidate.code)
    );
    Ok(())
}

#[test]
fn test_generator_redraws_on_collision() -> Result<()> {
    let empty = HashSet::new();
    let mut reference = LinkGenerator::with_seed(ImageService::Imgur, 42);
    let first = reference.next(&empty)?;
    let second = reference.next(&empty)?;

    // Same seed, but the first draw is excluded: the generator must re-draw
    // and land on the reference stream's second code.
    let mut excluded: HashSet<String> = HashSet::new();
    excluded.insert(first.code.clone());
    let mut generator = LinkGenerator::with_seed(ImageService::Imgur, 42);
    let candidate = generator.next(&excluded)?;
    assert_eq!(candidate.code, second.code);
    Ok(())
}

#[test]
fn test_generator_bounded_retries_fail_instead_of_spinning() -> Result<()> {
    let empty = HashSet::new();
    let mut reference = LinkGenerator::with_seed(ImageService::Imgur, 9);
    let mut excluded = HashSet::new();
    for _ in 0..3 {
        excluded.insert(reference.next(&empty)?.code);
    }

    let mut generator = LinkGenerator::with_seed(ImageService::Imgur, 9).with_max_attempts(3);
    let result = generator.next(&excluded);
    assert!(
        matches!(result, Err(RouletteError::RetryExhausted { attempts: 3 })),
        "An exhausted exclude set must fail fast, not spin"
    );
    Ok(())
}

#[tokio::test]
async fn test_memory_deny_store_evicts_oldest_first() -> anyhow::Result<()> {
    let store = MemoryDenyStore::new(3);
    store.put_many(&[
        "A".to_string(),
        "B".to_string(),
        "C".to_string(),
        "D".to_string(),
    ])
    .await?;

    let codes = store.load_all().await?;
    assert_eq!(codes, vec!["B", "C", "D"], "Oldest entry must be evicted");
    assert_eq!(store.len().await, 3);
    Ok(())
}

#[test]
fn test_memory_deny_store_ignores_duplicates() {
    let store = MemoryDenyStore::new(3);
    tokio_test::block_on(async {
        store
            .put_many(&["A".to_string(), "A".to_string()])
            .await
            .unwrap();
        store.put_many(&["A".to_string()]).await.unwrap();
        assert_eq!(store.load_all().await.unwrap(), vec!["A"]);
    });
}

#[tokio::test]
async fn test_sqlite_deny_store_evicts_and_persists() -> anyhow::Result<()> {
    let path = std::env::temp_dir().join(format!("deny-{}.db", Uuid::new_v4()));
    let url = format!("sqlite://{}", path.display());

    {
        let store = SqliteDenyStore::connect(&url, 3).await?;
        store
            .put_many(&[
                "A".to_string(),
                "B".to_string(),
                "C".to_string(),
                "D".to_string(),
            ])
            .await?;
        assert_eq!(store.load_all().await?, vec!["B", "C", "D"]);
    }

    // Entries survive a reconnect.
    let store = SqliteDenyStore::connect(&url, 3).await?;
    assert_eq!(store.load_all().await?, vec!["B", "C", "D"]);

    let _ = std::fs::remove_file(&path);
    Ok(())
}

#[test]
fn test_batch_ceiling_adapts_to_filter_and_demand() {
    assert_eq!(batch_ceiling(&LabelFilter::All, 50), DIRECT_BATCH_MAX);
    assert_eq!(
        batch_ceiling(&LabelFilter::Only("nsfw".to_string()), 50),
        CLASSIFY_BATCH_MAX
    );
    assert_eq!(batch_ceiling(&LabelFilter::Only("nsfw".to_string()), 3), 3);
    assert_eq!(batch_ceiling(&LabelFilter::All, 0), 0);
}

#[test]
fn test_run_request_clamps_into_valid_domain() {
    let request = RunRequest {
        desired: 1000,
        service: ImageService::Imgur,
        filter: LabelFilter::All,
        confidence_cutoff: 1.5,
    }
    .clamped();
    assert_eq!(request.desired, MAX_DISPLAYED);
    assert_eq!(request.confidence_cutoff, 1.0);

    let request = RunRequest {
        desired: 5,
        service: ImageService::Imgur,
        filter: LabelFilter::All,
        confidence_cutoff: -0.5,
    }
    .clamped();
    assert_eq!(request.desired, 5);
    assert_eq!(request.confidence_cutoff, 0.0);
}

#[test]
fn test_handle_registry_flags_double_release_and_leak() {
    let registry = HandleRegistry::new();

    let mut handle = DisplayHandle::new(&registry);
    handle.release();
    handle.release();
    assert_eq!(registry.double_releases(), 1);
    assert_eq!(registry.released(), 1);

    {
        let _leaky = DisplayHandle::new(&registry);
    }
    assert_eq!(registry.leaked(), 1);
    assert_eq!(registry.outstanding(), 0);
}

#[test]
fn test_payload_transfers_ownership_once() {
    let registry = HandleRegistry::new();
    let candidate = Candidate {
        code: "aZ3k9".to_string(),
        link: "https://i.imgur.com/aZ3k9.jpg".to_string(),
    };
    let mut image = FetchedImage::new(
        &candidate,
        vec![1, 2, 3],
        640,
        480,
        DisplayHandle::new(&registry),
    );

    assert!(image.has_payload());
    assert_eq!(image.take_payload(), Some(vec![1, 2, 3]));
    assert!(!image.has_payload());
    assert_eq!(image.take_payload(), None, "The sender keeps nothing");

    image.handle.release();
    assert_eq!(registry.outstanding(), 0);
}

#[test]
fn test_filter_and_service_parsing() -> Result<()> {
    assert_eq!("all".parse::<LabelFilter>()?, LabelFilter::All);
    assert_eq!("ALL".parse::<LabelFilter>()?, LabelFilter::All);
    assert_eq!(
        "nsfw".parse::<LabelFilter>()?,
        LabelFilter::Only("nsfw".to_string())
    );
    assert!("".parse::<LabelFilter>().is_err());

    assert_eq!("imgur".parse::<ImageService>()?, ImageService::Imgur);
    assert_eq!("postimg".parse::<ImageService>()?, ImageService::PostImg);
    assert!("flickr".parse::<ImageService>().is_err());
    Ok(())
}
