use media_roulette::{
    BatchScript, ClassificationChannel, ClassifyItem, ClassifyReply, ClassifyRequest, LabelScore,
    MockClassifier, Result,
};
use tracing::info;

fn item(link: &str, payload: Vec<u8>) -> ClassifyItem {
    ClassifyItem {
        link: link.to_string(),
        payload,
    }
}

fn score(label: &str, confidence: f32) -> LabelScore {
    LabelScore {
        label: label.to_string(),
        confidence,
    }
}

#[tokio::test]
async fn test_ready_is_sent_once_unsolicited() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let mut channel = ClassificationChannel::spawn(Box::new(MockClassifier::new("ready")));
    channel.wait_ready().await?;
    assert!(channel.is_ready());

    let reply = channel.next_reply().await?;
    assert!(
        matches!(reply, ClassifyReply::Ready),
        "The first reply must be the unsolicited ready signal"
    );
    Ok(())
}

#[tokio::test]
async fn test_results_preserve_submission_order_and_generation() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let scripted = vec![score("nsfw", 0.9), score("sfw", 0.2), score("nsfw", 0.5)];
    let classifier =
        MockClassifier::new("ordered").with_batches(vec![BatchScript::Scores(scripted.clone())]);
    let mut channel = ClassificationChannel::spawn(Box::new(classifier));
    channel.wait_ready().await?;

    channel
        .submit(ClassifyRequest {
            generation: 42,
            items: vec![
                item("https://i.imgur.com/aaaaa.jpg", vec![1]),
                item("https://i.imgur.com/bbbbb.jpg", vec![2]),
                item("https://i.imgur.com/ccccc.jpg", vec![3]),
            ],
            label_filter: "nsfw".to_string(),
            confidence_cutoff: 0.75,
        })
        .await?;

    loop {
        match channel.next_reply().await? {
            ClassifyReply::Ready => continue,
            ClassifyReply::Results { generation, scores } => {
                assert_eq!(generation, 42, "The generation tag must be echoed");
                assert_eq!(scores.len(), 3);
                assert_eq!(scores, scripted, "Result order must match submission order");
                break;
            }
            other => panic!("Unexpected reply: {:?}", other),
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_classifier_error_fails_whole_batch() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let classifier = MockClassifier::new("broken")
        .with_batches(vec![BatchScript::Fail("out of memory".to_string())]);
    let mut channel = ClassificationChannel::spawn(Box::new(classifier));
    channel.wait_ready().await?;

    channel
        .submit(ClassifyRequest {
            generation: 7,
            items: vec![item("https://i.imgur.com/aaaaa.jpg", vec![1])],
            label_filter: "nsfw".to_string(),
            confidence_cutoff: 0.75,
        })
        .await?;

    loop {
        match channel.next_reply().await? {
            ClassifyReply::Ready => continue,
            ClassifyReply::Failed {
                generation,
                message,
            } => {
                assert_eq!(generation, 7);
                assert!(message.contains("out of memory"));
                break;
            }
            other => panic!("Unexpected reply: {:?}", other),
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_fallback_rule_returns_one_score_per_item() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let mut channel = ClassificationChannel::spawn(Box::new(MockClassifier::new("fallback")));
    channel.wait_ready().await?;

    channel
        .submit(ClassifyRequest {
            generation: 1,
            items: vec![
                item("https://i.imgur.com/aaaaa.jpg", vec![2, 2]),
                item("https://i.imgur.com/bbbbb.jpg", vec![2, 2]),
                item("https://i.imgur.com/ccccc.jpg", vec![3]),
            ],
            label_filter: "all".to_string(),
            confidence_cutoff: 0.0,
        })
        .await?;

    loop {
        match channel.next_reply().await? {
            ClassifyReply::Ready => continue,
            ClassifyReply::Results { scores, .. } => {
                assert_eq!(scores.len(), 3, "One score per submitted item");
                assert_eq!(
                    scores[0], scores[1],
                    "Identical payloads must classify identically"
                );
                for s in &scores {
                    assert!((0.0..=1.0).contains(&s.confidence));
                }
                info!("Fallback scores: {:?}", scores);
                break;
            }
            other => panic!("Unexpected reply: {:?}", other),
        }
    }
    Ok(())
}
