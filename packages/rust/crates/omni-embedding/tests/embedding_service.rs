//! Batch orchestration tests over a scripted in-process transport.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use omni_embedding::{
    BatchOptions, EmbeddingConfig, EmbeddingError, EmbeddingService, EmbeddingTransport,
};
use tokio_util::sync::CancellationToken;

type Responder = dyn Fn(&[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> + Send + Sync;

/// Records every call and answers through a caller-supplied rule.
struct ScriptedTransport {
    calls: Mutex<Vec<Vec<String>>>,
    respond: Box<Responder>,
}

impl ScriptedTransport {
    fn new(
        respond: impl Fn(&[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        })
    }

    fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingTransport for ScriptedTransport {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.lock().unwrap().push(texts.to_vec());
        (self.respond)(texts)
    }
}

fn echo_lengths(texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    Ok(texts.iter().map(|text| vec![text.len() as f32]).collect())
}

fn test_config() -> EmbeddingConfig {
    EmbeddingConfig {
        max_retries: 2,
        retry_base_delay_ms: 1,
        delay_between_batches_ms: 0,
        ..EmbeddingConfig::default()
    }
}

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

#[tokio::test]
async fn test_order_is_preserved_across_batch_splits() {
    let transport = ScriptedTransport::new(echo_lengths);
    let service = EmbeddingService::new(transport.clone(), &test_config()).unwrap();
    let input = texts(&["a", "bb", "ccc", "dddd", "eeeee"]);

    let vectors = service
        .generate_batch_embeddings(
            &input,
            Some(BatchOptions::default().with_max_batch_size(2)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        vectors,
        vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0], vec![5.0]]
    );
    let sizes: Vec<usize> = transport.calls().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
}

#[tokio::test]
async fn test_token_budget_splits_batches() {
    let transport = ScriptedTransport::new(echo_lengths);
    let service = EmbeddingService::new(transport.clone(), &test_config()).unwrap();
    // 40 chars -> 10 estimated tokens each
    let long = "x".repeat(40);
    let input = vec![long.clone(), long.clone(), long];

    service
        .generate_batch_embeddings(
            &input,
            Some(BatchOptions::default().with_max_tokens_per_batch(20)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let sizes: Vec<usize> = transport.calls().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 1]);
}

#[tokio::test]
async fn test_failed_batch_falls_back_to_individual_items() {
    let transport = ScriptedTransport::new(|texts| {
        if texts.len() > 1 {
            Err(EmbeddingError::BatchTooLarge {
                status: Some(413),
                message: "payload too large".to_string(),
            })
        } else {
            echo_lengths(texts)
        }
    });
    let service = EmbeddingService::new(transport.clone(), &test_config()).unwrap();

    let vectors = service
        .generate_batch_embeddings(
            &texts(&["one", "three", "x"]),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(vectors, vec![vec![3.0], vec![5.0], vec![1.0]]);
    let sizes: Vec<usize> = transport.calls().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![3, 1, 1, 1]);
}

#[tokio::test]
async fn test_failing_single_item_propagates_its_error() {
    let transport = ScriptedTransport::new(|texts| {
        if texts.iter().any(|text| text == "poison") {
            Err(EmbeddingError::Rejected {
                status: 400,
                message: "invalid input".to_string(),
            })
        } else {
            echo_lengths(texts)
        }
    });
    let service = EmbeddingService::new(transport.clone(), &test_config()).unwrap();

    let error = service
        .generate_batch_embeddings(
            &texts(&["fine", "poison", "never"]),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(
        error,
        EmbeddingError::Rejected {
            status: 400,
            message: "invalid input".to_string()
        }
    );
    // batch, then "fine", then "poison"; "never" is not attempted
    assert_eq!(transport.calls().len(), 3);
}

#[tokio::test]
async fn test_count_mismatch_is_a_hard_failure() {
    let transport = ScriptedTransport::new(|texts| {
        Ok(texts.iter().skip(1).map(|_| vec![0.5]).collect())
    });
    let service = EmbeddingService::new(transport.clone(), &test_config()).unwrap();

    let error = service
        .generate_batch_embeddings(&texts(&["a", "b", "c"]), None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        error,
        EmbeddingError::BatchMismatch {
            expected: 3,
            actual: 2
        }
    );
    assert_eq!(error.kind(), "EmbeddingBatchMismatchError");
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test]
async fn test_configured_dimension_is_enforced() {
    let transport = ScriptedTransport::new(echo_lengths);
    let config = EmbeddingConfig {
        dimension: Some(3),
        ..test_config()
    };
    let service = EmbeddingService::new(transport, &config).unwrap();

    let error = service
        .generate_embedding("hello", &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        error,
        EmbeddingError::DimensionMismatch {
            expected: 3,
            actual: 1
        }
    );
}

#[tokio::test]
async fn test_blank_text_is_rejected_before_any_call() {
    let transport = ScriptedTransport::new(echo_lengths);
    let service = EmbeddingService::new(transport.clone(), &test_config()).unwrap();

    let single = service
        .generate_embedding("   ", &CancellationToken::new())
        .await
        .unwrap_err();
    let batch = service
        .generate_batch_embeddings(&texts(&["ok", ""]), None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(single.kind(), "InvalidInputError");
    assert_eq!(
        batch,
        EmbeddingError::InvalidInput("cannot embed empty text at index 1".to_string())
    );
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_empty_batch_returns_no_vectors() {
    let transport = ScriptedTransport::new(echo_lengths);
    let service = EmbeddingService::new(transport.clone(), &test_config()).unwrap();

    let vectors = service
        .generate_batch_embeddings(&[], None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(vectors.is_empty());
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_cancellation_stops_between_batches() {
    let transport = ScriptedTransport::new(echo_lengths);
    let service = EmbeddingService::new(transport.clone(), &test_config()).unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let error = service
        .generate_batch_embeddings(
            &texts(&["a", "b", "c"]),
            Some(
                BatchOptions::default()
                    .with_max_batch_size(1)
                    .with_delay(Duration::from_secs(30)),
            ),
            &cancel,
        )
        .await
        .unwrap_err();

    assert_eq!(error, EmbeddingError::Cancelled);
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test]
async fn test_invalid_batch_options_are_rejected() {
    let transport = ScriptedTransport::new(echo_lengths);
    let service = EmbeddingService::new(transport, &test_config()).unwrap();

    let error = service
        .generate_batch_embeddings(
            &texts(&["a"]),
            Some(BatchOptions::default().with_max_batch_size(0)),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(error, EmbeddingError::InvalidInput(_)));
}
