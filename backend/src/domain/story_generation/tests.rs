//! Unit tests for the generation client retry policy.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rstest::{fixture, rstest};

use super::{
    GenerationClient, GenerationClientConfig, GenerationError, GenerationErrorClass,
    GenerationRuntime,
};
use crate::domain::ports::{GenerationFailureKind, TextGeneratorError};
use crate::domain::{Error, ErrorCode, RecipeId, RecipeMeta};
use crate::test_support::story::{
    AttemptOffsetJitter, ImmediateSleeper, MutableClock, NoJitter, RecordingSleeper,
    StubGenerator,
};

#[fixture]
fn recipe() -> RecipeMeta {
    RecipeMeta {
        id: RecipeId::new("r1").expect("valid id"),
        title: "Shakshuka".to_owned(),
        ingredients: vec!["eggs".to_owned(), "tomatoes".to_owned()],
        segment_count: 3,
    }
}

fn config(max_retries: u32) -> GenerationClientConfig {
    GenerationClientConfig {
        attempt_timeout: Duration::from_millis(200),
        max_retries,
        initial_backoff: Duration::from_millis(100),
        max_backoff: Duration::from_millis(250),
        max_context_chars: 500,
    }
}

fn client(
    generator: Arc<StubGenerator>,
    sleeper: Arc<RecordingSleeper>,
    config: GenerationClientConfig,
) -> GenerationClient {
    let now = Utc
        .with_ymd_and_hms(2026, 10, 19, 9, 0, 0)
        .single()
        .expect("valid time");
    GenerationClient::with_runtime(
        generator,
        Arc::new(MutableClock::new(now)),
        GenerationRuntime {
            sleeper,
            jitter: Arc::new(NoJitter),
        },
        config,
    )
}

#[rstest]
#[tokio::test]
async fn returns_text_from_first_successful_attempt(recipe: RecipeMeta) {
    let generator = Arc::new(StubGenerator::succeeding());
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(generator.clone(), sleeper.clone(), config(2));

    let text = client.generate(&recipe, 0, None).await.expect("generated");

    assert_eq!(text, "Segment 1 of Shakshuka.");
    assert_eq!(generator.calls(), 1);
    assert!(sleeper.recorded().is_empty());
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(3)]
#[tokio::test]
async fn persistent_retryable_failures_call_provider_max_retries_plus_one(
    recipe: RecipeMeta,
    #[case] max_retries: u32,
) {
    let generator = Arc::new(StubGenerator::always_failing(
        TextGeneratorError::upstream("503"),
    ));
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(generator.clone(), sleeper.clone(), config(max_retries));

    let error = client
        .generate(&recipe, 0, None)
        .await
        .expect_err("retries exhausted");

    let expected = max_retries + 1;
    assert_eq!(generator.calls(), expected as usize);
    assert_eq!(error.attempts(), expected);
    assert_eq!(error.class(), GenerationErrorClass::Retryable);
    assert_eq!(error.failure_kind(), GenerationFailureKind::RetryExhausted);
    assert_eq!(sleeper.recorded().len(), max_retries as usize);
}

#[rstest]
#[tokio::test]
async fn backoff_doubles_and_caps(recipe: RecipeMeta) {
    let generator = Arc::new(StubGenerator::always_failing(
        TextGeneratorError::rate_limited("429"),
    ));
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(generator, sleeper.clone(), config(3));

    client
        .generate(&recipe, 0, None)
        .await
        .expect_err("retries exhausted");

    assert_eq!(
        sleeper.recorded(),
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(250),
        ]
    );
}

#[rstest]
#[tokio::test]
async fn jitter_is_applied_to_each_delay(recipe: RecipeMeta) {
    let generator = Arc::new(StubGenerator::always_failing(
        TextGeneratorError::transport("reset"),
    ));
    let sleeper = Arc::new(RecordingSleeper::default());
    let now = Utc
        .with_ymd_and_hms(2026, 10, 19, 9, 0, 0)
        .single()
        .expect("valid time");
    let client = GenerationClient::with_runtime(
        generator,
        Arc::new(MutableClock::new(now)),
        GenerationRuntime {
            sleeper: sleeper.clone(),
            jitter: Arc::new(AttemptOffsetJitter),
        },
        config(2),
    );

    client
        .generate(&recipe, 0, None)
        .await
        .expect_err("retries exhausted");

    assert_eq!(
        sleeper.recorded(),
        vec![Duration::from_millis(101), Duration::from_millis(202)]
    );
}

#[rstest]
#[case(TextGeneratorError::invalid_prompt("bad"))]
#[case(TextGeneratorError::rejected("401"))]
#[case(TextGeneratorError::decode("garbled"))]
#[tokio::test]
async fn fatal_errors_are_not_retried(recipe: RecipeMeta, #[case] failure: TextGeneratorError) {
    let generator = Arc::new(StubGenerator::always_failing(failure.clone()));
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(generator.clone(), sleeper.clone(), config(3));

    let error = client
        .generate(&recipe, 0, None)
        .await
        .expect_err("fatal failure");

    assert_eq!(generator.calls(), 1);
    assert_eq!(
        error,
        GenerationError::Rejected {
            attempts: 1,
            source: failure
        }
    );
    assert_eq!(error.class(), GenerationErrorClass::Fatal);
    assert!(sleeper.recorded().is_empty());
}

#[rstest]
#[tokio::test]
async fn recovers_after_transient_failures(recipe: RecipeMeta) {
    let generator = Arc::new(StubGenerator::scripted(vec![
        Err(TextGeneratorError::transport("reset")),
        Err(TextGeneratorError::upstream("502")),
        Ok("Third time lucky.".to_owned()),
    ]));
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(generator.clone(), sleeper, config(2));

    let text = client.generate(&recipe, 0, None).await.expect("recovered");

    assert_eq!(text, "Third time lucky.");
    assert_eq!(generator.calls(), 3);
}

#[rstest]
#[tokio::test]
async fn slow_attempts_time_out_and_are_retried(recipe: RecipeMeta) {
    let generator = Arc::new(StubGenerator::succeeding().with_delay(Duration::from_millis(500)));
    let sleeper = Arc::new(ImmediateSleeper);
    let now = Utc
        .with_ymd_and_hms(2026, 10, 19, 9, 0, 0)
        .single()
        .expect("valid time");
    let client = GenerationClient::with_runtime(
        generator.clone(),
        Arc::new(MutableClock::new(now)),
        GenerationRuntime {
            sleeper,
            jitter: Arc::new(NoJitter),
        },
        GenerationClientConfig {
            attempt_timeout: Duration::from_millis(20),
            ..config(1)
        },
    );

    let error = client
        .generate(&recipe, 0, None)
        .await
        .expect_err("every attempt times out");

    assert_eq!(generator.calls(), 2);
    assert!(error.timed_out());
    assert_eq!(error.failure_kind(), GenerationFailureKind::TimedOut);
    let mapped: Error = error.into();
    assert_eq!(mapped.code(), ErrorCode::GenerationTimeout);
}

#[rstest]
#[tokio::test]
async fn blank_provider_output_is_a_fatal_decode_error(recipe: RecipeMeta) {
    let generator = Arc::new(StubGenerator::scripted(vec![Ok("   \n".to_owned())]));
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(generator.clone(), sleeper, config(2));

    let error = client
        .generate(&recipe, 0, None)
        .await
        .expect_err("blank output");

    assert_eq!(generator.calls(), 1);
    assert!(matches!(
        error,
        GenerationError::Rejected {
            source: TextGeneratorError::Decode { .. },
            ..
        }
    ));
}

#[rstest]
#[tokio::test]
async fn invalid_prompts_never_reach_the_provider(mut recipe: RecipeMeta) {
    recipe.ingredients.clear();
    let generator = Arc::new(StubGenerator::succeeding());
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(generator.clone(), sleeper, config(2));

    let error = client
        .generate(&recipe, 0, None)
        .await
        .expect_err("invalid prompt");

    assert_eq!(generator.calls(), 0);
    assert!(matches!(error, GenerationError::InvalidPrompt(_)));
    assert_eq!(error.attempts(), 0);
    let mapped: Error = error.into();
    assert_eq!(mapped.code(), ErrorCode::GenerationFailed);
}

#[rstest]
#[tokio::test]
async fn continuation_prompt_carries_prior_context(recipe: RecipeMeta) {
    let generator = Arc::new(StubGenerator::succeeding());
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(generator.clone(), sleeper, config(0));

    client
        .generate(&recipe, 1, Some("The pan began to sizzle."))
        .await
        .expect("generated");

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].has_context());
    assert!(prompts[0].text().contains("The pan began to sizzle."));
}

#[rstest]
fn mapped_errors_carry_attempt_details() {
    let error = GenerationError::RetriesExhausted {
        attempts: 3,
        source: TextGeneratorError::upstream("503"),
    };
    let mapped: Error = error.into();
    assert_eq!(mapped.code(), ErrorCode::GenerationFailed);
    assert_eq!(
        mapped.details().and_then(|value| value.get("attempts")).cloned(),
        Some(serde_json::json!(3))
    );
}
