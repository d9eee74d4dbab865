//! Provider adapter behavior: cache, rate limit, retry and usage accounting

mod helpers;

use cellar_ai::config::AiConfig;
use cellar_ai::models::LabelExtraction;
use cellar_ai::providers::{
    AdapterOutcome, AdapterResult, LabelReader, MediaPayload, ProviderAdapter, ProviderError,
    ProviderId,
};
use cellar_ai::services::{CacheStore, RateLimitConfig, UsagePeriod};
use helpers::{fast_config, label, BrokenBackend, Scripted, TestEnv};
use std::sync::Arc;
use std::time::Duration;

const KEY: &str = "vision:extract_label:test";

fn payload() -> MediaPayload {
    MediaPayload {
        bytes: vec![0xFF, 0xD8],
        mime_type: "image/jpeg".to_string(),
        file_name: "label.jpg".to_string(),
    }
}

async fn read(
    adapter: &ProviderAdapter,
    reader: &Scripted<LabelExtraction>,
    cache_key: Option<&str>,
) -> AdapterOutcome<LabelExtraction> {
    let image = payload();
    adapter
        .process("extract_label", cache_key.map(str::to_string), || {
            reader.read_label(&image, None)
        })
        .await
}

fn network_error() -> ProviderError {
    ProviderError::Network("connection reset".to_string())
}

#[tokio::test]
async fn test_second_identical_call_served_from_cache() {
    let env = TestEnv::new(fast_config()).await;
    let adapter = env.services.adapter(ProviderId::Vision);
    let reader = Scripted::ok(label(80));

    let first = read(&adapter, &reader, Some(KEY)).await;
    assert!(first.is_success());
    assert!(!first.from_cache);
    assert_eq!(first.attempts, 1);

    let second = read(&adapter, &reader, Some(KEY)).await;
    assert!(second.from_cache);
    assert_eq!(second.attempts, 0);
    assert_eq!(second.value(), first.value());
    assert_eq!(reader.calls(), 1, "cache hit must not reach the provider");
}

#[tokio::test]
async fn test_no_cache_key_always_calls_provider() {
    let env = TestEnv::new(fast_config()).await;
    let adapter = env.services.adapter(ProviderId::Vision);
    let reader = Scripted::ok(label(80));

    read(&adapter, &reader, None).await;
    let second = read(&adapter, &reader, None).await;

    assert!(!second.from_cache);
    assert_eq!(reader.calls(), 2);
}

#[tokio::test]
async fn test_transient_failures_retried_with_linear_backoff() {
    let mut config = AiConfig::default();
    config.adapter.base_delay = Duration::from_millis(40);
    let env = TestEnv::new(config).await;
    let adapter = env.services.adapter(ProviderId::Vision);
    let reader = Scripted::ok(label(80)).then_respond(vec![
        Err(network_error()),
        Err(ProviderError::Api {
            status: 503,
            message: "unavailable".to_string(),
        }),
    ]);

    let outcome = read(&adapter, &reader, None).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.attempts, 3);
    assert_eq!(reader.calls(), 3);
    // 1 * 40ms + 2 * 40ms of backoff
    assert!(
        outcome.latency_ms >= 120,
        "latency {}ms shorter than backoff",
        outcome.latency_ms
    );
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let env = TestEnv::new(fast_config()).await;
    let adapter = env.services.adapter(ProviderId::Vision);
    let reader = Scripted::failing(network_error());

    let outcome = read(&adapter, &reader, Some(KEY)).await;

    assert_eq!(outcome.result, AdapterResult::Failed(network_error()));
    assert_eq!(outcome.attempts, 3);
    assert_eq!(reader.calls(), 3);
}

#[tokio::test]
async fn test_permanent_failures_not_retried() {
    let env = TestEnv::new(fast_config()).await;
    let adapter = env.services.adapter(ProviderId::Vision);

    for error in [
        ProviderError::Api {
            status: 400,
            message: "bad image".to_string(),
        },
        ProviderError::Configuration("no API key".to_string()),
        ProviderError::Media("file missing".to_string()),
    ] {
        let reader = Scripted::failing(error.clone());
        let outcome = read(&adapter, &reader, None).await;

        assert_eq!(outcome.error(), Some(&error));
        assert_eq!(outcome.attempts, 1, "{} must not be retried", error);
        assert_eq!(reader.calls(), 1);
    }
}

#[tokio::test]
async fn test_rate_limit_denies_without_calling_provider() {
    let mut config = fast_config();
    config.vision_limits = RateLimitConfig {
        per_minute: 2,
        per_day: 100,
    };
    let env = TestEnv::new(config).await;
    let adapter = env.services.adapter(ProviderId::Vision);
    let reader = Scripted::ok(label(80));

    assert!(read(&adapter, &reader, None).await.is_success());
    assert!(read(&adapter, &reader, None).await.is_success());

    let denied = read(&adapter, &reader, None).await;
    assert_eq!(
        denied.result,
        AdapterResult::Failed(ProviderError::RateLimited(ProviderId::Vision))
    );
    assert_eq!(denied.attempts, 0);
    assert_eq!(reader.calls(), 2);

    // Next minute window admits again
    env.clock.advance(Duration::from_secs(60));
    assert!(read(&adapter, &reader, None).await.is_success());
    assert_eq!(reader.calls(), 3);

    let usage = env
        .services
        .usage
        .usage(ProviderId::Vision, UsagePeriod::Day)
        .await;
    assert_eq!(usage.requests, 4);
    assert_eq!(usage.rate_limited, 1);
    assert_eq!(usage.failures, 1);
}

#[tokio::test]
async fn test_rate_limit_disabled_ignores_ceilings() {
    let mut config = fast_config();
    config.adapter.rate_limit_enabled = false;
    config.vision_limits = RateLimitConfig {
        per_minute: 1,
        per_day: 1,
    };
    let env = TestEnv::new(config).await;
    let adapter = env.services.adapter(ProviderId::Vision);
    let reader = Scripted::ok(label(80));

    for _ in 0..3 {
        assert!(read(&adapter, &reader, None).await.is_success());
    }
    assert_eq!(reader.calls(), 3);
}

#[tokio::test]
async fn test_concurrent_calls_never_exceed_minute_ceiling() {
    let mut config = fast_config();
    config.vision_limits = RateLimitConfig {
        per_minute: 5,
        per_day: 100,
    };
    let env = TestEnv::new(config).await;
    let adapter = env.services.adapter(ProviderId::Vision);
    let reader = Arc::new(Scripted::ok(label(80)).with_delay(Duration::from_millis(5)));

    let tasks: Vec<_> = (0..12)
        .map(|_| {
            let adapter = adapter.clone();
            let reader = reader.clone();
            tokio::spawn(async move { read(&adapter, &reader, None).await.is_success() })
        })
        .collect();

    let mut admitted = 0;
    for task in tasks {
        if task.await.expect("task panicked") {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 5);
    assert_eq!(reader.calls(), 5);
}

#[tokio::test]
async fn test_low_confidence_results_not_cached() {
    let env = TestEnv::new(fast_config()).await;
    let adapter = env.services.adapter(ProviderId::Vision);
    let reader = Scripted::ok(label(30));

    read(&adapter, &reader, Some(KEY)).await;
    let second = read(&adapter, &reader, Some(KEY)).await;

    assert!(second.is_success());
    assert!(!second.from_cache);
    assert_eq!(reader.calls(), 2);
}

#[tokio::test]
async fn test_empty_answer_is_not_a_failure_and_not_cached() {
    let env = TestEnv::new(fast_config()).await;
    let adapter = env.services.adapter(ProviderId::Vision);
    let mut blank = label(90);
    blank.raw_text = "   ".to_string();
    let reader = Scripted::ok(blank);

    let outcome = read(&adapter, &reader, Some(KEY)).await;
    assert_eq!(outcome.result, AdapterResult::Empty);
    assert_eq!(outcome.attempts, 1);

    read(&adapter, &reader, Some(KEY)).await;
    assert_eq!(reader.calls(), 2);
}

#[tokio::test]
async fn test_cached_result_expires_after_ttl() {
    let mut config = fast_config();
    config.cache_ttl = Duration::from_secs(3600);
    let env = TestEnv::new(config).await;
    let adapter = env.services.adapter(ProviderId::Vision);
    let reader = Scripted::ok(label(80));

    read(&adapter, &reader, Some(KEY)).await;
    env.clock.advance(Duration::from_secs(3599));
    assert!(read(&adapter, &reader, Some(KEY)).await.from_cache);

    env.clock.advance(Duration::from_secs(1));
    let expired = read(&adapter, &reader, Some(KEY)).await;
    assert!(!expired.from_cache);
    assert_eq!(reader.calls(), 2);
}

#[tokio::test]
async fn test_broken_cache_degrades_to_provider_calls() {
    let env = TestEnv::new(fast_config()).await;
    let services = env.services.clone().with_cache(CacheStore::new(
        Arc::new(BrokenBackend),
        Duration::from_secs(60),
        env.clock.clone(),
    ));
    let adapter = services.adapter(ProviderId::Vision);
    let reader = Scripted::ok(label(80));

    assert!(read(&adapter, &reader, Some(KEY)).await.is_success());
    let second = read(&adapter, &reader, Some(KEY)).await;

    assert!(second.is_success());
    assert!(!second.from_cache);
    assert_eq!(reader.calls(), 2);
}

#[tokio::test]
async fn test_every_call_records_one_usage_event() {
    let env = TestEnv::new(fast_config()).await;
    let adapter = env.services.adapter(ProviderId::Vision);
    let reader = Scripted::ok(label(80));

    read(&adapter, &reader, Some(KEY)).await;
    read(&adapter, &reader, Some(KEY)).await;
    let failing = Scripted::failing(ProviderError::Configuration("no key".to_string()));
    read(&adapter, &failing, None).await;

    let today = env
        .services
        .usage
        .usage(ProviderId::Vision, UsagePeriod::Day)
        .await;
    assert_eq!(today.requests, 3);
    assert_eq!(today.successes, 2);
    assert_eq!(today.cache_hits, 1);
    assert_eq!(today.failures, 1);

    let language = env
        .services
        .usage
        .usage(ProviderId::Language, UsagePeriod::Day)
        .await;
    assert_eq!(language.requests, 0);
}
