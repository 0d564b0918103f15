//! Integration tests for the resilience engine
//!
//! Exercises composed policies end to end: retry with backoff, circuit
//! breaking across executions, bulkhead admission and error matchers.

#![cfg(feature = "runtime")]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use callguard_common::resilience::{
    BackoffStrategy, BoxError, BulkheadConfig, CircuitBreakerConfig, CircuitState, CustomBackoff,
    ErrorMatcher, MockClock, ResilienceError, ResiliencePolicy, RetryConfig, TimeoutConfig,
};

/// Custom error type for testing
#[derive(Debug)]
struct TestError {
    message: &'static str,
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message)
    }
}

impl std::error::Error for TestError {}

/// Fatal failures are never retried
#[derive(Debug)]
struct Fatal;

impl std::fmt::Display for Fatal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("fatal")
    }
}

impl std::error::Error for Fatal {}

fn transient() -> BoxError {
    Box::new(TestError { message: "transient failure" })
}

/// Validates that a policy recovers from transient failures with exponential
/// backoff and reports the final value.
#[tokio::test(flavor = "multi_thread")]
async fn test_retry_exponential_backoff_success() {
    let attempts = Arc::new(AtomicU32::new(0));
    let retry = RetryConfig::builder()
        .max_retries(5)
        .delay(Duration::from_millis(5))
        .no_jitter()
        .backoff(BackoffStrategy::Exponential { factor: 2, max_delay: Duration::from_millis(20) })
        .build()
        .expect("Failed to build config");
    let policy = ResiliencePolicy::builder().retry(retry).build().expect("valid policy");

    let result = policy
        .execute(|| {
            let attempts = Arc::clone(&attempts);
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(transient())
                } else {
                    Ok("Success")
                }
            }
        })
        .await;

    assert_eq!(result.expect("Should succeed"), "Success");
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    assert_eq!(policy.metrics().retries, 3);
}

/// `abort_on` wins over `retry_on`, even for a failure both would match.
#[test]
fn test_abort_on_stops_retrying() {
    let retry = RetryConfig::builder()
        .max_retries(5)
        .no_jitter()
        .retry_on(ErrorMatcher::any())
        .abort_on(ErrorMatcher::of::<Fatal>())
        .build()
        .expect("valid");
    let policy = ResiliencePolicy::builder().retry(retry).build().expect("valid policy");

    let calls = AtomicU32::new(0);
    let result: Result<(), BoxError> = policy.call(|| {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(Box::new(Fatal) as BoxError)
    });

    assert!(result.expect_err("aborted").downcast_ref::<Fatal>().is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Two policies built from the same configuration keep separate state.
#[test]
fn test_policies_share_configuration_not_state() {
    let config = RetryConfig::builder().max_retries(3).no_jitter().build().expect("valid");
    let first = ResiliencePolicy::builder().retry(config.clone()).build().expect("valid policy");
    let second = ResiliencePolicy::builder().retry(config).build().expect("valid policy");

    let calls = AtomicU32::new(0);
    let _ = first.call(|| -> Result<(), BoxError> {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(transient())
    });

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(first.metrics().retries, 3);
    assert_eq!(second.metrics(), Default::default());
}

/// The breaker trips once a full window reaches the failure ratio, short-circuits
/// while open, and closes again after a successful half-open probe.
#[test]
fn test_circuit_breaker_lifecycle_through_policy() {
    let clock = Arc::new(MockClock::new());
    let transitions = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let breaker = {
        let transitions = Arc::clone(&transitions);
        CircuitBreakerConfig::builder()
            .name("ledger")
            .request_volume_threshold(4)
            .failure_ratio(0.5)
            .delay(Duration::from_secs(5))
            .on_state_change(Arc::new(move |state: CircuitState| transitions.lock().push(state)))
            .build()
            .expect("valid")
    };
    let policy = ResiliencePolicy::builder()
        .circuit_breaker(breaker)
        .clock(clock.clone())
        .build()
        .expect("valid policy");

    let outcomes = [false, true, false, true];
    for fail in outcomes {
        let _ = policy.call(|| if fail { Err(transient()) } else { Ok(()) });
    }
    assert_eq!(policy.circuit_state(), Some(CircuitState::Open));

    let rejected = policy.call(|| Ok::<_, BoxError>(()));
    let err = rejected.expect_err("short-circuited");
    assert!(matches!(
        ResilienceError::from_boxed(err),
        ResilienceError::CircuitOpen { name } if name == "ledger"
    ));

    clock.advance(Duration::from_secs(5));
    policy.call(|| Ok::<_, BoxError>(())).expect("probe succeeds");
    assert_eq!(policy.circuit_state(), Some(CircuitState::Closed));
    assert_eq!(
        *transitions.lock(),
        vec![CircuitState::Open, CircuitState::HalfOpen, CircuitState::Closed]
    );
}

/// Failures listed in `skip_on` count as successes for the breaker.
#[test]
fn test_skip_on_never_trips_breaker() {
    let breaker = CircuitBreakerConfig::builder()
        .request_volume_threshold(2)
        .failure_ratio(0.5)
        .skip_on(ErrorMatcher::of::<TestError>())
        .build()
        .expect("valid");
    let policy = ResiliencePolicy::builder().circuit_breaker(breaker).build().expect("valid policy");

    for _ in 0..5 {
        assert!(policy.call(|| -> Result<(), BoxError> { Err(transient()) }).is_err());
    }
    assert_eq!(policy.circuit_state(), Some(CircuitState::Closed));
}

/// A custom backoff receives each failure and drives the delays.
#[test]
fn test_custom_backoff_strategy() {
    struct Recording(Arc<AtomicU32>);

    impl CustomBackoff for Recording {
        fn init(&mut self, _initial_delay: Duration) {}

        fn next_delay(&mut self, _error: &(dyn std::error::Error + 'static)) -> Duration {
            self.0.fetch_add(1, Ordering::SeqCst);
            Duration::from_millis(1)
        }
    }

    let seen = Arc::new(AtomicU32::new(0));
    let supplier_seen = Arc::clone(&seen);
    let retry = RetryConfig::builder()
        .max_retries(2)
        .no_jitter()
        .backoff(BackoffStrategy::Custom(Arc::new(move || {
            Box::new(Recording(Arc::clone(&supplier_seen))) as Box<dyn CustomBackoff>
        })))
        .build()
        .expect("valid");
    let policy = ResiliencePolicy::builder().retry(retry).build().expect("valid policy");

    let _ = policy.call(|| -> Result<(), BoxError> { Err(transient()) });
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

/// Queued async executions eventually run; the bulkhead never exceeds its limit.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bulkhead_bounds_concurrency() {
    let policy = Arc::new(
        ResiliencePolicy::builder()
            .bulkhead(BulkheadConfig::builder().limit(2).queue_size(8).build().expect("valid"))
            .timeout(TimeoutConfig::builder().duration(Duration::from_secs(5)).build().expect("valid"))
            .build()
            .expect("valid policy"),
    );
    let in_flight = Arc::new(AtomicU32::new(0));
    let peak = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..6 {
        let policy = Arc::clone(&policy);
        let in_flight = Arc::clone(&in_flight);
        let peak = Arc::clone(&peak);
        handles.push(tokio::spawn(async move {
            policy
                .execute(|| {
                    let in_flight = Arc::clone(&in_flight);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, BoxError>(())
                    }
                })
                .await
        }));
    }

    for handle in handles {
        handle.await.expect("join").expect("queued execution completes");
    }
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(policy.metrics().successes, 6);
    assert_eq!(policy.metrics().rejections, 0);
}
