//! Rate budgeting, concurrency capping and retry with exponential backoff.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use yarasmith_core::ServiceError;

use crate::service::TextService;

/// Timeout and backoff settings for one class of outbound call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Per-call timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            timeout: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration, timeout: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            timeout,
        }
    }

    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1), capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << (attempt - 1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, returns a non-retryable error, or retries
    /// run out. Each call is bounded by the policy timeout; elapsed calls are
    /// reported through `on_timeout`.
    pub async fn run<T, E, F, Fut>(
        &self,
        op: F,
        is_retryable: impl Fn(&E) -> bool,
        on_timeout: impl Fn() -> E,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.run_gated(|| async {}, op, is_retryable, on_timeout).await
    }

    /// Like [`run`](Self::run), but waits on `gate` before every attempt.
    ///
    /// The gate (rate budget, concurrency slot) is outside the timeout: a
    /// caller waiting for capacity blocks instead of timing out. Whatever the
    /// gate yields is held for the duration of the attempt.
    pub async fn run_gated<T, E, P, G, GFut, F, Fut>(
        &self,
        mut gate: G,
        mut op: F,
        is_retryable: impl Fn(&E) -> bool,
        on_timeout: impl Fn() -> E,
    ) -> Result<T, E>
    where
        G: FnMut() -> GFut,
        GFut: Future<Output = P>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let delay = self.delay_for(attempt);
                warn!("Retry attempt {} after {:?}", attempt, delay);
                sleep(delay).await;
            }

            let _admitted = gate().await;
            let outcome = match timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(on_timeout()),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        info!("Call succeeded on attempt {}", attempt + 1);
                    }
                    return Ok(value);
                }
                Err(e) if is_retryable(&e) && attempt < self.max_retries => {
                    debug!("Retryable failure: {}", e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Sliding-window call budget. Callers block while the window is full.
pub struct RateBudget {
    calls: usize,
    window: Duration,
    issued: Mutex<VecDeque<Instant>>,
}

impl RateBudget {
    pub fn new(calls: usize, window: Duration) -> Self {
        Self {
            calls: calls.max(1),
            window,
            issued: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until a call may be issued and record it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut issued = self.issued.lock().await;
                let now = Instant::now();
                while issued
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= self.window)
                {
                    issued.pop_front();
                }

                if issued.len() < self.calls {
                    issued.push_back(now);
                    return;
                }

                match issued.front() {
                    Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };

            debug!("Rate budget exhausted, waiting {:?}", wait);
            sleep(wait).await;
        }
    }

    /// Calls currently counted against the window.
    pub async fn in_window(&self) -> usize {
        let issued = self.issued.lock().await;
        let now = Instant::now();
        issued
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count()
    }
}

/// Shared gate in front of every external capability: a rate budget plus a
/// cap on in-flight calls.
pub struct Throttle {
    budget: RateBudget,
    semaphore: Semaphore,
}

impl Throttle {
    pub fn new(budget: RateBudget, max_concurrent: usize) -> Self {
        Self {
            budget,
            semaphore: Semaphore::new(max_concurrent.max(1)),
        }
    }

    /// Unlimited throttle, useful for tests and local-only runs.
    pub fn unlimited() -> Self {
        Self::new(RateBudget::new(usize::MAX, Duration::from_secs(1)), Semaphore::MAX_PERMITS)
    }

    /// Concurrency slot only, without spending rate budget.
    pub async fn permit(&self) -> SemaphorePermit<'_> {
        // The semaphore is never closed
        self.semaphore
            .acquire()
            .await
            .unwrap_or_else(|_| unreachable!("throttle semaphore closed"))
    }

    /// Spend one unit of rate budget, then take a concurrency slot.
    pub async fn admit(&self) -> SemaphorePermit<'_> {
        self.budget.acquire().await;
        self.permit().await
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Wraps a [`TextService`] with the shared throttle and a retry policy.
///
/// Transient errors and timeouts are retried with exponential backoff;
/// permanent errors are returned immediately.
pub struct GuardedService<S> {
    inner: S,
    policy: RetryPolicy,
    throttle: Arc<Throttle>,
    name: &'static str,
}

impl<S: TextService> GuardedService<S> {
    pub fn new(name: &'static str, inner: S, policy: RetryPolicy, throttle: Arc<Throttle>) -> Self {
        Self {
            inner,
            policy,
            throttle,
            name,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<S: TextService> TextService for GuardedService<S> {
    async fn request(&self, context: &str) -> Result<String, ServiceError> {
        let timeout_secs = self.policy.timeout.as_secs_f64();
        let result = self
            .policy
            .run_gated(
                || self.throttle.admit(),
                || self.inner.request(context),
                ServiceError::is_transient,
                || ServiceError::Transient(format!("request timed out after {timeout_secs:.1}s")),
            )
            .await;

        if let Err(ref e) = result {
            warn!(service = self.name, "request failed: {}", e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyService {
        failures_before_success: u32,
        calls: AtomicU32,
        error: ServiceError,
    }

    #[async_trait]
    impl TextService for FlakyService {
        async fn request(&self, context: &str) -> Result<String, ServiceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(self.error.clone())
            } else {
                Ok(format!("echo: {context}"))
            }
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_retries,
            Duration::from_millis(1),
            Duration::from_millis(4),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(
            5,
            Duration::from_millis(100),
            Duration::from_millis(500),
            Duration::from_secs(1),
        );
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let service = GuardedService::new(
            "test",
            FlakyService {
                failures_before_success: 2,
                calls: AtomicU32::new(0),
                error: ServiceError::Transient("429".to_string()),
            },
            fast_policy(3),
            Arc::new(Throttle::unlimited()),
        );

        let response = service.request("hi").await.unwrap();
        assert_eq!(response, "echo: hi");
        assert_eq!(service.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let service = GuardedService::new(
            "test",
            FlakyService {
                failures_before_success: 10,
                calls: AtomicU32::new(0),
                error: ServiceError::Transient("timeout".to_string()),
            },
            fast_policy(2),
            Arc::new(Throttle::unlimited()),
        );

        assert!(service.request("hi").await.unwrap_err().is_transient());
        assert_eq!(service.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let service = GuardedService::new(
            "test",
            FlakyService {
                failures_before_success: 10,
                calls: AtomicU32::new(0),
                error: ServiceError::Permanent("401".to_string()),
            },
            fast_policy(5),
            Arc::new(Throttle::unlimited()),
        );

        assert!(matches!(
            service.request("hi").await,
            Err(ServiceError::Permanent(_))
        ));
        assert_eq!(service.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_budget_blocks_until_window_passes() {
        let budget = RateBudget::new(2, Duration::from_secs(10));
        let start = Instant::now();

        budget.acquire().await;
        budget.acquire().await;
        assert_eq!(budget.in_window().await, 2);

        budget.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_for_budget_is_not_a_timeout() {
        let service = GuardedService::new(
            "test",
            FlakyService {
                failures_before_success: 0,
                calls: AtomicU32::new(0),
                error: ServiceError::Transient("unused".to_string()),
            },
            RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(4), Duration::from_secs(5)),
            Arc::new(Throttle::new(RateBudget::new(1, Duration::from_secs(30)), 4)),
        );
        let start = Instant::now();

        assert_eq!(service.request("one").await.unwrap(), "echo: one");
        assert_eq!(service.request("two").await.unwrap(), "echo: two");
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert_eq!(service.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_wait_is_outside_timeout() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(1), Duration::from_secs(1));
        let result: Result<u32, String> = policy
            .run_gated(
                || sleep(Duration::from_secs(10)),
                || async { Ok(7) },
                |_| true,
                || "timed out".to_string(),
            )
            .await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_throttle_caps_concurrency() {
        let throttle = Throttle::new(RateBudget::new(100, Duration::from_secs(1)), 2);
        let first = throttle.admit().await;
        let _second = throttle.admit().await;
        assert_eq!(throttle.available_permits(), 0);
        drop(first);
        assert_eq!(throttle.available_permits(), 1);
    }
}
