use crate::error::GatewayError;
use crate::traits::{ChatModel, Clock};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Wall clock backed by tokio's timer, so paused-time tests drive it too.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Shared by every component that calls the model. Only the pacing decision
/// is serialised; the network call is not.
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self::with_clock(min_interval, Arc::new(SystemClock))
    }

    pub fn with_clock(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
            clock,
        }
    }

    pub async fn last_call(&self) -> Option<Instant> {
        *self.last_call.lock().await
    }

    /// Waits until `min_interval` has passed since the previous call started,
    /// then records and returns the start of this one. The wait happens with
    /// the lock held and cannot be cancelled by other callers.
    pub async fn acquire(&self) -> Instant {
        let mut last_call = self.last_call.lock().await;

        if let Some(previous) = *last_call {
            let elapsed = self.clock.now().saturating_duration_since(previous);
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                info!(wait_ms = wait.as_millis() as u64, "rate limiting llm call");
                self.clock.sleep(wait).await;
            }
        }

        let started = self.clock.now();
        *last_call = Some(started);
        started
    }
}

#[derive(Clone)]
pub struct LlmGateway {
    model: Arc<dyn ChatModel>,
    limiter: Arc<RateLimiter>,
}

impl LlmGateway {
    pub fn new(model: Arc<dyn ChatModel>, limiter: Arc<RateLimiter>) -> Self {
        Self { model, limiter }
    }

    pub async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        self.limiter.acquire().await;
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            temperature = ?request.temperature,
            "calling llm"
        );
        self.model.complete(request).await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{ManualClock, ScriptedModel};
    use super::*;
    use std::sync::Mutex as StdMutex;

    const MIN_INTERVAL: Duration = Duration::from_secs(3);

    #[tokio::test]
    async fn first_call_does_not_wait() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(MIN_INTERVAL, clock.clone());
        limiter.acquire().await;
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn back_to_back_calls_are_spaced_by_min_interval() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(MIN_INTERVAL, clock.clone());

        let first = limiter.acquire().await;
        let second = limiter.acquire().await;

        assert!(second >= first + MIN_INTERVAL);
        assert_eq!(limiter.last_call().await, Some(second));
    }

    #[tokio::test]
    async fn only_the_remaining_delta_is_waited() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(MIN_INTERVAL, clock.clone());

        limiter.acquire().await;
        clock.sleep(Duration::from_secs(1)).await;
        limiter.acquire().await;

        assert_eq!(clock.elapsed(), MIN_INTERVAL);
    }

    #[tokio::test]
    async fn no_wait_once_interval_has_passed() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(MIN_INTERVAL, clock.clone());

        limiter.acquire().await;
        clock.sleep(Duration::from_secs(10)).await;
        limiter.acquire().await;

        assert_eq!(clock.elapsed(), Duration::from_secs(10));
    }

    struct StampingModel {
        starts: StdMutex<Vec<tokio::time::Instant>>,
    }

    #[async_trait]
    impl ChatModel for StampingModel {
        async fn complete(&self, _request: &ChatRequest) -> Result<String, GatewayError> {
            self.starts
                .lock()
                .expect("starts lock")
                .push(tokio::time::Instant::now());
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("ok".to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_pacing_window() {
        let model = Arc::new(StampingModel {
            starts: StdMutex::new(Vec::new()),
        });
        let gateway = LlmGateway::new(model.clone(), Arc::new(RateLimiter::new(MIN_INTERVAL)));
        let request = ChatRequest {
            model: "test".to_string(),
            messages: vec![ChatMessage::user("hi")],
            temperature: None,
        };

        let calls = (0..3).map(|_| {
            let gateway = gateway.clone();
            let request = request.clone();
            tokio::spawn(async move { gateway.complete(&request).await })
        });
        for call in calls.collect::<Vec<_>>() {
            call.await.expect("task").expect("completion");
        }

        let mut starts = model.starts.lock().expect("starts lock").clone();
        starts.sort();
        assert_eq!(starts.len(), 3);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= MIN_INTERVAL);
            // the slow network call must not be serialised behind the lock
            assert!(pair[1] - pair[0] < Duration::from_secs(10));
        }
    }

    #[tokio::test]
    async fn gateway_forwards_model_errors() {
        let model = Arc::new(ScriptedModel::new(vec![Err(GatewayError::Status {
            status: 503,
            body: "busy".to_string(),
        })]));
        let gateway = super::testing::instant_gateway(model.clone());
        let request = ChatRequest {
            model: "m".to_string(),
            messages: vec![ChatMessage::user("q")],
            temperature: Some(0.0),
        };

        let result = gateway.complete(&request).await;
        assert!(matches!(result, Err(GatewayError::Status { status: 503, .. })));
        assert_eq!(model.recorded(), vec![request]);
    }
}
