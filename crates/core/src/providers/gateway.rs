use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::errors::CoreError;

use super::fallback;
use super::transport::{HttpResponse, HttpTransport};

/// Default spacing between upstream calls (free API tier).
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(1200);

/// Which kind of upstream data a request asks for. Decides the fallback
/// dataset served when the upstream throttles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestCategory {
    Markets,
    Search,
    MarketChart,
}

impl std::fmt::Display for RequestCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestCategory::Markets => write!(f, "markets"),
            RequestCategory::Search => write!(f, "search"),
            RequestCategory::MarketChart => write!(f, "market_chart"),
        }
    }
}

/// A GET against the market data API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRequest {
    pub category: RequestCategory,
    pub url: String,
}

impl UpstreamRequest {
    pub fn new(category: RequestCategory, url: impl Into<String>) -> Self {
        Self {
            category,
            url: url.into(),
        }
    }
}

type Job = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

struct QueueState {
    jobs: VecDeque<Job>,
    /// A dispatcher task is draining `jobs`.
    processing: bool,
    /// When the previous request settled.
    last_completed: Option<Instant>,
}

struct Inner {
    transport: Arc<dyn HttpTransport>,
    min_interval: Duration,
    queue: Mutex<QueueState>,
    fallbacks_served: AtomicU64,
}

/// Serializes every upstream call through one FIFO queue.
///
/// - At most one request is in flight at any instant.
/// - Consecutive requests are spaced at least `min_interval` apart, measured
///   from when one settles to when the next starts.
/// - The dispatcher task only exists while the queue is non-empty; the next
///   enqueue after it drains starts a fresh one.
/// - A throttled (429) response is answered with a fallback dataset for the
///   request's category instead of an error, where one exists.
///
/// Cloning is cheap; all clones share one queue.
#[derive(Clone)]
pub struct RequestGateway {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RequestGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGateway")
            .field("min_interval", &self.inner.min_interval)
            .field("pending", &self.pending())
            .field("fallbacks_served", &self.fallbacks_served())
            .finish()
    }
}

impl RequestGateway {
    pub fn new(transport: Arc<dyn HttpTransport>, min_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                min_interval,
                queue: Mutex::new(QueueState {
                    jobs: VecDeque::new(),
                    processing: false,
                    last_completed: None,
                }),
                fallbacks_served: AtomicU64::new(0),
            }),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.inner.min_interval
    }

    /// Requests waiting for their turn (not counting the one in flight).
    pub fn pending(&self) -> usize {
        self.lock_queue().jobs.len()
    }

    /// How many throttled responses were answered with fallback data.
    pub fn fallbacks_served(&self) -> u64 {
        self.inner.fallbacks_served.load(Ordering::Relaxed)
    }

    /// Queue an arbitrary request and get a future for its result.
    ///
    /// The request joins the queue when `enqueue` is called, not when the
    /// returned future is first polled, so call order is dispatch order.
    /// Dropping the future does not cancel the request; its result is
    /// discarded. Must be called from within a Tokio runtime.
    pub fn enqueue<T, F, Fut>(
        &self,
        request: F,
    ) -> impl Future<Output = Result<T, CoreError>> + Send + 'static
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CoreError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || -> Pin<Box<dyn Future<Output = ()> + Send>> {
            Box::pin(async move {
                // The caller may have stopped waiting; nothing to do then.
                let _ = tx.send(request().await);
            })
        });
        self.push(job);

        async move {
            rx.await.map_err(|_| {
                CoreError::Network("Request was abandoned before it settled".into())
            })?
        }
    }

    /// Queue a GET against the market data API and decode the JSON body.
    pub async fn fetch<T>(&self, request: UpstreamRequest) -> Result<T, CoreError>
    where
        T: DeserializeOwned,
    {
        let inner = Arc::clone(&self.inner);
        let category = request.category;
        let value = self
            .enqueue(move || async move { inner.execute(&request).await })
            .await?;
        serde_json::from_value(value).map_err(|e| {
            CoreError::Deserialization(format!("Unexpected {category} response: {e}"))
        })
    }

    fn push(&self, job: Job) {
        let start_dispatcher = {
            let mut queue = self.lock_queue();
            queue.jobs.push_back(job);
            !std::mem::replace(&mut queue.processing, true)
        };
        if start_dispatcher {
            tokio::spawn(Self::drain(Arc::clone(&self.inner)));
        }
    }

    async fn drain(inner: Arc<Inner>) {
        loop {
            let (job, wait, pending) = {
                let mut queue = inner.queue.lock().unwrap_or_else(|e| e.into_inner());
                let Some(job) = queue.jobs.pop_front() else {
                    queue.processing = false;
                    return;
                };
                let wait = queue
                    .last_completed
                    .map(|t| (t + inner.min_interval).saturating_duration_since(Instant::now()))
                    .unwrap_or_default();
                (job, wait, queue.jobs.len())
            };

            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }

            tracing::debug!(pending, waited_ms = wait.as_millis() as u64, "dispatching upstream request");
            // Run on its own task so a panicking request can't take the dispatcher down.
            if let Err(e) = tokio::spawn(job()).await {
                tracing::error!(error = %e, "upstream request task failed");
            }

            inner
                .queue
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .last_completed = Some(Instant::now());
        }
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.inner.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Inner {
    /// Perform one upstream call and apply the response policy.
    async fn execute(&self, request: &UpstreamRequest) -> Result<Value, CoreError> {
        let response = self.transport.get(&request.url).await?;

        if response.status == 429 {
            return match fallback::dataset_for(request.category) {
                Some(data) => {
                    self.fallbacks_served.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(category = %request.category, "rate limited, serving fallback data");
                    Ok(data)
                }
                None => {
                    tracing::warn!(category = %request.category, "rate limited, no fallback available");
                    Err(CoreError::RateLimited)
                }
            };
        }

        if !response.is_success() {
            return Err(CoreError::Api {
                status: response.status,
                message: error_message(&response),
            });
        }

        serde_json::from_str(&response.body).map_err(|e| {
            CoreError::Deserialization(format!("Invalid JSON from {}: {e}", request.category))
        })
    }
}

/// Pull a human-readable message out of an error body.
///
/// Understands `{"error": "..."}` and `{"status": {"error_message": "..."}}`;
/// anything else becomes a generic status message.
fn error_message(response: &HttpResponse) -> String {
    let parsed: Option<Value> = serde_json::from_str(&response.body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v.get("error")
                .and_then(Value::as_str)
                .or_else(|| v.pointer("/status/error_message").and_then(Value::as_str))
        })
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP error! status: {}", response.status))
}
