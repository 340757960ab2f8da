//! The poll loop and the handler dispatcher.
//!
//! One loop runs per client. Each cycle sends a single fetch-and-lock
//! request covering every open subscription, then hands each locked task to
//! its topic's handler on a [`JoinSet`]. Handlers never run on the loop
//! itself, so a slow handler does not delay the next fetch.

use super::backoff::ExponentialBackoff;
use super::builder::ExternalTaskClientBuilder;
use super::config::ClientConfig;
use super::engine::EngineClient;
use super::error::{ClientError, Result};
use super::service::ExternalTaskService;
use super::subscription::{Subscription, TopicSubscriptionBuilder};
use super::task::ExternalTask;
use crate::core::VariableCodec;
use crate::protocol::{FetchAndLockRequest, LockedExternalTaskDto};
use dashmap::{DashMap, DashSet};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// Receives every error the client hits outside a caller's control flow:
/// failed fetches, skipped tasks, failed handlers and failed implicit reports.
pub type ErrorListener = Arc<dyn Fn(&ClientError) + Send + Sync>;

// ============================================================================
// Shared State
// ============================================================================

pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    pub(crate) engine: Arc<dyn EngineClient>,
    pub(crate) codec: VariableCodec,
    subscriptions: DashMap<String, Arc<Subscription>>,
    /// Task ids whose handler has not returned yet.
    dispatched: DashSet<String>,
    error_listener: Option<ErrorListener>,
    permits: Option<Arc<Semaphore>>,
    wake: Notify,
    poller: Mutex<Option<Poller>>,
}

struct Poller {
    handle: JoinHandle<()>,
    cancellation_token: CancellationToken,
}

impl ClientInner {
    pub(crate) fn new(
        config: ClientConfig,
        engine: Arc<dyn EngineClient>,
        codec: VariableCodec,
        error_listener: Option<ErrorListener>,
    ) -> Self {
        let permits = config
            .max_concurrent_handlers
            .map(|n| Arc::new(Semaphore::new(n)));
        Self {
            config,
            engine,
            codec,
            subscriptions: DashMap::new(),
            dispatched: DashSet::new(),
            error_listener,
            permits,
            wake: Notify::new(),
            poller: Mutex::new(None),
        }
    }

    pub(crate) fn add_subscription(&self, subscription: Arc<Subscription>) -> Result<()> {
        use dashmap::mapref::entry::Entry;
        match self.subscriptions.entry(subscription.topic_name.clone()) {
            Entry::Occupied(_) => Err(ClientError::InvalidSubscription(format!(
                "Topic name '{}' has already been subscribed",
                subscription.topic_name
            ))),
            Entry::Vacant(entry) => {
                entry.insert(subscription);
                self.wake.notify_one();
                Ok(())
            }
        }
    }

    pub(crate) fn remove_subscription(&self, topic_name: &str) {
        self.subscriptions.remove(topic_name);
    }

    fn report_error(&self, error: ClientError) {
        if let Some(listener) = &self.error_listener {
            listener(&error);
        }
    }

    /// Starts the poll loop unless it is already running.
    pub(crate) fn start(inner: &Arc<Self>) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            ClientError::Config("the client must be started inside a tokio runtime".to_string())
        })?;
        let mut poller = inner.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if poller.as_ref().is_some_and(|p| !p.handle.is_finished()) {
            return Ok(());
        }

        let cancellation_token = CancellationToken::new();
        let loop_token = cancellation_token.clone();
        let loop_inner = inner.clone();
        info!("Starting worker: {}", inner.config.worker_id);
        let handle = runtime.spawn(async move { loop_inner.poll_loop(loop_token).await });
        *poller = Some(Poller {
            handle,
            cancellation_token,
        });
        Ok(())
    }

    fn take_poller(&self) -> Option<Poller> {
        self.poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn is_running(&self) -> bool {
        self.poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|p| !p.handle.is_finished())
    }

    /// Builds this cycle's request, or `None` when there is nothing to ask
    /// for: no subscriptions, or no free handler slot.
    fn fetch_request(&self) -> Option<FetchAndLockRequest> {
        let mut capacity = usize::try_from(self.config.max_tasks).unwrap_or(0);
        if let Some(permits) = &self.permits {
            capacity = capacity.min(permits.available_permits());
        }
        if capacity == 0 || self.subscriptions.is_empty() {
            return None;
        }
        let mut topics: Vec<_> = self
            .subscriptions
            .iter()
            .map(|entry| entry.value().fetch_topic())
            .collect();
        topics.sort_by(|a, b| a.topic_name.cmp(&b.topic_name));
        Some(FetchAndLockRequest {
            worker_id: self.config.worker_id.clone(),
            max_tasks: i32::try_from(capacity).unwrap_or(i32::MAX),
            use_priority: self.config.use_priority,
            async_response_timeout: self.config.async_response_timeout,
            topics,
        })
    }

    // ========================================================================
    // Poll Loop
    // ========================================================================

    async fn poll_loop(self: Arc<Self>, token: CancellationToken) {
        let worker_id = self.config.worker_id.clone();
        let mut handlers: JoinSet<()> = JoinSet::new();
        let mut backoff = ExponentialBackoff::new(self.config.backoff);

        loop {
            // Reap finished handlers (non-blocking)
            while let Some(result) = handlers.try_join_next() {
                if let Err(e) = result {
                    error!("Worker {} handler task failed: {}", worker_id, e);
                }
            }

            let Some(request) = self.fetch_request() else {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = self.wake.notified() => {}
                    Some(result) = handlers.join_next(), if !handlers.is_empty() => {
                        if let Err(e) = result {
                            error!("Worker {} handler task failed: {}", worker_id, e);
                        }
                    }
                }
                continue;
            };

            let topic_count = request.topics.len();
            let fetched = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                fetched = self.engine.fetch_and_lock(request) => fetched,
            };

            let delay = match fetched {
                Ok(tasks) if !tasks.is_empty() => {
                    debug!(
                        "Worker {} fetched {} tasks across {} topics",
                        worker_id,
                        tasks.len(),
                        topic_count
                    );
                    backoff.reset();
                    for dto in tasks {
                        self.dispatch(dto, &mut handlers).await;
                    }
                    continue;
                }
                Ok(_) => backoff.next_delay(),
                Err(e) => {
                    warn!("Worker {} failed to fetch and lock: {}", worker_id, e);
                    self.report_error(e);
                    backoff.next_delay()
                }
            };

            let delay = backoff.jittered(delay);
            debug!(
                "Worker {} backing off for {:?} (level {})",
                worker_id,
                delay,
                backoff.level()
            );
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = self.wake.notified() => backoff.reset(),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Worker {} received shutdown signal", worker_id);
        let in_flight = handlers.len();
        if in_flight > 0 {
            info!(
                "Worker {} waiting for {} in-flight handlers to complete",
                worker_id, in_flight
            );
            while let Some(result) = handlers.join_next().await {
                if let Err(e) = result {
                    error!("Worker {} handler task failed: {}", worker_id, e);
                }
            }
        }
        info!("Worker {} stopped", worker_id);
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    async fn dispatch(self: &Arc<Self>, dto: LockedExternalTaskDto, handlers: &mut JoinSet<()>) {
        let worker_id = &self.config.worker_id;
        let subscription = self
            .subscriptions
            .get(&dto.topic_name)
            .map(|entry| Arc::clone(entry.value()));
        let Some(subscription) = subscription else {
            debug!(
                "Worker {} fetched task {} for closed topic '{}', unlocking it",
                worker_id, dto.id, dto.topic_name
            );
            if let Err(e) = self.engine.unlock(&dto.id).await {
                debug!("Worker {} failed to unlock task {}: {}", worker_id, dto.id, e);
            }
            return;
        };

        if !self.dispatched.insert(dto.id.clone()) {
            debug!(
                "Worker {} skipped task {}: its handler is still running",
                worker_id, dto.id
            );
            return;
        }

        let task_id = dto.id.clone();
        let task = match ExternalTask::from_dto(dto, &self.codec) {
            Ok(task) => task,
            Err(source) => {
                self.dispatched.remove(&task_id);
                warn!(
                    "Worker {} skipped external task {}: {}. It stays locked until its lease expires",
                    worker_id, task_id, source
                );
                self.report_error(ClientError::Decode { task_id, source });
                return;
            }
        };

        let permit = match &self.permits {
            Some(semaphore) => match semaphore.clone().acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => {
                    error!("Worker {} semaphore closed unexpectedly", worker_id);
                    self.dispatched.remove(&task_id);
                    return;
                }
            },
            None => None,
        };

        let span = tracing::info_span!(
            "external_task",
            worker_id = %worker_id,
            topic = %task.topic_name(),
            task_id = %task.id(),
        );
        handlers.spawn(self.clone().execute(subscription, task, permit).instrument(span));
    }

    async fn execute(
        self: Arc<Self>,
        subscription: Arc<Subscription>,
        task: ExternalTask,
        permit: Option<OwnedSemaphorePermit>,
    ) {
        // Held until the handler and any implicit report are done
        let _permit = permit;
        let worker_id = &self.config.worker_id;
        let task_id = task.id().to_string();
        let retries = task.retries();
        let service = ExternalTaskService::new(
            &task,
            worker_id.as_str(),
            self.engine.clone(),
            self.codec.clone(),
            self.config.report_retry_policy,
        );

        let outcome = AssertUnwindSafe(subscription.handler.execute(task, service.clone()))
            .catch_unwind()
            .await;
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some((e.to_string(), format!("{:?}", e))),
            Err(panic) => Some((panic_message(panic.as_ref()), "handler panicked".to_string())),
        };

        match failure {
            None if !service.is_resolved() => debug!(
                "Handler for external task {} returned without reporting; it stays locked until its lease expires",
                task_id
            ),
            None => {}
            Some((message, details)) => {
                warn!(
                    "Worker {} handler for external task {} failed: {}",
                    worker_id, task_id, message
                );
                self.report_error(ClientError::Handler {
                    task_id: task_id.clone(),
                    message: message.clone(),
                });
                if !service.is_resolved() {
                    let policy = subscription
                        .retry_policy
                        .unwrap_or(self.config.failure_retry_policy);
                    let (retries, timeout) = policy.failure_report(retries);
                    match service
                        .handle_failure(message, Some(details), retries, timeout)
                        .await
                    {
                        Ok(()) => debug!(
                            "Worker {} reported failure of external task {} ({} retries left, retry in {:?})",
                            worker_id, task_id, retries, timeout
                        ),
                        Err(e) if e.is_lock_conflict() => debug!(
                            "Worker {} lost the lease on external task {} before reporting its failure: {}",
                            worker_id, task_id, e
                        ),
                        Err(e) => {
                            warn!(
                                "Worker {} failed to report failure of external task {}: {}",
                                worker_id, task_id, e
                            );
                            self.report_error(e);
                        }
                    }
                }
            }
        }
        self.dispatched.remove(&task_id);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("handler panicked: {}", message)
    } else {
        "handler panicked".to_string()
    }
}

// ============================================================================
// Client
// ============================================================================

/// Worker client: subscriptions, the poll loop and the handler pool.
///
/// Cheap to clone; clones share one poll loop.
#[derive(Clone)]
pub struct ExternalTaskClient {
    inner: Arc<ClientInner>,
}

impl ExternalTaskClient {
    pub fn builder() -> ExternalTaskClientBuilder {
        ExternalTaskClientBuilder::new()
    }

    pub(crate) fn from_inner(inner: ClientInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Starts configuring a subscription to `topic_name`.
    pub fn subscribe(&self, topic_name: impl Into<String>) -> TopicSubscriptionBuilder {
        TopicSubscriptionBuilder::new(self.inner.clone(), topic_name)
    }

    /// Starts the poll loop. Needed only with `auto_fetching` disabled;
    /// a no-op while the loop runs.
    pub fn start(&self) -> Result<()> {
        ClientInner::start(&self.inner)
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    /// Stops polling and waits for in-flight handlers to finish.
    pub async fn stop(&self) {
        let Some(poller) = self.inner.take_poller() else {
            return;
        };
        poller.cancellation_token.cancel();
        if let Err(e) = poller.handle.await {
            error!("Worker {} poll loop ended abnormally: {}", self.inner.config.worker_id, e);
        }
    }

    /// Stops polling and aborts in-flight handlers. Their tasks return to
    /// the pool once their leases expire.
    pub async fn stop_now(&self) {
        let Some(poller) = self.inner.take_poller() else {
            return;
        };
        poller.cancellation_token.cancel();
        poller.handle.abort();
        // Dropping the loop's JoinSet aborts the handler tasks
        let _ = poller.handle.await;
        self.inner.dispatched.clear();
        info!("Worker {} aborted", self.inner.config.worker_id);
    }

    pub fn worker_id(&self) -> &str {
        &self.inner.config.worker_id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn codec(&self) -> &VariableCodec {
        &self.inner.codec
    }

    /// Topics currently subscribed, sorted.
    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .inner
            .subscriptions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Number of tasks whose handler has not returned yet.
    pub fn in_flight(&self) -> usize {
        self.inner.dispatched.len()
    }
}

impl std::fmt::Debug for ExternalTaskClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalTaskClient")
            .field("worker_id", &self.inner.config.worker_id)
            .field("topics", &self.topic_names())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::EmbeddedEngine;
    use crate::core::BoxError;
    use crate::storage::InMemoryTaskStore;
    use std::time::Duration;

    fn client() -> ExternalTaskClient {
        let store = Arc::new(InMemoryTaskStore::new());
        ExternalTaskClient::builder()
            .engine(Arc::new(EmbeddedEngine::new(store)))
            .worker_id("w1")
            .max_tasks(4)
            .auto_fetching(false)
            .build()
            .unwrap()
    }

    async fn noop(_task: ExternalTask, _service: ExternalTaskService) -> std::result::Result<(), BoxError> {
        Ok(())
    }

    #[tokio::test]
    async fn test_request_batches_all_topics() {
        let client = client();
        assert!(client.inner.fetch_request().is_none());

        client
            .subscribe("b")
            .lock_duration(Duration::from_secs(5))
            .handler(noop)
            .open()
            .unwrap();
        client
            .subscribe("a")
            .variables(["x"])
            .handler(noop)
            .open()
            .unwrap();

        let request = client.inner.fetch_request().unwrap();
        assert_eq!(request.worker_id, "w1");
        assert_eq!(request.max_tasks, 4);
        let names: Vec<_> = request.topics.iter().map(|t| t.topic_name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(request.topics[0].lock_duration, 20_000);
        assert_eq!(request.topics[0].variables, Some(vec!["x".to_string()]));
        assert_eq!(request.topics[1].lock_duration, 5_000);
        assert_eq!(request.topics[1].variables, None);
    }

    #[tokio::test]
    async fn test_invalid_subscriptions_are_rejected() {
        let client = client();
        let empty = client.subscribe("  ").handler(noop).open().unwrap_err();
        assert!(matches!(empty, ClientError::InvalidSubscription(_)));

        let no_handler = client.subscribe("T").open().unwrap_err();
        assert!(matches!(no_handler, ClientError::InvalidSubscription(_)));

        let zero_lock = client
            .subscribe("T")
            .lock_duration(Duration::ZERO)
            .handler(noop)
            .open()
            .unwrap_err();
        assert!(matches!(zero_lock, ClientError::InvalidSubscription(_)));

        client.subscribe("T").handler(noop).open().unwrap();
        let duplicate = client.subscribe("T").handler(noop).open().unwrap_err();
        assert_eq!(
            duplicate.to_string(),
            "invalid subscription: Topic name 'T' has already been subscribed"
        );
    }

    #[tokio::test]
    async fn test_close_unsubscribes() {
        let client = client();
        let subscription = client.subscribe("T").handler(noop).open().unwrap();
        assert_eq!(client.topic_names(), ["T"]);
        subscription.close();
        assert!(client.topic_names().is_empty());

        // The topic can be subscribed again
        client.subscribe("T").handler(noop).open().unwrap();
    }

    #[tokio::test]
    async fn test_capacity_is_bounded_by_free_handler_slots() {
        let store = Arc::new(InMemoryTaskStore::new());
        let client = ExternalTaskClient::builder()
            .engine(Arc::new(EmbeddedEngine::new(store)))
            .max_tasks(10)
            .max_concurrent_handlers(3)
            .auto_fetching(false)
            .build()
            .unwrap();
        client.subscribe("T").handler(noop).open().unwrap();
        assert_eq!(client.inner.fetch_request().unwrap().max_tasks, 3);

        let permits = client.inner.permits.clone().unwrap();
        let _held = permits.acquire_many_owned(3).await.unwrap();
        assert!(client.inner.fetch_request().is_none());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "handler panicked: boom");
        let payload: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(payload.as_ref()), "handler panicked");
    }
}
