use super::engine::EngineClient;
use super::error::{ClientError, Result};
use super::task::ExternalTask;
use crate::core::{retry_with_policy, RetryPolicy, VariableCodec, VariableMap};
use crate::protocol::{
    BpmnErrorRequest, CompleteRequest, ExtendLockRequest, FailureRequest, LockRequest,
};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Reports the outcome of one fetched task back to the engine.
///
/// Every call encodes its variables before anything is sent, so a variable
/// without a wire form fails locally with [`ClientError::Codec`] and the
/// task stays locked.
///
/// `complete`, `handle_failure`, `handle_bpmn_error` and `unlock` give the
/// lease up. Once one of them succeeded, every further task call fails with
/// [`ClientError::AlreadyResolved`]. `set_variables` targets the process
/// instance and stays usable.
#[derive(Clone)]
pub struct ExternalTaskService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    task_id: String,
    process_instance_id: String,
    worker_id: String,
    engine: Arc<dyn EngineClient>,
    codec: VariableCodec,
    report_policy: Option<RetryPolicy>,
    resolved: AtomicBool,
}

impl std::fmt::Debug for ExternalTaskService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalTaskService")
            .field("task_id", &self.inner.task_id)
            .field("worker_id", &self.inner.worker_id)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl ExternalTaskService {
    pub(crate) fn new(
        task: &ExternalTask,
        worker_id: impl Into<String>,
        engine: Arc<dyn EngineClient>,
        codec: VariableCodec,
        report_policy: Option<RetryPolicy>,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                task_id: task.id().to_string(),
                process_instance_id: task.process_instance_id().to_string(),
                worker_id: worker_id.into(),
                engine,
                codec,
                report_policy,
                resolved: AtomicBool::new(false),
            }),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.inner.task_id
    }

    pub fn worker_id(&self) -> &str {
        &self.inner.worker_id
    }

    /// True once a terminal call succeeded.
    pub fn is_resolved(&self) -> bool {
        self.inner.resolved.load(Ordering::Acquire)
    }

    /// Completes the task, writing `variables` to the process instance.
    pub async fn complete(&self, variables: VariableMap) -> Result<()> {
        self.complete_with_local(variables, VariableMap::new()).await
    }

    /// Completes the task, writing `variables` to the process instance and
    /// `local_variables` to the task's execution.
    pub async fn complete_with_local(
        &self,
        variables: VariableMap,
        local_variables: VariableMap,
    ) -> Result<()> {
        self.ensure_unresolved()?;
        let request = CompleteRequest {
            worker_id: self.inner.worker_id.clone(),
            variables: self.inner.codec.encode_map(&variables)?,
            local_variables: self.inner.codec.encode_map(&local_variables)?,
        };
        let engine = &self.inner.engine;
        let task_id = self.task_id();
        self.report(|| {
            let request = request.clone();
            async move { engine.complete(task_id, request).await }
        })
        .await?;
        self.resolve("completed");
        Ok(())
    }

    /// Reports a failure. `retries` is the new remaining retry count; zero
    /// raises an incident. The task becomes fetchable again after
    /// `retry_timeout`.
    pub async fn handle_failure(
        &self,
        error_message: impl Into<String>,
        error_details: Option<String>,
        retries: i32,
        retry_timeout: Duration,
    ) -> Result<()> {
        self.handle_failure_with_variables(
            error_message,
            error_details,
            retries,
            retry_timeout,
            VariableMap::new(),
            VariableMap::new(),
        )
        .await
    }

    pub async fn handle_failure_with_variables(
        &self,
        error_message: impl Into<String>,
        error_details: Option<String>,
        retries: i32,
        retry_timeout: Duration,
        variables: VariableMap,
        local_variables: VariableMap,
    ) -> Result<()> {
        self.ensure_unresolved()?;
        let request = FailureRequest {
            worker_id: self.inner.worker_id.clone(),
            error_message: Some(error_message.into()),
            error_details,
            retries,
            retry_timeout: millis(retry_timeout),
            variables: self.inner.codec.encode_map(&variables)?,
            local_variables: self.inner.codec.encode_map(&local_variables)?,
        };
        let engine = &self.inner.engine;
        let task_id = self.task_id();
        self.report(|| {
            let request = request.clone();
            async move { engine.handle_failure(task_id, request).await }
        })
        .await?;
        self.resolve("failed");
        Ok(())
    }

    /// Throws a business error to be caught by the process model.
    pub async fn handle_bpmn_error(
        &self,
        error_code: impl Into<String>,
        error_message: Option<String>,
        variables: VariableMap,
    ) -> Result<()> {
        self.ensure_unresolved()?;
        let request = BpmnErrorRequest {
            worker_id: self.inner.worker_id.clone(),
            error_code: error_code.into(),
            error_message,
            variables: self.inner.codec.encode_map(&variables)?,
        };
        let engine = &self.inner.engine;
        let task_id = self.task_id();
        self.report(|| {
            let request = request.clone();
            async move { engine.handle_bpmn_error(task_id, request).await }
        })
        .await?;
        self.resolve("resolved with a BPMN error");
        Ok(())
    }

    /// Sets the lock expiration to now plus `new_duration`.
    pub async fn extend_lock(&self, new_duration: Duration) -> Result<()> {
        self.ensure_unresolved()?;
        let request = ExtendLockRequest {
            worker_id: self.inner.worker_id.clone(),
            new_duration: millis(new_duration),
        };
        let engine = &self.inner.engine;
        let task_id = self.task_id();
        self.report(|| {
            let request = request.clone();
            async move { engine.extend_lock(task_id, request).await }
        })
        .await
    }

    pub async fn lock(&self, lock_duration: Duration) -> Result<()> {
        self.ensure_unresolved()?;
        let request = LockRequest {
            worker_id: self.inner.worker_id.clone(),
            lock_duration: millis(lock_duration),
        };
        let engine = &self.inner.engine;
        let task_id = self.task_id();
        self.report(|| {
            let request = request.clone();
            async move { engine.lock(task_id, request).await }
        })
        .await
    }

    /// Releases the lease without reporting an outcome.
    pub async fn unlock(&self) -> Result<()> {
        self.ensure_unresolved()?;
        let engine = &self.inner.engine;
        let task_id = self.task_id();
        self.report(|| async move { engine.unlock(task_id).await })
            .await?;
        self.resolve("unlocked");
        Ok(())
    }

    /// Writes variables to the task's process instance.
    pub async fn set_variables(&self, variables: VariableMap) -> Result<()> {
        let encoded = self.inner.codec.encode_map(&variables)?;
        let engine = &self.inner.engine;
        let process_instance_id = self.inner.process_instance_id.as_str();
        self.report(|| {
            let encoded = encoded.clone();
            async move { engine.set_variables(process_instance_id, encoded).await }
        })
        .await
    }

    fn ensure_unresolved(&self) -> Result<()> {
        if self.is_resolved() {
            return Err(ClientError::AlreadyResolved(self.inner.task_id.clone()));
        }
        Ok(())
    }

    fn resolve(&self, outcome: &str) {
        self.inner.resolved.store(true, Ordering::Release);
        debug!(
            "Worker {} {} external task {}",
            self.inner.worker_id, outcome, self.inner.task_id
        );
    }

    async fn report<F, Fut>(&self, mut call: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        retry_with_policy(self.inner.report_policy, |_| call()).await
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::EmbeddedEngine;
    use crate::core::{TypedValue, TypedValueDto, Value};
    use crate::protocol::{FetchAndLockRequest, FetchTopic};
    use crate::storage::{
        InMemoryTaskStore, NewExternalTask, NewProcessInstance, StoreError, TaskStore,
    };
    use serde_json::json;

    struct Fixture {
        store: Arc<InMemoryTaskStore>,
        service: ExternalTaskService,
        process_instance_id: String,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryTaskStore::new());
        let instance = store
            .create_process_instance(NewProcessInstance::new("invoice"))
            .await
            .unwrap();
        store
            .create_external_task(NewExternalTask::new(&instance.id, "T"))
            .await
            .unwrap();
        let locked = store
            .fetch_and_lock(FetchAndLockRequest {
                worker_id: "w1".into(),
                max_tasks: 1,
                use_priority: false,
                async_response_timeout: None,
                topics: vec![FetchTopic::new("T", 5_000)],
            })
            .await
            .unwrap();
        let codec = VariableCodec::default();
        let task = ExternalTask::from_dto(locked[0].clone(), &codec).unwrap();
        let engine: Arc<dyn EngineClient> = Arc::new(EmbeddedEngine::new(store.clone()));
        let service = ExternalTaskService::new(&task, "w1", engine, codec, None);
        Fixture {
            store,
            service,
            process_instance_id: instance.id,
        }
    }

    #[tokio::test]
    async fn test_complete_resolves_handle() {
        let f = fixture().await;
        let mut variables = VariableMap::new();
        variables.insert("y".into(), TypedValue::new("done"));
        f.service.complete(variables).await.unwrap();
        assert!(f.service.is_resolved());

        let process = f.store.process_instance(&f.process_instance_id).await.unwrap();
        assert_eq!(
            process.variables.get("y"),
            Some(&TypedValueDto::new("String", json!("done")))
        );

        let again = f.service.complete(VariableMap::new()).await.unwrap_err();
        assert!(matches!(again, ClientError::AlreadyResolved(_)));
        let extend = f.service.extend_lock(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(extend, ClientError::AlreadyResolved(_)));
    }

    #[tokio::test]
    async fn test_unencodable_variable_fails_before_sending() {
        let f = fixture().await;
        let mut variables = VariableMap::new();
        variables.insert("d".into(), TypedValue::new(f64::NAN));
        let err = f.service.complete(variables).await.unwrap_err();
        assert!(matches!(err, ClientError::Codec(_)));
        assert!(!f.service.is_resolved());

        // Lease is untouched
        let task = f.store.get_task(f.service.task_id()).await.unwrap();
        assert_eq!(task.worker_id.as_deref(), Some("w1"));
    }

    #[tokio::test]
    async fn test_failure_with_zero_retries_raises_incident() {
        let f = fixture().await;
        f.service
            .handle_failure("boom", Some("trace".into()), 0, Duration::ZERO)
            .await
            .unwrap();
        let incidents = f.store.incidents().await.unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].message.as_deref(), Some("boom"));
        assert_eq!(
            f.store.error_details(f.service.task_id()).await.unwrap().as_deref(),
            Some("trace")
        );
    }

    #[tokio::test]
    async fn test_set_variables_stays_usable_after_resolution() {
        let f = fixture().await;
        f.service
            .handle_bpmn_error("E_CARD", None, VariableMap::new())
            .await
            .unwrap();
        let mut variables = VariableMap::new();
        variables.insert("audit".into(), TypedValue::new(Value::Boolean(true)));
        f.service.set_variables(variables).await.unwrap();

        let process = f.store.process_instance(&f.process_instance_id).await.unwrap();
        assert!(process.variables.contains_key("audit"));
    }

    #[tokio::test]
    async fn test_unlock_returns_task_to_the_pool() {
        let f = fixture().await;
        f.service.unlock().await.unwrap();
        let task = f.store.get_task(f.service.task_id()).await.unwrap();
        assert_eq!(task.worker_id, None);
        assert!(matches!(
            f.store.get_task("missing").await,
            Err(StoreError::TaskNotFound(_))
        ));
    }
}
