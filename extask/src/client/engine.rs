use super::error::{ClientError, Result};
use crate::core::VariableDtoMap;
use crate::protocol::{
    BpmnErrorRequest, CompleteRequest, ExtendLockRequest, FailureRequest, FetchAndLockRequest,
    LockRequest, LockedExternalTaskDto,
};
use crate::storage::TaskStore;
use async_trait::async_trait;
use std::sync::Arc;

/// Transport between the worker client and the engine.
///
/// Implemented over HTTP by [`super::HttpEngineClient`] and in-process by
/// [`EmbeddedEngine`].
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Fetches and locks tasks. An empty list means no work right now.
    async fn fetch_and_lock(&self, request: FetchAndLockRequest) -> Result<Vec<LockedExternalTaskDto>>;

    async fn complete(&self, task_id: &str, request: CompleteRequest) -> Result<()>;

    async fn handle_failure(&self, task_id: &str, request: FailureRequest) -> Result<()>;

    async fn handle_bpmn_error(&self, task_id: &str, request: BpmnErrorRequest) -> Result<()>;

    async fn extend_lock(&self, task_id: &str, request: ExtendLockRequest) -> Result<()>;

    async fn lock(&self, task_id: &str, request: LockRequest) -> Result<()>;

    async fn unlock(&self, task_id: &str) -> Result<()>;

    async fn set_variables(&self, process_instance_id: &str, variables: VariableDtoMap) -> Result<()>;
}

/// Runs workers against a [`TaskStore`] in the same process.
pub struct EmbeddedEngine {
    store: Arc<dyn TaskStore>,
}

impl EmbeddedEngine {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }
}

#[async_trait]
impl EngineClient for EmbeddedEngine {
    async fn fetch_and_lock(&self, request: FetchAndLockRequest) -> Result<Vec<LockedExternalTaskDto>> {
        Ok(self.store.fetch_and_lock(request).await?)
    }

    async fn complete(&self, task_id: &str, request: CompleteRequest) -> Result<()> {
        Ok(self.store.complete(task_id, request).await?)
    }

    async fn handle_failure(&self, task_id: &str, request: FailureRequest) -> Result<()> {
        Ok(self.store.handle_failure(task_id, request).await?)
    }

    async fn handle_bpmn_error(&self, task_id: &str, request: BpmnErrorRequest) -> Result<()> {
        Ok(self.store.handle_bpmn_error(task_id, request).await?)
    }

    async fn extend_lock(&self, task_id: &str, request: ExtendLockRequest) -> Result<()> {
        Ok(self.store.extend_lock(task_id, request).await?)
    }

    async fn lock(&self, task_id: &str, request: LockRequest) -> Result<()> {
        Ok(self.store.lock(task_id, request).await?)
    }

    async fn unlock(&self, task_id: &str) -> Result<()> {
        Ok(self.store.unlock(task_id).await?)
    }

    async fn set_variables(&self, process_instance_id: &str, variables: VariableDtoMap) -> Result<()> {
        self.store
            .set_variables(process_instance_id, variables)
            .await
            .map_err(ClientError::from)
    }
}
