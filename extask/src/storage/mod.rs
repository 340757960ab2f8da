//! The lock lease store: where external tasks live between the engine
//! creating them and a worker reporting back.
//!
//! [`TaskStore`] is the interface the REST surface and embedded workers talk
//! to; [`InMemoryTaskStore`] is the DashMap-backed implementation.
//!
//! A task is LOCKED by at most one worker at a time. All ownership checks
//! happen here, never in clients: a report arriving after the lease ran out
//! is rejected with [`StoreError::LockExpired`].
//!
//! # Example
//!
//! ```
//! use extask::storage::{InMemoryTaskStore, NewExternalTask, NewProcessInstance, TaskStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryTaskStore::new();
//! let instance = store
//!     .create_process_instance(NewProcessInstance::new("invoice"))
//!     .await?;
//! store
//!     .create_external_task(NewExternalTask::new(&instance.id, "charge-card"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::core::VariableDtoMap;
use crate::protocol::{
    BpmnErrorRequest, CompleteRequest, ExtendLockRequest, ExternalTaskDto, FailureRequest,
    FetchAndLockRequest, LockRequest, LockedExternalTaskDto,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

mod error;
pub mod memory;
mod task;

pub use error::{Result, StoreError};
pub use memory::InMemoryTaskStore;
pub use task::{
    truncate_error_message, ExternalTaskRecord, HistoricState, HistoricTask, Incident,
    NewExternalTask, NewProcessInstance, ProcessInstance, TaskState, TopicNameFilter,
    MAX_ERROR_MESSAGE_LENGTH,
};

/// Storage backend for external tasks and the process data they expose.
///
/// Implementations must be thread-safe; concurrent `fetch_and_lock` calls
/// never hand the same task to two workers.
#[async_trait]
pub trait TaskStore: Send + Sync {
    // ===== Engine handoff =====

    /// Starts a process instance holding `variables` in its scope.
    async fn create_process_instance(&self, params: NewProcessInstance) -> Result<ProcessInstance>;

    /// Creates an OPEN external task, as the engine does when execution
    /// reaches an external-task activity.
    async fn create_external_task(&self, params: NewExternalTask) -> Result<ExternalTaskRecord>;

    /// Deletes a process instance and destroys its tasks.
    async fn delete_process_instance(&self, id: &str) -> Result<()>;

    /// Suspended instances' tasks are not fetched, and reports on them fail.
    async fn suspend_process_instance(&self, id: &str) -> Result<()>;

    async fn activate_process_instance(&self, id: &str) -> Result<()>;

    async fn process_instance(&self, id: &str) -> Result<ProcessInstance>;

    /// Sets variables in a process instance's scope. Transient values are
    /// ignored.
    async fn set_variables(&self, process_instance_id: &str, variables: VariableDtoMap) -> Result<()>;

    // ===== Worker protocol =====

    /// Claims up to `max_tasks` OPEN tasks matching the request's topics.
    ///
    /// With an `async_response_timeout`, waits up to that long for work when
    /// none is immediately available. An empty result is not an error.
    async fn fetch_and_lock(&self, request: FetchAndLockRequest) -> Result<Vec<LockedExternalTaskDto>>;

    async fn complete(&self, task_id: &str, request: CompleteRequest) -> Result<()>;

    async fn handle_failure(&self, task_id: &str, request: FailureRequest) -> Result<()>;

    async fn handle_bpmn_error(&self, task_id: &str, request: BpmnErrorRequest) -> Result<()>;

    async fn extend_lock(&self, task_id: &str, request: ExtendLockRequest) -> Result<()>;

    /// Locks a task outside of fetch-and-lock.
    async fn lock(&self, task_id: &str, request: LockRequest) -> Result<()>;

    /// Releases a lock regardless of owner.
    async fn unlock(&self, task_id: &str) -> Result<()>;

    // ===== Operator operations =====

    /// Sets remaining retries. Raising retries above zero resolves an
    /// incident; setting zero raises one.
    async fn set_retries(&self, task_id: &str, retries: i32) -> Result<()>;

    async fn set_priority(&self, task_id: &str, priority: i64) -> Result<()>;

    async fn get_task(&self, task_id: &str) -> Result<ExternalTaskDto>;

    async fn error_details(&self, task_id: &str) -> Result<Option<String>>;

    /// Live tasks of one process instance.
    async fn tasks_for_process_instance(&self, process_instance_id: &str) -> Result<Vec<ExternalTaskRecord>>;

    async fn historic_tasks(&self, process_instance_id: &str) -> Result<Vec<HistoricTask>>;

    async fn incidents(&self) -> Result<Vec<Incident>>;

    /// Distinct topic names of live tasks, sorted.
    async fn topic_names(&self, filter: TopicNameFilter) -> Result<Vec<String>>;
}

// =============================================================================
// CLOCK
// =============================================================================

/// Time source for lease bookkeeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used to expire leases in tests.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: std::time::Duration) {
        let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
