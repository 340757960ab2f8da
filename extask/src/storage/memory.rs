use super::error::{Result, StoreError};
use super::task::{
    truncate_error_message, ExternalTaskRecord, HistoricState, HistoricTask, Incident,
    NewExternalTask, NewProcessInstance, ProcessInstance, TopicNameFilter,
};
use super::{Clock, SystemClock, TaskStore};
use crate::core::{CodecError, TypedValueDto, ValueKind, VariableDtoMap};
use crate::protocol::{
    BpmnErrorRequest, CompleteRequest, ExtendLockRequest, ExternalTaskDto, FailureRequest,
    FetchAndLockRequest, FetchTopic, LockRequest, LockedExternalTaskDto,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Upper bound on one long-poll wait before the store re-checks for work
/// that became claimable without a notification (expired leases, elapsed
/// retry timeouts).
const LONG_POLL_RECHECK: Duration = Duration::from_millis(200);

/// In-memory lock lease store using DashMap for concurrent access.
///
/// Claims are made under the task entry's shard lock, re-checking
/// claimability after candidates are selected, so two concurrent fetches
/// never lock the same task. Lease expiry is not a timer: an expired lock is
/// simply treated as OPEN by the next fetch.
///
/// Lock order is always task entry before process entry.
pub struct InMemoryTaskStore {
    tasks: DashMap<String, ExternalTaskRecord>,
    processes: DashMap<String, ProcessInstance>,
    history: DashMap<String, HistoricTask>,
    incidents: DashMap<String, Incident>,
    sequence: AtomicU64,
    /// Wakes long-polling fetches when tasks become claimable
    work_notify: Arc<Notify>,
    clock: Arc<dyn Clock>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a store reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tasks: DashMap::new(),
            processes: DashMap::new(),
            history: DashMap::new(),
            incidents: DashMap::new(),
            sequence: AtomicU64::new(0),
            work_notify: Arc::new(Notify::new()),
            clock,
        }
    }

    /// Notified whenever a task may have become claimable.
    pub fn work_notify(&self) -> &Arc<Notify> {
        &self.work_notify
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn is_suspended(&self, process_instance_id: &str) -> bool {
        self.processes
            .get(process_instance_id)
            .map(|p| p.suspended)
            .unwrap_or(false)
    }

    fn check_not_suspended(&self, task: &ExternalTaskRecord) -> Result<()> {
        if self.is_suspended(&task.process_instance_id) {
            return Err(StoreError::Suspended(task.id.clone()));
        }
        Ok(())
    }

    /// Verifies that `worker_id` holds a live lease on `task`.
    fn check_owner(
        &self,
        task: &ExternalTaskRecord,
        worker_id: &str,
        action: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.check_not_suspended(task)?;
        match task.worker_id.as_deref() {
            Some(owner) if owner == worker_id => {
                if task.is_lock_held(now) {
                    Ok(())
                } else {
                    Err(StoreError::LockExpired {
                        id: task.id.clone(),
                        worker_id: worker_id.to_string(),
                    })
                }
            }
            Some(owner) => Err(StoreError::LockConflict(format!(
                "External task {} cannot be {} by worker '{}'. It is locked by worker '{}'.",
                task.id, action, worker_id, owner
            ))),
            None => Err(StoreError::LockConflict(format!(
                "External task {} cannot be {} by worker '{}'. It is not locked.",
                task.id, action, worker_id
            ))),
        }
    }

    /// Removes the task if `worker_id` holds its lease, atomically with the check.
    fn take_owned(
        &self,
        task_id: &str,
        worker_id: &str,
        action: &str,
        now: DateTime<Utc>,
    ) -> Result<ExternalTaskRecord> {
        let mut rejection = None;
        let removed = self.tasks.remove_if(task_id, |_, task| {
            match self.check_owner(task, worker_id, action, now) {
                Ok(()) => true,
                Err(e) => {
                    rejection = Some(e);
                    false
                }
            }
        });
        match (removed, rejection) {
            (Some((_, task)), _) => Ok(task),
            (None, Some(e)) => Err(e),
            (None, None) => Err(StoreError::TaskNotFound(task_id.to_string())),
        }
    }

    /// Applies `update` to the task if `worker_id` holds its lease.
    fn update_owned<T>(
        &self,
        task_id: &str,
        worker_id: &str,
        action: &str,
        now: DateTime<Utc>,
        update: impl FnOnce(&mut ExternalTaskRecord) -> T,
    ) -> Result<T> {
        let mut entry = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))?;
        self.check_owner(&entry, worker_id, action, now)?;
        Ok(update(&mut entry))
    }

    fn archive(&self, task: ExternalTaskRecord, state: HistoricState, now: DateTime<Utc>) {
        let worker_id = task.worker_id.clone();
        self.history.insert(
            task.id.clone(),
            HistoricTask {
                task,
                state,
                worker_id,
                ended_at: now,
            },
        );
    }

    fn write_process_variables(&self, process_instance_id: &str, variables: &VariableDtoMap) {
        if variables.is_empty() {
            return;
        }
        match self.processes.get_mut(process_instance_id) {
            Some(mut process) => {
                for (name, value) in persistable(variables) {
                    process.variables.insert(name, value);
                }
            }
            None => warn!(
                "Dropping {} variable(s) for missing process instance {}",
                variables.len(),
                process_instance_id
            ),
        }
    }

    fn raise_incident(&self, task: &ExternalTaskRecord, now: DateTime<Utc>) {
        let incident = Incident {
            id: Uuid::new_v4().to_string(),
            task_id: task.id.clone(),
            process_instance_id: task.process_instance_id.clone(),
            message: task.error_message.clone(),
            created_at: now,
            resolved_at: None,
        };
        warn!(
            "External task {} on topic '{}' ran out of retries, incident {} raised",
            task.id, task.topic_name, incident.id
        );
        self.incidents.insert(incident.id.clone(), incident);
    }

    fn resolve_incidents(&self, task_id: &str, now: DateTime<Utc>) {
        for mut incident in self.incidents.iter_mut() {
            if incident.task_id == task_id && incident.is_open() {
                incident.resolved_at = Some(now);
                info!("Incident {} for external task {} resolved", incident.id, task_id);
            }
        }
    }

    fn matches_topic(&self, task: &ExternalTaskRecord, topic: &FetchTopic) -> bool {
        if task.topic_name != topic.topic_name {
            return false;
        }
        if topic
            .business_key
            .as_ref()
            .is_some_and(|key| task.business_key.as_ref() != Some(key))
        {
            return false;
        }
        if topic
            .process_definition_key
            .as_ref()
            .is_some_and(|key| &task.process_definition_key != key)
        {
            return false;
        }
        if topic
            .process_definition_key_in
            .as_ref()
            .is_some_and(|keys| !keys.contains(&task.process_definition_key))
        {
            return false;
        }
        if !topic.process_variables.is_empty() && !self.has_any_variable(task, topic) {
            return false;
        }
        !self.is_suspended(&task.process_instance_id)
    }

    fn has_any_variable(&self, task: &ExternalTaskRecord, topic: &FetchTopic) -> bool {
        let Some(process) = self.processes.get(&task.process_instance_id) else {
            return false;
        };
        topic.process_variables.iter().any(|(name, value)| {
            process
                .variables
                .get(name)
                .is_some_and(|variable| &variable.value == value)
        })
    }

    /// One non-blocking claim pass.
    fn try_lock(&self, request: &FetchAndLockRequest) -> Vec<LockedExternalTaskDto> {
        let now = self.now();
        let max_tasks = usize::try_from(request.max_tasks).unwrap_or(0);

        let mut candidates: Vec<(i64, u64, String, usize)> = self
            .tasks
            .iter()
            .filter_map(|entry| {
                let task = entry.value();
                if !task.is_claimable(now) {
                    return None;
                }
                let topic = request
                    .topics
                    .iter()
                    .position(|topic| self.matches_topic(task, topic))?;
                Some((task.priority, task.sequence, task.id.clone(), topic))
            })
            .collect();

        if request.use_priority {
            candidates.sort_by_key(|(priority, sequence, _, _)| (Reverse(*priority), *sequence));
        } else {
            candidates.sort_by_key(|(_, sequence, _, _)| *sequence);
        }

        let mut locked = Vec::new();
        for (_, _, task_id, topic) in candidates {
            if locked.len() >= max_tasks {
                break;
            }
            let topic = &request.topics[topic];
            let Some(mut entry) = self.tasks.get_mut(&task_id) else {
                continue;
            };
            // Lost a race with another fetch or a report
            if !entry.is_claimable(now) {
                continue;
            }
            entry.lock(
                &request.worker_id,
                now + chrono::Duration::milliseconds(topic.lock_duration),
            );
            let task = entry.clone();
            drop(entry);

            debug!(
                "Worker {} locked external task {} on topic '{}' until {:?}",
                request.worker_id, task.id, task.topic_name, task.lock_expiration_time
            );
            locked.push(self.locked_dto(&task, topic));
        }
        locked
    }

    fn locked_dto(&self, task: &ExternalTaskRecord, topic: &FetchTopic) -> LockedExternalTaskDto {
        let mut visible = VariableDtoMap::new();
        if !topic.local_variables {
            if let Some(process) = self.processes.get(&task.process_instance_id) {
                visible.extend(process.variables.clone());
            }
        }
        visible.extend(task.local_variables.clone());

        let variables = match &topic.variables {
            None => visible,
            Some(names) => names
                .iter()
                .filter_map(|name| visible.get(name).map(|v| (name.clone(), v.clone())))
                .collect(),
        };

        LockedExternalTaskDto {
            id: task.id.clone(),
            topic_name: task.topic_name.clone(),
            worker_id: task.worker_id.clone().unwrap_or_default(),
            lock_expiration_time: task.lock_expiration_time,
            retries: task.retries,
            error_message: task.error_message.clone(),
            error_details: task.error_details.clone(),
            process_instance_id: task.process_instance_id.clone(),
            process_definition_key: Some(task.process_definition_key.clone()),
            business_key: task.business_key.clone(),
            activity_id: task.activity_id.clone(),
            activity_instance_id: Some(task.activity_instance_id.clone()),
            priority: task.priority,
            variables,
        }
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

fn require_worker_id(worker_id: &str) -> Result<()> {
    if worker_id.is_empty() {
        return Err(StoreError::invalid("workerId is null"));
    }
    Ok(())
}

fn require_positive_lock(duration: i64) -> Result<()> {
    if duration <= 0 {
        return Err(StoreError::invalid("lockTime is not greater than 0"));
    }
    Ok(())
}

/// Rejects variables whose wire form cannot be decoded by any worker.
fn validate_variables(variables: &VariableDtoMap) -> Result<()> {
    for (name, dto) in variables {
        let codec_error = |source: CodecError| StoreError::Codec {
            name: name.clone(),
            source,
        };
        let Some(type_name) = dto.value_type.as_deref() else {
            continue;
        };
        let kind = ValueKind::from_type_name(type_name)
            .ok_or_else(|| codec_error(CodecError::unsupported(type_name, "unknown value type")))?;
        if kind == ValueKind::Object && !dto.value.is_null() {
            let info = &dto.value_info;
            if info.object_type_name.is_none() {
                return Err(codec_error(CodecError::MissingObjectTypeName));
            }
            if info.serialization_data_format.is_none() {
                return Err(codec_error(CodecError::unsupported(
                    info.object_type_name.clone().unwrap_or_default(),
                    "no 'serializationDataFormat' provided for object value",
                )));
            }
        }
    }
    Ok(())
}

/// Variables that are stored; transient ones are dropped.
fn persistable(variables: &VariableDtoMap) -> impl Iterator<Item = (String, TypedValueDto)> + '_ {
    variables
        .iter()
        .filter(|(_, dto)| !dto.is_transient())
        .map(|(name, dto)| (name.clone(), dto.clone()))
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_process_instance(&self, params: NewProcessInstance) -> Result<ProcessInstance> {
        validate_variables(&params.variables)?;
        let instance = ProcessInstance {
            id: Uuid::new_v4().to_string(),
            process_definition_key: params.process_definition_key,
            business_key: params.business_key,
            variables: persistable(&params.variables).collect(),
            suspended: false,
        };
        self.processes.insert(instance.id.clone(), instance.clone());
        debug!(
            "Started process instance {} of '{}'",
            instance.id, instance.process_definition_key
        );
        Ok(instance)
    }

    async fn create_external_task(&self, params: NewExternalTask) -> Result<ExternalTaskRecord> {
        validate_variables(&params.local_variables)?;
        let (definition_key, business_key) = {
            let process = self
                .processes
                .get(&params.process_instance_id)
                .ok_or_else(|| StoreError::ProcessInstanceNotFound(params.process_instance_id.clone()))?;
            (process.process_definition_key.clone(), process.business_key.clone())
        };
        let task = ExternalTaskRecord {
            id: Uuid::new_v4().to_string(),
            topic_name: params.topic_name,
            worker_id: None,
            lock_expiration_time: None,
            retries: None,
            error_message: None,
            error_details: None,
            process_instance_id: params.process_instance_id,
            process_definition_key: definition_key,
            business_key,
            activity_instance_id: format!("{}:{}", params.activity_id, Uuid::new_v4()),
            activity_id: params.activity_id,
            priority: params.priority,
            created_at: self.now(),
            available_at: None,
            local_variables: params.local_variables,
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
        };
        self.tasks.insert(task.id.clone(), task.clone());
        debug!(
            "Created external task {} on topic '{}' for process instance {}",
            task.id, task.topic_name, task.process_instance_id
        );
        self.work_notify.notify_waiters();
        Ok(task)
    }

    async fn delete_process_instance(&self, id: &str) -> Result<()> {
        self.processes
            .remove(id)
            .ok_or_else(|| StoreError::ProcessInstanceNotFound(id.to_string()))?;
        let now = self.now();
        let task_ids: Vec<String> = self
            .tasks
            .iter()
            .filter(|t| t.process_instance_id == id)
            .map(|t| t.id.clone())
            .collect();
        for task_id in task_ids {
            if let Some((_, task)) = self.tasks.remove(&task_id) {
                self.archive(task, HistoricState::Deleted, now);
            }
        }
        info!("Deleted process instance {}", id);
        Ok(())
    }

    async fn suspend_process_instance(&self, id: &str) -> Result<()> {
        let mut process = self
            .processes
            .get_mut(id)
            .ok_or_else(|| StoreError::ProcessInstanceNotFound(id.to_string()))?;
        process.suspended = true;
        Ok(())
    }

    async fn activate_process_instance(&self, id: &str) -> Result<()> {
        {
            let mut process = self
                .processes
                .get_mut(id)
                .ok_or_else(|| StoreError::ProcessInstanceNotFound(id.to_string()))?;
            process.suspended = false;
        }
        self.work_notify.notify_waiters();
        Ok(())
    }

    async fn process_instance(&self, id: &str) -> Result<ProcessInstance> {
        self.processes
            .get(id)
            .map(|p| p.clone())
            .ok_or_else(|| StoreError::ProcessInstanceNotFound(id.to_string()))
    }

    async fn set_variables(&self, process_instance_id: &str, variables: VariableDtoMap) -> Result<()> {
        validate_variables(&variables)?;
        let mut process = self
            .processes
            .get_mut(process_instance_id)
            .ok_or_else(|| StoreError::ProcessInstanceNotFound(process_instance_id.to_string()))?;
        process.variables.extend(persistable(&variables));
        Ok(())
    }

    async fn fetch_and_lock(&self, request: FetchAndLockRequest) -> Result<Vec<LockedExternalTaskDto>> {
        require_worker_id(&request.worker_id)?;
        if request.max_tasks < 0 {
            return Err(StoreError::invalid("maxTasks is not greater than or equal to 0"));
        }
        for topic in &request.topics {
            if topic.topic_name.is_empty() {
                return Err(StoreError::invalid("topicName is null"));
            }
            require_positive_lock(topic.lock_duration)?;
        }
        if request.max_tasks == 0 || request.topics.is_empty() {
            return Ok(Vec::new());
        }

        let deadline = request
            .async_response_timeout
            .filter(|ms| *ms > 0)
            .map(|ms| tokio::time::Instant::now() + Duration::from_millis(ms));

        loop {
            // Register interest before looking so a concurrent insert is not missed
            let notified = self.work_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let locked = self.try_lock(&request);
            if !locked.is_empty() {
                return Ok(locked);
            }
            let Some(deadline) = deadline else {
                return Ok(locked);
            };
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(locked);
            }
            let wake = (now + LONG_POLL_RECHECK).min(deadline);
            let _ = tokio::time::timeout_at(wake, notified).await;
        }
    }

    async fn complete(&self, task_id: &str, request: CompleteRequest) -> Result<()> {
        require_worker_id(&request.worker_id)?;
        validate_variables(&request.variables)?;
        validate_variables(&request.local_variables)?;
        let now = self.now();

        let task = self.take_owned(task_id, &request.worker_id, "completed", now)?;
        self.write_process_variables(&task.process_instance_id, &request.variables);
        info!(
            "Worker {} completed external task {} on topic '{}'",
            request.worker_id, task.id, task.topic_name
        );
        // Local variables end with the activity instance
        self.archive(task, HistoricState::Completed, now);
        Ok(())
    }

    async fn handle_failure(&self, task_id: &str, request: FailureRequest) -> Result<()> {
        require_worker_id(&request.worker_id)?;
        if request.retries < 0 {
            return Err(StoreError::invalid("retries is not greater than or equal to 0"));
        }
        if request.retry_timeout < 0 {
            return Err(StoreError::invalid(
                "retryDuration is not greater than or equal to 0",
            ));
        }
        validate_variables(&request.variables)?;
        validate_variables(&request.local_variables)?;
        let now = self.now();

        let task = self.update_owned(task_id, &request.worker_id, "failed", now, |task| {
            task.error_message = request.error_message.as_deref().map(truncate_error_message);
            task.error_details = request.error_details.clone();
            task.retries = Some(request.retries);
            task.release();
            task.available_at = (request.retries > 0 && request.retry_timeout > 0)
                .then(|| now + chrono::Duration::milliseconds(request.retry_timeout));
            task.local_variables
                .extend(persistable(&request.local_variables));
            task.clone()
        })?;

        self.write_process_variables(&task.process_instance_id, &request.variables);
        if request.retries == 0 {
            self.raise_incident(&task, now);
        } else {
            info!(
                "Worker {} reported failure of external task {} ({} retries left, retry in {}ms)",
                request.worker_id, task.id, request.retries, request.retry_timeout
            );
            self.work_notify.notify_waiters();
        }
        Ok(())
    }

    async fn handle_bpmn_error(&self, task_id: &str, request: BpmnErrorRequest) -> Result<()> {
        require_worker_id(&request.worker_id)?;
        if request.error_code.is_empty() {
            return Err(StoreError::invalid("errorCode is null"));
        }
        validate_variables(&request.variables)?;
        let now = self.now();

        let task = self.take_owned(task_id, &request.worker_id, "reported as BPMN error", now)?;
        self.write_process_variables(&task.process_instance_id, &request.variables);
        info!(
            "Worker {} reported BPMN error '{}' for external task {}",
            request.worker_id, request.error_code, task.id
        );
        self.archive(
            task,
            HistoricState::BpmnError {
                error_code: request.error_code,
                error_message: request.error_message,
            },
            now,
        );
        Ok(())
    }

    async fn extend_lock(&self, task_id: &str, request: ExtendLockRequest) -> Result<()> {
        require_worker_id(&request.worker_id)?;
        require_positive_lock(request.new_duration)?;
        let now = self.now();
        self.update_owned(task_id, &request.worker_id, "extended", now, |task| {
            task.lock_expiration_time =
                Some(now + chrono::Duration::milliseconds(request.new_duration));
        })?;
        debug!(
            "Worker {} extended lock of external task {} by {}ms",
            request.worker_id, task_id, request.new_duration
        );
        Ok(())
    }

    async fn lock(&self, task_id: &str, request: LockRequest) -> Result<()> {
        require_worker_id(&request.worker_id)?;
        require_positive_lock(request.lock_duration)?;
        let now = self.now();
        let mut task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))?;
        self.check_not_suspended(&task)?;
        if let Some(owner) = task.worker_id.as_deref() {
            if owner != request.worker_id && task.is_lock_held(now) {
                return Err(StoreError::LockConflict(format!(
                    "External task {} is already locked by worker '{}'.",
                    task_id, owner
                )));
            }
        }
        task.lock(
            &request.worker_id,
            now + chrono::Duration::milliseconds(request.lock_duration),
        );
        Ok(())
    }

    async fn unlock(&self, task_id: &str) -> Result<()> {
        {
            let mut task = self
                .tasks
                .get_mut(task_id)
                .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))?;
            task.release();
        }
        self.work_notify.notify_waiters();
        Ok(())
    }

    async fn set_retries(&self, task_id: &str, retries: i32) -> Result<()> {
        if retries < 0 {
            return Err(StoreError::invalid("retries is not greater than or equal to 0"));
        }
        let now = self.now();
        let (previous, task) = {
            let mut task = self
                .tasks
                .get_mut(task_id)
                .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))?;
            let previous = task.retries.replace(retries);
            (previous, task.clone())
        };
        match (previous == Some(0), retries == 0) {
            (true, false) => {
                self.resolve_incidents(task_id, now);
                self.work_notify.notify_waiters();
            }
            (false, true) => self.raise_incident(&task, now),
            _ => {}
        }
        Ok(())
    }

    async fn set_priority(&self, task_id: &str, priority: i64) -> Result<()> {
        let mut task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))?;
        task.priority = priority;
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> Result<ExternalTaskDto> {
        let task = self
            .tasks
            .get(task_id)
            .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))?;
        Ok(task.to_dto(self.is_suspended(&task.process_instance_id)))
    }

    async fn error_details(&self, task_id: &str) -> Result<Option<String>> {
        self.tasks
            .get(task_id)
            .map(|t| t.error_details.clone())
            .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))
    }

    async fn tasks_for_process_instance(&self, process_instance_id: &str) -> Result<Vec<ExternalTaskRecord>> {
        let mut tasks: Vec<_> = self
            .tasks
            .iter()
            .filter(|t| t.process_instance_id == process_instance_id)
            .map(|t| t.clone())
            .collect();
        tasks.sort_by_key(|t| t.sequence);
        Ok(tasks)
    }

    async fn historic_tasks(&self, process_instance_id: &str) -> Result<Vec<HistoricTask>> {
        let mut tasks: Vec<_> = self
            .history
            .iter()
            .filter(|h| h.task.process_instance_id == process_instance_id)
            .map(|h| h.clone())
            .collect();
        tasks.sort_by_key(|h| (h.ended_at, h.task.sequence));
        Ok(tasks)
    }

    async fn incidents(&self) -> Result<Vec<Incident>> {
        let mut incidents: Vec<_> = self.incidents.iter().map(|i| i.clone()).collect();
        incidents.sort_by_key(|i| i.created_at);
        Ok(incidents)
    }

    async fn topic_names(&self, filter: TopicNameFilter) -> Result<Vec<String>> {
        let now = self.now();
        let lock_filter = match (filter.with_locked_tasks, filter.with_unlocked_tasks) {
            (true, false) => Some(true),
            (false, true) => Some(false),
            _ => None,
        };
        let names: BTreeSet<String> = self
            .tasks
            .iter()
            .filter(|t| lock_filter.is_none_or(|locked| t.is_lock_held(now) == locked))
            .filter(|t| !filter.with_retries_left || t.retries != Some(0))
            .map(|t| t.topic_name.clone())
            .collect();
        Ok(names.into_iter().collect())
    }
}
