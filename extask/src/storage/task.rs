use crate::core::VariableDtoMap;
use crate::protocol::{ExternalTaskDto, ProcessInstanceDto};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest error message stored for a failed task; longer messages are cut.
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 666;

/// Lifecycle state of a live external task, evaluated at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Claimable (possibly after a pending retry timeout).
    Open,
    /// Held by a worker whose lease has not expired.
    Locked,
    /// Out of retries; only an operator can reset it.
    Incident,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Open => write!(f, "OPEN"),
            TaskState::Locked => write!(f, "LOCKED"),
            TaskState::Incident => write!(f, "INCIDENT"),
        }
    }
}

/// A live external task as held by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalTaskRecord {
    pub id: String,
    pub topic_name: String,
    pub worker_id: Option<String>,
    pub lock_expiration_time: Option<DateTime<Utc>>,
    /// `None` until the first failure report.
    pub retries: Option<i32>,
    pub error_message: Option<String>,
    pub error_details: Option<String>,
    pub process_instance_id: String,
    pub process_definition_key: String,
    pub business_key: Option<String>,
    pub activity_id: String,
    pub activity_instance_id: String,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
    /// Not fetchable before this instant (set by a failure's retry timeout).
    pub available_at: Option<DateTime<Utc>>,
    /// Variables of the activity instance scope.
    pub local_variables: VariableDtoMap,
    /// Creation order, used to break priority ties.
    pub(crate) sequence: u64,
}

impl ExternalTaskRecord {
    pub fn state(&self, now: DateTime<Utc>) -> TaskState {
        if self.retries == Some(0) {
            TaskState::Incident
        } else if self.is_lock_held(now) {
            TaskState::Locked
        } else {
            TaskState::Open
        }
    }

    /// True while a worker holds an unexpired lease.
    pub fn is_lock_held(&self, now: DateTime<Utc>) -> bool {
        self.worker_id.is_some() && self.lock_expiration_time.is_some_and(|expiry| expiry > now)
    }

    /// True when a fetch at `now` may claim this task.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.state(now) == TaskState::Open && self.available_at.is_none_or(|at| at <= now)
    }

    pub fn lock(&mut self, worker_id: &str, expires_at: DateTime<Utc>) {
        self.worker_id = Some(worker_id.to_string());
        self.lock_expiration_time = Some(expires_at);
    }

    pub fn release(&mut self) {
        self.worker_id = None;
        self.lock_expiration_time = None;
    }

    pub fn to_dto(&self, suspended: bool) -> ExternalTaskDto {
        ExternalTaskDto {
            id: self.id.clone(),
            topic_name: self.topic_name.clone(),
            worker_id: self.worker_id.clone(),
            lock_expiration_time: self.lock_expiration_time,
            retries: self.retries,
            error_message: self.error_message.clone(),
            suspended,
            process_instance_id: self.process_instance_id.clone(),
            process_definition_key: Some(self.process_definition_key.clone()),
            business_key: self.business_key.clone(),
            activity_id: self.activity_id.clone(),
            priority: self.priority,
        }
    }
}

/// Parameters for creating an external task inside a process instance.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExternalTask {
    pub process_instance_id: String,
    pub topic_name: String,
    pub activity_id: String,
    pub priority: i64,
    pub local_variables: VariableDtoMap,
}

impl NewExternalTask {
    pub fn new(process_instance_id: impl Into<String>, topic_name: impl Into<String>) -> Self {
        let topic_name = topic_name.into();
        Self {
            process_instance_id: process_instance_id.into(),
            activity_id: topic_name.clone(),
            topic_name,
            priority: 0,
            local_variables: VariableDtoMap::new(),
        }
    }

    pub fn activity_id(mut self, activity_id: impl Into<String>) -> Self {
        self.activity_id = activity_id.into();
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn local_variables(mut self, variables: VariableDtoMap) -> Self {
        self.local_variables = variables;
        self
    }
}

/// A running process instance, reduced to what external tasks need.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInstance {
    pub id: String,
    pub process_definition_key: String,
    pub business_key: Option<String>,
    pub variables: VariableDtoMap,
    pub suspended: bool,
}

impl From<ProcessInstance> for ProcessInstanceDto {
    fn from(instance: ProcessInstance) -> Self {
        Self {
            id: instance.id,
            process_definition_key: instance.process_definition_key,
            business_key: instance.business_key,
            suspended: instance.suspended,
        }
    }
}

/// Parameters for starting a process instance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewProcessInstance {
    pub process_definition_key: String,
    pub business_key: Option<String>,
    pub variables: VariableDtoMap,
}

impl NewProcessInstance {
    pub fn new(process_definition_key: impl Into<String>) -> Self {
        Self {
            process_definition_key: process_definition_key.into(),
            ..Default::default()
        }
    }

    pub fn business_key(mut self, business_key: impl Into<String>) -> Self {
        self.business_key = Some(business_key.into());
        self
    }

    pub fn variables(mut self, variables: VariableDtoMap) -> Self {
        self.variables = variables;
        self
    }
}

/// How a task left the live set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoricState {
    Completed,
    BpmnError {
        error_code: String,
        error_message: Option<String>,
    },
    Deleted,
}

/// A finished task.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricTask {
    pub task: ExternalTaskRecord,
    pub state: HistoricState,
    pub worker_id: Option<String>,
    pub ended_at: DateTime<Utc>,
}

/// An incident raised when a task ran out of retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incident {
    pub id: String,
    pub task_id: String,
    pub process_instance_id: String,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Incident {
    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}

/// Filter for [`super::TaskStore::topic_names`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TopicNameFilter {
    pub with_locked_tasks: bool,
    pub with_unlocked_tasks: bool,
    pub with_retries_left: bool,
}

/// Cuts `message` to [`MAX_ERROR_MESSAGE_LENGTH`] characters.
pub fn truncate_error_message(message: &str) -> String {
    message.chars().take(MAX_ERROR_MESSAGE_LENGTH).collect()
}
