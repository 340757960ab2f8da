//! Wire payloads exchanged between workers and the engine.
//!
//! Field names follow the engine's REST contract (camelCase JSON). Variables
//! travel as [`VariableDtoMap`]s; dates use the engine date format
//! (`yyyy-MM-dd'T'HH:mm:ss.SSSZ`).

use crate::core::VariableDtoMap;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// `POST /external-task/fetchAndLock`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchAndLockRequest {
    pub worker_id: String,
    pub max_tasks: i32,
    #[serde(default)]
    pub use_priority: bool,
    /// Long-poll timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub async_response_timeout: Option<u64>,
    #[serde(default)]
    pub topics: Vec<FetchTopic>,
}

/// One topic filter of a fetch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchTopic {
    pub topic_name: String,
    /// Lock duration in milliseconds.
    pub lock_duration: i64,
    /// `None` fetches all variables, `Some(vec![])` none.
    #[serde(default)]
    pub variables: Option<Vec<String>>,
    #[serde(default, rename = "localVariables", alias = "localVariablesOnly")]
    pub local_variables: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_definition_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_definition_key_in: Option<Vec<String>>,
    /// Matches tasks whose process instance has any of these raw values.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub process_variables: IndexMap<String, serde_json::Value>,
}

impl FetchTopic {
    pub fn new(topic_name: impl Into<String>, lock_duration: i64) -> Self {
        Self {
            topic_name: topic_name.into(),
            lock_duration,
            variables: None,
            local_variables: false,
            business_key: None,
            process_definition_key: None,
            process_definition_key_in: None,
            process_variables: IndexMap::new(),
        }
    }
}

/// A task as returned by fetch-and-lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedExternalTaskDto {
    pub id: String,
    pub topic_name: String,
    pub worker_id: String,
    #[serde(with = "wire_date::option", default)]
    pub lock_expiration_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retries: Option<i32>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub error_details: Option<String>,
    pub process_instance_id: String,
    #[serde(default)]
    pub process_definition_key: Option<String>,
    #[serde(default)]
    pub business_key: Option<String>,
    pub activity_id: String,
    #[serde(default)]
    pub activity_instance_id: Option<String>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub variables: VariableDtoMap,
}

/// A task as returned by `GET /external-task/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalTaskDto {
    pub id: String,
    pub topic_name: String,
    #[serde(default)]
    pub worker_id: Option<String>,
    #[serde(with = "wire_date::option", default)]
    pub lock_expiration_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retries: Option<i32>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub suspended: bool,
    pub process_instance_id: String,
    #[serde(default)]
    pub process_definition_key: Option<String>,
    #[serde(default)]
    pub business_key: Option<String>,
    pub activity_id: String,
    pub priority: i64,
}

/// `POST /external-task/{id}/complete`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub worker_id: String,
    #[serde(default, skip_serializing_if = "VariableDtoMap::is_empty")]
    pub variables: VariableDtoMap,
    #[serde(default, skip_serializing_if = "VariableDtoMap::is_empty")]
    pub local_variables: VariableDtoMap,
}

/// `POST /external-task/{id}/failure`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRequest {
    pub worker_id: String,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub error_details: Option<String>,
    pub retries: i32,
    /// Milliseconds before the task may be fetched again.
    #[serde(default)]
    pub retry_timeout: i64,
    #[serde(default, skip_serializing_if = "VariableDtoMap::is_empty")]
    pub variables: VariableDtoMap,
    #[serde(default, skip_serializing_if = "VariableDtoMap::is_empty")]
    pub local_variables: VariableDtoMap,
}

/// `POST /external-task/{id}/bpmnError`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BpmnErrorRequest {
    pub worker_id: String,
    pub error_code: String,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "VariableDtoMap::is_empty")]
    pub variables: VariableDtoMap,
}

/// `POST /external-task/{id}/extendLock`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendLockRequest {
    pub worker_id: String,
    /// New lock duration in milliseconds, counted from now.
    pub new_duration: i64,
}

/// `POST /external-task/{id}/lock`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRequest {
    pub worker_id: String,
    pub lock_duration: i64,
}

/// `PUT /external-task/{id}/retries`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetRetriesRequest {
    pub retries: i32,
}

/// `PUT /external-task/{id}/priority`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetPriorityRequest {
    pub priority: i64,
}

/// `POST /process-instance/{id}/variables`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SetVariablesRequest {
    #[serde(default)]
    pub modifications: VariableDtoMap,
}

/// Error body returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

/// `POST /process-instance`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartProcessInstanceRequest {
    pub process_definition_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_key: Option<String>,
    #[serde(default, skip_serializing_if = "VariableDtoMap::is_empty")]
    pub variables: VariableDtoMap,
}

/// A process instance as returned by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInstanceDto {
    pub id: String,
    pub process_definition_key: String,
    #[serde(default)]
    pub business_key: Option<String>,
    pub suspended: bool,
}

/// `POST /process-instance/{id}/external-task`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExternalTaskRequest {
    pub topic_name: String,
    /// Defaults to the topic name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default, skip_serializing_if = "VariableDtoMap::is_empty")]
    pub local_variables: VariableDtoMap,
}

/// `PUT /process-instance/{id}/suspended`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuspensionStateRequest {
    pub suspended: bool,
}

/// Serde adapters for the engine date format.
pub mod wire_date {
    use crate::core::{format_date, parse_date};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_date(date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(d)?;
        parse_date(&text).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            date: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match date {
                Some(date) => s.serialize_str(&format_date(date)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|text| parse_date(&text).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
