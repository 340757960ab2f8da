use crate::core::{
    object_from_value, CodecError, FromValue, TypedValue, Value, VariableCodec, VariableMap,
};
use crate::protocol::LockedExternalTaskDto;
use chrono::{DateTime, Utc};

/// A locked external task with decoded variables, as handed to a handler.
#[derive(Debug, Clone)]
pub struct ExternalTask {
    id: String,
    topic_name: String,
    worker_id: String,
    lock_expiration_time: Option<DateTime<Utc>>,
    retries: Option<i32>,
    error_message: Option<String>,
    error_details: Option<String>,
    process_instance_id: String,
    process_definition_key: Option<String>,
    business_key: Option<String>,
    activity_id: String,
    activity_instance_id: Option<String>,
    priority: i64,
    variables: VariableMap,
}

impl ExternalTask {
    /// Decodes a fetched task. Fails on the first variable that cannot be
    /// decoded.
    pub fn from_dto(dto: LockedExternalTaskDto, codec: &VariableCodec) -> Result<Self, CodecError> {
        let variables = codec.decode_map(&dto.variables)?;
        Ok(Self {
            id: dto.id,
            topic_name: dto.topic_name,
            worker_id: dto.worker_id,
            lock_expiration_time: dto.lock_expiration_time,
            retries: dto.retries,
            error_message: dto.error_message,
            error_details: dto.error_details,
            process_instance_id: dto.process_instance_id,
            process_definition_key: dto.process_definition_key,
            business_key: dto.business_key,
            activity_id: dto.activity_id,
            activity_instance_id: dto.activity_instance_id,
            priority: dto.priority,
            variables,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic_name(&self) -> &str {
        &self.topic_name
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn lock_expiration_time(&self) -> Option<DateTime<Utc>> {
        self.lock_expiration_time
    }

    /// Remaining retries; `None` if the task never failed.
    pub fn retries(&self) -> Option<i32> {
        self.retries
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn error_details(&self) -> Option<&str> {
        self.error_details.as_deref()
    }

    pub fn process_instance_id(&self) -> &str {
        &self.process_instance_id
    }

    pub fn process_definition_key(&self) -> Option<&str> {
        self.process_definition_key.as_deref()
    }

    pub fn business_key(&self) -> Option<&str> {
        self.business_key.as_deref()
    }

    pub fn activity_id(&self) -> &str {
        &self.activity_id
    }

    pub fn activity_instance_id(&self) -> Option<&str> {
        self.activity_instance_id.as_deref()
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn variables(&self) -> &VariableMap {
        &self.variables
    }

    pub fn typed_variable(&self, name: &str) -> Option<&TypedValue> {
        self.variables.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.variables.get(name).map(|v| &v.value)
    }

    /// Reads a variable as `T`; `None` if absent or of another kind.
    pub fn variable<T: FromValue>(&self, name: &str) -> Option<T> {
        self.value(name).and_then(T::from_value)
    }

    /// Reads the deserialized value of an object variable.
    pub fn object_variable<T: Clone + 'static>(&self, name: &str) -> Option<T> {
        self.value(name).and_then(object_from_value)
    }
}
