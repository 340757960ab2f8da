use super::config::{BackoffConfig, ClientConfig};
use super::engine::{EmbeddedEngine, EngineClient};
use super::error::{ClientError, Result};
use super::worker::{ClientInner, ErrorListener, ExternalTaskClient};
use crate::core::{
    DataFormat, ObjectType, ObjectTypes, RetryPolicy, ValueMapper, ValueMappers, VariableCodec,
};
use crate::storage::TaskStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Builds an [`ExternalTaskClient`].
///
/// The transport is either an [`EngineClient`] given with
/// [`engine`](Self::engine) or [`embedded`](Self::embedded), or the REST API
/// at [`base_url`](Self::base_url).
///
/// ```
/// use extask::client::ExternalTaskClient;
/// use extask::storage::InMemoryTaskStore;
/// use std::sync::Arc;
///
/// let client = ExternalTaskClient::builder()
///     .embedded(Arc::new(InMemoryTaskStore::new()))
///     .worker_id("billing-1")
///     .max_tasks(5)
///     .build()
///     .unwrap();
/// assert_eq!(client.worker_id(), "billing-1");
/// ```
pub struct ExternalTaskClientBuilder {
    config: ClientConfig,
    engine: Option<Arc<dyn EngineClient>>,
    object_types: ObjectTypes,
    mappers: ValueMappers,
    error_listener: Option<ErrorListener>,
}

impl Default for ExternalTaskClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExternalTaskClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            engine: None,
            object_types: ObjectTypes::with_builtins(),
            mappers: ValueMappers::builtin(),
            error_listener: None,
        }
    }

    /// Replaces all settings at once, e.g. with a deserialized config.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = Some(base_url.into());
        self
    }

    pub fn engine(mut self, engine: Arc<dyn EngineClient>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Runs against a store in the same process.
    pub fn embedded(self, store: Arc<dyn TaskStore>) -> Self {
        self.engine(Arc::new(EmbeddedEngine::new(store)))
    }

    pub fn worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.config.worker_id = worker_id.into();
        self
    }

    pub fn max_tasks(mut self, max_tasks: i32) -> Self {
        self.config.max_tasks = max_tasks;
        self
    }

    /// Default lock duration of subscriptions.
    pub fn lock_duration(mut self, lock_duration: Duration) -> Self {
        self.config.lock_duration = i64::try_from(lock_duration.as_millis()).unwrap_or(i64::MAX);
        self
    }

    /// Enables long polling: the engine holds an empty fetch open this long.
    pub fn async_response_timeout(mut self, timeout: Duration) -> Self {
        self.config.async_response_timeout = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn use_priority(mut self, use_priority: bool) -> Self {
        self.config.use_priority = use_priority;
        self
    }

    pub fn default_serialization_format(mut self, format: impl Into<String>) -> Self {
        self.config.default_serialization_format = format.into();
        self
    }

    pub fn max_concurrent_handlers(mut self, max: usize) -> Self {
        self.config.max_concurrent_handlers = Some(max);
        self
    }

    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Schedule of the implicit failure report sent when a handler fails.
    pub fn failure_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.failure_retry_policy = policy;
        self
    }

    /// Retries of report calls on transport errors; `None` disables them.
    pub fn report_retry_policy(mut self, policy: Option<RetryPolicy>) -> Self {
        self.config.report_retry_policy = policy;
        self
    }

    /// When disabled, polling starts only on [`ExternalTaskClient::start`].
    pub fn auto_fetching(mut self, auto_fetching: bool) -> Self {
        self.config.auto_fetching = auto_fetching;
        self
    }

    /// Makes object variables of type `T` decodable.
    pub fn object_type<T>(mut self) -> Self
    where
        T: ObjectType + Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static,
    {
        self.object_types.register::<T>();
        self
    }

    /// Adds or replaces the mapper for one wire type.
    pub fn value_mapper(mut self, mapper: impl ValueMapper + 'static) -> Self {
        self.mappers.register(mapper);
        self
    }

    pub fn error_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&ClientError) + Send + Sync + 'static,
    {
        self.error_listener = Some(Arc::new(listener));
        self
    }

    pub fn build(self) -> Result<ExternalTaskClient> {
        let config = self.config;
        if config.worker_id.trim().is_empty() {
            return Err(ClientError::Config("worker id is empty".to_string()));
        }
        if config.max_tasks <= 0 {
            return Err(ClientError::Config("max_tasks must be greater than zero".to_string()));
        }
        if config.lock_duration <= 0 {
            return Err(ClientError::Config("lock_duration must be greater than zero".to_string()));
        }
        if config.max_concurrent_handlers == Some(0) {
            return Err(ClientError::Config(
                "max_concurrent_handlers must be greater than zero".to_string(),
            ));
        }
        let format = DataFormat::from_name(&config.default_serialization_format).ok_or_else(|| {
            ClientError::Config(format!(
                "unknown serialization format '{}'",
                config.default_serialization_format
            ))
        })?;

        let engine = match (self.engine, &config.base_url) {
            (Some(engine), _) => engine,
            (None, Some(base_url)) => http_engine(base_url)?,
            (None, None) => {
                return Err(ClientError::Config(
                    "either an engine or a base_url is required".to_string(),
                ))
            }
        };

        let codec = VariableCodec::new(self.object_types, format).with_mappers(self.mappers);
        Ok(ExternalTaskClient::from_inner(ClientInner::new(
            config,
            engine,
            codec,
            self.error_listener,
        )))
    }
}

#[cfg(feature = "http")]
fn http_engine(base_url: &str) -> Result<Arc<dyn EngineClient>> {
    Ok(Arc::new(super::HttpEngineClient::new(base_url)?))
}

#[cfg(not(feature = "http"))]
fn http_engine(base_url: &str) -> Result<Arc<dyn EngineClient>> {
    Err(ClientError::Config(format!(
        "cannot reach {}: built without the `http` feature",
        base_url
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryTaskStore;

    fn store() -> Arc<dyn TaskStore> {
        Arc::new(InMemoryTaskStore::new())
    }

    #[test]
    fn test_build_requires_a_transport() {
        let err = ExternalTaskClientBuilder::new().build().unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_build_validates_limits() {
        let err = ExternalTaskClient::builder()
            .embedded(store())
            .max_tasks(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));

        let err = ExternalTaskClient::builder()
            .embedded(store())
            .default_serialization_format("application/yaml")
            .build()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid client configuration: unknown serialization format 'application/yaml'"
        );
    }

    #[test]
    fn test_settings_land_in_config() {
        let client = ExternalTaskClient::builder()
            .embedded(store())
            .lock_duration(Duration::from_secs(5))
            .async_response_timeout(Duration::from_secs(30))
            .default_serialization_format("application/xml")
            .build()
            .unwrap();
        assert_eq!(client.config().lock_duration, 5_000);
        assert_eq!(client.config().async_response_timeout, Some(30_000));
        assert_eq!(client.codec().default_format(), DataFormat::Xml);
    }

    #[cfg(feature = "http")]
    #[test]
    fn test_base_url_selects_http_transport() {
        let client = ExternalTaskClient::builder()
            .base_url("http://localhost:8080/engine-rest")
            .build();
        assert!(client.is_ok());
    }
}
