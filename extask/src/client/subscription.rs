use super::error::{ClientError, Result};
use super::handler::ExternalTaskHandler;
use super::worker::ClientInner;
use crate::core::RetryPolicy;
use crate::protocol::FetchTopic;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Which variables a fetch returns for a topic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VariableFilter {
    #[default]
    AllVariables,
    NoVariables,
    Named(BTreeSet<String>),
}

impl VariableFilter {
    /// `None` on the wire means all variables, an empty list means none.
    pub fn to_wire(&self) -> Option<Vec<String>> {
        match self {
            VariableFilter::AllVariables => None,
            VariableFilter::NoVariables => Some(Vec::new()),
            VariableFilter::Named(names) => Some(names.iter().cloned().collect()),
        }
    }
}

/// An open subscription as held by the poll loop.
pub(crate) struct Subscription {
    pub(crate) topic_name: String,
    pub(crate) lock_duration: i64,
    pub(crate) variables: VariableFilter,
    pub(crate) local_variables_only: bool,
    pub(crate) business_key: Option<String>,
    pub(crate) process_definition_key: Option<String>,
    pub(crate) process_definition_keys: Option<Vec<String>>,
    pub(crate) process_variables: IndexMap<String, serde_json::Value>,
    pub(crate) handler: Arc<dyn ExternalTaskHandler>,
    /// Overrides the client's failure retry policy for this topic.
    pub(crate) retry_policy: Option<RetryPolicy>,
}

impl Subscription {
    pub(crate) fn fetch_topic(&self) -> FetchTopic {
        FetchTopic {
            topic_name: self.topic_name.clone(),
            lock_duration: self.lock_duration,
            variables: self.variables.to_wire(),
            local_variables: self.local_variables_only,
            business_key: self.business_key.clone(),
            process_definition_key: self.process_definition_key.clone(),
            process_definition_key_in: self.process_definition_keys.clone(),
            process_variables: self.process_variables.clone(),
        }
    }
}

/// Configures a subscription; created by
/// [`ExternalTaskClient::subscribe`](super::ExternalTaskClient::subscribe).
#[must_use = "a subscription does nothing until opened"]
pub struct TopicSubscriptionBuilder {
    client: Arc<ClientInner>,
    topic_name: String,
    lock_duration: Option<Duration>,
    variables: VariableFilter,
    local_variables_only: bool,
    business_key: Option<String>,
    process_definition_key: Option<String>,
    process_definition_keys: Option<Vec<String>>,
    process_variables: IndexMap<String, serde_json::Value>,
    handler: Option<Arc<dyn ExternalTaskHandler>>,
    retry_policy: Option<RetryPolicy>,
}

impl TopicSubscriptionBuilder {
    pub(crate) fn new(client: Arc<ClientInner>, topic_name: impl Into<String>) -> Self {
        Self {
            client,
            topic_name: topic_name.into(),
            lock_duration: None,
            variables: VariableFilter::AllVariables,
            local_variables_only: false,
            business_key: None,
            process_definition_key: None,
            process_definition_keys: None,
            process_variables: IndexMap::new(),
            handler: None,
            retry_policy: None,
        }
    }

    /// Lease length for tasks fetched on this topic. Defaults to the
    /// client's `lock_duration`.
    pub fn lock_duration(mut self, lock_duration: Duration) -> Self {
        self.lock_duration = Some(lock_duration);
        self
    }

    /// Restricts the fetched variables to `names`. An empty iterator fetches
    /// no variables at all; not calling this fetches all of them.
    pub fn variables<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        self.variables = if names.is_empty() {
            VariableFilter::NoVariables
        } else {
            VariableFilter::Named(names)
        };
        self
    }

    /// Fetches only variables local to the task's execution.
    pub fn local_variables_only(mut self) -> Self {
        self.local_variables_only = true;
        self
    }

    pub fn business_key(mut self, business_key: impl Into<String>) -> Self {
        self.business_key = Some(business_key.into());
        self
    }

    pub fn process_definition_key(mut self, key: impl Into<String>) -> Self {
        self.process_definition_key = Some(key.into());
        self
    }

    /// Only fetches tasks of processes started from one of `keys`.
    pub fn process_definition_key_in<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.process_definition_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Only fetches tasks whose process instance holds `value` under `name`.
    /// Repeated calls widen the match: any one equal variable is enough.
    pub fn process_variable_equals(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.process_variables.insert(name.into(), value.into());
        self
    }

    pub fn process_variables_equals_in<I, K, V>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        self.process_variables
            .extend(variables.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn handler(mut self, handler: impl ExternalTaskHandler) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Retry schedule for the implicit failure report when the handler
    /// fails on this topic.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Registers the subscription. With `auto_fetching` enabled the client
    /// starts polling if it is not running yet.
    pub fn open(self) -> Result<TopicSubscription> {
        if self.topic_name.trim().is_empty() {
            return Err(ClientError::InvalidSubscription("topic name is empty".to_string()));
        }
        let handler = self.handler.ok_or_else(|| {
            ClientError::InvalidSubscription(format!(
                "no handler given for topic '{}'",
                self.topic_name
            ))
        })?;
        let lock_duration = match self.lock_duration {
            Some(duration) => i64::try_from(duration.as_millis()).unwrap_or(i64::MAX),
            None => self.client.config.lock_duration,
        };
        if lock_duration <= 0 {
            return Err(ClientError::InvalidSubscription(format!(
                "lock duration of topic '{}' must be greater than zero",
                self.topic_name
            )));
        }

        let subscription = Arc::new(Subscription {
            topic_name: self.topic_name.clone(),
            lock_duration,
            variables: self.variables,
            local_variables_only: self.local_variables_only,
            business_key: self.business_key,
            process_definition_key: self.process_definition_key,
            process_definition_keys: self.process_definition_keys,
            process_variables: self.process_variables,
            handler,
            retry_policy: self.retry_policy,
        });
        self.client.add_subscription(subscription.clone())?;
        info!(
            "Worker {} subscribed to topic '{}' (lock duration {} ms)",
            self.client.config.worker_id, subscription.topic_name, lock_duration
        );

        if self.client.config.auto_fetching {
            if let Err(e) = ClientInner::start(&self.client) {
                warn!("Worker {} did not start polling: {}", self.client.config.worker_id, e);
            }
        }
        Ok(TopicSubscription {
            client: self.client,
            subscription,
        })
    }
}

/// An open subscription. Dropping it keeps the subscription active; call
/// [`close`](Self::close) to stop fetching the topic.
pub struct TopicSubscription {
    client: Arc<ClientInner>,
    subscription: Arc<Subscription>,
}

impl TopicSubscription {
    pub fn topic_name(&self) -> &str {
        &self.subscription.topic_name
    }

    pub fn lock_duration(&self) -> Duration {
        Duration::from_millis(u64::try_from(self.subscription.lock_duration).unwrap_or(0))
    }

    pub fn variables(&self) -> &VariableFilter {
        &self.subscription.variables
    }

    pub fn is_local_variables_only(&self) -> bool {
        self.subscription.local_variables_only
    }

    pub fn business_key(&self) -> Option<&str> {
        self.subscription.business_key.as_deref()
    }

    pub fn process_definition_key(&self) -> Option<&str> {
        self.subscription.process_definition_key.as_deref()
    }

    pub fn process_definition_key_in(&self) -> Option<&[String]> {
        self.subscription.process_definition_keys.as_deref()
    }

    pub fn process_variables(&self) -> &IndexMap<String, serde_json::Value> {
        &self.subscription.process_variables
    }

    /// Stops fetching this topic. Handlers already running are not affected.
    pub fn close(self) {
        self.client.remove_subscription(&self.subscription.topic_name);
        info!(
            "Worker {} unsubscribed from topic '{}'",
            self.client.config.worker_id, self.subscription.topic_name
        );
    }
}

impl fmt::Debug for TopicSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicSubscription")
            .field("topic_name", &self.subscription.topic_name)
            .field("lock_duration", &self.subscription.lock_duration)
            .field("variables", &self.subscription.variables)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_filter_wire_form() {
        assert_eq!(VariableFilter::AllVariables.to_wire(), None);
        assert_eq!(VariableFilter::NoVariables.to_wire(), Some(vec![]));
        let named = VariableFilter::Named(["b", "a"].into_iter().map(String::from).collect());
        assert_eq!(named.to_wire(), Some(vec!["a".to_string(), "b".to_string()]));
    }
}
