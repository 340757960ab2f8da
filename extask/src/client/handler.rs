use super::service::ExternalTaskService;
use super::task::ExternalTask;
use crate::core::BoxError;
use async_trait::async_trait;
use std::future::Future;

/// Business logic for one topic.
///
/// The handler reports the outcome through the [`ExternalTaskService`]. If it
/// returns an error (or panics) without having reported, the client reports
/// a failure on its behalf, consuming one retry.
///
/// Closures of the shape `Fn(ExternalTask, ExternalTaskService) -> Future`
/// are handlers:
///
/// ```ignore
/// client
///     .subscribe("charge-card")
///     .handler(|task: ExternalTask, service: ExternalTaskService| async move {
///         let amount: i64 = task.variable("amount").unwrap_or_default();
///         let mut variables = VariableMap::new();
///         variables.insert("charged".into(), amount.into());
///         service.complete(variables).await?;
///         Ok::<_, BoxError>(())
///     })
///     .open()?;
/// ```
#[async_trait]
pub trait ExternalTaskHandler: Send + Sync + 'static {
    async fn execute(&self, task: ExternalTask, service: ExternalTaskService) -> Result<(), BoxError>;
}

#[async_trait]
impl<F, Fut> ExternalTaskHandler for F
where
    F: Fn(ExternalTask, ExternalTaskService) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    async fn execute(&self, task: ExternalTask, service: ExternalTaskService) -> Result<(), BoxError> {
        (self)(task, service).await
    }
}
