//! Worker client: subscribe to topics, fetch and lock tasks, run handlers and
//! report outcomes.
//!
//! # Example
//!
//! ```no_run
//! use extask::client::{ExternalTask, ExternalTaskClient, ExternalTaskService};
//! use extask::core::{BoxError, TypedValue, VariableMap};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ExternalTaskClient::builder()
//!     .base_url("http://localhost:8080/engine-rest")
//!     .async_response_timeout(Duration::from_secs(20))
//!     .build()?;
//!
//! client
//!     .subscribe("invoice-creator")
//!     .lock_duration(Duration::from_secs(10))
//!     .variables(["amount"])
//!     .handler(|task: ExternalTask, service: ExternalTaskService| async move {
//!         let amount: i64 = task.variable("amount").unwrap_or_default();
//!         let mut variables = VariableMap::new();
//!         variables.insert("invoiced".into(), TypedValue::new(amount > 0));
//!         service.complete(variables).await?;
//!         Ok::<(), BoxError>(())
//!     })
//!     .open()?;
//!
//! tokio::signal::ctrl_c().await?;
//! client.stop().await;
//! # Ok(())
//! # }
//! ```

mod backoff;
mod builder;
mod config;
mod engine;
mod error;
mod handler;
#[cfg(feature = "http")]
mod http;
mod service;
mod subscription;
mod task;
mod worker;

pub use backoff::ExponentialBackoff;
pub use builder::ExternalTaskClientBuilder;
pub use config::{default_worker_id, BackoffConfig, ClientConfig};
pub use engine::{EmbeddedEngine, EngineClient};
pub use error::{ClientError, Result};
pub use handler::ExternalTaskHandler;
#[cfg(feature = "http")]
pub use http::HttpEngineClient;
pub use service::ExternalTaskService;
pub use subscription::{TopicSubscription, TopicSubscriptionBuilder, VariableFilter};
pub use task::ExternalTask;
pub use worker::{ErrorListener, ExternalTaskClient};
