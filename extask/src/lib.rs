//! extask: lease-based external task workers
//!
//! A process engine emits *external tasks*: units of work that wait on a
//! topic until a worker fetches and locks them, runs its business logic and
//! reports back. `extask` provides both sides of that contract:
//!
//! - the lock lease store, which hands out each task to at most one worker
//!   at a time and rejects reports that arrive after the lease ran out
//! - the worker client, which batches every topic subscription into one
//!   fetch per poll cycle and runs handlers on a bounded pool
//! - the typed-variable codec, which carries process data across that
//!   boundary as tagged wire values
//!
//! # Quick Start
//!
//! ```no_run
//! use extask::prelude::*;
//! use extask::storage::{InMemoryTaskStore, NewExternalTask, NewProcessInstance, TaskStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryTaskStore::new());
//!     let instance = store
//!         .create_process_instance(NewProcessInstance::new("invoice"))
//!         .await?;
//!     store
//!         .create_external_task(NewExternalTask::new(&instance.id, "charge-card"))
//!         .await?;
//!
//!     let client = ExternalTaskClient::builder().embedded(store.clone()).build()?;
//!     client
//!         .subscribe("charge-card")
//!         .handler(|_task: ExternalTask, service: ExternalTaskService| async move {
//!             let mut variables = VariableMap::new();
//!             variables.insert("charged".into(), TypedValue::new(true));
//!             service.complete(variables).await?;
//!             Ok::<(), BoxError>(())
//!         })
//!         .open()?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     client.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`core`]: variable values, the codec and its formats, retry policies
//! - [`protocol`]: wire payloads of the REST contract
//! - [`storage`]: the lock lease store
//! - [`client`]: subscriptions, poll loop, dispatcher and task service
//! - `rest`: axum routes over a store (feature `server`)

// Allow the derive macro to reference ::extask from within this crate
extern crate self as extask;

pub mod client;
pub mod core;
pub mod protocol;
#[cfg(feature = "server")]
pub mod rest;
pub mod storage;

pub use crate::client::{
    ClientConfig, ClientError, ExternalTask, ExternalTaskClient, ExternalTaskHandler,
    ExternalTaskService, TopicSubscription,
};
pub use crate::core::{
    BoxError, CodecError, ObjectType, ObjectValue, TypedValue, Value, VariableCodec, VariableMap,
};
pub use crate::storage::{InMemoryTaskStore, StoreError, TaskStore};

pub use extask_macros::ObjectType;

// Re-export dependencies used in public API
pub use serde;
pub use tokio;

/// Prelude module for convenient glob imports
///
/// ```
/// use extask::prelude::*;
/// ```
pub mod prelude {
    pub use crate::client::{
        ClientError, ExternalTask, ExternalTaskClient, ExternalTaskHandler, ExternalTaskService,
        TopicSubscription,
    };
    pub use crate::core::{
        BoxError, DataFormat, FileValue, ObjectType, ObjectValue, Opaque, RetryPolicy, TypedValue,
        Value, VariableMap,
    };
    pub use extask_macros::ObjectType;

    pub use serde::{Deserialize, Serialize};
    pub use std::sync::Arc;
}
