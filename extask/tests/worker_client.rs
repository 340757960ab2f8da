//! The worker client against an embedded engine: fetch, dispatch, report.

use extask::client::{BackoffConfig, ClientError, ExternalTask, ExternalTaskClient, ExternalTaskClientBuilder, ExternalTaskService};
use extask::core::{BoxError, RetryPolicy, TypedValue, TypedValueDto, VariableDtoMap, VariableMap};
use extask::storage::{InMemoryTaskStore, NewExternalTask, NewProcessInstance, TaskStore};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

const WAIT: Duration = Duration::from_secs(5);

fn builder(store: &Arc<InMemoryTaskStore>) -> ExternalTaskClientBuilder {
    ExternalTaskClient::builder()
        .embedded(store.clone())
        .worker_id("worker-1")
        .backoff(BackoffConfig {
            initial_ms: 10,
            max_ms: 50,
            jitter: 0.0,
            ..Default::default()
        })
}

fn vars(pairs: &[(&str, TypedValueDto)]) -> VariableDtoMap {
    pairs
        .iter()
        .map(|(name, dto)| (name.to_string(), dto.clone()))
        .collect()
}

/// Creates a process instance with `variables` and one task on `topic`.
async fn start(store: &InMemoryTaskStore, topic: &str, variables: VariableDtoMap) -> (String, String) {
    let instance = store
        .create_process_instance(NewProcessInstance::new("invoice").variables(variables))
        .await
        .unwrap();
    let task = store
        .create_external_task(NewExternalTask::new(&instance.id, topic))
        .await
        .unwrap();
    (instance.id, task.id)
}

/// Waits until the task carries a retry count, i.e. a failure was reported.
async fn await_failure(store: &InMemoryTaskStore, task_id: &str) -> extask::protocol::ExternalTaskDto {
    tokio::time::timeout(WAIT, async {
        loop {
            let task = store.get_task(task_id).await.unwrap();
            if task.retries.is_some() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("failure was never reported")
}

#[tokio::test]
async fn handler_completes_task_with_variables() {
    let store = Arc::new(InMemoryTaskStore::new());
    let (instance_id, _) = start(&store, "T", vars(&[("x", TypedValueDto::new("Long", json!(47)))])).await;

    let client = builder(&store).build().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .subscribe("T")
        .lock_duration(Duration::from_secs(5))
        .handler(move |task: ExternalTask, service: ExternalTaskService| {
            let tx = tx.clone();
            async move {
                let x: i64 = task.variable("x").ok_or("x missing")?;
                let mut variables = VariableMap::new();
                variables.insert("y".into(), TypedValue::new("done"));
                service.complete(variables).await?;
                let _ = tx.send((x, task.worker_id().to_string()));
                Ok::<(), BoxError>(())
            }
        })
        .open()
        .unwrap();

    let (x, worker_id) = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    client.stop().await;

    assert_eq!(x, 47);
    assert_eq!(worker_id, "worker-1");
    let instance = store.process_instance(&instance_id).await.unwrap();
    assert_eq!(instance.variables["y"].value, json!("done"));
    assert_eq!(instance.variables["y"].value_type.as_deref(), Some("String"));
    assert!(store.tasks_for_process_instance(&instance_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn variable_filter_limits_fetched_variables() {
    let store = Arc::new(InMemoryTaskStore::new());
    let variables = vars(&[
        ("a", TypedValueDto::new("Integer", json!(1))),
        ("b", TypedValueDto::new("Integer", json!(2))),
        ("c", TypedValueDto::new("Integer", json!(3))),
    ]);
    start(&store, "filtered", variables.clone()).await;
    start(&store, "bare", variables.clone()).await;
    start(&store, "all", variables).await;

    let client = builder(&store).build().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let filters = [
        ("filtered", Some(vec!["a", "b", "z"])),
        ("bare", Some(vec![])),
        ("all", None),
    ];
    for (topic, names) in filters {
        let tx = tx.clone();
        let mut subscription = client.subscribe(topic);
        if let Some(names) = names {
            subscription = subscription.variables(names);
        }
        subscription
            .handler(move |task: ExternalTask, _service: ExternalTaskService| {
                let tx = tx.clone();
                async move {
                    let names: BTreeSet<String> = task.variables().keys().cloned().collect();
                    let _ = tx.send((task.topic_name().to_string(), names));
                    Ok::<(), BoxError>(())
                }
            })
            .open()
            .unwrap();
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap());
    }
    client.stop().await;
    seen.sort();

    let names = |list: &[&str]| list.iter().map(|n| n.to_string()).collect::<BTreeSet<_>>();
    assert_eq!(
        seen,
        vec![
            ("all".to_string(), names(&["a", "b", "c"])),
            ("bare".to_string(), BTreeSet::new()),
            ("filtered".to_string(), names(&["a", "b"])),
        ]
    );
}

#[tokio::test]
async fn process_variable_filter_selects_matching_instances() {
    let store = Arc::new(InMemoryTaskStore::new());
    let string = |v: &str| TypedValueDto::new("String", json!(v));
    let (_, ada) = start(&store, "T", vars(&[("customer", string("ada"))])).await;
    let (_, both) = start(
        &store,
        "T",
        vars(&[("customer", string("grace")), ("region", string("eu"))]),
    )
    .await;
    let (_, other) = start(&store, "T", vars(&[("customer", string("alan"))])).await;

    let client = builder(&store).build().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = client
        .subscribe("T")
        .process_variable_equals("customer", "ada")
        .process_variables_equals_in([("region", "eu"), ("missing", "nothing")])
        .process_definition_key_in(["invoice"])
        .handler(move |task: ExternalTask, service: ExternalTaskService| {
            let tx = tx.clone();
            async move {
                service.complete(VariableMap::new()).await?;
                let _ = tx.send(task.id().to_string());
                Ok::<(), BoxError>(())
            }
        })
        .open()
        .unwrap();
    assert_eq!(subscription.process_variables().len(), 3);
    assert_eq!(subscription.process_definition_key_in(), Some(&["invoice".to_string()][..]));

    let mut handled = BTreeSet::new();
    for _ in 0..2 {
        handled.insert(tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap());
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.stop().await;

    assert_eq!(handled, BTreeSet::from([ada, both]));
    assert!(rx.try_recv().is_err());
    let untouched = store.get_task(&other).await.unwrap();
    assert_eq!(untouched.worker_id, None);
}

#[tokio::test]
async fn undecodable_task_is_skipped_and_loop_continues() {
    let store = Arc::new(InMemoryTaskStore::new());
    let mut broken = TypedValueDto::new("Object", json!("{}"));
    broken.value_info.object_type_name = Some("com.acme.Missing".into());
    broken.value_info.serialization_data_format = Some("application/json".into());
    let (_, broken_id) = start(&store, "T", vars(&[("order", broken)])).await;
    let (_, good_id) = start(&store, "T", VariableDtoMap::new()).await;

    let (errors_tx, mut errors) = mpsc::unbounded_channel();
    let client = builder(&store)
        .error_listener(move |e: &ClientError| {
            if let ClientError::Decode { task_id, .. } = e {
                let _ = errors_tx.send(task_id.clone());
            }
        })
        .build()
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .subscribe("T")
        .handler(move |task: ExternalTask, service: ExternalTaskService| {
            let tx = tx.clone();
            async move {
                service.complete(VariableMap::new()).await?;
                let _ = tx.send(task.id().to_string());
                Ok::<(), BoxError>(())
            }
        })
        .open()
        .unwrap();

    let skipped = tokio::time::timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    let handled = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    client.stop().await;

    assert_eq!(skipped, broken_id);
    assert_eq!(handled, good_id);
    // The skipped task keeps its lease until it expires
    let broken = store.get_task(&broken_id).await.unwrap();
    assert_eq!(broken.worker_id.as_deref(), Some("worker-1"));
}

#[tokio::test]
async fn handler_error_reports_failure_with_one_retry_consumed() {
    let store = Arc::new(InMemoryTaskStore::new());
    let (_, task_id) = start(&store, "T", VariableDtoMap::new()).await;

    let client = builder(&store)
        .failure_retry_policy(RetryPolicy::with_max_attempts(3))
        .build()
        .unwrap();
    client
        .subscribe("T")
        .handler(|_task: ExternalTask, _service: ExternalTaskService| async move {
            Err::<(), BoxError>("payment gateway unreachable".into())
        })
        .open()
        .unwrap();

    let task = await_failure(&store, &task_id).await;
    client.stop().await;

    assert_eq!(task.retries, Some(2));
    assert_eq!(task.error_message.as_deref(), Some("payment gateway unreachable"));
    assert_eq!(task.worker_id, None);
    assert!(store.incidents().await.unwrap().is_empty());
}

#[tokio::test]
async fn handler_panic_without_retries_raises_incident() {
    let store = Arc::new(InMemoryTaskStore::new());
    let (_, task_id) = start(&store, "T", VariableDtoMap::new()).await;

    let client = builder(&store).build().unwrap();
    client
        .subscribe("T")
        .retry_policy(RetryPolicy::NONE)
        .handler(|_task: ExternalTask, _service: ExternalTaskService| async move {
            if true {
                panic!("ledger corrupted");
            }
            Ok::<(), BoxError>(())
        })
        .open()
        .unwrap();

    let task = await_failure(&store, &task_id).await;
    client.stop().await;

    assert_eq!(task.retries, Some(0));
    assert_eq!(task.error_message.as_deref(), Some("handler panicked: ledger corrupted"));
    let incidents = store.incidents().await.unwrap();
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].task_id, task_id);
}

#[tokio::test]
async fn graceful_stop_waits_for_in_flight_handlers() {
    let store = Arc::new(InMemoryTaskStore::new());
    let (instance_id, _) = start(&store, "T", VariableDtoMap::new()).await;

    let client = builder(&store).build().unwrap();
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    {
        let started = started.clone();
        let release = release.clone();
        client
            .subscribe("T")
            .handler(move |_task: ExternalTask, service: ExternalTaskService| {
                let started = started.clone();
                let release = release.clone();
                async move {
                    started.notify_one();
                    release.notified().await;
                    service.complete(VariableMap::new()).await?;
                    Ok::<(), BoxError>(())
                }
            })
            .open()
            .unwrap();
    }

    tokio::time::timeout(WAIT, started.notified()).await.unwrap();
    let stopper = {
        let client = client.clone();
        tokio::spawn(async move { client.stop().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!stopper.is_finished());

    release.notify_one();
    tokio::time::timeout(WAIT, stopper).await.unwrap().unwrap();

    assert!(!client.is_running());
    assert!(store.tasks_for_process_instance(&instance_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn hard_stop_abandons_in_flight_handlers() {
    let store = Arc::new(InMemoryTaskStore::new());
    let (_, task_id) = start(&store, "T", VariableDtoMap::new()).await;

    let client = builder(&store).build().unwrap();
    let started = Arc::new(Notify::new());
    {
        let started = started.clone();
        client
            .subscribe("T")
            .handler(move |_task: ExternalTask, _service: ExternalTaskService| {
                let started = started.clone();
                async move {
                    started.notify_one();
                    std::future::pending::<()>().await;
                    Ok::<(), BoxError>(())
                }
            })
            .open()
            .unwrap();
    }

    tokio::time::timeout(WAIT, started.notified()).await.unwrap();
    tokio::time::timeout(WAIT, client.stop_now()).await.unwrap();

    assert!(!client.is_running());
    assert_eq!(client.in_flight(), 0);
    // Nothing was reported; the lease simply runs out later
    let task = store.get_task(&task_id).await.unwrap();
    assert_eq!(task.worker_id.as_deref(), Some("worker-1"));
    assert_eq!(task.retries, None);
}

#[tokio::test]
async fn closed_subscription_stops_receiving_tasks() {
    let store = Arc::new(InMemoryTaskStore::new());
    let client = builder(&store).auto_fetching(false).build().unwrap();

    let subscription = client
        .subscribe("T")
        .handler(|_task: ExternalTask, _service: ExternalTaskService| async move { Ok::<(), BoxError>(()) })
        .open()
        .unwrap();
    assert_eq!(client.topic_names(), vec!["T".to_string()]);

    subscription.close();
    assert!(client.topic_names().is_empty());

    let (_, task_id) = start(&store, "T", VariableDtoMap::new()).await;
    client.start().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.stop().await;

    let task = store.get_task(&task_id).await.unwrap();
    assert_eq!(task.worker_id, None);
}
