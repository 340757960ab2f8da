//! REST surface of a [`TaskStore`], served with axum.
//!
//! Routes mirror the engine's external task API. Failures answer with a JSON
//! [`ErrorResponse`] and a status derived from the [`StoreError`]:
//! 404 for unknown ids, 409 for lease conflicts, 400 for invalid requests.

use crate::core::VariableDtoMap;
use crate::protocol::{
    BpmnErrorRequest, CompleteRequest, CreateExternalTaskRequest, ErrorResponse,
    ExtendLockRequest, ExternalTaskDto, FailureRequest, FetchAndLockRequest, LockRequest,
    LockedExternalTaskDto, ProcessInstanceDto, SetPriorityRequest, SetRetriesRequest,
    SetVariablesRequest, StartProcessInstanceRequest, SuspensionStateRequest,
};
use crate::storage::{NewExternalTask, NewProcessInstance, StoreError, TaskStore, TopicNameFilter};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::debug;

type SharedStore = Arc<dyn TaskStore>;

/// Builds the router. Mount it under the engine's base path, e.g.
/// `Router::new().nest("/engine-rest", router(store))`.
pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/external-task/fetchAndLock", post(fetch_and_lock))
        .route("/external-task/topic-names", get(topic_names))
        .route("/external-task/{id}", get(get_task))
        .route("/external-task/{id}/errorDetails", get(error_details))
        .route("/external-task/{id}/complete", post(complete))
        .route("/external-task/{id}/failure", post(handle_failure))
        .route("/external-task/{id}/bpmnError", post(handle_bpmn_error))
        .route("/external-task/{id}/extendLock", post(extend_lock))
        .route("/external-task/{id}/lock", post(lock))
        .route("/external-task/{id}/unlock", post(unlock))
        .route("/external-task/{id}/retries", put(set_retries))
        .route("/external-task/{id}/priority", put(set_priority))
        .route("/process-instance", post(start_process_instance))
        .route(
            "/process-instance/{id}",
            get(get_process_instance).delete(delete_process_instance),
        )
        .route(
            "/process-instance/{id}/variables",
            get(get_variables).post(set_variables),
        )
        .route("/process-instance/{id}/suspended", put(set_suspended))
        .route("/process-instance/{id}/external-task", post(create_external_task))
        .with_state(store)
}

// ===== Error Handling =====

/// A [`StoreError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub StoreError);

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        ApiError(error)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            StoreError::TaskNotFound(_) | StoreError::ProcessInstanceNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            StoreError::LockConflict(_) | StoreError::LockExpired { .. } | StoreError::Suspended(_) => {
                StatusCode::CONFLICT
            }
            StoreError::InvalidArgument(_) | StoreError::Codec { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        debug!("Request rejected with {}: {}", status, self.0);
        let body = ErrorResponse {
            error_type: self.0.kind().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ===== External Tasks =====

async fn fetch_and_lock(
    State(store): State<SharedStore>,
    Json(request): Json<FetchAndLockRequest>,
) -> ApiResult<Json<Vec<LockedExternalTaskDto>>> {
    Ok(Json(store.fetch_and_lock(request).await?))
}

async fn topic_names(
    State(store): State<SharedStore>,
    Query(filter): Query<TopicNameFilter>,
) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(store.topic_names(filter).await?))
}

async fn get_task(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
) -> ApiResult<Json<ExternalTaskDto>> {
    Ok(Json(store.get_task(&id).await?))
}

async fn error_details(State(store): State<SharedStore>, Path(id): Path<String>) -> ApiResult<Response> {
    Ok(match store.error_details(&id).await? {
        Some(details) => details.into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

async fn complete(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
    Json(request): Json<CompleteRequest>,
) -> ApiResult<StatusCode> {
    store.complete(&id, request).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_failure(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
    Json(request): Json<FailureRequest>,
) -> ApiResult<StatusCode> {
    store.handle_failure(&id, request).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_bpmn_error(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
    Json(request): Json<BpmnErrorRequest>,
) -> ApiResult<StatusCode> {
    store.handle_bpmn_error(&id, request).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn extend_lock(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
    Json(request): Json<ExtendLockRequest>,
) -> ApiResult<StatusCode> {
    store.extend_lock(&id, request).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn lock(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
    Json(request): Json<LockRequest>,
) -> ApiResult<StatusCode> {
    store.lock(&id, request).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unlock(State(store): State<SharedStore>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    store.unlock(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_retries(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
    Json(request): Json<SetRetriesRequest>,
) -> ApiResult<StatusCode> {
    store.set_retries(&id, request.retries).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_priority(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
    Json(request): Json<SetPriorityRequest>,
) -> ApiResult<StatusCode> {
    store.set_priority(&id, request.priority).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ===== Process Instances =====

async fn start_process_instance(
    State(store): State<SharedStore>,
    Json(request): Json<StartProcessInstanceRequest>,
) -> ApiResult<(StatusCode, Json<ProcessInstanceDto>)> {
    let params = NewProcessInstance {
        process_definition_key: request.process_definition_key,
        business_key: request.business_key,
        variables: request.variables,
    };
    let instance = store.create_process_instance(params).await?;
    Ok((StatusCode::CREATED, Json(instance.into())))
}

async fn get_process_instance(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProcessInstanceDto>> {
    Ok(Json(store.process_instance(&id).await?.into()))
}

async fn delete_process_instance(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    store.delete_process_instance(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_variables(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
) -> ApiResult<Json<VariableDtoMap>> {
    Ok(Json(store.process_instance(&id).await?.variables))
}

async fn set_variables(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
    Json(request): Json<SetVariablesRequest>,
) -> ApiResult<StatusCode> {
    store.set_variables(&id, request.modifications).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_suspended(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
    Json(request): Json<SuspensionStateRequest>,
) -> ApiResult<StatusCode> {
    if request.suspended {
        store.suspend_process_instance(&id).await?;
    } else {
        store.activate_process_instance(&id).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn create_external_task(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
    Json(request): Json<CreateExternalTaskRequest>,
) -> ApiResult<(StatusCode, Json<ExternalTaskDto>)> {
    let mut params = NewExternalTask::new(id, request.topic_name)
        .priority(request.priority)
        .local_variables(request.local_variables);
    if let Some(activity_id) = request.activity_id {
        params = params.activity_id(activity_id);
    }
    let task = store.create_external_task(params).await?;
    Ok((StatusCode::CREATED, Json(task.to_dto(false))))
}
