use crate::AppState;
use crate::db::feedback_request::Model as FeedbackRequest;
use crate::manager::LifecycleError;
use crate::model::{ErrorResponse, ListQuery, NewSubmission, RequestStatusView};
use crate::store::RequestFilter;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use log::{error, warn};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn err_to_response(err: LifecycleError) -> ApiError {
    let status = match &err {
        LifecycleError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LifecycleError::NotFound(_) => StatusCode::NOT_FOUND,
        LifecycleError::InvalidState { .. } | LifecycleError::RetryExhausted { .. } => {
            StatusCode::CONFLICT
        }
        LifecycleError::ExternalService { .. } => StatusCode::BAD_GATEWAY,
        LifecycleError::Encode(_) | LifecycleError::Store(_) => {
            error!("internal error: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                    message: "an internal error occurred".to_string(),
                }),
            );
        }
    };
    warn!("rejected request: {err}");
    (
        status,
        Json(ErrorResponse {
            code: status.as_u16(),
            message: err.to_string(),
        }),
    )
}

#[utoipa::path(post, path = "/api/v1/feedback-requests", request_body = NewSubmission, responses((status = CREATED, body = FeedbackRequest), (status = UNPROCESSABLE_ENTITY, body = ErrorResponse), (status = INTERNAL_SERVER_ERROR, body = ErrorResponse)), description = "Submit a feedback request")]
pub async fn submit(
    state: State<AppState>,
    body: Json<NewSubmission>,
) -> Result<(StatusCode, Json<FeedbackRequest>), ApiError> {
    state
        .manager
        .submit(body.0)
        .await
        .map(|request| (StatusCode::CREATED, Json(request)))
        .map_err(err_to_response)
}

#[utoipa::path(get, path = "/api/v1/feedback-requests", params(ListQuery), responses((status = OK, body = Vec<FeedbackRequest>), (status = INTERNAL_SERVER_ERROR, body = ErrorResponse)), description = "List feedback requests")]
pub async fn list(
    state: State<AppState>,
    query: Query<ListQuery>,
) -> Result<Json<Vec<FeedbackRequest>>, ApiError> {
    state
        .manager
        .list(&RequestFilter::from(query.0))
        .await
        .map(Json)
        .map_err(err_to_response)
}

#[utoipa::path(get, path = "/api/v1/feedback-requests/{id}", params(("id" = i32, Path, description = "Feedback request id")), responses((status = OK, body = FeedbackRequest), (status = NOT_FOUND, body = ErrorResponse)), description = "Get a feedback request")]
pub async fn get(
    state: State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<FeedbackRequest>, ApiError> {
    state
        .manager
        .get(id)
        .await
        .map(Json)
        .map_err(err_to_response)
}

#[utoipa::path(get, path = "/api/v1/feedback-requests/{id}/status", params(("id" = i32, Path, description = "Feedback request id")), responses((status = OK, body = RequestStatusView), (status = NOT_FOUND, body = ErrorResponse)), description = "Get the processing status of a feedback request")]
pub async fn status(
    state: State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<RequestStatusView>, ApiError> {
    state
        .manager
        .status(id)
        .await
        .map(Json)
        .map_err(err_to_response)
}

#[utoipa::path(post, path = "/api/v1/feedback-requests/{id}/process", params(("id" = i32, Path, description = "Feedback request id")), responses((status = OK, body = FeedbackRequest), (status = NOT_FOUND, body = ErrorResponse), (status = CONFLICT, body = ErrorResponse)), description = "Run one processing attempt and return the resulting record")]
pub async fn process(
    state: State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<FeedbackRequest>, ApiError> {
    state
        .manager
        .process(id)
        .await
        .map(Json)
        .map_err(err_to_response)
}

#[utoipa::path(post, path = "/api/v1/feedback-requests/{id}/retry", params(("id" = i32, Path, description = "Feedback request id")), responses((status = OK, body = FeedbackRequest), (status = NOT_FOUND, body = ErrorResponse), (status = CONFLICT, body = ErrorResponse)), description = "Retry a failed feedback request")]
pub async fn retry(
    state: State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<FeedbackRequest>, ApiError> {
    state
        .manager
        .retry(id)
        .await
        .map(Json)
        .map_err(err_to_response)
}

#[utoipa::path(post, path = "/api/v1/feedback-requests/{id}/archive", params(("id" = i32, Path, description = "Feedback request id")), responses((status = OK, body = FeedbackRequest), (status = NOT_FOUND, body = ErrorResponse), (status = CONFLICT, body = ErrorResponse)), description = "Archive a finished feedback request")]
pub async fn archive(
    state: State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<FeedbackRequest>, ApiError> {
    state
        .manager
        .archive(id)
        .await
        .map(Json)
        .map_err(err_to_response)
}
