use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::directory::Directory;
use super::domain::{
    Actor, AssignmentId, NewServiceRequest, NotificationId, ProposalSubmission, RequestId,
    ReviewSubmission, Role, ServiceRequestUpdate, UserId,
};
use super::notifications::Notifier;
use super::repository::{MarketplaceRepository, NotificationRepository};
use super::service::{MarketplaceError, MarketplaceService};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Shared handler state: the service plus the users allowed to act as admin.
pub struct ApiState<R, D, N> {
    service: Arc<MarketplaceService<R, D, N>>,
    admins: Arc<BTreeSet<UserId>>,
}

impl<R, D, N> Clone for ApiState<R, D, N> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            admins: Arc::clone(&self.admins),
        }
    }
}

impl<R, D, N> ApiState<R, D, N> {
    pub fn new(service: Arc<MarketplaceService<R, D, N>>, admins: BTreeSet<UserId>) -> Self {
        Self {
            service,
            admins: Arc::new(admins),
        }
    }
}

/// Router builder exposing the marketplace workflow over HTTP.
pub fn marketplace_router<R, D, N>(
    service: Arc<MarketplaceService<R, D, N>>,
    admins: BTreeSet<UserId>,
) -> Router
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route(
            "/api/v1/requests",
            post(create_request_handler::<R, D, N>).get(list_requests_handler::<R, D, N>),
        )
        .route(
            "/api/v1/requests/:request_id",
            get(get_request_handler::<R, D, N>)
                .patch(update_request_handler::<R, D, N>)
                .delete(cancel_request_handler::<R, D, N>),
        )
        .route(
            "/api/v1/assignments",
            post(propose_handler::<R, D, N>).get(list_assignments_handler::<R, D, N>),
        )
        .route(
            "/api/v1/assignments/:assignment_id",
            get(get_assignment_handler::<R, D, N>),
        )
        .route(
            "/api/v1/assignments/:assignment_id/accept",
            post(accept_handler::<R, D, N>),
        )
        .route(
            "/api/v1/assignments/:assignment_id/complete",
            post(complete_handler::<R, D, N>),
        )
        .route(
            "/api/v1/assignments/:assignment_id/withdraw",
            post(withdraw_handler::<R, D, N>),
        )
        .route(
            "/api/v1/reviews",
            post(submit_review_handler::<R, D, N>).get(list_reviews_handler::<R, D, N>),
        )
        .route(
            "/api/v1/providers/:provider_id/reviews",
            get(provider_reviews_handler::<R, D, N>),
        )
        .route(
            "/api/v1/providers/:provider_id/review-stats",
            get(provider_review_stats_handler::<R, D, N>),
        )
        .route("/api/v1/statistics", get(statistics_handler::<R, D, N>))
        .route(
            "/api/v1/notifications",
            get(list_notifications_handler::<R, D, N>),
        )
        .route(
            "/api/v1/notifications/read-all",
            post(mark_all_read_handler::<R, D, N>),
        )
        .route(
            "/api/v1/notifications/:notification_id/read",
            post(mark_read_handler::<R, D, N>),
        )
        .with_state(ApiState::new(service, admins))
}

/// Resolve the caller from the auth layer's headers. An `admin` claim is only
/// honoured for allow-listed users.
pub(crate) fn actor_from_headers(
    headers: &HeaderMap,
    admins: &BTreeSet<UserId>,
) -> Result<Actor, Response> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let Some(id) = header(ACTOR_ID_HEADER) else {
        return Err(unauthenticated("missing x-actor-id header"));
    };
    let Some(role) = header(ACTOR_ROLE_HEADER).and_then(Role::parse) else {
        return Err(unauthenticated(
            "x-actor-role must be client, provider or admin",
        ));
    };

    let actor = Actor::new(id, role);
    if actor.role == Role::Admin && !admins.contains(&actor.id) {
        let payload = json!({
            "error": format!("{} is not an administrator", actor.id),
            "kind": "authorization",
        });
        return Err((StatusCode::FORBIDDEN, axum::Json(payload)).into_response());
    }
    Ok(actor)
}

fn unauthenticated(message: &str) -> Response {
    let payload = json!({
        "error": message,
        "kind": "unauthenticated",
    });
    (StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response()
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, MarketplaceError>) -> Response {
    match result {
        Ok(body) => (status, axum::Json(body)).into_response(),
        Err(err) => err.into_response(),
    }
}

impl IntoResponse for MarketplaceError {
    fn into_response(self) -> Response {
        let status = match &self {
            MarketplaceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MarketplaceError::Authorization { .. } => StatusCode::FORBIDDEN,
            MarketplaceError::InvalidState { .. } | MarketplaceError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            MarketplaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            MarketplaceError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MarketplaceError::Directory(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        if status.is_server_error() {
            error!(error = %self, kind = self.kind(), "marketplace request failed");
        }
        let payload = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        (status, axum::Json(payload)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AssignmentQuery {
    pub(crate) request_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct NotificationQuery {
    #[serde(default)]
    pub(crate) unread_only: bool,
}

pub(crate) async fn create_request_handler<R, D, N>(
    State(state): State<ApiState<R, D, N>>,
    headers: HeaderMap,
    axum::Json(input): axum::Json<NewServiceRequest>,
) -> Response
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers, &state.admins) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::CREATED,
        state.service.create_request(&actor, input),
    )
}

pub(crate) async fn list_requests_handler<R, D, N>(
    State(state): State<ApiState<R, D, N>>,
    headers: HeaderMap,
) -> Response
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers, &state.admins) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(StatusCode::OK, state.service.list_requests(&actor))
}

pub(crate) async fn get_request_handler<R, D, N>(
    State(state): State<ApiState<R, D, N>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Response
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers, &state.admins) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        state.service.get_request(&actor, &RequestId(request_id)),
    )
}

pub(crate) async fn update_request_handler<R, D, N>(
    State(state): State<ApiState<R, D, N>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
    axum::Json(update): axum::Json<ServiceRequestUpdate>,
) -> Response
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers, &state.admins) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        state
            .service
            .update_request(&actor, &RequestId(request_id), update),
    )
}

pub(crate) async fn cancel_request_handler<R, D, N>(
    State(state): State<ApiState<R, D, N>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Response
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers, &state.admins) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        state.service.cancel_request(&actor, &RequestId(request_id)),
    )
}

pub(crate) async fn propose_handler<R, D, N>(
    State(state): State<ApiState<R, D, N>>,
    headers: HeaderMap,
    axum::Json(submission): axum::Json<ProposalSubmission>,
) -> Response
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers, &state.admins) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::CREATED,
        state.service.propose(&actor, submission),
    )
}

pub(crate) async fn list_assignments_handler<R, D, N>(
    State(state): State<ApiState<R, D, N>>,
    headers: HeaderMap,
    Query(query): Query<AssignmentQuery>,
) -> Response
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers, &state.admins) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let request_id = query.request_id.map(RequestId);
    respond(
        StatusCode::OK,
        state
            .service
            .list_assignments(&actor, request_id.as_ref()),
    )
}

pub(crate) async fn get_assignment_handler<R, D, N>(
    State(state): State<ApiState<R, D, N>>,
    headers: HeaderMap,
    Path(assignment_id): Path<String>,
) -> Response
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers, &state.admins) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        state
            .service
            .get_assignment(&actor, &AssignmentId(assignment_id)),
    )
}

pub(crate) async fn accept_handler<R, D, N>(
    State(state): State<ApiState<R, D, N>>,
    headers: HeaderMap,
    Path(assignment_id): Path<String>,
) -> Response
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers, &state.admins) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        state.service.accept(&actor, &AssignmentId(assignment_id)),
    )
}

pub(crate) async fn complete_handler<R, D, N>(
    State(state): State<ApiState<R, D, N>>,
    headers: HeaderMap,
    Path(assignment_id): Path<String>,
) -> Response
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers, &state.admins) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        state.service.complete(&actor, &AssignmentId(assignment_id)),
    )
}

pub(crate) async fn withdraw_handler<R, D, N>(
    State(state): State<ApiState<R, D, N>>,
    headers: HeaderMap,
    Path(assignment_id): Path<String>,
) -> Response
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers, &state.admins) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        state.service.withdraw(&actor, &AssignmentId(assignment_id)),
    )
}

pub(crate) async fn submit_review_handler<R, D, N>(
    State(state): State<ApiState<R, D, N>>,
    headers: HeaderMap,
    axum::Json(submission): axum::Json<ReviewSubmission>,
) -> Response
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers, &state.admins) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::CREATED,
        state.service.submit_review(&actor, submission),
    )
}

pub(crate) async fn list_reviews_handler<R, D, N>(
    State(state): State<ApiState<R, D, N>>,
    headers: HeaderMap,
) -> Response
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers, &state.admins) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(StatusCode::OK, state.service.list_reviews(&actor))
}

pub(crate) async fn provider_reviews_handler<R, D, N>(
    State(state): State<ApiState<R, D, N>>,
    headers: HeaderMap,
    Path(provider_id): Path<String>,
) -> Response
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    if let Err(response) = actor_from_headers(&headers, &state.admins) {
        return response;
    }
    respond(
        StatusCode::OK,
        state.service.provider_reviews(&UserId::new(provider_id)),
    )
}

pub(crate) async fn provider_review_stats_handler<R, D, N>(
    State(state): State<ApiState<R, D, N>>,
    headers: HeaderMap,
    Path(provider_id): Path<String>,
) -> Response
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    if let Err(response) = actor_from_headers(&headers, &state.admins) {
        return response;
    }
    respond(
        StatusCode::OK,
        state
            .service
            .provider_review_statistics(&UserId::new(provider_id)),
    )
}

pub(crate) async fn statistics_handler<R, D, N>(
    State(state): State<ApiState<R, D, N>>,
    headers: HeaderMap,
) -> Response
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers, &state.admins) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(StatusCode::OK, state.service.statistics(&actor))
}

pub(crate) async fn list_notifications_handler<R, D, N>(
    State(state): State<ApiState<R, D, N>>,
    headers: HeaderMap,
    Query(query): Query<NotificationQuery>,
) -> Response
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers, &state.admins) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        state
            .service
            .list_notifications(&actor, query.unread_only),
    )
}

pub(crate) async fn mark_read_handler<R, D, N>(
    State(state): State<ApiState<R, D, N>>,
    headers: HeaderMap,
    Path(notification_id): Path<String>,
) -> Response
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers, &state.admins) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        state
            .service
            .mark_notification_read(&actor, &NotificationId(notification_id)),
    )
}

pub(crate) async fn mark_all_read_handler<R, D, N>(
    State(state): State<ApiState<R, D, N>>,
    headers: HeaderMap,
) -> Response
where
    R: MarketplaceRepository + NotificationRepository + 'static,
    D: Directory + 'static,
    N: Notifier + 'static,
{
    let actor = match actor_from_headers(&headers, &state.admins) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let result = state
        .service
        .mark_all_notifications_read(&actor)
        .map(|updated| json!({ "updated": updated }));
    respond(StatusCode::OK, result)
}
