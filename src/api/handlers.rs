use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};
use log::error;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::WorkflowConfig;
use crate::error::{ConfigError, ConflictTarget, Violation};
use crate::logic::{
    ConfigOperations, EnvironmentOperations, ProjectOperations, ProposalWorkflow, RestoreVersion,
    UpdateConfig,
};
use crate::model::{
    AuditEvent, Capability, Config, ConfigDetails, ConfigProposal, ConfigVariant, Environment,
    EvaluationContext, Id, Membership, NewConfig, NewProject, NewProposal, Project,
    ProposalStatus, Resolution, UserContext, VariantRevision,
};
use crate::store::Store;

/// Shared handler state: the store and the review policy new projects start with
pub struct AppState<S> {
    pub store: Arc<S>,
    pub workflow: WorkflowConfig,
}

impl<S> AppState<S> {
    pub fn new(store: Arc<S>, workflow: WorkflowConfig) -> Self {
        Self { store, workflow }
    }
}

// Not derived: `S` itself need not be Clone
impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            workflow: self.workflow.clone(),
        }
    }
}

pub type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> ListResponse<T> {
    fn of(items: Vec<T>) -> Json<Self> {
        let total = items.len();
        Json(Self { items, total })
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
    /// Clients refetch and resubmit on retryable errors
    pub retryable: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictDetails>,
}

#[derive(Debug, Serialize)]
pub struct ConflictDetails {
    pub target: ConflictTarget,
    pub expected: i64,
    pub current: Option<i64>,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
            kind: "error".to_string(),
            retryable: false,
            violations: Vec::new(),
            conflict: None,
        }
    }
}

pub fn status_for(err: &ConfigError) -> StatusCode {
    match err {
        ConfigError::NotFound(_) => StatusCode::NOT_FOUND,
        ConfigError::Forbidden { .. } => StatusCode::FORBIDDEN,
        ConfigError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ConfigError::VersionConflict { .. }
        | ConfigError::InvalidState { .. }
        | ConfigError::DuplicateName(_) => StatusCode::CONFLICT,
        ConfigError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ConfigError> for (StatusCode, Json<ErrorResponse>) {
    fn from(err: ConfigError) -> Self {
        let status = status_for(&err);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("request failed: {:#}", err);
        }

        let mut body = ErrorResponse::new(&err.to_string());
        body.kind = err.kind().to_string();
        body.retryable = err.is_retryable();
        match err {
            ConfigError::Validation { violations, .. } => body.violations = violations,
            ConfigError::VersionConflict {
                target,
                expected,
                current,
            } => {
                body.conflict = Some(ConflictDetails {
                    target,
                    expected,
                    current,
                })
            }
            _ => {}
        }
        (status, Json(body))
    }
}

// Project handlers

pub async fn create_project<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    RequestJson(request): RequestJson<NewProject>,
) -> Result<(StatusCode, Json<Project>), (StatusCode, Json<ErrorResponse>)> {
    let project =
        ProjectOperations::create_project(&*state.store, &user, request, &state.workflow).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn get_project<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    Path(project_id): Path<Id>,
) -> ApiResult<Project> {
    Ok(Json(
        ProjectOperations::get_project(&*state.store, &user, &project_id).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct MemberRequest {
    pub email: String,
    pub role: Capability,
}

pub async fn upsert_project_member<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    Path(project_id): Path<Id>,
    RequestJson(request): RequestJson<MemberRequest>,
) -> ApiResult<Membership> {
    let membership = ProjectOperations::upsert_member(
        &*state.store,
        &user,
        &project_id,
        &request.email,
        request.role,
    )
    .await?;
    Ok(Json(membership))
}

#[derive(Debug, Deserialize)]
pub struct EventQuery {
    pub config_id: Option<Id>,
}

pub async fn list_events<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    Path(project_id): Path<Id>,
    Query(query): Query<EventQuery>,
) -> ApiResult<ListResponse<AuditEvent>> {
    let events = ConfigOperations::list_events(
        &*state.store,
        &user,
        &project_id,
        query.config_id.as_ref(),
    )
    .await?;
    Ok(ListResponse::of(events))
}

// Environment handlers

pub async fn list_environments<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    Path(project_id): Path<Id>,
) -> ApiResult<ListResponse<Environment>> {
    let environments =
        EnvironmentOperations::list_environments(&*state.store, &user, &project_id).await?;
    Ok(ListResponse::of(environments))
}

#[derive(Debug, Deserialize)]
pub struct NewEnvironmentRequest {
    pub name: String,
    /// Environment whose variants the new one starts from
    #[serde(default)]
    pub copy_from: Option<Id>,
}

pub async fn create_environment<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    Path(project_id): Path<Id>,
    RequestJson(request): RequestJson<NewEnvironmentRequest>,
) -> Result<(StatusCode, Json<Environment>), (StatusCode, Json<ErrorResponse>)> {
    let environment = EnvironmentOperations::create_environment(
        &*state.store,
        &user,
        &project_id,
        &request.name,
        request.copy_from.as_ref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(environment)))
}

pub async fn delete_environment<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    Path((project_id, environment_id)): Path<(Id, Id)>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    EnvironmentOperations::delete_environment(&*state.store, &user, &project_id, &environment_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub environment_ids: Vec<Id>,
}

pub async fn reorder_environments<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    Path(project_id): Path<Id>,
    RequestJson(request): RequestJson<ReorderRequest>,
) -> ApiResult<ListResponse<Environment>> {
    let environments = EnvironmentOperations::reorder_environments(
        &*state.store,
        &user,
        &project_id,
        &request.environment_ids,
    )
    .await?;
    Ok(ListResponse::of(environments))
}

// Config handlers

pub async fn list_configs<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    Path(project_id): Path<Id>,
) -> ApiResult<ListResponse<Config>> {
    let configs = ConfigOperations::list_configs(&*state.store, &user, &project_id).await?;
    Ok(ListResponse::of(configs))
}

pub async fn create_config<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    Path(project_id): Path<Id>,
    RequestJson(request): RequestJson<NewConfig>,
) -> Result<(StatusCode, Json<ConfigDetails>), (StatusCode, Json<ErrorResponse>)> {
    let details =
        ConfigOperations::create_config(&*state.store, &user, &project_id, request).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    /// Environment name; the base definition when absent
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub context: EvaluationContext,
}

pub async fn resolve_config<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    Path((project_id, name)): Path<(Id, String)>,
    RequestJson(request): RequestJson<ResolveRequest>,
) -> ApiResult<Resolution> {
    let resolution = ConfigOperations::resolve_config(
        &*state.store,
        &user,
        &project_id,
        &name,
        request.environment.as_deref(),
        &request.context,
    )
    .await?;
    Ok(Json(resolution))
}

pub async fn get_config<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    Path(config_id): Path<Id>,
) -> ApiResult<ConfigDetails> {
    Ok(Json(
        ConfigOperations::get_config(&*state.store, &user, &config_id).await?,
    ))
}

pub async fn update_config<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    Path(config_id): Path<Id>,
    RequestJson(request): RequestJson<UpdateConfig>,
) -> ApiResult<ConfigDetails> {
    Ok(Json(
        ConfigOperations::update_config(&*state.store, &user, &config_id, request).await?,
    ))
}

pub async fn delete_config<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    Path(config_id): Path<Id>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    ConfigOperations::delete_config(&*state.store, &user, &config_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_revisions<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    Path(variant_id): Path<Id>,
) -> ApiResult<ListResponse<VariantRevision>> {
    let revisions = ConfigOperations::list_revisions(&*state.store, &user, &variant_id).await?;
    Ok(ListResponse::of(revisions))
}

pub async fn restore_version<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    Path((config_id, variant_id)): Path<(Id, Id)>,
    RequestJson(request): RequestJson<RestoreVersion>,
) -> ApiResult<ConfigVariant> {
    let variant =
        ConfigOperations::restore_version(&*state.store, &user, &config_id, &variant_id, request)
            .await?;
    Ok(Json(variant))
}

// Proposal handlers

#[derive(Debug, Deserialize)]
pub struct ProposalQuery {
    pub status: Option<ProposalStatus>,
}

pub async fn list_proposals<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    Path(config_id): Path<Id>,
    Query(query): Query<ProposalQuery>,
) -> ApiResult<ListResponse<ConfigProposal>> {
    let proposals =
        ProposalWorkflow::list_proposals(&*state.store, &user, &config_id, query.status).await?;
    Ok(ListResponse::of(proposals))
}

pub async fn create_proposal<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    Path(config_id): Path<Id>,
    RequestJson(request): RequestJson<NewProposal>,
) -> Result<(StatusCode, Json<ConfigProposal>), (StatusCode, Json<ErrorResponse>)> {
    let proposal =
        ProposalWorkflow::create_proposal(&*state.store, &user, &config_id, request).await?;
    Ok((StatusCode::CREATED, Json(proposal)))
}

pub async fn get_proposal<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    Path(proposal_id): Path<Id>,
) -> ApiResult<ConfigProposal> {
    Ok(Json(
        ProposalWorkflow::get_proposal(&*state.store, &user, &proposal_id).await?,
    ))
}

pub async fn approve_proposal<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    Path(proposal_id): Path<Id>,
) -> ApiResult<ConfigProposal> {
    Ok(Json(
        ProposalWorkflow::approve_proposal(&*state.store, &user, &proposal_id).await?,
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    /// The proposal replacing this one
    #[serde(default)]
    pub superseded_by: Option<Id>,
}

pub async fn reject_proposal<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    Path(proposal_id): Path<Id>,
    request: Option<RequestJson<RejectRequest>>,
) -> ApiResult<ConfigProposal> {
    let request = request.map(|RequestJson(r)| r).unwrap_or_default();
    Ok(Json(
        ProposalWorkflow::reject_proposal(
            &*state.store,
            &user,
            &proposal_id,
            request.superseded_by,
        )
        .await?,
    ))
}

#[derive(Debug, Serialize)]
pub struct RejectAllResponse {
    pub rejected: Vec<Id>,
}

pub async fn reject_all_pending<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    Path(variant_id): Path<Id>,
) -> ApiResult<RejectAllResponse> {
    let rejected = ProposalWorkflow::reject_all_pending(&*state.store, &user, &variant_id).await?;
    Ok(Json(RejectAllResponse { rejected }))
}
