//! Instance handlers.
//!
//! GET  /api/workflows/instances              list with paging
//! GET  /api/workflows/instances/stats        counts by status
//! GET  /api/workflows/instances/:id          detail with approval ledger
//! POST /api/workflows/instances              start
//! POST /api/workflows/instances/:id/approve  approve current step
//! POST /api/workflows/instances/:id/reject   reject current step

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query,
    },
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;

use approvals_core::{
    ApprovalEngine, Created, Decision, DecisionRequest, InstanceDetail, InstanceFilter,
    InstanceStats, Page, StartRequest, WorkflowInstance,
};

use crate::error::ApiResult;

pub async fn list_instances(
    Extension(engine): Extension<Arc<ApprovalEngine>>,
    query: Result<Query<InstanceFilter>, QueryRejection>,
) -> ApiResult<Json<Page<WorkflowInstance>>> {
    let Query(filter) = query?;
    Ok(Json(engine.list_instances(&filter).await?))
}

pub async fn instance_stats(
    Extension(engine): Extension<Arc<ApprovalEngine>>,
) -> ApiResult<Json<InstanceStats>> {
    Ok(Json(engine.instance_stats().await?))
}

pub async fn get_instance(
    Extension(engine): Extension<Arc<ApprovalEngine>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<InstanceDetail>> {
    let Path(id) = id?;
    Ok(Json(engine.get_instance(id).await?))
}

pub async fn start_instance(
    Extension(engine): Extension<Arc<ApprovalEngine>>,
    body: Result<Json<StartRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Created>)> {
    let Json(req) = body?;
    let created = engine.start(req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn approve(
    Extension(engine): Extension<Arc<ApprovalEngine>>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<DecisionRequest>, JsonRejection>,
) -> ApiResult<Json<Decision>> {
    let Path(id) = id?;
    let Json(req) = body?;
    Ok(Json(engine.approve(id, req).await?))
}

pub async fn reject(
    Extension(engine): Extension<Arc<ApprovalEngine>>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<DecisionRequest>, JsonRejection>,
) -> ApiResult<Json<Decision>> {
    let Path(id) = id?;
    let Json(req) = body?;
    Ok(Json(engine.reject(id, req).await?))
}
