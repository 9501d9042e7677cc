//! Template handlers.
//!
//! GET    /api/workflows/templates       list (search, entity_type, active)
//! POST   /api/workflows/templates       create
//! GET    /api/workflows/templates/:id   fetch one
//! PUT    /api/workflows/templates/:id   partial update
//! DELETE /api/workflows/templates/:id   delete (unused templates only)

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
    ApprovalEngine, Created, NewTemplate, TemplateFilter, TemplatePatch, WorkflowTemplate,
};

use crate::error::ApiResult;

pub async fn list_templates(
    Extension(engine): Extension<Arc<ApprovalEngine>>,
    query: Result<Query<TemplateFilter>, QueryRejection>,
) -> ApiResult<Json<Vec<WorkflowTemplate>>> {
    let Query(filter) = query?;
    Ok(Json(engine.list_templates(&filter).await?))
}

pub async fn create_template(
    Extension(engine): Extension<Arc<ApprovalEngine>>,
    body: Result<Json<NewTemplate>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Created>)> {
    let Json(input) = body?;
    let created = engine.create_template(input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_template(
    Extension(engine): Extension<Arc<ApprovalEngine>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<WorkflowTemplate>> {
    let Path(id) = id?;
    Ok(Json(engine.get_template(id).await?))
}

pub async fn update_template(
    Extension(engine): Extension<Arc<ApprovalEngine>>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<TemplatePatch>, JsonRejection>,
) -> ApiResult<Json<WorkflowTemplate>> {
    let Path(id) = id?;
    let Json(patch) = body?;
    Ok(Json(engine.update_template(id, patch).await?))
}

pub async fn delete_template(
    Extension(engine): Extension<Arc<ApprovalEngine>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = id?;
    engine.delete_template(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
