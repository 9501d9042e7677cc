//! GET /api/workflows/pending?user_id=… | ?role=…

use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query},
    Extension, Json,
};
use serde::Deserialize;

use approvals_core::{ApprovalEngine, PendingApproval, PendingQuery, WorkflowError};

use crate::error::ApiResult;

#[derive(Debug, Default, Deserialize)]
pub struct PendingParams {
    pub user_id: Option<String>,
    pub role: Option<String>,
}

impl PendingParams {
    fn into_query(self) -> Result<PendingQuery, WorkflowError> {
        match (self.user_id, self.role) {
            (Some(user_id), None) => Ok(PendingQuery::User(user_id)),
            (None, Some(role)) => Ok(PendingQuery::Role(role)),
            (None, None) => Err(WorkflowError::validation("user_id or role is required")),
            (Some(_), Some(_)) => Err(WorkflowError::validation(
                "pass either user_id or role, not both",
            )),
        }
    }
}

pub async fn pending_approvals(
    Extension(engine): Extension<Arc<ApprovalEngine>>,
    query: Result<Query<PendingParams>, QueryRejection>,
) -> ApiResult<Json<Vec<PendingApproval>>> {
    let Query(params) = query?;
    Ok(Json(engine.pending_for(params.into_query()?).await?))
}
