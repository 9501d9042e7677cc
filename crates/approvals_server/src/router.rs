//! Router construction for the approvals server.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use approvals_core::ApprovalEngine;

use crate::handlers;

/// Build the full axum router with all routes and middleware.
pub fn build_router(engine: Arc<ApprovalEngine>) -> Router {
    let api = Router::new()
        // Templates
        .route(
            "/templates",
            get(handlers::templates::list_templates).post(handlers::templates::create_template),
        )
        .route(
            "/templates/:id",
            get(handlers::templates::get_template)
                .put(handlers::templates::update_template)
                .delete(handlers::templates::delete_template),
        )
        // Instances
        .route(
            "/instances",
            get(handlers::instances::list_instances).post(handlers::instances::start_instance),
        )
        .route("/instances/stats", get(handlers::instances::instance_stats))
        .route("/instances/:id", get(handlers::instances::get_instance))
        .route("/instances/:id/approve", post(handlers::instances::approve))
        .route("/instances/:id/reject", post(handlers::instances::reject))
        // Work queue
        .route("/pending", get(handlers::pending::pending_approvals));

    Router::new()
        .route("/health", get(handlers::health::health))
        .nest("/api/workflows", api)
        .layer(Extension(engine))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
