//! approvals_server: REST surface for the approval engine.

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
