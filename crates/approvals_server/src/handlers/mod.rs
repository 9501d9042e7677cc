pub mod health;
pub mod instances;
pub mod pending;
pub mod templates;
