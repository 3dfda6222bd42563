pub mod adapters;
pub mod domain;
pub mod infra;
pub mod services;

use std::sync::Arc;

use crate::{domain::catalog::Catalog, services::purchase::GatewayRegistry};

#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub gateways: GatewayRegistry,
    pub catalog: Arc<dyn Catalog>,
    pub return_success_url: Arc<str>,
    pub return_failure_url: Arc<str>,
}
