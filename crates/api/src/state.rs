//! Shared application state for the Axum API server.

use std::sync::Arc;

use herald_notifier::DeliveryEngine;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DeliveryEngine>,
}

impl AppState {
    pub fn new(engine: Arc<DeliveryEngine>) -> Self {
        Self { engine }
    }
}
