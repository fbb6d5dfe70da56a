// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{services::SubmissionLifecycle, store::GradingStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn GradingStore>,
    pub lifecycle: SubmissionLifecycle,
}

impl AppState {
    /// Builds the state around one store shared by handlers and the lifecycle.
    pub fn new(store: Arc<dyn GradingStore>) -> Self {
        Self {
            lifecycle: SubmissionLifecycle::new(store.clone()),
            store,
        }
    }
}

impl FromRef<AppState> for Arc<dyn GradingStore> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for SubmissionLifecycle {
    fn from_ref(state: &AppState) -> Self {
        state.lifecycle.clone()
    }
}
