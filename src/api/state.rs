//! Shared state handed to every route via axum's `State` extractor.

use std::sync::Arc;

use crate::manager::SchedulerManager;

#[derive(Clone)]
pub struct ApiState {
    pub manager: Arc<SchedulerManager>,
}
