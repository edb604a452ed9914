use std::sync::Arc;

use database::Database;
use taskflow_auth::IdentityVerifier;

use crate::services::{events::EventPublisher, jobs::JobScheduler};

/// Shared application state for the REST service.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub verifier: Arc<IdentityVerifier>,
    pub events: EventPublisher,
    pub jobs: JobScheduler,
    pub dev_mode: bool,
}
