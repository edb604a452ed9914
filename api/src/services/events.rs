//! Best-effort event publishing to the pub/sub sidecar.
//!
//! Events go out after the local transaction commits. A publish failure is
//! logged and swallowed: downstream consumers reconcile via the REST API, and
//! the user-facing request never fails because the bus is down.

use std::time::Duration;

use taskflow_core::events::EventEnvelope;
use tracing::{info, warn};

#[derive(Clone)]
pub struct EventPublisher {
    http: reqwest::Client,
    endpoint: String,
    pubsub_name: String,
}

impl EventPublisher {
    pub fn new(endpoint: impl Into<String>, pubsub_name: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap_or_default();
        Self {
            http,
            endpoint: endpoint.into(),
            pubsub_name: pubsub_name.into(),
        }
    }

    /// Publish one event to a topic. Returns whether the sidecar accepted it.
    pub async fn publish(&self, topic: &str, event: EventEnvelope) -> bool {
        let url = format!(
            "{}/v1.0/publish/{}/{}",
            self.endpoint, self.pubsub_name, topic
        );
        let event_type = event.event_type.clone();
        let task_id = event.data.get("task_id").cloned();

        match self.http.post(&url).json(&event).send().await {
            Ok(response) if response.status().is_success() => {
                info!(event_type = %event_type, topic, task_id = ?task_id, "Published event");
                true
            }
            Ok(response) => {
                warn!(
                    event_type = %event_type,
                    topic,
                    status = %response.status(),
                    "Event publish rejected"
                );
                false
            }
            Err(e) => {
                warn!(event_type = %event_type, topic, error = %e, "Event publish failed");
                false
            }
        }
    }
}
