//! Kubernetes Event recording
//!
//! The assembled context carries an event-recorder handle for downstream
//! reconciliation actions. Recording is fire-and-forget: a failed event is
//! logged as a warning and never fails reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use tracing::warn;

/// Trait for recording Kubernetes Events against a resource.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    /// Record an event on the given object. Never returns an error.
    async fn record(
        &self,
        object: &ObjectReference,
        event_type: EventType,
        reason: &str,
        message: &str,
    );
}

/// Production recorder wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl KubeEventRecorder {
    /// The controller name appears as the reporting component on Events.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn record(
        &self,
        object: &ObjectReference,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) {
        let event = Event {
            type_: event_type,
            reason: reason.to_string(),
            note: Some(message.to_string()),
            action: "Reconcile".to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, object).await {
            warn!(error = %e, reason, "failed to record Kubernetes event");
        }
    }
}

/// Recorder that drops all events; used in tests.
pub struct NoopEventRecorder;

#[async_trait]
impl EventRecorder for NoopEventRecorder {
    async fn record(
        &self,
        _object: &ObjectReference,
        _event_type: EventType,
        _reason: &str,
        _message: &str,
    ) {
    }
}
