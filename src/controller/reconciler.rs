//! Reconciliation entrypoint for CassandraDatacenter resources
//!
//! One invocation assembles the reconciliation context and hands it to
//! action computation. Every failure surfaces through `error_policy`, which
//! owns requeue timing; nothing in the assembly phase retries on its own.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::controller::context::{DatacenterRequest, create_reconciliation_context};
use crate::controller::error::{BackoffConfig, Error, Result};
use crate::controller::events::EventRecorder;
use crate::controller::logging::ReqLogger;
use crate::controller::store::KubeStore;
use crate::crd::CassandraDatacenter;

/// Shared state handed to every reconciliation
pub struct Context {
    /// Kubernetes client
    pub client: kube::Client,
    /// Event recorder carried into each reconciliation context
    pub recorder: Arc<dyn EventRecorder>,
    /// Cancelled on operator shutdown; checked before each I/O step
    pub shutdown: CancellationToken,
}

impl Context {
    pub fn new(
        client: kube::Client,
        recorder: Arc<dyn EventRecorder>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            recorder,
            shutdown,
        }
    }
}

/// Main reconciliation function
#[instrument(skip(dc, ctx), fields(name = %dc.name_any(), namespace = dc.namespace().unwrap_or_default()))]
pub async fn reconcile(dc: Arc<CassandraDatacenter>, ctx: Arc<Context>) -> Result<Action> {
    let request = DatacenterRequest {
        namespace: dc.namespace().unwrap_or_default(),
        name: dc.name_any(),
    };

    let store = Arc::new(KubeStore::new(ctx.client.clone()));
    let rc = create_reconciliation_context(
        &request,
        store,
        ctx.recorder.clone(),
        ReqLogger::new(),
        &ctx.shutdown,
    )
    .await?;

    rc.logger.info("reconciliation context assembled");
    rc.recorder
        .record(
            &rc.datacenter.object_ref(&()),
            EventType::Normal,
            "Reconciled",
            "Reconciliation context assembled",
        )
        .await;

    // Action computation (rack planning, restarts, scaling) consumes the
    // context from here
    Ok(Action::requeue(Duration::from_secs(300)))
}

/// Error policy for the controller with exponential backoff
pub fn error_policy(dc: Arc<CassandraDatacenter>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = dc.name_any();
    let backoff = BackoffConfig::default();
    let delay = backoff.delay_for_error(error, 0);

    if error.is_not_found() {
        // The resource was deleted between the watch event and our read
        debug!("Datacenter {} no longer exists: {}", name, error);
    } else if error.is_retryable() {
        warn!(
            "Retryable error for {}: {}, requeuing in {:?}",
            name, error, delay
        );
    } else {
        error!(
            "Non-retryable error for {}: {}, requeuing in {:?} for manual intervention",
            name, error, delay
        );
    }

    Action::requeue(delay)
}
