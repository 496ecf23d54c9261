pub mod controller;
pub mod crd;
pub mod management;

pub use controller::{
    Context, DatacenterRequest, DatacenterStore, Error, EventRecorder, KubeEventRecorder,
    KubeStore, ReconciliationContext, ReqLogger, Result, create_reconciliation_context,
    error_policy, reconcile,
};
pub use crd::CassandraDatacenter;
pub use management::{NodeMgmtClient, Protocol};

use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::Controller;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client};
use tokio_util::sync::CancellationToken;

/// Controller name used for event reporting
pub const CONTROLLER_NAME: &str = "cassandra-operator";

/// Run the operator controller (cluster-wide).
///
/// This is the main controller loop that watches CassandraDatacenter
/// resources and reconciles them. The shutdown token aborts in-flight
/// reconciliations at their next I/O step and drains the controller.
pub async fn run_controller(client: Client, shutdown: CancellationToken) {
    run_controller_scoped(client, shutdown, None).await
}

/// Run the operator controller with optional namespace scoping.
///
/// When `namespace` is `Some(ns)`, only watches resources in that namespace;
/// `None` watches cluster-wide. The scoped version exists so tests can run
/// against an isolated namespace.
pub async fn run_controller_scoped(
    client: Client,
    shutdown: CancellationToken,
    namespace: Option<&str>,
) {
    let scope_msg = namespace.unwrap_or("cluster-wide");
    tracing::info!(
        "Starting controller for CassandraDatacenter resources (scope: {})",
        scope_msg
    );

    let recorder = Arc::new(KubeEventRecorder::new(client.clone(), CONTROLLER_NAME));
    let ctx = Arc::new(Context::new(client.clone(), recorder, shutdown.clone()));

    let datacenters: Api<CassandraDatacenter> = match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };

    // any_semantic() keeps resource discovery reliable in test environments
    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(datacenters, watcher_config)
        .graceful_shutdown_on(shutdown.cancelled_owned())
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled: {}", obj.name);
                }
                Err(e) => {
                    // NotFound errors are expected after deletion when related
                    // watch events trigger reconciliation for a deleted object
                    let is_not_found = matches!(
                        &e,
                        kube::runtime::controller::Error::ReconcilerFailed(err, _) if err.is_not_found()
                    );
                    if is_not_found {
                        tracing::debug!("Object no longer exists (likely deleted): {:?}", e);
                    } else {
                        tracing::error!("Reconciliation error: {:?}", e);
                    }
                }
            }
        })
        .await;

    tracing::info!("Controller stream ended");
}
