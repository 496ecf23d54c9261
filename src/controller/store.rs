//! Access to persisted CassandraDatacenter state
//!
//! The reconciliation phase talks to the API server through the
//! `DatacenterStore` trait: a strongly-consistent read, an optimistic
//! status merge-patch, and a secret fetch for referenced TLS material.
//! `KubeStore` is the production implementation; tests substitute an
//! in-memory fake that records every write.
//!
//! Cancellation is an explicit argument to every operation rather than a
//! field on any long-lived struct, and is checked before each suspension
//! point.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::controller::error::{Error, Result};
use crate::crd::{CassandraDatacenter, CassandraDatacenterStatus};

/// Operator field manager name for patches
pub const FIELD_MANAGER: &str = "cassandra-operator";

/// Store interface consumed by context assembly.
///
/// `patch_datacenter_status` uses the `baseline` record captured by the
/// same-invocation read for conflict detection: if the object changed since
/// the baseline, the patch is rejected with `Error::Conflict` rather than
/// applied. That rejection must always be surfaced, never swallowed.
#[async_trait]
pub trait DatacenterStore: Send + Sync {
    /// Fetch the datacenter record. Absence is `Error::NotFound`; the store
    /// never synthesizes a default record.
    async fn get_datacenter(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<CassandraDatacenter>;

    /// Apply the status fields of `updated` that differ from `baseline`,
    /// conditional on the object not having changed since `baseline` was
    /// read. Returns the record as persisted by the store.
    async fn patch_datacenter_status(
        &self,
        baseline: &CassandraDatacenter,
        updated: &CassandraDatacenter,
        cancel: &CancellationToken,
    ) -> Result<CassandraDatacenter>;

    /// Fetch a secret referenced by the datacenter's configuration
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Secret>;
}

/// Production store backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DatacenterStore for KubeStore {
    async fn get_datacenter(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<CassandraDatacenter> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let api: Api<CassandraDatacenter> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| classify_kube_error(e, &format!("CassandraDatacenter {namespace}/{name}")))
    }

    async fn patch_datacenter_status(
        &self,
        baseline: &CassandraDatacenter,
        updated: &CassandraDatacenter,
        cancel: &CancellationToken,
    ) -> Result<CassandraDatacenter> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let namespace = updated.namespace().unwrap_or_default();
        let name = updated.name_any();
        let api: Api<CassandraDatacenter> = Api::namespaced(self.client.clone(), &namespace);

        let diff = status_merge_diff(
            baseline.status.as_ref(),
            updated.status.as_ref(),
        )?;

        // Pinning the baseline resourceVersion turns the merge patch into a
        // conditional write: a concurrent modification makes the API server
        // reject it with 409.
        let body = serde_json::json!({
            "metadata": { "resourceVersion": baseline.resource_version() },
            "status": diff,
        });

        api.patch_status(
            &name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&body),
        )
        .await
        .map_err(|e| classify_kube_error(e, &format!("CassandraDatacenter {namespace}/{name}")))
    }

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Secret> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| classify_kube_error(e, &format!("Secret {namespace}/{name}")))
    }
}

/// Map a kube error into the controller taxonomy: 404 becomes `NotFound`,
/// 409 becomes `Conflict`, everything else stays a transport-level error.
fn classify_kube_error(err: kube::Error, what: &str) -> Error {
    match &err {
        kube::Error::Api(api_err) if api_err.code == 404 => Error::NotFound(what.to_string()),
        kube::Error::Api(api_err) if api_err.code == 409 => {
            Error::Conflict(format!("{what}: {}", api_err.message))
        }
        _ => Error::KubeError(err),
    }
}

/// Compute the JSON merge-patch body for the status fields that differ
/// between the baseline and updated records. Fields present on the baseline
/// but cleared on the update map to `null` per merge-patch semantics.
fn status_merge_diff(
    baseline: Option<&CassandraDatacenterStatus>,
    updated: Option<&CassandraDatacenterStatus>,
) -> Result<Value> {
    let base = serde_json::to_value(baseline.cloned().unwrap_or_default())?;
    let new = serde_json::to_value(updated.cloned().unwrap_or_default())?;

    let (Value::Object(base), Value::Object(new)) = (base, new) else {
        // Statuses serialize to objects; anything else is a bug in the CRD types
        return Err(Error::InvalidConfig(
            "datacenter status did not serialize to an object".to_string(),
        ));
    };

    let mut diff = serde_json::Map::new();
    for (key, value) in &new {
        if base.get(key) != Some(value) {
            diff.insert(key.clone(), value.clone());
        }
    }
    for key in base.keys() {
        if !new.contains_key(key) {
            diff.insert(key.clone(), Value::Null);
        }
    }

    Ok(Value::Object(diff))
}
