//! Reconciliation context assembly
//!
//! One `ReconciliationContext` is built per reconciliation request and holds
//! everything action computation needs: the request identity, the loaded
//! datacenter record (timestamps repaired, rolling-restart marker seeded),
//! a protocol-negotiated management client, the store handle, the event
//! recorder, and the request-scoped logger. Construction is all-or-nothing:
//! any failure aborts the phase and a partial context is never observable.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::controller::error::Result;
use crate::controller::events::EventRecorder;
use crate::controller::logging::ReqLogger;
use crate::controller::store::DatacenterStore;
use crate::controller::timestamps::{bootstrap_rolling_restart, normalize_status_timestamps};
use crate::crd::CassandraDatacenter;
use crate::management::{NodeMgmtClient, build_management_api_client, resolve_protocol};

/// Identity of one reconciliation request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatacenterRequest {
    pub namespace: String,
    pub name: String,
}

/// Everything needed to compute reconciliation actions for one datacenter.
///
/// Created at the start of one reconciliation invocation and discarded at
/// its end; never persisted or shared across requests.
pub struct ReconciliationContext {
    pub request: DatacenterRequest,
    pub store: Arc<dyn DatacenterStore>,
    pub datacenter: CassandraDatacenter,
    pub node_mgmt_client: NodeMgmtClient,
    pub recorder: Arc<dyn EventRecorder>,
    pub logger: ReqLogger,
}

impl std::fmt::Debug for ReconciliationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationContext")
            .field("request", &self.request)
            .field("datacenter", &self.datacenter)
            .field("node_mgmt_client", &self.node_mgmt_client)
            .field("logger", &self.logger)
            .finish_non_exhaustive()
    }
}

/// Gather all state needed for computing reconciliation actions.
///
/// Order matters: the namespace logging attribute is attached before any
/// I/O so every subsequent line is attributable; the rolling-restart
/// bootstrap uses the same-invocation read as its patch baseline; protocol
/// resolution and client construction only run against a record whose
/// bootstrap write is confirmed. No retries happen here; every failure is
/// propagated to the caller, which owns requeue policy.
pub async fn create_reconciliation_context(
    request: &DatacenterRequest,
    store: Arc<dyn DatacenterStore>,
    recorder: Arc<dyn EventRecorder>,
    base_logger: ReqLogger,
    cancel: &CancellationToken,
) -> Result<ReconciliationContext> {
    let logger = base_logger.with_values("namespace", request.namespace.clone());
    logger.info("creating reconciliation context");

    let mut datacenter = match store
        .get_datacenter(&request.namespace, &request.name, cancel)
        .await
    {
        Ok(dc) => dc,
        Err(e) => {
            logger.error(&e, "error retrieving datacenter");
            return Err(e);
        }
    };

    // In-memory repair only; nothing is persisted by the normalizer
    normalize_status_timestamps(&mut datacenter);

    bootstrap_rolling_restart(store.as_ref(), &mut datacenter, &logger, cancel).await?;

    let logger = logger
        .with_values("datacenter", request.name.clone())
        .with_values("cluster", datacenter.spec.cluster_name.clone());

    let protocol = match resolve_protocol(&datacenter) {
        Ok(protocol) => protocol,
        Err(e) => {
            logger.error(&e, "error resolving management API protocol");
            return Err(e);
        }
    };

    let node_mgmt_client =
        match build_management_api_client(&datacenter, protocol, store.as_ref(), &logger, cancel)
            .await
        {
            Ok(client) => client,
            Err(e) => {
                logger.error(&e, "error building management API client");
                return Err(e);
            }
        };

    Ok(ReconciliationContext {
        request: request.clone(),
        store,
        datacenter,
        node_mgmt_client,
        recorder,
        logger,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{DateTime, Utc};
    use k8s_openapi::ByteString;
    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::core::ObjectMeta;

    use super::*;
    use crate::controller::error::Error;
    use crate::controller::events::NoopEventRecorder;
    use crate::controller::store::fake::{FakeFailure, FakeStore};
    use crate::controller::timestamps::sentinel_time;
    use crate::crd::{
        CassandraDatacenterSpec, CassandraDatacenterStatus, ManagementApiAuthConfig,
        ManagementApiAuthInsecureConfig, ManagementApiAuthManualConfig,
    };
    use crate::management::Protocol;

    fn request() -> DatacenterRequest {
        DatacenterRequest {
            namespace: "cass-ns".to_string(),
            name: "dc1".to_string(),
        }
    }

    fn test_datacenter(
        auth: ManagementApiAuthConfig,
        status: Option<CassandraDatacenterStatus>,
    ) -> CassandraDatacenter {
        CassandraDatacenter {
            metadata: ObjectMeta {
                name: Some("dc1".to_string()),
                namespace: Some("cass-ns".to_string()),
                resource_version: Some("1".to_string()),
                ..Default::default()
            },
            spec: CassandraDatacenterSpec {
                cluster_name: "cluster1".to_string(),
                server_version: "4.1".to_string(),
                size: 3,
                management_api_auth: auth,
            },
            status,
        }
    }

    fn insecure_auth() -> ManagementApiAuthConfig {
        ManagementApiAuthConfig {
            insecure: Some(ManagementApiAuthInsecureConfig {}),
            manual: None,
        }
    }

    fn manual_auth() -> ManagementApiAuthConfig {
        ManagementApiAuthConfig {
            insecure: None,
            manual: Some(ManagementApiAuthManualConfig {
                client_secret_name: "mgmt-client-certs".to_string(),
                server_secret_name: "mgmt-server-certs".to_string(),
                skip_secret_validation: false,
            }),
        }
    }

    fn conflicting_auth() -> ManagementApiAuthConfig {
        ManagementApiAuthConfig {
            insecure: Some(ManagementApiAuthInsecureConfig {}),
            manual: manual_auth().manual,
        }
    }

    fn client_cert_secret() -> Secret {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(vec!["dc1.cass-ns.svc".to_string()])
            .unwrap()
            .self_signed(&key_pair)
            .unwrap();

        let mut data = BTreeMap::new();
        data.insert("ca.crt".to_string(), ByteString(cert.pem().into_bytes()));
        data.insert("tls.crt".to_string(), ByteString(cert.pem().into_bytes()));
        data.insert(
            "tls.key".to_string(),
            ByteString(key_pair.serialize_pem().into_bytes()),
        );

        Secret {
            metadata: ObjectMeta {
                name: Some("mgmt-client-certs".to_string()),
                namespace: Some("cass-ns".to_string()),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        }
    }

    async fn assemble(
        store: Arc<FakeStore>,
        cancel: &CancellationToken,
    ) -> Result<ReconciliationContext> {
        create_reconciliation_context(
            &request(),
            store,
            Arc::new(NoopEventRecorder),
            ReqLogger::new(),
            cancel,
        )
        .await
    }

    #[tokio::test]
    async fn test_full_assembly_with_encryption_and_zero_timestamps() {
        let zero = Time(DateTime::<Utc>::UNIX_EPOCH);
        let dc = test_datacenter(
            manual_auth(),
            Some(CassandraDatacenterStatus {
                super_user_upserted: Some(zero.clone()),
                last_server_node_started: Some(zero.clone()),
                last_rolling_restart: Some(zero),
            }),
        );
        let store = Arc::new(FakeStore::with_datacenter(dc));
        store.insert_secret("mgmt-client-certs", client_cert_secret());

        let start = Utc::now();
        let rc = assemble(store.clone(), &CancellationToken::new())
            .await
            .unwrap();

        // Normalizer repaired both ambiguous timestamps in memory
        let status = rc.datacenter.status.as_ref().unwrap();
        assert_eq!(status.super_user_upserted, Some(sentinel_time()));
        assert_eq!(status.last_server_node_started, Some(sentinel_time()));

        // Bootstrapper issued exactly one patch with a fresh instant
        assert_eq!(store.patch_count(), 1);
        assert!(status.last_rolling_restart.as_ref().unwrap().0 >= start);

        // Encrypted protocol resolved and wired into the client
        assert_eq!(rc.node_mgmt_client.protocol(), Protocol::Encrypted);

        // Logger carries all three request attributes
        let keys: Vec<&str> = rc.logger.fields().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["namespace", "datacenter", "cluster"]);
        assert_eq!(rc.logger.fields()[2].1, "cluster1");
    }

    #[tokio::test]
    async fn test_no_patch_when_rolling_restart_already_set() {
        let dc = test_datacenter(
            insecure_auth(),
            Some(CassandraDatacenterStatus {
                last_rolling_restart: Some(Time(Utc::now())),
                ..Default::default()
            }),
        );
        let store = Arc::new(FakeStore::with_datacenter(dc));

        let rc = assemble(store.clone(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(store.patch_count(), 0);
        assert_eq!(rc.node_mgmt_client.protocol(), Protocol::Plaintext);
    }

    #[tokio::test]
    async fn test_read_failure_has_no_side_effects() {
        let store = Arc::new(FakeStore::failing_get(FakeFailure::Transport));

        let err = assemble(store.clone(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::KubeError(_)));
        assert_eq!(store.patch_count(), 0);
        assert_eq!(store.secret_get_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_record_propagates_not_found() {
        let store = Arc::new(FakeStore::failing_get(FakeFailure::NotFound));

        let err = assemble(store.clone(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(store.patch_count(), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_conflict_stops_before_protocol_resolution() {
        let dc = test_datacenter(manual_auth(), None);
        let store =
            Arc::new(FakeStore::with_datacenter(dc).fail_patch(FakeFailure::Conflict));
        store.insert_secret("mgmt-client-certs", client_cert_secret());

        let err = assemble(store.clone(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Conflict(_)));
        // Client construction never ran, so the secret was never read
        assert_eq!(store.secret_get_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_encryption_config_fails_before_client_construction() {
        let dc = test_datacenter(
            conflicting_auth(),
            Some(CassandraDatacenterStatus {
                last_rolling_restart: Some(Time(Utc::now())),
                ..Default::default()
            }),
        );
        let store = Arc::new(FakeStore::with_datacenter(dc));

        let err = assemble(store.clone(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidConfig(_)));
        assert_eq!(store.patch_count(), 0);
        assert_eq!(store.secret_get_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_token_aborts_before_any_io() {
        let dc = test_datacenter(insecure_auth(), None);
        let store = Arc::new(FakeStore::with_datacenter(dc));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = assemble(store.clone(), &cancel).await.unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(store.patch_count(), 0);
    }
}
