use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// CassandraDatacenter is the Schema for the cassandradatacenters API
///
/// One resource describes one datacenter of a (possibly multi-datacenter)
/// Cassandra cluster. Rack topology and per-rack StatefulSets are derived
/// from it by the reconciliation-action planner.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "cassandra-operator.example.com",
    version = "v1beta1",
    kind = "CassandraDatacenter",
    plural = "cassandradatacenters",
    shortname = "cassdc",
    namespaced,
    status = "CassandraDatacenterStatus",
    printcolumn = r#"{"name":"Cluster", "type":"string", "jsonPath":".spec.clusterName"}"#,
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".spec.serverVersion"}"#,
    printcolumn = r#"{"name":"Size", "type":"integer", "jsonPath":".spec.size"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CassandraDatacenterSpec {
    /// Name of the Cassandra cluster this datacenter belongs to.
    /// Multiple CassandraDatacenter resources may share a cluster name.
    pub cluster_name: String,

    /// Cassandra server version (e.g., "4.1", "5.0")
    pub server_version: String,

    /// Total number of server nodes across all racks in this datacenter
    #[serde(default = "default_size")]
    pub size: i32,

    /// How the operator authenticates to the per-node management API.
    /// Exactly one method must be declared; the operator refuses to guess.
    #[serde(default)]
    pub management_api_auth: ManagementApiAuthConfig,
}

fn default_size() -> i32 {
    1
}

/// Transport security for the per-node management API.
///
/// Exactly one of `insecure` or `manual` must be set. Declaring both (or
/// neither) is rejected during context assembly rather than silently
/// downgraded to plaintext.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagementApiAuthConfig {
    /// Plaintext HTTP to the management API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure: Option<ManagementApiAuthInsecureConfig>,

    /// Mutual TLS using operator-provided secrets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual: Option<ManagementApiAuthManualConfig>,
}

/// Marker for plaintext management API access
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct ManagementApiAuthInsecureConfig {}

/// Mutual-TLS configuration for the management API
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagementApiAuthManualConfig {
    /// Secret holding the operator's client certificate (`tls.crt`,
    /// `tls.key`) and the CA bundle (`ca.crt`)
    pub client_secret_name: String,

    /// Secret holding the server certificate mounted into Cassandra pods
    pub server_secret_name: String,

    /// Skip validation of the referenced secrets' contents
    #[serde(default)]
    pub skip_secret_validation: bool,
}

/// Last-observed status of the CassandraDatacenter
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CassandraDatacenterStatus {
    /// When the superuser credential was last upserted into the cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_user_upserted: Option<Time>,

    /// When a server node was last started by the operator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_server_node_started: Option<Time>,

    /// When the datacenter last underwent a coordinated rolling restart.
    /// Seeded exactly once by the first reconciliation to observe the
    /// resource; restart-interval decisions key off this value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rolling_restart: Option<Time>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_defaults() {
        let spec: CassandraDatacenterSpec = serde_json::from_value(serde_json::json!({
            "clusterName": "cluster1",
            "serverVersion": "4.1",
        }))
        .unwrap();

        assert_eq!(spec.size, 1);
        assert!(spec.management_api_auth.insecure.is_none());
        assert!(spec.management_api_auth.manual.is_none());
    }

    #[test]
    fn test_status_round_trips_camel_case() {
        let json = serde_json::json!({
            "lastRollingRestart": "2024-03-01T12:00:00Z",
        });
        let status: CassandraDatacenterStatus = serde_json::from_value(json).unwrap();
        assert!(status.last_rolling_restart.is_some());
        assert!(status.super_user_upserted.is_none());

        let out = serde_json::to_value(&status).unwrap();
        assert!(out.get("lastRollingRestart").is_some());
        // Unset fields stay absent so merge patches never clobber them
        assert!(out.get("superUserUpserted").is_none());
    }

    #[test]
    fn test_manual_auth_parses() {
        let auth: ManagementApiAuthConfig = serde_json::from_value(serde_json::json!({
            "manual": {
                "clientSecretName": "mgmt-client-certs",
                "serverSecretName": "mgmt-server-certs",
            }
        }))
        .unwrap();

        let manual = auth.manual.unwrap();
        assert_eq!(manual.client_secret_name, "mgmt-client-certs");
        assert!(!manual.skip_secret_validation);
    }
}
