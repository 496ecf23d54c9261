//! Typed client for the per-node management API
//!
//! The client is rebuilt on every reconciliation and bound to one protocol
//! and one request-scoped logger. Construction wires transport only; no
//! network I/O happens until a request method is called.

use std::time::Duration;

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;

use crate::controller::error::{Error, Result};
use crate::controller::logging::ReqLogger;
use crate::controller::store::DatacenterStore;
use crate::crd::CassandraDatacenter;
use crate::management::protocol::Protocol;

/// Port the management sidecar listens on in every server pod
pub const MANAGEMENT_API_PORT: u16 = 8080;

/// Per-request timeout for management API calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Keys expected in the client certificate secret
const CA_CERT_KEY: &str = "ca.crt";
const TLS_CERT_KEY: &str = "tls.crt";
const TLS_KEY_KEY: &str = "tls.key";

/// Client for issuing requests to per-node management endpoints.
#[derive(Debug)]
pub struct NodeMgmtClient {
    http: reqwest::Client,
    protocol: Protocol,
    log: ReqLogger,
}

impl NodeMgmtClient {
    /// Protocol this client was constructed for
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Build the URL for a management endpoint on the given node
    pub fn node_url(&self, host: &str, path: &str) -> String {
        format!(
            "{}://{}:{}{}",
            self.protocol.scheme(),
            host,
            MANAGEMENT_API_PORT,
            path
        )
    }

    /// Ask the management sidecar to start the Cassandra process on a node
    pub async fn start_node(&self, host: &str) -> Result<()> {
        let url = self.node_url(host, "/api/v0/lifecycle/start");
        self.log.debug(&format!("calling {url}"));

        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| Error::ManagementApi(format!("POST {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::ManagementApi(format!(
                "POST {url}: unexpected status {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Fetch the feature set advertised by a node's management sidecar
    pub async fn node_features(&self, host: &str) -> Result<serde_json::Value> {
        let url = self.node_url(host, "/api/v0/metadata/versions/features");
        self.log.debug(&format!("calling {url}"));

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::ManagementApi(format!("GET {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::ManagementApi(format!(
                "GET {url}: unexpected status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::ManagementApi(format!("GET {url}: invalid body: {e}")))
    }
}

/// Construct a management API client bound to the resolved protocol.
///
/// For the encrypted protocol the referenced client-certificate secret is
/// fetched through the store and wired into a rustls-backed client
/// (CA bundle as the root of trust, client cert/key as the mTLS identity).
/// Missing or malformed material is `ClientConstruction`; a store transport
/// failure keeps its own classification so the caller can retry.
pub async fn build_management_api_client(
    dc: &CassandraDatacenter,
    protocol: Protocol,
    store: &dyn DatacenterStore,
    logger: &ReqLogger,
    cancel: &CancellationToken,
) -> Result<NodeMgmtClient> {
    let http = match protocol {
        Protocol::Plaintext => reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::ClientConstruction(format!("http client: {e}")))?,
        Protocol::Encrypted => {
            let manual = dc
                .spec
                .management_api_auth
                .manual
                .as_ref()
                .ok_or_else(|| {
                    Error::ClientConstruction(
                        "encrypted protocol resolved without manual auth config".to_string(),
                    )
                })?;

            let namespace = dc.namespace().unwrap_or_default();
            let secret = store
                .get_secret(&namespace, &manual.client_secret_name, cancel)
                .await
                .map_err(|e| match e {
                    Error::NotFound(what) => {
                        Error::ClientConstruction(format!("client certificate secret missing: {what}"))
                    }
                    other => other,
                })?;

            build_mtls_client(&secret, &manual.client_secret_name)?
        }
    };

    Ok(NodeMgmtClient {
        http,
        protocol,
        log: logger.clone(),
    })
}

fn build_mtls_client(secret: &Secret, secret_name: &str) -> Result<reqwest::Client> {
    let data = secret.data.as_ref().ok_or_else(|| {
        Error::ClientConstruction(format!("secret {secret_name} has no data"))
    })?;

    let pem_bytes = |key: &str| -> Result<&[u8]> {
        data.get(key)
            .map(|b| b.0.as_slice())
            .ok_or_else(|| Error::ClientConstruction(format!("secret {secret_name} missing {key}")))
    };

    let ca = reqwest::Certificate::from_pem(pem_bytes(CA_CERT_KEY)?)
        .map_err(|e| Error::ClientConstruction(format!("invalid {CA_CERT_KEY}: {e}")))?;

    // reqwest wants the client cert and key in one PEM bundle
    let mut identity_pem = pem_bytes(TLS_CERT_KEY)?.to_vec();
    identity_pem.push(b'\n');
    identity_pem.extend_from_slice(pem_bytes(TLS_KEY_KEY)?);
    let identity = reqwest::Identity::from_pem(&identity_pem)
        .map_err(|e| Error::ClientConstruction(format!("invalid client identity: {e}")))?;

    reqwest::Client::builder()
        .add_root_certificate(ca)
        .identity(identity)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| Error::ClientConstruction(format!("https client: {e}")))
}
