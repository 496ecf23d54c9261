//! Management API transport protocol resolution

use crate::controller::error::{Error, Result};
use crate::crd::CassandraDatacenter;

/// Transport security for management API requests, fixed at client
/// construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    /// Mutual TLS using operator-provided certificates
    Encrypted,
    /// Plain HTTP, explicitly opted into
    Plaintext,
}

impl Protocol {
    /// URL scheme for requests under this protocol
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Encrypted => "https",
            Protocol::Plaintext => "http",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Encrypted => write!(f, "encrypted"),
            Protocol::Plaintext => write!(f, "plaintext"),
        }
    }
}

/// Derive the management API protocol from the datacenter's declared auth
/// configuration.
///
/// Exactly one auth method must be declared. An ambiguous or missing
/// declaration is an `InvalidConfig` error rather than a plaintext default,
/// so a datacenter intended to run encrypted can never be silently
/// downgraded.
pub fn resolve_protocol(dc: &CassandraDatacenter) -> Result<Protocol> {
    let auth = &dc.spec.management_api_auth;
    match (&auth.insecure, &auth.manual) {
        (Some(_), None) => Ok(Protocol::Plaintext),
        (None, Some(manual)) => {
            if manual.client_secret_name.is_empty() || manual.server_secret_name.is_empty() {
                return Err(Error::InvalidConfig(
                    "manual management API auth requires clientSecretName and serverSecretName"
                        .to_string(),
                ));
            }
            Ok(Protocol::Encrypted)
        }
        (Some(_), Some(_)) => Err(Error::InvalidConfig(
            "managementApiAuth declares both insecure and manual; pick one".to_string(),
        )),
        (None, None) => Err(Error::InvalidConfig(
            "managementApiAuth declares no auth method; refusing to default to plaintext"
                .to_string(),
        )),
    }
}
