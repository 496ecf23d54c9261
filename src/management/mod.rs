//! Per-node management API access
//!
//! Every Cassandra pod runs a management sidecar exposing an administrative
//! HTTP interface. This module resolves the transport protocol from the
//! datacenter's declared configuration and builds the typed client used by
//! reconciliation actions.

pub mod client;
pub mod protocol;

pub use client::{NodeMgmtClient, build_management_api_client};
pub use protocol::{Protocol, resolve_protocol};
