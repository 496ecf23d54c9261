//! Status timestamp repair and one-time rolling-restart bootstrap
//!
//! The API server cannot reliably distinguish a never-set timestamp from a
//! zero-valued one once a record has round-tripped through serialization,
//! which breaks the equality and staleness comparisons downstream phases
//! perform. Two repairs happen during context assembly:
//!
//! - `normalize_status_timestamps` rewrites unset/zero `superUserUpserted`
//!   and `lastServerNodeStarted` values to a fixed sentinel (epoch + 1s),
//!   in memory only;
//! - `bootstrap_rolling_restart` seeds `lastRollingRestart` with the
//!   current instant via a single optimistic status patch the first time a
//!   datacenter is observed, so restart-interval decisions always have a
//!   concrete reference point.

use chrono::{DateTime, TimeDelta, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use tokio_util::sync::CancellationToken;

use crate::controller::error::Result;
use crate::controller::logging::ReqLogger;
use crate::controller::store::DatacenterStore;
use crate::crd::CassandraDatacenter;

/// Sentinel standing in for "never set": one second past the epoch.
///
/// The exact value is load-bearing: records persisted by earlier deployments
/// already carry it, and downstream comparisons treat it as "unset".
pub fn sentinel_time() -> Time {
    Time(DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(1))
}

/// A timestamp is unset when the field is absent or holds the epoch zero
/// value some clients persist in place of null.
fn is_unset(value: &Option<Time>) -> bool {
    match value {
        None => true,
        Some(t) => t.0 == DateTime::<Utc>::UNIX_EPOCH,
    }
}

/// Rewrite unset/zero status timestamps to the sentinel, in memory only.
///
/// Pure and idempotent; callers decide whether the corrected values are
/// ever persisted (the bootstrap patch below deliberately does not).
pub fn normalize_status_timestamps(dc: &mut CassandraDatacenter) {
    let status = dc.status.get_or_insert_with(Default::default);
    if is_unset(&status.super_user_upserted) {
        status.super_user_upserted = Some(sentinel_time());
    }
    if is_unset(&status.last_server_node_started) {
        status.last_server_node_started = Some(sentinel_time());
    }
}

/// Seed `lastRollingRestart` with the current instant on first observation.
///
/// The patch uses the record read earlier in the same invocation as its
/// conflict baseline, so a concurrent reconciliation of the same datacenter
/// cannot cause a lost update: the stale writer's patch is rejected and the
/// rejection fails the whole phase. If the field is already set this is a
/// no-op with zero writes.
pub async fn bootstrap_rolling_restart(
    store: &dyn DatacenterStore,
    dc: &mut CassandraDatacenter,
    logger: &ReqLogger,
    cancel: &CancellationToken,
) -> Result<()> {
    let already_set = dc
        .status
        .as_ref()
        .is_some_and(|s| !is_unset(&s.last_rolling_restart));
    if already_set {
        return Ok(());
    }

    let baseline = dc.clone();
    let status = dc.status.get_or_insert_with(Default::default);
    status.last_rolling_restart = Some(Time(Utc::now()));

    match store.patch_datacenter_status(&baseline, dc, cancel).await {
        Ok(persisted) => {
            // Keep the freshly persisted revision so later writes in this
            // invocation patch against current state
            dc.metadata.resource_version = persisted.metadata.resource_version;
            logger.info("seeded lastRollingRestart status");
            Ok(())
        }
        Err(e) => {
            logger.error(&e, "error patching datacenter status for rolling restart");
            Err(e)
        }
    }
}
