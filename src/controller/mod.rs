pub mod context;
pub mod error;
pub mod events;
pub mod logging;
pub mod reconciler;
pub mod store;
pub mod timestamps;

pub use context::{DatacenterRequest, ReconciliationContext, create_reconciliation_context};
pub use error::{BackoffConfig, Error, Result};
pub use events::{EventRecorder, KubeEventRecorder, NoopEventRecorder};
pub use logging::ReqLogger;
pub use reconciler::{Context, error_policy, reconcile};
pub use store::{DatacenterStore, FIELD_MANAGER, KubeStore};
pub use timestamps::{bootstrap_rolling_restart, normalize_status_timestamps, sentinel_time};
