//! Request-scoped logging for reconciliation
//!
//! Reconciliations for different datacenters run concurrently, so the
//! request logger is an immutable value: `with_values` returns a new logger
//! carrying the extra attribute instead of mutating shared state. Attributes
//! accumulate over the lifetime of one request (namespace before any I/O,
//! datacenter and cluster once the record is loaded) and every line emitted
//! through the logger carries all of them.

use std::fmt::Display;
use std::fmt::Write as _;
use std::sync::Arc;

/// Immutable attribute-carrying logger for one reconciliation request.
///
/// Cloning is cheap; the attribute list is shared until extended.
#[derive(Clone, Default)]
pub struct ReqLogger {
    fields: Arc<Vec<(&'static str, String)>>,
}

impl ReqLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new logger with `key=value` appended to the attribute chain.
    pub fn with_values(&self, key: &'static str, value: impl Into<String>) -> Self {
        let mut fields = (*self.fields).clone();
        fields.push((key, value.into()));
        Self {
            fields: Arc::new(fields),
        }
    }

    /// The attached attributes, in attachment order.
    pub fn fields(&self) -> &[(&'static str, String)] {
        &self.fields
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{}={}", k, v);
        }
        out
    }

    pub fn info(&self, msg: &str) {
        tracing::info!(context = %self.render(), "{}", msg);
    }

    pub fn debug(&self, msg: &str) {
        tracing::debug!(context = %self.render(), "{}", msg);
    }

    pub fn error(&self, err: &dyn Display, msg: &str) {
        tracing::error!(context = %self.render(), error = %err, "{}", msg);
    }
}

impl std::fmt::Debug for ReqLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqLogger")
            .field("fields", &self.fields)
            .finish()
    }
}
