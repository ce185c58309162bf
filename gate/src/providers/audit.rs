//! Audit sink.

use crate::audit::AuditEntry;
use crate::constants::AUDIT_TARGET;

/// Receives security audit entries.
///
/// Recording never fails from the caller's point of view; sinks swallow and
/// log their own errors.
pub trait AuditSink: Send + Sync {
    /// Record one entry.
    fn record(&self, entry: AuditEntry) -> impl std::future::Future<Output = ()> + Send;
}

/// Writes audit entries as JSON on the `security_audit` tracing target.
#[derive(Clone, Debug, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    /// Create a new sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: AuditEntry) {
        match serde_json::to_string(&entry) {
            Ok(json) => tracing::info!(
                target: AUDIT_TARGET,
                kind = entry.kind.as_str(),
                user_id = entry.user_id.as_ref().map(|u| u.as_str()),
                ip = entry.ip.as_deref(),
                entry = %json,
                "SECURITY_AUDIT"
            ),
            Err(e) => tracing::error!(
                target: AUDIT_TARGET,
                kind = entry.kind.as_str(),
                error = %e,
                "Audit entry could not be encoded"
            ),
        }
    }
}
