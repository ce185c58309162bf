//! Recording notifier, event publisher and audit sink for testing.

use crate::audit::{AuditEntry, AuditEvent};
use crate::error::Result;
use crate::events::GateEvent;
use crate::mocks::{Availability, lock};
use crate::providers::{AuditSink, CodeNotifier, EventPublisher};
use crate::state::UserId;
use std::sync::{Arc, Mutex};

/// A delivered one-time code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCode {
    /// Recipient.
    pub user_id: UserId,
    /// Recipient email, when known.
    pub email: Option<String>,
    /// The code.
    pub code: String,
}

/// Records codes instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct MockCodeNotifier {
    sent: Arc<Mutex<Vec<SentCode>>>,
    available: Availability,
}

impl MockCodeNotifier {
    /// Create an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a delivery outage.
    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }

    /// Everything sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SentCode> {
        lock(&self.sent).map(|s| s.clone()).unwrap_or_default()
    }

    /// Most recent code sent to `user_id`.
    #[must_use]
    pub fn last_code_for(&self, user_id: &UserId) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|s| &s.user_id == user_id)
            .map(|s| s.code)
    }
}

impl CodeNotifier for MockCodeNotifier {
    async fn send_code(&self, user_id: &UserId, email: Option<&str>, code: &str) -> Result<()> {
        self.available.check("code delivery")?;
        lock(&self.sent)?.push(SentCode {
            user_id: user_id.clone(),
            email: email.map(str::to_string),
            code: code.to_string(),
        });
        Ok(())
    }
}

/// Records published events.
#[derive(Debug, Clone, Default)]
pub struct MockEventPublisher {
    events: Arc<Mutex<Vec<GateEvent>>>,
    available: Availability,
}

impl MockEventPublisher {
    /// Create an empty publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a bus outage.
    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }

    /// Everything published so far.
    #[must_use]
    pub fn events(&self) -> Vec<GateEvent> {
        lock(&self.events).map(|e| e.clone()).unwrap_or_default()
    }

    /// Topics of everything published so far.
    #[must_use]
    pub fn topics(&self) -> Vec<&'static str> {
        self.events().iter().map(GateEvent::topic).collect()
    }
}

impl EventPublisher for MockEventPublisher {
    async fn publish(&self, event: GateEvent) -> Result<()> {
        self.available.check("event bus")?;
        lock(&self.events)?.push(event);
        Ok(())
    }
}

/// Records audit entries.
#[derive(Debug, Clone, Default)]
pub struct MockAuditSink {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MockAuditSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        lock(&self.entries).map(|e| e.clone()).unwrap_or_default()
    }

    /// Kinds of everything recorded so far, in order.
    #[must_use]
    pub fn kinds(&self) -> Vec<AuditEvent> {
        self.entries().iter().map(|e| e.kind).collect()
    }
}

impl AuditSink for MockAuditSink {
    async fn record(&self, entry: AuditEntry) {
        if let Ok(mut entries) = lock(&self.entries) {
            entries.push(entry);
        }
    }
}
