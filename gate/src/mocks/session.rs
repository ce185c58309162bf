//! Mock session registry for testing.

use crate::error::Result;
use crate::mocks::{Availability, lock};
use crate::providers::SessionRegistry;
use crate::state::{AddSessionOutcome, ReplaceOutcome, SessionHandle, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Sets {
    primary: HashMap<UserId, Vec<SessionHandle>>,
    fallback: HashMap<UserId, SessionHandle>,
}

/// In-memory bounded session sets.
///
/// One mutex guards every set, so each call is atomic the same way a Lua
/// script is on the server.
#[derive(Debug, Clone, Default)]
pub struct MockSessionRegistry {
    sets: Arc<Mutex<Sets>>,
    available: Availability,
    scripts_broken: Arc<AtomicBool>,
}

impl MockSessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage. Inserts degrade without keeping anything; every
    /// other call fails.
    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }

    /// Make inserts take the degraded single-handle path.
    pub fn set_degraded(&self, degraded: bool) {
        self.scripts_broken.store(degraded, Ordering::SeqCst);
    }

    /// Whether the user has a primary set at all.
    #[must_use]
    pub fn has_set(&self, user_id: &UserId) -> bool {
        lock(&self.sets).is_ok_and(|sets| sets.primary.contains_key(user_id))
    }

    /// Handle kept under the fallback key, if any.
    #[must_use]
    pub fn fallback(&self, user_id: &UserId) -> Option<SessionHandle> {
        lock(&self.sets).ok().and_then(|sets| sets.fallback.get(user_id).cloned())
    }
}

impl SessionRegistry for MockSessionRegistry {
    async fn add_session(
        &self,
        user_id: &UserId,
        handle: &SessionHandle,
        max_sessions: usize,
    ) -> Result<AddSessionOutcome> {
        if let Err(e) = self.available.check("session registry") {
            tracing::error!(user_id = %user_id, error = %e, "Fallback session write failed, session untracked");
            return Ok(AddSessionOutcome::Degraded);
        }
        let mut sets = lock(&self.sets)?;

        if self.scripts_broken.load(Ordering::SeqCst) {
            tracing::warn!(user_id = %user_id, "Session script failed, keeping newest session only");
            sets.fallback.insert(user_id.clone(), handle.clone());
            return Ok(AddSessionOutcome::Degraded);
        }

        let fallback = sets.fallback.remove(user_id);
        let kept = sets.primary.entry(user_id.clone()).or_default();
        kept.retain(|h| h != handle);
        if let Some(latest) = fallback.filter(|f| f != handle && !kept.contains(f)) {
            kept.push(latest);
        }

        let mut evicted = None;
        while kept.len() >= max_sessions.max(1) {
            let removed = kept.remove(0);
            evicted.get_or_insert(removed);
        }
        kept.push(handle.clone());

        Ok(AddSessionOutcome::Stored { evicted })
    }

    async fn replace_session(
        &self,
        user_id: &UserId,
        old: &SessionHandle,
        new: &SessionHandle,
    ) -> Result<ReplaceOutcome> {
        self.available.check("session registry")?;
        let mut sets = lock(&self.sets)?;
        let Some(kept) = sets.primary.get_mut(user_id) else {
            return Ok(ReplaceOutcome::NotFound);
        };
        let Some(position) = kept.iter().position(|h| h == old) else {
            return Ok(ReplaceOutcome::NotFound);
        };

        kept[position] = new.clone();
        let mut seen = false;
        kept.retain(|h| {
            if h != new {
                return true;
            }
            let first = !seen;
            seen = true;
            first
        });
        Ok(ReplaceOutcome::Replaced)
    }

    async fn remove_session(&self, user_id: &UserId, handle: &SessionHandle) -> Result<bool> {
        self.available.check("session registry")?;
        let mut sets = lock(&self.sets)?;

        let mut removed = false;
        if sets.fallback.get(user_id) == Some(handle) {
            sets.fallback.remove(user_id);
            removed = true;
        }

        if let Some(kept) = sets.primary.get_mut(user_id) {
            let before = kept.len();
            kept.retain(|h| h != handle);
            removed |= kept.len() != before;
            if kept.is_empty() {
                sets.primary.remove(user_id);
            }
        }
        Ok(removed)
    }

    async fn list_sessions(&self, user_id: &UserId) -> Result<Vec<SessionHandle>> {
        self.available.check("session registry")?;
        let sets = lock(&self.sets)?;
        let mut handles = sets.primary.get(user_id).cloned().unwrap_or_default();
        if let Some(latest) = sets.fallback.get(user_id).filter(|f| !handles.contains(f)) {
            handles.push(latest.clone());
        }
        Ok(handles)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn handle(n: u32) -> SessionHandle {
        SessionHandle::from_refresh_token(&format!("refresh-{n}"))
    }

    #[tokio::test]
    async fn test_readding_same_handle_does_not_evict() {
        let registry = MockSessionRegistry::new();
        let user = UserId::new("u1");

        for n in 1..=3 {
            registry.add_session(&user, &handle(n), 3).await.unwrap();
        }
        let outcome = registry.add_session(&user, &handle(3), 3).await.unwrap();

        assert_eq!(outcome, AddSessionOutcome::Stored { evicted: None });
        assert_eq!(registry.list_sessions(&user).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_degraded_handle_folds_back() {
        let registry = MockSessionRegistry::new();
        let user = UserId::new("u1");

        registry.add_session(&user, &handle(1), 3).await.unwrap();
        registry.set_degraded(true);
        assert_eq!(
            registry.add_session(&user, &handle(2), 3).await.unwrap(),
            AddSessionOutcome::Degraded
        );
        registry.set_degraded(false);
        registry.add_session(&user, &handle(3), 3).await.unwrap();

        assert_eq!(registry.fallback(&user), None);
        assert_eq!(
            registry.list_sessions(&user).await.unwrap(),
            vec![handle(1), handle(2), handle(3)]
        );
    }
}
