//! In-memory Greeting accessor for unit tests.
//!
//! Behaves like the API server where it matters to the reconciler: status
//! writes are conditional on the resource version, every write bumps the
//! version, and writes never touch the spec. Failures and concurrent edits can
//! be injected per call.

use super::GreetingAccessor;
use crate::error::AccessError;
use crate::key::ObjectKey;
use crds::{Greeting, GreetingStatus};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Edit applied by "another writer" right after a get returns.
#[derive(Debug, Clone)]
enum ConcurrentEdit {
    SetMessage(String),
    Delete,
}

#[derive(Debug, Default)]
struct MockState {
    objects: HashMap<ObjectKey, Greeting>,
    next_version: u64,
    get_calls: usize,
    status_writes: Vec<(ObjectKey, GreetingStatus)>,
    update_attempts: usize,
    get_failures: VecDeque<AccessError>,
    update_failures: VecDeque<AccessError>,
    edits_after_get: HashMap<ObjectKey, ConcurrentEdit>,
}

impl MockState {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn apply_edit(&mut self, key: &ObjectKey, edit: ConcurrentEdit) {
        match edit {
            ConcurrentEdit::SetMessage(message) => {
                let version = self.bump_version();
                if let Some(obj) = self.objects.get_mut(key) {
                    obj.spec.message = message;
                    obj.metadata.resource_version = Some(version);
                }
            }
            ConcurrentEdit::Delete => {
                self.objects.remove(key);
            }
        }
    }
}

/// Mock Greeting accessor for testing
#[derive(Debug, Clone, Default)]
pub struct MockGreetingAccessor {
    state: Arc<Mutex<MockState>>,
    latency: Option<Duration>,
}

impl MockGreetingAccessor {
    /// Create a new, empty mock accessor
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every get and update by `latency` before touching state.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A poisoned lock only happens after a test already panicked.
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Stores an object, assigning it a fresh resource version.
    pub fn insert(&self, mut greeting: Greeting) -> ObjectKey {
        let key = ObjectKey::from_resource(&greeting).expect("test greeting must be namespaced");
        let mut state = self.state();
        greeting.metadata.resource_version = Some(state.bump_version());
        state.objects.insert(key.clone(), greeting);
        key
    }

    /// Simulates a user editing `spec.message`.
    pub fn set_message(&self, key: &ObjectKey, message: &str) {
        self.state()
            .apply_edit(key, ConcurrentEdit::SetMessage(message.to_string()));
    }

    /// Simulates the object being deleted.
    pub fn delete(&self, key: &ObjectKey) {
        self.state().apply_edit(key, ConcurrentEdit::Delete);
    }

    /// Edits `spec.message` right after the next get for `key` returns, so a
    /// pass that read the object now holds a stale version.
    pub fn set_message_after_next_get(&self, key: &ObjectKey, message: &str) {
        self.state()
            .edits_after_get
            .insert(key.clone(), ConcurrentEdit::SetMessage(message.to_string()));
    }

    /// Deletes the object right after the next get for `key` returns.
    pub fn delete_after_next_get(&self, key: &ObjectKey) {
        self.state()
            .edits_after_get
            .insert(key.clone(), ConcurrentEdit::Delete);
    }

    /// Makes the next get fail with `error`.
    pub fn fail_next_get(&self, error: AccessError) {
        self.state().get_failures.push_back(error);
    }

    /// Makes the next status update fail with `error`.
    pub fn fail_next_update(&self, error: AccessError) {
        self.state().update_failures.push_back(error);
    }

    /// Current stored copy of an object.
    pub fn object(&self, key: &ObjectKey) -> Option<Greeting> {
        self.state().objects.get(key).cloned()
    }

    /// Successful status writes, in order.
    pub fn status_writes(&self) -> Vec<(ObjectKey, GreetingStatus)> {
        self.state().status_writes.clone()
    }

    /// Number of successful status writes.
    pub fn write_count(&self) -> usize {
        self.state().status_writes.len()
    }

    /// Number of update_status calls, successful or not.
    pub fn update_attempts(&self) -> usize {
        self.state().update_attempts
    }

    /// Number of get calls.
    pub fn get_calls(&self) -> usize {
        self.state().get_calls
    }
}

#[async_trait::async_trait]
impl GreetingAccessor for MockGreetingAccessor {
    async fn get(&self, key: &ObjectKey) -> Result<Option<Greeting>, AccessError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        state.get_calls += 1;
        if let Some(error) = state.get_failures.pop_front() {
            return Err(error);
        }

        let current = state.objects.get(key).cloned();
        if let Some(edit) = state.edits_after_get.remove(key) {
            state.apply_edit(key, edit);
        }
        Ok(current)
    }

    async fn update_status(&self, greeting: &Greeting) -> Result<(), AccessError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let key = ObjectKey::from_resource(greeting).map_err(|_| AccessError::NotFound)?;
        let mut state = self.state();
        state.update_attempts += 1;
        if let Some(error) = state.update_failures.pop_front() {
            return Err(error);
        }

        let sent_version = greeting
            .metadata
            .resource_version
            .clone()
            .ok_or(AccessError::MissingResourceVersion)?;
        let stored_version = match state.objects.get(&key) {
            Some(stored) => stored.metadata.resource_version.clone(),
            None => return Err(AccessError::NotFound),
        };
        if stored_version.as_deref() != Some(sent_version.as_str()) {
            return Err(AccessError::Conflict);
        }

        let status = greeting.status.clone().unwrap_or_default();
        let version = state.bump_version();
        if let Some(stored) = state.objects.get_mut(&key) {
            stored.status = Some(status.clone());
            stored.metadata.resource_version = Some(version);
        }
        state.status_writes.push((key, status));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_greeting;

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let mock = MockGreetingAccessor::new();
        let key = mock.insert(create_test_greeting("default", "hello", "hi", None));

        let mut fetched = mock.get(&key).await.expect("get").expect("exists");
        mock.set_message(&key, "bye");
        fetched.status = Some(GreetingStatus { observed_message: "hi".to_string() });

        assert!(matches!(mock.update_status(&fetched).await, Err(AccessError::Conflict)));
        assert_eq!(mock.write_count(), 0);
        assert_eq!(mock.update_attempts(), 1);
    }

    #[tokio::test]
    async fn test_status_write_keeps_spec() {
        let mock = MockGreetingAccessor::new();
        let key = mock.insert(create_test_greeting("default", "hello", "hi", None));

        let mut fetched = mock.get(&key).await.expect("get").expect("exists");
        fetched.spec.message = "tampered".to_string();
        fetched.status = Some(GreetingStatus { observed_message: "hi".to_string() });
        mock.update_status(&fetched).await.expect("write succeeds");

        let stored = mock.object(&key).expect("exists");
        assert_eq!(stored.spec.message, "hi");
        assert_eq!(stored.observed_message(), "hi");
    }
}
