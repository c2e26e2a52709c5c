//! Process-wide table of host connections, shared by display string.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use super::backend::{EventSender, HostBackend, HostNotice};
use super::{HostConnection, HostError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostId(u64);

impl HostId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Opens display connections.
pub trait Connector: Send {
    fn open(&mut self, display: &str) -> Result<Box<dyn HostBackend>, HostError>;
}

struct Entry {
    host: HostConnection,
    refs: usize,
}

/// Reference-counted host connections.
///
/// Connecting to a display that already has a live connection reuses it.
/// The connection is torn down when its last reference is released.
pub struct HostRegistry {
    connector: Box<dyn Connector>,
    events: mpsc::UnboundedSender<HostNotice>,
    hosts: HashMap<HostId, Entry>,
    by_display: HashMap<String, HostId>,
}

impl HostRegistry {
    pub fn new(connector: Box<dyn Connector>, events: mpsc::UnboundedSender<HostNotice>) -> Self {
        Self {
            connector,
            events,
            hosts: HashMap::new(),
            by_display: HashMap::new(),
        }
    }

    /// Take a reference on the connection for `display`, opening it if needed.
    pub fn get_or_create(&mut self, display: &str) -> Result<HostId, HostError> {
        if let Some(&id) = self.by_display.get(display)
            && let Some(entry) = self.hosts.get_mut(&id)
        {
            entry.refs += 1;
            let display_name = display;
            tracing::debug!(display = %display_name, refs = entry.refs, "reusing host connection");
            return Ok(id);
        }

        let backend = self.connector.open(display)?;
        let id = HostId::new();
        let events = EventSender::new(id, self.events.clone());
        let host = HostConnection::connect(id, display, backend, events)?;

        self.by_display.insert(display.to_owned(), id);
        self.hosts.insert(id, Entry { host, refs: 1 });
        let display_name = display;
        tracing::info!(display = %display_name, ?id, "host connection opened");
        Ok(id)
    }

    /// Drop a reference. Returns `true` if this tore the connection down.
    pub fn release(&mut self, id: HostId) -> bool {
        let Some(entry) = self.hosts.get_mut(&id) else {
            return false;
        };
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs > 0 {
            return false;
        }

        if let Some(entry) = self.hosts.remove(&id) {
            let name = entry.host.display();
            if self.by_display.get(name) == Some(&id) {
                self.by_display.remove(name);
            }
            tracing::info!(display = %name, ?id, "host connection closed");
        }
        true
    }

    /// Mark a connection failed. Later connects to its display open a new one.
    pub fn mark_failed(&mut self, id: HostId, reason: &str) {
        let Some(entry) = self.hosts.get_mut(&id) else {
            return;
        };
        entry.host.fail(reason);
        let display = entry.host.display().to_owned();
        if self.by_display.get(&display) == Some(&id) {
            self.by_display.remove(&display);
        }
    }

    pub fn get(&self, id: HostId) -> Option<&HostConnection> {
        self.hosts.get(&id).map(|e| &e.host)
    }

    pub fn get_mut(&mut self, id: HostId) -> Option<&mut HostConnection> {
        self.hosts.get_mut(&id).map(|e| &mut e.host)
    }

    pub fn refs(&self, id: HostId) -> usize {
        self.hosts.get(&id).map_or(0, |e| e.refs)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::fake::FakeConnector;
    use super::*;
    use crate::host::backend::mock::FailAt;

    fn registry(connector: FakeConnector) -> HostRegistry {
        let (tx, _rx) = mpsc::unbounded_channel();
        HostRegistry::new(Box::new(connector), tx)
    }

    #[test]
    fn same_display_shares_one_connection() {
        let connector = FakeConnector::default();
        let opened = connector.opened.clone();
        let mut hosts = registry(connector);

        let a = hosts.get_or_create(":0").unwrap();
        let b = hosts.get_or_create(":0").unwrap();
        let c = hosts.get_or_create(":1").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(opened.load(Ordering::Relaxed), 2);
        assert_eq!(hosts.refs(a), 2);
    }

    #[test]
    fn last_release_tears_down() {
        let mut hosts = registry(FakeConnector::default());
        let id = hosts.get_or_create(":0").unwrap();
        hosts.get_or_create(":0").unwrap();

        assert!(!hosts.release(id));
        assert!(hosts.get(id).is_some());
        assert!(hosts.release(id));
        assert!(hosts.get(id).is_none());
        assert_eq!(hosts.len(), 0);
        assert!(!hosts.release(id));

        let again = hosts.get_or_create(":0").unwrap();
        assert_ne!(again, id);
    }

    #[test]
    fn failed_setup_leaves_nothing_behind() {
        let mut hosts = registry(FakeConnector {
            fail_at: Some(FailAt::Xkb),
            ..Default::default()
        });
        assert!(hosts.get_or_create(":0").is_err());
        assert_eq!(hosts.len(), 0);

        let mut hosts = registry(FakeConnector {
            refuse: true,
            ..Default::default()
        });
        assert!(matches!(
            hosts.get_or_create(":0"),
            Err(HostError::Connect { .. })
        ));
    }

    #[test]
    fn failed_connection_is_not_reused() {
        let mut hosts = registry(FakeConnector::default());
        let old = hosts.get_or_create(":0").unwrap();
        hosts.mark_failed(old, "gone");
        assert!(hosts.get(old).unwrap().is_failed());

        let new = hosts.get_or_create(":0").unwrap();
        assert_ne!(old, new);

        // Releasing the failed one must not unlink the replacement.
        assert!(hosts.release(old));
        assert_eq!(hosts.get_or_create(":0").unwrap(), new);
    }
}
