//! Window registry: X11 window id to caller window handle.
//!
//! Unsorted and scanned linearly on every event. The capacity is managed
//! explicitly: it grows by 1.5x (at least 256 slots) up to a hard cap of
//! 64K entries, and shrinks once fewer than a third of the slots are used.

use serde::{Deserialize, Serialize};

/// Opaque window handle supplied by the caller of `start_input`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowHandle(pub u64);

pub const MIN_CAPACITY: usize = 256;
pub const MAX_CAPACITY: usize = 0x10000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("window registry allocation failed")]
    OutOfMemory,
    #[error("window registry is full ({MAX_CAPACITY} entries)")]
    CapacityExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    window: u32,
    handle: WindowHandle,
}

#[derive(Debug, Default)]
pub struct WindowRegistry {
    entries: Vec<Entry>,
    capacity: usize,
}

impl WindowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Associate `window` with `handle`, overwriting an existing entry.
    ///
    /// # Errors
    ///
    /// Fails when growth would pass [`MAX_CAPACITY`] or the allocation
    /// fails. The registry is left unchanged in both cases.
    pub fn insert(&mut self, window: u32, handle: WindowHandle) -> Result<(), RegistryError> {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.window == window) {
            tracing::warn!(
                window = format_args!("0x{window:x}"),
                old = entry.handle.0,
                new = handle.0,
                "window already registered, overwriting handle"
            );
            entry.handle = handle;
            return Ok(());
        }

        if self.entries.len() == self.capacity {
            self.grow()?;
        }
        self.entries.push(Entry { window, handle });
        Ok(())
    }

    /// Remove `window`, returning its handle if it was registered.
    pub fn remove(&mut self, window: u32) -> Option<WindowHandle> {
        let pos = self.entries.iter().position(|e| e.window == window)?;
        let entry = self.entries.remove(pos);

        let used = self.entries.len();
        if used < self.capacity / 3 {
            let capacity = (2 * used).max(1);
            self.entries.shrink_to(capacity);
            tracing::trace!(from = self.capacity, to = capacity, "window registry shrunk");
            self.capacity = capacity;
        }
        Some(entry.handle)
    }

    pub fn lookup(&self, window: u32) -> Option<WindowHandle> {
        self.entries
            .iter()
            .find(|e| e.window == window)
            .map(|e| e.handle)
    }

    pub fn windows(&self) -> impl Iterator<Item = (u32, WindowHandle)> + '_ {
        self.entries.iter().map(|e| (e.window, e.handle))
    }

    fn grow(&mut self) -> Result<(), RegistryError> {
        if self.capacity >= MAX_CAPACITY {
            tracing::error!(capacity = self.capacity, "window registry is full");
            return Err(RegistryError::CapacityExceeded);
        }
        let capacity = (self.capacity + self.capacity / 2)
            .max(MIN_CAPACITY)
            .min(MAX_CAPACITY);
        self.entries
            .try_reserve_exact(capacity - self.entries.len())
            .map_err(|e| {
                tracing::error!(error = %e, capacity, "window registry growth failed");
                RegistryError::OutOfMemory
            })?;
        tracing::trace!(from = self.capacity, to = capacity, "window registry grown");
        self.capacity = capacity;
        Ok(())
    }
}
