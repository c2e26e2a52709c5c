//! The request surface a host connection drives.
//!
//! [`HostBackend`] is everything [`super::HostConnection`] asks of the
//! display server. The XCB implementation lives in [`super::x11`]; tests
//! use the recording [`mock::MockBackend`].

use tokio::sync::mpsc;

use super::HostError;
use super::event::HostEvent;
use super::pointer::PointerDevice;
use super::registry::HostId;
use crate::layout::keymap::KeymapSource;
use crate::layout::rules::RulesNames;

/// Direction a barrier lets the pointer cross.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierDirection {
    PositiveX,
    PositiveY,
    NegativeX,
    NegativeY,
}

/// A pointer barrier segment in root-window coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Barrier {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub allow: BarrierDirection,
}

/// XKB group and locked modifiers as reported by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XkbState {
    pub group: u32,
    pub locked_mods: u32,
}

#[derive(Debug)]
pub enum NoticeKind {
    Event(HostEvent),
    /// The transport died; no further events follow.
    Failed(String),
}

/// Something a host connection's event pump produced.
#[derive(Debug)]
pub struct HostNotice {
    pub host: HostId,
    pub kind: NoticeKind,
}

/// Channel handle given to an event pump, tagged with its host.
#[derive(Debug, Clone)]
pub struct EventSender {
    host: HostId,
    tx: mpsc::UnboundedSender<HostNotice>,
}

impl EventSender {
    pub fn new(host: HostId, tx: mpsc::UnboundedSender<HostNotice>) -> Self {
        Self { host, tx }
    }

    pub fn host(&self) -> HostId {
        self.host
    }

    /// Returns `false` once the receiving side is gone.
    pub fn event(&self, event: HostEvent) -> bool {
        self.send(NoticeKind::Event(event))
    }

    pub fn failed(&self, reason: String) -> bool {
        self.send(NoticeKind::Failed(reason))
    }

    fn send(&self, kind: NoticeKind) -> bool {
        self.tx
            .send(HostNotice {
                host: self.host,
                kind,
            })
            .is_ok()
    }
}

/// Display-server requests issued by a host connection.
///
/// Requests that have no reply are queued and go out on [`flush`].
///
/// [`flush`]: HostBackend::flush
pub trait HostBackend: Send {
    fn root(&self) -> u32;

    /// Root window size in pixels.
    fn screen_size(&self) -> (u16, u16);

    fn init_xfixes(&mut self) -> Result<(), HostError>;

    /// Negotiate XInput2, select root-window raw events and return the
    /// master pointer.
    fn init_xinput(&mut self) -> Result<PointerDevice, HostError>;

    /// Negotiate XKB, select its notifications and return the core
    /// keyboard device id.
    fn init_xkb(&mut self) -> Result<u8, HostError>;

    /// A fresh keymap for `device`.
    fn keymap(&mut self, device: u8) -> Result<Box<dyn KeymapSource>, HostError>;

    fn rules_names(&mut self) -> Result<RulesNames, HostError>;

    fn xkb_state(&mut self, device: u8) -> Result<XkbState, HostError>;

    /// Select or clear the per-window XInput2 event set.
    fn select_window_input(&mut self, window: u32, enable: bool) -> Result<(), HostError>;

    /// Warp to root coordinates and return the request's sequence number.
    fn warp_pointer(&mut self, x: i32, y: i32) -> Result<u64, HostError>;

    fn create_barrier(&mut self, barrier: Barrier) -> Result<u32, HostError>;

    fn delete_barrier(&mut self, id: u32) -> Result<(), HostError>;

    fn flush(&mut self) -> Result<(), HostError>;

    /// Start delivering events. Stops when the backend is dropped.
    fn start_events(&mut self, events: EventSender) -> Result<(), HostError>;
}
