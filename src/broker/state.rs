//! Broker state: attached clients, the host registry and window ownership.
//!
//! Owned exclusively by the broker loop. Methods do no socket I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::host::backend::HostNotice;
use crate::host::event::HostEvent;
use crate::host::input::{DesktopSink, HardwareInput, LockState, Rect};
use crate::host::registry::{Connector, HostId, HostRegistry};
use crate::host::windows::WindowHandle;
use crate::host::{HostConnection, HostError};
use crate::ipc::protocol::Message;

/// Unique identifier for a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Default)]
pub struct BrokerConfig {
    /// Overrides the root window geometry as the virtual screen.
    pub virtual_screen: Option<Rect>,
    /// When false, `connect` answers `not_supported`.
    pub x11_enabled: bool,
}

/// A message the broker loop must deliver to a connection.
#[derive(Debug, PartialEq)]
pub struct Outbound {
    pub target: ConnectionId,
    pub message: Message,
}

/// Something a host connection produced while dispatching.
#[derive(Debug, Clone, PartialEq)]
pub enum Push {
    Input(Option<WindowHandle>, HardwareInput),
    LangChange(WindowHandle, u32),
    Lock(LockState),
}

/// Collects a host's output during one dispatch.
#[derive(Debug)]
pub struct BrokerSink {
    screen: Rect,
    pub pushes: Vec<Push>,
}

impl BrokerSink {
    pub fn new(screen: Rect) -> Self {
        Self {
            screen,
            pushes: Vec::new(),
        }
    }
}

impl DesktopSink for BrokerSink {
    fn virtual_screen(&self) -> Rect {
        self.screen
    }

    fn queue_input(&mut self, window: Option<WindowHandle>, input: HardwareInput) {
        self.pushes.push(Push::Input(window, input));
    }

    fn post_input_lang_change(&mut self, window: WindowHandle, hkl: u32) {
        self.pushes.push(Push::LangChange(window, hkl));
    }

    fn update_lock_state(&mut self, state: LockState) {
        self.pushes.push(Push::Lock(state));
    }
}

#[derive(Debug, Default)]
struct Client {
    host: Option<HostId>,
}

pub struct BrokerState {
    config: BrokerConfig,
    hosts: HostRegistry,
    clients: HashMap<ConnectionId, Client>,
    /// Registered X11 windows and who registered them.
    windows: HashMap<(HostId, u32), (ConnectionId, WindowHandle)>,
    /// Reverse of `windows`, for routing window-targeted input.
    handles: HashMap<(HostId, WindowHandle), ConnectionId>,
}

impl BrokerState {
    pub fn new(
        config: BrokerConfig,
        connector: Box<dyn Connector>,
        notices: mpsc::UnboundedSender<HostNotice>,
    ) -> Self {
        Self {
            config,
            hosts: HostRegistry::new(connector, notices),
            clients: HashMap::new(),
            windows: HashMap::new(),
            handles: HashMap::new(),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn add_connection(&mut self, id: ConnectionId) {
        self.clients.entry(id).or_default();
    }

    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.clients.contains_key(&id)
    }

    /// Forget a client, stopping its windows and releasing its host.
    pub fn remove_connection(&mut self, id: ConnectionId) {
        self.detach(id);
        self.clients.remove(&id);
    }

    /// Host the client is attached to.
    pub fn host_of(&self, id: ConnectionId) -> Option<HostId> {
        self.clients.get(&id).and_then(|c| c.host)
    }

    pub fn host(&self, id: HostId) -> Option<&HostConnection> {
        self.hosts.get(id)
    }

    pub fn host_mut(&mut self, id: HostId) -> Option<&mut HostConnection> {
        self.hosts.get_mut(id)
    }

    /// Virtual screen for `host`: the configured one or the root geometry.
    pub fn virtual_screen(&self, host: &HostConnection) -> Rect {
        self.config.virtual_screen.unwrap_or_else(|| {
            let (width, height) = host.screen_size();
            Rect {
                left: 0,
                top: 0,
                right: width.into(),
                bottom: height.into(),
            }
        })
    }

    /// Attach a client to the host for `display`, dropping any previous one.
    pub fn attach(&mut self, id: ConnectionId, display: &str) -> Result<HostId, HostError> {
        self.detach(id);
        let host = self.hosts.get_or_create(display)?;
        self.clients.entry(id).or_default().host = Some(host);
        Ok(host)
    }

    /// Stop the client's windows and release its host reference.
    fn detach(&mut self, id: ConnectionId) {
        let Some(host_id) = self.clients.get_mut(&id).and_then(|c| c.host.take()) else {
            return;
        };

        let owned: Vec<u32> = self
            .windows
            .iter()
            .filter(|((h, _), (owner, _))| *h == host_id && *owner == id)
            .map(|((_, window), _)| *window)
            .collect();
        for window in owned {
            self.forget_window(host_id, window);
            if let Some(host) = self.hosts.get_mut(host_id) {
                host.stop_input(window);
            }
        }
        if let Some(host) = self.hosts.get_mut(host_id) {
            host.flush_if_pending();
        }
        self.hosts.release(host_id);
    }

    /// Record that `owner` registered `window` as `handle`.
    pub fn own_window(
        &mut self,
        host: HostId,
        window: u32,
        handle: WindowHandle,
        owner: ConnectionId,
    ) {
        self.forget_window(host, window);
        self.windows.insert((host, window), (owner, handle));
        self.handles.insert((host, handle), owner);
    }

    pub fn window_owner(&self, host: HostId, window: u32) -> Option<ConnectionId> {
        self.windows.get(&(host, window)).map(|(owner, _)| *owner)
    }

    pub fn forget_window(&mut self, host: HostId, window: u32) {
        if let Some((owner, handle)) = self.windows.remove(&(host, window))
            && self.handles.get(&(host, handle)) == Some(&owner)
        {
            self.handles.remove(&(host, handle));
        }
    }

    pub fn mark_failed(&mut self, host: HostId, reason: &str) {
        self.hosts.mark_failed(host, reason);
    }

    /// Dispatch one host event and address what it produced.
    pub fn dispatch(&mut self, host_id: HostId, event: HostEvent) -> Vec<Outbound> {
        let Some(screen) = self.host(host_id).map(|h| self.virtual_screen(h)) else {
            return Vec::new();
        };
        let mut sink = BrokerSink::new(screen);
        let failed = match self.hosts.get_mut(host_id) {
            Some(host) => {
                host.dispatch(event, &mut sink);
                host.is_failed()
            }
            None => return Vec::new(),
        };
        if failed {
            self.hosts.mark_failed(host_id, "flush failed");
        }
        self.route(host_id, sink.pushes)
    }

    /// Address pushes from `host`.
    ///
    /// Window-targeted input and language changes go to the window's
    /// owner; raw input and lock state go to every attached client.
    pub fn route(&self, host: HostId, pushes: Vec<Push>) -> Vec<Outbound> {
        let mut out = Vec::new();
        for push in pushes {
            match push {
                Push::Input(Some(handle), input) => {
                    if let Some(&target) = self.handles.get(&(host, handle)) {
                        out.push(Outbound {
                            target,
                            message: Message::Input {
                                id: 0,
                                window: Some(handle.0),
                                input,
                            },
                        });
                    }
                }
                Push::LangChange(handle, hkl) => {
                    if let Some(&target) = self.handles.get(&(host, handle)) {
                        out.push(Outbound {
                            target,
                            message: Message::InputLangChange {
                                id: 0,
                                window: handle.0,
                                hkl,
                            },
                        });
                    }
                }
                Push::Input(None, input) => {
                    out.extend(self.attached(host).map(|target| Outbound {
                        target,
                        message: Message::Input {
                            id: 0,
                            window: None,
                            input,
                        },
                    }));
                }
                Push::Lock(state) => {
                    out.extend(self.attached(host).map(|target| Outbound {
                        target,
                        message: Message::lock_state(state),
                    }));
                }
            }
        }
        out
    }

    /// Clients attached to `host`, in a stable order.
    fn attached(&self, host: HostId) -> impl Iterator<Item = ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .clients
            .iter()
            .filter(|(_, c)| c.host == Some(host))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_by_key(|id| id.0);
        ids.into_iter()
    }
}
