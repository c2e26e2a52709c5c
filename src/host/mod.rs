//! Host X11 connections and their event dispatch.
//!
//! A [`HostConnection`] owns one display connection together with its
//! window registry, keyboard layouts and pointer, keyboard and cursor
//! tracking. It is driven by a single owner: requests arrive through its
//! methods and server events through [`HostConnection::dispatch`], which
//! reports everything it produces to a [`DesktopSink`].
//!
//! Connections are shared between clients through [`registry::HostRegistry`].

pub mod backend;
mod cursor;
pub mod event;
pub mod fixed;
pub mod input;
mod keyboard;
pub mod pointer;
pub mod registry;
mod touch;
pub mod windows;
pub mod x11;

use backend::{EventSender, HostBackend};
use cursor::CursorState;
use event::HostEvent;
use input::DesktopSink;
use keyboard::KeyboardState;
use pointer::PointerDevice;
use registry::HostId;
use windows::{RegistryError, WindowHandle, WindowRegistry};

use crate::layout::{Layout, LayoutError, LayoutSet};

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("cannot open display {display:?}: {reason}")]
    Connect { display: String, reason: String },

    #[error("{extension} unavailable: {reason}")]
    Extension {
        extension: &'static str,
        reason: String,
    },

    #[error("X11 request failed: {0}")]
    Request(String),

    #[error("keymap unavailable: {0}")]
    Keymap(String),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("host connection has failed")]
    Failed,
}

pub struct HostConnection {
    id: HostId,
    display: String,
    backend: Box<dyn HostBackend>,
    root: u32,
    screen_size: (u16, u16),
    flush_pending: bool,
    failed: bool,
    pointer: PointerDevice,
    cursor: CursorState,
    keyboard: KeyboardState,
    layouts: LayoutSet,
    windows: WindowRegistry,
}

impl std::fmt::Debug for HostConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostConnection")
            .field("id", &self.id)
            .field("display", &self.display)
            .field("root", &self.root)
            .field("failed", &self.failed)
            .field("windows", &self.windows.len())
            .field("layouts", &self.layouts.len())
            .finish_non_exhaustive()
    }
}

impl HostConnection {
    /// Set up a connection over an opened backend.
    ///
    /// Negotiates XFixes, XInput2 and XKB in that order, builds the
    /// initial layouts and starts the event pump. Any failure drops the
    /// backend, closing the display connection.
    pub fn connect(
        id: HostId,
        display: &str,
        mut backend: Box<dyn HostBackend>,
        events: EventSender,
    ) -> Result<Self, HostError> {
        backend.init_xfixes()?;
        let pointer = backend.init_xinput()?;
        let device = backend.init_xkb()?;
        let state = backend.xkb_state(device)?;

        let mut host = Self {
            id,
            display: display.to_owned(),
            root: backend.root(),
            screen_size: backend.screen_size(),
            backend,
            flush_pending: false,
            failed: false,
            pointer,
            cursor: CursorState::default(),
            keyboard: KeyboardState {
                device,
                group: state.group,
                ..Default::default()
            },
            layouts: LayoutSet::default(),
            windows: WindowRegistry::new(),
        };

        host.rebuild_layouts()?;
        host.apply_locked_mods(state.locked_mods);
        host.backend.start_events(events)?;
        host.backend.flush()?;

        tracing::info!(
            display = %host.display,
            root = format_args!("0x{:x}", host.root),
            pointer = host.pointer.id,
            keyboard = device,
            layouts = host.layouts.len(),
            "host connection ready"
        );
        Ok(host)
    }

    pub fn id(&self) -> HostId {
        self.id
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn root(&self) -> u32 {
        self.root
    }

    pub fn screen_size(&self) -> (u16, u16) {
        self.screen_size
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Stop dispatching for good after a transport error.
    pub fn fail(&mut self, reason: &str) {
        if !self.failed {
            tracing::error!(display = %self.display, reason, "host connection failed");
        }
        self.failed = true;
    }

    pub fn layouts(&self) -> &LayoutSet {
        &self.layouts
    }

    /// Layout whose HKL high word matches that of `hkl`.
    pub fn keyboard_tables(&self, hkl: u32) -> Option<&Layout> {
        self.layouts.find_by_hkl(hkl)
    }

    /// Associate `window` with `handle` and select its input events.
    pub fn start_input(&mut self, window: u32, handle: WindowHandle) -> Result<(), HostError> {
        if self.failed {
            return Err(HostError::Failed);
        }
        self.windows.insert(window, handle)?;
        if let Err(e) = self.backend.select_window_input(window, true) {
            self.windows.remove(window);
            return Err(e);
        }
        self.flush_pending = true;
        tracing::debug!(
            window = format_args!("0x{window:x}"),
            handle = handle.0,
            "input started"
        );
        Ok(())
    }

    /// Forget `window`, returning the handle it was registered with.
    pub fn stop_input(&mut self, window: u32) -> Option<WindowHandle> {
        let handle = self.windows.remove(window)?;
        if !self.failed {
            if let Err(e) = self.backend.select_window_input(window, false) {
                tracing::warn!(window = format_args!("0x{window:x}"), error = %e, "failed to clear input selection");
            }
            self.flush_pending = true;
        }
        if self.keyboard.focus == Some(window) {
            self.keyboard.focus = None;
        }
        tracing::debug!(window = format_args!("0x{window:x}"), "input stopped");
        Some(handle)
    }

    fn resolve_window(&self, window: u32, what: &'static str) -> Option<WindowHandle> {
        let handle = self.windows.lookup(window);
        if handle.is_none() {
            tracing::error!(
                display = %self.display,
                window = format_args!("0x{window:x}"),
                event = what,
                "no handle for window, dropping event"
            );
        }
        handle
    }

    /// Handle one server event.
    pub fn dispatch(&mut self, event: HostEvent, sink: &mut dyn DesktopSink) {
        if self.failed {
            return;
        }
        match event {
            HostEvent::Button {
                press,
                time,
                window,
                detail,
                root_x,
                root_y,
            } => self.handle_button(press, time, window, detail, (root_x, root_y), sink),
            HostEvent::Motion {
                kind,
                seq,
                time,
                window,
                root_x,
                root_y,
            } => self.handle_motion(kind, seq, time, window, (root_x, root_y), sink),
            HostEvent::RawMotion {
                time,
                device,
                valuator_mask,
                values,
            } => self.handle_raw_motion(device, &valuator_mask, &values, time, sink),
            HostEvent::DeviceChanged { device, valuators } => {
                self.handle_device_changed(device, &valuators)
            }
            HostEvent::Focus {
                focus_in,
                window,
                mode,
                detail,
            } => self.handle_focus(focus_in, window, mode, detail, sink),
            HostEvent::Key {
                press,
                time,
                window,
                keycode,
            } => self.handle_key(press, time, window, keycode, sink),
            HostEvent::RawKey {
                press,
                time,
                keycode,
            } => self.handle_raw_key(press, time, keycode, sink),
            HostEvent::Touch {
                phase,
                time,
                window,
                id,
                root_x,
                root_y,
            } => self.handle_touch(phase, time, window, id, (root_x, root_y), sink),
            HostEvent::NewKeyboard { device } => self.handle_new_keyboard(device, sink),
            HostEvent::KeymapChanged => self.handle_keymap_changed(sink),
            HostEvent::KeyboardState { group, locked_mods } => {
                self.handle_keyboard_state(group.into(), locked_mods.into(), sink)
            }
            HostEvent::Error {
                code,
                seq,
                resource,
                major,
                minor,
            } => tracing::warn!(
                display = %self.display,
                code,
                seq,
                resource = format_args!("0x{resource:x}"),
                major,
                minor,
                "X11 protocol error"
            ),
        }
        self.flush_if_pending();
    }

    /// Send queued requests if any were issued since the last flush.
    pub fn flush_if_pending(&mut self) {
        if !self.flush_pending || self.failed {
            return;
        }
        self.flush_pending = false;
        if let Err(e) = self.backend.flush() {
            self.fail(&e.to_string());
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use tokio::sync::mpsc;

    use super::backend::mock::{CallLog, MockBackend};
    use super::*;
    use crate::host::input::Rect;

    pub fn screen() -> Rect {
        Rect {
            left: 0,
            top: 0,
            right: 1920,
            bottom: 1080,
        }
    }

    pub fn connected() -> (HostConnection, CallLog) {
        connected_with(|_| {})
    }

    pub fn connected_with(setup: impl FnOnce(&mut MockBackend)) -> (HostConnection, CallLog) {
        let (mut backend, log) = MockBackend::new();
        setup(&mut backend);
        let id = HostId::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let host = HostConnection::connect(id, ":0", Box::new(backend), EventSender::new(id, tx))
            .unwrap();
        (host, log)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::backend::mock::{Call, FailAt, MockBackend};
    use super::backend::XkbState;
    use super::input::recording::RecordingSink;
    use super::test_support::{connected, connected_with, screen};
    use super::*;
    use crate::layout::keymap::fake::{FakeGroup, FakeKeymap, LOCK};

    fn connect_failing(step: FailAt) -> HostError {
        let (mut backend, _log) = MockBackend::new();
        backend.fail_at = Some(step);
        let id = HostId::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        HostConnection::connect(id, ":0", Box::new(backend), EventSender::new(id, tx)).unwrap_err()
    }

    #[test]
    fn connect_builds_one_layout_per_group() {
        let keymap = FakeKeymap::new(vec![FakeGroup::us(), FakeGroup::french()]);
        let (host, log) = connected_with(|b| {
            b.keymap = keymap;
            b.state = XkbState {
                group: 1,
                locked_mods: LOCK,
            };
        });
        assert_eq!(host.layouts().len(), 2);
        assert_eq!(host.layouts().active().map(|l| l.group), Some(1));
        assert!(host.lock_state().caps);
        assert_eq!(host.root(), 0x100);
        assert_eq!(host.screen_size(), (1920, 1080));
        assert_eq!(log.take(), vec![Call::Flush]);
    }

    #[test]
    fn any_setup_failure_aborts_connect() {
        for step in [
            FailAt::XFixes,
            FailAt::XInput,
            FailAt::Xkb,
            FailAt::Keymap,
            FailAt::StartEvents,
        ] {
            let err = connect_failing(step);
            assert!(
                matches!(err, HostError::Extension { .. }),
                "{step:?}: unexpected {err:?}"
            );
        }
    }

    #[test]
    fn start_and_stop_input_select_events() {
        let (mut host, log) = connected();
        log.take();

        host.start_input(0x500, WindowHandle(1)).unwrap();
        assert_eq!(
            host.stop_input(0x500),
            Some(WindowHandle(1)),
            "stop returns the registered handle"
        );
        assert_eq!(host.stop_input(0x500), None);
        host.flush_if_pending();
        assert_eq!(
            log.take(),
            vec![
                Call::SelectInput {
                    window: 0x500,
                    enable: true
                },
                Call::SelectInput {
                    window: 0x500,
                    enable: false
                },
                Call::Flush,
            ]
        );
    }

    #[test]
    fn keyboard_tables_match_on_high_word() {
        let (host, _log) = connected();
        let hkl = host.layouts().active().unwrap().hkl();
        assert!(host.keyboard_tables(hkl).is_some());
        assert!(host.keyboard_tables((hkl & 0xffff_0000) | 0x1234).is_some());
        assert!(host.keyboard_tables(0xdead_0409).is_none());
    }

    #[test]
    fn failed_connection_stops_dispatching() {
        let (mut host, log) = connected();
        host.start_input(0x500, WindowHandle(1)).unwrap();
        log.take();
        host.fail("broken pipe");

        let mut sink = RecordingSink::new(screen());
        host.dispatch(
            HostEvent::Button {
                press: true,
                time: 0,
                window: 0x500,
                detail: 1,
                root_x: 0,
                root_y: 0,
            },
            &mut sink,
        );
        assert!(sink.calls.is_empty());
        assert!(matches!(
            host.start_input(0x501, WindowHandle(2)),
            Err(HostError::Failed)
        ));
        host.flush_if_pending();
        assert!(log.take().is_empty());
    }

    #[test]
    fn protocol_errors_are_not_fatal() {
        let (mut host, _log) = connected();
        let mut sink = RecordingSink::new(screen());
        host.dispatch(
            HostEvent::Error {
                code: 3,
                seq: 42,
                resource: 0x500,
                major: 139,
                minor: 1,
            },
            &mut sink,
        );
        assert!(!host.is_failed());
        assert!(sink.calls.is_empty());
    }
}
