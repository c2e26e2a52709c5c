//! XCB backend and event pump.
//!
//! Uses `x11rb::xcb_ffi::XCBConnection` so the same connection can be
//! handed to libxkbcommon for keymap compilation.

use std::ffi::CString;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::cookie::VoidCookie;
use x11rb::protocol::xfixes::{self, ConnectionExt as _};
use x11rb::protocol::xinput::{self, ConnectionExt as _};
use x11rb::protocol::xkb::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{AtomEnum, ConnectionExt as _};
use x11rb::xcb_ffi::XCBConnection;
use xkbcommon::xkb as xkbc;
use xkbcommon::xkb::x11::ffi::{XKB_X11_MIN_MAJOR_XKB_VERSION, XKB_X11_MIN_MINOR_XKB_VERSION};

use super::HostError;
use super::backend::{Barrier, BarrierDirection, EventSender, HostBackend, XkbState};
use super::event::{decode, valuators};
use super::pointer::PointerDevice;
use super::registry::Connector;
use crate::layout::keymap::{KeymapSource, XkbKeymap};
use crate::layout::rules::RulesNames;

const ALL_MASTER_DEVICES: u16 = 1;

/// Enough for any realistic `_XKB_RULES_NAMES`, in 32-bit units.
const RULES_NAMES_LEN: u32 = 1024;

fn request_err(what: &str) -> impl FnOnce(x11rb::errors::ReplyError) -> HostError + '_ {
    move |e| HostError::Request(format!("{what}: {e}"))
}

fn send_err(what: &str) -> impl FnOnce(x11rb::errors::ConnectionError) -> HostError + '_ {
    move |e| HostError::Request(format!("{what}: {e}"))
}

fn extension_err(extension: &'static str) -> impl FnOnce(String) -> HostError {
    move |reason| HostError::Extension { extension, reason }
}

/// Opens [`XcbBackend`]s.
#[derive(Debug, Default)]
pub struct XcbConnector;

impl Connector for XcbConnector {
    fn open(&mut self, display: &str) -> Result<Box<dyn HostBackend>, HostError> {
        Ok(Box::new(XcbBackend::open(display)?))
    }
}

pub struct XcbBackend {
    conn: Arc<XCBConnection>,
    root: u32,
    size: (u16, u16),
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl XcbBackend {
    /// Connect to `display`; an empty string means `$DISPLAY`.
    pub fn open(display: &str) -> Result<Self, HostError> {
        let connect_err = |reason: String| HostError::Connect {
            display: display.to_owned(),
            reason,
        };
        let name = if display.is_empty() {
            None
        } else {
            Some(CString::new(display).map_err(|e| connect_err(e.to_string()))?)
        };
        let (conn, screen_num) =
            XCBConnection::connect(name.as_deref()).map_err(|e| connect_err(e.to_string()))?;

        let screen = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or_else(|| connect_err(format!("no screen {screen_num}")))?;
        let root = screen.root;
        let size = (screen.width_in_pixels, screen.height_in_pixels);

        for name in [
            xfixes::X11_EXTENSION_NAME,
            xinput::X11_EXTENSION_NAME,
            xkb::X11_EXTENSION_NAME,
        ] {
            conn.prefetch_extension_information(name)
                .map_err(|e| connect_err(e.to_string()))?;
        }

        let display_name = display;
        tracing::debug!(
            display = %display_name,
            screen = screen_num,
            root = format_args!("0x{root:x}"),
            "display opened"
        );
        Ok(Self {
            conn: Arc::new(conn),
            root,
            size,
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        })
    }

    /// Check fire-and-forget requests only when tracing.
    fn discard_reply(&self, cookie: VoidCookie<'_, Arc<XCBConnection>>, what: &'static str) {
        if tracing::enabled!(tracing::Level::TRACE) {
            if let Err(e) = cookie.check() {
                tracing::trace!(request = what, error = %e, "request failed");
            }
        } else {
            cookie.ignore_error();
        }
    }
}

impl Drop for XcbBackend {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::warn!("x11 event thread panicked");
        }
    }
}

fn clamp_u16(v: i32) -> u16 {
    v.clamp(0, u16::MAX as i32) as u16
}

fn clamp_i16(v: i32) -> i16 {
    v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn window_mask() -> xinput::XIEventMask {
    xinput::XIEventMask::BUTTON_PRESS
        | xinput::XIEventMask::BUTTON_RELEASE
        | xinput::XIEventMask::MOTION
        | xinput::XIEventMask::ENTER
        | xinput::XIEventMask::LEAVE
        | xinput::XIEventMask::FOCUS_IN
        | xinput::XIEventMask::FOCUS_OUT
        | xinput::XIEventMask::KEY_PRESS
        | xinput::XIEventMask::KEY_RELEASE
        | xinput::XIEventMask::TOUCH_BEGIN
        | xinput::XIEventMask::TOUCH_UPDATE
        | xinput::XIEventMask::TOUCH_END
}

impl HostBackend for XcbBackend {
    fn root(&self) -> u32 {
        self.root
    }

    fn screen_size(&self) -> (u16, u16) {
        self.size
    }

    fn init_xfixes(&mut self) -> Result<(), HostError> {
        let fail = extension_err("XFixes");
        let version = self
            .conn
            .xfixes_query_version(5, 0)
            .map_err(|e| e.to_string())
            .and_then(|c| c.reply().map_err(|e| e.to_string()))
            .map_err(fail)?;
        if version.major_version < 5 {
            return Err(HostError::Extension {
                extension: "XFixes",
                reason: format!("version {} lacks pointer barriers", version.major_version),
            });
        }
        tracing::debug!(
            major = version.major_version,
            minor = version.minor_version,
            "XFixes ready"
        );
        Ok(())
    }

    fn init_xinput(&mut self) -> Result<PointerDevice, HostError> {
        let fail = |e: String| HostError::Extension {
            extension: "XInput2",
            reason: e,
        };
        let version = self
            .conn
            .xinput_xi_query_version(2, 2)
            .map_err(|e| e.to_string())
            .and_then(|c| c.reply().map_err(|e| e.to_string()))
            .map_err(fail)?;
        if version.major_version < 2 {
            return Err(fail(format!("version {}", version.major_version)));
        }

        let root_events = xinput::EventMask {
            deviceid: ALL_MASTER_DEVICES,
            mask: vec![
                xinput::XIEventMask::DEVICE_CHANGED
                    | xinput::XIEventMask::RAW_MOTION
                    | xinput::XIEventMask::RAW_KEY_PRESS
                    | xinput::XIEventMask::RAW_KEY_RELEASE,
            ],
        };
        self.conn
            .xinput_xi_select_events(self.root, std::slice::from_ref(&root_events))
            .map_err(|e| e.to_string())
            .and_then(|c| c.check().map_err(|e| e.to_string()))
            .map_err(fail)?;

        let devices = self
            .conn
            .xinput_xi_query_device(ALL_MASTER_DEVICES)
            .map_err(|e| e.to_string())
            .and_then(|c| c.reply().map_err(|e| e.to_string()))
            .map_err(fail)?;
        let info = devices
            .infos
            .iter()
            .find(|info| info.type_ == xinput::DeviceType::MASTER_POINTER)
            .ok_or_else(|| fail("no master pointer".into()))?;

        let pointer = PointerDevice::new(info.deviceid, &valuators(&info.classes));
        tracing::debug!(
            major = version.major_version,
            minor = version.minor_version,
            device = pointer.id,
            x = ?pointer.x,
            y = ?pointer.y,
            "XInput2 ready"
        );
        Ok(pointer)
    }

    fn init_xkb(&mut self) -> Result<u8, HostError> {
        let fail = extension_err("XKB");
        let reply = self
            .conn
            .xkb_use_extension(XKB_X11_MIN_MAJOR_XKB_VERSION, XKB_X11_MIN_MINOR_XKB_VERSION)
            .map_err(|e| e.to_string())
            .and_then(|c| c.reply().map_err(|e| e.to_string()))
            .map_err(extension_err("XKB"))?;
        if !reply.supported {
            return Err(fail(format!(
                "server has {}.{}",
                reply.server_major, reply.server_minor
            )));
        }

        let events = xkb::EventType::NEW_KEYBOARD_NOTIFY
            | xkb::EventType::MAP_NOTIFY
            | xkb::EventType::STATE_NOTIFY;
        let map_parts = xkb::MapPart::KEY_TYPES
            | xkb::MapPart::KEY_SYMS
            | xkb::MapPart::MODIFIER_MAP
            | xkb::MapPart::EXPLICIT_COMPONENTS
            | xkb::MapPart::KEY_ACTIONS
            | xkb::MapPart::VIRTUAL_MODS
            | xkb::MapPart::VIRTUAL_MOD_MAP;
        self.conn
            .xkb_select_events(
                xkb::ID::USE_CORE_KBD.into(),
                0u8.into(),
                events,
                map_parts,
                map_parts,
                &xkb::SelectEventsAux::new(),
            )
            .map_err(|e| e.to_string())
            .and_then(|c| c.check().map_err(|e| e.to_string()))
            .map_err(extension_err("XKB"))?;

        let device = xkbc::x11::get_core_keyboard_device_id(&*self.conn);
        let device = u8::try_from(device)
            .map_err(|_| HostError::Extension {
                extension: "XKB",
                reason: format!("bad core keyboard id {device}"),
            })?;
        tracing::debug!(device, "XKB ready");
        Ok(device)
    }

    fn keymap(&mut self, device: u8) -> Result<Box<dyn KeymapSource>, HostError> {
        let context = xkbc::Context::new(xkbc::CONTEXT_NO_FLAGS);
        let keymap = xkbc::x11::keymap_new_from_device(
            &context,
            &*self.conn,
            device.into(),
            xkbc::KEYMAP_COMPILE_NO_FLAGS,
        );
        if keymap.num_layouts() == 0 {
            return Err(HostError::Keymap(format!("device {device} has no layouts")));
        }
        Ok(Box::new(XkbKeymap::new(keymap)))
    }

    fn rules_names(&mut self) -> Result<RulesNames, HostError> {
        let atom = self
            .conn
            .intern_atom(true, b"_XKB_RULES_NAMES")
            .map_err(send_err("intern_atom"))?
            .reply()
            .map_err(request_err("intern_atom reply"))?
            .atom;
        if atom == x11rb::NONE {
            return Ok(RulesNames::default());
        }
        let reply = self
            .conn
            .get_property(false, self.root, atom, AtomEnum::STRING, 0, RULES_NAMES_LEN)
            .map_err(send_err("get_property _XKB_RULES_NAMES"))?
            .reply()
            .map_err(request_err("get_property reply"))?;
        if reply.format != 8 {
            return Ok(RulesNames::default());
        }
        Ok(RulesNames::parse(&reply.value))
    }

    fn xkb_state(&mut self, device: u8) -> Result<XkbState, HostError> {
        let reply = self
            .conn
            .xkb_get_state(device.into())
            .map_err(send_err("xkb_get_state"))?
            .reply()
            .map_err(request_err("xkb_get_state reply"))?;
        Ok(XkbState {
            group: u8::from(reply.group).into(),
            locked_mods: u16::from(reply.locked_mods).into(),
        })
    }

    fn select_window_input(&mut self, window: u32, enable: bool) -> Result<(), HostError> {
        let mask = if enable { vec![window_mask()] } else { Vec::new() };
        let events = xinput::EventMask {
            deviceid: ALL_MASTER_DEVICES,
            mask,
        };
        let cookie = self
            .conn
            .xinput_xi_select_events(window, std::slice::from_ref(&events))
            .map_err(send_err("xi_select_events"))?;
        self.discard_reply(cookie, "xi_select_events");
        Ok(())
    }

    fn warp_pointer(&mut self, x: i32, y: i32) -> Result<u64, HostError> {
        let cookie = self
            .conn
            .warp_pointer(x11rb::NONE, self.root, 0, 0, 0, 0, clamp_i16(x), clamp_i16(y))
            .map_err(send_err("warp_pointer"))?;
        let seq = cookie.sequence_number();
        self.discard_reply(cookie, "warp_pointer");
        Ok(seq)
    }

    fn create_barrier(&mut self, barrier: Barrier) -> Result<u32, HostError> {
        let id = self
            .conn
            .generate_id()
            .map_err(|e| HostError::Request(format!("generate_id: {e}")))?;
        let directions = match barrier.allow {
            BarrierDirection::PositiveX => xfixes::BarrierDirections::POSITIVE_X,
            BarrierDirection::PositiveY => xfixes::BarrierDirections::POSITIVE_Y,
            BarrierDirection::NegativeX => xfixes::BarrierDirections::NEGATIVE_X,
            BarrierDirection::NegativeY => xfixes::BarrierDirections::NEGATIVE_Y,
        };
        let cookie = self
            .conn
            .xfixes_create_pointer_barrier(
                id,
                self.root,
                clamp_u16(barrier.x1),
                clamp_u16(barrier.y1),
                clamp_u16(barrier.x2),
                clamp_u16(barrier.y2),
                directions,
                &[],
            )
            .map_err(send_err("create_pointer_barrier"))?;
        self.discard_reply(cookie, "create_pointer_barrier");
        Ok(id)
    }

    fn delete_barrier(&mut self, id: u32) -> Result<(), HostError> {
        let cookie = self
            .conn
            .xfixes_delete_pointer_barrier(id)
            .map_err(send_err("delete_pointer_barrier"))?;
        self.discard_reply(cookie, "delete_pointer_barrier");
        Ok(())
    }

    fn flush(&mut self) -> Result<(), HostError> {
        self.conn.flush().map_err(send_err("flush"))
    }

    fn start_events(&mut self, events: EventSender) -> Result<(), HostError> {
        let thread = spawn_event_thread(self.conn.clone(), self.stop.clone(), events)
            .map_err(|e| HostError::Request(format!("spawn event thread: {e}")))?;
        self.thread = Some(thread);
        Ok(())
    }
}

/// Poll the connection and forward decoded events until stopped.
///
/// Polls with a 100ms timeout so the stop flag is seen promptly.
fn spawn_event_thread(
    conn: Arc<XCBConnection>,
    stop: Arc<AtomicBool>,
    events: EventSender,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("x11-events".into())
        .spawn(move || {
            let raw_fd = conn.as_raw_fd();

            while !stop.load(Ordering::Relaxed) {
                // SAFETY: raw_fd belongs to conn, which this thread keeps alive.
                let borrowed = unsafe { BorrowedFd::borrow_raw(raw_fd) };
                let mut fds = [PollFd::new(borrowed, PollFlags::POLLIN)];

                match poll(&mut fds, PollTimeout::from(100u16)) {
                    Ok(0) => continue,
                    Ok(_) => loop {
                        match conn.poll_for_event_with_sequence() {
                            Ok(Some((event, seq))) => {
                                let Some(event) = decode(event, seq) else {
                                    continue;
                                };
                                if !events.event(event) {
                                    return;
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                tracing::error!(host = ?events.host(), error = %e, "X11 connection error");
                                events.failed(e.to_string());
                                return;
                            }
                        }
                    },
                    Err(nix::Error::EINTR) => continue,
                    Err(e) => {
                        tracing::error!(error = %e, "poll error on X11 fd");
                        events.failed(e.to_string());
                        return;
                    }
                }
            }
        })
}
