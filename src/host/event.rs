//! Decoded host events.
//!
//! [`decode`] is the single place that reads x11rb event structures.
//! Everything past it works on [`HostEvent`], which carries only the
//! fields the handlers use and can be built directly in tests.

use x11rb::protocol::{Event, xinput};

use super::fixed::Fp3232;
use super::pointer::{Valuator, ValuatorMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionKind {
    Motion,
    Enter,
    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    Begin,
    Update,
    End,
}

/// Positions are root-window 16.16 fixed point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Button {
        press: bool,
        time: u32,
        window: u32,
        detail: u32,
        root_x: i32,
        root_y: i32,
    },
    Motion {
        kind: MotionKind,
        seq: u64,
        time: u32,
        window: u32,
        root_x: i32,
        root_y: i32,
    },
    RawMotion {
        time: u32,
        device: u16,
        valuator_mask: Vec<u32>,
        values: Vec<Fp3232>,
    },
    DeviceChanged {
        device: u16,
        valuators: Vec<Valuator>,
    },
    Focus {
        focus_in: bool,
        window: u32,
        mode: u8,
        detail: u8,
    },
    Key {
        press: bool,
        time: u32,
        window: u32,
        keycode: u32,
    },
    RawKey {
        press: bool,
        time: u32,
        keycode: u32,
    },
    Touch {
        phase: TouchPhase,
        time: u32,
        window: u32,
        id: u32,
        root_x: i32,
        root_y: i32,
    },
    NewKeyboard {
        device: u8,
    },
    KeymapChanged,
    KeyboardState {
        group: u8,
        locked_mods: u16,
    },
    Error {
        code: u8,
        seq: u64,
        resource: u32,
        major: u8,
        minor: u16,
    },
}

/// Valuator classes carried by a device-changed event or device query.
pub fn valuators(classes: &[xinput::DeviceClass]) -> Vec<Valuator> {
    classes
        .iter()
        .filter_map(|class| class.data.as_valuator())
        .map(|v| Valuator {
            number: v.number,
            mode: if v.mode == xinput::ValuatorMode::ABSOLUTE {
                ValuatorMode::Absolute
            } else {
                ValuatorMode::Relative
            },
            min: v.min.into(),
            max: v.max.into(),
        })
        .collect()
}

fn button(press: bool, e: xinput::ButtonPressEvent) -> HostEvent {
    HostEvent::Button {
        press,
        time: e.time,
        window: e.event,
        detail: e.detail,
        root_x: e.root_x,
        root_y: e.root_y,
    }
}

fn crossing(kind: MotionKind, seq: u64, e: xinput::EnterEvent) -> HostEvent {
    HostEvent::Motion {
        kind,
        seq,
        time: e.time,
        window: e.event,
        root_x: e.root_x,
        root_y: e.root_y,
    }
}

fn focus(focus_in: bool, e: xinput::EnterEvent) -> HostEvent {
    HostEvent::Focus {
        focus_in,
        window: e.event,
        mode: u8::from(e.mode),
        detail: u8::from(e.detail),
    }
}

fn key(press: bool, e: xinput::KeyPressEvent) -> HostEvent {
    HostEvent::Key {
        press,
        time: e.time,
        window: e.event,
        keycode: e.detail,
    }
}

fn raw_key(press: bool, e: xinput::RawKeyPressEvent) -> HostEvent {
    HostEvent::RawKey {
        press,
        time: e.time,
        keycode: e.detail,
    }
}

fn touch(phase: TouchPhase, e: xinput::TouchBeginEvent) -> HostEvent {
    HostEvent::Touch {
        phase,
        time: e.time,
        window: e.event,
        id: e.detail,
        root_x: e.root_x,
        root_y: e.root_y,
    }
}

/// Decode one wire event received with sequence number `seq`.
///
/// Events the dispatcher has no handler for are logged and dropped.
pub fn decode(event: Event, seq: u64) -> Option<HostEvent> {
    let decoded = match event {
        Event::XinputButtonPress(e) => button(true, e),
        Event::XinputButtonRelease(e) => button(false, e),
        Event::XinputMotion(e) => HostEvent::Motion {
            kind: MotionKind::Motion,
            seq,
            time: e.time,
            window: e.event,
            root_x: e.root_x,
            root_y: e.root_y,
        },
        Event::XinputEnter(e) => crossing(MotionKind::Enter, seq, e),
        Event::XinputLeave(e) => crossing(MotionKind::Leave, seq, e),
        Event::XinputFocusIn(e) => focus(true, e),
        Event::XinputFocusOut(e) => focus(false, e),
        Event::XinputKeyPress(e) => key(true, e),
        Event::XinputKeyRelease(e) => key(false, e),
        Event::XinputRawKeyPress(e) => raw_key(true, e),
        Event::XinputRawKeyRelease(e) => raw_key(false, e),
        Event::XinputRawMotion(e) => HostEvent::RawMotion {
            time: e.time,
            device: e.deviceid,
            valuator_mask: e.valuator_mask,
            values: e.axisvalues.into_iter().map(Fp3232::from).collect(),
        },
        Event::XinputDeviceChanged(e) => HostEvent::DeviceChanged {
            device: e.deviceid,
            valuators: valuators(&e.classes),
        },
        Event::XinputTouchBegin(e) => touch(TouchPhase::Begin, e),
        Event::XinputTouchUpdate(e) => touch(TouchPhase::Update, e),
        Event::XinputTouchEnd(e) => touch(TouchPhase::End, e),
        Event::XkbNewKeyboardNotify(e) => HostEvent::NewKeyboard {
            device: e.device_id,
        },
        Event::XkbMapNotify(_) => HostEvent::KeymapChanged,
        Event::XkbStateNotify(e) => HostEvent::KeyboardState {
            group: u8::from(e.group),
            locked_mods: u16::from(e.locked_mods),
        },
        Event::Error(e) => HostEvent::Error {
            code: e.error_code,
            seq,
            resource: e.bad_value,
            major: e.major_opcode,
            minor: e.minor_opcode,
        },
        other => {
            tracing::debug!(seq, event = ?other, "unhandled host event");
            return None;
        }
    };
    Some(decoded)
}
