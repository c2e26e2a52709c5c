//! Pointer input: buttons, motion, crossing and raw motion.

use super::HostConnection;
use super::event::MotionKind;
use super::fixed::{Fp3232, fp1616_round, fp3232_round, fp3232_scale};
use super::input::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValuatorMode {
    Relative,
    Absolute,
}

/// One XInput2 axis of the master pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Valuator {
    pub number: u16,
    pub mode: ValuatorMode,
    pub min: Fp3232,
    pub max: Fp3232,
}

/// The master pointer and its X/Y axes. A missing axis disables raw motion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointerDevice {
    pub id: u16,
    pub x: Option<Valuator>,
    pub y: Option<Valuator>,
}

impl PointerDevice {
    /// Axis 0 is X and axis 1 is Y.
    pub fn new(id: u16, valuators: &[Valuator]) -> Self {
        let axis = |n| valuators.iter().find(|v| v.number == n).copied();
        Self {
            id,
            x: axis(0),
            y: axis(1),
        }
    }
}

// Indexed by button number - 1.
const BUTTON_DOWN: [(u32, i32); 9] = [
    (MOUSEEVENTF_LEFTDOWN, 0),
    (MOUSEEVENTF_MIDDLEDOWN, 0),
    (MOUSEEVENTF_RIGHTDOWN, 0),
    (MOUSEEVENTF_WHEEL, WHEEL_DELTA),
    (MOUSEEVENTF_WHEEL, -WHEEL_DELTA),
    (MOUSEEVENTF_HWHEEL, -WHEEL_DELTA),
    (MOUSEEVENTF_HWHEEL, WHEEL_DELTA),
    (MOUSEEVENTF_XDOWN, XBUTTON1),
    (MOUSEEVENTF_XDOWN, XBUTTON2),
];

const BUTTON_UP: [(u32, i32); 9] = [
    (MOUSEEVENTF_LEFTUP, 0),
    (MOUSEEVENTF_MIDDLEUP, 0),
    (MOUSEEVENTF_RIGHTUP, 0),
    (0, 0),
    (0, 0),
    (0, 0),
    (0, 0),
    (MOUSEEVENTF_XUP, XBUTTON1),
    (MOUSEEVENTF_XUP, XBUTTON2),
];

/// `(flags, data)` for a 1-based button, or `None` if it maps to nothing.
pub fn button_flags(button: u32, press: bool) -> Option<(u32, i32)> {
    let table = if press { &BUTTON_DOWN } else { &BUTTON_UP };
    let index = usize::try_from(button.checked_sub(1)?).ok()?;
    table.get(index).copied().filter(|(flags, _)| *flags != 0)
}

/// Value of axis `number` from a mask and its packed values.
///
/// Values are stored only for set mask bits, in bit order.
pub fn valuator_value(mask: &[u32], values: &[Fp3232], number: u16) -> Option<Fp3232> {
    let mut next = values.iter();
    for (word_index, word) in mask.iter().enumerate() {
        for bit in 0..32 {
            if word & (1 << bit) == 0 {
                continue;
            }
            let value = next.next()?;
            if word_index * 32 + bit == number as usize {
                return Some(*value);
            }
        }
    }
    None
}

/// Translate raw valuator deltas into a mouse input.
pub fn raw_motion_input(
    device: &PointerDevice,
    mask: &[u32],
    values: &[Fp3232],
    time: u32,
) -> Option<HardwareInput> {
    let (x, y) = (device.x?, device.y?);
    let vx = valuator_value(mask, values, x.number);
    let vy = valuator_value(mask, values, y.number);
    if vx.is_none() && vy.is_none() {
        return None;
    }

    let absolute = x.mode == ValuatorMode::Absolute;
    let axis = |value: Option<Fp3232>, v: Valuator| match value {
        Some(value) if absolute => fp3232_scale(value, v.min, v.max, 0, 65535),
        Some(value) => fp3232_round(value),
        None => 0,
    };

    let mut flags = MOUSEEVENTF_MOVE;
    if absolute {
        flags |= MOUSEEVENTF_ABSOLUTE | MOUSEEVENTF_VIRTUALDESK;
    }
    Some(HardwareInput::Mouse {
        dx: axis(vx, x),
        dy: axis(vy, y),
        data: 0,
        flags,
        time,
    })
}

impl HostConnection {
    /// Root-window 16.16 position to virtual-screen pixels.
    pub(super) fn root_to_virtual(&self, root_x: i32, root_y: i32, screen: Rect) -> (i32, i32) {
        (
            fp1616_round(root_x) - screen.left,
            fp1616_round(root_y) - screen.top,
        )
    }

    pub(super) fn handle_button(
        &mut self,
        press: bool,
        time: u32,
        window: u32,
        detail: u32,
        (root_x, root_y): (i32, i32),
        sink: &mut dyn DesktopSink,
    ) {
        let Some(handle) = self.resolve_window(window, "button") else {
            return;
        };
        let Some((flags, data)) = button_flags(detail, press) else {
            tracing::trace!(detail, press, "ignoring button");
            return;
        };

        sink.queue_input(
            None,
            HardwareInput::Mouse {
                dx: 0,
                dy: 0,
                data,
                flags,
                time,
            },
        );

        let (x, y) = self.root_to_virtual(root_x, root_y, sink.virtual_screen());
        sink.queue_input(
            Some(handle),
            HardwareInput::Mouse {
                dx: x,
                dy: y,
                data,
                flags: flags | MOUSEEVENTF_ABSOLUTE,
                time,
            },
        );
    }

    pub(super) fn handle_motion(
        &mut self,
        kind: MotionKind,
        seq: u64,
        time: u32,
        window: u32,
        (root_x, root_y): (i32, i32),
        sink: &mut dyn DesktopSink,
    ) {
        if self.cursor.warp_seq == Some(seq) {
            tracing::trace!(seq, ?kind, "suppressing warp-induced motion");
            return;
        }
        let Some(handle) = self.resolve_window(window, "motion") else {
            return;
        };

        let (x, y) = self.root_to_virtual(root_x, root_y, sink.virtual_screen());
        sink.queue_input(
            Some(handle),
            HardwareInput::Mouse {
                dx: x,
                dy: y,
                data: 0,
                flags: MOUSEEVENTF_MOVE | MOUSEEVENTF_ABSOLUTE,
                time,
            },
        );
    }

    pub(super) fn handle_raw_motion(
        &mut self,
        device: u16,
        mask: &[u32],
        values: &[Fp3232],
        time: u32,
        sink: &mut dyn DesktopSink,
    ) {
        if self.pointer.x.is_none() || self.pointer.y.is_none() {
            tracing::trace!(device, "raw motion without valid valuators");
            return;
        }
        if let Some(input) = raw_motion_input(&self.pointer, mask, values, time) {
            sink.queue_input(None, input);
        }
    }

    pub(super) fn handle_device_changed(&mut self, device: u16, valuators: &[Valuator]) {
        if device != self.pointer.id {
            return;
        }
        self.pointer = PointerDevice::new(device, valuators);
        tracing::debug!(
            device,
            x = ?self.pointer.x,
            y = ?self.pointer.y,
            "pointer valuators changed"
        );
    }
}
