//! Hardware input model and the desktop sink it is delivered to.

use serde::{Deserialize, Serialize};

use super::windows::WindowHandle;

pub const MOUSEEVENTF_MOVE: u32 = 0x0001;
pub const MOUSEEVENTF_LEFTDOWN: u32 = 0x0002;
pub const MOUSEEVENTF_LEFTUP: u32 = 0x0004;
pub const MOUSEEVENTF_RIGHTDOWN: u32 = 0x0008;
pub const MOUSEEVENTF_RIGHTUP: u32 = 0x0010;
pub const MOUSEEVENTF_MIDDLEDOWN: u32 = 0x0020;
pub const MOUSEEVENTF_MIDDLEUP: u32 = 0x0040;
pub const MOUSEEVENTF_XDOWN: u32 = 0x0080;
pub const MOUSEEVENTF_XUP: u32 = 0x0100;
pub const MOUSEEVENTF_WHEEL: u32 = 0x0800;
pub const MOUSEEVENTF_HWHEEL: u32 = 0x1000;
pub const MOUSEEVENTF_VIRTUALDESK: u32 = 0x4000;
pub const MOUSEEVENTF_ABSOLUTE: u32 = 0x8000;

pub const XBUTTON1: i32 = 0x0001;
pub const XBUTTON2: i32 = 0x0002;
pub const WHEEL_DELTA: i32 = 120;

pub const KEYEVENTF_EXTENDEDKEY: u32 = 0x0001;
pub const KEYEVENTF_KEYUP: u32 = 0x0002;

pub const POINTER_FLAG_NEW: u32 = 0x0001;
pub const POINTER_FLAG_INRANGE: u32 = 0x0002;
pub const POINTER_FLAG_INCONTACT: u32 = 0x0004;
pub const POINTER_FLAG_DOWN: u32 = 0x0001_0000;
pub const POINTER_FLAG_UPDATE: u32 = 0x0002_0000;
pub const POINTER_FLAG_UP: u32 = 0x0004_0000;

/// Normalized input handed to the desktop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HardwareInput {
    Mouse {
        dx: i32,
        dy: i32,
        data: i32,
        flags: u32,
        time: u32,
    },
    Keyboard {
        vk: u16,
        scan: u16,
        flags: u32,
        time: u32,
    },
    Touch {
        x: i32,
        y: i32,
        id: u32,
        flags: u32,
        time: u32,
    },
}

/// Desktop-space rectangle, right and bottom exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    /// In `i64`: client edges may span the whole `i32` range.
    pub fn width(&self) -> i64 {
        i64::from(self.right) - i64::from(self.left)
    }

    pub fn height(&self) -> i64 {
        i64::from(self.bottom) - i64::from(self.top)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockState {
    pub caps: bool,
    pub num: bool,
}

/// Receives everything a host connection produces.
pub trait DesktopSink {
    /// The virtual screen, used to translate root coordinates.
    fn virtual_screen(&self) -> Rect;

    /// Queue hardware input; `None` targets no window.
    fn queue_input(&mut self, window: Option<WindowHandle>, input: HardwareInput);

    fn post_input_lang_change(&mut self, window: WindowHandle, hkl: u32);

    /// Lock keys changed for every process sharing the connection.
    fn update_lock_state(&mut self, state: LockState);
}

/// Sink that records every call, for handler tests.
#[cfg(test)]
pub mod recording {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum SinkCall {
        Input(Option<WindowHandle>, HardwareInput),
        LangChange(WindowHandle, u32),
        Lock(LockState),
    }

    #[derive(Debug)]
    pub struct RecordingSink {
        pub screen: Rect,
        pub calls: Vec<SinkCall>,
    }

    impl RecordingSink {
        pub fn new(screen: Rect) -> Self {
            Self {
                screen,
                calls: Vec::new(),
            }
        }

        pub fn inputs(&self) -> Vec<(Option<WindowHandle>, HardwareInput)> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    SinkCall::Input(w, i) => Some((*w, *i)),
                    _ => None,
                })
                .collect()
        }

        pub fn take(&mut self) -> Vec<SinkCall> {
            std::mem::take(&mut self.calls)
        }
    }

    impl DesktopSink for RecordingSink {
        fn virtual_screen(&self) -> Rect {
            self.screen
        }

        fn queue_input(&mut self, window: Option<WindowHandle>, input: HardwareInput) {
            self.calls.push(SinkCall::Input(window, input));
        }

        fn post_input_lang_change(&mut self, window: WindowHandle, hkl: u32) {
            self.calls.push(SinkCall::LangChange(window, hkl));
        }

        fn update_lock_state(&mut self, state: LockState) {
            self.calls.push(SinkCall::Lock(state));
        }
    }
}
