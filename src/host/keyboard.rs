//! Keyboard input, focus tracking and XKB state.

use super::HostConnection;
use super::input::*;
use crate::layout::scan::key2scan;
use crate::layout::vk::{KBDNUMPAD, VK_NONAME, numpad_digit};

/// X focus detail values at or above this concern the pointer.
const NOTIFY_POINTER: u8 = 5;
const NOTIFY_GRAB: u8 = 1;
const NOTIFY_UNGRAB: u8 = 2;

const SCAN_RIGHT_ALT: u16 = 0x138;
const SCAN_RIGHT_CTRL: u16 = 0x11d;

#[derive(Debug, Default)]
pub(super) struct KeyboardState {
    pub(super) device: u8,
    /// Keyboard currently grabbed by the window manager.
    pub(super) grabbed: bool,
    /// X window holding keyboard focus.
    pub(super) focus: Option<u32>,
    pub(super) group: u32,
    pub(super) locked_mods: u32,
    pub(super) lock: LockState,
    pub(super) last_hkl: Option<u32>,
}

impl HostConnection {
    /// Keyboard input for one scan code, `None` when it has no virtual key.
    fn scan_input(&self, scan: u16, press: bool, time: u32) -> Option<HardwareInput> {
        let mut vk = match self.layouts.active() {
            Some(layout) => layout.scan2vk().get(scan as usize).copied().unwrap_or(0),
            None => VK_NONAME,
        };
        if vk == 0 {
            tracing::trace!(scan = format_args!("0x{scan:x}"), "no virtual key for scan code");
            return None;
        }
        if self.keyboard.lock.num && vk & KBDNUMPAD != 0 {
            if let Some(digit) = numpad_digit(vk) {
                vk = digit;
            }
        }

        let mut flags = 0;
        if scan & 0x300 != 0 {
            flags |= KEYEVENTF_EXTENDEDKEY;
        }
        if !press {
            flags |= KEYEVENTF_KEYUP;
        }
        Some(HardwareInput::Keyboard {
            vk: vk & 0xff,
            scan: scan & 0xff,
            flags,
            time,
        })
    }

    /// Inputs for an X keycode, in delivery order.
    ///
    /// Right Alt is sent as Right Ctrl plus Right Alt.
    pub(super) fn key_inputs(&self, keycode: u32, press: bool, time: u32) -> Vec<HardwareInput> {
        let scan = key2scan(keycode);
        let Some(key) = self.scan_input(scan, press, time) else {
            return Vec::new();
        };
        if scan != SCAN_RIGHT_ALT {
            return vec![key];
        }
        match self.scan_input(SCAN_RIGHT_CTRL, press, time) {
            Some(ctrl) if press => vec![ctrl, key],
            Some(ctrl) => vec![key, ctrl],
            None => vec![key],
        }
    }

    pub(super) fn handle_key(
        &mut self,
        press: bool,
        time: u32,
        window: u32,
        keycode: u32,
        sink: &mut dyn DesktopSink,
    ) {
        let Some(handle) = self.resolve_window(window, "key") else {
            return;
        };
        for input in self.key_inputs(keycode, press, time) {
            sink.queue_input(Some(handle), input);
        }
    }

    pub(super) fn handle_raw_key(
        &mut self,
        press: bool,
        time: u32,
        keycode: u32,
        sink: &mut dyn DesktopSink,
    ) {
        for input in self.key_inputs(keycode, press, time) {
            sink.queue_input(None, input);
        }
        tracing::trace!(keycode, press, "global keystate not updated for raw key");
    }

    pub(super) fn handle_focus(
        &mut self,
        focus_in: bool,
        window: u32,
        mode: u8,
        detail: u8,
        sink: &mut dyn DesktopSink,
    ) {
        if detail >= NOTIFY_POINTER {
            return;
        }
        match mode {
            NOTIFY_GRAB => {
                self.keyboard.grabbed = true;
                return;
            }
            NOTIFY_UNGRAB => {
                self.keyboard.grabbed = false;
                return;
            }
            _ => {}
        }

        if !focus_in {
            if self.keyboard.focus == Some(window) {
                self.keyboard.focus = None;
            }
            return;
        }

        if self.resolve_window(window, "focus").is_none() {
            return;
        }
        tracing::debug!(window = format_args!("0x{window:x}"), "keyboard focus in");
        self.keyboard.focus = Some(window);
        sink.update_lock_state(self.keyboard.lock);
        self.notify_lang_change(sink);
    }

    /// Post a language change to the focused window if the HKL moved.
    fn notify_lang_change(&mut self, sink: &mut dyn DesktopSink) {
        let Some(hkl) = self.layouts.active().map(|l| l.hkl()) else {
            return;
        };
        let Some(handle) = self.keyboard.focus.and_then(|w| self.windows.lookup(w)) else {
            return;
        };
        if self.keyboard.last_hkl == Some(hkl) {
            return;
        }
        self.keyboard.last_hkl = Some(hkl);
        sink.post_input_lang_change(handle, hkl);
    }

    /// Recompute Caps/Num Lock from locked modifiers.
    ///
    /// Returns `true` if the state changed.
    pub(super) fn apply_locked_mods(&mut self, locked_mods: u32) -> bool {
        let masks = self.layouts.masks();
        self.keyboard.locked_mods = locked_mods;
        let lock = LockState {
            caps: locked_mods & masks.caps != 0,
            num: locked_mods & masks.num != 0,
        };
        let changed = lock != self.keyboard.lock;
        self.keyboard.lock = lock;
        changed
    }

    /// Rebuild the layout records from the server's current keymap.
    pub(super) fn rebuild_layouts(&mut self) -> Result<(), super::HostError> {
        let rules = match self.backend.rules_names() {
            Ok(rules) => rules,
            Err(e) => {
                tracing::debug!(error = %e, "no rules names, using keymap descriptions");
                Default::default()
            }
        };
        let result = self
            .backend
            .keymap(self.keyboard.device)
            .and_then(|mut keymap| Ok(self.layouts.rebuild(keymap.as_mut(), &rules)?));
        if let Err(e) = result {
            self.layouts.clear();
            return Err(e);
        }
        self.layouts.set_active_group(self.keyboard.group);
        Ok(())
    }

    fn refresh_layouts(&mut self, sink: &mut dyn DesktopSink) {
        if let Err(e) = self.rebuild_layouts() {
            tracing::error!(display = %self.display, error = %e, "keyboard layout rebuild failed");
            return;
        }
        let locked = self.keyboard.locked_mods;
        if self.apply_locked_mods(locked) {
            sink.update_lock_state(self.keyboard.lock);
        }
        self.notify_lang_change(sink);
    }

    pub(super) fn handle_new_keyboard(&mut self, device: u8, sink: &mut dyn DesktopSink) {
        tracing::debug!(device, "new core keyboard");
        self.keyboard.device = device;
        self.refresh_layouts(sink);
    }

    pub(super) fn handle_keymap_changed(&mut self, sink: &mut dyn DesktopSink) {
        tracing::debug!(display = %self.display, "keymap changed");
        self.refresh_layouts(sink);
    }

    pub(super) fn handle_keyboard_state(
        &mut self,
        group: u32,
        locked_mods: u32,
        sink: &mut dyn DesktopSink,
    ) {
        if group != self.keyboard.group || self.layouts.active().is_none() {
            self.keyboard.group = group;
            if self.layouts.set_active_group(group).is_some() {
                self.notify_lang_change(sink);
            }
        }
        if self.apply_locked_mods(locked_mods) {
            sink.update_lock_state(self.keyboard.lock);
        }
    }

    pub fn lock_state(&self) -> LockState {
        self.keyboard.lock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::event::HostEvent;
    use crate::host::input::recording::{RecordingSink, SinkCall};
    use crate::host::test_support::{connected, connected_with, screen};
    use crate::host::windows::WindowHandle;
    use crate::layout::keymap::fake::{FakeGroup, FakeKeymap, LOCK, MOD2};
    use crate::layout::vk::*;

    // X keycodes.
    const KEY_A: u32 = 38;
    const KEY_Q: u32 = 24;
    const KEY_RALT: u32 = 108;
    const KEY_KP_HOME: u32 = 79;
    const KEY_HOME: u32 = 110;

    const WINDOW: u32 = 0x500;
    const HANDLE: WindowHandle = WindowHandle(77);

    fn key(press: bool, keycode: u32) -> HostEvent {
        HostEvent::Key {
            press,
            time: 9,
            window: WINDOW,
            keycode,
        }
    }

    fn kb(vk: u16, scan: u16, flags: u32) -> HardwareInput {
        HardwareInput::Keyboard {
            vk,
            scan,
            flags,
            time: 9,
        }
    }

    fn focus_in() -> HostEvent {
        HostEvent::Focus {
            focus_in: true,
            window: WINDOW,
            mode: 0,
            detail: 3,
        }
    }

    #[test]
    fn qwerty_a_press_maps_to_vk_a() {
        let (mut host, _log) = connected();
        host.start_input(WINDOW, HANDLE).unwrap();
        let mut sink = RecordingSink::new(screen());

        host.dispatch(key(true, KEY_A), &mut sink);
        assert_eq!(sink.inputs(), vec![(Some(HANDLE), kb(0x41, 0x1e, 0))]);
    }

    #[test]
    fn release_sets_keyup() {
        let (mut host, _log) = connected();
        host.start_input(WINDOW, HANDLE).unwrap();
        let mut sink = RecordingSink::new(screen());

        host.dispatch(key(false, KEY_A), &mut sink);
        assert_eq!(sink.inputs(), vec![(Some(HANDLE), kb(0x41, 0x1e, KEYEVENTF_KEYUP))]);
    }

    #[test]
    fn unregistered_window_drops_key() {
        let (mut host, _log) = connected();
        let mut sink = RecordingSink::new(screen());
        host.dispatch(key(true, KEY_A), &mut sink);
        assert!(sink.calls.is_empty());
    }

    #[test]
    fn right_alt_is_wrapped_in_right_ctrl() {
        let (mut host, _log) = connected();
        host.start_input(WINDOW, HANDLE).unwrap();
        let mut sink = RecordingSink::new(screen());

        host.dispatch(key(true, KEY_RALT), &mut sink);
        host.dispatch(key(false, KEY_RALT), &mut sink);

        let ext = KEYEVENTF_EXTENDEDKEY;
        let up = KEYEVENTF_KEYUP;
        let vks: Vec<HardwareInput> = sink.inputs().into_iter().map(|(_, i)| i).collect();
        assert_eq!(
            vks,
            vec![
                kb(VK_RCONTROL, 0x1d, ext),
                kb(VK_RMENU, 0x38, ext),
                kb(VK_RMENU, 0x38, ext | up),
                kb(VK_RCONTROL, 0x1d, ext | up),
            ]
        );
    }

    #[test]
    fn azerty_layout_remaps_letters() {
        let keymap = FakeKeymap::new(vec![FakeGroup::french()]);
        let (mut host, _log) = connected_with(|b| b.keymap = keymap);
        host.start_input(WINDOW, HANDLE).unwrap();
        let mut sink = RecordingSink::new(screen());

        host.dispatch(key(true, KEY_Q), &mut sink);
        assert_eq!(sink.inputs(), vec![(Some(HANDLE), kb(b'A' as u16, 0x10, 0))]);
    }

    #[test]
    fn num_lock_remaps_numpad_navigation() {
        let (mut host, _log) = connected();
        host.start_input(WINDOW, HANDLE).unwrap();
        let mut sink = RecordingSink::new(screen());

        host.dispatch(key(true, KEY_KP_HOME), &mut sink);
        host.dispatch(
            HostEvent::KeyboardState {
                group: 0,
                locked_mods: MOD2 as u16,
            },
            &mut sink,
        );
        host.dispatch(key(true, KEY_KP_HOME), &mut sink);
        // Extended Home is not numpad-flagged.
        host.dispatch(key(true, KEY_HOME), &mut sink);

        let vks: Vec<u16> = sink
            .inputs()
            .into_iter()
            .map(|(_, i)| match i {
                HardwareInput::Keyboard { vk, .. } => vk,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(vks, vec![VK_HOME, VK_NUMPAD7, VK_HOME]);
    }

    #[test]
    fn no_active_layout_sends_noname() {
        let (mut host, _log) = connected();
        host.start_input(WINDOW, HANDLE).unwrap();
        host.layouts.clear();
        let mut sink = RecordingSink::new(screen());

        host.dispatch(key(true, KEY_A), &mut sink);
        assert_eq!(sink.inputs(), vec![(Some(HANDLE), kb(VK_NONAME, 0x1e, 0))]);
    }

    #[test]
    fn raw_key_has_no_window() {
        let (mut host, _log) = connected();
        let mut sink = RecordingSink::new(screen());
        host.dispatch(
            HostEvent::RawKey {
                press: true,
                time: 9,
                keycode: KEY_A,
            },
            &mut sink,
        );
        assert_eq!(sink.inputs(), vec![(None, kb(0x41, 0x1e, 0))]);
    }

    #[test]
    fn focus_in_pushes_lock_state_and_language_once() {
        let (mut host, _log) = connected();
        host.start_input(WINDOW, HANDLE).unwrap();
        let hkl = host.layouts.active().unwrap().hkl();
        let mut sink = RecordingSink::new(screen());

        host.dispatch(focus_in(), &mut sink);
        host.dispatch(focus_in(), &mut sink);
        assert_eq!(
            sink.take(),
            vec![
                SinkCall::Lock(LockState::default()),
                SinkCall::LangChange(HANDLE, hkl),
                SinkCall::Lock(LockState::default()),
            ]
        );
        assert_eq!(host.keyboard.focus, Some(WINDOW));
    }

    #[test]
    fn grab_transitions_do_not_move_focus() {
        let (mut host, _log) = connected();
        host.start_input(WINDOW, HANDLE).unwrap();
        let mut sink = RecordingSink::new(screen());

        let grab = |focus_in, mode| HostEvent::Focus {
            focus_in,
            window: WINDOW,
            mode,
            detail: 3,
        };
        host.dispatch(grab(true, NOTIFY_GRAB), &mut sink);
        assert!(host.keyboard.grabbed);
        assert_eq!(host.keyboard.focus, None);

        host.dispatch(focus_in(), &mut sink);
        host.dispatch(grab(false, NOTIFY_UNGRAB), &mut sink);
        assert!(!host.keyboard.grabbed);
        assert_eq!(host.keyboard.focus, Some(WINDOW));

        host.dispatch(grab(false, 0), &mut sink);
        assert_eq!(host.keyboard.focus, None);
    }

    #[test]
    fn pointer_focus_details_are_ignored() {
        let (mut host, _log) = connected();
        host.start_input(WINDOW, HANDLE).unwrap();
        let mut sink = RecordingSink::new(screen());
        host.dispatch(
            HostEvent::Focus {
                focus_in: true,
                window: WINDOW,
                mode: 0,
                detail: NOTIFY_POINTER,
            },
            &mut sink,
        );
        assert!(sink.calls.is_empty());
        assert_eq!(host.keyboard.focus, None);
    }

    #[test]
    fn lock_state_pushed_only_on_change() {
        let (mut host, _log) = connected();
        let mut sink = RecordingSink::new(screen());
        let state = |locked_mods| HostEvent::KeyboardState {
            group: 0,
            locked_mods,
        };

        host.dispatch(state(LOCK as u16), &mut sink);
        host.dispatch(state(LOCK as u16), &mut sink);
        host.dispatch(state((LOCK | MOD2) as u16), &mut sink);
        assert_eq!(
            sink.take(),
            vec![
                SinkCall::Lock(LockState {
                    caps: true,
                    num: false
                }),
                SinkCall::Lock(LockState {
                    caps: true,
                    num: true
                }),
            ]
        );
    }

    #[test]
    fn group_switch_posts_language_change_to_focus() {
        let keymap = FakeKeymap::new(vec![FakeGroup::us(), FakeGroup::german()]);
        let (mut host, _log) = connected_with(|b| b.keymap = keymap);
        host.start_input(WINDOW, HANDLE).unwrap();
        let mut sink = RecordingSink::new(screen());
        host.dispatch(focus_in(), &mut sink);
        sink.take();

        host.dispatch(
            HostEvent::KeyboardState {
                group: 1,
                locked_mods: 0,
            },
            &mut sink,
        );
        let german = host.layouts.active().unwrap();
        assert_eq!(german.group, 1);
        assert_eq!(sink.take(), vec![SinkCall::LangChange(HANDLE, german.hkl())]);

        // Qwertz: the Z key position now yields Y.
        sink.take();
        host.dispatch(key(true, 29), &mut sink);
        assert_eq!(sink.inputs(), vec![(Some(HANDLE), kb(b'Z' as u16, 0x15, 0))]);
    }

    #[test]
    fn keymap_change_rebuilds_tables() {
        let (mut host, _log) = connected();
        assert_eq!(host.layouts.len(), 1);
        let mut sink = RecordingSink::new(screen());

        host.dispatch(HostEvent::KeymapChanged, &mut sink);
        assert_eq!(host.layouts.len(), 1);
        assert!(host.layouts.active().is_some());
    }

    #[test]
    fn new_keyboard_updates_device() {
        let (mut host, _log) = connected();
        let mut sink = RecordingSink::new(screen());
        host.dispatch(HostEvent::NewKeyboard { device: 9 }, &mut sink);
        assert_eq!(host.keyboard.device, 9);
        assert!(host.layouts.active().is_some());
    }
}
