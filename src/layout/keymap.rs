//! Keymap queries the layout builder needs.
//!
//! [`KeymapSource`] is the seam between the builder and libxkbcommon.
//! [`XkbKeymap`] wraps a keymap compiled from the X server's core
//! keyboard device.

use xkbcommon::xkb;

pub trait KeymapSource {
    /// Inclusive range of valid keycodes.
    fn keycode_range(&self) -> (u32, u32);

    fn num_groups(&self) -> u32;

    /// Descriptive group name such as `"English (US)"`.
    fn group_description(&self, group: u32) -> Option<String>;

    /// Name of the level-one keysym bound to `keycode` in `group`.
    fn keysym_name(&self, keycode: u32, group: u32) -> Option<String>;

    /// Modifier mask for a modifier name, or 0 if the keymap lacks it.
    fn mod_mask(&self, name: &str) -> u32;

    /// Character produced by `keycode` in `group` with `mods` held.
    fn key_char(&mut self, keycode: u32, group: u32, mods: u32) -> Option<char>;
}

pub struct XkbKeymap {
    keymap: xkb::Keymap,
    state: xkb::State,
}

impl XkbKeymap {
    pub fn new(keymap: xkb::Keymap) -> Self {
        let state = xkb::State::new(&keymap);
        Self { keymap, state }
    }
}

impl KeymapSource for XkbKeymap {
    fn keycode_range(&self) -> (u32, u32) {
        (
            self.keymap.min_keycode().raw(),
            self.keymap.max_keycode().raw(),
        )
    }

    fn num_groups(&self) -> u32 {
        self.keymap.num_layouts()
    }

    fn group_description(&self, group: u32) -> Option<String> {
        let name = self.keymap.layout_get_name(group);
        (!name.is_empty()).then(|| name.to_owned())
    }

    fn keysym_name(&self, keycode: u32, group: u32) -> Option<String> {
        let syms = self
            .keymap
            .key_get_syms_by_level(xkb::Keycode::new(keycode), group, 0);
        let sym = *syms.first()?;
        let name = xkb::keysym_get_name(sym);
        (!name.is_empty()).then_some(name)
    }

    fn mod_mask(&self, name: &str) -> u32 {
        match self.keymap.mod_get_index(name) {
            xkb::MOD_INVALID => 0,
            index if index < 32 => 1 << index,
            _ => 0,
        }
    }

    fn key_char(&mut self, keycode: u32, group: u32, mods: u32) -> Option<char> {
        self.state.update_mask(mods, 0, 0, 0, 0, group);
        let ch = self.state.key_get_utf32(xkb::Keycode::new(keycode));
        char::from_u32(ch).filter(|c| *c != '\0')
    }
}
