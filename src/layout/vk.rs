//! Virtual-key codes and KBDTABLES flag bits.

pub const VK_CANCEL: u16 = 0x03;
pub const VK_BACK: u16 = 0x08;
pub const VK_TAB: u16 = 0x09;
pub const VK_CLEAR: u16 = 0x0c;
pub const VK_RETURN: u16 = 0x0d;
pub const VK_SHIFT: u16 = 0x10;
pub const VK_CONTROL: u16 = 0x11;
pub const VK_MENU: u16 = 0x12;
pub const VK_PAUSE: u16 = 0x13;
pub const VK_CAPITAL: u16 = 0x14;
pub const VK_ESCAPE: u16 = 0x1b;
pub const VK_SPACE: u16 = 0x20;
pub const VK_PRIOR: u16 = 0x21;
pub const VK_NEXT: u16 = 0x22;
pub const VK_END: u16 = 0x23;
pub const VK_HOME: u16 = 0x24;
pub const VK_LEFT: u16 = 0x25;
pub const VK_UP: u16 = 0x26;
pub const VK_RIGHT: u16 = 0x27;
pub const VK_DOWN: u16 = 0x28;
pub const VK_SNAPSHOT: u16 = 0x2c;
pub const VK_INSERT: u16 = 0x2d;
pub const VK_DELETE: u16 = 0x2e;
pub const VK_HELP: u16 = 0x2f;
pub const VK_LWIN: u16 = 0x5b;
pub const VK_RWIN: u16 = 0x5c;
pub const VK_APPS: u16 = 0x5d;
pub const VK_SLEEP: u16 = 0x5f;
pub const VK_NUMPAD0: u16 = 0x60;
pub const VK_NUMPAD1: u16 = 0x61;
pub const VK_NUMPAD2: u16 = 0x62;
pub const VK_NUMPAD3: u16 = 0x63;
pub const VK_NUMPAD4: u16 = 0x64;
pub const VK_NUMPAD5: u16 = 0x65;
pub const VK_NUMPAD6: u16 = 0x66;
pub const VK_NUMPAD7: u16 = 0x67;
pub const VK_NUMPAD8: u16 = 0x68;
pub const VK_NUMPAD9: u16 = 0x69;
pub const VK_MULTIPLY: u16 = 0x6a;
pub const VK_ADD: u16 = 0x6b;
pub const VK_SUBTRACT: u16 = 0x6d;
pub const VK_DECIMAL: u16 = 0x6e;
pub const VK_DIVIDE: u16 = 0x6f;
pub const VK_F1: u16 = 0x70;
pub const VK_F13: u16 = 0x7c;
pub const VK_F24: u16 = 0x87;
pub const VK_NUMLOCK: u16 = 0x90;
pub const VK_SCROLL: u16 = 0x91;
pub const VK_LSHIFT: u16 = 0xa0;
pub const VK_RSHIFT: u16 = 0xa1;
pub const VK_LCONTROL: u16 = 0xa2;
pub const VK_RCONTROL: u16 = 0xa3;
pub const VK_LMENU: u16 = 0xa4;
pub const VK_RMENU: u16 = 0xa5;
pub const VK_BROWSER_BACK: u16 = 0xa6;
pub const VK_BROWSER_FORWARD: u16 = 0xa7;
pub const VK_BROWSER_REFRESH: u16 = 0xa8;
pub const VK_BROWSER_STOP: u16 = 0xa9;
pub const VK_BROWSER_SEARCH: u16 = 0xaa;
pub const VK_BROWSER_FAVORITES: u16 = 0xab;
pub const VK_BROWSER_HOME: u16 = 0xac;
pub const VK_VOLUME_MUTE: u16 = 0xad;
pub const VK_VOLUME_DOWN: u16 = 0xae;
pub const VK_VOLUME_UP: u16 = 0xaf;
pub const VK_MEDIA_NEXT_TRACK: u16 = 0xb0;
pub const VK_MEDIA_PREV_TRACK: u16 = 0xb1;
pub const VK_MEDIA_STOP: u16 = 0xb2;
pub const VK_MEDIA_PLAY_PAUSE: u16 = 0xb3;
pub const VK_LAUNCH_MAIL: u16 = 0xb4;
pub const VK_LAUNCH_MEDIA_SELECT: u16 = 0xb5;
pub const VK_LAUNCH_APP1: u16 = 0xb6;
pub const VK_LAUNCH_APP2: u16 = 0xb7;
pub const VK_OEM_1: u16 = 0xba;
pub const VK_OEM_PLUS: u16 = 0xbb;
pub const VK_OEM_COMMA: u16 = 0xbc;
pub const VK_OEM_MINUS: u16 = 0xbd;
pub const VK_OEM_PERIOD: u16 = 0xbe;
pub const VK_OEM_2: u16 = 0xbf;
pub const VK_OEM_3: u16 = 0xc0;
pub const VK_ABNT_C1: u16 = 0xc1;
pub const VK_ABNT_C2: u16 = 0xc2;
pub const VK_OEM_4: u16 = 0xdb;
pub const VK_OEM_5: u16 = 0xdc;
pub const VK_OEM_6: u16 = 0xdd;
pub const VK_OEM_7: u16 = 0xde;
pub const VK_OEM_8: u16 = 0xdf;
pub const VK_OEM_102: u16 = 0xe2;
pub const VK_ICO_CLEAR: u16 = 0xe6;
pub const VK_OEM_RESET: u16 = 0xe9;
pub const VK_OEM_JUMP: u16 = 0xea;
pub const VK_OEM_PA1: u16 = 0xeb;
pub const VK_OEM_PA2: u16 = 0xec;
pub const VK_OEM_PA3: u16 = 0xed;
pub const VK_OEM_WSCTRL: u16 = 0xee;
pub const VK_OEM_FINISH: u16 = 0xf1;
pub const VK_OEM_AUTO: u16 = 0xf3;
pub const VK_OEM_BACKTAB: u16 = 0xf5;
pub const VK_EREOF: u16 = 0xf9;
pub const VK_ZOOM: u16 = 0xfb;
pub const VK_NONAME: u16 = 0xfc;
/// Scan code with no virtual key assigned.
pub const VK_NONE: u16 = 0xff;

// Flags carried in the high byte of scan-code table entries.
pub const KBDEXT: u16 = 0x100;
pub const KBDMULTIVK: u16 = 0x200;
pub const KBDSPECIAL: u16 = 0x400;
pub const KBDNUMPAD: u16 = 0x800;

// Modifier bits.
pub const KBDSHIFT: u8 = 0x01;
pub const KBDCTRL: u8 = 0x02;
pub const KBDALT: u8 = 0x04;

// VK_TO_WCHARS attributes.
pub const CAPLOK: u8 = 0x01;
pub const SGCAPS: u8 = 0x02;

pub const WCH_NONE: u16 = 0xf000;

pub const KLLF_ALTGR: u32 = 0x0001;

/// Numpad navigation keys and their Num Lock digit counterparts.
pub const NUMPAD_REMAP: [(u16, u16); 11] = [
    (VK_INSERT, VK_NUMPAD0),
    (VK_END, VK_NUMPAD1),
    (VK_DOWN, VK_NUMPAD2),
    (VK_NEXT, VK_NUMPAD3),
    (VK_LEFT, VK_NUMPAD4),
    (VK_CLEAR, VK_NUMPAD5),
    (VK_RIGHT, VK_NUMPAD6),
    (VK_HOME, VK_NUMPAD7),
    (VK_UP, VK_NUMPAD8),
    (VK_PRIOR, VK_NUMPAD9),
    (VK_DELETE, VK_DECIMAL),
];

/// Digit-style virtual key for a numpad-flagged navigation key.
pub fn numpad_digit(vkey: u16) -> Option<u16> {
    let base = vkey & 0xff;
    NUMPAD_REMAP
        .iter()
        .find(|(nav, _)| *nav == base)
        .map(|(_, digit)| *digit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numpad_remap_strips_flags() {
        assert_eq!(numpad_digit(VK_INSERT | KBDNUMPAD | KBDSPECIAL), Some(VK_NUMPAD0));
        assert_eq!(numpad_digit(VK_DELETE | KBDNUMPAD), Some(VK_DECIMAL));
        assert_eq!(numpad_digit(VK_PRIOR), Some(VK_NUMPAD9));
        assert_eq!(numpad_digit(VK_ADD), None);
    }
}
