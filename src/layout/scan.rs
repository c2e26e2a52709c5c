//! X keycode to scan code translation and the scan code to virtual-key tables.
//!
//! Scan codes use the low byte for the base code; bit 0x100 marks the
//! `E0` extended range and bit 0x200 the `E1` range. The tables are
//! indexed by the full scan code and hold the virtual key in the low byte
//! and KBD* flags in the high byte.

use super::vk::*;

pub const SCAN_TABLE_LEN: usize = 0x280;

pub type ScanTable = [u16; SCAN_TABLE_LEN];

/// Offset between X keycodes and evdev key codes.
const EVDEV_OFFSET: u32 = 8;
const KEY_KPDOT: u32 = 83;

/// Translate an X keycode into a scan code.
///
/// Base evdev codes map straight through; known extra keys get their
/// documented scan codes and everything else lands in a made-up `E1`
/// code.
pub fn key2scan(keycode: u32) -> u16 {
    let key = keycode.wrapping_sub(EVDEV_OFFSET);
    if key <= KEY_KPDOT {
        return key as u16;
    }

    match key {
        84 => 0x005a,  // ISO_Level3_Shift
        86 => 0x0056,  // KEY_102ND
        87 => 0x0057,  // KEY_F11
        88 => 0x0058,  // KEY_F12
        96 => 0x011c,  // KEY_KPENTER
        97 => 0x011d,  // KEY_RIGHTCTRL
        98 => 0x0135,  // KEY_KPSLASH
        99 => 0x0054,  // KEY_SYSRQ
        100 => 0x0138, // KEY_RIGHTALT
        101 => 0x0059, // KEY_LINEFEED
        102 => 0x0147, // KEY_HOME
        103 => 0x0148, // KEY_UP
        104 => 0x0149, // KEY_PAGEUP
        105 => 0x014b, // KEY_LEFT
        106 => 0x014d, // KEY_RIGHT
        107 => 0x014f, // KEY_END
        108 => 0x0150, // KEY_DOWN
        109 => 0x0151, // KEY_PAGEDOWN
        110 => 0x0152, // KEY_INSERT
        111 => 0x0153, // KEY_DELETE
        113 => 0x0120, // KEY_MUTE
        114 => 0x012e, // KEY_VOLUMEDOWN
        115 => 0x0130, // KEY_VOLUMEUP
        116 => 0x015e, // KEY_POWER
        118 => 0x007b, // KEY_KPPLUSMINUS
        119 => 0x021d, // KEY_PAUSE
        120 => 0x0062, // KEY_SCALE
        125 => 0x015b, // KEY_LEFTMETA
        126 => 0x015c, // KEY_RIGHTMETA
        127 => 0x005f, // KEY_COMPOSE
        128 => 0x0168, // KEY_STOP
        134 => 0x005c, // KEY_OPEN
        136 => 0x0165, // KEY_FIND
        138 => 0x0063, // KEY_HELP
        139 => 0x015d, // KEY_MENU
        142 => 0x015f, // KEY_SLEEP
        148 => 0x016b, // KEY_PROG1
        149 => 0x0121, // KEY_PROG2
        155 => 0x016c, // KEY_MAIL
        156 => 0x0166, // KEY_BOOKMARKS
        157 => 0x0071, // KEY_COMPUTER
        158 => 0x016a, // KEY_BACK
        159 => 0x0169, // KEY_FORWARD
        163 => 0x0119, // KEY_NEXTSONG
        164 => 0x0122, // KEY_PLAYPAUSE
        165 => 0x0110, // KEY_PREVIOUSSONG
        166 => 0x0124, // KEY_STOPCD
        172 => 0x0132, // KEY_HOMEPAGE
        173 => 0x0167, // KEY_REFRESH
        174 => 0x005b, // KEY_EXIT
        183..=193 => 0x0064 + (key - 183) as u16, // KEY_F13..KEY_F23
        194 => 0x0076, // KEY_F24
        210 => 0x0137, // KEY_PRINT
        223 => 0x0146, // KEY_CANCEL
        226 => 0x016d, // KEY_MEDIA
        _ => 0x0200 | (key & 0x7f) as u16,
    }
}

/// Which base table a layout uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanLayout {
    Qwerty,
    Azerty,
    Qwertz,
    Dvorak,
}

impl ScanLayout {
    pub fn table(self) -> &'static ScanTable {
        match self {
            Self::Qwerty => &QWERTY,
            Self::Azerty => &AZERTY,
            Self::Qwertz => &QWERTZ,
            Self::Dvorak => &DVORAK,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Qwerty => "qwerty",
            Self::Azerty => "azerty",
            Self::Qwertz => "qwertz",
            Self::Dvorak => "dvorak",
        }
    }
}

const fn chars(t: &mut ScanTable, start: usize, keys: &[u8]) {
    let mut i = 0;
    while i < keys.len() {
        t[start + i] = keys[i] as u16;
        i += 1;
    }
}

const fn qwerty() -> ScanTable {
    let mut t = [0u16; SCAN_TABLE_LEN];

    t[0x00] = VK_NONE;
    t[0x01] = VK_ESCAPE;
    chars(&mut t, 0x02, b"1234567890");
    t[0x0c] = VK_OEM_MINUS;
    t[0x0d] = VK_OEM_PLUS;
    t[0x0e] = VK_BACK;
    t[0x0f] = VK_TAB;
    chars(&mut t, 0x10, b"QWERTYUIOP");
    t[0x1a] = VK_OEM_4;
    t[0x1b] = VK_OEM_6;
    t[0x1c] = VK_RETURN;
    t[0x1d] = VK_LCONTROL;
    chars(&mut t, 0x1e, b"ASDFGHJKL");
    t[0x27] = VK_OEM_1;
    t[0x28] = VK_OEM_7;
    t[0x29] = VK_OEM_3;
    t[0x2a] = VK_LSHIFT;
    t[0x2b] = VK_OEM_5;
    chars(&mut t, 0x2c, b"ZXCVBNM");
    t[0x33] = VK_OEM_COMMA;
    t[0x34] = VK_OEM_PERIOD;
    t[0x35] = VK_OEM_2;

    // Shared tail, identical in every layout.
    t[0x36] = VK_RSHIFT | KBDEXT;
    t[0x37] = VK_MULTIPLY | KBDMULTIVK;
    t[0x38] = VK_LMENU;
    t[0x39] = VK_SPACE;
    t[0x3a] = VK_CAPITAL;
    let mut f = 0;
    while f < 10 {
        t[0x3b + f] = VK_F1 + f as u16;
        f += 1;
    }
    t[0x45] = VK_NUMLOCK | KBDEXT | KBDMULTIVK;
    t[0x46] = VK_SCROLL | KBDMULTIVK;
    t[0x47] = VK_HOME | KBDNUMPAD | KBDSPECIAL;
    t[0x48] = VK_UP | KBDNUMPAD | KBDSPECIAL;
    t[0x49] = VK_PRIOR | KBDNUMPAD | KBDSPECIAL;
    t[0x4a] = VK_SUBTRACT;
    t[0x4b] = VK_LEFT | KBDNUMPAD | KBDSPECIAL;
    t[0x4c] = VK_CLEAR | KBDNUMPAD | KBDSPECIAL;
    t[0x4d] = VK_RIGHT | KBDNUMPAD | KBDSPECIAL;
    t[0x4e] = VK_ADD;
    t[0x4f] = VK_END | KBDNUMPAD | KBDSPECIAL;
    t[0x50] = VK_DOWN | KBDNUMPAD | KBDSPECIAL;
    t[0x51] = VK_NEXT | KBDNUMPAD | KBDSPECIAL;
    t[0x52] = VK_INSERT | KBDNUMPAD | KBDSPECIAL;
    t[0x53] = VK_DELETE | KBDNUMPAD | KBDSPECIAL;
    t[0x54] = VK_SNAPSHOT;
    t[0x55] = VK_NONE;
    t[0x56] = VK_OEM_102;
    t[0x57] = VK_F1 + 10;
    t[0x58] = VK_F1 + 11;
    t[0x59] = VK_CLEAR;
    t[0x5a] = VK_OEM_WSCTRL;
    t[0x5b] = VK_OEM_FINISH;
    t[0x5c] = VK_OEM_JUMP;
    t[0x5d] = VK_EREOF;
    t[0x5e] = VK_OEM_BACKTAB;
    t[0x5f] = VK_OEM_AUTO;
    t[0x60] = VK_NONE;
    t[0x61] = VK_NONE;
    t[0x62] = VK_ZOOM;
    t[0x63] = VK_HELP;
    let mut f = 0;
    while f < 11 {
        t[0x64 + f] = VK_F13 + f as u16;
        f += 1;
    }
    t[0x6f] = VK_OEM_PA3;
    t[0x70] = VK_NONE;
    t[0x71] = VK_OEM_RESET;
    t[0x72] = VK_NONE;
    t[0x73] = VK_ABNT_C1;
    t[0x74] = VK_NONE;
    t[0x75] = VK_NONE;
    t[0x76] = VK_F24;
    t[0x77] = VK_NONE;
    t[0x78] = VK_NONE;
    t[0x79] = VK_NONE;
    t[0x7a] = VK_NONE;
    t[0x7b] = VK_OEM_PA1;
    t[0x7c] = VK_TAB;
    t[0x7d] = VK_NONE;
    t[0x7e] = VK_ABNT_C2;

    t[0x110] = VK_MEDIA_PREV_TRACK | KBDEXT;
    t[0x119] = VK_MEDIA_NEXT_TRACK | KBDEXT;
    t[0x11c] = VK_RETURN | KBDEXT;
    t[0x11d] = VK_RCONTROL | KBDEXT;
    t[0x120] = VK_VOLUME_MUTE | KBDEXT;
    t[0x121] = VK_LAUNCH_APP2 | KBDEXT;
    t[0x122] = VK_MEDIA_PLAY_PAUSE | KBDEXT;
    t[0x124] = VK_MEDIA_STOP | KBDEXT;
    t[0x12e] = VK_VOLUME_DOWN | KBDEXT;
    t[0x130] = VK_VOLUME_UP | KBDEXT;
    t[0x132] = VK_BROWSER_HOME | KBDEXT;
    t[0x135] = VK_DIVIDE | KBDEXT;
    t[0x137] = VK_SNAPSHOT | KBDEXT;
    t[0x138] = VK_RMENU | KBDEXT;
    t[0x146] = VK_CANCEL | KBDEXT;
    t[0x147] = VK_HOME | KBDEXT;
    t[0x148] = VK_UP | KBDEXT;
    t[0x149] = VK_PRIOR | KBDEXT;
    t[0x14b] = VK_LEFT | KBDEXT;
    t[0x14d] = VK_RIGHT | KBDEXT;
    t[0x14f] = VK_END | KBDEXT;
    t[0x150] = VK_DOWN | KBDEXT;
    t[0x151] = VK_NEXT | KBDEXT;
    t[0x152] = VK_INSERT | KBDEXT;
    t[0x153] = VK_DELETE | KBDEXT;
    t[0x15b] = VK_LWIN | KBDEXT;
    t[0x15c] = VK_RWIN | KBDEXT;
    t[0x15d] = VK_APPS | KBDEXT;
    t[0x15f] = VK_SLEEP | KBDEXT;
    t[0x165] = VK_BROWSER_SEARCH | KBDEXT;
    t[0x166] = VK_BROWSER_FAVORITES | KBDEXT;
    t[0x167] = VK_BROWSER_REFRESH | KBDEXT;
    t[0x168] = VK_BROWSER_STOP | KBDEXT;
    t[0x169] = VK_BROWSER_FORWARD | KBDEXT;
    t[0x16a] = VK_BROWSER_BACK | KBDEXT;
    t[0x16b] = VK_LAUNCH_APP1 | KBDEXT;
    t[0x16c] = VK_LAUNCH_MAIL | KBDEXT;
    t[0x16d] = VK_LAUNCH_MEDIA_SELECT | KBDEXT;
    t[0x21d] = VK_PAUSE;
    t
}

pub static QWERTY: ScanTable = qwerty();

pub static AZERTY: ScanTable = {
    let mut t = qwerty();
    t[0x0c] = VK_OEM_4;
    t[0x10] = b'A' as u16;
    t[0x11] = b'Z' as u16;
    t[0x1a] = VK_OEM_6;
    t[0x1b] = VK_OEM_1;
    t[0x1e] = b'Q' as u16;
    t[0x27] = b'M' as u16;
    t[0x28] = VK_OEM_3;
    t[0x29] = VK_OEM_7;
    t[0x2c] = b'W' as u16;
    t[0x32] = VK_OEM_COMMA;
    t[0x33] = VK_OEM_PERIOD;
    t[0x34] = VK_OEM_2;
    t[0x35] = VK_OEM_8;
    t
};

pub static QWERTZ: ScanTable = {
    let mut t = qwerty();
    t[0x0c] = VK_OEM_4;
    t[0x0d] = VK_OEM_6;
    t[0x15] = b'Z' as u16;
    t[0x1a] = VK_OEM_1;
    t[0x1b] = VK_OEM_3;
    t[0x27] = VK_OEM_7;
    t[0x28] = VK_OEM_5;
    t[0x29] = VK_OEM_2;
    t[0x2b] = VK_OEM_8;
    t[0x2c] = b'Y' as u16;
    t[0x35] = VK_OEM_MINUS;
    t
};

pub static DVORAK: ScanTable = {
    let mut t = qwerty();
    t[0x0c] = VK_OEM_4;
    t[0x0d] = VK_OEM_6;
    t[0x10] = VK_OEM_7;
    t[0x11] = VK_OEM_COMMA;
    t[0x12] = VK_OEM_PERIOD;
    chars(&mut t, 0x13, b"PYFGCRL");
    t[0x1a] = VK_OEM_2;
    t[0x1b] = VK_OEM_PLUS;
    chars(&mut t, 0x1f, b"OEUIDHTNS");
    t[0x28] = VK_OEM_MINUS;
    t[0x2c] = VK_OEM_1;
    chars(&mut t, 0x2d, b"QJKXBMWVZ");
    t
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_keys_pass_through() {
        // X keycode 38 is evdev KEY_A.
        assert_eq!(key2scan(38), 0x1e);
        assert_eq!(key2scan(9), 0x01);
        assert_eq!(key2scan(8 + KEY_KPDOT), 0x53);
    }

    #[test]
    fn named_exceptions() {
        assert_eq!(key2scan(8 + 96), 0x11c);
        assert_eq!(key2scan(8 + 100), 0x138);
        assert_eq!(key2scan(8 + 119), 0x21d);
        // ISO_Level3_Shift is evdev 84, not 0x84.
        assert_eq!(key2scan(8 + 84), 0x5a);
        assert_eq!(key2scan(8 + 0x84), 0x200 | (0x84 & 0x7f));
        assert_eq!(key2scan(8 + 183), 0x64);
        assert_eq!(key2scan(8 + 193), 0x6e);
    }

    #[test]
    fn unknown_keys_get_synthetic_e1_code() {
        assert_eq!(key2scan(8 + 240), 0x200 | (240 & 0x7f));
        assert_eq!(key2scan(8 + 85), 0x200 | 85);
    }

    #[test]
    fn layouts_differ_only_where_expected() {
        assert_eq!(QWERTY[0x10], b'Q' as u16);
        assert_eq!(AZERTY[0x10], b'A' as u16);
        assert_eq!(QWERTZ[0x15], b'Z' as u16);
        assert_eq!(QWERTZ[0x2c], b'Y' as u16);
        assert_eq!(DVORAK[0x1f], b'O' as u16);
        for table in [&AZERTY, &QWERTZ, &DVORAK] {
            assert_eq!(&table[0x36..], &QWERTY[0x36..]);
        }
    }

    #[test]
    fn numpad_and_extended_flags() {
        assert_eq!(QWERTY[0x52], VK_INSERT | KBDNUMPAD | KBDSPECIAL);
        assert_eq!(QWERTY[0x152], VK_INSERT | KBDEXT);
        assert_eq!(QWERTY[0x4e], VK_ADD);
        assert_eq!(QWERTY[0x11d], VK_RCONTROL | KBDEXT);
        assert_eq!(QWERTY[0x15e], 0);
    }
}
