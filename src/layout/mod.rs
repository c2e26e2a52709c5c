//! Keyboard layout records built from the X server's keymap.
//!
//! One [`Layout`] is built per XKB group. Each carries the scan code to
//! virtual-key table chosen for its language, the modifier masks the
//! client needs to interpret key state, and a serialized KBDTABLES blob.

pub mod keymap;
pub mod lang;
pub mod rules;
pub mod scan;
pub mod tables;
pub mod vk;

use std::sync::atomic::{AtomicU16, Ordering};

use keymap::KeymapSource;
use rules::RulesNames;
use scan::{ScanLayout, ScanTable, key2scan};
use tables::{KeyName, KeyboardTables, VkToWchars};
use vk::*;

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("keymap unavailable: {0}")]
    Keymap(String),

    #[error("keyboard tables too large: {size} bytes")]
    TablesTooLarge { size: usize },

    #[error("malformed keyboard tables: {0}")]
    Malformed(String),
}

/// X modifier masks, resolved by name against the keymap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierMasks {
    pub shift: u32,
    pub ctrl: u32,
    pub alt: u32,
    pub altgr: u32,
    pub caps: u32,
    pub num: u32,
}

impl ModifierMasks {
    pub fn resolve(keymap: &dyn KeymapSource) -> Self {
        let first = |names: &[&str]| {
            names
                .iter()
                .map(|name| keymap.mod_mask(name))
                .find(|mask| *mask != 0)
                .unwrap_or(0)
        };
        Self {
            shift: first(&["Shift"]),
            ctrl: first(&["Control"]),
            alt: first(&["Mod1"]),
            altgr: first(&["Mod5", "LevelThree"]),
            caps: first(&["Lock"]),
            num: first(&["Mod2", "NumLock"]),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Layout {
    pub group: u32,
    /// `layout:variant:options`.
    pub name: String,
    pub lang: u16,
    /// Position among layouts sharing `lang`.
    pub index: u16,
    /// Zero for the first layout of a language.
    pub layout_id: u16,
    pub scan_layout: ScanLayout,
    pub masks: ModifierMasks,
    pub tables: KeyboardTables,
    pub blob: Vec<u8>,
}

impl Layout {
    pub fn scan2vk(&self) -> &'static ScanTable {
        self.scan_layout.table()
    }

    /// Keyboard layout handle: locale in the low word, language or
    /// `0xf000 | layout_id` in the high word.
    pub fn hkl(&self) -> u32 {
        let locale = self.lang as u32;
        let high = if self.layout_id == 0 {
            self.lang
        } else {
            0xf000 | self.layout_id
        };
        ((high as u32) << 16) | locale
    }

    /// Group bits as carried in X key event state.
    pub fn group_mask(&self) -> u32 {
        self.group << 13
    }
}

/// Layout ids are handed out process-wide, never reused.
static NEXT_LAYOUT_ID: AtomicU16 = AtomicU16::new(1);

fn choose_scan_layout(lang: u16, name: &str, description: &str) -> ScanLayout {
    if name.to_lowercase().contains("dvorak") || description.to_lowercase().contains("dvorak") {
        return ScanLayout::Dvorak;
    }
    // Regional variants (Belgian, Austrian, Swiss) share the base table.
    let primary = lang::primary_langid(lang);
    if primary == lang::primary_langid(lang::FRENCH) {
        ScanLayout::Azerty
    } else if primary == lang::primary_langid(lang::GERMAN) {
        ScanLayout::Qwertz
    } else {
        ScanLayout::Qwerty
    }
}

fn to_wchar(ch: Option<char>) -> u16 {
    match ch.map(u32::from) {
        Some(c) if c != 0 && c <= 0xffff => c as u16,
        _ => WCH_NONE,
    }
}

/// Character rows for one key, or nothing if no slot produces a character.
///
/// Slot bit 0 is Shift, bit 1 Ctrl and bit 2 AltGr.
fn key_chars(
    keymap: &mut dyn KeymapSource,
    keycode: u32,
    group: u32,
    vk: u8,
    masks: &ModifierMasks,
) -> Vec<VkToWchars> {
    let mut plain = [WCH_NONE; 8];
    let mut caps = [WCH_NONE; 8];
    let mut found = false;

    for slot in 0..8 {
        if slot & 0b010 != 0 {
            continue;
        }
        let mut mods = 0;
        if slot & 0b001 != 0 {
            mods |= masks.shift;
        }
        if slot & 0b100 != 0 {
            mods |= masks.altgr;
        }
        plain[slot] = to_wchar(keymap.key_char(keycode, group, mods));
        caps[slot] = to_wchar(keymap.key_char(keycode, group, mods | masks.caps));
        found |= plain[slot] != WCH_NONE || caps[slot] != WCH_NONE;
    }

    if !found {
        return Vec::new();
    }
    if masks.caps != 0 && caps != plain {
        vec![
            VkToWchars {
                vk,
                attributes: SGCAPS,
                wch: plain,
            },
            VkToWchars {
                vk: VK_NONE as u8,
                attributes: 0,
                wch: caps,
            },
        ]
    } else {
        vec![VkToWchars {
            vk,
            attributes: CAPLOK,
            wch: plain,
        }]
    }
}

fn build_tables(
    keymap: &mut dyn KeymapSource,
    group: u32,
    scan2vk: &ScanTable,
    masks: &ModifierMasks,
) -> KeyboardTables {
    let mut tables = KeyboardTables {
        locale_flags: KLLF_ALTGR,
        vk_to_bit: vec![
            (VK_SHIFT as u8, KBDSHIFT),
            (VK_CONTROL as u8, KBDCTRL),
            (VK_ICO_CLEAR as u8, KBDALT),
        ],
        max_mod_bits: 7,
        mod_number: [0, 1, 2, 3, 4, 5, 6, 7],
        ..Default::default()
    };

    let (min, max) = keymap.keycode_range();
    for keycode in min..=max {
        let scan = key2scan(keycode);
        if scan & 0xff == 0 {
            continue;
        }
        let vsc = (scan & 0xff) as u8;

        if let Some(name) = keymap.keysym_name(keycode, group) {
            let entry = KeyName { vsc, name };
            if scan & 0x300 == 0 {
                tables.key_names.push(entry);
            } else {
                tables.key_names_ext.push(entry);
            }
        }

        let vkey = scan2vk[scan as usize];
        if vkey == 0 {
            continue;
        }
        if scan & 0x100 != 0 {
            tables.vsc_to_vk_e0.push((vsc, vkey));
        } else if scan & 0x200 != 0 {
            tables.vsc_to_vk_e1.push((vsc, vkey));
        } else {
            tables.vsc_to_vk[vsc as usize] = vkey;
        }

        let rows = key_chars(keymap, keycode, group, vkey as u8, masks);
        tables.vk_to_wchars.extend(rows);
    }
    tables
}

/// Build the layout record for one XKB group.
pub fn build_layout(
    keymap: &mut dyn KeymapSource,
    rules: &RulesNames,
    group: u32,
    existing: &[Layout],
) -> Result<Layout, LayoutError> {
    let description = keymap.group_description(group).unwrap_or_default();
    let (code, variant) = match rules.group(group as usize) {
        Some((layout, variant)) => (layout.to_owned(), variant.to_owned()),
        None => match lang::code_from_description(&description) {
            Some(code) => (code.to_owned(), String::new()),
            None => {
                tracing::warn!(group, description = %description, "unknown keyboard layout, using us");
                ("us".to_owned(), String::new())
            }
        },
    };
    let name = format!("{code}:{variant}:{}", rules.options);

    let lang = lang::langid_from_layout(&code);
    let index = existing.iter().filter(|l| l.lang == lang).count() as u16;
    let layout_id = if index > 0 {
        NEXT_LAYOUT_ID.fetch_add(1, Ordering::Relaxed)
    } else {
        0
    };

    let scan_layout = choose_scan_layout(lang, &name, &description);
    let masks = ModifierMasks::resolve(keymap);
    let tables = build_tables(keymap, group, scan_layout.table(), &masks);
    let blob = tables.to_blob()?;

    tracing::debug!(
        group,
        name = %name,
        lang = format_args!("{lang:04x}"),
        index,
        layout_id,
        table = scan_layout.name(),
        blob_len = blob.len(),
        "built keyboard layout"
    );

    Ok(Layout {
        group,
        name,
        lang,
        index,
        layout_id,
        scan_layout,
        masks,
        tables,
        blob,
    })
}

/// The layout records of one connection plus the active one.
#[derive(Debug, Default)]
pub struct LayoutSet {
    layouts: Vec<Layout>,
    active: Option<usize>,
}

impl LayoutSet {
    /// Replace every record with one per group of `keymap`.
    ///
    /// On failure the set is left empty.
    pub fn rebuild(
        &mut self,
        keymap: &mut dyn KeymapSource,
        rules: &RulesNames,
    ) -> Result<(), LayoutError> {
        self.clear();
        for group in 0..keymap.num_groups() {
            match build_layout(keymap, rules, group, &self.layouts) {
                Ok(layout) => self.layouts.push(layout),
                Err(e) => {
                    self.clear();
                    return Err(e);
                }
            }
        }
        tracing::info!(count = self.layouts.len(), "keyboard layouts rebuilt");
        Ok(())
    }

    pub fn clear(&mut self) {
        self.active = None;
        self.layouts.clear();
    }

    pub fn active(&self) -> Option<&Layout> {
        self.active.and_then(|i| self.layouts.get(i))
    }

    /// Make the layout for `group` active.
    pub fn set_active_group(&mut self, group: u32) -> Option<&Layout> {
        match self.layouts.iter().position(|l| l.group == group) {
            Some(i) => {
                self.active = Some(i);
                self.layouts.get(i)
            }
            None => {
                tracing::warn!(group, "no keyboard layout for group");
                None
            }
        }
    }

    /// Layout whose HKL high word matches that of `hkl`.
    pub fn find_by_hkl(&self, hkl: u32) -> Option<&Layout> {
        self.layouts.iter().find(|l| l.hkl() >> 16 == hkl >> 16)
    }

    /// Masks of the active layout, falling back to the first one.
    pub fn masks(&self) -> ModifierMasks {
        self.active()
            .or_else(|| self.layouts.first())
            .map(|l| l.masks)
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layout> {
        self.layouts.iter()
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::keymap::fake::{self, FakeGroup, FakeKeymap};
    use super::*;

    fn us_rules() -> RulesNames {
        RulesNames::parse(b"evdev\0pc105\0us\0\0\0")
    }

    fn build_us() -> Layout {
        let mut keymap = FakeKeymap::us();
        build_layout(&mut keymap, &us_rules(), 0, &[]).unwrap()
    }

    fn rows_for(tables: &KeyboardTables, vk: u8) -> &[VkToWchars] {
        let i = tables
            .vk_to_wchars
            .iter()
            .position(|r| r.vk == vk)
            .unwrap();
        let len = if tables.vk_to_wchars[i].attributes == SGCAPS { 2 } else { 1 };
        &tables.vk_to_wchars[i..i + len]
    }

    #[test]
    fn qwerty_scan_table_for_us() {
        let layout = build_us();
        assert_eq!(layout.scan_layout, ScanLayout::Qwerty);
        assert_eq!(layout.tables.vsc_to_vk[0x1e], b'A' as u16);
        assert_eq!(layout.tables.vsc_to_vk[0x10], b'Q' as u16);
        assert_eq!(layout.name, "us::");
        assert_eq!(layout.lang, lang::ENGLISH_US);
        assert_eq!(layout.index, 0);
        assert_eq!(layout.layout_id, 0);
        assert_eq!(layout.hkl(), 0x0409_0409);
    }

    #[test]
    fn modifier_tables() {
        let layout = build_us();
        assert_eq!(
            layout.tables.vk_to_bit,
            vec![(0x10, KBDSHIFT), (0x11, KBDCTRL), (0xe6, KBDALT)]
        );
        assert_eq!(layout.tables.max_mod_bits, 7);
        assert_eq!(layout.tables.mod_number, [0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(layout.tables.locale_flags, KLLF_ALTGR);
        assert_eq!(
            layout.masks,
            ModifierMasks {
                shift: fake::SHIFT,
                ctrl: fake::CONTROL,
                alt: fake::MOD1,
                altgr: fake::MOD5,
                caps: fake::LOCK,
                num: fake::MOD2,
            }
        );
    }

    #[test]
    fn letters_get_caps_variant_row() {
        let layout = build_us();
        let rows = rows_for(&layout.tables, b'A');
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].attributes, SGCAPS);
        assert_eq!(rows[0].wch[0], 'a' as u16);
        assert_eq!(rows[0].wch[1], 'A' as u16);
        assert_eq!(rows[0].wch[2], WCH_NONE, "ctrl produces nothing");
        assert_eq!(rows[0].wch[3], WCH_NONE);
        assert_eq!(rows[1].vk, VK_NONE as u8);
        assert_eq!(rows[1].wch[0], 'A' as u16);
        assert_eq!(rows[1].wch[1], 'a' as u16);
    }

    #[test]
    fn symbols_fold_caps_flag() {
        let layout = build_us();
        let rows = rows_for(&layout.tables, b'1');
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].attributes, CAPLOK);
        assert_eq!(rows[0].wch[0], '1' as u16);
        assert_eq!(rows[0].wch[1], '!' as u16);
    }

    #[test]
    fn keys_without_characters_have_no_row() {
        let layout = build_us();
        assert!(!layout.tables.vk_to_wchars.iter().any(|r| r.vk == VK_ESCAPE as u8));
    }

    #[test]
    fn key_names_split_by_extended_bits() {
        let layout = build_us();
        let names = &layout.tables.key_names;
        let ext = &layout.tables.key_names_ext;
        assert!(names.contains(&KeyName { vsc: 0x1e, name: "a".into() }));
        assert!(names.contains(&KeyName { vsc: 0x47, name: "KP_Home".into() }));
        assert!(ext.contains(&KeyName { vsc: 0x47, name: "Home".into() }));
        assert!(ext.contains(&KeyName { vsc: 0x1d, name: "Pause".into() }));
    }

    #[test]
    fn extended_vk_lists() {
        let layout = build_us();
        assert!(layout.tables.vsc_to_vk_e0.contains(&(0x47, VK_HOME | KBDEXT)));
        assert!(layout.tables.vsc_to_vk_e0.contains(&(0x1d, VK_RCONTROL | KBDEXT)));
        assert!(layout.tables.vsc_to_vk_e1.contains(&(0x1d, VK_PAUSE)));
        assert_eq!(layout.tables.vsc_to_vk[0x47], VK_HOME | KBDNUMPAD | KBDSPECIAL);
    }

    #[test]
    fn french_uses_azerty_and_altgr() {
        let mut keymap = FakeKeymap::new(vec![FakeGroup::french()]);
        let rules = RulesNames::parse(b"evdev\0pc105\0fr\0\0\0");
        let layout = build_layout(&mut keymap, &rules, 0, &[]).unwrap();
        assert_eq!(layout.scan_layout, ScanLayout::Azerty);
        assert_eq!(layout.tables.vsc_to_vk[0x10], b'A' as u16);
        let rows = rows_for(&layout.tables, b'E');
        assert_eq!(rows[0].wch[4], 0x20ac);
    }

    #[test]
    fn regional_variants_share_the_base_scan_table() {
        let pick = |code| choose_scan_layout(lang::langid_from_layout(code), code, "");
        assert_eq!(pick("be"), ScanLayout::Azerty);
        assert_eq!(pick("cm"), ScanLayout::Azerty);
        assert_eq!(pick("at"), ScanLayout::Qwertz);
        assert_eq!(pick("ch"), ScanLayout::Qwertz);
        assert_eq!(pick("gb"), ScanLayout::Qwerty);
        assert_eq!(choose_scan_layout(lang::FRENCH, "fr", "French (Dvorak)"), ScanLayout::Dvorak);
    }

    #[test]
    fn german_and_dvorak_tables() {
        let mut keymap = FakeKeymap::new(vec![FakeGroup::german(), FakeGroup::us()]);
        let rules = RulesNames::parse(b"evdev\0pc105\0de,us\0,dvorak\0\0");
        let mut set = LayoutSet::default();
        set.rebuild(&mut keymap, &rules).unwrap();
        let layouts: Vec<_> = set.iter().collect();
        assert_eq!(layouts[0].scan_layout, ScanLayout::Qwertz);
        assert_eq!(layouts[1].scan_layout, ScanLayout::Dvorak);
        assert_eq!(layouts[1].name, "us:dvorak:");
    }

    #[test]
    fn description_fallback() {
        let mut keymap = FakeKeymap::new(vec![FakeGroup::french()]);
        let layout = build_layout(&mut keymap, &RulesNames::default(), 0, &[]).unwrap();
        assert_eq!(layout.lang, lang::FRENCH);

        let mut unknown = FakeGroup::us();
        unknown.description = "Klingon";
        let mut keymap = FakeKeymap::new(vec![unknown]);
        let layout = build_layout(&mut keymap, &RulesNames::default(), 0, &[]).unwrap();
        assert_eq!(layout.name, "us::");
        assert_eq!(layout.lang, lang::ENGLISH_US);
    }

    #[test]
    fn repeated_language_gets_index_and_id() {
        let mut keymap = FakeKeymap::new(vec![FakeGroup::us(), FakeGroup::french(), FakeGroup::us()]);
        let rules = RulesNames::parse(b"evdev\0pc105\0us,fr,us\0,,intl\0\0");
        let mut set = LayoutSet::default();
        set.rebuild(&mut keymap, &rules).unwrap();
        assert_eq!(set.len(), 3);

        let layouts: Vec<_> = set.iter().collect();
        assert_eq!((layouts[0].index, layouts[0].layout_id), (0, 0));
        assert_eq!((layouts[1].index, layouts[1].layout_id), (0, 0));
        assert_eq!(layouts[2].index, 1);
        assert_ne!(layouts[2].layout_id, 0);
        assert_eq!(layouts[2].hkl() >> 16, 0xf000 | layouts[2].layout_id as u32);
        assert_eq!(layouts[2].hkl() & 0xffff, lang::ENGLISH_US as u32);

        let pairs: HashSet<_> = layouts.iter().map(|l| (l.lang, l.index)).collect();
        assert_eq!(pairs.len(), 3);
        let hkls: HashSet<_> = layouts.iter().map(|l| l.hkl()).collect();
        assert_eq!(hkls.len(), 3);
    }

    #[test]
    fn rebuild_clears_active_and_replaces_records() {
        let mut keymap = FakeKeymap::new(vec![FakeGroup::us(), FakeGroup::french()]);
        let rules = RulesNames::parse(b"evdev\0pc105\0us,fr\0\0\0");
        let mut set = LayoutSet::default();
        set.rebuild(&mut keymap, &rules).unwrap();
        assert_eq!(set.set_active_group(1).map(|l| l.lang), Some(lang::FRENCH));
        assert_eq!(set.masks().caps, fake::LOCK);

        let mut keymap = FakeKeymap::us();
        set.rebuild(&mut keymap, &us_rules()).unwrap();
        assert!(set.active().is_none());
        assert_eq!(set.len(), 1);
        assert!(set.set_active_group(1).is_none());
    }

    #[test]
    fn find_by_hkl_matches_high_word() {
        let mut keymap = FakeKeymap::new(vec![FakeGroup::us(), FakeGroup::french()]);
        let rules = RulesNames::parse(b"evdev\0pc105\0us,fr\0\0\0");
        let mut set = LayoutSet::default();
        set.rebuild(&mut keymap, &rules).unwrap();
        assert_eq!(set.find_by_hkl(0x040c_0000).map(|l| l.group), Some(1));
        assert_eq!(set.find_by_hkl(0x040c_0409).map(|l| l.group), Some(1));
        assert!(set.find_by_hkl(0x0407_0407).is_none());
    }

    #[test]
    fn blob_matches_tables() {
        let layout = build_us();
        let decoded = KeyboardTables::decode(&layout.blob).unwrap();
        assert_eq!(decoded, layout.tables);
        assert_eq!(
            decoded.vk_to_bit,
            vec![
                (VK_SHIFT as u8, KBDSHIFT),
                (VK_CONTROL as u8, KBDCTRL),
                (VK_ICO_CLEAR as u8, KBDALT),
            ]
        );
    }

    /// Every key named with a long string, enough to overflow the blob.
    struct LongNames(FakeKeymap);

    impl KeymapSource for LongNames {
        fn keycode_range(&self) -> (u32, u32) {
            self.0.keycode_range()
        }
        fn num_groups(&self) -> u32 {
            self.0.num_groups()
        }
        fn group_description(&self, group: u32) -> Option<String> {
            self.0.group_description(group)
        }
        fn keysym_name(&self, keycode: u32, _group: u32) -> Option<String> {
            Some(format!("{keycode:0>100}"))
        }
        fn mod_mask(&self, name: &str) -> u32 {
            self.0.mod_mask(name)
        }
        fn key_char(&mut self, keycode: u32, group: u32, mods: u32) -> Option<char> {
            self.0.key_char(keycode, group, mods)
        }
    }

    #[test]
    fn failed_rebuild_leaves_set_empty() {
        let mut set = LayoutSet::default();
        set.rebuild(&mut FakeKeymap::us(), &us_rules()).unwrap();
        set.set_active_group(0);

        let mut keymap = LongNames(FakeKeymap::us());
        let err = set.rebuild(&mut keymap, &us_rules()).unwrap_err();
        assert!(matches!(err, LayoutError::TablesTooLarge { .. }));
        assert!(set.is_empty());
        assert!(set.active().is_none());
    }
}
