//! KBDTABLES serialization.
//!
//! The blob follows the 64-bit little-endian KBDTABLES layout. Every
//! pointer field holds an offset from the start of the blob, so a reader
//! in another process rebases them by adding its own base address.
//! Pointers are written as placeholders while sections are laid out and
//! patched in a single fixup pass once every section offset is known.

use bytes::{Buf, BufMut, BytesMut};

use super::LayoutError;

/// Largest blob a reader accepts.
pub const MAX_TABLES_SIZE: usize = 32768;

const HEADER_SIZE: usize = 104;
const MODIFIERS_SIZE: usize = 24;
const WCHAR_TABLE_ENTRY_SIZE: usize = 16;
const WCHARS8_SIZE: usize = 18;
const VSC_VK_SIZE: usize = 4;
const VSC_LPWSTR_SIZE: usize = 16;
const VSC_TO_VK_LEN: usize = 0x100;

const KBD_VERSION_TYPE: u32 = 4;

/// One VK_TO_WCHARS8 row: a virtual key and its 8 modifier-slot characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VkToWchars {
    pub vk: u8,
    pub attributes: u8,
    pub wch: [u16; 8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyName {
    pub vsc: u8,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardTables {
    pub locale_flags: u32,
    pub vk_to_bit: Vec<(u8, u8)>,
    pub max_mod_bits: u16,
    pub mod_number: [u8; 8],
    pub vk_to_wchars: Vec<VkToWchars>,
    pub vsc_to_vk: Vec<u16>,
    pub vsc_to_vk_e0: Vec<(u8, u16)>,
    pub vsc_to_vk_e1: Vec<(u8, u16)>,
    pub key_names: Vec<KeyName>,
    pub key_names_ext: Vec<KeyName>,
}

impl Default for KeyboardTables {
    fn default() -> Self {
        Self {
            locale_flags: 0,
            vk_to_bit: Vec::new(),
            max_mod_bits: 0,
            mod_number: [0; 8],
            vk_to_wchars: Vec::new(),
            vsc_to_vk: vec![0; VSC_TO_VK_LEN],
            vsc_to_vk_e0: Vec::new(),
            vsc_to_vk_e1: Vec::new(),
            key_names: Vec::new(),
            key_names_ext: Vec::new(),
        }
    }
}

/// What a pointer slot refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Modifiers,
    VkToBit,
    WcharTable,
    Wchars,
    VscToVk,
    VscToVkE0,
    VscToVkE1,
    KeyNames,
    KeyNamesExt,
    Str(usize),
}

#[derive(Default)]
struct BlobWriter {
    buf: BytesMut,
    /// `(slot offset, target)` for every pointer placeholder.
    pointers: Vec<(usize, Target)>,
    /// Resolved section offsets.
    sections: Vec<(Target, usize)>,
}

impl BlobWriter {
    fn pointer(&mut self, target: Target) {
        self.pointers.push((self.buf.len(), target));
        self.buf.put_u64_le(0);
    }

    fn null(&mut self) {
        self.buf.put_u64_le(0);
    }

    fn align(&mut self, to: usize) {
        while self.buf.len() % to != 0 {
            self.buf.put_u8(0);
        }
    }

    fn begin(&mut self, target: Target) {
        self.align(8);
        self.sections.push((target, self.buf.len()));
    }

    fn fixup(mut self) -> Result<Vec<u8>, LayoutError> {
        for (slot, target) in std::mem::take(&mut self.pointers) {
            let offset = self
                .sections
                .iter()
                .find(|(t, _)| *t == target)
                .map(|(_, off)| *off)
                .ok_or_else(|| LayoutError::Malformed(format!("unresolved pointer {target:?}")))?;
            self.buf[slot..slot + 8].copy_from_slice(&(offset as u64).to_le_bytes());
        }
        Ok(self.buf.to_vec())
    }
}

impl KeyboardTables {
    /// Serialize into the self-relative KBDTABLES blob.
    pub fn to_blob(&self) -> Result<Vec<u8>, LayoutError> {
        let mut w = BlobWriter::default();

        w.pointer(Target::Modifiers);
        w.pointer(Target::WcharTable);
        w.null(); // pDeadKey
        w.pointer(Target::KeyNames);
        w.pointer(Target::KeyNamesExt);
        w.null(); // pKeyNamesDead
        w.pointer(Target::VscToVk);
        w.buf.put_u8(0xff);
        w.buf.put_bytes(0, 7);
        w.pointer(Target::VscToVkE0);
        w.pointer(Target::VscToVkE1);
        w.buf.put_u32_le(self.locale_flags);
        w.buf.put_u8(0); // nLgMax
        w.buf.put_u8(0); // cbLgEntry
        w.buf.put_bytes(0, 2);
        w.null(); // pLigature
        w.buf.put_u32_le(KBD_VERSION_TYPE);
        w.buf.put_u32_le(0);
        debug_assert_eq!(w.buf.len(), HEADER_SIZE);

        w.begin(Target::Modifiers);
        let start = w.buf.len();
        w.pointer(Target::VkToBit);
        w.buf.put_u16_le(self.max_mod_bits);
        w.buf.put_slice(&self.mod_number);
        w.buf.put_bytes(0, MODIFIERS_SIZE - (w.buf.len() - start));

        w.begin(Target::VkToBit);
        for (vk, bits) in &self.vk_to_bit {
            w.buf.put_u8(*vk);
            w.buf.put_u8(*bits);
        }
        w.buf.put_bytes(0, 2);

        w.begin(Target::WcharTable);
        w.pointer(Target::Wchars);
        w.buf.put_u8(8);
        w.buf.put_u8(WCHARS8_SIZE as u8);
        w.buf.put_bytes(0, 6);
        w.buf.put_bytes(0, WCHAR_TABLE_ENTRY_SIZE);

        w.begin(Target::VscToVk);
        for i in 0..VSC_TO_VK_LEN {
            w.buf.put_u16_le(self.vsc_to_vk.get(i).copied().unwrap_or(0));
        }

        for (target, list) in [
            (Target::VscToVkE0, &self.vsc_to_vk_e0),
            (Target::VscToVkE1, &self.vsc_to_vk_e1),
        ] {
            w.begin(target);
            for (vsc, vk) in list {
                w.buf.put_u8(*vsc);
                w.buf.put_u8(0);
                w.buf.put_u16_le(*vk);
            }
            w.buf.put_bytes(0, VSC_VK_SIZE);
        }

        w.begin(Target::Wchars);
        for entry in &self.vk_to_wchars {
            w.buf.put_u8(entry.vk);
            w.buf.put_u8(entry.attributes);
            for ch in entry.wch {
                w.buf.put_u16_le(ch);
            }
        }
        w.buf.put_bytes(0, WCHARS8_SIZE);

        let ext_base = self.key_names.len();
        for (target, list, base) in [
            (Target::KeyNames, &self.key_names, 0),
            (Target::KeyNamesExt, &self.key_names_ext, ext_base),
        ] {
            w.begin(target);
            for (i, name) in list.iter().enumerate() {
                w.buf.put_u8(name.vsc);
                w.buf.put_bytes(0, 7);
                w.pointer(Target::Str(base + i));
            }
            w.buf.put_bytes(0, VSC_LPWSTR_SIZE);
        }

        w.align(8);
        let names = self.key_names.iter().chain(&self.key_names_ext);
        for (i, name) in names.enumerate() {
            w.sections.push((Target::Str(i), w.buf.len()));
            for unit in name.name.encode_utf16() {
                w.buf.put_u16_le(unit);
            }
            w.buf.put_u16_le(0);
        }

        let blob = w.fixup()?;
        if blob.len() > MAX_TABLES_SIZE {
            return Err(LayoutError::TablesTooLarge { size: blob.len() });
        }
        Ok(blob)
    }

    /// Parse a blob produced by [`KeyboardTables::to_blob`].
    pub fn decode(blob: &[u8]) -> Result<Self, LayoutError> {
        let mut header = at(blob, 0, HEADER_SIZE)?;
        let p_modifiers = header.get_u64_le() as usize;
        let p_wchar_table = header.get_u64_le() as usize;
        header.advance(8);
        let p_names = header.get_u64_le() as usize;
        let p_names_ext = header.get_u64_le() as usize;
        header.advance(8);
        let p_vsc_to_vk = header.get_u64_le() as usize;
        header.advance(8);
        let p_e0 = header.get_u64_le() as usize;
        let p_e1 = header.get_u64_le() as usize;
        let locale_flags = header.get_u32_le();

        let mut modifiers = at(blob, p_modifiers, MODIFIERS_SIZE)?;
        let p_vk_to_bit = modifiers.get_u64_le() as usize;
        let max_mod_bits = modifiers.get_u16_le();
        let mut mod_number = [0u8; 8];
        modifiers.copy_to_slice(&mut mod_number);

        let mut vk_to_bit = Vec::new();
        let mut off = p_vk_to_bit;
        loop {
            let mut e = at(blob, off, 2)?;
            let (vk, bits) = (e.get_u8(), e.get_u8());
            if vk == 0 {
                break;
            }
            vk_to_bit.push((vk, bits));
            off += 2;
        }

        let mut table = at(blob, p_wchar_table, WCHAR_TABLE_ENTRY_SIZE)?;
        let p_wchars = table.get_u64_le() as usize;
        let n_mod = table.get_u8();
        let cb_size = table.get_u8() as usize;
        if n_mod != 8 || cb_size != WCHARS8_SIZE {
            return Err(LayoutError::Malformed(format!(
                "unexpected wchar table shape {n_mod}/{cb_size}"
            )));
        }

        let mut vk_to_wchars = Vec::new();
        let mut off = p_wchars;
        loop {
            let mut e = at(blob, off, WCHARS8_SIZE)?;
            let vk = e.get_u8();
            let attributes = e.get_u8();
            if vk == 0 {
                break;
            }
            let mut wch = [0u16; 8];
            for ch in &mut wch {
                *ch = e.get_u16_le();
            }
            vk_to_wchars.push(VkToWchars { vk, attributes, wch });
            off += WCHARS8_SIZE;
        }

        let mut raw = at(blob, p_vsc_to_vk, VSC_TO_VK_LEN * 2)?;
        let vsc_to_vk = (0..VSC_TO_VK_LEN).map(|_| raw.get_u16_le()).collect();

        Ok(Self {
            locale_flags,
            vk_to_bit,
            max_mod_bits,
            mod_number,
            vk_to_wchars,
            vsc_to_vk,
            vsc_to_vk_e0: decode_vsc_vk(blob, p_e0)?,
            vsc_to_vk_e1: decode_vsc_vk(blob, p_e1)?,
            key_names: decode_names(blob, p_names)?,
            key_names_ext: decode_names(blob, p_names_ext)?,
        })
    }
}

fn at(blob: &[u8], off: usize, len: usize) -> Result<&[u8], LayoutError> {
    off.checked_add(len)
        .and_then(|end| blob.get(off..end))
        .ok_or_else(|| LayoutError::Malformed(format!("offset {off:#x}+{len} out of bounds")))
}

fn decode_vsc_vk(blob: &[u8], mut off: usize) -> Result<Vec<(u8, u16)>, LayoutError> {
    let mut out = Vec::new();
    loop {
        let mut e = at(blob, off, VSC_VK_SIZE)?;
        let vsc = e.get_u8();
        e.advance(1);
        let vk = e.get_u16_le();
        if vsc == 0 {
            return Ok(out);
        }
        out.push((vsc, vk));
        off += VSC_VK_SIZE;
    }
}

fn decode_names(blob: &[u8], mut off: usize) -> Result<Vec<KeyName>, LayoutError> {
    let mut out = Vec::new();
    loop {
        let mut e = at(blob, off, VSC_LPWSTR_SIZE)?;
        let vsc = e.get_u8();
        e.advance(7);
        let ptr = e.get_u64_le() as usize;
        if vsc == 0 {
            return Ok(out);
        }
        out.push(KeyName {
            vsc,
            name: decode_wstr(blob, ptr)?,
        });
        off += VSC_LPWSTR_SIZE;
    }
}

fn decode_wstr(blob: &[u8], mut off: usize) -> Result<String, LayoutError> {
    let mut units = Vec::new();
    loop {
        let mut e = at(blob, off, 2)?;
        match e.get_u16_le() {
            0 => break,
            unit => units.push(unit),
        }
        off += 2;
    }
    String::from_utf16(&units).map_err(|e| LayoutError::Malformed(format!("key name: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> KeyboardTables {
        let mut tables = KeyboardTables {
            locale_flags: 1,
            vk_to_bit: vec![(0x10, 1), (0x11, 2), (0x12, 4)],
            max_mod_bits: 7,
            mod_number: [0, 1, 2, 3, 4, 5, 6, 7],
            vk_to_wchars: vec![VkToWchars {
                vk: b'A',
                attributes: 1,
                wch: [0x61, 0x41, 0xf000, 0xf000, 0xf000, 0xf000, 0xf000, 0xf000],
            }],
            vsc_to_vk_e0: vec![(0x1c, 0x10d), (0x1d, 0x1a3)],
            vsc_to_vk_e1: vec![(0x1d, 0x13)],
            key_names: vec![KeyName {
                vsc: 0x1e,
                name: "a".into(),
            }],
            key_names_ext: vec![KeyName {
                vsc: 0x47,
                name: "Home".into(),
            }],
            ..Default::default()
        };
        tables.vsc_to_vk[0x1e] = b'A' as u16;
        tables
    }

    fn u64_at(blob: &[u8], off: usize) -> usize {
        u64::from_le_bytes(blob[off..off + 8].try_into().unwrap()) as usize
    }

    #[test]
    fn header_layout() {
        let blob = sample().to_blob().unwrap();
        assert_eq!(u64_at(&blob, 0), HEADER_SIZE, "modifiers follow the header");
        assert_eq!(u64_at(&blob, 16), 0, "no dead keys");
        assert_eq!(u64_at(&blob, 40), 0, "no dead key names");
        assert_eq!(blob[56], 0xff);
        assert_eq!(u32::from_le_bytes(blob[80..84].try_into().unwrap()), 1);
        assert_eq!(u64_at(&blob, 88), 0, "no ligatures");
        assert_eq!(u32::from_le_bytes(blob[96..100].try_into().unwrap()), 4);
    }

    #[test]
    fn pointers_are_blob_relative_and_in_bounds() {
        let blob = sample().to_blob().unwrap();
        for slot in [0, 8, 24, 32, 48, 64, 72] {
            let off = u64_at(&blob, slot);
            assert!(off >= HEADER_SIZE && off < blob.len(), "slot {slot} -> {off:#x}");
            assert_eq!(off % 8, 0);
        }
        let vsc = u64_at(&blob, 48);
        assert_eq!(
            u16::from_le_bytes(blob[vsc + 0x1e * 2..vsc + 0x1e * 2 + 2].try_into().unwrap()),
            b'A' as u16
        );
    }

    #[test]
    fn strings_are_utf16_nul_terminated() {
        let blob = sample().to_blob().unwrap();
        let names = u64_at(&blob, 32);
        assert_eq!(blob[names], 0x47);
        let s = u64_at(&blob, names + 8);
        let expected: Vec<u8> = "Home\0".encode_utf16().flat_map(u16::to_le_bytes).collect();
        assert_eq!(&blob[s..s + expected.len()], &expected[..]);
    }

    #[test]
    fn decode_recovers_tables() {
        let tables = sample();
        let decoded = KeyboardTables::decode(&tables.to_blob().unwrap()).unwrap();
        assert_eq!(decoded, tables);
    }

    #[test]
    fn oversized_tables_are_rejected() {
        let mut tables = sample();
        tables.key_names = (1..=255u8)
            .map(|vsc| KeyName {
                vsc,
                name: "x".repeat(64),
            })
            .collect();
        match tables.to_blob() {
            Err(LayoutError::TablesTooLarge { size }) => assert!(size > MAX_TABLES_SIZE),
            other => panic!("expected TablesTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn truncated_blob_is_malformed() {
        let blob = sample().to_blob().unwrap();
        assert!(matches!(
            KeyboardTables::decode(&blob[..HEADER_SIZE + 4]),
            Err(LayoutError::Malformed(_))
        ));
        assert!(KeyboardTables::decode(&[]).is_err());
    }
}
