//! Output formatting for CLI client commands.
//!
//! Tables and status lines go to stdout. `listen` prints one line per
//! push so the output can be piped through `grep`.

use crate::host::input::{HardwareInput, Rect};
use crate::ipc::protocol::{LayoutDescriptor, Message, Response};
use crate::layout::tables::KeyboardTables;

use super::ClientError;
use super::broker_client::HostInfo;

pub fn print_info(display: &str, info: &HostInfo) {
    let display = if display.is_empty() { "(default)" } else { display };
    println!("Display: {display}");
    println!("Root:    {:#x}", info.root);
    println!("Screen:  {}x{}", info.width, info.height);
}

/// Print layout descriptors as a table to stdout.
pub fn print_layouts(layouts: &[LayoutDescriptor]) {
    if layouts.is_empty() {
        println!("No keyboard layouts");
        return;
    }

    println!("{:<10} {:>5} {:<6} NAME", "HKL", "GROUP", "ACTIVE");
    println!("{}", "-".repeat(50));
    for l in layouts {
        println!(
            "{:<10} {:>5} {:<6} {}",
            format!("{:08x}", l.hkl),
            l.group,
            if l.active { "*" } else { "" },
            l.name
        );
    }
}

/// Summarize a `get_keyboard_tables` response.
pub fn print_tables(layout: u32, response: &Response) -> Result<(), ClientError> {
    let blob = response
        .tables
        .as_deref()
        .ok_or_else(|| ClientError::Broker("response carries no tables".into()))?;
    let tables = KeyboardTables::decode(blob)
        .map_err(|e| ClientError::Broker(format!("bad tables blob: {e}")))?;

    println!("Layout:     {layout:08x}");
    println!("Blob:       {} bytes", blob.len());
    if let Some(mask) = response.group_mask {
        println!("Group mask: {mask:#x}");
    }
    if let Some(m) = &response.masks {
        println!(
            "Modifiers:  shift={:#x} ctrl={:#x} alt={:#x} altgr={:#x} caps={:#x} num={:#x}",
            m.shift, m.ctrl, m.alt, m.altgr, m.caps, m.num
        );
    }
    println!("Mod bits:   {}", tables.max_mod_bits);
    println!("Char keys:  {}", tables.vk_to_wchars.len());
    println!(
        "Key names:  {} ({} extended)",
        tables.key_names.len(),
        tables.key_names_ext.len()
    );
    Ok(())
}

pub fn print_clip(rect: Option<Rect>) {
    match rect {
        Some(r) => println!(
            "Cursor clipped to {},{} {}x{}",
            r.left,
            r.top,
            r.width(),
            r.height()
        ),
        None => println!("Cursor clip released"),
    }
}

pub fn print_push(msg: &Message) {
    println!("{}", format_push(msg));
}

fn format_push(msg: &Message) -> String {
    match msg {
        Message::Input { window, input, .. } => {
            let target = match window {
                Some(handle) => format!("{handle:#x}"),
                None => "-".to_string(),
            };
            format!("input {target} {}", format_input(input))
        }
        Message::InputLangChange { window, hkl, .. } => {
            format!("lang {window:#x} {hkl:08x}")
        }
        Message::LockState { caps, num, .. } => {
            format!("locks caps={} num={}", on_off(*caps), on_off(*num))
        }
        other => format!("{other:?}"),
    }
}

fn format_input(input: &HardwareInput) -> String {
    match input {
        HardwareInput::Mouse {
            dx,
            dy,
            data,
            flags,
            time,
        } => format!("mouse dx={dx} dy={dy} data={data} flags={flags:#06x} t={time}"),
        HardwareInput::Keyboard {
            vk,
            scan,
            flags,
            time,
        } => format!("key vk={vk:#04x} scan={scan:#04x} flags={flags:#x} t={time}"),
        HardwareInput::Touch {
            x,
            y,
            id,
            flags,
            time,
        } => format!("touch id={id} x={x} y={y} flags={flags:#x} t={time}"),
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}
