use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::host::input::Rect;

#[derive(Parser)]
#[command(name = "x11hostd", about = "X11 input and keyboard layout bridge")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the broker daemon
    Broker {
        /// Socket path (default: $XDG_RUNTIME_DIR/x11hostd/broker.sock)
        #[arg(long)]
        socket: Option<PathBuf>,

        /// Virtual screen as X,Y,WxH (default: root window geometry)
        #[arg(long, value_parser = parse_screen)]
        virtual_screen: Option<Rect>,

        /// Answer every connect with not_supported
        #[arg(long)]
        disable_x11: bool,
    },

    /// Query or drive a running broker
    Client {
        /// Socket path (default: $XDG_RUNTIME_DIR/x11hostd/broker.sock)
        #[arg(long)]
        socket: Option<PathBuf>,

        /// X display to attach to
        #[arg(long, env = "DISPLAY", default_value = "")]
        display: String,

        #[command(subcommand)]
        action: ClientAction,
    },
}

#[derive(Subcommand)]
pub enum ClientAction {
    /// Print root window and screen size
    Info,

    /// List keyboard layouts
    Layouts,

    /// Summarize the keyboard tables of one layout
    Tables {
        /// Layout handle, hex (04090409) or decimal
        #[arg(value_parser = parse_hkl)]
        layout: u32,
    },

    /// Confine the cursor to X,Y,WxH, or release it when omitted
    Clip {
        #[arg(value_parser = parse_screen)]
        rect: Option<Rect>,
    },

    /// Move the cursor to desktop coordinates
    Warp {
        #[arg(allow_hyphen_values = true)]
        x: i32,
        #[arg(allow_hyphen_values = true)]
        y: i32,
    },

    /// Print pushes until Ctrl-C, optionally selecting input on windows
    Listen {
        /// X11 window ids (hex with 0x, or decimal)
        #[arg(long = "window", value_parser = parse_window)]
        windows: Vec<u32>,
    },
}

/// Parse `X,Y,WxH` into a rectangle.
fn parse_screen(s: &str) -> Result<Rect, String> {
    let bad = || format!("expected X,Y,WxH, got {s:?}");
    let mut parts = s.splitn(3, ',');
    let (Some(x), Some(y), Some(size)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(bad());
    };
    let (w, h) = size.split_once('x').ok_or_else(bad)?;
    let left: i32 = x.trim().parse().map_err(|_| bad())?;
    let top: i32 = y.trim().parse().map_err(|_| bad())?;
    let width: u32 = w.trim().parse().map_err(|_| bad())?;
    let height: u32 = h.trim().parse().map_err(|_| bad())?;
    if width == 0 || height == 0 {
        return Err(format!("empty rectangle {s:?}"));
    }
    let right = i32::try_from(width)
        .ok()
        .and_then(|w| left.checked_add(w))
        .ok_or_else(bad)?;
    let bottom = i32::try_from(height)
        .ok()
        .and_then(|h| top.checked_add(h))
        .ok_or_else(bad)?;
    Ok(Rect {
        left,
        top,
        right,
        bottom,
    })
}

fn parse_hkl(s: &str) -> Result<u32, String> {
    let hex = s.strip_prefix("0x").unwrap_or(s);
    u32::from_str_radix(hex, 16).map_err(|e| format!("bad layout handle {s:?}: {e}"))
}

fn parse_window(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    match parsed {
        Ok(0) => Err("window id 0 is not a window".into()),
        Ok(id) => Ok(id),
        Err(e) => Err(format!("bad window id {s:?}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_with_negative_origin() {
        assert_eq!(
            parse_screen("-1920,0,3840x1080").unwrap(),
            Rect {
                left: -1920,
                top: 0,
                right: 1920,
                bottom: 1080,
            }
        );
    }

    #[test]
    fn screen_rejects_garbage() {
        assert!(parse_screen("0,0").is_err());
        assert!(parse_screen("0,0,640").is_err());
        assert!(parse_screen("0,0,0x480").is_err());
        assert!(parse_screen("a,0,640x480").is_err());
    }

    #[test]
    fn hkl_is_hex() {
        assert_eq!(parse_hkl("04090409").unwrap(), 0x0409_0409);
        assert_eq!(parse_hkl("0xf0010409").unwrap(), 0xf001_0409);
        assert!(parse_hkl("us").is_err());
    }

    #[test]
    fn window_hex_or_decimal() {
        assert_eq!(parse_window("0x1200003").unwrap(), 0x0120_0003);
        assert_eq!(parse_window("42").unwrap(), 42);
        assert!(parse_window("0").is_err());
    }

    #[test]
    fn client_listen_collects_windows() {
        let cli = Cli::try_parse_from([
            "x11hostd", "client", "--display", ":1", "listen", "--window", "0x10", "--window",
            "17",
        ])
        .unwrap();
        match cli.command {
            Command::Client {
                display,
                action: ClientAction::Listen { windows },
                ..
            } => {
                assert_eq!(display, ":1");
                assert_eq!(windows, vec![0x10, 17]);
            }
            _ => panic!("expected client listen"),
        }
    }

    #[test]
    fn broker_flags() {
        let cli = Cli::try_parse_from([
            "x11hostd",
            "broker",
            "--virtual-screen",
            "0,0,1024x768",
            "--disable-x11",
        ])
        .unwrap();
        match cli.command {
            Command::Broker {
                socket,
                virtual_screen,
                disable_x11,
            } => {
                assert!(socket.is_none());
                assert_eq!(virtual_screen.map(|r| r.width()), Some(1024));
                assert!(disable_x11);
            }
            _ => panic!("expected broker"),
        }
    }
}
