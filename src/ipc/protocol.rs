//! Wire protocol message types for broker IPC.
//!
//! All messages are MessagePack-encoded maps with at minimum `type` and `id`
//! fields. Pushes from the broker carry `id = 0`.

use serde::{Deserialize, Serialize};

use crate::host::input::{HardwareInput, LockState, Rect};

/// All wire protocol messages.
///
/// Serialized as a tagged union on the `type` field via MessagePack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Message {
    // -- Handshake --
    #[serde(rename = "hello")]
    Hello { id: u32, version: u32, role: Role },

    #[serde(rename = "hello_ack")]
    HelloAck {
        id: u32,
        status: Status,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    // -- Host connection --
    #[serde(rename = "connect")]
    Connect { id: u32, display: String },

    #[serde(rename = "start_input")]
    StartInput { id: u32, x11_window: u32, handle: u64 },

    #[serde(rename = "stop_input")]
    StopInput { id: u32, x11_window: u32 },

    // -- Keyboard layouts --
    #[serde(rename = "get_keyboard_tables")]
    GetKeyboardTables { id: u32, layout: u32 },

    #[serde(rename = "list_layouts")]
    ListLayouts { id: u32 },

    // -- Cursor --
    #[serde(rename = "clip_cursor")]
    ClipCursor {
        id: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rect: Option<Rect>,
    },

    #[serde(rename = "set_cursor_pos")]
    SetCursorPos { id: u32, x: i32, y: i32 },

    // -- Unsolicited pushes (broker → client) --
    #[serde(rename = "input")]
    Input {
        id: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        window: Option<u64>,
        input: HardwareInput,
    },

    #[serde(rename = "input_lang_change")]
    InputLangChange { id: u32, window: u64, hkl: u32 },

    #[serde(rename = "lock_state")]
    LockState { id: u32, caps: bool, num: bool },

    // -- Generic response --
    #[serde(rename = "response")]
    Response(Response),
}

impl Message {
    pub fn lock_state(state: LockState) -> Self {
        Message::LockState {
            id: 0,
            caps: state.caps,
            num: state.num,
        }
    }
}

/// Reply to a request. Only the fields the request produces are set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub id: u32,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    // -- connect --
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_width: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_height: Option<u16>,

    // -- get_keyboard_tables --
    #[serde(default, skip_serializing_if = "Option::is_none", with = "serde_bytes")]
    pub tables: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_mask: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub masks: Option<Masks>,

    // -- list_layouts --
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layouts: Option<Vec<LayoutDescriptor>>,
}

impl Response {
    pub fn ok(id: u32) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn status(id: u32, status: Status) -> Self {
        Self {
            id,
            status,
            ..Default::default()
        }
    }

    pub fn error(id: u32, error: &str) -> Self {
        Self {
            id,
            status: Status::Error,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Message::Response(response)
    }
}

/// Client role in the handshake.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Desktop process receiving input pushes.
    Desktop,
    /// One-shot command-line client.
    Client,
}

/// Response status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Ok,
    Error,
    NotSupported,
    InvalidParameter,
    NotFound,
}

/// X modifier masks the client needs to interpret key state.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Masks {
    pub shift: u32,
    pub ctrl: u32,
    pub alt: u32,
    pub altgr: u32,
    pub caps: u32,
    pub num: u32,
}

/// One layout record, as returned by `list_layouts`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LayoutDescriptor {
    pub hkl: u32,
    pub lang: u16,
    pub index: u16,
    pub layout_id: u16,
    pub group: u32,
    pub name: String,
    pub active: bool,
}

pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum payload size (16 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Minimal envelope for extracting `{type, id}` from unknown messages.
///
/// Used by the broker as a fallback when [`Message`] deserialization
/// fails (e.g., unknown `type` tag), so the error response can echo the
/// request `id`.
#[derive(Debug, Deserialize)]
pub struct RawEnvelope {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    pub msg_type: String,
    pub id: u32,
}
