//! Message dispatch and request handling.
//!
//! No socket I/O. Each handler takes a mutable reference to
//! [`BrokerState`] and returns a response plus any pushes the broker
//! loop must deliver to other (or the same) connections.

use crate::host::input::Rect;
use crate::host::registry::HostId;
use crate::host::windows::WindowHandle;
use crate::host::{HostConnection, HostError};
use crate::ipc::protocol::{
    LayoutDescriptor, Masks, Message, PROTOCOL_VERSION, Response, Role, Status,
};

use super::state::{BrokerState, ConnectionId, Outbound};

/// Dispatch a request message to the appropriate handler.
///
/// Broker-originated variants sent by a client are answered with
/// `unknown_type`.
pub fn handle_message(
    state: &mut BrokerState,
    request: Message,
    connection_id: ConnectionId,
) -> (Message, Vec<Outbound>) {
    let no_push = |response: Response| -> (Message, Vec<Outbound>) { (response.into(), Vec::new()) };
    match request {
        Message::Hello { id, version, role } => {
            (handle_hello(state, id, version, role, connection_id), Vec::new())
        }
        Message::Connect { id, display } => handle_connect(state, id, &display, connection_id),
        Message::StartInput {
            id,
            x11_window,
            handle,
        } => no_push(handle_start_input(state, id, x11_window, handle, connection_id)),
        Message::StopInput { id, x11_window } => {
            no_push(handle_stop_input(state, id, x11_window, connection_id))
        }
        Message::GetKeyboardTables { id, layout } => {
            no_push(handle_get_keyboard_tables(state, id, layout, connection_id))
        }
        Message::ListLayouts { id } => no_push(handle_list_layouts(state, id, connection_id)),
        Message::ClipCursor { id, rect } => {
            no_push(handle_clip_cursor(state, id, rect, connection_id))
        }
        Message::SetCursorPos { id, x, y } => {
            no_push(handle_set_cursor_pos(state, id, x, y, connection_id))
        }
        Message::HelloAck { id, .. }
        | Message::Input { id, .. }
        | Message::InputLangChange { id, .. }
        | Message::LockState { id, .. }
        | Message::Response(Response { id, .. }) => no_push(Response::error(id, "unknown_type")),
    }
}

fn handle_hello(
    state: &mut BrokerState,
    id: u32,
    version: u32,
    role: Role,
    connection_id: ConnectionId,
) -> Message {
    let reject = |error: &str| Message::HelloAck {
        id: 0,
        status: Status::Error,
        error: Some(error.into()),
    };
    if id != 0 {
        return reject("invalid_hello_id");
    }
    if version != PROTOCOL_VERSION {
        return reject("version_mismatch");
    }
    state.add_connection(connection_id);
    tracing::debug!(?connection_id, ?role, "handshake complete");
    Message::HelloAck {
        id: 0,
        status: Status::Ok,
        error: None,
    }
}

fn handle_connect(
    state: &mut BrokerState,
    id: u32,
    display: &str,
    connection_id: ConnectionId,
) -> (Message, Vec<Outbound>) {
    if !state.config().x11_enabled {
        return (Response::status(id, Status::NotSupported).into(), Vec::new());
    }

    let host_id = match state.attach(connection_id, display) {
        Ok(host_id) => host_id,
        Err(e) => {
            let display_name = display;
            tracing::warn!(display = %display_name, error = %e, "host connect failed");
            return (Response::error(id, "host_connect_failed").into(), Vec::new());
        }
    };
    let Some(host) = state.host(host_id) else {
        return (Response::error(id, "host_connect_failed").into(), Vec::new());
    };

    let (width, height) = host.screen_size();
    let response = Response {
        root: Some(host.root()),
        screen_width: Some(width),
        screen_height: Some(height),
        ..Response::ok(id)
    };
    let lock = Outbound {
        target: connection_id,
        message: Message::lock_state(host.lock_state()),
    };
    (response.into(), vec![lock])
}

/// The caller's live host connection, or the response to send instead.
fn caller_host<'a>(
    state: &'a mut BrokerState,
    id: u32,
    connection_id: ConnectionId,
) -> Result<(HostId, Rect, &'a mut HostConnection), Response> {
    let host_id = state
        .host_of(connection_id)
        .ok_or_else(|| Response::status(id, Status::NotSupported))?;
    let screen = state
        .host(host_id)
        .map(|host| state.virtual_screen(host))
        .ok_or_else(|| Response::error(id, "host_failed"))?;
    let host = state
        .host_mut(host_id)
        .filter(|host| !host.is_failed())
        .ok_or_else(|| Response::error(id, "host_failed"))?;
    Ok((host_id, screen, host))
}

fn request_error(id: u32, e: &HostError) -> Response {
    let reason = match e {
        HostError::Registry(_) => "out_of_memory",
        HostError::Failed => "host_failed",
        _ => "request_failed",
    };
    tracing::warn!(error = %e, reason, "host request failed");
    Response::error(id, reason)
}

fn handle_start_input(
    state: &mut BrokerState,
    id: u32,
    x11_window: u32,
    handle: u64,
    connection_id: ConnectionId,
) -> Response {
    if x11_window == 0 || handle == 0 {
        return Response::status(id, Status::InvalidParameter);
    }
    let (host_id, _, host) = match caller_host(state, id, connection_id) {
        Ok(found) => found,
        Err(response) => return response,
    };
    let handle = WindowHandle(handle);
    let result = host.start_input(x11_window, handle);
    host.flush_if_pending();
    match result {
        Ok(()) => {
            state.own_window(host_id, x11_window, handle, connection_id);
            Response::ok(id)
        }
        Err(e) => request_error(id, &e),
    }
}

fn handle_stop_input(
    state: &mut BrokerState,
    id: u32,
    x11_window: u32,
    connection_id: ConnectionId,
) -> Response {
    let Some(host_id) = state.host_of(connection_id) else {
        return Response::status(id, Status::NotSupported);
    };
    if state.window_owner(host_id, x11_window) != Some(connection_id) {
        return Response::status(id, Status::NotFound);
    }
    state.forget_window(host_id, x11_window);
    if let Some(host) = state.host_mut(host_id) {
        host.stop_input(x11_window);
        host.flush_if_pending();
    }
    Response::ok(id)
}

fn handle_get_keyboard_tables(
    state: &mut BrokerState,
    id: u32,
    layout: u32,
    connection_id: ConnectionId,
) -> Response {
    let (_, _, host) = match caller_host(state, id, connection_id) {
        Ok(found) => found,
        Err(response) => return response,
    };
    let Some(found) = host.keyboard_tables(layout) else {
        tracing::debug!(layout = format_args!("0x{layout:08x}"), "no such layout");
        return Response::status(id, Status::NotFound);
    };
    let m = found.masks;
    Response {
        tables: Some(found.blob.clone()),
        group_mask: Some(found.group_mask()),
        masks: Some(Masks {
            shift: m.shift,
            ctrl: m.ctrl,
            alt: m.alt,
            altgr: m.altgr,
            caps: m.caps,
            num: m.num,
        }),
        ..Response::ok(id)
    }
}

fn handle_list_layouts(state: &mut BrokerState, id: u32, connection_id: ConnectionId) -> Response {
    let (_, _, host) = match caller_host(state, id, connection_id) {
        Ok(found) => found,
        Err(response) => return response,
    };
    let active = host.layouts().active().map(|l| l.group);
    let layouts = host
        .layouts()
        .iter()
        .map(|l| LayoutDescriptor {
            hkl: l.hkl(),
            lang: l.lang,
            index: l.index,
            layout_id: l.layout_id,
            group: l.group,
            name: l.name.clone(),
            active: active == Some(l.group),
        })
        .collect();
    Response {
        layouts: Some(layouts),
        ..Response::ok(id)
    }
}

fn handle_clip_cursor(
    state: &mut BrokerState,
    id: u32,
    rect: Option<Rect>,
    connection_id: ConnectionId,
) -> Response {
    if let Some(r) = rect
        && (r.width() <= 0 || r.height() <= 0)
    {
        return Response::status(id, Status::InvalidParameter);
    }
    let (_, screen, host) = match caller_host(state, id, connection_id) {
        Ok(found) => found,
        Err(response) => return response,
    };
    let result = host.clip_cursor(rect, screen);
    host.flush_if_pending();
    match result {
        Ok(()) => Response::ok(id),
        Err(e) => request_error(id, &e),
    }
}

fn handle_set_cursor_pos(
    state: &mut BrokerState,
    id: u32,
    x: i32,
    y: i32,
    connection_id: ConnectionId,
) -> Response {
    let (_, screen, host) = match caller_host(state, id, connection_id) {
        Ok(found) => found,
        Err(response) => return response,
    };
    let result = host.set_cursor_pos(x, y, screen);
    host.flush_if_pending();
    match result {
        Ok(()) => Response::ok(id),
        Err(e) => request_error(id, &e),
    }
}
