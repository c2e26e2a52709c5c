//! Touch contacts.

use super::HostConnection;
use super::event::TouchPhase;
use super::fixed::fp1616_round;
use super::input::*;

fn phase_flags(phase: TouchPhase) -> u32 {
    match phase {
        TouchPhase::Begin => {
            POINTER_FLAG_NEW | POINTER_FLAG_INRANGE | POINTER_FLAG_INCONTACT | POINTER_FLAG_DOWN
        }
        TouchPhase::Update => POINTER_FLAG_INRANGE | POINTER_FLAG_INCONTACT | POINTER_FLAG_UPDATE,
        TouchPhase::End => POINTER_FLAG_UP,
    }
}

/// Scale `pos - origin` into `[0, 65535]` across `extent` pixels.
fn normalize(pos: i32, origin: i32, extent: i64) -> i32 {
    if extent <= 0 {
        return 0;
    }
    ((i64::from(pos) - i64::from(origin)) * 65535 / extent).clamp(0, 65535) as i32
}

impl HostConnection {
    pub(super) fn handle_touch(
        &mut self,
        phase: TouchPhase,
        time: u32,
        window: u32,
        id: u32,
        (root_x, root_y): (i32, i32),
        sink: &mut dyn DesktopSink,
    ) {
        let Some(handle) = self.resolve_window(window, "touch") else {
            return;
        };
        let screen = sink.virtual_screen();
        let x = normalize(fp1616_round(root_x), screen.left, screen.width());
        let y = normalize(fp1616_round(root_y), screen.top, screen.height());
        sink.queue_input(
            Some(handle),
            HardwareInput::Touch {
                x,
                y,
                id,
                flags: phase_flags(phase),
                time,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::event::HostEvent;
    use crate::host::input::recording::RecordingSink;
    use crate::host::test_support::connected;
    use crate::host::windows::WindowHandle;

    fn touch(phase: TouchPhase, x: i32, y: i32) -> HostEvent {
        HostEvent::Touch {
            phase,
            time: 3,
            window: 0x600,
            id: 11,
            root_x: x * 65535,
            root_y: y * 65535,
        }
    }

    #[test]
    fn contact_lifecycle_flags_and_positions() {
        let (mut host, _log) = connected();
        host.start_input(0x600, WindowHandle(5)).unwrap();
        let mut sink = RecordingSink::new(Rect {
            left: 0,
            top: 0,
            right: 1000,
            bottom: 500,
        });

        host.dispatch(touch(TouchPhase::Begin, 500, 250), &mut sink);
        host.dispatch(touch(TouchPhase::Update, 1000, 0), &mut sink);
        host.dispatch(touch(TouchPhase::End, 0, 500), &mut sink);

        let got: Vec<(i32, i32, u32)> = sink
            .inputs()
            .into_iter()
            .map(|(w, i)| {
                assert_eq!(w, Some(WindowHandle(5)));
                match i {
                    HardwareInput::Touch { x, y, id, flags, .. } => {
                        assert_eq!(id, 11);
                        (x, y, flags)
                    }
                    other => panic!("unexpected {other:?}"),
                }
            })
            .collect();
        assert_eq!(
            got,
            vec![
                (
                    32767,
                    32767,
                    POINTER_FLAG_NEW
                        | POINTER_FLAG_INRANGE
                        | POINTER_FLAG_INCONTACT
                        | POINTER_FLAG_DOWN
                ),
                (
                    65535,
                    0,
                    POINTER_FLAG_INRANGE | POINTER_FLAG_INCONTACT | POINTER_FLAG_UPDATE
                ),
                (0, 65535, POINTER_FLAG_UP),
            ]
        );
    }

    #[test]
    fn unregistered_touch_window_is_dropped() {
        let (mut host, _log) = connected();
        let mut sink = RecordingSink::new(Rect::default());
        host.dispatch(touch(TouchPhase::Begin, 1, 1), &mut sink);
        assert!(sink.calls.is_empty());
    }

    #[test]
    fn degenerate_screen_normalizes_to_zero() {
        assert_eq!(normalize(10, 0, 0), 0);
        assert_eq!(normalize(-5, 0, 100), 0);
    }
}
