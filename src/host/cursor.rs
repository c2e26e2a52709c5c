//! Cursor confinement and warping.

use super::backend::{Barrier, BarrierDirection};
use super::input::Rect;
use super::{HostConnection, HostError};

#[derive(Debug, Default)]
pub(super) struct CursorState {
    /// Sequence number of the last warp request.
    pub(super) warp_seq: Option<u64>,
    pub(super) clipping: bool,
    pub(super) barriers: [u32; 4],
}

/// One barrier per edge, each letting the pointer move back inside.
fn edge_barriers(r: Rect) -> [Barrier; 4] {
    let edge = |x1, y1, x2, y2, allow| Barrier {
        x1,
        y1,
        x2,
        y2,
        allow,
    };
    [
        edge(r.left, r.top, r.left, r.bottom, BarrierDirection::PositiveX),
        edge(r.left, r.top, r.right, r.top, BarrierDirection::PositiveY),
        edge(r.right, r.top, r.right, r.bottom, BarrierDirection::NegativeX),
        edge(r.left, r.bottom, r.right, r.bottom, BarrierDirection::NegativeY),
    ]
}

impl HostConnection {
    /// Desktop coordinates to root-window coordinates.
    fn virtual_to_root(x: i32, y: i32, screen: Rect) -> (i32, i32) {
        (x.saturating_add(screen.left), y.saturating_add(screen.top))
    }

    /// Confine the pointer to `rect`, or release it when `None`.
    pub fn clip_cursor(&mut self, rect: Option<Rect>, screen: Rect) -> Result<(), HostError> {
        self.flush_pending = true;

        if self.cursor.clipping {
            for id in self.cursor.barriers {
                if let Err(e) = self.backend.delete_barrier(id) {
                    tracing::warn!(barrier = id, error = %e, "failed to delete pointer barrier");
                }
            }
            self.cursor.clipping = false;
            self.cursor.barriers = [0; 4];
        }

        let Some(rect) = rect else {
            tracing::debug!(display = %self.display, "cursor released");
            return Ok(());
        };

        let (left, top) = Self::virtual_to_root(rect.left, rect.top, screen);
        let (right, bottom) = Self::virtual_to_root(rect.right, rect.bottom, screen);
        let root_rect = Rect {
            left,
            top,
            right,
            bottom,
        };

        let mut created = [0u32; 4];
        for (slot, barrier) in edge_barriers(root_rect).into_iter().enumerate() {
            match self.backend.create_barrier(barrier) {
                Ok(id) => created[slot] = id,
                Err(e) => {
                    for &id in &created[..slot] {
                        if let Err(e) = self.backend.delete_barrier(id) {
                            tracing::warn!(barrier = id, error = %e, "failed to roll back pointer barrier");
                        }
                    }
                    return Err(e);
                }
            }
        }

        self.cursor.barriers = created;
        self.cursor.clipping = true;
        tracing::debug!(
            display = %self.display,
            left,
            top,
            right,
            bottom,
            "cursor clipped"
        );
        Ok(())
    }

    /// Move the pointer to desktop position `(x, y)`.
    ///
    /// Motion reported with the warp's sequence number is not forwarded.
    pub fn set_cursor_pos(&mut self, x: i32, y: i32, screen: Rect) -> Result<(), HostError> {
        let (root_x, root_y) = Self::virtual_to_root(x, y, screen);
        let seq = self.backend.warp_pointer(root_x, root_y)?;
        self.cursor.warp_seq = Some(seq);
        self.flush_pending = true;
        tracing::trace!(root_x, root_y, seq, "pointer warped");
        Ok(())
    }

    pub fn is_clipping(&self) -> bool {
        self.cursor.clipping
    }
}
