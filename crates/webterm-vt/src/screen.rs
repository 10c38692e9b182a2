use serde::Serialize;

use crate::cell::Cell;

/// Current state of the cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CursorState {
    pub x: u16,
    pub y: u16,
    pub visible: bool,
}

/// One reported grid position and its current content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CellUpdate {
    pub x: u16,
    pub y: u16,
    #[serde(flatten)]
    pub cell: Cell,
}

/// A rendering of the screen, either complete or only what changed.
///
/// A full rendering lists every cell in row-major order and always carries
/// the cursor. A diff lists only cells changed since the previous rendering
/// and carries the cursor only when it moved or changed visibility.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RenderedState {
    pub full: bool,
    pub cells: Vec<CellUpdate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorState>,
}

impl RenderedState {
    /// Whether this is a diff with nothing in it.
    pub fn is_unchanged(&self) -> bool {
        !self.full && self.cells.is_empty() && self.cursor.is_none()
    }
}
