use vte::Parser;

use crate::cell::Cell;
use crate::perform::ScreenState;
use crate::screen::{CellUpdate, CursorState, RenderedState};

/// The core terminal emulator.
///
/// Owns a VTE parser and the screen state it drives. `consume` is the only
/// mutating entry point for child output; `snapshot` and `drain_reply` read
/// (and reset) what accumulated since the previous call. The type does no
/// locking itself; a caller sharing it between threads wraps it in a mutex.
pub struct Terminal {
    parser: Parser,
    state: ScreenState,
    /// Cursor as of the last snapshot, `None` before the first one.
    last_cursor: Option<CursorState>,
}

impl Terminal {
    /// Create a new terminal with the given dimensions.
    ///
    /// Zero dimensions are raised to one.
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            parser: Parser::new(),
            state: ScreenState::new(width, height),
            last_cursor: None,
        }
    }

    /// Number of columns.
    pub fn width(&self) -> u16 {
        self.state.grid.width() as u16
    }

    /// Number of rows.
    pub fn height(&self) -> u16 {
        self.state.grid.height() as u16
    }

    /// Feed raw child output into the terminal.
    ///
    /// Parser state carries over between calls, so a sequence cut off at the
    /// end of `bytes` is completed by the next call.
    pub fn consume(&mut self, bytes: &[u8]) {
        self.parser.advance(&mut self.state, bytes);
    }

    /// Take any reply bytes generated by status queries since the last drain.
    pub fn drain_reply(&mut self) -> Option<Vec<u8>> {
        if self.state.reply.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.state.reply))
        }
    }

    /// Get the current cursor state.
    pub fn cursor(&self) -> CursorState {
        CursorState {
            x: self.state.x as u16,
            y: self.state.y as u16,
            visible: self.state.cursor_visible,
        }
    }

    /// Get a single cell. Row 0 is the top of the screen.
    pub fn cell(&self, x: u16, y: u16) -> Option<Cell> {
        self.state.grid.get(x as usize, y as usize).copied()
    }

    /// Plain text of one row, trailing blanks trimmed.
    pub fn row_text(&self, y: u16) -> String {
        self.state.grid.row_text(y as usize)
    }

    /// The window title last set through OSC 0 or OSC 2.
    pub fn title(&self) -> Option<&str> {
        self.state.title.as_deref()
    }

    /// Reset to the power-on state, dropping any partially parsed sequence.
    ///
    /// Cells blanked by the reset show up in the next diff.
    pub fn reset(&mut self) {
        self.parser = Parser::new();
        self.state.reset();
    }

    /// Render the screen.
    ///
    /// With `full`, every cell and the cursor are reported. Otherwise only
    /// cells changed since the previous snapshot are reported, plus the cursor
    /// if it moved or toggled visibility. Either way the change marks are
    /// cleared afterwards.
    pub fn snapshot(&mut self, full: bool) -> RenderedState {
        let cursor = self.cursor();
        let previous = self.last_cursor.replace(cursor);

        if full {
            let cells = self
                .state
                .grid
                .iter()
                .map(|(x, y, cell)| update(x, y, *cell))
                .collect();
            self.state.grid.clear_changes();
            return RenderedState {
                full: true,
                cells,
                cursor: Some(cursor),
            };
        }

        let cells = self
            .state
            .grid
            .take_changes()
            .into_iter()
            .map(|(x, y, cell)| update(x, y, cell))
            .collect();
        RenderedState {
            full: false,
            cells,
            cursor: (previous != Some(cursor)).then_some(cursor),
        }
    }
}

fn update(x: usize, y: usize, cell: Cell) -> CellUpdate {
    CellUpdate {
        x: x as u16,
        y: y as u16,
        cell,
    }
}
