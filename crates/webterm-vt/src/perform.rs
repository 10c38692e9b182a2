//! Escape-sequence interpreter.
//!
//! `vte::Parser` owns the byte-level state machine (ground, escape, CSI/OSC/DCS
//! collection) and keeps its state between calls, so a sequence split across
//! two reads resumes where it stopped. This module only maps the dispatched
//! actions onto the grid, the cursor and the reply buffer. Anything not listed
//! here is dropped after the parser has consumed it.

use vte::{Params, Perform};

use crate::cell::{Cell, CellFlags, Color, Rgb};
use crate::grid::Grid;

const TAB_WIDTH: usize = 8;

/// Reply to primary device attributes (DA) and DECID: "VT102".
const DEVICE_ATTRIBUTES: &[u8] = b"\x1b[?6c";

/// Reply to a device status query (DSR 5): "terminal OK".
const STATUS_OK: &[u8] = b"\x1b[0n";

#[derive(Clone, Copy, Debug)]
struct SavedCursor {
    x: usize,
    y: usize,
    pen: Cell,
}

/// Mutable terminal state driven by the parser.
pub(crate) struct ScreenState {
    pub(crate) grid: Grid,
    pub(crate) x: usize,
    pub(crate) y: usize,
    pub(crate) cursor_visible: bool,
    /// Attributes applied to newly printed characters. `ch` is unused.
    pen: Cell,
    saved: Option<SavedCursor>,
    /// Scroll region, inclusive rows.
    top: usize,
    bottom: usize,
    pub(crate) reply: Vec<u8>,
    pub(crate) title: Option<String>,
}

impl ScreenState {
    pub(crate) fn new(width: u16, height: u16) -> Self {
        let grid = Grid::new(width, height);
        let bottom = grid.height() - 1;
        Self {
            grid,
            x: 0,
            y: 0,
            cursor_visible: true,
            pen: Cell::default(),
            saved: None,
            top: 0,
            bottom,
            reply: Vec::new(),
            title: None,
        }
    }

    /// Full reset (RIS): blank screen, home cursor, default attributes.
    pub(crate) fn reset(&mut self) {
        let height = self.grid.height();
        self.grid.fill_rows(0, height, Cell::default());
        self.x = 0;
        self.y = 0;
        self.cursor_visible = true;
        self.pen = Cell::default();
        self.saved = None;
        self.top = 0;
        self.bottom = height - 1;
        self.title = None;
    }

    fn width(&self) -> usize {
        self.grid.width()
    }

    fn height(&self) -> usize {
        self.grid.height()
    }

    fn blank(&self) -> Cell {
        Cell::blank(self.pen.bg)
    }

    fn move_to(&mut self, x: usize, y: usize) {
        self.x = x.min(self.width() - 1);
        self.y = y.min(self.height() - 1);
    }

    fn linefeed(&mut self) {
        if self.y == self.bottom {
            let blank = self.blank();
            self.grid.scroll_up(self.top, self.bottom, 1, blank);
        } else if self.y + 1 < self.height() {
            self.y += 1;
        }
    }

    fn reverse_index(&mut self) {
        if self.y == self.top {
            let blank = self.blank();
            self.grid.scroll_down(self.top, self.bottom, 1, blank);
        } else if self.y > 0 {
            self.y -= 1;
        }
    }

    fn save_cursor(&mut self) {
        self.saved = Some(SavedCursor {
            x: self.x,
            y: self.y,
            pen: self.pen,
        });
    }

    fn restore_cursor(&mut self) {
        match self.saved {
            Some(saved) => {
                self.pen = saved.pen;
                self.move_to(saved.x, saved.y);
            }
            None => {
                self.pen = Cell::default();
                self.move_to(0, 0);
            }
        }
    }

    fn erase_display(&mut self, mode: u16) {
        let blank = self.blank();
        let (width, height) = (self.width(), self.height());
        match mode {
            0 => {
                self.grid.fill_row(self.y, self.x, width, blank);
                self.grid.fill_rows(self.y + 1, height, blank);
            }
            1 => {
                self.grid.fill_rows(0, self.y, blank);
                self.grid.fill_row(self.y, 0, self.x + 1, blank);
            }
            2 | 3 => self.grid.fill_rows(0, height, blank),
            _ => log::trace!("ignoring ED mode {mode}"),
        }
    }

    fn erase_line(&mut self, mode: u16) {
        let blank = self.blank();
        let width = self.width();
        match mode {
            0 => self.grid.fill_row(self.y, self.x, width, blank),
            1 => self.grid.fill_row(self.y, 0, self.x + 1, blank),
            2 => self.grid.fill_row(self.y, 0, width, blank),
            _ => log::trace!("ignoring EL mode {mode}"),
        }
    }

    fn set_scroll_region(&mut self, params: &Params) {
        let top = count(params, 0) - 1;
        let bottom = param(params, 1)
            .filter(|&v| v != 0)
            .map_or(self.height(), usize::from)
            .min(self.height())
            - 1;
        if top < bottom {
            self.top = top;
            self.bottom = bottom;
            self.move_to(0, 0);
        }
    }

    fn set_private_mode(&mut self, params: &Params, enable: bool) {
        for group in params.iter() {
            match group.first() {
                Some(25) => self.cursor_visible = enable,
                Some(mode) => log::trace!("ignoring private mode {mode}"),
                None => {}
            }
        }
    }

    fn device_status(&mut self, params: &Params) {
        match param(params, 0) {
            Some(5) => self.reply.extend_from_slice(STATUS_OK),
            Some(6) => {
                let report = format!("\x1b[{};{}R", self.y + 1, self.x + 1);
                self.reply.extend_from_slice(report.as_bytes());
            }
            other => log::trace!("ignoring DSR {other:?}"),
        }
    }

    fn select_graphic_rendition(&mut self, params: &Params) {
        let groups: Vec<&[u16]> = params.iter().collect();
        if groups.is_empty() {
            self.pen = Cell::default();
            return;
        }

        let mut i = 0;
        while i < groups.len() {
            let group = groups[i];
            let code = group.first().copied().unwrap_or(0);
            match code {
                0 => self.pen = Cell::default(),
                1 => self.pen.flags.insert(CellFlags::BOLD),
                2 => self.pen.flags.insert(CellFlags::DIM),
                3 => self.pen.flags.insert(CellFlags::ITALIC),
                4 => self.pen.flags.insert(CellFlags::UNDERLINE),
                5 => self.pen.flags.insert(CellFlags::BLINK),
                7 => self.pen.flags.insert(CellFlags::REVERSE),
                8 => self.pen.flags.insert(CellFlags::HIDDEN),
                9 => self.pen.flags.insert(CellFlags::STRIKETHROUGH),
                21 | 22 => self.pen.flags.remove(CellFlags::BOLD | CellFlags::DIM),
                23 => self.pen.flags.remove(CellFlags::ITALIC),
                24 => self.pen.flags.remove(CellFlags::UNDERLINE),
                25 => self.pen.flags.remove(CellFlags::BLINK),
                27 => self.pen.flags.remove(CellFlags::REVERSE),
                28 => self.pen.flags.remove(CellFlags::HIDDEN),
                29 => self.pen.flags.remove(CellFlags::STRIKETHROUGH),
                30..=37 => self.pen.fg = Color::Indexed((code - 30) as u8),
                39 => self.pen.fg = Color::Default,
                40..=47 => self.pen.bg = Color::Indexed((code - 40) as u8),
                49 => self.pen.bg = Color::Default,
                90..=97 => self.pen.fg = Color::Indexed((code - 90 + 8) as u8),
                100..=107 => self.pen.bg = Color::Indexed((code - 100 + 8) as u8),
                38 | 48 => {
                    // Either colon sub-parameters (38:5:n) or the following
                    // semicolon parameters (38;5;n).
                    let color = if group.len() > 1 {
                        extended_color(&group[1..], true).map(|(color, _)| color)
                    } else {
                        let rest: Vec<u16> = groups[i + 1..]
                            .iter()
                            .map(|g| g.first().copied().unwrap_or(0))
                            .collect();
                        match extended_color(&rest, false) {
                            Some((color, used)) => {
                                i += used;
                                Some(color)
                            }
                            None => {
                                i = groups.len();
                                None
                            }
                        }
                    };
                    if let Some(color) = color {
                        if code == 38 {
                            self.pen.fg = color;
                        } else {
                            self.pen.bg = color;
                        }
                    }
                }
                other => log::trace!("ignoring SGR {other}"),
            }
            i += 1;
        }
    }
}

/// Parse the tail of an extended color (after 38/48). Returns the color and
/// how many values were used.
///
/// The colon form may carry a colorspace id before the channels
/// (`38:2::r:g:b`); the semicolon form never does.
fn extended_color(args: &[u16], colon_form: bool) -> Option<(Color, usize)> {
    match args.first() {
        Some(5) => {
            let idx = *args.get(1)?;
            Some((Color::Indexed(idx.min(255) as u8), 2))
        }
        Some(2) => {
            let channels = if colon_form && args.len() >= 5 {
                &args[2..5]
            } else {
                args.get(1..4)?
            };
            let byte = |v: u16| v.min(255) as u8;
            let rgb = Rgb::new(byte(channels[0]), byte(channels[1]), byte(channels[2]));
            Some((Color::Rgb(rgb), 1 + channels.len()))
        }
        _ => None,
    }
}

/// Raw first value of parameter `idx`, if present.
fn param(params: &Params, idx: usize) -> Option<u16> {
    params.iter().nth(idx).and_then(|group| group.first().copied())
}

/// Parameter `idx` as a count: missing or zero means one.
fn count(params: &Params, idx: usize) -> usize {
    param(params, idx).filter(|&v| v != 0).map_or(1, usize::from)
}

impl Perform for ScreenState {
    fn print(&mut self, c: char) {
        let cell = Cell { ch: c, ..self.pen };
        self.grid.set(self.x, self.y, cell);
        self.x += 1;
        if self.x >= self.width() {
            self.x = 0;
            self.linefeed();
        }
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            // BEL
            0x07 => {}
            // BS
            0x08 => self.x = self.x.saturating_sub(1),
            // HT
            0x09 => {
                let next = (self.x / TAB_WIDTH + 1) * TAB_WIDTH;
                self.x = next.min(self.width() - 1);
            }
            // LF, VT, FF
            0x0a..=0x0c => self.linefeed(),
            // CR
            0x0d => self.x = 0,
            _ => log::trace!("ignoring control byte {byte:#04x}"),
        }
    }

    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], ignore: bool, action: char) {
        if ignore {
            log::trace!("dropping oversized CSI {action}");
            return;
        }

        match intermediates {
            [] => {}
            [b'?'] => {
                match action {
                    'h' => self.set_private_mode(params, true),
                    'l' => self.set_private_mode(params, false),
                    _ => log::trace!("ignoring private CSI {action}"),
                }
                return;
            }
            _ => {
                log::trace!("ignoring CSI {intermediates:?} {action}");
                return;
            }
        }

        let n = count(params, 0);
        match action {
            'A' => self.y = self.y.saturating_sub(n),
            'B' | 'e' => self.move_to(self.x, self.y.saturating_add(n)),
            'C' | 'a' => self.move_to(self.x.saturating_add(n), self.y),
            'D' => self.x = self.x.saturating_sub(n),
            'E' => self.move_to(0, self.y.saturating_add(n)),
            'F' => self.move_to(0, self.y.saturating_sub(n)),
            'G' | '`' => self.move_to(n - 1, self.y),
            'd' => self.move_to(self.x, n - 1),
            'H' | 'f' => self.move_to(count(params, 1) - 1, n - 1),
            'J' => self.erase_display(param(params, 0).unwrap_or(0)),
            'K' => self.erase_line(param(params, 0).unwrap_or(0)),
            'L' => {
                if (self.top..=self.bottom).contains(&self.y) {
                    let blank = self.blank();
                    self.grid.scroll_down(self.y, self.bottom, n, blank);
                }
            }
            'M' => {
                if (self.top..=self.bottom).contains(&self.y) {
                    let blank = self.blank();
                    self.grid.scroll_up(self.y, self.bottom, n, blank);
                }
            }
            '@' => {
                let blank = self.blank();
                self.grid.insert_cells(self.x, self.y, n, blank);
            }
            'P' => {
                let blank = self.blank();
                self.grid.delete_cells(self.x, self.y, n, blank);
            }
            'X' => {
                let blank = self.blank();
                self.grid.fill_row(self.y, self.x, self.x.saturating_add(n), blank);
            }
            'S' => {
                let blank = self.blank();
                self.grid.scroll_up(self.top, self.bottom, n, blank);
            }
            'T' => {
                let blank = self.blank();
                self.grid.scroll_down(self.top, self.bottom, n, blank);
            }
            'r' => self.set_scroll_region(params),
            'm' => self.select_graphic_rendition(params),
            'n' => self.device_status(params),
            'c' if param(params, 0).unwrap_or(0) == 0 => {
                self.reply.extend_from_slice(DEVICE_ATTRIBUTES);
            }
            's' => self.save_cursor(),
            'u' => self.restore_cursor(),
            _ => log::trace!("ignoring CSI {action}"),
        }
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], ignore: bool, byte: u8) {
        if ignore || !intermediates.is_empty() {
            // Charset designations and other intermediate forms.
            log::trace!("ignoring ESC {intermediates:?} {:?}", byte as char);
            return;
        }

        match byte {
            b'7' => self.save_cursor(),
            b'8' => self.restore_cursor(),
            b'D' => self.linefeed(),
            b'E' => {
                self.x = 0;
                self.linefeed();
            }
            b'M' => self.reverse_index(),
            b'Z' => self.reply.extend_from_slice(DEVICE_ATTRIBUTES),
            b'c' => self.reset(),
            _ => log::trace!("ignoring ESC {:?}", byte as char),
        }
    }

    fn osc_dispatch(&mut self, params: &[&[u8]], _bell_terminated: bool) {
        match params {
            [kind, rest @ ..] if matches!(*kind, b"0" | b"2") && !rest.is_empty() => {
                let title = rest.join(&b';');
                self.title = Some(String::from_utf8_lossy(&title).into_owned());
            }
            _ => log::trace!("ignoring OSC with {} params", params.len()),
        }
    }
}
