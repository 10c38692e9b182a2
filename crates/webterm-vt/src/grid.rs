//! Fixed-size cell grid with per-cell change tracking.
//!
//! Every write goes through [`Grid::set`], which marks a cell only when its
//! value actually changes. Snapshots collect and clear those marks.

use crate::cell::Cell;

/// The visible screen area: `width × height` cells, row 0 at the top.
#[derive(Clone, Debug)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
    changed: Vec<bool>,
}

impl Grid {
    /// Create a blank grid. Every cell starts marked as changed, so the first
    /// diff against a fresh grid carries the whole screen.
    pub fn new(width: u16, height: u16) -> Self {
        let width = width.max(1) as usize;
        let height = height.max(1) as usize;
        Self {
            width,
            height,
            cells: vec![Cell::default(); width * height],
            changed: vec![true; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// Get the cell at `(x, y)`, or `None` when out of bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&Cell> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(&self.cells[self.index(x, y)])
    }

    /// Overwrite the cell at `(x, y)`. Out-of-bounds writes are ignored.
    pub fn set(&mut self, x: usize, y: usize, cell: Cell) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = self.index(x, y);
        if self.cells[idx] != cell {
            self.cells[idx] = cell;
            self.changed[idx] = true;
        }
    }

    /// Fill columns `from..to` of row `y` with `cell`.
    pub fn fill_row(&mut self, y: usize, from: usize, to: usize, cell: Cell) {
        for x in from..to.min(self.width) {
            self.set(x, y, cell);
        }
    }

    /// Fill whole rows `from..to` with `cell`.
    pub fn fill_rows(&mut self, from: usize, to: usize, cell: Cell) {
        for y in from..to.min(self.height) {
            self.fill_row(y, 0, self.width, cell);
        }
    }

    fn copy_row(&mut self, from: usize, to: usize) {
        for x in 0..self.width {
            let cell = self.cells[self.index(x, from)];
            self.set(x, to, cell);
        }
    }

    /// Scroll rows `top..=bottom` up by `n`, filling the vacated bottom rows.
    pub fn scroll_up(&mut self, top: usize, bottom: usize, n: usize, blank: Cell) {
        if top > bottom || bottom >= self.height {
            return;
        }
        let n = n.min(bottom - top + 1);
        for y in top..bottom + 1 - n {
            self.copy_row(y + n, y);
        }
        self.fill_rows(bottom + 1 - n, bottom + 1, blank);
    }

    /// Scroll rows `top..=bottom` down by `n`, filling the vacated top rows.
    pub fn scroll_down(&mut self, top: usize, bottom: usize, n: usize, blank: Cell) {
        if top > bottom || bottom >= self.height {
            return;
        }
        let n = n.min(bottom - top + 1);
        for y in (top + n..=bottom).rev() {
            self.copy_row(y - n, y);
        }
        self.fill_rows(top, top + n, blank);
    }

    /// Shift cells right of `x` on row `y` right by `n`, blanking the gap.
    pub fn insert_cells(&mut self, x: usize, y: usize, n: usize, blank: Cell) {
        if x >= self.width || y >= self.height {
            return;
        }
        let n = n.min(self.width - x);
        for col in (x + n..self.width).rev() {
            let cell = self.cells[self.index(col - n, y)];
            self.set(col, y, cell);
        }
        self.fill_row(y, x, x + n, blank);
    }

    /// Remove `n` cells at `x` on row `y`, pulling the rest of the row left.
    pub fn delete_cells(&mut self, x: usize, y: usize, n: usize, blank: Cell) {
        if x >= self.width || y >= self.height {
            return;
        }
        let n = n.min(self.width - x);
        for col in x..self.width - n {
            let cell = self.cells[self.index(col + n, y)];
            self.set(col, y, cell);
        }
        self.fill_row(y, self.width - n, self.width, blank);
    }

    /// Collect every changed cell in row-major order and clear the marks.
    pub fn take_changes(&mut self) -> Vec<(usize, usize, Cell)> {
        let mut out = Vec::new();
        for (idx, flag) in self.changed.iter_mut().enumerate() {
            if std::mem::take(flag) {
                out.push((idx % self.width, idx / self.width, self.cells[idx]));
            }
        }
        out
    }

    /// Clear all change marks without reporting them.
    pub fn clear_changes(&mut self) {
        self.changed.iter_mut().for_each(|flag| *flag = false);
    }

    /// Whether any cell is marked as changed.
    pub fn has_changes(&self) -> bool {
        self.changed.iter().any(|&flag| flag)
    }

    /// Iterate over all cells of the grid in row-major order with coordinates.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &Cell)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .map(move |(idx, cell)| (idx % self.width, idx / self.width, cell))
    }

    /// Plain text of row `y` with trailing blanks trimmed.
    pub fn row_text(&self, y: usize) -> String {
        if y >= self.height {
            return String::new();
        }
        let start = self.index(0, y);
        let text: String = self.cells[start..start + self.width]
            .iter()
            .map(|c| c.ch)
            .collect();
        text.trim_end().to_string()
    }
}
